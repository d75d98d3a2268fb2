//! Strict validation of a [`SearchRequest`].
//!
//! Uses the same field map, operator table and value parser as the filter
//! compiler; a request that validates compiles without dropping clauses.

use std::fmt;
use std::sync::Arc;

use sea_orm::EntityTrait;

use crate::query::filter::{FilterError, check_clause};
use crate::query::{FieldMap, SearchRequest, Searchable, field_map_of};

/// One rejected property of a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationFailure {
    /// Path of the offending property, e.g. `filters[2].operator`.
    pub property: String,
    pub message: String,
}

impl ValidationFailure {
    pub fn new(property: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn for_filter(index: usize, err: &FilterError) -> Self {
        let at = |prop: &str| format!("filters[{index}].{prop}");
        match err {
            FilterError::UnknownField(field) => Self::new(
                at("fieldName"),
                format!("FieldName '{field}' is not valid."),
            ),
            FilterError::OperatorNotAllowed { field, op, .. } => Self::new(
                at("operator"),
                format!("Operator '{op}' is not valid for '{field}'."),
            ),
            FilterError::MissingValue(field) => {
                Self::new(at("value"), format!("Value is required for '{field}'."))
            }
            FilterError::InvalidValue { field, value, .. } => Self::new(
                at("value"),
                format!("Value '{value}' is not valid for '{field}'."),
            ),
        }
    }

    #[must_use]
    pub fn unknown_sort(index: usize, field: &str) -> Self {
        Self::new(
            format!("sorts[{index}].fieldName"),
            format!("SortBy '{field}' is not valid."),
        )
    }
}

/// Every failure found in one request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationErrors(Vec<ValidationFailure>);

impl ValidationErrors {
    #[must_use]
    pub fn new(failures: Vec<ValidationFailure>) -> Self {
        Self(failures)
    }

    #[must_use]
    pub fn failures(&self) -> &[ValidationFailure] {
        &self.0
    }

    #[must_use]
    pub fn into_failures(self) -> Vec<ValidationFailure> {
        self.0
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid search request:")?;
        for failure in &self.0 {
            write!(f, " {}", failure.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Validates page parameters, filters and sort keys of a request for `E`.
pub struct SearchRequestValidator<E: EntityTrait> {
    fields: Arc<FieldMap<E>>,
}

impl<E: Searchable> Default for SearchRequestValidator<E> {
    fn default() -> Self {
        Self::new(field_map_of::<E>())
    }
}

impl<E: EntityTrait> SearchRequestValidator<E> {
    #[must_use]
    pub fn new(fields: Arc<FieldMap<E>>) -> Self {
        Self { fields }
    }

    /// Check `req`; per filter clause only the first failing rule is reported.
    ///
    /// # Errors
    /// Returns `ValidationErrors` with one entry per offending property.
    pub fn validate(&self, req: &SearchRequest) -> Result<(), ValidationErrors> {
        let mut failures = Vec::new();
        if req.page_index < 1 {
            failures.push(ValidationFailure::new("pageIndex", "PageIndex is invalid."));
        }
        if req.page_size < 1 {
            failures.push(ValidationFailure::new("pageSize", "PageSize is invalid."));
        }
        for (i, clause) in req.filters.iter().enumerate() {
            if let Err(e) = check_clause(clause, &self.fields) {
                failures.push(ValidationFailure::for_filter(i, &e));
            }
        }
        for (i, key) in req.sorts.iter().enumerate() {
            if self.fields.get(&key.field_name).is_none() {
                failures.push(ValidationFailure::unknown_sort(i, &key.field_name));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(ValidationErrors::new(failures))
        }
    }
}

//! Declarative search request: filters, sort keys and page parameters.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Filter operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperatorKind {
    Equals,
    Contains,
    GreaterThan,
    #[serde(alias = "GreaterThanEquals")]
    GreaterThanOrEqual,
    LessThan,
    #[serde(alias = "LessThanEquals")]
    LessThanOrEqual,
    StartsWith,
    EndsWith,
}

impl OperatorKind {
    /// `>`, `>=`, `<`, `<=`.
    #[must_use]
    pub const fn is_relational(self) -> bool {
        matches!(
            self,
            Self::GreaterThan | Self::GreaterThanOrEqual | Self::LessThan | Self::LessThanOrEqual
        )
    }
}

impl fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Equals => "Equals",
            Self::Contains => "Contains",
            Self::GreaterThan => "GreaterThan",
            Self::GreaterThanOrEqual => "GreaterThanOrEqual",
            Self::LessThan => "LessThan",
            Self::LessThanOrEqual => "LessThanOrEqual",
            Self::StartsWith => "StartsWith",
            Self::EndsWith => "EndsWith",
        };
        f.write_str(name)
    }
}

/// One filter clause. `value` is parsed against the field kind at compile time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterColumn {
    #[serde(alias = "filterBy", alias = "columnName")]
    pub field_name: String,
    pub operator: OperatorKind,
    #[serde(default)]
    pub value: String,
}

impl FilterColumn {
    pub fn new(
        field_name: impl Into<String>,
        operator: OperatorKind,
        value: impl Into<String>,
    ) -> Self {
        Self {
            field_name: field_name.into(),
            operator,
            value: value.into(),
        }
    }
}

/// Sort direction; any unrecognised text deserializes as ascending.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl From<String> for SortDirection {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<&str> for SortDirection {
    fn from(s: &str) -> Self {
        let s = s.trim();
        if s.eq_ignore_ascii_case("desc") || s.eq_ignore_ascii_case("descending") {
            Self::Descending
        } else {
            Self::Ascending
        }
    }
}

/// One sort key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortOrder {
    #[serde(alias = "sortBy")]
    pub field_name: String,
    #[serde(default, alias = "order")]
    pub direction: SortDirection,
}

impl SortOrder {
    pub fn asc(field_name: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            direction: SortDirection::Ascending,
        }
    }

    pub fn desc(field_name: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            direction: SortDirection::Descending,
        }
    }
}

const fn default_page_index() -> u64 {
    1
}

const fn default_page_size() -> u64 {
    10
}

/// Filters, sort keys and page parameters for one search.
///
/// `sorts` are applied in order (primary key first). `filters` are conjoined,
/// their order does not matter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[must_use]
pub struct SearchRequest {
    #[serde(default = "default_page_index", alias = "pageNumber")]
    pub page_index: u64,
    #[serde(default = "default_page_size")]
    pub page_size: u64,
    #[serde(default)]
    pub sorts: Vec<SortOrder>,
    #[serde(default)]
    pub filters: Vec<FilterColumn>,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            page_index: default_page_index(),
            page_size: default_page_size(),
            sorts: Vec::new(),
            filters: Vec::new(),
        }
    }
}

impl SearchRequest {
    pub fn new(page_index: u64, page_size: u64) -> Self {
        Self {
            page_index,
            page_size,
            ..Self::default()
        }
    }

    pub fn filter(
        mut self,
        field_name: impl Into<String>,
        operator: OperatorKind,
        value: impl Into<String>,
    ) -> Self {
        self.filters.push(FilterColumn::new(field_name, operator, value));
        self
    }

    pub fn sort(mut self, order: SortOrder) -> Self {
        self.sorts.push(order);
        self
    }
}

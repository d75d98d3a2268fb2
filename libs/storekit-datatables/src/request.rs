//! Incoming `DataTables` server-side processing request.

use serde::{Deserialize, Serialize};
use storekit_db::{FilterColumn, SearchRequest, SortDirection, SortOrder};
use thiserror::Error;

/// Page size used when the widget sends `length=0` or a negative length.
pub const DEFAULT_PAGE_SIZE: u64 = 10;

/// Highest `order[i]` / `columns[i]` index accepted from a form body.
const MAX_INDEX: usize = 1024;

#[derive(Debug, Error)]
pub enum DataTableError {
    #[error("malformed form body: {0}")]
    Form(#[from] serde_urlencoded::de::Error),

    #[error("malformed JSON body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("'{key}' is not a valid number: '{value}'")]
    InvalidNumber { key: String, value: String },

    #[error("index in '{0}' is out of range")]
    IndexOutOfRange(String),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataTableSearch {
    pub value: String,
    pub regex: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataTableOrder {
    /// Index into [`DataTableRequest::columns`].
    pub column: usize,
    pub dir: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataTableColumn {
    pub data: String,
    pub name: String,
    pub searchable: bool,
    pub orderable: bool,
    pub search: DataTableSearch,
}

impl DataTableColumn {
    /// Field to sort by: `name`, or `data` when no name is set.
    #[must_use]
    pub fn field(&self) -> Option<&str> {
        [self.name.as_str(), self.data.as_str()]
            .into_iter()
            .find(|s| !s.trim().is_empty())
    }
}

/// Paging, ordering and search state sent by the widget.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataTableRequest {
    pub draw: u64,
    pub start: u64,
    pub length: u64,
    pub search: DataTableSearch,
    pub order: Vec<DataTableOrder>,
    pub columns: Vec<DataTableColumn>,
}

impl DataTableRequest {
    /// Parse a JSON body.
    ///
    /// # Errors
    /// `DataTableError::Json` when the body is not a valid request.
    pub fn from_json(body: &str) -> Result<Self, DataTableError> {
        Ok(serde_json::from_str(body)?)
    }

    /// Parse a form-encoded body with bracketed keys such as
    /// `order[0][column]=2` or `columns[1][search][value]=x`.
    ///
    /// Unknown keys are ignored. A negative `length` (the widget's "all")
    /// counts as unset.
    ///
    /// # Errors
    /// `DataTableError::Form` for an undecodable body,
    /// `DataTableError::InvalidNumber` for a non-numeric counter or index,
    /// `DataTableError::IndexOutOfRange` for an absurd array index.
    pub fn from_form(body: &str) -> Result<Self, DataTableError> {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(body)?;
        let mut req = Self::default();
        for (key, value) in &pairs {
            req.apply(key, value)?;
        }
        Ok(req)
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<(), DataTableError> {
        let (head, path) = split_key(key);
        match (head, path.as_slice()) {
            ("draw", []) => self.draw = number(key, value)?,
            ("start", []) => self.start = number(key, value)?,
            ("length", []) => {
                self.length = if value.trim().starts_with('-') {
                    0
                } else {
                    number(key, value)?
                };
            }
            ("search", [field]) => set_search(&mut self.search, field, value),
            ("order", [idx, field]) => {
                let order = slot(&mut self.order, key, idx)?;
                match *field {
                    "column" => order.column = number(key, value)?,
                    "dir" => value.clone_into(&mut order.dir),
                    _ => {}
                }
            }
            ("columns", [idx, rest @ ..]) => {
                let col = slot(&mut self.columns, key, idx)?;
                match rest {
                    ["data"] => value.clone_into(&mut col.data),
                    ["name"] => value.clone_into(&mut col.name),
                    ["searchable"] => col.searchable = flag(value),
                    ["orderable"] => col.orderable = flag(value),
                    ["search", field] => set_search(&mut col.search, field, value),
                    _ => {}
                }
            }
            _ => tracing::trace!(key, "ignoring form field"),
        }
        Ok(())
    }

    /// Trimmed global search text, if any.
    #[must_use]
    pub fn search_value(&self) -> Option<&str> {
        Some(self.search.value.trim()).filter(|s| !s.is_empty())
    }

    /// Fields of the columns flagged searchable.
    pub fn searchable_fields(&self) -> impl Iterator<Item = &str> {
        self.columns
            .iter()
            .filter(|c| c.searchable)
            .filter_map(DataTableColumn::field)
    }

    /// Convert to a [`SearchRequest`].
    ///
    /// `pageIndex` is `start / length + 1`; a zero length becomes
    /// [`DEFAULT_PAGE_SIZE`]. Each `order` entry sorts by its column's field,
    /// ascending unless `dir` says `desc`. Filters come from `filters`, which
    /// sees the whole request.
    pub fn to_search_request(
        &self,
        filters: impl FnOnce(&Self) -> Vec<FilterColumn>,
    ) -> SearchRequest {
        let page_size = if self.length == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            self.length
        };
        let page_index = self
            .start
            .checked_div(page_size)
            .map_or(1, |p| p.saturating_add(1));

        let mut req = SearchRequest::new(page_index, page_size);
        for order in &self.order {
            let Some(field) = self.columns.get(order.column).and_then(DataTableColumn::field)
            else {
                tracing::debug!(column = order.column, "order refers to an unknown column");
                continue;
            };
            req = req.sort(SortOrder {
                field_name: field.to_owned(),
                direction: SortDirection::from(order.dir.as_str()),
            });
        }
        req.filters = filters(self);
        req
    }
}

/// `columns[1][search][value]` -> (`columns`, [`1`, `search`, `value`]).
fn split_key(key: &str) -> (&str, Vec<&str>) {
    let Some((head, rest)) = key.split_once('[') else {
        return (key, Vec::new());
    };
    let path = rest
        .trim_end_matches(']')
        .split("][")
        .collect();
    (head, path)
}

fn number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, DataTableError> {
    value
        .trim()
        .parse()
        .map_err(|_| DataTableError::InvalidNumber {
            key: key.to_owned(),
            value: value.to_owned(),
        })
}

fn flag(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

fn set_search(search: &mut DataTableSearch, field: &str, value: &str) {
    match field {
        "value" => value.clone_into(&mut search.value),
        "regex" => search.regex = flag(value),
        _ => {}
    }
}

fn slot<'v, T: Default>(
    items: &'v mut Vec<T>,
    key: &str,
    idx: &str,
) -> Result<&'v mut T, DataTableError> {
    let i: usize = number(key, idx)?;
    if i >= MAX_INDEX {
        return Err(DataTableError::IndexOutOfRange(key.to_owned()));
    }
    if items.len() <= i {
        items.resize_with(i + 1, T::default);
    }
    Ok(&mut items[i])
}

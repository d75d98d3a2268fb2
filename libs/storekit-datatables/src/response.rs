//! Response envelope returned to the `DataTables` widget.

use serde::{Deserialize, Serialize};
use storekit_db::Page;

/// Envelope the table widget expects back for one draw.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataTableResponse<T> {
    /// Echo of the request's `draw` counter.
    pub draw: u64,
    pub records_total: u64,
    pub records_filtered: u64,
    pub data: Vec<T>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl<T> Default for DataTableResponse<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> DataTableResponse<T> {
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            draw: 0,
            records_total: 0,
            records_filtered: 0,
            data: Vec::new(),
            error: String::new(),
        }
    }

    /// Wrap a result page; `recordsTotal` is the page's unfiltered total.
    #[must_use]
    pub fn from_page(draw: u64, page: Page<T>) -> Self {
        Self {
            draw,
            records_total: page.total,
            records_filtered: page.total_filtered,
            data: page.items,
            error: String::new(),
        }
    }

    /// An empty draw carrying an error message for the widget to show.
    #[must_use]
    pub fn failed(draw: u64, error: impl Into<String>) -> Self {
        Self {
            draw,
            error: error.into(),
            ..Self::empty()
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde_json::json;
    use storekit_db::PageRequest;

    #[test]
    fn page_becomes_envelope() {
        let page = Page::from_items(["a", "b", "c"], PageRequest::new(2, 2), 10).unwrap();
        let resp = DataTableResponse::from_page(4, page);
        assert_eq!(
            serde_json::to_value(&resp).unwrap(),
            json!({ "draw": 4, "recordsTotal": 10, "recordsFiltered": 3, "data": ["c"] })
        );
    }

    #[test]
    fn failure_keeps_draw_and_message() {
        let resp = DataTableResponse::<u8>::failed(9, "search failed");
        let v = serde_json::to_value(&resp).unwrap();
        assert_eq!(v["draw"], 9);
        assert_eq!(v["error"], "search failed");
        assert_eq!(v["data"], json!([]));
    }

    #[test]
    fn empty_response() {
        let resp = DataTableResponse::<u8>::default();
        assert_eq!(resp, DataTableResponse::empty());
        assert!(resp.data.is_empty());
    }
}

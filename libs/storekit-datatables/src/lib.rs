#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Adapter between the `DataTables` table widget and storekit searches.
//!
//! [`DataTableRequest`] is what the widget sends (as JSON or as a form body);
//! [`DataTableRequest::to_search_request`] turns it into a
//! [`storekit_db::SearchRequest`]. [`DataTableResponse`] wraps a result page in
//! the envelope the widget expects.

pub mod request;
pub mod response;

pub use request::{DataTableColumn, DataTableError, DataTableOrder, DataTableRequest, DataTableSearch};
pub use response::DataTableResponse;

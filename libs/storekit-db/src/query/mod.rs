//! Dynamic query specification: field metadata, operator table, and the
//! filter / sort compilers that turn a [`SearchRequest`] into `SeaORM` clauses.

pub mod filter;
pub mod kind;
pub mod metadata;
pub mod model;
pub mod operators;
pub mod sort;
pub mod validate;
pub mod value;

pub use filter::{FilterError, FilterExt, build_condition, check_clause};
pub use kind::FieldKind;
pub use metadata::{Field, FieldMap, Searchable, field_map_of};
pub use model::{FilterColumn, OperatorKind, SearchRequest, SortDirection, SortOrder};
pub use operators::{allowed_kinds, is_operator_allowed};
pub use sort::SortExt;
pub use validate::{SearchRequestValidator, ValidationErrors, ValidationFailure};
pub use value::FilterValue;

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Storage access over `SeaORM`: generic repositories, dynamic filter and sort
//! compilation, offset pagination and a retrying unit of work.
//!
//! # Features
//! - `pg`, `mysql`, `sqlite`: enable the matching `SQLx` backend (`sqlite` by default)
//!
//! # Example
//! ```ignore
//! use storekit_db::{OperatorKind, SearchRequest, SortOrder, StoreConfig, UnitOfWork};
//!
//! let uow = UnitOfWork::connect(&StoreConfig::new("sqlite://app.db")).await?;
//! let people = uow.repository::<person::Entity>()?;
//! let req = SearchRequest::new(1, 20)
//!     .filter("name", OperatorKind::StartsWith, "jo")
//!     .sort(SortOrder::asc("name"));
//! let page = people.search(&req).await?;
//! println!("{} of {}", page.items.len(), page.total_filtered);
//! ```

#![cfg_attr(
    not(any(feature = "pg", feature = "mysql", feature = "sqlite")),
    allow(
        unused_imports,
        unused_variables,
        dead_code,
        unreachable_code,
        unused_lifetimes,
        clippy::unused_async,
    )
)]

pub mod config;
pub mod options;
pub mod paging;
pub mod query;
pub mod repository;
pub mod uow;

#[cfg(any(feature = "pg", feature = "mysql", feature = "sqlite"))]
mod pool_opts;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use config::{PoolCfg, RetryCfg, StoreConfig};
pub use options::{DbEngine, connect};
pub use paging::{Page, PageError, PageRequest, paginate, paginate_with};
pub use query::{
    FieldKind, FieldMap, FilterColumn, FilterExt, OperatorKind, SearchRequest,
    SearchRequestValidator, Searchable, SortDirection, SortExt, SortOrder, ValidationErrors,
    ValidationFailure,
};
pub use repository::procedure::{OutputType, ProcedureCall, ProcedureResult};
pub use repository::{ListQuery, Repository};
pub use uow::{
    ExecutionStrategy, Failure, NoRetry, Outcome, RetryingStrategy, TxAccessMode, TxConfig,
    TxIsolationLevel, UnitOfWork, UnitOfWorkBuilder,
};

use std::time::Duration;

use thiserror::Error;

/// Library-local result type.
pub type Result<T> = std::result::Result<T, DbError>;

/// Typed error for connections, queries and units of work.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Unknown DSN: {0}")]
    UnknownDsn(String),

    #[error("Feature not enabled: {0}")]
    FeatureDisabled(&'static str),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Page(#[from] PageError),

    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error("unit of work has no connection")]
    MissingConnection,

    #[error("no active transaction")]
    NoActiveTransaction,

    #[error("a transaction is already active")]
    TransactionAlreadyActive,

    #[error("unit of work is disposed")]
    Disposed,

    #[error("operation cancelled")]
    Cancelled,

    #[error("verification rejected the unit of work")]
    VerificationFailed,

    #[error("more than one '{0}' row matched")]
    MultipleRows(String),

    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    #[error("'{operation}' failed after {attempts} attempt(s): {error}")]
    UnitFailed {
        operation: String,
        attempts: u32,
        error: String,
    },

    #[error("not supported: {0}")]
    Unsupported(&'static str),

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[cfg(any(feature = "pg", feature = "mysql", feature = "sqlite"))]
    #[error(transparent)]
    Sqlx(#[from] sea_orm::sqlx::Error),

    #[error(transparent)]
    Sea(#[from] sea_orm::DbErr),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

//! Engine detection and pool construction from a [`StoreConfig`].

use sea_orm::DatabaseConnection;
#[cfg(feature = "mysql")]
use sea_orm::SqlxMySqlConnector;
#[cfg(feature = "pg")]
use sea_orm::SqlxPostgresConnector;
#[cfg(feature = "sqlite")]
use sea_orm::SqlxSqliteConnector;
#[cfg(feature = "mysql")]
use sea_orm::sqlx::mysql::MySqlPoolOptions;
#[cfg(feature = "pg")]
use sea_orm::sqlx::postgres::PgPoolOptions;
#[cfg(feature = "sqlite")]
use sea_orm::sqlx::sqlite::SqlitePoolOptions;

use crate::config::StoreConfig;
#[cfg(any(feature = "pg", feature = "mysql", feature = "sqlite"))]
use crate::pool_opts::ApplyPoolOpts;
use crate::{DbError, Result};

/// Supported engines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DbEngine {
    Postgres,
    MySql,
    Sqlite,
}

impl DbEngine {
    /// Detect the engine from the DSN scheme; the rest of the DSN is not inspected.
    ///
    /// # Errors
    /// `DbError::UnknownDsn` for any other scheme.
    pub fn detect(dsn: &str) -> Result<Self> {
        let s = dsn.trim_start();
        if s.starts_with("postgres://") || s.starts_with("postgresql://") {
            Ok(Self::Postgres)
        } else if s.starts_with("mysql://") {
            Ok(Self::MySql)
        } else if s.starts_with("sqlite:") {
            Ok(Self::Sqlite)
        } else {
            Err(DbError::UnknownDsn(redact(dsn)))
        }
    }
}

// Keep passwords out of error messages.
fn redact(dsn: &str) -> String {
    match (dsn.find("://"), dsn.rfind('@')) {
        (Some(scheme), Some(at)) if at > scheme => {
            format!("{}://***@{}", &dsn[..scheme], &dsn[at + 1..])
        }
        _ => dsn.to_owned(),
    }
}

/// Open a pooled `SeaORM` connection for `cfg`.
///
/// In-memory `SQLite` databases live inside a single connection, so their pool
/// is pinned to exactly one connection that is never recycled.
///
/// # Errors
/// `DbError::UnknownDsn`, `DbError::FeatureDisabled` for an engine compiled
/// out, or the driver's connection error.
pub async fn connect(cfg: &StoreConfig) -> Result<DatabaseConnection> {
    let engine = DbEngine::detect(&cfg.dsn)?;
    tracing::debug!(?engine, "opening database pool");
    match engine {
        #[cfg(feature = "pg")]
        DbEngine::Postgres => {
            let pool = PgPoolOptions::new().apply(&cfg.pool).connect(&cfg.dsn).await?;
            Ok(SqlxPostgresConnector::from_sqlx_postgres_pool(pool))
        }
        #[cfg(not(feature = "pg"))]
        DbEngine::Postgres => Err(DbError::FeatureDisabled("PostgreSQL feature not enabled")),
        #[cfg(feature = "mysql")]
        DbEngine::MySql => {
            let pool = MySqlPoolOptions::new().apply(&cfg.pool).connect(&cfg.dsn).await?;
            Ok(SqlxMySqlConnector::from_sqlx_mysql_pool(pool))
        }
        #[cfg(not(feature = "mysql"))]
        DbEngine::MySql => Err(DbError::FeatureDisabled("MySQL feature not enabled")),
        #[cfg(feature = "sqlite")]
        DbEngine::Sqlite => {
            let dsn = crate::sqlite::prepare_sqlite_path(&cfg.dsn)?;
            let mut opts = SqlitePoolOptions::new().apply(&cfg.pool);
            if crate::sqlite::is_memory_dsn(&dsn) {
                opts = opts
                    .max_connections(1)
                    .min_connections(1)
                    .idle_timeout(None)
                    .max_lifetime(None);
            }
            let pool = opts.connect(&dsn).await?;
            Ok(SqlxSqliteConnector::from_sqlx_sqlite_pool(pool))
        }
        #[cfg(not(feature = "sqlite"))]
        DbEngine::Sqlite => Err(DbError::FeatureDisabled("SQLite feature not enabled")),
    }
}

//! Retry policy for units of work.
//!
//! A unit is retried from `BEGIN` only when its error is transient; every other
//! error ends the unit after one attempt.

use std::time::Duration;

use sea_orm::{DbErr, RuntimeErr};

use crate::DbError;
use crate::config::RetryCfg;

/// Decides whether (and after how long) a failed attempt is retried.
pub trait ExecutionStrategy: Send + Sync {
    /// Backoff before attempt `attempt + 1`, or `None` to give up.
    ///
    /// `attempt` is 1-based and counts the attempt that just failed.
    fn retry_delay(&self, err: &DbError, attempt: u32) -> Option<Duration>;
}

/// Never retries.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoRetry;

impl ExecutionStrategy for NoRetry {
    fn retry_delay(&self, _err: &DbError, _attempt: u32) -> Option<Duration> {
        None
    }
}

/// Retries transient failures up to `max_retries` times with linear backoff
/// `base_backoff * attempt`, capped at `max_backoff`.
#[derive(Clone, Debug, Default)]
pub struct RetryingStrategy {
    cfg: RetryCfg,
}

impl RetryingStrategy {
    #[must_use]
    pub const fn new(cfg: RetryCfg) -> Self {
        Self { cfg }
    }

    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let backoff = self.cfg.base_backoff.saturating_mul(attempt);
        backoff.min(self.cfg.max_backoff)
    }
}

impl ExecutionStrategy for RetryingStrategy {
    fn retry_delay(&self, err: &DbError, attempt: u32) -> Option<Duration> {
        if attempt > self.cfg.max_retries || !is_transient(err) {
            return None;
        }
        Some(self.backoff(attempt))
    }
}

// SQLSTATE serialization failure and deadlock. MySQL also reports deadlocks
// as 40001.
const TRANSIENT_SQLSTATES: &[&str] = &["40001", "40P01"];

// Lock wait timeout and deadlock. MySQL reports the first only as HY000, so
// these are matched on the server error number.
#[cfg(feature = "mysql")]
const MYSQL_TRANSIENT_ERRNOS: &[u16] = &[1205, 1213];

// SQLITE_BUSY and SQLITE_LOCKED, compared on the primary (low byte) code.
#[cfg(feature = "sqlite")]
const SQLITE_TRANSIENT_CODES: &[i32] = &[5, 6];

/// Whether `err` is worth retrying from the start of the unit.
#[must_use]
pub fn is_transient(err: &DbError) -> bool {
    match err {
        DbError::Sea(e) => is_transient_sea(e),
        #[cfg(any(feature = "pg", feature = "mysql", feature = "sqlite"))]
        DbError::Sqlx(e) => is_transient_sqlx(e),
        DbError::Timeout(_) => true,
        _ => false,
    }
}

fn is_transient_sea(err: &DbErr) -> bool {
    match err {
        DbErr::ConnectionAcquire(_) | DbErr::Conn(_) => true,
        DbErr::Exec(rt) | DbErr::Query(rt) => is_transient_runtime(rt),
        _ => false,
    }
}

fn is_transient_runtime(err: &RuntimeErr) -> bool {
    #[cfg(any(feature = "pg", feature = "mysql", feature = "sqlite"))]
    if let RuntimeErr::SqlxError(e) = err {
        return is_transient_sqlx(e);
    }
    false
}

#[cfg(any(feature = "pg", feature = "mysql", feature = "sqlite"))]
fn is_transient_sqlx(err: &sea_orm::sqlx::Error) -> bool {
    use sea_orm::sqlx::Error;
    match err {
        Error::Io(_) | Error::PoolTimedOut | Error::WorkerCrashed => true,
        Error::Database(db) => is_transient_database(&**db),
        _ => false,
    }
}

#[cfg(any(feature = "pg", feature = "mysql", feature = "sqlite"))]
fn is_transient_database(db: &dyn sea_orm::sqlx::error::DatabaseError) -> bool {
    #[cfg(feature = "mysql")]
    if let Some(e) = db.try_downcast_ref::<sea_orm::sqlx::mysql::MySqlDatabaseError>() {
        return MYSQL_TRANSIENT_ERRNOS.contains(&e.number())
            || e.code().is_some_and(|code| TRANSIENT_SQLSTATES.contains(&&*code));
    }
    #[cfg(feature = "sqlite")]
    if db
        .try_downcast_ref::<sea_orm::sqlx::sqlite::SqliteError>()
        .is_some()
    {
        return db
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .is_some_and(|code| SQLITE_TRANSIENT_CODES.contains(&(code & 0xff)));
    }
    db.code()
        .is_some_and(|code| TRANSIENT_SQLSTATES.contains(&&*code))
}

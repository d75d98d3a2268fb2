//! Transaction settings for explicit and retried units of work.
//!
//! Kept separate from `SeaORM`'s own `IsolationLevel`/`AccessMode` so callers
//! configure transactions through this crate's API only.

use sea_orm::{AccessMode, DbBackend, IsolationLevel};

/// Transaction isolation level.
///
/// `SQLite` transactions are always serializable; the level is not sent to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TxIsolationLevel {
    ReadUncommitted,
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TxAccessMode {
    ReadOnly,
    #[default]
    ReadWrite,
}

/// Isolation and access mode for one transaction; `None` keeps the server default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxConfig {
    pub isolation: Option<TxIsolationLevel>,
    pub access_mode: Option<TxAccessMode>,
}

impl TxConfig {
    #[must_use]
    pub const fn with_isolation(isolation: TxIsolationLevel) -> Self {
        Self {
            isolation: Some(isolation),
            access_mode: None,
        }
    }

    #[must_use]
    pub const fn read_only() -> Self {
        Self {
            isolation: None,
            access_mode: Some(TxAccessMode::ReadOnly),
        }
    }

    /// Strictest isolation; used by `UnitOfWork::execute_in_transaction`.
    #[must_use]
    pub const fn serializable() -> Self {
        Self::with_isolation(TxIsolationLevel::Serializable)
    }

    /// The settings to hand to `begin_with_config` for `backend`.
    pub(crate) fn for_backend(
        self,
        backend: DbBackend,
    ) -> (Option<IsolationLevel>, Option<AccessMode>) {
        if backend == DbBackend::Sqlite {
            return (None, None);
        }
        (
            self.isolation.map(Into::into),
            self.access_mode.map(Into::into),
        )
    }
}

impl From<TxIsolationLevel> for IsolationLevel {
    fn from(level: TxIsolationLevel) -> Self {
        match level {
            TxIsolationLevel::ReadUncommitted => IsolationLevel::ReadUncommitted,
            TxIsolationLevel::ReadCommitted => IsolationLevel::ReadCommitted,
            TxIsolationLevel::RepeatableRead => IsolationLevel::RepeatableRead,
            TxIsolationLevel::Serializable => IsolationLevel::Serializable,
        }
    }
}

impl From<TxAccessMode> for AccessMode {
    fn from(mode: TxAccessMode) -> Self {
        match mode {
            TxAccessMode::ReadOnly => AccessMode::ReadOnly,
            TxAccessMode::ReadWrite => AccessMode::ReadWrite,
        }
    }
}

//! Unit of work: owns one connection and at most one open transaction, hands
//! out cached repositories and keeps the change set staged by their writes.
//!
//! Writes go through [`Repository`] and are only sent to the database by
//! [`UnitOfWork::save_changes`], [`UnitOfWork::commit`] or one of the retry
//! wrappers. [`UnitOfWork::rollback`] discards them.
//!
//! ```ignore
//! let mut uow = UnitOfWork::connect(&cfg).await?;
//! let outcome = uow
//!     .execute_with_retry("orders.place", |uow| {
//!         let order = order.clone();
//!         Box::pin(async move {
//!             uow.repository::<orders::Entity>()?.insert(order)?;
//!             Ok(())
//!         })
//!     })
//!     .await;
//! if let Some(failure) = outcome.failure() {
//!     // already rolled back and logged
//! }
//! uow.dispose().await;
//! ```

pub mod outcome;
pub mod runner;
pub mod strategy;
pub mod tx_config;

pub use outcome::{Failure, Outcome};
pub use runner::Runner;
pub use strategy::{ExecutionStrategy, NoRetry, RetryingStrategy, is_transient};
pub use tx_config::{TxAccessMode, TxConfig, TxIsolationLevel};

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use sea_orm::{
    ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbBackend, Statement,
    TransactionTrait,
};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::{RetryCfg, StoreConfig};
use crate::query::{FieldMap, Searchable, field_map_of};
use crate::repository::Repository;
use crate::{DbError, Result};

const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(300);

/// Future returned by a unit-of-work body; it may borrow the unit of work.
pub type UowFuture<'u, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'u>>;

type VerifyFn<'v> = dyn for<'u> FnMut(&'u mut UnitOfWork) -> UowFuture<'u, bool> + Send + 'v;

type Shared = Arc<dyn Any + Send + Sync>;
type Factory = Arc<dyn Fn() -> Shared + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// One staged write.
#[derive(Clone, Debug)]
pub struct PendingChange {
    pub entity: String,
    pub kind: ChangeKind,
    pub stmt: Statement,
}

pub struct UnitOfWork {
    conn: Option<DatabaseConnection>,
    tx: Option<DatabaseTransaction>,
    registry: HashMap<TypeId, Factory>,
    repositories: Mutex<HashMap<TypeId, Shared>>,
    changes: Mutex<Vec<PendingChange>>,
    strategy: Arc<dyn ExecutionStrategy>,
    cancel: CancellationToken,
    command_timeout: Duration,
}

impl fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("disposed", &self.is_disposed())
            .field("in_transaction", &self.tx.is_some())
            .field("pending_changes", &self.pending_changes())
            .field("command_timeout", &self.command_timeout)
            .finish_non_exhaustive()
    }
}

/// Builds a [`UnitOfWork`]; a connection is required.
#[derive(Default)]
#[must_use]
pub struct UnitOfWorkBuilder {
    conn: Option<DatabaseConnection>,
    strategy: Option<Arc<dyn ExecutionStrategy>>,
    registry: HashMap<TypeId, Factory>,
    cancel: Option<CancellationToken>,
    command_timeout: Option<Duration>,
}

impl UnitOfWorkBuilder {
    pub fn connection(mut self, conn: DatabaseConnection) -> Self {
        self.conn = Some(conn);
        self
    }

    pub fn strategy(mut self, strategy: impl ExecutionStrategy + 'static) -> Self {
        self.strategy = Some(Arc::new(strategy));
        self
    }

    /// Shorthand for a [`RetryingStrategy`] with `cfg`.
    pub fn retry(self, cfg: RetryCfg) -> Self {
        self.strategy(RetryingStrategy::new(cfg))
    }

    /// Register `E` with its default field map.
    pub fn register<E: Searchable>(mut self) -> Self {
        self.registry
            .insert(TypeId::of::<E>(), Arc::new(|| field_map_of::<E>() as Shared));
        self
    }

    /// Register `E` with a hand-built field map, e.g. to hide columns from search.
    pub fn register_with<E: Searchable>(mut self, fields: FieldMap<E>) -> Self {
        let fields = Arc::new(fields);
        self.registry.insert(
            TypeId::of::<E>(),
            Arc::new(move || Arc::clone(&fields) as Shared),
        );
        self
    }

    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// # Errors
    /// `DbError::MissingConnection` when no connection was supplied.
    pub fn build(self) -> Result<UnitOfWork> {
        let conn = self.conn.ok_or(DbError::MissingConnection)?;
        Ok(UnitOfWork {
            conn: Some(conn),
            tx: None,
            registry: self.registry,
            repositories: Mutex::new(HashMap::new()),
            changes: Mutex::new(Vec::new()),
            strategy: self
                .strategy
                .unwrap_or_else(|| Arc::new(RetryingStrategy::default())),
            cancel: self.cancel.unwrap_or_default(),
            command_timeout: self.command_timeout.unwrap_or(DEFAULT_COMMAND_TIMEOUT),
        })
    }
}

impl UnitOfWork {
    pub fn builder() -> UnitOfWorkBuilder {
        UnitOfWorkBuilder::default()
    }

    /// Unit of work over `conn` with the default retry policy.
    #[must_use]
    pub fn new(conn: DatabaseConnection) -> Self {
        Self {
            conn: Some(conn),
            tx: None,
            registry: HashMap::new(),
            repositories: Mutex::new(HashMap::new()),
            changes: Mutex::new(Vec::new()),
            strategy: Arc::new(RetryingStrategy::default()),
            cancel: CancellationToken::new(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Open a pool for `cfg` and wrap it with the configured retry policy and
    /// command timeout.
    ///
    /// # Errors
    /// Any error from [`crate::connect`].
    pub async fn connect(cfg: &StoreConfig) -> Result<Self> {
        let conn = crate::options::connect(cfg).await?;
        Self::builder()
            .connection(conn)
            .retry(cfg.retry.clone())
            .command_timeout(cfg.command_timeout)
            .build()
    }

    #[must_use]
    pub const fn is_disposed(&self) -> bool {
        self.conn.is_none()
    }

    #[must_use]
    pub const fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    #[must_use]
    pub const fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    #[must_use]
    pub const fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// The open transaction if there is one, the pooled connection otherwise.
    ///
    /// # Errors
    /// `DbError::Disposed` after [`UnitOfWork::dispose`].
    pub fn runner(&self) -> Result<Runner<'_>> {
        if let Some(tx) = &self.tx {
            return Ok(Runner::Tx(tx));
        }
        self.connection().map(Runner::Conn)
    }

    /// # Errors
    /// `DbError::Disposed` after [`UnitOfWork::dispose`].
    pub fn backend(&self) -> Result<DbBackend> {
        Ok(self.connection()?.get_database_backend())
    }

    fn connection(&self) -> Result<&DatabaseConnection> {
        self.conn.as_ref().ok_or(DbError::Disposed)
    }

    // Run `fut` under the command timeout and the cancellation token.
    pub(crate) async fn bounded<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        let limit = self.command_timeout;
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(DbError::Cancelled),
            res = tokio::time::timeout(limit, fut) => {
                res.unwrap_or(Err(DbError::Timeout(limit)))
            }
        }
    }

    /// Repository for `E`, created on first use and cached until disposal.
    ///
    /// Uses the field map registered on the builder, or `E`'s default one.
    ///
    /// # Errors
    /// `DbError::Disposed` after [`UnitOfWork::dispose`].
    pub fn repository<E: Searchable>(&self) -> Result<Repository<'_, E>> {
        if self.is_disposed() {
            return Err(DbError::Disposed);
        }
        let key = TypeId::of::<E>();
        let mut cache = self.repositories.lock();
        if let Some(hit) = cache.get(&key)
            && let Ok(fields) = Arc::clone(hit).downcast::<FieldMap<E>>()
        {
            return Ok(Repository::new(self, fields));
        }
        let fields = self
            .registry
            .get(&key)
            .and_then(|make| make().downcast::<FieldMap<E>>().ok())
            .unwrap_or_else(field_map_of::<E>);
        cache.insert(key, Arc::clone(&fields) as Shared);
        drop(cache);
        tracing::trace!(entity = std::any::type_name::<E>(), "repository created");
        Ok(Repository::new(self, fields))
    }

    #[must_use]
    pub fn cached_repositories(&self) -> usize {
        self.repositories.lock().len()
    }

    #[must_use]
    pub fn pending_changes(&self) -> usize {
        self.changes.lock().len()
    }

    pub(crate) fn stage(&self, entity: &str, kind: ChangeKind, stmt: Statement) -> Result<()> {
        if self.is_disposed() {
            return Err(DbError::Disposed);
        }
        self.changes.lock().push(PendingChange {
            entity: entity.to_owned(),
            kind,
            stmt,
        });
        Ok(())
    }

    /// Send every staged write to the database and return the affected row count.
    ///
    /// Inside an open transaction the writes join it; otherwise they run in a
    /// transaction of their own. Staged writes are consumed either way.
    ///
    /// # Errors
    /// `DbError::Disposed`, or the first failing statement's error.
    pub async fn save_changes(&self) -> Result<u64> {
        let conn = self.connection()?;
        let pending = std::mem::take(&mut *self.changes.lock());
        if pending.is_empty() {
            return Ok(0);
        }
        if let Some(tx) = &self.tx {
            return flush(tx, &pending).await;
        }
        let txn = conn.begin().await?;
        match flush(&txn, &pending).await {
            Ok(affected) => {
                txn.commit().await?;
                Ok(affected)
            }
            Err(e) => {
                rollback_quietly(txn, "save_changes").await;
                Err(e)
            }
        }
    }

    /// # Errors
    /// `DbError::TransactionAlreadyActive`, `DbError::Disposed`, or the driver error.
    pub async fn begin_transaction(&mut self) -> Result<()> {
        self.begin_transaction_with(TxConfig::default()).await
    }

    /// # Errors
    /// Same as [`UnitOfWork::begin_transaction`].
    pub async fn begin_transaction_with(&mut self, cfg: TxConfig) -> Result<()> {
        if self.tx.is_some() {
            return Err(DbError::TransactionAlreadyActive);
        }
        let conn = self.connection()?;
        let (isolation, access_mode) = cfg.for_backend(conn.get_database_backend());
        let tx = conn.begin_with_config(isolation, access_mode).await?;
        self.tx = Some(tx);
        Ok(())
    }

    /// Flush staged writes into the open transaction and commit it.
    ///
    /// # Errors
    /// `DbError::NoActiveTransaction`, or the failing statement's error after
    /// the transaction was rolled back.
    pub async fn commit(&mut self) -> Result<()> {
        let tx = self.tx.take().ok_or(DbError::NoActiveTransaction)?;
        let pending = std::mem::take(self.changes.get_mut());
        if let Err(e) = flush(&tx, &pending).await {
            rollback_quietly(tx, "commit").await;
            return Err(e);
        }
        tx.commit().await?;
        Ok(())
    }

    /// Roll back the open transaction and discard staged writes.
    ///
    /// # Errors
    /// `DbError::NoActiveTransaction`, or the driver error.
    pub async fn rollback(&mut self) -> Result<()> {
        let tx = self.tx.take().ok_or(DbError::NoActiveTransaction)?;
        self.changes.get_mut().clear();
        tx.rollback().await?;
        Ok(())
    }

    /// Run `op` in a transaction, retrying the whole unit on transient failures.
    ///
    /// Each attempt begins a fresh transaction; a failed attempt is rolled back
    /// before the next one, so retried side effects are never duplicated. The
    /// final failure is logged and reported as [`Outcome::Failed`], never as
    /// an error.
    pub async fn execute_with_retry<T, F>(&mut self, operation: &str, mut op: F) -> Outcome<T>
    where
        T: Send,
        F: for<'u> FnMut(&'u mut UnitOfWork) -> UowFuture<'u, T> + Send,
    {
        self.run_unit(operation, TxConfig::default(), &mut op, None)
            .await
    }

    /// Like [`UnitOfWork::execute_with_retry`] at serializable isolation, with
    /// `verify` run after `op` in the same transaction. A `false` verdict rolls
    /// the unit back.
    pub async fn execute_in_transaction<T, F, V>(
        &mut self,
        operation: &str,
        mut op: F,
        mut verify: V,
    ) -> Outcome<T>
    where
        T: Send,
        F: for<'u> FnMut(&'u mut UnitOfWork) -> UowFuture<'u, T> + Send,
        V: for<'u> FnMut(&'u mut UnitOfWork) -> UowFuture<'u, bool> + Send,
    {
        self.run_unit(
            operation,
            TxConfig::serializable(),
            &mut op,
            Some(&mut verify),
        )
        .await
    }

    async fn run_unit<T, F>(
        &mut self,
        operation: &str,
        cfg: TxConfig,
        op: &mut F,
        mut verify: Option<&mut VerifyFn<'_>>,
    ) -> Outcome<T>
    where
        T: Send,
        F: for<'u> FnMut(&'u mut UnitOfWork) -> UowFuture<'u, T> + Send,
    {
        let span = tracing::info_span!("unit_of_work", operation);
        async move {
            let mut attempt: u32 = 0;
            loop {
                attempt += 1;
                let err = match self
                    .attempt(cfg, op, verify.as_mut().map(|v| &mut **v))
                    .await
                {
                    Ok(value) => {
                        if attempt > 1 {
                            tracing::info!(
                                operation,
                                attempt,
                                "unit of work committed after retries"
                            );
                        }
                        return Outcome::Committed(value);
                    }
                    Err(e) => e,
                };

                let delay = match err {
                    DbError::Cancelled | DbError::Disposed | DbError::TransactionAlreadyActive => {
                        None
                    }
                    _ => self.strategy.retry_delay(&err, attempt),
                };
                let Some(backoff) = delay else {
                    return failed(operation, attempt, &err);
                };

                tracing::warn!(
                    operation,
                    attempt,
                    backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "transient failure, retrying unit of work"
                );
                let cancel = self.cancel.clone();
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        return failed(operation, attempt, &DbError::Cancelled);
                    }
                    () = tokio::time::sleep(backoff) => {}
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn attempt<T, F>(
        &mut self,
        cfg: TxConfig,
        op: &mut F,
        verify: Option<&mut VerifyFn<'_>>,
    ) -> Result<T>
    where
        T: Send,
        F: for<'u> FnMut(&'u mut UnitOfWork) -> UowFuture<'u, T> + Send,
    {
        if self.cancel.is_cancelled() {
            return Err(DbError::Cancelled);
        }
        self.begin_transaction_with(cfg).await?;

        let cancel = self.cancel.clone();
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(DbError::Cancelled),
            res = self.run_body(op, verify) => res,
        };

        let result = match result {
            Ok(value) => self.commit().await.map(|()| value),
            Err(e) => Err(e),
        };
        if result.is_err() {
            self.abandon("attempt").await;
        }
        result
    }

    async fn run_body<T, F>(&mut self, op: &mut F, verify: Option<&mut VerifyFn<'_>>) -> Result<T>
    where
        F: for<'u> FnMut(&'u mut UnitOfWork) -> UowFuture<'u, T> + Send,
    {
        let value = op(&mut *self).await?;
        if let Some(verify) = verify
            && !verify(&mut *self).await?
        {
            return Err(DbError::VerificationFailed);
        }
        Ok(value)
    }

    // Drop staged writes and roll back whatever transaction is still open.
    async fn abandon(&mut self, operation: &str) {
        self.changes.get_mut().clear();
        if let Some(tx) = self.tx.take() {
            rollback_quietly(tx, operation).await;
        }
    }

    /// Roll back any open transaction, drop staged writes and cached
    /// repositories, and close the connection. Safe to call repeatedly.
    pub async fn dispose(&mut self) {
        self.abandon("dispose").await;
        self.repositories.get_mut().clear();
        if let Some(conn) = self.conn.take() {
            if let Err(e) = conn.close().await {
                tracing::warn!(error = %e, "closing connection failed");
            }
            tracing::debug!("unit of work disposed");
        }
    }
}

fn failed<T>(operation: &str, attempts: u32, err: &DbError) -> Outcome<T> {
    tracing::error!(operation, attempt = attempts, error = %err, "unit of work failed");
    Outcome::Failed(Failure {
        operation: operation.to_owned(),
        attempts,
        error: err.to_string(),
    })
}

async fn flush<C: ConnectionTrait>(conn: &C, changes: &[PendingChange]) -> Result<u64> {
    let mut affected = 0;
    for change in changes {
        let res = conn.execute(change.stmt.clone()).await?;
        tracing::trace!(
            entity = %change.entity,
            kind = ?change.kind,
            rows = res.rows_affected(),
            "flushed staged change"
        );
        affected += res.rows_affected();
    }
    Ok(affected)
}

/// Roll back `tx`, logging instead of returning a failure so the caller's
/// original error is the one that surfaces.
pub(crate) async fn rollback_quietly(tx: DatabaseTransaction, operation: &str) {
    if let Err(e) = tx.rollback().await {
        tracing::warn!(operation, error = %e, "rollback failed");
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use sea_orm::{DbErr, RuntimeErr};
    use tracing_test::traced_test;

    mod ent {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "notes")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub id: i64,
            pub body: String,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}

        impl crate::query::Searchable for Entity {}
    }

    async fn uow() -> UnitOfWork {
        let conn = crate::connect(&StoreConfig::default()).await.unwrap();
        conn.execute_unprepared("CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT NOT NULL)")
            .await
            .unwrap();
        UnitOfWork::builder()
            .connection(conn)
            .retry(RetryCfg {
                max_retries: 3,
                base_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(5),
            })
            .build()
            .unwrap()
    }

    fn note(id: i64) -> ent::Model {
        ent::Model {
            id,
            body: format!("note {id}"),
        }
    }

    #[test]
    fn build_without_connection_fails() {
        let err = UnitOfWork::builder().build().unwrap_err();
        assert!(matches!(err, DbError::MissingConnection));
    }

    #[tokio::test]
    async fn repositories_are_cached_per_entity() {
        let uow = uow().await;
        assert_eq!(uow.cached_repositories(), 0);
        let first = uow.repository::<ent::Entity>().unwrap();
        let second = uow.repository::<ent::Entity>().unwrap();
        assert!(Arc::ptr_eq(first.fields(), second.fields()));
        assert_eq!(uow.cached_repositories(), 1);
    }

    #[tokio::test]
    async fn registered_field_map_is_used() {
        let conn = crate::connect(&StoreConfig::default()).await.unwrap();
        let uow = UnitOfWork::builder()
            .connection(conn)
            .register_with::<ent::Entity>(FieldMap::resolve().remove("body"))
            .build()
            .unwrap();
        let repo = uow.repository::<ent::Entity>().unwrap();
        assert!(repo.fields().get("body").is_none());
        assert!(repo.fields().get("id").is_some());
    }

    #[tokio::test]
    async fn commit_and_rollback_require_transaction() {
        let mut uow = uow().await;
        assert!(matches!(uow.commit().await, Err(DbError::NoActiveTransaction)));
        assert!(matches!(uow.rollback().await, Err(DbError::NoActiveTransaction)));

        uow.begin_transaction().await.unwrap();
        assert!(matches!(
            uow.begin_transaction().await,
            Err(DbError::TransactionAlreadyActive)
        ));
        uow.rollback().await.unwrap();
        assert!(!uow.in_transaction());
    }

    #[tokio::test]
    async fn writes_wait_for_save_changes() {
        let uow = uow().await;
        let repo = uow.repository::<ent::Entity>().unwrap();
        repo.insert(note(1)).unwrap();
        repo.insert(note(2)).unwrap();
        assert_eq!(uow.pending_changes(), 2);
        assert_eq!(repo.count(None).await.unwrap(), 0);

        assert_eq!(uow.save_changes().await.unwrap(), 2);
        assert_eq!(uow.pending_changes(), 0);
        assert_eq!(repo.count(None).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn rollback_discards_staged_writes() {
        let mut uow = uow().await;
        uow.begin_transaction().await.unwrap();
        uow.repository::<ent::Entity>()
            .unwrap()
            .insert(note(1))
            .unwrap();
        uow.rollback().await.unwrap();
        assert_eq!(uow.pending_changes(), 0);

        uow.begin_transaction().await.unwrap();
        uow.repository::<ent::Entity>()
            .unwrap()
            .insert(note(2))
            .unwrap();
        uow.commit().await.unwrap();
        let repo = uow.repository::<ent::Entity>().unwrap();
        assert!(repo.find(1).await.unwrap().is_none());
        assert!(repo.find(2).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn transient_failures_are_retried_without_duplicates() {
        let mut uow = uow().await;
        let mut calls = 0_u32;
        let outcome = uow
            .execute_with_retry("notes.create", |uow| {
                calls += 1;
                let attempt = calls;
                Box::pin(async move {
                    uow.repository::<ent::Entity>()?.insert(note(7))?;
                    if attempt < 3 {
                        let reset = RuntimeErr::Internal("connection reset".to_owned());
                        return Err(DbError::Sea(DbErr::Conn(reset)));
                    }
                    Ok(attempt)
                })
            })
            .await;
        assert_eq!(outcome, Outcome::Committed(3));
        let repo = uow.repository::<ent::Entity>().unwrap();
        assert_eq!(repo.count(None).await.unwrap(), 1);
    }

    #[traced_test]
    #[tokio::test]
    async fn permanent_failure_is_logged_not_raised() {
        let mut uow = uow().await;
        let mut calls = 0_u32;
        let outcome: Outcome<()> = uow
            .execute_with_retry("notes.broken", |uow| {
                calls += 1;
                Box::pin(async move {
                    uow.repository::<ent::Entity>()?.insert(note(1))?;
                    Err(DbError::Sea(DbErr::Custom("constraint violated".to_owned())))
                })
            })
            .await;
        assert_eq!(calls, 1);
        let failure = outcome.failure().unwrap();
        assert_eq!(failure.operation, "notes.broken");
        assert_eq!(failure.attempts, 1);
        assert!(failure.error.contains("constraint violated"));
        assert!(logs_contain("unit of work failed"));
        assert!(!uow.in_transaction());
        assert_eq!(uow.pending_changes(), 0);
        let repo = uow.repository::<ent::Entity>().unwrap();
        assert_eq!(repo.count(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn rejected_verification_rolls_back() {
        let mut uow = uow().await;
        let outcome = uow
            .execute_in_transaction(
                "notes.verify",
                |uow| {
                    Box::pin(async move {
                        uow.repository::<ent::Entity>()?.insert(note(1))?;
                        Ok::<_, DbError>(())
                    })
                },
                |uow| {
                    Box::pin(async move {
                        uow.save_changes().await?;
                        let n = uow.repository::<ent::Entity>()?.count(None).await?;
                        Ok::<_, DbError>(n > 1)
                    })
                },
            )
            .await;
        assert_eq!(
            outcome.failure().map(|f| f.error.as_str()),
            Some("verification rejected the unit of work")
        );
        let repo = uow.repository::<ent::Entity>().unwrap();
        assert_eq!(repo.count(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn accepted_verification_commits() {
        let mut uow = uow().await;
        let outcome = uow
            .execute_in_transaction(
                "notes.verify",
                |uow| {
                    Box::pin(async move {
                        uow.repository::<ent::Entity>()?.insert(note(1))?;
                        Ok::<_, DbError>(1)
                    })
                },
                |uow| {
                    Box::pin(async move {
                        uow.save_changes().await?;
                        uow.repository::<ent::Entity>()?.exists(None).await
                    })
                },
            )
            .await;
        assert!(outcome.is_committed());
        let repo = uow.repository::<ent::Entity>().unwrap();
        assert!(repo.find(1).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn cancelled_unit_reports_failure() {
        let mut uow = uow().await;
        uow.cancellation_token().cancel();
        let outcome = uow
            .execute_with_retry("notes.cancelled", |_uow| {
                Box::pin(async { Ok::<_, DbError>(()) })
            })
            .await;
        assert_eq!(
            outcome.failure().map(|f| f.error.as_str()),
            Some("operation cancelled")
        );
    }

    #[tokio::test]
    async fn dispose_twice_is_harmless() {
        let mut uow = uow().await;
        uow.repository::<ent::Entity>().unwrap();
        uow.begin_transaction().await.unwrap();

        uow.dispose().await;
        assert!(uow.is_disposed());
        assert_eq!(uow.cached_repositories(), 0);

        uow.dispose().await;
        assert_eq!(uow.cached_repositories(), 0);
        assert!(matches!(uow.repository::<ent::Entity>(), Err(DbError::Disposed)));
        assert!(matches!(uow.runner(), Err(DbError::Disposed)));
    }
}

//! Raw SQL escape hatch, bounded by the unit of work's command timeout and
//! cancellation token.

use sea_orm::{ConnectionTrait, FromQueryResult, Statement, TransactionTrait, Value};

use crate::Result;
use crate::query::Searchable;
use crate::repository::Repository;
use crate::uow::{Runner, rollback_quietly};

impl<E: Searchable> Repository<'_, E> {
    /// Execute a parameterised statement and return the affected row count.
    ///
    /// Blank `sql` is a no-op. Outside a unit-of-work transaction the
    /// statement runs in a transaction of its own that is rolled back on
    /// failure.
    ///
    /// # Errors
    /// `DbError::Timeout` or `DbError::Cancelled` when the command is cut
    /// short, `DbError::Sea` when the statement fails.
    pub async fn execute_sql(
        &self,
        sql: &str,
        values: impl IntoIterator<Item = Value>,
    ) -> Result<u64> {
        if sql.trim().is_empty() {
            return Ok(0);
        }
        let uow = self.unit_of_work();
        let runner = uow.runner()?;
        let stmt = Statement::from_sql_and_values(runner.get_database_backend(), sql, values);
        uow.bounded(async move {
            match runner {
                Runner::Tx(tx) => Ok(tx.execute(stmt).await?.rows_affected()),
                Runner::Conn(conn) => {
                    let txn = conn.begin().await?;
                    match txn.execute(stmt).await {
                        Ok(res) => {
                            txn.commit().await?;
                            Ok(res.rows_affected())
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "raw statement failed");
                            rollback_quietly(txn, "execute_sql").await;
                            Err(e.into())
                        }
                    }
                }
            }
        })
        .await
    }

    /// Run a parameterised query and map each row to `T`.
    ///
    /// # Errors
    /// `DbError::Timeout` or `DbError::Cancelled` when the command is cut
    /// short, `DbError::Sea` when the query fails or a row does not map.
    pub async fn query_sql<T: FromQueryResult>(
        &self,
        sql: &str,
        values: impl IntoIterator<Item = Value>,
    ) -> Result<Vec<T>> {
        let uow = self.unit_of_work();
        let runner = uow.runner()?;
        let stmt = Statement::from_sql_and_values(runner.get_database_backend(), sql, values);
        uow.bounded(async move { Ok(T::find_by_statement(stmt).all(&runner).await?) })
            .await
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::time::Duration;

    use sea_orm::{ConnectionTrait, FromQueryResult};
    use tokio_util::sync::CancellationToken;

    use crate::{DbError, StoreConfig, UnitOfWork};

    mod ent {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "tags")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub id: i64,
            pub label: String,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}

        impl crate::query::Searchable for Entity {}
    }

    #[derive(Debug, FromQueryResult)]
    struct Label {
        label: String,
    }

    async fn uow_with(cancel: CancellationToken) -> UnitOfWork {
        let conn = crate::connect(&StoreConfig::default()).await.unwrap();
        conn.execute_unprepared("CREATE TABLE tags (id INTEGER PRIMARY KEY, label TEXT NOT NULL)")
            .await
            .unwrap();
        UnitOfWork::builder()
            .connection(conn)
            .cancellation(cancel)
            .command_timeout(Duration::from_secs(5))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn blank_statement_is_a_no_op() {
        let uow = uow_with(CancellationToken::new()).await;
        let repo = uow.repository::<ent::Entity>().unwrap();
        assert_eq!(repo.execute_sql("   ", []).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn execute_and_query_with_parameters() {
        let uow = uow_with(CancellationToken::new()).await;
        let repo = uow.repository::<ent::Entity>().unwrap();
        let n = repo
            .execute_sql(
                "INSERT INTO tags (id, label) VALUES (?, ?), (?, ?)",
                [1_i64.into(), "red".into(), 2_i64.into(), "blue".into()],
            )
            .await
            .unwrap();
        assert_eq!(n, 2);

        let rows: Vec<Label> = repo
            .query_sql("SELECT label FROM tags WHERE id > ? ORDER BY id", [0_i64.into()])
            .await
            .unwrap();
        let labels: Vec<_> = rows.into_iter().map(|r| r.label).collect();
        assert_eq!(labels, ["red", "blue"]);
    }

    #[tokio::test]
    async fn failed_statement_leaves_no_rows() {
        let uow = uow_with(CancellationToken::new()).await;
        let repo = uow.repository::<ent::Entity>().unwrap();
        let err = repo
            .execute_sql("INSERT INTO tags (id, label) VALUES (1, 'a'), (1, 'b')", [])
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Sea(_)));
        assert_eq!(repo.count(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn cancelled_token_stops_the_command() {
        let cancel = CancellationToken::new();
        let uow = uow_with(cancel.clone()).await;
        let repo = uow.repository::<ent::Entity>().unwrap();
        cancel.cancel();
        let err = repo.execute_sql("DELETE FROM tags", []).await.unwrap_err();
        assert!(matches!(err, DbError::Cancelled));
    }
}

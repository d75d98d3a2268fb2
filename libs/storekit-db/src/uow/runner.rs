//! The executor repositories run on: the pooled connection, or the open
//! transaction when the unit of work has one.

use sea_orm::{
    ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbBackend, DbErr, ExecResult,
    QueryResult, Statement,
};

#[derive(Clone, Copy)]
pub enum Runner<'a> {
    Conn(&'a DatabaseConnection),
    Tx(&'a DatabaseTransaction),
}

impl std::fmt::Debug for Runner<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Conn(_) => f.write_str("Runner::Conn"),
            Self::Tx(_) => f.write_str("Runner::Tx"),
        }
    }
}

impl Runner<'_> {
    #[must_use]
    pub const fn in_transaction(&self) -> bool {
        matches!(self, Self::Tx(_))
    }
}

#[async_trait::async_trait]
impl ConnectionTrait for Runner<'_> {
    fn get_database_backend(&self) -> DbBackend {
        match self {
            Self::Conn(c) => c.get_database_backend(),
            Self::Tx(t) => t.get_database_backend(),
        }
    }

    async fn execute(&self, stmt: Statement) -> Result<ExecResult, DbErr> {
        match self {
            Self::Conn(c) => c.execute(stmt).await,
            Self::Tx(t) => t.execute(stmt).await,
        }
    }

    async fn execute_unprepared(&self, sql: &str) -> Result<ExecResult, DbErr> {
        match self {
            Self::Conn(c) => c.execute_unprepared(sql).await,
            Self::Tx(t) => t.execute_unprepared(sql).await,
        }
    }

    async fn query_one(&self, stmt: Statement) -> Result<Option<QueryResult>, DbErr> {
        match self {
            Self::Conn(c) => c.query_one(stmt).await,
            Self::Tx(t) => t.query_one(stmt).await,
        }
    }

    async fn query_all(&self, stmt: Statement) -> Result<Vec<QueryResult>, DbErr> {
        match self {
            Self::Conn(c) => c.query_all(stmt).await,
            Self::Tx(t) => t.query_all(stmt).await,
        }
    }

    fn support_returning(&self) -> bool {
        match self {
            Self::Conn(c) => c.support_returning(),
            Self::Tx(t) => t.support_returning(),
        }
    }
}

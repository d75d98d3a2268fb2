//! Stored procedure calls with input parameters and typed output values.
//!
//! `MySQL` binds outputs to session variables that are read back on the same
//! connection; Postgres returns them as the row of `CALL`. `SQLite` has no
//! stored procedures.

use std::collections::HashMap;

use sea_orm::{
    ConnectionTrait, DatabaseTransaction, DbBackend, DbErr, FromQueryResult, QueryResult,
    Statement, TransactionTrait, Value,
};

use crate::query::Searchable;
use crate::repository::Repository;
use crate::uow::{Runner, rollback_quietly};
use crate::{DbError, Result};

/// SQL type of a procedure output parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputType {
    Int,
    BigInt,
    Decimal,
    Double,
    Text,
    Bool,
    DateTime,
    Uuid,
}

impl OutputType {
    /// Type name used to cast the `NULL` placeholder on Postgres.
    #[must_use]
    pub const fn pg_type(self) -> &'static str {
        match self {
            Self::Int => "integer",
            Self::BigInt => "bigint",
            Self::Decimal => "numeric",
            Self::Double => "double precision",
            Self::Text => "text",
            Self::Bool => "boolean",
            Self::DateTime => "timestamp",
            Self::Uuid => "uuid",
        }
    }

    fn read(self, row: &QueryResult, col: &str) -> std::result::Result<Value, DbErr> {
        Ok(match self {
            Self::Int => row.try_get::<Option<i32>>("", col)?.into(),
            Self::BigInt => row.try_get::<Option<i64>>("", col)?.into(),
            Self::Decimal => row.try_get::<Option<rust_decimal::Decimal>>("", col)?.into(),
            Self::Double => row.try_get::<Option<f64>>("", col)?.into(),
            Self::Text => row.try_get::<Option<String>>("", col)?.into(),
            Self::Bool => row.try_get::<Option<bool>>("", col)?.into(),
            Self::DateTime => row.try_get::<Option<chrono::NaiveDateTime>>("", col)?.into(),
            Self::Uuid => row.try_get::<Option<uuid::Uuid>>("", col)?.into(),
        })
    }
}

/// A procedure name with its ordered inputs and named outputs.
#[derive(Clone, Debug, Default)]
#[must_use]
pub struct ProcedureCall {
    name: String,
    inputs: Vec<Value>,
    outputs: Vec<(String, OutputType)>,
}

impl ProcedureCall {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn input(mut self, value: impl Into<Value>) -> Self {
        self.inputs.push(value.into());
        self
    }

    pub fn output(mut self, name: impl Into<String>, ty: OutputType) -> Self {
        self.outputs.push((name.into(), ty));
        self
    }

    fn check(&self) -> Result<()> {
        if !is_identifier(&self.name, true) {
            return Err(DbError::InvalidIdentifier(self.name.clone()));
        }
        if let Some((bad, _)) = self.outputs.iter().find(|(n, _)| !is_identifier(n, false)) {
            return Err(DbError::InvalidIdentifier(bad.clone()));
        }
        Ok(())
    }

    /// Statement that invokes the procedure, plus the one reading outputs back
    /// when the backend needs a second round trip.
    fn statements(&self, backend: DbBackend) -> Result<(Statement, Option<Statement>)> {
        self.check()?;
        match backend {
            DbBackend::MySql => {
                let mut args = vec!["?".to_owned(); self.inputs.len()];
                args.extend(self.outputs.iter().map(|(n, _)| format!("@{n}")));
                let call = Statement::from_sql_and_values(
                    backend,
                    format!("CALL {}({})", self.name, args.join(", ")),
                    self.inputs.clone(),
                );
                let read = (!self.outputs.is_empty()).then(|| {
                    let cols: Vec<String> =
                        self.outputs.iter().map(|(n, _)| format!("@{n} AS {n}")).collect();
                    Statement::from_string(backend, format!("SELECT {}", cols.join(", ")))
                });
                Ok((call, read))
            }
            DbBackend::Postgres => {
                let mut args: Vec<String> =
                    (1..=self.inputs.len()).map(|i| format!("${i}")).collect();
                let sql = if self.outputs.is_empty() {
                    format!("SELECT * FROM {}({})", self.name, args.join(", "))
                } else {
                    args.extend(
                        self.outputs
                            .iter()
                            .map(|(_, ty)| format!("NULL::{}", ty.pg_type())),
                    );
                    format!("CALL {}({})", self.name, args.join(", "))
                };
                Ok((
                    Statement::from_sql_and_values(backend, sql, self.inputs.clone()),
                    None,
                ))
            }
            DbBackend::Sqlite => Err(DbError::Unsupported("stored procedures on SQLite")),
        }
    }
}

/// Rows returned by a procedure and its output values by name.
#[derive(Clone, Debug, PartialEq)]
pub struct ProcedureResult<T> {
    pub rows: Vec<T>,
    pub outputs: HashMap<String, Value>,
}

impl<T> ProcedureResult<T> {
    #[must_use]
    pub fn output(&self, name: &str) -> Option<&Value> {
        self.outputs.get(name)
    }
}

fn is_identifier(name: &str, qualified: bool) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || (qualified && c == '.'))
}

impl<E: Searchable> Repository<'_, E> {
    /// Call a stored procedure on one pinned connection.
    ///
    /// Result rows map to `T`; output parameters are returned by name. Inside
    /// a unit-of-work transaction the call joins it; otherwise it gets a
    /// transaction of its own.
    ///
    /// # Errors
    /// `DbError::InvalidIdentifier` for a malformed procedure or output name,
    /// `DbError::Unsupported` on `SQLite`, `DbError::Timeout`/`DbError::Cancelled`
    /// when cut short, `DbError::Sea` when the call fails.
    pub async fn call_procedure<T: FromQueryResult>(
        &self,
        call: &ProcedureCall,
    ) -> Result<ProcedureResult<T>> {
        let uow = self.unit_of_work();
        let runner = uow.runner()?;
        let (invoke, read_back) = call.statements(runner.get_database_backend())?;
        tracing::debug!(procedure = %call.name, "calling stored procedure");
        uow.bounded(async move {
            match runner {
                Runner::Tx(tx) => run(tx, call, invoke, read_back).await,
                Runner::Conn(conn) => {
                    let txn = conn.begin().await?;
                    match run(&txn, call, invoke, read_back).await {
                        Ok(res) => {
                            txn.commit().await?;
                            Ok(res)
                        }
                        Err(e) => {
                            rollback_quietly(txn, "call_procedure").await;
                            Err(e)
                        }
                    }
                }
            }
        })
        .await
    }
}

async fn run<T: FromQueryResult>(
    tx: &DatabaseTransaction,
    call: &ProcedureCall,
    invoke: Statement,
    read_back: Option<Statement>,
) -> Result<ProcedureResult<T>> {
    let rows = tx.query_all(invoke).await?;
    let (rows, out_row) = match read_back {
        Some(stmt) => (rows, tx.query_one(stmt).await?),
        None if call.outputs.is_empty() => (rows, None),
        // Postgres: the outputs are the row `CALL` returns
        None => (Vec::new(), rows.into_iter().next()),
    };

    let outputs = match &out_row {
        Some(row) => call
            .outputs
            .iter()
            .map(|(name, ty)| Ok((name.clone(), ty.read(row, name)?)))
            .collect::<std::result::Result<HashMap<_, _>, DbErr>>()?,
        None => HashMap::new(),
    };
    let rows = rows
        .iter()
        .map(|r| T::from_query_result(r, ""))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ProcedureResult { rows, outputs })
}

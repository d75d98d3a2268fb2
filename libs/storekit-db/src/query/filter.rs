//! Filter clauses → `sea_orm::Condition`.
//!
//! Each [`FilterColumn`] is checked against the entity's [`FieldMap`] and the
//! operator table, its value parsed for the field kind, and the comparison
//! built with bound parameters. Clauses are conjoined.
//!
//! Two entry points share the compiler: [`FilterExt::apply_filters`] drops
//! clauses that fail to compile, [`FilterExt::try_apply_filters`] reports them.

use sea_orm::sea_query::{BinOper, Expr, Func, SimpleExpr};
use sea_orm::{
    ColumnTrait, Condition, DbBackend, EntityTrait, IdenStatic, QueryFilter, Select, Value,
};
use thiserror::Error;

use crate::query::validate::{ValidationErrors, ValidationFailure};
use crate::query::value::{FilterValue, parse_value};
use crate::query::{Field, FieldKind, FieldMap, FilterColumn, OperatorKind, is_operator_allowed};

/// Why a single filter clause could not be compiled.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FilterError {
    #[error("unknown field: {0}")]
    UnknownField(String),

    #[error("operator {op} is not allowed for field '{field}' of kind {kind}")]
    OperatorNotAllowed {
        field: String,
        op: OperatorKind,
        kind: FieldKind,
    },

    #[error("missing value for field '{0}'")]
    MissingValue(String),

    #[error("value '{value}' is not a valid {kind} for field '{field}'")]
    InvalidValue {
        field: String,
        value: String,
        kind: FieldKind,
    },
}

/* ---------- LIKE helpers ---------- */

fn like_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '%' | '_' | '\\' => {
                out.push('\\');
                out.push(ch);
            }
            c => out.push(c),
        }
    }
    out
}

fn like_pattern(op: OperatorKind, s: &str) -> String {
    let escaped = like_escape(s);
    match op {
        OperatorKind::StartsWith => format!("{escaped}%"),
        OperatorKind::EndsWith => format!("%{escaped}"),
        _ => format!("%{escaped}%"),
    }
}

/* ---------- comparisons ---------- */

fn column_expr<E: EntityTrait>(col: E::Column) -> Expr {
    Expr::col((E::default(), col))
}

/// Case-insensitive string comparison. Both sides go through the backend's
/// `LOWER` so they fold identically; the LIKE pattern is escaped before folding.
fn text_comparison<E: EntityTrait>(col: E::Column, op: OperatorKind, text: &str) -> SimpleExpr {
    let lowered = Expr::expr(Func::lower(column_expr::<E>(col)));
    match op {
        OperatorKind::Contains | OperatorKind::StartsWith | OperatorKind::EndsWith => {
            let pattern = Expr::expr(Func::lower(Expr::val(like_pattern(op, text))))
                .binary(BinOper::Escape, SimpleExpr::Constant('\\'.into()));
            lowered.binary(BinOper::Like, pattern)
        }
        _ => lowered.eq(Func::lower(Expr::val(text))),
    }
}

fn relational<C: ColumnTrait>(col: C, op: OperatorKind, value: Value) -> SimpleExpr {
    match op {
        OperatorKind::GreaterThan => col.gt(value),
        OperatorKind::GreaterThanOrEqual => col.gte(value),
        OperatorKind::LessThan => col.lt(value),
        _ => col.lte(value),
    }
}

fn quote_ident(backend: DbBackend, ident: &str) -> String {
    let q = if backend == DbBackend::MySql { '`' } else { '"' };
    let doubled = format!("{q}{q}");
    format!("{q}{}{q}", ident.replace(q, &doubled))
}

fn value_to_text(v: Value) -> Value {
    match v {
        Value::Uuid(Some(u)) => Value::from(u.to_string()),
        other => other,
    }
}

fn value_to_json(v: &Value) -> serde_json::Value {
    match v {
        Value::BigInt(Some(n)) => serde_json::Value::from(*n),
        Value::Int(Some(n)) => serde_json::Value::from(*n),
        Value::Double(Some(f)) => serde_json::Value::from(*f),
        Value::Bool(Some(b)) => serde_json::Value::from(*b),
        Value::String(Some(s)) => serde_json::Value::from(s.as_str()),
        Value::Uuid(Some(u)) => serde_json::Value::from(u.to_string()),
        _ => serde_json::Value::Null,
    }
}

fn text_of(v: Value) -> Value {
    match v {
        Value::BigInt(Some(n)) => Value::from(n.to_string()),
        Value::Int(Some(n)) => Value::from(n.to_string()),
        Value::Double(Some(f)) => Value::from(f.to_string()),
        other => value_to_text(other),
    }
}

/// `true` when the JSON array in `col` shares at least one element with `values`.
fn list_overlap<E: EntityTrait>(
    backend: DbBackend,
    col: E::Column,
    values: Vec<Value>,
) -> SimpleExpr {
    if values.is_empty() {
        return Expr::cust("1=0");
    }
    let column = format!(
        "{}.{}",
        quote_ident(backend, E::default().table_name()),
        quote_ident(backend, col.as_str())
    );
    let marks = vec!["?"; values.len()].join(", ");
    match backend {
        DbBackend::Sqlite => Expr::cust_with_values(
            format!("EXISTS (SELECT 1 FROM json_each({column}) WHERE json_each.value IN ({marks}))"),
            values.into_iter().map(value_to_text),
        ),
        DbBackend::Postgres => Expr::cust_with_values(
            format!(
                "EXISTS (SELECT 1 FROM jsonb_array_elements_text(CAST({column} AS jsonb)) AS elem(v) \
                 WHERE elem.v IN ({marks}))"
            ),
            values.into_iter().map(text_of),
        ),
        DbBackend::MySql => {
            let wanted = serde_json::Value::Array(values.iter().map(value_to_json).collect());
            Expr::cust_with_values(
                format!("JSON_OVERLAPS({column}, CAST(? AS JSON))"),
                [wanted.to_string()],
            )
        }
    }
}

/// Resolve the field of one clause and parse its value.
///
/// Returns `Ok(None)` for dotted field paths: related-entity filters are left
/// to the caller's include hook.
///
/// # Errors
/// Returns `FilterError` for an unknown field, an operator the field kind
/// does not accept, or a value that does not parse.
pub fn check_clause<'m, E: EntityTrait>(
    clause: &FilterColumn,
    fmap: &'m FieldMap<E>,
) -> Result<Option<(&'m Field<E>, FilterValue)>, FilterError> {
    if clause.field_name.contains('.') {
        return Ok(None);
    }
    let field = fmap
        .get(&clause.field_name)
        .ok_or_else(|| FilterError::UnknownField(clause.field_name.clone()))?;
    let op = clause.operator;
    if !is_operator_allowed(field.kind, op) {
        return Err(FilterError::OperatorNotAllowed {
            field: clause.field_name.clone(),
            op,
            kind: field.kind,
        });
    }
    let value = parse_value(field, op, &clause.value)?;
    Ok(Some((field, value)))
}

/// Compile one clause into a condition.
///
/// # Errors
/// Same as [`check_clause`].
pub fn build_condition<E: EntityTrait>(
    clause: &FilterColumn,
    fmap: &FieldMap<E>,
    backend: DbBackend,
) -> Result<Option<Condition>, FilterError> {
    let Some((field, value)) = check_clause(clause, fmap)? else {
        return Ok(None);
    };
    let op = clause.operator;
    let col = field.col;
    let cond = match value {
        FilterValue::Text(text) => Condition::all().add(text_comparison::<E>(col, op, &text)),
        FilterValue::Scalar(v) if op.is_relational() => Condition::all()
            .add(col.is_not_null())
            .add(relational(col, op, v)),
        FilterValue::Scalar(v) => Condition::all().add(col.eq(v)),
        FilterValue::List(values) if field.kind.is_list() => {
            Condition::all().add(list_overlap::<E>(backend, col, values))
        }
        FilterValue::List(values) if values.is_empty() => Condition::all().add(Expr::cust("1=0")),
        FilterValue::List(values) => Condition::all().add(col.is_in(values)),
    };
    Ok(Some(cond))
}

/// Conjoin the clauses that compile; failing clauses are dropped.
pub fn compile_lenient<E: EntityTrait>(
    filters: &[FilterColumn],
    fmap: &FieldMap<E>,
    backend: DbBackend,
) -> Condition {
    filters
        .iter()
        .filter_map(|clause| match build_condition(clause, fmap, backend) {
            Ok(cond) => cond,
            Err(e) => {
                tracing::debug!(field = %clause.field_name, error = %e, "dropping filter clause");
                None
            }
        })
        .fold(Condition::all(), Condition::add)
}

/// Conjoin all clauses or report every one that fails.
///
/// # Errors
/// Returns `ValidationErrors` listing each offending clause.
pub fn compile_strict<E: EntityTrait>(
    filters: &[FilterColumn],
    fmap: &FieldMap<E>,
    backend: DbBackend,
) -> Result<Condition, ValidationErrors> {
    let mut cond = Condition::all();
    let mut failures = Vec::new();
    for (i, clause) in filters.iter().enumerate() {
        match build_condition(clause, fmap, backend) {
            Ok(Some(c)) => cond = cond.add(c),
            Ok(None) => {}
            Err(e) => failures.push(ValidationFailure::for_filter(i, &e)),
        }
    }
    if failures.is_empty() {
        Ok(cond)
    } else {
        Err(ValidationErrors::new(failures))
    }
}

/// Apply [`FilterColumn`]s to a plain `SeaORM` `Select<E>`.
pub trait FilterExt<E: EntityTrait>: Sized {
    /// Apply every clause that compiles; the rest are skipped.
    #[must_use]
    fn apply_filters(
        self,
        filters: &[FilterColumn],
        fmap: &FieldMap<E>,
        backend: DbBackend,
    ) -> Self;

    /// Apply all clauses or none.
    ///
    /// # Errors
    /// Returns `ValidationErrors` if any clause fails to compile.
    fn try_apply_filters(
        self,
        filters: &[FilterColumn],
        fmap: &FieldMap<E>,
        backend: DbBackend,
    ) -> Result<Self, ValidationErrors>;
}

impl<E: EntityTrait> FilterExt<E> for Select<E> {
    fn apply_filters(
        self,
        filters: &[FilterColumn],
        fmap: &FieldMap<E>,
        backend: DbBackend,
    ) -> Self {
        if filters.is_empty() {
            return self;
        }
        self.filter(compile_lenient(filters, fmap, backend))
    }

    fn try_apply_filters(
        self,
        filters: &[FilterColumn],
        fmap: &FieldMap<E>,
        backend: DbBackend,
    ) -> Result<Self, ValidationErrors> {
        if filters.is_empty() {
            return Ok(self);
        }
        Ok(self.filter(compile_strict(filters, fmap, backend)?))
    }
}

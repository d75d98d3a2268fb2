//! Textual filter values → typed `SeaORM` values.
//!
//! Scalars use culture-invariant parsing (`FromStr`, ISO-8601). Lists and enum
//! values may be given as JSON; a bare scalar where a list is expected is a
//! one-element list.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{EntityTrait, Value};

use crate::query::{Field, FieldKind, FilterError, OperatorKind};

/// A parsed filter value, shaped for the comparison it feeds.
#[derive(Clone, Debug, PartialEq)]
pub enum FilterValue {
    /// Raw text for string comparisons.
    Text(String),
    Scalar(Value),
    List(Vec<Value>),
}

/// Parse `raw` for `op` against `field`.
///
/// `Contains` on a non-string field, and every operator on a list field,
/// yields [`FilterValue::List`].
///
/// # Errors
/// `FilterError::MissingValue` for blank input, `FilterError::InvalidValue`
/// when the text does not parse as the field kind.
pub fn parse_value<E: EntityTrait>(
    field: &Field<E>,
    op: OperatorKind,
    raw: &str,
) -> Result<FilterValue, FilterError> {
    if raw.trim().is_empty() {
        return Err(FilterError::MissingValue(field.name.clone()));
    }
    let invalid = || FilterError::InvalidValue {
        field: field.name.clone(),
        value: raw.to_owned(),
        kind: field.kind,
    };
    let variants = field.variants.as_deref();

    if field.kind.is_list() || (op == OperatorKind::Contains && field.kind != FieldKind::String)
    {
        return parse_list(field.kind.element(), variants, raw)
            .map(FilterValue::List)
            .ok_or_else(invalid);
    }
    match field.kind {
        FieldKind::String => Ok(FilterValue::Text(raw.to_owned())),
        kind => parse_scalar(kind, variants, raw)
            .map(FilterValue::Scalar)
            .ok_or_else(invalid),
    }
}

pub(crate) fn parse_list(
    elem: FieldKind,
    variants: Option<&[Value]>,
    raw: &str,
) -> Option<Vec<Value>> {
    let s = raw.trim();
    if !s.starts_with('[') {
        return parse_scalar(elem, variants, s).map(|v| vec![v]);
    }
    let items: Vec<serde_json::Value> = serde_json::from_str(s).ok()?;
    items
        .iter()
        .map(|item| match item {
            serde_json::Value::String(text) => parse_scalar(elem, variants, text),
            serde_json::Value::Number(n) => parse_scalar(elem, variants, &n.to_string()),
            serde_json::Value::Bool(b) => {
                parse_scalar(elem, variants, if *b { "true" } else { "false" })
            }
            _ => None,
        })
        .collect()
}

pub(crate) fn parse_scalar(
    kind: FieldKind,
    variants: Option<&[Value]>,
    raw: &str,
) -> Option<Value> {
    let s = raw.trim();
    match kind {
        FieldKind::String => Some(Value::from(s.to_owned())),
        FieldKind::I64 => s.parse::<i64>().ok().map(Value::from),
        FieldKind::F64 => s
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(Value::from),
        FieldKind::Decimal => s.parse::<Decimal>().ok().map(Value::from),
        FieldKind::Bool => parse_bool(s).map(Value::from),
        FieldKind::Uuid => s.parse::<uuid::Uuid>().ok().map(Value::from),
        FieldKind::DateTime => parse_naive_datetime(s).map(Value::from),
        FieldKind::DateTimeUtc => parse_utc(s).map(Value::from),
        FieldKind::Date => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .map(Value::from),
        FieldKind::Time => parse_time(s).map(Value::from),
        FieldKind::Enum => parse_enum(variants, s),
        FieldKind::StringList
        | FieldKind::I64List
        | FieldKind::F64List
        | FieldKind::UuidList
        | FieldKind::EnumList => None,
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    if s.eq_ignore_ascii_case("true") {
        Some(true)
    } else if s.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

fn parse_naive_datetime(s: &str) -> Option<NaiveDateTime> {
    const FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|d| d.naive_utc()))
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn parse_utc(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|d| d.with_timezone(&Utc))
        .or_else(|| parse_naive_datetime(s).map(|d| d.and_utc()))
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .ok()
}

/// Match an enum label against the registered database values.
///
/// Accepts a bare label, a JSON string or a number. Without registered
/// variants the label is bound as text.
fn parse_enum(variants: Option<&[Value]>, s: &str) -> Option<Value> {
    let label = if s.starts_with('"') {
        serde_json::from_str::<String>(s).ok()?
    } else {
        s.to_owned()
    };
    let label = label.trim();
    let Some(variants) = variants else {
        return Some(Value::from(label.to_owned()));
    };
    let number = label.parse::<i64>().ok();
    variants
        .iter()
        .find(|v| match v {
            Value::String(Some(text)) => text.eq_ignore_ascii_case(label),
            other => number.is_some() && value_as_i64(other) == number,
        })
        .cloned()
}

fn value_as_i64(v: &Value) -> Option<i64> {
    match v {
        Value::TinyInt(Some(n)) => Some(i64::from(*n)),
        Value::SmallInt(Some(n)) => Some(i64::from(*n)),
        Value::Int(Some(n)) => Some(i64::from(*n)),
        Value::BigInt(Some(n)) => Some(*n),
        Value::TinyUnsigned(Some(n)) => Some(i64::from(*n)),
        Value::SmallUnsigned(Some(n)) => Some(i64::from(*n)),
        Value::Unsigned(Some(n)) => Some(i64::from(*n)),
        Value::BigUnsigned(Some(n)) => i64::try_from(*n).ok(),
        _ => None,
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn primitives_parse_invariantly() {
        let int = |s| parse_scalar(FieldKind::I64, None, s);
        assert_eq!(int(" 42 "), Some(Value::from(42_i64)));
        assert_eq!(int("4,2"), None);
        let float = |s| parse_scalar(FieldKind::F64, None, s);
        assert_eq!(float("1.5"), Some(Value::from(1.5_f64)));
        assert_eq!(float("NaN"), None);
        let boolean = |s| parse_scalar(FieldKind::Bool, None, s);
        assert_eq!(boolean("TRUE"), Some(Value::from(true)));
        assert_eq!(boolean("1"), None);
    }

    #[test]
    fn date_times_accept_common_shapes() {
        let midnight = NaiveDate::from_ymd_opt(2024, 3, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap();
        assert_eq!(parse_naive_datetime("2024-03-01"), Some(midnight));
        assert_eq!(parse_naive_datetime("2024-03-01T00:00:00"), Some(midnight));
        assert_eq!(parse_naive_datetime("2024-03-01 00:00"), Some(midnight));
        assert_eq!(
            parse_utc("2024-03-01T02:00:00+02:00"),
            Some(midnight.and_utc())
        );
        assert!(parse_time("12:30").is_some());
        assert!(parse_naive_datetime("03/01/2024").is_none());
    }

    #[test]
    fn lists_from_json_or_single_scalar() {
        assert_eq!(
            parse_list(FieldKind::I64, None, "[1, \"2\"]"),
            Some(vec![Value::from(1_i64), Value::from(2_i64)])
        );
        assert_eq!(
            parse_list(FieldKind::I64, None, "7"),
            Some(vec![Value::from(7_i64)])
        );
        assert_eq!(parse_list(FieldKind::I64, None, "[1, \"x\"]"), None);
        assert_eq!(parse_list(FieldKind::I64, None, "[1,"), None);
        assert_eq!(parse_list(FieldKind::String, None, "[]"), Some(Vec::new()));
    }

    #[test]
    fn enums_match_registered_values() {
        let text = [Value::from("active"), Value::from("banned")];
        assert_eq!(
            parse_scalar(FieldKind::Enum, Some(&text), "\"ACTIVE\""),
            Some(Value::from("active"))
        );
        assert_eq!(parse_scalar(FieldKind::Enum, Some(&text), "gone"), None);

        let numeric = [Value::from(1_i32), Value::from(2_i32)];
        assert_eq!(
            parse_scalar(FieldKind::Enum, Some(&numeric), "2"),
            Some(Value::from(2_i32))
        );
        assert_eq!(
            parse_scalar(FieldKind::Enum, None, "free"),
            Some(Value::from("free"))
        );
    }
}

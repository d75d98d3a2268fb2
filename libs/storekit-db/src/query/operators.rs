//! Operator compatibility table.
//!
//! Both the filter compiler and the strict request validator consult this
//! table, so a clause accepted by one is accepted by the other.

use crate::query::{FieldKind, OperatorKind};

const RELATIONAL: &[FieldKind] = &[
    FieldKind::I64,
    FieldKind::F64,
    FieldKind::Decimal,
    FieldKind::DateTime,
    FieldKind::DateTimeUtc,
    FieldKind::Date,
    FieldKind::Time,
    FieldKind::Bool,
];

const EQUALS: &[FieldKind] = &[
    FieldKind::I64,
    FieldKind::F64,
    FieldKind::Decimal,
    FieldKind::DateTime,
    FieldKind::DateTimeUtc,
    FieldKind::Date,
    FieldKind::Time,
    FieldKind::Bool,
    FieldKind::String,
    FieldKind::Uuid,
    FieldKind::Enum,
];

const TEXT: &[FieldKind] = &[FieldKind::String];

const CONTAINS: &[FieldKind] = &[
    FieldKind::String,
    FieldKind::StringList,
    FieldKind::I64List,
    FieldKind::F64List,
    FieldKind::UuidList,
    FieldKind::EnumList,
    FieldKind::I64,
    FieldKind::F64,
    FieldKind::Decimal,
    FieldKind::Uuid,
    FieldKind::Enum,
];

/// Field kinds `op` may be applied to.
#[must_use]
pub const fn allowed_kinds(op: OperatorKind) -> &'static [FieldKind] {
    match op {
        OperatorKind::GreaterThan
        | OperatorKind::GreaterThanOrEqual
        | OperatorKind::LessThan
        | OperatorKind::LessThanOrEqual => RELATIONAL,
        OperatorKind::Equals => EQUALS,
        OperatorKind::StartsWith | OperatorKind::EndsWith => TEXT,
        OperatorKind::Contains => CONTAINS,
    }
}

#[must_use]
pub fn is_operator_allowed(kind: FieldKind, op: OperatorKind) -> bool {
    allowed_kinds(op).contains(&kind)
}

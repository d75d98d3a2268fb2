//! Semantic field kinds used by the filter and sort compilers.

use std::fmt;

use sea_orm::sea_query::ColumnType;

/// Logical type of a searchable field.
///
/// The kind decides which operators a field accepts and how a textual filter
/// value is parsed before it is bound into a query. Optional (`NULL`-able)
/// columns carry the kind of the wrapped type; nullability is tracked separately
/// on [`Field`](crate::query::Field).
///
/// List kinds describe columns holding a JSON array of scalars.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldKind {
    String,
    I64,
    F64,
    Decimal,
    Bool,
    Uuid,
    DateTime,
    DateTimeUtc,
    Date,
    Time,
    Enum,
    StringList,
    I64List,
    F64List,
    UuidList,
    EnumList,
}

impl FieldKind {
    /// `true` for kinds stored as a JSON array.
    #[must_use]
    pub const fn is_list(self) -> bool {
        matches!(
            self,
            Self::StringList | Self::I64List | Self::F64List | Self::UuidList | Self::EnumList
        )
    }

    /// Element kind of a list kind; scalar kinds return themselves.
    #[must_use]
    pub const fn element(self) -> Self {
        match self {
            Self::StringList => Self::String,
            Self::I64List => Self::I64,
            Self::F64List => Self::F64,
            Self::UuidList => Self::Uuid,
            Self::EnumList => Self::Enum,
            other => other,
        }
    }

    /// Map a `SeaORM` column type onto a field kind.
    ///
    /// Returns `None` for column types that cannot be filtered (binary, JSON,
    /// native arrays, ...). JSON columns holding lists are registered explicitly.
    #[must_use]
    pub fn from_column_type(ty: &ColumnType) -> Option<Self> {
        Some(match ty {
            ColumnType::Char(_) | ColumnType::String(_) | ColumnType::Text => Self::String,
            ColumnType::TinyInteger
            | ColumnType::SmallInteger
            | ColumnType::Integer
            | ColumnType::BigInteger
            | ColumnType::TinyUnsigned
            | ColumnType::SmallUnsigned
            | ColumnType::Unsigned
            | ColumnType::BigUnsigned => Self::I64,
            ColumnType::Float | ColumnType::Double => Self::F64,
            ColumnType::Decimal(_) | ColumnType::Money(_) => Self::Decimal,
            ColumnType::Boolean => Self::Bool,
            ColumnType::Uuid => Self::Uuid,
            ColumnType::DateTime | ColumnType::Timestamp => Self::DateTime,
            ColumnType::TimestampWithTimeZone => Self::DateTimeUtc,
            ColumnType::Date => Self::Date,
            ColumnType::Time => Self::Time,
            ColumnType::Enum { .. } => Self::Enum,
            _ => return None,
        })
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::String => "String",
            FieldKind::I64 => "I64",
            FieldKind::F64 => "F64",
            FieldKind::Decimal => "Decimal",
            FieldKind::Bool => "Bool",
            FieldKind::Uuid => "Uuid",
            FieldKind::DateTime => "DateTime",
            FieldKind::DateTimeUtc => "DateTimeUtc",
            FieldKind::Date => "Date",
            FieldKind::Time => "Time",
            FieldKind::Enum => "Enum",
            FieldKind::StringList => "StringList",
            FieldKind::I64List => "I64List",
            FieldKind::F64List => "F64List",
            FieldKind::UuidList => "UuidList",
            FieldKind::EnumList => "EnumList",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use sea_orm::sea_query::StringLen;

    #[test]
    fn integer_widths_collapse_to_i64() {
        for ty in [
            ColumnType::TinyInteger,
            ColumnType::Integer,
            ColumnType::BigUnsigned,
        ] {
            assert_eq!(FieldKind::from_column_type(&ty), Some(FieldKind::I64));
        }
    }

    #[test]
    fn strings_and_unsupported_types() {
        assert_eq!(
            FieldKind::from_column_type(&ColumnType::String(StringLen::N(16))),
            Some(FieldKind::String)
        );
        assert_eq!(
            FieldKind::from_column_type(&ColumnType::Boolean),
            Some(FieldKind::Bool)
        );
        assert_eq!(FieldKind::from_column_type(&ColumnType::Json), None);
    }

    #[test]
    fn list_elements() {
        assert!(FieldKind::UuidList.is_list());
        assert!(!FieldKind::Uuid.is_list());
        assert_eq!(FieldKind::EnumList.element(), FieldKind::Enum);
        assert_eq!(FieldKind::Date.element(), FieldKind::Date);
        assert_eq!(FieldKind::StringList.to_string(), "StringList");
    }
}

//! Result of a coordinated unit of work.
//!
//! Retried units never return `Err`: a failure is rolled back, logged, and
//! reported here so callers can check it when they care.

use crate::DbError;

/// Why a unit of work gave up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Failure {
    pub operation: String,
    /// Attempts made, including the failing one. At least 1, also when the unit
    /// was cancelled before its first statement.
    pub attempts: u32,
    pub error: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[must_use]
pub enum Outcome<T> {
    Committed(T),
    Failed(Failure),
}

impl<T> Outcome<T> {
    #[must_use]
    pub const fn is_committed(&self) -> bool {
        matches!(self, Self::Committed(_))
    }

    #[must_use]
    pub const fn failure(&self) -> Option<&Failure> {
        match self {
            Self::Committed(_) => None,
            Self::Failed(f) => Some(f),
        }
    }

    /// Committed value, or `None` after a failure.
    #[must_use]
    pub fn ok(self) -> Option<T> {
        match self {
            Self::Committed(v) => Some(v),
            Self::Failed(_) => None,
        }
    }

    /// Opt back into error propagation.
    ///
    /// # Errors
    /// `DbError::UnitFailed` carrying the logged failure.
    pub fn into_result(self) -> crate::Result<T> {
        match self {
            Self::Committed(v) => Ok(v),
            Self::Failed(f) => Err(DbError::UnitFailed {
                operation: f.operation,
                attempts: f.attempts,
                error: f.error,
            }),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn failed_outcome_converts_to_error() {
        let out: Outcome<()> = Outcome::Failed(Failure {
            operation: "import".to_owned(),
            attempts: 2,
            error: "boom".to_owned(),
        });
        assert!(!out.is_committed());
        assert_eq!(out.failure().map(|f| f.attempts), Some(2));
        let err = out.into_result().unwrap_err();
        assert!(err.to_string().contains("import"), "{err}");
    }

    #[test]
    fn committed_outcome_yields_value() {
        let out = Outcome::Committed(7);
        assert!(out.is_committed());
        assert_eq!(out.clone().ok(), Some(7));
        assert_eq!(out.into_result().unwrap(), 7);
    }
}

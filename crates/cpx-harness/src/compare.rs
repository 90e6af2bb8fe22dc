use std::collections::BTreeSet;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde::Serialize;

use cpx_host::ErrorClass;

use crate::argset::ArgumentSet;
use crate::oracle::panic_message;
use crate::outcome::Outcome;

/// Error classes treated as the same failure. Identity always holds; other
/// pairs must be listed explicitly and are symmetric.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EquivalenceTable {
    pairs: BTreeSet<(ErrorClass, ErrorClass)>,
}

impl EquivalenceTable {
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn with(mut self, a: ErrorClass, b: ErrorClass) -> Self {
        self.pairs.insert((a, b));
        self.pairs.insert((b, a));
        self
    }

    pub fn equivalent(&self, a: ErrorClass, b: ErrorClass) -> bool {
        a == b || self.pairs.contains(&(a, b))
    }
}

type CustomRule = dyn Fn(&Outcome, &Outcome) -> Result<bool, String> + Send + Sync;

/// Equality rule for one test case.
#[derive(Clone, Default)]
pub enum Comparator {
    /// Both sides are values and structurally equal.
    #[default]
    Exact,
    /// Errors match by class under the table, ignoring messages; values
    /// still need structural equality.
    UnhandledError(EquivalenceTable),
    Custom(Arc<CustomRule>),
}

impl fmt::Debug for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Comparator::Exact => f.write_str("Exact"),
            Comparator::UnhandledError(table) => f.debug_tuple("UnhandledError").field(table).finish(),
            Comparator::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonResult {
    pub passed: bool,
    pub args: ArgumentSet,
    pub expected: Outcome,
    pub actual: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

impl ComparisonResult {
    /// Marks the result failed, keeping the first diagnostic.
    pub fn fail(&mut self, diagnostic: impl Into<String>) {
        self.passed = false;
        if self.diagnostic.is_none() {
            self.diagnostic = Some(diagnostic.into());
        }
    }
}

impl Comparator {
    pub fn unhandled_error() -> Self {
        Comparator::UnhandledError(EquivalenceTable::identity())
    }

    pub fn custom(
        rule: impl Fn(&Outcome, &Outcome) -> Result<bool, String> + Send + Sync + 'static,
    ) -> Self {
        Comparator::Custom(Arc::new(rule))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Comparator::Exact => "exact",
            Comparator::UnhandledError(_) => "unhandled_error",
            Comparator::Custom(_) => "custom",
        }
    }

    fn judge(&self, expected: &Outcome, actual: &Outcome) -> Result<(), String> {
        match self {
            Comparator::Exact => match (expected, actual) {
                (Outcome::Value(e), Outcome::Value(a)) if e == a => Ok(()),
                (Outcome::Value(_), Outcome::Value(_)) => Err("values differ".to_string()),
                _ => Err("exact comparison requires a value on both sides".to_string()),
            },
            Comparator::UnhandledError(table) => match (expected, actual) {
                (Outcome::Error(e), Outcome::Error(a)) if table.equivalent(e.class, a.class) => {
                    Ok(())
                }
                (Outcome::Error(e), Outcome::Error(a)) => Err(format!(
                    "error classes {} and {} are not equivalent",
                    e.class, a.class
                )),
                (Outcome::Value(e), Outcome::Value(a)) if e == a => Ok(()),
                (Outcome::Value(_), Outcome::Value(_)) => Err("values differ".to_string()),
                (Outcome::Error(_), Outcome::Value(_)) => {
                    Err("expected an error, native code returned a value".to_string())
                }
                (Outcome::Value(_), Outcome::Error(_)) => {
                    Err("expected a value, native code raised".to_string())
                }
            },
            Comparator::Custom(rule) => {
                match panic::catch_unwind(AssertUnwindSafe(|| rule(expected, actual))) {
                    Ok(Ok(true)) => Ok(()),
                    Ok(Ok(false)) => Err("custom rule rejected the outcomes".to_string()),
                    Ok(Err(msg)) => Err(format!("custom rule failed: {msg}")),
                    Err(panic) => Err(format!(
                        "custom rule panicked: {}",
                        panic_message(panic.as_ref())
                    )),
                }
            }
        }
    }

    pub fn compare(&self, expected: &Outcome, actual: &Outcome, args: &ArgumentSet) -> ComparisonResult {
        let verdict = self.judge(expected, actual);
        ComparisonResult {
            passed: verdict.is_ok(),
            args: args.clone(),
            expected: expected.clone(),
            actual: actual.clone(),
            diagnostic: verdict.err(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_symmetric_and_reflexive() {
        let t = EquivalenceTable::identity().with(ErrorClass::SystemError, ErrorClass::MemoryError);
        assert!(t.equivalent(ErrorClass::TypeError, ErrorClass::TypeError));
        assert!(t.equivalent(ErrorClass::MemoryError, ErrorClass::SystemError));
        assert!(!t.equivalent(ErrorClass::SystemError, ErrorClass::TypeError));
    }
}

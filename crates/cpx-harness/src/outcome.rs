use std::fmt;

use serde::{Deserialize, Serialize};

use cpx_host::{ErrorClass, PyErr, Value};

/// Result of one evaluation on either side of a comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Value(Value),
    Error(PyErr),
}

impl Outcome {
    pub fn error(class: ErrorClass, message: impl Into<String>) -> Self {
        Outcome::Error(PyErr::new(class, message))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Outcome::Error(_))
    }

    pub fn error_class(&self) -> Option<ErrorClass> {
        match self {
            Outcome::Error(err) => Some(err.class),
            Outcome::Value(_) => None,
        }
    }
}

impl From<Result<Value, PyErr>> for Outcome {
    fn from(r: Result<Value, PyErr>) -> Self {
        match r {
            Ok(v) => Outcome::Value(v),
            Err(e) => Outcome::Error(e),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Value(v) => write!(f, "value {v}"),
            Outcome::Error(e) => write!(f, "error {e}"),
        }
    }
}

use std::fmt;

use serde::{Deserialize, Serialize};

/// Host exception classes known to the C shim.
///
/// The integer codes are part of the native ABI: generated modules see them as
/// `PyExc_*` constants and pass them back through `PyErr_SetString`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ErrorClass {
    SystemError,
    TypeError,
    ValueError,
    OverflowError,
    AttributeError,
    KeyError,
    IndexError,
    MemoryError,
    RuntimeError,
}

impl ErrorClass {
    pub const ALL: [ErrorClass; 9] = [
        ErrorClass::SystemError,
        ErrorClass::TypeError,
        ErrorClass::ValueError,
        ErrorClass::OverflowError,
        ErrorClass::AttributeError,
        ErrorClass::KeyError,
        ErrorClass::IndexError,
        ErrorClass::MemoryError,
        ErrorClass::RuntimeError,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorClass::SystemError => "SystemError",
            ErrorClass::TypeError => "TypeError",
            ErrorClass::ValueError => "ValueError",
            ErrorClass::OverflowError => "OverflowError",
            ErrorClass::AttributeError => "AttributeError",
            ErrorClass::KeyError => "KeyError",
            ErrorClass::IndexError => "IndexError",
            ErrorClass::MemoryError => "MemoryError",
            ErrorClass::RuntimeError => "RuntimeError",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s.trim())
    }

    /// Code 0 is reserved for "no error".
    pub fn code(self) -> i32 {
        match self {
            ErrorClass::SystemError => 1,
            ErrorClass::TypeError => 2,
            ErrorClass::ValueError => 3,
            ErrorClass::OverflowError => 4,
            ErrorClass::AttributeError => 5,
            ErrorClass::KeyError => 6,
            ErrorClass::IndexError => 7,
            ErrorClass::MemoryError => 8,
            ErrorClass::RuntimeError => 9,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.code() == code)
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raised host exception: class plus message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{class}: {message}")]
pub struct PyErr {
    pub class: ErrorClass,
    pub message: String,
}

impl PyErr {
    pub fn new(class: ErrorClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
        }
    }

    pub fn system(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::SystemError, message)
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::TypeError, message)
    }

    pub fn attribute(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::AttributeError, message)
    }

    pub fn overflow(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::OverflowError, message)
    }

    pub fn no_memory() -> Self {
        Self::new(ErrorClass::MemoryError, "")
    }
}

/// Copies `src` into a fresh buffer, raising `MemoryError` instead of
/// aborting when the allocation cannot be satisfied.
pub(crate) fn try_copy(src: &[u8]) -> Result<Vec<u8>, PyErr> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(src.len())
        .map_err(|_| PyErr::no_memory())?;
    buf.extend_from_slice(src);
    Ok(buf)
}

/// Zero-filled buffer of `len` bytes, or `MemoryError`.
pub(crate) fn try_zeroed(len: usize) -> Result<Vec<u8>, PyErr> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len).map_err(|_| PyErr::no_memory())?;
    buf.resize(len, 0);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_roundtrip_and_skip_zero() {
        for class in ErrorClass::ALL {
            assert_ne!(class.code(), 0);
            assert_eq!(ErrorClass::from_code(class.code()), Some(class));
            assert_eq!(ErrorClass::parse(class.as_str()), Some(class));
        }
        assert_eq!(ErrorClass::from_code(0), None);
    }
}

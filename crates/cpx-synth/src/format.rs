//! Marshalling units accepted in argument and result format strings.
//!
//! Each unit is a single character with the meaning it has in
//! `PyArg_ParseTuple` / `Py_BuildValue`. Multi-character units (`s#`, `O!`,
//! `(..)`) and format modifiers (`|`, `:`, `;`) are not supported.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArgFormat {
    Object,
    Str,
    StrOrNone,
    Bytes,
    Int,
    Long,
    Ssize,
    LongLong,
    ULong,
    Double,
    Float,
    Predicate,
}

impl ArgFormat {
    pub const ALL: [ArgFormat; 12] = [
        ArgFormat::Object,
        ArgFormat::Str,
        ArgFormat::StrOrNone,
        ArgFormat::Bytes,
        ArgFormat::Int,
        ArgFormat::Long,
        ArgFormat::Ssize,
        ArgFormat::LongLong,
        ArgFormat::ULong,
        ArgFormat::Double,
        ArgFormat::Float,
        ArgFormat::Predicate,
    ];

    pub fn from_unit(c: char) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.unit() == c)
    }

    pub fn unit(self) -> char {
        match self {
            ArgFormat::Object => 'O',
            ArgFormat::Str => 's',
            ArgFormat::StrOrNone => 'z',
            ArgFormat::Bytes => 'y',
            ArgFormat::Int => 'i',
            ArgFormat::Long => 'l',
            ArgFormat::Ssize => 'n',
            ArgFormat::LongLong => 'L',
            ArgFormat::ULong => 'k',
            ArgFormat::Double => 'd',
            ArgFormat::Float => 'f',
            ArgFormat::Predicate => 'p',
        }
    }

    /// C type of the temporary the host helper writes into.
    pub fn c_type(self) -> &'static str {
        match self {
            ArgFormat::Object => "PyObject*",
            ArgFormat::Str | ArgFormat::StrOrNone | ArgFormat::Bytes => "const char*",
            ArgFormat::Int | ArgFormat::Predicate => "int",
            ArgFormat::Long => "long",
            ArgFormat::Ssize => "Py_ssize_t",
            ArgFormat::LongLong => "long long",
            ArgFormat::ULong => "unsigned long",
            ArgFormat::Double => "double",
            ArgFormat::Float => "float",
        }
    }

    /// Field of `cpx_api` that unpacks this unit.
    pub fn host_helper(self) -> &'static str {
        match self {
            ArgFormat::Object => "arg_object",
            ArgFormat::Str => "arg_string",
            ArgFormat::StrOrNone => "arg_string_or_none",
            ArgFormat::Bytes => "arg_bytes",
            ArgFormat::Int => "arg_int",
            ArgFormat::Long => "arg_long",
            ArgFormat::Ssize => "arg_ssize",
            ArgFormat::LongLong => "arg_longlong",
            ArgFormat::ULong => "arg_ulong",
            ArgFormat::Double => "arg_double",
            ArgFormat::Float => "arg_float",
            ArgFormat::Predicate => "arg_predicate",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResultFormat {
    /// Empty format: the call is a statement and the wrapper returns `None`.
    None,
    Object,
    ObjectSteal,
    Int,
    Long,
    Ssize,
    LongLong,
    ULong,
    Double,
    Float,
    Str,
    StrOrNone,
    Bytes,
}

impl ResultFormat {
    const UNITS: [ResultFormat; 12] = [
        ResultFormat::Object,
        ResultFormat::ObjectSteal,
        ResultFormat::Int,
        ResultFormat::Long,
        ResultFormat::Ssize,
        ResultFormat::LongLong,
        ResultFormat::ULong,
        ResultFormat::Double,
        ResultFormat::Float,
        ResultFormat::Str,
        ResultFormat::StrOrNone,
        ResultFormat::Bytes,
    ];

    pub fn from_unit(c: char) -> Option<Self> {
        Self::UNITS.into_iter().find(|f| f.unit() == Some(c))
    }

    pub fn unit(self) -> Option<char> {
        Some(match self {
            ResultFormat::None => return None,
            ResultFormat::Object => 'O',
            ResultFormat::ObjectSteal => 'N',
            ResultFormat::Int => 'i',
            ResultFormat::Long => 'l',
            ResultFormat::Ssize => 'n',
            ResultFormat::LongLong => 'L',
            ResultFormat::ULong => 'k',
            ResultFormat::Double => 'd',
            ResultFormat::Float => 'f',
            ResultFormat::Str => 's',
            ResultFormat::StrOrNone => 'z',
            ResultFormat::Bytes => 'y',
        })
    }

    /// `(helper, cast)` used to build the result from the call expression.
    pub fn host_helper(self) -> (&'static str, &'static str) {
        match self {
            ResultFormat::None => ("build_none", ""),
            ResultFormat::Object => ("build_object", ""),
            ResultFormat::ObjectSteal => ("build_object_steal", ""),
            ResultFormat::Int | ResultFormat::Long => ("build_long", "(long)"),
            ResultFormat::Ssize => ("build_ssize", "(Py_ssize_t)"),
            ResultFormat::LongLong => ("build_longlong", "(long long)"),
            ResultFormat::ULong => ("build_ulong", "(unsigned long)"),
            ResultFormat::Double | ResultFormat::Float => ("build_double", "(double)"),
            ResultFormat::Str | ResultFormat::StrOrNone => ("build_string", "(const char*)"),
            ResultFormat::Bytes => ("build_bytes", "(const char*)"),
        }
    }
}

/// Parses an argument format string into one unit per parameter.
///
/// On failure returns the offending character and its byte offset.
pub fn parse_argspec(spec: &str) -> Result<Vec<ArgFormat>, (usize, char)> {
    spec.char_indices()
        .map(|(i, c)| ArgFormat::from_unit(c).ok_or((i, c)))
        .collect()
}

/// Parses a result format: empty, or exactly one unit.
pub fn parse_resultspec(spec: &str) -> Result<ResultFormat, String> {
    let mut chars = spec.chars();
    match (chars.next(), chars.next()) {
        (None, _) => Ok(ResultFormat::None),
        (Some(c), None) => {
            ResultFormat::from_unit(c).ok_or_else(|| format!("unknown result unit {c:?}"))
        }
        (Some(_), Some(_)) => Err(format!(
            "result format {spec:?} must be empty or a single unit"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn units_are_unique() {
        for a in ArgFormat::ALL {
            assert_eq!(ArgFormat::from_unit(a.unit()), Some(a));
        }
        for r in ResultFormat::UNITS {
            assert_eq!(r.unit().and_then(ResultFormat::from_unit), Some(r));
        }
    }

    #[test]
    fn argspec_reports_offset() {
        assert_eq!(
            parse_argspec("sO"),
            Ok(vec![ArgFormat::Str, ArgFormat::Object])
        );
        assert_eq!(parse_argspec("s#"), Err((1, '#')));
        assert_eq!(parse_argspec(""), Ok(vec![]));
    }

    #[test]
    fn resultspec_is_single_unit() {
        assert_eq!(parse_resultspec(""), Ok(ResultFormat::None));
        assert_eq!(parse_resultspec("O"), Ok(ResultFormat::Object));
        assert!(parse_resultspec("OO").is_err());
        assert!(parse_resultspec("q").is_err());
    }
}

use std::fmt;

use serde::Serialize;

use cpx_host::capi::{C_API_FUNCTIONS, PRELUDE_NAMES};

use crate::format::{parse_argspec, parse_resultspec, ArgFormat, ResultFormat};

/// Identifiers with this prefix belong to the generated module.
pub const RESERVED_PREFIX: &str = "cpx_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthErrorKind {
    /// Unknown or unsupported marshalling unit.
    Format,
    /// Parameter declarations do not line up with the argument units.
    Arity,
    /// Probe, parameter or call-function name is not a usable C identifier.
    Identifier,
    /// Custom body does not define what the wrapper calls.
    Body,
}

/// A malformed probe declaration, reported before any C is emitted.
#[derive(Debug, Clone)]
pub struct SynthError {
    pub kind: SynthErrorKind,
    pub message: String,
}

impl SynthError {
    pub fn new(kind: SynthErrorKind, message: String) -> Self {
        Self { kind, message }
    }
}

impl fmt::Display for SynthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for SynthError {}

const C_KEYWORDS: &[&str] = &[
    "auto", "break", "case", "char", "const", "continue", "default", "do", "double", "else",
    "enum", "extern", "float", "for", "goto", "if", "inline", "int", "long", "register",
    "restrict", "return", "short", "signed", "sizeof", "static", "struct", "switch", "typedef",
    "union", "unsigned", "void", "volatile", "while", "NULL",
];

fn is_prelude_name(name: &str) -> bool {
    PRELUDE_NAMES.contains(&name)
        || C_API_FUNCTIONS.contains(&name)
        || name.starts_with("PyExc_")
}

/// One wrapper parameter, `"<c type> <name>"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParamDecl {
    pub c_type: String,
    pub name: String,
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

pub fn is_c_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => chars.all(is_ident_char),
        _ => false,
    }
}

impl ParamDecl {
    pub fn parse(decl: &str) -> Result<Self, SynthError> {
        let decl = decl.trim();
        let split = decl
            .char_indices()
            .rev()
            .take_while(|(_, c)| is_ident_char(*c))
            .last()
            .map(|(i, _)| i)
            .unwrap_or(decl.len());
        let (c_type, name) = decl.split_at(split);
        let c_type = c_type.trim();
        if c_type.is_empty() || !is_c_identifier(name) {
            return Err(SynthError::new(
                SynthErrorKind::Identifier,
                format!("parameter declaration {decl:?} must be \"<c type> <name>\""),
            ));
        }
        if name.starts_with(RESERVED_PREFIX) {
            return Err(SynthError::new(
                SynthErrorKind::Identifier,
                format!("parameter name {name:?} uses the reserved prefix {RESERVED_PREFIX:?}"),
            ));
        }
        if C_KEYWORDS.contains(&name) || is_prelude_name(name) {
            return Err(SynthError::new(
                SynthErrorKind::Identifier,
                format!("parameter name {name:?} collides with a C keyword or a prelude declaration"),
            ));
        }
        Ok(Self {
            c_type: c_type.to_string(),
            name: name.to_string(),
        })
    }
}

/// Everything needed to synthesize one probe module. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeSpec {
    name: String,
    resultspec: String,
    argspec: String,
    arguments: Vec<ParamDecl>,
    code: Option<String>,
    callfunction: String,
    #[serde(skip)]
    result_format: ResultFormat,
    #[serde(skip)]
    arg_formats: Vec<ArgFormat>,
}

impl ProbeSpec {
    pub fn builder(name: impl Into<String>) -> ProbeSpecBuilder {
        ProbeSpecBuilder {
            name: name.into(),
            resultspec: String::new(),
            argspec: String::new(),
            arguments: Vec::new(),
            code: None,
            callfunction: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resultspec(&self) -> &str {
        &self.resultspec
    }

    pub fn argspec(&self) -> &str {
        &self.argspec
    }

    pub fn arguments(&self) -> &[ParamDecl] {
        &self.arguments
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    /// Symbol the wrapper calls; the probe name unless overridden.
    pub fn callfunction(&self) -> &str {
        &self.callfunction
    }

    pub fn result_format(&self) -> ResultFormat {
        self.result_format
    }

    pub fn arg_formats(&self) -> &[ArgFormat] {
        &self.arg_formats
    }

    pub fn arity(&self) -> usize {
        self.arg_formats.len()
    }
}

#[derive(Debug, Clone)]
pub struct ProbeSpecBuilder {
    name: String,
    resultspec: String,
    argspec: String,
    arguments: Vec<String>,
    code: Option<String>,
    callfunction: Option<String>,
}

impl ProbeSpecBuilder {
    pub fn resultspec(mut self, spec: impl Into<String>) -> Self {
        self.resultspec = spec.into();
        self
    }

    pub fn argspec(mut self, spec: impl Into<String>) -> Self {
        self.argspec = spec.into();
        self
    }

    pub fn arguments<I, S>(mut self, decls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments = decls.into_iter().map(Into::into).collect();
        self
    }

    pub fn code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn callfunction(mut self, symbol: impl Into<String>) -> Self {
        self.callfunction = Some(symbol.into());
        self
    }

    pub fn build(self) -> Result<ProbeSpec, SynthError> {
        if !is_c_identifier(&self.name) || self.name.starts_with(RESERVED_PREFIX) {
            return Err(SynthError::new(
                SynthErrorKind::Identifier,
                format!("probe name {:?} is not a usable C identifier", self.name),
            ));
        }

        let result_format = parse_resultspec(&self.resultspec).map_err(|msg| {
            SynthError::new(
                SynthErrorKind::Format,
                format!("probe {}: {msg}", self.name),
            )
        })?;
        let arg_formats = parse_argspec(&self.argspec).map_err(|(offset, c)| {
            SynthError::new(
                SynthErrorKind::Format,
                format!(
                    "probe {}: unsupported argument unit {c:?} at offset {offset} in {:?}",
                    self.name, self.argspec
                ),
            )
        })?;

        let arguments = self
            .arguments
            .iter()
            .map(|d| ParamDecl::parse(d))
            .collect::<Result<Vec<_>, _>>()?;
        if arguments.len() != arg_formats.len() {
            return Err(SynthError::new(
                SynthErrorKind::Arity,
                format!(
                    "probe {}: {} argument unit(s) in {:?} but {} parameter declaration(s)",
                    self.name,
                    arg_formats.len(),
                    self.argspec,
                    arguments.len()
                ),
            ));
        }
        for (i, a) in arguments.iter().enumerate() {
            if arguments[..i].iter().any(|b| b.name == a.name) {
                return Err(SynthError::new(
                    SynthErrorKind::Identifier,
                    format!("probe {}: duplicate parameter {:?}", self.name, a.name),
                ));
            }
        }

        let callfunction = self.callfunction.unwrap_or_else(|| self.name.clone());
        if !is_c_identifier(&callfunction) || callfunction.starts_with(RESERVED_PREFIX) {
            return Err(SynthError::new(
                SynthErrorKind::Identifier,
                format!(
                    "probe {}: call function {callfunction:?} is not a usable C identifier",
                    self.name
                ),
            ));
        }
        match &self.code {
            Some(code) if !mentions_symbol(code, &callfunction) => {
                return Err(SynthError::new(
                    SynthErrorKind::Body,
                    format!(
                        "probe {}: custom code does not define {callfunction:?}",
                        self.name
                    ),
                ));
            }
            None if !C_API_FUNCTIONS.contains(&callfunction.as_str()) => {
                return Err(SynthError::new(
                    SynthErrorKind::Body,
                    format!(
                        "probe {}: {callfunction:?} is not a host C-API function; supply custom code",
                        self.name
                    ),
                ));
            }
            _ => {}
        }

        Ok(ProbeSpec {
            name: self.name,
            resultspec: self.resultspec,
            argspec: self.argspec,
            arguments,
            code: self.code,
            callfunction,
            result_format,
            arg_formats,
        })
    }
}

/// Whole-word occurrence of `symbol` in `code`.
fn mentions_symbol(code: &str, symbol: &str) -> bool {
    code.match_indices(symbol).any(|(i, _)| {
        let before = code[..i].chars().next_back();
        let after = code[i + symbol.len()..].chars().next();
        !before.is_some_and(is_ident_char) && !after.is_some_and(is_ident_char)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn param_decl_splits_type_and_name() {
        let p = ParamDecl::parse("char* name").expect("parse");
        assert_eq!(p.c_type, "char*");
        assert_eq!(p.name, "name");
        let p = ParamDecl::parse("unsigned long *out").expect("parse");
        assert_eq!(p.c_type, "unsigned long *");
        assert_eq!(p.name, "out");
        assert!(ParamDecl::parse("name").is_err());
        assert!(ParamDecl::parse("int 9lives").is_err());
        assert!(ParamDecl::parse("int cpx_a0").is_err());
    }

    #[test]
    fn symbol_match_is_whole_word() {
        assert!(mentions_symbol("PyObject* wrap_X(void) {}", "wrap_X"));
        assert!(!mentions_symbol("PyObject* wrap_Xy(void) {}", "wrap_X"));
        assert!(!mentions_symbol("PyObject* my_wrap_X(void) {}", "wrap_X"));
    }
}

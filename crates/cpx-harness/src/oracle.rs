//! Expected outcomes, computed through the trusted runtime.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde::Serialize;

use cpx_host::{ErrorClass, PyErr, ReferenceRuntime, Value};

use crate::argset::ArgumentSet;
use crate::outcome::Outcome;

type ReferenceFn = dyn Fn(&dyn ReferenceRuntime, &ArgumentSet) -> Result<Value, PyErr> + Send + Sync;

/// Host-level equivalent of a probed entry point.
#[derive(Clone)]
pub struct Reference(Arc<ReferenceFn>);

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Reference(..)")
    }
}

impl Reference {
    pub fn new(
        f: impl Fn(&dyn ReferenceRuntime, &ArgumentSet) -> Result<Value, PyErr> + Send + Sync + 'static,
    ) -> Self {
        Self(Arc::new(f))
    }

    /// Expected value independent of the arguments.
    pub fn constant(value: Value) -> Self {
        Self::new(move |_, _| Ok(value.clone()))
    }

    /// `getattr(<module>, args[0])`, with lookup failures rewritten by `mapping`.
    pub fn getattr(module: &str, mapping: ErrorMapping) -> Self {
        let module = module.to_string();
        Self::new(move |rt, args| {
            let name = match args.values() {
                [Value::Str(name)] => name,
                [other] => {
                    return Err(mapping.apply(PyErr::type_error(format!(
                        "attribute name must be string, not '{}'",
                        other.type_name()
                    ))))
                }
                values => {
                    return Err(PyErr::type_error(format!(
                        "getattr expected 1 argument, got {}",
                        values.len()
                    )))
                }
            };
            rt.getattr(&module, name).map_err(|err| mapping.apply(err))
        })
    }

    pub fn call(&self, runtime: &dyn ReferenceRuntime, args: &ArgumentSet) -> Result<Value, PyErr> {
        (self.0)(runtime, args)
    }
}

/// Host failure class -> error class the native entry point raises instead.
///
/// Only the listed rewrites apply; everything else passes through unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ErrorMapping {
    rewrites: Vec<(ErrorClass, ErrorClass, Option<String>)>,
}

impl ErrorMapping {
    pub fn identity() -> Self {
        Self::default()
    }

    /// Rewrites `from` to `to`, keeping the host message.
    pub fn rewrite(mut self, from: ErrorClass, to: ErrorClass) -> Self {
        self.rewrites.push((from, to, None));
        self
    }

    /// Rewrites `from` to `to` with the native side's fixed message.
    pub fn rewrite_with(mut self, from: ErrorClass, to: ErrorClass, message: &str) -> Self {
        self.rewrites.push((from, to, Some(message.to_string())));
        self
    }

    /// `PySys_GetObject` yields NULL for a missing name and the wrapper's
    /// `Py_BuildValue("O", NULL)` raises `SystemError`.
    pub fn sys_get_object() -> Self {
        Self::identity().rewrite_with(
            ErrorClass::AttributeError,
            ErrorClass::SystemError,
            "NULL object passed to Py_BuildValue",
        )
    }

    pub fn apply(&self, err: PyErr) -> PyErr {
        match self.rewrites.iter().find(|(from, _, _)| *from == err.class) {
            Some((_, to, Some(message))) => PyErr::new(*to, message.clone()),
            Some((_, to, None)) => PyErr::new(*to, err.message),
            None => err,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OracleOutcome {
    pub outcome: Outcome,
    /// Set when the reference itself broke (panicked) rather than raising.
    pub fault: Option<String>,
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Evaluates `reference` on `args`. Raised errors are outcomes; panics are
/// faults, reported as a `RuntimeError` outcome plus `fault`.
pub fn evaluate(
    reference: &Reference,
    runtime: &dyn ReferenceRuntime,
    args: &ArgumentSet,
) -> OracleOutcome {
    match panic::catch_unwind(AssertUnwindSafe(|| reference.call(runtime, args))) {
        Ok(result) => OracleOutcome {
            outcome: result.into(),
            fault: None,
        },
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            log::warn!("reference panicked on {args}: {message}");
            OracleOutcome {
                outcome: Outcome::error(
                    ErrorClass::RuntimeError,
                    format!("reference raised unexpectedly: {message}"),
                ),
                fault: Some(message),
            }
        }
    }
}

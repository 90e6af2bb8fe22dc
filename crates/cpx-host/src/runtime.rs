use std::sync::Arc;

use crate::error::PyErr;
use crate::state::{InterpreterState, MAIN_INTERPRETER_ID};
use crate::sys::SysRegistry;
use crate::value::Value;

/// Trusted high-level operations the reference oracle evaluates against.
pub trait ReferenceRuntime: Send + Sync {
    /// `getattr(<module>, name)`.
    fn getattr(&self, module: &str, name: &str) -> Result<Value, PyErr>;

    fn main_interpreter_id(&self) -> i64;

    /// Interpreter the calling thread runs in.
    fn current_interpreter_id(&self) -> i64;
}

/// Process-wide host state shared by the reference view and the C shim.
///
/// Created once per suite and handed around as `Arc<HostRuntime>`; it is never
/// mutated after construction.
#[derive(Debug)]
pub struct HostRuntime {
    sys: SysRegistry,
    main_interp: Box<InterpreterState>,
}

impl HostRuntime {
    pub fn new(sys: SysRegistry) -> Self {
        Self {
            sys,
            main_interp: Box::new(InterpreterState {
                id: MAIN_INTERPRETER_ID,
            }),
        }
    }

    pub fn host() -> Arc<Self> {
        Arc::new(Self::new(SysRegistry::host()))
    }

    pub fn sys(&self) -> &SysRegistry {
        &self.sys
    }

    /// Stable address of the main interpreter for the lifetime of `self`.
    pub fn main_interpreter_ptr(&self) -> *mut InterpreterState {
        &*self.main_interp as *const InterpreterState as *mut InterpreterState
    }
}

impl ReferenceRuntime for HostRuntime {
    fn getattr(&self, module: &str, name: &str) -> Result<Value, PyErr> {
        match module {
            "sys" => self.sys.getattr(name),
            _ => Err(PyErr::system(format!("no module named '{module}'"))),
        }
    }

    fn main_interpreter_id(&self) -> i64 {
        self.main_interp.id
    }

    fn current_interpreter_id(&self) -> i64 {
        self.main_interp.id
    }
}

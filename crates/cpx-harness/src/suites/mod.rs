//! Built-in differential tests.

mod state;
mod sys;

pub use state::state_suite;
pub use sys::sys_suite;

use crate::registry::{HarnessError, Registry};

/// Registry with every built-in suite.
pub fn builtin_registry() -> Result<Registry, HarnessError> {
    let mut registry = Registry::new();
    for case in sys_suite().into_iter().chain(state_suite()) {
        registry.register(case)?;
    }
    Ok(registry)
}

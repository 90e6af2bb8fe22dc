//! Host runtime for C-API probes.
//!
//! Two surfaces over the same state:
//! - [`runtime::ReferenceRuntime`]: the trusted, high-level view used to compute
//!   expected outcomes (resolve-by-name against a fixed registry).
//! - [`capi::HOST_API`]: the C function table synthesized probe modules call
//!   into; the entry points under test.

pub mod capi;
pub mod error;
pub mod handles;
pub mod runtime;
pub mod session;
pub mod state;
pub mod sys;
pub mod value;

pub use error::{ErrorClass, PyErr};
pub use runtime::{HostRuntime, ReferenceRuntime};
pub use session::Session;
pub use value::Value;

//! Typed probe declarations and the C source they expand to.
//!
//! Validation happens in [`ProbeSpecBuilder::build`]; once a [`ProbeSpec`]
//! exists, [`emit_module`] cannot fail.

pub mod c_emit;
pub mod format;
pub mod spec;

pub use c_emit::{emit_module, wrapper_symbol};
pub use format::{ArgFormat, ResultFormat};
pub use spec::{ParamDecl, ProbeSpec, ProbeSpecBuilder, SynthError, SynthErrorKind};

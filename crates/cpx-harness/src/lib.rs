//! Differential test harness for C-API probes.
//!
//! A [`registry::TestCase`] declares a probe; the registry synthesizes its C
//! module, builds and loads it once through the [`build_cache::BuildCache`],
//! then for every generated [`argset::ArgumentSet`] compares the native
//! [`outcome::Outcome`] with the one the [`oracle`] computes on the host.

pub mod argset;
pub mod build_cache;
pub mod compare;
pub mod config;
pub mod invoke;
pub mod oracle;
pub mod outcome;
pub mod registry;
pub mod suites;
pub mod toolchain;

pub use argset::{ArgumentGenerator, ArgumentSet};
pub use build_cache::{BuildCache, BuildError, BuildStage, CompiledProbe};
pub use compare::{Comparator, ComparisonResult, EquivalenceTable};
pub use config::{CcProfile, HarnessConfig};
pub use invoke::invoke;
pub use oracle::{ErrorMapping, OracleOutcome, Reference};
pub use outcome::Outcome;
pub use registry::{
    HarnessError, Registry, SuiteContext, SuiteReport, TestCase, TestReport, TestStatus,
};

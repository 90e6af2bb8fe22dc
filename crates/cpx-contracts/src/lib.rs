//! Shared, version-pinned protocol identifiers.
//!
//! These constants are the single source of truth for version strings that
//! appear in machine-readable output and at the native ABI boundary.

pub const CPX_SUITE_REPORT_SCHEMA_VERSION: &str = "cpx.suite.report@0.1.0";
pub const CPX_TEST_LIST_SCHEMA_VERSION: &str = "cpx.test.list@0.1.0";

/// Bumped whenever the layout of the host function table changes.
pub const CPX_HOST_ABI_VERSION: u32 = 1;

/// Fixed symbol every synthesized probe module exports.
pub const CPX_PROBE_INIT_SYMBOL: &str = "cpx_probe_init";

/// Salt mixed into artifact cache keys; bump to invalidate every cached probe.
pub const CPX_NATIVE_CACHE_SALT: &str = "cpx-native-cache-v1";

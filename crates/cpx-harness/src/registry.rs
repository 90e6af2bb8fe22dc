use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use cpx_contracts::{CPX_SUITE_REPORT_SCHEMA_VERSION, CPX_TEST_LIST_SCHEMA_VERSION};
use cpx_host::HostRuntime;
use cpx_synth::{emit_module, ProbeSpec, ProbeSpecBuilder, SynthError};

use crate::argset::ArgumentGenerator;
use crate::build_cache::{BuildCache, BuildError, CompiledProbe};
use crate::compare::{ComparisonResult, Comparator};
use crate::config::HarnessConfig;
use crate::invoke::invoke;
use crate::oracle::{self, Reference};

const SOURCE_EXCERPT_LINES: usize = 40;

#[derive(Debug, Clone, thiserror::Error)]
pub enum HarnessError {
    #[error("duplicate test case {0}")]
    Duplicate(String),
    #[error("unknown test case {0}")]
    Unknown(String),
    #[error("configuration error in {name}: {error}")]
    Config { name: String, error: SynthError },
    #[error(transparent)]
    Build(#[from] BuildError),
}

/// Suite-scoped state: the build cache and the host runtime.
///
/// Created at suite start and dropped at suite end; dropping it unloads every
/// probe module it loaded.
pub struct SuiteContext {
    cache: BuildCache,
    runtime: Arc<HostRuntime>,
}

impl SuiteContext {
    pub fn new(config: HarnessConfig) -> Self {
        Self::with_runtime(config, HostRuntime::host())
    }

    pub fn with_runtime(config: HarnessConfig, runtime: Arc<HostRuntime>) -> Self {
        Self {
            cache: BuildCache::new(config),
            runtime,
        }
    }

    pub fn cache(&self) -> &BuildCache {
        &self.cache
    }

    pub fn runtime(&self) -> &Arc<HostRuntime> {
        &self.runtime
    }
}

/// A named differential test: probe declaration, generator, reference and
/// comparator.
#[derive(Debug, Clone)]
pub struct TestCase {
    name: String,
    spec: Result<ProbeSpec, SynthError>,
    reference: Reference,
    generator: ArgumentGenerator,
    comparator: Comparator,
}

impl TestCase {
    /// Starts a declaration. The probe is named after the test.
    pub fn declare(name: &str, reference: Reference, generator: ArgumentGenerator) -> CpyExtFunction {
        CpyExtFunction {
            name: name.to_string(),
            probe: ProbeSpec::builder(name),
            reference,
            generator,
            comparator: Comparator::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn spec(&self) -> Result<&ProbeSpec, &SynthError> {
        self.spec.as_ref()
    }

    pub fn comparator(&self) -> &Comparator {
        &self.comparator
    }
}

/// Declaration surface for a [`TestCase`].
pub struct CpyExtFunction {
    name: String,
    probe: ProbeSpecBuilder,
    reference: Reference,
    generator: ArgumentGenerator,
    comparator: Comparator,
}

impl CpyExtFunction {
    pub fn resultspec(mut self, spec: &str) -> Self {
        self.probe = self.probe.resultspec(spec);
        self
    }

    pub fn argspec(mut self, spec: &str) -> Self {
        self.probe = self.probe.argspec(spec);
        self
    }

    pub fn arguments(mut self, decls: &[&str]) -> Self {
        self.probe = self.probe.arguments(decls.iter().copied());
        self
    }

    pub fn code(mut self, code: &str) -> Self {
        self.probe = self.probe.code(code);
        self
    }

    pub fn callfunction(mut self, symbol: &str) -> Self {
        self.probe = self.probe.callfunction(symbol);
        self
    }

    pub fn cmpfunc(mut self, comparator: Comparator) -> Self {
        self.comparator = comparator;
        self
    }

    /// Validation errors are kept and reported when the test runs.
    pub fn build(self) -> TestCase {
        TestCase {
            name: self.name,
            spec: self.probe.build(),
            reference: self.reference,
            generator: self.generator,
            comparator: self.comparator,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Passed,
    Failed,
    ConfigError,
    BuildError,
    /// The harness itself could not run the case.
    HarnessError,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestReport {
    pub name: String,
    pub status: TestStatus,
    pub comparisons: Vec<ComparisonResult>,
    pub oracle_faults: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_excerpt: Option<String>,
}

impl TestReport {
    fn errored(name: &str, status: TestStatus, diagnostic: String, excerpt: Option<String>) -> Self {
        Self {
            name: name.to_string(),
            status,
            comparisons: Vec::new(),
            oracle_faults: 0,
            diagnostic: Some(diagnostic),
            source_excerpt: excerpt,
        }
    }

    pub fn passed(&self) -> bool {
        self.status == TestStatus::Passed
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SuiteReport {
    pub schema_version: &'static str,
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
    pub builds: usize,
    pub tests: Vec<TestReport>,
}

impl SuiteReport {
    pub fn new(tests: Vec<TestReport>, builds: usize) -> Self {
        let count = |s: TestStatus| tests.iter().filter(|t| t.status == s).count();
        Self {
            schema_version: CPX_SUITE_REPORT_SCHEMA_VERSION,
            passed: count(TestStatus::Passed),
            failed: count(TestStatus::Failed),
            errors: count(TestStatus::ConfigError)
                + count(TestStatus::BuildError)
                + count(TestStatus::HarnessError),
            builds,
            tests,
        }
    }

    pub fn all_passed(&self) -> bool {
        self.tests.iter().all(TestReport::passed)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TestListEntry<'a> {
    pub name: &'a str,
    pub comparator: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probe: Option<&'a ProbeSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TestList<'a> {
    pub schema_version: &'static str,
    pub tests: Vec<TestListEntry<'a>>,
}

fn source_excerpt(source: &str) -> String {
    let lines: Vec<&str> = source.lines().collect();
    let start = lines.len().saturating_sub(SOURCE_EXCERPT_LINES);
    lines[start..].join("\n")
}

#[derive(Debug, Default)]
pub struct Registry {
    cases: BTreeMap<String, TestCase>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, case: TestCase) -> Result<(), HarnessError> {
        if self.cases.contains_key(&case.name) {
            return Err(HarnessError::Duplicate(case.name));
        }
        self.cases.insert(case.name.clone(), case);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&TestCase> {
        self.cases.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.cases.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Names containing `filter` (all names when `None`).
    pub fn select(&self, filter: Option<&str>) -> Vec<&str> {
        self.names()
            .into_iter()
            .filter(|n| filter.map_or(true, |f| n.contains(f)))
            .collect()
    }

    pub fn list(&self, filter: Option<&str>) -> TestList<'_> {
        let tests = self
            .select(filter)
            .into_iter()
            .filter_map(|n| self.cases.get(n))
            .map(|case| TestListEntry {
                name: &case.name,
                comparator: case.comparator.name(),
                probe: case.spec.as_ref().ok(),
                config_error: case.spec.as_ref().err().map(ToString::to_string),
            })
            .collect();
        TestList {
            schema_version: CPX_TEST_LIST_SCHEMA_VERSION,
            tests,
        }
    }

    /// Synthesizes and loads the module backing `name`; built once per suite.
    pub fn compile_module(
        &self,
        ctx: &SuiteContext,
        name: &str,
    ) -> Result<Arc<CompiledProbe>, HarnessError> {
        let case = self
            .cases
            .get(name)
            .ok_or_else(|| HarnessError::Unknown(name.to_string()))?;
        let spec = case.spec.as_ref().map_err(|error| HarnessError::Config {
            name: name.to_string(),
            error: error.clone(),
        })?;
        let source = emit_module(spec);
        Ok(ctx.cache.ensure_loaded(spec.name(), &source)?)
    }

    pub fn run_case(&self, ctx: &SuiteContext, name: &str) -> Result<TestReport, HarnessError> {
        let case = self
            .cases
            .get(name)
            .ok_or_else(|| HarnessError::Unknown(name.to_string()))?;

        let probe = match self.compile_module(ctx, name) {
            Ok(probe) => probe,
            Err(HarnessError::Config { error, .. }) => {
                log::warn!("{name}: configuration error: {error}");
                return Ok(TestReport::errored(
                    name,
                    TestStatus::ConfigError,
                    error.to_string(),
                    None,
                ));
            }
            Err(HarnessError::Build(err)) => {
                log::warn!("{name}: {err}");
                let excerpt = case.spec.as_ref().ok().map(|s| source_excerpt(&emit_module(s)));
                return Ok(TestReport::errored(
                    name,
                    TestStatus::BuildError,
                    err.to_string(),
                    excerpt,
                ));
            }
            Err(err) => return Err(err),
        };

        let mut comparisons = Vec::new();
        let mut oracle_faults = 0;
        for args in case.generator.generate() {
            let expected = oracle::evaluate(&case.reference, ctx.runtime.as_ref(), &args);
            let actual = invoke(&probe, &ctx.runtime, &args);
            let mut result = case.comparator.compare(&expected.outcome, &actual, &args);
            if let Some(fault) = expected.fault {
                oracle_faults += 1;
                result.fail(format!("oracle fault: {fault}"));
            }
            if !result.passed {
                log::info!(
                    "{name}{args}: expected {}, got {}",
                    result.expected,
                    result.actual
                );
            }
            comparisons.push(result);
        }

        let status = if comparisons.iter().all(|c| c.passed) {
            TestStatus::Passed
        } else {
            TestStatus::Failed
        };
        log::debug!("{name}: {status:?} ({} argument sets)", comparisons.len());
        Ok(TestReport {
            name: name.to_string(),
            status,
            comparisons,
            oracle_faults,
            diagnostic: None,
            source_excerpt: None,
        })
    }

    /// Like [`Registry::run_case`], but a harness failure becomes a report
    /// entry instead of an error.
    pub fn report_case(&self, ctx: &SuiteContext, name: &str) -> TestReport {
        self.run_case(ctx, name).unwrap_or_else(|err| {
            log::error!("{name}: {err}");
            TestReport::errored(name, TestStatus::HarnessError, err.to_string(), None)
        })
    }

    /// Runs the selected tests one after another.
    pub fn run_all(&self, ctx: &SuiteContext, filter: Option<&str>) -> SuiteReport {
        let tests = self
            .select(filter)
            .into_iter()
            .map(|name| self.report_case(ctx, name))
            .collect();
        SuiteReport::new(tests, ctx.cache.build_count())
    }

    /// Runs the selected tests on up to `jobs` scoped threads. Report order
    /// matches [`Registry::run_all`].
    pub fn run_parallel(&self, ctx: &SuiteContext, filter: Option<&str>, jobs: usize) -> SuiteReport {
        let names = self.select(filter);
        let jobs = jobs.max(1).min(names.len().max(1));
        if jobs == 1 {
            return self.run_all(ctx, filter);
        }

        let next = AtomicUsize::new(0);
        let slots: Mutex<Vec<Option<TestReport>>> = Mutex::new(vec![None; names.len()]);
        std::thread::scope(|scope| {
            for _ in 0..jobs {
                scope.spawn(|| loop {
                    let i = next.fetch_add(1, Ordering::SeqCst);
                    let Some(name) = names.get(i) else {
                        break;
                    };
                    let report = self.report_case(ctx, name);
                    slots.lock()[i] = Some(report);
                });
            }
        });

        let tests = slots.into_inner().into_iter().flatten().collect();
        SuiteReport::new(tests, ctx.cache.build_count())
    }
}

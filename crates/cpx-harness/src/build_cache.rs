//! Compile-and-load cache, one native module per probe name.
//!
//! Each name owns a `OnceCell` slot created under a short map lock. The first
//! caller for a name builds inside `get_or_init`; concurrent callers for the
//! same name block on that cell, and callers for other names proceed. Failed
//! builds are cached like successful ones, so a broken probe is compiled once
//! per run and reported to every test that uses it.

use std::collections::HashMap;
use std::ffi::CStr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use libloading::Library;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde::Serialize;

use cpx_contracts::{CPX_HOST_ABI_VERSION, CPX_PROBE_INIT_SYMBOL};
use cpx_host::capi::{ProbeFn, ProbeInitFn, HOST_API};

use crate::config::HarnessConfig;
use crate::toolchain;

/// Loads with every undefined symbol resolved up front, so a module that
/// links against a missing symbol fails here instead of on first call.
#[cfg(unix)]
fn open_library(path: &Path) -> Result<Library, libloading::Error> {
    use libloading::os::unix::{Library as UnixLibrary, RTLD_LOCAL, RTLD_NOW};
    // SAFETY: the artifact was generated by this harness; its only
    // initializer is `cpx_probe_init`, which is called explicitly.
    unsafe { UnixLibrary::open(Some(path), RTLD_NOW | RTLD_LOCAL) }.map(Library::from)
}

// `LoadLibrary` already binds imports at load time.
#[cfg(not(unix))]
fn open_library(path: &Path) -> Result<Library, libloading::Error> {
    // SAFETY: as above.
    unsafe { Library::new(path) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStage {
    Compile,
    Load,
    Init,
    /// Same name requested with different source within one cache.
    Conflict,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{stage:?} failed for probe {name}: {message}")]
pub struct BuildError {
    pub name: String,
    pub stage: BuildStage,
    pub message: String,
}

impl BuildError {
    fn new(name: &str, stage: BuildStage, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            stage,
            message: message.into(),
        }
    }
}

/// A loaded probe module. Immutable; shared as `Arc<CompiledProbe>`.
pub struct CompiledProbe {
    name: String,
    source: String,
    artifact: PathBuf,
    arity: usize,
    call: ProbeFn,
    // Keeps `call` mapped; never unloaded while the probe is reachable.
    _library: Library,
}

impl std::fmt::Debug for CompiledProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledProbe")
            .field("name", &self.name)
            .field("artifact", &self.artifact)
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

impl CompiledProbe {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn artifact(&self) -> &Path {
        &self.artifact
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub(crate) fn entry(&self) -> ProbeFn {
        self.call
    }
}

struct Built {
    source: String,
    result: Result<Arc<CompiledProbe>, BuildError>,
}

type Slot = Arc<OnceCell<Built>>;

pub struct BuildCache {
    config: HarnessConfig,
    slots: Mutex<HashMap<String, Slot>>,
    builds: AtomicUsize,
}

impl BuildCache {
    pub fn new(config: HarnessConfig) -> Self {
        Self {
            config,
            slots: Mutex::new(HashMap::new()),
            builds: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Compiles and loads `source` as probe `name`, at most once per name.
    pub fn ensure_loaded(&self, name: &str, source: &str) -> Result<Arc<CompiledProbe>, BuildError> {
        let slot = {
            let mut slots = self.slots.lock();
            slots.entry(name.to_string()).or_default().clone()
        };
        let built = slot.get_or_init(|| Built {
            source: source.to_string(),
            result: self.build(name, source),
        });
        if built.source != source {
            return Err(BuildError::new(
                name,
                BuildStage::Conflict,
                "probe name already built from different source in this run",
            ));
        }
        built.result.clone()
    }

    /// Number of compile+load attempts performed by this cache.
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.slots.lock().keys().cloned().collect();
        names.sort();
        names
    }

    fn build(&self, name: &str, source: &str) -> Result<Arc<CompiledProbe>, BuildError> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        log::info!("building probe {name}");

        let out = toolchain::compile_shared_lib(source, name, &self.config)
            .map_err(|err| BuildError::new(name, BuildStage::Compile, format!("{err:#}")))?;
        if !out.ok {
            log::warn!("probe {name}: cc exited with status {}", out.exit_status);
            return Err(BuildError::new(
                name,
                BuildStage::Compile,
                String::from_utf8_lossy(&out.stderr).into_owned(),
            ));
        }
        let artifact = out.lib_path.ok_or_else(|| {
            BuildError::new(name, BuildStage::Compile, "compiler reported success without an artifact")
        })?;
        if out.cached {
            log::debug!("probe {name}: reusing {}", artifact.display());
        }

        let library = open_library(&artifact).map_err(|err| {
            BuildError::new(
                name,
                BuildStage::Load,
                format!("load {}: {err}", artifact.display()),
            )
        })?;

        // SAFETY: the symbol type matches the prelude's `cpx_probe_init`.
        let init: ProbeInitFn = unsafe {
            *library
                .get::<ProbeInitFn>(CPX_PROBE_INIT_SYMBOL.as_bytes())
                .map_err(|err| {
                    BuildError::new(
                        name,
                        BuildStage::Init,
                        format!("resolve {CPX_PROBE_INIT_SYMBOL}: {err}"),
                    )
                })?
        };

        // SAFETY: `HOST_API` is a static; the module keeps the pointer.
        let def = unsafe { init(&HOST_API).as_ref() }.ok_or_else(|| {
            BuildError::new(
                name,
                BuildStage::Init,
                format!("{CPX_PROBE_INIT_SYMBOL} rejected host ABI version {CPX_HOST_ABI_VERSION}"),
            )
        })?;
        if def.abi_version != CPX_HOST_ABI_VERSION {
            return Err(BuildError::new(
                name,
                BuildStage::Init,
                format!(
                    "module ABI version {} does not match host {}",
                    def.abi_version, CPX_HOST_ABI_VERSION
                ),
            ));
        }
        let call = def.call.ok_or_else(|| {
            BuildError::new(name, BuildStage::Init, "probe definition has no entry point")
        })?;
        if !def.name.is_null() {
            // SAFETY: a static string literal in the generated module.
            let declared = unsafe { CStr::from_ptr(def.name) }.to_string_lossy();
            if declared != name {
                return Err(BuildError::new(
                    name,
                    BuildStage::Init,
                    format!("module registers probe {declared:?}"),
                ));
            }
        }
        let arity = usize::try_from(def.arity).map_err(|_| {
            BuildError::new(name, BuildStage::Init, format!("negative arity {}", def.arity))
        })?;

        Ok(Arc::new(CompiledProbe {
            name: name.to_string(),
            source: source.to_string(),
            artifact,
            arity,
            call,
            _library: library,
        }))
    }
}

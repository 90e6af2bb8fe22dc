use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize)]
#[clap(rename_all = "kebab_case")]
#[serde(rename_all = "kebab-case")]
pub enum CcProfile {
    #[default]
    Default,
    Debug,
    Size,
}

const CC_PROFILE_DEBUG: &[&str] = &["-O0", "-g"];
const CC_PROFILE_SIZE_MACOS: &[&str] = &["-Os", "-Wl,-dead_strip", "-Wl,-x"];
const CC_PROFILE_SIZE_LINUX: &[&str] = &[
    "-Os",
    "-ffunction-sections",
    "-fdata-sections",
    "-Wl,--gc-sections",
];
const CC_PROFILE_SIZE_FALLBACK: &[&str] = &["-Os"];

pub fn cc_profile_flags(profile: CcProfile) -> &'static [&'static str] {
    match profile {
        CcProfile::Default => &[],
        CcProfile::Debug => CC_PROFILE_DEBUG,
        CcProfile::Size => {
            if cfg!(target_os = "macos") {
                CC_PROFILE_SIZE_MACOS
            } else if cfg!(target_os = "linux") {
                CC_PROFILE_SIZE_LINUX
            } else {
                CC_PROFILE_SIZE_FALLBACK
            }
        }
    }
}

/// Order-preserving union of `existing` and `flags`.
pub fn merge_cc_args(existing: &[String], flags: &[&str]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tok in existing.iter().map(String::as_str).chain(flags.iter().copied()) {
        let t = tok.trim();
        if t.is_empty() || out.iter().any(|o| o == t) {
            continue;
        }
        out.push(t.to_string());
    }
    out
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| {
            let v = v.trim().to_ascii_lowercase();
            !(v.is_empty() || v == "0" || v == "false" || v == "no" || v == "off")
        })
        .unwrap_or(false)
}

fn default_cache_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("CPX_NATIVE_CACHE_DIR") {
        return PathBuf::from(dir);
    }
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .and_then(|p| p.parent())
        .map(|root| root.join("target/cpx-native-cache"))
        .unwrap_or_else(|| std::env::temp_dir().join("cpx-native-cache"))
}

/// Native toolchain settings for one suite run.
///
/// Environment: `CPX_CC` (compiler, default `cc`), `CPX_CC_ARGS` (extra flags,
/// whitespace separated), `CPX_NATIVE_CACHE_DIR`, `CPX_KEEP_C`.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub cc: OsString,
    pub cc_args: Vec<String>,
    pub cache_dir: PathBuf,
    pub keep_c: bool,
    pub profile: CcProfile,
}

impl HarnessConfig {
    pub fn from_env() -> Self {
        let cc = std::env::var_os("CPX_CC").unwrap_or_else(|| OsStr::new("cc").to_os_string());
        let cc_args = std::env::var("CPX_CC_ARGS")
            .unwrap_or_default()
            .split_whitespace()
            .map(str::to_string)
            .collect();
        Self {
            cc,
            cc_args,
            cache_dir: default_cache_dir(),
            keep_c: env_flag("CPX_KEEP_C"),
            profile: CcProfile::Default,
        }
    }

    pub fn with_cache_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cache_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn with_profile(mut self, profile: CcProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_keep_c(mut self, keep_c: bool) -> Self {
        self.keep_c = self.keep_c || keep_c;
        self
    }

    /// User flags followed by the profile's flags, deduplicated.
    pub fn effective_cc_args(&self) -> Vec<String> {
        merge_cc_args(&self.cc_args, cc_profile_flags(self.profile))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_dedups_and_keeps_order() {
        let existing = vec!["-Os".to_string(), " -g ".to_string(), String::new()];
        assert_eq!(
            merge_cc_args(&existing, &["-O0", "-g"]),
            vec!["-Os", "-g", "-O0"]
        );
    }

    #[test]
    fn default_profile_adds_nothing() {
        let cfg = HarnessConfig {
            cc: "cc".into(),
            cc_args: vec!["-DX=1".to_string()],
            cache_dir: PathBuf::from("/tmp/x"),
            keep_c: false,
            profile: CcProfile::Default,
        };
        assert_eq!(cfg.effective_cc_args(), vec!["-DX=1"]);
        let cfg = cfg.with_profile(CcProfile::Debug);
        assert_eq!(cfg.effective_cc_args(), vec!["-DX=1", "-O0", "-g"]);
    }
}

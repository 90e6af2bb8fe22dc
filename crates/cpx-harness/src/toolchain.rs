use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

use cpx_contracts::CPX_NATIVE_CACHE_SALT;

use crate::config::HarnessConfig;

const STDERR_TAIL_BYTES: usize = 4000;

#[derive(Debug, Clone)]
pub struct ToolchainOutput {
    pub ok: bool,
    pub exit_status: i32,
    pub stderr: Vec<u8>,
    pub lib_path: Option<PathBuf>,
    /// The artifact already existed under its content key.
    pub cached: bool,
}

pub fn hex_lower(bytes: &[u8]) -> String {
    const LUT: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        out.push(LUT[(b >> 4) as usize] as char);
        out.push(LUT[(b & 0x0F) as usize] as char);
    }
    out
}

pub fn tail_truncate(b: &[u8], limit: usize) -> Vec<u8> {
    if b.len() <= limit {
        return b.to_vec();
    }
    let start = b.len() - limit;
    let mut out = Vec::new();
    out.extend_from_slice(b"...<truncated>...\n");
    out.extend_from_slice(&b[start..]);
    out
}

fn hash_file(hasher: &mut Sha256, path: &Path) -> Result<()> {
    let mut f = std::fs::File::open(path)
        .with_context(|| format!("open cc arg file for cache key: {}", path.display()))?;
    let mut buf = [0u8; 8192];
    loop {
        let n = f.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(())
}

fn cc_identity(cc: &std::ffi::OsStr) -> Vec<u8> {
    let mut version = Vec::new();
    if let Ok(out) = Command::new(cc).arg("--version").output() {
        version.extend_from_slice(&out.stdout);
        version.extend_from_slice(&out.stderr);
    }
    version
}

/// Content key of the artifact built from `c_source` under `config`.
pub fn cache_key(c_source: &str, config: &HarnessConfig) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(CPX_NATIVE_CACHE_SALT.as_bytes());
    hasher.update(b"\0");
    hasher.update(c_source.as_bytes());
    hasher.update(b"\0");
    hasher.update(cc_identity(&config.cc));
    hasher.update(b"\0");
    for a in config.effective_cc_args() {
        hasher.update(a.as_bytes());
        hasher.update(b"\0");
        // Linked inputs passed as flags must invalidate the key when they change.
        let p = Path::new(&a);
        if p.is_file() {
            hasher.update(b"file\0");
            hash_file(&mut hasher, p)?;
            hasher.update(b"\0");
        }
    }
    Ok(hex_lower(&hasher.finalize()))
}

fn lib_file_name(name: &str) -> String {
    format!(
        "{}{name}{}",
        std::env::consts::DLL_PREFIX,
        std::env::consts::DLL_SUFFIX
    )
}

/// Compiles `c_source` into a shared library named after `name`.
///
/// Artifacts are content addressed under `config.cache_dir`; a hit skips the
/// compiler entirely. Compiler failures are `Ok` with `ok == false` and a
/// diagnostic in `stderr`; `Err` is reserved for I/O problems.
pub fn compile_shared_lib(
    c_source: &str,
    name: &str,
    config: &HarnessConfig,
) -> Result<ToolchainOutput> {
    static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

    let key = cache_key(c_source, config)?;
    let dir = config.cache_dir.join(&key);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("create cache dir: {}", dir.display()))?;

    let lib_path = dir.join(lib_file_name(name));
    let keep_c_path = dir.join(format!("{name}.c"));

    if lib_path.exists() {
        if config.keep_c && !keep_c_path.exists() {
            let _ = std::fs::write(&keep_c_path, c_source.as_bytes());
        }
        return Ok(ToolchainOutput {
            ok: true,
            exit_status: 0,
            stderr: Vec::new(),
            lib_path: Some(lib_path),
            cached: true,
        });
    }

    let pid = std::process::id();
    let n = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_src_path = dir.join(format!("{name}_{pid}_{n}.c"));
    let tmp_lib_path = dir.join(format!("{name}_{pid}_{n}{}", std::env::consts::DLL_SUFFIX));

    std::fs::write(&tmp_src_path, c_source.as_bytes())
        .with_context(|| format!("write C source: {}", tmp_src_path.display()))?;

    let cc_args = config.effective_cc_args();
    let mut cmd = Command::new(&config.cc);
    cmd.arg("-std=c11");
    cmd.arg("-O1");
    cmd.arg("-fPIC");
    cmd.arg("-shared");
    cmd.arg(&tmp_src_path);
    cmd.arg("-o");
    cmd.arg(&tmp_lib_path);
    cmd.args(&cc_args);

    log::debug!("compiling probe {name}: {:?}", cmd);
    let out = cmd
        .output()
        .with_context(|| format!("invoke cc: {:?}", config.cc))?;
    let exit_status = out.status.code().unwrap_or(1);
    let ok = out.status.success();

    let mut stderr = out.stderr;
    if !ok {
        let mut diag = Vec::new();
        diag.extend_from_slice(b"--- cpx cc invocation ---\n");
        diag.extend_from_slice(format!("cc: {}\n", config.cc.to_string_lossy()).as_bytes());
        if !cc_args.is_empty() {
            diag.extend_from_slice(format!("args: {}\n", cc_args.join(" ")).as_bytes());
        }
        diag.extend_from_slice(b"\n--- tmp paths ---\n");
        diag.extend_from_slice(format!("src: {}\n", tmp_src_path.display()).as_bytes());
        diag.extend_from_slice(format!("lib: {}\n", tmp_lib_path.display()).as_bytes());
        if config.keep_c {
            diag.extend_from_slice(format!("keep_c: {}\n", keep_c_path.display()).as_bytes());
        }
        if !stderr.is_empty() {
            diag.extend_from_slice(b"\n--- cc stderr (tail) ---\n");
            diag.extend_from_slice(&tail_truncate(&stderr, STDERR_TAIL_BYTES));
        }
        stderr = diag;
    }

    if config.keep_c && !keep_c_path.exists() {
        if std::fs::rename(&tmp_src_path, &keep_c_path).is_err() {
            if !keep_c_path.exists() {
                let _ = std::fs::copy(&tmp_src_path, &keep_c_path);
            }
            let _ = std::fs::remove_file(&tmp_src_path);
        }
    } else {
        let _ = std::fs::remove_file(&tmp_src_path);
    }

    if !ok {
        let _ = std::fs::remove_file(&tmp_lib_path);
        return Ok(ToolchainOutput {
            ok,
            exit_status,
            stderr,
            lib_path: None,
            cached: false,
        });
    }

    match std::fs::rename(&tmp_lib_path, &lib_path) {
        Ok(()) => {}
        Err(_) if lib_path.exists() => {
            let _ = std::fs::remove_file(&tmp_lib_path);
        }
        Err(err) => {
            let copy = std::fs::copy(&tmp_lib_path, &lib_path);
            let _ = std::fs::remove_file(&tmp_lib_path);
            copy.with_context(|| format!("finalize compiled artifact: {err}"))?;
        }
    }

    Ok(ToolchainOutput {
        ok,
        exit_status,
        stderr,
        lib_path: Some(lib_path),
        cached: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_truncate_keeps_suffix() {
        assert_eq!(tail_truncate(b"abc", 8), b"abc".to_vec());
        let out = tail_truncate(b"0123456789", 3);
        assert!(out.starts_with(b"...<truncated>...\n"));
        assert!(out.ends_with(b"789"));
    }

    #[test]
    fn hex_is_lowercase() {
        assert_eq!(hex_lower(&[0x00, 0xab, 0xff]), "00abff");
    }
}

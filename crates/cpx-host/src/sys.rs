use std::collections::BTreeMap;

use crate::error::PyErr;
use crate::value::Value;

/// `sys` module attributes, resolved by name.
///
/// Reflective `getattr(sys, name)` is modelled as a lookup in this fixed
/// registry; entries are populated once from the running process.
#[derive(Debug, Clone, Default)]
pub struct SysRegistry {
    attrs: BTreeMap<String, Value>,
}

pub const SYS_API_VERSION: i64 = 1013;
pub const SYS_HEXVERSION: i64 = 0x030B_00F0;

fn host_byteorder() -> &'static str {
    if cfg!(target_endian = "little") {
        "little"
    } else {
        "big"
    }
}

fn host_platform() -> &'static str {
    if cfg!(target_os = "linux") {
        "linux"
    } else if cfg!(target_os = "macos") {
        "darwin"
    } else if cfg!(windows) {
        "win32"
    } else if cfg!(target_os = "freebsd") {
        "freebsd"
    } else {
        std::env::consts::OS
    }
}

impl SysRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry describing the current process.
    pub fn host() -> Self {
        let mut reg = Self::empty();
        reg.set("byteorder", Value::str(host_byteorder()));
        reg.set("maxsize", Value::Int(isize::MAX as i64));
        reg.set("platform", Value::str(host_platform()));
        reg.set("api_version", Value::Int(SYS_API_VERSION));
        reg.set("hexversion", Value::Int(SYS_HEXVERSION));
        reg.set(
            "version_info",
            Value::tuple([
                Value::Int(3),
                Value::Int(11),
                Value::Int(0),
                Value::str("final"),
                Value::Int(0),
            ]),
        );
        reg.set("float_repr_style", Value::str("short"));
        reg.set("dont_write_bytecode", Value::Bool(false));
        reg.set("implementation_name", Value::str("cpx"));
        if let Ok(exe) = std::env::current_exe() {
            reg.set("executable", Value::str(exe.display().to_string()));
        }
        reg
    }

    pub fn set(&mut self, name: &str, value: Value) {
        self.attrs.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attrs.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.attrs.keys().map(String::as_str)
    }

    /// `getattr(sys, name)`.
    pub fn getattr(&self, name: &str) -> Result<Value, PyErr> {
        self.get(name).cloned().ok_or_else(|| {
            PyErr::attribute(format!("module 'sys' has no attribute '{name}'"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_byteorder_is_reported() {
        let reg = SysRegistry::host();
        let v = reg.getattr("byteorder").expect("byteorder");
        assert!(v == Value::str("little") || v == Value::str("big"));
    }

    #[test]
    fn missing_attribute_is_attribute_error() {
        let err = SysRegistry::host().getattr("hello").unwrap_err();
        assert_eq!(err.class, crate::ErrorClass::AttributeError);
        assert_eq!(err.message, "module 'sys' has no attribute 'hello'");
    }
}

//! Interpreter, thread and per-module state as seen through the C ABI.
//!
//! The `#[repr(C)]` structs here are mirrored in the generated prelude; keep the
//! two in sync and bump `CPX_HOST_ABI_VERSION` when a layout changes.

use std::collections::BTreeMap;
use std::ffi::c_void;

use libc::c_char;

use crate::error::PyErr;
use crate::handles::Handle;

pub const MAIN_INTERPRETER_ID: i64 = 0;

pub const GILSTATE_LOCKED: i32 = 0x1;

#[repr(C)]
#[derive(Debug)]
pub struct InterpreterState {
    pub id: i64,
}

#[repr(C)]
#[derive(Debug)]
pub struct ThreadState {
    pub interp: *mut InterpreterState,
    pub thread_id: u64,
}

/// Prefix of `PyModuleDef` that `PyState_*` reads.
#[repr(C)]
#[derive(Debug)]
pub struct ModuleDef {
    pub m_index: isize,
    pub m_name: *const c_char,
    pub m_slots: *mut c_void,
}

/// Module objects registered through `PyState_AddModule`, keyed by def index.
#[derive(Debug, Default)]
pub struct ModuleStateTable {
    by_index: BTreeMap<isize, Handle>,
}

impl ModuleStateTable {
    pub fn find(&self, def: &ModuleDef) -> Option<Handle> {
        if !def.m_slots.is_null() || def.m_index == 0 {
            return None;
        }
        self.by_index.get(&def.m_index).copied()
    }

    /// Returns the handle that now needs an extra reference.
    pub fn add(&mut self, module: Handle, def: Option<&ModuleDef>) -> Result<Handle, PyErr> {
        let Some(def) = def else {
            return Err(PyErr::system("PyState_AddModule: Module Definition is NULL"));
        };
        if !def.m_slots.is_null() {
            return Err(PyErr::system(
                "PyState_AddModule called on module with slots",
            ));
        }
        if def.m_index <= 0 {
            return Err(PyErr::system("PyState_AddModule: Module index invalid."));
        }
        if self.by_index.get(&def.m_index) == Some(&module) {
            return Err(PyErr::system("PyState_AddModule: Module already added!"));
        }
        self.by_index.insert(def.m_index, module);
        Ok(module)
    }

    /// Returns the handle whose table reference must be released.
    pub fn remove(&mut self, def: Option<&ModuleDef>) -> Result<Handle, PyErr> {
        let Some(def) = def else {
            return Err(PyErr::system(
                "PyState_RemoveModule: Module Definition is NULL",
            ));
        };
        if !def.m_slots.is_null() {
            return Err(PyErr::system(
                "PyState_RemoveModule called on module with slots",
            ));
        }
        if def.m_index == 0 {
            return Err(PyErr::system("PyState_RemoveModule: Module index invalid."));
        }
        self.by_index
            .remove(&def.m_index)
            .ok_or_else(|| PyErr::system("PyState_RemoveModule: Module index out of bounds."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(index: isize) -> ModuleDef {
        ModuleDef {
            m_index: index,
            m_name: std::ptr::null(),
            m_slots: std::ptr::null_mut(),
        }
    }

    #[test]
    fn add_find_remove() {
        let mut table = ModuleStateTable::default();
        let h = Handle::from_raw(64).expect("handle");
        assert_eq!(table.find(&def(3)), None);
        table.add(h, Some(&def(3))).expect("add");
        assert_eq!(table.find(&def(3)), Some(h));
        assert!(table.add(h, Some(&def(3))).is_err());
        assert_eq!(table.remove(Some(&def(3))).expect("remove"), h);
        assert!(table.remove(Some(&def(3))).is_err());
    }

    #[test]
    fn index_zero_and_slots_are_rejected() {
        let mut table = ModuleStateTable::default();
        let h = Handle::from_raw(64).expect("handle");
        let err = table.add(h, Some(&def(0))).unwrap_err();
        assert_eq!(err.message, "PyState_AddModule: Module index invalid.");

        let mut with_slots = def(2);
        let mut slot = 0u8;
        with_slots.m_slots = (&mut slot as *mut u8).cast();
        let err = table.remove(Some(&with_slots)).unwrap_err();
        assert_eq!(err.message, "PyState_RemoveModule called on module with slots");
        assert_eq!(table.find(&with_slots), None);
    }
}

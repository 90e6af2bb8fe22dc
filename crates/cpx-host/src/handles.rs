use std::num::NonZeroUsize;

use crate::error::PyErr;
use crate::value::Value;

const HANDLE_ALIGN: usize = 8;

// Singletons occupy the first three slots of every table.
pub const RAW_NONE: usize = HANDLE_ALIGN;
pub const RAW_FALSE: usize = 2 * HANDLE_ALIGN;
pub const RAW_TRUE: usize = 3 * HANDLE_ALIGN;

/// Opaque `PyObject*` value handed to native code.
///
/// Encoded as `(slot + 1) * 8` so it looks like an aligned, non-null pointer;
/// native code must never dereference it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(NonZeroUsize);

impl Handle {
    fn from_slot(slot: usize) -> Self {
        let raw = (slot + 1) * HANDLE_ALIGN;
        Handle(NonZeroUsize::MIN.saturating_add(raw - 1))
    }

    pub fn from_raw(raw: usize) -> Option<Self> {
        if raw % HANDLE_ALIGN != 0 {
            return None;
        }
        NonZeroUsize::new(raw).map(Handle)
    }

    pub fn raw(self) -> usize {
        self.0.get()
    }

    fn slot(self) -> usize {
        self.0.get() / HANDLE_ALIGN - 1
    }
}

#[derive(Debug)]
struct Slot {
    value: Value,
    refcnt: u32,
    immortal: bool,
}

/// Per-session object table backing every `PyObject*` native code sees.
///
/// Slots are never reused within a session, so a stale handle is reported as
/// such instead of silently aliasing a newer object.
#[derive(Debug)]
pub struct HandleTable {
    slots: Vec<Option<Slot>>,
    none: Handle,
    false_: Handle,
    true_: Handle,
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

impl HandleTable {
    pub fn new() -> Self {
        let mut table = HandleTable {
            slots: Vec::new(),
            none: Handle::from_slot(0),
            false_: Handle::from_slot(0),
            true_: Handle::from_slot(0),
        };
        table.none = table.push(Value::None, true);
        table.false_ = table.push(Value::Bool(false), true);
        table.true_ = table.push(Value::Bool(true), true);
        table
    }

    fn push(&mut self, value: Value, immortal: bool) -> Handle {
        self.slots.push(Some(Slot {
            value,
            refcnt: 1,
            immortal,
        }));
        Handle::from_slot(self.slots.len() - 1)
    }

    pub fn none(&self) -> Handle {
        self.none
    }

    pub fn bool(&self, b: bool) -> Handle {
        if b {
            self.true_
        } else {
            self.false_
        }
    }

    /// New reference. Singletons map onto their immortal handles.
    pub fn alloc(&mut self, value: Value) -> Handle {
        match value {
            Value::None => self.none,
            Value::Bool(b) => self.bool(b),
            value => self.push(value, false),
        }
    }

    pub fn get(&self, h: Handle) -> Result<&Value, PyErr> {
        match self.slots.get(h.slot()) {
            Some(Some(slot)) => Ok(&slot.value),
            Some(None) => Err(PyErr::system(format!(
                "use of released object handle {:#x}",
                h.raw()
            ))),
            None => Err(PyErr::system(format!(
                "unknown object handle {:#x}",
                h.raw()
            ))),
        }
    }

    pub fn incref(&mut self, h: Handle) -> Result<(), PyErr> {
        self.get(h)?;
        if let Some(Some(slot)) = self.slots.get_mut(h.slot()) {
            if !slot.immortal {
                slot.refcnt = slot.refcnt.saturating_add(1);
            }
        }
        Ok(())
    }

    pub fn decref(&mut self, h: Handle) -> Result<(), PyErr> {
        self.get(h)?;
        let entry = &mut self.slots[h.slot()];
        if let Some(slot) = entry {
            if slot.immortal {
                return Ok(());
            }
            slot.refcnt -= 1;
            if slot.refcnt == 0 {
                *entry = None;
            }
        }
        Ok(())
    }

    pub fn refcnt(&self, h: Handle) -> Option<u32> {
        match self.slots.get(h.slot()) {
            Some(Some(slot)) => Some(slot.refcnt),
            _ => None,
        }
    }

    /// Number of mortal objects still alive.
    pub fn live_objects(&self) -> usize {
        self.slots
            .iter()
            .flatten()
            .filter(|slot| !slot.immortal)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn singleton_handles_are_fixed() {
        let table = HandleTable::new();
        assert_eq!(table.none().raw(), RAW_NONE);
        assert_eq!(table.bool(false).raw(), RAW_FALSE);
        assert_eq!(table.bool(true).raw(), RAW_TRUE);
    }

    #[test]
    fn singletons_are_immortal() {
        let mut table = HandleTable::new();
        let none = table.alloc(Value::None);
        assert_eq!(none, table.none());
        table.decref(none).expect("decref none");
        table.decref(none).expect("decref none again");
        assert_eq!(table.get(none).expect("none alive"), &Value::None);
    }

    #[test]
    fn released_handle_is_reported() {
        let mut table = HandleTable::new();
        let h = table.alloc(Value::Int(7));
        table.incref(h).expect("incref");
        table.decref(h).expect("decref");
        assert_eq!(table.refcnt(h), Some(1));
        table.decref(h).expect("decref to zero");
        let err = table.get(h).unwrap_err();
        assert!(err.message.contains("released"), "{}", err.message);
        assert_eq!(table.live_objects(), 0);
    }

    #[test]
    fn raw_encoding_rejects_misaligned() {
        assert!(Handle::from_raw(0).is_none());
        assert!(Handle::from_raw(12).is_none());
        assert_eq!(Handle::from_raw(16).map(Handle::raw), Some(16));
    }
}

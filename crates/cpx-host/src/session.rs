//! Per-invocation host state reachable from `extern "C"` entry points.
//!
//! C code calls back into the host without a context argument, so the state
//! lives in a thread-local frame installed by [`Session::enter`] for exactly
//! the duration of one probe invocation.

use std::cell::RefCell;
use std::ffi::CString;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::capi::CObject;
use crate::error::PyErr;
use crate::handles::{Handle, HandleTable};
use crate::runtime::HostRuntime;
use crate::state::{ModuleStateTable, ThreadState};
use crate::value::Value;

pub(crate) struct Frame {
    pub(crate) runtime: Arc<HostRuntime>,
    pub(crate) handles: HandleTable,
    pub(crate) error: Option<PyErr>,
    pub(crate) thread_state: Box<ThreadState>,
    pub(crate) gil_depth: u32,
    pub(crate) modules: ModuleStateTable,
    // Buffers handed out as `const char*`; they live until the session ends.
    strings: Vec<CString>,
}

thread_local! {
    static ACTIVE: RefCell<Option<Frame>> = const { RefCell::new(None) };
}

/// Runs `f` against the active frame; `None` when no session is active on this
/// thread (native code called outside an invocation).
pub(crate) fn with_frame<R>(f: impl FnOnce(&mut Frame) -> R) -> Option<R> {
    ACTIVE.with(|cell| {
        let mut guard = cell.try_borrow_mut().ok()?;
        let frame = guard.as_mut()?;
        Some(f(frame))
    })
}

pub(crate) fn handle_of(obj: *const CObject) -> Result<Handle, PyErr> {
    if obj.is_null() {
        return Err(PyErr::system("NULL object passed to host API"));
    }
    Handle::from_raw(obj as usize)
        .ok_or_else(|| PyErr::system(format!("invalid object pointer {:p}", obj)))
}

pub(crate) fn ptr_of(h: Handle) -> *mut CObject {
    h.raw() as *mut CObject
}

impl Frame {
    fn new(runtime: Arc<HostRuntime>) -> Self {
        let thread_state = Box::new(ThreadState {
            interp: runtime.main_interpreter_ptr(),
            thread_id: current_thread_id(),
        });
        Frame {
            runtime,
            handles: HandleTable::new(),
            error: None,
            thread_state,
            gil_depth: 0,
            modules: ModuleStateTable::default(),
            strings: Vec::new(),
        }
    }

    pub(crate) fn set_error(&mut self, err: PyErr) {
        self.error = Some(err);
    }

    pub(crate) fn value(&self, obj: *const CObject) -> Result<&Value, PyErr> {
        let h = handle_of(obj)?;
        self.handles.get(h)
    }

    pub(crate) fn new_ref(&mut self, value: Value) -> *mut CObject {
        ptr_of(self.handles.alloc(value))
    }

    /// Interns `s` as a NUL-terminated buffer owned by the session.
    pub(crate) fn c_string(&mut self, s: &[u8]) -> Result<*const libc::c_char, PyErr> {
        let c = CString::new(crate::error::try_copy(s)?)
            .map_err(|_| PyErr::new(crate::ErrorClass::ValueError, "embedded null character"))?;
        let ptr = c.as_ptr();
        self.strings.push(c);
        Ok(ptr)
    }

    pub(crate) fn thread_state_ptr(&mut self) -> *mut ThreadState {
        &mut *self.thread_state as *mut ThreadState
    }
}

fn current_thread_id() -> u64 {
    use std::hash::{Hash, Hasher};
    let mut h = std::collections::hash_map::DefaultHasher::new();
    std::thread::current().id().hash(&mut h);
    h.finish()
}

/// Guard for one probe invocation on the current thread.
///
/// Not `Send`: the frame is thread-local.
pub struct Session {
    _not_send: PhantomData<*const ()>,
}

impl Session {
    pub fn enter(runtime: Arc<HostRuntime>) -> Result<Self, PyErr> {
        ACTIVE.with(|cell| {
            let mut slot = cell
                .try_borrow_mut()
                .map_err(|_| PyErr::system("host session is busy"))?;
            if slot.is_some() {
                return Err(PyErr::system("host session already active on this thread"));
            }
            *slot = Some(Frame::new(runtime));
            Ok(())
        })?;
        Ok(Session {
            _not_send: PhantomData,
        })
    }

    // The frame lives as long as the guard; `None` only if it was torn down
    // underneath us by a reentrant borrow.
    fn frame<R>(&self, f: impl FnOnce(&mut Frame) -> R) -> Option<R> {
        with_frame(f)
    }

    /// New reference to a host object for native code. NULL if the frame is
    /// unavailable.
    pub fn import(&self, value: &Value) -> *mut CObject {
        self.frame(|frame| frame.new_ref(value.clone()))
            .unwrap_or(std::ptr::null_mut())
    }

    pub fn export(&self, obj: *const CObject) -> Result<Value, PyErr> {
        self.frame(|frame| frame.value(obj).cloned())
            .unwrap_or_else(|| Err(PyErr::system("host session frame is unavailable")))
    }

    pub fn release(&self, obj: *const CObject) -> Result<(), PyErr> {
        self.frame(|frame| {
            let h = handle_of(obj)?;
            frame.handles.decref(h)
        })
        .unwrap_or_else(|| Err(PyErr::system("host session frame is unavailable")))
    }

    pub fn error_is_set(&self) -> bool {
        self.frame(|frame| frame.error.is_some()).unwrap_or(false)
    }

    pub fn take_error(&self) -> Option<PyErr> {
        self.frame(|frame| frame.error.take()).flatten()
    }

    pub fn live_objects(&self) -> usize {
        self.frame(|frame| frame.handles.live_objects()).unwrap_or(0)
    }

    pub fn gil_depth(&self) -> u32 {
        self.frame(|frame| frame.gil_depth).unwrap_or(0)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let frame = ACTIVE.with(|cell| cell.try_borrow_mut().ok().and_then(|mut s| s.take()));
        if let Some(frame) = frame {
            if frame.gil_depth != 0 {
                log::debug!("session ended with GIL depth {}", frame.gil_depth);
            }
        }
    }
}

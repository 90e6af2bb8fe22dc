//! C function table exposed to synthesized probe modules.
//!
//! Every entry point resolves its state through the thread-local session frame.
//! Outside a session, object-returning calls yield NULL and status-returning
//! calls yield their documented failure value. None of these functions may
//! panic: they run on the far side of an `extern "C"` boundary.

mod prelude;

use std::ffi::CStr;
use std::ptr;

use libc::{c_char, c_int, c_long, c_longlong, c_ulong};

use crate::error::{try_copy, try_zeroed, ErrorClass, PyErr};
use crate::handles::{RAW_FALSE, RAW_NONE, RAW_TRUE};
use crate::session::{handle_of, ptr_of, with_frame, Frame};
use crate::state::{InterpreterState, ModuleDef, ThreadState, GILSTATE_LOCKED};
use crate::value::Value;

pub use prelude::{c_prelude, C_API_FUNCTIONS, PRELUDE_NAMES};

/// Opaque object type behind every `PyObject*`.
#[repr(C)]
pub struct CObject {
    _private: [u8; 0],
}

pub type ProbeFn = unsafe extern "C" fn(*mut CObject, *mut CObject) -> *mut CObject;
pub type ProbeInitFn = unsafe extern "C" fn(*const HostApi) -> *const ProbeDef;

/// Registration record returned by a probe module's init symbol.
#[repr(C)]
pub struct ProbeDef {
    pub abi_version: u32,
    pub name: *const c_char,
    pub call: Option<ProbeFn>,
    pub arity: isize,
}

/// Mirrored field-for-field by `cpx_api` in the generated prelude.
#[repr(C)]
pub struct HostApi {
    pub abi_version: u32,
    pub none: usize,
    pub false_: usize,
    pub true_: usize,

    pub err_set_string: extern "C" fn(c_int, *const c_char),
    pub err_occurred: extern "C" fn() -> c_int,
    pub err_clear: extern "C" fn(),
    pub incref: extern "C" fn(*mut CObject),
    pub decref: extern "C" fn(*mut CObject),

    pub sys_get_object: extern "C" fn(*const c_char) -> *mut CObject,

    pub long_from_long: extern "C" fn(c_long) -> *mut CObject,
    pub long_as_long: extern "C" fn(*mut CObject) -> c_long,
    pub float_from_double: extern "C" fn(f64) -> *mut CObject,
    pub float_as_double: extern "C" fn(*mut CObject) -> f64,
    pub bool_from_long: extern "C" fn(c_long) -> *mut CObject,
    pub unicode_from_string: extern "C" fn(*const c_char) -> *mut CObject,
    pub unicode_as_utf8: extern "C" fn(*mut CObject) -> *const c_char,
    pub bytes_from_string_and_size: extern "C" fn(*const c_char, isize) -> *mut CObject,
    pub tuple_size: extern "C" fn(*mut CObject) -> isize,
    pub tuple_get_item: extern "C" fn(*mut CObject, isize) -> *mut CObject,

    pub thread_state_get: extern "C" fn() -> *mut ThreadState,
    pub interpreter_state_main: extern "C" fn() -> *mut InterpreterState,
    pub interpreter_state_get_id: extern "C" fn(*mut InterpreterState) -> i64,
    pub interpreter_state_get_id_from_thread_state: extern "C" fn(*mut ThreadState) -> i64,
    pub gil_state_ensure: extern "C" fn() -> c_int,
    pub gil_state_release: extern "C" fn(c_int),
    pub gil_state_get_this_thread_state: extern "C" fn() -> *mut ThreadState,
    pub state_find_module: extern "C" fn(*mut ModuleDef) -> *mut CObject,
    pub state_add_module: extern "C" fn(*mut CObject, *mut ModuleDef) -> c_int,
    pub state_remove_module: extern "C" fn(*mut ModuleDef) -> c_int,

    pub arg_check_count: extern "C" fn(*mut CObject, isize, *const c_char) -> c_int,
    pub arg_object: extern "C" fn(*mut CObject, isize, *mut *mut CObject) -> c_int,
    pub arg_string: extern "C" fn(*mut CObject, isize, *mut *const c_char) -> c_int,
    pub arg_string_or_none: extern "C" fn(*mut CObject, isize, *mut *const c_char) -> c_int,
    pub arg_bytes: extern "C" fn(*mut CObject, isize, *mut *const c_char) -> c_int,
    pub arg_int: extern "C" fn(*mut CObject, isize, *mut c_int) -> c_int,
    pub arg_long: extern "C" fn(*mut CObject, isize, *mut c_long) -> c_int,
    pub arg_ssize: extern "C" fn(*mut CObject, isize, *mut isize) -> c_int,
    pub arg_longlong: extern "C" fn(*mut CObject, isize, *mut c_longlong) -> c_int,
    pub arg_ulong: extern "C" fn(*mut CObject, isize, *mut c_ulong) -> c_int,
    pub arg_double: extern "C" fn(*mut CObject, isize, *mut f64) -> c_int,
    pub arg_float: extern "C" fn(*mut CObject, isize, *mut f32) -> c_int,
    pub arg_predicate: extern "C" fn(*mut CObject, isize, *mut c_int) -> c_int,

    pub build_none: extern "C" fn() -> *mut CObject,
    pub build_object: extern "C" fn(*mut CObject) -> *mut CObject,
    pub build_object_steal: extern "C" fn(*mut CObject) -> *mut CObject,
    pub build_long: extern "C" fn(c_long) -> *mut CObject,
    pub build_ssize: extern "C" fn(isize) -> *mut CObject,
    pub build_longlong: extern "C" fn(c_longlong) -> *mut CObject,
    pub build_ulong: extern "C" fn(c_ulong) -> *mut CObject,
    pub build_double: extern "C" fn(f64) -> *mut CObject,
    pub build_string: extern "C" fn(*const c_char) -> *mut CObject,
    pub build_bytes: extern "C" fn(*const c_char) -> *mut CObject,
}

pub static HOST_API: HostApi = HostApi {
    abi_version: cpx_contracts::CPX_HOST_ABI_VERSION,
    none: RAW_NONE,
    false_: RAW_FALSE,
    true_: RAW_TRUE,

    err_set_string,
    err_occurred,
    err_clear,
    incref,
    decref,

    sys_get_object,

    long_from_long,
    long_as_long,
    float_from_double,
    float_as_double,
    bool_from_long,
    unicode_from_string,
    unicode_as_utf8,
    bytes_from_string_and_size,
    tuple_size,
    tuple_get_item,

    thread_state_get,
    interpreter_state_main,
    interpreter_state_get_id,
    interpreter_state_get_id_from_thread_state,
    gil_state_ensure,
    gil_state_release,
    gil_state_get_this_thread_state,
    state_find_module,
    state_add_module,
    state_remove_module,

    arg_check_count,
    arg_object,
    arg_string,
    arg_string_or_none,
    arg_bytes,
    arg_int,
    arg_long,
    arg_ssize,
    arg_longlong,
    arg_ulong,
    arg_double,
    arg_float,
    arg_predicate,

    build_none,
    build_object,
    build_object_steal,
    build_long,
    build_ssize,
    build_longlong,
    build_ulong,
    build_double,
    build_string,
    build_bytes,
};

/// Runs `f` in the active frame, converting `Err` into the error indicator
/// plus `fallback`.
fn guarded<T: Copy>(fallback: T, f: impl FnOnce(&mut Frame) -> Result<T, PyErr>) -> T {
    with_frame(|frame| match f(frame) {
        Ok(v) => v,
        Err(err) => {
            frame.set_error(err);
            fallback
        }
    })
    .unwrap_or(fallback)
}

fn bad_internal_call() -> PyErr {
    PyErr::system("bad argument to internal function")
}

fn c_str_bytes<'a>(s: *const c_char) -> Option<&'a [u8]> {
    if s.is_null() {
        return None;
    }
    // SAFETY: native callers pass NUL-terminated strings that outlive the call.
    Some(unsafe { CStr::from_ptr(s) }.to_bytes())
}

fn utf8(bytes: &[u8]) -> Result<String, PyErr> {
    String::from_utf8(try_copy(bytes)?).map_err(|e| {
        PyErr::new(
            ErrorClass::ValueError,
            format!(
                "'utf-8' codec can't decode byte at position {}: invalid utf-8",
                e.utf8_error().valid_up_to()
            ),
        )
    })
}

fn int_of(v: &Value) -> Result<i64, PyErr> {
    v.as_int().ok_or_else(|| {
        PyErr::type_error(format!(
            "'{}' object cannot be interpreted as an integer",
            v.type_name()
        ))
    })
}

fn real_of(v: &Value) -> Result<f64, PyErr> {
    match v {
        Value::Float(x) => Ok(*x),
        v => v
            .as_int()
            .map(|i| i as f64)
            .ok_or_else(|| PyErr::type_error(format!("must be real number, not {}", v.type_name()))),
    }
}

fn c_long_of(i: i64) -> Result<c_long, PyErr> {
    c_long::try_from(i).map_err(|_| PyErr::overflow("Python int too large to convert to C long"))
}

// --- errors and reference counts -------------------------------------------

extern "C" fn err_set_string(class: c_int, msg: *const c_char) {
    with_frame(|frame| {
        let class = ErrorClass::from_code(class).unwrap_or(ErrorClass::SystemError);
        let message = c_str_bytes(msg)
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .unwrap_or_default();
        frame.set_error(PyErr::new(class, message));
    });
}

extern "C" fn err_occurred() -> c_int {
    with_frame(|frame| frame.error.as_ref().map(|e| e.class.code()).unwrap_or(0)).unwrap_or(0)
}

extern "C" fn err_clear() {
    with_frame(|frame| frame.error = None);
}

extern "C" fn incref(obj: *mut CObject) {
    if obj.is_null() {
        return;
    }
    guarded((), |frame| frame.handles.incref(handle_of(obj)?));
}

extern "C" fn decref(obj: *mut CObject) {
    if obj.is_null() {
        return;
    }
    guarded((), |frame| frame.handles.decref(handle_of(obj)?));
}

// --- sys --------------------------------------------------------------------

/// Borrowed reference; NULL without an exception when the name is unknown.
extern "C" fn sys_get_object(name: *const c_char) -> *mut CObject {
    guarded(ptr::null_mut(), |frame| {
        let Some(name) = c_str_bytes(name) else {
            return Ok(ptr::null_mut());
        };
        let name = String::from_utf8_lossy(name);
        match frame.runtime.sys().get(&name).cloned() {
            Some(v) => Ok(frame.new_ref(v)),
            None => Ok(ptr::null_mut()),
        }
    })
}

// --- numbers, strings, tuples ------------------------------------------------

extern "C" fn long_from_long(v: c_long) -> *mut CObject {
    guarded(ptr::null_mut(), |frame| Ok(frame.new_ref(Value::Int(v as i64))))
}

extern "C" fn long_as_long(obj: *mut CObject) -> c_long {
    guarded(-1, |frame| {
        if obj.is_null() {
            return Err(bad_internal_call());
        }
        let i = int_of(frame.value(obj)?)?;
        c_long_of(i)
    })
}

extern "C" fn float_from_double(v: f64) -> *mut CObject {
    guarded(ptr::null_mut(), |frame| Ok(frame.new_ref(Value::Float(v))))
}

extern "C" fn float_as_double(obj: *mut CObject) -> f64 {
    guarded(-1.0, |frame| {
        if obj.is_null() {
            return Err(bad_internal_call());
        }
        real_of(frame.value(obj)?)
    })
}

extern "C" fn bool_from_long(v: c_long) -> *mut CObject {
    guarded(ptr::null_mut(), |frame| Ok(ptr_of(frame.handles.bool(v != 0))))
}

extern "C" fn unicode_from_string(s: *const c_char) -> *mut CObject {
    guarded(ptr::null_mut(), |frame| {
        let bytes = c_str_bytes(s).ok_or_else(bad_internal_call)?;
        let s = utf8(bytes)?;
        Ok(frame.new_ref(Value::Str(s)))
    })
}

extern "C" fn unicode_as_utf8(obj: *mut CObject) -> *const c_char {
    guarded(ptr::null(), |frame| {
        if obj.is_null() {
            return Err(bad_internal_call());
        }
        let s = match frame.value(obj)? {
            Value::Str(s) => s.clone(),
            _ => return Err(PyErr::type_error("bad argument type for built-in operation")),
        };
        frame.c_string(s.as_bytes())
    })
}

extern "C" fn bytes_from_string_and_size(s: *const c_char, len: isize) -> *mut CObject {
    guarded(ptr::null_mut(), |frame| {
        if len < 0 {
            return Err(PyErr::system(
                "Negative size passed to PyBytes_FromStringAndSize",
            ));
        }
        let bytes = if s.is_null() {
            try_zeroed(len as usize)?
        } else {
            // SAFETY: the caller guarantees `len` readable bytes at `s`.
            try_copy(unsafe { std::slice::from_raw_parts(s as *const u8, len as usize) })?
        };
        Ok(frame.new_ref(Value::Bytes(bytes)))
    })
}

extern "C" fn tuple_size(obj: *mut CObject) -> isize {
    guarded(-1, |frame| {
        if obj.is_null() {
            return Err(bad_internal_call());
        }
        match frame.value(obj)? {
            Value::Tuple(items) => Ok(items.len() as isize),
            _ => Err(bad_internal_call()),
        }
    })
}

/// Borrowed in the C-API; here the item handle is owned by the session.
extern "C" fn tuple_get_item(obj: *mut CObject, index: isize) -> *mut CObject {
    guarded(ptr::null_mut(), |frame| {
        if obj.is_null() {
            return Err(bad_internal_call());
        }
        let item = match frame.value(obj)? {
            Value::Tuple(items) => usize::try_from(index)
                .ok()
                .and_then(|i| items.get(i))
                .cloned()
                .ok_or_else(|| PyErr::new(ErrorClass::IndexError, "tuple index out of range"))?,
            _ => return Err(bad_internal_call()),
        };
        Ok(frame.new_ref(item))
    })
}

// --- interpreter / thread state ----------------------------------------------

extern "C" fn thread_state_get() -> *mut ThreadState {
    with_frame(|frame| frame.thread_state_ptr()).unwrap_or(ptr::null_mut())
}

extern "C" fn interpreter_state_main() -> *mut InterpreterState {
    with_frame(|frame| frame.runtime.main_interpreter_ptr()).unwrap_or(ptr::null_mut())
}

extern "C" fn interpreter_state_get_id(interp: *mut InterpreterState) -> i64 {
    guarded(-1, |_| {
        if interp.is_null() {
            return Err(PyErr::new(ErrorClass::RuntimeError, "no interpreter provided"));
        }
        // SAFETY: interpreter pointers only originate from this host.
        Ok(unsafe { (*interp).id })
    })
}

extern "C" fn interpreter_state_get_id_from_thread_state(ts: *mut ThreadState) -> i64 {
    guarded(-1, |_| {
        if ts.is_null() {
            return Err(PyErr::new(ErrorClass::RuntimeError, "no thread state provided"));
        }
        // SAFETY: thread-state pointers only originate from this host.
        let interp = unsafe { (*ts).interp };
        if interp.is_null() {
            return Err(PyErr::new(ErrorClass::RuntimeError, "no interpreter provided"));
        }
        // SAFETY: as above.
        Ok(unsafe { (*interp).id })
    })
}

extern "C" fn gil_state_ensure() -> c_int {
    with_frame(|frame| {
        frame.gil_depth += 1;
        if frame.gil_depth == 1 {
            GILSTATE_LOCKED
        } else {
            0
        }
    })
    .unwrap_or(0)
}

/// Every release balances one ensure; `state` only records whether this pair
/// took the lock first.
extern "C" fn gil_state_release(state: c_int) {
    with_frame(|frame| {
        if frame.gil_depth == 0 {
            frame.set_error(PyErr::new(
                ErrorClass::RuntimeError,
                "auto-releasing thread-state, but no thread-state for this thread",
            ));
            return;
        }
        frame.gil_depth -= 1;
        if state & GILSTATE_LOCKED != 0 && frame.gil_depth != 0 {
            log::debug!("GIL released out of order at depth {}", frame.gil_depth);
        }
    });
}

extern "C" fn gil_state_get_this_thread_state() -> *mut ThreadState {
    thread_state_get()
}

fn module_def<'a>(def: *mut ModuleDef) -> Option<&'a ModuleDef> {
    // SAFETY: a non-null def points at a `PyModuleDef` owned by the module.
    unsafe { def.as_ref() }
}

extern "C" fn state_find_module(def: *mut ModuleDef) -> *mut CObject {
    guarded(ptr::null_mut(), |frame| {
        let Some(def) = module_def(def) else {
            return Ok(ptr::null_mut());
        };
        Ok(frame.modules.find(def).map(ptr_of).unwrap_or(ptr::null_mut()))
    })
}

extern "C" fn state_add_module(module: *mut CObject, def: *mut ModuleDef) -> c_int {
    guarded(-1, |frame| {
        let module = handle_of(module)?;
        let added = frame.modules.add(module, module_def(def))?;
        frame.handles.incref(added)?;
        Ok(0)
    })
}

extern "C" fn state_remove_module(def: *mut ModuleDef) -> c_int {
    guarded(-1, |frame| {
        let removed = frame.modules.remove(module_def(def))?;
        frame.handles.decref(removed)?;
        Ok(0)
    })
}

// --- PyArg_ParseTuple units ----------------------------------------------------

fn args_tuple(frame: &Frame, args: *mut CObject) -> Result<&[Value], PyErr> {
    match frame.value(args)? {
        Value::Tuple(items) => Ok(items),
        _ => Err(PyErr::system(
            "new style getargs format but argument is not a tuple",
        )),
    }
}

fn arg_at(frame: &Frame, args: *mut CObject, index: isize) -> Result<Value, PyErr> {
    let items = args_tuple(frame, args)?;
    usize::try_from(index)
        .ok()
        .and_then(|i| items.get(i))
        .cloned()
        .ok_or_else(|| PyErr::system(format!("argument index {index} out of range")))
}

fn must_be(index: isize, expected: &str, got: &Value) -> PyErr {
    PyErr::type_error(format!(
        "argument {} must be {expected}, not {}",
        index + 1,
        got.type_name()
    ))
}

/// Converts argument `index` and stores it through `out`.
fn unpack<T>(
    args: *mut CObject,
    index: isize,
    out: *mut T,
    convert: impl FnOnce(&mut Frame, Value) -> Result<T, PyErr>,
) -> c_int {
    guarded(0, |frame| {
        if out.is_null() {
            return Err(bad_internal_call());
        }
        let v = arg_at(frame, args, index)?;
        let converted = convert(frame, v)?;
        // SAFETY: `out` is a non-null pointer to a local in the generated wrapper.
        unsafe { out.write(converted) };
        Ok(1)
    })
}

extern "C" fn arg_check_count(args: *mut CObject, expected: isize, fname: *const c_char) -> c_int {
    guarded(0, |frame| {
        let given = args_tuple(frame, args)?.len() as isize;
        if given == expected {
            return Ok(1);
        }
        let fname = c_str_bytes(fname)
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .unwrap_or_else(|| "function".to_string());
        let msg = match expected {
            0 => format!("{fname}() takes no arguments ({given} given)"),
            1 => format!("{fname}() takes exactly one argument ({given} given)"),
            n => format!("{fname}() takes exactly {n} arguments ({given} given)"),
        };
        Err(PyErr::type_error(msg))
    })
}

extern "C" fn arg_object(args: *mut CObject, index: isize, out: *mut *mut CObject) -> c_int {
    unpack(args, index, out, |frame, v| Ok(frame.new_ref(v)))
}

extern "C" fn arg_string(args: *mut CObject, index: isize, out: *mut *const c_char) -> c_int {
    unpack(args, index, out, |frame, v| match v {
        Value::Str(s) => frame.c_string(s.as_bytes()),
        other => Err(must_be(index, "str", &other)),
    })
}

extern "C" fn arg_string_or_none(
    args: *mut CObject,
    index: isize,
    out: *mut *const c_char,
) -> c_int {
    unpack(args, index, out, |frame, v| match v {
        Value::None => Ok(ptr::null()),
        Value::Str(s) => frame.c_string(s.as_bytes()),
        other => Err(must_be(index, "str or None", &other)),
    })
}

extern "C" fn arg_bytes(args: *mut CObject, index: isize, out: *mut *const c_char) -> c_int {
    unpack(args, index, out, |frame, v| match v {
        Value::Bytes(b) => frame
            .c_string(&b)
            .map_err(|_| PyErr::new(ErrorClass::ValueError, "embedded null byte")),
        other => Err(must_be(index, "bytes", &other)),
    })
}

extern "C" fn arg_int(args: *mut CObject, index: isize, out: *mut c_int) -> c_int {
    unpack(args, index, out, |_, v| {
        let i = int_of(&v)?;
        if i > c_int::MAX as i64 {
            return Err(PyErr::overflow("signed integer is greater than maximum"));
        }
        if i < c_int::MIN as i64 {
            return Err(PyErr::overflow("signed integer is less than minimum"));
        }
        Ok(i as c_int)
    })
}

extern "C" fn arg_long(args: *mut CObject, index: isize, out: *mut c_long) -> c_int {
    unpack(args, index, out, |_, v| c_long_of(int_of(&v)?))
}

extern "C" fn arg_ssize(args: *mut CObject, index: isize, out: *mut isize) -> c_int {
    unpack(args, index, out, |_, v| {
        isize::try_from(int_of(&v)?)
            .map_err(|_| PyErr::overflow("Python int too large to convert to C ssize_t"))
    })
}

extern "C" fn arg_longlong(args: *mut CObject, index: isize, out: *mut c_longlong) -> c_int {
    unpack(args, index, out, |_, v| Ok(int_of(&v)? as c_longlong))
}

/// `k` does no overflow checking; negative values wrap like the C-API.
extern "C" fn arg_ulong(args: *mut CObject, index: isize, out: *mut c_ulong) -> c_int {
    unpack(args, index, out, |_, v| match v.as_int() {
        Some(i) => Ok(i as c_ulong),
        None => Err(must_be(index, "int", &v)),
    })
}

extern "C" fn arg_double(args: *mut CObject, index: isize, out: *mut f64) -> c_int {
    unpack(args, index, out, |_, v| real_of(&v))
}

extern "C" fn arg_float(args: *mut CObject, index: isize, out: *mut f32) -> c_int {
    unpack(args, index, out, |_, v| real_of(&v).map(|x| x as f32))
}

extern "C" fn arg_predicate(args: *mut CObject, index: isize, out: *mut c_int) -> c_int {
    unpack(args, index, out, |_, v| Ok(v.is_truthy() as c_int))
}

// --- Py_BuildValue units ---------------------------------------------------------

extern "C" fn build_none() -> *mut CObject {
    guarded(ptr::null_mut(), |frame| Ok(ptr_of(frame.handles.none())))
}

fn null_to_build_error(frame: &mut Frame) -> Result<*mut CObject, PyErr> {
    if frame.error.is_none() {
        return Err(PyErr::system("NULL object passed to Py_BuildValue"));
    }
    Ok(ptr::null_mut())
}

extern "C" fn build_object(obj: *mut CObject) -> *mut CObject {
    guarded(ptr::null_mut(), |frame| {
        if obj.is_null() {
            return null_to_build_error(frame);
        }
        frame.handles.incref(handle_of(obj)?)?;
        Ok(obj)
    })
}

extern "C" fn build_object_steal(obj: *mut CObject) -> *mut CObject {
    guarded(ptr::null_mut(), |frame| {
        if obj.is_null() {
            return null_to_build_error(frame);
        }
        frame.value(obj)?;
        Ok(obj)
    })
}

extern "C" fn build_long(v: c_long) -> *mut CObject {
    long_from_long(v)
}

extern "C" fn build_ssize(v: isize) -> *mut CObject {
    guarded(ptr::null_mut(), |frame| Ok(frame.new_ref(Value::Int(v as i64))))
}

extern "C" fn build_longlong(v: c_longlong) -> *mut CObject {
    guarded(ptr::null_mut(), |frame| Ok(frame.new_ref(Value::Int(v as i64))))
}

extern "C" fn build_ulong(v: c_ulong) -> *mut CObject {
    guarded(ptr::null_mut(), |frame| {
        let i = i64::try_from(v as u64)
            .map_err(|_| PyErr::overflow("unsigned value does not fit the host int range"))?;
        Ok(frame.new_ref(Value::Int(i)))
    })
}

extern "C" fn build_double(v: f64) -> *mut CObject {
    float_from_double(v)
}

extern "C" fn build_string(s: *const c_char) -> *mut CObject {
    guarded(ptr::null_mut(), |frame| match c_str_bytes(s) {
        None => Ok(ptr_of(frame.handles.none())),
        Some(bytes) => {
            let s = utf8(bytes)?;
            Ok(frame.new_ref(Value::Str(s)))
        }
    })
}

extern "C" fn build_bytes(s: *const c_char) -> *mut CObject {
    guarded(ptr::null_mut(), |frame| match c_str_bytes(s) {
        None => Ok(ptr_of(frame.handles.none())),
        Some(bytes) => Ok(frame.new_ref(Value::Bytes(try_copy(bytes)?))),
    })
}

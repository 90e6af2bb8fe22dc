use std::ffi::{CStr, CString};
use std::ptr;

use cpx_host::capi::{CObject, HOST_API};
use cpx_host::state::{ModuleDef, GILSTATE_LOCKED};
use cpx_host::{ErrorClass, HostRuntime, Session, Value};

fn cstr(s: &str) -> CString {
    CString::new(s).expect("no interior NUL")
}

fn args(session: &Session, items: &[Value]) -> *mut CObject {
    session.import(&Value::tuple(items.iter().cloned()))
}

#[test]
fn sys_get_object_returns_registered_attribute() {
    let session = Session::enter(HostRuntime::host()).expect("enter session");
    let name = cstr("byteorder");
    let obj = (HOST_API.sys_get_object)(name.as_ptr());
    assert!(!obj.is_null());
    let v = session.export(obj).expect("export");
    assert!(v == Value::str("little") || v == Value::str("big"));
    assert!(!session.error_is_set());
}

#[test]
fn sys_get_object_missing_is_null_without_error() {
    let session = Session::enter(HostRuntime::host()).expect("enter session");
    let name = cstr("hello");
    let obj = (HOST_API.sys_get_object)(name.as_ptr());
    assert!(obj.is_null());
    assert!(!session.error_is_set());

    let built = (HOST_API.build_object)(obj);
    assert!(built.is_null());
    let err = session.take_error().expect("build sets SystemError");
    assert_eq!(err.class, ErrorClass::SystemError);
    assert_eq!(err.message, "NULL object passed to Py_BuildValue");
}

#[test]
fn build_object_keeps_pending_error() {
    let session = Session::enter(HostRuntime::host()).expect("enter session");
    let msg = cstr("boom");
    (HOST_API.err_set_string)(ErrorClass::ValueError.code(), msg.as_ptr());
    assert!((HOST_API.build_object)(ptr::null_mut()).is_null());
    let err = session.take_error().expect("error kept");
    assert_eq!(err.class, ErrorClass::ValueError);
    assert_eq!(err.message, "boom");
}

#[test]
fn arg_string_rejects_non_str() {
    let session = Session::enter(HostRuntime::host()).expect("enter session");
    let a = args(&session, &[Value::Int(3)]);
    let mut out: *const libc::c_char = ptr::null();
    assert_eq!((HOST_API.arg_string)(a, 0, &mut out), 0);
    let err = session.take_error().expect("type error");
    assert_eq!(err.class, ErrorClass::TypeError);
    assert_eq!(err.message, "argument 1 must be str, not int");
}

#[test]
fn arg_string_yields_nul_terminated_buffer() {
    let session = Session::enter(HostRuntime::host()).expect("enter session");
    let a = args(&session, &[Value::str("byteorder")]);
    let mut out: *const libc::c_char = ptr::null();
    assert_eq!((HOST_API.arg_string)(a, 0, &mut out), 1);
    let s = unsafe { CStr::from_ptr(out) };
    assert_eq!(s.to_str().expect("utf8"), "byteorder");

    let bad = args(&session, &[Value::str("a\0b")]);
    assert_eq!((HOST_API.arg_string)(bad, 0, &mut out), 0);
    assert_eq!(
        session.take_error().expect("embedded nul").class,
        ErrorClass::ValueError
    );
}

#[test]
fn arg_check_count_reports_arity() {
    let session = Session::enter(HostRuntime::host()).expect("enter session");
    let a = args(&session, &[]);
    let fname = cstr("PySys_GetObject");
    assert_eq!((HOST_API.arg_check_count)(a, 1, fname.as_ptr()), 0);
    let err = session.take_error().expect("arity error");
    assert_eq!(err.class, ErrorClass::TypeError);
    assert_eq!(
        err.message,
        "PySys_GetObject() takes exactly one argument (0 given)"
    );
}

#[test]
fn arg_int_checks_range() {
    let session = Session::enter(HostRuntime::host()).expect("enter session");
    let a = args(&session, &[Value::Int(i64::from(i32::MAX) + 1)]);
    let mut out: libc::c_int = 0;
    assert_eq!((HOST_API.arg_int)(a, 0, &mut out), 0);
    let err = session.take_error().expect("overflow");
    assert_eq!(err.class, ErrorClass::OverflowError);

    let ok = args(&session, &[Value::Bool(true)]);
    assert_eq!((HOST_API.arg_int)(ok, 0, &mut out), 1);
    assert_eq!(out, 1);
}

#[test]
fn long_roundtrip_and_type_error() {
    let session = Session::enter(HostRuntime::host()).expect("enter session");
    let obj = (HOST_API.long_from_long)(42);
    assert_eq!((HOST_API.long_as_long)(obj), 42);

    let s = session.import(&Value::str("x"));
    assert_eq!((HOST_API.long_as_long)(s), -1);
    let err = session.take_error().expect("type error");
    assert_eq!(
        err.message,
        "'str' object cannot be interpreted as an integer"
    );
}

#[test]
fn oversized_bytes_raise_memory_error() {
    let session = Session::enter(HostRuntime::host()).expect("enter session");
    let obj = (HOST_API.bytes_from_string_and_size)(ptr::null(), isize::MAX);
    assert!(obj.is_null());
    let err = session.take_error().expect("memory error");
    assert_eq!(err.class, ErrorClass::MemoryError);

    let obj = (HOST_API.bytes_from_string_and_size)(ptr::null(), 3);
    assert_eq!(session.export(obj).expect("export"), Value::Bytes(vec![0; 3]));
    assert!(!session.error_is_set());
}

#[test]
fn refcounts_release_objects() {
    let session = Session::enter(HostRuntime::host()).expect("enter session");
    let obj = (HOST_API.long_from_long)(7);
    assert_eq!(session.live_objects(), 1);
    (HOST_API.incref)(obj);
    (HOST_API.decref)(obj);
    (HOST_API.decref)(obj);
    assert_eq!(session.live_objects(), 0);
    assert!(session.export(obj).is_err());
}

#[test]
fn thread_state_points_at_main_interpreter() {
    let _session = Session::enter(HostRuntime::host()).expect("enter session");
    let ts = (HOST_API.thread_state_get)();
    assert!(!ts.is_null());
    let main = (HOST_API.interpreter_state_main)();
    assert_eq!(unsafe { (*ts).interp }, main);
    assert_eq!((HOST_API.interpreter_state_get_id)(main), 0);
    assert_eq!((HOST_API.interpreter_state_get_id_from_thread_state)(ts), 0);
    assert_eq!((HOST_API.gil_state_get_this_thread_state)(), ts);
}

#[test]
fn gil_state_nests() {
    let session = Session::enter(HostRuntime::host()).expect("enter session");
    let outer = (HOST_API.gil_state_ensure)();
    let inner = (HOST_API.gil_state_ensure)();
    assert_eq!(outer & GILSTATE_LOCKED, GILSTATE_LOCKED);
    assert_eq!(inner & GILSTATE_LOCKED, 0);
    (HOST_API.gil_state_release)(inner);
    assert_eq!(session.gil_depth(), 1);
    (HOST_API.gil_state_release)(outer);
    assert_eq!(session.gil_depth(), 0);

    (HOST_API.gil_state_release)(outer);
    assert_eq!(
        session.take_error().expect("unbalanced release").class,
        ErrorClass::RuntimeError
    );
}

#[test]
fn module_state_add_find_remove() {
    let session = Session::enter(HostRuntime::host()).expect("enter session");
    let module = session.import(&Value::str("module"));
    let mut def = ModuleDef {
        m_index: 5,
        m_name: ptr::null(),
        m_slots: ptr::null_mut(),
    };
    assert!((HOST_API.state_find_module)(&mut def).is_null());
    assert_eq!((HOST_API.state_add_module)(module, &mut def), 0);
    assert_eq!((HOST_API.state_find_module)(&mut def), module);
    assert_eq!((HOST_API.state_remove_module)(&mut def), 0);
    assert!((HOST_API.state_find_module)(&mut def).is_null());

    assert_eq!((HOST_API.state_add_module)(module, ptr::null_mut()), -1);
    let err = session.take_error().expect("null def");
    assert_eq!(err.message, "PyState_AddModule: Module Definition is NULL");
}

#[test]
fn host_api_is_inert_outside_a_session() {
    assert!((HOST_API.long_from_long)(1).is_null());
    assert!((HOST_API.thread_state_get)().is_null());
    assert_eq!((HOST_API.err_occurred)(), 0);
}

#[test]
fn sessions_do_not_nest() {
    let _session = Session::enter(HostRuntime::host()).expect("enter session");
    let err = Session::enter(HostRuntime::host()).err().expect("nested enter fails");
    assert_eq!(err.class, ErrorClass::SystemError);
}

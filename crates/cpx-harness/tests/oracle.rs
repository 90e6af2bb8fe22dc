use cpx_harness::oracle::evaluate;
use cpx_harness::{ArgumentSet, ErrorMapping, Outcome, Reference};
use cpx_host::{ErrorClass, HostRuntime, Value};

#[test]
fn getattr_resolves_registered_names() {
    let rt = HostRuntime::host();
    let reference = Reference::getattr("sys", ErrorMapping::sys_get_object());
    let out = evaluate(&reference, rt.as_ref(), &ArgumentSet::new([Value::str("byteorder")]));
    assert!(out.fault.is_none());
    let expected = if cfg!(target_endian = "little") { "little" } else { "big" };
    assert_eq!(out.outcome, Outcome::Value(Value::str(expected)));
}

#[test]
fn missing_attribute_maps_to_system_error() {
    let rt = HostRuntime::host();
    let reference = Reference::getattr("sys", ErrorMapping::sys_get_object());
    let out = evaluate(&reference, rt.as_ref(), &ArgumentSet::new([Value::str("hello")]));
    assert_eq!(
        out.outcome,
        Outcome::error(ErrorClass::SystemError, "NULL object passed to Py_BuildValue")
    );

    let plain = Reference::getattr("sys", ErrorMapping::identity());
    let out = evaluate(&plain, rt.as_ref(), &ArgumentSet::new([Value::str("hello")]));
    assert_eq!(out.outcome.error_class(), Some(ErrorClass::AttributeError));
}

#[test]
fn mapping_rewrites_only_listed_classes() {
    let mapping = ErrorMapping::identity().rewrite(ErrorClass::TypeError, ErrorClass::SystemError);
    let err = mapping.apply(cpx_host::PyErr::type_error("boom"));
    assert_eq!(err.class, ErrorClass::SystemError);
    assert_eq!(err.message, "boom");
    let err = mapping.apply(cpx_host::PyErr::attribute("gone"));
    assert_eq!(err.class, ErrorClass::AttributeError);
}

#[test]
fn constant_ignores_arguments() {
    let rt = HostRuntime::host();
    let out = evaluate(&Reference::constant(Value::Int(1)), rt.as_ref(), &ArgumentSet::empty());
    assert_eq!(out.outcome, Outcome::Value(Value::Int(1)));
}

#[test]
fn panicking_reference_is_a_fault() {
    let rt = HostRuntime::host();
    let reference = Reference::new(|_, _| panic!("reference bug"));
    let out = evaluate(&reference, rt.as_ref(), &ArgumentSet::empty());
    assert_eq!(out.fault.as_deref(), Some("reference bug"));
    assert_eq!(out.outcome.error_class(), Some(ErrorClass::RuntimeError));
}

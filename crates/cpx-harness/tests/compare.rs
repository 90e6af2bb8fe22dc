use cpx_harness::{ArgumentSet, Comparator, EquivalenceTable, Outcome};
use cpx_host::{ErrorClass, Value};

fn args() -> ArgumentSet {
    ArgumentSet::new([Value::str("hello")])
}

fn value(s: &str) -> Outcome {
    Outcome::Value(Value::str(s))
}

#[test]
fn exact_requires_equal_values() {
    let cmp = Comparator::default();
    assert_eq!(cmp.name(), "exact");
    assert!(cmp.compare(&value("little"), &value("little"), &args()).passed);

    let r = cmp.compare(&value("little"), &value("big"), &args());
    assert!(!r.passed);
    assert_eq!(r.diagnostic.as_deref(), Some("values differ"));
    assert_eq!(r.args, args());
}

#[test]
fn exact_rejects_matching_errors() {
    let e = Outcome::error(ErrorClass::SystemError, "x");
    let r = Comparator::Exact.compare(&e, &e, &args());
    assert!(!r.passed);
}

#[test]
fn unhandled_error_ignores_messages() {
    let cmp = Comparator::unhandled_error();
    let expected = Outcome::error(ErrorClass::SystemError, "NULL object passed to Py_BuildValue");
    let actual = Outcome::error(ErrorClass::SystemError, "something else entirely");
    assert!(cmp.compare(&expected, &actual, &args()).passed);

    let other = Outcome::error(ErrorClass::TypeError, "bad");
    assert!(!cmp.compare(&expected, &other, &args()).passed);
    assert!(!cmp.compare(&expected, &value("x"), &args()).passed);
    assert!(!cmp.compare(&value("x"), &expected, &args()).passed);
    assert!(cmp.compare(&value("x"), &value("x"), &args()).passed);
}

#[test]
fn unhandled_error_uses_enumerated_pairs() {
    let table = EquivalenceTable::identity().with(ErrorClass::SystemError, ErrorClass::MemoryError);
    let cmp = Comparator::UnhandledError(table);
    let sys = Outcome::error(ErrorClass::SystemError, "a");
    let mem = Outcome::error(ErrorClass::MemoryError, "b");
    assert!(cmp.compare(&sys, &mem, &args()).passed);
    assert!(cmp.compare(&mem, &sys, &args()).passed);
    assert!(!cmp
        .compare(&sys, &Outcome::error(ErrorClass::ValueError, "c"), &args())
        .passed);
}

#[test]
fn failing_custom_rules_become_mismatches() {
    let errs = Comparator::custom(|_, _| Err("cannot compare".to_string()));
    let r = errs.compare(&value("a"), &value("a"), &args());
    assert!(!r.passed);
    assert_eq!(r.diagnostic.as_deref(), Some("custom rule failed: cannot compare"));

    let panics = Comparator::custom(|_, _| panic!("rule bug"));
    let r = panics.compare(&value("a"), &value("a"), &args());
    assert!(!r.passed);
    assert!(r.diagnostic.unwrap_or_default().contains("rule bug"));

    let lenient = Comparator::custom(|e, a| Ok(e.is_error() == a.is_error()));
    assert!(lenient.compare(&value("a"), &value("b"), &args()).passed);
}

use cpx_host::Value;

use crate::argset::{ArgumentGenerator, ArgumentSet};
use crate::compare::Comparator;
use crate::oracle::{ErrorMapping, Reference};
use crate::registry::TestCase;

const INTERPRETERS_CODE: &str = r#"PyObject* wrap_Interpreters(void) {
    return PyLong_FromLong(PyThreadState_Get()->interp == PyInterpreterState_Main());
}
"#;

fn names(items: &[&str]) -> ArgumentGenerator {
    ArgumentGenerator::fixed(
        items
            .iter()
            .map(|n| ArgumentSet::new([Value::str(*n)]))
            .collect(),
    )
}

pub fn sys_suite() -> Vec<TestCase> {
    vec![
        TestCase::declare(
            "PySys_GetObject",
            Reference::getattr("sys", ErrorMapping::sys_get_object()),
            names(&["hello", "byteorder", "maxsize"]),
        )
        .resultspec("O")
        .argspec("s")
        .arguments(&["char* name"])
        .cmpfunc(Comparator::unhandled_error())
        .build(),
        TestCase::declare(
            "Interpreters",
            Reference::constant(Value::Int(1)),
            ArgumentGenerator::fixed(vec![ArgumentSet::empty()]),
        )
        .code(INTERPRETERS_CODE)
        .resultspec("O")
        .argspec("")
        .callfunction("wrap_Interpreters")
        .cmpfunc(Comparator::unhandled_error())
        .build(),
    ]
}

use cpx_host::{ErrorClass, PyErr, Value};

use crate::argset::{ArgumentGenerator, ArgumentSet};
use crate::compare::Comparator;
use crate::oracle::Reference;
use crate::registry::TestCase;

const MAIN_ID_CODE: &str = r#"PyObject* wrap_InterpreterState_MainID(void) {
    return PyLong_FromLong((long)PyInterpreterState_GetID(PyInterpreterState_Main()));
}
"#;

const THREAD_INTERP_ID_CODE: &str = r#"PyObject* wrap_ThreadState_InterpreterID(void) {
    return PyLong_FromLong((long)PyInterpreterState_GetIDFromThreadState(PyThreadState_Get()));
}
"#;

const GIL_ROUND_TRIP_CODE: &str = r#"PyObject* wrap_GILState_RoundTrip(void) {
    PyGILState_STATE outer = PyGILState_Ensure();
    PyGILState_STATE inner = PyGILState_Ensure();
    int same = PyGILState_GetThisThreadState() == PyThreadState_Get();
    PyGILState_Release(inner);
    PyGILState_Release(outer);
    return PyBool_FromLong(same && outer == PyGILState_LOCKED && inner == 0);
}
"#;

const ADD_MODULE_CODE: &str = r#"static PyModuleDef add_def = { 0, "state_probe", NULL };

PyObject* wrap_PyState_AddModule(int index) {
    PyObject* m = PyUnicode_FromString("state_probe");
    if (m == NULL) {
        return NULL;
    }
    add_def.m_index = index;
    if (PyState_AddModule(m, &add_def) < 0) {
        Py_DECREF(m);
        return NULL;
    }
    int same = PyState_FindModule(&add_def) == m;
    if (PyState_RemoveModule(&add_def) < 0) {
        Py_DECREF(m);
        return NULL;
    }
    Py_DECREF(m);
    return PyBool_FromLong(same);
}
"#;

const REMOVE_MODULE_CODE: &str = r#"static PyModuleDef remove_def = { 0, "state_probe", NULL };

PyObject* wrap_PyState_RemoveModule(int index) {
    remove_def.m_index = index;
    if (PyState_RemoveModule(&remove_def) < 0) {
        return NULL;
    }
    Py_RETURN_NONE;
}
"#;

const FIND_MODULE_SLOTS_CODE: &str = r#"static int find_slots_marker;
static PyModuleDef find_slots_def = { 1, "state_probe", &find_slots_marker };

PyObject* wrap_PyState_FindModule_slots(void) {
    PyObject* found = PyState_FindModule(&find_slots_def);
    return PyBool_FromLong(found == NULL && !PyErr_Occurred());
}
"#;

fn ints(items: &[i64]) -> ArgumentGenerator {
    ArgumentGenerator::fixed(
        items
            .iter()
            .map(|i| ArgumentSet::new([Value::Int(*i)]))
            .collect(),
    )
}

fn no_args() -> ArgumentGenerator {
    ArgumentGenerator::fixed(vec![ArgumentSet::empty()])
}

fn index_arg(args: &ArgumentSet) -> Result<i64, PyErr> {
    args.get(0)
        .and_then(Value::as_int)
        .ok_or_else(|| PyErr::type_error("an integer module index is required"))
}

pub fn state_suite() -> Vec<TestCase> {
    vec![
        TestCase::declare(
            "InterpreterState_MainID",
            Reference::new(|rt, _| Ok(Value::Int(rt.main_interpreter_id()))),
            no_args(),
        )
        .code(MAIN_ID_CODE)
        .resultspec("O")
        .callfunction("wrap_InterpreterState_MainID")
        .build(),
        TestCase::declare(
            "ThreadState_InterpreterID",
            Reference::new(|rt, _| Ok(Value::Int(rt.current_interpreter_id()))),
            no_args(),
        )
        .code(THREAD_INTERP_ID_CODE)
        .resultspec("O")
        .callfunction("wrap_ThreadState_InterpreterID")
        .build(),
        TestCase::declare(
            "GILState_RoundTrip",
            Reference::constant(Value::Bool(true)),
            no_args(),
        )
        .code(GIL_ROUND_TRIP_CODE)
        .resultspec("O")
        .callfunction("wrap_GILState_RoundTrip")
        .build(),
        TestCase::declare(
            "PyState_AddModule",
            Reference::new(|_, args| {
                if index_arg(args)? <= 0 {
                    return Err(PyErr::system("PyState_AddModule: Module index invalid."));
                }
                Ok(Value::Bool(true))
            }),
            ints(&[1, 7, 0, -1]),
        )
        .code(ADD_MODULE_CODE)
        .resultspec("O")
        .argspec("i")
        .arguments(&["int index"])
        .callfunction("wrap_PyState_AddModule")
        .cmpfunc(Comparator::unhandled_error())
        .build(),
        TestCase::declare(
            "PyState_RemoveModule",
            Reference::new(|_, args| {
                let message = if index_arg(args)? == 0 {
                    "PyState_RemoveModule: Module index invalid."
                } else {
                    "PyState_RemoveModule: Module index out of bounds."
                };
                Err(PyErr::new(ErrorClass::SystemError, message))
            }),
            ints(&[0, 3]),
        )
        .code(REMOVE_MODULE_CODE)
        .resultspec("O")
        .argspec("i")
        .arguments(&["int index"])
        .callfunction("wrap_PyState_RemoveModule")
        .cmpfunc(Comparator::unhandled_error())
        .build(),
        TestCase::declare(
            "PyState_FindModule_slots",
            Reference::constant(Value::Bool(true)),
            no_args(),
        )
        .code(FIND_MODULE_SLOTS_CODE)
        .resultspec("O")
        .callfunction("wrap_PyState_FindModule_slots")
        .build(),
    ]
}

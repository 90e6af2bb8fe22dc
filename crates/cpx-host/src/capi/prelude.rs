use std::fmt::Write as _;

use cpx_contracts::{CPX_HOST_ABI_VERSION, CPX_PROBE_INIT_SYMBOL};

use crate::error::ErrorClass;

const PRELUDE_HEAD: &str = r#"#include <stddef.h>
#include <stdint.h>

#if defined(_WIN32)
#define CPX_EXPORT __declspec(dllexport)
#else
#define CPX_EXPORT __attribute__((visibility("default")))
#endif

typedef intptr_t Py_ssize_t;
typedef struct cpx_object PyObject;
typedef struct PyInterpreterState {
    int64_t id;
} PyInterpreterState;
typedef struct PyThreadState {
    PyInterpreterState* interp;
    uint64_t thread_id;
} PyThreadState;
typedef struct PyModuleDef {
    Py_ssize_t m_index;
    const char* m_name;
    void* m_slots;
} PyModuleDef;
typedef int PyGILState_STATE;
"#;

const PRELUDE_API: &str = r#"
typedef struct cpx_api {
    uint32_t abi_version;
    uintptr_t none;
    uintptr_t false_;
    uintptr_t true_;

    void (*err_set_string)(int, const char*);
    int (*err_occurred)(void);
    void (*err_clear)(void);
    void (*incref)(PyObject*);
    void (*decref)(PyObject*);

    PyObject* (*sys_get_object)(const char*);

    PyObject* (*long_from_long)(long);
    long (*long_as_long)(PyObject*);
    PyObject* (*float_from_double)(double);
    double (*float_as_double)(PyObject*);
    PyObject* (*bool_from_long)(long);
    PyObject* (*unicode_from_string)(const char*);
    const char* (*unicode_as_utf8)(PyObject*);
    PyObject* (*bytes_from_string_and_size)(const char*, Py_ssize_t);
    Py_ssize_t (*tuple_size)(PyObject*);
    PyObject* (*tuple_get_item)(PyObject*, Py_ssize_t);

    PyThreadState* (*thread_state_get)(void);
    PyInterpreterState* (*interpreter_state_main)(void);
    int64_t (*interpreter_state_get_id)(PyInterpreterState*);
    int64_t (*interpreter_state_get_id_from_thread_state)(PyThreadState*);
    int (*gil_state_ensure)(void);
    void (*gil_state_release)(int);
    PyThreadState* (*gil_state_get_this_thread_state)(void);
    PyObject* (*state_find_module)(PyModuleDef*);
    int (*state_add_module)(PyObject*, PyModuleDef*);
    int (*state_remove_module)(PyModuleDef*);

    int (*arg_check_count)(PyObject*, Py_ssize_t, const char*);
    int (*arg_object)(PyObject*, Py_ssize_t, PyObject**);
    int (*arg_string)(PyObject*, Py_ssize_t, const char**);
    int (*arg_string_or_none)(PyObject*, Py_ssize_t, const char**);
    int (*arg_bytes)(PyObject*, Py_ssize_t, const char**);
    int (*arg_int)(PyObject*, Py_ssize_t, int*);
    int (*arg_long)(PyObject*, Py_ssize_t, long*);
    int (*arg_ssize)(PyObject*, Py_ssize_t, Py_ssize_t*);
    int (*arg_longlong)(PyObject*, Py_ssize_t, long long*);
    int (*arg_ulong)(PyObject*, Py_ssize_t, unsigned long*);
    int (*arg_double)(PyObject*, Py_ssize_t, double*);
    int (*arg_float)(PyObject*, Py_ssize_t, float*);
    int (*arg_predicate)(PyObject*, Py_ssize_t, int*);

    PyObject* (*build_none)(void);
    PyObject* (*build_object)(PyObject*);
    PyObject* (*build_object_steal)(PyObject*);
    PyObject* (*build_long)(long);
    PyObject* (*build_ssize)(Py_ssize_t);
    PyObject* (*build_longlong)(long long);
    PyObject* (*build_ulong)(unsigned long);
    PyObject* (*build_double)(double);
    PyObject* (*build_string)(const char*);
    PyObject* (*build_bytes)(const char*);
} cpx_api;

typedef struct cpx_probe_def {
    uint32_t abi_version;
    const char* name;
    PyObject* (*call)(PyObject* self, PyObject* args);
    Py_ssize_t arity;
} cpx_probe_def;

static const cpx_api* cpx;

#define Py_None ((PyObject*)cpx->none)
#define Py_False ((PyObject*)cpx->false_)
#define Py_True ((PyObject*)cpx->true_)
#define PyGILState_LOCKED 0x1
"#;

const PRELUDE_FUNCTIONS: &str = r#"
static inline void PyErr_SetString(int type, const char* message) { cpx->err_set_string(type, message); }
static inline int PyErr_Occurred(void) { return cpx->err_occurred(); }
static inline void PyErr_Clear(void) { cpx->err_clear(); }
static inline void Py_IncRef(PyObject* o) { cpx->incref(o); }
static inline void Py_DecRef(PyObject* o) { cpx->decref(o); }
#define Py_INCREF(o) Py_IncRef((PyObject*)(o))
#define Py_DECREF(o) Py_DecRef((PyObject*)(o))
#define Py_XINCREF(o) do { if ((o) != NULL) Py_IncRef((PyObject*)(o)); } while (0)
#define Py_XDECREF(o) do { if ((o) != NULL) Py_DecRef((PyObject*)(o)); } while (0)
#define Py_RETURN_NONE return (Py_IncRef(Py_None), Py_None)

static inline PyObject* PySys_GetObject(const char* name) { return cpx->sys_get_object(name); }

static inline PyObject* PyLong_FromLong(long v) { return cpx->long_from_long(v); }
static inline long PyLong_AsLong(PyObject* o) { return cpx->long_as_long(o); }
static inline PyObject* PyFloat_FromDouble(double v) { return cpx->float_from_double(v); }
static inline double PyFloat_AsDouble(PyObject* o) { return cpx->float_as_double(o); }
static inline PyObject* PyBool_FromLong(long v) { return cpx->bool_from_long(v); }
static inline PyObject* PyUnicode_FromString(const char* s) { return cpx->unicode_from_string(s); }
static inline const char* PyUnicode_AsUTF8(PyObject* o) { return cpx->unicode_as_utf8(o); }
static inline PyObject* PyBytes_FromStringAndSize(const char* s, Py_ssize_t n) { return cpx->bytes_from_string_and_size(s, n); }
static inline Py_ssize_t PyTuple_Size(PyObject* o) { return cpx->tuple_size(o); }
static inline PyObject* PyTuple_GetItem(PyObject* o, Py_ssize_t i) { return cpx->tuple_get_item(o, i); }

static inline PyThreadState* PyThreadState_Get(void) { return cpx->thread_state_get(); }
static inline PyInterpreterState* PyInterpreterState_Main(void) { return cpx->interpreter_state_main(); }
static inline int64_t PyInterpreterState_GetID(PyInterpreterState* i) { return cpx->interpreter_state_get_id(i); }
static inline int64_t PyInterpreterState_GetIDFromThreadState(PyThreadState* t) { return cpx->interpreter_state_get_id_from_thread_state(t); }
static inline PyGILState_STATE PyGILState_Ensure(void) { return cpx->gil_state_ensure(); }
static inline void PyGILState_Release(PyGILState_STATE s) { cpx->gil_state_release(s); }
static inline PyThreadState* PyGILState_GetThisThreadState(void) { return cpx->gil_state_get_this_thread_state(); }
static inline PyObject* PyState_FindModule(PyModuleDef* def) { return cpx->state_find_module(def); }
static inline int PyState_AddModule(PyObject* m, PyModuleDef* def) { return cpx->state_add_module(m, def); }
static inline int PyState_RemoveModule(PyModuleDef* def) { return cpx->state_remove_module(def); }
"#;

/// Host C-API functions the prelude defines; a probe without custom code must
/// call one of these.
pub const C_API_FUNCTIONS: &[&str] = &[
    "PyErr_SetString",
    "PyErr_Occurred",
    "PyErr_Clear",
    "Py_IncRef",
    "Py_DecRef",
    "PySys_GetObject",
    "PyLong_FromLong",
    "PyLong_AsLong",
    "PyFloat_FromDouble",
    "PyFloat_AsDouble",
    "PyBool_FromLong",
    "PyUnicode_FromString",
    "PyUnicode_AsUTF8",
    "PyBytes_FromStringAndSize",
    "PyTuple_Size",
    "PyTuple_GetItem",
    "PyThreadState_Get",
    "PyInterpreterState_Main",
    "PyInterpreterState_GetID",
    "PyInterpreterState_GetIDFromThreadState",
    "PyGILState_Ensure",
    "PyGILState_Release",
    "PyGILState_GetThisThreadState",
    "PyState_FindModule",
    "PyState_AddModule",
    "PyState_RemoveModule",
];

/// Other file-scope names the prelude declares (types, macros, the API
/// pointer). Probe parameters may not shadow them.
pub const PRELUDE_NAMES: &[&str] = &[
    "cpx",
    "Py_ssize_t",
    "PyObject",
    "PyInterpreterState",
    "PyThreadState",
    "PyModuleDef",
    "PyGILState_STATE",
    "PyGILState_LOCKED",
    "Py_None",
    "Py_False",
    "Py_True",
    "Py_INCREF",
    "Py_DECREF",
    "Py_XINCREF",
    "Py_XDECREF",
    "Py_RETURN_NONE",
    "CPX_EXPORT",
    "CPX_HOST_ABI_VERSION",
    "CPX_PROBE_INIT",
];

/// C declarations every probe module starts with.
///
/// Deterministic: the text depends only on the ABI version and the host's
/// exception table.
pub fn c_prelude() -> String {
    let mut out = String::new();
    out.push_str(PRELUDE_HEAD);
    let _ = writeln!(out, "\n#define CPX_HOST_ABI_VERSION {CPX_HOST_ABI_VERSION}u");
    let _ = writeln!(out, "#define CPX_PROBE_INIT {CPX_PROBE_INIT_SYMBOL}");
    out.push_str("\nenum {\n");
    for class in ErrorClass::ALL {
        let _ = writeln!(out, "    PyExc_{} = {},", class.as_str(), class.code());
    }
    out.push_str("};\n");
    out.push_str(PRELUDE_API);
    out.push_str(PRELUDE_FUNCTIONS);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prelude_declares_every_exception_class() {
        let p = c_prelude();
        for class in ErrorClass::ALL {
            assert!(p.contains(&format!("PyExc_{} = {}", class.as_str(), class.code())));
        }
        assert!(p.contains("#define CPX_PROBE_INIT cpx_probe_init"));
    }

    #[test]
    fn listed_functions_are_defined() {
        let p = c_prelude();
        for f in C_API_FUNCTIONS {
            let call = format!(" {f}(");
            assert!(
                p.lines()
                    .any(|l| l.starts_with("static inline") && l.contains(&call)),
                "{f}"
            );
        }
        let defined = p
            .lines()
            .filter(|l| l.starts_with("static inline"))
            .count();
        assert_eq!(defined, C_API_FUNCTIONS.len());
    }

    #[test]
    fn prelude_is_stable() {
        assert_eq!(c_prelude(), c_prelude());
    }
}

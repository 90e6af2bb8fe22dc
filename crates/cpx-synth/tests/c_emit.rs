use std::ffi::OsStr;
use std::process::Command;

use sha2::{Digest, Sha256};

use cpx_synth::{emit_module, ProbeSpec, SynthErrorKind};

fn sha256_hex(s: &str) -> String {
    let mut h = Sha256::new();
    h.update(s.as_bytes());
    let out = h.finalize();
    out.iter().map(|b| format!("{b:02x}")).collect()
}

fn sys_get_object() -> ProbeSpec {
    ProbeSpec::builder("PySys_GetObject")
        .resultspec("O")
        .argspec("s")
        .arguments(["char* name"])
        .build()
        .expect("valid spec")
}

const INTERPRETERS_CODE: &str = "PyObject* wrap_Interpreters() {
    return PyLong_FromLong(PyThreadState_Get()->interp == PyInterpreterState_Main());
}
";

fn interpreters() -> ProbeSpec {
    ProbeSpec::builder("Interpreters")
        .resultspec("O")
        .argspec("")
        .code(INTERPRETERS_CODE)
        .callfunction("wrap_Interpreters")
        .build()
        .expect("valid spec")
}

#[test]
fn emission_is_deterministic() {
    let a = emit_module(&sys_get_object());
    let b = emit_module(&sys_get_object());
    assert_eq!(sha256_hex(&a), sha256_hex(&b));
    assert_ne!(
        sha256_hex(&a),
        sha256_hex(&emit_module(&interpreters()))
    );
}

#[test]
fn default_body_unpacks_and_builds() {
    let src = emit_module(&sys_get_object());
    assert!(src.starts_with("/* cpx probe module: PySys_GetObject */\n"));
    assert!(src.contains("static PyObject* cpx_wrap_PySys_GetObject(PyObject* cpx_self, PyObject* cpx_args) {"));
    assert!(src.contains("    char* name;\n"));
    assert!(src.contains("    const char* cpx_a0;\n"));
    assert!(src.contains("cpx->arg_check_count(cpx_args, 1, \"PySys_GetObject\")"));
    assert!(src.contains("cpx->arg_string(cpx_args, 0, &cpx_a0)"));
    assert!(src.contains("    name = (char*)cpx_a0;\n"));
    assert!(src.contains("    return cpx->build_object(PySys_GetObject(name));\n"));
    assert!(src.contains("CPX_EXPORT const cpx_probe_def* cpx_probe_init(const cpx_api* api) {"));
}

#[test]
fn custom_code_is_spliced_before_wrapper() {
    let src = emit_module(&interpreters());
    let code_at = src.find(INTERPRETERS_CODE).expect("custom code present verbatim");
    let wrapper_at = src
        .find("static PyObject* cpx_wrap_Interpreters(")
        .expect("wrapper present");
    assert!(code_at < wrapper_at);
    assert!(src.contains("    return cpx->build_object(wrap_Interpreters());\n"));
    assert!(src.contains("cpx->arg_check_count(cpx_args, 0, \"Interpreters\")"));
}

#[test]
fn empty_resultspec_returns_none() {
    let spec = ProbeSpec::builder("PyErr_Clear")
        .build()
        .expect("valid spec");
    let src = emit_module(&spec);
    assert!(src.contains("    PyErr_Clear();\n    return cpx->build_none();\n"));
}

#[test]
fn scalar_results_are_cast() {
    let spec = ProbeSpec::builder("PyLong_AsLong")
        .resultspec("i")
        .argspec("O")
        .arguments(["PyObject* obj"])
        .build()
        .expect("valid spec");
    let src = emit_module(&spec);
    assert!(src.contains("cpx->arg_object(cpx_args, 0, &cpx_a0)"));
    assert!(src.contains("return cpx->build_long((long)PyLong_AsLong(obj));"));
}

#[test]
fn malformed_units_are_config_errors() {
    let err = ProbeSpec::builder("PySys_GetObject")
        .resultspec("O")
        .argspec("s#")
        .arguments(["char* name"])
        .build()
        .unwrap_err();
    assert_eq!(err.kind, SynthErrorKind::Format);
    assert!(err.message.contains("'#'"), "{}", err.message);

    let err = ProbeSpec::builder("PySys_GetObject")
        .resultspec("OO")
        .argspec("s")
        .arguments(["char* name"])
        .build()
        .unwrap_err();
    assert_eq!(err.kind, SynthErrorKind::Format);
}

#[test]
fn count_mismatch_is_config_error() {
    let err = ProbeSpec::builder("PySys_GetObject")
        .resultspec("O")
        .argspec("ss")
        .arguments(["char* name"])
        .build()
        .unwrap_err();
    assert_eq!(err.kind, SynthErrorKind::Arity);
}

#[test]
fn custom_code_must_define_call_symbol() {
    let err = ProbeSpec::builder("Interpreters")
        .resultspec("O")
        .code(INTERPRETERS_CODE)
        .callfunction("wrap_Other")
        .build()
        .unwrap_err();
    assert_eq!(err.kind, SynthErrorKind::Body);

    let err = ProbeSpec::builder("NotAnApi")
        .resultspec("O")
        .build()
        .unwrap_err();
    assert_eq!(err.kind, SynthErrorKind::Body);
}

#[test]
fn bad_identifiers_are_rejected() {
    for name in ["", "1abc", "a-b", "cpx_probe"] {
        let err = ProbeSpec::builder(name).build().unwrap_err();
        assert_eq!(err.kind, SynthErrorKind::Identifier, "{name:?}");
    }
    for decl in ["char* cpx", "char* cpx_a0", "PyObject* PyObject", "long int", "int Py_None"] {
        let err = ProbeSpec::builder("PySys_GetObject")
            .resultspec("O")
            .argspec("s")
            .arguments([decl])
            .build()
            .unwrap_err();
        assert_eq!(err.kind, SynthErrorKind::Identifier, "{decl:?}");
    }
}

#[test]
fn wrapper_locals_do_not_shadow_parameters() {
    let spec = ProbeSpec::builder("PySys_GetObject")
        .resultspec("O")
        .argspec("s")
        .arguments(["char* args"])
        .build()
        .expect("args is an ordinary parameter name");
    let src = emit_module(&spec);
    assert!(src.contains("    char* args;\n"));
    assert!(src.contains("    return cpx->build_object(PySys_GetObject(args));\n"));
}

#[test]
fn default_body_needs_a_listed_function() {
    for call in ["defined", "Py_INCREF", "c_prelude"] {
        let err = ProbeSpec::builder("Macro")
            .resultspec("O")
            .callfunction(call)
            .build()
            .unwrap_err();
        assert_eq!(err.kind, SynthErrorKind::Body, "{call:?}");
    }
}

#[test]
fn emitted_module_is_valid_c() {
    let cc = std::env::var_os("CPX_CC").unwrap_or_else(|| OsStr::new("cc").to_os_string());
    if Command::new(&cc).arg("--version").output().is_err() {
        eprintln!("skipping: no C compiler");
        return;
    }
    let dir = tempfile::tempdir().expect("tempdir");
    let args_param = ProbeSpec::builder("ArgsParam")
        .resultspec("O")
        .argspec("s")
        .arguments(["char* args"])
        .callfunction("PySys_GetObject")
        .build()
        .expect("valid spec");
    for spec in [sys_get_object(), interpreters(), args_param] {
        let path = dir.path().join(format!("{}.c", spec.name()));
        std::fs::write(&path, emit_module(&spec)).expect("write C source");
        let out = Command::new(&cc)
            .args(["-std=c11", "-fsyntax-only"])
            .arg(&path)
            .output()
            .expect("run cc");
        assert!(
            out.status.success(),
            "{} failed to compile:\nstderr:\n{}",
            spec.name(),
            String::from_utf8_lossy(&out.stderr),
        );
    }
}

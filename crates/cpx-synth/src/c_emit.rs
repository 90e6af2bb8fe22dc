use std::fmt::Write as _;

use cpx_contracts::CPX_PROBE_INIT_SYMBOL;
use cpx_host::capi::c_prelude;

use crate::format::ResultFormat;
use crate::spec::ProbeSpec;

/// Name of the generated wrapper for `probe`.
pub fn wrapper_symbol(probe: &str) -> String {
    format!("cpx_wrap_{probe}")
}

/// Emits the complete C module for `spec`.
///
/// Byte-identical output for equal specs: nothing here depends on the
/// environment, the clock or iteration order of hashed containers.
pub fn emit_module(spec: &ProbeSpec) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "/* cpx probe module: {} */", spec.name());
    out.push_str(&c_prelude());

    if let Some(code) = spec.code() {
        out.push_str("\n/* custom code */\n");
        out.push_str(code);
        if !code.ends_with('\n') {
            out.push('\n');
        }
    }

    emit_wrapper(&mut out, spec);
    emit_registration(&mut out, spec);
    out
}

fn c_string_literal(s: &str) -> String {
    let mut lit = String::with_capacity(s.len() + 2);
    lit.push('"');
    for c in s.chars() {
        match c {
            '"' => lit.push_str("\\\""),
            '\\' => lit.push_str("\\\\"),
            c => lit.push(c),
        }
    }
    lit.push('"');
    lit
}

fn emit_wrapper(out: &mut String, spec: &ProbeSpec) {
    let wrapper = wrapper_symbol(spec.name());
    let _ = writeln!(
        out,
        "\nstatic PyObject* {wrapper}(PyObject* cpx_self, PyObject* cpx_args) {{"
    );
    out.push_str("    (void)cpx_self;\n");

    for param in spec.arguments() {
        let _ = writeln!(out, "    {} {};", param.c_type, param.name);
    }
    for (i, fmt) in spec.arg_formats().iter().enumerate() {
        let _ = writeln!(out, "    {} cpx_a{i};", fmt.c_type());
    }

    let _ = writeln!(
        out,
        "    if (!cpx->arg_check_count(cpx_args, {}, {})) {{\n        return NULL;\n    }}",
        spec.arity(),
        c_string_literal(spec.name())
    );
    for (i, fmt) in spec.arg_formats().iter().enumerate() {
        let _ = writeln!(
            out,
            "    if (!cpx->{}(cpx_args, {i}, &cpx_a{i})) {{\n        return NULL;\n    }}",
            fmt.host_helper()
        );
    }
    for (i, param) in spec.arguments().iter().enumerate() {
        let _ = writeln!(out, "    {} = ({})cpx_a{i};", param.name, param.c_type);
    }

    let call_args = spec
        .arguments()
        .iter()
        .map(|p| p.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let call = format!("{}({call_args})", spec.callfunction());

    match spec.result_format() {
        ResultFormat::None => {
            let _ = writeln!(out, "    {call};");
            out.push_str("    return cpx->build_none();\n");
        }
        fmt => {
            let (helper, cast) = fmt.host_helper();
            let _ = writeln!(out, "    return cpx->{helper}({cast}{call});");
        }
    }
    out.push_str("}\n");
}

fn emit_registration(out: &mut String, spec: &ProbeSpec) {
    let wrapper = wrapper_symbol(spec.name());
    let _ = writeln!(
        out,
        "\nstatic const cpx_probe_def cpx_def = {{\n    CPX_HOST_ABI_VERSION,\n    {},\n    {wrapper},\n    {},\n}};",
        c_string_literal(spec.name()),
        spec.arity()
    );
    let _ = writeln!(
        out,
        "\nCPX_EXPORT const cpx_probe_def* {CPX_PROBE_INIT_SYMBOL}(const cpx_api* api) {{"
    );
    out.push_str(
        "    if (api == NULL || api->abi_version != CPX_HOST_ABI_VERSION) {\n        return NULL;\n    }\n",
    );
    out.push_str("    cpx = api;\n    return &cpx_def;\n}\n");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_literal_escapes_quotes() {
        assert_eq!(c_string_literal(r#"a"b\c"#), r#""a\"b\\c""#);
    }
}

//! Final serialization of a session into one textual IR module.

use crate::session::{Function, Session, TOP_LEVEL_SCOPE, is_terminated};

/// Serialize `session`: optional `source_filename`, the preamble, the
/// implicit entry function, then every non-foreign function in
/// definition order.
pub fn emit_module(session: &Session, source_name: Option<&str>) -> String {
    let mut out = String::new();
    if let Some(name) = source_name {
        out.push_str(&format!("source_filename = \"{}\"\n", name.escape_default()));
    }
    out.push_str(session.preamble());

    out.push_str(&format!("\ndefine i32 @{TOP_LEVEL_SCOPE}() {{\nentry:\n"));
    out.push_str(session.entry_body());
    out.push_str("  ret i32 0\n}\n");

    for function in session.functions().filter(|function| !function.is_foreign) {
        emit_function(&mut out, function);
    }
    out
}

fn emit_function(out: &mut String, function: &Function) {
    let params: Vec<String> = function
        .params
        .iter()
        .filter_map(|param| param.ty.as_ref().map(|ty| format!("{ty} %{}", param.name)))
        .collect();
    out.push_str(&format!(
        "\n; Function {name}\ndefine {ret} @{name}({params}) {{\nentry:\n",
        name = function.name,
        ret = function.ret,
        params = params.join(", "),
    ));
    out.push_str(&function.body);
    if function.ret.is_void() && !is_terminated(&function.body) {
        out.push_str("  ret void\n");
    }
    out.push_str("}\n");
}

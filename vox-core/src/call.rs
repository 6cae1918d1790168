//! Function-call lowering with strict signature checking.

use crate::error::CoreError;
use crate::expr::{convert, fold_constant, literal_for, load_global, symbol_type};
use crate::line::{split_call, split_top_level, string_literal};
use crate::session::Session;
use crate::types::IrType;

/// A lowered `call` instruction (without result register).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallInstr {
    pub text: String,
    pub ret: IrType,
}

/// Lower `NAME(ARGS)`. Argument loads are emitted into the current scope;
/// the call itself is returned for the caller to place.
///
/// Returns `None` after a soft error (unknown callee, arity mismatch). A
/// parameter whose type cannot be resolved is fatal.
pub fn build_call(
    session: &mut Session,
    text: &str,
    ret_override: Option<&IrType>,
) -> Result<Option<CallInstr>, CoreError> {
    let Some((name, args_text)) = split_call(text) else {
        session.error(format!("Not a valid function call: '{}'", text.trim()));
        return Ok(None);
    };
    let Some(callee) = session.function_by_name(name) else {
        session.error(format!("Unknown function: {name}"));
        return Ok(None);
    };
    let params: Vec<(String, Option<IrType>)> = callee
        .params
        .iter()
        .map(|param| (param.name.clone(), param.ty.clone()))
        .collect();
    let ret = ret_override.cloned().unwrap_or_else(|| callee.ret.clone());

    let args = split_top_level(args_text, ',');
    if args.len() != params.len() {
        session.error(format!(
            "Argument mismatch for '{name}': expected {}, got {}",
            params.len(),
            args.len()
        ));
        return Ok(None);
    }

    let mut lowered = Vec::with_capacity(args.len());
    for ((param_name, param_ty), arg) in params.iter().zip(&args) {
        let ty = param_ty
            .clone()
            .or_else(|| session.current_param(arg).and_then(|param| param.ty.clone()))
            .unwrap_or(IrType::Int(32));
        if ty.is_void() {
            return Err(session.fatal(format!(
                "Type resolution failure for param '{param_name}' in {name}"
            )));
        }
        let Some(operand) = lower_argument(session, arg, &ty)? else {
            return Ok(None);
        };
        lowered.push(operand);
    }

    Ok(Some(CallInstr {
        text: format!("call {ret} @{name}({})", lowered.join(", ")),
        ret,
    }))
}

/// Lower a call used as a statement.
pub fn lower_call_statement(session: &mut Session, text: &str) -> Result<(), CoreError> {
    if let Some(call) = build_call(session, text, None)? {
        session.emit(&format!("  {}\n", call.text))?;
    }
    Ok(())
}

fn lower_argument(
    session: &mut Session,
    arg: &str,
    ty: &IrType,
) -> Result<Option<String>, CoreError> {
    let target = arg.strip_prefix("addr ").map(str::trim);

    if let Some(text) = string_literal(target.unwrap_or(arg)) {
        return Ok(Some(intern_string(session, text)));
    }

    if let Some(name) = target {
        if session.symbol(name).is_none() && session.function_id(name).is_none() {
            session.error(format!("Unknown reference '{name}' in addr argument"));
            return Ok(None);
        }
        let pointer = if ty.is_pointer() {
            ty.clone()
        } else {
            ty.clone().pointer_to()
        };
        return Ok(Some(format!("{pointer} @{name}")));
    }

    if arg == "null" {
        return Ok(Some(format!("{ty} {}", ty.zero_literal())));
    }

    if session.current_param(arg).is_some() {
        return Ok(Some(format!("{ty} %{arg}")));
    }

    if session.symbol(arg).is_some() {
        let Some(from) = symbol_type(session, arg) else {
            return Ok(None);
        };
        let loaded = load_global(session, arg, &from)?;
        let value = convert(session, loaded, &from, ty)?;
        return Ok(Some(format!("{ty} {value}")));
    }

    // Constant expressions such as `2+1` are folded; anything else is
    // passed through verbatim.
    let literal = fold_constant(session, arg)
        .ok()
        .and_then(|value| literal_for(value, ty).ok())
        .unwrap_or_else(|| arg.to_string());
    Ok(Some(format!("{ty} {literal}")))
}

/// Intern a string literal as a private global and return an `i8*` to it.
pub fn intern_string(session: &mut Session, text: &str) -> String {
    let mut bytes = unescape(text);
    bytes.push(0);
    let len = bytes.len();
    let global = session.next_string_global();
    session.emit_preamble(&format!(
        "{global} = private constant [{len} x i8] c\"{}\"\n",
        render_bytes(&bytes)
    ));
    format!("i8* getelementptr ([{len} x i8], [{len} x i8]* {global}, i32 0, i32 0)")
}

/// Expand `\0 \n \t \r \" \\` to raw bytes. Other backslashes are kept.
pub fn unescape(text: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            let mut buf = [0; 4];
            bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        let escaped = match chars.peek() {
            Some('0') => 0,
            Some('n') => b'\n',
            Some('t') => b'\t',
            Some('r') => b'\r',
            Some('"') => b'"',
            Some('\\') => b'\\',
            _ => {
                bytes.push(b'\\');
                continue;
            }
        };
        chars.next();
        bytes.push(escaped);
    }
    bytes
}

/// Render bytes for a `c"..."` literal: printable ASCII as is, everything
/// else (and `"`/`\`) as `\XX`.
pub fn render_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &byte in bytes {
        if (0x20..0x7f).contains(&byte) && byte != b'"' && byte != b'\\' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("\\{byte:02X}"));
        }
    }
    out
}

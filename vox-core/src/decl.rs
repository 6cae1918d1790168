//! Lowering of `const` and `var` declarations to IR globals.

use crate::call::{build_call, render_bytes, unescape};
use crate::error::CoreError;
use crate::expr::{fold_or_report, literal_for};
use crate::line::{find_top_level, split_call, split_top_level, string_literal};
use crate::session::Session;
use crate::types::{
    IrType, Primitive, StructDef, is_buff_syntax, is_pointer_syntax, parse_sized_buff_type,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Const,
    Var,
}

impl DeclKind {
    fn linkage(self) -> &'static str {
        match self {
            DeclKind::Const => "constant",
            DeclKind::Var => "global",
        }
    }

    fn noun(self) -> &'static str {
        match self {
            DeclKind::Const => "Constant",
            DeclKind::Var => "Variable",
        }
    }
}

/// Split `NAME: TYPE = VALUE`.
fn split_declaration(text: &str) -> Option<(&str, &str, &str)> {
    let (name, rest) = text.split_once(':')?;
    let eq = *find_top_level(rest, "=").first()?;
    let (ty, value) = (rest[..eq].trim(), rest[eq + 1..].trim());
    let name = name.trim();
    (!name.is_empty() && !ty.is_empty() && !value.is_empty()).then_some((name, ty, value))
}

/// Lower the text after `const`/`var`.
pub fn lower_declaration(session: &mut Session, kind: DeclKind, text: &str) -> Result<(), CoreError> {
    let Some((name, ty_text, value)) = split_declaration(text) else {
        session.error(format!(
            "Malformed declaration: expected '{} NAME: TYPE = VALUE'",
            kind.linkage()
        ));
        return Ok(());
    };

    let taken = match kind {
        DeclKind::Const => session.constants.contains_key(name),
        DeclKind::Var => session.variables.contains_key(name),
    };
    if taken {
        session.error(format!("{} '{name}' is already defined", kind.noun()));
        return Ok(());
    }

    let resolved = match session.types.expand_alias(ty_text) {
        Ok(resolved) => resolved,
        Err(err) => {
            session.report_type_error(err);
            return Ok(());
        }
    };

    let stored = if is_pointer_syntax(&resolved) {
        let Some(ptr_ty) = session.lower_type(&resolved) else {
            return Ok(());
        };
        lower_pointer(session, kind, name, &ptr_ty, value)
    } else if is_buff_syntax(&resolved) {
        lower_buffer(session, kind, name, &resolved, value)
    } else if let Some(prim) = Primitive::from_name(&resolved) {
        lower_primitive(session, kind, name, prim, value)?
    } else if let Some(def) = session.types.struct_def(&resolved).cloned() {
        lower_struct(session, kind, name, &def, value)
    } else {
        // Reports "Unknown type".
        session.lower_type(&resolved);
        None
    };

    let Some(stored) = stored else {
        return Ok(());
    };
    match kind {
        DeclKind::Const => session.define_constant(name, stored, ty_text),
        DeclKind::Var => session.define_variable(name, ty_text),
    };
    Ok(())
}

/// Returns the value recorded for the symbol, or `None` after a soft error.
fn lower_primitive(
    session: &mut Session,
    kind: DeclKind,
    name: &str,
    prim: Primitive,
    value: &str,
) -> Result<Option<String>, CoreError> {
    let ty = prim.ir();
    if ty.is_void() {
        session.error(format!("{} '{name}' cannot have type void", kind.noun()));
        return Ok(None);
    }
    if ty.is_pointer() {
        return Ok(lower_pointer(session, kind, name, &ty, value));
    }

    if split_call(value).is_some() {
        return lower_runtime_init(session, name, &ty, value);
    }

    let Some(folded) = fold_or_report(session, value) else {
        return Ok(None);
    };
    let literal = match literal_for(folded, &ty) {
        Ok(literal) => literal,
        Err(message) => {
            session.error(format!("Invalid value for '{name}': {message}"));
            return Ok(None);
        }
    };
    session.emit_preamble(&format!("@{name} = {} {ty} {literal}\n", kind.linkage()));
    Ok(Some(literal))
}

// `const H: int64 = GetStdHandle(-11)`: a zeroed global filled in at
// runtime by the current scope.
fn lower_runtime_init(
    session: &mut Session,
    name: &str,
    ty: &IrType,
    value: &str,
) -> Result<Option<String>, CoreError> {
    let Some(call) = build_call(session, value, Some(ty))? else {
        return Ok(None);
    };
    session.emit_preamble(&format!("@{name} = global {ty} zeroinitializer\n"));
    let site = session.next_call_site();
    session.emit(&format!(
        "  %init{site} = {}\n  store {ty} %init{site}, {ty}* @{name}\n",
        call.text
    ))?;
    Ok(Some(format!("@{name}")))
}

fn lower_pointer(
    session: &mut Session,
    kind: DeclKind,
    name: &str,
    ptr_ty: &IrType,
    value: &str,
) -> Option<String> {
    let IrType::Pointer(elem) = ptr_ty else {
        session.error(format!("'{name}' is not a pointer type"));
        return None;
    };

    let init = if let Some(target) = value.strip_prefix("addr ").map(str::trim) {
        address_of(session, name, ptr_ty, elem, target)?
    } else if value == "null" {
        "null".to_string()
    } else {
        let folded = fold_or_report(session, value)?;
        match literal_for(folded, ptr_ty) {
            Ok(literal) => literal,
            Err(message) => {
                session.error(format!("Invalid pointer value for '{name}': {message}"));
                return None;
            }
        }
    };

    session.emit_preamble(&format!("@{name} = {} {ptr_ty} {init}\n", kind.linkage()));
    Some(format!("@{name}"))
}

fn address_of(
    session: &mut Session,
    name: &str,
    ptr_ty: &IrType,
    elem: &IrType,
    target: &str,
) -> Option<String> {
    let Some(symbol) = session.symbol(target) else {
        if session.function_id(target).is_some() {
            return Some(format!("@{target}"));
        }
        session.error(format!("Unknown reference '{target}' for pointer '{name}'"));
        return None;
    };
    let source_type = symbol.source_type().to_string();
    let resolved = match session.types.expand_alias(&source_type) {
        Ok(resolved) => resolved,
        Err(err) => {
            session.report_type_error(err);
            return None;
        }
    };
    if !is_buff_syntax(&resolved) {
        return Some(format!("@{target}"));
    }

    // Buffers decay to a pointer at their first element.
    let (base, len) = match parse_sized_buff_type(&resolved) {
        Ok(parsed) => parsed,
        Err(err) => {
            session.report_type_error(err);
            return None;
        }
    };
    let buff_elem = session.lower_type(&base)?;
    let gep = format!(
        "getelementptr ([{len} x {buff_elem}], [{len} x {buff_elem}]* @{target}, i32 0, i32 0)"
    );
    if buff_elem == *elem {
        return Some(gep);
    }
    if !session.unsafe_mode {
        session.error(format!(
            "Type mismatch in getelementptr: buffer base type '{buff_elem}' vs pointer base type '{elem}'"
        ));
        return None;
    }
    Some(format!("bitcast ({buff_elem}* {gep} to {ptr_ty})"))
}

fn lower_buffer(
    session: &mut Session,
    kind: DeclKind,
    name: &str,
    ty_text: &str,
    value: &str,
) -> Option<String> {
    let (base, len) = match parse_sized_buff_type(ty_text) {
        Ok(parsed) => parsed,
        Err(err) => {
            session.report_type_error(err);
            return None;
        }
    };
    let elem = session.lower_type(&base)?;
    let array = IrType::Array {
        len,
        elem: Box::new(elem.clone()),
    };

    let literal = if Primitive::from_name(&base).is_some_and(Primitive::is_char) {
        let Some(payload) = string_literal(value) else {
            session.error(format!("Expected a string literal for buffer '{name}'"));
            return None;
        };
        char_buffer_literal(session, payload, len)?
    } else {
        element_list_literal(session, name, value, &elem, len)?
    };

    session.emit_preamble(&format!("@{name} = {} {array} {literal}\n", kind.linkage()));
    Some(format!("@{name}"))
}

/// `c"..."` payload padded with NULs to exactly `len` bytes.
fn char_buffer_literal(session: &mut Session, payload: &str, len: usize) -> Option<String> {
    let mut bytes = unescape(payload);
    if payload.chars().count() > len || bytes.len() > len {
        session.error(format!(
            "String '{payload}' too long for buff type (max {len} chars)"
        ));
        return None;
    }
    bytes.resize(len, 0);
    Some(format!("c\"{}\"", render_bytes(&bytes)))
}

fn element_list_literal(
    session: &mut Session,
    name: &str,
    value: &str,
    elem: &IrType,
    len: usize,
) -> Option<String> {
    let inner = value
        .strip_prefix('{')
        .and_then(|rest| rest.strip_suffix('}'))
        .or_else(|| value.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')));
    let Some(inner) = inner else {
        session.error(format!(
            "Buffer '{name}' must be initialized with {{...}} or [...]"
        ));
        return None;
    };
    let items = split_top_level(inner, ',');
    if items.len() > len {
        session.error(format!(
            "Buffer '{name}' holds {len} elements, got {}",
            items.len()
        ));
        return None;
    }

    let mut rendered = Vec::with_capacity(len);
    for item in items {
        let folded = fold_or_report(session, item)?;
        match literal_for(folded, elem) {
            Ok(literal) => rendered.push(format!("{elem} {literal}")),
            Err(message) => {
                session.error(format!("Invalid element '{item}' in '{name}': {message}"));
                return None;
            }
        }
    }
    while rendered.len() < len {
        rendered.push(format!("{elem} {}", elem.zero_literal()));
    }
    Some(format!("[{}]", rendered.join(", ")))
}

fn lower_struct(
    session: &mut Session,
    kind: DeclKind,
    name: &str,
    def: &StructDef,
    value: &str,
) -> Option<String> {
    let body = value.strip_prefix(def.name.as_str()).unwrap_or(value).trim();
    let Some(inner) = body.strip_prefix('{').and_then(|rest| rest.strip_suffix('}')) else {
        session.error(format!("Struct initialization must use braces: {value}"));
        return None;
    };
    let items = split_top_level(inner, ',');
    let items: Vec<&str> = items.into_iter().filter(|item| !item.is_empty()).collect();

    let named = items
        .iter()
        .filter(|item| !find_top_level(item, ":").is_empty())
        .count();
    if named != 0 && named != items.len() {
        session.error(format!(
            "Struct '{}' initializer mixes named and positional fields",
            def.name
        ));
        return None;
    }
    if items.len() != def.fields.len() {
        session.error(format!(
            "Struct '{}' expects {} fields, got {}",
            def.name,
            def.fields.len(),
            items.len()
        ));
        return None;
    }

    // Values in declared field order.
    let mut ordered: Vec<&str> = Vec::with_capacity(items.len());
    if named == 0 {
        ordered.extend(items.iter().copied());
    } else {
        let mut by_name: Vec<(&str, &str)> = Vec::with_capacity(items.len());
        for item in &items {
            let (key, val) = item.split_once(':').map(|(k, v)| (k.trim(), v.trim()))?;
            if def.field_type(key).is_none() {
                session.error(format!("Unknown field '{key}' for struct '{}'", def.name));
                return None;
            }
            if by_name.iter().any(|(seen, _)| *seen == key) {
                session.error(format!("Field '{key}' is given twice"));
                return None;
            }
            by_name.push((key, val));
        }
        for (field, _) in &def.fields {
            let (_, val) = by_name.iter().find(|(key, _)| *key == field.as_str())?;
            ordered.push(*val);
        }
    }

    let mut rendered = Vec::with_capacity(ordered.len());
    for ((field, field_ty), val) in def.fields.iter().zip(ordered) {
        let ty = session.lower_type(field_ty)?;
        let literal = match Primitive::from_name(field_ty) {
            Some(_) => {
                let folded = fold_or_report(session, val)?;
                match literal_for(folded, &ty) {
                    Ok(literal) => literal,
                    Err(message) => {
                        session.error(format!("Invalid value for field '{field}': {message}"));
                        return None;
                    }
                }
            }
            None => val.to_string(),
        };
        rendered.push(format!("{ty} {literal}"));
    }

    session.emit_preamble(&format!(
        "@{name} = {} %{} {{ {} }}\n",
        kind.linkage(),
        def.name,
        rendered.join(", ")
    ));
    Some(format!("@{name}"))
}

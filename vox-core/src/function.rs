//! Function definitions, foreign declarations and `return`.
//!
//! A `fn` block is captured whole by the dispatcher and only then cooked:
//! the function is pushed on the definition stack, its body lines go
//! through the same dispatcher, and the stack is popped again.

use crate::dispatch::compile_block;
use crate::error::CoreError;
use crate::expr::lower_value;
use crate::line::{SourceLine, is_identifier, matching_paren, split_top_level};
use crate::session::{Function, FunctionId, Param, Session};
use crate::types::IrType;

/// Parsed `RET NAME(ARG: TYPE, ...)` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature<'a> {
    pub ret: &'a str,
    pub name: &'a str,
    pub params: Vec<(&'a str, &'a str)>,
    /// Text after the closing parenthesis, without the `:`.
    pub rest: &'a str,
}

pub fn parse_signature(text: &str) -> Result<Signature<'_>, String> {
    let text = text.trim();
    let open = text
        .find('(')
        .ok_or_else(|| format!("Malformed function header '{text}': missing '('"))?;
    let close = matching_paren(text, open)
        .ok_or_else(|| format!("Malformed function header '{text}': unbalanced parentheses"))?;

    let (ret, name) = text[..open]
        .trim()
        .rsplit_once(char::is_whitespace)
        .ok_or_else(|| format!("Function '{}' needs a return type", text[..open].trim()))?;
    let (ret, name) = (ret.trim(), name.trim());
    if !is_identifier(name) {
        return Err(format!("Invalid function name '{name}'"));
    }

    let mut params = Vec::new();
    for arg in split_top_level(&text[open + 1..close], ',') {
        let (arg_name, arg_ty) = arg
            .split_once(':')
            .map(|(n, t)| (n.trim(), t.trim()))
            .filter(|(_, t)| !t.is_empty())
            .ok_or_else(|| format!("Missing type for argument '{arg}' in {name}"))?;
        params.push((arg_name, arg_ty));
    }

    let rest = text[close + 1..].trim();
    let rest = rest.strip_prefix(':').unwrap_or(rest).trim();
    Ok(Signature {
        ret,
        name,
        params,
        rest,
    })
}

// Lowers and registers a signature; `None` after a soft error.
fn register(session: &mut Session, sig: &Signature<'_>, is_foreign: bool) -> Option<FunctionId> {
    let ret = session.lower_type(sig.ret)?;
    let params = sig
        .params
        .iter()
        .map(|(name, ty)| Param {
            name: name.to_string(),
            source_type: ty.to_string(),
            ty: session.lower_type(ty),
        })
        .collect();

    let id = session.register_function(Function {
        name: sig.name.to_string(),
        params,
        ret,
        is_foreign,
        body: String::new(),
    });
    if id.is_none() {
        session.error(format!("Function '{}' is already defined", sig.name));
    }
    id
}

/// Define a function from its header (text after `fn `) and captured body.
pub fn define_function(
    session: &mut Session,
    header: &SourceLine,
    header_text: &str,
    body: &[SourceLine],
) -> Result<(), CoreError> {
    let sig = match parse_signature(header_text) {
        Ok(sig) => sig,
        Err(message) => {
            session.error(message);
            return Ok(());
        }
    };
    let Some(id) = register(session, &sig, false) else {
        return Ok(());
    };

    // `fn int F(a: int): return a endfn` keeps its body on the header line.
    let inline = sig.rest.strip_suffix("endfn").unwrap_or(sig.rest).trim();
    let mut lines = Vec::with_capacity(body.len() + 1);
    if !inline.is_empty() {
        lines.push(SourceLine::new(header.number, inline));
    }
    lines.extend_from_slice(body);
    cook(session, id, &lines)
}

#[tracing::instrument(level = "debug", skip_all, fields(function = ?id))]
fn cook(session: &mut Session, id: FunctionId, body: &[SourceLine]) -> Result<(), CoreError> {
    session.begin_function(id)?;
    let result = compile_block(session, body);
    session.end_function();
    result
}

/// `return` / `return VALUE` inside the function being compiled.
pub fn lower_return(session: &mut Session, value: Option<&str>) -> Result<(), CoreError> {
    let Some(function) = session.current_function() else {
        session.error("return outside of a function");
        return Ok(());
    };
    let name = function.name.clone();
    let ret = function.ret.clone();

    match value {
        None if ret.is_void() => session.emit("  ret void\n"),
        None => {
            session.error(format!(
                "Function {name} must return {ret}, but got empty return"
            ));
            Ok(())
        }
        Some(value) if ret.is_void() => {
            session.error(format!(
                "Function {name} returns void but got: return {value}"
            ));
            Ok(())
        }
        Some(value) => match lower_value(session, value, &ret)? {
            Some(operand) => session.emit(&format!("  ret {ret} {operand}\n")),
            None => Ok(()),
        },
    }
}

/// `dyn_import fn RET NAME(ARGS).`, possibly joined from several lines.
pub fn declare_foreign(session: &mut Session, text: &str) {
    let decl = text
        .trim()
        .strip_prefix("dyn_import")
        .map(str::trim_start)
        .and_then(|rest| rest.strip_prefix("fn "));
    let Some(decl) = decl else {
        session.error(format!("Malformed dyn_import '{}': expected 'dyn_import fn'", text.trim()));
        return;
    };
    let Some(decl) = decl.trim_end().strip_suffix('.') else {
        session.error("dyn_import declaration must end with '.'");
        return;
    };

    let sig = match parse_signature(decl) {
        Ok(sig) => sig,
        Err(message) => {
            session.error(message);
            return;
        }
    };
    let Some(id) = register(session, &sig, true) else {
        return;
    };
    let Some(function) = session.function(id) else {
        return;
    };

    let params: Vec<String> = function
        .params
        .iter()
        .map(|param| {
            let ty = param.ty.clone().unwrap_or(IrType::Int(32));
            format!("{ty} %{}", param.name)
        })
        .collect();
    let line = format!(
        "declare {} @{}({})\n",
        function.ret,
        function.name,
        params.join(", ")
    );
    session.emit_preamble(&line);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn define(session: &mut Session, header: &str, body: &[&str]) {
        let header_line = SourceLine::new(1, format!("fn {header}"));
        let body: Vec<SourceLine> = body
            .iter()
            .enumerate()
            .map(|(index, text)| SourceLine::new(index + 2, *text))
            .collect();
        define_function(session, &header_line, header, &body).expect("define");
    }

    #[test]
    fn parses_signatures() {
        let sig = parse_signature("ptr[char] Name(buf: buff[char;4], n: int):").expect("sig");
        assert_eq!(sig.ret, "ptr[char]");
        assert_eq!(sig.name, "Name");
        assert_eq!(sig.params, vec![("buf", "buff[char;4]"), ("n", "int")]);
        assert_eq!(sig.rest, "");
        assert!(parse_signature("int F(a)").unwrap_err().contains("Missing type"));
        assert!(parse_signature("F(a: int)").is_err());
    }

    #[test]
    fn cooks_single_line_functions() {
        let mut session = Session::new("inteldialect");
        define(&mut session, "int Add(a: int, b: int): return a+b endfn", &[]);
        let add = session.function_by_name("Add").expect("function");
        assert_eq!(add.body, "  %t1 = add i32 %a, %b\n  ret i32 %t1\n");
        assert!(!session.has_errors());
        assert_eq!(session.current_scope(), crate::session::Scope::TopLevel);
    }

    #[test]
    fn checks_return_against_signature() {
        let mut session = Session::new("inteldialect");
        define(&mut session, "void Log(n: int):", &["return n"]);
        define(&mut session, "int Get():", &["return"]);
        let messages: Vec<String> = session
            .diagnostics()
            .iter()
            .map(|diag| diag.message.clone())
            .collect();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].contains("returns void but got: return n"));
        assert!(messages[1].contains("must return i32, but got empty return"));
        assert_eq!(session.diagnostics()[1].location.function, "Get");
    }

    #[test]
    fn return_at_top_level_is_an_error() {
        let mut session = Session::new("inteldialect");
        lower_return(&mut session, Some("1")).expect("lower");
        assert!(session.diagnostics()[0].message.contains("outside of a function"));
    }

    #[test]
    fn duplicate_definitions_are_rejected() {
        let mut session = Session::new("inteldialect");
        define(&mut session, "void F():", &["return"]);
        define(&mut session, "void F():", &["return"]);
        assert!(session.diagnostics()[0].message.contains("already defined"));
    }

    #[test]
    fn foreign_declarations_go_to_the_preamble() {
        let mut session = Session::new("inteldialect");
        declare_foreign(&mut session, "dyn_import fn int puts(s: ptr[char]).");
        assert_eq!(session.preamble(), "declare i32 @puts(i8* %s)\n");
        assert!(session.function_by_name("puts").expect("function").is_foreign);

        declare_foreign(&mut session, "dyn_import fn int exit(code: int)");
        assert!(session.diagnostics()[0].message.contains("must end with '.'"));
    }
}

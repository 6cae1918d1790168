//! The line dispatcher.
//!
//! [`compile_block`] walks a slice of lines and routes each one by its
//! [`LineKind`]. Multi-line forms (`if` constructs, `fn` and `struct`
//! blocks, continued `dyn_import` declarations) are captured here and
//! handed to their lowering pass whole. Function bodies and if-branches
//! come back through the same dispatcher, scoped by the session.

use std::path::Path;

use crate::call::{lower_call_statement, render_bytes};
use crate::control_flow::lower_if;
use crate::decl::{DeclKind, lower_declaration};
use crate::error::CoreError;
use crate::expr::{fold_constant, load_global, lower_value, symbol_type};
use crate::eval::Value;
use crate::function::{declare_foreign, define_function, lower_return};
use crate::line::{
    LineKind, SourceLine, classify, find_top_level, is_identifier, matching_paren,
};
use crate::session::Session;
use crate::structs::define_struct;
use crate::types::{IrType, Primitive};

/// Compile `lines` into the current scope.
pub fn compile_block(session: &mut Session, lines: &[SourceLine]) -> Result<(), CoreError> {
    let mut pc = 0;
    while pc < lines.len() {
        let line = &lines[pc];
        pc += 1;
        session.set_location(line.number, &line.text);

        match classify(&line.text, session.asm_mode) {
            LineKind::Blank => {}
            LineKind::Asm(text) => {
                let code = format!(
                    "    call void asm sideeffect {} \"{}\", \"\"()\n",
                    session.asm_dialect,
                    render_bytes(text.as_bytes())
                );
                session.emit(&code)?;
            }
            LineKind::AsmBegin => session.asm_mode = true,
            LineKind::AsmEnd if session.asm_mode => session.asm_mode = false,
            LineKind::AsmEnd => session.error("asmend: without a matching ASM:"),
            LineKind::Unsafe => session.unsafe_mode = true,
            LineKind::Safe => session.unsafe_mode = false,

            LineKind::StructBegin(name) => {
                let end = (pc..lines.len())
                    .find(|&index| classify(&lines[index].text, false) == LineKind::StructEnd);
                match end {
                    Some(end) => {
                        define_struct(session, name, &lines[pc..end]);
                        pc = end + 1;
                    }
                    None => {
                        session.error(format!("Missing endstruct for struct '{name}'"));
                        pc = lines.len();
                    }
                }
            }
            LineKind::StructEnd => session.error("endstruct without a matching struct"),

            LineKind::FnBegin(header) => {
                pc = capture_function(session, lines, pc, line, header)?;
            }
            LineKind::FnEnd => session.error("endfn without a matching fn"),

            LineKind::If(_) => {
                let end = find_endif(lines, pc);
                let last = end.unwrap_or(lines.len() - 1);
                lower_if(session, &lines[pc - 1..=last])?;
                pc = last + 1;
            }
            LineKind::Elif(_) => session.error("elif without a matching if"),
            LineKind::Else => session.error("else without a matching if"),
            LineKind::EndIf => session.error("endif without a matching if"),

            LineKind::Return(value) => lower_return(session, value)?,

            LineKind::DynImport(text) => {
                let mut decl = text.to_string();
                while !decl.trim_end().ends_with('.') && pc < lines.len() {
                    decl.push(' ');
                    decl.push_str(lines[pc].text.trim());
                    pc += 1;
                }
                declare_foreign(session, &decl);
            }

            LineKind::Using { alias, target } => define_alias(session, alias, target),
            LineKind::CtimePrint(args) => ctime_print(session, args),
            LineKind::Lib { kind, target } => link_library(session, kind, target),

            LineKind::Label(name) => {
                if !session.scope_is_terminated() {
                    session.emit(&format!("  br label %{name}\n"))?;
                }
                session.emit(&format!("{name}:\n"))?;
            }
            LineKind::Goto(name) => session.emit(&format!("  br label %{name}\n"))?,

            LineKind::Const(rest) => lower_declaration(session, DeclKind::Const, rest)?,
            LineKind::Var(rest) => lower_declaration(session, DeclKind::Var, rest)?,
            LineKind::MemWrite(rest) => lower_memory_write(session, rest)?,
            LineKind::Call(text) => lower_call_statement(session, text)?,
            LineKind::Unknown(text) => session.error(format!("Unrecognized line: {text}")),
        }
    }
    Ok(())
}

// The `endif` closing the construct whose `if` is the line before `from`.
fn find_endif(lines: &[SourceLine], from: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (index, line) in lines.iter().enumerate().skip(from) {
        match classify(&line.text, false) {
            LineKind::If(_) => depth += 1,
            LineKind::EndIf if depth == 0 => return Some(index),
            LineKind::EndIf => depth -= 1,
            _ => {}
        }
    }
    None
}

/// Capture a `fn` block and define it. Returns the index after the block.
fn capture_function(
    session: &mut Session,
    lines: &[SourceLine],
    pc: usize,
    line: &SourceLine,
    header: &str,
) -> Result<usize, CoreError> {
    let closes_itself = |text: &str| text.trim_end().ends_with("endfn");
    let single_line = closes_itself(header);
    let end = if single_line {
        Some(pc)
    } else {
        // A one-line `fn ... endfn` inside the body does not close it.
        (pc..lines.len())
            .find(|&index| {
                let text = lines[index].text.as_str();
                closes_itself(text) && !matches!(classify(text, false), LineKind::FnBegin(_))
            })
            .map(|index| index + 1)
    };
    let Some(end) = end else {
        session.error(format!("Missing endfn for function '{}'", header.trim()));
        return Ok(lines.len());
    };

    if let Some(active) = session.current_function() {
        let active = active.name.clone();
        session.error(format!(
            "Nested function definitions are not supported (inside '{active}')"
        ));
        return Ok(end);
    }

    let mut body: Vec<SourceLine> = lines[pc..end].to_vec();
    // `return x endfn` closes the block on the same line.
    if let Some(last) = body.pop() {
        let text = last.text.trim_end();
        let before = text[..text.len() - "endfn".len()].trim();
        if !before.is_empty() {
            body.push(SourceLine::new(last.number, before));
        }
    }
    define_function(session, line, header, &body)?;
    Ok(end)
}

fn define_alias(session: &mut Session, alias: &str, target: &str) {
    if !is_identifier(alias) {
        session.error(format!("Invalid type alias name '{alias}'"));
        return;
    }
    match session.types.expand_alias(target) {
        Ok(resolved) if resolved == alias => {
            session.error(format!("Type alias cycle: '{alias}' resolves to itself"));
        }
        Ok(_) => session.types.define_alias(alias, target),
        Err(err) => session.report_type_error(err),
    }
}

fn ctime_print(session: &mut Session, args: &str) {
    let text = args
        .replace('"', "")
        .split_whitespace()
        .map(|token| match session.constants.get(token) {
            Some(constant) => constant.value.clone(),
            None => token.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ");
    tracing::debug!(output = %text, "ctime_print");
    session.ctime_output.push(text);
}

fn link_library(session: &mut Session, kind: &str, target: &str) {
    if !matches!(kind, "dyn" | "static") {
        session.error(format!("Unknown lib type '{kind}'"));
        return;
    }
    let target = target.trim().trim_matches(|c| matches!(c, '"' | '<' | '>'));
    let Some(name) = Path::new(target).file_stem().and_then(|stem| stem.to_str()) else {
        session.error(format!("Invalid library name '{target}'"));
        return;
    };
    tracing::debug!(kind, library = name, "link library");
    if !session.link_libraries.iter().any(|known| known == name) {
        session.link_libraries.push(name.to_string());
    }
}

/// `*(ADDR): TYPE = VALUE`
fn lower_memory_write(session: &mut Session, text: &str) -> Result<(), CoreError> {
    let text = text.trim();
    let parsed = text
        .starts_with('(')
        .then(|| matching_paren(text, 0))
        .flatten()
        .and_then(|close| {
            let addr = text[1..close].trim();
            let rest = text[close + 1..].trim().strip_prefix(':')?;
            let eq = *find_top_level(rest, "=").first()?;
            Some((addr, rest[..eq].trim(), rest[eq + 1..].trim()))
        });
    let Some((addr, ty_text, value)) = parsed else {
        session.error(format!("Malformed memory write '*{text}': expected *(ADDR): TYPE = VALUE"));
        return Ok(());
    };

    let resolved = match session.types.expand_alias(ty_text) {
        Ok(resolved) => resolved,
        Err(err) => {
            session.report_type_error(err);
            return Ok(());
        }
    };
    let ty = match Primitive::from_name(&resolved).map(Primitive::ir) {
        Some(ty) if !ty.is_void() => ty,
        _ => {
            session.error("Only primitive types are allowed in memory writes");
            return Ok(());
        }
    };
    let Some(value) = lower_value(session, value, &ty)? else {
        return Ok(());
    };
    let target_ty = ty.clone().pointer_to();

    let target = if let Ok(Value::Int(raw)) = fold_constant(session, addr) {
        let tmp = session.next_temp();
        session.emit(&format!("  {tmp} = inttoptr i64 {raw} to {target_ty}\n"))?;
        tmp
    } else if let Some(param_ty) = session
        .current_param(addr)
        .and_then(|param| param.ty.clone())
        .filter(IrType::is_pointer)
    {
        cast_pointer(session, format!("%{addr}"), &param_ty, &target_ty)?
    } else if session.symbol(addr).is_some() {
        match symbol_type(session, addr) {
            Some(sym_ty @ IrType::Pointer(_)) => {
                let loaded = load_global(session, addr, &sym_ty)?;
                cast_pointer(session, loaded, &sym_ty, &target_ty)?
            }
            Some(_) => format!("@{addr}"),
            None => return Ok(()),
        }
    } else {
        session.error(format!("Invalid memory write address '{addr}'"));
        return Ok(());
    };

    session.emit(&format!("  store {ty} {value}, {target_ty} {target}\n"))
}

fn cast_pointer(
    session: &mut Session,
    value: String,
    from: &IrType,
    to: &IrType,
) -> Result<String, CoreError> {
    if from == to {
        return Ok(value);
    }
    let tmp = session.next_temp();
    session.emit(&format!("  {tmp} = bitcast {from} {value} to {to}\n"))?;
    Ok(tmp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::number_lines;

    fn compile(source: &str) -> Session {
        let mut session = Session::new("inteldialect");
        compile_block(&mut session, &number_lines(source)).expect("compile");
        session
    }

    fn messages(session: &Session) -> Vec<String> {
        session
            .diagnostics()
            .iter()
            .map(|diag| diag.message.clone())
            .collect()
    }

    #[test]
    fn routes_declarations_and_calls() {
        let session = compile(concat!(
            "dyn_import fn int puts(s: ptr[char]).\n",
            "const Msg: buff[char;3] = \"hi\"\n",
            "puts(\"hi\")\n",
        ));
        assert!(!session.has_errors(), "{:?}", messages(&session));
        assert!(session.preamble().starts_with("declare i32 @puts(i8* %s)\n"));
        assert!(session.entry_body().starts_with("  call i32 @puts(i8* getelementptr"));
    }

    #[test]
    fn captures_multi_line_functions() {
        let session = compile(concat!(
            "fn int Twice(n: int):\n",
            "  if n > 10:\n",
            "    return n\n",
            "  endif\n",
            "  return n * 2 endfn\n",
            "Twice(4)\n",
        ));
        assert!(!session.has_errors(), "{:?}", messages(&session));
        let body = &session.function_by_name("Twice").expect("function").body;
        assert!(body.contains("icmp sgt i32 %n, 10"));
        assert!(body.contains("if0:\n  ret i32 %n\nendif0:\n"));
        assert!(body.ends_with("  %t2 = mul i32 %n, 2\n  ret i32 %t2\n"));
        assert_eq!(session.entry_body(), "  call i32 @Twice(i32 4)\n");
    }

    #[test]
    fn continues_dyn_imports_across_lines() {
        let session = compile("dyn_import fn void Sleep(\n  ms: int\n).\nSleep(5)\n");
        assert!(!session.has_errors(), "{:?}", messages(&session));
        assert_eq!(session.preamble(), "declare void @Sleep(i32 %ms)\n");
    }

    #[test]
    fn reports_structural_errors() {
        let session = compile("endif\nelse\nendfn\nwhat is this\nfn void F():\n  return\n");
        let messages = messages(&session);
        assert_eq!(messages.len(), 5);
        assert!(messages[0].contains("endif without"));
        assert!(messages[3].contains("Unrecognized line: what is this"));
        assert!(messages[4].contains("Missing endfn"));
    }

    #[test]
    fn nested_functions_are_rejected() {
        let session = compile("fn void Outer():\n  fn void Inner(): return endfn\nendfn\n");
        assert!(messages(&session)[0].contains("Nested function"));
        assert!(session.function_by_name("Inner").is_none());
    }

    #[test]
    fn emits_inline_assembly_and_flags() {
        let session = compile("unsafe\nASM:\nmov eax, \"x\"\nasmend:\nsafe\n");
        assert_eq!(
            session.entry_body(),
            "    call void asm sideeffect inteldialect \"mov eax, \\22x\\22\", \"\"()\n"
        );
        assert!(!session.unsafe_mode);
        assert!(!session.asm_mode);
    }

    #[test]
    fn aliases_structs_and_cycles() {
        let session = compile(concat!(
            "struct Pair:\n",
            "  a: int,\n",
            "  b: int\n",
            "endstruct\n",
            "using P = Pair\n",
            "const Origin: P = { 0, 0 }\n",
            "using Q = R\n",
            "using R = Q\n",
        ));
        assert!(session.preamble().contains("%Pair = type { i32, i32 }\n"));
        assert!(session.preamble().contains("@Origin = constant %Pair { i32 0, i32 0 }\n"));
        assert_eq!(messages(&session).len(), 1);
        assert!(messages(&session)[0].contains("cycle"));
    }

    #[test]
    fn records_libraries_and_compile_time_output() {
        let session = compile(concat!(
            "const Answer: int = 42\n",
            "ctime_print \"answer is\" Answer\n",
            "lib dyn \"libs/kernel32.dll\"\n",
            "lib static <m.a>\n",
            "lib dyn <kernel32.dll>\n",
            "lib shared <x.so>\n",
        ));
        assert_eq!(session.ctime_output, vec!["answer is 42".to_string()]);
        assert_eq!(session.link_libraries, vec!["kernel32".to_string(), "m".to_string()]);
        assert!(messages(&session)[0].contains("Unknown lib type 'shared'"));
    }

    #[test]
    fn labels_and_gotos() {
        let session = compile("lb top\ngoto top\n");
        assert_eq!(session.entry_body(), "  br label %top\ntop:\n  br label %top\n");
    }

    #[test]
    fn lowers_memory_writes() {
        let session = compile(concat!(
            "var Slot: int = 0\n",
            "const Port: ptr[int64] = 0x3F8\n",
            "*(0xB8000): uint8 = 65\n",
            "*(Slot): int = 7\n",
            "*(Port): int = 1\n",
            "*(0x10): Pair = 1\n",
        ));
        assert_eq!(
            session.entry_body(),
            concat!(
                "  %t1 = inttoptr i64 753664 to i8*\n",
                "  store i8 65, i8* %t1\n",
                "  store i32 7, i32* @Slot\n",
                "  %t2 = load i64*, i64** @Port\n",
                "  %t3 = bitcast i64* %t2 to i32*\n",
                "  store i32 1, i32* %t3\n",
            )
        );
        assert!(messages(&session)[0].contains("Only primitive types"));
    }
}

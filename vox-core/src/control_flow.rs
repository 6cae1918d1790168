//! `if` / `elif` / `else` / `endif` lowering to labeled blocks.
//!
//! One construct with id `N` and `k` elif branches uses the labels
//! `ifN`, `check_elifN_k` .. `check_elifN_1`, `elifN_{k-1}` .. `elifN_0`,
//! `elseN` (when present) and `endifN`. Ids come from the session counter,
//! so nested and sequential constructs never share a label.

use crate::condition::lower_condition;
use crate::dispatch::compile_block;
use crate::error::CoreError;
use crate::line::{LineKind, SourceLine, classify};
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Branch<'a> {
    If(&'a str),
    Elif(&'a str),
    Else,
}

#[derive(Debug)]
struct Segment<'a> {
    branch: Branch<'a>,
    header: &'a SourceLine,
    body: Vec<SourceLine>,
}

/// Split a construct into its branches. Nested constructs stay inside the
/// body of the branch that contains them. Returns the segments and whether
/// a closing `endif` was found.
fn segment(construct: &[SourceLine]) -> (Vec<Segment<'_>>, bool) {
    let mut segments: Vec<Segment<'_>> = Vec::new();
    let mut depth = 0usize;
    let mut asm = false;

    for line in construct {
        let kind = classify(&line.text, asm);
        match kind {
            LineKind::AsmBegin => asm = true,
            LineKind::AsmEnd => asm = false,
            _ => {}
        }

        let branch = match kind {
            LineKind::If(cond) if segments.is_empty() => Some(Branch::If(cond)),
            LineKind::Elif(cond) if depth == 0 => Some(Branch::Elif(cond)),
            LineKind::Else if depth == 0 => Some(Branch::Else),
            LineKind::EndIf if depth == 0 => return (segments, true),
            _ => None,
        };
        if let Some(branch) = branch {
            segments.push(Segment {
                branch,
                header: line,
                body: Vec::new(),
            });
            continue;
        }

        match kind {
            LineKind::If(_) => depth += 1,
            LineKind::EndIf => depth -= 1,
            _ => {}
        }
        if let Some(current) = segments.last_mut() {
            current.body.push(line.clone());
        }
    }
    (segments, false)
}

/// Lower one captured construct, from its `if` line up to its `endif`.
pub fn lower_if(session: &mut Session, construct: &[SourceLine]) -> Result<(), CoreError> {
    let (segments, closed) = segment(construct);
    if !closed {
        tracing::warn!(
            line = construct.first().map_or(0, |line| line.number),
            "if block without endif, closing it at the end of the enclosing block"
        );
    }

    let id = session.next_if_id();
    let elifs = segments
        .iter()
        .filter(|segment| matches!(segment.branch, Branch::Elif(_)))
        .count();
    let has_else = segments
        .iter()
        .any(|segment| segment.branch == Branch::Else);
    let fallthrough = |remaining: usize| -> String {
        if remaining > 0 {
            format!("check_elif{id}_{remaining}")
        } else if has_else {
            format!("else{id}")
        } else {
            format!("endif{id}")
        }
    };

    let mut remaining = elifs;
    for segment in &segments {
        session.set_location(segment.header.number, &segment.header.text);
        match segment.branch {
            Branch::If(cond) => {
                let value = lower_condition(session, cond)?;
                session.emit(&format!(
                    "  br i1 {value}, label %if{id}, label %{}\nif{id}:\n",
                    fallthrough(remaining)
                ))?;
            }
            Branch::Elif(cond) => {
                close_branch(session, id)?;
                session.emit(&format!("check_elif{id}_{remaining}:\n"))?;
                remaining -= 1;
                let value = lower_condition(session, cond)?;
                session.emit(&format!(
                    "  br i1 {value}, label %elif{id}_{remaining}, label %{}\nelif{id}_{remaining}:\n",
                    fallthrough(remaining)
                ))?;
            }
            Branch::Else => {
                close_branch(session, id)?;
                session.emit(&format!("else{id}:\n"))?;
            }
        }
        compile_block(session, &segment.body)?;
    }

    close_branch(session, id)?;
    session.emit(&format!("endif{id}:\n"))
}

// A branch body that already ended in `ret` needs no jump.
fn close_branch(session: &mut Session, id: usize) -> Result<(), CoreError> {
    if session.scope_is_terminated() {
        return Ok(());
    }
    session.emit(&format!("  br label %endif{id}\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::number_lines;

    fn lower(session: &mut Session, source: &str) {
        lower_if(session, &number_lines(source)).expect("lower");
    }

    #[test]
    fn lowers_if_without_branches() {
        let mut session = Session::new("inteldialect");
        session.define_variable("A", "bool");
        lower(&mut session, "if A:\nendif");
        assert_eq!(
            session.entry_body(),
            concat!(
                "  %t1 = load i1, i1* @A\n",
                "  br i1 %t1, label %if0, label %endif0\n",
                "if0:\n",
                "  br label %endif0\n",
                "endif0:\n",
            )
        );
    }

    #[test]
    fn chains_elif_checks_down_to_else() {
        let mut session = Session::new("inteldialect");
        lower(&mut session, "if 1 == 2:\nelif 2 == 2:\nelif 0:\nelse:\nendif");
        assert_eq!(
            session.entry_body(),
            concat!(
                "  br i1 0, label %if0, label %check_elif0_2\n",
                "if0:\n",
                "  br label %endif0\n",
                "check_elif0_2:\n",
                "  br i1 1, label %elif0_1, label %check_elif0_1\n",
                "elif0_1:\n",
                "  br label %endif0\n",
                "check_elif0_1:\n",
                "  br i1 0, label %elif0_0, label %else0\n",
                "elif0_0:\n",
                "  br label %endif0\n",
                "else0:\n",
                "  br label %endif0\n",
                "endif0:\n",
            )
        );
    }

    #[test]
    fn nested_constructs_get_fresh_ids() {
        let mut session = Session::new("inteldialect");
        lower(&mut session, "if 1:\n  if 0:\n  else:\n  endif\nelse:\nendif");
        let body = session.entry_body();
        assert!(body.contains("label %if0, label %else0"));
        assert!(body.contains("label %if1, label %else1"));
        assert_eq!(body.matches("\nendif0:\n").count(), 1);
        assert_eq!(body.matches("\nendif1:\n").count(), 1);
        // The inner construct closes before the outer else opens.
        let inner_end = body.find("endif1:").expect("inner");
        let outer_else = body.find("else0:").expect("outer");
        assert!(inner_end < outer_else);
    }

    #[test]
    fn returning_branches_skip_the_jump() {
        use crate::session::{Function, Scope};
        use crate::types::IrType;

        let mut session = Session::new("inteldialect");
        let id = session
            .register_function(Function {
                name: "F".to_string(),
                params: Vec::new(),
                ret: IrType::Void,
                is_foreign: false,
                body: String::new(),
            })
            .expect("register");
        session.begin_function(id).expect("begin");
        lower(&mut session, "if 1:
  return
endif");
        assert_eq!(session.current_scope(), Scope::Function(id));
        assert_eq!(
            session.current_function().expect("function").body,
            "  br i1 1, label %if0, label %endif0\nif0:\n  ret void\nendif0:\n"
        );
    }

    #[test]
    fn missing_endif_closes_implicitly() {
        let mut session = Session::new("inteldialect");
        lower(&mut session, "if 1:\n");
        assert!(session.entry_body().ends_with("  br label %endif0\nendif0:\n"));
        assert!(!session.has_errors());
    }
}

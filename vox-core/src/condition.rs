//! Lowering of boolean conditions to `i1` operands.
//!
//! Static conditions fold to `0`/`1`. Dynamic ones are reduced in a fixed
//! scan order: wrapping parentheses, leading `!`, then the first top-level
//! `&& || ^^ == != <= < >= >` (checked in that order). Every instruction
//! defines a fresh temporary from the session counter.

use crate::error::CoreError;
use crate::expr::{convert, load_global, lower_value, symbol_type};
use crate::eval::{Value, eval_expr};
use crate::line::{find_top_level, is_identifier, strip_outer_parens};
use crate::parser::parse;
use crate::session::Session;
use crate::types::IrType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Logic {
    And,
    Or,
    Xor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Compare {
    Eq,
    Ne,
    Le,
    Lt,
    Ge,
    Gt,
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Logic(Logic),
    Compare(Compare),
}

const OPERATORS: &[(&str, Op)] = &[
    ("&&", Op::Logic(Logic::And)),
    ("||", Op::Logic(Logic::Or)),
    ("^^", Op::Logic(Logic::Xor)),
    ("==", Op::Compare(Compare::Eq)),
    ("!=", Op::Compare(Compare::Ne)),
    ("<=", Op::Compare(Compare::Le)),
    ("<", Op::Compare(Compare::Lt)),
    (">=", Op::Compare(Compare::Ge)),
    (">", Op::Compare(Compare::Gt)),
];

impl Logic {
    fn instr(self) -> &'static str {
        match self {
            Logic::And => "and",
            Logic::Or => "or",
            Logic::Xor => "xor",
        }
    }
}

impl Compare {
    fn int_predicate(self) -> &'static str {
        match self {
            Compare::Eq => "eq",
            Compare::Ne => "ne",
            Compare::Le => "sle",
            Compare::Lt => "slt",
            Compare::Ge => "sge",
            Compare::Gt => "sgt",
        }
    }

    fn float_predicate(self) -> &'static str {
        match self {
            Compare::Eq => "oeq",
            Compare::Ne => "one",
            Compare::Le => "ole",
            Compare::Lt => "olt",
            Compare::Ge => "oge",
            Compare::Gt => "ogt",
        }
    }
}

/// Lower `expr` to an `i1` operand: `0`, `1`, or a register.
pub fn lower_condition(session: &mut Session, expr: &str) -> Result<String, CoreError> {
    let expr = expr.trim();
    if let Some(value) = static_value(session, expr) {
        return Ok(if value.truthy() { "1" } else { "0" }.to_string());
    }

    let inner = strip_outer_parens(expr);
    if inner.len() != expr.len() {
        return lower_condition(session, inner);
    }

    if let Some(operand) = expr.strip_prefix('!') {
        let value = lower_condition(session, operand)?;
        let tmp = session.next_temp();
        session.emit(&format!("  {tmp} = xor i1 1, {value}\n"))?;
        return Ok(tmp);
    }

    for (token, op) in OPERATORS {
        let Some(&at) = find_top_level(expr, token).first() else {
            continue;
        };
        let lhs = &expr[..at];
        let rhs = &expr[at + token.len()..];
        return match op {
            Op::Logic(logic) => {
                let left = lower_condition(session, lhs)?;
                let right = lower_condition(session, rhs)?;
                let tmp = session.next_temp();
                session.emit(&format!("  {tmp} = {} i1 {left}, {right}\n", logic.instr()))?;
                Ok(tmp)
            }
            Op::Compare(compare) => lower_comparison(session, *compare, lhs, rhs),
        };
    }

    let name = expr;
    if is_identifier(name) {
        if let Some(param) = session.current_param(name) {
            let ty = param.ty.clone().unwrap_or(IrType::Int(1));
            return narrow(session, format!("%{name}"), &ty);
        }
        if session.symbol(name).is_some() {
            let ty = symbol_type(session, name).unwrap_or(IrType::Int(1));
            let loaded = load_global(session, name, &ty)?;
            return narrow(session, loaded, &ty);
        }
    }

    let tmp = session.next_temp();
    session.emit(&format!("  {tmp} = icmp ne i32 {expr}, 0\n"))?;
    Ok(tmp)
}

// Static iff the expression parses and names nothing.
fn static_value(session: &mut Session, expr: &str) -> Option<Value> {
    let parsed = parse(expr).ok()?;
    if parsed.mentions_names() {
        return None;
    }
    match eval_expr(&parsed, &|_| None) {
        Ok(value) => Some(value),
        Err(err) => {
            session.error(format!("Cannot evaluate condition '{expr}': {err}"));
            Some(Value::Int(0))
        }
    }
}

/// Compare a wide value against zero to get an `i1`.
fn narrow(session: &mut Session, value: String, ty: &IrType) -> Result<String, CoreError> {
    let predicate = match ty {
        IrType::Int(1) => return Ok(value),
        IrType::Float | IrType::Double => format!("fcmp one {ty} {value}, 0.0"),
        other => format!("icmp ne {other} {value}, {}", other.zero_literal()),
    };
    let tmp = session.next_temp();
    session.emit(&format!("  {tmp} = {predicate}\n"))?;
    Ok(tmp)
}

/// One side of a comparison. `value` is `None` until the comparison type is
/// known; a value without a type is a bool keyword and fits any type.
struct Operand {
    value: Option<String>,
    ty: Option<IrType>,
}

fn lower_comparison(
    session: &mut Session,
    compare: Compare,
    lhs: &str,
    rhs: &str,
) -> Result<String, CoreError> {
    let left = comparison_operand(session, lhs)?;
    let right = comparison_operand(session, rhs)?;
    let ty = match (&left.ty, &right.ty) {
        (Some(a), Some(b)) => common_type(a, b),
        (Some(ty), None) | (None, Some(ty)) => ty.clone(),
        (None, None) => IrType::Int(32),
    };

    let left = finish_operand(session, left, lhs, &ty)?;
    let right = finish_operand(session, right, rhs, &ty)?;

    let tmp = session.next_temp();
    let instr = if ty.is_float() {
        format!("fcmp {}", compare.float_predicate())
    } else {
        format!("icmp {}", compare.int_predicate())
    };
    session.emit(&format!("  {tmp} = {instr} {ty} {left}, {right}\n"))?;
    Ok(tmp)
}

/// Type both sides of a comparison are brought to. A bool on either side
/// makes it a truth comparison; otherwise the wider operand wins.
fn common_type(a: &IrType, b: &IrType) -> IrType {
    match (a, b) {
        _ if a == b => a.clone(),
        (IrType::Int(1), IrType::Int(_)) | (IrType::Int(_), IrType::Int(1)) => IrType::Int(1),
        (IrType::Int(x), IrType::Int(y)) => IrType::Int(*x.max(y)),
        (IrType::Float, IrType::Double) | (IrType::Double, IrType::Float) => IrType::Double,
        (float @ (IrType::Float | IrType::Double), IrType::Int(_))
        | (IrType::Int(_), float @ (IrType::Float | IrType::Double)) => float.clone(),
        _ => a.clone(),
    }
}

// Symbols and parameters are lowered right away; other text waits until the
// comparison type is known.
fn comparison_operand(session: &mut Session, text: &str) -> Result<Operand, CoreError> {
    let text = strip_outer_parens(text);
    match text {
        "true" | "True" => {
            return Ok(Operand {
                value: Some("1".to_string()),
                ty: None,
            });
        }
        "false" | "False" => {
            return Ok(Operand {
                value: Some("0".to_string()),
                ty: None,
            });
        }
        _ => {}
    }

    if is_identifier(text) {
        if let Some(param) = session.current_param(text) {
            return Ok(Operand {
                value: Some(format!("%{text}")),
                ty: param.ty.clone(),
            });
        }
        if session.symbol(text).is_some() {
            if let Some(ty) = symbol_type(session, text) {
                let loaded = load_global(session, text, &ty)?;
                return Ok(Operand {
                    value: Some(loaded),
                    ty: Some(ty),
                });
            }
        }
    }

    Ok(Operand {
        value: None,
        ty: None,
    })
}

fn finish_operand(
    session: &mut Session,
    operand: Operand,
    text: &str,
    ty: &IrType,
) -> Result<String, CoreError> {
    match (operand.value, operand.ty) {
        (Some(value), Some(from)) if from == *ty => Ok(value),
        (Some(value), Some(from)) if *ty == IrType::Int(1) => narrow(session, value, &from),
        (Some(value), Some(from)) => convert(session, value, &from, ty),
        (Some(bit), None) if ty.is_float() => Ok(format!("{bit}.0")),
        (Some(value), None) => Ok(value),
        (None, _) => Ok(lower_value(session, text, ty)?.unwrap_or_else(|| text.trim().to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_static_conditions() {
        let mut session = Session::new("inteldialect");
        assert_eq!(lower_condition(&mut session, "1 < 2 && true").expect("lower"), "1");
        assert_eq!(lower_condition(&mut session, "(3 == 4)").expect("lower"), "0");
        assert_eq!(session.entry_body(), "");
    }

    #[test]
    fn compares_loaded_globals() {
        let mut session = Session::new("inteldialect");
        session.define_variable("Count", "int");
        let value = lower_condition(&mut session, "Count >= 10").expect("lower");
        assert_eq!(value, "%t2");
        assert_eq!(
            session.entry_body(),
            "  %t1 = load i32, i32* @Count\n  %t2 = icmp sge i32 %t1, 10\n"
        );
    }

    #[test]
    fn bool_keywords_coerce_to_bits() {
        let mut session = Session::new("inteldialect");
        session.define_variable("Ready", "bool");
        lower_condition(&mut session, "Ready == True").expect("lower");
        assert_eq!(
            session.entry_body(),
            "  %t1 = load i1, i1* @Ready\n  %t2 = icmp eq i1 %t1, 1\n"
        );
    }

    #[test]
    fn widens_the_narrower_integer() {
        let mut session = Session::new("inteldialect");
        session.define_variable("A", "int");
        session.define_variable("B", "int64");
        lower_condition(&mut session, "A == B").expect("lower");
        assert_eq!(
            session.entry_body(),
            concat!(
                "  %t1 = load i32, i32* @A\n",
                "  %t2 = load i64, i64* @B\n",
                "  %t3 = sext i32 %t1 to i64\n",
                "  %t4 = icmp eq i64 %t3, %t2\n",
            )
        );
    }

    #[test]
    fn bool_keywords_take_the_other_side_type() {
        let mut session = Session::new("inteldialect");
        session.define_variable("A", "int");
        lower_condition(&mut session, "true == A").expect("lower");
        assert_eq!(
            session.entry_body(),
            "  %t1 = load i32, i32* @A\n  %t2 = icmp eq i32 1, %t1\n"
        );
    }

    #[test]
    fn bool_against_int_compares_truth() {
        let mut session = Session::new("inteldialect");
        session.define_variable("Ready", "bool");
        session.define_variable("Count", "int");
        lower_condition(&mut session, "Ready != Count").expect("lower");
        assert_eq!(
            session.entry_body(),
            concat!(
                "  %t1 = load i1, i1* @Ready\n",
                "  %t2 = load i32, i32* @Count\n",
                "  %t3 = icmp ne i32 %t2, 0\n",
                "  %t4 = icmp ne i1 %t1, %t3\n",
            )
        );
    }

    #[test]
    fn negates_and_combines() {
        let mut session = Session::new("inteldialect");
        session.define_variable("A", "bool");
        session.define_variable("B", "int");
        let value = lower_condition(&mut session, "!(A && B)").expect("lower");
        assert_eq!(value, "%t5");
        assert_eq!(
            session.entry_body(),
            concat!(
                "  %t1 = load i1, i1* @A\n",
                "  %t2 = load i32, i32* @B\n",
                "  %t3 = icmp ne i32 %t2, 0\n",
                "  %t4 = and i1 %t1, %t3\n",
                "  %t5 = xor i1 1, %t4\n",
            )
        );
    }

    #[test]
    fn compares_floats_with_ordered_predicates() {
        let mut session = Session::new("inteldialect");
        session.define_variable("Ratio", "float64");
        lower_condition(&mut session, "Ratio < 0.5").expect("lower");
        assert!(session.entry_body().contains("fcmp olt double %t1, 0.5"));
    }

    #[test]
    fn falls_back_to_raw_comparison() {
        let mut session = Session::new("inteldialect");
        let value = lower_condition(&mut session, "@flag").expect("lower");
        assert_eq!(value, "%t1");
        assert_eq!(session.entry_body(), "  %t1 = icmp ne i32 @flag, 0\n");
    }
}

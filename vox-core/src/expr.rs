//! Constant folding and lowering of value expressions.

use crate::call::build_call;
use crate::error::CoreError;
use crate::eval::{EvalError, Value, evaluate};
use crate::line::{is_identifier, split_call, strip_outer_parens};
use crate::session::Session;
use crate::types::IrType;

/// Fold `text` at compile time. Constant names are replaced by their
/// literal values; anything else named is an error.
pub fn fold_constant(session: &Session, text: &str) -> Result<Value, EvalError> {
    evaluate(text, |name| {
        session
            .constants
            .get(name)
            .and_then(|constant| Value::from_literal(&constant.value))
    })
}

/// [`fold_constant`], reporting a failure as a soft error.
pub fn fold_or_report(session: &mut Session, text: &str) -> Option<Value> {
    match fold_constant(session, text) {
        Ok(value) => Some(value),
        Err(err) => {
            session.error(format!("Cannot evaluate expression '{text}': {err}"));
            None
        }
    }
}

/// Render a folded value as a literal of type `ty`.
pub fn literal_for(value: Value, ty: &IrType) -> Result<String, String> {
    match (ty, value) {
        (IrType::Int(1), value) => Ok(if value.truthy() { "1" } else { "0" }.to_string()),
        (IrType::Int(_), Value::Int(v)) => Ok(v.to_string()),
        (IrType::Int(bits), Value::Float(v)) => {
            Err(format!("expected an i{bits} value, found {v:?}"))
        }
        (IrType::Float, value) => Ok(float_literal(value.as_f64(), true)),
        (IrType::Double, value) => Ok(float_literal(value.as_f64(), false)),
        (IrType::Pointer(_), Value::Int(0)) => Ok("null".to_string()),
        (IrType::Pointer(_), Value::Int(v)) => Ok(format!("inttoptr (i64 {v} to {ty})")),
        (other, value) => Err(format!("cannot use {value} as a {other} value")),
    }
}

// Decimal when the backend can parse it exactly, IEEE hex otherwise.
fn float_literal(value: f64, single: bool) -> String {
    let value = if single { f64::from(value as f32) } else { value };
    let text = format!("{value:?}");
    if value.is_finite() && text.contains('.') && !text.contains(['e', 'E']) {
        text
    } else {
        format!("0x{:016X}", value.to_bits())
    }
}

/// Emit a load of a global symbol and return the register holding it.
pub fn load_global(session: &mut Session, name: &str, ty: &IrType) -> Result<String, CoreError> {
    let tmp = session.next_temp();
    session.emit(&format!("  {tmp} = load {ty}, {ty}* @{name}\n"))?;
    Ok(tmp)
}

/// Lowered IR type of a constant or variable.
pub fn symbol_type(session: &mut Session, name: &str) -> Option<IrType> {
    let source = session.symbol(name)?.source_type().to_string();
    session.lower_type(&source)
}

/// Lower a value expression to an operand of type `ty`.
///
/// Foldable expressions become literals, parameters their registers,
/// constants and variables loads, calls call instructions, and a single
/// `+ - * / %` form the matching arithmetic instruction. Returns `None`
/// after reporting a soft error.
pub fn lower_value(
    session: &mut Session,
    text: &str,
    ty: &IrType,
) -> Result<Option<String>, CoreError> {
    let text = strip_outer_parens(text);
    if text.is_empty() {
        session.error("Expected a value");
        return Ok(None);
    }

    match fold_constant(session, text) {
        Ok(value) => {
            return Ok(match literal_for(value, ty) {
                Ok(literal) => Some(literal),
                Err(message) => {
                    session.error(format!("Invalid value '{text}': {message}"));
                    None
                }
            });
        }
        Err(
            err @ (EvalError::DivisionByZero | EvalError::Overflow | EvalError::IntegerOnly(_)),
        ) => {
            session.error(format!("Cannot evaluate expression '{text}': {err}"));
            return Ok(None);
        }
        Err(_) => {}
    }

    if is_identifier(text) {
        if let Some(param) = session.current_param(text) {
            let from = param.ty.clone();
            let register = format!("%{text}");
            return match from {
                Some(from) => convert(session, register, &from, ty).map(Some),
                None => Ok(Some(register)),
            };
        }
        if session.symbol(text).is_some() {
            let Some(from) = symbol_type(session, text) else {
                return Ok(None);
            };
            let loaded = load_global(session, text, &from)?;
            return convert(session, loaded, &from, ty).map(Some);
        }
        session.error(format!("Unknown name '{text}'"));
        return Ok(None);
    }

    if let Some((name, _)) = split_call(text) {
        if session.function_id(name).is_some() {
            let Some(call) = build_call(session, text, None)? else {
                return Ok(None);
            };
            if call.ret.is_void() {
                session.error(format!("Function '{name}' returns void and has no value"));
                return Ok(None);
            }
            let tmp = session.next_temp();
            session.emit(&format!("  {tmp} = {}\n", call.text))?;
            return Ok(Some(tmp));
        }
    }

    if let Some((lhs, op, rhs)) = split_arithmetic(text) {
        let Some(left) = lower_value(session, lhs, ty)? else {
            return Ok(None);
        };
        let Some(right) = lower_value(session, rhs, ty)? else {
            return Ok(None);
        };
        let Some(instr) = arithmetic_instr(op, ty) else {
            session.error(format!("Operator '{op}' is not defined for {ty}"));
            return Ok(None);
        };
        let tmp = session.next_temp();
        session.emit(&format!("  {tmp} = {instr} {ty} {left}, {right}\n"))?;
        return Ok(Some(tmp));
    }

    if let Some(operand) = text.strip_prefix('-') {
        let Some(value) = lower_value(session, operand, ty)? else {
            return Ok(None);
        };
        let tmp = session.next_temp();
        if ty.is_float() {
            session.emit(&format!("  {tmp} = fneg {ty} {value}\n"))?;
        } else {
            session.emit(&format!("  {tmp} = sub {ty} 0, {value}\n"))?;
        }
        return Ok(Some(tmp));
    }

    session.error(format!("Cannot lower value '{text}'"));
    Ok(None)
}

/// Convert `value` between scalar types; other pairs pass through.
pub fn convert(
    session: &mut Session,
    value: String,
    from: &IrType,
    to: &IrType,
) -> Result<String, CoreError> {
    let instr = match (from, to) {
        (IrType::Int(a), IrType::Int(b)) if a < b => "sext",
        (IrType::Int(a), IrType::Int(b)) if a > b => "trunc",
        (IrType::Int(_), IrType::Float | IrType::Double) => "sitofp",
        (IrType::Float | IrType::Double, IrType::Int(_)) => "fptosi",
        (IrType::Float, IrType::Double) => "fpext",
        (IrType::Double, IrType::Float) => "fptrunc",
        _ => return Ok(value),
    };
    let tmp = session.next_temp();
    session.emit(&format!("  {tmp} = {instr} {from} {value} to {to}\n"))?;
    Ok(tmp)
}

fn arithmetic_instr(op: char, ty: &IrType) -> Option<&'static str> {
    let instr = match (op, ty.is_float()) {
        ('+', false) => "add",
        ('-', false) => "sub",
        ('*', false) => "mul",
        ('/', false) => "sdiv",
        ('%', false) => "srem",
        ('+', true) => "fadd",
        ('-', true) => "fsub",
        ('*', true) => "fmul",
        ('/', true) => "fdiv",
        ('%', true) => "frem",
        _ => return None,
    };
    matches!(ty, IrType::Int(_) | IrType::Float | IrType::Double).then_some(instr)
}

/// Split at the last lowest-precedence binary operator outside parens.
fn split_arithmetic(text: &str) -> Option<(&str, char, &str)> {
    for ops in [&['+', '-'][..], &['*', '/', '%'][..]] {
        let mut depth = 0i32;
        let mut after_operand = false;
        let mut found = None;
        for (index, ch) in text.char_indices() {
            match ch {
                '(' => depth += 1,
                ')' => depth -= 1,
                _ if depth == 0 && after_operand && ops.contains(&ch) => found = Some((index, ch)),
                _ => {}
            }
            if !ch.is_whitespace() {
                after_operand = ch.is_ascii_alphanumeric() || matches!(ch, ')' | '_' | '.');
            }
        }
        if let Some((index, op)) = found {
            return Some((&text[..index], op, &text[index + op.len_utf8()..]));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Function, Param};

    fn session_with_add() -> Session {
        let mut session = Session::new("inteldialect");
        let param = |name: &str| Param {
            name: name.to_string(),
            source_type: "int".to_string(),
            ty: Some(IrType::Int(32)),
        };
        let id = session
            .register_function(Function {
                name: "Add".to_string(),
                params: vec![param("a"), param("b")],
                ret: IrType::Int(32),
                is_foreign: false,
                body: String::new(),
            })
            .expect("register");
        session.begin_function(id).expect("begin");
        session
    }

    #[test]
    fn folds_with_constant_substitution() {
        let mut session = Session::new("inteldialect");
        session.define_constant("WIDTH", "40", "int");
        assert_eq!(fold_constant(&session, "WIDTH * 2 + 1"), Ok(Value::Int(81)));
        assert!(fold_or_report(&mut session, "HEIGHT").is_none());
        assert!(session.diagnostics()[0].message.contains("HEIGHT"));
    }

    #[test]
    fn renders_literals_per_type() {
        assert_eq!(literal_for(Value::Int(5), &IrType::Int(32)).as_deref(), Ok("5"));
        assert_eq!(literal_for(Value::Int(7), &IrType::Int(1)).as_deref(), Ok("1"));
        assert_eq!(literal_for(Value::Int(2), &IrType::Double).as_deref(), Ok("2.0"));
        assert_eq!(literal_for(Value::Float(0.5), &IrType::Float).as_deref(), Ok("0.5"));
        let single = literal_for(Value::Float(0.1), &IrType::Float).expect("literal");
        assert_eq!(single.parse::<f64>().expect("decimal"), f64::from(0.1f32));
        let huge = literal_for(Value::Float(1e300), &IrType::Double).expect("literal");
        assert!(huge.starts_with("0x"));
        assert!(literal_for(Value::Float(1.5), &IrType::Int(32)).is_err());
    }

    #[test]
    fn lowers_parameter_arithmetic() {
        let mut session = session_with_add();
        let value = lower_value(&mut session, "a+b", &IrType::Int(32)).expect("lower");
        assert_eq!(value.as_deref(), Some("%t1"));
        let body = &session.current_function().expect("function").body;
        assert_eq!(body, "  %t1 = add i32 %a, %b\n");
    }

    #[test]
    fn splits_at_last_lowest_operator() {
        let mut session = session_with_add();
        lower_value(&mut session, "a - b * 2 - 1", &IrType::Int(32)).expect("lower");
        let body = &session.current_function().expect("function").body;
        assert_eq!(
            body,
            "  %t1 = mul i32 %b, 2\n  %t2 = sub i32 %a, %t1\n  %t3 = sub i32 %t2, 1\n"
        );
    }

    #[test]
    fn loads_globals_with_their_declared_type() {
        let mut session = Session::new("inteldialect");
        session.define_variable("Count", "int64");
        let value = lower_value(&mut session, "Count", &IrType::Int(64)).expect("lower");
        assert_eq!(value.as_deref(), Some("%t1"));
        assert_eq!(session.entry_body(), "  %t1 = load i64, i64* @Count\n");
    }

    #[test]
    fn reports_unknown_names() {
        let mut session = Session::new("inteldialect");
        let value = lower_value(&mut session, "ghost", &IrType::Int(32)).expect("lower");
        assert!(value.is_none());
        assert!(session.has_errors());
    }
}

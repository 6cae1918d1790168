//! Compile-time evaluation of constant and condition expressions.
//!
//! The evaluator only knows arithmetic, bitwise, comparison and logical
//! operators. Names are resolved through a caller-supplied lookup; there is
//! no access to functions or runtime state.

use std::fmt;

use thiserror::Error;

use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::parser::parse;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("unexpected character '{ch}' at byte {position}")]
    UnexpectedChar { ch: char, position: usize },
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("unexpected token '{0}'")]
    UnexpectedToken(String),
    #[error("unclosed parenthesis")]
    UnclosedParen,
    #[error("invalid numeric literal '{0}'")]
    BadLiteral(String),
    #[error("name '{0}' has no compile-time value")]
    UnknownName(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("integer overflow")]
    Overflow,
    #[error("operator '{0}' needs integer operands")]
    IntegerOnly(&'static str),
}

/// A compile-time value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
}

impl Value {
    /// Parse a literal as stored in the constant table.
    pub fn from_literal(text: &str) -> Option<Value> {
        let text = text.trim();
        match parse(text).ok()? {
            Expr::Int(value) => Some(Value::Int(value)),
            Expr::Float(value) => Some(Value::Float(value)),
            Expr::Bool(value) => Some(Value::Int(value as i64)),
            Expr::Unary {
                op: UnaryOp::Neg,
                operand,
            } => match *operand {
                Expr::Int(value) => value.checked_neg().map(Value::Int),
                Expr::Float(value) => Some(Value::Float(-value)),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn truthy(self) -> bool {
        match self {
            Value::Int(value) => value != 0,
            Value::Float(value) => value != 0.0,
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Value::Int(value) => value as f64,
            Value::Float(value) => value,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(value) => write!(f, "{value}"),
            // `{:?}` keeps a decimal point on whole numbers (5.0, not 5).
            Value::Float(value) => write!(f, "{value:?}"),
        }
    }
}

/// Parse and evaluate `source`, resolving names through `lookup`.
pub fn evaluate(source: &str, lookup: impl Fn(&str) -> Option<Value>) -> Result<Value, EvalError> {
    let expr = parse(source)?;
    eval_expr(&expr, &lookup)
}

pub fn eval_expr(expr: &Expr, lookup: &dyn Fn(&str) -> Option<Value>) -> Result<Value, EvalError> {
    match expr {
        Expr::Int(value) => Ok(Value::Int(*value)),
        Expr::Float(value) => Ok(Value::Float(*value)),
        Expr::Bool(value) => Ok(Value::Int(*value as i64)),
        Expr::Name(name) => lookup(name).ok_or_else(|| EvalError::UnknownName(name.clone())),
        Expr::Unary { op, operand } => {
            let value = eval_expr(operand, lookup)?;
            match (op, value) {
                (UnaryOp::Plus, value) => Ok(value),
                (UnaryOp::Neg, Value::Int(v)) => v.checked_neg().map(Value::Int).ok_or(EvalError::Overflow),
                (UnaryOp::Neg, Value::Float(v)) => Ok(Value::Float(-v)),
                (UnaryOp::Not, value) => Ok(bool_value(!value.truthy())),
                (UnaryOp::BitNot, Value::Int(v)) => Ok(Value::Int(!v)),
                (UnaryOp::BitNot, Value::Float(_)) => Err(EvalError::IntegerOnly("~")),
            }
        }
        Expr::Binary { op, lhs, rhs } => {
            let left = eval_expr(lhs, lookup)?;
            let right = eval_expr(rhs, lookup)?;
            binary(*op, left, right)
        }
    }
}

fn binary(op: BinaryOp, left: Value, right: Value) -> Result<Value, EvalError> {
    use BinaryOp::*;

    match op {
        And => return Ok(bool_value(left.truthy() && right.truthy())),
        Or => return Ok(bool_value(left.truthy() || right.truthy())),
        Xor => return Ok(bool_value(left.truthy() ^ right.truthy())),
        Eq => return Ok(bool_value(left.as_f64() == right.as_f64())),
        Ne => return Ok(bool_value(left.as_f64() != right.as_f64())),
        Lt => return Ok(bool_value(left.as_f64() < right.as_f64())),
        Le => return Ok(bool_value(left.as_f64() <= right.as_f64())),
        Gt => return Ok(bool_value(left.as_f64() > right.as_f64())),
        Ge => return Ok(bool_value(left.as_f64() >= right.as_f64())),
        _ => {}
    }

    match (left, right) {
        // A negative integer exponent yields a float, as `2^-1 == 0.5`.
        (Value::Int(_), Value::Int(r)) if op == Pow && r < 0 => {
            float_binary(op, left.as_f64(), right.as_f64())
        }
        (Value::Int(l), Value::Int(r)) => int_binary(op, l, r).map(Value::Int),
        _ => float_binary(op, left.as_f64(), right.as_f64()),
    }
}

fn int_binary(op: BinaryOp, l: i64, r: i64) -> Result<i64, EvalError> {
    use BinaryOp::*;

    let result = match op {
        Add => l.checked_add(r),
        Sub => l.checked_sub(r),
        Mul => l.checked_mul(r),
        Div | Rem if r == 0 => return Err(EvalError::DivisionByZero),
        // Integer division truncates toward zero, as the backend's `sdiv`.
        Div => l.checked_div(r),
        Rem => l.checked_rem(r),
        Pow => u32::try_from(r).ok().and_then(|exp| l.checked_pow(exp)),
        Shl => u32::try_from(r).ok().and_then(|shift| l.checked_shl(shift)),
        Shr => u32::try_from(r).ok().and_then(|shift| l.checked_shr(shift)),
        BitAnd => Some(l & r),
        BitOr => Some(l | r),
        And | Or | Xor | Eq | Ne | Lt | Le | Gt | Ge => unreachable!("handled in binary()"),
    };
    result.ok_or(EvalError::Overflow)
}

fn float_binary(op: BinaryOp, l: f64, r: f64) -> Result<Value, EvalError> {
    use BinaryOp::*;

    let value = match op {
        Add => l + r,
        Sub => l - r,
        Mul => l * r,
        Div | Rem if r == 0.0 => return Err(EvalError::DivisionByZero),
        Div => l / r,
        Rem => l % r,
        Pow => l.powf(r),
        Shl => return Err(EvalError::IntegerOnly("<<")),
        Shr => return Err(EvalError::IntegerOnly(">>")),
        BitAnd => return Err(EvalError::IntegerOnly("&")),
        BitOr => return Err(EvalError::IntegerOnly("|")),
        And | Or | Xor | Eq | Ne | Lt | Le | Gt | Ge => unreachable!("handled in binary()"),
    };
    Ok(Value::Float(value))
}

fn bool_value(value: bool) -> Value {
    Value::Int(if value { 1 } else { 0 })
}

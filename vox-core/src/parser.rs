use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::eval::EvalError;
use crate::lexer::{Token, TokenKind, lex};

/// Binary operator levels, loosest first.
const LEVELS: &[&[(TokenKind, BinaryOp)]] = &[
    &[(TokenKind::PipePipe, BinaryOp::Or)],
    &[(TokenKind::CaretCaret, BinaryOp::Xor)],
    &[(TokenKind::AmpAmp, BinaryOp::And)],
    &[
        (TokenKind::EqEq, BinaryOp::Eq),
        (TokenKind::NotEq, BinaryOp::Ne),
        (TokenKind::Less, BinaryOp::Lt),
        (TokenKind::LessEq, BinaryOp::Le),
        (TokenKind::Greater, BinaryOp::Gt),
        (TokenKind::GreaterEq, BinaryOp::Ge),
    ],
    &[(TokenKind::Pipe, BinaryOp::BitOr)],
    &[(TokenKind::Amp, BinaryOp::BitAnd)],
    &[(TokenKind::Shl, BinaryOp::Shl), (TokenKind::Shr, BinaryOp::Shr)],
    &[(TokenKind::Plus, BinaryOp::Add), (TokenKind::Minus, BinaryOp::Sub)],
    &[
        (TokenKind::Star, BinaryOp::Mul),
        (TokenKind::Slash, BinaryOp::Div),
        (TokenKind::Percent, BinaryOp::Rem),
    ],
];

pub fn parse(input: &str) -> Result<Expr, EvalError> {
    let tokens = lex(input)?;
    let mut position = 0;
    let expr = parse_binary(input, &tokens, &mut position, 0)?;
    if let Some(token) = tokens.get(position) {
        return Err(EvalError::UnexpectedToken(token.text(input).to_string()));
    }
    Ok(expr)
}

fn parse_binary(
    source: &str,
    tokens: &[Token],
    position: &mut usize,
    level: usize,
) -> Result<Expr, EvalError> {
    let Some(operators) = LEVELS.get(level) else {
        return parse_unary(source, tokens, position);
    };
    let mut lhs = parse_binary(source, tokens, position, level + 1)?;
    while let Some(op) = tokens.get(*position).and_then(|token| {
        operators
            .iter()
            .find(|(kind, _)| *kind == token.kind)
            .map(|(_, op)| *op)
    }) {
        *position += 1;
        let rhs = parse_binary(source, tokens, position, level + 1)?;
        lhs = Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        };
    }
    Ok(lhs)
}

fn parse_unary(source: &str, tokens: &[Token], position: &mut usize) -> Result<Expr, EvalError> {
    let op = match tokens.get(*position).map(|token| token.kind) {
        Some(TokenKind::Minus) => UnaryOp::Neg,
        Some(TokenKind::Plus) => UnaryOp::Plus,
        Some(TokenKind::Bang) => UnaryOp::Not,
        Some(TokenKind::Tilde) => UnaryOp::BitNot,
        _ => return parse_power(source, tokens, position),
    };
    *position += 1;
    let operand = parse_unary(source, tokens, position)?;
    Ok(Expr::Unary {
        op,
        operand: Box::new(operand),
    })
}

// `**` binds tighter than a unary operator on its left and is
// right-associative: -2**2 == -4, 2**3**2 == 512.
fn parse_power(source: &str, tokens: &[Token], position: &mut usize) -> Result<Expr, EvalError> {
    let base = parse_primary(source, tokens, position)?;
    if tokens
        .get(*position)
        .is_some_and(|token| token.kind == TokenKind::StarStar)
    {
        *position += 1;
        let exponent = parse_unary(source, tokens, position)?;
        return Ok(Expr::Binary {
            op: BinaryOp::Pow,
            lhs: Box::new(base),
            rhs: Box::new(exponent),
        });
    }
    Ok(base)
}

fn parse_primary(source: &str, tokens: &[Token], position: &mut usize) -> Result<Expr, EvalError> {
    let token = tokens.get(*position).ok_or(EvalError::UnexpectedEnd)?;
    *position += 1;
    let text = token.text(source);
    match token.kind {
        TokenKind::IntLiteral => parse_int(text).map(Expr::Int),
        TokenKind::FloatLiteral => text
            .replace('_', "")
            .parse::<f64>()
            .map(Expr::Float)
            .map_err(|_| EvalError::BadLiteral(text.to_string())),
        TokenKind::BoolLiteral => Ok(Expr::Bool(text.eq_ignore_ascii_case("true"))),
        TokenKind::Ident => Ok(Expr::Name(text.to_string())),
        TokenKind::LParen => {
            let expr = parse_binary(source, tokens, position, 0)?;
            let closing = tokens.get(*position).ok_or(EvalError::UnclosedParen)?;
            if closing.kind == TokenKind::RParen {
                *position += 1;
                Ok(expr)
            } else {
                Err(EvalError::UnexpectedToken(closing.text(source).to_string()))
            }
        }
        _ => Err(EvalError::UnexpectedToken(text.to_string())),
    }
}

fn parse_int(text: &str) -> Result<i64, EvalError> {
    let digits = text.replace('_', "");
    let parsed = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => i64::from_str_radix(hex, 16),
        None => digits.parse::<i64>(),
    };
    parsed.map_err(|_| EvalError::BadLiteral(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_with_precedence() {
        let expr = parse("1 + 2 * 3").expect("parse");
        if let Expr::Binary { op, rhs, .. } = expr {
            assert_eq!(op, BinaryOp::Add);
            assert!(matches!(*rhs, Expr::Binary { op: BinaryOp::Mul, .. }));
        } else {
            panic!("unexpected variant");
        }
    }

    #[test]
    fn parses_nested_expression_with_parens() {
        let expr = parse("(1 + 2) * 3").expect("parse");
        assert!(matches!(expr, Expr::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn power_binds_tighter_than_negation() {
        let expr = parse("-2 ^ 2").expect("parse");
        assert!(matches!(expr, Expr::Unary { op: UnaryOp::Neg, .. }));
    }

    #[test]
    fn parses_logical_forms() {
        let expr = parse("!a && b == 1").expect("parse");
        assert!(matches!(expr, Expr::Binary { op: BinaryOp::And, .. }));
        assert!(expr.mentions_names());
        assert!(!parse("true || 1 < 2").expect("parse").mentions_names());
    }

    #[test]
    fn rejects_trailing_tokens() {
        let err = parse("1 2").unwrap_err();
        assert!(matches!(err, EvalError::UnexpectedToken(_)));
    }

    #[test]
    fn rejects_unclosed_parenthesis() {
        assert!(matches!(parse("(1 + 2").unwrap_err(), EvalError::UnclosedParen));
        assert!(matches!(parse("1 +").unwrap_err(), EvalError::UnexpectedEnd));
    }
}

//! Lexer for Vox constant and condition expressions.

use crate::eval::EvalError;

/// Kind of a token produced by the lexer.
///
/// The lexer is intentionally simple: it does not attach any
/// semantic meaning beyond recognizing operators and basic literals.
/// Names are resolved later, by whoever evaluates the expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Identifiers and literals
    Ident,
    IntLiteral,
    FloatLiteral,
    BoolLiteral, // true / false / True / False

    // Punctuation
    LParen, // (
    RParen, // )

    // Arithmetic
    Plus,     // +
    Minus,    // -
    Star,     // *
    Slash,    // /
    Percent,  // %
    StarStar, // ** (also `^`)

    // Bitwise
    Amp,   // &
    Pipe,  // |
    Tilde, // ~
    Shl,   // <<
    Shr,   // >>

    // Logical
    AmpAmp,     // &&
    PipePipe,   // ||
    CaretCaret, // ^^
    Bang,       // !

    // Comparison
    EqEq,      // ==
    NotEq,     // !=
    Less,      // <
    LessEq,    // <=
    Greater,   // >
    GreaterEq, // >=
}

/// A single token. `text_start` / `text_end` are byte offsets into the
/// lexed source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text_start: usize,
    pub text_end: usize,
}

impl Token {
    pub fn text<'src>(&self, source: &'src str) -> &'src str {
        &source[self.text_start..self.text_end]
    }
}

pub fn lex(source: &str) -> Result<Vec<Token>, EvalError> {
    let mut lexer = Lexer {
        source,
        chars: source.as_bytes(),
        index: 0,
    };
    lexer.run()
}

struct Lexer<'src> {
    source: &'src str,
    chars: &'src [u8],
    index: usize,
}

impl<'src> Lexer<'src> {
    fn run(&mut self) -> Result<Vec<Token>, EvalError> {
        let mut tokens = Vec::new();

        while let Some(ch) = self.peek_char() {
            if is_whitespace(ch) {
                self.consume_char();
                continue;
            }

            let start = self.index;
            let kind = match ch {
                b'(' => self.single(TokenKind::LParen),
                b')' => self.single(TokenKind::RParen),
                b'+' => self.single(TokenKind::Plus),
                b'-' => self.single(TokenKind::Minus),
                b'/' => self.single(TokenKind::Slash),
                b'%' => self.single(TokenKind::Percent),
                b'~' => self.single(TokenKind::Tilde),
                b'*' => self.one_or_two(b'*', TokenKind::Star, TokenKind::StarStar),
                b'&' => self.one_or_two(b'&', TokenKind::Amp, TokenKind::AmpAmp),
                b'|' => self.one_or_two(b'|', TokenKind::Pipe, TokenKind::PipePipe),
                // `^` is exponentiation; `^^` is logical xor.
                b'^' => self.one_or_two(b'^', TokenKind::StarStar, TokenKind::CaretCaret),
                b'!' => self.one_or_two(b'=', TokenKind::Bang, TokenKind::NotEq),
                b'=' => {
                    if self.peek_next() == Some(b'=') {
                        self.consume_char();
                        self.consume_char();
                        TokenKind::EqEq
                    } else {
                        return Err(self.unexpected_char(start));
                    }
                }
                b'<' => match self.peek_next() {
                    Some(b'<') => self.double(TokenKind::Shl),
                    Some(b'=') => self.double(TokenKind::LessEq),
                    _ => self.single(TokenKind::Less),
                },
                b'>' => match self.peek_next() {
                    Some(b'>') => self.double(TokenKind::Shr),
                    Some(b'=') => self.double(TokenKind::GreaterEq),
                    _ => self.single(TokenKind::Greater),
                },
                b'0'..=b'9' => self.lex_number(),
                b'.' if self.peek_next().is_some_and(|next| next.is_ascii_digit()) => {
                    self.lex_number()
                }
                _ => {
                    if is_ident_start(ch) {
                        self.lex_ident_or_keyword(start)
                    } else {
                        return Err(self.unexpected_char(start));
                    }
                }
            };

            tokens.push(Token {
                kind,
                text_start: start,
                text_end: self.index,
            });
        }

        Ok(tokens)
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.consume_char();
        kind
    }

    fn double(&mut self, kind: TokenKind) -> TokenKind {
        self.consume_char();
        self.consume_char();
        kind
    }

    fn one_or_two(&mut self, second: u8, one: TokenKind, two: TokenKind) -> TokenKind {
        if self.peek_next() == Some(second) {
            self.double(two)
        } else {
            self.single(one)
        }
    }

    fn unexpected_char(&self, start: usize) -> EvalError {
        let ch = self.source[start..].chars().next().unwrap_or('?');
        EvalError::UnexpectedChar { ch, position: start }
    }

    fn lex_number(&mut self) -> TokenKind {
        // hex integer: 0x[0-9a-fA-F_]+
        if self.peek_char() == Some(b'0') && matches!(self.peek_next(), Some(b'x' | b'X')) {
            self.consume_char();
            self.consume_char();
            while let Some(ch) = self.peek_char() {
                if ch.is_ascii_hexdigit() || ch == b'_' {
                    self.consume_char();
                } else {
                    break;
                }
            }
            return TokenKind::IntLiteral;
        }

        // integer or float: digits [ '.' digits ]?
        self.consume_digits();

        let mut is_float = false;
        if self.peek_char() == Some(b'.') {
            is_float = true;
            self.consume_char(); // '.'
            self.consume_digits();
        }

        if is_float {
            TokenKind::FloatLiteral
        } else {
            TokenKind::IntLiteral
        }
    }

    fn consume_digits(&mut self) {
        while let Some(ch) = self.peek_char() {
            if matches!(ch, b'0'..=b'9' | b'_') {
                self.consume_char();
            } else {
                break;
            }
        }
    }

    fn lex_ident_or_keyword(&mut self, start: usize) -> TokenKind {
        while let Some(ch) = self.peek_char() {
            if is_ident_continue(ch) {
                self.consume_char();
            } else {
                break;
            }
        }

        match &self.source[start..self.index] {
            "true" | "false" | "True" | "False" => TokenKind::BoolLiteral,
            _ => TokenKind::Ident,
        }
    }

    fn peek_char(&self) -> Option<u8> {
        self.chars.get(self.index).copied()
    }

    fn peek_next(&self) -> Option<u8> {
        self.chars.get(self.index + 1).copied()
    }

    fn consume_char(&mut self) {
        if self.index < self.chars.len() {
            self.index += 1;
        }
    }
}

fn is_whitespace(ch: u8) -> bool {
    matches!(ch, b' ' | b'\t' | b'\n' | b'\r')
}

fn is_ident_start(ch: u8) -> bool {
    ch.is_ascii_alphabetic() || ch == b'_'
}

fn is_ident_continue(ch: u8) -> bool {
    is_ident_start(ch) || ch.is_ascii_digit()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex(source)
            .expect("lex")
            .into_iter()
            .map(|tok| tok.kind)
            .collect()
    }

    #[test]
    fn lexes_arithmetic() {
        assert_eq!(
            kinds("2 + x*3.5"),
            vec![
                TokenKind::IntLiteral,
                TokenKind::Plus,
                TokenKind::Ident,
                TokenKind::Star,
                TokenKind::FloatLiteral,
            ]
        );
    }

    #[test]
    fn caret_is_power_and_double_caret_is_xor() {
        assert_eq!(
            kinds("2^3 ^^ 1"),
            vec![
                TokenKind::IntLiteral,
                TokenKind::StarStar,
                TokenKind::IntLiteral,
                TokenKind::CaretCaret,
                TokenKind::IntLiteral,
            ]
        );
    }

    #[test]
    fn lexes_comparisons_and_shifts() {
        assert_eq!(
            kinds("a <= b << 1 != !c"),
            vec![
                TokenKind::Ident,
                TokenKind::LessEq,
                TokenKind::Ident,
                TokenKind::Shl,
                TokenKind::IntLiteral,
                TokenKind::NotEq,
                TokenKind::Bang,
                TokenKind::Ident,
            ]
        );
    }

    #[test]
    fn keeps_token_text() {
        let source = "0x1F + true";
        let tokens = lex(source).expect("lex");
        assert_eq!(tokens[0].text(source), "0x1F");
        assert_eq!(tokens[2].kind, TokenKind::BoolLiteral);
    }

    #[test]
    fn rejects_stray_characters() {
        let err = lex("1 = 2").unwrap_err();
        assert!(matches!(err, EvalError::UnexpectedChar { ch: '=', position: 2 }));
        assert!(lex("a @ b").is_err());
    }
}

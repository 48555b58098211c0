//! Lexer for stringified call-site arguments.
//!
//! One token stream per argument; the input has already been split on
//! top-level commas, so commas here only occur inside parentheses.

use crate::error::{Error, Result};

/// Token categories. Operators that never change an expression's type are
/// lumped into `Comparison`/`Math`/`Assignment`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Number,
    Str,
    Ident,
    /// `struct`, `union`, `enum`.
    TypeSpecifier,
    /// `const`, `volatile`, `restrict`, `_Atomic`.
    TypeQualifier,
    OpenParen,
    CloseParen,
    OpenBracket,
    CloseBracket,
    OpenBrace,
    CloseBrace,
    Comma,
    Dot,
    Arrow,
    Increment,
    Decrement,
    Plus,
    Minus,
    Star,
    Exclamation,
    Tilde,
    Ampersand,
    Question,
    Colon,
    Assignment,
    Comparison,
    Math,
}

/// One lexed token, borrowing its lexeme from the argument string.
#[derive(Clone, Copy, Debug)]
pub struct Token<'s> {
    pub kind: TokenKind,
    pub text: &'s str,
}

/// Multi-character operators first; prefix matching relies on the order.
const OPERATORS: &[(&str, TokenKind)] = &[
    ("<<=", TokenKind::Assignment),
    (">>=", TokenKind::Assignment),
    ("->", TokenKind::Arrow),
    ("++", TokenKind::Increment),
    ("--", TokenKind::Decrement),
    ("<<", TokenKind::Math),
    (">>", TokenKind::Math),
    ("<=", TokenKind::Comparison),
    (">=", TokenKind::Comparison),
    ("==", TokenKind::Comparison),
    ("!=", TokenKind::Comparison),
    ("&&", TokenKind::Comparison),
    ("||", TokenKind::Comparison),
    ("+=", TokenKind::Assignment),
    ("-=", TokenKind::Assignment),
    ("*=", TokenKind::Assignment),
    ("/=", TokenKind::Assignment),
    ("%=", TokenKind::Assignment),
    ("&=", TokenKind::Assignment),
    ("|=", TokenKind::Assignment),
    ("^=", TokenKind::Assignment),
    ("(", TokenKind::OpenParen),
    (")", TokenKind::CloseParen),
    ("[", TokenKind::OpenBracket),
    ("]", TokenKind::CloseBracket),
    ("{", TokenKind::OpenBrace),
    ("}", TokenKind::CloseBrace),
    (",", TokenKind::Comma),
    (".", TokenKind::Dot),
    ("?", TokenKind::Question),
    (":", TokenKind::Colon),
    ("+", TokenKind::Plus),
    ("-", TokenKind::Minus),
    ("*", TokenKind::Star),
    ("!", TokenKind::Exclamation),
    ("~", TokenKind::Tilde),
    ("&", TokenKind::Ampersand),
    ("=", TokenKind::Assignment),
    ("<", TokenKind::Comparison),
    (">", TokenKind::Comparison),
    ("/", TokenKind::Math),
    ("%", TokenKind::Math),
    ("^", TokenKind::Math),
    ("|", TokenKind::Math),
];

const TYPE_SPECIFIERS: &[&str] = &["struct", "union", "enum"];
const TYPE_QUALIFIERS: &[&str] = &["const", "volatile", "restrict", "_Atomic"];

/// Lex one argument string.
///
/// # Errors
///
/// Returns [`Error::UnexpectedCharacter`] on input no C expression contains.
pub fn tokenize(input: &str) -> Result<Vec<Token<'_>>> {
    let bytes = input.as_bytes();
    let mut tokens: Vec<Token<'_>> = Vec::new();
    let mut pos = 0;

    'outer: while pos < bytes.len() {
        let ch = bytes[pos];
        if ch.is_ascii_whitespace() {
            pos += 1;
            continue;
        }

        if ch.is_ascii_digit() {
            let start = pos;
            while pos < bytes.len()
                && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'.' || bytes[pos] == b'_')
            {
                pos += 1;
            }
            let mut start = start;
            // `.5` lexes as dot + digits; merge them into one number when
            // the dot is directly adjacent.
            if let Some(last) = tokens.last() {
                let last_end =
                    last.text.as_ptr() as usize - input.as_ptr() as usize + last.text.len();
                if last.kind == TokenKind::Dot && last_end == start {
                    start -= 1;
                    tokens.pop();
                }
            }
            tokens.push(Token {
                kind: TokenKind::Number,
                text: &input[start..pos],
            });
            continue;
        }

        if ch == b'_' || ch.is_ascii_alphabetic() {
            let start = pos;
            while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_') {
                pos += 1;
            }
            let text = &input[start..pos];
            let kind = if TYPE_SPECIFIERS.contains(&text) {
                TokenKind::TypeSpecifier
            } else if TYPE_QUALIFIERS.contains(&text) {
                TokenKind::TypeQualifier
            } else {
                TokenKind::Ident
            };
            tokens.push(Token { kind, text });
            continue;
        }

        if ch == b'"' || ch == b'\'' {
            let quote = ch;
            let start = pos;
            pos += 1;
            while pos < bytes.len() {
                if bytes[pos] == b'\\' {
                    pos += 2;
                    continue;
                }
                if bytes[pos] == quote {
                    pos += 1;
                    tokens.push(Token {
                        // A char literal is an integer constant.
                        kind: if quote == b'"' {
                            TokenKind::Str
                        } else {
                            TokenKind::Number
                        },
                        text: &input[start..pos],
                    });
                    continue 'outer;
                }
                pos += 1;
            }
            return Err(Error::UnexpectedCharacter(char::from(quote)));
        }

        for &(op, kind) in OPERATORS {
            if input[pos..].starts_with(op) {
                tokens.push(Token {
                    kind,
                    text: &input[pos..pos + op.len()],
                });
                pos += op.len();
                continue 'outer;
            }
        }

        return Err(Error::UnexpectedCharacter(char::from(ch)));
    }

    Ok(tokens)
}

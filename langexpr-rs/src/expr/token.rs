//! Lexical units produced by the [`Lexer`](super::lexer::Lexer).

use std::fmt;

/// The kind of a [`Token`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Literals
    Identifier,
    Number,
    String,

    // Arithmetic
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,

    // Comparison / assignment
    Equal,    // ==
    Assign,   // =
    NotEqual, // !=
    Greater,
    GreaterEqual,
    Less,
    LessEqual,

    // Logical (`and`/`&&`, `or`/`||`, `not`/`!`)
    And,
    Or,
    Not,

    // Punctuation
    Question,
    Colon,
    Comma,
    LParen,
    RParen,
    Semicolon,
    Newline,

    // Keywords
    If,
    Elif,
    Else,
    Let,
    As,

    Eof,
}

impl TokenKind {
    /// Keyword lookup.  Keywords are matched case-insensitively.
    pub fn keyword(text: &str) -> Option<TokenKind> {
        match text.to_ascii_lowercase().as_str() {
            "and" => Some(TokenKind::And),
            "or" => Some(TokenKind::Or),
            "not" => Some(TokenKind::Not),
            "if" => Some(TokenKind::If),
            "elif" => Some(TokenKind::Elif),
            "else" => Some(TokenKind::Else),
            "let" => Some(TokenKind::Let),
            "as" => Some(TokenKind::As),
            _ => None,
        }
    }
}

/// A numeric literal as scanned: the smallest of `i32`/`i64` that fits, or
/// `f64` when the literal has a fractional part.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i32),
    Long(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(n) => f64::from(n),
            Number::Long(n) => n as f64,
            Number::Float(x) => x,
        }
    }

    /// The integral value, if the literal is an integer.
    pub fn as_integer(self) -> Option<i64> {
        match self {
            Number::Int(n) => Some(i64::from(n)),
            Number::Long(n) => Some(n),
            Number::Float(_) => None,
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(n) => write!(f, "{n}"),
            Number::Long(n) => write!(f, "{n}"),
            Number::Float(x) => {
                // Must re-lex as a float: keep a fractional part.
                let s = x.to_string();
                if s.contains('.') {
                    f.write_str(&s)
                } else {
                    write!(f, "{s}.0")
                }
            }
        }
    }
}

/// The decoded value carried by literal tokens.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenLiteral {
    Number(Number),
    Str(String),
}

/// A single lexical unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// The exact source text of the token.
    pub lexeme: String,
    pub literal: Option<TokenLiteral>,
    /// Byte offset of the lexeme in the source.
    pub position: usize,
}

impl Token {
    pub fn new(
        kind: TokenKind,
        lexeme: impl Into<String>,
        literal: Option<TokenLiteral>,
        position: usize,
    ) -> Self {
        Token {
            kind,
            lexeme: lexeme.into(),
            literal,
            position,
        }
    }

    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Eof => f.write_str("end of input"),
            TokenKind::Newline => f.write_str("newline"),
            _ => write!(f, "'{}'", self.lexeme),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_are_case_insensitive() {
        assert_eq!(TokenKind::keyword("and"), Some(TokenKind::And));
        assert_eq!(TokenKind::keyword("ELIF"), Some(TokenKind::Elif));
        assert_eq!(TokenKind::keyword("Let"), Some(TokenKind::Let));
        assert_eq!(TokenKind::keyword("level"), None);
    }

    #[test]
    fn float_display_keeps_fraction() {
        assert_eq!(Number::Float(2.0).to_string(), "2.0");
        assert_eq!(Number::Float(0.25).to_string(), "0.25");
        assert_eq!(Number::Long(5_000_000_000).to_string(), "5000000000");
    }

    #[test]
    fn token_display() {
        let t = Token::new(TokenKind::Plus, "+", None, 3);
        assert_eq!(t.to_string(), "'+'");
        let eof = Token::new(TokenKind::Eof, "", None, 9);
        assert_eq!(eof.to_string(), "end of input");
    }
}

//! Single-pass lexer with one character of lookahead.
//!
//! The lexer owns its source so a single instance can be reused across
//! evaluations via [`Lexer::set_source`].

use super::error::SyntaxError;
use super::token::{Number, Token, TokenKind, TokenLiteral};

#[derive(Debug, Default)]
pub struct Lexer {
    src: String,
    /// Byte offset of the next unread character.
    pos: usize,
    /// Byte offset where the current token started.
    start: usize,
}

impl Lexer {
    pub fn new(src: impl Into<String>) -> Self {
        Lexer {
            src: src.into(),
            pos: 0,
            start: 0,
        }
    }

    /// Replace the source text and reset scanning state.
    pub fn set_source(&mut self, src: impl Into<String>) {
        self.src = src.into();
        self.pos = 0;
        self.start = 0;
    }

    pub fn source(&self) -> &str {
        &self.src
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek2(&self) -> Option<char> {
        let mut it = self.src[self.pos..].chars();
        it.next();
        it.next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn eat(&mut self, ch: char) -> bool {
        if self.peek() == Some(ch) {
            self.pos += ch.len_utf8();
            true
        } else {
            false
        }
    }

    fn lexeme(&self) -> &str {
        &self.src[self.start..self.pos]
    }

    fn make(&self, kind: TokenKind) -> Token {
        Token::new(kind, self.lexeme(), None, self.start)
    }

    fn make_literal(&self, kind: TokenKind, literal: TokenLiteral) -> Token {
        Token::new(kind, self.lexeme(), Some(literal), self.start)
    }

    /// Tokenize the whole source.  The returned vector always ends with an
    /// [`TokenKind::Eof`] token.
    pub fn scan_tokens(&mut self) -> Result<Vec<Token>, SyntaxError> {
        self.pos = 0;
        let mut tokens = Vec::new();
        while let Some(tok) = self.next_token()? {
            tokens.push(tok);
        }
        tokens.push(Token::new(TokenKind::Eof, "", None, self.src.len()));
        Ok(tokens)
    }

    fn next_token(&mut self) -> Result<Option<Token>, SyntaxError> {
        while matches!(self.peek(), Some(' ' | '\t')) {
            self.pos += 1;
        }
        self.start = self.pos;
        let ch = match self.advance() {
            None => return Ok(None),
            Some(c) => c,
        };

        let kind = match ch {
            '\n' | '\r' => TokenKind::Newline,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '?' => TokenKind::Question,
            ':' => TokenKind::Colon,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '^' => TokenKind::Caret,
            '!' => {
                if self.eat('=') {
                    TokenKind::NotEqual
                } else {
                    TokenKind::Not
                }
            }
            '=' => {
                if self.eat('=') {
                    TokenKind::Equal
                } else {
                    TokenKind::Assign
                }
            }
            '<' => {
                if self.eat('=') {
                    TokenKind::LessEqual
                } else {
                    TokenKind::Less
                }
            }
            '>' => {
                if self.eat('=') {
                    TokenKind::GreaterEqual
                } else {
                    TokenKind::Greater
                }
            }
            '&' | '|' => {
                if self.eat(ch) {
                    if ch == '&' {
                        TokenKind::And
                    } else {
                        TokenKind::Or
                    }
                } else {
                    return Err(SyntaxError::UnexpectedChar {
                        ch,
                        position: self.start,
                    });
                }
            }
            '"' | '\'' => return self.read_string(ch).map(Some),
            '0'..='9' => return self.read_number().map(Some),
            c if c.is_ascii_alphabetic() || c == '_' => return Ok(Some(self.read_ident())),
            c => {
                return Err(SyntaxError::UnexpectedChar {
                    ch: c,
                    position: self.start,
                })
            }
        };
        Ok(Some(self.make(kind)))
    }

    fn read_string(&mut self, quote: char) -> Result<Token, SyntaxError> {
        let mut s = String::new();
        loop {
            match self.advance() {
                None => {
                    return Err(SyntaxError::UnterminatedString {
                        position: self.start,
                    })
                }
                Some('\\') => match self.advance() {
                    Some('n') => s.push('\n'),
                    Some('t') => s.push('\t'),
                    Some('r') => s.push('\r'),
                    Some(c) => s.push(c),
                    None => {
                        return Err(SyntaxError::UnterminatedString {
                            position: self.start,
                        })
                    }
                },
                Some(c) if c == quote => break,
                Some(c) => s.push(c),
            }
        }
        Ok(self.make_literal(TokenKind::String, TokenLiteral::Str(s)))
    }

    fn read_number(&mut self) -> Result<Token, SyntaxError> {
        while matches!(self.peek(), Some('0'..='9')) {
            self.pos += 1;
        }
        let is_float = self.peek() == Some('.') && matches!(self.peek2(), Some('0'..='9'));
        if is_float {
            self.pos += 1;
            while matches!(self.peek(), Some('0'..='9')) {
                self.pos += 1;
            }
        }

        let text = self.lexeme();
        let invalid = || SyntaxError::InvalidNumber {
            text: text.to_string(),
            position: self.start,
        };
        let number = if is_float {
            Number::Float(text.parse().map_err(|_| invalid())?)
        } else if let Ok(n) = text.parse::<i32>() {
            Number::Int(n)
        } else {
            Number::Long(text.parse().map_err(|_| invalid())?)
        };
        Ok(self.make_literal(TokenKind::Number, TokenLiteral::Number(number)))
    }

    fn read_ident(&mut self) -> Token {
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        match TokenKind::keyword(self.lexeme()) {
            Some(kind) => self.make(kind),
            None => self.make(TokenKind::Identifier),
        }
    }
}

/// Tokenize `src` in one call.
pub fn tokenize(src: &str) -> Result<Vec<Token>, SyntaxError> {
    Lexer::new(src).scan_tokens()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

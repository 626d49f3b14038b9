//! Recursive-descent parser.
//!
//! Operator precedence (lowest → highest):
//!   sequence  →  let / if-chain  →  ternary  →  or  →  and  →  equality  →
//!   comparison  →  additive  →  multiplicative  →  unary  →  primary
//!
//! Newlines are only significant between sequence items and between the
//! clauses of an `if`/`elif`/`else` chain; anywhere else they are a syntax
//! error.
//!
//! Trees are at most [`MAX_DEPTH`] nodes tall, and the parser recurses no
//! deeper than that.  Evaluation and formatting walk the tree recursively.

use super::ast::{BinaryOp, ConditionalBranch, Expr, Literal, LogicalOp, UnaryOp};
use super::error::SyntaxError;
use super::lexer::Lexer;
use super::token::{Token, TokenKind, TokenLiteral};

/// Maximum nesting of sub-expressions and height of a parsed tree.
pub const MAX_DEPTH: usize = 128;

#[derive(Debug)]
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Open sub-expressions (groupings, operands, arguments) on the stack.
    nesting: usize,
    /// Height of the tree most recently returned by a `parse_*` method.
    height: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        let mut p = Parser {
            tokens: Vec::new(),
            pos: 0,
            nesting: 0,
            height: 0,
        };
        p.set_tokens(tokens);
        p
    }

    /// Replace the token stream and rewind.  A missing end marker is added.
    pub fn set_tokens(&mut self, mut tokens: Vec<Token>) {
        if !tokens.last().is_some_and(|t| t.is(TokenKind::Eof)) {
            let end = tokens.last().map_or(0, |t| t.position + t.lexeme.len());
            tokens.push(Token::new(TokenKind::Eof, "", None, end));
        }
        self.tokens = tokens;
        self.pos = 0;
    }

    /// Parse the whole token stream into a single tree.  Every token up to
    /// the end marker must be consumed.
    pub fn parse(&mut self) -> Result<Expr, SyntaxError> {
        self.pos = 0;
        self.nesting = 0;
        self.height = 0;
        let expr = self.parse_sequence()?;
        if !self.check(TokenKind::Eof) {
            return Err(self.error_here("expected end of input"));
        }
        Ok(expr)
    }

    // ── Cursor ────────────────────────────────────────────────────────────────

    fn peek(&self) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[self.pos.min(last)]
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.pos + offset).min(last)]
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().is(kind)
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if !tok.is(TokenKind::Eof) {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, message: &str) -> Result<Token, SyntaxError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error_here(message))
        }
    }

    fn skip_newlines(&mut self) {
        while self.eat(TokenKind::Newline) {}
    }

    /// Run `f` one nesting level deeper.
    fn nested<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, SyntaxError>,
    ) -> Result<T, SyntaxError> {
        if self.nesting >= MAX_DEPTH {
            return Err(self.error_here("expression nested too deeply"));
        }
        self.nesting += 1;
        let result = f(self);
        self.nesting -= 1;
        result
    }

    /// Record a new node sitting on top of children at most `below` tall.
    fn grow(&mut self, below: usize) -> Result<(), SyntaxError> {
        if below >= MAX_DEPTH {
            return Err(self.error_here("expression nested too deeply"));
        }
        self.height = below + 1;
        Ok(())
    }

    fn error_here(&self, message: &str) -> SyntaxError {
        let tok = self.peek();
        SyntaxError::Unexpected {
            message: message.to_string(),
            found: tok.to_string(),
            position: tok.position,
        }
    }

    // ── Statements ────────────────────────────────────────────────────────────

    /// `NL* item (NL* ";" NL* item?)* NL*`
    fn parse_sequence(&mut self) -> Result<Expr, SyntaxError> {
        self.skip_newlines();
        let mut items = vec![self.parse_item()?];
        let mut height = self.height;
        loop {
            self.skip_newlines();
            if !self.eat(TokenKind::Semicolon) {
                break;
            }
            self.skip_newlines();
            if matches!(
                self.peek().kind,
                TokenKind::Semicolon | TokenKind::RParen | TokenKind::Eof
            ) {
                continue;
            }
            items.push(self.parse_item()?);
            height = height.max(self.height);
        }
        if items.len() == 1 {
            Ok(items.remove(0))
        } else {
            self.grow(height)?;
            Ok(Expr::Sequence(items))
        }
    }

    fn parse_item(&mut self) -> Result<Expr, SyntaxError> {
        match self.peek().kind {
            TokenKind::Let => self.parse_assignment(),
            TokenKind::If | TokenKind::Elif => self.parse_chain(),
            _ => self.parse_expression(),
        }
    }

    /// `let NAME = expression (as -?NUMBER)?`
    fn parse_assignment(&mut self) -> Result<Expr, SyntaxError> {
        self.expect(TokenKind::Let, "expected 'let'")?;
        let name = self
            .expect(TokenKind::Identifier, "expected variable name after 'let'")?
            .lexeme;
        self.expect(TokenKind::Assign, "expected '=' after variable name")?;
        let value = self.parse_expression()?;
        let height = self.height;

        let mut uses = -1;
        if self.eat(TokenKind::As) {
            let negative = self.eat(TokenKind::Minus);
            let count = match &self.peek().literal {
                Some(TokenLiteral::Number(n)) => n.as_integer(),
                _ => None,
            };
            match count {
                Some(n) => {
                    self.advance();
                    uses = if negative { -n } else { n };
                }
                None => return Err(self.error_here("expected integer use count after 'as'")),
            }
        }
        self.grow(height)?;
        Ok(Expr::Assignment {
            name,
            value: Box::new(value),
            uses,
        })
    }

    /// `(if|elif) cond : out` clauses, optionally closed by `else : out`.
    fn parse_chain(&mut self) -> Result<Expr, SyntaxError> {
        let mut branches = Vec::new();
        let mut height = 0;
        while self.eat(TokenKind::If) || self.eat(TokenKind::Elif) {
            self.skip_newlines();
            let condition = self.parse_expression()?;
            height = height.max(self.height);
            self.skip_newlines();
            self.expect(TokenKind::Colon, "expected ':' after condition")?;
            self.skip_newlines();
            let output = self.parse_expression()?;
            height = height.max(self.height);
            branches.push(ConditionalBranch { condition, output });
            self.skip_newlines();
        }
        if branches.is_empty() {
            return Err(self.error_here("expected 'if'"));
        }

        let else_branch = if self.eat(TokenKind::Else) {
            self.skip_newlines();
            self.expect(TokenKind::Colon, "expected ':' after 'else'")?;
            self.skip_newlines();
            let output = self.parse_expression()?;
            height = height.max(self.height);
            Some(Box::new(output))
        } else {
            None
        };

        if !matches!(
            self.peek().kind,
            TokenKind::Eof | TokenKind::Semicolon | TokenKind::RParen | TokenKind::Newline
        ) {
            return Err(self.error_here("expected 'elif', 'else', ';' or end of input after branch"));
        }
        self.grow(height)?;
        Ok(Expr::ConditionalChain {
            branches,
            else_branch,
        })
    }

    // ── Expressions ───────────────────────────────────────────────────────────

    pub(crate) fn parse_expression(&mut self) -> Result<Expr, SyntaxError> {
        self.nested(Self::parse_ternary)
    }

    fn parse_ternary(&mut self) -> Result<Expr, SyntaxError> {
        let cond = self.parse_or()?;
        if self.eat(TokenKind::Question) {
            let mut height = self.height;
            let then = self.parse_expression()?;
            height = height.max(self.height);
            self.expect(TokenKind::Colon, "expected ':' in ternary")?;
            let else_ = self.parse_expression()?;
            self.grow(height.max(self.height))?;
            Ok(Expr::Ternary(Box::new(cond), Box::new(then), Box::new(else_)))
        } else {
            Ok(cond)
        }
    }

    fn parse_or(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.parse_and()?;
        let mut height = self.height;
        while self.eat(TokenKind::Or) {
            let rhs = self.parse_and()?;
            self.grow(height.max(self.height))?;
            height = self.height;
            lhs = Expr::logical(lhs, LogicalOp::Or, rhs);
        }
        self.height = height;
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.parse_equality()?;
        let mut height = self.height;
        while self.eat(TokenKind::And) {
            let rhs = self.parse_equality()?;
            self.grow(height.max(self.height))?;
            height = self.height;
            lhs = Expr::logical(lhs, LogicalOp::And, rhs);
        }
        self.height = height;
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.parse_comparison()?;
        let mut height = self.height;
        loop {
            let op = match self.peek().kind {
                TokenKind::Equal => BinaryOp::Eq,
                TokenKind::NotEqual => BinaryOp::Ne,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_comparison()?;
            self.grow(height.max(self.height))?;
            height = self.height;
            lhs = Expr::binary(lhs, op, rhs);
        }
        self.height = height;
        Ok(lhs)
    }

    fn parse_comparison(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.parse_term()?;
        let mut height = self.height;
        loop {
            let op = match self.peek().kind {
                TokenKind::Greater => BinaryOp::Gt,
                TokenKind::GreaterEqual => BinaryOp::Ge,
                TokenKind::Less => BinaryOp::Lt,
                TokenKind::LessEqual => BinaryOp::Le,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_term()?;
            self.grow(height.max(self.height))?;
            height = self.height;
            lhs = Expr::binary(lhs, op, rhs);
        }
        self.height = height;
        Ok(lhs)
    }

    fn parse_term(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.parse_factor()?;
        let mut height = self.height;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_factor()?;
            self.grow(height.max(self.height))?;
            height = self.height;
            lhs = Expr::binary(lhs, op, rhs);
        }
        self.height = height;
        Ok(lhs)
    }

    fn parse_factor(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.parse_unary()?;
        let mut height = self.height;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Rem,
                TokenKind::Caret => BinaryOp::Pow,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            self.grow(height.max(self.height))?;
            height = self.height;
            lhs = Expr::binary(lhs, op, rhs);
        }
        self.height = height;
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, SyntaxError> {
        let op = match self.peek().kind {
            TokenKind::Not => UnaryOp::Not,
            TokenKind::Minus => UnaryOp::Neg,
            _ => return self.parse_primary(),
        };
        self.advance();
        let operand = self.nested(Self::parse_unary)?;
        self.grow(self.height)?;
        Ok(Expr::unary(op, operand))
    }

    fn parse_primary(&mut self) -> Result<Expr, SyntaxError> {
        let tok = self.peek().clone();
        match (tok.kind, tok.literal) {
            (TokenKind::Number, Some(TokenLiteral::Number(n))) => {
                self.advance();
                self.height = 1;
                Ok(Expr::number(n))
            }
            (TokenKind::String, Some(TokenLiteral::Str(s))) => {
                self.advance();
                self.height = 1;
                Ok(Expr::string(s))
            }
            (TokenKind::Identifier, _) => {
                self.advance();
                self.parse_identifier(tok.lexeme)
            }
            (TokenKind::LParen, _) => {
                self.advance();
                let inner = self.parse_sequence()?;
                self.grow(self.height)?;
                self.expect(TokenKind::RParen, "expected ')' after expression")?;
                Ok(Expr::Grouping(Box::new(inner)))
            }
            _ => Err(self.error_here("expected expression")),
        }
    }

    /// Variable, boolean literal, or call (optionally generic).
    fn parse_identifier(&mut self, name: String) -> Result<Expr, SyntaxError> {
        let generic = if self.check(TokenKind::Less) {
            self.scan_generic()
        } else {
            None
        };
        let type_arg = generic.map(|(text, span)| {
            self.pos += span;
            text
        });

        if self.eat(TokenKind::LParen) {
            let mut args = Vec::new();
            let mut height = 0;
            if !self.check(TokenKind::RParen) {
                args.push(self.parse_expression()?);
                height = self.height;
                while self.eat(TokenKind::Comma) {
                    args.push(self.parse_expression()?);
                    height = height.max(self.height);
                }
            }
            self.expect(TokenKind::RParen, "expected ')' after function arguments")?;
            self.grow(height)?;
            return Ok(Expr::call(name, type_arg, args));
        }

        self.height = 1;
        if name.eq_ignore_ascii_case("true") || name.eq_ignore_ascii_case("false") {
            Ok(Expr::Literal(Literal::Bare(name)))
        } else {
            Ok(Expr::Variable(name))
        }
    }

    /// Decide whether the `<` at the cursor opens a type argument.
    ///
    /// Scans forward for the matching `>` (counting nested `<`), and accepts
    /// only if the token right after it is `(`.  Returns the concatenated
    /// type text and the number of tokens it spans, brackets included.
    /// Does not move the cursor.
    fn scan_generic(&self) -> Option<(String, usize)> {
        let mut depth = 0usize;
        let mut offset = 0;
        loop {
            let tok = self.peek_at(offset);
            match tok.kind {
                TokenKind::Less => depth += 1,
                TokenKind::Greater => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                TokenKind::Eof => return None,
                _ => {}
            }
            offset += 1;
        }
        if !self.peek_at(offset + 1).is(TokenKind::LParen) {
            return None;
        }
        let text: String = (1..offset)
            .map(|i| self.peek_at(i).lexeme.as_str())
            .collect();
        Some((text, offset + 1))
    }
}

/// Tokenize and parse `src` in one call.
pub fn parse(src: &str) -> Result<Expr, SyntaxError> {
    let tokens = Lexer::new(src).scan_tokens()?;
    Parser::new(tokens).parse()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

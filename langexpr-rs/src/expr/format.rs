//! Re-serialize an expression tree as source text.
//!
//! Compact output uses the fewest spaces the lexer needs; pretty output
//! spaces operators and puts chain clauses and sequence items on their own
//! lines.  Either form parses back to a tree that evaluates the same.
//! Parentheses are emitted only where precedence requires them.

use super::ast::{
    BinaryOp, ConditionalBranch, Expr, Literal, UnaryOp, PREC_OR, PREC_PRIMARY, PREC_TERNARY,
    PREC_UNARY,
};

/// Format `expr`.  `pretty` selects the spaced multi-line layout.
pub fn format_expr(expr: &Expr, pretty: bool) -> String {
    let mut f = Printer {
        pretty,
        out: String::new(),
    };
    f.top(expr);
    f.out
}

struct Printer {
    pretty: bool,
    out: String,
}

impl Printer {
    fn push(&mut self, s: &str) {
        self.out.push_str(s);
    }

    /// Operator with optional surrounding spaces.
    fn op(&mut self, sym: &str) {
        if self.pretty {
            self.out.push(' ');
            self.out.push_str(sym);
            self.out.push(' ');
        } else {
            self.out.push_str(sym);
        }
    }

    fn separator(&mut self, compact: &str, pretty: &str) {
        self.push(if self.pretty { pretty } else { compact });
    }

    /// A position that accepts a whole sequence item (`let`, chains).
    fn top(&mut self, expr: &Expr) {
        match expr {
            Expr::Sequence(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        self.separator(";", ";\n");
                    }
                    if matches!(item, Expr::Sequence(_)) {
                        self.paren(item);
                    } else {
                        self.node(item);
                    }
                }
            }
            other => self.node(other),
        }
    }

    /// Print `expr`, parenthesized if it binds looser than `min`.
    fn child(&mut self, expr: &Expr, min: u8) {
        if expr.precedence() < min {
            self.paren(expr);
        } else {
            self.node(expr);
        }
    }

    fn paren(&mut self, expr: &Expr) {
        self.push("(");
        self.top(expr);
        self.push(")");
    }

    fn node(&mut self, expr: &Expr) {
        match expr {
            Expr::Binary(lhs, op, rhs) => {
                let prec = op.precedence();
                // `ident < x > (y)` would re-parse as a generic call.
                if *op == BinaryOp::Lt && ends_with_identifier(lhs) && lhs.precedence() >= prec {
                    self.paren(lhs);
                } else {
                    self.child(lhs, prec);
                }
                self.op(op.symbol());
                self.child(rhs, prec + 1);
            }

            Expr::Logical(lhs, op, rhs) => {
                let prec = op.precedence();
                self.child(lhs, prec);
                self.push(" ");
                self.push(op.keyword());
                self.push(" ");
                self.child(rhs, prec + 1);
            }

            Expr::Unary(op, operand) => {
                match op {
                    UnaryOp::Neg => self.push("-"),
                    UnaryOp::Not if self.pretty => self.push("not "),
                    UnaryOp::Not => self.push("!"),
                }
                self.child(operand, PREC_UNARY);
            }

            Expr::Literal(lit) => match lit {
                Literal::Number(n) => self.push(&n.to_string()),
                Literal::Str(s) => self.push(&quote(s)),
                Literal::Bare(text) => self.push(text),
            },

            Expr::Variable(name) => self.push(name),

            Expr::Grouping(inner) => self.paren(inner),

            Expr::Call {
                name,
                type_arg,
                args,
            } => {
                self.push(name);
                if let Some(ty) = type_arg {
                    self.push("<");
                    self.push(ty);
                    self.push(">");
                }
                self.push("(");
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        self.separator(",", ", ");
                    }
                    self.child(arg, PREC_TERNARY);
                }
                self.push(")");
            }

            Expr::Ternary(cond, then, else_) => {
                self.child(cond, PREC_OR);
                self.op("?");
                self.child(then, PREC_TERNARY);
                self.op(":");
                self.child(else_, PREC_TERNARY);
            }

            Expr::ConditionalChain {
                branches,
                else_branch,
            } => {
                for (i, ConditionalBranch { condition, output }) in branches.iter().enumerate() {
                    if i > 0 {
                        self.separator(" elif ", "\nelif ");
                    } else {
                        self.push("if ");
                    }
                    self.child(condition, PREC_TERNARY);
                    self.separator(":", ": ");
                    self.child(output, PREC_TERNARY);
                }
                if let Some(e) = else_branch {
                    self.separator(" else:", "\nelse: ");
                    self.child(e, PREC_TERNARY);
                }
            }

            Expr::Assignment { name, value, uses } => {
                self.push("let ");
                self.push(name);
                self.op("=");
                self.child(value, PREC_TERNARY);
                if *uses != -1 {
                    self.push(" as ");
                    self.push(&uses.to_string());
                }
            }

            Expr::Sequence(_) => self.paren(expr),
        }
    }
}

/// `true` if the printed form of `expr` ends with a bare word.
fn ends_with_identifier(expr: &Expr) -> bool {
    match expr {
        Expr::Variable(_) | Expr::Literal(Literal::Bare(_)) => true,
        Expr::Binary(_, _, rhs) | Expr::Logical(_, _, rhs) | Expr::Unary(_, rhs) => {
            rhs.precedence() < PREC_PRIMARY || ends_with_identifier(rhs)
        }
        _ => false,
    }
}

/// Single-quoted literal with the escapes the lexer understands.
fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────

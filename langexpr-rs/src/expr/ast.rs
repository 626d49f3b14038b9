//! Expression tree.
//!
//! Nodes are immutable once built.  Children are boxed, so a node can never
//! have a missing operand.

use super::token::Number;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Pow => "^",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
        }
    }

    /// Binding strength; higher binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::Eq | BinaryOp::Ne => PREC_EQUALITY,
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => PREC_COMPARISON,
            BinaryOp::Add | BinaryOp::Sub => PREC_TERM,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem | BinaryOp::Pow => PREC_FACTOR,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

impl LogicalOp {
    pub fn keyword(self) -> &'static str {
        match self {
            LogicalOp::And => "and",
            LogicalOp::Or => "or",
        }
    }

    pub fn precedence(self) -> u8 {
        match self {
            LogicalOp::And => PREC_AND,
            LogicalOp::Or => PREC_OR,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

// Precedence levels, loosest first.
pub const PREC_SEQUENCE: u8 = 0;
pub const PREC_TERNARY: u8 = 1;
pub const PREC_OR: u8 = 2;
pub const PREC_AND: u8 = 3;
pub const PREC_EQUALITY: u8 = 4;
pub const PREC_COMPARISON: u8 = 5;
pub const PREC_TERM: u8 = 6;
pub const PREC_FACTOR: u8 = 7;
pub const PREC_UNARY: u8 = 8;
pub const PREC_PRIMARY: u8 = 9;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(Number),
    /// A quoted string from the source.
    Str(String),
    /// Unquoted text resolved at evaluation time (context key, number,
    /// boolean, or plain string, in that order).
    Bare(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalBranch {
    pub condition: Expr,
    pub output: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Binary(Box<Expr>, BinaryOp, Box<Expr>),
    Logical(Box<Expr>, LogicalOp, Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Literal(Literal),
    Variable(String),
    Grouping(Box<Expr>),
    Call {
        name: String,
        type_arg: Option<String>,
        args: Vec<Expr>,
    },
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    ConditionalChain {
        branches: Vec<ConditionalBranch>,
        else_branch: Option<Box<Expr>>,
    },
    /// `let name = value as uses`; negative `uses` means unlimited.
    Assignment {
        name: String,
        value: Box<Expr>,
        uses: i64,
    },
    Sequence(Vec<Expr>),
}

impl Expr {
    pub fn binary(lhs: Expr, op: BinaryOp, rhs: Expr) -> Expr {
        Expr::Binary(Box::new(lhs), op, Box::new(rhs))
    }

    pub fn logical(lhs: Expr, op: LogicalOp, rhs: Expr) -> Expr {
        Expr::Logical(Box::new(lhs), op, Box::new(rhs))
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Expr {
        Expr::Unary(op, Box::new(operand))
    }

    pub fn number(n: Number) -> Expr {
        Expr::Literal(Literal::Number(n))
    }

    pub fn string(s: impl Into<String>) -> Expr {
        Expr::Literal(Literal::Str(s.into()))
    }

    pub fn variable(name: impl Into<String>) -> Expr {
        Expr::Variable(name.into())
    }

    pub fn call(name: impl Into<String>, type_arg: Option<String>, args: Vec<Expr>) -> Expr {
        Expr::Call {
            name: name.into(),
            type_arg,
            args,
        }
    }

    /// Short node name, used in debug traces.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Expr::Binary(..) => "binary",
            Expr::Logical(..) => "logical",
            Expr::Unary(..) => "unary",
            Expr::Literal(_) => "literal",
            Expr::Variable(_) => "variable",
            Expr::Grouping(_) => "grouping",
            Expr::Call { .. } => "call",
            Expr::Ternary(..) => "ternary",
            Expr::ConditionalChain { .. } => "chain",
            Expr::Assignment { .. } => "assignment",
            Expr::Sequence(_) => "sequence",
        }
    }

    /// Binding strength of this node when printed without parentheses.
    pub fn precedence(&self) -> u8 {
        match self {
            Expr::Binary(_, op, _) => op.precedence(),
            Expr::Logical(_, op, _) => op.precedence(),
            Expr::Unary(..) => PREC_UNARY,
            Expr::Literal(_) | Expr::Variable(_) | Expr::Grouping(_) | Expr::Call { .. } => {
                PREC_PRIMARY
            }
            Expr::Ternary(..) => PREC_TERNARY,
            Expr::ConditionalChain { .. } | Expr::Assignment { .. } | Expr::Sequence(_) => {
                PREC_SEQUENCE
            }
        }
    }
}

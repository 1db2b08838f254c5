//! Abstract Syntax Tree types for executable templates

use crate::value::Value;

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

/// AST node with source location
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub node: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(node: T, span: Span) -> Self {
        Self { node, span }
    }
}

/// Root AST node - a parsed executable template
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Template {
    pub nodes: Vec<Node>,
}

/// One piece of template body
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Literal markup copied to the output
    Text(String),
    /// `<%= expr %>`
    Output(Spanned<Expr>),
    /// `<% expr %>`, evaluated for its side effects
    Eval(Spanned<Expr>),
    /// `<% if cond %> … <% else %> … <% end %>`
    If {
        cond: Spanned<Expr>,
        then: Vec<Node>,
        otherwise: Vec<Node>,
    },
    /// `<% for var in iter %> … <% end %>`
    For {
        var: String,
        iter: Spanned<Expr>,
        body: Vec<Node>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    NotEq,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    /// Variable lookup with optional field access: `post.author.name`
    Path(Vec<String>),
    Not(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Host function call: `partial("item", post: p)`
    Call { name: String, args: Vec<Arg> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Positional(Expr),
    Named(String, Expr),
}

/// The code inside a single `<% … %>` tag
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    If(Spanned<Expr>),
    Else,
    End,
    For(String, Spanned<Expr>),
    Eval(Spanned<Expr>),
}

//! Parser implementation using chumsky
//!
//! A template is split into literal text and `<% … %>` tags first; only the
//! code inside tags goes through the token grammar. Block structure
//! (`if`/`else`/`for`/`end`) is assembled afterwards from the tag sequence.

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;

use crate::error::SyntaxError;
use crate::parser::ast::*;
use crate::parser::lexer::{lex, Token};
use crate::value::Value;

const TAG_OPEN: &str = "<%";
const TAG_CLOSE: &str = "%>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagKind {
    /// `<%= … %>`
    Output,
    /// `<% … %>`
    Code,
    /// `<%# … %>`
    Comment,
}

#[derive(Debug)]
enum Segment<'s> {
    Text(&'s str),
    Tag {
        kind: TagKind,
        code: &'s str,
        /// Byte offset of `code` within the template
        offset: usize,
        /// Span of the whole tag including delimiters
        span: Span,
    },
}

/// Parse an executable template into an AST
pub fn parse(input: &str) -> Result<Template, Vec<SyntaxError>> {
    let segments = split_tags(input).map_err(|e| vec![e])?;

    let mut builder = TreeBuilder::new();
    let mut errors = Vec::new();

    for segment in segments {
        match segment {
            Segment::Text(text) => builder.push(Node::Text(text.to_string())),
            Segment::Tag {
                kind: TagKind::Comment,
                ..
            } => {}
            Segment::Tag {
                kind: TagKind::Output,
                code,
                offset,
                ..
            } => match parse_output(code, offset) {
                Ok(expr) => builder.push(Node::Output(expr)),
                Err(e) => errors.extend(e),
            },
            Segment::Tag {
                kind: TagKind::Code,
                code,
                offset,
                span,
            } => match parse_directive(code, offset) {
                Ok(directive) => {
                    if let Err(e) = builder.apply(directive, span) {
                        errors.push(e);
                    }
                }
                Err(e) => errors.extend(e),
            },
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }
    builder.finish().map_err(|e| vec![e])
}

/// Split the template into text runs and tags
fn split_tags(input: &str) -> Result<Vec<Segment<'_>>, SyntaxError> {
    let mut segments = Vec::new();
    let mut pos = 0;

    while let Some(found) = input[pos..].find(TAG_OPEN) {
        let start = pos + found;

        let after_open = start + TAG_OPEN.len();
        let (kind, code_start) = match input[after_open..].chars().next() {
            Some('=') => (TagKind::Output, after_open + 1),
            Some('#') => (TagKind::Comment, after_open + 1),
            _ => (TagKind::Code, after_open),
        };

        let close = input[code_start..]
            .find(TAG_CLOSE)
            .map(|i| code_start + i)
            .ok_or_else(|| SyntaxError::new(start..input.len(), "Unterminated template tag"))?;
        let end = close + TAG_CLOSE.len();

        // A code or comment tag alone on its line takes the line with it
        let standalone = match kind {
            TagKind::Output => None,
            TagKind::Code | TagKind::Comment => standalone_line(input, pos, start, end),
        };
        let (text_end, next) = standalone.unwrap_or((start, end));

        if text_end > pos {
            segments.push(Segment::Text(&input[pos..text_end]));
        }
        segments.push(Segment::Tag {
            kind,
            code: &input[code_start..close],
            offset: code_start,
            span: start..end,
        });
        pos = next;
    }

    if pos < input.len() {
        segments.push(Segment::Text(&input[pos..]));
    }
    Ok(segments)
}

/// If the tag at `start..end` is the only thing on its line, the start of that
/// line and the position just past its line break. `pos` is where the current
/// text run begins; indentation before it is never swallowed.
fn standalone_line(input: &str, pos: usize, start: usize, end: usize) -> Option<(usize, usize)> {
    let line_start = input[..start].rfind('\n').map(|i| i + 1).unwrap_or(0);
    if line_start < pos || !input[line_start..start].chars().all(|c| c == ' ' || c == '\t') {
        return None;
    }
    let rest = &input[end..];
    let line_break = if rest.is_empty() {
        0
    } else if rest.starts_with("\r\n") {
        2
    } else if rest.starts_with('\n') {
        1
    } else {
        return None;
    };
    Some((line_start, end + line_break))
}

/// Tokenize the code of one tag, reporting errors at template offsets
fn tag_tokens(code: &str, offset: usize) -> Result<Vec<(Token, SimpleSpan)>, Vec<SyntaxError>> {
    let tokens = lex(code).map_err(|span| {
        vec![SyntaxError::new(
            span.start + offset..span.end + offset,
            format!("Unrecognized input '{}'", &code[span]),
        )]
    })?;
    Ok(tokens
        .into_iter()
        .map(|(tok, span)| (tok, span.into()))
        .collect())
}

fn rich_errors(errs: Vec<Rich<'_, Token>>, offset: usize) -> Vec<SyntaxError> {
    errs.into_iter()
        .map(|e| SyntaxError::from_rich(e, offset))
        .collect()
}

/// Parse the code of an output tag: a single expression
fn parse_output(code: &str, offset: usize) -> Result<Spanned<Expr>, Vec<SyntaxError>> {
    let tokens = tag_tokens(code, offset)?;
    let len = code.len();

    // Turn the token list into a stream that chumsky can use
    let token_stream = Stream::from_iter(tokens)
        // Split (Token, SimpleSpan) into token and span parts
        .map((len..len).into(), |(t, s): (_, _)| (t, s));

    expr_parser()
        .parse(token_stream)
        .into_result()
        .map(|expr| shift(expr, offset))
        .map_err(|errs| rich_errors(errs, offset))
}

/// Parse the code of a code tag: a control keyword or an expression
fn parse_directive(code: &str, offset: usize) -> Result<Directive, Vec<SyntaxError>> {
    let tokens = tag_tokens(code, offset)?;
    let len = code.len();

    let token_stream = Stream::from_iter(tokens).map((len..len).into(), |(t, s): (_, _)| (t, s));

    directive_parser()
        .parse(token_stream)
        .into_result()
        .map(|directive| match directive {
            Directive::If(cond) => Directive::If(shift(cond, offset)),
            Directive::For(var, iter) => Directive::For(var, shift(iter, offset)),
            Directive::Eval(expr) => Directive::Eval(shift(expr, offset)),
            other => other,
        })
        .map_err(|errs| rich_errors(errs, offset))
}

/// Move a tag-relative span to its position in the whole template
fn shift(expr: Spanned<Expr>, offset: usize) -> Spanned<Expr> {
    let span = expr.span.start + offset..expr.span.end + offset;
    Spanned::new(expr.node, span)
}

/// Helper to extract span range from chumsky's MapExtra
fn span_range(e: &impl chumsky::span::Span<Offset = usize>) -> std::ops::Range<usize> {
    e.start()..e.end()
}

fn expr_parser<'a, I>() -> impl Parser<'a, I, Spanned<Expr>, extra::Err<Rich<'a, Token>>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    expr()
        .map_with(|expr, e| Spanned::new(expr, span_range(&e.span())))
        .then_ignore(end())
}

fn directive_parser<'a, I>() -> impl Parser<'a, I, Directive, extra::Err<Rich<'a, Token>>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    let spanned_expr = expr().map_with(|expr, e| Spanned::new(expr, span_range(&e.span())));

    let identifier = select! {
        Token::Ident(s) => s,
    };

    let if_directive = just(Token::If)
        .ignore_then(spanned_expr.clone())
        .map(Directive::If);

    let for_directive = just(Token::For)
        .ignore_then(identifier)
        .then_ignore(just(Token::In))
        .then(spanned_expr.clone())
        .map(|(var, iter)| Directive::For(var, iter));

    // Note: Order matters! Keywords first, bare expressions last.
    choice((
        if_directive,
        for_directive,
        just(Token::Else).to(Directive::Else),
        just(Token::End).to(Directive::End),
        spanned_expr.map(Directive::Eval),
    ))
    .then_ignore(end())
}

fn expr<'a, I>() -> impl Parser<'a, I, Expr, extra::Err<Rich<'a, Token>>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    recursive(|expr| {
        let identifier = select! {
            Token::Ident(s) => s,
        };

        let literal = select! {
            Token::String(s) => Value::String(s),
            Token::Number(n) => Value::Number(n),
            Token::True => Value::Bool(true),
            Token::False => Value::Bool(false),
            Token::Null => Value::Null,
        }
        .map(Expr::Literal);

        // Named arguments must be tried before positional ones since both
        // start with an identifier
        let arg = choice((
            identifier
                .then_ignore(just(Token::Colon))
                .then(expr.clone())
                .map(|(name, value)| Arg::Named(name, value)),
            expr.clone().map(Arg::Positional),
        ));

        let call = identifier
            .then(
                arg.separated_by(just(Token::Comma))
                    .allow_trailing()
                    .collect::<Vec<_>>()
                    .delimited_by(just(Token::ParenOpen), just(Token::ParenClose)),
            )
            .map(|(name, args)| Expr::Call { name, args });

        let path = identifier
            .separated_by(just(Token::Dot))
            .at_least(1)
            .collect::<Vec<_>>()
            .map(Expr::Path);

        let atom = choice((
            literal,
            call,
            path,
            expr.clone()
                .delimited_by(just(Token::ParenOpen), just(Token::ParenClose)),
        ));

        let unary = just(Token::Not)
            .repeated()
            .collect::<Vec<_>>()
            .then(atom)
            .map(|(nots, operand)| {
                nots.iter()
                    .fold(operand, |acc, _| Expr::Not(Box::new(acc)))
            });

        let comparison = unary
            .clone()
            .then(
                choice((
                    just(Token::EqEq).to(BinaryOp::Eq),
                    just(Token::NotEq).to(BinaryOp::NotEq),
                ))
                .then(unary)
                .or_not(),
            )
            .map(|(lhs, rest)| match rest {
                Some((op, rhs)) => binary(op, lhs, rhs),
                None => lhs,
            });

        let conjunction = comparison
            .clone()
            .then(
                just(Token::And)
                    .ignore_then(comparison)
                    .repeated()
                    .collect::<Vec<_>>(),
            )
            .map(|(first, rest)| {
                rest.into_iter()
                    .fold(first, |lhs, rhs| binary(BinaryOp::And, lhs, rhs))
            });

        conjunction
            .clone()
            .then(
                just(Token::Or)
                    .ignore_then(conjunction)
                    .repeated()
                    .collect::<Vec<_>>(),
            )
            .map(|(first, rest)| {
                rest.into_iter()
                    .fold(first, |lhs, rhs| binary(BinaryOp::Or, lhs, rhs))
            })
            .boxed()
    })
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

/// An open `if`/`for` block waiting for its `end`
#[derive(Debug)]
enum Block {
    Root,
    If {
        cond: Spanned<Expr>,
        then: Vec<Node>,
        in_else: bool,
        opened_at: Span,
    },
    For {
        var: String,
        iter: Spanned<Expr>,
        opened_at: Span,
    },
}

/// Assembles nested nodes from the flat tag sequence
struct TreeBuilder {
    stack: Vec<(Block, Vec<Node>)>,
}

impl TreeBuilder {
    fn new() -> Self {
        Self {
            stack: vec![(Block::Root, Vec::new())],
        }
    }

    fn push(&mut self, node: Node) {
        if let Some((_, nodes)) = self.stack.last_mut() {
            nodes.push(node);
        }
    }

    fn apply(&mut self, directive: Directive, span: Span) -> Result<(), SyntaxError> {
        match directive {
            Directive::Eval(expr) => self.push(Node::Eval(expr)),
            Directive::If(cond) => self.stack.push((
                Block::If {
                    cond,
                    then: Vec::new(),
                    in_else: false,
                    opened_at: span,
                },
                Vec::new(),
            )),
            Directive::For(var, iter) => self.stack.push((
                Block::For {
                    var,
                    iter,
                    opened_at: span,
                },
                Vec::new(),
            )),
            Directive::Else => match self.stack.last_mut() {
                Some((
                    Block::If {
                        then,
                        in_else: in_else @ false,
                        ..
                    },
                    nodes,
                )) => {
                    *then = std::mem::take(nodes);
                    *in_else = true;
                }
                Some((Block::If { .. }, _)) => {
                    return Err(SyntaxError::new(span, "Duplicate 'else' in 'if' block"))
                }
                _ => return Err(SyntaxError::new(span, "'else' outside of an 'if' block")),
            },
            Directive::End => {
                if self.stack.len() < 2 {
                    return Err(SyntaxError::new(span, "'end' without an open block"));
                }
                if let Some((block, nodes)) = self.stack.pop() {
                    let node = match block {
                        Block::If {
                            cond,
                            then,
                            in_else,
                            ..
                        } => {
                            if in_else {
                                Node::If {
                                    cond,
                                    then,
                                    otherwise: nodes,
                                }
                            } else {
                                Node::If {
                                    cond,
                                    then: nodes,
                                    otherwise: Vec::new(),
                                }
                            }
                        }
                        Block::For { var, iter, .. } => Node::For {
                            var,
                            iter,
                            body: nodes,
                        },
                        Block::Root => {
                            return Err(SyntaxError::new(span, "'end' without an open block"))
                        }
                    };
                    self.push(node);
                }
            }
        }
        Ok(())
    }

    fn finish(mut self) -> Result<Template, SyntaxError> {
        if self.stack.len() > 1 {
            if let Some((block, _)) = self.stack.pop() {
                let span = match block {
                    Block::If { opened_at, .. } | Block::For { opened_at, .. } => opened_at,
                    Block::Root => 0..0,
                };
                return Err(SyntaxError::new(span, "Block is never closed with 'end'"));
            }
        }
        let nodes = self.stack.pop().map(|(_, nodes)| nodes).unwrap_or_default();
        Ok(Template { nodes })
    }
}

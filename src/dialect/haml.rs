//! Haml compiler

use std::path::Path;

use crate::error::CompileError;

use super::markup::{
    code_node, emit, interpolate, is_name_char, line_result, parse_brace_attrs,
    parse_paren_attrs, parse_shorthands, Cursor, Element, Inline, Item, Node,
};
use super::outline::{outline, Ctx, Line};
use super::{Compiler, Dialect};

/// Compiles `.haml` sources into executable templates
#[derive(Debug, Default)]
pub struct HamlCompiler;

impl HamlCompiler {
    pub fn new() -> Self {
        Self
    }
}

impl Compiler for HamlCompiler {
    fn dialect(&self) -> Dialect {
        Dialect::Haml
    }

    fn compile(&self, source: &str, path: &Path) -> Result<String, CompileError> {
        let ctx = Ctx {
            dialect: Dialect::Haml,
            path,
        };
        let lines = outline(source, &ctx)?;
        let items = parse_lines(&lines, &ctx)?;
        emit(&items, &ctx)
    }
}

fn parse_lines(lines: &[Line<'_>], ctx: &Ctx<'_>) -> Result<Vec<Item>, CompileError> {
    let mut items = Vec::new();
    for line in lines {
        if let Some(item) = parse_line(line, ctx)? {
            items.push(item);
        }
    }
    Ok(items)
}

/// Parse one line and its nested lines. Silent comments yield nothing.
fn parse_line(line: &Line<'_>, ctx: &Ctx<'_>) -> Result<Option<Item>, CompileError> {
    let text = line.text;

    if text.starts_with("-#") {
        return Ok(None);
    }

    let mut children_are_markup = true;
    let node = if let Some(rest) = text.strip_prefix("!!!") {
        let kind = rest.trim();
        if kind.is_empty() || kind == "5" {
            Node::Doctype("html".to_string())
        } else {
            Node::Doctype(kind.to_string())
        }
    } else if let Some(filter) = text.strip_prefix(':') {
        children_are_markup = false;
        filter_node(filter, line, ctx)?
    } else if let Some(rest) = text.strip_prefix('\\') {
        Node::Text(line_result(interpolate(rest), line, ctx)?)
    } else if let Some(rest) = text.strip_prefix('/') {
        Node::Comment(rest.trim().to_string())
    } else if let Some(rest) = text.strip_prefix('=') {
        output_node(rest, line, ctx)?
    } else if let Some(rest) = text.strip_prefix('-') {
        if rest.trim().is_empty() {
            return Err(ctx.line_error(line, "There's no Ruby code for - to evaluate"));
        }
        code_node(rest)
    } else if starts_element(text) {
        Node::Element(parse_element(line, ctx)?)
    } else {
        Node::Text(line_result(interpolate(text), line, ctx)?)
    };

    let children = if children_are_markup {
        parse_lines(&line.children, ctx)?
    } else {
        Vec::new()
    };

    Ok(Some(Item {
        node,
        children,
        line: line.number,
        span: line.span.clone(),
    }))
}

fn starts_element(text: &str) -> bool {
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some('%'), Some(c)) => is_name_char(c),
        (Some('.'), Some(c)) | (Some('#'), Some(c)) => is_name_char(c),
        _ => false,
    }
}

fn output_node(expr: &str, line: &Line<'_>, ctx: &Ctx<'_>) -> Result<Node, CompileError> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Err(ctx.line_error(line, "There's no Ruby code for = to output"));
    }
    Ok(Node::Output(expr.to_string()))
}

/// `:plain`, `:javascript` and `:css` copy their nested lines verbatim
fn filter_node(name: &str, line: &Line<'_>, ctx: &Ctx<'_>) -> Result<Node, CompileError> {
    let body = line.raw_children();
    let indented = || body.iter().map(|l| format!("  {}", l));
    match name.trim() {
        "plain" => Ok(Node::Raw(body.clone())),
        "javascript" => Ok(Node::Raw(
            std::iter::once("<script>".to_string())
                .chain(indented())
                .chain(std::iter::once("</script>".to_string()))
                .collect(),
        )),
        "css" => Ok(Node::Raw(
            std::iter::once("<style>".to_string())
                .chain(indented())
                .chain(std::iter::once("</style>".to_string()))
                .collect(),
        )),
        other => Err(ctx.line_error(line, format!("Filter \"{}\" is not defined", other))),
    }
}

fn parse_element(line: &Line<'_>, ctx: &Ctx<'_>) -> Result<Element, CompileError> {
    let mut cur = Cursor::new(line.text);

    let tag = if cur.eat('%') {
        cur.take_while(is_name_char).to_string()
    } else {
        "div".to_string()
    };
    let mut element = Element::new(tag);
    line_result(parse_shorthands(&mut cur, &mut element), line, ctx)?;

    loop {
        if cur.eat('(') {
            let attrs = line_result(parse_paren_attrs(&mut cur), line, ctx)?;
            element.attrs.extend(attrs);
        } else if cur.eat('{') {
            let attrs = line_result(parse_brace_attrs(&mut cur), line, ctx)?;
            element.attrs.extend(attrs);
        } else {
            break;
        }
    }

    if cur.eat('/') {
        element.self_closing = true;
    }

    let rest = cur.rest();
    element.inline = if let Some(expr) = rest.strip_prefix('=') {
        if expr.trim().is_empty() {
            return Err(ctx.line_error(line, "There's no Ruby code for = to output"));
        }
        Inline::Output(expr.trim().to_string())
    } else if rest.trim().is_empty() {
        Inline::None
    } else if rest.starts_with(' ') {
        Inline::Text(line_result(interpolate(rest.trim()), line, ctx)?)
    } else {
        let at = cur.pos();
        return Err(ctx.error(
            line,
            line.sub_span(at, line.text.len()),
            format!("Illegal element: unexpected '{}'", rest),
        ));
    };

    Ok(element)
}

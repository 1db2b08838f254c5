//! Markup tree shared by the Haml and Jade compilers, and its emitter
//!
//! Dialects parse their lines into [`Item`]s; [`emit`] turns the tree into
//! executable template text. Nothing is escaped: interpolated values are
//! written as-is.

use crate::error::{CompileError, Span};

use super::outline::{Ctx, Line};

/// Elements that never have content or a closing tag
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// A run of text where `#{expr}` interpolations have been split out
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Piece {
    Text(String),
    Expr(String),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum AttrValue {
    /// Quoted value, possibly interpolated
    Literal(Vec<Piece>),
    /// Unquoted expression
    Expr(String),
    /// Boolean attribute without a value
    Flag,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Attr {
    pub name: String,
    pub value: AttrValue,
}

/// What follows an element's head on the same line
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Inline {
    None,
    Text(Vec<Piece>),
    Output(String),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Element {
    pub tag: String,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub attrs: Vec<Attr>,
    pub inline: Inline,
    /// Explicit `/` after the head
    pub self_closing: bool,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            id: None,
            classes: Vec::new(),
            attrs: Vec::new(),
            inline: Inline::None,
            self_closing: false,
        }
    }

    fn is_void(&self) -> bool {
        self.self_closing || VOID_ELEMENTS.contains(&self.tag.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Control {
    If(String),
    Else,
    /// `for <binding> in <expr>`, stored as the text after `for`
    For(String),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Element(Element),
    Text(Vec<Piece>),
    /// Buffered code: `= expr`
    Output(String),
    /// Unbuffered code: `- expr`
    Code(String),
    /// Control flow wrapping the item's children
    Control(Control),
    /// HTML comment; children become the comment body
    Comment(String),
    Doctype(String),
    /// Lines copied verbatim (filters and text blocks)
    Raw(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Item {
    pub node: Node,
    pub children: Vec<Item>,
    pub line: usize,
    pub span: Span,
}

/// Byte-position scanner over one line of text
pub(crate) struct Cursor<'s> {
    text: &'s str,
    pos: usize,
}

impl<'s> Cursor<'s> {
    pub fn new(text: &'s str) -> Self {
        Self { text, pos: 0 }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    pub fn peek_second(&self) -> Option<char> {
        self.rest().chars().nth(1)
    }

    pub fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    pub fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    pub fn eat_str(&mut self, expected: &str) -> bool {
        if self.rest().starts_with(expected) {
            self.pos += expected.len();
            true
        } else {
            false
        }
    }

    pub fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'s str {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if !pred(c) {
                break;
            }
            self.pos += c.len_utf8();
        }
        &self.text[start..self.pos]
    }

    pub fn skip_spaces(&mut self) {
        self.take_while(|c| c == ' ' || c == '\t');
    }

    pub fn rest(&self) -> &'s str {
        &self.text[self.pos..]
    }
}

/// Characters allowed in tag names, classes and ids
pub(crate) fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

fn is_attr_name_char(c: char) -> bool {
    is_name_char(c) || c == ':' || c == '@' || c == '.'
}

/// Parse `.class` and `#id` shorthands following a tag name
pub(crate) fn parse_shorthands(cur: &mut Cursor<'_>, element: &mut Element) -> Result<(), String> {
    loop {
        match (cur.peek(), cur.peek_second()) {
            (Some('.'), Some(c)) if is_name_char(c) => {
                cur.bump();
                element.classes.push(cur.take_while(is_name_char).to_string());
            }
            (Some('#'), Some(c)) if is_name_char(c) => {
                cur.bump();
                let id = cur.take_while(is_name_char).to_string();
                if element.id.is_some() {
                    return Err(format!("Element has more than one id: '{}'", id));
                }
                element.id = Some(id);
            }
            _ => return Ok(()),
        }
    }
}

/// Split `#{expr}` interpolations out of text. `\#{` is a literal `#{`.
pub(crate) fn interpolate(text: &str) -> Result<Vec<Piece>, String> {
    let mut pieces = Vec::new();
    let mut literal = String::new();
    let mut rest = text;

    while let Some(found) = rest.find("#{") {
        if rest[..found].ends_with('\\') {
            literal.push_str(&rest[..found - 1]);
            literal.push_str("#{");
            rest = &rest[found + 2..];
            continue;
        }
        literal.push_str(&rest[..found]);
        let after = &rest[found + 2..];
        let close = after
            .find('}')
            .ok_or_else(|| "Unterminated interpolation '#{'".to_string())?;
        let expr = after[..close].trim();
        if expr.is_empty() {
            return Err("Empty interpolation '#{}'".to_string());
        }
        if !literal.is_empty() {
            pieces.push(Piece::Text(std::mem::take(&mut literal)));
        }
        pieces.push(Piece::Expr(expr.to_string()));
        rest = &after[close + 1..];
    }
    literal.push_str(rest);
    if !literal.is_empty() {
        pieces.push(Piece::Text(literal));
    }
    Ok(pieces)
}

/// Read a quoted string starting at the opening quote; returns its contents
fn read_quoted(cur: &mut Cursor<'_>) -> Result<String, String> {
    let quote = cur.bump().ok_or_else(|| "Expected a quoted value".to_string())?;
    let mut value = String::new();
    loop {
        match cur.bump() {
            None => return Err(format!("Unterminated string, expected {}", quote)),
            Some('\\') => {
                if let Some(c) = cur.bump() {
                    value.push(c);
                }
            }
            Some(c) if c == quote => return Ok(value),
            Some(c) => value.push(c),
        }
    }
}

/// Read an unquoted expression up to a top-level terminator
fn read_expr(cur: &mut Cursor<'_>, terminators: &[char]) -> String {
    let start = cur.pos();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    while let Some(c) = cur.peek() {
        match quote {
            Some(q) => {
                if c == '\\' {
                    cur.bump();
                } else if c == q {
                    quote = None;
                }
            }
            None => match c {
                '"' | '\'' => quote = Some(c),
                '(' | '[' | '{' => depth += 1,
                ')' | ']' | '}' if depth > 0 => depth -= 1,
                _ if depth == 0 && terminators.contains(&c) => break,
                _ => {}
            },
        }
        cur.bump();
    }
    cur.text[start..cur.pos()].trim().to_string()
}

fn read_attr_value(cur: &mut Cursor<'_>, terminators: &[char]) -> Result<AttrValue, String> {
    match cur.peek() {
        Some('"') | Some('\'') => Ok(AttrValue::Literal(interpolate(&read_quoted(cur)?)?)),
        _ => {
            let expr = read_expr(cur, terminators);
            if expr.is_empty() {
                Err("Expected an attribute value".to_string())
            } else {
                Ok(AttrValue::Expr(expr))
            }
        }
    }
}

/// Parse an HTML-style attribute list: `(a="x" b=expr, flag)`.
/// The cursor must be just past the opening parenthesis.
pub(crate) fn parse_paren_attrs(cur: &mut Cursor<'_>) -> Result<Vec<Attr>, String> {
    let mut attrs = Vec::new();
    loop {
        cur.take_while(|c| c.is_whitespace() || c == ',');
        match cur.peek() {
            None => return Err("Unterminated attribute list, expected ')'".to_string()),
            Some(')') => {
                cur.bump();
                return Ok(attrs);
            }
            _ => {}
        }
        let name = cur.take_while(is_attr_name_char).to_string();
        if name.is_empty() {
            return Err(format!(
                "Expected an attribute name, found '{}'",
                cur.peek().unwrap_or(' ')
            ));
        }
        cur.skip_spaces();
        let value = if cur.eat('=') {
            cur.skip_spaces();
            read_attr_value(cur, &[' ', '\t', ',', ')'])?
        } else {
            AttrValue::Flag
        };
        attrs.push(Attr { name, value });
    }
}

/// Parse a hash-style attribute list: `{a: "x", "data-b": expr}`.
/// The cursor must be just past the opening brace.
pub(crate) fn parse_brace_attrs(cur: &mut Cursor<'_>) -> Result<Vec<Attr>, String> {
    let mut attrs = Vec::new();
    loop {
        cur.take_while(|c| c.is_whitespace() || c == ',');
        // A bare name swallows its trailing colon: `name: value`
        let (name, separated) = match cur.peek() {
            None => return Err("Unterminated attribute hash, expected '}'".to_string()),
            Some('}') => {
                cur.bump();
                return Ok(attrs);
            }
            Some('"') | Some('\'') => (read_quoted(cur)?, false),
            Some(_) => {
                cur.eat(':');
                let raw = cur.take_while(is_attr_name_char);
                (raw.trim_end_matches(':').to_string(), raw.ends_with(':'))
            }
        };
        if name.is_empty() {
            return Err("Expected an attribute name".to_string());
        }
        cur.skip_spaces();
        if !separated && !cur.eat(':') && !cur.eat_str("=>") {
            return Err(format!("Expected ':' after attribute '{}'", name));
        }
        cur.skip_spaces();
        let value = read_attr_value(cur, &[',', '}'])?;
        attrs.push(Attr { name, value });
    }
}

/// Emit executable template text for a markup tree
pub(crate) fn emit(items: &[Item], ctx: &Ctx<'_>) -> Result<String, CompileError> {
    let mut out = String::new();
    emit_items(items, 0, &mut out, ctx)?;
    Ok(out)
}

fn indent(depth: usize) -> String {
    "  ".repeat(depth)
}

fn item_error(item: &Item, ctx: &Ctx<'_>, message: impl Into<String>) -> CompileError {
    CompileError::new(ctx.dialect, ctx.path, item.line, item.span.clone(), message)
}

fn emit_items(
    items: &[Item],
    depth: usize,
    out: &mut String,
    ctx: &Ctx<'_>,
) -> Result<(), CompileError> {
    let pad = indent(depth);
    // Set while an `if` block has been emitted but not yet closed
    let mut open_if = false;

    for (index, item) in items.iter().enumerate() {
        let next_is_else = matches!(
            items.get(index + 1).map(|i| &i.node),
            Some(Node::Control(Control::Else))
        );

        match &item.node {
            Node::Control(Control::If(cond)) => {
                out.push_str(&format!("{}<% if {} %>\n", pad, cond));
                emit_items(&item.children, depth, out, ctx)?;
                if next_is_else {
                    open_if = true;
                } else {
                    out.push_str(&format!("{}<% end %>\n", pad));
                }
                continue;
            }
            Node::Control(Control::Else) => {
                if !open_if {
                    return Err(item_error(item, ctx, "'else' without a preceding 'if'"));
                }
                out.push_str(&format!("{}<% else %>\n", pad));
                emit_items(&item.children, depth, out, ctx)?;
                out.push_str(&format!("{}<% end %>\n", pad));
            }
            Node::Control(Control::For(binding)) => {
                out.push_str(&format!("{}<% for {} %>\n", pad, binding));
                emit_items(&item.children, depth, out, ctx)?;
                out.push_str(&format!("{}<% end %>\n", pad));
            }
            Node::Element(element) => emit_element(item, element, depth, out, ctx)?,
            Node::Text(pieces) => {
                no_children(item, ctx, "plain text")?;
                out.push_str(&format!("{}{}\n", pad, render_pieces(pieces)));
            }
            Node::Output(expr) => {
                no_children(item, ctx, "output code")?;
                out.push_str(&format!("{}<%= {} %>\n", pad, expr));
            }
            Node::Code(code) => {
                no_children(item, ctx, "code without a block keyword")?;
                out.push_str(&format!("{}<% {} %>\n", pad, code));
            }
            Node::Comment(text) => {
                if item.children.is_empty() {
                    out.push_str(&format!("{}<!-- {} -->\n", pad, text));
                } else {
                    out.push_str(&format!("{}<!--\n", pad));
                    emit_items(&item.children, depth + 1, out, ctx)?;
                    out.push_str(&format!("{}-->\n", pad));
                }
            }
            Node::Doctype(doctype) => {
                out.push_str(&format!("{}<!DOCTYPE {}>\n", pad, doctype));
            }
            Node::Raw(lines) => {
                for line in lines {
                    out.push_str(&format!("{}{}\n", pad, line));
                }
            }
        }
        open_if = false;
    }
    Ok(())
}

fn no_children(item: &Item, ctx: &Ctx<'_>, what: &str) -> Result<(), CompileError> {
    if item.children.is_empty() {
        Ok(())
    } else {
        Err(item_error(
            item,
            ctx,
            format!("Illegal nesting: nesting within {} is illegal", what),
        ))
    }
}

fn emit_element(
    item: &Item,
    element: &Element,
    depth: usize,
    out: &mut String,
    ctx: &Ctx<'_>,
) -> Result<(), CompileError> {
    let pad = indent(depth);
    let open = open_tag(element);

    if element.is_void() {
        if element.inline != Inline::None || !item.children.is_empty() {
            return Err(item_error(
                item,
                ctx,
                format!(
                    "Illegal nesting: '{}' is self-closing and cannot have content",
                    element.tag
                ),
            ));
        }
        if element.self_closing {
            out.push_str(&format!("{}<{} />\n", pad, open));
        } else {
            out.push_str(&format!("{}<{}>\n", pad, open));
        }
        return Ok(());
    }

    let inline = match &element.inline {
        Inline::None => None,
        Inline::Text(pieces) => Some(render_pieces(pieces)),
        Inline::Output(expr) => Some(format!("<%= {} %>", expr)),
    };

    match (inline, item.children.is_empty()) {
        (Some(_), false) => Err(item_error(
            item,
            ctx,
            "Illegal nesting: content can't be both given on the same line and nested",
        )),
        (Some(content), true) => {
            out.push_str(&format!("{}<{}>{}</{}>\n", pad, open, content, element.tag));
            Ok(())
        }
        (None, true) => {
            out.push_str(&format!("{}<{}></{}>\n", pad, open, element.tag));
            Ok(())
        }
        (None, false) => {
            out.push_str(&format!("{}<{}>\n", pad, open));
            emit_items(&item.children, depth + 1, out, ctx)?;
            out.push_str(&format!("{}</{}>\n", pad, element.tag));
            Ok(())
        }
    }
}

/// Tag name plus rendered attributes, without angle brackets
fn open_tag(element: &Element) -> String {
    let mut open = element.tag.clone();

    let explicit_id = element.attrs.iter().find(|a| a.name == "id");
    match (explicit_id, &element.id) {
        (Some(attr), _) => open.push_str(&render_attr(attr)),
        (None, Some(id)) => open.push_str(&format!(" id=\"{}\"", id)),
        (None, None) => {}
    }

    let mut class_parts: Vec<String> = element.classes.clone();
    for attr in element.attrs.iter().filter(|a| a.name == "class") {
        match &attr.value {
            AttrValue::Literal(pieces) => class_parts.push(render_pieces(pieces)),
            AttrValue::Expr(expr) => class_parts.push(format!("<%= {} %>", expr)),
            AttrValue::Flag => {}
        }
    }
    if !class_parts.is_empty() {
        open.push_str(&format!(" class=\"{}\"", class_parts.join(" ")));
    }

    for attr in element
        .attrs
        .iter()
        .filter(|a| a.name != "id" && a.name != "class")
    {
        open.push_str(&render_attr(attr));
    }
    open
}

fn render_attr(attr: &Attr) -> String {
    match &attr.value {
        AttrValue::Literal(pieces) => format!(" {}=\"{}\"", attr.name, render_pieces(pieces)),
        AttrValue::Expr(expr) => format!(" {}=\"<%= {} %>\"", attr.name, expr),
        AttrValue::Flag => format!(" {}", attr.name),
    }
}

fn render_pieces(pieces: &[Piece]) -> String {
    pieces
        .iter()
        .map(|piece| match piece {
            Piece::Text(text) => text.clone(),
            Piece::Expr(expr) => format!("<%= {} %>", expr),
        })
        .collect()
}

/// Node for a line of unbuffered code: block keywords become control flow
pub(crate) fn code_node(code: &str) -> Node {
    let code = code.trim();
    let (keyword, rest) = match code.split_once(char::is_whitespace) {
        Some((keyword, rest)) => (keyword, rest.trim()),
        None => (code, ""),
    };
    match keyword {
        "if" if !rest.is_empty() => Node::Control(Control::If(rest.to_string())),
        "else" if rest.is_empty() => Node::Control(Control::Else),
        "for" | "each" if !rest.is_empty() => Node::Control(Control::For(rest.to_string())),
        _ => Node::Code(code.to_string()),
    }
}

/// Convert a line's interpolation error into a compile error
pub(crate) fn line_result<T>(
    result: Result<T, String>,
    line: &Line<'_>,
    ctx: &Ctx<'_>,
) -> Result<T, CompileError> {
    result.map_err(|message| ctx.line_error(line, message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn ctx() -> Ctx<'static> {
        Ctx {
            dialect: super::super::Dialect::Haml,
            path: Path::new("t.haml"),
        }
    }

    fn item(node: Node, children: Vec<Item>) -> Item {
        Item {
            node,
            children,
            line: 1,
            span: 0..1,
        }
    }

    #[test]
    fn test_interpolate_splits_expressions() {
        assert_eq!(
            interpolate("Hi #{user.name}!").unwrap(),
            vec![
                Piece::Text("Hi ".to_string()),
                Piece::Expr("user.name".to_string()),
                Piece::Text("!".to_string()),
            ]
        );
    }

    #[test]
    fn test_interpolate_escaped_marker_is_literal() {
        assert_eq!(
            interpolate(r"cost \#{x}").unwrap(),
            vec![Piece::Text("cost #{x}".to_string())]
        );
    }

    #[test]
    fn test_interpolate_unterminated() {
        assert!(interpolate("a #{b").is_err());
    }

    #[test]
    fn test_paren_attrs_mixed_values() {
        let mut cur = Cursor::new(r#"href="/p/#{id}" title=post.title, hidden)"#);
        let attrs = parse_paren_attrs(&mut cur).unwrap();
        assert_eq!(attrs.len(), 3);
        assert_eq!(
            attrs[0].value,
            AttrValue::Literal(vec![
                Piece::Text("/p/".to_string()),
                Piece::Expr("id".to_string())
            ])
        );
        assert_eq!(attrs[1].value, AttrValue::Expr("post.title".to_string()));
        assert_eq!(attrs[2].value, AttrValue::Flag);
        assert_eq!(cur.rest(), "");
    }

    #[test]
    fn test_brace_attrs() {
        let mut cur = Cursor::new(r#" lang: "en", "data-id": post.id }"#);
        let attrs = parse_brace_attrs(&mut cur).unwrap();
        assert_eq!(attrs[0].name, "lang");
        assert_eq!(attrs[1].name, "data-id");
        assert_eq!(attrs[1].value, AttrValue::Expr("post.id".to_string()));
    }

    #[test]
    fn test_read_expr_respects_nesting() {
        let mut cur = Cursor::new(r#"f(a, "x)") rest"#);
        assert_eq!(read_expr(&mut cur, &[' ', ',', ')']), r#"f(a, "x)")"#);
    }

    #[test]
    fn test_emit_if_else_chain() {
        let items = vec![
            item(
                Node::Control(Control::If("a".to_string())),
                vec![item(Node::Text(vec![Piece::Text("yes".to_string())]), vec![])],
            ),
            item(
                Node::Control(Control::Else),
                vec![item(Node::Text(vec![Piece::Text("no".to_string())]), vec![])],
            ),
        ];
        let out = emit(&items, &ctx()).unwrap();
        assert_eq!(out, "<% if a %>\nyes\n<% else %>\nno\n<% end %>\n");
    }

    #[test]
    fn test_code_node_keywords() {
        assert_eq!(
            code_node("if user.admin"),
            Node::Control(Control::If("user.admin".to_string()))
        );
        assert_eq!(code_node("else"), Node::Control(Control::Else));
        assert_eq!(
            code_node("each post in posts"),
            Node::Control(Control::For("post in posts".to_string()))
        );
        assert_eq!(code_node("escape(x)"), Node::Code("escape(x)".to_string()));
    }

    #[test]
    fn test_emit_else_without_if() {
        let items = vec![item(Node::Control(Control::Else), vec![])];
        assert!(emit(&items, &ctx()).is_err());
    }

    #[test]
    fn test_emit_element_attribute_order() {
        let mut element = Element::new("a");
        element.classes.push("btn".to_string());
        element.id = Some("go".to_string());
        element.attrs.push(Attr {
            name: "href".to_string(),
            value: AttrValue::Expr("url".to_string()),
        });
        element.attrs.push(Attr {
            name: "class".to_string(),
            value: AttrValue::Literal(vec![Piece::Text("big".to_string())]),
        });
        element.inline = Inline::Text(vec![Piece::Text("Go".to_string())]);
        let out = emit(&[item(Node::Element(element), vec![])], &ctx()).unwrap();
        assert_eq!(
            out,
            "<a id=\"go\" class=\"btn big\" href=\"<%= url %>\">Go</a>\n"
        );
    }

    #[test]
    fn test_emit_void_element_with_content_fails() {
        let mut element = Element::new("br");
        element.inline = Inline::Text(vec![Piece::Text("x".to_string())]);
        assert!(emit(&[item(Node::Element(element), vec![])], &ctx()).is_err());
    }
}

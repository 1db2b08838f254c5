//! Jade compiler

use std::path::Path;

use crate::error::CompileError;

use super::markup::{
    code_node, emit, interpolate, is_name_char, line_result, parse_paren_attrs, parse_shorthands,
    Control, Cursor, Element, Inline, Item, Node,
};
use super::outline::{outline, Ctx, Line};
use super::{Compiler, Dialect};

/// Tags whose text blocks are copied without interpolation
const RAW_TEXT_TAGS: &[&str] = &["script", "style"];

/// Compiles `.jade` sources into executable templates
#[derive(Debug, Default)]
pub struct JadeCompiler;

impl JadeCompiler {
    pub fn new() -> Self {
        Self
    }
}

impl Compiler for JadeCompiler {
    fn dialect(&self) -> Dialect {
        Dialect::Jade
    }

    fn compile(&self, source: &str, path: &Path) -> Result<String, CompileError> {
        let ctx = Ctx {
            dialect: Dialect::Jade,
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

fn item(node: Node, children: Vec<Item>, line: &Line<'_>) -> Item {
    Item {
        node,
        children,
        line: line.number,
        span: line.span.clone(),
    }
}

fn parse_line(line: &Line<'_>, ctx: &Ctx<'_>) -> Result<Option<Item>, CompileError> {
    let text = line.text;

    if text.starts_with("//-") {
        return Ok(None);
    }
    if let Some(rest) = text.strip_prefix("//") {
        let body = line.raw_children();
        let children = if body.is_empty() {
            Vec::new()
        } else {
            vec![item(Node::Raw(body), Vec::new(), line)]
        };
        return Ok(Some(item(Node::Comment(rest.trim().to_string()), children, line)));
    }

    let node = if let Some(rest) = text.strip_prefix('|') {
        let rest = rest.strip_prefix(' ').unwrap_or(rest);
        Node::Text(line_result(interpolate(rest), line, ctx)?)
    } else if text.starts_with('<') {
        Node::Text(line_result(interpolate(text), line, ctx)?)
    } else if let Some(rest) = text.strip_prefix('=') {
        let expr = rest.trim();
        if expr.is_empty() {
            return Err(ctx.line_error(line, "Expected an expression after '='"));
        }
        Node::Output(expr.to_string())
    } else if let Some(rest) = text.strip_prefix('-') {
        if rest.trim().is_empty() {
            return Err(ctx.line_error(line, "Expected code after '-'"));
        }
        code_node(rest)
    } else if let Some(node) = keyword_node(text, line, ctx)? {
        node
    } else if starts_element(text) {
        return parse_element(line, ctx).map(Some);
    } else {
        return Err(ctx.line_error(
            line,
            format!("Unexpected text '{}'; use '|' for plain text", text),
        ));
    };

    let children = parse_lines(&line.children, ctx)?;
    Ok(Some(item(node, children, line)))
}

/// `doctype`, `if`, `else`, `each` and `for` lines
fn keyword_node(text: &str, line: &Line<'_>, ctx: &Ctx<'_>) -> Result<Option<Node>, CompileError> {
    let (keyword, rest) = match text.split_once(char::is_whitespace) {
        Some((keyword, rest)) => (keyword, rest.trim()),
        None => (text, ""),
    };
    let node = match keyword {
        "doctype" => Node::Doctype(if rest.is_empty() { "html" } else { rest }.to_string()),
        "else" if rest.is_empty() => Node::Control(Control::Else),
        "if" | "each" | "for" => {
            if rest.is_empty() {
                return Err(ctx.line_error(line, format!("'{}' requires an expression", keyword)));
            }
            code_node(text)
        }
        _ => return Ok(None),
    };
    Ok(Some(node))
}

fn starts_element(text: &str) -> bool {
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some(c), _) if c.is_ascii_alphabetic() => true,
        (Some('.'), Some(c)) | (Some('#'), Some(c)) => is_name_char(c),
        _ => false,
    }
}

fn parse_element(line: &Line<'_>, ctx: &Ctx<'_>) -> Result<Item, CompileError> {
    let mut cur = Cursor::new(line.text);

    let tag = cur.take_while(is_name_char);
    let mut element = Element::new(if tag.is_empty() { "div" } else { tag });
    line_result(parse_shorthands(&mut cur, &mut element), line, ctx)?;

    if cur.eat('(') {
        let attrs = line_result(parse_paren_attrs(&mut cur), line, ctx)?;
        element.attrs.extend(attrs);
    }

    // `tag.` takes its nested lines as text
    if cur.rest() == "." {
        let body = line.raw_children();
        let children = if RAW_TEXT_TAGS.contains(&element.tag.as_str()) {
            vec![item(Node::Raw(body), Vec::new(), line)]
        } else {
            body.iter()
                .map(|text| {
                    line_result(interpolate(text), line, ctx)
                        .map(|pieces| item(Node::Text(pieces), Vec::new(), line))
                })
                .collect::<Result<Vec<_>, _>>()?
        };
        return Ok(item(Node::Element(element), children, line));
    }

    if cur.eat('/') {
        element.self_closing = true;
    }

    let rest = cur.rest();
    let at = cur.pos();
    element.inline = if let Some(expr) = rest.strip_prefix('=') {
        if expr.trim().is_empty() {
            return Err(ctx.line_error(line, "Expected an expression after '='"));
        }
        Inline::Output(expr.trim().to_string())
    } else if rest.is_empty() {
        Inline::None
    } else if let Some(text) = rest.strip_prefix(' ') {
        Inline::Text(line_result(interpolate(text), line, ctx)?)
    } else if rest.starts_with(':') {
        return Err(ctx.error(
            line,
            line.sub_span(at, line.text.len()),
            "Block expansion ':' is not supported; nest the child on its own line",
        ));
    } else {
        return Err(ctx.error(
            line,
            line.sub_span(at, line.text.len()),
            format!("Unexpected '{}' after tag '{}'", rest, element.tag),
        ));
    };

    let children = parse_lines(&line.children, ctx)?;
    Ok(item(Node::Element(element), children, line))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn compile(source: &str) -> String {
        JadeCompiler::new()
            .compile(source, Path::new("views/test.html.jade"))
            .expect("compile")
    }

    fn compile_err(source: &str) -> CompileError {
        JadeCompiler::new()
            .compile(source, Path::new("views/test.html.jade"))
            .unwrap_err()
    }

    #[test]
    fn test_document_skeleton() {
        let out = compile("doctype html\nhtml\n  head\n    title= title\n  body\n");
        assert_eq!(
            out,
            "<!DOCTYPE html>\n<html>\n  <head>\n    <title><%= title %></title>\n  </head>\n  <body></body>\n</html>\n"
        );
    }

    #[test]
    fn test_shorthand_and_attributes() {
        let out = compile("a.btn#go(href=url, target=\"_blank\") Go\n");
        assert_eq!(
            out,
            "<a id=\"go\" class=\"btn\" href=\"<%= url %>\" target=\"_blank\">Go</a>\n"
        );
    }

    #[test]
    fn test_each_and_if_else() {
        let source = "ul\n  each post in posts\n    li= post.title\nif admin\n  p yes\nelse\n  p no\n";
        let out = compile(source);
        assert_eq!(
            out,
            "<ul>\n  <% for post in posts %>\n  <li><%= post.title %></li>\n  <% end %>\n</ul>\n<% if admin %>\n<p>yes</p>\n<% else %>\n<p>no</p>\n<% end %>\n"
        );
    }

    #[test]
    fn test_piped_text_and_raw_html() {
        let out = compile("p\n  | Hello #{name}\n  <b>bold</b>\n");
        assert_eq!(out, "<p>\n  Hello <%= name %>\n  <b>bold</b>\n</p>\n");
    }

    #[test]
    fn test_text_block_and_script_block() {
        let out = compile("p.\n  one #{x}\n  two\nscript.\n  var a = #{b};\n");
        assert_eq!(
            out,
            "<p>\n  one <%= x %>\n  two\n</p>\n<script>\n  var a = #{b};\n</script>\n"
        );
    }

    #[test]
    fn test_comments() {
        let out = compile("// visible\n//- hidden\n  p gone\n");
        assert_eq!(out, "<!-- visible -->\n");
    }

    #[test]
    fn test_block_expansion_is_rejected() {
        let err = compile_err("ul\n  li: a(href=\"/\") Home\n");
        assert_eq!(err.line, 2);
        assert_eq!(err.dialect, Dialect::Jade);
        assert!(err.message.contains("Block expansion"));
    }

    #[test]
    fn test_stray_text_is_rejected() {
        let err = compile_err("div\n  !oops\n");
        assert_eq!(err.line, 2);
    }
}

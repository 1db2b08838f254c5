//! Indentation outline shared by the whitespace-significant dialects

use std::iter::Peekable;
use std::path::Path;

use crate::error::{CompileError, Span};

use super::Dialect;

/// Where a compiler is working, for error reporting
#[derive(Debug, Clone, Copy)]
pub(crate) struct Ctx<'a> {
    pub dialect: Dialect,
    pub path: &'a Path,
}

impl<'a> Ctx<'a> {
    pub fn error(&self, line: &Line<'_>, span: Span, message: impl Into<String>) -> CompileError {
        CompileError::new(self.dialect, self.path, line.number, span, message)
    }

    /// Error covering a line's whole text
    pub fn line_error(&self, line: &Line<'_>, message: impl Into<String>) -> CompileError {
        self.error(line, line.span.clone(), message)
    }
}

/// A non-blank source line and the lines nested under it
#[derive(Debug, Clone)]
pub(crate) struct Line<'s> {
    /// 1-based line number
    pub number: usize,
    pub indent: usize,
    /// Line text without indentation or trailing whitespace
    pub text: &'s str,
    /// Byte range of `text` in the source
    pub span: Span,
    pub children: Vec<Line<'s>>,
}

impl<'s> Line<'s> {
    /// Span of `text[from..to]` in the source
    pub fn sub_span(&self, from: usize, to: usize) -> Span {
        self.span.start + from..self.span.start + to
    }

    /// Nested lines flattened back into text, indented relative to the
    /// first child. Used for raw text blocks.
    pub fn raw_children(&self) -> Vec<String> {
        let base = self.children.first().map(|c| c.indent).unwrap_or(0);
        let mut out = Vec::new();
        for child in &self.children {
            child.flatten_into(base, &mut out);
        }
        out
    }

    fn flatten_into(&self, base: usize, out: &mut Vec<String>) {
        let pad = self.indent.saturating_sub(base);
        out.push(format!("{}{}", " ".repeat(pad), self.text));
        for child in &self.children {
            child.flatten_into(base, out);
        }
    }
}

/// Split source text into a tree of lines by indentation
pub(crate) fn outline<'s>(source: &'s str, ctx: &Ctx<'_>) -> Result<Vec<Line<'s>>, CompileError> {
    let mut flat = Vec::new();
    let mut offset = 0;

    for (index, raw) in source.split_inclusive('\n').enumerate() {
        let line_start = offset;
        offset += raw.len();

        let content = raw.trim_end();
        let text = content.trim_start();
        if text.is_empty() {
            continue;
        }
        let indent_str = &content[..content.len() - text.len()];
        let line = Line {
            number: index + 1,
            indent: indent_str.chars().count(),
            text,
            span: line_start + indent_str.len()..line_start + content.len(),
            children: Vec::new(),
        };
        if indent_str.contains('\t') && indent_str.contains(' ') {
            return Err(ctx.line_error(&line, "Indentation mixes tabs and spaces"));
        }
        flat.push(line);
    }

    let mut lines = flat.into_iter().peekable();
    build(&mut lines, None, ctx)
}

fn build<'s, I>(
    lines: &mut Peekable<I>,
    parent: Option<usize>,
    ctx: &Ctx<'_>,
) -> Result<Vec<Line<'s>>, CompileError>
where
    I: Iterator<Item = Line<'s>>,
{
    let mut siblings: Vec<Line<'s>> = Vec::new();
    let mut level: Option<usize> = None;

    while let Some(indent) = lines.peek().map(|l| l.indent) {
        if parent.is_some_and(|p| indent <= p) {
            break;
        }
        match level {
            None => level = Some(indent),
            Some(l) if indent > l => {
                let children = build(lines, Some(l), ctx)?;
                if let Some(last) = siblings.last_mut() {
                    last.children = children;
                }
                continue;
            }
            Some(l) if indent < l => {
                if let Some(line) = lines.peek() {
                    return Err(ctx.line_error(line, "Inconsistent indentation"));
                }
            }
            Some(_) => {}
        }
        if let Some(line) = lines.next() {
            siblings.push(line);
        }
    }
    Ok(siblings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> Ctx<'static> {
        Ctx {
            dialect: Dialect::Haml,
            path: Path::new("test.haml"),
        }
    }

    #[test]
    fn test_outline_nesting() {
        let source = "%html\n  %head\n    %title x\n  %body\n";
        let lines = outline(source, &ctx()).expect("outline");
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "%html");
        assert_eq!(lines[0].children.len(), 2);
        assert_eq!(lines[0].children[0].children[0].text, "%title x");
        assert_eq!(lines[0].children[1].number, 4);
    }

    #[test]
    fn test_outline_skips_blank_lines() {
        let lines = outline("a\n\n   \nb\n", &ctx()).expect("outline");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].number, 4);
    }

    #[test]
    fn test_outline_span_points_at_text() {
        let source = "a\n  bc  \n";
        let lines = outline(source, &ctx()).expect("outline");
        let child = &lines[0].children[0];
        assert_eq!(&source[child.span.clone()], "bc");
    }

    #[test]
    fn test_outline_inconsistent_dedent() {
        let source = "a\n    b\n  c\n";
        let err = outline(source, &ctx()).unwrap_err();
        assert_eq!(err.line, 3);
        assert!(err.message.contains("Inconsistent"));
    }

    #[test]
    fn test_raw_children_keep_relative_indent() {
        let source = "script.\n  if (a) {\n    b();\n  }\n";
        let lines = outline(source, &ctx()).expect("outline");
        assert_eq!(
            lines[0].raw_children(),
            vec!["if (a) {".to_string(), "  b();".to_string(), "}".to_string()]
        );
    }
}

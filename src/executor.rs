//! Runs executable templates against a set of locals
//!
//! Templates see only their [`Locals`] and any loop variables they introduce.
//! Composition (`yield`, `partial`, `partial_content`) is delegated to a
//! [`TemplateHost`], so the executor itself knows nothing about views or
//! layouts.

use std::path::Path;

use crate::error::RenderError;
use crate::fs::ThemeFs;
use crate::output::OutputStack;
use crate::parser::{self, Arg, BinaryOp, Expr, Node, Span, Spanned, Template};
use crate::value::{Locals, Value};

/// Composition operations a running template can call back into
pub trait TemplateHost {
    /// Render the current view's template in place
    fn yield_view(&mut self, out: &mut OutputStack) -> Result<(), RenderError>;

    /// Render a partial in place
    fn render_partial(
        &mut self,
        name: &str,
        locals: &Locals,
        out: &mut OutputStack,
    ) -> Result<(), RenderError>;

    /// Render a partial and return its output instead of writing it
    fn partial_content(
        &mut self,
        name: &str,
        locals: &Locals,
        out: &mut OutputStack,
    ) -> Result<String, RenderError>;
}

/// Loads and runs executable templates
#[derive(Debug, Clone, Copy)]
pub struct TemplateExecutor<'fs> {
    fs: &'fs dyn ThemeFs,
}

impl<'fs> TemplateExecutor<'fs> {
    pub fn new(fs: &'fs dyn ThemeFs) -> Self {
        Self { fs }
    }

    /// Read and parse the executable template at `path`
    pub fn load(&self, path: &Path) -> Result<(String, Template), RenderError> {
        let source = self
            .fs
            .read_to_string(path)
            .map_err(|e| RenderError::io(path, e))?;
        let template = parser::parse(&source).map_err(|errors| RenderError::Syntax {
            path: path.to_path_buf(),
            errors,
        })?;
        Ok((source, template))
    }

    /// Run the template at `path` with `locals`, writing into `out`
    pub fn execute(
        &self,
        path: &Path,
        locals: &Locals,
        host: &mut dyn TemplateHost,
        out: &mut OutputStack,
    ) -> Result<(), RenderError> {
        let (source, template) = self.load(path)?;
        let label = path.display().to_string();
        run(&template, &label, &source, locals, host, out)
    }
}

/// Run an already parsed template. `label` and `source` locate runtime errors.
pub fn run(
    template: &Template,
    label: &str,
    source: &str,
    locals: &Locals,
    host: &mut dyn TemplateHost,
    out: &mut OutputStack,
) -> Result<(), RenderError> {
    let mut scope = Scope {
        label,
        source,
        locals,
        loop_vars: Vec::new(),
        host,
    };
    scope.exec(&template.nodes, out)
}

struct Scope<'a> {
    label: &'a str,
    source: &'a str,
    locals: &'a Locals,
    /// Innermost last
    loop_vars: Vec<(String, Value)>,
    host: &'a mut dyn TemplateHost,
}

impl Scope<'_> {
    fn exec(&mut self, nodes: &[Node], out: &mut OutputStack) -> Result<(), RenderError> {
        for node in nodes {
            match node {
                Node::Text(text) => out.write_str(text),
                Node::Output(expr) => {
                    let value = self.eval_spanned(expr, out)?;
                    out.write_str(&value.to_string());
                }
                Node::Eval(expr) => {
                    self.eval_spanned(expr, out)?;
                }
                Node::If {
                    cond,
                    then,
                    otherwise,
                } => {
                    if self.eval_spanned(cond, out)?.is_truthy() {
                        self.exec(then, out)?;
                    } else {
                        self.exec(otherwise, out)?;
                    }
                }
                Node::For { var, iter, body } => {
                    let items = match self.eval_spanned(iter, out)? {
                        Value::List(items) => items,
                        Value::Map(map) => map.into_values().collect(),
                        Value::Null => Vec::new(),
                        other => {
                            return Err(self.error(
                                &iter.span,
                                format!("cannot iterate over a {}", other.type_name()),
                            ))
                        }
                    };
                    for item in items {
                        self.loop_vars.push((var.clone(), item));
                        let result = self.exec(body, out);
                        self.loop_vars.pop();
                        result?;
                    }
                }
            }
        }
        Ok(())
    }

    fn eval_spanned(
        &mut self,
        expr: &Spanned<Expr>,
        out: &mut OutputStack,
    ) -> Result<Value, RenderError> {
        self.eval(&expr.node, &expr.span, out)
    }

    fn eval(&mut self, expr: &Expr, at: &Span, out: &mut OutputStack) -> Result<Value, RenderError> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Path(segments) => Ok(self.lookup(segments)),
            Expr::Not(inner) => Ok(Value::Bool(!self.eval(inner, at, out)?.is_truthy())),
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.eval(lhs, at, out)?;
                let value = match op {
                    BinaryOp::And if !lhs.is_truthy() => false,
                    BinaryOp::Or if lhs.is_truthy() => true,
                    BinaryOp::And | BinaryOp::Or => self.eval(rhs, at, out)?.is_truthy(),
                    BinaryOp::Eq => lhs == self.eval(rhs, at, out)?,
                    BinaryOp::NotEq => lhs != self.eval(rhs, at, out)?,
                };
                Ok(Value::Bool(value))
            }
            Expr::Call { name, args } => self.call(name, args, at, out),
        }
    }

    /// Undefined names and missing fields evaluate to null
    fn lookup(&self, segments: &[String]) -> Value {
        let Some((first, rest)) = segments.split_first() else {
            return Value::Null;
        };
        let root = self
            .loop_vars
            .iter()
            .rev()
            .find(|(name, _)| name == first)
            .map(|(_, value)| value)
            .or_else(|| self.locals.get(first));

        let mut current = match root {
            Some(value) => value,
            None => return Value::Null,
        };
        for segment in rest {
            match current.field(segment) {
                Some(value) => current = value,
                None => return Value::Null,
            }
        }
        current.clone()
    }

    fn call(
        &mut self,
        name: &str,
        args: &[Arg],
        at: &Span,
        out: &mut OutputStack,
    ) -> Result<Value, RenderError> {
        let mut positional = Vec::new();
        let mut named = Locals::new();
        for arg in args {
            match arg {
                Arg::Positional(expr) => positional.push(self.eval(expr, at, out)?),
                Arg::Named(key, expr) => {
                    let value = self.eval(expr, at, out)?;
                    named.insert(key.clone(), value);
                }
            }
        }

        match name {
            "yield" => {
                if !args.is_empty() {
                    return Err(self.error(at, "yield() takes no arguments"));
                }
                self.host.yield_view(out)?;
                Ok(Value::Null)
            }
            "partial" => {
                let (partial, locals) = self.partial_args(name, positional, named, at)?;
                self.host.render_partial(&partial, &locals, out)?;
                Ok(Value::Null)
            }
            "partial_content" => {
                let (partial, locals) = self.partial_args(name, positional, named, at)?;
                Ok(Value::String(self.host.partial_content(&partial, &locals, out)?))
            }
            "escape" => match positional.as_slice() {
                [value] if named.is_empty() => Ok(Value::String(escape_html(&value.to_string()))),
                _ => Err(self.error(at, "escape() takes exactly one argument")),
            },
            other => Err(self.error(at, format!("unknown function '{}'", other))),
        }
    }

    /// `(name, [locals map], key: value...)`; named arguments override the map
    fn partial_args(
        &self,
        function: &str,
        positional: Vec<Value>,
        named: Locals,
        at: &Span,
    ) -> Result<(String, Locals), RenderError> {
        let mut positional = positional.into_iter();
        let name = match positional.next() {
            Some(Value::String(name)) => name,
            Some(other) => {
                return Err(self.error(
                    at,
                    format!("{}() name must be a string, got {}", function, other.type_name()),
                ))
            }
            None => return Err(self.error(at, format!("{}() needs a template name", function))),
        };
        let base = match positional.next() {
            None | Some(Value::Null) => Locals::new(),
            Some(Value::Map(map)) => Locals::from(map),
            Some(other) => {
                return Err(self.error(
                    at,
                    format!("{}() locals must be a map, got {}", function, other.type_name()),
                ))
            }
        };
        if positional.next().is_some() {
            return Err(self.error(at, format!("{}() takes at most two positional arguments", function)));
        }
        Ok((name, base.merged(&named)))
    }

    fn error(&self, at: &Span, message: impl Into<String>) -> RenderError {
        let end = at.start.min(self.source.len());
        let line = self.source.as_bytes()[..end]
            .iter()
            .filter(|&&b| b == b'\n')
            .count()
            + 1;
        RenderError::runtime(self.label, format!("line {}: {}", line, message.into()))
    }
}

/// Escape text for inclusion in HTML
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

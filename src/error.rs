//! Error types for template compilation and rendering

use std::io;
use std::path::PathBuf;

use ariadne::{Color, Label, Report, ReportKind, Source};
use thiserror::Error;

use crate::dialect::Dialect;
use crate::parser::lexer::Token;

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

/// A dialect compiler rejected its source
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{}:{line}: {message}", path.display())]
pub struct CompileError {
    pub dialect: Dialect,
    pub path: PathBuf,
    /// 1-based line of the offending source line
    pub line: usize,
    pub span: Span,
    pub message: String,
}

impl CompileError {
    pub fn new(
        dialect: Dialect,
        path: impl Into<PathBuf>,
        line: usize,
        span: Span,
        message: impl Into<String>,
    ) -> Self {
        Self {
            dialect,
            path: path.into(),
            line,
            span,
            message: message.into(),
        }
    }

    /// Category name shown as the error page title
    pub fn category(&self) -> &'static str {
        match self.dialect {
            Dialect::Haml => "HamlSyntaxError",
            Dialect::Jade => "JadeSyntaxError",
            Dialect::Native => "TemplateSyntaxError",
        }
    }

    /// Format the error with source context using ariadne
    pub fn format(&self, source: &str) -> String {
        let filename = self.path.display().to_string();
        render_report(&filename, source, self.span.clone(), &self.message, &self.message)
    }
}

/// Parse error in an executable (native) template
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyntaxError {
    #[error("Parse error at {span:?}: {message}")]
    Syntax {
        span: Span,
        message: String,
        expected: Vec<String>,
    },
}

impl SyntaxError {
    pub fn new(span: Span, message: impl Into<String>) -> Self {
        SyntaxError::Syntax {
            span,
            message: message.into(),
            expected: Vec::new(),
        }
    }

    pub fn span(&self) -> &Span {
        match self {
            SyntaxError::Syntax { span, .. } => span,
        }
    }

    /// Convert a chumsky error raised while parsing the code of one tag.
    /// `offset` is the byte position of that code within the whole template.
    pub fn from_rich(err: chumsky::error::Rich<'_, Token>, offset: usize) -> Self {
        use chumsky::error::{RichPattern, RichReason};

        let message = match err.reason() {
            RichReason::ExpectedFound { found, .. } => {
                let found_str = match found {
                    Some(tok) => format_token(tok),
                    None => "end of tag".to_string(),
                };
                format!("Unexpected {}", found_str)
            }
            RichReason::Custom(msg) => msg.to_string(),
        };

        let expected: Vec<String> = err
            .expected()
            .filter_map(|e| match e {
                RichPattern::Token(tok) => Some(format_token(tok)),
                RichPattern::Label(label) => Some(label.to_string()),
                RichPattern::EndOfInput => Some("end of tag".to_string()),
                RichPattern::Identifier(s) => Some(format!("identifier '{}'", s)),
                RichPattern::Any => Some("any token".to_string()),
                RichPattern::SomethingElse => None,
            })
            .collect();

        let span = err.span().into_range();
        SyntaxError::Syntax {
            span: span.start + offset..span.end + offset,
            message,
            expected,
        }
    }

    /// Format the error with source context using ariadne
    pub fn format(&self, source: &str, filename: &str) -> String {
        match self {
            SyntaxError::Syntax {
                span,
                message,
                expected,
            } => {
                let expected_str = if expected.is_empty() {
                    String::new()
                } else {
                    format!("\nExpected: {}", expected.join(", "))
                };
                render_report(
                    filename,
                    source,
                    span.clone(),
                    message,
                    &format!("{}{}", message, expected_str),
                )
            }
        }
    }
}

fn render_report(filename: &str, source: &str, span: Span, message: &str, label: &str) -> String {
    let mut buf = Vec::new();
    let written = Report::build(ReportKind::Error, filename, span.start)
        .with_message(message)
        .with_label(
            Label::new((filename, span))
                .with_message(label)
                .with_color(Color::Red),
        )
        .finish()
        .write((filename, Source::from(source)), &mut buf);
    match written {
        Ok(()) => String::from_utf8_lossy(&buf).into_owned(),
        Err(_) => format!("{}: {}", filename, message),
    }
}

/// Format a token for human-readable error messages
fn format_token(tok: &Token) -> String {
    match tok {
        Token::Ident(s) => format!("identifier '{}'", s),
        Token::String(s) => format!("string \"{}\"", s),
        Token::Number(n) => format!("number {}", n),
        Token::If => "keyword 'if'".to_string(),
        Token::Else => "keyword 'else'".to_string(),
        Token::End => "keyword 'end'".to_string(),
        Token::For => "keyword 'for'".to_string(),
        Token::In => "keyword 'in'".to_string(),
        Token::Not => "keyword 'not'".to_string(),
        Token::And => "keyword 'and'".to_string(),
        Token::Or => "keyword 'or'".to_string(),
        Token::ParenOpen => "'('".to_string(),
        Token::ParenClose => "')'".to_string(),
        Token::Comma => "','".to_string(),
        Token::Colon => "':'".to_string(),
        Token::Dot => "'.'".to_string(),
        Token::EqEq => "'=='".to_string(),
        Token::NotEq => "'!='".to_string(),
        _ => format!("{:?}", tok),
    }
}

/// Errors that can occur while rendering a template
#[derive(Error, Debug)]
pub enum RenderError {
    /// No candidate file exists for a logical template name
    #[error("template missing: {name}")]
    TemplateMissing {
        name: String,
        candidates: Vec<PathBuf>,
    },

    /// The compiled-artifact directory could not be made writable
    #[error("directory not writable: {}", dir.display())]
    DirectoryNotWritable { dir: PathBuf },

    /// A dialect compiler rejected the template source
    #[error("compile error: {0}")]
    Compile(#[from] CompileError),

    /// An executable template failed to parse
    #[error("syntax error in {}: {}", path.display(), format_syntax_errors(errors))]
    Syntax {
        path: PathBuf,
        errors: Vec<SyntaxError>,
    },

    /// A template failed while executing
    #[error("runtime error in {template}: {message}")]
    Runtime { template: String, message: String },

    /// A filesystem operation failed
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn format_syntax_errors(errors: &[SyntaxError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl RenderError {
    pub fn missing(name: impl Into<String>, candidates: Vec<PathBuf>) -> Self {
        Self::TemplateMissing {
            name: name.into(),
            candidates,
        }
    }

    pub fn not_writable(dir: impl Into<PathBuf>) -> Self {
        Self::DirectoryNotWritable { dir: dir.into() }
    }

    pub fn runtime(template: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Runtime {
            template: template.into(),
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Title shown on the error page
    pub fn title(&self) -> &'static str {
        match self {
            Self::TemplateMissing { .. } => "Template missing",
            Self::DirectoryNotWritable { .. } => "Directory not writable",
            Self::Compile(e) => e.category(),
            Self::Syntax { .. } => "TemplateSyntaxError",
            Self::Runtime { .. } => "TemplateRuntimeError",
            Self::Io { .. } => "IoError",
        }
    }

    /// Description shown on the error page
    pub fn message(&self) -> String {
        match self {
            Self::TemplateMissing { name, candidates } => {
                let tried = candidates
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                format!(
                    "It seems that no template exists for `{}` (tried: {}).",
                    name, tried
                )
            }
            Self::DirectoryNotWritable { dir } => format!(
                "It seems that the `{}` directory is not writable by the server.",
                dir.display()
            ),
            Self::Compile(e) => e.to_string(),
            Self::Syntax { path, errors } => {
                format!("{}: {}", path.display(), format_syntax_errors(errors))
            }
            Self::Runtime { template, message } => format!("{}: {}", template, message),
            Self::Io { path, source } => format!("{}: {}", path.display(), source),
        }
    }
}

/// Malformed view options
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OptionsError {
    #[error("view options must be a map, got {0}")]
    NotAMap(&'static str),

    #[error("option `{key}` must be a {expected}, got {found}")]
    WrongType {
        key: &'static str,
        expected: &'static str,
        found: &'static str,
    },
}

/// A render that ended on the error page
///
/// By the time this value exists the partial output has been discarded and the
/// error page has been written. There is nothing left to resume.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{title}: {message}")]
pub struct Halted {
    pub title: String,
    pub message: String,
}

/// Failure of a top-level view render
#[derive(Error, Debug)]
pub enum ViewError {
    /// Rendering failed and the error page was shown instead
    #[error("render halted: {0}")]
    Halted(#[from] Halted),

    /// The final output could not be delivered to the caller's sink
    #[error("failed to write rendered output: {0}")]
    Io(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_titles() {
        assert_eq!(
            RenderError::missing("nope", vec![]).title(),
            "Template missing"
        );
        assert_eq!(
            RenderError::not_writable("/tmp/x").title(),
            "Directory not writable"
        );
        let compile = CompileError::new(Dialect::Haml, "a.haml", 3, 10..12, "bad indent");
        assert_eq!(RenderError::from(compile).title(), "HamlSyntaxError");
        assert_eq!(RenderError::runtime("x", "y").title(), "TemplateRuntimeError");
    }

    #[test]
    fn test_missing_message_names_template() {
        let err = RenderError::missing("posts/index", vec![PathBuf::from("v/posts/index.php")]);
        let message = err.message();
        assert!(message.contains("posts/index"));
        assert!(message.contains("v/posts/index.php"));
    }

    #[test]
    fn test_compile_error_display_has_location() {
        let err = CompileError::new(Dialect::Jade, "views/a.html.jade", 7, 0..1, "unclosed (");
        assert_eq!(err.to_string(), "views/a.html.jade:7: unclosed (");
        assert_eq!(err.category(), "JadeSyntaxError");
    }

    #[test]
    fn test_compile_error_format_includes_message() {
        let source = "%div\n  %p{\n";
        let err = CompileError::new(Dialect::Haml, "a.haml", 2, 7..9, "unterminated attributes");
        let report = err.format(source);
        assert!(report.contains("unterminated attributes"));
    }
}

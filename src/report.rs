//! Terminal error reporting for failed renders

use std::fmt::Debug;
use std::io::{self, Write};

use crate::error::{Halted, RenderError};
use crate::executor::escape_html;
use crate::output::OutputStack;

/// Writes a full error page in place of a failed render
pub trait ErrorDisplay: Debug + Send + Sync {
    fn display(&self, title: &str, message: &str, sink: &mut dyn Write) -> io::Result<()>;
}

/// Minimal standalone HTML error page
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlErrorPage;

impl ErrorDisplay for HtmlErrorPage {
    fn display(&self, title: &str, message: &str, sink: &mut dyn Write) -> io::Result<()> {
        let title = escape_html(title);
        let message = escape_html(message);
        writeln!(sink, "<!DOCTYPE html>")?;
        writeln!(sink, "<html>")?;
        writeln!(sink, "<head>")?;
        writeln!(sink, "  <meta charset=\"utf-8\">")?;
        writeln!(sink, "  <title>{}</title>", title)?;
        writeln!(sink, "</head>")?;
        writeln!(sink, "<body class=\"render-error\">")?;
        writeln!(sink, "  <h1>{}</h1>", title)?;
        writeln!(sink, "  <p>{}</p>", message)?;
        writeln!(sink, "</body>")?;
        writeln!(sink, "</html>")
    }
}

/// Replaces a failed render's output with an error page
#[derive(Debug)]
pub struct ErrorReporter {
    display: Box<dyn ErrorDisplay>,
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self::new(Box::new(HtmlErrorPage))
    }
}

impl ErrorReporter {
    pub fn new(display: Box<dyn ErrorDisplay>) -> Self {
        Self { display }
    }

    /// Drop everything `buffer` holds and show the error page for `err`.
    ///
    /// The returned [`Halted`] is the end of the render; nothing written
    /// before the failure reaches `sink`.
    pub fn fail(
        &self,
        buffer: OutputStack,
        err: &RenderError,
        sink: &mut dyn Write,
    ) -> io::Result<Halted> {
        drop(buffer);
        let title = err.title();
        let message = err.message();
        tracing::error!(title, %message, "render halted");
        self.display.display(title, &message, sink)?;
        Ok(Halted {
            title: title.to_string(),
            message,
        })
    }
}

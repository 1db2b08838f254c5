//! View, layout and partial composition
//!
//! [`Renderer::render_view`] is the entry point: it renders
//! `layouts/<layout>` with the view's locals, and the layout pulls the view in
//! by calling `yield()`. Partials are ordinary templates whose last name
//! segment starts with `_`.
//!
//! All per-render state lives in a [`RenderContext`] passed down the call
//! chain, so nested and concurrent renders do not share a yield target.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;

use crate::config::ThemeConfig;
use crate::dialect::{Compiler, Compilers};
use crate::error::{OptionsError, RenderError, ViewError};
use crate::executor::{TemplateExecutor, TemplateHost};
use crate::fs::{NativeFs, ThemeFs};
use crate::output::OutputStack;
use crate::report::{ErrorDisplay, ErrorReporter};
use crate::template::{partial_name, CompileCache, PathResolver};
use crate::value::{Locals, Value};

/// The view a layout yields to
#[derive(Debug, Clone, PartialEq)]
pub struct ViewFrame {
    pub name: String,
    pub locals: Locals,
}

/// Per-call composition state
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderContext<'v> {
    view: Option<&'v ViewFrame>,
    depth: usize,
}

impl<'v> RenderContext<'v> {
    /// Context outside any view; `yield()` fails here
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_view(view: &'v ViewFrame) -> Self {
        Self {
            view: Some(view),
            depth: 0,
        }
    }

    pub fn view(&self) -> Option<&'v ViewFrame> {
        self.view
    }

    /// Number of templates currently being rendered above this one
    pub fn depth(&self) -> usize {
        self.depth
    }

    fn nested(&self) -> Self {
        Self {
            view: self.view,
            depth: self.depth + 1,
        }
    }
}

/// Options for [`Renderer::render_view`]
#[derive(Debug, Clone, PartialEq)]
pub struct ViewOptions {
    /// Layout name, looked up as `layouts/<layout>`
    pub layout: String,
    pub locals: Locals,
    /// Keys other than `layout` and `locals`; kept but not interpreted
    pub extra: BTreeMap<String, Value>,
}

impl Default for ViewOptions {
    fn default() -> Self {
        Self::with_layout("default")
    }
}

impl ViewOptions {
    pub fn with_layout(layout: impl Into<String>) -> Self {
        Self {
            layout: layout.into(),
            locals: Locals::new(),
            extra: BTreeMap::new(),
        }
    }

    pub fn locals(mut self, locals: Locals) -> Self {
        self.locals = locals;
        self
    }

    /// Merge a free-form options map over these options.
    ///
    /// `layout` must be a string and `locals` a map (or null); they replace
    /// the current values. Any other key is kept in `extra`.
    pub fn merge(mut self, options: Value) -> Result<Self, OptionsError> {
        let map = match options {
            Value::Map(map) => map,
            Value::Null => return Ok(self),
            other => return Err(OptionsError::NotAMap(other.type_name())),
        };
        for (key, value) in map {
            match key.as_str() {
                "layout" => match value {
                    Value::String(layout) => self.layout = layout,
                    other => {
                        return Err(OptionsError::WrongType {
                            key: "layout",
                            expected: "string",
                            found: other.type_name(),
                        })
                    }
                },
                "locals" => match value {
                    Value::Map(locals) => self.locals = Locals::from(locals),
                    Value::Null => self.locals = Locals::new(),
                    other => {
                        return Err(OptionsError::WrongType {
                            key: "locals",
                            expected: "map",
                            found: other.type_name(),
                        })
                    }
                },
                _ => {
                    self.extra.insert(key, value);
                }
            }
        }
        Ok(self)
    }

    /// Options built from a map merged over the defaults
    pub fn from_value(options: Value) -> Result<Self, OptionsError> {
        Self::default().merge(options)
    }
}

/// Renders views, layouts and partials of one theme
#[derive(Debug)]
pub struct Renderer {
    config: ThemeConfig,
    fs: Arc<dyn ThemeFs>,
    compilers: Compilers,
    resolver: PathResolver,
    cache: CompileCache,
    reporter: ErrorReporter,
}

impl Renderer {
    /// Renderer over the real filesystem
    pub fn new(config: ThemeConfig) -> Self {
        Self::with_fs(config, Arc::new(NativeFs))
    }

    pub fn with_fs(config: ThemeConfig, fs: Arc<dyn ThemeFs>) -> Self {
        let resolver = PathResolver::new(config.views_path());
        let cache = CompileCache::new(config.views_path(), config.temp_path(), config.dir_mode);
        Self {
            config,
            fs,
            compilers: Compilers::default(),
            resolver,
            cache,
            reporter: ErrorReporter::default(),
        }
    }

    /// Replace the compiler for the compiler's dialect
    pub fn with_compiler(mut self, compiler: Box<dyn Compiler>) -> Self {
        self.compilers.register(compiler);
        self
    }

    pub fn with_error_display(mut self, display: Box<dyn ErrorDisplay>) -> Self {
        self.reporter = ErrorReporter::new(display);
        self
    }

    pub fn config(&self) -> &ThemeConfig {
        &self.config
    }

    pub fn fs(&self) -> &dyn ThemeFs {
        self.fs.as_ref()
    }

    pub fn compilers(&self) -> &Compilers {
        &self.compilers
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub fn cache(&self) -> &CompileCache {
        &self.cache
    }

    /// Default options, using the configured layout
    pub fn view_options(&self) -> ViewOptions {
        ViewOptions::with_layout(self.config.default_layout.clone())
    }

    /// Resolve, compile if needed, and execute the template `name`
    pub fn render_template(
        &self,
        name: &str,
        locals: &Locals,
        ctx: &RenderContext<'_>,
        out: &mut OutputStack,
    ) -> Result<(), RenderError> {
        if ctx.depth() >= self.config.max_depth {
            return Err(RenderError::runtime(
                name,
                format!(
                    "templates nested more than {} deep; is a partial or yield recursing?",
                    self.config.max_depth
                ),
            ));
        }

        let file = self
            .resolver
            .resolve(name, self.fs())
            .ok_or_else(|| RenderError::missing(name, self.resolver.candidates(name)))?;
        let executable = self.cache.ensure_compiled(&file, self.fs(), &self.compilers)?;

        let mut host = Host {
            renderer: self,
            ctx: ctx.nested(),
        };
        TemplateExecutor::new(self.fs()).execute(&executable, locals, &mut host, out)
    }

    /// Render `name` under the partial naming convention
    pub fn render_partial(
        &self,
        name: &str,
        locals: &Locals,
        ctx: &RenderContext<'_>,
        out: &mut OutputStack,
    ) -> Result<(), RenderError> {
        self.render_template(&partial_name(name), locals, ctx, out)
    }

    /// Render a partial into a capture frame and return its output
    pub fn partial_content(
        &self,
        name: &str,
        locals: &Locals,
        ctx: &RenderContext<'_>,
        out: &mut OutputStack,
    ) -> Result<String, RenderError> {
        out.capture(|out| self.render_partial(name, locals, ctx, out))
    }

    /// Render the current view with its own locals
    pub fn yield_view(
        &self,
        ctx: &RenderContext<'_>,
        out: &mut OutputStack,
    ) -> Result<(), RenderError> {
        let view = ctx
            .view()
            .ok_or_else(|| RenderError::runtime("yield", "yield() called outside of a view"))?;
        self.render_template(&view.name, &view.locals, ctx, out)
    }

    /// Render the view `name` inside its layout and write the page to `sink`.
    ///
    /// On failure the partial page is discarded and the error page is written
    /// to `sink` instead; the result is then [`ViewError::Halted`].
    pub fn render_view(
        &self,
        name: &str,
        options: ViewOptions,
        sink: &mut dyn Write,
    ) -> Result<(), ViewError> {
        let frame = ViewFrame {
            name: name.to_string(),
            locals: options.locals,
        };
        let layout = format!("layouts/{}", options.layout);
        tracing::debug!(view = name, layout = %layout, "rendering view");

        let ctx = RenderContext::for_view(&frame);
        let mut out = OutputStack::new();
        match self.render_template(&layout, &frame.locals, &ctx, &mut out) {
            Ok(()) => {
                sink.write_all(out.finish().as_bytes())?;
                Ok(())
            }
            Err(err) => Err(self.reporter.fail(out, &err, sink)?.into()),
        }
    }

    /// Render a single partial outside any view, with the same error page
    /// handling as [`Renderer::render_view`]
    pub fn render_fragment(
        &self,
        name: &str,
        locals: &Locals,
        sink: &mut dyn Write,
    ) -> Result<(), ViewError> {
        let ctx = RenderContext::new();
        let mut out = OutputStack::new();
        match self.render_partial(name, locals, &ctx, &mut out) {
            Ok(()) => {
                sink.write_all(out.finish().as_bytes())?;
                Ok(())
            }
            Err(err) => Err(self.reporter.fail(out, &err, sink)?.into()),
        }
    }
}

/// Bridges a running template back to its renderer
struct Host<'r, 'v> {
    renderer: &'r Renderer,
    ctx: RenderContext<'v>,
}

impl TemplateHost for Host<'_, '_> {
    fn yield_view(&mut self, out: &mut OutputStack) -> Result<(), RenderError> {
        self.renderer.yield_view(&self.ctx, out)
    }

    fn render_partial(
        &mut self,
        name: &str,
        locals: &Locals,
        out: &mut OutputStack,
    ) -> Result<(), RenderError> {
        self.renderer.render_partial(name, locals, &self.ctx, out)
    }

    fn partial_content(
        &mut self,
        name: &str,
        locals: &Locals,
        out: &mut OutputStack,
    ) -> Result<String, RenderError> {
        self.renderer.partial_content(name, locals, &self.ctx, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFs;
    use pretty_assertions::assert_eq;

    fn renderer(fs: &Arc<MemoryFs>) -> Renderer {
        let fs: Arc<dyn ThemeFs> = fs.clone();
        Renderer::with_fs(ThemeConfig::new("theme"), fs)
    }

    #[test]
    fn test_options_merge_over_defaults() {
        let options = ViewOptions::from_value(
            serde_json::json!({"locals": {"x": 1}, "cache": true}).into(),
        )
        .unwrap();
        assert_eq!(options.layout, "default");
        assert_eq!(options.locals.get("x"), Some(&Value::Number(1.0)));
        assert_eq!(options.extra.get("cache"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_options_layout_override_and_type_errors() {
        let options =
            ViewOptions::from_value(serde_json::json!({"layout": "print"}).into()).unwrap();
        assert_eq!(options.layout, "print");
        assert!(ViewOptions::from_value(serde_json::json!({"layout": 3}).into()).is_err());
        assert!(ViewOptions::from_value(serde_json::json!([1]).into()).is_err());
    }

    #[test]
    fn test_yield_outside_view_fails() {
        let fs = Arc::new(MemoryFs::new());
        let err = renderer(&fs)
            .yield_view(&RenderContext::new(), &mut OutputStack::new())
            .unwrap_err();
        assert!(err.message().contains("outside of a view"));
    }

    #[test]
    fn test_partial_content_leaves_ambient_output_alone() {
        let fs = Arc::new(MemoryFs::new());
        fs.add_file("theme/views/_card.php", "[<%= n %>]");
        let renderer = renderer(&fs);
        let mut out = OutputStack::new();
        out.write_str("before ");

        let content = renderer
            .partial_content(
                "card",
                &Locals::new().with("n", 7),
                &RenderContext::new(),
                &mut out,
            )
            .unwrap();

        assert_eq!(content, "[7]");
        assert_eq!(out.finish(), "before ");
    }

    #[test]
    fn test_runaway_recursion_is_a_runtime_error() {
        let fs = Arc::new(MemoryFs::new());
        fs.add_file("theme/views/_loop.php", "<% partial(\"loop\") %>");
        let err = renderer(&fs)
            .render_partial(
                "loop",
                &Locals::new(),
                &RenderContext::new(),
                &mut OutputStack::new(),
            )
            .unwrap_err();
        assert_eq!(err.title(), "TemplateRuntimeError");
        assert!(err.message().contains("nested more than 64"));
    }
}

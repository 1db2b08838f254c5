//! Theme Views - template rendering for a theme's views, layouts and partials
//!
//! Templates are looked up by logical name under the theme's views directory,
//! in Jade, Haml or the native executable format. Jade and Haml sources are
//! compiled to native templates and cached in the theme's temp directory until
//! their source changes.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use theme_views::{Locals, MemoryFs, Renderer, ThemeConfig, ViewOptions};
//!
//! let fs = Arc::new(MemoryFs::new());
//! fs.add_file("theme/views/layouts/default.php", "<main><% yield() %></main>");
//! fs.add_file("theme/views/posts/index.html.haml", "%h1= title");
//!
//! let renderer = Renderer::with_fs(ThemeConfig::new("theme"), fs);
//! let options = ViewOptions::default().locals(Locals::new().with("title", "Posts"));
//!
//! let mut page = Vec::new();
//! renderer.render_view("posts/index", options, &mut page).unwrap();
//! assert_eq!(String::from_utf8(page).unwrap(), "<main><h1>Posts</h1>\n</main>");
//! ```

pub mod config;
pub mod dialect;
pub mod error;
pub mod executor;
pub mod fs;
pub mod output;
pub mod parser;
pub mod render;
pub mod report;
pub mod template;
pub mod value;

pub use config::{ConfigError, ThemeConfig};
pub use dialect::{Compiler, Compilers, Dialect, HamlCompiler, JadeCompiler};
pub use error::{CompileError, Halted, OptionsError, RenderError, SyntaxError, ViewError};
pub use executor::{TemplateExecutor, TemplateHost};
pub use fs::{MemoryFs, NativeFs, ThemeFs};
pub use output::OutputStack;
pub use render::{RenderContext, Renderer, ViewFrame, ViewOptions};
pub use report::{ErrorDisplay, ErrorReporter, HtmlErrorPage};
pub use template::{partial_name, CompileCache, PathResolver, TemplateFile};
pub use value::{Locals, Value};

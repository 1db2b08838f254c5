//! Finding template files and keeping their compiled forms up to date
//!
//! A logical name such as `posts/index` is resolved against the views root by
//! trying each supported suffix in turn:
//!
//! ```text
//! posts/index.html.jade
//! posts/index.html.haml
//! posts/index.haml
//! posts/index.html.php
//! posts/index.php
//! ```
//!
//! Haml and Jade files are then compiled into the temp directory, and the
//! compiled artifact is reused until the source is modified after it.

mod cache;
mod resolver;

pub use cache::CompileCache;
pub use resolver::{partial_name, PathResolver, TemplateFile, CANDIDATE_SUFFIXES, PARTIAL_PREFIX};

//! Template dialects and their compilers
//!
//! Haml and Jade sources are compiled into the native executable template
//! format (see [`crate::parser`]). Both compilers share one pipeline:
//! the source is split into an indentation [`outline`], each line is parsed
//! into a markup node by the dialect, and the node tree is emitted by
//! [`markup`].

use std::collections::HashMap;
use std::fmt::Debug;
use std::path::Path;

use crate::error::CompileError;

mod haml;
mod jade;
mod markup;
mod outline;

pub use haml::HamlCompiler;
pub use jade::JadeCompiler;

/// Authoring format of a template source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// `.jade` sources, compiled before execution
    Jade,
    /// `.haml` sources, compiled before execution
    Haml,
    /// `.php` sources, executed directly
    Native,
}

/// Extension of executable templates and compiled artifacts
pub const EXECUTABLE_EXTENSION: &str = "php";

impl Dialect {
    /// Dialect implied by a file's final extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "jade" => Some(Dialect::Jade),
            "haml" => Some(Dialect::Haml),
            EXECUTABLE_EXTENSION => Some(Dialect::Native),
            _ => None,
        }
    }

    /// Dialect of a path, from its final extension
    pub fn of_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Dialect::Jade => "jade",
            Dialect::Haml => "haml",
            Dialect::Native => EXECUTABLE_EXTENSION,
        }
    }

    /// Whether sources in this dialect must be compiled before execution
    pub fn is_compiled(&self) -> bool {
        !matches!(self, Dialect::Native)
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Dialect::Jade => "jade",
            Dialect::Haml => "haml",
            Dialect::Native => "native",
        })
    }
}

/// Turns dialect source text into executable template text
///
/// Implementations must be pure: the output depends only on the arguments.
/// `path` is used for error locations only.
pub trait Compiler: Debug + Send + Sync {
    fn dialect(&self) -> Dialect;

    fn compile(&self, source: &str, path: &Path) -> Result<String, CompileError>;
}

/// The compiler registered for each compilable dialect
#[derive(Debug)]
pub struct Compilers {
    compilers: HashMap<Dialect, Box<dyn Compiler>>,
}

impl Default for Compilers {
    fn default() -> Self {
        let mut compilers = Self::empty();
        compilers.register(Box::new(HamlCompiler::new()));
        compilers.register(Box::new(JadeCompiler::new()));
        compilers
    }
}

impl Compilers {
    /// A registry with no compilers at all
    pub fn empty() -> Self {
        Self {
            compilers: HashMap::new(),
        }
    }

    /// Register a compiler, replacing any previous one for its dialect
    pub fn register(&mut self, compiler: Box<dyn Compiler>) {
        self.compilers.insert(compiler.dialect(), compiler);
    }

    pub fn get(&self, dialect: Dialect) -> Option<&dyn Compiler> {
        self.compilers.get(&dialect).map(|c| c.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_from_extension() {
        assert_eq!(Dialect::from_extension("jade"), Some(Dialect::Jade));
        assert_eq!(Dialect::from_extension("haml"), Some(Dialect::Haml));
        assert_eq!(Dialect::from_extension("php"), Some(Dialect::Native));
        assert_eq!(Dialect::from_extension("html"), None);
    }

    #[test]
    fn test_dialect_of_nested_extension_uses_last() {
        assert_eq!(
            Dialect::of_path(Path::new("posts/index.html.haml")),
            Some(Dialect::Haml)
        );
        assert!(!Dialect::Native.is_compiled());
        assert!(Dialect::Jade.is_compiled());
    }

    #[test]
    fn test_default_registry_has_both_compilers() {
        let compilers = Compilers::default();
        assert!(compilers.get(Dialect::Haml).is_some());
        assert!(compilers.get(Dialect::Jade).is_some());
        assert!(compilers.get(Dialect::Native).is_none());
    }
}

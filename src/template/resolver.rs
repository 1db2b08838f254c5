//! Logical template names to files on disk

use std::path::{Path, PathBuf};

use crate::dialect::Dialect;
use crate::fs::ThemeFs;

/// Suffixes tried for a logical name, highest precedence first
pub const CANDIDATE_SUFFIXES: [&str; 5] = [".html.jade", ".html.haml", ".haml", ".html.php", ".php"];

/// Marker prefixed to the last segment of a partial's name
pub const PARTIAL_PREFIX: char = '_';

/// An existing template source and the dialect it is written in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateFile {
    pub path: PathBuf,
    pub dialect: Dialect,
}

/// Maps logical names such as `posts/index` to template files under a views root
#[derive(Debug, Clone)]
pub struct PathResolver {
    views_root: PathBuf,
}

impl PathResolver {
    pub fn new(views_root: impl Into<PathBuf>) -> Self {
        Self {
            views_root: views_root.into(),
        }
    }

    pub fn views_root(&self) -> &Path {
        &self.views_root
    }

    /// Every path tried for `name`, in precedence order
    pub fn candidates(&self, name: &str) -> Vec<PathBuf> {
        CANDIDATE_SUFFIXES
            .iter()
            .map(|suffix| self.views_root.join(format!("{}{}", name, suffix)))
            .collect()
    }

    /// The first candidate for `name` that exists as a file
    pub fn resolve(&self, name: &str, fs: &dyn ThemeFs) -> Option<TemplateFile> {
        let found = self.candidates(name).into_iter().find_map(|path| {
            if !fs.is_file(&path) {
                return None;
            }
            let dialect = Dialect::of_path(&path)?;
            Some(TemplateFile { path, dialect })
        });

        match &found {
            Some(file) => tracing::debug!(
                name,
                path = %file.path.display(),
                dialect = %file.dialect,
                "resolved template"
            ),
            None => tracing::debug!(name, "no template file found"),
        }
        found
    }
}

/// Apply the partial naming convention: `a/b/foo` becomes `a/b/_foo`.
/// Names whose last segment already starts with `_` are returned unchanged.
pub fn partial_name(name: &str) -> String {
    let (dir, last) = match name.rsplit_once('/') {
        Some((dir, last)) => (Some(dir), last),
        None => (None, name),
    };
    if last.starts_with(PARTIAL_PREFIX) {
        return name.to_string();
    }
    match dir {
        Some(dir) => format!("{}/{}{}", dir, PARTIAL_PREFIX, last),
        None => format!("{}{}", PARTIAL_PREFIX, last),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFs;

    #[test]
    fn test_candidates_order() {
        let resolver = PathResolver::new("views");
        let names: Vec<String> = resolver
            .candidates("posts/index")
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "views/posts/index.html.jade",
                "views/posts/index.html.haml",
                "views/posts/index.haml",
                "views/posts/index.html.php",
                "views/posts/index.php",
            ]
        );
    }

    #[test]
    fn test_first_existing_candidate_wins() {
        let fs = MemoryFs::new();
        fs.add_file("views/home.php", "php");
        fs.add_file("views/home.haml", "%p haml");
        let file = PathResolver::new("views").resolve("home", &fs).unwrap();
        assert_eq!(file.path, PathBuf::from("views/home.haml"));
        assert_eq!(file.dialect, Dialect::Haml);
    }

    #[test]
    fn test_html_haml_and_bare_haml_are_distinct_candidates() {
        let fs = MemoryFs::new();
        fs.add_file("views/a.haml", "%p a");
        let resolver = PathResolver::new("views");
        assert_eq!(
            resolver.resolve("a", &fs).unwrap().path,
            PathBuf::from("views/a.haml")
        );
        fs.add_file("views/a.html.haml", "%p b");
        assert_eq!(
            resolver.resolve("a", &fs).unwrap().path,
            PathBuf::from("views/a.html.haml")
        );
    }

    #[test]
    fn test_directory_is_not_a_template() {
        let fs = MemoryFs::new();
        fs.add_dir("views/x.php", 0o755);
        assert!(PathResolver::new("views").resolve("x", &fs).is_none());
    }

    #[test]
    fn test_partial_name_is_idempotent() {
        assert_eq!(partial_name("foo"), "_foo");
        assert_eq!(partial_name("_foo"), "_foo");
        assert_eq!(partial_name("a/b/foo"), "a/b/_foo");
        assert_eq!(partial_name("a/b/_foo"), "a/b/_foo");
        assert_eq!(partial_name(&partial_name("a/foo")), "a/_foo");
    }
}

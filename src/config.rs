//! Theme configuration
//!
//! Where templates live, where compiled artifacts go, and a few rendering
//! knobs. Loaded from TOML:
//!
//! ```toml
//! [theme]
//! root = "/srv/site/theme"
//! views = "views"
//! temp = "tmp"
//!
//! [render]
//! default_layout = "default"
//! dir_mode = 0o760
//! max_depth = 64
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Errors that can occur when loading a theme configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read theme config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse theme config TOML: {0}")]
    ParseError(#[from] toml::de::Error),
}

/// Paths and rendering options for one theme
#[derive(Debug, Clone, PartialEq)]
pub struct ThemeConfig {
    /// Theme root; relative `views_dir`/`temp_dir` are resolved against it
    pub root: PathBuf,
    /// Directory holding view, layout and partial templates
    pub views_dir: PathBuf,
    /// Directory receiving compiled artifacts
    pub temp_dir: PathBuf,
    /// Layout used by `render_view` when the caller names none
    pub default_layout: String,
    /// Mode for cache directories created (or fixed up) by the compile cache
    pub dir_mode: u32,
    /// Maximum template nesting (layouts, yields, partials) per render
    pub max_depth: usize,
}

#[derive(Deserialize, Default)]
struct TomlConfig {
    #[serde(default)]
    theme: TomlTheme,
    #[serde(default)]
    render: TomlRender,
}

#[derive(Deserialize, Default)]
struct TomlTheme {
    root: Option<PathBuf>,
    views: Option<PathBuf>,
    temp: Option<PathBuf>,
}

#[derive(Deserialize, Default)]
struct TomlRender {
    default_layout: Option<String>,
    dir_mode: Option<u32>,
    max_depth: Option<usize>,
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            views_dir: PathBuf::from("views"),
            temp_dir: PathBuf::from("tmp"),
            default_layout: "default".to_string(),
            dir_mode: 0o760,
            max_depth: 64,
        }
    }
}

impl ThemeConfig {
    /// Create a configuration rooted at `root` with default sub-directories
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Load configuration from a TOML file
    ///
    /// A missing `[theme] root` defaults to the directory containing the file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut parsed: TomlConfig = toml::from_str(&content)?;
        if parsed.theme.root.is_none() {
            parsed.theme.root = path.parent().map(Path::to_path_buf);
        }
        Ok(Self::from_toml(parsed))
    }

    /// Load configuration from a TOML string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let parsed: TomlConfig = toml::from_str(content)?;
        Ok(Self::from_toml(parsed))
    }

    fn from_toml(parsed: TomlConfig) -> Self {
        let defaults = Self::default();

        ThemeConfig {
            root: parsed.theme.root.unwrap_or(defaults.root),
            views_dir: parsed.theme.views.unwrap_or(defaults.views_dir),
            temp_dir: parsed.theme.temp.unwrap_or(defaults.temp_dir),
            default_layout: parsed
                .render
                .default_layout
                .unwrap_or(defaults.default_layout),
            dir_mode: parsed.render.dir_mode.unwrap_or(defaults.dir_mode),
            max_depth: parsed.render.max_depth.unwrap_or(defaults.max_depth),
        }
    }

    /// Absolute (or root-relative) path of the views directory
    pub fn views_path(&self) -> PathBuf {
        self.root.join(&self.views_dir)
    }

    /// Absolute (or root-relative) path of the compiled-artifact directory
    pub fn temp_path(&self) -> PathBuf {
        self.root.join(&self.temp_dir)
    }

    pub fn with_views_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.views_dir = dir.into();
        self
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    pub fn with_default_layout(mut self, layout: impl Into<String>) -> Self {
        self.default_layout = layout.into();
        self
    }

    pub fn with_dir_mode(mut self, mode: u32) -> Self {
        self.dir_mode = mode;
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }
}

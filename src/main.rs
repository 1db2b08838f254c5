//! Theme Views CLI
//!
//! Usage:
//!   theme-views [OPTIONS] render <VIEW> [--layout <NAME>] [--locals <FILE>] [--partial]
//!   theme-views [OPTIONS] check
//!
//! Options:
//!   -t, --theme <DIR>    Theme root directory (default: current directory)
//!   -c, --config <FILE>  Theme configuration file (TOML format)
//!   -v, --verbose        Log resolution and compilation to stderr
//!   -h, --help           Print help

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use theme_views::{parser, Dialect, Locals, Renderer, ThemeConfig, ViewError};

#[derive(Parser)]
#[command(name = "theme-views")]
#[command(about = "Render theme views, layouts and partials")]
struct Cli {
    /// Theme root directory
    #[arg(short, long, global = true)]
    theme: Option<PathBuf>,

    /// Theme configuration file (TOML format)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log template resolution and compilation to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render a view inside its layout and print the page
    Render {
        /// Logical view name, e.g. posts/index
        view: String,

        /// Layout to render the view in (looked up as layouts/<NAME>)
        #[arg(short, long)]
        layout: Option<String>,

        /// JSON file with an object of locals
        #[arg(long)]
        locals: Option<PathBuf>,

        /// Render VIEW as a partial, without a layout
        #[arg(long)]
        partial: bool,
    },
    /// Compile every Haml and Jade template and parse every native one
    Check,
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .init();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(message) => {
            eprintln!("{}", message);
            std::process::exit(1);
        }
    };

    let code = match cli.command {
        Command::Render {
            view,
            layout,
            locals,
            partial,
        } => render(config, &view, layout, locals.as_deref(), partial),
        Command::Check => check(&config),
    };
    std::process::exit(code);
}

fn load_config(cli: &Cli) -> Result<ThemeConfig, String> {
    let mut config = match &cli.config {
        Some(path) => ThemeConfig::from_file(path).map_err(|e| {
            format!("Error loading config '{}': {}", path.display(), e)
        })?,
        None => ThemeConfig::default(),
    };
    if let Some(theme) = &cli.theme {
        config.root = theme.clone();
    }
    Ok(config)
}

fn read_locals(path: &Path) -> Result<Locals, String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Error reading locals '{}': {}", path.display(), e))?;
    let json: serde_json::Value = serde_json::from_str(&content)
        .map_err(|e| format!("Error parsing locals '{}': {}", path.display(), e))?;
    Locals::from_json(json)
        .ok_or_else(|| format!("Locals file '{}' must contain a JSON object", path.display()))
}

fn render(
    config: ThemeConfig,
    view: &str,
    layout: Option<String>,
    locals: Option<&Path>,
    partial: bool,
) -> i32 {
    let locals = match locals.map(read_locals).transpose() {
        Ok(locals) => locals.unwrap_or_default(),
        Err(message) => {
            eprintln!("{}", message);
            return 1;
        }
    };

    let renderer = Renderer::new(config);
    let stdout = io::stdout();
    let mut sink = stdout.lock();

    let result = if partial {
        renderer.render_fragment(view, &locals, &mut sink)
    } else {
        let mut options = renderer.view_options().locals(locals);
        if let Some(layout) = layout {
            options.layout = layout;
        }
        renderer.render_view(view, options, &mut sink)
    };
    let _ = sink.flush();

    match result {
        Ok(()) => 0,
        Err(ViewError::Halted(halted)) => {
            eprintln!("Error: {}", halted);
            1
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn check(config: &ThemeConfig) -> i32 {
    let renderer = Renderer::new(config.clone());
    let views = config.views_path();
    let mut checked = 0;
    let mut failed = 0;

    for entry in WalkDir::new(&views).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(dialect) = Dialect::of_path(path) else {
            continue;
        };
        let source = match fs::read_to_string(path) {
            Ok(source) => source,
            Err(e) => {
                eprintln!("Error reading '{}': {}", path.display(), e);
                failed += 1;
                continue;
            }
        };
        checked += 1;

        // Compiled output goes through the native parser too
        let report = match renderer.compilers().get(dialect) {
            Some(compiler) => match compiler.compile(&source, path) {
                Ok(compiled) => {
                    parse_report(&compiled, &format!("{} (compiled)", path.display()))
                }
                Err(e) => Some(e.format(&source)),
            },
            None => parse_report(&source, &path.display().to_string()),
        };
        if let Some(report) = report {
            eprintln!("{}", report);
            failed += 1;
        }
    }

    println!("{} templates checked, {} with errors", checked, failed);
    if failed > 0 {
        1
    } else {
        0
    }
}

fn parse_report(source: &str, filename: &str) -> Option<String> {
    parser::parse(source).err().map(|errors| {
        errors
            .iter()
            .map(|e| e.format(source, filename))
            .collect::<Vec<_>>()
            .join("\n")
    })
}

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the mdview binary.
#[derive(Debug, Parser)]
#[command(
    name = "mdview",
    version,
    about = "Render Markdown to sanitised HTML with highlighting and math"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "MDVIEW_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: ViewerOverrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Render a Markdown file once.
    Render(RenderArgs),
    /// Re-render a Markdown file into a document whenever it changes.
    Watch(WatchArgs),
    /// List the available highlight styles.
    Themes,
}

#[derive(Debug, Args, Clone)]
pub struct RenderArgs {
    /// Markdown file to render; `-` reads standard input.
    #[arg(value_name = "INPUT", value_hint = ValueHint::FilePath)]
    pub input: PathBuf,

    /// Write a complete HTML document here instead of printing the body.
    #[arg(long, short = 'o', value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub output: Option<PathBuf>,
}

impl RenderArgs {
    pub fn reads_stdin(&self) -> bool {
        self.input.as_os_str() == "-"
    }
}

#[derive(Debug, Args, Clone)]
pub struct WatchArgs {
    /// Markdown file to watch.
    #[arg(value_name = "INPUT", value_hint = ValueHint::FilePath)]
    pub input: PathBuf,

    /// HTML document rewritten after every render.
    #[arg(long, short = 'o', value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub output: PathBuf,
}

/// Settings overrides accepted on every subcommand.
#[derive(Debug, Args, Default, Clone)]
pub struct ViewerOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,

    /// Override the quiet period before a debounced render fires.
    #[arg(long = "render-delay-ms", value_name = "MILLISECONDS", global = true)]
    pub render_delay_ms: Option<u64>,

    /// Toggle debounced rendering.
    #[arg(
        long = "delayed-rendering",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub delayed_rendering: Option<bool>,

    /// Override the math backend (katex|mathjax).
    #[arg(long = "math-renderer", value_name = "NAME", global = true)]
    pub math_renderer: Option<String>,

    /// Override the highlight style.
    #[arg(long = "highlight-style", value_name = "THEME", global = true)]
    pub highlight_style: Option<String>,

    /// Toggle HTML sanitisation.
    #[arg(
        long = "sanitize",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub sanitize: Option<bool>,

    /// Toggle lax heading parsing.
    #[arg(
        long = "lax-headers",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub lax_headers: Option<bool>,
}

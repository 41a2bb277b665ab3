//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, level_filters::LevelFilter};

use crate::{application::render::theme_names, domain::MathRenderer};

pub use cli::{CliArgs, Command, RenderArgs, ViewerOverrides, WatchArgs};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "mdview";
const ENV_PREFIX: &str = "MDVIEW";
const DEFAULT_RENDER_DELAY_MS: u64 = 200;
const DEFAULT_MATH_RENDERER: &str = "katex";
const DEFAULT_HIGHLIGHT_STYLE: &str = "base16-ocean.dark";
pub(crate) const DEFAULT_MATHJAX_URL: &str =
    "https://cdn.mathjax.org/mathjax/latest/MathJax.js?config=TeX-MML-AM_CHTML";
pub(crate) const DEFAULT_KATEX_STYLESHEET_URL: &str =
    "https://cdn.jsdelivr.net/npm/katex@0.16.11/dist/katex.min.css";

/// Fully-resolved viewer settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct ViewerSettings {
    pub logging: LoggingSettings,
    pub viewer: TimingSettings,
    pub markdown: MarkdownSettings,
    pub math: MathSettings,
    pub highlight: HighlightSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct TimingSettings {
    /// Debounce renders instead of rendering on every call.
    pub delayed_rendering: bool,
    pub render_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct MarkdownSettings {
    pub sanitize: bool,
    pub lax_headers: bool,
}

#[derive(Debug, Clone)]
pub struct MathSettings {
    /// `None` when the configured name is not a known backend.
    pub renderer: Option<MathRenderer>,
    pub mathjax_url: String,
    pub katex_stylesheet_url: String,
}

#[derive(Debug, Clone)]
pub struct HighlightSettings {
    pub style: String,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<ViewerSettings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    ViewerSettings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, ViewerSettings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self {
            logging: LoggingSettings {
                level: LevelFilter::INFO,
                format: LogFormat::Compact,
            },
            viewer: TimingSettings {
                delayed_rendering: true,
                render_delay: Duration::from_millis(DEFAULT_RENDER_DELAY_MS),
            },
            markdown: MarkdownSettings {
                sanitize: true,
                lax_headers: true,
            },
            math: MathSettings {
                renderer: Some(MathRenderer::Katex),
                mathjax_url: DEFAULT_MATHJAX_URL.to_string(),
                katex_stylesheet_url: DEFAULT_KATEX_STYLESHEET_URL.to_string(),
            },
            highlight: HighlightSettings {
                style: DEFAULT_HIGHLIGHT_STYLE.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    viewer: RawViewerSettings,
    markdown: RawMarkdownSettings,
    math: RawMathSettings,
    highlight: RawHighlightSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &ViewerOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(delay) = overrides.render_delay_ms {
            self.viewer.render_delay_ms = Some(delay);
        }
        if let Some(delayed) = overrides.delayed_rendering {
            self.viewer.delayed_rendering = Some(delayed);
        }
        if let Some(renderer) = overrides.math_renderer.as_ref() {
            self.math.renderer = Some(renderer.clone());
        }
        if let Some(style) = overrides.highlight_style.as_ref() {
            self.highlight.style = Some(style.clone());
        }
        if let Some(sanitize) = overrides.sanitize {
            self.markdown.sanitize = Some(sanitize);
        }
        if let Some(lax) = overrides.lax_headers {
            self.markdown.lax_headers = Some(lax);
        }
    }
}

impl ViewerSettings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            viewer,
            markdown,
            math,
            highlight,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            viewer: build_timing_settings(viewer),
            markdown: build_markdown_settings(markdown),
            math: build_math_settings(math)?,
            highlight: build_highlight_settings(highlight)?,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_timing_settings(viewer: RawViewerSettings) -> TimingSettings {
    let delay_ms = viewer.render_delay_ms.unwrap_or(DEFAULT_RENDER_DELAY_MS);

    TimingSettings {
        delayed_rendering: viewer.delayed_rendering.unwrap_or(true),
        render_delay: Duration::from_millis(delay_ms),
    }
}

fn build_markdown_settings(markdown: RawMarkdownSettings) -> MarkdownSettings {
    MarkdownSettings {
        sanitize: markdown.sanitize.unwrap_or(true),
        lax_headers: markdown.lax_headers.unwrap_or(true),
    }
}

fn build_math_settings(math: RawMathSettings) -> Result<MathSettings, LoadError> {
    let name = math
        .renderer
        .unwrap_or_else(|| DEFAULT_MATH_RENDERER.to_string());
    let renderer = MathRenderer::from_config(&name);
    if renderer.is_none() {
        debug!(
            target = "config",
            renderer = %name,
            "unknown math renderer; math notation disabled"
        );
    }

    let mathjax_url = non_empty(math.mathjax_url, DEFAULT_MATHJAX_URL, "math.mathjax_url")?;
    let katex_stylesheet_url = non_empty(
        math.katex_stylesheet_url,
        DEFAULT_KATEX_STYLESHEET_URL,
        "math.katex_stylesheet_url",
    )?;

    Ok(MathSettings {
        renderer,
        mathjax_url,
        katex_stylesheet_url,
    })
}

fn build_highlight_settings(
    highlight: RawHighlightSettings,
) -> Result<HighlightSettings, LoadError> {
    let style = highlight
        .style
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|| DEFAULT_HIGHLIGHT_STYLE.to_string());

    let available = theme_names();
    if !available.contains(&style.as_str()) {
        return Err(LoadError::invalid(
            "highlight.style",
            format!(
                "unknown theme `{style}`; available: {}",
                available.join(", ")
            ),
        ));
    }

    Ok(HighlightSettings { style })
}

fn non_empty(
    value: Option<String>,
    default: &str,
    key: &'static str,
) -> Result<String, LoadError> {
    match value {
        Some(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return Err(LoadError::invalid(key, "must not be empty"));
            }
            Ok(trimmed.to_string())
        }
        None => Ok(default.to_string()),
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawViewerSettings {
    delayed_rendering: Option<bool>,
    render_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawMarkdownSettings {
    sanitize: Option<bool>,
    lax_headers: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawMathSettings {
    renderer: Option<String>,
    mathjax_url: Option<String>,
    katex_stylesheet_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawHighlightSettings {
    style: Option<String>,
}

#[cfg(test)]
mod tests;

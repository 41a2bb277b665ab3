//! Markdown rendering.
//!
//! The engine is pure: Markdown in, HTML or a structured error out. The
//! pipeline owns timing and surface mutation on top of it: immediate or
//! debounced renders, engine failures degraded to escaped source, and the
//! optional typesetting pass once the math backend is ready.

pub mod engine;
mod pipeline;
mod runtime;
mod types;

pub use engine::{ComrakMarkdownEngine, EngineConfig, Highlighter, theme_names, theme_stylesheet};
pub use pipeline::{RenderPipeline, Viewer};
pub use runtime::PendingRender;
pub use types::{MarkdownEngine, RenderCallback, RenderError};

pub(crate) use pipeline::{METRIC_RENDER_SUPERSEDED_TOTAL, METRIC_RENDER_TOTAL};

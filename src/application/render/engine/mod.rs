mod balance;
mod headers;
mod highlight;
pub(crate) mod math;
mod options;
mod rewrite;

use comrak::{
    Arena, format_html,
    nodes::{AstNode, NodeValue},
    parse_document,
};
use tracing::{debug, warn};

use crate::{
    application::render::types::{MarkdownEngine, RenderError},
    config::ViewerSettings,
    domain::MathRenderer,
};

use balance::strip_unbalanced_tags;
use headers::relax_headings;
use options::{build_sanitizer, default_options};
use rewrite::rewrite_ast;

pub use highlight::{Highlighter, theme_names, theme_stylesheet};

/// Extensions installed on the Markdown engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Filter the rendered HTML through the allow-list sanitiser and drop
    /// unbalanced raw tags.
    pub sanitize: bool,
    /// Accept `#Title` as a heading.
    pub lax_headers: bool,
    /// Math backend; `None` leaves dollar signs as plain text.
    pub math: Option<MathRenderer>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sanitize: true,
            lax_headers: true,
            math: Some(MathRenderer::Katex),
        }
    }
}

impl From<&ViewerSettings> for EngineConfig {
    fn from(settings: &ViewerSettings) -> Self {
        Self {
            sanitize: settings.markdown.sanitize,
            lax_headers: settings.markdown.lax_headers,
            math: settings.math.renderer,
        }
    }
}

/// Comrak-based Markdown engine with Syntect highlighting, Ammonia
/// sanitisation and a pluggable math backend.
pub struct ComrakMarkdownEngine {
    options: comrak::Options<'static>,
    sanitizer: Option<ammonia::Builder<'static>>,
    highlighter: Highlighter,
    math: Option<MathRenderer>,
    lax_headers: bool,
}

impl ComrakMarkdownEngine {
    pub fn new(config: &EngineConfig) -> Self {
        if config.math.is_none() {
            debug!(
                target = "application::render::math",
                "no math renderer configured; math notation stays literal"
            );
        }

        Self {
            options: default_options(config.math),
            sanitizer: config.sanitize.then(build_sanitizer),
            highlighter: Highlighter::new(),
            math: config.math,
            lax_headers: config.lax_headers,
        }
    }
}

impl Default for ComrakMarkdownEngine {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl MarkdownEngine for ComrakMarkdownEngine {
    fn render(&self, markdown: &str) -> Result<String, RenderError> {
        let arena = Arena::new();
        let new_node = |value: NodeValue| &*arena.alloc(AstNode::from(value));
        let root = parse_document(&arena, markdown, &self.options);

        if self.lax_headers {
            relax_stage(root, markdown, &new_node);
        }

        if self.sanitizer.is_some() {
            balance_stage(root);
        }

        let rewrite_outcome = rewrite_ast(root, &self.highlighter, self.math, &new_node)?;
        let rendered_html = render_html_stage(root, &self.options)?;
        let sanitized_html = sanitize_stage(rendered_html, self.sanitizer.as_ref());

        Ok(restore_stage(sanitized_html, &rewrite_outcome))
    }
}

fn relax_stage<'a, F>(root: &'a AstNode<'a>, markdown: &str, new_node: &F)
where
    F: Fn(NodeValue) -> &'a AstNode<'a>,
{
    let created = relax_headings(root, markdown, new_node);
    if created > 0 {
        debug!(
            target = "application::render::headers",
            created, "Promoted unspaced hash lines to headings"
        );
    }
}

fn balance_stage<'a>(root: &'a AstNode<'a>) {
    let removed = strip_unbalanced_tags(root);
    if removed > 0 {
        warn!(
            target = "application::render::sanitize",
            removed, "Removed unbalanced HTML tags"
        );
    }
}

fn render_html_stage<'a>(
    root: &'a AstNode<'a>,
    options: &comrak::Options<'static>,
) -> Result<String, RenderError> {
    let mut html = String::new();
    format_html(root, options, &mut html).map_err(|err| RenderError::markdown(err.to_string()))?;
    Ok(html)
}

fn sanitize_stage(html: String, sanitizer: Option<&ammonia::Builder<'static>>) -> String {
    match sanitizer {
        Some(sanitizer) => sanitizer.clean(&html).to_string(),
        None => html,
    }
}

fn restore_stage(html: String, rewrite_outcome: &rewrite::RewriteOutcome) -> String {
    rewrite_outcome
        .math_fragments
        .iter()
        .fold(html, |acc, fragment| {
            if fragment.is_block {
                let placeholder = format!("<div>{}</div>", fragment.placeholder);
                acc.replacen(&placeholder, &fragment.html, 1)
            } else {
                acc.replacen(&fragment.placeholder, &fragment.html, 1)
            }
        })
}

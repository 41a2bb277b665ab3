//! In-process host document backing a viewer surface.

use std::{
    fmt::Write as _,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard, PoisonError},
};

use tracing::{debug, warn};

use crate::domain::ViewerSurface;

const BODY_CLASS: &str = "markdown-body";

/// Asset injected into the document head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadAsset {
    /// Stylesheet text embedded in a `<style>` element.
    InlineStyle(String),
    /// External script referenced by URL.
    ScriptSource(String),
}

/// HTML document owned by the host: head assets plus the viewer body.
///
/// When an output path is configured the complete document is rewritten
/// after every change.
pub struct HostDocument {
    title: String,
    output: Option<PathBuf>,
    state: Mutex<DocumentState>,
}

#[derive(Default)]
struct DocumentState {
    head: Vec<HeadAsset>,
    body: String,
}

impl HostDocument {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            output: None,
            state: Mutex::new(DocumentState::default()),
        }
    }

    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    pub fn output(&self) -> Option<&Path> {
        self.output.as_deref()
    }

    /// Embed a stylesheet in the head.
    pub fn inject_style(&self, css: &str) {
        // A literal `</` would end the style element early.
        let css = css.replace("</", "<\\/");
        self.update(|state| state.head.push(HeadAsset::InlineStyle(css)));
    }

    /// Reference an external script from the head. Repeated sources are
    /// ignored.
    pub fn inject_script(&self, src: &str) {
        self.update(|state| {
            let asset = HeadAsset::ScriptSource(src.to_string());
            if !state.head.contains(&asset) {
                state.head.push(asset);
            }
        });
    }

    pub fn head_assets(&self) -> Vec<HeadAsset> {
        self.lock().head.clone()
    }

    /// The complete HTML document.
    pub fn to_html(&self) -> String {
        render_document(&self.title, &self.lock())
    }

    /// Write the document to the configured output path, if any.
    pub fn persist(&self) {
        let state = self.lock();
        self.write_out(&state);
    }

    fn update(&self, change: impl FnOnce(&mut DocumentState)) {
        let mut state = self.lock();
        change(&mut state);
        self.write_out(&state);
    }

    fn write_out(&self, state: &DocumentState) {
        let Some(path) = self.output.as_ref() else {
            return;
        };

        let html = render_document(&self.title, state);
        match std::fs::write(path, html) {
            Ok(()) => debug!(
                target = "infra::document",
                path = %path.display(),
                "Wrote document"
            ),
            Err(err) => warn!(
                target = "infra::document",
                path = %path.display(),
                error = %err,
                "Failed to write document"
            ),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DocumentState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ViewerSurface for HostDocument {
    fn replace_content(&self, html: String) {
        self.update(|state| state.body = html);
    }

    fn content(&self) -> String {
        self.lock().body.clone()
    }

    fn replace_if_unchanged(&self, expected: &str, html: String) -> bool {
        let mut state = self.lock();
        if state.body != expected {
            return false;
        }
        state.body = html;
        self.write_out(&state);
        true
    }
}

fn render_document(title: &str, state: &DocumentState) -> String {
    let mut html = String::with_capacity(state.body.len() + 512);
    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    let _ = writeln!(html, "<title>{}</title>", ammonia::clean_text(title));

    for asset in &state.head {
        match asset {
            HeadAsset::InlineStyle(css) => {
                let _ = writeln!(html, "<style>\n{css}\n</style>");
            }
            HeadAsset::ScriptSource(src) => {
                let _ = writeln!(html, "<script src=\"{}\"></script>", ammonia::clean_text(src));
            }
        }
    }

    let _ = write!(
        html,
        "</head>\n<body>\n<article class=\"{BODY_CLASS}\">\n{}</article>\n</body>\n</html>\n",
        state.body
    );
    html
}

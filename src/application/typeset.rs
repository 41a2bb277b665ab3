//! Deferred math typesetting.
//!
//! When the asynchronous math backend is active the engine leaves delimited
//! TeX inside marker elements. Once the backend script has loaded, every
//! render queues its surface here and a worker replaces the markers with
//! rendered math.

use std::{
    cell::{Cell, RefCell},
    rc::Rc,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use lol_html::{RewriteStrSettings, element, html_content::ContentType, rewrite_str, text};
use metrics::counter;
use tokio::{
    runtime::Handle,
    sync::{mpsc, oneshot},
};
use tracing::{debug, info, warn};

use crate::{
    application::render::{RenderError, engine::math},
    domain::ViewerSurface,
    infra::loader::ResourceLoader,
};

pub(crate) const METRIC_TYPESET_TOTAL: &str = "mdview_typeset_total";

const MARKER_SELECTOR: &str = "span.math-inline, div.math-display";
const INLINE_DONE_CLASS: &str = "math math-inline-typeset";
const DISPLAY_DONE_CLASS: &str = "math math-display-typeset";

/// Post-render pass over a surface.
pub trait Typesetter: Send + Sync {
    /// Whether the backend has finished loading.
    fn ready(&self) -> bool;

    /// Typeset the math found in `scope`. Must not block the caller.
    fn typeset(&self, scope: Arc<dyn ViewerSurface>);
}

/// One-way flag raised once the math backend script has loaded.
#[derive(Debug, Clone, Default)]
pub struct ReadinessFlag(Arc<AtomicBool>);

impl ReadinessFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Raise the flag. Returns `true` only for the call that flipped it.
    pub fn mark_ready(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }
}

enum Job {
    Typeset(Arc<dyn ViewerSurface>),
    Flush(oneshot::Sender<()>),
}

/// Typesetter backed by a tokio worker draining a queue of surfaces.
pub struct QueuedTypesetter {
    queue: mpsc::UnboundedSender<Job>,
    readiness: ReadinessFlag,
}

impl QueuedTypesetter {
    pub fn spawn(runtime: &Handle) -> Self {
        let (queue, receiver) = mpsc::unbounded_channel();
        runtime.spawn(run_worker(receiver));
        Self {
            queue,
            readiness: ReadinessFlag::new(),
        }
    }

    pub fn readiness(&self) -> ReadinessFlag {
        self.readiness.clone()
    }

    /// Load the backend script and raise the readiness flag once it arrives.
    /// A failed load leaves the flag down for the rest of the process.
    pub fn load(&self, loader: &dyn ResourceLoader, url: &str) {
        let readiness = self.readiness.clone();
        let url_owned = url.to_string();
        loader.load_script(
            url,
            Box::new(move || {
                if readiness.mark_ready() {
                    info!(
                        target = "application::typeset",
                        url = %url_owned,
                        "Math backend ready"
                    );
                }
            }),
        );
    }

    /// Wait until every pass queued so far has finished.
    pub async fn flush(&self) {
        let (done, finished) = oneshot::channel();
        if self.queue.send(Job::Flush(done)).is_ok() {
            let _ = finished.await;
        }
    }
}

impl Typesetter for QueuedTypesetter {
    fn ready(&self) -> bool {
        self.readiness.is_ready()
    }

    fn typeset(&self, scope: Arc<dyn ViewerSurface>) {
        if self.queue.send(Job::Typeset(scope)).is_err() {
            warn!(
                target = "application::typeset",
                "Typesetting worker stopped; skipping pass"
            );
        }
    }
}

async fn run_worker(mut receiver: mpsc::UnboundedReceiver<Job>) {
    while let Some(job) = receiver.recv().await {
        match job {
            Job::Typeset(scope) => typeset_scope(scope).await,
            Job::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!(target = "application::typeset", "Typesetting queue closed");
}

async fn typeset_scope(scope: Arc<dyn ViewerSurface>) {
    let snapshot = scope.content();
    let source = snapshot.clone();

    let outcome = match tokio::task::spawn_blocking(move || typeset_html(&source)).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(err)) => {
            warn!(
                target = "application::typeset",
                error = %err,
                "Typesetting pass failed"
            );
            return;
        }
        Err(err) => {
            warn!(
                target = "application::typeset",
                error = %err,
                "Typesetting task aborted"
            );
            return;
        }
    };

    if outcome.expressions == 0 {
        return;
    }

    if scope.replace_if_unchanged(&snapshot, outcome.html) {
        counter!(METRIC_TYPESET_TOTAL).increment(1);
        debug!(
            target = "application::typeset",
            expressions = outcome.expressions,
            "Typeset surface"
        );
    } else {
        debug!(
            target = "application::typeset",
            "Surface changed while typesetting; discarding result"
        );
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypesetOutcome {
    pub html: String,
    /// Number of expressions replaced with rendered math.
    pub expressions: usize,
}

/// Replace delimited TeX inside math marker elements with KaTeX markup.
///
/// Markers are renamed once visited so a second pass over the same HTML is a
/// no-op. Text that is not wrapped in `\(..\)` or `\[..\]` is left alone, as
/// are expressions KaTeX rejects.
pub fn typeset_html(html: &str) -> Result<TypesetOutcome, RenderError> {
    let buffer = Rc::new(RefCell::new(String::new()));
    let expressions = Rc::new(Cell::new(0usize));

    let rewritten = rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!(MARKER_SELECTOR, |el| {
                    let done = if el.tag_name() == "span" {
                        INLINE_DONE_CLASS
                    } else {
                        DISPLAY_DONE_CLASS
                    };
                    el.set_attribute("class", done)?;
                    Ok(())
                }),
                text!(MARKER_SELECTOR, {
                    let buffer = Rc::clone(&buffer);
                    let expressions = Rc::clone(&expressions);
                    move |chunk| {
                        buffer.borrow_mut().push_str(chunk.as_str());
                        if !chunk.last_in_text_node() {
                            chunk.remove();
                            return Ok(());
                        }

                        let source = std::mem::take(&mut *buffer.borrow_mut());
                        match typeset_expression(&source) {
                            Some(Ok(rendered)) => {
                                expressions.set(expressions.get() + 1);
                                chunk.replace(&rendered, ContentType::Html);
                            }
                            Some(Err(err)) => {
                                warn!(
                                    target = "application::typeset",
                                    error = %err,
                                    "Math expression rejected; keeping source"
                                );
                                chunk.replace(&source, ContentType::Html);
                            }
                            None => chunk.replace(&source, ContentType::Html),
                        }
                        Ok(())
                    }
                }),
            ],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|err| RenderError::document(err.to_string()))?;

    Ok(TypesetOutcome {
        html: rewritten,
        expressions: expressions.get(),
    })
}

fn typeset_expression(raw: &str) -> Option<Result<String, RenderError>> {
    let decoded = html_escape::decode_html_entities(raw);
    let trimmed = decoded.trim();

    let (tex, display) = if let Some(inner) = delimited(trimmed, "\\(", "\\)") {
        (inner, false)
    } else if let Some(inner) = delimited(trimmed, "\\[", "\\]") {
        (inner, true)
    } else {
        return None;
    };

    Some(math::render_math_html(tex, display))
}

fn delimited<'a>(value: &'a str, open: &str, close: &str) -> Option<&'a str> {
    value.strip_prefix(open)?.strip_suffix(close)
}

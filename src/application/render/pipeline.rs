use std::{sync::Arc, time::Duration};

use metrics::counter;
use tokio::runtime::Handle;
use tracing::{debug, error};

use crate::{
    application::typeset::Typesetter,
    domain::{RenderState, ViewerSurface},
};

use super::{
    runtime::PendingRender,
    types::{MarkdownEngine, RenderCallback},
};

pub(crate) const METRIC_RENDER_TOTAL: &str = "mdview_render_total";
pub(crate) const METRIC_RENDER_SUPERSEDED_TOTAL: &str = "mdview_render_superseded_total";

/// Shared render configuration. One pipeline serves any number of viewers;
/// each attached viewer owns its own pending-render slot.
pub struct RenderPipeline {
    engine: Arc<dyn MarkdownEngine>,
    typesetter: Option<Arc<dyn Typesetter>>,
    delayed_rendering: bool,
    render_delay: Duration,
    runtime: Handle,
}

impl RenderPipeline {
    pub fn new(
        engine: Arc<dyn MarkdownEngine>,
        delayed_rendering: bool,
        render_delay: Duration,
        runtime: Handle,
    ) -> Self {
        Self {
            engine,
            typesetter: None,
            delayed_rendering,
            render_delay,
            runtime,
        }
    }

    /// Install the deferred math pass run after each content replacement.
    pub fn with_typesetter(mut self, typesetter: Arc<dyn Typesetter>) -> Self {
        self.typesetter = Some(typesetter);
        self
    }

    /// Bind the pipeline to a host-owned surface.
    pub fn attach(self: &Arc<Self>, surface: Arc<dyn ViewerSurface>) -> Viewer {
        Viewer {
            pipeline: Arc::clone(self),
            surface,
            pending: PendingRender::new(),
        }
    }

    fn render_into(
        &self,
        surface: &Arc<dyn ViewerSurface>,
        markdown: Option<&str>,
        on_done: Option<RenderCallback>,
    ) {
        let markdown = markdown.unwrap_or_default();
        let html = match self.engine.render(markdown) {
            Ok(html) => html,
            Err(err) => {
                error!(
                    target = "application::render::pipeline",
                    error = %err,
                    "Markdown rendering failed; showing source"
                );
                format!("<pre>{}</pre>", ammonia::clean_text(markdown))
            }
        };

        surface.replace_content(html);
        counter!(METRIC_RENDER_TOTAL).increment(1);

        if let Some(typesetter) = &self.typesetter {
            if typesetter.ready() {
                typesetter.typeset(Arc::clone(surface));
            } else {
                debug!(
                    target = "application::render::pipeline",
                    "Math backend not ready; skipping typesetting"
                );
            }
        }

        if let Some(on_done) = on_done {
            on_done();
        }
    }
}

/// Render entry point bound to a single surface.
#[derive(Clone)]
pub struct Viewer {
    pipeline: Arc<RenderPipeline>,
    surface: Arc<dyn ViewerSurface>,
    pending: PendingRender,
}

impl Viewer {
    /// Render using the mode the pipeline was configured with.
    pub fn render(&self, markdown: Option<&str>, on_done: Option<RenderCallback>) {
        if self.pipeline.delayed_rendering {
            self.render_debounced(markdown, on_done);
        } else {
            self.render_now(markdown, on_done);
        }
    }

    /// Convert and replace the surface content synchronously, dropping any
    /// debounced render still waiting. Absent input renders as empty content.
    pub fn render_now(&self, markdown: Option<&str>, on_done: Option<RenderCallback>) {
        if self.pending.cancel() {
            counter!(METRIC_RENDER_SUPERSEDED_TOTAL).increment(1);
        }
        self.pipeline.render_into(&self.surface, markdown, on_done);
    }

    /// Schedule a render after the configured delay, replacing any render
    /// still waiting. A replaced render never runs, nor does its callback.
    pub fn render_debounced(&self, markdown: Option<&str>, on_done: Option<RenderCallback>) {
        let markdown = markdown.map(str::to_owned);
        let pipeline = Arc::clone(&self.pipeline);
        let surface = Arc::clone(&self.surface);

        let superseded = self.pending.schedule(
            &self.pipeline.runtime,
            self.pipeline.render_delay,
            move || pipeline.render_into(&surface, markdown.as_deref(), on_done),
        );

        if superseded {
            counter!(METRIC_RENDER_SUPERSEDED_TOTAL).increment(1);
            debug!(
                target = "application::render::pipeline",
                "Superseded pending render"
            );
        }
    }

    pub fn state(&self) -> RenderState {
        if self.pending.is_pending() {
            RenderState::Pending
        } else {
            RenderState::Idle
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    };

    use super::*;
    use crate::application::render::types::RenderError;

    #[derive(Default)]
    struct RecordingSurface {
        content: Mutex<String>,
        writes: AtomicUsize,
    }

    impl ViewerSurface for RecordingSurface {
        fn replace_content(&self, html: String) {
            self.writes.fetch_add(1, Ordering::SeqCst);
            *self.content.lock().unwrap() = html;
        }

        fn content(&self) -> String {
            self.content.lock().unwrap().clone()
        }

        fn replace_if_unchanged(&self, expected: &str, html: String) -> bool {
            let mut content = self.content.lock().unwrap();
            if *content != expected {
                return false;
            }
            *content = html;
            true
        }
    }

    /// Wraps the input in a paragraph and counts conversions.
    #[derive(Default)]
    struct EchoEngine {
        calls: AtomicUsize,
    }

    impl MarkdownEngine for EchoEngine {
        fn render(&self, markdown: &str) -> Result<String, RenderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if markdown.is_empty() {
                return Ok(String::new());
            }
            Ok(format!("<p>{markdown}</p>"))
        }
    }

    struct FailingEngine;

    impl MarkdownEngine for FailingEngine {
        fn render(&self, _markdown: &str) -> Result<String, RenderError> {
            Err(RenderError::markdown("formatter exploded"))
        }
    }

    struct StubTypesetter {
        ready: AtomicBool,
        passes: AtomicUsize,
    }

    impl StubTypesetter {
        fn new(ready: bool) -> Self {
            Self {
                ready: AtomicBool::new(ready),
                passes: AtomicUsize::new(0),
            }
        }
    }

    impl Typesetter for StubTypesetter {
        fn ready(&self) -> bool {
            self.ready.load(Ordering::SeqCst)
        }

        fn typeset(&self, _scope: Arc<dyn ViewerSurface>) {
            self.passes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn pipeline(engine: Arc<dyn MarkdownEngine>, delayed: bool) -> Arc<RenderPipeline> {
        Arc::new(RenderPipeline::new(
            engine,
            delayed,
            Duration::from_millis(200),
            Handle::current(),
        ))
    }

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, label: &'static str) -> RenderCallback {
        let log = Arc::clone(log);
        Box::new(move || log.lock().unwrap().push(label))
    }

    #[tokio::test]
    async fn render_now_replaces_content_and_calls_back() {
        let surface = Arc::new(RecordingSurface::default());
        let viewer = pipeline(Arc::new(EchoEngine::default()), false).attach(surface.clone());
        let log = Arc::new(Mutex::new(Vec::new()));

        viewer.render_now(Some("hello"), Some(recorder(&log, "done")));

        assert_eq!(surface.content(), "<p>hello</p>");
        assert_eq!(*log.lock().unwrap(), vec!["done"]);
        assert_eq!(viewer.state(), RenderState::Idle);
    }

    #[tokio::test]
    async fn absent_input_renders_empty() {
        let surface = Arc::new(RecordingSurface::default());
        surface.replace_content("stale".to_string());
        let viewer = pipeline(Arc::new(EchoEngine::default()), false).attach(surface.clone());

        viewer.render_now(None, None);

        assert_eq!(surface.content(), "");
    }

    #[tokio::test]
    async fn engine_failure_shows_escaped_source() {
        let surface = Arc::new(RecordingSurface::default());
        let viewer = pipeline(Arc::new(FailingEngine), false).attach(surface.clone());

        viewer.render_now(Some("<b>x</b>"), None);

        assert_eq!(surface.content(), "<pre>&lt;b&gt;x&lt;&#47;b&gt;</pre>");
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_debounced_calls_renders_last_input_once() {
        let engine = Arc::new(EchoEngine::default());
        let surface = Arc::new(RecordingSurface::default());
        let viewer = pipeline(engine.clone(), true).attach(surface.clone());
        let log = Arc::new(Mutex::new(Vec::new()));

        viewer.render(Some("a"), Some(recorder(&log, "a")));
        tokio::time::sleep(Duration::from_millis(50)).await;
        viewer.render(Some("b"), Some(recorder(&log, "b")));
        tokio::time::sleep(Duration::from_millis(50)).await;
        viewer.render(Some("c"), Some(recorder(&log, "c")));
        assert_eq!(viewer.state(), RenderState::Pending);
        assert_eq!(surface.writes.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(250)).await;

        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
        assert_eq!(surface.writes.load(Ordering::SeqCst), 1);
        assert_eq!(surface.content(), "<p>c</p>");
        assert_eq!(*log.lock().unwrap(), vec!["c"]);
        assert_eq!(viewer.state(), RenderState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn render_now_drops_waiting_debounced_render() {
        let surface = Arc::new(RecordingSurface::default());
        let viewer = pipeline(Arc::new(EchoEngine::default()), true).attach(surface.clone());
        let log = Arc::new(Mutex::new(Vec::new()));

        viewer.render_debounced(Some("old"), Some(recorder(&log, "old")));
        assert_eq!(viewer.state(), RenderState::Pending);

        viewer.render_now(Some("new"), Some(recorder(&log, "new")));
        assert_eq!(viewer.state(), RenderState::Idle);

        tokio::time::sleep(Duration::from_millis(250)).await;

        assert_eq!(surface.content(), "<p>new</p>");
        assert_eq!(surface.writes.load(Ordering::SeqCst), 1);
        assert_eq!(*log.lock().unwrap(), vec!["new"]);
    }

    #[tokio::test(start_paused = true)]
    async fn spaced_debounced_calls_render_twice() {
        let surface = Arc::new(RecordingSurface::default());
        let viewer = pipeline(Arc::new(EchoEngine::default()), true).attach(surface.clone());
        let log = Arc::new(Mutex::new(Vec::new()));

        viewer.render(Some("first"), Some(recorder(&log, "first")));
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(surface.content(), "<p>first</p>");

        viewer.render(Some("second"), Some(recorder(&log, "second")));
        tokio::time::sleep(Duration::from_millis(250)).await;

        assert_eq!(surface.content(), "<p>second</p>");
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn typesetting_runs_only_when_ready() {
        let surface = Arc::new(RecordingSurface::default());
        let typesetter = Arc::new(StubTypesetter::new(false));
        let pipeline = Arc::new(
            RenderPipeline::new(
                Arc::new(EchoEngine::default()),
                false,
                Duration::ZERO,
                Handle::current(),
            )
            .with_typesetter(typesetter.clone()),
        );
        let viewer = pipeline.attach(surface.clone());

        viewer.render(Some("$x$"), None);
        assert_eq!(typesetter.passes.load(Ordering::SeqCst), 0);

        typesetter.ready.store(true, Ordering::SeqCst);
        viewer.render(Some("$x$"), None);
        assert_eq!(typesetter.passes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn viewers_debounce_independently() {
        let pipeline = pipeline(Arc::new(EchoEngine::default()), true);
        let left = Arc::new(RecordingSurface::default());
        let right = Arc::new(RecordingSurface::default());
        let left_viewer = pipeline.attach(left.clone());
        let right_viewer = pipeline.attach(right.clone());

        left_viewer.render(Some("left"), None);
        right_viewer.render(Some("right"), None);
        tokio::time::sleep(Duration::from_millis(250)).await;

        assert_eq!(left.content(), "<p>left</p>");
        assert_eq!(right.content(), "<p>right</p>");
    }
}

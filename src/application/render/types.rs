use thiserror::Error;

/// Completion callback invoked after a render has replaced the surface content.
pub type RenderCallback = Box<dyn FnOnce() + Send + 'static>;

/// Structured errors surfaced by the rendering stages. None of them reach the
/// caller of a viewer: the pipeline degrades output instead.
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    #[error("markdown rendering failed: {message}")]
    Markdown { message: String },
    #[error("syntax highlighting failed: {language}: {message}")]
    Highlighting { language: String, message: String },
    #[error("math rendering failed: {message}")]
    Math { message: String },
    #[error("document processing failed: {message}")]
    Document { message: String },
}

impl RenderError {
    pub fn markdown(message: impl Into<String>) -> Self {
        Self::Markdown {
            message: message.into(),
        }
    }

    pub fn math(message: impl Into<String>) -> Self {
        Self::Math {
            message: message.into(),
        }
    }

    pub fn document(message: impl Into<String>) -> Self {
        Self::Document {
            message: message.into(),
        }
    }
}

/// Text-to-HTML converter used by the render pipeline. Implementations must be
/// pure and deterministic: the same input yields the same output or error.
pub trait MarkdownEngine: Send + Sync {
    fn render(&self, markdown: &str) -> Result<String, RenderError>;
}

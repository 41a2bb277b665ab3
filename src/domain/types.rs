//! Shared domain enumerations resolved from configuration.

use std::fmt;

/// Math notation backend. Exactly one is active per process; an unrecognised
/// configuration value resolves to no backend at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathRenderer {
    /// Converts math to markup synchronously while the Markdown is rendered.
    Katex,
    /// Leaves delimited TeX in the output for a post-render typesetting pass.
    MathJax,
}

impl MathRenderer {
    /// Resolve a configured renderer name, case-insensitively.
    ///
    /// Returns `None` for unknown names; callers treat that as "no math
    /// extension" rather than a configuration failure.
    pub fn from_config(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "katex" => Some(Self::Katex),
            "mathjax" => Some(Self::MathJax),
            _ => None,
        }
    }

    /// Whether the backend needs a typesetting pass after content replacement.
    pub fn is_deferred(self) -> bool {
        matches!(self, Self::MathJax)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Katex => "katex",
            Self::MathJax => "mathjax",
        }
    }
}

impl fmt::Display for MathRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a single viewer instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    /// No render is scheduled.
    Idle,
    /// A debounced render is scheduled but has not fired yet.
    Pending,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renderer_names_are_case_insensitive() {
        assert_eq!(MathRenderer::from_config("KaTex"), Some(MathRenderer::Katex));
        assert_eq!(MathRenderer::from_config(" mathjax "), Some(MathRenderer::MathJax));
    }

    #[test]
    fn unknown_renderer_resolves_to_none() {
        assert_eq!(MathRenderer::from_config("asciimath"), None);
        assert_eq!(MathRenderer::from_config(""), None);
    }

    #[test]
    fn only_mathjax_is_deferred() {
        assert!(MathRenderer::MathJax.is_deferred());
        assert!(!MathRenderer::Katex.is_deferred());
    }
}

use katex::{OptsBuilder, OutputType};

use crate::application::render::types::RenderError;

/// Render a KaTeX expression to HTML, returning an inline or display fragment.
pub(crate) fn render_math_html(literal: &str, display_mode: bool) -> Result<String, RenderError> {
    let mut builder = OptsBuilder::default();
    builder.display_mode(display_mode);
    builder.output_type(OutputType::Html);

    let opts = builder
        .build()
        .map_err(|err| RenderError::math(format!("failed to build KaTeX options: {err}")))?;

    katex::render_with_opts(literal, opts)
        .map_err(|err| RenderError::math(format!("KaTeX rendering failed: {err}")))
}

/// Delimited TeX left in place for the deferred typesetting pass.
pub(crate) fn passthrough_math_html(literal: &str, display_mode: bool) -> String {
    let escaped = ammonia::clean_text(literal);
    if display_mode {
        format!("<div class=\"{DISPLAY_MARKER_CLASS}\">\\[{escaped}\\]</div>")
    } else {
        format!("<span class=\"{INLINE_MARKER_CLASS}\">\\({escaped}\\)</span>")
    }
}

pub(crate) const INLINE_MARKER_CLASS: &str = "math math-inline";
pub(crate) const DISPLAY_MARKER_CLASS: &str = "math math-display";

use once_cell::sync::Lazy;
use syntect::{
    dumps::from_uncompressed_data,
    highlighting::ThemeSet,
    html::{ClassStyle, ClassedHTMLGenerator, css_for_theme_with_class_style},
    parsing::{SyntaxReference, SyntaxSet},
    util::LinesWithEndings,
};
use tracing::warn;

use crate::application::render::types::RenderError;

static SYNTAX_SET: Lazy<SyntaxSet> = Lazy::new(|| {
    let syntax_bytes = include_bytes!(env!("SYNTAX_PACK_FILE"));
    from_uncompressed_data(syntax_bytes).expect("syntax pack must be valid")
});

static THEME_SET: Lazy<ThemeSet> = Lazy::new(ThemeSet::load_defaults);

const CLASS_STYLE: ClassStyle = ClassStyle::SpacedPrefixed { prefix: "hljs-" };

/// Code-block adapter: decorates fenced code with class-annotated spans and
/// never fails past its boundary.
#[derive(Clone, Copy)]
pub struct Highlighter {
    syntax_set: &'static SyntaxSet,
    class_style: ClassStyle,
}

impl Default for Highlighter {
    fn default() -> Self {
        Self::new()
    }
}

impl Highlighter {
    pub fn new() -> Self {
        Self {
            syntax_set: &SYNTAX_SET,
            class_style: CLASS_STYLE,
        }
    }

    /// Render `code` as a `<pre class='hljs'>` fragment. Unknown or missing
    /// language hints, and highlighter failures, produce escaped plain text.
    pub fn highlight(&self, code: &str, language: Option<&str>) -> String {
        let language = language.map(str::trim).filter(|lang| !lang.is_empty());
        let attempt = language.and_then(|lang| {
            find_syntax(self.syntax_set, lang).map(|syntax| self.highlight_with(syntax, lang, code))
        });
        finish(code, attempt)
    }

    fn highlight_with(
        &self,
        syntax: &SyntaxReference,
        language: &str,
        code: &str,
    ) -> Result<String, RenderError> {
        let mut generator =
            ClassedHTMLGenerator::new_with_class_style(syntax, self.syntax_set, self.class_style);

        for line in LinesWithEndings::from(code) {
            generator
                .parse_html_for_line_which_includes_newline(line)
                .map_err(|err| RenderError::Highlighting {
                    language: language.to_string(),
                    message: err.to_string(),
                })?;
        }

        Ok(generator.finalize())
    }
}

/// CSS for the named syntect theme, matching the classes emitted by
/// [`Highlighter`].
pub fn theme_stylesheet(theme_name: &str) -> Result<String, RenderError> {
    let theme = THEME_SET
        .themes
        .get(theme_name)
        .ok_or_else(|| RenderError::document(format!("unknown highlight style `{theme_name}`")))?;

    let css = css_for_theme_with_class_style(theme, CLASS_STYLE)
        .map_err(|err| RenderError::document(format!("failed to build theme css: {err}")))?;

    Ok(format!(".hljs {{ overflow-x: auto; }}\n{css}"))
}

/// Names of the bundled highlight styles.
pub fn theme_names() -> Vec<&'static str> {
    THEME_SET.themes.keys().map(String::as_str).collect()
}

fn finish(code: &str, attempt: Option<Result<String, RenderError>>) -> String {
    match attempt {
        Some(Ok(highlighted)) => wrap_code(&highlighted),
        Some(Err(err)) => {
            warn!(
                target = "application::render::highlight",
                error = %err,
                "Couldn't highlight code block; rendering as plain text"
            );
            wrap_code(&ammonia::clean_text(code))
        }
        None => wrap_code(&ammonia::clean_text(code)),
    }
}

fn wrap_code(inner: &str) -> String {
    format!("<pre class='hljs'><code>{inner}</code></pre>")
}

fn find_syntax<'a>(syntax_set: &'a SyntaxSet, token: &str) -> Option<&'a SyntaxReference> {
    let lowercase = token.to_ascii_lowercase();
    syntax_set
        .find_syntax_by_token(&lowercase)
        .or_else(|| syntax_set.find_syntax_by_name(token))
        .or_else(|| syntax_set.find_syntax_by_extension(&lowercase))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognised_language_is_highlighted() {
        let html = Highlighter::new().highlight("const a = 1;\n", Some("js"));

        assert!(html.starts_with("<pre class='hljs'><code>"));
        assert!(html.ends_with("</code></pre>"));
        assert!(html.contains("<span class=\"hljs-"));
    }

    #[test]
    fn unknown_language_is_escaped_plain_text() {
        let html = Highlighter::new().highlight("<b>foo</b>\n", Some("nonexistentlang"));

        assert_eq!(
            html,
            "<pre class='hljs'><code>&lt;b&gt;foo&lt;&#47;b&gt;&#10;</code></pre>"
        );
    }

    #[test]
    fn missing_language_is_escaped_plain_text() {
        let html = Highlighter::new().highlight("a & b\n", None);
        assert_eq!(
            html,
            "<pre class='hljs'><code>a&#32;&amp;&#32;b&#10;</code></pre>"
        );

        let blank = Highlighter::new().highlight("x\n", Some("   "));
        assert_eq!(blank, "<pre class='hljs'><code>x&#10;</code></pre>");
    }

    #[test]
    fn highlighter_failure_degrades_to_escaped_text() {
        let failure = Err(RenderError::Highlighting {
            language: "js".to_string(),
            message: "regex compilation failed".to_string(),
        });

        let html = finish("if (a < b) {}\n", Some(failure));

        assert_eq!(
            html,
            "<pre class='hljs'><code>if&#32;(a&#32;&lt;&#32;b)&#32;{}&#10;</code></pre>"
        );
    }

    #[test]
    fn language_lookup_is_case_insensitive() {
        let highlighter = Highlighter::new();
        for hint in ["Rust", "rs", "RUST"] {
            let html = highlighter.highlight("fn main() {}\n", Some(hint));
            assert!(html.contains("<span class=\"hljs-"), "{hint} not highlighted");
        }
    }

    #[test]
    fn theme_stylesheet_uses_highlight_prefix() {
        let css = theme_stylesheet("base16-ocean.dark").expect("bundled theme");
        assert!(css.contains(".hljs-"));
        assert!(theme_stylesheet("monokai-does-not-exist").is_err());
    }
}

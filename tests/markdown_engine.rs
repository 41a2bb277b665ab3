use mdview::{
    application::render::{ComrakMarkdownEngine, EngineConfig, Highlighter, MarkdownEngine},
    domain::MathRenderer,
};

fn load_markdown() -> &'static str {
    include_str!("fixtures/viewer_features.md")
}

fn engine(math: Option<MathRenderer>) -> ComrakMarkdownEngine {
    ComrakMarkdownEngine::new(&EngineConfig {
        sanitize: true,
        lax_headers: true,
        math,
    })
}

#[test]
fn fixture_renders_lax_heading_and_paragraph() {
    let html = engine(None).render(load_markdown()).expect("render succeeds");

    assert!(html.starts_with("<h1>Lax Heading</h1>\n<p>Paragraph right after the heading.</p>"));
}

#[test]
fn fixture_highlights_known_languages_only() {
    let html = engine(None).render(load_markdown()).expect("render succeeds");

    assert!(html.contains("<pre class=\"hljs\"><code>"));
    assert!(html.contains("hljs-"));
    assert!(html.contains("&lt;not&gt; &amp; highlighted"));
    assert!(html.contains("<pre><code>indented code stays plain\n</code></pre>"));
}

#[test]
fn fixture_sanitizes_raw_html() {
    let html = engine(None).render(load_markdown()).expect("render succeeds");

    assert!(!html.contains("<img"));
    assert!(!html.contains("<script"));
    assert!(!html.contains("alert("));
    assert!(!html.contains("<marquee"));
    assert!(html.contains("unknown"));
    assert!(html.contains("<b>bold</b>"));
    assert!(html.contains("<span class=\"note\">kept</span>"));
    assert!(html.contains("<p>never closed</p>"));
}

#[test]
fn unmatched_tag_does_not_wrap_following_blocks() {
    let html = engine(None)
        .render("<div>\n\nfirst\n\nsecond")
        .expect("render succeeds");

    assert!(!html.contains("<div>"));
    assert!(html.contains("<p>first</p>\n<p>second</p>"));
}

#[test]
fn fixture_keeps_gfm_extensions() {
    let html = engine(None).render(load_markdown()).expect("render succeeds");

    assert!(html.contains("<table>"));
    assert!(html.contains("<td>one</td>"));
    assert!(html.contains("type=\"checkbox\""));
}

#[test]
fn fixture_renders_math_with_katex() {
    let html = engine(Some(MathRenderer::Katex))
        .render(load_markdown())
        .expect("render succeeds");

    assert!(html.contains("class=\"katex\""));
    assert!(html.contains("katex-display"));
    assert!(!html.contains("__KATEX_PLACEHOLDER_"));
}

#[test]
fn fixture_leaves_markers_for_mathjax() {
    let html = engine(Some(MathRenderer::MathJax))
        .render(load_markdown())
        .expect("render succeeds");

    assert!(html.contains("<span class=\"math math-inline\">\\(a^2 + b^2 = c^2\\)</span>"));
    assert!(html.contains("<div class=\"math math-display\">\\[\\int_0^1 x\\,dx\\]</div>"));
    assert!(!html.contains("class=\"katex\""));
}

#[test]
fn fixture_without_math_keeps_dollars() {
    let html = engine(None).render(load_markdown()).expect("render succeeds");

    assert!(html.contains("$a^2 + b^2 = c^2$"));
}

#[test]
fn highlighter_wraps_and_escapes() {
    let highlighter = Highlighter::new();

    let known = highlighter.highlight("let x = 1;", Some("js"));
    assert!(known.starts_with("<pre class='hljs'><code>"));
    assert!(known.contains("hljs-"));

    let unknown = highlighter.highlight("a < b", Some("nonexistentlang"));
    assert_eq!(unknown, "<pre class='hljs'><code>a&#32;&lt;&#32;b</code></pre>");

    let bare = highlighter.highlight("x & y", None);
    assert_eq!(bare, "<pre class='hljs'><code>x&#32;&amp;&#32;y</code></pre>");
}

#[test]
fn empty_document_renders_empty() {
    assert_eq!(engine(Some(MathRenderer::Katex)).render("").expect("render"), "");
}

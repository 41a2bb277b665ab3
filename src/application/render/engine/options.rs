use std::collections::HashSet;

use ammonia::Builder as AmmoniaBuilder;
use comrak::options::Options;

use crate::domain::MathRenderer;

pub(crate) fn default_options(math: Option<MathRenderer>) -> Options<'static> {
    let mut options = Options::default();
    configure_extensions(&mut options, math);
    options
}

/// Conservative allow-list: anything not listed is stripped (its text is kept),
/// and `img` is deliberately absent so images render as nothing.
pub(crate) fn build_sanitizer() -> AmmoniaBuilder<'static> {
    let mut builder = AmmoniaBuilder::default();

    let tags: HashSet<&'static str> = HashSet::from([
        "a",
        "abbr",
        "b",
        "blockquote",
        "br",
        "code",
        "dd",
        "del",
        "div",
        "dl",
        "dt",
        "em",
        "h1",
        "h2",
        "h3",
        "h4",
        "h5",
        "h6",
        "hr",
        "i",
        "input",
        "ins",
        "kbd",
        "li",
        "ol",
        "p",
        "pre",
        "s",
        "section",
        "span",
        "strong",
        "sub",
        "sup",
        "table",
        "tbody",
        "td",
        "th",
        "thead",
        "tr",
        "u",
        "ul",
    ]);
    builder.tags(tags);

    let generic: HashSet<&'static str> =
        HashSet::from(["class", "id", "title", "lang", "dir", "aria-hidden"]);
    builder.generic_attributes(generic);

    builder.add_tag_attributes("th", &["align", "colspan", "rowspan", "scope"]);
    builder.add_tag_attributes("td", &["align", "colspan", "rowspan"]);
    builder.add_tag_attributes("input", &["type", "checked", "disabled"]);
    builder.add_tag_attributes("li", &["value"]);
    builder.add_tag_attributes("ol", &["start"]);

    builder.add_url_schemes(["http", "https", "mailto"].iter().copied());

    builder
}

fn configure_extensions(options: &mut Options<'static>, math: Option<MathRenderer>) {
    let ext = &mut options.extension;
    ext.strikethrough = true;
    ext.tagfilter = false;
    ext.table = true;
    ext.autolink = true;
    ext.tasklist = true;
    ext.footnotes = true;
    // Dollar math is only parsed when a backend exists to consume it.
    ext.math_dollars = math.is_some();
    ext.math_code = math.is_some();

    let render = &mut options.render;
    render.r#unsafe = true;
    render.github_pre_lang = true;
    render.tasklist_classes = true;
}

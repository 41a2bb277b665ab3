//! Lax ATX headings: `#Title` is accepted as a heading even though CommonMark
//! requires whitespace after the opening hash run.
//!
//! Works on the parsed tree, so only paragraph lines are candidates. Code
//! blocks and raw HTML keep their literal text.

use comrak::nodes::{AstNode, NodeHeading, NodeValue};

const MAX_HEADING_LEVEL: usize = 6;

/// Turn paragraph lines that open with an unspaced hash run into headings.
/// Returns the number of headings created.
pub(crate) fn relax_headings<'a, F>(root: &'a AstNode<'a>, source: &str, new_node: &F) -> usize
where
    F: Fn(NodeValue) -> &'a AstNode<'a>,
{
    let paragraphs: Vec<_> = root
        .descendants()
        .filter(|node| matches!(node.data.borrow().value, NodeValue::Paragraph))
        .collect();

    let source_lines: Vec<&str> = source.split('\n').collect();
    paragraphs
        .into_iter()
        .map(|paragraph| relax_paragraph(paragraph, &source_lines, new_node))
        .sum()
}

fn relax_paragraph<'a, F>(paragraph: &'a AstNode<'a>, source_lines: &[&str], new_node: &F) -> usize
where
    F: Fn(NodeValue) -> &'a AstNode<'a>,
{
    let lines = split_lines(paragraph);
    let levels: Vec<Option<Marker>> = lines
        .iter()
        .map(|line| heading_marker(&line.nodes, source_lines))
        .collect();

    if levels.iter().all(Option::is_none) {
        return 0;
    }

    let mut created = 0;
    let mut open_paragraph: Option<&'a AstNode<'a>> = None;

    for (line, marker) in lines.into_iter().zip(levels) {
        for node in line.nodes.iter().chain(line.leading_break.iter()) {
            node.detach();
        }

        match marker {
            Some(marker) => {
                open_paragraph = None;
                let heading = new_node(NodeValue::Heading(NodeHeading {
                    level: marker.level,
                    setext: false,
                    ..NodeHeading::default()
                }));
                paragraph.insert_before(heading);
                for node in &line.nodes {
                    heading.append(node);
                }
                strip_opening_hashes(heading, marker.length);
                strip_closing_sequence(heading);
                created += 1;
            }
            None => {
                let block = match open_paragraph {
                    Some(block) => {
                        if let Some(separator) = line.leading_break {
                            block.append(separator);
                        }
                        block
                    }
                    None => {
                        let block = new_node(NodeValue::Paragraph);
                        paragraph.insert_before(block);
                        open_paragraph = Some(block);
                        block
                    }
                };
                for node in &line.nodes {
                    block.append(node);
                }
            }
        }
    }

    paragraph.detach();
    created
}

struct Line<'a> {
    /// Soft or hard break that ended the previous line.
    leading_break: Option<&'a AstNode<'a>>,
    nodes: Vec<&'a AstNode<'a>>,
}

fn split_lines<'a>(paragraph: &'a AstNode<'a>) -> Vec<Line<'a>> {
    let mut lines = vec![Line {
        leading_break: None,
        nodes: Vec::new(),
    }];

    for child in paragraph.children() {
        if is_break(child) {
            lines.push(Line {
                leading_break: Some(child),
                nodes: Vec::new(),
            });
        } else if let Some(line) = lines.last_mut() {
            line.nodes.push(child);
        }
    }

    lines
}

fn is_break(node: &AstNode<'_>) -> bool {
    matches!(
        node.data.borrow().value,
        NodeValue::SoftBreak | NodeValue::LineBreak
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Marker {
    level: u8,
    length: usize,
}

fn heading_marker(nodes: &[&AstNode<'_>], source_lines: &[&str]) -> Option<Marker> {
    let first = nodes.first()?;
    let data = first.data.borrow();
    let NodeValue::Text(text) = &data.value else {
        return None;
    };
    let text: &str = text;

    let length = text.bytes().take_while(|b| *b == b'#').count();
    if length == 0 || length > MAX_HEADING_LEVEL {
        return None;
    }

    match text[length..].chars().next() {
        Some(ch) if ch.is_whitespace() => return None,
        None if nodes.len() == 1 => return None,
        _ => {}
    }

    // Escaped or entity-encoded hashes decode to the same text; only a
    // literal `#` in the source opens a heading.
    let start = data.sourcepos.start;
    let literal_hash = start
        .line
        .checked_sub(1)
        .and_then(|index| source_lines.get(index))
        .and_then(|line| line.as_bytes().get(start.column.checked_sub(1)?))
        .is_none_or(|byte| *byte == b'#');
    if !literal_hash {
        return None;
    }

    Some(Marker {
        level: length as u8,
        length,
    })
}

fn strip_opening_hashes(heading: &AstNode<'_>, length: usize) {
    let Some(first) = heading.first_child() else {
        return;
    };

    let now_empty = {
        let mut data = first.data.borrow_mut();
        match &mut data.value {
            NodeValue::Text(text) => {
                let rest = text[length..].to_string();
                let empty = rest.is_empty();
                *text = rest.into();
                empty
            }
            _ => false,
        }
    };

    if now_empty {
        first.detach();
    }
}

/// Drop trailing whitespace and an optional closing `#` run.
fn strip_closing_sequence(heading: &AstNode<'_>) {
    let Some(last) = heading.last_child() else {
        return;
    };

    let mut data = last.data.borrow_mut();
    let NodeValue::Text(text) = &mut data.value else {
        return;
    };

    let trimmed = text.trim_end();
    let without_hashes = trimmed.trim_end_matches('#');
    let kept = if without_hashes.len() < trimmed.len()
        && (without_hashes.is_empty() || without_hashes.ends_with(char::is_whitespace))
    {
        without_hashes.trim_end()
    } else {
        trimmed
    };

    if kept.len() != text.len() {
        *text = kept.to_string().into();
    }
}

#[cfg(test)]
mod tests {
    use comrak::{Arena, format_html, parse_document};

    use super::*;
    use crate::application::render::engine::options::default_options;

    fn relax(markdown: &str) -> (usize, String) {
        let options = default_options(None);
        let arena = Arena::new();
        let root = parse_document(&arena, markdown, &options);
        let new_node = |value: NodeValue| &*arena.alloc(AstNode::from(value));
        let created = relax_headings(root, markdown, &new_node);
        let mut html = String::new();
        format_html(root, &options, &mut html).expect("html");
        (created, html)
    }

    #[test]
    fn unspaced_hash_run_becomes_heading() {
        assert_eq!(relax("#Title"), (1, "<h1>Title</h1>\n".to_string()));
        assert_eq!(relax("  ###Deep").1, "<h3>Deep</h3>\n");
    }

    #[test]
    fn heading_splits_its_paragraph() {
        let (created, html) = relax("#Title\ntext\nmore\n#Next");
        assert_eq!(created, 2);
        assert_eq!(
            html,
            "<h1>Title</h1>\n<p>text\nmore</p>\n<h1>Next</h1>\n"
        );
    }

    #[test]
    fn inline_markup_stays_in_heading() {
        let (_, html) = relax("##*big* news ##");
        assert_eq!(html, "<h2><em>big</em> news</h2>\n");
    }

    #[test]
    fn regular_paragraphs_are_untouched() {
        assert_eq!(relax("# Title\ntext\n"), (0, "<h1>Title</h1>\n<p>text</p>\n".to_string()));
        assert_eq!(relax("a #tag here").1, "<p>a #tag here</p>\n");
    }

    #[test]
    fn escaped_hash_stays_text() {
        assert_eq!(relax("\\#Title").1, "<p>#Title</p>\n");
        assert_eq!(relax("&#35;Title").1, "<p>#Title</p>\n");
    }

    #[test]
    fn code_keeps_hash_lines() {
        let (created, html) = relax("- ```sh\n  #!/bin/sh\n  ```\n\n#After");
        assert_eq!(created, 1);
        assert!(html.contains("#!/bin/sh\n"));
        assert!(html.ends_with("<h1>After</h1>\n"));

        let (created, html) = relax("```sh\n#!/bin/sh\n```");
        assert_eq!(created, 0);
        assert!(html.contains("#!/bin/sh\n"));

        assert_eq!(relax("    #code").1, "<pre><code>#code\n</code></pre>\n");
    }

    #[test]
    fn raw_html_blocks_keep_hash_lines() {
        let (created, html) = relax("<pre>\n#include <stdio.h>\n</pre>");
        assert_eq!(created, 0);
        assert_eq!(html, "<pre>\n#include <stdio.h>\n</pre>\n");
    }

    #[test]
    fn seven_hashes_is_not_a_heading() {
        assert_eq!(relax("#######seven").1, "<p>#######seven</p>\n");
    }
}

//! Removes raw HTML tags that never find their partner.
//!
//! Inline tags are balanced per paragraph-like container; HTML blocks are
//! balanced across the whole document so a `<div>` block closed by a later
//! `</div>` block survives. Unmatched tags are cut out of the node literal;
//! inline nodes left empty are detached.

use std::ops::Range;

use comrak::nodes::{AstNode, NodeValue};

const VOID_ELEMENTS: [&str; 13] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagKind {
    Open,
    Close,
    SelfClosing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct TagToken {
    span: Range<usize>,
    name: String,
    kind: TagKind,
}

/// Token bound to the AST node whose literal contains it.
struct Located<'a> {
    node: &'a AstNode<'a>,
    token: TagToken,
}

/// Strip unbalanced raw HTML tags from the document. Returns how many tags
/// were removed.
pub(crate) fn strip_unbalanced_tags<'a>(root: &'a AstNode<'a>) -> usize {
    let mut containers = Vec::new();
    let mut blocks = Vec::new();
    collect_targets(root, &mut containers, &mut blocks);

    let mut removed = 0;
    for container in containers {
        let mut inline_nodes = Vec::new();
        collect_inline_html(container, &mut inline_nodes);
        removed += strip_from(&inline_nodes);
    }
    removed += strip_from(&blocks);
    removed
}

fn collect_targets<'a>(
    node: &'a AstNode<'a>,
    containers: &mut Vec<&'a AstNode<'a>>,
    blocks: &mut Vec<&'a AstNode<'a>>,
) {
    let is_container = {
        let data = node.data.borrow();
        match &data.value {
            NodeValue::HtmlBlock(_) => {
                blocks.push(node);
                false
            }
            NodeValue::Paragraph | NodeValue::Heading(_) | NodeValue::TableCell => true,
            _ => false,
        }
    };

    if is_container {
        containers.push(node);
        return;
    }

    let mut child = node.first_child();
    while let Some(next) = child {
        collect_targets(next, containers, blocks);
        child = next.next_sibling();
    }
}

fn collect_inline_html<'a>(node: &'a AstNode<'a>, found: &mut Vec<&'a AstNode<'a>>) {
    let mut child = node.first_child();
    while let Some(next) = child {
        if matches!(next.data.borrow().value, NodeValue::HtmlInline(_)) {
            found.push(next);
        }
        collect_inline_html(next, found);
        child = next.next_sibling();
    }
}

fn strip_from<'a>(nodes: &[&'a AstNode<'a>]) -> usize {
    let located: Vec<Located<'a>> = nodes
        .iter()
        .flat_map(|node| {
            let node: &'a AstNode<'a> = node;
            let literal = node_literal(node);
            scan_tags(&literal)
                .into_iter()
                .map(move |token| Located { node, token })
        })
        .collect();

    let tokens: Vec<&TagToken> = located.iter().map(|entry| &entry.token).collect();
    let unmatched = unmatched_indices(&tokens);
    if unmatched.is_empty() {
        return 0;
    }

    for node in nodes {
        let mut spans: Vec<Range<usize>> = unmatched
            .iter()
            .map(|&idx| &located[idx])
            .filter(|entry| std::ptr::eq(entry.node, *node))
            .map(|entry| entry.token.span.clone())
            .collect();
        if spans.is_empty() {
            continue;
        }
        spans.sort_by(|a, b| b.start.cmp(&a.start));
        cut_spans(node, &spans);
    }

    unmatched.len()
}

fn node_literal(node: &AstNode<'_>) -> String {
    match &node.data.borrow().value {
        NodeValue::HtmlInline(literal) => literal.clone(),
        NodeValue::HtmlBlock(block) => block.literal.clone(),
        _ => String::new(),
    }
}

/// Remove `spans` (sorted back to front) from the node literal.
fn cut_spans(node: &AstNode<'_>, spans: &[Range<usize>]) {
    let emptied = {
        let mut data = node.data.borrow_mut();
        match &mut data.value {
            NodeValue::HtmlInline(literal) => {
                for span in spans {
                    literal.replace_range(span.clone(), "");
                }
                literal.trim().is_empty()
            }
            NodeValue::HtmlBlock(block) => {
                for span in spans {
                    block.literal.replace_range(span.clone(), "");
                }
                false
            }
            _ => false,
        }
    };

    if emptied {
        node.detach();
    }
}

/// Indices of tokens without a partner, in ascending order.
fn unmatched_indices(tokens: &[&TagToken]) -> Vec<usize> {
    let mut stack: Vec<usize> = Vec::new();
    let mut unmatched = Vec::new();

    for (idx, token) in tokens.iter().enumerate() {
        match token.kind {
            TagKind::SelfClosing => {}
            TagKind::Open => stack.push(idx),
            TagKind::Close => {
                match stack
                    .iter()
                    .rposition(|&open| tokens[open].name == token.name)
                {
                    Some(position) => {
                        unmatched.extend(stack.drain(position + 1..));
                        stack.pop();
                    }
                    None => unmatched.push(idx),
                }
            }
        }
    }

    unmatched.extend(stack);
    unmatched.sort_unstable();
    unmatched
}

/// Find start and end tags in raw HTML. Comments, declarations and
/// processing instructions are skipped.
fn scan_tags(html: &str) -> Vec<TagToken> {
    let bytes = html.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while let Some(offset) = html[pos..].find('<') {
        let start = pos + offset;
        let rest = &html[start..];

        if rest.starts_with("<!--") {
            pos = rest
                .find("-->")
                .map_or(html.len(), |end| start + end + "-->".len());
            continue;
        }
        if rest.starts_with("<!") || rest.starts_with("<?") {
            pos = rest.find('>').map_or(html.len(), |end| start + end + 1);
            continue;
        }

        let closing = bytes.get(start + 1) == Some(&b'/');
        let name_start = if closing { start + 2 } else { start + 1 };
        let name_len = html[name_start..]
            .bytes()
            .enumerate()
            .take_while(|(i, b)| {
                if *i == 0 {
                    b.is_ascii_alphabetic()
                } else {
                    b.is_ascii_alphanumeric() || *b == b'-'
                }
            })
            .count();
        if name_len == 0 {
            pos = start + 1;
            continue;
        }

        let Some(end) = find_tag_end(html, name_start + name_len) else {
            break;
        };

        let name = html[name_start..name_start + name_len].to_ascii_lowercase();
        let kind = if closing {
            TagKind::Close
        } else if html[..end].ends_with("/>") || VOID_ELEMENTS.contains(&name.as_str()) {
            TagKind::SelfClosing
        } else {
            TagKind::Open
        };

        tokens.push(TagToken {
            span: start..end,
            name,
            kind,
        });
        pos = end;
    }

    tokens
}

/// Byte offset just past the `>` closing a tag, honouring quoted attribute
/// values.
fn find_tag_end(html: &str, from: usize) -> Option<usize> {
    let mut quote: Option<u8> = None;
    for (offset, byte) in html.as_bytes()[from..].iter().enumerate() {
        match (quote, *byte) {
            (Some(open), current) if open == current => quote = None,
            (Some(_), _) => {}
            (None, b'"' | b'\'') => quote = Some(*byte),
            (None, b'>') => return Some(from + offset + 1),
            (None, _) => {}
        }
    }
    None
}

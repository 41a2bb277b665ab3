use comrak::nodes::{AstNode, NodeHtmlBlock, NodeValue};
use tracing::warn;
use uuid::Uuid;

use crate::{application::render::types::RenderError, domain::MathRenderer};

use super::{highlight::Highlighter, math};

pub(crate) struct RewriteOutcome {
    pub(crate) math_fragments: Vec<MathFragment>,
    /// Per-render token mixed into placeholders so document text cannot
    /// forge one.
    nonce: String,
    math_counter: usize,
}

impl RewriteOutcome {
    fn new() -> Self {
        Self {
            math_fragments: Vec::new(),
            nonce: Uuid::new_v4().simple().to_string(),
            math_counter: 0,
        }
    }
}

/// KaTeX output kept aside while the document goes through the sanitiser.
#[derive(Clone)]
pub(crate) struct MathFragment {
    pub(crate) placeholder: String,
    pub(crate) html: String,
    pub(crate) is_block: bool,
}

pub(crate) fn rewrite_ast<'a, F>(
    root: &'a AstNode<'a>,
    highlighter: &Highlighter,
    math: Option<MathRenderer>,
    new_node: &F,
) -> Result<RewriteOutcome, RenderError>
where
    F: Fn(NodeValue) -> &'a AstNode<'a>,
{
    let mut walker = RewriteWalker::new(highlighter, math);
    walker.visit_nodes(root)?;

    for node in walker.display_math {
        lift_out_of_paragraph(node, new_node);
    }

    Ok(walker.outcome)
}

struct RewriteWalker<'h, 'a> {
    highlighter: &'h Highlighter,
    math: Option<MathRenderer>,
    outcome: RewriteOutcome,
    /// Display math rewritten to HTML, in document order.
    display_math: Vec<&'a AstNode<'a>>,
}

impl<'h, 'a> RewriteWalker<'h, 'a> {
    fn new(highlighter: &'h Highlighter, math: Option<MathRenderer>) -> Self {
        Self {
            highlighter,
            math,
            outcome: RewriteOutcome::new(),
            display_math: Vec::new(),
        }
    }

    fn visit_nodes(&mut self, node: &'a AstNode<'a>) -> Result<(), RenderError> {
        if self.handle_math_node(node)? {
            // Math nodes have no children worth visiting.
            return Ok(());
        }

        if let Some((info, literal)) = extract_fenced_code(node) {
            let language = info.split_whitespace().next();
            let html = self.highlighter.highlight(&literal, language);

            let mut data = node.data.borrow_mut();
            data.value = NodeValue::HtmlBlock(NodeHtmlBlock {
                block_type: 0,
                literal: html,
            });
            return Ok(());
        }

        let mut child = node.first_child();
        while let Some(next) = child {
            self.visit_nodes(next)?;
            child = next.next_sibling();
        }

        Ok(())
    }

    fn handle_math_node(&mut self, node: &'a AstNode<'a>) -> Result<bool, RenderError> {
        let math_data = {
            let data = node.data.borrow();
            if let NodeValue::Math(math_node) = &data.value {
                Some((math_node.literal.clone(), math_node.display_math))
            } else {
                None
            }
        };

        let Some((literal, display_mode)) = math_data else {
            return Ok(false);
        };

        let html = match self.math {
            Some(MathRenderer::Katex) => self.katex_html(&literal, display_mode),
            Some(MathRenderer::MathJax) => math::passthrough_math_html(&literal, display_mode),
            None => return Ok(false),
        };

        node.data.borrow_mut().value = NodeValue::HtmlInline(html);
        if display_mode {
            self.display_math.push(node);
        }
        Ok(true)
    }

    fn katex_html(&mut self, literal: &str, display_mode: bool) -> String {
        match math::render_math_html(literal, display_mode) {
            Ok(html) => {
                let placeholder = format!(
                    "__KATEX_PLACEHOLDER_{}_{}__",
                    self.outcome.nonce, self.outcome.math_counter
                );
                self.outcome.math_counter = self.outcome.math_counter.saturating_add(1);
                self.outcome.math_fragments.push(MathFragment {
                    placeholder: placeholder.clone(),
                    html,
                    is_block: display_mode,
                });

                if display_mode {
                    format!("<div>{placeholder}</div>")
                } else {
                    placeholder
                }
            }
            Err(err) => {
                warn!(
                    target = "application::render::math",
                    error = %err,
                    "KaTeX rendering failed; showing source"
                );
                math_fallback(literal, display_mode)
            }
        }
    }
}

fn math_fallback(literal: &str, display_mode: bool) -> String {
    let escaped = ammonia::clean_text(literal);
    if display_mode {
        format!("<pre class=\"math-error\"><code>{escaped}</code></pre>")
    } else {
        format!("<code class=\"math-error\">{escaped}</code>")
    }
}

/// Move rewritten display math out of its paragraph into a block of its own,
/// splitting the paragraph around it. Display math anywhere else (headings,
/// table cells) stays inline.
fn lift_out_of_paragraph<'a, F>(node: &'a AstNode<'a>, new_node: &F)
where
    F: Fn(NodeValue) -> &'a AstNode<'a>,
{
    let Some(paragraph) = node.parent() else {
        return;
    };
    if !matches!(paragraph.data.borrow().value, NodeValue::Paragraph) {
        return;
    }

    let mut trailing = Vec::new();
    let mut sibling = node.next_sibling();
    while let Some(current) = sibling {
        sibling = current.next_sibling();
        trailing.push(current);
    }

    {
        let mut data = node.data.borrow_mut();
        if let NodeValue::HtmlInline(html) = &data.value {
            let literal = format!("{html}\n");
            data.value = NodeValue::HtmlBlock(NodeHtmlBlock {
                block_type: 0,
                literal,
            });
        }
    }
    node.detach();
    paragraph.insert_after(node);

    let tail = new_node(NodeValue::Paragraph);
    for current in trailing {
        current.detach();
        tail.append(current);
    }
    trim_paragraph(tail);
    if tail.first_child().is_some() {
        node.insert_after(tail);
    }

    trim_paragraph(paragraph);
    if paragraph.first_child().is_none() {
        paragraph.detach();
    }
}

/// Drop line breaks and whitespace left at either end of a split paragraph.
fn trim_paragraph(paragraph: &AstNode<'_>) {
    while let Some(first) = paragraph.first_child() {
        if !trim_edge(first, str::trim_start) {
            break;
        }
        first.detach();
    }

    while let Some(last) = paragraph.last_child() {
        if !trim_edge(last, str::trim_end) {
            break;
        }
        last.detach();
    }
}

/// Trims an edge node in place. Returns `true` when nothing of it remains.
fn trim_edge(node: &AstNode<'_>, trim: fn(&str) -> &str) -> bool {
    let mut data = node.data.borrow_mut();
    match &mut data.value {
        NodeValue::SoftBreak | NodeValue::LineBreak => true,
        NodeValue::Text(text) => {
            let trimmed = trim(text).to_string();
            let empty = trimmed.is_empty();
            *text = trimmed.into();
            empty
        }
        _ => false,
    }
}

/// Info string and body of a fenced code block. Indented code keeps the
/// default `<pre><code>` rendering.
fn extract_fenced_code(node: &AstNode<'_>) -> Option<(String, String)> {
    let data = node.data.borrow();
    match &data.value {
        NodeValue::CodeBlock(block) if block.fenced => {
            Some((block.info.trim().to_string(), block.literal.clone()))
        }
        _ => None,
    }
}

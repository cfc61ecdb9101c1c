// ABOUTME: Markdown authoring adapter for the lecture-deck application
// ABOUTME: Converts Markdown into classified block nodes, recognising slide sentinels and directives

use crate::document::{assign_heading_ids, DocumentNode, LayoutTag, MediaKind, NodeKind};
use crate::errors::{DeckError, Result};
use crate::layout::{PRESENT_ONLY, TEXT_ONLY};
use crate::slug::Slugger;
use comrak::nodes::{AstNode, NodeValue};
use comrak::{format_html, parse_document, Arena, ComrakOptions};
use log::{debug, info, warn};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use std::fs;
use std::path::Path;

/// Paragraph text that forces a slide boundary.
pub const BREAK_SENTINEL: &str = "---sldbrk";
/// Paragraph prefix that selects the layout of the next slide, e.g. `---sldlayout2`.
pub const LAYOUT_SENTINEL_PREFIX: &str = "---sldlayout";

const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    /// URL prefix for media and links written relative to the document.
    pub asset_base: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frontmatter {
    pub title: Option<String>,
    pub author: Option<String>,
    pub date: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub title: String,
    pub frontmatter: Frontmatter,
    pub nodes: Vec<DocumentNode>,
}

/// Read and parse a Markdown file
pub fn parse_file(path: &Path, options: &ParseOptions) -> Result<ParsedDocument> {
    info!("Parsing markdown: {:?}", path);
    if !path.exists() {
        return Err(DeckError::PathNotFoundError(path.to_path_buf()));
    }
    let source = fs::read_to_string(path).map_err(DeckError::FileReadError)?;
    Ok(parse_markdown(&source, options))
}

/// Parse Markdown source into the block node sequence consumed by the segmenter
pub fn parse_markdown(source: &str, options: &ParseOptions) -> ParsedDocument {
    let (frontmatter, content) = parse_frontmatter(source);
    let processed = isolate_marker_lines(&content);

    let mut comrak_options = ComrakOptions::default();
    comrak_options.render.unsafe_ = true; // Allow raw HTML
    comrak_options.extension.table = true;
    comrak_options.extension.strikethrough = true;
    comrak_options.extension.autolink = true;
    comrak_options.extension.tasklist = true;

    let arena = Arena::new();
    let root = parse_document(&arena, &processed, &comrak_options);

    if let Some(base) = &options.asset_base {
        rewrite_relative_urls(root, base);
    }

    let flat: Vec<DocumentNode> = root
        .children()
        .map(|node| convert_block(node, &comrak_options))
        .collect();

    let mut nodes = group_containers(flat);
    let mut slugger = Slugger::new();
    assign_heading_ids(&mut nodes, &mut slugger);

    let title = frontmatter
        .title
        .clone()
        .or_else(|| {
            nodes
                .iter()
                .find(|n| n.heading_depth() == Some(1))
                .map(|n| n.text.clone())
        })
        .unwrap_or_else(|| "Document".to_string());

    debug!("Parsed {} top-level nodes for {:?}", nodes.len(), title);

    ParsedDocument {
        title,
        frontmatter,
        nodes,
    }
}

/// Parse frontmatter in the format: % Title\n% Author\n% Date
///
/// Any prefix of the three lines may be present. Blank lines after the
/// frontmatter are skipped.
fn parse_frontmatter(content: &str) -> (Frontmatter, String) {
    let lines: Vec<&str> = content.lines().collect();
    let mut values = Vec::new();

    while values.len() < 3 && values.len() < lines.len() && lines[values.len()].starts_with("% ") {
        let value = lines[values.len()].trim_start_matches("% ").trim().to_string();
        values.push(value);
    }

    if values.is_empty() {
        return (Frontmatter::default(), content.to_string());
    }

    let mut start_idx = values.len();
    while start_idx < lines.len() && lines[start_idx].trim().is_empty() {
        start_idx += 1;
    }

    let mut values = values.into_iter().map(|v| (!v.is_empty()).then_some(v));
    let frontmatter = Frontmatter {
        title: values.next().flatten(),
        author: values.next().flatten(),
        date: values.next().flatten(),
    };
    (frontmatter, lines[start_idx..].join("\n"))
}

/// Surround sentinel and directive lines with blank lines so each one parses
/// as a paragraph of its own. Fenced code is left untouched, and so are
/// indented markers, which belong to list items or indented code.
fn isolate_marker_lines(content: &str) -> String {
    let mut result = String::with_capacity(content.len() + 64);
    let mut fence: Option<&str> = None;

    for line in content.lines() {
        let trimmed = line.trim();
        let at_margin = !line.starts_with(char::is_whitespace);

        if let Some(marker) = fence {
            if trimmed.starts_with(marker) {
                fence = None;
            }
        } else if trimmed.starts_with("```") {
            fence = Some("```");
        } else if trimmed.starts_with("~~~") {
            fence = Some("~~~");
        } else if at_margin && is_marker_line(trimmed) {
            result.push('\n');
            result.push_str(trimmed);
            result.push_str("\n\n");
            continue;
        }

        result.push_str(line);
        result.push('\n');
    }

    result
}

fn is_marker_line(trimmed: &str) -> bool {
    trimmed == BREAK_SENTINEL
        || parse_layout_sentinel(trimmed).is_some()
        || directive_marker(trimmed).is_some()
}

fn parse_layout_sentinel(text: &str) -> Option<LayoutTag> {
    let digits = text.strip_prefix(LAYOUT_SENTINEL_PREFIX)?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse::<u32>().ok().and_then(LayoutTag::new)
}

#[derive(Debug, PartialEq, Eq)]
enum DirectiveMarker {
    Open(String),
    Close,
}

/// `:::name` opens a container and `:::` / `::` close the innermost one.
/// The two-colon open form is only a container for the visibility
/// directives; any other `::name` is a leaf and stays a paragraph.
fn directive_marker(text: &str) -> Option<DirectiveMarker> {
    let (rest, leaf_form) = match text.strip_prefix(":::") {
        Some(rest) => (rest, false),
        None => (text.strip_prefix("::")?, true),
    };
    if rest.is_empty() {
        return Some(DirectiveMarker::Close);
    }
    let valid = rest.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
        && rest
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return None;
    }
    let name = rest.to_ascii_lowercase();
    if leaf_form && name != PRESENT_ONLY && name != TEXT_ONLY {
        debug!("Leaving leaf directive ::{} as text", name);
        return None;
    }
    Some(DirectiveMarker::Open(name))
}

fn convert_block<'a>(node: &'a AstNode<'a>, options: &ComrakOptions) -> DocumentNode {
    let value = node.data.borrow().value.clone();
    match value {
        NodeValue::Heading(heading) => {
            let text = plain_text(node);
            let html = render_node(node, options);
            let open_tag = format!("<h{}>", heading.level);
            let html = html.replacen(
                &open_tag,
                &format!("<h{} id=\"section\">", heading.level),
                1,
            );
            DocumentNode::new(
                NodeKind::Heading {
                    depth: heading.level,
                    id: "section".to_string(),
                },
                text,
                html,
            )
        }
        NodeValue::Paragraph => convert_paragraph(node, options),
        NodeValue::HtmlBlock(block) => {
            let html = render_node(node, options);
            match media_in_html(&block.literal) {
                Some(media) => DocumentNode::new(NodeKind::Media { media }, "", html),
                None => DocumentNode::block("", &html),
            }
        }
        NodeValue::BlockQuote => {
            let children = node
                .children()
                .map(|child| convert_block(child, options))
                .collect();
            DocumentNode::wrapper(&render_node(node, options), children)
        }
        _ => DocumentNode::block(&plain_text(node), &render_node(node, options)),
    }
}

fn convert_paragraph<'a>(node: &'a AstNode<'a>, options: &ComrakOptions) -> DocumentNode {
    let text = plain_text(node);
    let only_text = node
        .children()
        .all(|c| matches!(c.data.borrow().value, NodeValue::Text(_)));

    if only_text {
        if text == BREAK_SENTINEL {
            return DocumentNode::slide_break();
        }
        if let Some(layout) = parse_layout_sentinel(&text) {
            return DocumentNode::layout_command(layout);
        }
    }

    let html = render_node(node, options);
    match paragraph_media(node) {
        Some(media) => DocumentNode::new(NodeKind::Media { media }, text, html),
        None => DocumentNode::new(NodeKind::Paragraph, text, html),
    }
}

/// A paragraph made only of images (or of one raw media tag) is media.
fn paragraph_media<'a>(node: &'a AstNode<'a>) -> Option<MediaKind> {
    let mut images = 0;
    let mut html_tag: Option<String> = None;

    for child in node.children() {
        match &child.data.borrow().value {
            NodeValue::Image(_) => images += 1,
            NodeValue::HtmlInline(raw) => {
                if html_tag.is_none() {
                    html_tag = Some(raw.clone());
                }
            }
            NodeValue::Text(t) if t.trim().is_empty() => {}
            NodeValue::SoftBreak | NodeValue::LineBreak => {}
            _ => return None,
        }
    }

    match (images, html_tag) {
        (n, None) if n > 0 => Some(MediaKind::Image),
        (0, Some(raw)) => leading_tag(&raw).and_then(|tag| MediaKind::from_tag(&tag)),
        _ => None,
    }
}

fn leading_tag(raw: &str) -> Option<String> {
    let rest = raw.trim_start().strip_prefix('<')?;
    let tag: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect();
    (!tag.is_empty()).then_some(tag)
}

/// Media kind of a raw HTML block: its own tag, or the first media tag inside
/// a plain wrapper element.
fn media_in_html(literal: &str) -> Option<MediaKind> {
    let tag = leading_tag(literal)?;
    if let Some(media) = MediaKind::from_tag(&tag) {
        return Some(media);
    }
    if !matches!(tag.to_ascii_lowercase().as_str(), "div" | "p" | "center" | "a" | "span") {
        return None;
    }
    let lower = literal.to_ascii_lowercase();
    ["figure", "img", "video", "audio", "iframe", "embed", "picture"]
        .iter()
        .filter_map(|t| lower.find(&format!("<{}", t)).map(|pos| (pos, *t)))
        .min_by_key(|(pos, _)| *pos)
        .and_then(|(_, t)| MediaKind::from_tag(t))
}

fn plain_text<'a>(node: &'a AstNode<'a>) -> String {
    let mut text = String::new();
    for descendant in node.descendants() {
        match &descendant.data.borrow().value {
            NodeValue::Text(t) => text.push_str(t),
            NodeValue::Code(code) => text.push_str(&code.literal),
            NodeValue::CodeBlock(code) => text.push_str(&code.literal),
            NodeValue::SoftBreak | NodeValue::LineBreak => text.push(' '),
            NodeValue::Paragraph | NodeValue::Item(_) | NodeValue::TableCell => {
                if !text.is_empty() && !text.ends_with(' ') {
                    text.push(' ');
                }
            }
            _ => {}
        }
    }
    text.trim().to_string()
}

fn render_node<'a>(node: &'a AstNode<'a>, options: &ComrakOptions) -> String {
    let mut output = Vec::new();
    if let Err(e) = format_html(node, options, &mut output) {
        warn!("Failed to render markdown node: {}", e);
    }
    String::from_utf8_lossy(&output).trim_end().to_string()
}

fn rewrite_relative_urls<'a>(root: &'a AstNode<'a>, base: &str) {
    for node in root.descendants() {
        let mut data = node.data.borrow_mut();
        match &mut data.value {
            NodeValue::Image(link) => link.url = resolve_asset_url(base, &link.url, Some("img")),
            NodeValue::Link(link) => link.url = resolve_asset_url(base, &link.url, None),
            _ => {}
        }
    }
}

/// Resolve a document-relative URL against `base`.
///
/// Absolute URLs, root-relative paths and fragments are returned unchanged.
/// A bare file name (no `/`) is placed under `bare_dir` when given.
pub fn resolve_asset_url(base: &str, url: &str, bare_dir: Option<&str>) -> String {
    if url.is_empty() || url.starts_with('#') || is_absolute_url(url) {
        return url.to_string();
    }

    let relative = url.trim_start_matches("./");
    let relative = match bare_dir {
        Some(dir) if !relative.contains('/') => format!("{}/{}", dir, relative),
        _ => relative.to_string(),
    };

    let encoded = relative
        .split('/')
        .map(|segment| utf8_percent_encode(segment, PATH_SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/");

    format!("{}/{}", base.trim_end_matches('/'), encoded)
}

fn is_absolute_url(url: &str) -> bool {
    if url.starts_with('/') {
        return true;
    }
    match url.split_once(':') {
        Some((scheme, _)) => {
            scheme.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}

/// Group `:::name` ... `:::` runs into container nodes. An unclosed container
/// runs to the end of the document; a stray close marker is dropped.
fn group_containers(nodes: Vec<DocumentNode>) -> Vec<DocumentNode> {
    let mut stack: Vec<(String, Vec<DocumentNode>)> = Vec::new();
    let mut out = Vec::new();

    for node in nodes {
        let marker = match node.kind {
            NodeKind::Paragraph => directive_marker(&node.text),
            _ => None,
        };
        match marker {
            Some(DirectiveMarker::Open(name)) => stack.push((name, Vec::new())),
            Some(DirectiveMarker::Close) => match stack.pop() {
                Some((name, children)) => {
                    push_grouped(&mut stack, &mut out, DocumentNode::container(&name, children))
                }
                None => warn!("Dropping directive close marker with no open container"),
            },
            None => push_grouped(&mut stack, &mut out, node),
        }
    }

    while let Some((name, children)) = stack.pop() {
        warn!("Directive container '{}' is never closed; it runs to the end of the document", name);
        push_grouped(&mut stack, &mut out, DocumentNode::container(&name, children));
    }

    out
}

fn push_grouped(
    stack: &mut [(String, Vec<DocumentNode>)],
    out: &mut Vec<DocumentNode>,
    node: DocumentNode,
) {
    match stack.last_mut() {
        Some((_, children)) => children.push(node),
        None => out.push(node),
    }
}

// ABOUTME: Document model shared by the parser, segmenter and layout selector
// ABOUTME: Block-level nodes carry their classification as data, assigned once at parse time

use crate::slug::{slugify, Slugger};
use crate::utils::escape_html;
use serde::Serialize;
use std::fmt;

/// Per-unit layout tag chosen by the author with a layout-command sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct LayoutTag(u32);

impl LayoutTag {
    pub const STACKED: LayoutTag = LayoutTag(1);
    pub const SPLIT: LayoutTag = LayoutTag(2);

    /// Build a tag from an author-supplied number; zero is not a layout.
    pub fn new(value: u32) -> Option<Self> {
        (value > 0).then_some(LayoutTag(value))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for LayoutTag {
    fn default() -> Self {
        LayoutTag::STACKED
    }
}

impl fmt::Display for LayoutTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Figure,
    Video,
    Audio,
    Embed,
}

impl MediaKind {
    /// Media kind for a raw HTML tag name, if it is a media element
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "img" | "picture" | "svg" => Some(MediaKind::Image),
            "figure" => Some(MediaKind::Figure),
            "video" => Some(MediaKind::Video),
            "audio" => Some(MediaKind::Audio),
            "iframe" | "embed" | "object" => Some(MediaKind::Embed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    Heading { depth: u8, id: String },
    Paragraph,
    Media { media: MediaKind },
    /// Directive container such as `:::present-only`; rendered from its children.
    Container { name: String },
    /// Block with nested block children (block quotes); rendered from `html`.
    Wrapper,
    /// Lists, code, tables, rules and raw HTML that is not media.
    Block,
    Break,
    LayoutCommand { layout: LayoutTag },
}

/// One block-level node of a parsed document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentNode {
    #[serde(flatten)]
    pub kind: NodeKind,
    pub text: String,
    #[serde(skip)]
    pub html: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<DocumentNode>,
}

impl DocumentNode {
    pub fn new(kind: NodeKind, text: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            html: html.into(),
            children: Vec::new(),
        }
    }

    /// Heading with an id derived from its own text.
    pub fn heading(depth: u8, text: &str) -> Self {
        let id = {
            let slug = slugify(text);
            if slug.is_empty() {
                "section".to_string()
            } else {
                slug
            }
        };
        let html = format!(
            "<h{d} id=\"{id}\">{text}</h{d}>",
            d = depth,
            id = id,
            text = escape_html(text)
        );
        Self::new(NodeKind::Heading { depth, id }, text, html)
    }

    pub fn paragraph(text: &str) -> Self {
        let html = format!("<p>{}</p>", escape_html(text));
        Self::new(NodeKind::Paragraph, text, html)
    }

    pub fn media(media: MediaKind, src: &str, alt: &str) -> Self {
        let src = escape_html(src);
        let alt_attr = escape_html(alt);
        let html = match media {
            MediaKind::Image => format!("<img src=\"{}\" alt=\"{}\" />", src, alt_attr),
            MediaKind::Figure => format!(
                "<figure><img src=\"{}\" alt=\"{}\" /><figcaption>{}</figcaption></figure>",
                src, alt_attr, alt_attr
            ),
            MediaKind::Video => format!("<video src=\"{}\" controls></video>", src),
            MediaKind::Audio => format!("<audio src=\"{}\" controls></audio>", src),
            MediaKind::Embed => format!("<iframe src=\"{}\" title=\"{}\"></iframe>", src, alt_attr),
        };
        Self::new(NodeKind::Media { media }, alt, html)
    }

    pub fn block(text: &str, html: &str) -> Self {
        Self::new(NodeKind::Block, text, html)
    }

    pub fn container(name: &str, children: Vec<DocumentNode>) -> Self {
        let text = children
            .iter()
            .map(|c| c.text.as_str())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        Self {
            kind: NodeKind::Container {
                name: name.to_string(),
            },
            text,
            html: String::new(),
            children,
        }
    }

    pub fn wrapper(html: &str, children: Vec<DocumentNode>) -> Self {
        let text = children
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        Self {
            kind: NodeKind::Wrapper,
            text,
            html: html.to_string(),
            children,
        }
    }

    pub fn slide_break() -> Self {
        Self::new(NodeKind::Break, "", "")
    }

    pub fn layout_command(layout: LayoutTag) -> Self {
        Self::new(NodeKind::LayoutCommand { layout }, "", "")
    }

    pub fn heading_depth(&self) -> Option<u8> {
        match self.kind {
            NodeKind::Heading { depth, .. } => Some(depth),
            _ => None,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        matches!(self.kind, NodeKind::Break | NodeKind::LayoutCommand { .. })
    }

    pub fn is_media(&self) -> bool {
        matches!(self.kind, NodeKind::Media { .. })
    }

    pub fn as_heading(&self) -> Option<Heading> {
        match &self.kind {
            NodeKind::Heading { depth, id } => Some(Heading {
                depth: *depth,
                text: self.text.clone(),
                id: id.clone(),
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Heading {
    pub depth: u8,
    pub text: String,
    pub id: String,
}

/// Table-of-contents row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeadingEntry {
    pub id: String,
    pub text: String,
}

impl From<Heading> for HeadingEntry {
    fn from(heading: Heading) -> Self {
        Self {
            id: heading.id,
            text: heading.text,
        }
    }
}

/// Collect headings at the given depths, in document order, descending into
/// containers. Headings without text are skipped.
pub fn table_of_contents(nodes: &[DocumentNode], depths: &[u8]) -> Vec<HeadingEntry> {
    let mut entries = Vec::new();
    collect_headings(nodes, depths, &mut entries);
    entries
}

fn collect_headings(nodes: &[DocumentNode], depths: &[u8], entries: &mut Vec<HeadingEntry>) {
    for node in nodes {
        if let Some(heading) = node.as_heading() {
            if depths.contains(&heading.depth) && !heading.text.trim().is_empty() {
                entries.push(heading.into());
            }
        }
        if matches!(node.kind, NodeKind::Container { .. }) {
            collect_headings(&node.children, depths, entries);
        }
    }
}

/// Reassign heading ids so they are unique across the whole sequence,
/// including headings nested in containers.
pub fn assign_heading_ids(nodes: &mut [DocumentNode], slugger: &mut Slugger) {
    for node in nodes.iter_mut() {
        if let NodeKind::Heading { depth, id } = &mut node.kind {
            let fresh = slugger.slug(&node.text, "section");
            if *id != fresh {
                let old_attr = format!("<h{} id=\"{}\"", depth, id);
                let new_attr = format!("<h{} id=\"{}\"", depth, fresh);
                node.html = node.html.replacen(&old_attr, &new_attr, 1);
                *id = fresh;
            }
        }
        if matches!(node.kind, NodeKind::Container { .. }) {
            assign_heading_ids(&mut node.children, slugger);
        }
    }
}

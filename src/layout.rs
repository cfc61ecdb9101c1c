// ABOUTME: Layout selection for slide units in the lecture-deck application
// ABOUTME: Classifies unit content into titles, text and media and renders the chosen arrangement

use crate::document::{DocumentNode, LayoutTag, NodeKind};
use crate::segment::SlideUnit;
use crate::utils::escape_html;
use crate::view_mode::ViewMode;

/// Directive container shown only in paginated mode
pub const PRESENT_ONLY: &str = "present-only";
/// Directive container shown only in linear mode
pub const TEXT_ONLY: &str = "text-only";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentRole {
    Title,
    Text,
    Media,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrangement {
    /// Titles, then everything else flowing vertically
    Stacked,
    /// Titles, then text on the left and media on the right
    Split,
}

impl From<LayoutTag> for Arrangement {
    fn from(tag: LayoutTag) -> Self {
        if tag == LayoutTag::SPLIT {
            Arrangement::Split
        } else {
            Arrangement::Stacked
        }
    }
}

/// Unit children grouped by role, each group in original order
#[derive(Debug, Default)]
pub struct Classified<'a> {
    pub titles: Vec<&'a DocumentNode>,
    pub text: Vec<&'a DocumentNode>,
    pub media: Vec<&'a DocumentNode>,
}

/// Role of a single node, or `None` for sentinels which never render.
///
/// Containers and wrappers count as media when one of their direct children
/// is media.
pub fn role_of(node: &DocumentNode) -> Option<ContentRole> {
    match &node.kind {
        NodeKind::Break | NodeKind::LayoutCommand { .. } => None,
        NodeKind::Heading { .. } => Some(ContentRole::Title),
        NodeKind::Media { .. } => Some(ContentRole::Media),
        NodeKind::Container { .. } | NodeKind::Wrapper
            if node.children.iter().any(DocumentNode::is_media) =>
        {
            Some(ContentRole::Media)
        }
        _ => Some(ContentRole::Text),
    }
}

pub fn classify(children: &[DocumentNode]) -> Classified<'_> {
    let mut classified = Classified::default();
    for child in children {
        match role_of(child) {
            Some(ContentRole::Title) => classified.titles.push(child),
            Some(ContentRole::Text) => classified.text.push(child),
            Some(ContentRole::Media) => classified.media.push(child),
            None => {}
        }
    }
    classified
}

/// Render one slide unit as a `<section>` carrying its id and layout tag
pub fn render_unit(unit: &SlideUnit, mode: ViewMode) -> String {
    render_section(unit, mode, false)
}

/// Like `render_unit`, optionally emitting the section with `hidden` set
pub fn render_section(unit: &SlideUnit, mode: ViewMode, hidden: bool) -> String {
    let mut html = format!(
        "<section class=\"slide\" data-id=\"{}\" data-layout=\"{}\"{}>\n",
        escape_html(&unit.id),
        unit.layout,
        if hidden { " hidden" } else { "" }
    );

    match mode {
        ViewMode::Linear => render_nodes(&mut html, unit.nodes.iter(), mode),
        ViewMode::Paginated => {
            let visible: Vec<DocumentNode> = unit
                .nodes
                .iter()
                .filter(|n| is_visible(n, mode))
                .cloned()
                .collect();
            let classified = classify(&visible);
            match Arrangement::from(unit.layout) {
                Arrangement::Stacked => render_stacked(&mut html, &visible, &classified),
                Arrangement::Split => render_split(&mut html, &classified),
            }
        }
    }

    html.push_str("</section>\n");
    html
}

fn render_stacked(html: &mut String, nodes: &[DocumentNode], classified: &Classified<'_>) {
    html.push_str("<div class=\"slide-layout-stacked\">\n");
    render_nodes(html, classified.titles.iter().copied(), ViewMode::Paginated);
    let body = nodes
        .iter()
        .filter(|n| !matches!(role_of(n), Some(ContentRole::Title) | None));
    render_nodes(html, body, ViewMode::Paginated);
    html.push_str("</div>\n");
}

fn render_split(html: &mut String, classified: &Classified<'_>) {
    render_nodes(html, classified.titles.iter().copied(), ViewMode::Paginated);
    html.push_str("<div class=\"slide-layout-split\">\n<div class=\"slide-text\">\n");
    if classified.text.is_empty() {
        html.push_str("<div class=\"slide-placeholder\">No text on this slide</div>\n");
    } else {
        render_nodes(html, classified.text.iter().copied(), ViewMode::Paginated);
    }
    html.push_str("</div>\n<div class=\"slide-media\">\n");
    if classified.media.is_empty() {
        html.push_str("<div class=\"slide-placeholder\">No media on this slide</div>\n");
    } else {
        for node in &classified.media {
            html.push_str("<div class=\"media-fit\">\n");
            render_node(html, node, ViewMode::Paginated);
            html.push_str("</div>\n");
        }
    }
    html.push_str("</div>\n</div>\n");
}

/// Whether a node renders at all in `mode`
fn is_visible(node: &DocumentNode, mode: ViewMode) -> bool {
    match &node.kind {
        NodeKind::Break | NodeKind::LayoutCommand { .. } => false,
        NodeKind::Container { name } if name == PRESENT_ONLY => mode == ViewMode::Paginated,
        NodeKind::Container { name } if name == TEXT_ONLY => mode == ViewMode::Linear,
        _ => true,
    }
}

fn render_nodes<'a>(
    html: &mut String,
    nodes: impl Iterator<Item = &'a DocumentNode>,
    mode: ViewMode,
) {
    for node in nodes {
        render_node(html, node, mode);
    }
}

/// Render a node; containers compose their children, sentinels vanish
pub fn render_node(html: &mut String, node: &DocumentNode, mode: ViewMode) {
    if !is_visible(node, mode) {
        return;
    }
    match &node.kind {
        NodeKind::Container { name } => {
            html.push_str(&format!(
                "<div class=\"directive directive-{}\">\n",
                escape_html(name)
            ));
            render_nodes(html, node.children.iter(), mode);
            html.push_str("</div>\n");
        }
        _ => {
            html.push_str(&node.html);
            html.push('\n');
        }
    }
}

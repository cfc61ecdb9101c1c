// ABOUTME: Slide segmentation for the lecture-deck application
// ABOUTME: Partitions a document node sequence into addressable slide units at heading and break boundaries

use crate::document::{DocumentNode, LayoutTag, NodeKind};
use crate::slug::Slugger;
use log::{debug, warn};
use serde::Serialize;

/// A contiguous run of document nodes shown as one page in paginated mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlideUnit {
    pub id: String,
    pub layout: LayoutTag,
    pub nodes: Vec<DocumentNode>,
}

impl SlideUnit {
    /// Text of the first heading in the unit, if any
    pub fn title(&self) -> Option<&str> {
        self.nodes
            .iter()
            .find(|n| n.heading_depth().is_some())
            .map(|n| n.text.as_str())
    }
}

/// Configuration for segmentation
#[derive(Debug, Clone)]
pub struct SegmentConfig {
    /// Heading depths that open a new unit
    pub break_depths: Vec<u8>,
    /// Id source for a leading unit without any heading
    pub intro_label: String,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            break_depths: vec![2, 3, 4],
            intro_label: "intro".to_string(),
        }
    }
}

/// Heading depths searched, in order, when naming a unit
const ID_DEPTH_PREFERENCE: [u8; 4] = [2, 1, 3, 4];

#[derive(Debug, Clone, Default)]
pub struct Segmenter {
    config: SegmentConfig,
}

struct Accumulator {
    nodes: Vec<DocumentNode>,
    layout: LayoutTag,
}

impl Segmenter {
    pub fn new(config: SegmentConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SegmentConfig {
        &self.config
    }

    fn is_breakable(&self, node: &DocumentNode) -> bool {
        node.heading_depth()
            .is_some_and(|depth| self.config.break_depths.contains(&depth))
    }

    /// Partition `nodes` into slide units.
    ///
    /// Concatenating the units' nodes gives back `nodes` without the break
    /// and layout-command sentinels. A document without any breakable heading
    /// comes back as exactly one unit, which is empty when nothing but
    /// sentinels was given.
    pub fn segment(&self, nodes: Vec<DocumentNode>) -> Vec<SlideUnit> {
        let splitting = nodes.iter().any(|n| self.is_breakable(n));
        let total = nodes.len();

        let mut register = LayoutTag::default();
        let mut current: Option<Accumulator> = None;
        let mut closed: Vec<Accumulator> = Vec::new();

        for node in nodes {
            match &node.kind {
                NodeKind::LayoutCommand { layout } => {
                    register = *layout;
                    continue;
                }
                NodeKind::Break => {
                    if splitting {
                        closed.extend(current.take());
                    }
                    continue;
                }
                NodeKind::Container { name } => warn_nested_sentinels(name, &node.children),
                _ => {}
            }

            if splitting && self.is_breakable(&node) {
                closed.extend(current.take());
            }

            current
                .get_or_insert_with(|| Accumulator {
                    nodes: Vec::new(),
                    layout: register,
                })
                .nodes
                .push(node);
        }
        closed.extend(current.take());
        if !splitting && closed.is_empty() {
            closed.push(Accumulator {
                nodes: Vec::new(),
                layout: register,
            });
        }

        let units = self.name_units(closed);
        debug!(
            "Segmented {} nodes into {} slide units (split: {})",
            total,
            units.len(),
            splitting
        );
        units
    }

    fn name_units(&self, segments: Vec<Accumulator>) -> Vec<SlideUnit> {
        let mut slugger = Slugger::new();

        segments
            .into_iter()
            .enumerate()
            .map(|(idx, segment)| {
                let ordinal_label = format!("slide-{}", idx + 1);
                let heading_text = ID_DEPTH_PREFERENCE.iter().find_map(|depth| {
                    segment
                        .nodes
                        .iter()
                        .find(|n| n.heading_depth() == Some(*depth))
                        .map(|n| n.text.trim())
                });
                let text = match heading_text {
                    Some(text) => text,
                    None if idx == 0 => self.config.intro_label.as_str(),
                    None => ordinal_label.as_str(),
                };
                SlideUnit {
                    id: slugger.slug(text, &ordinal_label),
                    layout: segment.layout,
                    nodes: segment.nodes,
                }
            })
            .collect()
    }
}

fn warn_nested_sentinels(container: &str, children: &[DocumentNode]) {
    let nested = children.iter().filter(|c| c.is_sentinel()).count();
    if nested > 0 {
        warn!(
            "Ignoring {} slide sentinel(s) nested inside directive '{}'",
            nested, container
        );
    }
}

/// Segment with the default configuration
pub fn segment(nodes: Vec<DocumentNode>) -> Vec<SlideUnit> {
    Segmenter::default().segment(nodes)
}

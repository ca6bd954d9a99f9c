//! Marker Protocol
//!
//! A dynamically-owned region is delimited in markup by two comment nodes:
//! `<!--s:ID-->` before it and `<!--e:ID-->` after it. The payloads are
//! bit-exact — `s:` and `e:` prefixes followed by the region's stable id —
//! because the client locates regions by scanning for exactly these
//! comments in the parsed tree. Everything between the pair, in document
//! order, is the region's content.

use std::collections::BTreeMap;

use super::node::DomNode;
use crate::error::DomError;
use crate::hydrate::payload::RegionKind;
use crate::reactive::CellId;

/// Start-marker comment payload for a region id.
pub fn start_marker(id: &str) -> String {
    format!("s:{id}")
}

/// End-marker comment payload for a region id.
pub fn end_marker(id: &str) -> String {
    format!("e:{id}")
}

/// Extract the region id from a start-marker payload.
pub fn parse_start(comment: &str) -> Option<&str> {
    comment.strip_prefix("s:")
}

/// Extract the region id from an end-marker payload.
pub fn parse_end(comment: &str) -> Option<&str> {
    comment.strip_prefix("e:")
}

/// Region metadata recorded during a render, keyed by the cell's identity
/// until capture assigns graph positions.
#[derive(Debug, Clone)]
pub struct RegionRecord {
    /// The driving cell, when the region holds a reactive binding.
    pub cell: Option<CellId>,
    /// What the region holds.
    pub kind: RegionKind,
}

/// Handle to a marker-delimited region inside an existing tree.
///
/// The handle stores the containing node and the region id; marker
/// positions are located on every use, so surrounding siblings may move
/// without invalidating the handle.
#[derive(Clone)]
pub struct RegionHandle {
    parent: DomNode,
    id: String,
}

impl RegionHandle {
    /// The region's id.
    pub fn id(&self) -> &str {
        &self.id
    }

    fn locate(&self) -> Result<(usize, usize, Vec<DomNode>), DomError> {
        let children = self.parent.children();
        let start_text = start_marker(&self.id);
        let end_text = end_marker(&self.id);

        let start = children
            .iter()
            .position(|child| child.comment_text().as_deref() == Some(start_text.as_str()))
            .ok_or_else(|| DomError::RegionMarkers {
                id: self.id.clone(),
            })?;
        let end = children
            .iter()
            .skip(start + 1)
            .position(|child| child.comment_text().as_deref() == Some(end_text.as_str()))
            .map(|offset| start + 1 + offset)
            .ok_or_else(|| DomError::RegionMarkers {
                id: self.id.clone(),
            })?;

        Ok((start, end, children))
    }

    /// Update the region's text in place.
    ///
    /// The single text node between the markers is mutated; no nodes are
    /// replaced. An empty region gains its text node; any other shape is an
    /// error so markup drift surfaces instead of being papered over.
    pub fn set_text(&self, text: &str) -> Result<(), DomError> {
        let (start, end, children) = self.locate()?;
        match end - start {
            1 => self.parent.insert_child(start + 1, &DomNode::new_text(text)),
            2 => {
                let node = &children[start + 1];
                if node.text().is_some() {
                    node.set_text(text)
                } else {
                    Err(DomError::RegionShape {
                        id: self.id.clone(),
                    })
                }
            }
            _ => Err(DomError::RegionShape {
                id: self.id.clone(),
            }),
        }
    }

    /// The region's single text node, if it has exactly that shape.
    pub fn text_node(&self) -> Option<DomNode> {
        let (start, end, children) = self.locate().ok()?;
        if end - start == 2 && children[start + 1].text().is_some() {
            Some(children[start + 1].clone())
        } else {
            None
        }
    }

    /// The region's text, if it holds a single text node.
    pub fn text(&self) -> Option<String> {
        self.text_node().and_then(|node| node.text())
    }
}

impl std::fmt::Debug for RegionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionHandle").field("id", &self.id).finish()
    }
}

/// Find every marker-delimited region under `root`.
///
/// A start marker with no matching end marker in the same child list is
/// reported and skipped; it never produces a half-open region.
pub fn scan_regions(root: &DomNode) -> BTreeMap<String, RegionHandle> {
    let mut regions = BTreeMap::new();
    walk(root, &mut regions);
    regions
}

fn walk(node: &DomNode, regions: &mut BTreeMap<String, RegionHandle>) {
    let children = node.children();
    for child in &children {
        if let Some(comment) = child.comment_text() {
            if let Some(id) = parse_start(&comment) {
                let end_text = end_marker(id);
                let has_end = children
                    .iter()
                    .any(|sibling| sibling.comment_text().as_deref() == Some(end_text.as_str()));
                if has_end {
                    regions.insert(
                        id.to_string(),
                        RegionHandle {
                            parent: node.clone(),
                            id: id.to_string(),
                        },
                    );
                } else {
                    tracing::warn!(region = id, "start marker without matching end; skipping");
                }
            }
        }
    }
    for child in children {
        walk(&child, regions);
    }
}

//! In-Memory Document
//!
//! A small DOM emulation: enough tree, attribute, and serialization surface
//! to build markup on the server and to locate and mutate existing regions
//! on the client. It is not a virtual DOM and never diffs; dynamic updates
//! flow through cell observers that mutate nodes in place.
//!
//! The [`Document`] is the factory. In render mode it creates nodes and
//! records a marker region for every reactive binding. In hydrate mode the
//! same factory calls *bind* instead of create: reactive bindings attach to
//! the regions an existing tree already contains, and no new nodes are
//! produced for content that markup already encodes.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::casemap::CaseMappedMap;
use super::markers::{end_marker, start_marker, RegionHandle, RegionRecord};
use crate::error::DomError;
use crate::hydrate::payload::RegionKind;
use crate::reactive::{Cell, CellValue, ErasedCell, ObserverId};

/// Tags serialized without a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

enum NodeData {
    Element {
        tag: String,
        attrs: BTreeMap<String, String>,
        style: CaseMappedMap,
        dataset: CaseMappedMap,
        children: Vec<DomNode>,
    },
    Text {
        text: String,
    },
    Comment {
        text: String,
    },
    Fragment {
        children: Vec<DomNode>,
    },
}

/// Handle to one node of the in-memory tree. Cheap to clone; all clones
/// share the node.
#[derive(Clone)]
pub struct DomNode {
    inner: Arc<RwLock<NodeData>>,
}

impl DomNode {
    fn from_data(data: NodeData) -> Self {
        Self {
            inner: Arc::new(RwLock::new(data)),
        }
    }

    pub(crate) fn element(tag: &str) -> Self {
        Self::from_data(NodeData::Element {
            tag: tag.to_ascii_lowercase(),
            attrs: BTreeMap::new(),
            style: CaseMappedMap::new(),
            dataset: CaseMappedMap::new(),
            children: Vec::new(),
        })
    }

    pub(crate) fn new_text(text: &str) -> Self {
        Self::from_data(NodeData::Text {
            text: text.to_string(),
        })
    }

    pub(crate) fn comment(text: &str) -> Self {
        Self::from_data(NodeData::Comment {
            text: text.to_string(),
        })
    }

    pub(crate) fn fragment() -> Self {
        Self::from_data(NodeData::Fragment {
            children: Vec::new(),
        })
    }

    /// Whether two handles point at the same node.
    pub fn ptr_eq(&self, other: &DomNode) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Append a child. Fails on text and comment nodes.
    pub fn append_child(&self, child: &DomNode) -> Result<(), DomError> {
        match &mut *self.inner.write() {
            NodeData::Element { children, .. } | NodeData::Fragment { children } => {
                children.push(child.clone());
                Ok(())
            }
            _ => Err(DomError::NotAContainer),
        }
    }

    /// Insert a child at the given index. Fails on leaves and bad indices.
    pub fn insert_child(&self, index: usize, child: &DomNode) -> Result<(), DomError> {
        match &mut *self.inner.write() {
            NodeData::Element { children, .. } | NodeData::Fragment { children } => {
                if index > children.len() {
                    return Err(DomError::IndexOutOfBounds { index });
                }
                children.insert(index, child.clone());
                Ok(())
            }
            _ => Err(DomError::NotAContainer),
        }
    }

    /// Child handles, in document order. Empty for leaves.
    pub fn children(&self) -> Vec<DomNode> {
        match &*self.inner.read() {
            NodeData::Element { children, .. } | NodeData::Fragment { children } => {
                children.clone()
            }
            _ => Vec::new(),
        }
    }

    /// Number of children.
    pub fn child_count(&self) -> usize {
        match &*self.inner.read() {
            NodeData::Element { children, .. } | NodeData::Fragment { children } => children.len(),
            _ => 0,
        }
    }

    /// The element tag, lowercased.
    pub fn tag(&self) -> Option<String> {
        match &*self.inner.read() {
            NodeData::Element { tag, .. } => Some(tag.clone()),
            _ => None,
        }
    }

    /// The content of a text node.
    pub fn text(&self) -> Option<String> {
        match &*self.inner.read() {
            NodeData::Text { text } => Some(text.clone()),
            _ => None,
        }
    }

    /// Replace the content of a text node.
    pub fn set_text(&self, text: &str) -> Result<(), DomError> {
        match &mut *self.inner.write() {
            NodeData::Text { text: current } => {
                *current = text.to_string();
                Ok(())
            }
            _ => Err(DomError::NotText),
        }
    }

    /// The payload of a comment node.
    pub fn comment_text(&self) -> Option<String> {
        match &*self.inner.read() {
            NodeData::Comment { text } => Some(text.clone()),
            _ => None,
        }
    }

    /// Set an attribute. Fails on non-elements.
    pub fn set_attribute(&self, name: &str, value: &str) -> Result<(), DomError> {
        match &mut *self.inner.write() {
            NodeData::Element { attrs, .. } => {
                attrs.insert(name.to_string(), value.to_string());
                Ok(())
            }
            _ => Err(DomError::NotAContainer),
        }
    }

    /// Read an attribute.
    pub fn attribute(&self, name: &str) -> Option<String> {
        match &*self.inner.read() {
            NodeData::Element { attrs, .. } => attrs.get(name).cloned(),
            _ => None,
        }
    }

    /// Set a style property, by either camelCase or kebab-case name.
    pub fn set_style(&self, name: &str, value: &str) -> Result<(), DomError> {
        match &mut *self.inner.write() {
            NodeData::Element { style, .. } => {
                style.set(name, value);
                Ok(())
            }
            _ => Err(DomError::NotAContainer),
        }
    }

    /// Read a style property, by either spelling.
    pub fn style(&self, name: &str) -> Option<String> {
        match &*self.inner.read() {
            NodeData::Element { style, .. } => style.get(name).map(str::to_string),
            _ => None,
        }
    }

    /// Set a dataset entry, by either spelling. Serialized as `data-*`.
    pub fn set_data(&self, name: &str, value: &str) -> Result<(), DomError> {
        match &mut *self.inner.write() {
            NodeData::Element { dataset, .. } => {
                dataset.set(name, value);
                Ok(())
            }
            _ => Err(DomError::NotAContainer),
        }
    }

    /// Read a dataset entry, by either spelling.
    pub fn data(&self, name: &str) -> Option<String> {
        match &*self.inner.read() {
            NodeData::Element { dataset, .. } => dataset.get(name).map(str::to_string),
            _ => None,
        }
    }

    /// Concatenated text of this node and its descendants.
    pub fn text_content(&self) -> String {
        match &*self.inner.read() {
            NodeData::Text { text } => text.clone(),
            NodeData::Comment { .. } => String::new(),
            NodeData::Element { children, .. } | NodeData::Fragment { children } => {
                children.iter().map(DomNode::text_content).collect()
            }
        }
    }

    fn push_child(&self, child: DomNode) {
        if let NodeData::Element { children, .. } | NodeData::Fragment { children } =
            &mut *self.inner.write()
        {
            children.push(child);
        }
    }

    /// Serialize this node and its subtree to HTML.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        self.write_html(&mut out);
        out
    }

    fn write_html(&self, out: &mut String) {
        match &*self.inner.read() {
            NodeData::Text { text } => escape_text(text, out),
            NodeData::Comment { text } => {
                out.push_str("<!--");
                out.push_str(text);
                out.push_str("-->");
            }
            NodeData::Fragment { children } => {
                for child in children {
                    child.write_html(out);
                }
            }
            NodeData::Element {
                tag,
                attrs,
                style,
                dataset,
                children,
            } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attrs {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    escape_attr(value, out);
                    out.push('"');
                }
                if !style.is_empty() {
                    out.push_str(" style=\"");
                    let mut first = true;
                    for (name, value) in style.iter() {
                        if !first {
                            out.push(' ');
                        }
                        out.push_str(name);
                        out.push(':');
                        escape_attr(value, out);
                        out.push(';');
                        first = false;
                    }
                    out.push('"');
                }
                for (name, value) in dataset.iter() {
                    out.push_str(" data-");
                    out.push_str(name);
                    out.push_str("=\"");
                    escape_attr(value, out);
                    out.push('"');
                }
                out.push('>');
                if VOID_ELEMENTS.contains(&tag.as_str()) {
                    return;
                }
                for child in children {
                    child.write_html(out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }
}

impl std::fmt::Debug for DomNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &*self.inner.read() {
            NodeData::Element { tag, children, .. } => f
                .debug_struct("Element")
                .field("tag", tag)
                .field("children", &children.len())
                .finish(),
            NodeData::Text { text } => f.debug_tuple("Text").field(text).finish(),
            NodeData::Comment { text } => f.debug_tuple("Comment").field(text).finish(),
            NodeData::Fragment { children } => {
                f.debug_tuple("Fragment").field(&children.len()).finish()
            }
        }
    }
}

fn escape_text(input: &str, out: &mut String) {
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
}

fn escape_attr(input: &str, out: &mut String) {
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
}

enum DocMode {
    Render,
    Hydrate {
        regions: BTreeMap<String, RegionHandle>,
    },
}

struct DocInner {
    mode: DocMode,
    next_marker: AtomicU64,
    regions: Mutex<BTreeMap<String, RegionRecord>>,
    bindings: Mutex<Vec<(Arc<dyn ErasedCell>, ObserverId)>>,
}

/// Node factory for one render or one hydration pass.
///
/// Marker ids are allocated in call order, which is what lets a hydration
/// pass re-executing the same component code line its bindings up with the
/// regions the server emitted.
#[derive(Clone)]
pub struct Document {
    inner: Arc<DocInner>,
}

impl Document {
    /// A document in render mode: nodes are created, regions recorded.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DocInner {
                mode: DocMode::Render,
                next_marker: AtomicU64::new(0),
                regions: Mutex::new(BTreeMap::new()),
                bindings: Mutex::new(Vec::new()),
            }),
        }
    }

    /// A document in hydrate mode: reactive bindings attach to the given
    /// pre-existing regions instead of creating nodes.
    pub(crate) fn for_hydration(regions: BTreeMap<String, RegionHandle>) -> Self {
        Self {
            inner: Arc::new(DocInner {
                mode: DocMode::Hydrate { regions },
                next_marker: AtomicU64::new(0),
                regions: Mutex::new(BTreeMap::new()),
                bindings: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Create an element node.
    pub fn create_element(&self, tag: &str) -> DomNode {
        DomNode::element(tag)
    }

    /// Create a text node.
    pub fn create_text_node(&self, text: &str) -> DomNode {
        DomNode::new_text(text)
    }

    /// Create a comment node.
    pub fn create_comment(&self, text: &str) -> DomNode {
        DomNode::comment(text)
    }

    /// Create an empty document fragment.
    pub fn create_document_fragment(&self) -> DomNode {
        DomNode::fragment()
    }

    fn next_marker_id(&self) -> String {
        self.inner
            .next_marker
            .fetch_add(1, Ordering::Relaxed)
            .to_string()
    }

    /// A text region driven by a cell.
    ///
    /// Render mode returns `<!--s:N-->text<!--e:N-->` with an observer
    /// keeping the text current until the markup is serialized. Hydrate
    /// mode creates nothing: it binds the cell to the existing region and
    /// returns the text node already in the tree. A marker with no matching
    /// region in the tree is left unbound and logged; sibling regions are
    /// unaffected.
    pub fn reactive_text<T>(&self, cell: &Cell<T>) -> DomNode
    where
        T: CellValue + Display,
    {
        let marker = self.next_marker_id();
        match &self.inner.mode {
            DocMode::Render => {
                let text = DomNode::new_text(&cell.get().to_string());
                let watched = text.clone();
                let observer = cell.observe(move |value| {
                    let _ = watched.set_text(&value.to_string());
                });
                self.inner.bindings.lock().push((cell.erased(), observer));
                self.inner.regions.lock().insert(
                    marker.clone(),
                    RegionRecord {
                        cell: Some(cell.id()),
                        kind: RegionKind::Text,
                    },
                );

                let fragment = DomNode::fragment();
                fragment.push_child(DomNode::comment(&start_marker(&marker)));
                fragment.push_child(text);
                fragment.push_child(DomNode::comment(&end_marker(&marker)));
                fragment
            }
            DocMode::Hydrate { regions } => match regions.get(&marker) {
                None => {
                    tracing::warn!(%marker, "no matching region in document; leaving unbound");
                    DomNode::new_text(&cell.get().to_string())
                }
                Some(handle) => {
                    let region = handle.clone();
                    let observer = cell.observe(move |value| {
                        if let Err(err) = region.set_text(&value.to_string()) {
                            tracing::warn!(error = %err, "failed to update hydrated region");
                        }
                    });
                    self.inner.bindings.lock().push((cell.erased(), observer));
                    handle
                        .text_node()
                        .unwrap_or_else(|| DomNode::new_text(&cell.get().to_string()))
                }
            },
        }
    }

    /// A marker-delimited fragment boundary around the given children.
    ///
    /// Hydrate mode returns an empty fragment: the structure is already in
    /// the tree.
    pub fn region_fragment(&self, children: Vec<DomNode>) -> DomNode {
        let marker = self.next_marker_id();
        match &self.inner.mode {
            DocMode::Render => {
                self.inner.regions.lock().insert(
                    marker.clone(),
                    RegionRecord {
                        cell: None,
                        kind: RegionKind::Fragment,
                    },
                );
                let fragment = DomNode::fragment();
                fragment.push_child(DomNode::comment(&start_marker(&marker)));
                for child in children {
                    fragment.push_child(child);
                }
                fragment.push_child(DomNode::comment(&end_marker(&marker)));
                fragment
            }
            DocMode::Hydrate { .. } => DomNode::fragment(),
        }
    }

    /// Regions recorded while rendering, consumed at capture time.
    pub(crate) fn take_regions(&self) -> BTreeMap<String, RegionRecord> {
        std::mem::take(&mut *self.inner.regions.lock())
    }

    /// Observer bindings attached so far, consumed by the hydration handle.
    pub(crate) fn take_bindings(&self) -> Vec<(Arc<dyn ErasedCell>, ObserverId)> {
        std::mem::take(&mut *self.inner.bindings.lock())
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

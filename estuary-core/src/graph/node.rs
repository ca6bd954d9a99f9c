//! Graph Data Model
//!
//! The captured dependency graph is wire data: it travels inside the
//! hydration payload, so its shape is fixed. Each node carries a positional
//! integer id and, for derived nodes, the ids of its parents in derivation
//! order. Roots omit the `parents` field entirely rather than writing an
//! empty array; consumers must treat the two as identical.

use serde::{Deserialize, Serialize};

/// One node of a captured dependency graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Positional id, assigned from registration order.
    pub id: u32,

    /// Parent ids in derivation order. Omitted (not empty) for roots, as a
    /// serialization-size optimization with no semantic weight.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parents: Option<Vec<u32>>,
}

impl GraphNode {
    /// A node with no parents.
    pub fn root(id: u32) -> Self {
        Self { id, parents: None }
    }

    /// A node derived from the given parents.
    pub fn derived(id: u32, parents: Vec<u32>) -> Self {
        Self {
            id,
            parents: Some(parents),
        }
    }

    /// Parent ids, with an omitted field reading as an empty list.
    pub fn parent_ids(&self) -> &[u32] {
        self.parents.as_deref().unwrap_or(&[])
    }

    /// Whether the node records no parents at all.
    pub fn is_parentless(&self) -> bool {
        self.parent_ids().is_empty()
    }
}

/// A captured dependency graph: one per scope snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyGraph {
    /// Every captured node, ordered by id.
    pub nodes: Vec<GraphNode>,
    /// Ids of every node captured from a root cell.
    pub root_ids: Vec<u32>,
}

impl DependencyGraph {
    /// Look up a node by id.
    pub fn node(&self, id: u32) -> Option<&GraphNode> {
        self.nodes.iter().find(|node| node.id == id)
    }

    /// Whether the root set lists the given id.
    pub fn is_root(&self, id: u32) -> bool {
        self.root_ids.contains(&id)
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

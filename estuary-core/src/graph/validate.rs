//! Graph Validator
//!
//! Structural soundness checks for a dependency graph before it is trusted,
//! intended for tests and for payloads of uncertain origin (anything that
//! crossed a process boundary).
//!
//! Every check runs independently and every failure is reported; nothing
//! short-circuits and nothing is thrown. Callers decide whether to
//! log-and-proceed or hard-fail.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use thiserror::Error;

use super::node::{DependencyGraph, GraphNode};

/// One structural problem found in a graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationIssue {
    /// A node references a parent id absent from the node array.
    #[error("node {node} references missing parent {parent}")]
    DanglingParent {
        /// The referencing node.
        node: u32,
        /// The missing parent id.
        parent: u32,
    },

    /// A node is reachable from itself through parent edges.
    #[error("node {node} participates in a dependency cycle")]
    Cycle {
        /// A node on the cycle.
        node: u32,
    },

    /// A listed root records parents.
    #[error("root {node} has recorded parents")]
    RootWithParents {
        /// The offending root id.
        node: u32,
    },

    /// A parentless node is missing from the root set.
    #[error("parentless node {node} is missing from the root set")]
    UnlistedRoot {
        /// The offending node id.
        node: u32,
    },

    /// The root set lists an id with no corresponding node.
    #[error("root set lists unknown node {node}")]
    UnknownRoot {
        /// The unknown id.
        node: u32,
    },
}

/// The full list of issues found by [`validate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// Every issue found, in check order.
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    /// Whether the graph passed every check.
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.issues.is_empty() {
            return write!(f, "no issues");
        }
        for (index, issue) in self.issues.iter().enumerate() {
            if index > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Unvisited,
    OnStack,
    Done,
}

/// Validate a graph, reporting every structural issue found.
///
/// Pure function: no side effects, never panics, never errors.
pub fn validate(graph: &DependencyGraph) -> ValidationReport {
    let mut issues = Vec::new();
    let by_id: HashMap<u32, &GraphNode> =
        graph.nodes.iter().map(|node| (node.id, node)).collect();

    // Every referenced parent must exist.
    for node in &graph.nodes {
        for &parent in node.parent_ids() {
            if !by_id.contains_key(&parent) {
                issues.push(ValidationIssue::DanglingParent {
                    node: node.id,
                    parent,
                });
            }
        }
    }

    // The parent relation must be acyclic. Depth-first walk with a
    // recursion stack; a parent found on the stack names a cycle member.
    {
        let mut marks: HashMap<u32, Mark> = graph
            .nodes
            .iter()
            .map(|node| (node.id, Mark::Unvisited))
            .collect();
        let mut flagged = BTreeSet::new();
        for node in &graph.nodes {
            if marks.get(&node.id) == Some(&Mark::Unvisited) {
                visit(node.id, &by_id, &mut marks, &mut flagged);
            }
        }
        for node in flagged {
            issues.push(ValidationIssue::Cycle { node });
        }
    }

    // The root set must exactly match the parentless nodes.
    for &root in &graph.root_ids {
        match by_id.get(&root) {
            None => issues.push(ValidationIssue::UnknownRoot { node: root }),
            Some(node) if !node.parent_ids().is_empty() => {
                issues.push(ValidationIssue::RootWithParents { node: root });
            }
            Some(_) => {}
        }
    }
    let root_set: BTreeSet<u32> = graph.root_ids.iter().copied().collect();
    for node in &graph.nodes {
        if node.parent_ids().is_empty() && !root_set.contains(&node.id) {
            issues.push(ValidationIssue::UnlistedRoot { node: node.id });
        }
    }

    ValidationReport { issues }
}

fn visit(
    id: u32,
    by_id: &HashMap<u32, &GraphNode>,
    marks: &mut HashMap<u32, Mark>,
    flagged: &mut BTreeSet<u32>,
) {
    marks.insert(id, Mark::OnStack);
    if let Some(node) = by_id.get(&id) {
        for &parent in node.parent_ids() {
            match marks.get(&parent) {
                Some(Mark::OnStack) => {
                    flagged.insert(parent);
                }
                Some(Mark::Unvisited) => visit(parent, by_id, marks, flagged),
                // Dangling parents are reported by their own check.
                Some(Mark::Done) | None => {}
            }
        }
    }
    marks.insert(id, Mark::Done);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(nodes: Vec<GraphNode>, root_ids: Vec<u32>) -> DependencyGraph {
        DependencyGraph { nodes, root_ids }
    }

    #[test]
    fn well_formed_graph_passes() {
        let g = graph(
            vec![
                GraphNode::root(0),
                GraphNode::root(1),
                GraphNode::derived(2, vec![0, 1]),
            ],
            vec![0, 1],
        );

        let report = validate(&g);
        assert!(report.is_valid(), "unexpected issues: {report}");
    }

    #[test]
    fn dangling_parent_is_reported() {
        let g = graph(
            vec![GraphNode::root(0), GraphNode::derived(1, vec![9])],
            vec![0],
        );

        let report = validate(&g);
        assert!(report
            .issues
            .contains(&ValidationIssue::DanglingParent { node: 1, parent: 9 }));
    }

    #[test]
    fn two_node_cycle_is_reported() {
        let g = graph(
            vec![
                GraphNode::derived(0, vec![1]),
                GraphNode::derived(1, vec![0]),
            ],
            vec![],
        );

        let report = validate(&g);
        assert!(report
            .issues
            .iter()
            .any(|issue| matches!(issue, ValidationIssue::Cycle { .. })));
    }

    #[test]
    fn self_cycle_is_reported() {
        let g = graph(vec![GraphNode::derived(0, vec![0])], vec![]);

        let report = validate(&g);
        assert!(report
            .issues
            .contains(&ValidationIssue::Cycle { node: 0 }));
    }

    #[test]
    fn root_with_parents_is_reported() {
        let g = graph(
            vec![GraphNode::root(0), GraphNode::derived(1, vec![0])],
            vec![0, 1],
        );

        let report = validate(&g);
        assert!(report
            .issues
            .contains(&ValidationIssue::RootWithParents { node: 1 }));
    }

    #[test]
    fn parentless_node_missing_from_roots_is_reported() {
        let g = graph(vec![GraphNode::root(0), GraphNode::root(1)], vec![0]);

        let report = validate(&g);
        assert!(report
            .issues
            .contains(&ValidationIssue::UnlistedRoot { node: 1 }));
    }

    #[test]
    fn unknown_root_id_is_reported() {
        let g = graph(vec![GraphNode::root(0)], vec![0, 5]);

        let report = validate(&g);
        assert!(report
            .issues
            .contains(&ValidationIssue::UnknownRoot { node: 5 }));
    }

    #[test]
    fn all_issues_are_reported_together() {
        // Dangling parent, a cycle, and a root-set mismatch at once.
        let g = graph(
            vec![
                GraphNode::derived(0, vec![1]),
                GraphNode::derived(1, vec![0, 9]),
                GraphNode::root(2),
            ],
            vec![],
        );

        let report = validate(&g);
        assert!(!report.is_valid());
        assert!(report.issues.len() >= 3);
        assert!(report
            .issues
            .contains(&ValidationIssue::DanglingParent { node: 1, parent: 9 }));
        assert!(report
            .issues
            .contains(&ValidationIssue::UnlistedRoot { node: 2 }));
        assert!(report
            .issues
            .iter()
            .any(|issue| matches!(issue, ValidationIssue::Cycle { .. })));
    }

    #[test]
    fn empty_parents_array_counts_as_parentless() {
        let g = graph(vec![GraphNode::derived(0, vec![])], vec![]);

        let report = validate(&g);
        assert!(report
            .issues
            .contains(&ValidationIssue::UnlistedRoot { node: 0 }));
    }
}

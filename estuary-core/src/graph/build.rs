//! Graph Builder
//!
//! Turns a scope's ordered registry into a compact dependency graph.
//!
//! # Id assignment
//!
//! Nodes get integer ids `0..n-1` strictly by registration position. The id
//! is independent of any cell's own identity counter: stability comes from
//! insertion order, so two structurally identical renders produce
//! byte-identical graphs regardless of how many cells other renders created
//! in between.
//!
//! # Excluded parents
//!
//! A parent missing from the registry is a fatal capture bug *unless* that
//! parent was excluded from hydration, in which case the edge is omitted:
//! an excluded parent sits outside the graph entirely.

use std::collections::HashMap;
use std::sync::Arc;

use super::node::{DependencyGraph, GraphNode};
use crate::error::CaptureError;
use crate::reactive::{CellId, ErasedCell};

/// A built graph plus the cell-id → position map used to key root values
/// and marker regions by node id.
pub struct BuiltGraph {
    /// The captured graph.
    pub graph: DependencyGraph,
    /// Position assigned to each registered cell.
    pub positions: HashMap<CellId, u32>,
}

/// Build a dependency graph from cells in registration order.
///
/// Root-set membership follows each cell's derived flag, not its parent
/// count: a derived cell keeps its derived classification even if every one
/// of its recorded edges was dropped for other reasons.
pub fn build_dependency_graph(
    cells: &[Arc<dyn ErasedCell>],
) -> Result<BuiltGraph, CaptureError> {
    let mut positions = HashMap::with_capacity(cells.len());
    for (index, cell) in cells.iter().enumerate() {
        positions.insert(cell.cell_id(), index as u32);
    }

    let mut nodes = Vec::with_capacity(cells.len());
    let mut root_ids = Vec::new();
    for (index, cell) in cells.iter().enumerate() {
        let id = index as u32;
        if cell.is_derived() {
            let mut parents = Vec::new();
            for parent in cell.parent_refs() {
                match positions.get(&parent.id) {
                    Some(&position) => parents.push(position),
                    None if parent.excluded => {}
                    None => {
                        return Err(CaptureError::MissingParent {
                            child: cell.cell_id(),
                            parent: parent.id,
                        });
                    }
                }
            }
            nodes.push(GraphNode::derived(id, parents));
        } else {
            nodes.push(GraphNode::root(id));
            root_ids.push(id);
        }
    }

    Ok(BuiltGraph {
        graph: DependencyGraph { nodes, root_ids },
        positions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Cell, RenderScope};

    #[test]
    fn roots_are_listed_and_carry_no_parents() {
        let scope = RenderScope::new();
        scope
            .run(|| {
                let _a = Cell::new(1);
                let _b = Cell::new(2);
            })
            .unwrap();

        let built = build_dependency_graph(&scope.registered()).unwrap();
        assert_eq!(built.graph.root_ids, vec![0, 1]);
        assert!(built.graph.nodes.iter().all(|node| node.parents.is_none()));
    }

    #[test]
    fn derived_nodes_record_parents_in_order() {
        let scope = RenderScope::new();
        scope
            .run(|| {
                let a = Cell::new(1);
                let b = Cell::new(2);
                let _sum = Cell::derive((a, b), |(x, y)| x + y);
            })
            .unwrap();

        let built = build_dependency_graph(&scope.registered()).unwrap();
        assert_eq!(built.graph.nodes[2].parent_ids(), &[0, 1]);
        assert_eq!(built.graph.root_ids, vec![0, 1]);
    }

    #[test]
    fn identical_renders_produce_identical_graphs() {
        let render = || {
            let scope = RenderScope::new();
            scope
                .run(|| {
                    let a = Cell::new(1);
                    let b = Cell::derive(a.clone(), |x| x + 1);
                    let _c = Cell::derive((a, b), |(x, y)| x * y);
                })
                .unwrap();
            build_dependency_graph(&scope.registered()).unwrap().graph
        };

        let first = render();
        let second = render();
        assert_eq!(first, second);
    }

    #[test]
    fn unregistered_parent_is_fatal() {
        // Constructed outside any scope, so never registered.
        let stray = Cell::new(1);

        let scope = RenderScope::new();
        scope
            .run(|| {
                let _child = Cell::derive(stray.clone(), |x| x + 1);
            })
            .unwrap();

        let result = build_dependency_graph(&scope.registered());
        assert!(matches!(
            result,
            Err(CaptureError::MissingParent { parent, .. }) if parent == stray.id()
        ));
    }

    #[test]
    fn excluded_parent_edge_is_omitted() {
        let scope = RenderScope::new();
        scope
            .run(|| {
                let path = Cell::ephemeral("/a".to_string());
                let count = Cell::new(2usize);
                let _mixed = Cell::derive((path, count), |(p, n)| p.len() + n);
            })
            .unwrap();

        let built = build_dependency_graph(&scope.registered()).unwrap();
        // Registry holds the counter root and the derived cell only.
        assert_eq!(built.graph.len(), 2);
        assert_eq!(built.graph.nodes[1].parent_ids(), &[0]);
        assert_eq!(built.graph.root_ids, vec![0]);
    }

    #[test]
    fn fully_excluded_derivation_stays_out_of_the_graph() {
        let scope = RenderScope::new();
        scope
            .run(|| {
                let path = Cell::ephemeral("/a/b".to_string());
                let _depth = Cell::derive(path, |p: String| p.matches('/').count());
                let _kept = Cell::new(1);
            })
            .unwrap();

        let built = build_dependency_graph(&scope.registered()).unwrap();
        assert_eq!(built.graph.len(), 1);
        assert_eq!(built.graph.root_ids, vec![0]);
    }

    #[test]
    fn positions_map_matches_registration_order() {
        let scope = RenderScope::new();
        let (a, b) = scope
            .run(|| {
                let a = Cell::new(1);
                let b = Cell::derive(a.clone(), |x| x + 1);
                (a, b)
            })
            .unwrap();

        let built = build_dependency_graph(&scope.registered()).unwrap();
        assert_eq!(built.positions[&a.id()], 0);
        assert_eq!(built.positions[&b.id()], 1);
    }
}

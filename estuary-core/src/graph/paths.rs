//! Root-Path Resolver
//!
//! Answers "how does this node reach its roots?" over a captured graph.
//! Used for diagnostics and for partial-hydration decisions.
//!
//! Paths are sequences of *parent-array indices*, not node ids: they encode
//! which edge was followed at each step, which distinguishes the two arms of
//! a diamond even though both end at the same root.

use std::collections::{BTreeSet, HashMap};

use smallvec::SmallVec;

use super::node::{DependencyGraph, GraphNode};

/// Every index-path from `node_id` down to a root.
///
/// A root yields a single empty path. An unknown id yields no paths; the
/// validator is the place to report that. Dangling edges are skipped, and an
/// on-stack guard keeps the walk finite on cyclic input.
pub fn find_paths_to_roots(graph: &DependencyGraph, node_id: u32) -> Vec<Vec<usize>> {
    let by_id: HashMap<u32, &GraphNode> =
        graph.nodes.iter().map(|node| (node.id, node)).collect();

    let mut paths = Vec::new();
    if !by_id.contains_key(&node_id) {
        return paths;
    }
    let mut trail: SmallVec<[usize; 8]> = SmallVec::new();
    let mut on_stack = BTreeSet::new();
    walk(node_id, &by_id, &mut trail, &mut on_stack, &mut paths);
    paths
}

fn walk(
    id: u32,
    by_id: &HashMap<u32, &GraphNode>,
    trail: &mut SmallVec<[usize; 8]>,
    on_stack: &mut BTreeSet<u32>,
    paths: &mut Vec<Vec<usize>>,
) {
    let Some(node) = by_id.get(&id) else {
        return;
    };
    if !on_stack.insert(id) {
        return;
    }

    let parents = node.parent_ids();
    if parents.is_empty() {
        paths.push(trail.to_vec());
    } else {
        for (index, &parent) in parents.iter().enumerate() {
            trail.push(index);
            walk(parent, by_id, trail, on_stack, paths);
            trail.pop();
        }
    }

    on_stack.remove(&id);
}

/// The deduplicated set of root ids reachable from `node_id`, in ascending
/// order.
///
/// Uses a visited set, so diamond fan-in stays linear in graph size where
/// full path enumeration would be exponential.
pub fn find_root_dependencies(graph: &DependencyGraph, node_id: u32) -> Vec<u32> {
    let by_id: HashMap<u32, &GraphNode> =
        graph.nodes.iter().map(|node| (node.id, node)).collect();

    let mut visited = BTreeSet::new();
    let mut roots = BTreeSet::new();
    collect(node_id, &by_id, &mut visited, &mut roots);
    roots.into_iter().collect()
}

fn collect(
    id: u32,
    by_id: &HashMap<u32, &GraphNode>,
    visited: &mut BTreeSet<u32>,
    roots: &mut BTreeSet<u32>,
) {
    if !visited.insert(id) {
        return;
    }
    let Some(node) = by_id.get(&id) else {
        return;
    };
    let parents = node.parent_ids();
    if parents.is_empty() {
        roots.insert(id);
        return;
    }
    for &parent in parents {
        collect(parent, by_id, visited, roots);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `a → b → d` and `a → c → d`: the classic diamond.
    fn diamond() -> DependencyGraph {
        DependencyGraph {
            nodes: vec![
                GraphNode::root(0),
                GraphNode::derived(1, vec![0]),
                GraphNode::derived(2, vec![0]),
                GraphNode::derived(3, vec![1, 2]),
            ],
            root_ids: vec![0],
        }
    }

    #[test]
    fn diamond_yields_one_path_per_edge_choice() {
        let paths = find_paths_to_roots(&diamond(), 3);
        assert_eq!(paths, vec![vec![0, 0], vec![1, 0]]);
    }

    #[test]
    fn root_yields_single_empty_path() {
        let paths = find_paths_to_roots(&diamond(), 0);
        assert_eq!(paths, vec![Vec::<usize>::new()]);
    }

    #[test]
    fn unknown_node_yields_no_paths() {
        assert!(find_paths_to_roots(&diamond(), 42).is_empty());
    }

    #[test]
    fn diamond_roots_are_deduplicated() {
        let roots = find_root_dependencies(&diamond(), 3);
        assert_eq!(roots, vec![0]);
    }

    #[test]
    fn multiple_roots_are_all_found() {
        let graph = DependencyGraph {
            nodes: vec![
                GraphNode::root(0),
                GraphNode::root(1),
                GraphNode::derived(2, vec![0, 1]),
                GraphNode::derived(3, vec![2, 0]),
            ],
            root_ids: vec![0, 1],
        };

        assert_eq!(find_root_dependencies(&graph, 3), vec![0, 1]);
        // Two edges into node 0: one direct, one through node 2.
        let paths = find_paths_to_roots(&graph, 3);
        assert_eq!(paths, vec![vec![0, 0], vec![0, 1], vec![1]]);
    }

    #[test]
    fn dangling_edges_are_skipped() {
        let graph = DependencyGraph {
            nodes: vec![GraphNode::root(0), GraphNode::derived(1, vec![0, 9])],
            root_ids: vec![0],
        };

        assert_eq!(find_paths_to_roots(&graph, 1), vec![vec![0]]);
        assert_eq!(find_root_dependencies(&graph, 1), vec![0]);
    }

    #[test]
    fn cyclic_input_terminates() {
        let graph = DependencyGraph {
            nodes: vec![
                GraphNode::derived(0, vec![1]),
                GraphNode::derived(1, vec![0]),
            ],
            root_ids: vec![],
        };

        assert!(find_paths_to_roots(&graph, 0).is_empty());
        assert!(find_root_dependencies(&graph, 0).is_empty());
    }
}

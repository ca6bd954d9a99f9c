//! Dependency Graph
//!
//! This module implements the captured dependency graph that records how
//! cells derive from one another within a single render.
//!
//! # Overview
//!
//! The graph is a directed acyclic graph (DAG) where:
//!
//! - Nodes stand for cells, identified by their registration position
//! - Edges point from derived nodes to the parents they compute from
//!
//! The graph travels inside the hydration payload. The client uses it to
//! line captured root values up with the cells its own replay constructs,
//! and the validator checks it before anything is trusted.
//!
//! # Design Decisions
//!
//! 1. Ids are positional, assigned from the scope's insertion order. The
//!    registry is treated as an arena and cells as arena-indexed entries,
//!    which sidesteps needing globally unique, cross-process-stable ids.
//!
//! 2. Root membership is recorded explicitly in `rootIds` rather than
//!    inferred from parent counts, so a structurally inconsistent payload
//!    fails validation instead of being silently reinterpreted.
//!
//! 3. Roots omit their `parents` field entirely; every consumer treats the
//!    omission as an empty list.

mod build;
mod node;
mod paths;
mod validate;

pub use build::{build_dependency_graph, BuiltGraph};
pub use node::{DependencyGraph, GraphNode};
pub use paths::{find_paths_to_roots, find_root_dependencies};
pub use validate::{validate, ValidationIssue, ValidationReport};

//! Estuary Core
//!
//! This crate provides the core runtime for the Estuary resumable UI
//! framework. It implements:
//!
//! - Reactive primitives (root and derived cells)
//! - Per-render capture of the cell graph into a hydration payload
//! - Client-side reconstruction of a live graph over existing markup
//! - The in-memory document used to build and serialize that markup
//!
//! The defining trait is cross-runtime continuity: a UI described as small
//! reactive cells renders once on a server, and a different process brings
//! the result back to life without re-running the program's effects, by
//! replaying values and recomputation over the markup it already received.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: cells, observers, and the render scope registry
//! - `graph`: the captured dependency graph, its validator, and root-path
//!   resolution
//! - `hydrate`: the payload format and the client-side replay engine
//! - `dom`: the document emulation, marker protocol, and case adapter
//! - `render`: the server entry point tying the pieces together
//!
//! # Example
//!
//! ```rust,ignore
//! use estuary_core::{hydrate, render_to_string, Cell, Document, RenderOptions};
//!
//! let app = |doc: &Document| {
//!     let a = Cell::new(1);
//!     let b = Cell::new(2);
//!     let sum = Cell::derive((a, b), |(x, y)| x + y);
//!     let root = doc.create_element("div");
//!     let _ = root.append_child(&doc.reactive_text(&sum));
//!     root
//! };
//!
//! // Server: markup plus captured values, `sum` never serialized.
//! let rendered = render_to_string(app, RenderOptions::default()).await?;
//!
//! // Client: same factory, existing tree, live graph.
//! let handle = hydrate(app, &parsed_root, rendered.hydration_data)?;
//! ```

pub mod dom;
pub mod error;
pub mod graph;
pub mod hydrate;
pub mod reactive;
pub mod render;

pub use dom::{Document, DomNode};
pub use error::{
    CaptureError, CellError, DomError, DrainError, HydrateError, PayloadError, RenderError,
    ScopeError,
};
pub use graph::{
    build_dependency_graph, find_paths_to_roots, find_root_dependencies, validate, BuiltGraph,
    DependencyGraph, GraphNode, ValidationIssue, ValidationReport,
};
pub use hydrate::{hydrate, HydratePhase, HydrationHandle, HydrationPayload, MarkerRegion, RegionKind};
pub use reactive::{
    Cell, CellId, CellValue, ErasedCell, ObserverId, ParentRef, RenderScope, ScopeGuard,
    ScopePhase, Sources,
};
pub use render::{render_to_string, RenderOptions, Rendered};

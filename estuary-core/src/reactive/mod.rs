//! Reactive Primitives
//!
//! This module implements the core reactive model: cells and the render
//! scope they register into.
//!
//! # Concepts
//!
//! ## Cells
//!
//! A Cell is a container for a reactive value. Root cells hold externally
//! settable state; derived cells compute their value from parent cells
//! through a recomputation rule that re-runs synchronously whenever a
//! parent changes. Equal values never re-fire observers.
//!
//! ## Render scopes
//!
//! A scope is the request-scoped registry of every cell created during one
//! render, in creation order. That order is what gives each cell its stable
//! position in the captured dependency graph, so the same render replayed on
//! the client lines up cell-for-cell with the server's capture.
//!
//! # Implementation Notes
//!
//! Parent sets are explicit: a derived cell names its parents up front
//! rather than discovering them by tracking reads. This keeps the dependency
//! graph identical between the server render and the client replay, which
//! is what hydration relies on.

mod cell;
mod observer;
mod scope;

pub use cell::{Cell, CellId, CellValue, ErasedCell, ParentRef, Sources};
pub use observer::ObserverId;
pub use scope::{CellOwner, RenderScope, ScopeGuard, ScopePhase};

pub(crate) use scope::{activate_sink, Adoption, CellSink};

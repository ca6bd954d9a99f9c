//! Error types for the Estuary runtime.
//!
//! The error surface is split by failure class:
//!
//! - Structural failures during capture ([`CaptureError`]) abort the render;
//!   the caller gets no payload.
//! - Graph validation problems are *reported*, not thrown — see
//!   [`crate::graph::ValidationReport`].
//! - Value-level failures (a recomputation rule erroring, a marker region
//!   missing from the document) are contained to the affected cell or region
//!   and logged, never escalated to the whole render or hydration.

use thiserror::Error;

use crate::reactive::{CellId, ScopePhase};

/// Errors raised by render scope management.
#[derive(Debug, Error)]
pub enum ScopeError {
    /// A scope (or hydration pass) is already active on this thread.
    ///
    /// Two active scopes would interleave their registration order and
    /// corrupt each other's id sequencing, so this is treated as a caller
    /// error rather than silently resolved.
    #[error("another scope is already active on this thread")]
    AlreadyActive,
}

/// Errors raised by a cell's recomputation rule.
#[derive(Debug, Error)]
pub enum CellError {
    /// The recomputation rule failed.
    #[error("recomputation failed: {0}")]
    Recompute(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl CellError {
    /// Wrap an arbitrary error as a recomputation failure.
    pub fn recompute(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Recompute(err.into())
    }
}

/// Errors raised while draining tracked asynchronous work.
#[derive(Debug, Error)]
pub enum DrainError {
    /// A tracked task panicked or was cancelled before completing.
    #[error("tracked task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Errors raised while capturing a scope into a hydration payload.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// A derived cell references a parent that was never registered and is
    /// not marked as excluded from hydration.
    #[error("cell {child} references parent {parent} that was never registered")]
    MissingParent {
        /// The derived cell holding the dangling reference.
        child: CellId,
        /// The referenced parent.
        parent: CellId,
    },

    /// `capture` was called before the scope's tracked work was drained, or
    /// after the scope was already captured.
    #[error("capture requires a drained scope (current phase: {phase:?})")]
    NotDrained {
        /// The phase the scope was actually in.
        phase: ScopePhase,
    },

    /// A root cell's value could not be serialized.
    #[error("failed to serialize root cell {id}")]
    Serialize {
        /// The offending cell.
        id: CellId,
        /// The underlying serializer error.
        #[source]
        source: serde_json::Error,
    },

    /// A root cell holds a value with no serializer attached.
    #[error("root cell {id} holds an opaque value that cannot be captured")]
    OpaqueRoot {
        /// The offending cell.
        id: CellId,
    },
}

/// Errors raised by the render entry point.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Scope activation failed.
    #[error(transparent)]
    Scope(#[from] ScopeError),

    /// Tracked asynchronous work failed while draining.
    #[error(transparent)]
    Drain(#[from] DrainError),

    /// Capturing the scope into a payload failed.
    #[error(transparent)]
    Capture(#[from] CaptureError),
}

/// Errors raised while encoding or decoding a hydration payload.
#[derive(Debug, Error)]
pub enum PayloadError {
    /// JSON encoding or decoding failed.
    #[error("payload JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// MessagePack encoding failed.
    #[error("payload encode: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// MessagePack decoding failed.
    #[error("payload decode: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

/// Errors raised by the hydration entry point.
#[derive(Debug, Error)]
pub enum HydrateError {
    /// The payload's dependency graph failed structural validation.
    ///
    /// A payload that crossed a process boundary is of uncertain origin, so
    /// the graph is validated before any cell is seeded from it.
    #[error("payload graph failed validation: {report}")]
    InvalidGraph {
        /// The full list of issues found.
        report: crate::graph::ValidationReport,
    },

    /// A scope or hydration pass is already active on this thread.
    #[error(transparent)]
    Scope(#[from] ScopeError),

    /// The payload could not be decoded.
    #[error(transparent)]
    Payload(#[from] PayloadError),
}

/// Errors raised by the in-memory document.
#[derive(Debug, Error)]
pub enum DomError {
    /// The target node cannot hold children.
    #[error("node is not a container")]
    NotAContainer,

    /// The target node is not a text node.
    #[error("node is not a text node")]
    NotText,

    /// Child index out of bounds.
    #[error("child index {index} out of bounds")]
    IndexOutOfBounds {
        /// The requested index.
        index: usize,
    },

    /// A region's start or end marker is missing from its container.
    #[error("region {id} markers are missing or malformed")]
    RegionMarkers {
        /// The region identifier.
        id: String,
    },

    /// A region does not hold the single text node its binding expects.
    #[error("region {id} does not contain a single text node")]
    RegionShape {
        /// The region identifier.
        id: String,
    },
}

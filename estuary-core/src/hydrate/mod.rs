//! Hydration
//!
//! Cross-runtime continuity: a render captured on the server is
//! reconstructed as a live cell graph on the client, wired onto markup the
//! server already produced, without re-running the program's effects or
//! rebuilding the document.
//!
//! - [`payload`]: the serialized bundle — captured root values, the
//!   dependency graph, and the marker map
//! - [`engine`]: the replay that seeds roots, recomputes deriveds, and
//!   binds observers onto existing regions

pub mod engine;
pub mod payload;

pub use engine::{hydrate, HydratePhase, HydrationHandle};
pub use payload::{HydrationPayload, MarkerRegion, RegionKind};

//! Hydration Payload
//!
//! The serialized bundle a render hands to the client: captured root
//! values, the dependency graph, and the marker map locating dynamic
//! regions in the markup. Built once per render, consumed exactly once.
//!
//! Derived values are deliberately absent. They are always recomputed on
//! the client from hydrated roots, which guarantees they reflect the actual
//! recomputation rule rather than a stale snapshot.
//!
//! The JSON field names are wire contract: `observables`, `rootIds`,
//! `markers`, `ctxID`, with a node's `parents` omitted (never an empty
//! array) for roots.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::PayloadError;
use crate::graph::DependencyGraph;

/// What a marker-delimited region holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionKind {
    /// A single text node driven by one cell.
    Text,
    /// A component or fragment boundary.
    Fragment,
}

/// A logical region reachable through a marker pair in the markup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerRegion {
    /// Graph node id of the cell driving this region, when there is one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell: Option<u32>,
    /// What the region holds.
    pub kind: RegionKind,
}

/// One render's captured state, ready to cross a process boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HydrationPayload {
    /// Captured values of root cells, keyed by graph node id.
    pub observables: BTreeMap<u32, serde_json::Value>,

    /// The captured dependency graph.
    pub graph: DependencyGraph,

    /// Marker id → region descriptor for every dynamic region in the markup.
    pub markers: BTreeMap<String, MarkerRegion>,

    /// The originating render context id.
    #[serde(rename = "ctxID")]
    pub ctx_id: u64,
}

impl HydrationPayload {
    /// Encode as JSON, e.g. for embedding in a script tag alongside markup.
    pub fn to_json(&self) -> Result<String, PayloadError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode from JSON.
    pub fn from_json(raw: &str) -> Result<Self, PayloadError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Encode as MessagePack, the compact binary form for transport.
    pub fn to_msgpack(&self) -> Result<Vec<u8>, PayloadError> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    /// Decode from MessagePack.
    pub fn from_msgpack(raw: &[u8]) -> Result<Self, PayloadError> {
        Ok(rmp_serde::from_slice(raw)?)
    }
}

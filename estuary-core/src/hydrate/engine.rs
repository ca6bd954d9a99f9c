//! Hydration Engine
//!
//! Brings a captured render back to life in another process. The component
//! factory re-executes, and because cells register in the same creation
//! order on both sides, each cell the replay constructs lines up with one
//! node of the captured graph:
//!
//! - Root cells are pre-seeded with their captured values. Seeding is
//!   silent — no recomputation, no observer firing — since the document
//!   already shows the correct output.
//! - Derived cells re-run their recomputation rule against the
//!   already-materialized parents. Their values are computed, never copied
//!   from the payload; the payload does not even carry them.
//! - Reactive bindings attach to the regions the existing tree already
//!   contains, located through the marker map. No nodes are created for
//!   content the markup already encodes.
//!
//! Failures are contained per the payload's trust model: a structurally
//! invalid graph rejects the whole payload up front, while a single
//! mismatched region or diverging cell is logged and skipped without
//! touching its siblings.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use super::payload::HydrationPayload;
use crate::dom::{scan_regions, Document, DomNode};
use crate::error::HydrateError;
use crate::graph::{validate, GraphNode};
use crate::reactive::{activate_sink, Adoption, CellId, CellSink, ErasedCell, ObserverId};

/// Client-side lifecycle of one hydration pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HydratePhase {
    /// The payload is being decoded and validated.
    AwaitingPayload,
    /// Root cells are being seeded from captured values.
    RootsSeeded,
    /// Derived cells are re-running their rules.
    DerivedReplaying,
    /// Observers are bound to the existing document.
    Bound,
    /// The graph is live; the document now follows cell changes.
    Live,
}

struct HydrateScope {
    root_set: HashSet<u32>,
    nodes: Vec<GraphNode>,
    observables: BTreeMap<u32, serde_json::Value>,
    cursor: Mutex<usize>,
    positions: Mutex<HashMap<CellId, u32>>,
    cells: Mutex<Vec<Arc<dyn ErasedCell>>>,
    phase: Mutex<HydratePhase>,
}

impl HydrateScope {
    fn next_index(&self) -> usize {
        let mut cursor = self.cursor.lock();
        let index = *cursor;
        *cursor += 1;
        index
    }
}

impl CellSink for HydrateScope {
    fn adopt_root(&self, cell: Arc<dyn ErasedCell>) -> Adoption {
        let index = self.next_index();
        let id = cell.cell_id();
        self.cells.lock().push(cell);

        let Some(node) = self.nodes.get(index) else {
            tracing::warn!(
                cell = %id,
                "replay created more cells than the payload captured; leaving live but unseeded"
            );
            return Adoption::Unclaimed;
        };
        if !self.root_set.contains(&node.id) {
            tracing::warn!(
                node = node.id,
                "replay created a root where the capture recorded a derived cell; leaving unseeded"
            );
            return Adoption::Unclaimed;
        }
        self.positions.lock().insert(id, node.id);

        // Seed values are looked up by node id, not replay position, so an
        // out-of-order payload still seeds the right cell.
        match self.observables.get(&node.id) {
            Some(value) => Adoption::Seed(value.clone()),
            None => {
                tracing::warn!(node = node.id, "no captured value for root; keeping initial");
                Adoption::Unclaimed
            }
        }
    }

    fn adopt_derived(&self, cell: Arc<dyn ErasedCell>) {
        {
            let mut phase = self.phase.lock();
            if *phase == HydratePhase::RootsSeeded {
                *phase = HydratePhase::DerivedReplaying;
                tracing::debug!("hydration: replaying derived cells");
            }
        }

        let index = self.next_index();
        let id = cell.cell_id();
        let parent_refs = cell.parent_refs();
        self.cells.lock().push(cell);

        let Some(node) = self.nodes.get(index) else {
            tracing::warn!(cell = %id, "replay created more cells than the payload captured");
            return;
        };
        if self.root_set.contains(&node.id) {
            tracing::warn!(
                node = node.id,
                "replay created a derived cell where the capture recorded a root"
            );
            return;
        }
        self.positions.lock().insert(id, node.id);

        let replayed: Vec<u32> = parent_refs
            .iter()
            .filter(|parent| !parent.excluded)
            .filter_map(|parent| self.positions.lock().get(&parent.id).copied())
            .collect();
        if replayed != node.parent_ids() {
            tracing::warn!(
                node = node.id,
                "parent edges diverge from the captured graph"
            );
        }
    }
}

/// A live hydrated graph; disposing it unbinds the document.
pub struct HydrationHandle {
    cells: Vec<Arc<dyn ErasedCell>>,
    bindings: Vec<(Arc<dyn ErasedCell>, ObserverId)>,
    phase: HydratePhase,
}

impl HydrationHandle {
    /// The pass's final phase. Always [`HydratePhase::Live`] on a handle
    /// returned by [`hydrate`].
    pub fn phase(&self) -> HydratePhase {
        self.phase
    }

    /// Number of cells the replay materialized.
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Number of document bindings attached.
    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    /// Detach every document binding and dispose every hydrated cell.
    pub fn dispose(self) {
        for (cell, observer) in &self.bindings {
            cell.remove_observer(*observer);
        }
        for cell in &self.cells {
            cell.dispose_erased();
        }
        tracing::debug!("hydration disposed");
    }
}

impl std::fmt::Debug for HydrationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HydrationHandle")
            .field("phase", &self.phase)
            .field("cell_count", &self.cell_count())
            .field("binding_count", &self.binding_count())
            .finish()
    }
}

/// Reconstruct a live cell graph from a captured payload and bind it onto
/// an already-parsed tree.
///
/// `factory` must be the same component code the server rendered; it
/// re-executes here, creating cells in the same order. The existing nodes
/// under `root` are never rebuilt — bindings mutate them in place. A marker
/// in the payload with no matching region in `root` leaves that one binding
/// unbound; everything else still hydrates.
pub fn hydrate<F>(
    factory: F,
    root: &DomNode,
    payload: HydrationPayload,
) -> Result<HydrationHandle, HydrateError>
where
    F: FnOnce(&Document) -> DomNode,
{
    let mut phase = HydratePhase::AwaitingPayload;
    tracing::debug!(ctx_id = payload.ctx_id, ?phase, "hydration: validating payload");

    let report = validate(&payload.graph);
    if !report.is_valid() {
        return Err(HydrateError::InvalidGraph { report });
    }

    let regions = scan_regions(root);
    for marker in payload.markers.keys() {
        if !regions.contains_key(marker) {
            tracing::warn!(%marker, "payload region missing from document; it will stay unbound");
        }
    }

    let HydrationPayload {
        observables, graph, ..
    } = payload;
    phase = HydratePhase::RootsSeeded;
    let scope = Arc::new(HydrateScope {
        root_set: graph.root_ids.iter().copied().collect(),
        nodes: graph.nodes,
        observables,
        cursor: Mutex::new(0),
        positions: Mutex::new(HashMap::new()),
        cells: Mutex::new(Vec::new()),
        phase: Mutex::new(phase),
    });
    tracing::debug!("hydration: seeding roots");

    let document = Document::for_hydration(regions);
    {
        let _guard = activate_sink(scope.clone())?;
        let _replayed_tree = factory(&document);
    }

    phase = HydratePhase::Bound;
    *scope.phase.lock() = phase;
    let bindings = document.take_bindings();
    let cells = std::mem::take(&mut *scope.cells.lock());

    phase = HydratePhase::Live;
    tracing::debug!(
        cells = cells.len(),
        bindings = bindings.len(),
        "hydration: live"
    );

    Ok(HydrationHandle {
        cells,
        bindings,
        phase,
    })
}

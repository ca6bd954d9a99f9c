//! Render Scope
//!
//! A render scope is the request-scoped registry that every cell created
//! during one render registers into, in creation order. That order is the
//! sole source of the integer ids in the captured dependency graph, which is
//! why exactly one scope may be active per thread at a time: two interleaved
//! scopes would corrupt each other's id sequencing.
//!
//! # Lifecycle
//!
//! ```text
//! Open → Rendering (cells registering)
//!      → Draining  (awaiting tracked work, re-entrant)
//!      → Captured  (graph built, payload returned)
//!      → HandedOff (cells disposed)
//! ```
//!
//! # Isolation
//!
//! Concurrent renders each get their own scope and their own positional id
//! space. The scope handle is an explicit, cheaply-cloneable value; the
//! thread-local slot set by [`RenderScope::run`] exists only for the
//! synchronous extent of the render factory, so no module-level state leaks
//! values between requests. Asynchronous continuations that outlive that
//! extent hold the scope handle explicitly.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use super::cell::{Cell, CellId, ErasedCell};
use crate::dom::markers::RegionRecord;
use crate::error::{CaptureError, DrainError, ScopeError};
use crate::graph::build_dependency_graph;
use crate::hydrate::payload::{HydrationPayload, MarkerRegion};

/// Counter for generating unique render context IDs.
static CTX_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Lifecycle phase of a render scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopePhase {
    /// The scope exists but no cell has registered yet.
    Open,

    /// Cells are registering as user code constructs them.
    Rendering,

    /// Tracked asynchronous work is being awaited. Registration stays legal:
    /// continuations may create further cells while draining.
    Draining,

    /// The registry has been turned into a payload.
    Captured,

    /// The payload was handed off and the member cells disposed.
    HandedOff,
}

/// A registry a disposed cell removes itself from.
pub trait CellOwner: Send + Sync {
    /// Drop the cell with the given id from the registry.
    fn forget(&self, id: CellId);
}

/// Outcome of offering a freshly constructed root cell to the active sink.
pub(crate) enum Adoption {
    /// The cell was registered; its current value stands.
    Live,
    /// The cell corresponds to a captured root: overwrite its value,
    /// silently, with the captured one.
    Seed(serde_json::Value),
    /// The sink could not place the cell; it stays live but untracked.
    Unclaimed,
}

/// Receiver for cells constructed while a scope (render or hydration) is
/// active on the current thread.
pub(crate) trait CellSink: Send + Sync {
    fn adopt_root(&self, cell: Arc<dyn ErasedCell>) -> Adoption;
    fn adopt_derived(&self, cell: Arc<dyn ErasedCell>);
}

thread_local! {
    static ACTIVE_SINK: RefCell<Option<Arc<dyn CellSink>>> = const { RefCell::new(None) };
    static CURRENT_SCOPE: RefCell<Option<RenderScope>> = const { RefCell::new(None) };
}

/// The sink cells on this thread currently register into, if any.
pub(crate) fn current_sink() -> Option<Arc<dyn CellSink>> {
    ACTIVE_SINK.with(|slot| slot.borrow().clone())
}

/// Guard that clears the active sink when dropped.
pub(crate) struct SinkGuard {
    _priv: (),
}

/// Install `sink` as the thread's active sink.
///
/// Fails if another sink is already active: overlapping scopes are a caller
/// error, not something to resolve silently.
pub(crate) fn activate_sink(sink: Arc<dyn CellSink>) -> Result<SinkGuard, ScopeError> {
    ACTIVE_SINK.with(|slot| {
        let mut slot = slot.borrow_mut();
        if slot.is_some() {
            return Err(ScopeError::AlreadyActive);
        }
        *slot = Some(sink);
        Ok(SinkGuard { _priv: () })
    })
}

impl Drop for SinkGuard {
    fn drop(&mut self) {
        ACTIVE_SINK.with(|slot| slot.borrow_mut().take());
    }
}

/// Guard returned by [`RenderScope::activate`]; deactivates on drop.
pub struct ScopeGuard {
    _sink: SinkGuard,
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        CURRENT_SCOPE.with(|slot| slot.borrow_mut().take());
    }
}

pub(crate) struct ScopeInner {
    weak_self: Weak<ScopeInner>,
    ctx_id: u64,
    phase: Mutex<ScopePhase>,
    registry: Mutex<IndexMap<CellId, Arc<dyn ErasedCell>>>,
    pending: Mutex<Vec<JoinHandle<()>>>,
    path: Mutex<Option<Cell<String>>>,
}

impl ScopeInner {
    fn register_cell(&self, cell: Arc<dyn ErasedCell>) {
        if cell.excluded() {
            return;
        }
        let id = cell.cell_id();
        {
            let mut registry = self.registry.lock();
            if registry.contains_key(&id) {
                return;
            }
            let owner: Weak<dyn CellOwner> = self.weak_self.clone();
            cell.set_owner(owner);
            registry.insert(id, cell);
        }
        let mut phase = self.phase.lock();
        if *phase == ScopePhase::Open {
            *phase = ScopePhase::Rendering;
        }
        tracing::trace!(ctx_id = self.ctx_id, cell = %id, "registered cell");
    }
}

impl CellSink for ScopeInner {
    fn adopt_root(&self, cell: Arc<dyn ErasedCell>) -> Adoption {
        self.register_cell(cell);
        Adoption::Live
    }

    fn adopt_derived(&self, cell: Arc<dyn ErasedCell>) {
        self.register_cell(cell);
    }
}

impl CellOwner for ScopeInner {
    fn forget(&self, id: CellId) {
        self.registry.lock().shift_remove(&id);
    }
}

/// The request-scoped registry of cells created during one render.
///
/// Cheap to clone; all clones share the same registry.
pub struct RenderScope {
    inner: Arc<ScopeInner>,
}

impl RenderScope {
    /// Open a new scope with a fresh context id.
    pub fn new() -> Self {
        let ctx_id = CTX_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::new_cyclic(|weak| ScopeInner {
            weak_self: weak.clone(),
            ctx_id,
            phase: Mutex::new(ScopePhase::Open),
            registry: Mutex::new(IndexMap::new()),
            pending: Mutex::new(Vec::new()),
            path: Mutex::new(None),
        });
        tracing::debug!(ctx_id, "opened render scope");
        Self { inner }
    }

    /// The scope active via [`RenderScope::run`] on this thread, if any.
    pub fn current() -> Option<RenderScope> {
        CURRENT_SCOPE.with(|slot| slot.borrow().clone())
    }

    /// The context id carried into the captured payload.
    pub fn ctx_id(&self) -> u64 {
        self.inner.ctx_id
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> ScopePhase {
        *self.inner.phase.lock()
    }

    /// Make this scope the thread's active one until the guard drops.
    ///
    /// Fails with [`ScopeError::AlreadyActive`] if any scope or hydration
    /// pass is already active on this thread.
    pub fn activate(&self) -> Result<ScopeGuard, ScopeError> {
        let sink = activate_sink(self.inner.clone())?;
        CURRENT_SCOPE.with(|slot| *slot.borrow_mut() = Some(self.clone()));
        Ok(ScopeGuard { _sink: sink })
    }

    /// Run `f` with this scope active, so cells it constructs register here.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> Result<R, ScopeError> {
        let _guard = self.activate()?;
        Ok(f())
    }

    /// Register a cell explicitly, outside the active-slot mechanism.
    ///
    /// Registration is idempotent for a given cell and skips cells excluded
    /// from hydration.
    pub fn register(&self, cell: Arc<dyn ErasedCell>) {
        self.inner.register_cell(cell);
    }

    /// Add asynchronous work to await before this render can be captured.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn track<F>(&self, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        self.inner.pending.lock().push(handle);
        tracing::trace!(ctx_id = self.inner.ctx_id, "tracked async work");
    }

    /// Await every tracked task, including tasks tracked *while* waiting.
    ///
    /// Loops until the tracked set stabilizes: work spawned from within a
    /// tracked continuation is picked up on the next pass rather than
    /// missed.
    pub async fn drain(&self) -> Result<(), DrainError> {
        {
            let mut phase = self.inner.phase.lock();
            *phase = ScopePhase::Draining;
        }
        tracing::debug!(ctx_id = self.inner.ctx_id, "draining tracked work");
        loop {
            let batch: Vec<JoinHandle<()>> = {
                let mut pending = self.inner.pending.lock();
                if pending.is_empty() {
                    break;
                }
                pending.drain(..).collect()
            };
            for handle in batch {
                handle.await?;
            }
        }
        Ok(())
    }

    /// Turn the registry into a hydration payload.
    ///
    /// Only valid after [`RenderScope::drain`] has resolved. Root cell
    /// values are serialized; derived values never are — they are always
    /// recomputed from hydrated roots on the client.
    pub fn capture(
        &self,
        regions: BTreeMap<String, RegionRecord>,
    ) -> Result<HydrationPayload, CaptureError> {
        {
            let phase = self.inner.phase.lock();
            if *phase != ScopePhase::Draining {
                return Err(CaptureError::NotDrained { phase: *phase });
            }
        }

        let cells: Vec<Arc<dyn ErasedCell>> =
            self.inner.registry.lock().values().cloned().collect();
        let built = build_dependency_graph(&cells)?;

        let mut observables = BTreeMap::new();
        for cell in &cells {
            if cell.is_derived() {
                continue;
            }
            if let Some(&position) = built.positions.get(&cell.cell_id()) {
                observables.insert(position, cell.snapshot()?);
            }
        }

        let markers = regions
            .into_iter()
            .map(|(id, record)| {
                let cell = record
                    .cell
                    .and_then(|cell_id| built.positions.get(&cell_id).copied());
                (
                    id,
                    MarkerRegion {
                        cell,
                        kind: record.kind,
                    },
                )
            })
            .collect();

        *self.inner.phase.lock() = ScopePhase::Captured;
        tracing::debug!(
            ctx_id = self.inner.ctx_id,
            nodes = built.graph.nodes.len(),
            roots = built.graph.root_ids.len(),
            "captured scope"
        );

        Ok(HydrationPayload {
            observables,
            graph: built.graph,
            markers,
            ctx_id: self.inner.ctx_id,
        })
    }

    /// Dispose every registered cell and empty the registry.
    pub fn clear(&self) {
        let cells: Vec<Arc<dyn ErasedCell>> = {
            let mut registry = self.inner.registry.lock();
            registry.drain(..).map(|(_, cell)| cell).collect()
        };
        for cell in cells {
            cell.dispose_erased();
        }
        *self.inner.phase.lock() = ScopePhase::HandedOff;
        tracing::debug!(ctx_id = self.inner.ctx_id, "cleared scope");
    }

    /// Snapshot of the registry, in registration order.
    pub fn registered(&self) -> Vec<Arc<dyn ErasedCell>> {
        self.inner.registry.lock().values().cloned().collect()
    }

    /// Number of registered cells.
    pub fn cell_count(&self) -> usize {
        self.inner.registry.lock().len()
    }

    /// Install the request path as an ephemeral cell.
    ///
    /// The path cell is excluded from hydration: router state is
    /// reconstructed from the client's own location, never replayed.
    pub fn set_path(&self, path: impl Into<String>) {
        *self.inner.path.lock() = Some(Cell::ephemeral(path.into()));
    }

    /// The request path cell, if one was installed.
    pub fn path(&self) -> Option<Cell<String>> {
        self.inner.path.lock().clone()
    }
}

impl Default for RenderScope {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for RenderScope {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl std::fmt::Debug for RenderScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderScope")
            .field("ctx_id", &self.inner.ctx_id)
            .field("phase", &self.phase())
            .field("cell_count", &self.cell_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn cells_register_in_creation_order() {
        let scope = RenderScope::new();
        let (a, b, c) = scope
            .run(|| (Cell::new(1), Cell::new(2), Cell::new(3)))
            .unwrap();

        let ids: Vec<CellId> = scope
            .registered()
            .iter()
            .map(|cell| cell.cell_id())
            .collect();
        assert_eq!(ids, vec![a.id(), b.id(), c.id()]);
        assert_eq!(scope.phase(), ScopePhase::Rendering);
    }

    #[test]
    fn duplicate_registration_is_idempotent() {
        let scope = RenderScope::new();
        let cell = scope.run(|| Cell::new(1)).unwrap();

        scope.register(cell.erased());
        scope.register(cell.erased());
        assert_eq!(scope.cell_count(), 1);
    }

    #[test]
    fn excluded_cells_are_not_registered() {
        let scope = RenderScope::new();
        scope
            .run(|| {
                let _kept = Cell::new(1);
                let _skipped = Cell::ephemeral(2);
            })
            .unwrap();

        assert_eq!(scope.cell_count(), 1);
    }

    #[test]
    fn second_active_scope_is_rejected() {
        let outer = RenderScope::new();
        let inner = RenderScope::new();

        outer
            .run(|| {
                assert!(matches!(
                    inner.run(|| ()),
                    Err(ScopeError::AlreadyActive)
                ));
            })
            .unwrap();

        // Once the outer scope deactivates, the inner one may run.
        assert!(inner.run(|| ()).is_ok());
    }

    #[test]
    fn current_scope_is_visible_inside_run() {
        let scope = RenderScope::new();
        assert!(RenderScope::current().is_none());

        scope
            .run(|| {
                let current = RenderScope::current().expect("scope active");
                assert_eq!(current.ctx_id(), scope.ctx_id());
            })
            .unwrap();

        assert!(RenderScope::current().is_none());
    }

    #[test]
    fn ctx_ids_are_unique() {
        let a = RenderScope::new();
        let b = RenderScope::new();
        let c = RenderScope::new();

        assert_ne!(a.ctx_id(), b.ctx_id());
        assert_ne!(b.ctx_id(), c.ctx_id());
    }

    #[test]
    fn capture_before_drain_is_rejected() {
        let scope = RenderScope::new();
        scope.run(|| Cell::new(1)).unwrap();

        let result = scope.capture(BTreeMap::new());
        assert!(matches!(
            result,
            Err(CaptureError::NotDrained {
                phase: ScopePhase::Rendering
            })
        ));
    }

    #[tokio::test]
    async fn capture_serializes_roots_only() {
        let scope = RenderScope::new();
        scope
            .run(|| {
                let a = Cell::new(1);
                let _b = Cell::derive(a, |x| x + 1);
            })
            .unwrap();

        scope.drain().await.unwrap();
        let payload = scope.capture(BTreeMap::new()).unwrap();

        assert_eq!(payload.observables.len(), 1);
        assert_eq!(payload.observables[&0], serde_json::json!(1));
        assert!(!payload.observables.contains_key(&1));
    }

    #[tokio::test]
    async fn drain_waits_for_work_spawned_while_waiting() {
        let scope = RenderScope::new();
        let hits = Arc::new(AtomicI32::new(0));

        let inner_scope = scope.clone();
        let inner_hits = hits.clone();
        scope.track(async move {
            inner_hits.fetch_add(1, Ordering::SeqCst);
            let nested_hits = inner_hits.clone();
            inner_scope.track(async move {
                nested_hits.fetch_add(1, Ordering::SeqCst);
            });
        });

        scope.drain().await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn capture_after_capture_is_rejected() {
        let scope = RenderScope::new();
        scope.run(|| Cell::new(1)).unwrap();
        scope.drain().await.unwrap();

        scope.capture(BTreeMap::new()).unwrap();
        assert!(scope.capture(BTreeMap::new()).is_err());
        assert_eq!(scope.phase(), ScopePhase::Captured);
    }

    #[test]
    fn clear_disposes_registered_cells() {
        let scope = RenderScope::new();
        let cell = scope.run(|| Cell::new(1)).unwrap();

        scope.clear();
        assert!(cell.is_disposed());
        assert_eq!(scope.cell_count(), 0);
        assert_eq!(scope.phase(), ScopePhase::HandedOff);
    }

    #[test]
    fn disposing_a_cell_removes_it_from_the_registry() {
        let scope = RenderScope::new();
        let cell = scope.run(|| Cell::new(1)).unwrap();
        assert_eq!(scope.cell_count(), 1);

        cell.dispose();
        assert_eq!(scope.cell_count(), 0);
    }

    #[test]
    fn path_cell_is_ephemeral() {
        let scope = RenderScope::new();
        scope.set_path("/inbox");

        let path = scope.path().expect("path installed");
        assert!(path.is_excluded());
        assert_eq!(path.get(), "/inbox");
        assert_eq!(scope.cell_count(), 0);
    }
}

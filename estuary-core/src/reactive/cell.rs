//! Cell Implementation
//!
//! A Cell is the fundamental reactive primitive. It holds a value and
//! notifies observers when that value changes.
//!
//! # Root and derived cells
//!
//! 1. A *root* cell ([`Cell::new`]) holds an externally-settable value and
//!    has no parents.
//!
//! 2. A *derived* cell ([`Cell::derive`]) computes its value from one or
//!    more parent cells through a recomputation rule. Whenever any parent's
//!    value changes, the rule re-runs synchronously.
//!
//! 3. A value change is only accepted when the new value differs from the
//!    old one under a NaN-aware equality check. Equal values never re-fire
//!    observers, so self-stabilizing chains settle instead of looping.
//!
//! # Capture
//!
//! Cells constructed while a render scope is active register into it in
//! creation order; that order is what gives each cell its position in the
//! captured dependency graph. Cells created with [`Cell::ephemeral`] are
//! excluded from capture entirely.
//!
//! # Thread Safety
//!
//! Cells are thread-safe. The value and observer list live behind locks,
//! and a `Cell` handle is a cheap clone sharing the same state.

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use smallvec::{smallvec, SmallVec};

use super::observer::{ObserverId, Observers};
use super::scope::{self, Adoption, CellOwner};
use crate::error::{CaptureError, CellError};

/// Counter for generating unique cell IDs.
static CELL_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique, process-local identifier for a cell.
///
/// This is an identity handle only: positions in a captured dependency graph
/// come from registration order, never from this counter, so two renders of
/// the same component tree produce identical graphs even though their cells
/// carry different `CellId`s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId(u64);

impl CellId {
    /// Generate a new unique cell ID.
    pub fn new() -> Self {
        Self(CELL_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for CellId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CellId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// Marker trait for values a cell can hold.
///
/// Blanket-implemented; listed explicitly only so bounds read uniformly.
pub trait CellValue: Clone + PartialEq + Send + Sync + 'static {}

impl<T: Clone + PartialEq + Send + Sync + 'static> CellValue for T {}

/// NaN-aware equality: values that compare unequal to themselves (IEEE NaN)
/// are still considered identical to each other, so a NaN-valued cell does
/// not re-fire forever.
#[allow(clippy::eq_op)]
pub(crate) fn identical<T: PartialEq>(a: &T, b: &T) -> bool {
    a == b || (a != a && b != b)
}

/// Identity and exclusion flag of a parent edge, recorded at derivation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentRef {
    /// The parent cell's identity.
    pub id: CellId,
    /// Whether the parent is excluded from hydration.
    pub excluded: bool,
}

/// Type-erased view of a cell, as stored in scope registries and payloads.
///
/// Everything the capture and hydration machinery needs without knowing the
/// value type: identity, kind, parent edges, and a serializer for roots.
pub trait ErasedCell: Send + Sync {
    /// The cell's identity.
    fn cell_id(&self) -> CellId;
    /// The optional stable tag, for cross-run diagnostics.
    fn tag(&self) -> Option<String>;
    /// Whether the cell is derived.
    fn is_derived(&self) -> bool;
    /// Whether the cell is excluded from hydration.
    fn excluded(&self) -> bool;
    /// Parent edges in derivation order. Empty for roots.
    fn parent_refs(&self) -> Vec<ParentRef>;
    /// Serialize the current value. Only meaningful for root cells.
    fn snapshot(&self) -> Result<serde_json::Value, CaptureError>;
    /// Remove a previously registered observer.
    fn remove_observer(&self, id: ObserverId);
    /// Record the registry this cell belongs to, for removal on dispose.
    fn set_owner(&self, owner: Weak<dyn CellOwner>);
    /// Dispose the cell: clear observers, detach from parents, leave the
    /// owning registry.
    fn dispose_erased(&self);
}

type Compute<T> = Box<dyn Fn() -> Result<T, CellError> + Send + Sync>;
type SnapshotFn<T> = fn(&T) -> Result<serde_json::Value, serde_json::Error>;
type SeedFn<T> = fn(serde_json::Value) -> Result<T, serde_json::Error>;

fn snapshot_value<T: Serialize>(value: &T) -> Result<serde_json::Value, serde_json::Error> {
    serde_json::to_value(value)
}

fn seed_value<T: DeserializeOwned>(raw: serde_json::Value) -> Result<T, serde_json::Error> {
    serde_json::from_value(raw)
}

struct CellState<T: CellValue> {
    id: CellId,
    tag: Option<String>,
    excluded: bool,
    derived: bool,
    value: RwLock<T>,
    /// The recomputation rule. Present iff `derived`.
    compute: Option<Compute<T>>,
    /// Parent edges in derivation order. Empty iff not `derived`.
    parents: SmallVec<[ParentRef; 2]>,
    /// Recompute hooks registered on parents, detached on dispose.
    upstream: Mutex<SmallVec<[(Weak<dyn ErasedCell>, ObserverId); 2]>>,
    observers: Observers<T>,
    snapshot: Option<SnapshotFn<T>>,
    seed: Option<SeedFn<T>>,
    owner: Mutex<Option<Weak<dyn CellOwner>>>,
    disposed: AtomicBool,
}

impl<T: CellValue> CellState<T> {
    /// Re-run the recomputation rule and propagate an accepted change.
    fn recompute(state: &Arc<Self>) {
        if state.disposed.load(Ordering::SeqCst) {
            return;
        }
        let Some(compute) = &state.compute else {
            return;
        };
        match compute() {
            Ok(new_value) => {
                let changed = {
                    let mut guard = state.value.write();
                    if identical(&*guard, &new_value) {
                        false
                    } else {
                        *guard = new_value.clone();
                        true
                    }
                };
                if changed {
                    state.observers.notify(&new_value);
                }
            }
            Err(err) => {
                // The failure is scoped to this cell: keep the previous
                // value and do not notify.
                tracing::error!(cell = %state.id, error = %err, "recomputation failed");
            }
        }
    }

    fn dispose_inner(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.observers.clear();
        for (parent, observer) in self.upstream.lock().drain(..) {
            if let Some(parent) = parent.upgrade() {
                parent.remove_observer(observer);
            }
        }
        if let Some(owner) = self.owner.lock().take().and_then(|weak| weak.upgrade()) {
            owner.forget(self.id);
        }
    }
}

impl<T: CellValue> ErasedCell for CellState<T> {
    fn cell_id(&self) -> CellId {
        self.id
    }

    fn tag(&self) -> Option<String> {
        self.tag.clone()
    }

    fn is_derived(&self) -> bool {
        self.derived
    }

    fn excluded(&self) -> bool {
        self.excluded
    }

    fn parent_refs(&self) -> Vec<ParentRef> {
        self.parents.to_vec()
    }

    fn snapshot(&self) -> Result<serde_json::Value, CaptureError> {
        let snapshot = self.snapshot.ok_or(CaptureError::OpaqueRoot { id: self.id })?;
        snapshot(&self.value.read()).map_err(|source| CaptureError::Serialize {
            id: self.id,
            source,
        })
    }

    fn remove_observer(&self, id: ObserverId) {
        self.observers.remove(id);
    }

    fn set_owner(&self, owner: Weak<dyn CellOwner>) {
        *self.owner.lock() = Some(owner);
    }

    fn dispose_erased(&self) {
        self.dispose_inner();
    }
}

/// A reactive value holder, root or derived.
///
/// # Example
///
/// ```rust,ignore
/// let a = Cell::new(1);
/// let b = Cell::new(2);
/// let sum = Cell::derive((a.clone(), b.clone()), |(x, y)| x + y);
///
/// assert_eq!(sum.get(), 3);
/// a.set(10);
/// assert_eq!(sum.get(), 12);
/// ```
pub struct Cell<T: CellValue> {
    state: Arc<CellState<T>>,
}

impl<T: CellValue> Cell<T> {
    fn construct_root(
        value: T,
        excluded: bool,
        tag: Option<String>,
        snapshot: Option<SnapshotFn<T>>,
        seed: Option<SeedFn<T>>,
    ) -> Self {
        Self {
            state: Arc::new(CellState {
                id: CellId::new(),
                tag,
                excluded,
                derived: false,
                value: RwLock::new(value),
                compute: None,
                parents: SmallVec::new(),
                upstream: Mutex::new(SmallVec::new()),
                observers: Observers::new(),
                snapshot,
                seed,
                owner: Mutex::new(None),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// Create a root cell excluded from hydration.
    ///
    /// Ephemeral cells never register into a scope and never appear in a
    /// captured payload. Use them for state that only makes sense inside one
    /// process, like router paths.
    pub fn ephemeral(value: T) -> Self {
        Self::construct_root(value, true, None, None, None)
    }

    /// Create a derived cell whose value is `rule` applied to the parents'
    /// current values.
    ///
    /// The rule runs once at construction and again, synchronously, every
    /// time any parent's value changes. A recomputation that produces a
    /// value equal to the current one is dropped without notifying
    /// observers.
    pub fn derive<S, F>(sources: S, rule: F) -> Self
    where
        S: Sources,
        F: Fn(S::Values) -> T + Send + Sync + 'static,
    {
        let initial = rule(sources.read());
        let captured = sources.clone();
        let compute: Compute<T> = Box::new(move || Ok(rule(captured.read())));
        Self::assemble_derived(&sources, compute, initial)
    }

    /// Fallible variant of [`Cell::derive`].
    ///
    /// A rule error at construction time propagates to the caller; an error
    /// during a later recomputation is logged and that single update is
    /// dropped, leaving the previous value and the rest of the graph intact.
    pub fn try_derive<S, F>(sources: S, rule: F) -> Result<Self, CellError>
    where
        S: Sources,
        F: Fn(S::Values) -> Result<T, CellError> + Send + Sync + 'static,
    {
        let initial = rule(sources.read())?;
        let captured = sources.clone();
        let compute: Compute<T> = Box::new(move || rule(captured.read()));
        Ok(Self::assemble_derived(&sources, compute, initial))
    }

    fn assemble_derived<S: Sources>(sources: &S, compute: Compute<T>, initial: T) -> Self {
        // Exclusion propagates: a cell derived only from excluded parents is
        // itself excluded.
        let excluded = sources.all_excluded();
        let state = Arc::new(CellState {
            id: CellId::new(),
            tag: None,
            excluded,
            derived: true,
            value: RwLock::new(initial),
            compute: Some(compute),
            parents: sources.parent_refs(),
            upstream: Mutex::new(SmallVec::new()),
            observers: Observers::new(),
            snapshot: None,
            seed: None,
            owner: Mutex::new(None),
            disposed: AtomicBool::new(false),
        });

        let weak = Arc::downgrade(&state);
        let hooks = sources.attach(move || {
            if let Some(state) = weak.upgrade() {
                CellState::recompute(&state);
            }
        });
        *state.upstream.lock() = hooks;

        let cell = Self { state };
        if !excluded {
            if let Some(sink) = scope::current_sink() {
                sink.adopt_derived(cell.erased());
            }
        }
        cell
    }

    /// Derive a single-parent cell by mapping this cell's value.
    pub fn map<U, F>(&self, rule: F) -> Cell<U>
    where
        U: CellValue,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        Cell::derive(self.clone(), rule)
    }

    /// Get the cell's unique ID.
    pub fn id(&self) -> CellId {
        self.state.id
    }

    /// Get the stable tag, if one was attached.
    pub fn tag(&self) -> Option<String> {
        self.state.tag.clone()
    }

    /// Whether this cell is derived.
    pub fn is_derived(&self) -> bool {
        self.state.derived
    }

    /// Whether this cell is excluded from hydration.
    pub fn is_excluded(&self) -> bool {
        self.state.excluded
    }

    /// Get the current value.
    pub fn get(&self) -> T {
        self.state.value.read().clone()
    }

    /// Set a new value and notify observers.
    ///
    /// Dropped without notifying when the new value is identical to the
    /// current one, and ignored (with a warning) on derived cells, whose
    /// value is owned by their recomputation rule.
    pub fn set(&self, value: T) {
        if self.state.disposed.load(Ordering::SeqCst) {
            return;
        }
        if self.state.derived {
            tracing::warn!(cell = %self.id(), "ignoring direct assignment to a derived cell");
            return;
        }
        let changed = {
            let mut guard = self.state.value.write();
            if identical(&*guard, &value) {
                false
            } else {
                *guard = value.clone();
                true
            }
        };
        if changed {
            self.state.observers.notify(&value);
        }
    }

    /// Update the value using a function of the current value.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let new_value = {
            let guard = self.state.value.read();
            f(&guard)
        };
        self.set(new_value);
    }

    /// Register an observer invoked synchronously on every accepted value
    /// change, in registration order.
    ///
    /// The callback must not register or remove observers on this same cell.
    pub fn observe<F>(&self, callback: F) -> ObserverId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.state.observers.add(Box::new(callback))
    }

    /// Remove an observer. Returns whether it was present.
    pub fn unobserve(&self, id: ObserverId) -> bool {
        self.state.observers.remove(id)
    }

    /// Number of registered observers.
    pub fn observer_count(&self) -> usize {
        self.state.observers.len()
    }

    /// Whether the cell has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.state.disposed.load(Ordering::SeqCst)
    }

    /// Dispose the cell: clear its observers, detach its recompute hooks
    /// from its parents, and remove it from its owning scope's registry.
    pub fn dispose(&self) {
        self.state.dispose_inner();
    }

    /// Type-erased handle to this cell's shared state.
    pub fn erased(&self) -> Arc<dyn ErasedCell> {
        self.state.clone()
    }

    pub(crate) fn parent_ref(&self) -> ParentRef {
        ParentRef {
            id: self.state.id,
            excluded: self.state.excluded,
        }
    }

    /// Overwrite the value without notifying observers.
    ///
    /// Used when resuming a captured render: the document already shows the
    /// captured value, so seeding must be silent.
    pub(crate) fn seed_silent(&self, raw: serde_json::Value) -> Result<(), serde_json::Error> {
        let Some(seed) = self.state.seed else {
            return Ok(());
        };
        let value = seed(raw)?;
        *self.state.value.write() = value;
        Ok(())
    }

    fn offer_to_sink(&self) {
        if self.state.excluded {
            return;
        }
        let Some(sink) = scope::current_sink() else {
            return;
        };
        match sink.adopt_root(self.erased()) {
            Adoption::Live | Adoption::Unclaimed => {}
            Adoption::Seed(raw) => {
                if let Err(err) = self.seed_silent(raw) {
                    tracing::warn!(
                        cell = %self.id(),
                        error = %err,
                        "failed to seed captured value; keeping initial"
                    );
                }
            }
        }
    }
}

impl<T> Cell<T>
where
    T: CellValue + Serialize + DeserializeOwned,
{
    /// Create a root cell with the given initial value.
    ///
    /// If a scope is active on this thread, the cell registers into it and
    /// its value is captured at render time (or seeded from the captured
    /// payload when resuming on the client).
    pub fn new(value: T) -> Self {
        let cell = Self::construct_root(
            value,
            false,
            None,
            Some(snapshot_value::<T>),
            Some(seed_value::<T>),
        );
        cell.offer_to_sink();
        cell
    }

    /// Create a root cell carrying a stable string tag, for cross-run
    /// diagnostics.
    pub fn tagged(value: T, tag: impl Into<String>) -> Self {
        let cell = Self::construct_root(
            value,
            false,
            Some(tag.into()),
            Some(snapshot_value::<T>),
            Some(seed_value::<T>),
        );
        cell.offer_to_sink();
        cell
    }
}

impl<T: CellValue> Clone for Cell<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: CellValue + Debug> Debug for Cell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cell")
            .field("id", &self.state.id)
            .field("value", &*self.state.value.read())
            .field("derived", &self.state.derived)
            .field("observer_count", &self.observer_count())
            .finish()
    }
}

/// Parent set of a derived cell.
///
/// Implemented for a single `Cell`, tuples of up to four cells, and
/// `Vec<Cell<T>>` for homogeneous lists. Declaration order is edge order in
/// the captured graph.
pub trait Sources: Clone + Send + Sync + 'static {
    /// Parent values as passed to the recomputation rule.
    type Values;

    /// Snapshot every parent value, in declaration order.
    fn read(&self) -> Self::Values;

    /// Identity and exclusion flags of every parent, in declaration order.
    fn parent_refs(&self) -> SmallVec<[ParentRef; 2]>;

    /// Whether every parent is excluded from hydration.
    fn all_excluded(&self) -> bool;

    /// Register a recompute hook on every parent, returning the handles
    /// needed to detach them later.
    fn attach<F>(&self, hook: F) -> SmallVec<[(Weak<dyn ErasedCell>, ObserverId); 2]>
    where
        F: Fn() + Send + Sync + Clone + 'static;
}

impl<A: CellValue> Sources for Cell<A> {
    type Values = A;

    fn read(&self) -> A {
        self.get()
    }

    fn parent_refs(&self) -> SmallVec<[ParentRef; 2]> {
        smallvec![self.parent_ref()]
    }

    fn all_excluded(&self) -> bool {
        self.state.excluded
    }

    fn attach<F>(&self, hook: F) -> SmallVec<[(Weak<dyn ErasedCell>, ObserverId); 2]>
    where
        F: Fn() + Send + Sync + Clone + 'static,
    {
        let id = self.state.observers.add(Box::new(move |_| hook()));
        smallvec![(Arc::downgrade(&self.erased()), id)]
    }
}

macro_rules! impl_sources_for_tuple {
    ($(($idx:tt, $ty:ident)),+) => {
        impl<$($ty: CellValue),+> Sources for ($(Cell<$ty>,)+) {
            type Values = ($($ty,)+);

            fn read(&self) -> Self::Values {
                ($(self.$idx.get(),)+)
            }

            fn parent_refs(&self) -> SmallVec<[ParentRef; 2]> {
                smallvec![$(self.$idx.parent_ref()),+]
            }

            fn all_excluded(&self) -> bool {
                $(self.$idx.state.excluded)&&+
            }

            fn attach<F>(&self, hook: F) -> SmallVec<[(Weak<dyn ErasedCell>, ObserverId); 2]>
            where
                F: Fn() + Send + Sync + Clone + 'static,
            {
                let mut hooks = SmallVec::new();
                $(
                    let per_parent = hook.clone();
                    let id = self.$idx.state.observers.add(Box::new(move |_| per_parent()));
                    hooks.push((Arc::downgrade(&self.$idx.erased()), id));
                )+
                hooks
            }
        }
    };
}

impl_sources_for_tuple!((0, S0));
impl_sources_for_tuple!((0, S0), (1, S1));
impl_sources_for_tuple!((0, S0), (1, S1), (2, S2));
impl_sources_for_tuple!((0, S0), (1, S1), (2, S2), (3, S3));

impl<A: CellValue> Sources for Vec<Cell<A>> {
    type Values = Vec<A>;

    fn read(&self) -> Vec<A> {
        self.iter().map(|cell| cell.get()).collect()
    }

    fn parent_refs(&self) -> SmallVec<[ParentRef; 2]> {
        self.iter().map(|cell| cell.parent_ref()).collect()
    }

    fn all_excluded(&self) -> bool {
        !self.is_empty() && self.iter().all(|cell| cell.state.excluded)
    }

    fn attach<F>(&self, hook: F) -> SmallVec<[(Weak<dyn ErasedCell>, ObserverId); 2]>
    where
        F: Fn() + Send + Sync + Clone + 'static,
    {
        let mut hooks = SmallVec::new();
        for cell in self {
            let per_parent = hook.clone();
            let id = cell.state.observers.add(Box::new(move |_| per_parent()));
            hooks.push((Arc::downgrade(&cell.erased()), id));
        }
        hooks
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn cell_get_and_set() {
        let cell = Cell::new(0);
        assert_eq!(cell.get(), 0);

        cell.set(42);
        assert_eq!(cell.get(), 42);
    }

    #[test]
    fn cell_update() {
        let cell = Cell::new(10);
        cell.update(|v| v + 5);
        assert_eq!(cell.get(), 15);
    }

    #[test]
    fn cell_ids_are_unique() {
        let a = Cell::new(0);
        let b = Cell::new(0);
        let c = Cell::new(0);

        assert_ne!(a.id(), b.id());
        assert_ne!(b.id(), c.id());
        assert_ne!(a.id(), c.id());
    }

    #[test]
    fn cell_notifies_observers_in_order() {
        let cell = Cell::new(0);
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        for tag in 0..3 {
            let order = order.clone();
            cell.observe(move |_| order.lock().push(tag));
        }

        cell.set(1);
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn setting_equal_value_does_not_notify() {
        let cell = Cell::new(7);
        let count = Arc::new(AtomicI32::new(0));

        let count_clone = count.clone();
        cell.observe(move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        cell.set(7);
        assert_eq!(count.load(Ordering::SeqCst), 0);

        cell.set(8);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn nan_to_nan_does_not_notify() {
        let cell = Cell::new(f64::NAN);
        let count = Arc::new(AtomicI32::new(0));

        let count_clone = count.clone();
        cell.observe(move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        cell.set(f64::NAN);
        assert_eq!(count.load(Ordering::SeqCst), 0);

        cell.set(1.0);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unobserve_stops_notifications() {
        let cell = Cell::new(0);
        let count = Arc::new(AtomicI32::new(0));

        let count_clone = count.clone();
        let id = cell.observe(move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        cell.set(1);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        assert!(cell.unobserve(id));
        cell.set(2);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn derive_computes_from_parents() {
        let a = Cell::new(1);
        let b = Cell::new(2);
        let sum = Cell::derive((a.clone(), b.clone()), |(x, y)| x + y);

        assert!(sum.is_derived());
        assert_eq!(sum.get(), 3);

        a.set(10);
        assert_eq!(sum.get(), 12);

        b.set(20);
        assert_eq!(sum.get(), 30);
    }

    #[test]
    fn derive_single_parent() {
        let a = Cell::new(1);
        let doubled = Cell::derive(a.clone(), |x| x * 2);

        assert_eq!(doubled.get(), 2);
        a.set(5);
        assert_eq!(doubled.get(), 10);
    }

    #[test]
    fn map_is_single_parent_derive() {
        let a = Cell::new(3);
        let label = a.map(|x| format!("value: {x}"));

        assert_eq!(label.get(), "value: 3");
        a.set(4);
        assert_eq!(label.get(), "value: 4");
    }

    #[test]
    fn derive_from_vec_of_parents() {
        let cells: Vec<Cell<i32>> = (1..=4).map(Cell::new).collect();
        let total = Cell::derive(cells.clone(), |values: Vec<i32>| values.iter().sum::<i32>());

        assert_eq!(total.get(), 10);
        cells[0].set(100);
        assert_eq!(total.get(), 109);
    }

    #[test]
    fn chained_derivation_propagates_depth_first() {
        let a = Cell::new(1);
        let b = Cell::derive(a.clone(), |x| x + 1);
        let c = Cell::derive(b.clone(), |x| x * 10);

        assert_eq!(c.get(), 20);

        a.set(4);
        assert_eq!(b.get(), 5);
        assert_eq!(c.get(), 50);
    }

    #[test]
    fn stable_derived_value_does_not_renotify() {
        let a = Cell::new(1);
        let clamped = Cell::derive(a.clone(), |x: i32| x.min(10));

        let count = Arc::new(AtomicI32::new(0));
        let count_clone = count.clone();
        clamped.observe(move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        // 20 and 30 both clamp to 10: only the first transition notifies.
        a.set(20);
        a.set(30);
        assert_eq!(clamped.get(), 10);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn setting_derived_cell_is_ignored() {
        let a = Cell::new(1);
        let b = Cell::derive(a.clone(), |x| x + 1);

        b.set(100);
        assert_eq!(b.get(), 2);
    }

    #[test]
    fn try_derive_propagates_construction_error() {
        let a = Cell::new(-1);
        let result: Result<Cell<i32>, _> = Cell::try_derive(a.clone(), |x: i32| {
            if x < 0 {
                Err(CellError::recompute("negative input"))
            } else {
                Ok(x * 2)
            }
        });

        assert!(result.is_err());
    }

    #[test]
    fn try_derive_recompute_error_keeps_previous_value() {
        let a = Cell::new(2);
        let halved = Cell::try_derive(a.clone(), |x: i32| {
            if x % 2 != 0 {
                Err(CellError::recompute("odd input"))
            } else {
                Ok(x / 2)
            }
        })
        .expect("even initial value");

        assert_eq!(halved.get(), 1);

        // The failing update is dropped; the cell keeps its last good value.
        a.set(3);
        assert_eq!(halved.get(), 1);

        // A later good update flows through normally.
        a.set(8);
        assert_eq!(halved.get(), 4);
    }

    #[test]
    fn dispose_clears_observers_and_detaches_from_parents() {
        let a = Cell::new(1);
        let b = Cell::derive(a.clone(), |x| x + 1);

        let count = Arc::new(AtomicI32::new(0));
        let count_clone = count.clone();
        b.observe(move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        b.dispose();
        assert!(b.is_disposed());

        a.set(5);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(b.get(), 2);
        // The parent no longer carries the recompute hook.
        assert_eq!(a.observer_count(), 0);
    }

    #[test]
    fn set_after_dispose_is_ignored() {
        let cell = Cell::new(1);
        cell.dispose();
        cell.set(2);
        assert_eq!(cell.get(), 1);
    }

    #[test]
    fn clone_shares_state() {
        let cell1 = Cell::new(0);
        let cell2 = cell1.clone();

        cell1.set(42);
        assert_eq!(cell2.get(), 42);

        cell2.set(100);
        assert_eq!(cell1.get(), 100);
        assert_eq!(cell1.id(), cell2.id());
    }

    #[test]
    fn ephemeral_cells_are_excluded() {
        let cell = Cell::ephemeral("local only".to_string());
        assert!(cell.is_excluded());
        assert!(!cell.is_derived());
    }

    #[test]
    fn exclusion_propagates_through_derivation() {
        let path = Cell::ephemeral("/home".to_string());
        let segment = Cell::derive(path.clone(), |p: String| p.len());
        assert!(segment.is_excluded());

        // A mixed parent set is not excluded; only the excluded edge is.
        let count = Cell::new(1usize);
        let mixed = Cell::derive((path, count), |(p, n)| p.len() + n);
        assert!(!mixed.is_excluded());
    }

    #[test]
    fn tagged_cell_carries_tag() {
        let cell = Cell::tagged(1, "counter");
        assert_eq!(cell.tag().as_deref(), Some("counter"));
    }

    #[test]
    fn parent_refs_preserve_declaration_order() {
        let a = Cell::new(1);
        let b = Cell::new(2);
        let sum = Cell::derive((a.clone(), b.clone()), |(x, y)| x + y);

        let refs = sum.erased().parent_refs();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].id, a.id());
        assert_eq!(refs[1].id, b.id());
    }

    #[test]
    fn diamond_dependency_settles() {
        let a = Cell::new(1);
        let b = Cell::derive(a.clone(), |x| x + 1);
        let c = Cell::derive(a.clone(), |x| x * 2);
        let d = Cell::derive((b.clone(), c.clone()), |(x, y)| x + y);

        assert_eq!(d.get(), 4);

        a.set(3);
        assert_eq!(b.get(), 4);
        assert_eq!(c.get(), 6);
        assert_eq!(d.get(), 10);
    }
}

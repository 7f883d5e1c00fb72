// ============================================================================
// spark-observables - Type Definitions
// Identifiers, element bounds, type tags and the type-erased Observable trait
// ============================================================================

use std::any::TypeId;
use std::fmt;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::realm::RealmRef;

// =============================================================================
// ELEMENT BOUND
// =============================================================================

/// Bound shared by every key, value and set element.
///
/// Values take part in reverse indices and range sets, so they need the
/// same `Eq + Hash` contract as keys.
pub trait Element: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

impl<T> Element for T where T: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

// =============================================================================
// IDENTIFIERS
// =============================================================================

static NEXT_OBSERVABLE_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of an observable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObservableId(u64);

impl ObservableId {
    pub(crate) fn next() -> Self {
        Self(NEXT_OBSERVABLE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObservableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Handle returned by every `add_*_listener` call.
///
/// Closures have no identity in Rust, so removal goes through this handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    pub(crate) fn next() -> Self {
        Self(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

// =============================================================================
// TYPE TAGS
// =============================================================================

/// Nullable runtime type tag reported by `key_type()` / `value_type()`.
#[derive(Clone, Copy)]
pub struct TypeTag {
    id: TypeId,
    name: &'static str,
}

impl TypeTag {
    /// Tag for `T`.
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// The Rust type name, for diagnostics only.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// True if this tag was created for `T`.
    pub fn is<T: 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

impl PartialEq for TypeTag {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeTag {}

impl Debug for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TypeTag").field(&self.name).finish()
    }
}

// =============================================================================
// LISTENER CALLBACKS
// =============================================================================

/// Listener for change, stale and dispose notifications.
pub type Callback = Arc<dyn Fn() + Send + Sync>;

/// Listener receiving a typed diff (map, set or value change).
pub type DiffCallback<D> = Arc<dyn Fn(&D) + Send + Sync>;

// =============================================================================
// OBSERVABLE - the type-erased capability set
// =============================================================================

/// Behavior shared by every observable, independent of what it holds.
///
/// Listener registration is the only family of methods that may be called
/// from any thread. Everything that reads or writes state must run inside
/// the observable's realm.
pub trait Observable: Send + Sync + 'static {
    /// Process-unique identity
    fn id(&self) -> ObservableId;

    /// The realm all state access is confined to
    fn realm(&self) -> &RealmRef;

    /// Listen for "something changed" notifications.
    fn add_change_listener(&self, listener: Callback) -> ListenerId;

    /// Returns false if `id` is not a registered change listener.
    fn remove_change_listener(&self, id: ListenerId) -> bool;

    /// Listen for the observable becoming stale.
    fn add_stale_listener(&self, listener: Callback) -> ListenerId;

    /// Returns false if `id` is not a registered stale listener.
    fn remove_stale_listener(&self, id: ListenerId) -> bool;

    /// Listen for the terminal dispose notification.
    fn add_dispose_listener(&self, listener: Callback) -> ListenerId;

    /// Returns false if `id` is not a registered dispose listener.
    fn remove_dispose_listener(&self, id: ListenerId) -> bool;

    /// Whether the current contents are known to be out of date.
    fn is_stale(&self) -> bool;

    /// Fire the dispose notification and release all listeners.
    ///
    /// Idempotent: later calls do nothing.
    fn dispose(&self);

    /// True once `dispose` has run.
    fn is_disposed(&self) -> bool;
}

// =============================================================================
// TESTS
// =============================================================================

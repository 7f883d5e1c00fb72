// ============================================================================
// spark-observables - Observable Maps with Incremental Diffs
// ============================================================================
//
// Writable maps, sets and values that report every mutation as a diff, all
// confined to a realm, plus operators that compose them: decorating maps,
// a lazily indexed bidirectional map, computed maps and composite maps.
// ============================================================================

pub mod collections;
pub mod core;
pub mod diff;
pub mod primitives;
pub mod reactivity;

mod macros;

// Re-export core items at crate root for ergonomic access
pub use crate::core::error::{ObservableError, Result};
pub use crate::core::realm::{check_realm, same_realm, try_check_realm, Realm, RealmRef, Task, ThreadRealm};
pub use crate::core::types::{
    Callback, DiffCallback, Element, ListenerId, Observable, ObservableId, TypeTag,
};

// Re-export diffs
pub use diff::{MapDiff, MapDiffBuilder, SetDiff, SimulatedMap, ValueDiff};

// Re-export collections
pub use collections::{
    Identity, IdentityMap, IdentitySet, MapOptions, ObservableMap, ObservableSet,
    ObservableValue, SetOptions, WritableMap, WritableSet, WritableValue,
};

// Re-export primitives
pub use primitives::{
    BidiMap, CompositeMap, ComputedMap, DecoratingMap, DecoratingOptions, DetailFactory,
    DetailValues, FnProjection, KeyNotifier, KeyProjection, MapDecoration, PassThrough,
    PendingTransition, ReadOnly, ReverseIndex, UnmodifiableMap,
};

// Re-export reactivity functions
pub use reactivity::equality::{equals, never_equals, EqualsFn};
pub use reactivity::listeners::{ChangeSupport, EventKind, Listener, ObservableEvent};
pub use reactivity::observable::{ObservableCore, ObservableImpl};
pub use reactivity::tracking::{is_tracking, observe_reads, track_read, untrack};

// =============================================================================
// TESTS
// =============================================================================

// ============================================================================
// spark-observables - Core Module
// Realms, identifiers, errors and the per-thread tracking context
// ============================================================================

pub mod context;
pub mod error;
pub mod realm;
pub mod types;

// Re-export commonly used items
pub use context::{is_tracking, is_untracking, with_context, TrackingContext};
pub use error::{ObservableError, Result};
pub use realm::{check_realm, same_realm, try_check_realm, Realm, RealmRef, Task, ThreadRealm};
pub use types::{
    Callback, DiffCallback, Element, ListenerId, Observable, ObservableId, TypeTag,
};

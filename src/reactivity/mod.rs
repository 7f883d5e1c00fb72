// ============================================================================
// spark-observables - Reactivity Module
// Dependency tracking, listener bookkeeping and the shared observable core
// ============================================================================

pub mod equality;
pub mod listeners;
pub mod observable;
pub mod tracking;

// Re-export main tracking functions
pub use tracking::{is_tracking, observe_reads, track_read, untrack};

// Re-export the extension point for new observables
pub use listeners::{ChangeSupport, EventKind, Listener, ObservableEvent};
pub use observable::{ObservableCore, ObservableImpl};

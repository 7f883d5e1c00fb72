// ============================================================================
// spark-observables - Primitives Module
// Composition operators: decorating, bidirectional index, computed, composite
// ============================================================================

pub mod bidi;
pub mod composite;
pub mod computed;
pub mod decorating;

// Re-export for convenience
pub use bidi::{BidiMap, ReverseIndex};
pub use composite::{CompositeMap, PendingTransition};
pub use computed::{
    ComputedMap, DetailFactory, DetailValues, FnProjection, KeyNotifier, KeyProjection,
};
pub use decorating::{
    DecoratingMap, DecoratingOptions, MapDecoration, PassThrough, ReadOnly, UnmodifiableMap,
};

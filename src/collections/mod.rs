// ============================================================================
// spark-observables - Observable Collections
// Capability traits plus the writable map, set and value they are fed from
// ============================================================================
//
// Every container here fires exactly one diff per mutating call and nothing
// for calls that change nothing. Reads go through `getter_called`, so they
// are realm-checked and visible to `observe_reads`.
// ============================================================================

pub mod identity;
mod map;
mod set;
pub mod traits;
mod value;

pub use identity::{Identity, IdentityMap, IdentitySet};
pub use map::{MapOptions, WritableMap};
pub use set::{SetOptions, WritableSet};
pub use traits::{ObservableMap, ObservableSet, ObservableValue};
pub use value::WritableValue;

// ============================================================================
// spark-observables - Diffs
// Immutable descriptions of map, set and value transitions
// ============================================================================

pub mod map_diff;
pub mod set_diff;

pub use map_diff::{MapDiff, MapDiffBuilder, SimulatedMap};
pub use set_diff::{SetDiff, ValueDiff};

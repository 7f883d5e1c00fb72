// ============================================================================
// spark-observables - Capability Traits
// Map, set and value observables as object-safe behavior sets
// ============================================================================
//
// Composition operators hold `Arc<dyn ObservableMap<K, V>>` and delegate to
// it instead of inheriting from a concrete base. Every read method must run
// inside the observable's realm and reports itself to dependency tracking.
// Mutations default to `Unsupported` so read-only views need not mention them.
// ============================================================================

use std::collections::{HashMap, HashSet};

use crate::core::error::{ObservableError, Result};
use crate::core::types::{DiffCallback, Element, ListenerId, Observable, TypeTag};
use crate::diff::{MapDiff, SetDiff, ValueDiff};

// =============================================================================
// OBSERVABLE MAP
// =============================================================================

/// A key-value container that reports every change as a [`MapDiff`].
pub trait ObservableMap<K: Element, V: Element>: Observable {
    /// Listen for map diffs. Fired after the generic change notification.
    fn add_map_change_listener(&self, listener: DiffCallback<MapDiff<K, V>>) -> ListenerId;

    /// Returns false if `id` is not a registered map-change listener.
    fn remove_map_change_listener(&self, id: ListenerId) -> bool;

    /// Runtime key type, if known
    fn key_type(&self) -> Option<TypeTag> {
        None
    }

    /// Runtime value type, if known
    fn value_type(&self) -> Option<TypeTag> {
        None
    }

    // =========================================================================
    // READS
    // =========================================================================

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn contains_key(&self, key: &K) -> bool;

    fn contains_value(&self, value: &V) -> bool {
        self.values().iter().any(|v| v == value)
    }

    fn get(&self, key: &K) -> Option<V>;

    /// Snapshot of the current keys
    fn key_set(&self) -> HashSet<K>;

    /// Snapshot of the current values
    fn values(&self) -> Vec<V>;

    /// Snapshot of the current entries
    fn entries(&self) -> Vec<(K, V)>;

    /// Snapshot of the whole map
    fn to_map(&self) -> HashMap<K, V> {
        self.entries().into_iter().collect()
    }

    // =========================================================================
    // WRITES
    // =========================================================================

    /// Associate `value` with `key`, returning the previous value.
    fn put(&self, key: K, value: V) -> Result<Option<V>> {
        let _ = (key, value);
        Err(ObservableError::Unsupported("put"))
    }

    /// Remove `key`, returning its value if it was present.
    fn remove(&self, key: &K) -> Result<Option<V>> {
        let _ = key;
        Err(ObservableError::Unsupported("remove"))
    }

    /// Remove every entry.
    fn clear(&self) -> Result<()> {
        Err(ObservableError::Unsupported("clear"))
    }

    /// Insert every entry of `entries` as one change.
    fn put_all(&self, entries: HashMap<K, V>) -> Result<()> {
        let _ = entries;
        Err(ObservableError::Unsupported("put_all"))
    }
}

// =============================================================================
// OBSERVABLE SET
// =============================================================================

/// An element container that reports every change as a [`SetDiff`].
pub trait ObservableSet<T: Element>: Observable {
    /// Listen for set diffs. Fired after the generic change notification.
    fn add_set_change_listener(&self, listener: DiffCallback<SetDiff<T>>) -> ListenerId;

    /// Returns false if `id` is not a registered set-change listener.
    fn remove_set_change_listener(&self, id: ListenerId) -> bool;

    /// Runtime element type, if known
    fn element_type(&self) -> Option<TypeTag> {
        None
    }

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn contains(&self, element: &T) -> bool;

    /// Snapshot of the current elements
    fn elements(&self) -> HashSet<T>;

    /// Returns true if `element` was not present.
    fn add(&self, element: T) -> Result<bool> {
        let _ = element;
        Err(ObservableError::Unsupported("add"))
    }

    /// Returns true if `element` was present.
    fn remove(&self, element: &T) -> Result<bool> {
        let _ = element;
        Err(ObservableError::Unsupported("remove"))
    }

    fn clear(&self) -> Result<()> {
        Err(ObservableError::Unsupported("clear"))
    }

    /// Returns true if the set changed.
    fn add_all(&self, elements: Vec<T>) -> Result<bool> {
        let _ = elements;
        Err(ObservableError::Unsupported("add_all"))
    }

    /// Returns true if the set changed.
    fn remove_all(&self, elements: Vec<T>) -> Result<bool> {
        let _ = elements;
        Err(ObservableError::Unsupported("remove_all"))
    }

    /// Add and remove elements as a single change.
    fn add_and_remove(&self, additions: HashSet<T>, removals: HashSet<T>) -> Result<()> {
        let _ = (additions, removals);
        Err(ObservableError::Unsupported("add_and_remove"))
    }
}

// =============================================================================
// OBSERVABLE VALUE
// =============================================================================

/// A single value that reports replacement as a [`ValueDiff`].
pub trait ObservableValue<T: Element>: Observable {
    /// Listen for value changes. Fired after the generic change notification.
    fn add_value_change_listener(&self, listener: DiffCallback<ValueDiff<T>>) -> ListenerId;

    /// Returns false if `id` is not a registered value-change listener.
    fn remove_value_change_listener(&self, id: ListenerId) -> bool;

    /// Runtime value type, if known
    fn value_type(&self) -> Option<TypeTag> {
        None
    }

    fn get(&self) -> T;

    fn set(&self, value: T) -> Result<()> {
        let _ = value;
        Err(ObservableError::Unsupported("set"))
    }
}

// ============================================================================
// spark-observables - WritableMap
// A HashMap that fires exactly one diff per mutating call
// ============================================================================

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::collections::traits::ObservableMap;
use crate::core::error::Result;
use crate::core::realm::RealmRef;
use crate::core::types::{DiffCallback, Element, ListenerId, Observable, TypeTag};
use crate::diff::MapDiff;
use crate::reactivity::equality::{EqualsFn, equals};
use crate::reactivity::listeners::{EventKind, Listener};
use crate::reactivity::observable::{ObservableCore, ObservableImpl};

// =============================================================================
// OPTIONS
// =============================================================================

/// Options for creating a writable map.
pub struct MapOptions<V> {
    /// Reported by `key_type()`
    pub key_type: Option<TypeTag>,

    /// Reported by `value_type()`
    pub value_type: Option<TypeTag>,

    /// Decides whether a `put` over an existing key is a change.
    /// Defaults to `PartialEq`.
    pub equals: Option<EqualsFn<V>>,
}

impl<V> Default for MapOptions<V> {
    fn default() -> Self {
        Self {
            key_type: None,
            value_type: None,
            equals: None,
        }
    }
}

impl<V: 'static> MapOptions<V> {
    /// Options carrying type tags for `K` and `V`.
    pub fn typed<K: 'static>() -> Self {
        Self {
            key_type: Some(TypeTag::of::<K>()),
            value_type: Some(TypeTag::of::<V>()),
            equals: None,
        }
    }
}

// =============================================================================
// WRITABLE MAP
// =============================================================================

/// An observable map backed by a plain `HashMap`.
///
/// Every mutating call computes its diff against the state before the call
/// and fires at most one notification; calls that change nothing fire
/// nothing.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use spark_observables::{MapDiff, ObservableMap, ThreadRealm, WritableMap};
///
/// let realm = ThreadRealm::new();
/// let map = WritableMap::<&str, i32>::new(realm);
///
/// let fired = Arc::new(parking_lot::Mutex::new(Vec::new()));
/// let sink = fired.clone();
/// map.add_map_change_listener(Arc::new(move |d: &MapDiff<&str, i32>| sink.lock().push(d.clone())));
///
/// map.put("a", 1).unwrap();
/// map.put("a", 1).unwrap(); // unchanged, nothing fired
/// map.put("a", 2).unwrap();
///
/// let fired = fired.lock();
/// assert_eq!(fired.len(), 2);
/// assert!(fired[1].changed_keys().contains("a"));
/// ```
pub struct WritableMap<K, V> {
    core: ObservableCore<MapDiff<K, V>>,
    data: Mutex<HashMap<K, V>>,
    key_type: Option<TypeTag>,
    value_type: Option<TypeTag>,
    equals: EqualsFn<V>,
}

impl<K: Element, V: Element> WritableMap<K, V> {
    /// Create an empty map confined to `realm`.
    pub fn new(realm: RealmRef) -> Arc<Self> {
        Self::with_options(realm, HashMap::new(), MapOptions::default())
    }

    /// Create a map holding `contents`.
    pub fn with_contents(realm: RealmRef, contents: HashMap<K, V>) -> Arc<Self> {
        Self::with_options(realm, contents, MapOptions::default())
    }

    /// Create a map holding `contents`, configured by `options`.
    pub fn with_options(
        realm: RealmRef,
        contents: HashMap<K, V>,
        options: MapOptions<V>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me: &Weak<Self>| {
            let owner: Weak<dyn Observable> = me.clone();
            Self {
                core: ObservableCore::new(realm, owner),
                data: Mutex::new(contents),
                key_type: options.key_type,
                value_type: options.value_type,
                equals: options.equals.unwrap_or(equals),
            }
        })
    }

    /// Mark the contents stale (or fresh). Fires a stale notification when
    /// the map becomes stale.
    pub fn set_stale(&self, stale: bool) {
        self.core.set_stale(stale);
    }

    fn fire(&self, diff: MapDiff<K, V>) {
        if diff.is_empty() {
            return;
        }
        tracing::trace!(observable = %self.core.id(), %diff, "writable map changed");
        self.core.fire_diff(diff);
    }
}

impl<K: Element, V: Element> ObservableImpl for WritableMap<K, V> {
    type Diff = MapDiff<K, V>;

    fn core(&self) -> &ObservableCore<MapDiff<K, V>> {
        &self.core
    }
}

impl<K: Element, V: Element> ObservableMap<K, V> for WritableMap<K, V> {
    fn add_map_change_listener(&self, listener: DiffCallback<MapDiff<K, V>>) -> ListenerId {
        self.add_listener(Listener::Diff(listener))
    }

    fn remove_map_change_listener(&self, id: ListenerId) -> bool {
        self.remove_listener(EventKind::Diff, id)
    }

    fn key_type(&self) -> Option<TypeTag> {
        self.key_type
    }

    fn value_type(&self) -> Option<TypeTag> {
        self.value_type
    }

    // =========================================================================
    // READS
    // =========================================================================

    fn len(&self) -> usize {
        self.core.getter_called();
        self.data.lock().len()
    }

    fn contains_key(&self, key: &K) -> bool {
        self.core.getter_called();
        self.data.lock().contains_key(key)
    }

    fn contains_value(&self, value: &V) -> bool {
        self.core.getter_called();
        self.data.lock().values().any(|v| v == value)
    }

    fn get(&self, key: &K) -> Option<V> {
        self.core.getter_called();
        self.data.lock().get(key).cloned()
    }

    fn key_set(&self) -> HashSet<K> {
        self.core.getter_called();
        self.data.lock().keys().cloned().collect()
    }

    fn values(&self) -> Vec<V> {
        self.core.getter_called();
        self.data.lock().values().cloned().collect()
    }

    fn entries(&self) -> Vec<(K, V)> {
        self.core.getter_called();
        self.data
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn to_map(&self) -> HashMap<K, V> {
        self.core.getter_called();
        self.data.lock().clone()
    }

    // =========================================================================
    // WRITES
    // =========================================================================

    fn put(&self, key: K, value: V) -> Result<Option<V>> {
        self.core.check_realm();
        let (previous, diff) = {
            let mut data = self.data.lock();
            match data.insert(key.clone(), value.clone()) {
                None => (None, MapDiff::single_add(key, value)),
                Some(old) if (self.equals)(&old, &value) => (Some(old), MapDiff::empty()),
                Some(old) => (
                    Some(old.clone()),
                    MapDiff::single_change(key, old, value),
                ),
            }
        };
        self.fire(diff);
        Ok(previous)
    }

    fn remove(&self, key: &K) -> Result<Option<V>> {
        self.core.check_realm();
        let removed = self.data.lock().remove(key);
        if let Some(old) = &removed {
            self.fire(MapDiff::single_remove(key.clone(), old.clone()));
        }
        Ok(removed)
    }

    fn clear(&self) -> Result<()> {
        self.core.check_realm();
        let contents = std::mem::take(&mut *self.data.lock());
        if !contents.is_empty() {
            self.fire(MapDiff::remove_all(contents));
        }
        Ok(())
    }

    fn put_all(&self, entries: HashMap<K, V>) -> Result<()> {
        self.core.check_realm();
        // Keys are unique here, so nothing needs folding; the configured
        // equality alone decides what counts as a change
        let diff = {
            let mut data = self.data.lock();
            let mut added = HashSet::new();
            let mut changed = HashSet::new();
            let mut old_values = HashMap::new();
            let mut new_values = HashMap::new();
            for (key, value) in entries {
                match data.insert(key.clone(), value.clone()) {
                    None => {
                        added.insert(key.clone());
                    }
                    Some(old) if (self.equals)(&old, &value) => continue,
                    Some(old) => {
                        changed.insert(key.clone());
                        old_values.insert(key.clone(), old);
                    }
                }
                new_values.insert(key, value);
            }
            MapDiff::new(added, HashSet::new(), changed, old_values, new_values)
        };
        self.fire(diff);
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

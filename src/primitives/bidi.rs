// ============================================================================
// spark-observables - BidiMap
// A decorating map with a lazily maintained value -> keys index
// ============================================================================
//
// UNINDEXED: no listeners, `get_keys` scans the decorated map.
// INDEXED:   at least one listener, the index is built once from the current
//            entries and then updated from every incoming diff before that
//            diff is re-fired.
// ============================================================================

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::collections::traits::ObservableMap;
use crate::core::types::Element;
use crate::diff::MapDiff;
use crate::primitives::decorating::{DecoratingMap, MapDecoration};
use crate::reactivity::observable::ObservableImpl;
use crate::reactivity::tracking::untrack;

/// An observable map that can answer "which keys map to this value?"
pub type BidiMap<K, V> = DecoratingMap<K, V, ReverseIndex<K, V>>;

// =============================================================================
// INDEX
// =============================================================================

/// Value -> key(s). A value lives in exactly one of the two maps.
struct Index<K, V> {
    single: HashMap<V, K>,
    multi: HashMap<V, HashSet<K>>,
}

impl<K: Element, V: Element> Index<K, V> {
    fn build(entries: Vec<(K, V)>) -> Self {
        let mut index = Self {
            single: HashMap::new(),
            multi: HashMap::new(),
        };
        for (key, value) in entries {
            index.insert(value, key);
        }
        index
    }

    fn insert(&mut self, value: V, key: K) {
        if let Some(keys) = self.multi.get_mut(&value) {
            keys.insert(key);
            return;
        }
        match self.single.remove(&value) {
            None => {
                self.single.insert(value, key);
            }
            Some(existing) if existing == key => {
                self.single.insert(value, existing);
            }
            Some(existing) => {
                self.multi.insert(value, HashSet::from([existing, key]));
            }
        }
    }

    fn remove(&mut self, value: &V, key: &K) {
        if self.single.get(value) == Some(key) {
            self.single.remove(value);
            return;
        }
        let Some(keys) = self.multi.get_mut(value) else {
            return;
        };
        keys.remove(key);
        if keys.len() <= 1 {
            // Collapse back to the single-key form, or to absence
            let remaining = self.multi.remove(value).into_iter().flatten().next();
            if let Some(last) = remaining {
                self.single.insert(value.clone(), last);
            }
        }
    }

    fn apply(&mut self, diff: &MapDiff<K, V>) {
        for key in diff.removed_keys() {
            if let Some(old) = diff.old_value(key) {
                self.remove(old, key);
            }
        }
        for key in diff.changed_keys() {
            if let Some(old) = diff.old_value(key) {
                self.remove(old, key);
            }
            if let Some(new) = diff.new_value(key) {
                self.insert(new.clone(), key.clone());
            }
        }
        for key in diff.added_keys() {
            if let Some(new) = diff.new_value(key) {
                self.insert(new.clone(), key.clone());
            }
        }
    }

    fn keys_of(&self, value: &V) -> HashSet<K> {
        if let Some(key) = self.single.get(value) {
            return HashSet::from([key.clone()]);
        }
        self.multi.get(value).cloned().unwrap_or_default()
    }

    fn contains(&self, value: &V) -> bool {
        self.single.contains_key(value) || self.multi.contains_key(value)
    }

    fn clear(&mut self) {
        self.single.clear();
        self.multi.clear();
    }
}

enum IndexState<K, V> {
    Unindexed,
    /// Hooked, waiting for the realm to run the build
    Building,
    Indexed(Index<K, V>),
}

// =============================================================================
// REVERSE INDEX DECORATION
// =============================================================================

/// Decoration maintaining the reverse index of a [`BidiMap`].
pub struct ReverseIndex<K, V> {
    state: Arc<Mutex<IndexState<K, V>>>,
}

impl<K: Element, V: Element> ReverseIndex<K, V> {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(IndexState::Unindexed)),
        }
    }

    fn is_indexed(&self) -> bool {
        matches!(*self.state.lock(), IndexState::Indexed(_))
    }

    fn lookup(&self, value: &V) -> Option<HashSet<K>> {
        match &*self.state.lock() {
            IndexState::Indexed(index) => Some(index.keys_of(value)),
            _ => None,
        }
    }
}

impl<K: Element, V: Element> Default for ReverseIndex<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Element, V: Element> MapDecoration<K, V> for ReverseIndex<K, V> {
    fn handle_map_change(
        &self,
        _decorated: &dyn ObservableMap<K, V>,
        diff: &MapDiff<K, V>,
    ) -> Option<MapDiff<K, V>> {
        if let IndexState::Indexed(index) = &mut *self.state.lock() {
            index.apply(diff);
        }
        Some(diff.clone())
    }

    fn first_listener_added(&self, decorated: &Arc<dyn ObservableMap<K, V>>) {
        *self.state.lock() = IndexState::Building;

        let state = self.state.clone();
        let source = decorated.clone();
        decorated.realm().exec(Box::new(move || {
            if source.is_disposed() || !matches!(*state.lock(), IndexState::Building) {
                return;
            }
            let entries = untrack(|| source.entries());
            let index = Index::build(entries);

            let mut state = state.lock();
            // Unhooked while the entries were being read
            if matches!(*state, IndexState::Building) {
                tracing::debug!(
                    upstream = %source.id(),
                    values = index.single.len() + index.multi.len(),
                    "reverse index built"
                );
                *state = IndexState::Indexed(index);
            }
        }));
    }

    fn last_listener_removed(&self) {
        let mut state = self.state.lock();
        if let IndexState::Indexed(index) = &mut *state {
            index.clear();
            tracing::debug!("reverse index cleared");
        }
        *state = IndexState::Unindexed;
    }

    fn released(&self) {
        self.last_listener_removed();
    }

    fn contains_value(&self, value: &V) -> Option<bool> {
        match &*self.state.lock() {
            IndexState::Indexed(index) => Some(index.contains(value)),
            _ => None,
        }
    }
}

// =============================================================================
// BIDI MAP
// =============================================================================

impl<K: Element, V: Element> BidiMap<K, V> {
    /// Index `decorated` by value.
    pub fn indexed(decorated: Arc<dyn ObservableMap<K, V>>) -> Arc<Self> {
        Self::new(decorated, ReverseIndex::new())
    }

    /// Every key currently mapped to `value`.
    ///
    /// Answered from the index while indexed, by a scan otherwise; both give
    /// the same set.
    pub fn get_keys(&self, value: &V) -> HashSet<K> {
        self.core().getter_called();
        match self.decoration().lookup(value) {
            Some(keys) => keys,
            None => self.scan_keys(value),
        }
    }

    /// True while the reverse index is live
    pub fn is_indexed(&self) -> bool {
        self.decoration().is_indexed()
    }

    fn scan_keys(&self, value: &V) -> HashSet<K> {
        untrack(|| self.decorated().entries())
            .into_iter()
            .filter(|(_, v)| v == value)
            .map(|(k, _)| k)
            .collect()
    }
}

// =============================================================================
// TESTS
// =============================================================================

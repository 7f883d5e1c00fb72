// ============================================================================
// spark-observables - CompositeMap
// Chain two observable maps: (K -> I) then (I -> V) gives K -> V
// ============================================================================
//
// The first map's values form the range set, which is the key set handed to
// the second map. A first-map change that moves an intermediate value into
// or out of the range set cannot be answered until the second map has seen
// the range-set update, so it is parked in a pending log and resolved when
// the second map reports the matching add or remove.
//
//   first diff ─┬─ direct updates ───────────────────────────► fire
//               └─ Enter/Leave ─► range.add_and_remove ─► second diff
//                                                           └─ resolve ─► fire
// ============================================================================

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::collections::WritableSet;
use crate::collections::traits::{ObservableMap, ObservableSet};
use crate::core::error::{ObservableError, fail};
use crate::core::realm::{check_realm, same_realm};
use crate::core::types::{DiffCallback, Element, ListenerId, Observable, TypeTag};
use crate::diff::{MapDiff, MapDiffBuilder};
use crate::primitives::bidi::BidiMap;
use crate::reactivity::listeners::{EventKind, Listener};
use crate::reactivity::observable::{ObservableCore, ObservableImpl};
use crate::reactivity::tracking::untrack;

// =============================================================================
// PENDING TRANSITIONS
// =============================================================================

/// A range-set membership change awaiting confirmation from the second map.
#[derive(Debug, Clone)]
pub enum PendingTransition<K> {
    /// The intermediate value is about to join the range set
    Enter,
    /// The intermediate value is about to leave; these first-map keys went
    /// with it
    Leave { removed_keys: HashSet<K> },
}

impl<K: Element> PartialEq for PendingTransition<K> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Enter, Self::Enter) => true,
            (Self::Leave { removed_keys: a }, Self::Leave { removed_keys: b }) => a == b,
            _ => false,
        }
    }
}

impl<K: Element> Eq for PendingTransition<K> {}

fn record<K: Element, I: Element>(
    log: &mut HashMap<I, PendingTransition<K>>,
    value: I,
    transition: PendingTransition<K>,
) {
    match log.entry(value) {
        Entry::Vacant(slot) => {
            slot.insert(transition);
        }
        Entry::Occupied(mut slot) => {
            let merged = match (slot.get_mut(), transition) {
                (PendingTransition::Enter, PendingTransition::Enter) => true,
                (
                    PendingTransition::Leave { removed_keys },
                    PendingTransition::Leave { removed_keys: more },
                ) => {
                    removed_keys.extend(more);
                    true
                }
                _ => false,
            };
            if !merged {
                fail(ObservableError::ConflictingTransition {
                    value: format!("{:?}", slot.key()),
                });
            }
        }
    }
}

struct CompositeState<K, I, V> {
    /// The composed contents as last reported
    wrapped: HashMap<K, V>,
    pending: HashMap<I, PendingTransition<K>>,
}

struct Subscriptions {
    first_diff: ListenerId,
    first_stale: ListenerId,
    first_dispose: ListenerId,
    second_diff: ListenerId,
    second_stale: ListenerId,
}

// =============================================================================
// COMPOSITE MAP
// =============================================================================

/// Read-only composition of a first map `K -> I` and a second map
/// `I -> V` built over the first map's range.
///
/// The second map is created by a factory that receives the live range set
/// and is owned (and disposed) by the composite. The first map is not.
///
/// # Example
///
/// ```
/// use std::collections::HashMap;
/// use spark_observables::{CompositeMap, ComputedMap, ObservableMap, ThreadRealm, WritableMap};
///
/// let realm = ThreadRealm::new();
/// let person_city = WritableMap::with_contents(
///     realm,
///     HashMap::from([("ann", "oslo"), ("bob", "rome")]),
/// );
/// let composite = CompositeMap::new(person_city.clone(), |cities| {
///     ComputedMap::from_fn(cities, |city: &&str| city.len())
/// });
///
/// assert_eq!(composite.get(&"bob"), Some(4));
/// person_city.put("bob", "lisbon").unwrap();
/// assert_eq!(composite.get(&"bob"), Some(6));
/// ```
pub struct CompositeMap<K: Element, I: Element, V: Element> {
    core: ObservableCore<MapDiff<K, V>>,
    first: Arc<BidiMap<K, I>>,
    range: Arc<WritableSet<I>>,
    second: Arc<dyn ObservableMap<I, V>>,
    state: Mutex<CompositeState<K, I, V>>,
    subscriptions: Mutex<Option<Subscriptions>>,
}

impl<K: Element, I: Element, V: Element> CompositeMap<K, I, V> {
    /// Chain `first` with the map `second_factory` builds over its range.
    ///
    /// Must be called inside `first`'s realm. The second map must live in
    /// the same realm.
    pub fn new<M, F>(first: Arc<dyn ObservableMap<K, I>>, second_factory: F) -> Arc<Self>
    where
        M: ObservableMap<I, V>,
        F: FnOnce(Arc<dyn ObservableSet<I>>) -> Arc<M>,
    {
        Self::with_factory(first, |range| {
            let second: Arc<dyn ObservableMap<I, V>> = second_factory(range);
            second
        })
    }

    /// Like [`CompositeMap::new`], for factories that already return a
    /// trait object.
    pub fn with_factory<F>(first: Arc<dyn ObservableMap<K, I>>, second_factory: F) -> Arc<Self>
    where
        F: FnOnce(Arc<dyn ObservableSet<I>>) -> Arc<dyn ObservableMap<I, V>>,
    {
        let realm = first.realm().clone();
        check_realm(&*realm);

        let first = BidiMap::indexed(first);
        let range = WritableSet::with_elements(
            realm.clone(),
            untrack(|| first.values()).into_iter().collect(),
        );
        let range_handle: Arc<dyn ObservableSet<I>> = range.clone();
        let second = second_factory(range_handle);
        if !same_realm(&realm, second.realm()) {
            fail(ObservableError::RealmMismatch {
                context: "composite map second map",
            });
        }

        let wrapped = untrack(|| {
            first
                .entries()
                .into_iter()
                .filter_map(|(k, i)| second.get(&i).map(|v| (k, v)))
                .collect()
        });

        let composite = Arc::new_cyclic(|me: &Weak<Self>| {
            let owner: Weak<dyn Observable> = me.clone();
            Self {
                core: ObservableCore::new(realm, owner),
                first,
                range,
                second,
                state: Mutex::new(CompositeState {
                    wrapped,
                    pending: HashMap::new(),
                }),
                subscriptions: Mutex::new(None),
            }
        });
        composite.subscribe();
        composite
    }

    fn subscribe(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let first_diff = self
            .first
            .add_map_change_listener(Arc::new(move |diff: &MapDiff<K, I>| {
                if let Some(me) = weak.upgrade() {
                    me.first_changed(diff);
                }
            }));
        let weak = Arc::downgrade(self);
        let second_diff = self
            .second
            .add_map_change_listener(Arc::new(move |diff: &MapDiff<I, V>| {
                if let Some(me) = weak.upgrade() {
                    me.second_changed(diff);
                }
            }));

        let weak = Arc::downgrade(self);
        let on_stale: Arc<dyn Fn() + Send + Sync> = Arc::new(move || {
            if let Some(me) = weak.upgrade() {
                if !me.core.is_disposing() {
                    me.core.fire_stale();
                }
            }
        });
        let first_stale = self.first.add_stale_listener(on_stale.clone());
        let second_stale = self.second.add_stale_listener(on_stale);

        let weak = Arc::downgrade(self);
        let first_dispose = self.first.add_dispose_listener(Arc::new(move || {
            if let Some(me) = weak.upgrade() {
                me.dispose();
            }
        }));

        *self.subscriptions.lock() = Some(Subscriptions {
            first_diff,
            first_stale,
            first_dispose,
            second_diff,
            second_stale,
        });
    }

    /// The indexed wrapper around the first map
    pub fn first(&self) -> &Arc<BidiMap<K, I>> {
        &self.first
    }

    /// The range set the second map was built over
    pub fn range_set(&self) -> Arc<dyn ObservableSet<I>> {
        self.range.clone()
    }

    /// The second map
    pub fn second(&self) -> &Arc<dyn ObservableMap<I, V>> {
        &self.second
    }

    /// Number of unresolved range transitions (zero between updates)
    pub fn pending_transitions(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Mark the composite itself stale (or fresh).
    pub fn set_stale(&self, stale: bool) {
        self.core.set_stale(stale);
    }

    // =========================================================================
    // FIRST MAP CHANGES
    // =========================================================================

    fn first_changed(&self, diff: &MapDiff<K, I>) {
        if self.core.is_disposing() {
            return;
        }

        let mut direct = MapDiffBuilder::new();
        let mut log: HashMap<I, PendingTransition<K>> = HashMap::new();

        untrack(|| {
            let mut state = self.state.lock();

            for key in diff.added_keys() {
                let Some(value) = diff.new_value(key) else {
                    continue;
                };
                if !self.range.contains(value) {
                    record(&mut log, value.clone(), PendingTransition::Enter);
                } else if let Some(v) = self.second.get(value) {
                    state.wrapped.insert(key.clone(), v.clone());
                    direct.add(key.clone(), v);
                }
            }

            for key in diff.changed_keys() {
                let (Some(old), Some(new)) = (diff.old_value(key), diff.new_value(key)) else {
                    continue;
                };
                if self.first.get_keys(old).is_empty() {
                    record(
                        &mut log,
                        old.clone(),
                        PendingTransition::Leave {
                            removed_keys: HashSet::new(),
                        },
                    );
                }
                if !self.range.contains(new) {
                    record(&mut log, new.clone(), PendingTransition::Enter);
                } else if let Some(v) = self.second.get(new) {
                    match state.wrapped.insert(key.clone(), v.clone()) {
                        Some(previous) => direct.change(key.clone(), previous, v),
                        None => direct.add(key.clone(), v),
                    }
                }
            }

            for key in diff.removed_keys() {
                let Some(old) = diff.old_value(key) else {
                    continue;
                };
                if self.first.get_keys(old).is_empty() {
                    record(
                        &mut log,
                        old.clone(),
                        PendingTransition::Leave {
                            removed_keys: HashSet::from([key.clone()]),
                        },
                    );
                } else if let Some(previous) = state.wrapped.remove(key) {
                    direct.remove(key.clone(), previous);
                }
            }
        });

        let direct = direct.build();
        if !direct.is_empty() {
            self.core.fire_diff(direct);
        }

        if log.is_empty() {
            return;
        }

        let mut additions = HashSet::new();
        let mut removals = HashSet::new();
        for (value, transition) in &log {
            match transition {
                PendingTransition::Enter => additions.insert(value.clone()),
                PendingTransition::Leave { .. } => removals.insert(value.clone()),
            };
        }
        let values: Vec<I> = log.keys().cloned().collect();
        {
            let mut state = self.state.lock();
            for (value, transition) in log {
                record(&mut state.pending, value, transition);
            }
        }

        tracing::debug!(
            observable = %self.core.id(),
            entering = additions.len(),
            leaving = removals.len(),
            "updating composite range set"
        );
        if let Err(err) = self.range.add_and_remove(additions, removals) {
            fail(err);
        }

        let state = self.state.lock();
        if let Some(value) = values.iter().find(|v| state.pending.contains_key(*v)) {
            fail(ObservableError::UnresolvedTransition {
                value: format!("{value:?}"),
            });
        }
    }

    // =========================================================================
    // SECOND MAP CHANGES
    // =========================================================================

    fn second_changed(&self, diff: &MapDiff<I, V>) {
        if self.core.is_disposing() {
            return;
        }

        let mut out = MapDiffBuilder::new();
        untrack(|| {
            let mut state = self.state.lock();

            for value in diff.added_keys() {
                match state.pending.remove(value) {
                    Some(PendingTransition::Enter) => {}
                    _ => fail(ObservableError::UnexpectedRangeChange {
                        kind: "addition",
                        value: format!("{value:?}"),
                    }),
                }
                let Some(v) = diff.new_value(value) else {
                    continue;
                };
                for key in self.first.get_keys(value) {
                    match state.wrapped.insert(key.clone(), v.clone()) {
                        Some(previous) => out.change(key, previous, v.clone()),
                        None => out.add(key, v.clone()),
                    }
                }
            }

            for value in diff.removed_keys() {
                let removed_keys = match state.pending.remove(value) {
                    Some(PendingTransition::Leave { removed_keys }) => removed_keys,
                    _ => fail(ObservableError::UnexpectedRangeChange {
                        kind: "removal",
                        value: format!("{value:?}"),
                    }),
                };
                for key in removed_keys {
                    if let Some(previous) = state.wrapped.remove(&key) {
                        out.remove(key, previous);
                    }
                }
            }

            for value in diff.changed_keys() {
                let Some(v) = diff.new_value(value) else {
                    continue;
                };
                for key in self.first.get_keys(value) {
                    match state.wrapped.insert(key.clone(), v.clone()) {
                        Some(previous) => out.change(key, previous, v.clone()),
                        None => out.add(key, v.clone()),
                    }
                }
            }
        });

        let out = out.build();
        if !out.is_empty() {
            self.core.fire_diff(out);
        }
    }
}

impl<K: Element, I: Element, V: Element> ObservableImpl for CompositeMap<K, I, V> {
    type Diff = MapDiff<K, V>;

    fn core(&self) -> &ObservableCore<MapDiff<K, V>> {
        &self.core
    }

    fn stale(&self) -> bool {
        self.core.stale_flag() || self.first.is_stale() || self.second.is_stale()
    }

    fn release_resources(&self) {
        let subscriptions = self.subscriptions.lock().take();
        if let Some(s) = subscriptions {
            self.first.remove_map_change_listener(s.first_diff);
            self.first.remove_stale_listener(s.first_stale);
            self.first.remove_dispose_listener(s.first_dispose);
            self.second.remove_map_change_listener(s.second_diff);
            self.second.remove_stale_listener(s.second_stale);
        }
        self.first.dispose();
        self.second.dispose();
        self.range.dispose();
        self.state.lock().wrapped.clear();
    }
}

impl<K: Element, I: Element, V: Element> ObservableMap<K, V> for CompositeMap<K, I, V> {
    fn add_map_change_listener(&self, listener: DiffCallback<MapDiff<K, V>>) -> ListenerId {
        self.add_listener(Listener::Diff(listener))
    }

    fn remove_map_change_listener(&self, id: ListenerId) -> bool {
        self.remove_listener(EventKind::Diff, id)
    }

    fn key_type(&self) -> Option<TypeTag> {
        self.first.key_type()
    }

    fn value_type(&self) -> Option<TypeTag> {
        self.second.value_type()
    }

    fn len(&self) -> usize {
        self.core.getter_called();
        self.state.lock().wrapped.len()
    }

    fn contains_key(&self, key: &K) -> bool {
        self.core.getter_called();
        self.state.lock().wrapped.contains_key(key)
    }

    fn contains_value(&self, value: &V) -> bool {
        self.core.getter_called();
        self.state.lock().wrapped.values().any(|v| v == value)
    }

    fn get(&self, key: &K) -> Option<V> {
        self.core.getter_called();
        self.state.lock().wrapped.get(key).cloned()
    }

    fn key_set(&self) -> HashSet<K> {
        self.core.getter_called();
        self.state.lock().wrapped.keys().cloned().collect()
    }

    fn values(&self) -> Vec<V> {
        self.core.getter_called();
        self.state.lock().wrapped.values().cloned().collect()
    }

    fn entries(&self) -> Vec<(K, V)> {
        self.core.getter_called();
        self.state
            .lock()
            .wrapped
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn to_map(&self) -> HashMap<K, V> {
        self.core.getter_called();
        self.state.lock().wrapped.clone()
    }
}

// =============================================================================
// TESTS
// =============================================================================

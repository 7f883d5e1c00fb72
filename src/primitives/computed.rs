// ============================================================================
// spark-observables - ComputedMap
// Values derived per key from a driving observable key set
// ============================================================================
//
// While the map has listeners it follows the key set and keeps one
// dependency hook per known key. Without listeners it holds no hooks and
// computes values on demand.
// ============================================================================

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::collections::identity::{Identity, IdentityMap, IdentitySet};
use crate::collections::traits::{ObservableMap, ObservableSet, ObservableValue};
use crate::core::error::{ObservableError, Result};
use crate::core::types::{DiffCallback, Element, ListenerId, Observable, TypeTag};
use crate::diff::{MapDiff, MapDiffBuilder, SetDiff, ValueDiff};
use crate::reactivity::listeners::{EventKind, Listener};
use crate::reactivity::observable::{ObservableCore, ObservableImpl};
use crate::reactivity::tracking::untrack;

// =============================================================================
// KEY PROJECTION
// =============================================================================

/// How a [`ComputedMap`] turns a key into a value.
pub trait KeyProjection<K: Element, V: Element>: Send + Sync + 'static {
    /// The current value for `key`.
    fn value_of(&self, key: &K) -> V;

    /// Write `value` for `key`, returning the previous value.
    fn store(&self, key: &K, value: V) -> Result<Option<V>> {
        let _ = (key, value);
        Err(ObservableError::Unsupported("put"))
    }

    /// Start watching whatever `key`'s value depends on. Report changes
    /// through `notifier`.
    fn hook(&self, key: &K, notifier: KeyNotifier<K, V>) {
        let _ = (key, notifier);
    }

    /// Stop watching `key`.
    fn unhook(&self, key: &K) {
        let _ = key;
    }

    /// The map is being disposed.
    fn released(&self) {}

    /// Runtime value type, if known
    fn value_type(&self) -> Option<TypeTag> {
        None
    }
}

trait ValueChangeSink<K, V>: Send + Sync {
    fn key_value_changed(&self, key: &K, old: V, new: V);
}

/// Reports value changes of one key back to its [`ComputedMap`].
pub struct KeyNotifier<K, V> {
    key: K,
    sink: Weak<dyn ValueChangeSink<K, V>>,
}

impl<K: Element, V: Element> KeyNotifier<K, V> {
    /// The key this notifier reports for
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Fire a single-key change on the owning map, if the key is still
    /// hooked and the value really changed. Must run inside the realm.
    pub fn value_changed(&self, old: V, new: V) {
        if let Some(sink) = self.sink.upgrade() {
            sink.key_value_changed(&self.key, old, new);
        }
    }
}

impl<K: Clone, V> Clone for KeyNotifier<K, V> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            sink: self.sink.clone(),
        }
    }
}

// =============================================================================
// STOCK PROJECTIONS
// =============================================================================

/// Values as a pure function of the key. Nothing to hook.
pub struct FnProjection<F>(pub F);

impl<K, V, F> KeyProjection<K, V> for FnProjection<F>
where
    K: Element,
    V: Element,
    F: Fn(&K) -> V + Send + Sync + 'static,
{
    fn value_of(&self, key: &K) -> V {
        (self.0)(key)
    }
}

/// Factory producing the detail observable for a key
pub type DetailFactory<K, V> = Arc<dyn Fn(&K) -> Arc<dyn ObservableValue<V>> + Send + Sync>;

struct Detail<V> {
    value: Arc<dyn ObservableValue<V>>,
    listener: ListenerId,
}

/// Each key owns an observable value; the map shows their current values
/// and forwards their changes.
pub struct DetailValues<K: Identity, V> {
    factory: DetailFactory<K, V>,
    details: Mutex<IdentityMap<K, Detail<V>>>,
}

impl<K: Element + Identity, V: Element> DetailValues<K, V> {
    pub fn new(factory: DetailFactory<K, V>) -> Self {
        Self {
            factory,
            details: Mutex::new(IdentityMap::new()),
        }
    }

    /// Number of details held for hooked keys
    pub fn live_details(&self) -> usize {
        self.details.lock().len()
    }

    /// Run `f` against the detail for `key`.
    ///
    /// Hooked keys use their cached detail. Any other key gets a detail that
    /// lives only for the call.
    fn with_detail<R>(&self, key: &K, f: impl FnOnce(&Arc<dyn ObservableValue<V>>) -> R) -> R {
        let cached = self.details.lock().get(key).map(|d| d.value.clone());
        if let Some(detail) = cached {
            return f(&detail);
        }
        let transient = (self.factory)(key);
        let out = f(&transient);
        transient.dispose();
        out
    }

    fn discard(detail: Detail<V>) {
        detail.value.remove_value_change_listener(detail.listener);
        detail.value.dispose();
    }
}

impl<K: Element + Identity, V: Element> KeyProjection<K, V> for DetailValues<K, V> {
    fn value_of(&self, key: &K) -> V {
        self.with_detail(key, |detail| detail.get())
    }

    fn store(&self, key: &K, value: V) -> Result<Option<V>> {
        self.with_detail(key, |detail| {
            let old = detail.get();
            detail.set(value)?;
            Ok(Some(old))
        })
    }

    fn hook(&self, key: &K, notifier: KeyNotifier<K, V>) {
        let value = (self.factory)(key);
        let id = value.add_value_change_listener(Arc::new(move |diff: &ValueDiff<V>| {
            notifier.value_changed(diff.old_value().clone(), diff.new_value().clone());
        }));
        let replaced = self.details.lock().insert(
            key.clone(),
            Detail {
                value,
                listener: id,
            },
        );
        if let Some(previous) = replaced {
            Self::discard(previous);
        }
    }

    fn unhook(&self, key: &K) {
        let removed = self.details.lock().remove(key);
        if let Some(detail) = removed {
            Self::discard(detail);
        }
    }

    fn released(&self) {
        let details: Vec<Detail<V>> = self.details.lock().drain().map(|(_, d)| d).collect();
        for detail in details {
            Self::discard(detail);
        }
    }
}

// =============================================================================
// COMPUTED MAP
// =============================================================================

struct HookState<K: Identity> {
    /// Listener ids held on the key set while hooked
    subscription: Option<(ListenerId, ListenerId)>,

    /// True once the current keys have been hooked
    primed: bool,

    /// Keys with a live dependency hook
    known: IdentitySet<K>,
}

/// An observable map whose keys are an observable set and whose values
/// come from a [`KeyProjection`].
///
/// `get` and `put` on a key outside the key set return `None` rather than
/// failing.
///
/// # Example
///
/// ```
/// use std::collections::HashSet;
/// use spark_observables::{ComputedMap, ObservableMap, ObservableSet, ThreadRealm, WritableSet};
///
/// let realm = ThreadRealm::new();
/// let keys = WritableSet::with_elements(realm, HashSet::from([2u32, 3]));
/// let squares = ComputedMap::from_fn(keys.clone(), |k: &u32| k * k);
///
/// assert_eq!(squares.get(&3), Some(9));
/// assert_eq!(squares.get(&4), None);
///
/// keys.add(4).unwrap();
/// assert_eq!(squares.get(&4), Some(16));
/// ```
pub struct ComputedMap<K: Element + Identity, V: Element, P> {
    core: ObservableCore<MapDiff<K, V>>,
    key_set: Arc<dyn ObservableSet<K>>,
    projection: P,
    me: Weak<Self>,
    state: Mutex<HookState<K>>,
    upstream_dispose: ListenerId,
}

impl<K, V, P> ComputedMap<K, V, P>
where
    K: Element + Identity,
    V: Element,
    P: KeyProjection<K, V>,
{
    /// Project `key_set` through `projection`.
    pub fn new(key_set: Arc<dyn ObservableSet<K>>, projection: P) -> Arc<Self> {
        let realm = key_set.realm().clone();
        Arc::new_cyclic(|me: &Weak<Self>| {
            let owner: Weak<dyn Observable> = me.clone();

            let weak = me.clone();
            let upstream_dispose = key_set.add_dispose_listener(Arc::new(move || {
                if let Some(me) = weak.upgrade() {
                    me.dispose();
                }
            }));

            Self {
                core: ObservableCore::new(realm, owner),
                key_set,
                projection,
                me: me.clone(),
                state: Mutex::new(HookState {
                    subscription: None,
                    primed: false,
                    known: IdentitySet::new(),
                }),
                upstream_dispose,
            }
        })
    }

    /// The driving key set
    pub fn key_source(&self) -> &Arc<dyn ObservableSet<K>> {
        &self.key_set
    }

    /// The projection
    pub fn projection(&self) -> &P {
        &self.projection
    }

    /// Number of keys with a live dependency hook
    pub fn hooked_keys(&self) -> usize {
        self.state.lock().known.len()
    }

    /// Mark the map itself stale (or fresh).
    pub fn set_stale(&self, stale: bool) {
        self.core.set_stale(stale);
    }

    // =========================================================================
    // HOOK BOOKKEEPING
    // =========================================================================

    fn notifier(&self, key: &K) -> KeyNotifier<K, V> {
        let sink: Weak<dyn ValueChangeSink<K, V>> = self.me.clone();
        KeyNotifier {
            key: key.clone(),
            sink,
        }
    }

    /// Hook `key` and record it as known. Does nothing before priming or
    /// if the key is already known.
    fn remember(&self, key: &K) {
        {
            let state = self.state.lock();
            if !state.primed || state.known.contains(key) {
                return;
            }
        }
        self.projection.hook(key, self.notifier(key));
        self.state.lock().known.insert(key.clone());
    }

    /// Unhook `key`, then forget it.
    fn forget(&self, key: &K) {
        let known = self.state.lock().known.contains(key);
        if known {
            self.projection.unhook(key);
            self.state.lock().known.remove(key);
        }
    }

    fn hook_current_keys(&self) {
        {
            let mut state = self.state.lock();
            if state.subscription.is_none() || state.primed || self.core.is_disposing() {
                return;
            }
            state.primed = true;
        }
        let keys = untrack(|| self.key_set.elements());
        tracing::debug!(observable = %self.core.id(), keys = keys.len(), "hooking computed keys");
        for key in &keys {
            self.remember(key);
        }
    }

    fn unhook_all(&self) {
        let (subscription, known) = {
            let mut state = self.state.lock();
            state.primed = false;
            let known: Vec<K> = state.known.iter().cloned().collect();
            (state.subscription.take(), known)
        };
        if let Some((diff, stale)) = subscription {
            self.key_set.remove_set_change_listener(diff);
            self.key_set.remove_stale_listener(stale);
        }
        for key in &known {
            self.forget(key);
        }
        if !known.is_empty() {
            tracing::debug!(observable = %self.core.id(), keys = known.len(), "unhooked computed keys");
        }
    }

    fn key_set_changed(&self, diff: &SetDiff<K>) {
        if self.core.is_disposing() {
            return;
        }
        let mut builder = MapDiffBuilder::new();
        for key in diff.removals() {
            let old = self.projection.value_of(key);
            self.forget(key);
            builder.remove(key.clone(), old);
        }
        for key in diff.additions() {
            self.remember(key);
            let value = self.projection.value_of(key);
            builder.add(key.clone(), value);
        }
        let out = builder.build();
        if !out.is_empty() {
            self.core.fire_diff(out);
        }
    }

    fn key_set_stale(&self) {
        if !self.core.is_disposing() {
            self.core.fire_stale();
        }
    }
}

impl<K, V, F> ComputedMap<K, V, FnProjection<F>>
where
    K: Element + Identity,
    V: Element,
    F: Fn(&K) -> V + Send + Sync + 'static,
{
    /// Project `key_set` through a plain function.
    pub fn from_fn(key_set: Arc<dyn ObservableSet<K>>, f: F) -> Arc<Self> {
        Self::new(key_set, FnProjection(f))
    }
}

impl<K, V> ComputedMap<K, V, DetailValues<K, V>>
where
    K: Element + Identity,
    V: Element,
{
    /// One detail observable per key, created by `factory`.
    pub fn from_details(key_set: Arc<dyn ObservableSet<K>>, factory: DetailFactory<K, V>) -> Arc<Self> {
        Self::new(key_set, DetailValues::new(factory))
    }
}

impl<K, V, P> ValueChangeSink<K, V> for ComputedMap<K, V, P>
where
    K: Element + Identity,
    V: Element,
    P: KeyProjection<K, V>,
{
    fn key_value_changed(&self, key: &K, old: V, new: V) {
        if old == new || !self.state.lock().known.contains(key) {
            return;
        }
        self.core.fire_diff(MapDiff::single_change(key.clone(), old, new));
    }
}

impl<K, V, P> ObservableImpl for ComputedMap<K, V, P>
where
    K: Element + Identity,
    V: Element,
    P: KeyProjection<K, V>,
{
    type Diff = MapDiff<K, V>;

    fn core(&self) -> &ObservableCore<MapDiff<K, V>> {
        &self.core
    }

    fn first_listener_added(&self) {
        let weak = self.me.clone();
        let diff = self
            .key_set
            .add_set_change_listener(Arc::new(move |diff: &SetDiff<K>| {
                if let Some(me) = weak.upgrade() {
                    me.key_set_changed(diff);
                }
            }));
        let weak = self.me.clone();
        let stale = self.key_set.add_stale_listener(Arc::new(move || {
            if let Some(me) = weak.upgrade() {
                me.key_set_stale();
            }
        }));
        self.state.lock().subscription = Some((diff, stale));

        let weak = self.me.clone();
        self.core.realm().exec(Box::new(move || {
            if let Some(me) = weak.upgrade() {
                me.hook_current_keys();
            }
        }));
    }

    fn last_listener_removed(&self) {
        self.unhook_all();
    }

    fn stale(&self) -> bool {
        self.core.stale_flag() || self.key_set.is_stale()
    }

    fn release_resources(&self) {
        self.key_set.remove_dispose_listener(self.upstream_dispose);
        self.unhook_all();
        self.projection.released();
    }
}

impl<K, V, P> ObservableMap<K, V> for ComputedMap<K, V, P>
where
    K: Element + Identity,
    V: Element,
    P: KeyProjection<K, V>,
{
    fn add_map_change_listener(&self, listener: DiffCallback<MapDiff<K, V>>) -> ListenerId {
        self.add_listener(Listener::Diff(listener))
    }

    fn remove_map_change_listener(&self, id: ListenerId) -> bool {
        self.remove_listener(EventKind::Diff, id)
    }

    fn key_type(&self) -> Option<TypeTag> {
        self.key_set.element_type()
    }

    fn value_type(&self) -> Option<TypeTag> {
        self.projection.value_type()
    }

    fn len(&self) -> usize {
        self.core.getter_called();
        self.key_set.len()
    }

    fn contains_key(&self, key: &K) -> bool {
        self.core.getter_called();
        self.key_set.contains(key)
    }

    fn get(&self, key: &K) -> Option<V> {
        self.core.getter_called();
        if !self.key_set.contains(key) {
            return None;
        }
        Some(self.projection.value_of(key))
    }

    fn key_set(&self) -> HashSet<K> {
        self.core.getter_called();
        self.key_set.elements()
    }

    fn values(&self) -> Vec<V> {
        self.core.getter_called();
        self.key_set
            .elements()
            .iter()
            .map(|k| self.projection.value_of(k))
            .collect()
    }

    fn entries(&self) -> Vec<(K, V)> {
        self.core.getter_called();
        self.key_set
            .elements()
            .into_iter()
            .map(|k| {
                let v = self.projection.value_of(&k);
                (k, v)
            })
            .collect()
    }

    fn to_map(&self) -> HashMap<K, V> {
        self.entries().into_iter().collect()
    }

    fn put(&self, key: K, value: V) -> Result<Option<V>> {
        self.core.check_realm();
        if !self.key_set.contains(&key) {
            return Ok(None);
        }
        self.projection.store(&key, value)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::{WritableSet, WritableValue};
    use crate::core::realm::{RealmRef, ThreadRealm};

    type Log = Arc<Mutex<Vec<MapDiff<u32, u32>>>>;

    fn record(map: &dyn ObservableMap<u32, u32>) -> (ListenerId, Log) {
        let log: Log = Arc::default();
        let sink = log.clone();
        let id = map.add_map_change_listener(Arc::new(move |d: &MapDiff<u32, u32>| {
            sink.lock().push(d.clone())
        }));
        (id, log)
    }

    #[test]
    fn get_outside_key_set_is_none() {
        let keys = WritableSet::with_elements(ThreadRealm::new(), HashSet::from([1u32]));
        let map = ComputedMap::from_fn(keys.clone(), |k: &u32| k + 100);

        assert_eq!(map.get(&1), Some(101));
        assert_eq!(map.get(&2), None);
        assert_eq!(map.put(2, 5), Ok(None));
        assert_eq!(map.put(1, 5), Err(ObservableError::Unsupported("put")));
    }

    #[test]
    fn key_set_changes_fire_one_diff() {
        let keys = WritableSet::with_elements(ThreadRealm::new(), HashSet::from([1u32, 2]));
        let map = ComputedMap::from_fn(keys.clone(), |k: &u32| k * 10);
        let (_, log) = record(&*map);

        keys.add_and_remove(HashSet::from([3]), HashSet::from([1]))
            .unwrap();

        let log = log.lock();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].added_keys(), &HashSet::from([3]));
        assert_eq!(log[0].new_value(&3), Some(&30));
        assert_eq!(log[0].removed_keys(), &HashSet::from([1]));
        assert_eq!(log[0].old_value(&1), Some(&10));
        assert!(log[0].changed_keys().is_empty());
    }

    #[test]
    fn hooks_follow_listeners_and_key_set() {
        let keys = WritableSet::with_elements(ThreadRealm::new(), HashSet::from([1u32, 2]));
        let map = ComputedMap::from_fn(keys.clone(), |k: &u32| *k);
        assert_eq!(map.hooked_keys(), 0);

        let (id, _log) = record(&*map);
        assert_eq!(map.hooked_keys(), 2);

        keys.add(3).unwrap();
        keys.remove(&1).unwrap();
        assert_eq!(map.hooked_keys(), 2);

        assert!(map.remove_map_change_listener(id));
        assert_eq!(map.hooked_keys(), 0);
    }

    #[test]
    fn detail_values_forward_changes() {
        let realm: RealmRef = ThreadRealm::new();
        let keys = WritableSet::with_elements(realm.clone(), HashSet::from([1u32]));
        let details: Arc<Mutex<Vec<Arc<WritableValue<u32>>>>> = Arc::default();

        let made = details.clone();
        let factory_realm = realm.clone();
        let factory: DetailFactory<u32, u32> = Arc::new(move |k: &u32| -> Arc<dyn ObservableValue<u32>> {
            let value = WritableValue::new(factory_realm.clone(), *k);
            made.lock().push(value.clone());
            value
        });
        let map = ComputedMap::from_details(keys.clone(), factory);
        let (_, log) = record(&*map);

        let first = details.lock()[0].clone();
        first.set(42).unwrap();

        assert_eq!(map.get(&1), Some(42));
        assert_eq!(*log.lock(), vec![MapDiff::single_change(1, 1, 42)]);

        assert_eq!(map.put(1, 7), Ok(Some(42)));
        assert_eq!(first.get(), 7);
        assert_eq!(log.lock().len(), 2);
    }

    #[test]
    fn unhooked_detail_is_disposed() {
        let realm: RealmRef = ThreadRealm::new();
        let keys = WritableSet::with_elements(realm.clone(), HashSet::from([1u32]));
        let details: Arc<Mutex<Vec<Arc<WritableValue<u32>>>>> = Arc::default();

        let made = details.clone();
        let factory_realm = realm.clone();
        let map = ComputedMap::from_details(
            keys.clone(),
            Arc::new(move |k: &u32| {
                let value = WritableValue::new(factory_realm.clone(), *k);
                made.lock().push(value.clone());
                value as Arc<dyn ObservableValue<u32>>
            }),
        );
        let (_, _log) = record(&*map);

        keys.remove(&1).unwrap();
        assert!(details.lock()[0].is_disposed());
    }

    #[test]
    fn stale_is_or_of_own_flag_and_key_set() {
        let keys = WritableSet::<u32>::new(ThreadRealm::new());
        let map = ComputedMap::from_fn(keys.clone(), |k: &u32| *k);

        assert!(!map.is_stale());
        keys.set_stale(true);
        assert!(map.is_stale());
        keys.set_stale(false);
        map.set_stale(true);
        assert!(map.is_stale());
    }

    #[test]
    fn disposing_key_set_disposes_map() {
        let keys = WritableSet::<u32>::new(ThreadRealm::new());
        let map = ComputedMap::from_fn(keys.clone(), |k: &u32| *k);
        keys.dispose();
        assert!(map.is_disposed());
    }

    #[test]
    fn unhooked_reads_do_not_keep_details() {
        let realm: RealmRef = ThreadRealm::new();
        let keys = WritableSet::<u32>::new(realm.clone());
        let details: Arc<Mutex<Vec<Arc<WritableValue<u32>>>>> = Arc::default();

        let made = details.clone();
        let factory_realm = realm.clone();
        let map = ComputedMap::from_details(
            keys.clone(),
            Arc::new(move |k: &u32| {
                let value = WritableValue::new(factory_realm.clone(), *k);
                made.lock().push(value.clone());
                value as Arc<dyn ObservableValue<u32>>
            }),
        );

        for k in 0..100u32 {
            keys.add(k).unwrap();
            assert_eq!(map.get(&k), Some(k));
            keys.remove(&k).unwrap();
        }

        assert_eq!(map.projection().live_details(), 0);
        let details = details.lock();
        assert_eq!(details.len(), 100);
        assert!(details.iter().all(|d| d.is_disposed()));
    }

    #[test]
    fn hooked_keys_keep_one_detail_each() {
        let realm: RealmRef = ThreadRealm::new();
        let keys = WritableSet::with_elements(realm.clone(), HashSet::from([1u32, 2]));
        let factory_realm = realm.clone();
        let map = ComputedMap::from_details(
            keys.clone(),
            Arc::new(move |k: &u32| WritableValue::new(factory_realm.clone(), *k) as Arc<dyn ObservableValue<u32>>),
        );

        let (id, _log) = record(&*map);
        assert_eq!(map.projection().live_details(), 2);
        keys.add(3).unwrap();
        assert_eq!(map.projection().live_details(), 3);

        assert!(map.remove_map_change_listener(id));
        assert_eq!(map.projection().live_details(), 0);
    }
}

//! End-to-end scenarios across the map operators.

use parking_lot::Mutex;
use spark_observables::{
    map_listener, BidiMap, CompositeMap, ComputedMap, DecoratingMap, DecoratingOptions,
    DetailFactory, MapDiff, Observable, ObservableMap, ObservableSet, ObservableValue,
    PassThrough, ThreadRealm, WritableMap, WritableSet, WritableValue,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

type Diffs<K, V> = Arc<Mutex<Vec<MapDiff<K, V>>>>;

fn record<K, V>(map: &dyn ObservableMap<K, V>) -> Diffs<K, V>
where
    K: spark_observables::Element,
    V: spark_observables::Element,
{
    let diffs: Diffs<K, V> = Arc::default();
    map.add_map_change_listener(map_listener!(diffs => |d: &MapDiff<K, V>| {
        diffs.lock().push(d.clone())
    }));
    diffs
}

// =============================================================================
// WRITABLE MAP
// =============================================================================

#[test]
fn writable_map_put_remove_clear_sequence() {
    let map = WritableMap::<&'static str, i32>::new(ThreadRealm::new());
    let diffs = record(&*map);

    map.put("a", 1).unwrap();
    map.put("a", 1).unwrap();
    map.put("a", 2).unwrap();
    map.remove(&"a").unwrap();

    {
        let diffs = diffs.lock();
        assert_eq!(diffs.len(), 3);

        assert_eq!(diffs[0].added_keys(), &HashSet::from(["a"]));
        assert_eq!(diffs[0].new_value(&"a"), Some(&1));

        assert_eq!(diffs[1].changed_keys(), &HashSet::from(["a"]));
        assert_eq!(diffs[1].old_value(&"a"), Some(&1));
        assert_eq!(diffs[1].new_value(&"a"), Some(&2));

        assert_eq!(diffs[2].removed_keys(), &HashSet::from(["a"]));
        assert_eq!(diffs[2].old_value(&"a"), Some(&2));
    }

    diffs.lock().clear();
    map.put_all(HashMap::from([("x", 1), ("y", 2)])).unwrap();
    map.clear().unwrap();

    let diffs = diffs.lock();
    assert_eq!(diffs.len(), 2);
    assert_eq!(diffs[1].removed_keys(), &HashSet::from(["x", "y"]));
    assert_eq!(diffs[1].old_value(&"y"), Some(&2));
}

#[test]
fn generic_change_listener_fires_before_diff_listener() {
    let map = WritableMap::<u8, u8>::new(ThreadRealm::new());
    let order = Arc::new(Mutex::new(Vec::new()));

    let o = order.clone();
    map.add_map_change_listener(Arc::new(move |_: &MapDiff<u8, u8>| o.lock().push("diff")));
    let o = order.clone();
    map.add_change_listener(Arc::new(move || o.lock().push("change")));

    map.put(1, 1).unwrap();
    assert_eq!(*order.lock(), vec!["change", "diff"]);
}

#[test]
fn stale_notification_fires_on_rising_edge() {
    let map = WritableMap::<u8, u8>::new(ThreadRealm::new());
    let stales = Arc::new(AtomicUsize::new(0));
    let s = stales.clone();
    map.add_stale_listener(Arc::new(move || {
        s.fetch_add(1, Ordering::SeqCst);
    }));

    map.set_stale(true);
    map.set_stale(true);
    assert!(map.is_stale());
    map.set_stale(false);
    map.set_stale(true);

    assert_eq!(stales.load(Ordering::SeqCst), 2);
}

#[test]
fn reentrant_write_from_listener_is_delivered_after() {
    let map = WritableMap::<&'static str, i32>::new(ThreadRealm::new());
    let weak = Arc::downgrade(&map);
    map.add_map_change_listener(Arc::new(move |d: &MapDiff<&'static str, i32>| {
        if d.added_keys().contains("a") {
            if let Some(map) = weak.upgrade() {
                map.put("b", 2).unwrap();
            }
        }
    }));
    let diffs = record(&*map);

    map.put("a", 1).unwrap();

    assert_eq!(map.to_map(), HashMap::from([("a", 1), ("b", 2)]));
    let diffs = diffs.lock();
    assert_eq!(diffs.len(), 2);
    assert!(diffs.iter().any(|d| d.added_keys().contains("b")));
}

// =============================================================================
// DECORATING MAP
// =============================================================================

#[test]
fn decorator_hooks_lazily_and_forwards() {
    let inner = WritableMap::<u8, u8>::new(ThreadRealm::new());
    let view = DecoratingMap::pass_through(inner.clone());
    assert!(!view.is_hooked());

    let diffs = record(&*view);
    assert!(view.is_hooked());

    inner.put(1, 1).unwrap();
    view.put(2, 2).unwrap();

    assert_eq!(*diffs.lock(), vec![MapDiff::single_add(1, 1), MapDiff::single_add(2, 2)]);
    assert_eq!(view.len(), 2);
}

#[test]
fn decorator_can_own_its_source() {
    let inner = WritableMap::<u8, u8>::new(ThreadRealm::new());
    let view = DecoratingMap::with_options(
        inner.clone(),
        PassThrough,
        DecoratingOptions {
            dispose_decorated_on_dispose: true,
        },
    );

    view.dispose();
    assert!(inner.is_disposed());
}

// =============================================================================
// BIDI MAP
// =============================================================================

#[test]
fn bidi_lookup_collapses_after_remove() {
    let inner = WritableMap::with_contents(
        ThreadRealm::new(),
        HashMap::from([("a", 1), ("b", 2), ("c", 1)]),
    );
    let bidi = BidiMap::indexed(inner.clone());
    let id = bidi.add_change_listener(Arc::new(|| {}));

    assert_eq!(bidi.get_keys(&1), HashSet::from(["a", "c"]));
    inner.remove(&"a").unwrap();
    assert_eq!(bidi.get_keys(&1), HashSet::from(["c"]));

    assert!(bidi.remove_change_listener(id));
    assert!(!bidi.is_indexed());
    assert_eq!(bidi.get_keys(&1), HashSet::from(["c"]));
}

// =============================================================================
// COMPUTED MAP
// =============================================================================

#[test]
fn computed_map_follows_key_set() {
    let keys = WritableSet::with_elements(ThreadRealm::new(), HashSet::from([1u32, 2]));
    let squares = ComputedMap::from_fn(keys.clone(), |k: &u32| k * k);
    let diffs = record(&*squares);

    keys.add(3).unwrap();
    keys.remove(&1).unwrap();

    assert_eq!(squares.to_map(), HashMap::from([(2, 4), (3, 9)]));
    assert_eq!(
        *diffs.lock(),
        vec![MapDiff::single_add(3, 9), MapDiff::single_remove(1, 1)]
    );
}

#[test]
fn detail_values_forward_their_changes() {
    let realm = ThreadRealm::new();
    let details: Arc<Mutex<HashMap<u32, Arc<WritableValue<String>>>>> = Arc::default();

    let made = details.clone();
    let factory_realm = realm.clone();
    let factory: DetailFactory<u32, String> = Arc::new(move |k: &u32| {
        let value = WritableValue::new(factory_realm.clone(), format!("item {k}"));
        made.lock().insert(*k, value.clone());
        let value: Arc<dyn ObservableValue<String>> = value;
        value
    });

    let keys = WritableSet::with_elements(realm, HashSet::from([1u32]));
    let labels = ComputedMap::from_details(keys.clone(), factory);
    let diffs = record(&*labels);

    let detail = details.lock().get(&1).cloned().unwrap();
    detail.set("renamed".to_string()).unwrap();

    assert_eq!(labels.get(&1), Some("renamed".to_string()));
    assert_eq!(
        *diffs.lock(),
        vec![MapDiff::single_change(1, "item 1".to_string(), "renamed".to_string())]
    );

    keys.remove(&1).unwrap();
    assert!(detail.is_disposed());
}

// =============================================================================
// COMPOSITE MAP
// =============================================================================

#[test]
fn composite_change_within_range_is_a_single_change() {
    let first = WritableMap::with_contents(
        ThreadRealm::new(),
        HashMap::from([("a", 1u32), ("b", 2), ("c", 2)]),
    );
    let composite = CompositeMap::new(first.clone(), |range| {
        ComputedMap::from_fn(range, |i: &u32| i + 100)
    });
    let diffs = record(&*composite);

    first.put("a", 2).unwrap();

    assert_eq!(*diffs.lock(), vec![MapDiff::single_change("a", 101, 102)]);
    assert_eq!(composite.range_set().elements(), HashSet::from([2]));
    assert_eq!(composite.pending_transitions(), 0);
}

#[test]
fn composite_tracks_a_mixed_update() {
    let first = WritableMap::with_contents(
        ThreadRealm::new(),
        HashMap::from([("a", 1u32), ("b", 2)]),
    );
    let composite = CompositeMap::new(first.clone(), |range| {
        ComputedMap::from_fn(range, |i: &u32| i * 2)
    });
    let shadow = Arc::new(Mutex::new(composite.to_map()));
    composite.add_map_change_listener(map_listener!(shadow => |d: &MapDiff<&'static str, u32>| {
        d.apply_to(&mut shadow.lock())
    }));

    first
        .put_all(HashMap::from([("a", 3), ("b", 3), ("c", 1)]))
        .unwrap();

    let expected = HashMap::from([("a", 6), ("b", 6), ("c", 2)]);
    assert_eq!(composite.to_map(), expected);
    assert_eq!(*shadow.lock(), expected);
    assert_eq!(composite.range_set().elements(), HashSet::from([1, 3]));
}

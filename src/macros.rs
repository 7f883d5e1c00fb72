// ============================================================================
// spark-observables - Ergonomic Macros
// ============================================================================

/// Helper macro to clone variables into a move closure.
///
/// Listeners must be `'static`, so anything they touch is usually an `Arc`
/// cloned just before the closure is built.
///
/// # Usage
///
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use spark_observables::{cloned, Observable, ObservableMap, ThreadRealm, WritableMap};
///
/// let map = WritableMap::<&str, i32>::new(ThreadRealm::new());
/// let hits = Arc::new(AtomicUsize::new(0));
///
/// map.add_change_listener(Arc::new(cloned!(hits => move || {
///     hits.fetch_add(1, Ordering::SeqCst);
/// })));
///
/// map.put("a", 1).unwrap();
/// assert_eq!(hits.load(Ordering::SeqCst), 1);
/// ```
#[macro_export]
macro_rules! cloned {
    ($($n:ident),+ => $e:expr) => {
        {
            $( let $n = $n.clone(); )+
            $e
        }
    };
}

/// Build a map-change listener from a closure, cloning the listed captures.
///
/// # Usage
///
/// ```rust
/// use std::sync::Arc;
/// use spark_observables::{map_listener, MapDiff, ObservableMap, ThreadRealm, WritableMap};
///
/// let map = WritableMap::<&str, i32>::new(ThreadRealm::new());
/// let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
///
/// map.add_map_change_listener(map_listener!(seen => |diff: &MapDiff<&str, i32>| {
///     seen.lock().extend(diff.added_keys().iter().copied());
/// }));
///
/// map.put("a", 1).unwrap();
/// assert_eq!(*seen.lock(), vec!["a"]);
/// ```
#[macro_export]
macro_rules! map_listener {
    ($($deps:ident),+ => |$diff:ident : $ty:ty| $body:expr) => {
        ::std::sync::Arc::new($crate::cloned!($($deps),+ => move |$diff: $ty| $body))
    };
    (|$diff:ident : $ty:ty| $body:expr) => {
        ::std::sync::Arc::new(move |$diff: $ty| $body)
    };
}

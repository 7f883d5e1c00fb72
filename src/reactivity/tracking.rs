// ============================================================================
// spark-observables - Dependency Tracking
// Recording which observables a computation reads
// ============================================================================
//
// Every exposed read path of an observable calls `track_read`. Frameworks
// that derive values from observables wrap their computation in
// `observe_reads` to learn what to listen to.
// ============================================================================

use std::sync::Arc;

use crate::core::context::with_context;
use crate::core::types::Observable;

// =============================================================================
// TRACK READ
// =============================================================================

/// Report a read of `source` to the innermost `observe_reads` frame.
///
/// Does nothing outside `observe_reads` or inside `untrack`.
pub fn track_read(source: Arc<dyn Observable>) {
    with_context(|ctx| {
        if ctx.is_tracking() {
            ctx.record(source);
        }
    });
}

/// True if reads on this thread are currently being recorded.
///
/// Lets getters skip building an `Arc` handle when nobody listens.
pub fn is_tracking() -> bool {
    with_context(|ctx| ctx.is_tracking())
}

// =============================================================================
// OBSERVE READS
// =============================================================================

/// Run `f` and return the observables it read, deduplicated, in first-read
/// order.
///
/// Frames nest: an inner call sees only its own reads, and they are not
/// reported to the outer frame.
///
/// # Example
///
/// ```
/// use spark_observables::{observe_reads, ObservableMap, ThreadRealm, WritableMap};
///
/// let realm = ThreadRealm::new();
/// let map = WritableMap::<String, i32>::new(realm);
///
/// let (_, reads) = observe_reads(|| map.get(&"a".to_string()));
/// assert_eq!(reads.len(), 1);
/// ```
pub fn observe_reads<R>(f: impl FnOnce() -> R) -> (R, Vec<Arc<dyn Observable>>) {
    // Pop the frame even if `f` panics, so the thread's context stays usable
    struct FrameGuard {
        popped: bool,
    }

    impl Drop for FrameGuard {
        fn drop(&mut self) {
            if !self.popped {
                with_context(|ctx| ctx.pop_frame());
            }
        }
    }

    with_context(|ctx| ctx.push_frame());
    let mut guard = FrameGuard { popped: false };
    let result = f();
    let frame = with_context(|ctx| ctx.pop_frame());
    guard.popped = true;

    (result, frame.map(|f| f.into_reads()).unwrap_or_default())
}

// =============================================================================
// UNTRACK
// =============================================================================

/// Run `f` without recording any reads.
pub fn untrack<R>(f: impl FnOnce() -> R) -> R {
    struct UntrackGuard {
        prev: bool,
    }

    impl Drop for UntrackGuard {
        fn drop(&mut self) {
            with_context(|ctx| ctx.set_untracking(self.prev));
        }
    }

    let prev = with_context(|ctx| ctx.set_untracking(true));
    let _guard = UntrackGuard { prev };
    f()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::WritableMap;
    use crate::collections::traits::ObservableMap;
    use crate::core::realm::ThreadRealm;

    #[test]
    fn reads_outside_frame_are_not_recorded() {
        let realm = ThreadRealm::new();
        let map = WritableMap::<String, i32>::new(realm);
        map.len();
        assert!(!is_tracking());
    }

    #[test]
    fn observe_reads_dedupes_by_identity() {
        let realm = ThreadRealm::new();
        let a = WritableMap::<String, i32>::new(realm.clone());
        let b = WritableMap::<String, i32>::new(realm);

        let (_, reads) = observe_reads(|| {
            a.len();
            b.key_set();
            a.get(&"x".to_string());
        });

        let ids: Vec<_> = reads.iter().map(|o| o.id()).collect();
        assert_eq!(ids, vec![a.id(), b.id()]);
    }

    #[test]
    fn nested_frames_are_isolated() {
        let realm = ThreadRealm::new();
        let a = WritableMap::<String, i32>::new(realm.clone());
        let b = WritableMap::<String, i32>::new(realm);

        let ((_, inner), outer) = observe_reads(|| {
            a.len();
            observe_reads(|| b.len())
        });

        assert_eq!(outer.len(), 1);
        assert_eq!(outer[0].id(), a.id());
        assert_eq!(inner.len(), 1);
        assert_eq!(inner[0].id(), b.id());
    }

    #[test]
    fn untrack_suppresses_reads() {
        let realm = ThreadRealm::new();
        let a = WritableMap::<String, i32>::new(realm);

        let (_, reads) = observe_reads(|| untrack(|| a.len()));
        assert!(reads.is_empty());
    }

    #[test]
    fn frame_is_popped_after_panic() {
        let result = std::panic::catch_unwind(|| {
            observe_reads(|| -> i32 { panic!("boom") });
        });
        assert!(result.is_err());
        assert!(!is_tracking());
    }
}

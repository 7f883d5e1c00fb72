// ============================================================================
// spark-observables - Observable Core
// Realm validation, stale/dispose lifecycle and event firing shared by every
// observable
// ============================================================================
//
// Concrete observables embed an `ObservableCore` and implement
// `ObservableImpl`; a blanket impl turns that into the public `Observable`
// trait. Subtypes customize behavior through the hook methods instead of
// overriding a base class.
// ============================================================================

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crate::core::error::{ObservableError, fail};
use crate::core::realm::{RealmRef, check_realm};
use crate::core::types::{Callback, ListenerId, Observable, ObservableId};
use crate::reactivity::listeners::{ChangeSupport, EventKind, Listener, ObservableEvent};
use crate::reactivity::tracking::{is_tracking, track_read};

// =============================================================================
// OBSERVABLE CORE
// =============================================================================

/// State every observable carries: identity, realm, listeners, stale and
/// disposed flags.
pub struct ObservableCore<D> {
    id: ObservableId,
    realm: RealmRef,

    /// Handle to the observable embedding this core, reported on reads
    owner: Weak<dyn Observable>,

    support: ChangeSupport<D>,
    stale: AtomicBool,

    /// Set when dispose starts; guards against a second dispose
    disposing: AtomicBool,

    /// Set once the dispose notification has gone out
    disposed: AtomicBool,
}

impl<D: 'static> ObservableCore<D> {
    /// Create a core for the observable behind `owner`.
    pub fn new(realm: RealmRef, owner: Weak<dyn Observable>) -> Self {
        Self {
            id: ObservableId::next(),
            realm,
            owner,
            support: ChangeSupport::new(),
            stale: AtomicBool::new(false),
            disposing: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
        }
    }

    /// Identity of the owning observable
    pub fn id(&self) -> ObservableId {
        self.id
    }

    /// The owning realm
    pub fn realm(&self) -> &RealmRef {
        &self.realm
    }

    /// Strong handle to the owning observable, if it is still alive
    pub fn owner(&self) -> Option<Arc<dyn Observable>> {
        self.owner.upgrade()
    }

    // =========================================================================
    // PRECONDITIONS
    // =========================================================================

    /// Fail unless inside the realm and not disposed.
    #[track_caller]
    pub fn check_realm(&self) {
        if self.disposed.load(Ordering::Acquire) {
            fail(ObservableError::Disposed(self.id));
        }
        check_realm(&*self.realm);
    }

    /// Precondition check plus dependency-tracking report for a read.
    #[track_caller]
    pub fn getter_called(&self) {
        self.check_realm();
        if is_tracking() {
            if let Some(me) = self.owner.upgrade() {
                track_read(me);
            }
        }
    }

    // =========================================================================
    // LISTENERS
    // =========================================================================

    /// Register a listener, running `on_first` on the 0→1 transition.
    pub fn add_listener(&self, listener: Listener<D>, on_first: impl FnOnce()) -> ListenerId {
        self.support.add(listener, on_first)
    }

    /// Remove a listener, running `on_last` on the 1→0 transition.
    pub fn remove_listener(&self, kind: EventKind, id: ListenerId, on_last: impl FnOnce()) -> bool {
        self.support.remove(kind, id, on_last)
    }

    /// True if a change, diff or stale listener is registered
    pub fn has_listeners(&self) -> bool {
        self.support.has_listeners()
    }

    // =========================================================================
    // FIRING
    // =========================================================================

    /// Fire a generic change notification.
    #[track_caller]
    pub fn fire_change(&self) {
        self.check_realm();
        self.support.fire(&ObservableEvent::Change);
    }

    /// Fire a generic change notification followed by `diff`.
    #[track_caller]
    pub fn fire_diff(&self, diff: D) {
        self.check_realm();
        self.support.fire(&ObservableEvent::Change);
        self.support.fire(&ObservableEvent::Diff(diff));
    }

    /// Fire a stale notification.
    #[track_caller]
    pub fn fire_stale(&self) {
        self.check_realm();
        self.support.fire(&ObservableEvent::Stale);
    }

    // =========================================================================
    // STALE
    // =========================================================================

    /// The explicit stale flag
    pub fn stale_flag(&self) -> bool {
        self.stale.load(Ordering::Acquire)
    }

    /// Set the stale flag, firing a stale notification when it turns on.
    #[track_caller]
    pub fn set_stale(&self, stale: bool) {
        self.check_realm();
        let was_stale = self.stale.swap(stale, Ordering::AcqRel);
        if !was_stale && stale {
            self.fire_stale();
        }
    }

    // =========================================================================
    // DISPOSE
    // =========================================================================

    /// True once the dispose notification has been delivered
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// True from the moment dispose starts
    pub fn is_disposing(&self) -> bool {
        self.disposing.load(Ordering::Acquire)
    }

    /// Claim the dispose. Returns false if dispose had already started.
    pub fn begin_dispose(&self) -> bool {
        !self.disposing.swap(true, Ordering::AcqRel)
    }

    /// Fire the dispose notification, then release the registry.
    pub fn finish_dispose(&self) {
        self.support.fire(&ObservableEvent::Dispose);
        self.disposed.store(true, Ordering::Release);
        let released = self.support.release();
        tracing::debug!(observable = %self.id, released, "disposed observable");
    }
}

// =============================================================================
// OBSERVABLE IMPL - extension point
// =============================================================================

/// Implement this to get [`Observable`] for free.
///
/// `Diff` is the payload of the type's diff listeners (`MapDiff`, `SetDiff`
/// or `ValueDiff`).
pub trait ObservableImpl: Send + Sync + 'static {
    type Diff: 'static;

    /// The embedded core
    fn core(&self) -> &ObservableCore<Self::Diff>;

    /// Runs when the first change, diff or stale listener is added.
    fn first_listener_added(&self) {}

    /// Runs when the last change, diff or stale listener is removed.
    fn last_listener_removed(&self) {}

    /// Staleness as reported by `is_stale`.
    fn stale(&self) -> bool {
        self.core().stale_flag()
    }

    /// Detach from upstream sources. Runs once, before the dispose
    /// notification goes out.
    fn release_resources(&self) {}

    /// Register a listener through the lifecycle hooks.
    fn add_listener(&self, listener: Listener<Self::Diff>) -> ListenerId {
        self.core()
            .add_listener(listener, || self.first_listener_added())
    }

    /// Remove a listener through the lifecycle hooks.
    fn remove_listener(&self, kind: EventKind, id: ListenerId) -> bool {
        self.core()
            .remove_listener(kind, id, || self.last_listener_removed())
    }
}

impl<T: ObservableImpl> Observable for T {
    fn id(&self) -> ObservableId {
        self.core().id()
    }

    fn realm(&self) -> &RealmRef {
        self.core().realm()
    }

    fn add_change_listener(&self, listener: Callback) -> ListenerId {
        self.add_listener(Listener::Change(listener))
    }

    fn remove_change_listener(&self, id: ListenerId) -> bool {
        self.remove_listener(EventKind::Change, id)
    }

    fn add_stale_listener(&self, listener: Callback) -> ListenerId {
        self.add_listener(Listener::Stale(listener))
    }

    fn remove_stale_listener(&self, id: ListenerId) -> bool {
        self.remove_listener(EventKind::Stale, id)
    }

    fn add_dispose_listener(&self, listener: Callback) -> ListenerId {
        self.add_listener(Listener::Dispose(listener))
    }

    fn remove_dispose_listener(&self, id: ListenerId) -> bool {
        self.remove_listener(EventKind::Dispose, id)
    }

    fn is_stale(&self) -> bool {
        self.core().getter_called();
        self.stale()
    }

    fn dispose(&self) {
        if !self.core().begin_dispose() {
            return;
        }
        self.release_resources();
        self.core().finish_dispose();
    }

    fn is_disposed(&self) -> bool {
        self.core().is_disposed()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::realm::ThreadRealm;
    use crate::reactivity::tracking::observe_reads;
    use std::sync::atomic::AtomicUsize;

    /// Minimal observable counting its hook invocations
    struct Counted {
        core: ObservableCore<u32>,
        firsts: AtomicUsize,
        lasts: AtomicUsize,
        releases: AtomicUsize,
    }

    impl Counted {
        fn new() -> Arc<Self> {
            let realm: RealmRef = ThreadRealm::new();
            Arc::new_cyclic(|me: &Weak<Self>| {
                let owner: Weak<dyn Observable> = me.clone();
                Self {
                    core: ObservableCore::new(realm, owner),
                    firsts: AtomicUsize::new(0),
                    lasts: AtomicUsize::new(0),
                    releases: AtomicUsize::new(0),
                }
            })
        }
    }

    impl ObservableImpl for Counted {
        type Diff = u32;

        fn core(&self) -> &ObservableCore<u32> {
            &self.core
        }

        fn first_listener_added(&self) {
            self.firsts.fetch_add(1, Ordering::SeqCst);
        }

        fn last_listener_removed(&self) {
            self.lasts.fetch_add(1, Ordering::SeqCst);
        }

        fn release_resources(&self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counter() -> (Arc<AtomicUsize>, Callback) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        (hits, Arc::new(move || {
            h.fetch_add(1, Ordering::SeqCst);
        }))
    }

    #[test]
    fn hooks_follow_listener_count() {
        let counted = Counted::new();
        let (_, cb) = counter();

        let a = counted.add_change_listener(cb.clone());
        let b = counted.add_stale_listener(cb);
        assert_eq!(counted.firsts.load(Ordering::SeqCst), 1);

        assert!(counted.remove_change_listener(a));
        assert!(counted.remove_stale_listener(b));
        assert_eq!(counted.lasts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn fire_diff_sends_change_first() {
        let counted = Counted::new();
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let o = order.clone();
        counted.add_change_listener(Arc::new(move || o.lock().push("change")));
        let o = order.clone();
        counted.add_listener(Listener::Diff(Arc::new(move |_: &u32| o.lock().push("diff"))));

        counted.core.fire_diff(7);
        assert_eq!(*order.lock(), vec!["change", "diff"]);
    }

    #[test]
    fn set_stale_fires_on_rising_edge_only() {
        let counted = Counted::new();
        let (stales, cb) = counter();
        counted.add_stale_listener(cb);

        counted.core.set_stale(true);
        counted.core.set_stale(true);
        assert_eq!(stales.load(Ordering::SeqCst), 1);
        assert!(counted.is_stale());

        counted.core.set_stale(false);
        assert!(!counted.is_stale());
    }

    #[test]
    fn dispose_is_idempotent() {
        let counted = Counted::new();
        let (disposals, cb) = counter();
        counted.add_dispose_listener(cb);

        counted.dispose();
        counted.dispose();

        assert!(counted.is_disposed());
        assert_eq!(disposals.load(Ordering::SeqCst), 1);
        assert_eq!(counted.releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    #[should_panic(expected = "has been disposed")]
    fn reads_after_dispose_fail() {
        let counted = Counted::new();
        counted.dispose();
        counted.is_stale();
    }

    #[test]
    fn getter_called_reports_owner() {
        let counted = Counted::new();
        let (_, reads) = observe_reads(|| counted.core.getter_called());
        assert_eq!(reads.len(), 1);
        assert_eq!(reads[0].id(), counted.id());
    }
}

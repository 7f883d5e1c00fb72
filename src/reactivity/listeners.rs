// ============================================================================
// spark-observables - Listener Registry
// Tagged events, listener bookkeeping and first/last listener transitions
// ============================================================================
//
// Registration may come from any thread; dispatch only ever happens inside
// the owning realm. Dispatch snapshots the matching listeners and releases
// the lock before calling them ("collect-then-mutate"), so a listener may
// add or remove listeners, or read the observable, without deadlocking.
// ============================================================================

use parking_lot::{Mutex, ReentrantMutex};

use crate::core::types::{Callback, DiffCallback, ListenerId};

// =============================================================================
// EVENTS
// =============================================================================

/// The four notification families an observable emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Generic "something changed"
    Change,
    /// Typed diff (map, set or value change)
    Diff,
    /// Contents became stale
    Stale,
    /// Terminal dispose notification
    Dispose,
}

/// A notification, tagged by kind.
#[derive(Debug, Clone)]
pub enum ObservableEvent<D> {
    Change,
    Diff(D),
    Stale,
    Dispose,
}

impl<D> ObservableEvent<D> {
    /// The kind of listener this event is delivered to
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Change => EventKind::Change,
            Self::Diff(_) => EventKind::Diff,
            Self::Stale => EventKind::Stale,
            Self::Dispose => EventKind::Dispose,
        }
    }
}

/// A registered callback, tagged by the event kind it accepts.
pub enum Listener<D> {
    Change(Callback),
    Diff(DiffCallback<D>),
    Stale(Callback),
    Dispose(Callback),
}

impl<D> Listener<D> {
    /// The event kind this listener accepts
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Change(_) => EventKind::Change,
            Self::Diff(_) => EventKind::Diff,
            Self::Stale(_) => EventKind::Stale,
            Self::Dispose(_) => EventKind::Dispose,
        }
    }

    /// Dispose listeners never make an observable hook its upstream.
    fn counts_for_hooks(&self) -> bool {
        !matches!(self, Self::Dispose(_))
    }

    /// Deliver `event` if it matches this listener's kind.
    fn deliver(&self, event: &ObservableEvent<D>) {
        match (self, event) {
            (Self::Change(cb), ObservableEvent::Change)
            | (Self::Stale(cb), ObservableEvent::Stale)
            | (Self::Dispose(cb), ObservableEvent::Dispose) => cb(),
            (Self::Diff(cb), ObservableEvent::Diff(diff)) => cb(diff),
            _ => {}
        }
    }
}

impl<D> Clone for Listener<D> {
    fn clone(&self) -> Self {
        match self {
            Self::Change(cb) => Self::Change(cb.clone()),
            Self::Diff(cb) => Self::Diff(cb.clone()),
            Self::Stale(cb) => Self::Stale(cb.clone()),
            Self::Dispose(cb) => Self::Dispose(cb.clone()),
        }
    }
}

// =============================================================================
// CHANGE SUPPORT
// =============================================================================

/// Listener registry for one observable.
///
/// `add` and `remove` are mutually exclusive with each other (including the
/// hook they may run), so the 0→1 and 1→0 transitions fire exactly once
/// even under concurrent registration.
pub struct ChangeSupport<D> {
    /// Serializes registration together with the hooks it triggers.
    /// Reentrant so a hook may register on this same registry.
    registration: ReentrantMutex<()>,

    /// `None` once released by dispose
    listeners: Mutex<Option<Vec<(ListenerId, Listener<D>)>>>,
}

impl<D> ChangeSupport<D> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            registration: ReentrantMutex::new(()),
            listeners: Mutex::new(Some(Vec::new())),
        }
    }

    /// Register `listener`, running `on_first` if it is the first listener
    /// that counts towards hooking.
    ///
    /// Listeners added after `release` are ignored; the returned id is inert.
    pub fn add(&self, listener: Listener<D>, on_first: impl FnOnce()) -> ListenerId {
        let id = ListenerId::next();
        let _registration = self.registration.lock();

        let first = {
            let mut guard = self.listeners.lock();
            let Some(list) = guard.as_mut() else {
                tracing::trace!(?id, "ignored listener on released registry");
                return id;
            };
            let had_listeners = list.iter().any(|(_, l)| l.counts_for_hooks());
            let counts = listener.counts_for_hooks();
            list.push((id, listener));
            counts && !had_listeners
        };

        if first {
            tracing::trace!(?id, "first listener added");
            on_first();
        }
        id
    }

    /// Remove the listener `id` of the given kind, running `on_last` if no
    /// hook-counting listener remains.
    ///
    /// Returns false if no listener of that kind has this id.
    pub fn remove(&self, kind: EventKind, id: ListenerId, on_last: impl FnOnce()) -> bool {
        let _registration = self.registration.lock();

        let last = {
            let mut guard = self.listeners.lock();
            let Some(list) = guard.as_mut() else {
                return false;
            };
            let Some(pos) = list
                .iter()
                .position(|(lid, l)| *lid == id && l.kind() == kind)
            else {
                return false;
            };
            let (_, removed) = list.remove(pos);
            removed.counts_for_hooks() && !list.iter().any(|(_, l)| l.counts_for_hooks())
        };

        if last {
            tracing::trace!(?id, "last listener removed");
            on_last();
        }
        true
    }

    /// True if at least one change, diff or stale listener is registered
    pub fn has_listeners(&self) -> bool {
        self.listeners
            .lock()
            .as_ref()
            .is_some_and(|list| list.iter().any(|(_, l)| l.counts_for_hooks()))
    }

    /// Number of registered listeners of every kind
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().as_ref().map_or(0, Vec::len)
    }

    /// Deliver `event` to every listener of the matching kind.
    pub fn fire(&self, event: &ObservableEvent<D>) {
        // BORROW SAFETY: snapshot, then release the lock before calling out
        let targets: Vec<Listener<D>> = {
            let guard = self.listeners.lock();
            let Some(list) = guard.as_ref() else {
                return;
            };
            list.iter()
                .filter(|(_, l)| l.kind() == event.kind())
                .map(|(_, l)| l.clone())
                .collect()
        };

        tracing::trace!(kind = ?event.kind(), listeners = targets.len(), "dispatching event");
        for listener in &targets {
            listener.deliver(event);
        }
    }

    /// Drop every listener and refuse new ones. Returns how many were dropped.
    pub fn release(&self) -> usize {
        let _registration = self.registration.lock();
        self.listeners.lock().take().map_or(0, |list| list.len())
    }

    /// True after `release`
    pub fn is_released(&self) -> bool {
        self.listeners.lock().is_none()
    }
}

impl<D> Default for ChangeSupport<D> {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, Callback) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        (hits, Arc::new(move || {
            h.fetch_add(1, Ordering::SeqCst);
        }))
    }

    #[test]
    fn dispatch_matches_kind() {
        let support: ChangeSupport<i32> = ChangeSupport::new();
        let (changes, on_change) = counter();
        let (stales, on_stale) = counter();
        let seen = Arc::new(AtomicUsize::new(0));
        let s = seen.clone();

        support.add(Listener::Change(on_change), || {});
        support.add(Listener::Stale(on_stale), || {});
        support.add(
            Listener::Diff(Arc::new(move |d: &i32| {
                s.fetch_add(*d as usize, Ordering::SeqCst);
            })),
            || {},
        );

        support.fire(&ObservableEvent::Change);
        support.fire(&ObservableEvent::Diff(5));

        assert_eq!(changes.load(Ordering::SeqCst), 1);
        assert_eq!(stales.load(Ordering::SeqCst), 0);
        assert_eq!(seen.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn first_and_last_hooks_fire_once() {
        let support: ChangeSupport<()> = ChangeSupport::new();
        let firsts = AtomicUsize::new(0);
        let lasts = AtomicUsize::new(0);

        let (_, cb) = counter();
        let a = support.add(Listener::Change(cb.clone()), || {
            firsts.fetch_add(1, Ordering::SeqCst);
        });
        let b = support.add(Listener::Stale(cb), || {
            firsts.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(firsts.load(Ordering::SeqCst), 1);

        assert!(support.remove(EventKind::Change, a, || {
            lasts.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(lasts.load(Ordering::SeqCst), 0);
        assert!(support.remove(EventKind::Stale, b, || {
            lasts.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(lasts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dispose_listeners_do_not_trigger_hooks() {
        let support: ChangeSupport<()> = ChangeSupport::new();
        let firsts = AtomicUsize::new(0);
        let (_, cb) = counter();

        support.add(Listener::Dispose(cb), || {
            firsts.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(firsts.load(Ordering::SeqCst), 0);
        assert!(!support.has_listeners());
        assert_eq!(support.listener_count(), 1);
    }

    #[test]
    fn remove_with_wrong_kind_fails() {
        let support: ChangeSupport<()> = ChangeSupport::new();
        let (_, cb) = counter();
        let id = support.add(Listener::Change(cb), || {});

        assert!(!support.remove(EventKind::Stale, id, || {}));
        assert!(support.remove(EventKind::Change, id, || {}));
        assert!(!support.remove(EventKind::Change, id, || {}));
    }

    #[test]
    fn release_drops_everything() {
        let support: ChangeSupport<()> = ChangeSupport::new();
        let (hits, cb) = counter();
        support.add(Listener::Change(cb.clone()), || {});

        assert_eq!(support.release(), 1);
        assert!(support.is_released());

        support.add(Listener::Change(cb), || {});
        support.fire(&ObservableEvent::Change);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn listener_may_register_during_dispatch() {
        let support: Arc<ChangeSupport<()>> = Arc::new(ChangeSupport::new());
        let inner = support.clone();
        support.add(
            Listener::Change(Arc::new(move || {
                inner.add(Listener::Stale(Arc::new(|| {})), || {});
            })),
            || {},
        );

        support.fire(&ObservableEvent::Change);
        assert_eq!(support.listener_count(), 2);
    }

    #[test]
    fn concurrent_registration_fires_first_hook_once() {
        let support: Arc<ChangeSupport<()>> = Arc::new(ChangeSupport::new());
        let firsts = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let support = support.clone();
                let firsts = firsts.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        support.add(Listener::Change(Arc::new(|| {})), || {
                            firsts.fetch_add(1, Ordering::SeqCst);
                        });
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(firsts.load(Ordering::SeqCst), 1);
        assert_eq!(support.listener_count(), 400);
    }
}

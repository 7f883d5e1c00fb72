// ============================================================================
// spark-observables - DecoratingMap
// Wrap an observable map, forward its operations and republish its diffs
// ============================================================================
//
// The decorator subscribes to the decorated map only while it has listeners
// of its own ("hook on demand"). Behavior that differs between decorators
// lives in a `MapDecoration` strategy rather than in a subclass.
// ============================================================================

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::collections::traits::ObservableMap;
use crate::core::error::{ObservableError, Result};
use crate::core::types::{DiffCallback, Element, ListenerId, Observable, TypeTag};
use crate::diff::MapDiff;
use crate::reactivity::listeners::{EventKind, Listener};
use crate::reactivity::observable::{ObservableCore, ObservableImpl};

// =============================================================================
// DECORATION STRATEGY
// =============================================================================

/// What a particular decorator does on top of plain forwarding.
///
/// Every method has a pass-through default.
pub trait MapDecoration<K: Element, V: Element>: Send + Sync + 'static {
    /// Translate a diff from the decorated map before it is re-fired.
    ///
    /// Runs inside the realm, before any listener of the decorator sees the
    /// diff. Returning `None` (or an empty diff) suppresses it.
    fn handle_map_change(
        &self,
        decorated: &dyn ObservableMap<K, V>,
        diff: &MapDiff<K, V>,
    ) -> Option<MapDiff<K, V>> {
        let _ = decorated;
        Some(diff.clone())
    }

    /// The decorator just subscribed to `decorated`.
    ///
    /// May run on any thread; realm-bound work must go through
    /// `decorated.realm().exec(..)`.
    fn first_listener_added(&self, decorated: &Arc<dyn ObservableMap<K, V>>) {
        let _ = decorated;
    }

    /// The decorator just unsubscribed from the decorated map.
    fn last_listener_removed(&self) {}

    /// The decorator is being disposed.
    fn released(&self) {}

    /// Answer `contains_value` without scanning, if the decoration can.
    fn contains_value(&self, value: &V) -> Option<bool> {
        let _ = value;
        None
    }

    /// True to reject every mutation with `Unsupported`.
    fn read_only(&self) -> bool {
        false
    }
}

/// Forward everything unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl<K: Element, V: Element> MapDecoration<K, V> for PassThrough {}

/// Forward reads and diffs; reject mutation.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOnly;

impl<K: Element, V: Element> MapDecoration<K, V> for ReadOnly {
    fn read_only(&self) -> bool {
        true
    }
}

/// A read-only view of another observable map
pub type UnmodifiableMap<K, V> = DecoratingMap<K, V, ReadOnly>;

// =============================================================================
// OPTIONS
// =============================================================================

/// Options for creating a decorating map.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecoratingOptions {
    /// Dispose the decorated map when the decorator is disposed.
    pub dispose_decorated_on_dispose: bool,
}

// =============================================================================
// DECORATING MAP
// =============================================================================

/// Listener ids held on the decorated map while hooked
struct Subscription {
    diff: ListenerId,
    stale: ListenerId,
}

/// An observable map that forwards to another one.
///
/// Reads and writes go straight to the decorated map. Diffs from the
/// decorated map pass through [`MapDecoration::handle_map_change`] and are
/// re-fired to the decorator's own listeners, generic change first.
///
/// The decorator disposes itself when the decorated map is disposed. It
/// only disposes the decorated map when configured to.
pub struct DecoratingMap<K: Element, V: Element, D> {
    core: ObservableCore<MapDiff<K, V>>,
    decorated: Arc<dyn ObservableMap<K, V>>,
    decoration: D,
    options: DecoratingOptions,
    me: Weak<Self>,
    subscription: Mutex<Option<Subscription>>,
    upstream_dispose: ListenerId,
}

impl<K: Element, V: Element, D: MapDecoration<K, V>> DecoratingMap<K, V, D> {
    /// Decorate `decorated` with `decoration`.
    pub fn new(decorated: Arc<dyn ObservableMap<K, V>>, decoration: D) -> Arc<Self> {
        Self::with_options(decorated, decoration, DecoratingOptions::default())
    }

    pub fn with_options(
        decorated: Arc<dyn ObservableMap<K, V>>,
        decoration: D,
        options: DecoratingOptions,
    ) -> Arc<Self> {
        let realm = decorated.realm().clone();
        Arc::new_cyclic(|me: &Weak<Self>| {
            let owner: Weak<dyn Observable> = me.clone();

            let weak = me.clone();
            let upstream_dispose = decorated.add_dispose_listener(Arc::new(move || {
                if let Some(me) = weak.upgrade() {
                    me.dispose();
                }
            }));

            Self {
                core: ObservableCore::new(realm, owner),
                decorated,
                decoration,
                options,
                me: me.clone(),
                subscription: Mutex::new(None),
                upstream_dispose,
            }
        })
    }

    /// The map being decorated
    pub fn decorated(&self) -> &Arc<dyn ObservableMap<K, V>> {
        &self.decorated
    }

    /// The decoration strategy
    pub fn decoration(&self) -> &D {
        &self.decoration
    }

    /// True while subscribed to the decorated map
    pub fn is_hooked(&self) -> bool {
        self.subscription.lock().is_some()
    }

    /// Mark the decorator itself stale (or fresh).
    pub fn set_stale(&self, stale: bool) {
        self.core.set_stale(stale);
    }

    fn decorated_changed(&self, diff: &MapDiff<K, V>) {
        if self.core.is_disposing() {
            return;
        }
        let Some(out) = self.decoration.handle_map_change(&*self.decorated, diff) else {
            return;
        };
        if !out.is_empty() {
            self.core.fire_diff(out);
        }
    }

    fn decorated_stale(&self) {
        if !self.core.is_disposing() {
            self.core.fire_stale();
        }
    }

    fn unhook(&self) -> bool {
        let subscription = self.subscription.lock().take();
        let Some(subscription) = subscription else {
            return false;
        };
        self.decorated.remove_map_change_listener(subscription.diff);
        self.decorated.remove_stale_listener(subscription.stale);
        tracing::debug!(observable = %self.core.id(), upstream = %self.decorated.id(), "unhooked decorated map");
        true
    }

    fn check_writable(&self, operation: &'static str) -> Result<()> {
        if self.decoration.read_only() {
            return Err(ObservableError::Unsupported(operation));
        }
        self.core.check_realm();
        Ok(())
    }
}

impl<K: Element, V: Element> DecoratingMap<K, V, PassThrough> {
    /// A plain forwarding decorator.
    pub fn pass_through(decorated: Arc<dyn ObservableMap<K, V>>) -> Arc<Self> {
        Self::new(decorated, PassThrough)
    }
}

impl<K: Element, V: Element> DecoratingMap<K, V, ReadOnly> {
    /// A read-only view of `decorated`.
    pub fn read_only(decorated: Arc<dyn ObservableMap<K, V>>) -> Arc<Self> {
        Self::new(decorated, ReadOnly)
    }
}

impl<K: Element, V: Element, D: MapDecoration<K, V>> ObservableImpl for DecoratingMap<K, V, D> {
    type Diff = MapDiff<K, V>;

    fn core(&self) -> &ObservableCore<MapDiff<K, V>> {
        &self.core
    }

    fn first_listener_added(&self) {
        let weak = self.me.clone();
        let diff = self
            .decorated
            .add_map_change_listener(Arc::new(move |diff: &MapDiff<K, V>| {
                if let Some(me) = weak.upgrade() {
                    me.decorated_changed(diff);
                }
            }));

        let weak = self.me.clone();
        let stale = self.decorated.add_stale_listener(Arc::new(move || {
            if let Some(me) = weak.upgrade() {
                me.decorated_stale();
            }
        }));

        *self.subscription.lock() = Some(Subscription { diff, stale });
        tracing::debug!(observable = %self.core.id(), upstream = %self.decorated.id(), "hooked decorated map");
        self.decoration.first_listener_added(&self.decorated);
    }

    fn last_listener_removed(&self) {
        if self.unhook() {
            self.decoration.last_listener_removed();
        }
    }

    fn stale(&self) -> bool {
        self.core.stale_flag() || self.decorated.is_stale()
    }

    fn release_resources(&self) {
        self.decorated.remove_dispose_listener(self.upstream_dispose);
        if self.unhook() {
            self.decoration.last_listener_removed();
        }
        self.decoration.released();
        if self.options.dispose_decorated_on_dispose {
            self.decorated.dispose();
        }
    }
}

impl<K: Element, V: Element, D: MapDecoration<K, V>> ObservableMap<K, V>
    for DecoratingMap<K, V, D>
{
    fn add_map_change_listener(&self, listener: DiffCallback<MapDiff<K, V>>) -> ListenerId {
        self.add_listener(Listener::Diff(listener))
    }

    fn remove_map_change_listener(&self, id: ListenerId) -> bool {
        self.remove_listener(EventKind::Diff, id)
    }

    fn key_type(&self) -> Option<TypeTag> {
        self.decorated.key_type()
    }

    fn value_type(&self) -> Option<TypeTag> {
        self.decorated.value_type()
    }

    // =========================================================================
    // READS
    // =========================================================================

    fn len(&self) -> usize {
        self.core.getter_called();
        self.decorated.len()
    }

    fn contains_key(&self, key: &K) -> bool {
        self.core.getter_called();
        self.decorated.contains_key(key)
    }

    fn contains_value(&self, value: &V) -> bool {
        self.core.getter_called();
        match self.decoration.contains_value(value) {
            Some(answer) => answer,
            None => self.decorated.contains_value(value),
        }
    }

    fn get(&self, key: &K) -> Option<V> {
        self.core.getter_called();
        self.decorated.get(key)
    }

    fn key_set(&self) -> HashSet<K> {
        self.core.getter_called();
        self.decorated.key_set()
    }

    fn values(&self) -> Vec<V> {
        self.core.getter_called();
        self.decorated.values()
    }

    fn entries(&self) -> Vec<(K, V)> {
        self.core.getter_called();
        self.decorated.entries()
    }

    fn to_map(&self) -> HashMap<K, V> {
        self.core.getter_called();
        self.decorated.to_map()
    }

    // =========================================================================
    // WRITES
    // =========================================================================

    fn put(&self, key: K, value: V) -> Result<Option<V>> {
        self.check_writable("put")?;
        self.decorated.put(key, value)
    }

    fn remove(&self, key: &K) -> Result<Option<V>> {
        self.check_writable("remove")?;
        self.decorated.remove(key)
    }

    fn clear(&self) -> Result<()> {
        self.check_writable("clear")?;
        self.decorated.clear()
    }

    fn put_all(&self, entries: HashMap<K, V>) -> Result<()> {
        self.check_writable("put_all")?;
        self.decorated.put_all(entries)
    }
}

// =============================================================================
// TESTS
// =============================================================================

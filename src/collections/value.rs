// ============================================================================
// spark-observables - WritableValue
// A single observable cell
// ============================================================================

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::collections::traits::ObservableValue;
use crate::core::error::Result;
use crate::core::realm::RealmRef;
use crate::core::types::{DiffCallback, Element, ListenerId, Observable, TypeTag};
use crate::diff::ValueDiff;
use crate::reactivity::equality::{EqualsFn, equals};
use crate::reactivity::listeners::{EventKind, Listener};
use crate::reactivity::observable::{ObservableCore, ObservableImpl};

/// An observable holding one value.
///
/// `set` fires a [`ValueDiff`] when the new value differs from the old one
/// by the configured equality.
pub struct WritableValue<T> {
    core: ObservableCore<ValueDiff<T>>,
    value: Mutex<T>,
    equals: EqualsFn<T>,
}

impl<T: Element> WritableValue<T> {
    /// Create a value confined to `realm`.
    pub fn new(realm: RealmRef, value: T) -> Arc<Self> {
        Self::with_equals(realm, value, equals)
    }

    /// Create a value with a custom "unchanged" test.
    pub fn with_equals(realm: RealmRef, value: T, equals: EqualsFn<T>) -> Arc<Self> {
        Arc::new_cyclic(|me: &Weak<Self>| {
            let owner: Weak<dyn Observable> = me.clone();
            Self {
                core: ObservableCore::new(realm, owner),
                value: Mutex::new(value),
                equals,
            }
        })
    }

    /// Mark the value stale (or fresh).
    pub fn set_stale(&self, stale: bool) {
        self.core.set_stale(stale);
    }
}

impl<T: Element> ObservableImpl for WritableValue<T> {
    type Diff = ValueDiff<T>;

    fn core(&self) -> &ObservableCore<ValueDiff<T>> {
        &self.core
    }
}

impl<T: Element> ObservableValue<T> for WritableValue<T> {
    fn add_value_change_listener(&self, listener: DiffCallback<ValueDiff<T>>) -> ListenerId {
        self.add_listener(Listener::Diff(listener))
    }

    fn remove_value_change_listener(&self, id: ListenerId) -> bool {
        self.remove_listener(EventKind::Diff, id)
    }

    fn value_type(&self) -> Option<TypeTag> {
        Some(TypeTag::of::<T>())
    }

    fn get(&self) -> T {
        self.core.getter_called();
        self.value.lock().clone()
    }

    fn set(&self, value: T) -> Result<()> {
        self.core.check_realm();
        let old = std::mem::replace(&mut *self.value.lock(), value.clone());
        if !(self.equals)(&old, &value) {
            self.core.fire_diff(ValueDiff::new(old, value));
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

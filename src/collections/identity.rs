// ============================================================================
// spark-observables - Identity Containers
// Sets and maps keyed by object identity rather than value equality
// ============================================================================

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

// =============================================================================
// IDENTITY
// =============================================================================

/// The identity an element is tracked by in [`IdentitySet`] and
/// [`IdentityMap`].
///
/// Two `Arc`s are the same element only if they point at the same
/// allocation, even when their contents compare equal. Plain values
/// (strings, integers) are their own identity.
pub trait Identity {
    type Id: Eq + Hash + Send + Sync + 'static;

    fn identity(&self) -> Self::Id;
}

impl<T: ?Sized> Identity for Arc<T> {
    type Id = usize;

    fn identity(&self) -> usize {
        Arc::as_ptr(self).cast::<()>() as usize
    }
}

macro_rules! value_identity {
    ($($t:ty),* $(,)?) => {
        $(
            impl Identity for $t {
                type Id = $t;

                fn identity(&self) -> $t {
                    *self
                }
            }
        )*
    };
}

value_identity!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, char, bool);

impl Identity for &'static str {
    type Id = &'static str;

    fn identity(&self) -> &'static str {
        *self
    }
}

impl Identity for String {
    type Id = String;

    fn identity(&self) -> String {
        self.clone()
    }
}

// =============================================================================
// IDENTITY MAP
// =============================================================================

/// A map keyed by [`Identity`]. Keeps the original key alongside the value.
pub struct IdentityMap<K: Identity, V> {
    entries: HashMap<K::Id, (K, V)>,
}

impl<K: Identity, V> IdentityMap<K, V> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Returns the previous value stored under the same identity.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.entries
            .insert(key.identity(), (key, value))
            .map(|(_, v)| v)
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(&key.identity()).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.entries.get_mut(&key.identity()).map(|(_, v)| v)
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.remove(&key.identity()).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(&key.identity())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.values().map(|(k, v)| (k, v))
    }

    /// Remove and return every entry.
    pub fn drain(&mut self) -> impl Iterator<Item = (K, V)> + '_ {
        self.entries.drain().map(|(_, entry)| entry)
    }
}

impl<K: Identity, V> Default for IdentityMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// IDENTITY SET
// =============================================================================

/// A set whose membership is decided by [`Identity`].
pub struct IdentitySet<T: Identity> {
    inner: IdentityMap<T, ()>,
}

impl<T: Identity> IdentitySet<T> {
    pub fn new() -> Self {
        Self {
            inner: IdentityMap::new(),
        }
    }

    /// Returns true if no element with the same identity was present.
    pub fn insert(&mut self, element: T) -> bool {
        let fresh = !self.inner.contains_key(&element);
        if fresh {
            self.inner.insert(element, ());
        }
        fresh
    }

    /// Returns true if an element with the same identity was present.
    pub fn remove(&mut self, element: &T) -> bool {
        self.inner.remove(element).is_some()
    }

    pub fn contains(&self, element: &T) -> bool {
        self.inner.contains_key(element)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.inner.iter().map(|(k, _)| k)
    }

    /// Remove and return every element.
    pub fn drain(&mut self) -> impl Iterator<Item = T> + '_ {
        self.inner.drain().map(|(k, _)| k)
    }
}

impl<T: Identity> Default for IdentitySet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Identity> FromIterator<T> for IdentitySet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut set = Self::new();
        for element in iter {
            set.insert(element);
        }
        set
    }
}

// =============================================================================
// TESTS
// =============================================================================

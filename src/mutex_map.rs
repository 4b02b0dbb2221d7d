//! Plain map behind a single reader/writer lock.
//!
//! [`MutexMap`] does no memoization of its own. It is the simple sibling of
//! [`CacheMap`](crate::CacheMap) for values that are cheap to build.

use core::borrow::Borrow;
use core::fmt;
use core::hash::{BuildHasher, Hash};
use std::collections::hash_map::RandomState;
use std::collections::HashMap;

use parking_lot::RwLock;

/// A `HashMap` that can be shared between threads.
pub struct MutexMap<K, V, S = RandomState> {
   map: RwLock<HashMap<K, V, S>>,
}

impl<K, V> MutexMap<K, V, RandomState> {
   /// Creates an empty map.
   #[inline]
   #[must_use]
   pub fn new() -> Self {
      Self::with_hasher(RandomState::new())
   }

   /// Creates an empty map with room for at least `capacity` keys.
   #[inline]
   #[must_use]
   pub fn with_capacity(capacity: usize) -> Self {
      Self::with_capacity_and_hasher(capacity, RandomState::new())
   }
}

impl<K, V, S> MutexMap<K, V, S> {
   #[inline]
   #[must_use]
   pub fn with_hasher(hasher: S) -> Self {
      Self {
         map: RwLock::new(HashMap::with_hasher(hasher)),
      }
   }

   #[inline]
   #[must_use]
   pub fn with_capacity_and_hasher(capacity: usize, hasher: S) -> Self {
      Self {
         map: RwLock::new(HashMap::with_capacity_and_hasher(capacity, hasher)),
      }
   }

   #[inline]
   pub fn len(&self) -> usize {
      self.map.read_recursive().len()
   }

   #[inline]
   pub fn is_empty(&self) -> bool {
      self.map.read_recursive().is_empty()
   }

   /// Calls `visitor` for every pair until it returns `false`.
   ///
   /// Holds the read lock for the whole walk. The order is unspecified.
   ///
   /// The visitor may call `get`, `len` and `is_empty`, which take the read
   /// lock recursively. It must not call `set`, `remove` or insert through
   /// `get_or_insert_with`, as those wait for the write lock and deadlock.
   pub fn visit<F>(&self, mut visitor: F)
   where
      F: FnMut(&K, &V) -> bool,
   {
      let map = self.map.read();
      for (key, value) in map.iter() {
         if !visitor(key, value) {
            return;
         }
      }
   }
}

impl<K, V, S> MutexMap<K, V, S>
where
   K: Eq + Hash,
   S: BuildHasher,
{
   /// Returns a clone of the value for `key`.
   #[inline]
   pub fn get<Q>(&self, key: &Q) -> Option<V>
   where
      K: Borrow<Q>,
      Q: Hash + Eq + ?Sized,
      V: Clone,
   {
      self.map.read_recursive().get(key).cloned()
   }

   /// Stores `value` for `key`, returning the value it replaced.
   #[inline]
   pub fn set(&self, key: K, value: V) -> Option<V> {
      self.map.write().insert(key, value)
   }

   /// Removes and returns the value for `key`.
   #[inline]
   pub fn remove<Q>(&self, key: &Q) -> Option<V>
   where
      K: Borrow<Q>,
      Q: Hash + Eq + ?Sized,
   {
      self.map.write().remove(key)
   }

   /// Returns the value for `key`, inserting the result of `f` if it is missing.
   ///
   /// The second element is `true` if this call inserted the value. An existing
   /// value is never replaced.
   ///
   /// `f` runs while the write lock is held, blocking every other caller for
   /// its whole duration. Use [`CacheMap`](crate::CacheMap) when building the
   /// value is expensive.
   pub fn get_or_insert_with<F>(&self, key: K, f: F) -> (V, bool)
   where
      F: FnOnce() -> V,
      V: Clone,
   {
      if let Some(value) = self.map.read_recursive().get(&key) {
         return (value.clone(), false);
      }
      let mut map = self.map.write();
      // Someone may have inserted between dropping the read lock and taking
      // the write lock.
      if let Some(value) = map.get(&key) {
         return (value.clone(), false);
      }
      let value = f();
      map.insert(key, value.clone());
      (value, true)
   }
}

impl<K, V, S: Default> Default for MutexMap<K, V, S> {
   #[inline]
   fn default() -> Self {
      Self::with_hasher(S::default())
   }
}

impl<K: fmt::Debug, V: fmt::Debug, S> fmt::Debug for MutexMap<K, V, S> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      match self.map.try_read() {
         Some(map) => f.debug_map().entries(map.iter()).finish(),
         None => f.write_str("MutexMap { <locked> }"),
      }
   }
}

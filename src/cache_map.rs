//! Concurrent map that memoizes fallible computations.
//!
//! This module provides [`CacheMap<K, V, E>`], a keyed collection of
//! memoized outcomes. The first caller to ask for a missing key computes its
//! outcome; everyone else asking for that key while the computation runs waits
//! for it and shares the result. Failures are cached exactly like successes.
//!
//! Locking happens on two levels. A reader/writer lock guards the map itself
//! and is only ever held for a single map operation. Each entry then carries
//! its own completion state, and that is where callers block while a
//! computation is in flight. A slow key therefore never stalls other keys.

use core::borrow::Borrow;
use core::fmt;
#[cfg(any(feature = "async-tokio", feature = "async-tokio-mt"))]
use core::future::Future;
use core::hash::{BuildHasher, Hash};
use std::collections::hash_map::{self, HashMap, RandomState};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::entry::Entry;
use crate::error::{Aborted, LookupError};

/// A thread-safe map from keys to memoized `Result<V, E>` outcomes.
///
/// Values are produced by [`get_or_compute`](Self::get_or_compute), which runs
/// the supplied computation at most once per key no matter how many threads
/// ask concurrently, or installed directly with [`set`](Self::set),
/// [`set_error`](Self::set_error) and [`set_outcome`](Self::set_outcome).
///
/// Entries are kept until they are removed or overwritten. There is no
/// eviction and no expiry.
///
/// Reads hand out clones, so most accessors need `V: Clone` and `E: Clone`.
/// Wrap large values in an `Arc` to make that cheap.
pub struct CacheMap<K, V, E, S = RandomState> {
   entries: RwLock<HashMap<K, Arc<Entry<V, E>>, S>>,
}

impl<K, V, E> CacheMap<K, V, E, RandomState> {
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

impl<K, V, E, S> CacheMap<K, V, E, S> {
   /// Creates an empty map that hashes keys with `hasher`.
   #[inline]
   #[must_use]
   pub fn with_hasher(hasher: S) -> Self {
      Self {
         entries: RwLock::new(HashMap::with_hasher(hasher)),
      }
   }

   /// Creates an empty map with room for at least `capacity` keys, hashing
   /// them with `hasher`.
   #[inline]
   #[must_use]
   pub fn with_capacity_and_hasher(capacity: usize, hasher: S) -> Self {
      Self {
         entries: RwLock::new(HashMap::with_capacity_and_hasher(capacity, hasher)),
      }
   }

   /// Returns the number of entries, finished or not.
   #[inline]
   pub fn len(&self) -> usize {
      self.entries.read_recursive().len()
   }

   /// Returns `true` if the map holds no entries.
   #[inline]
   pub fn is_empty(&self) -> bool {
      self.entries.read_recursive().is_empty()
   }

   /// Calls `visitor` for every entry until it returns `false`.
   ///
   /// The visitor receives `None` for entries whose computation has not
   /// finished. The map's read lock is held for the whole walk, so the visitor
   /// sees a consistent snapshot: every key present for the whole call is
   /// visited exactly once. The order is unspecified.
   ///
   /// The visitor may read the map (`get`, `len`, `contains_key`, `is_done`,
   /// `snapshot`, and `get_or_compute` for a finished key), since those take
   /// the read lock recursively and do not queue behind a waiting writer. It
   /// must not modify the map or start a computation, which needs the write
   /// lock and would deadlock.
   pub fn visit<F>(&self, mut visitor: F)
   where
      F: FnMut(&K, Option<&Result<V, E>>) -> bool,
   {
      let entries = self.entries.read();
      for (key, entry) in entries.iter() {
         if !visitor(key, entry.get()) {
            return;
         }
      }
   }

   /// Clones every key and its finished outcome, if any, into a `Vec`.
   pub fn snapshot(&self) -> Vec<(K, Option<Result<V, E>>)>
   where
      K: Clone,
      V: Clone,
      E: Clone,
   {
      let entries = self.entries.read_recursive();
      entries
         .iter()
         .map(|(key, entry)| (key.clone(), entry.get().cloned()))
         .collect()
   }
}

impl<K, V, E, S> CacheMap<K, V, E, S>
where
   K: Eq + Hash,
   S: BuildHasher,
{
   /// Looks up the finished outcome for `key`. Never blocks on a computation.
   ///
   /// - `Ok(outcome)` if the entry is finished. A cached failure comes back as
   ///   `Ok(Err(e))`.
   /// - `Err(LookupError::NotPresent)` if there is no entry for `key`.
   /// - `Err(LookupError::NotYetComputed)` if the entry's computation is
   ///   still running.
   pub fn get<Q>(&self, key: &Q) -> Result<Result<V, E>, LookupError>
   where
      K: Borrow<Q>,
      Q: Hash + Eq + ?Sized,
      V: Clone,
      E: Clone,
   {
      let entries = self.entries.read_recursive();
      let entry = entries.get(key).ok_or(LookupError::NotPresent)?;
      entry.get().cloned().ok_or(LookupError::NotYetComputed)
   }

   /// Returns `true` if an entry exists for `key`, finished or not.
   #[inline]
   pub fn contains_key<Q>(&self, key: &Q) -> bool
   where
      K: Borrow<Q>,
      Q: Hash + Eq + ?Sized,
   {
      self.entries.read_recursive().contains_key(key)
   }

   /// Returns `true` if an entry exists for `key` and it has finished.
   #[inline]
   pub fn is_done<Q>(&self, key: &Q) -> bool
   where
      K: Borrow<Q>,
      Q: Hash + Eq + ?Sized,
   {
      self
         .entries
         .read_recursive()
         .get(key)
         .is_some_and(|entry| entry.is_done())
   }

   /// Caches `value` for `key`, replacing any previous entry.
   #[inline]
   pub fn set(&self, key: K, value: V) {
      self.set_outcome(key, Ok(value));
   }

   /// Caches the failure `error` for `key`, replacing any previous entry.
   #[inline]
   pub fn set_error(&self, key: K, error: E) {
      self.set_outcome(key, Err(error));
   }

   /// Caches `outcome` for `key`, replacing any previous entry.
   ///
   /// This also replaces an entry whose computation is still running. That
   /// computation keeps going and delivers its result to the caller running it
   /// and to the callers already waiting on it, but the map keeps `outcome`.
   pub fn set_outcome(&self, key: K, outcome: Result<V, E>) {
      let entry = Arc::new(Entry::finished(outcome));
      let previous = self.entries.write().insert(key, entry);
      if previous.is_some_and(|previous| !previous.is_done()) {
         tracing::debug!("replaced an entry whose computation is still running");
      }
   }

   /// Removes the entry for `key`. Returns `true` if there was one.
   ///
   /// A computation running for the removed entry is not cancelled. It
   /// finishes for the callers that were already waiting on it, and the next
   /// `get_or_compute` for `key` starts a fresh computation.
   pub fn remove<Q>(&self, key: &Q) -> bool
   where
      K: Borrow<Q>,
      Q: Hash + Eq + ?Sized,
   {
      self.entries.write().remove(key).is_some()
   }

   /// Returns the outcome for `key`, computing it with `compute` if the key is
   /// missing.
   ///
   /// `compute` runs at most once per key. Callers that arrive while it runs
   /// block until it finishes and receive the same outcome. Callers for other
   /// keys are never blocked by it. Once cached, the outcome is returned as is,
   /// even if it is an error and even if a later caller passes a different
   /// closure; use [`remove`](Self::remove) or a `set*` method to replace it.
   ///
   /// If `compute` panics, the panic is caught and cached as
   /// `E::from(Aborted::Panicked(..))`, unless the panic payload itself is an
   /// `E`, which is cached verbatim.
   ///
   /// There is no timeout. A `compute` that never returns blocks its key
   /// forever, so any cancellation has to happen inside `compute`. For the same
   /// reason `compute` must not ask this map for its own key.
   pub fn get_or_compute<F>(&self, key: K, compute: F) -> Result<V, E>
   where
      F: FnOnce() -> Result<V, E>,
      V: Clone,
      E: Clone + From<Aborted> + 'static,
   {
      if let Some(outcome) = self.finished(&key) {
         return outcome;
      }

      let (entry, created) = self.insert_pending(key);
      if created {
         tracing::debug!("computing missing entry");
         // SAFETY: This call inserted the pending entry, so it is the only claimant.
         let guard = unsafe { entry.claim() };
         let outcome = guard.run(compute).clone();
         tracing::debug!(ok = outcome.is_ok(), "computed entry");
         outcome
      } else {
         entry.wait().clone()
      }
   }

   /// Async counterpart of [`get_or_compute`](Self::get_or_compute).
   ///
   /// The future returned by `compute` is awaited at most once per key.
   /// Waiting callers yield to the runtime before falling back to a blocking
   /// wait. If the future of the caller driving the computation is dropped
   /// before it finishes, the entry is cached as
   /// `E::from(Aborted::Cancelled)`.
   ///
   /// With the `async-tokio-mt` feature the blocking fallback uses
   /// `tokio::task::block_in_place`, which needs the multi-threaded runtime.
   ///
   /// Only available with the `async-tokio` or `async-tokio-mt` feature, since
   /// waiting callers need a runtime to yield to.
   #[cfg(any(feature = "async-tokio", feature = "async-tokio-mt"))]
   pub async fn get_or_compute_async<F, Fut>(&self, key: K, compute: F) -> Result<V, E>
   where
      F: FnOnce() -> Fut,
      Fut: Future<Output = Result<V, E>>,
      V: Clone,
      E: Clone + From<Aborted> + 'static,
   {
      if let Some(outcome) = self.finished(&key) {
         return outcome;
      }

      let (entry, created) = self.insert_pending(key);
      if created {
         tracing::debug!("computing missing entry asynchronously");
         // SAFETY: This call inserted the pending entry, so it is the only claimant.
         let guard = unsafe { entry.claim() };
         let outcome = guard.run_async(compute).await.clone();
         tracing::debug!(ok = outcome.is_ok(), "computed entry");
         outcome
      } else {
         entry.wait_async().await.clone()
      }
   }

   /// Fast path: the outcome for `key` if it is already finished.
   #[inline]
   fn finished(&self, key: &K) -> Option<Result<V, E>>
   where
      V: Clone,
      E: Clone,
   {
      let entries = self.entries.read_recursive();
      entries.get(key).and_then(|entry| entry.get().cloned())
   }

   /// Inserts a pending entry for `key` unless one exists.
   ///
   /// Returns the entry for `key` and whether this call created it. The write
   /// lock is released before returning.
   fn insert_pending(&self, key: K) -> (Arc<Entry<V, E>>, bool) {
      let mut entries = self.entries.write();
      match entries.entry(key) {
         hash_map::Entry::Occupied(occupied) => (Arc::clone(occupied.get()), false),
         hash_map::Entry::Vacant(vacant) => {
            let entry = Arc::new(Entry::pending());
            vacant.insert(Arc::clone(&entry));
            (entry, true)
         }
      }
   }
}

impl<K, V, E, S: Default> Default for CacheMap<K, V, E, S> {
   /// Creates an empty map.
   #[inline]
   fn default() -> Self {
      Self::with_hasher(S::default())
   }
}

impl<K: fmt::Debug, V: fmt::Debug, E: fmt::Debug, S> fmt::Debug for CacheMap<K, V, E, S> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      let Some(entries) = self.entries.try_read() else {
         return f.write_str("CacheMap { <locked> }");
      };
      let mut d = f.debug_map();
      for (key, entry) in entries.iter() {
         match entry.get() {
            Some(outcome) => d.entry(key, outcome),
            None => d.entry(key, &format_args!("<pending>")),
         };
      }
      d.finish()
   }
}

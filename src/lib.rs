//! A concurrent map that memoizes fallible computations per key.
//!
//! This crate provides two maps:
//!
//! - [`CacheMap<K, V, E>`]: Caches the `Result<V, E>` of an expensive
//!   computation per key, running the computation at most once per key even
//!   under heavy concurrent access.
//! - [`MutexMap<K, V>`]: A plain map behind one reader/writer lock, for values
//!   that are cheap to build.
//!
//! `CacheMap` never holds its map-wide lock while a computation runs. The first
//! caller for a missing key inserts a pending entry, releases the map lock, and
//! computes. Later callers for the same key park on that entry alone, using
//! `parking_lot`'s futex-based parking, and wake up with the shared outcome.
//! Callers for other keys carry on untouched.
//!
//! # Features
//!
//! - **Single-flight**: No thundering herd on a cold key.
//! - **Failures are cached**: An error is as final as a success until the key
//!   is removed or overwritten.
//! - **Panics are contained**: A panicking computation is cached as an error
//!   instead of poisoning the map or stranding waiters.
//! - **Async support**: Futures can be memoized the same way.
//!
//! # Examples
//!
//! ## Memoizing a computation
//!
//! ```rust
//! use memo_map::{Aborted, CacheMap};
//!
//! #[derive(Debug, Clone, PartialEq)]
//! enum LoadError {
//!    Missing,
//!    Aborted(Aborted),
//! }
//!
//! impl From<Aborted> for LoadError {
//!    fn from(err: Aborted) -> Self {
//!       LoadError::Aborted(err)
//!    }
//! }
//!
//! let cache: CacheMap<&str, usize, LoadError> = CacheMap::new();
//!
//! assert_eq!(cache.get_or_compute("len", || Ok(3)), Ok(3));
//! // The first outcome sticks, the second closure never runs.
//! assert_eq!(cache.get_or_compute("len", || Ok(4)), Ok(3));
//!
//! // Errors stick just the same.
//! assert_eq!(
//!    cache.get_or_compute("gone", || Err(LoadError::Missing)),
//!    Err(LoadError::Missing)
//! );
//! assert_eq!(cache.get("gone"), Ok(Err(LoadError::Missing)));
//! ```
//!
//! ## Looking up without computing
//!
//! ```rust
//! use memo_map::{CacheMap, LookupError};
//!
//! let cache: CacheMap<u32, String, String> = CacheMap::with_capacity(16);
//! assert_eq!(cache.get(&1), Err(LookupError::NotPresent));
//!
//! cache.set(1, "one".to_string());
//! assert_eq!(cache.get(&1), Ok(Ok("one".to_string())));
//!
//! cache.remove(&1);
//! assert_eq!(cache.get(&1), Err(LookupError::NotPresent));
//! ```

/// Memoizing map.
mod cache_map;

/// Single-key computation cell.
mod entry;

/// Error types.
mod error;

/// Non-memoizing sibling map.
mod mutex_map;

/// Per-entry completion signal.
mod state;

pub use cache_map::CacheMap;
pub use error::{Aborted, LookupError};
pub use mutex_map::MutexMap;

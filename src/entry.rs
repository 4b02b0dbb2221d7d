//! Single-key computation cell.
//!
//! An [`Entry`] holds the eventual outcome of one key's computation together
//! with its [`Completion`] state. It is created either finished (by an
//! unconditional set) or pending (by the first `get_or_compute` for a key).
//! A pending entry is finished exactly once, through the [`ComputeGuard`]
//! that only its creator may obtain.

use core::cell::UnsafeCell;
#[cfg(any(feature = "async-tokio", feature = "async-tokio-mt"))]
use core::future::Future;
use core::mem;
use std::panic::{self, AssertUnwindSafe};

#[cfg(any(feature = "async-tokio", feature = "async-tokio-mt"))]
use futures::FutureExt;

use crate::error::{error_from_panic, Aborted};
use crate::state::Completion;

/// A memoized outcome and its completion state.
pub(crate) struct Entry<V, E> {
   outcome: UnsafeCell<mem::MaybeUninit<Result<V, E>>>,
   completion: Completion,
}

impl<V, E> Entry<V, E> {
   /// Creates an entry whose outcome is still being computed.
   #[inline]
   pub(crate) const fn pending() -> Self {
      Self {
         outcome: UnsafeCell::new(mem::MaybeUninit::uninit()),
         completion: Completion::pending(),
      }
   }

   /// Creates an entry that is already finished with `outcome`.
   #[inline]
   pub(crate) const fn finished(outcome: Result<V, E>) -> Self {
      Self {
         outcome: UnsafeCell::new(mem::MaybeUninit::new(outcome)),
         completion: Completion::done(),
      }
   }

   #[inline]
   pub(crate) fn is_done(&self) -> bool {
      self.completion.is_done()
   }

   /// Returns the outcome if the entry is finished. Never blocks.
   #[inline]
   pub(crate) fn get(&self) -> Option<&Result<V, E>> {
      if self.is_done() {
         // SAFETY: The entry is done, so the outcome is initialized and immutable.
         Some(unsafe { self.get_unchecked() })
      } else {
         None
      }
   }

   /// Blocks until the entry is finished and returns its outcome.
   pub(crate) fn wait(&self) -> &Result<V, E> {
      self.completion.wait();
      // SAFETY: `wait` only returns once the entry is done.
      unsafe { self.get_unchecked() }
   }

   /// Async counterpart of [`wait`](Self::wait).
   #[cfg(any(feature = "async-tokio", feature = "async-tokio-mt"))]
   pub(crate) async fn wait_async(&self) -> &Result<V, E> {
      self.completion.wait_async().await;
      // SAFETY: `wait_async` only returns once the entry is done.
      unsafe { self.get_unchecked() }
   }

   /// # Safety
   ///
   /// The entry must be done.
   #[inline]
   unsafe fn get_unchecked(&self) -> &Result<V, E> {
      debug_assert!(self.is_done(), "outcome read before the entry finished");
      (*self.outcome.get()).assume_init_ref()
   }

   /// Writes the outcome and publishes it to readers and waiters.
   ///
   /// # Safety
   ///
   /// The caller must be the single holder of this pending entry's
   /// [`ComputeGuard`], and must call this at most once.
   unsafe fn finish(&self, outcome: Result<V, E>) -> &Result<V, E> {
      (*self.outcome.get()).write(outcome);
      let first = self.completion.set_done();
      debug_assert!(first, "entry finished twice");
      self.get_unchecked()
   }
}

impl<V, E: From<Aborted>> Entry<V, E> {
   /// Takes the right to finish this pending entry.
   ///
   /// # Safety
   ///
   /// Only the caller that created the entry with [`Entry::pending`] and
   /// published it may claim it, and only once.
   #[inline]
   pub(crate) unsafe fn claim(&self) -> ComputeGuard<'_, V, E> {
      debug_assert!(!self.is_done(), "claimed an entry that is already done");
      ComputeGuard { entry: self }
   }
}

impl<V, E> Drop for Entry<V, E> {
   #[inline]
   fn drop(&mut self) {
      if self.completion.is_done() {
         // SAFETY: Done means initialized, and `&mut self` means nobody else reads it.
         unsafe { self.outcome.get_mut().assume_init_drop() };
      }
   }
}

// SAFETY: The outcome is written once, by the guard holder, before the
// Release store that marks the entry done; every read happens after an
// Acquire load observed done. Sharing the entry shares `&V`/`&E` across
// threads and may drop them on another thread.
unsafe impl<V: Send + Sync, E: Send + Sync> Sync for Entry<V, E> {}
// SAFETY: Moving the entry moves the owned outcome.
unsafe impl<V: Send, E: Send> Send for Entry<V, E> {}

/// The designated computer's hold on a pending entry.
///
/// Consuming the guard through [`run`](Self::run) or
/// [`run_async`](Self::run_async) finishes the entry with the computation's
/// outcome. Dropping it unfinished (an async computation whose future was
/// dropped) finishes the entry with [`Aborted::Cancelled`], so waiters never
/// hang on an entry nobody is computing.
pub(crate) struct ComputeGuard<'a, V, E: From<Aborted>> {
   entry: &'a Entry<V, E>,
}

impl<'a, V, E> ComputeGuard<'a, V, E>
where
   E: From<Aborted> + 'static,
{
   /// Runs `compute`, turning a panic into a cached error, and finishes the entry.
   pub(crate) fn run<F>(self, compute: F) -> &'a Result<V, E>
   where
      F: FnOnce() -> Result<V, E>,
   {
      let outcome = match panic::catch_unwind(AssertUnwindSafe(compute)) {
         Ok(outcome) => outcome,
         Err(payload) => {
            tracing::warn!("computation panicked, caching the panic as its error");
            Err(error_from_panic(payload))
         }
      };
      self.commit(outcome)
   }

   /// Awaits the future produced by `compute` and finishes the entry.
   ///
   /// A panic while creating or polling the future is cached as an error.
   #[cfg(any(feature = "async-tokio", feature = "async-tokio-mt"))]
   pub(crate) async fn run_async<F, Fut>(self, compute: F) -> &'a Result<V, E>
   where
      F: FnOnce() -> Fut,
      Fut: Future<Output = Result<V, E>>,
   {
      let outcome = match AssertUnwindSafe(async move { compute().await })
         .catch_unwind()
         .await
      {
         Ok(outcome) => outcome,
         Err(payload) => {
            tracing::warn!("async computation panicked, caching the panic as its error");
            Err(error_from_panic(payload))
         }
      };
      self.commit(outcome)
   }

   #[inline]
   fn commit(self, outcome: Result<V, E>) -> &'a Result<V, E> {
      let entry = self.entry;
      mem::forget(self);
      // SAFETY: We were the guard holder, and the guard is gone now.
      unsafe { entry.finish(outcome) }
   }
}

impl<V, E: From<Aborted>> Drop for ComputeGuard<'_, V, E> {
   fn drop(&mut self) {
      tracing::warn!("computation dropped before it finished, caching it as cancelled");
      // SAFETY: We are the guard holder, and `commit` forgets the guard, so
      // this only runs when the entry was not finished yet.
      unsafe { self.entry.finish(Err(E::from(Aborted::Cancelled))) };
   }
}

//! Per-entry completion signal.
//!
//! Every cache entry carries a [`Completion`]: a single `AtomicU8` that starts
//! out either pending or done, and moves from pending to done exactly once.
//! Threads that need the outcome of a pending entry park on the address of the
//! atomic through `parking_lot_core` and are woken in bulk when it completes.
//!
//! Layout:
//! - Bit 0: DONE - The outcome has been written and may be read.
//! - Bit 1: WAITING - At least one thread is parked, or about to park.
//!
//! There is no lock bit. A pending entry is owned by the single caller that
//! created it, so being pending already means "held by its computer".

use core::sync::atomic::{AtomicU8, Ordering};

use parking_lot_core::{DEFAULT_PARK_TOKEN, DEFAULT_UNPARK_TOKEN};

/// One-shot completion state for a cache entry.
#[repr(transparent)]
pub(crate) struct Completion(AtomicU8);

impl Completion {
   /// Bit flag: outcome is written.
   const DONE: u8 = 1;
   /// Bit flag: somebody is waiting for the outcome.
   const WAITING: u8 = 2;

   /// Creates a state for an entry whose computation has not finished yet.
   #[inline]
   pub(crate) const fn pending() -> Self {
      Self(AtomicU8::new(0))
   }

   /// Creates a state for an entry that is born finished.
   #[inline]
   pub(crate) const fn done() -> Self {
      Self(AtomicU8::new(Self::DONE))
   }

   /// Wakes every thread parked on this state.
   #[inline]
   fn notify_all(&self) {
      // SAFETY: The key is the address of the atomic, same as in `park`.
      unsafe {
         parking_lot_core::unpark_all(self.0.as_ptr() as usize, DEFAULT_UNPARK_TOKEN);
      }
   }

   /// Parks the current thread as long as the state still equals `expected`.
   #[inline]
   fn park(&self, expected: u8) {
      // SAFETY: See `notify_all`.
      unsafe {
         // The validate closure runs under the queue lock, so a `set_done` that
         // lands between our load and this call is never missed.
         let _ = parking_lot_core::park(
            self.0.as_ptr() as usize,
            || self.0.load(Ordering::Acquire) == expected,
            || {},
            |_, _| {},
            DEFAULT_PARK_TOKEN,
            None,
         );
      }
   }

   /// Marks the entry done and wakes waiters.
   ///
   /// Release ordering publishes the outcome written before this call to
   /// anyone who later observes DONE with an Acquire load.
   ///
   /// Returns `true` if the state was pending before the call.
   #[inline]
   pub(crate) fn set_done(&self) -> bool {
      let prev = self.0.swap(Self::DONE, Ordering::Release);
      if prev & Self::WAITING != 0 {
         self.notify_all();
      }
      prev & Self::DONE == 0
   }

   /// Checks if the outcome may be read.
   #[inline]
   pub(crate) fn is_done(&self) -> bool {
      self.0.load(Ordering::Acquire) & Self::DONE != 0
   }

   /// Registers interest in completion.
   ///
   /// Returns `None` once the state is done, otherwise the state value to park
   /// on (always with WAITING set).
   #[inline]
   fn wait_step(&self) -> Option<u8> {
      loop {
         let current = self.0.load(Ordering::Acquire);
         if current & Self::DONE != 0 {
            return None;
         }
         if current & Self::WAITING != 0 {
            return Some(current);
         }
         let flagged = current | Self::WAITING;
         match self.0.compare_exchange_weak(
            current,
            flagged,
            Ordering::Relaxed,
            Ordering::Relaxed,
         ) {
            Ok(_) => return Some(flagged),
            Err(_) => std::hint::spin_loop(),
         }
      }
   }

   /// Blocks the calling thread until the state is done.
   pub(crate) fn wait(&self) {
      while let Some(state) = self.wait_step() {
         self.park(state);
      }
   }

   /// Waits for completion from async code.
   ///
   /// Yields to the runtime for a while first, then falls back to blocking the
   /// worker with `block_in_place` when the multi-threaded runtime is enabled.
   #[cfg(any(feature = "async-tokio", feature = "async-tokio-mt"))]
   pub(crate) async fn wait_async(&self) {
      #[allow(clippy::never_loop)]
      loop {
         for _ in 0..16 {
            let Some(state) = self.wait_step() else {
               return;
            };
            for _ in 0..32 {
               tokio::task::yield_now().await;
               if self.0.load(Ordering::Relaxed) != state {
                  break;
               }
            }
         }

         #[cfg(feature = "async-tokio-mt")]
         {
            if self.is_done() {
               return;
            }
            tracing::debug!("async waiter falling back to a blocking wait");
            tokio::task::block_in_place(|| self.wait());
            return;
         }
      }
   }
}

#[cfg(test)]
mod tests {
   use std::sync::atomic::AtomicUsize;
   use std::sync::Arc;
   use std::thread;
   use std::time::Duration;

   use super::*;

   #[test]
   fn test_pending_then_done() {
      let state = Completion::pending();
      assert!(!state.is_done());
      assert!(state.set_done());
      assert!(state.is_done());
      // A second transition reports that it was already done.
      assert!(!state.set_done());
   }

   #[test]
   fn test_done_does_not_block() {
      let state = Completion::done();
      assert!(state.is_done());
      state.wait();
      assert_eq!(state.wait_step(), None);
   }

   #[test]
   fn test_wait_step_sets_waiting() {
      let state = Completion::pending();
      assert_eq!(state.wait_step(), Some(Completion::WAITING));
      assert_eq!(state.wait_step(), Some(Completion::WAITING));
      state.set_done();
      assert_eq!(state.wait_step(), None);
   }

   #[test]
   fn test_waiters_wake_on_done() {
      let state = Arc::new(Completion::pending());
      let woken = Arc::new(AtomicUsize::new(0));
      let waiters: Vec<_> = (0..8)
         .map(|_| {
            let state = Arc::clone(&state);
            let woken = Arc::clone(&woken);
            thread::spawn(move || {
               state.wait();
               assert!(state.is_done());
               woken.fetch_add(1, Ordering::SeqCst);
            })
         })
         .collect();

      thread::sleep(Duration::from_millis(20));
      assert_eq!(woken.load(Ordering::SeqCst), 0);
      state.set_done();

      for handle in waiters {
         handle.join().unwrap();
      }
      assert_eq!(woken.load(Ordering::SeqCst), 8);
   }

   #[cfg(any(feature = "async-tokio", feature = "async-tokio-mt"))]
   #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
   async fn test_wait_async_wakes_on_done() {
      let state = Arc::new(Completion::pending());
      let setter = {
         let state = Arc::clone(&state);
         thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            state.set_done();
         })
      };

      state.wait_async().await;
      assert!(state.is_done());
      setter.join().unwrap();

      // Already done: returns without yielding or blocking.
      state.wait_async().await;
   }
}

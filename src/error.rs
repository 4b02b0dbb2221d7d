//! Error types returned by the maps.
//!
//! Computation errors belong to the caller: every [`CacheMap`](crate::CacheMap)
//! is generic over its own error type `E`. The only requirement the map puts on
//! it is `E: From<Aborted>`, so that a computation which never returned (it
//! panicked, or its future was dropped) can still be cached as an `E`.

use std::any::Any;

use thiserror::Error;

/// Returned by [`CacheMap::get`](crate::CacheMap::get) when there is no
/// finished outcome to hand back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum LookupError {
   /// No entry exists for the key.
   #[error("not present")]
   NotPresent,
   /// An entry exists, but its computation is still running.
   #[error("not yet computed")]
   NotYetComputed,
}

/// A computation that terminated without producing an outcome.
///
/// This is converted into the map's error type and cached exactly like an
/// ordinary failure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
pub enum Aborted {
   /// The computation panicked. Holds the panic message.
   #[error("panic occurred. reason: {0}")]
   Panicked(String),
   /// The future driving an async computation was dropped before it finished.
   #[error("computation was cancelled before it finished")]
   Cancelled,
}

impl Aborted {
   /// Builds an [`Aborted::Panicked`] from a raw panic payload.
   pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
      let reason = if let Some(s) = payload.downcast_ref::<&'static str>() {
         (*s).to_owned()
      } else if let Some(s) = payload.downcast_ref::<String>() {
         s.clone()
      } else {
         "Box<dyn Any>".to_owned()
      };
      Self::Panicked(reason)
   }
}

/// Converts a caught panic payload into the map's error type.
///
/// A payload that already is an `E` (raised with [`std::panic::panic_any`]) is
/// kept as is; anything else becomes [`Aborted::Panicked`].
pub(crate) fn error_from_panic<E>(payload: Box<dyn Any + Send>) -> E
where
   E: From<Aborted> + 'static,
{
   match payload.downcast::<E>() {
      Ok(err) => *err,
      Err(payload) => E::from(Aborted::from_panic(&*payload)),
   }
}

//! Deduplicating, rate-limited work queue for controller reconcile loops.
//!
//! [`KeyQueue`] hands object keys to a pool of workers with the guarantees a
//! reconcile loop depends on: duplicate adds coalesce, no key is processed by
//! two workers at once, and failed keys come back after an exponentially
//! increasing per-key delay provided by [`ExponentialBackoff`].

mod backoff;
mod queue;

pub use backoff::ExponentialBackoff;
pub use queue::{KeyQueue, DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY};

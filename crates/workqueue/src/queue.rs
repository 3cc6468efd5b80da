//! Deduplicating work queue keyed by object identity.
//!
//! Semantics mirror what reconcile loops rely on: at most one instance of a
//! key is pending or being processed at any time, adds that arrive while the
//! key is processing collapse into a single follow-up pass, and failed keys
//! become visible again after a per-key exponential delay.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{sleep_until, Instant};

use crate::backoff::ExponentialBackoff;

/// Retry delay applied to the first failure of a key.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(5);

/// Ceiling for the per-key retry delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(1000);

/// A key scheduled to re-enter the queue at `at`.
///
/// Ordered by deadline only (reversed, so the binary heap yields the
/// earliest deadline first).
struct Delayed<K> {
    at: Instant,
    key: K,
}

impl<K> PartialEq for Delayed<K> {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at
    }
}

impl<K> Eq for Delayed<K> {}

impl<K> PartialOrd for Delayed<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K> Ord for Delayed<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        other.at.cmp(&self.at)
    }
}

struct State<K> {
    /// Keys waiting to be handed to a worker, in arrival order
    pending: VecDeque<K>,
    /// Keys that are pending or must be re-queued once their current pass ends
    dirty: HashSet<K>,
    /// Keys currently held by a worker
    processing: HashSet<K>,
    /// Keys waiting out their retry delay
    delayed: BinaryHeap<Delayed<K>>,
    /// Per-key retry delay state, present only for keys that recently failed
    backoffs: HashMap<K, ExponentialBackoff>,
    /// Keys whose current processing pass ended in a rate-limited re-add
    retried: HashSet<K>,
    shut_down: bool,
}

/// Work queue handing out keys to a pool of workers.
///
/// Guarantees: a key is never processed by two workers at once; a burst of N
/// adds for one key collapses to at most one extra pass beyond the one in
/// flight; retry delays are bounded by the configured ceiling.
pub struct KeyQueue<K> {
    state: Mutex<State<K>>,
    wakeup: Notify,
    base_delay: Duration,
    max_delay: Duration,
}

impl<K> KeyQueue<K>
where
    K: Clone + Eq + Hash,
{
    /// Create a queue with the default retry delays.
    #[must_use]
    pub fn new() -> Self {
        Self::with_delays(DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY)
    }

    /// Create a queue with custom base and maximum retry delays.
    #[must_use]
    pub fn with_delays(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            state: Mutex::new(State {
                pending: VecDeque::new(),
                dirty: HashSet::new(),
                processing: HashSet::new(),
                delayed: BinaryHeap::new(),
                backoffs: HashMap::new(),
                retried: HashSet::new(),
                shut_down: false,
            }),
            wakeup: Notify::new(),
            base_delay,
            max_delay,
        }
    }

    /// Enqueue a fresh unit of work for `key`.
    ///
    /// Duplicate adds while the key is pending or processing coalesce into a
    /// single pending entry. A plain add also resets the key's retry backoff,
    /// since a new notification supersedes whatever was failing before.
    pub fn add(&self, key: K) {
        let added = {
            let mut state = self.locked();
            if state.shut_down {
                return;
            }
            state.backoffs.remove(&key);
            Self::enqueue_locked(&mut state, key)
        };
        if added {
            self.wakeup.notify_waiters();
        }
    }

    /// Wait for the next key. Returns `None` once the queue is shut down.
    ///
    /// The returned key is marked processing and will not be handed to
    /// another caller until [`KeyQueue::done`] is called for it. Cancel safe:
    /// a dropped `get` leaves no key marked.
    pub async fn get(&self) -> Option<K> {
        loop {
            let notified = self.wakeup.notified();
            tokio::pin!(notified);
            let deadline = {
                let mut state = self.locked();
                if state.shut_down {
                    return None;
                }
                Self::promote_due_locked(&mut state);
                if let Some(key) = state.pending.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    return Some(key);
                }
                notified.as_mut().enable();
                state.delayed.peek().map(|delayed| delayed.at)
            };
            match deadline {
                Some(at) => {
                    tokio::select! {
                        () = &mut notified => {}
                        () = sleep_until(at) => {}
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Mark a key returned by [`KeyQueue::get`] as finished.
    ///
    /// If an add arrived while the key was processing it goes straight back
    /// to pending. A pass that did not end in a rate-limited re-add clears
    /// the key's retry backoff.
    pub fn done(&self, key: &K) {
        let requeued = {
            let mut state = self.locked();
            state.processing.remove(key);
            if !state.retried.remove(key) {
                state.backoffs.remove(key);
            }
            if state.dirty.contains(key) {
                state.pending.push_back(key.clone());
                true
            } else {
                false
            }
        };
        if requeued {
            self.wakeup.notify_waiters();
        }
    }

    /// Schedule `key` to re-enter the queue after its next retry delay.
    ///
    /// Returns immediately; the key becomes visible to [`KeyQueue::get`]
    /// once the delay has elapsed. The delay starts at the base value and
    /// doubles per consecutive retry of the same key, capped at the maximum.
    /// Call this before [`KeyQueue::done`] so the pass is not mistaken for a
    /// success.
    pub fn add_rate_limited(&self, key: K) {
        {
            let mut state = self.locked();
            if state.shut_down {
                return;
            }
            state.retried.insert(key.clone());
            let (base, max) = (self.base_delay, self.max_delay);
            let delay = state
                .backoffs
                .entry(key.clone())
                .or_insert_with(|| ExponentialBackoff::new(base, max))
                .next_delay();
            state.delayed.push(Delayed {
                at: Instant::now() + delay,
                key,
            });
        }
        // Wake waiting getters so they re-arm their sleep on the new deadline
        self.wakeup.notify_waiters();
    }

    /// Reject further adds and release all waiting [`KeyQueue::get`] calls.
    ///
    /// The signal is monotonic: once shut down, the queue hands out no more
    /// keys even if items were still pending.
    pub fn shut_down(&self) {
        self.locked().shut_down = true;
        self.wakeup.notify_waiters();
    }

    /// Number of keys waiting to be handed out, not counting delayed ones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locked().pending.len()
    }

    /// True when no keys are waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Move delayed keys whose deadline has passed into the pending queue.
    fn promote_due_locked(state: &mut State<K>) {
        let now = Instant::now();
        while state.delayed.peek().is_some_and(|delayed| delayed.at <= now) {
            if let Some(delayed) = state.delayed.pop() {
                Self::enqueue_locked(state, delayed.key);
            }
        }
    }

    /// Returns true when the key actually entered the pending queue.
    fn enqueue_locked(state: &mut State<K>, key: K) -> bool {
        if state.dirty.contains(&key) {
            return false;
        }
        state.dirty.insert(key.clone());
        if state.processing.contains(&key) {
            return false;
        }
        state.pending.push_back(key);
        true
    }

    fn locked(&self) -> MutexGuard<'_, State<K>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K> Default for KeyQueue<K>
where
    K: Clone + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

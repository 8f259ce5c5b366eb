//! Keyed registry of cancellable timers.
//!
//! At most one timer is live per key. Scheduling under a key that already
//! has a timer cancels the old one before the new one is installed, so a
//! caller that reschedules never leaks the previous timer. A timer ends in
//! exactly one of two ways: it fires (the callback runs once and the entry
//! is removed) or it is cancelled (the entry is removed and the callback
//! never runs). Cancelling a key with no live timer is a no-op.
//!
//! Install, fire, and cancel all take the same lock on the key map, so for
//! any key they are linearizable: a timer that has been cancelled or
//! replaced can never fire afterwards.
//!
//! The registry is an ordinary value. Create one at startup, share it by
//! cloning, and call [`TimeoutRegistry::cancel_all`] at shutdown. Dropping
//! the last clone cancels whatever is still pending.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::task::AbortHandle;
use tracing::{debug, trace};

struct Timer {
    id: u64,
    task: AbortHandle,
}

#[derive(Default)]
struct Inner {
    timers: Mutex<HashMap<String, Timer>>,
    next_id: AtomicU64,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Timer>> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remove the entry for `key` only if it still belongs to timer `id`.
    fn remove_if_current(&self, key: &str, id: u64) -> Option<Timer> {
        let mut timers = self.lock();
        match timers.get(key) {
            Some(timer) if timer.id == id => timers.remove(key),
            _ => None,
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let timers = self.timers.get_mut().unwrap_or_else(PoisonError::into_inner);
        for (_, timer) in timers.drain() {
            timer.task.abort();
        }
    }
}

/// Registry of named, cancellable timers.
#[derive(Clone, Default)]
pub struct TimeoutRegistry {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for TimeoutRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeoutRegistry")
            .field("pending", &self.len())
            .finish()
    }
}

/// Handle to one scheduled timer.
///
/// Cancelling through the handle only affects the timer it was issued for;
/// if the key has since been rescheduled, the replacement is left alone.
#[derive(Debug, Clone)]
pub struct TimeoutHandle {
    key: String,
    id: u64,
    registry: Weak<Inner>,
}

impl TimeoutHandle {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether this timer is still waiting to fire.
    pub fn is_pending(&self) -> bool {
        self.registry.upgrade().is_some_and(|inner| {
            inner
                .lock()
                .get(&self.key)
                .is_some_and(|timer| timer.id == self.id)
        })
    }

    /// Cancel this timer. Returns `true` if it was still pending.
    pub fn cancel(&self) -> bool {
        let Some(inner) = self.registry.upgrade() else {
            return false;
        };
        match inner.remove_if_current(&self.key, self.id) {
            Some(timer) => {
                timer.task.abort();
                trace!("Cancelled timer {:?} via handle", self.key);
                true
            }
            None => false,
        }
    }
}

impl TimeoutRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `callback` to run once after `delay`, replacing any timer
    /// already registered under `key`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn schedule<F>(&self, key: impl Into<String>, callback: F, delay: Duration) -> TimeoutHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let key = key.into();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let weak = Arc::downgrade(&self.inner);

        // Hold the lock across spawn + insert so the new task cannot observe
        // the map before its own entry is present.
        let mut timers = self.inner.lock();
        if let Some(previous) = timers.remove(&key) {
            previous.task.abort();
            debug!("Replaced pending timer {key:?}");
        }

        let task_key = key.clone();
        let task_weak = weak.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = task_weak.upgrade() else {
                return;
            };
            if inner.remove_if_current(&task_key, id).is_some() {
                drop(inner);
                trace!("Timer {task_key:?} fired");
                callback();
            }
        });

        timers.insert(
            key.clone(),
            Timer {
                id,
                task: task.abort_handle(),
            },
        );
        drop(timers);

        trace!("Scheduled timer {key:?} in {delay:?}");
        TimeoutHandle {
            key,
            id,
            registry: weak,
        }
    }

    /// Cancel the timer under `key`, if any. Returns `true` if a pending
    /// timer was cancelled.
    pub fn cancel(&self, key: &str) -> bool {
        let removed = self.inner.lock().remove(key);
        match removed {
            Some(timer) => {
                timer.task.abort();
                trace!("Cancelled timer {key:?}");
                true
            }
            None => false,
        }
    }

    /// Cancel every pending timer. Returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<Timer> = self.inner.lock().drain().map(|(_, t)| t).collect();
        for timer in &drained {
            timer.task.abort();
        }
        if !drained.is_empty() {
            debug!("Cancelled {} pending timer(s)", drained.len());
        }
        drained.len()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

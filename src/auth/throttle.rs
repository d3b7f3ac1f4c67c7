//! Fixed-window attempt counting keyed by client identity.
//!
//! The same limiter serves two purposes: failed logins (reserved before the
//! credential check, released on success) and the general request budget
//! applied to every API call.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub started: Instant,
    pub count: u32,
}

/// Storage seam for attempt windows.
pub trait AttemptStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Window>;
    /// Count one attempt in a single step. A window older than `window` is
    /// restarted at `now`. Returns the window after counting.
    fn increment(&self, key: &str, now: Instant, window: Duration) -> Window;
    fn remove(&self, key: &str);
    /// Drop windows that started before `cutoff`.
    fn evict_before(&self, cutoff: Instant);
}

#[derive(Default)]
pub struct InMemoryAttemptStore {
    windows: DashMap<String, Window>,
}

impl AttemptStore for InMemoryAttemptStore {
    fn get(&self, key: &str) -> Option<Window> {
        self.windows.get(key).map(|w| *w)
    }

    fn increment(&self, key: &str, now: Instant, window: Duration) -> Window {
        // The entry guard holds the shard lock for the whole read-modify-write.
        let mut entry = self
            .windows
            .entry(key.to_string())
            .or_insert(Window { started: now, count: 0 });
        if now.saturating_duration_since(entry.started) >= window {
            *entry = Window { started: now, count: 0 };
        }
        entry.count = entry.count.saturating_add(1);
        *entry
    }

    fn remove(&self, key: &str) {
        self.windows.remove(key);
    }

    fn evict_before(&self, cutoff: Instant) {
        self.windows.retain(|_, w| w.started >= cutoff);
    }
}

pub struct AttemptLimiter {
    store: Box<dyn AttemptStore>,
    max_attempts: u32,
    window: Duration,
    name: &'static str,
}

impl AttemptLimiter {
    pub fn new(name: &'static str, max_attempts: u32, window: Duration) -> Self {
        Self::with_store(name, max_attempts, window, Box::<InMemoryAttemptStore>::default())
    }

    pub fn with_store(
        name: &'static str,
        max_attempts: u32,
        window: Duration,
        store: Box<dyn AttemptStore>,
    ) -> Self {
        Self {
            store,
            max_attempts: max_attempts.max(1),
            window,
            name,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Reserve one attempt. `Ok` carries the attempts used so far in the
    /// window; `Err` means the budget was already spent and nothing may run.
    pub fn try_acquire(&self, key: &str) -> Result<u32, u32> {
        self.try_acquire_at(key, Instant::now())
    }

    pub fn try_acquire_at(&self, key: &str, now: Instant) -> Result<u32, u32> {
        let window = self.store.increment(key, now, self.window);
        if window.count > self.max_attempts {
            return Err(window.count);
        }
        if window.count == self.max_attempts {
            warn!(limiter = self.name, client = %key, "attempt budget exhausted");
        }
        Ok(window.count)
    }

    /// Forget every attempt counted for `key`.
    pub fn reset(&self, key: &str) {
        self.store.remove(key);
    }

    pub fn evict_expired(&self) {
        if let Some(cutoff) = Instant::now().checked_sub(self.window) {
            self.store.evict_before(cutoff);
        }
    }
}

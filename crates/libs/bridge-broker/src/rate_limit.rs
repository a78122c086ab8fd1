//! Per-sender sliding-window admission control.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Admission timestamps of one sender inside the trailing window.
///
/// Pure bookkeeping over the instants it is given; callers supply `now`.
#[derive(Debug, Clone, Default)]
pub struct RateWindow {
    admitted: VecDeque<Instant>,
}

impl RateWindow {
    /// Drop admissions that are `window` or older relative to `now`.
    pub fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(oldest) = self.admitted.front() {
            if now.saturating_duration_since(*oldest) >= window {
                self.admitted.pop_front();
            } else {
                break;
            }
        }
    }

    /// Admit a call at `now` if fewer than `limit` admissions remain in the
    /// window. Rejected calls leave the window untouched.
    pub fn try_acquire(&mut self, now: Instant, limit: usize, window: Duration) -> bool {
        self.prune(now, window);
        if self.admitted.len() >= limit {
            return false;
        }
        self.admitted.push_back(now);
        true
    }

    pub fn len(&self) -> usize {
        self.admitted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.admitted.is_empty()
    }
}

/// Rate windows keyed by sender.
///
/// The outer map only changes on track/forget; each window has its own lock
/// so pruning one sender never blocks another.
#[derive(Debug)]
pub struct RateLimiter {
    limit: usize,
    window: Duration,
    windows: Mutex<HashMap<String, Arc<Mutex<RateWindow>>>>,
}

impl RateLimiter {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Start (or restart) tracking `sender`.
    pub fn track(&self, sender: &str) {
        self.windows
            .lock()
            .expect("rate limiter mutex poisoned")
            .insert(sender.to_string(), Arc::new(Mutex::new(RateWindow::default())));
    }

    pub fn forget(&self, sender: &str) {
        self.windows
            .lock()
            .expect("rate limiter mutex poisoned")
            .remove(sender);
    }

    pub fn clear(&self) {
        self.windows
            .lock()
            .expect("rate limiter mutex poisoned")
            .clear();
    }

    /// Admit one call from `sender` at `now`.
    ///
    /// Untracked senders are admitted without bookkeeping; the broker rejects
    /// them as unregistered further down the validation chain.
    pub fn try_acquire_at(&self, sender: &str, now: Instant) -> bool {
        let window = {
            let windows = self.windows.lock().expect("rate limiter mutex poisoned");
            match windows.get(sender) {
                Some(window) => Arc::clone(window),
                None => return true,
            }
        };
        let mut window = window.lock().expect("rate window mutex poisoned");
        window.try_acquire(now, self.limit, self.window)
    }

    pub fn try_acquire(&self, sender: &str) -> bool {
        self.try_acquire_at(sender, Instant::now())
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

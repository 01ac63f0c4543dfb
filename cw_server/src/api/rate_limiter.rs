//! Error-storm limiter for failure-path logging.
//!
//! A snapshot store that starts failing, or a wedged lock holder, turns
//! every request into an error-level log line. The limiter gates those
//! paths per key with a sliding window so a hot failure cannot flood the
//! log sink; suppressed events are still counted.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Sliding-window limiter for one key
#[derive(Debug)]
struct Window {
    timestamps: VecDeque<Instant>,
}

/// Per-key error-storm limiter
#[derive(Debug)]
pub struct ErrorStormLimiter {
    windows: Mutex<HashMap<String, Window>>,
    max_events: usize,
    window: Duration,
}

impl ErrorStormLimiter {
    /// Create a limiter allowing `max_events` per `window` per key.
    pub fn new(max_events: usize, window: Duration) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            max_events,
            window,
        }
    }

    /// Default gate for error logging: 10 events per key per minute.
    pub fn for_error_logs() -> Self {
        Self::new(10, Duration::from_secs(60))
    }

    /// Check whether an event for `key` should be emitted.
    ///
    /// Returns `true` if within the per-key budget, `false` if the event
    /// should be suppressed.
    pub fn check(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut windows = self.windows.lock().expect("limiter mutex poisoned");
        let entry = windows.entry(key.to_string()).or_insert_with(|| Window {
            timestamps: VecDeque::with_capacity(self.max_events),
        });

        while let Some(ts) = entry.timestamps.front() {
            if now.duration_since(*ts) > self.window {
                entry.timestamps.pop_front();
            } else {
                break;
            }
        }

        if entry.timestamps.len() >= self.max_events {
            return false;
        }

        entry.timestamps.push_back(now);
        true
    }

    /// Number of events currently inside the window for `key`.
    #[allow(dead_code)]
    pub fn current_count(&self, key: &str) -> usize {
        self.windows
            .lock()
            .expect("limiter mutex poisoned")
            .get(key)
            .map(|w| w.timestamps.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_allows_within_budget() {
        let limiter = ErrorStormLimiter::new(3, Duration::from_secs(1));

        for _ in 0..3 {
            assert!(limiter.check("snapshot"));
        }
        assert!(!limiter.check("snapshot"), "4th event should be suppressed");
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = ErrorStormLimiter::new(1, Duration::from_secs(1));

        assert!(limiter.check("snapshot"));
        assert!(!limiter.check("snapshot"));
        assert!(limiter.check("locks"), "other keys keep their own budget");
    }

    #[test]
    fn test_window_expiry_restores_budget() {
        let limiter = ErrorStormLimiter::new(1, Duration::from_millis(50));

        assert!(limiter.check("snapshot"));
        assert!(!limiter.check("snapshot"));

        thread::sleep(Duration::from_millis(80));
        assert!(limiter.check("snapshot"), "budget returns after the window");
    }

    #[test]
    fn test_current_count() {
        let limiter = ErrorStormLimiter::new(5, Duration::from_secs(1));
        assert_eq!(limiter.current_count("k"), 0);
        limiter.check("k");
        limiter.check("k");
        assert_eq!(limiter.current_count("k"), 2);
    }
}

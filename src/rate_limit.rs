use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Per-key hit counter used to throttle progress updates. Backed by
/// memory for a single instance; a shared store would slot in behind the
/// same trait for a horizontally scaled deployment.
pub trait RateLimiter: Send + Sync {
    /// Record one hit for `key`. Returns false when the key is over its
    /// limit for the current window.
    fn register_hit(&self, key: i64) -> bool;
}

struct WindowEntry {
    count: u32,
    start: Instant,
}

pub struct InMemoryRateLimiter {
    max_hits: u32,
    window: Duration,
    entries: Mutex<HashMap<i64, WindowEntry>>,
}

impl InMemoryRateLimiter {
    pub fn new(max_hits: u32, window: Duration) -> Self {
        Self {
            max_hits,
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// 60 updates per rolling minute, approximated by reset-on-expiry.
    pub fn per_minute(max_hits: u32) -> Self {
        Self::new(max_hits, Duration::from_secs(60))
    }
}

impl RateLimiter for InMemoryRateLimiter {
    fn register_hit(&self, key: i64) -> bool {
        let now = Instant::now();
        let mut entries = self.entries.lock().expect("rate limiter lock poisoned");

        match entries.get_mut(&key) {
            Some(entry) if now.duration_since(entry.start) < self.window => {
                entry.count += 1;
                entry.count <= self.max_hits
            }
            _ => {
                entries.insert(
                    key,
                    WindowEntry {
                        count: 1,
                        start: now,
                    },
                );
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_hits_up_to_limit() {
        let limiter = InMemoryRateLimiter::per_minute(60);
        for _ in 0..60 {
            assert!(limiter.register_hit(1));
        }
    }

    #[test]
    fn rejects_61st_hit_in_window() {
        let limiter = InMemoryRateLimiter::per_minute(60);
        for _ in 0..60 {
            assert!(limiter.register_hit(7));
        }
        assert!(!limiter.register_hit(7));
    }

    #[test]
    fn keys_are_independent() {
        let limiter = InMemoryRateLimiter::per_minute(1);
        assert!(limiter.register_hit(1));
        assert!(!limiter.register_hit(1));
        assert!(limiter.register_hit(2));
    }

    #[test]
    fn new_window_resets_the_count() {
        let limiter = InMemoryRateLimiter::new(1, Duration::from_millis(10));
        assert!(limiter.register_hit(1));
        assert!(!limiter.register_hit(1));
        std::thread::sleep(Duration::from_millis(15));
        assert!(limiter.register_hit(1));
    }
}

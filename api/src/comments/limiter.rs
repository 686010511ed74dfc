//! Submission throttling. One accepted action per key per window, where the
//! key encodes what is being throttled (subject id, hashed address, mailbox).
//! The slot is spent before the write happens, so a failed persist still
//! counts against the caller.

use std::time::{Duration, Instant};

use scc::hash_map::Entry;

pub const SUBMIT_WINDOW: Duration = Duration::from_secs(60);

// TODO back this with a shared store if the API ever runs more than one
// replica; per-process windows multiply by the replica count.
pub struct RateLimiter {
    window: Duration,
    last_accepted: scc::HashMap<String, Instant>,
}

impl RateLimiter {
    pub fn new(window: Duration) -> Self {
        RateLimiter {
            window,
            last_accepted: scc::HashMap::new(),
        }
    }

    /// Atomically checks the key and, when allowed, records the acceptance.
    /// A rejected attempt leaves the existing timestamp alone, so hammering
    /// the endpoint does not extend the lockout.
    pub fn check_and_record(&self, key: &str) -> bool {
        let now = Instant::now();

        match self.last_accepted.entry_sync(key.to_string()) {
            Entry::Occupied(mut entry) => {
                if now.duration_since(*entry.get()) >= self.window {
                    *entry.get_mut() = now;
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(entry) => {
                entry.insert_entry(now);
                true
            }
        }
    }

    /// Drops keys whose window has passed. They would be accepted anyway;
    /// this only keeps the map from growing with every visitor ever seen.
    pub fn evict_expired(&self) {
        self.last_accepted
            .retain_sync(|_, accepted_at| accepted_at.elapsed() < self.window);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn first_attempt_passes_second_is_held() {
        let limiter = RateLimiter::new(Duration::from_secs(60));

        assert!(limiter.check_and_record("user:u1"));
        assert!(!limiter.check_and_record("user:u1"));
    }

    #[test]
    fn window_expiry_frees_the_key() {
        let limiter = RateLimiter::new(Duration::from_millis(40));

        assert!(limiter.check_and_record("ip:abc"));
        assert!(!limiter.check_and_record("ip:abc"));

        std::thread::sleep(Duration::from_millis(60));
        assert!(limiter.check_and_record("ip:abc"));
    }

    #[test]
    fn rejected_attempts_do_not_extend_the_window() {
        let limiter = RateLimiter::new(Duration::from_millis(60));

        assert!(limiter.check_and_record("user:u1"));
        std::thread::sleep(Duration::from_millis(30));
        assert!(!limiter.check_and_record("user:u1"));

        // Past the original acceptance, despite the denied attempt in between.
        std::thread::sleep(Duration::from_millis(40));
        assert!(limiter.check_and_record("user:u1"));
    }

    #[test]
    fn keys_are_independent() {
        let limiter = RateLimiter::new(Duration::from_secs(60));

        assert!(limiter.check_and_record("user:u1"));
        assert!(limiter.check_and_record("user:u2"));
        assert!(limiter.check_and_record("ip:abc"));
        assert!(!limiter.check_and_record("user:u1"));
    }

    #[test]
    fn concurrent_attempts_admit_exactly_one() {
        let limiter = Arc::new(RateLimiter::new(Duration::from_secs(60)));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || limiter.check_and_record("user:contended"))
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join())
            .filter(|result| matches!(result, Ok(true)))
            .count();
        assert_eq!(admitted, 1);
    }

    #[test]
    fn eviction_drops_only_stale_keys() {
        let limiter = RateLimiter::new(Duration::from_millis(30));

        assert!(limiter.check_and_record("stale"));
        std::thread::sleep(Duration::from_millis(50));
        assert!(limiter.check_and_record("fresh"));

        limiter.evict_expired();

        assert!(limiter.last_accepted.get_sync("stale").is_none());
        assert!(limiter.last_accepted.get_sync("fresh").is_some());
    }
}

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{sleep_until, Instant};
use tracing::{instrument, trace};

/// Longest cooldown honoured; longer requests are clamped to it
pub const MAX_COOLDOWN: Duration = Duration::from_secs(60 * 60);

/// Per-endpoint cooldown gate.
///
/// Each endpoint holds at most one cooldown deadline. Waiters re-read the
/// deadline every time they wake, so a replaced or extended cooldown is always
/// honoured and any number of concurrent waiters are released.
#[derive(Debug, Default)]
pub struct RateLimiter {
    slots: Mutex<HashMap<String, Instant>>,
    changed: Notify,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a cooldown of `duration` for `endpoint`, replacing any existing one.
    ///
    /// `duration` is clamped to [`MAX_COOLDOWN`].
    #[instrument(skip(self), fields(endpoint = %endpoint))]
    pub fn add(&self, endpoint: &str, duration: Duration) {
        let duration = duration.min(MAX_COOLDOWN);
        let now = Instant::now();
        let deadline = now.checked_add(duration).unwrap_or(now);
        {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            // drop cooldowns nobody waited out
            slots.retain(|_, d| *d > now);
            slots.insert(endpoint.to_string(), deadline);
        }
        trace!(?duration, "cooldown armed");

        // wake sleepers so they pick up the new deadline
        self.changed.notify_waiters();
    }

    /// Suspend until no cooldown is armed for `endpoint`.
    pub async fn wait(&self, endpoint: &str) {
        loop {
            // Register for wakeups before releasing the lock so an `add`
            // landing between the check and the sleep is not missed.
            let notified = self.changed.notified();

            let deadline = {
                let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
                match slots.get(endpoint) {
                    Some(deadline) if *deadline > Instant::now() => *deadline,
                    Some(_) => {
                        slots.remove(endpoint);
                        return;
                    }
                    None => return,
                }
            };

            trace!(endpoint = %endpoint, "waiting for cooldown");
            tokio::select! {
                () = sleep_until(deadline) => {}
                () = notified => {}
            }
        }
    }

    /// Whether a cooldown is currently armed for `endpoint`.
    pub fn is_limited(&self, endpoint: &str) -> bool {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(endpoint)
            .is_some_and(|deadline| *deadline > Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_wait_without_slot_returns_immediately() {
        let limiter = RateLimiter::new();
        let started = Instant::now();
        limiter.wait("/openApi/spot/v1/trade/order").await;
        assert!(started.elapsed() < Duration::from_millis(5));
    }

    #[tokio::test]
    async fn test_wait_blocks_until_cooldown_elapses() {
        let limiter = RateLimiter::new();
        limiter.add("e", Duration::from_millis(5));
        assert!(limiter.is_limited("e"));

        let started = Instant::now();
        limiter.wait("e").await;
        assert!(started.elapsed() >= Duration::from_millis(5));
        assert!(!limiter.is_limited("e"));
    }

    #[tokio::test]
    async fn test_cooldown_is_per_endpoint() {
        let limiter = RateLimiter::new();
        limiter.add("slow", Duration::from_secs(60));

        let started = Instant::now();
        limiter.wait("fast").await;
        assert!(started.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_concurrent_waiters_all_released() {
        let limiter = Arc::new(RateLimiter::new());
        limiter.add("e", Duration::from_millis(20));

        let waiters: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.wait("e").await })
            })
            .collect();

        let all = futures::future::join_all(waiters);
        let results = tokio::time::timeout(Duration::from_secs(2), all)
            .await
            .expect("every waiter should be released");
        assert!(results.iter().all(Result::is_ok));
    }

    #[tokio::test]
    async fn test_replacing_cooldown_extends_wait() {
        let limiter = Arc::new(RateLimiter::new());
        limiter.add("e", Duration::from_millis(10));

        let started = Instant::now();
        let waiter = {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.wait("e").await })
        };

        tokio::time::sleep(Duration::from_millis(2)).await;
        limiter.add("e", Duration::from_millis(40));

        waiter.await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn test_huge_cooldown_is_clamped() {
        let limiter = RateLimiter::new();
        limiter.add("e", Duration::from_secs(u64::MAX));
        assert!(limiter.is_limited("e"));

        let deadline = limiter.slots.lock().unwrap()["e"];
        assert!(deadline <= Instant::now() + MAX_COOLDOWN);
    }

    #[tokio::test]
    async fn test_expired_slots_pruned_on_add() {
        let limiter = RateLimiter::new();
        limiter.add("stale", Duration::from_millis(1));
        tokio::time::sleep(Duration::from_millis(5)).await;

        limiter.add("fresh", Duration::from_secs(1));
        let slots = limiter.slots.lock().unwrap();
        assert!(!slots.contains_key("stale"));
        assert!(slots.contains_key("fresh"));
    }

    #[tokio::test]
    async fn test_replacing_cooldown_with_shorter_one_releases_early() {
        let limiter = Arc::new(RateLimiter::new());
        limiter.add("e", Duration::from_secs(30));

        let waiter = {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.wait("e").await })
        };

        tokio::time::sleep(Duration::from_millis(5)).await;
        limiter.add("e", Duration::from_millis(1));

        tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .expect("waiter should pick up the shorter deadline")
            .unwrap();
    }
}

//! Sliding-window rate limiter for the public checkout endpoint.
//!
//! Counters live in process memory, so this bounds request rate per source for a single instance only. If the
//! gateway is ever scaled horizontally, move the counters into the transactional store (a small TTL'd counter
//! row) instead of sharing this state.

use std::{
    collections::{HashMap, VecDeque},
    net::IpAddr,
    sync::Mutex,
    time::{Duration, Instant},
};

use log::debug;

pub struct SlidingWindowLimiter {
    max_requests: u32,
    window: Duration,
    counters: Mutex<HashMap<IpAddr, VecDeque<Instant>>>,
}

impl SlidingWindowLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self { max_requests, window, counters: Mutex::new(HashMap::new()) }
    }

    /// Records a hit for `source` and reports whether it is within the limit. Entries older than the window are
    /// pruned on every call, so an idle source costs nothing to keep.
    pub fn check(&self, source: IpAddr) -> bool {
        let now = Instant::now();
        let mut counters = self.counters.lock().expect("rate limiter mutex poisoned");
        let hits = counters.entry(source).or_default();
        while hits.front().map(|t| now.duration_since(*t) > self.window).unwrap_or(false) {
            hits.pop_front();
        }
        if hits.len() >= self.max_requests as usize {
            debug!("💻️ Rate limit hit for {source}: {} requests in the window", hits.len());
            return false;
        }
        hits.push_back(now);
        true
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn ip(last: u8) -> IpAddr {
        IpAddr::from([10, 0, 0, last])
    }

    #[test]
    fn allows_up_to_the_limit_then_rejects() {
        let limiter = SlidingWindowLimiter::new(3, Duration::from_secs(60));
        assert!(limiter.check(ip(1)));
        assert!(limiter.check(ip(1)));
        assert!(limiter.check(ip(1)));
        assert!(!limiter.check(ip(1)));
    }

    #[test]
    fn sources_are_independent() {
        let limiter = SlidingWindowLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.check(ip(1)));
        assert!(!limiter.check(ip(1)));
        assert!(limiter.check(ip(2)));
    }

    #[test]
    fn window_slides() {
        let limiter = SlidingWindowLimiter::new(1, Duration::from_millis(30));
        assert!(limiter.check(ip(1)));
        assert!(!limiter.check(ip(1)));
        std::thread::sleep(Duration::from_millis(40));
        assert!(limiter.check(ip(1)));
    }
}

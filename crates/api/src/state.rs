use std::net::IpAddr;
use std::num::NonZeroU32;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};

use locarank_config::AppConfig;
use locarank_index::VectorIndex;
use locarank_orchestration::Orchestrator;

pub type IpRateLimiter = RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>;

/// Shared per-process state handed to every handler.
pub struct AppState {
    pub config: AppConfig,
    pub orchestrator: Orchestrator,
    pub index: VectorIndex,
    pub limiter: IpRateLimiter,
}

impl AppState {
    pub fn new(config: AppConfig, orchestrator: Orchestrator, index: VectorIndex) -> Self {
        let limiter = build_limiter(
            config.api.rate_limit_requests,
            config.api.rate_limit_window_seconds,
        );
        Self { config, orchestrator, index, limiter }
    }
}

/// Token bucket sized to `requests` per `window_seconds`, keyed by remote
/// address.
fn build_limiter(requests: u32, window_seconds: u64) -> IpRateLimiter {
    let requests = NonZeroU32::new(requests.max(1)).unwrap();
    let window = Duration::from_secs(window_seconds.max(1));
    let replenish = window / requests.get();
    let quota = Quota::with_period(replenish)
        .unwrap_or_else(|| Quota::per_minute(requests))
        .allow_burst(requests);
    RateLimiter::keyed(quota)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limiter_allows_burst_then_throttles() {
        let limiter = build_limiter(5, 60);
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        for _ in 0..5 {
            assert!(limiter.check_key(&ip).is_ok());
        }
        assert!(limiter.check_key(&ip).is_err());
    }

    #[test]
    fn limiter_keys_are_independent_per_address() {
        let limiter = build_limiter(1, 60);
        let a: IpAddr = "10.0.0.1".parse().unwrap();
        let b: IpAddr = "10.0.0.2".parse().unwrap();
        assert!(limiter.check_key(&a).is_ok());
        assert!(limiter.check_key(&b).is_ok());
        assert!(limiter.check_key(&a).is_err());
    }
}

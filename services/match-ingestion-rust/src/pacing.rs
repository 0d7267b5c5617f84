//! Request pacing against the upstream API.

use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::time::Duration;

type DirectLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Token bucket gate awaited before each upstream request.
///
/// A pacer built from a zero rate or zero interval never waits.
pub struct RequestPacer {
    limiter: Option<DirectLimiter>,
}

impl RequestPacer {
    pub fn unlimited() -> Self {
        Self { limiter: None }
    }

    pub fn per_minute(requests: u32) -> Self {
        Self {
            limiter: NonZeroU32::new(requests)
                .map(|n| RateLimiter::direct(Quota::per_minute(n))),
        }
    }

    /// At most one request per `interval`, no burst.
    pub fn every(interval: Duration) -> Self {
        Self {
            limiter: Quota::with_period(interval).map(RateLimiter::direct),
        }
    }

    pub fn is_limited(&self) -> bool {
        self.limiter.is_some()
    }

    pub async fn until_ready(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }
}

impl std::fmt::Debug for RequestPacer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestPacer")
            .field("limited", &self.is_limited())
            .finish()
    }
}

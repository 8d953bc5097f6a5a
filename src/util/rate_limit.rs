//! Rate limiting utilities

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter type alias
pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Create a rate limiter with the specified requests per second
pub fn create_limiter(requests_per_second: u32) -> Arc<Limiter> {
    let quota = Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}

/// Gameplay frame limit per session. Clients send one position per render
/// tick; anything past this is a runaway or hostile client.
pub const GAMEPLAY_RATE_LIMIT: u32 = 60;

/// Per-session rate limiter state
#[derive(Clone)]
pub struct SessionRateLimiter {
    gameplay_limiter: Arc<Limiter>,
}

impl SessionRateLimiter {
    pub fn new() -> Self {
        Self {
            gameplay_limiter: create_limiter(GAMEPLAY_RATE_LIMIT),
        }
    }

    /// Check if a gameplay frame is allowed (returns true if allowed)
    pub fn check_gameplay(&self) -> bool {
        self.gameplay_limiter.check().is_ok()
    }
}

impl Default for SessionRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

//! Rate limiting for outbound handle lookups
use crate::error::{AuthzError, AuthzResult};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorLimiter,
};
use std::{num::NonZeroU32, sync::Arc};

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Lookups per second sent to the handle directory
    pub lookups_per_second: u32,
    /// Burst size
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            lookups_per_second: 5,
            burst_size: 10,
        }
    }
}

/// Rate limiter in front of the handle directory
#[derive(Clone)]
pub struct LookupLimiter {
    limiter: Arc<GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl LookupLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let fallback_rate = NonZeroU32::MIN.saturating_add(4);
        let fallback_burst = NonZeroU32::MIN.saturating_add(9);

        let quota = Quota::per_second(
            NonZeroU32::new(config.lookups_per_second).unwrap_or(fallback_rate),
        )
        .allow_burst(NonZeroU32::new(config.burst_size).unwrap_or(fallback_burst));

        Self {
            limiter: Arc::new(GovernorLimiter::direct(quota)),
        }
    }

    /// Check whether another lookup may be sent now
    pub fn check(&self) -> AuthzResult<()> {
        self.limiter
            .check()
            .map_err(|_| AuthzError::Lookup("handle lookup rate limit exceeded".to_string()))
    }
}

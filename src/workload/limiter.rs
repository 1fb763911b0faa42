use crate::metrics::RATELIMIT_CURR;
use core::num::NonZeroU64;
use ratelimit::Ratelimiter;
use std::time::Duration;

/// Admits work at a steady rate.
///
/// The bucket holds at most a single refill, so idle time does not build up
/// credit that could later be spent as a burst.
pub struct RateLimiter {
    ratelimiter: Ratelimiter,
}

impl RateLimiter {
    pub fn new(rate: NonZeroU64) -> Result<Self, ratelimit::Error> {
        let rate = rate.get();
        let amount = (rate as f64 / 1_000_000.0).ceil() as u64;

        // even though we might not have nanosecond level clock resolution,
        // by using a nanosecond level duration, we achieve more accurate
        // ratelimits.
        let interval = Duration::from_nanos(1_000_000_000 / (rate / amount));

        let ratelimiter = Ratelimiter::builder(amount, interval)
            .max_tokens(amount)
            .build()?;

        RATELIMIT_CURR.set(rate as i64);

        Ok(Self { ratelimiter })
    }

    /// Blocks the calling thread until a token is available.
    pub fn acquire(&self) {
        while let Err(wait) = self.try_acquire() {
            std::thread::sleep(wait);
        }
    }

    /// Takes a token if one is available, otherwise returns how long until the
    /// next refill.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        self.ratelimiter.try_wait()
    }

    pub fn rate(&self) -> f64 {
        self.ratelimiter.rate()
    }
}

//! Token bucket limiter with hard-reset replenishment.
//!
//! The bucket starts full. Each admitted request takes one token through a
//! compare-and-swap loop; once the count hits zero every request is rejected
//! until the next tick, when a background task stores the full capacity back
//! into the counter. Unused tokens are not carried over.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::AdmissionController;

/// Default bucket capacity.
pub const MAX_TOKENS: u32 = 200;

/// Default time between refills.
pub const DEFAULT_REFILL_INTERVAL: Duration = Duration::from_secs(1);

pub struct TokenBucketLimiter {
    tokens: Arc<AtomicU32>,
    max_tokens: u32,
    refill_interval: Duration,
    /// Cancelled by `stop` or when the limiter is dropped. The replenisher
    /// checks it once per tick.
    cancel: CancellationToken,
}

impl Default for TokenBucketLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenBucketLimiter {
    pub fn new() -> Self {
        Self::with_capacity(MAX_TOKENS, DEFAULT_REFILL_INTERVAL)
    }

    pub fn with_capacity(max_tokens: u32, refill_interval: Duration) -> Self {
        Self {
            tokens: Arc::new(AtomicU32::new(max_tokens)),
            max_tokens,
            refill_interval,
            cancel: CancellationToken::new(),
        }
    }

    /// Takes one token if any are left.
    ///
    /// Returns `true` when a token was consumed. Concurrent callers retry on a
    /// lost race instead of blocking, so exactly `available()` callers can win
    /// before the next refill.
    pub fn try_consume(&self) -> bool {
        let mut current = self.tokens.load(Ordering::Acquire);

        while current > 0 {
            match self.tokens.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }

        false
    }

    /// Tokens left until the next refill.
    pub fn available(&self) -> u32 {
        self.tokens.load(Ordering::Acquire)
    }

    /// Spawns the replenishment task.
    ///
    /// The task holds the counter and a clone of the cancellation token, never
    /// the limiter itself. Every `refill_interval` it exits if the token is
    /// cancelled, otherwise resets the counter to `max_tokens`.
    pub fn start(&self) -> JoinHandle<()> {
        let tokens = Arc::clone(&self.tokens);
        let cancel = self.cancel.clone();
        let max_tokens = self.max_tokens;
        let interval = self.refill_interval;

        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;

                if cancel.is_cancelled() {
                    tracing::debug!("Token bucket stopped, replenisher exiting");
                    break;
                }

                tokens.store(max_tokens, Ordering::Release);
                tracing::trace!(tokens = max_tokens, "Token bucket replenished");
            }
        })
    }

    /// Signals the replenisher to exit at its next tick.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for TokenBucketLimiter {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl AdmissionController for TokenBucketLimiter {
    fn is_overloaded(&self) -> bool {
        !self.try_consume()
    }

    fn name(&self) -> &'static str {
        "token_bucket"
    }
}

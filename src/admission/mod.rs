//! Admission control
//!
//! Decides whether an incoming request is accepted before any backend work is
//! committed to it. Strategies are interchangeable behind
//! [`AdmissionController`]; the forwarder only ever sees the trait object.

pub mod random;
pub mod token_bucket;

use std::sync::Arc;
use std::time::Duration;

use crate::config::{AdmissionConfig, AdmissionStrategy};

pub use random::RandomAdmissionController;
pub use token_bucket::{TokenBucketLimiter, DEFAULT_REFILL_INTERVAL, MAX_TOKENS};

/// Accept/reject decision for one request.
///
/// Implementations must answer immediately: no blocking, no queueing.
pub trait AdmissionController: Send + Sync {
    /// `true` rejects the request with 429.
    fn is_overloaded(&self) -> bool;

    fn name(&self) -> &'static str;
}

/// Builds the configured strategy. The token bucket's replenisher is started
/// here, so this must run inside a tokio runtime.
pub fn from_config(cfg: &AdmissionConfig) -> Arc<dyn AdmissionController> {
    match cfg.strategy {
        AdmissionStrategy::TokenBucket => {
            let limiter = TokenBucketLimiter::with_capacity(
                cfg.max_tokens,
                Duration::from_millis(cfg.refill_interval_ms),
            );
            limiter.start();
            Arc::new(limiter)
        }
        AdmissionStrategy::Random => Arc::new(RandomAdmissionController::new()),
    }
}

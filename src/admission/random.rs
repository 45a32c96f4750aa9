use rand::Rng;

use super::AdmissionController;

/// Rejects each request independently with probability 1/10.
///
/// A smoke-test baseline for exercising the 429 path, not a production
/// strategy.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomAdmissionController;

impl RandomAdmissionController {
    pub const REJECT_NUMERATOR: u32 = 1;
    pub const REJECT_DENOMINATOR: u32 = 10;

    pub fn new() -> Self {
        Self
    }
}

impl AdmissionController for RandomAdmissionController {
    fn is_overloaded(&self) -> bool {
        rand::thread_rng().gen_ratio(Self::REJECT_NUMERATOR, Self::REJECT_DENOMINATOR)
    }

    fn name(&self) -> &'static str {
        "random"
    }
}

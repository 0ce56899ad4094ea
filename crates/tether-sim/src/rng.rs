use serde::{Deserialize, Serialize};

/// Small reproducible PRNG (64-bit LCG) for intent plans and fault rolls.
///
/// Identical seeds give identical streams on every platform, which is all the
/// harness needs; statistical quality is secondary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self {
            state: seed ^ 0x9E37_79B9_7F4A_7C15,
        }
    }

    /// Derive an independent stream for one concern (plan, backend...).
    #[must_use]
    pub const fn fork(seed: u64, stream: u64) -> Self {
        Self::new(seed.wrapping_mul(0x100_0000_01B3).wrapping_add(stream))
    }

    pub const fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        // High bits of an LCG are the well-mixed ones.
        self.state >> 16
    }

    /// Next value in `[0, upper_exclusive)`; 0 when the range is empty.
    pub const fn next_bounded(&mut self, upper_exclusive: u64) -> u64 {
        if upper_exclusive == 0 {
            return 0;
        }
        self.next_u64() % upper_exclusive
    }

    /// Next value in `[low, high]`. Swapped bounds are reordered.
    pub const fn next_inclusive(&mut self, low: u64, high: u64) -> u64 {
        let (low, high) = if low <= high { (low, high) } else { (high, low) };
        low + self.next_bounded(high - low + 1)
    }

    /// Bernoulli trial with integer percent.
    pub fn hit_rate_percent(&mut self, percent: u8) -> bool {
        match percent {
            0 => false,
            100..=u8::MAX => true,
            p => self.next_bounded(100) < u64::from(p),
        }
    }
}

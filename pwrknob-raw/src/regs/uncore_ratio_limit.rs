//! MSR_UNCORE_RATIO_LIMIT (0x620)
//!
//! Limits the uncore frequency. Ratios are multiples of the bus clock
//! (100 MHz on the covered models).

use crate::register::{extract_bits, insert_bits, Bits, RegisterLayout};

pub const ADDR: u64 = 0x620;
pub const NAME: &str = "MSR_UNCORE_RATIO_LIMIT";

/// Bits 6:0, the maximum allowed uncore ratio.
pub const MAX_RATIO_BITS: Bits = (6, 0);
/// Bits 14:8, the minimum allowed uncore ratio.
pub const MIN_RATIO_BITS: Bits = (14, 8);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UncoreRatioLimit {
    pub max_ratio: u8,
    pub min_ratio: u8,
}

impl RegisterLayout for UncoreRatioLimit {
    fn to_msr_value(&self) -> u64 {
        let mut value = 0;
        value = insert_bits(value, MAX_RATIO_BITS, self.max_ratio as u64);
        value = insert_bits(value, MIN_RATIO_BITS, self.min_ratio as u64);
        value
    }

    fn from_msr_value(value: u64) -> Self {
        Self {
            max_ratio: extract_bits(value, MAX_RATIO_BITS) as u8,
            min_ratio: extract_bits(value, MIN_RATIO_BITS) as u8,
        }
    }

    fn validate(&self) -> Result<(), &'static str> {
        if self.max_ratio > 0x7F || self.min_ratio > 0x7F {
            return Err("uncore ratios are 7-bit fields");
        }
        if self.min_ratio > self.max_ratio {
            return Err("minimum uncore ratio above maximum");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio_fields() {
        let limit = UncoreRatioLimit {
            max_ratio: 24,
            min_ratio: 8,
        };
        assert!(limit.validate().is_ok());
        let raw = limit.to_msr_value();
        assert_eq!(raw, 24 | (8 << 8));
        assert_eq!(UncoreRatioLimit::from_msr_value(raw), limit);
    }

    #[test]
    fn test_inverted_limits_rejected() {
        let limit = UncoreRatioLimit {
            max_ratio: 8,
            min_ratio: 24,
        };
        assert!(limit.validate().is_err());
    }
}

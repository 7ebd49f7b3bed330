//! MSR_HWP_REQUEST (0x774)
//!
//! Per-logical-CPU hardware P-state request. pwrknob only drives the EPP
//! (Energy Performance Preference) field; the performance min/max/desired
//! fields are exposed for completeness of the layout.

use crate::register::{extract_bits, insert_bits, Bits, RegisterLayout};

pub const ADDR: u64 = 0x774;
pub const NAME: &str = "MSR_HWP_REQUEST";

pub const MIN_PERF_BITS: Bits = (7, 0);
pub const MAX_PERF_BITS: Bits = (15, 8);
pub const DESIRED_PERF_BITS: Bits = (23, 16);
/// Bits 31:24, the EPP hint. 0 is maximum performance, 255 maximum
/// energy saving.
pub const EPP_BITS: Bits = (31, 24);

pub const EPP_MIN: u64 = 0;
pub const EPP_MAX: u64 = 0xFF;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HwpRequest {
    pub min_perf: u8,
    pub max_perf: u8,
    pub desired_perf: u8,
    pub epp: u8,
}

impl RegisterLayout for HwpRequest {
    fn to_msr_value(&self) -> u64 {
        let mut value = 0;
        value = insert_bits(value, MIN_PERF_BITS, self.min_perf as u64);
        value = insert_bits(value, MAX_PERF_BITS, self.max_perf as u64);
        value = insert_bits(value, DESIRED_PERF_BITS, self.desired_perf as u64);
        value = insert_bits(value, EPP_BITS, self.epp as u64);
        value
    }

    fn from_msr_value(value: u64) -> Self {
        Self {
            min_perf: extract_bits(value, MIN_PERF_BITS) as u8,
            max_perf: extract_bits(value, MAX_PERF_BITS) as u8,
            desired_perf: extract_bits(value, DESIRED_PERF_BITS) as u8,
            epp: extract_bits(value, EPP_BITS) as u8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epp_field_position() {
        let req = HwpRequest {
            epp: 0x80,
            ..Default::default()
        };
        assert_eq!(req.to_msr_value(), 0x80u64 << 24);
        assert_eq!(HwpRequest::from_msr_value(0xC0u64 << 24).epp, 0xC0);
    }
}

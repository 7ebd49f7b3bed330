//! MSR_ENERGY_PERF_BIAS (0x1B0)
//!
//! Architectural energy/performance bias hint. 0 is maximum performance,
//! 15 is maximum energy saving.

use crate::register::{extract_bits, insert_bits, Bits, RegisterLayout};

pub const ADDR: u64 = 0x1B0;
pub const NAME: &str = "MSR_ENERGY_PERF_BIAS";

/// Bits 3:0, the EPB hint value.
pub const EPB_BITS: Bits = (3, 0);

pub const EPB_MIN: u64 = 0;
pub const EPB_MAX: u64 = 15;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnergyPerfBias {
    pub epb: u8,
}

impl RegisterLayout for EnergyPerfBias {
    fn to_msr_value(&self) -> u64 {
        insert_bits(0, EPB_BITS, self.epb as u64)
    }

    fn from_msr_value(value: u64) -> Self {
        Self {
            epb: extract_bits(value, EPB_BITS) as u8,
        }
    }

    fn validate(&self) -> Result<(), &'static str> {
        if self.epb as u64 > EPB_MAX {
            return Err("EPB must be in the range 0-15");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epb_roundtrip() {
        let layout = EnergyPerfBias { epb: 6 };
        assert!(layout.validate().is_ok());
        assert_eq!(layout.to_msr_value(), 6);
        assert_eq!(EnergyPerfBias::from_msr_value(0xFF6), EnergyPerfBias { epb: 6 });
        assert!(EnergyPerfBias { epb: 16 }.validate().is_err());
    }
}

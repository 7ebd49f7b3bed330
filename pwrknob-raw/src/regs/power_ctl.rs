//! MSR_POWER_CTL (0x1FC)
//!
//! The Power Control MSR, found on most Intel platforms. Carries the C1E
//! autopromote and C-state prewake knobs. Although documented with package
//! scope, on many parts the register is physically per-core, so the two
//! knobs can disagree between cores of one package.

use crate::register::{extract_bits, insert_bits, Bits, RegisterLayout};

pub const ADDR: u64 = 0x1FC;
pub const NAME: &str = "MSR_POWER_CTL";

/// Bit 1: when set, the CPU converts all C1 requests to C1E requests.
pub const C1E_AUTOPROMOTE_BITS: Bits = (1, 1);

/// Bit 30: C-state prewake disable. Note the inverted sense: the bit set
/// means prewake is *disabled*.
pub const CSTATE_PREWAKE_DISABLE_BITS: Bits = (30, 30);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PowerCtl {
    pub c1e_autopromote: bool,
    /// True when prewake is enabled (bit 30 clear).
    pub cstate_prewake: bool,
}

impl RegisterLayout for PowerCtl {
    fn to_msr_value(&self) -> u64 {
        let mut value = 0;
        value = insert_bits(value, C1E_AUTOPROMOTE_BITS, self.c1e_autopromote as u64);
        value = insert_bits(
            value,
            CSTATE_PREWAKE_DISABLE_BITS,
            !self.cstate_prewake as u64,
        );
        value
    }

    fn from_msr_value(value: u64) -> Self {
        Self {
            c1e_autopromote: extract_bits(value, C1E_AUTOPROMOTE_BITS) != 0,
            cstate_prewake: extract_bits(value, CSTATE_PREWAKE_DISABLE_BITS) == 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prewake_inverted_sense() {
        let ctl = PowerCtl {
            c1e_autopromote: true,
            cstate_prewake: true,
        };
        let raw = ctl.to_msr_value();
        assert_eq!(raw & 0x2, 0x2);
        assert_eq!(raw & (1 << 30), 0, "prewake enabled means bit 30 clear");
        assert_eq!(PowerCtl::from_msr_value(raw), ctl);
    }
}

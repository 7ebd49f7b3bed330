//! IA32_MISC_ENABLE (0x1A0)
//!
//! Miscellaneous enable register. pwrknob drives bit 38 only, the turbo
//! disengage bit (inverted sense: set means turbo is disabled).

use crate::register::Bits;

pub const ADDR: u64 = 0x1A0;
pub const NAME: &str = "IA32_MISC_ENABLE";

/// Bit 38: turbo mode disable.
pub const TURBO_DISABLE_BITS: Bits = (38, 38);

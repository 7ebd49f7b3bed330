//! Bit-field math and typed register layouts
//!
//! Power-management MSRs pack several logical knobs into one 64-bit
//! register. Bit ranges are given as `(high, low)` pairs, both inclusive,
//! matching the notation of the Intel SDM.

/// An inclusive `(high, low)` bit range within a 64-bit register.
pub type Bits = (u32, u32);

/// Mask covering the inclusive bit range `bits`.
///
/// `field_mask((3, 0))` is `0xF`, `field_mask((63, 0))` is `u64::MAX`.
pub fn field_mask(bits: Bits) -> u64 {
    let (high, low) = bits;
    debug_assert!(high >= low && high < 64);
    if high - low >= 63 {
        u64::MAX
    } else {
        ((1u64 << (high - low + 1)) - 1) << low
    }
}

/// Extract the field at `bits` from a raw register value, right-aligned.
pub fn extract_bits(value: u64, bits: Bits) -> u64 {
    (value & field_mask(bits)) >> bits.1
}

/// Return `value` with the field at `bits` replaced by `field`.
///
/// Bits of `field` above the field width are ignored.
pub fn insert_bits(value: u64, bits: Bits, field: u64) -> u64 {
    let mask = field_mask(bits);
    (value & !mask) | ((field << bits.1) & mask)
}

/// Trait for register layouts that convert to/from raw 64-bit MSR values.
///
/// Each module in [`crate::regs`] provides one layout per register, so
/// callers manipulate named fields instead of shift/mask expressions.
pub trait RegisterLayout: Sized {
    /// Pack this layout into a raw MSR value.
    fn to_msr_value(&self) -> u64;

    /// Unpack a raw MSR value into this layout.
    fn from_msr_value(value: u64) -> Self;

    /// Check that all fields are within their architectural ranges.
    fn validate(&self) -> Result<(), &'static str> {
        Ok(())
    }
}

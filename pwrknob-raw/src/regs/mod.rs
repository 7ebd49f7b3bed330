//! Per-register address constants and typed layouts
//!
//! One module per MSR. Each exports `ADDR`, the `(high, low)` bit ranges of
//! the fields pwrknob drives, and a [`crate::register::RegisterLayout`]
//! implementation for whole-register programming.

pub mod energy_perf_bias;
pub mod hwp_request;
pub mod misc_enable;
pub mod power_ctl;
pub mod uncore_ratio_limit;

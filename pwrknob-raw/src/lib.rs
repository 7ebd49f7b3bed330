//! # pwrknob-raw
//!
//! Register definitions for the Intel power-management MSRs driven by the
//! `pwrknob` framework, plus low-level `/dev/cpu/*/msr` access primitives.
//!
//! This crate knows about register addresses and bit-field layouts only.
//! Mechanism selection, topology scope validation, caching and write
//! transactions all live in `pwrknob-core`.
//!
//! ## Usage
//!
//! ```ignore
//! use pwrknob_raw::msr::MsrDev;
//! use pwrknob_raw::regs::energy_perf_bias;
//! use pwrknob_raw::register::extract_bits;
//!
//! let dev = MsrDev::open(0)?;
//! let raw = dev.read(energy_perf_bias::ADDR)?;
//! let epb = extract_bits(raw, energy_perf_bias::EPB_BITS);
//! ```

pub mod msr;
pub mod register;
pub mod regs;

pub use msr::{MsrDev, MsrError};
pub use register::{extract_bits, field_mask, insert_bits, RegisterLayout};

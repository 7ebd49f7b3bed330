//! Register accessor and transaction coordinator
//!
//! [`RegisterIo`] is the raw read/write seam; [`MsrIo`] implements it over
//! `/dev/cpu/*/msr` with a lazily-opened handle per CPU. [`Msr`] layers
//! bit-field read-modify-write on top, plus the write transaction:
//! multiple logical knobs commonly share one physical register, and a
//! commit should cost one hardware write per register, not one per
//! bit-field.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use pwrknob_raw::msr::{MsrDev, MsrError};
use pwrknob_raw::register::{extract_bits, field_mask, Bits};

use crate::affinity::AffinityGuard;
use crate::error::{PwrknobError, Result};

pub trait RegisterIo {
    fn read_register(&self, addr: u64, cpu: u32) -> Result<u64>;
    fn write_register(&self, addr: u64, value: u64, cpu: u32) -> Result<()>;
}

/// [`RegisterIo`] over `/dev/cpu/*/msr`, one pooled handle per CPU.
pub struct MsrIo {
    handles: Mutex<HashMap<u32, MsrDev>>,
}

impl MsrIo {
    pub fn new() -> Self {
        Self {
            handles: Mutex::new(HashMap::new()),
        }
    }

    fn with_dev<T>(&self, cpu: u32, f: impl FnOnce(&mut MsrDev) -> std::result::Result<T, MsrError>) -> Result<T> {
        let _affinity = AffinityGuard::new(cpu)?;
        let mut handles = self.handles.lock();

        if !handles.contains_key(&cpu) {
            let dev = MsrDev::open(cpu).map_err(|e| classify(e, cpu))?;
            tracing::debug!("opened MSR handle for CPU {cpu}");
            handles.insert(cpu, dev);
        }

        let dev = handles.get_mut(&cpu).expect("handle inserted above");
        f(dev).map_err(|e| classify(e, cpu))
    }
}

impl Default for MsrIo {
    fn default() -> Self {
        Self::new()
    }
}

fn classify(err: MsrError, cpu: u32) -> PwrknobError {
    if err.is_not_found() {
        PwrknobError::NotSupported {
            what: format!(
                "the MSR interface for CPU {cpu} (is the 'msr' kernel module loaded?)"
            ),
        }
    } else if err.is_permission_denied() {
        PwrknobError::PermissionDenied {
            what: format!("accessing /dev/cpu/{cpu}/msr"),
            guidance: "MSR access requires root or CAP_SYS_RAWIO".to_string(),
        }
    } else {
        PwrknobError::Io(std::io::Error::other(err.to_string()))
    }
}

impl RegisterIo for MsrIo {
    fn read_register(&self, addr: u64, cpu: u32) -> Result<u64> {
        let value = self.with_dev(cpu, |dev| dev.read(addr))?;
        tracing::debug!("MSR read: CPU {cpu} 0x{addr:08X} = 0x{value:016X}");
        Ok(value)
    }

    fn write_register(&self, addr: u64, value: u64, cpu: u32) -> Result<()> {
        tracing::debug!("MSR write: CPU {cpu} 0x{addr:08X} = 0x{value:016X}");
        self.with_dev(cpu, |dev| dev.write(addr, value))
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct PendingWrite {
    mask: u64,
    bits: u64,
    verify: bool,
}

/// Bit-field level register accessor with buffered write transactions.
pub struct Msr {
    io: Arc<dyn RegisterIo>,
    /// `Some` while a transaction is open. Keyed (address, CPU) so commit
    /// iterates in deterministic register-then-CPU order.
    pending: Option<BTreeMap<(u64, u32), PendingWrite>>,
}

impl Msr {
    pub fn new(io: Arc<dyn RegisterIo>) -> Self {
        Self { io, pending: None }
    }

    /// Read the full register. Inside a transaction, buffered bit-field
    /// writes are overlaid so a read observes preceding writes.
    pub fn read(&self, addr: u64, cpu: u32) -> Result<u64> {
        let mut value = self.io.read_register(addr, cpu)?;
        if let Some(pending) = &self.pending {
            if let Some(pw) = pending.get(&(addr, cpu)) {
                value = (value & !pw.mask) | pw.bits;
            }
        }
        Ok(value)
    }

    /// Read one bit field, right-aligned.
    pub fn read_bits(&self, addr: u64, bits: Bits, cpu: u32) -> Result<u64> {
        Ok(extract_bits(self.read(addr, cpu)?, bits))
    }

    /// Write one bit field.
    ///
    /// Without an open transaction this is an immediate read-modify-write
    /// (plus read-back when `verify` is set), observably identical to a
    /// one-write transaction. Inside a transaction the field is merged
    /// into the pending write for (addr, cpu).
    pub fn write_bits(&mut self, addr: u64, bits: Bits, field: u64, cpu: u32, verify: bool) -> Result<()> {
        let mask = field_mask(bits);
        let shifted = (field << bits.1) & mask;

        match &mut self.pending {
            Some(pending) => {
                let pw = pending.entry((addr, cpu)).or_default();
                pw.bits = (pw.bits & !mask) | shifted;
                pw.mask |= mask;
                pw.verify |= verify;
                tracing::debug!(
                    "buffered write: CPU {cpu} 0x{addr:08X} bits {}:{} = 0x{field:X}",
                    bits.0,
                    bits.1
                );
                Ok(())
            }
            None => self.rmw(addr, cpu, mask, shifted, verify),
        }
    }

    fn rmw(&self, addr: u64, cpu: u32, mask: u64, bits: u64, verify: bool) -> Result<()> {
        let current = self.io.read_register(addr, cpu)?;
        let updated = (current & !mask) | bits;
        self.io.write_register(addr, updated, cpu)?;

        if verify {
            let readback = self.io.read_register(addr, cpu)?;
            if readback & mask != bits {
                return Err(PwrknobError::VerifyFailed {
                    addr,
                    cpu,
                    expected: bits,
                    actual: readback & mask,
                });
            }
        }
        Ok(())
    }

    pub fn transaction_open(&self) -> bool {
        self.pending.is_some()
    }

    /// Enter buffering mode. Nested transactions are an error.
    pub fn start_transaction(&mut self) -> Result<()> {
        if self.pending.is_some() {
            return Err(PwrknobError::TransactionAlreadyOpen);
        }
        self.pending = Some(BTreeMap::new());
        Ok(())
    }

    /// Flush all buffered writes, one read-modify-write per (register,
    /// CPU), in register-then-CPU order.
    ///
    /// A verification failure aborts the remaining buffered writes for
    /// that register only; writes already flushed for other registers
    /// stand, and the first verification error is returned after the
    /// remaining registers are processed.
    pub fn commit_transaction(&mut self) -> Result<()> {
        let pending = self
            .pending
            .take()
            .ok_or(PwrknobError::TransactionNotOpen)?;

        let mut first_err = None;
        let mut aborted_addr = None;

        for ((addr, cpu), pw) in pending {
            if aborted_addr == Some(addr) {
                continue;
            }
            match self.rmw(addr, cpu, pw.mask, pw.bits, pw.verify) {
                Ok(()) => {}
                Err(err @ PwrknobError::VerifyFailed { .. }) => {
                    tracing::warn!(
                        "aborting remaining buffered writes to register 0x{addr:X}: {err}"
                    );
                    aborted_addr = Some(addr);
                    if first_err.is_none() {
                        first_err = Some(err);
                    }
                }
                Err(err) => return Err(err),
            }
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
pub mod mock {
    //! Recording in-memory register backend for unit tests.

    use std::collections::HashMap;
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::RegisterIo;
    use crate::error::{PwrknobError, Result};

    #[derive(Default)]
    pub struct MockRegisterIo {
        regs: Mutex<HashMap<(u64, u32), u64>>,
        /// Every write in order, for grouping assertions.
        writes: Mutex<Vec<(u64, u32, u64)>>,
        reads: Mutex<usize>,
        /// Per-register masks of bits that ignore writes, for provoking
        /// verification failures.
        stuck: Mutex<HashMap<u64, u64>>,
        /// When set, the whole interface reports "not found".
        unavailable: bool,
    }

    impl MockRegisterIo {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn unavailable() -> Arc<Self> {
            Arc::new(Self {
                unavailable: true,
                ..Self::default()
            })
        }

        pub fn preset(&self, addr: u64, cpu: u32, value: u64) {
            self.regs.lock().insert((addr, cpu), value);
        }

        pub fn value(&self, addr: u64, cpu: u32) -> u64 {
            self.regs.lock().get(&(addr, cpu)).copied().unwrap_or(0)
        }

        pub fn write_log(&self) -> Vec<(u64, u32, u64)> {
            self.writes.lock().clone()
        }

        pub fn read_count(&self) -> usize {
            *self.reads.lock()
        }

        pub fn stick_bits(&self, addr: u64, mask: u64) {
            self.stuck.lock().insert(addr, mask);
        }
    }

    impl RegisterIo for MockRegisterIo {
        fn read_register(&self, addr: u64, cpu: u32) -> Result<u64> {
            if self.unavailable {
                return Err(PwrknobError::NotSupported {
                    what: "the MSR interface".to_string(),
                });
            }
            *self.reads.lock() += 1;
            Ok(self.value(addr, cpu))
        }

        fn write_register(&self, addr: u64, value: u64, cpu: u32) -> Result<()> {
            if self.unavailable {
                return Err(PwrknobError::NotSupported {
                    what: "the MSR interface".to_string(),
                });
            }
            self.writes.lock().push((addr, cpu, value));

            let stuck_mask = self.stuck.lock().get(&addr).copied().unwrap_or(0);
            let old = self.value(addr, cpu);
            let applied = (value & !stuck_mask) | (old & stuck_mask);
            self.regs.lock().insert((addr, cpu), applied);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockRegisterIo;
    use super::*;

    #[test]
    fn test_autocommit_rmw() {
        let io = MockRegisterIo::new();
        io.preset(0x1FC, 0, 0xFF00);

        let mut msr = Msr::new(io.clone());
        msr.write_bits(0x1FC, (1, 1), 1, 0, false).unwrap();

        assert_eq!(io.value(0x1FC, 0), 0xFF02);
        assert_eq!(io.write_log().len(), 1);
    }

    #[test]
    fn test_transaction_groups_fields_of_one_register() {
        let io = MockRegisterIo::new();
        let mut msr = Msr::new(io.clone());

        msr.start_transaction().unwrap();
        msr.write_bits(0x620, (6, 0), 24, 0, false).unwrap();
        msr.write_bits(0x620, (14, 8), 8, 0, false).unwrap();
        assert!(io.write_log().is_empty(), "writes must buffer");

        msr.commit_transaction().unwrap();

        let log = io.write_log();
        assert_eq!(log.len(), 1, "one register write for two bit-fields");
        assert_eq!(log[0], (0x620, 0, 24 | (8 << 8)));
    }

    #[test]
    fn test_commit_order_register_then_cpu() {
        let io = MockRegisterIo::new();
        let mut msr = Msr::new(io.clone());

        msr.start_transaction().unwrap();
        msr.write_bits(0x620, (6, 0), 20, 1, false).unwrap();
        msr.write_bits(0x1FC, (1, 1), 1, 0, false).unwrap();
        msr.write_bits(0x620, (6, 0), 20, 0, false).unwrap();
        msr.commit_transaction().unwrap();

        let order: Vec<(u64, u32)> = io.write_log().iter().map(|w| (w.0, w.1)).collect();
        assert_eq!(order, vec![(0x1FC, 0), (0x620, 0), (0x620, 1)]);
    }

    #[test]
    fn test_read_observes_buffered_write() {
        let io = MockRegisterIo::new();
        io.preset(0x1B0, 0, 0xF);

        let mut msr = Msr::new(io);
        msr.start_transaction().unwrap();
        msr.write_bits(0x1B0, (3, 0), 6, 0, false).unwrap();
        assert_eq!(msr.read_bits(0x1B0, (3, 0), 0).unwrap(), 6);
    }

    #[test]
    fn test_nested_transaction_rejected() {
        let mut msr = Msr::new(MockRegisterIo::new());
        assert!(!msr.transaction_open());
        msr.start_transaction().unwrap();
        assert!(msr.transaction_open());
        assert!(matches!(
            msr.start_transaction(),
            Err(PwrknobError::TransactionAlreadyOpen)
        ));
        assert!(matches!(
            Msr::new(MockRegisterIo::new()).commit_transaction(),
            Err(PwrknobError::TransactionNotOpen)
        ));
    }

    #[test]
    fn test_verify_failure_aborts_only_that_register() {
        let io = MockRegisterIo::new();
        // Bit 1 of POWER_CTL ignores writes; the uncore register is fine.
        io.stick_bits(0x1FC, 0x2);

        let mut msr = Msr::new(io.clone());
        msr.start_transaction().unwrap();
        msr.write_bits(0x1FC, (1, 1), 1, 0, true).unwrap();
        msr.write_bits(0x1FC, (1, 1), 1, 1, true).unwrap();
        msr.write_bits(0x620, (6, 0), 24, 0, false).unwrap();

        let err = msr.commit_transaction().unwrap_err();
        assert!(matches!(err, PwrknobError::VerifyFailed { addr: 0x1FC, cpu: 0, .. }));

        let log = io.write_log();
        // CPU 1's POWER_CTL write was aborted, the uncore write stood.
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].0, 0x1FC);
        assert_eq!(log[1].0, 0x620);
        assert_eq!(io.value(0x620, 0), 24);
    }
}

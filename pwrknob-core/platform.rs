//! CPU model detection and model-dependent quirks
//!
//! Several properties have platform-dependent behavior: EPB is per-CPU on
//! most parts but core- or package-wide on a few, MSR_POWER_CTL is
//! physically per-core on some server parts even though its knobs are
//! documented package-wide, and C-state prewake only works on a known set
//! of models. All of those quirks are answered here, from the CPUID
//! family/model pair.

use once_cell::sync::Lazy;

use crate::topology::ScopeUnit;

// Display models, family 6. Reference: Intel SDM volume 4 model tables.
const SILVERMONTS: &[u32] = &[0x37, 0x4A, 0x4D, 0x5A, 0x5D];
const WESTMERES: &[u32] = &[0x25, 0x2C, 0x2F];
const SANDYBRIDGES: &[u32] = &[0x2A, 0x2D];

// Server models where MSR_POWER_CTL is a per-core register despite its
// knobs being documented with package scope.
const POWER_CTL_PER_CORE: &[u32] = &[0x3F, 0x4F, 0x55, 0x6A, 0x6C, 0x8F];

// C-state prewake is advertised more widely but only known to work here.
const CSTATE_PREWAKE: &[u32] = &[0x3E, 0x3F, 0x4F, 0x55, 0x6A, 0x6C, 0x8F];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Platform {
    pub vendor_intel: bool,
    pub family: u32,
    pub model: u32,
}

static DETECTED: Lazy<Platform> = Lazy::new(Platform::detect);

impl Platform {
    /// The platform of the local host, detected once.
    pub fn host() -> Platform {
        *DETECTED
    }

    pub fn detect() -> Platform {
        let (_, vendor_ebx, _, _) = cpuid(0, 0);
        // "Genu" of "GenuineIntel".
        let vendor_intel = vendor_ebx == 0x756E_6547;

        let (eax, _, _, _) = cpuid(1, 0);
        let model = (eax >> 4) & 0xF;
        let family = (eax >> 8) & 0xF;
        let extended_model = (eax >> 16) & 0xF;
        let extended_family = (eax >> 20) & 0xFF;

        let display_family = if family == 0xF {
            family + extended_family
        } else {
            family
        };
        let display_model = if family == 0x6 || family == 0xF {
            (extended_model << 4) + model
        } else {
            model
        };

        tracing::info!(
            "CPU: family {:#X}, model {:#X}, Intel: {}",
            display_family,
            display_model,
            vendor_intel
        );

        Platform {
            vendor_intel,
            family: display_family,
            model: display_model,
        }
    }

    fn is_model(&self, models: &[u32]) -> bool {
        self.vendor_intel && self.family == 6 && models.contains(&self.model)
    }

    /// Scope of the EPB hint: per-CPU on most parts, core-wide on
    /// Silvermont, package-wide on Westmere and Sandy Bridge.
    pub fn epb_scope(&self) -> ScopeUnit {
        if self.is_model(SILVERMONTS) {
            ScopeUnit::Core
        } else if self.is_model(WESTMERES) || self.is_model(SANDYBRIDGES) {
            ScopeUnit::Package
        } else {
            ScopeUnit::Cpu
        }
    }

    /// I/O scope of MSR_POWER_CTL knobs. On the listed server models the
    /// register is physically per-core, so package-scoped knobs can
    /// disagree between cores of one package.
    pub fn power_ctl_ioscope(&self) -> ScopeUnit {
        if self.is_model(POWER_CTL_PER_CORE) {
            ScopeUnit::Cpu
        } else {
            ScopeUnit::Package
        }
    }

    pub fn has_cstate_prewake(&self) -> bool {
        self.is_model(CSTATE_PREWAKE)
    }

    /// Bus clock frequency in Hz. 100 MHz on every model this crate
    /// covers (Sandy Bridge and later).
    pub fn bus_clock_hz(&self) -> f64 {
        100_000_000.0
    }
}

#[cfg(target_arch = "x86_64")]
fn cpuid(eax: u32, ecx: u32) -> (u32, u32, u32, u32) {
    let mut ebx: u32;
    let mut edx: u32;
    let mut eax_out = eax;
    let mut ecx_out = ecx;

    unsafe {
        std::arch::asm!(
            "mov {0:r}, rbx",
            "cpuid",
            "xchg {0:r}, rbx",
            out(reg) ebx,
            inout("eax") eax_out,
            inout("ecx") ecx_out,
            out("edx") edx,
            options(nostack, preserves_flags)
        );
    }

    (eax_out, ebx, ecx_out, edx)
}

#[cfg(not(target_arch = "x86_64"))]
fn cpuid(_eax: u32, _ecx: u32) -> (u32, u32, u32, u32) {
    (0, 0, 0, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intel(model: u32) -> Platform {
        Platform {
            vendor_intel: true,
            family: 6,
            model,
        }
    }

    #[test]
    fn test_epb_scope_overrides() {
        assert_eq!(intel(0x55).epb_scope(), ScopeUnit::Cpu);
        assert_eq!(intel(0x37).epb_scope(), ScopeUnit::Core);
        assert_eq!(intel(0x2A).epb_scope(), ScopeUnit::Package);
    }

    #[test]
    fn test_power_ctl_ioscope() {
        assert_eq!(intel(0x55).power_ctl_ioscope(), ScopeUnit::Cpu);
        assert_eq!(intel(0x9E).power_ctl_ioscope(), ScopeUnit::Package);
        // Non-Intel parts never get the per-core quirk.
        let amd = Platform {
            vendor_intel: false,
            family: 6,
            model: 0x55,
        };
        assert_eq!(amd.power_ctl_ioscope(), ScopeUnit::Package);
    }

    #[test]
    fn test_cstate_prewake_gating() {
        assert!(intel(0x6A).has_cstate_prewake());
        assert!(!intel(0x9E).has_cstate_prewake());
    }
}

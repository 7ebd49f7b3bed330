//! Static property declarations and platform overrides

use crate::platform::Platform;
use crate::props::{MechanismId, Property, PropertyId, ValueKind};
use crate::topology::ScopeUnit;

/// Fallback EPP policy-name to value map, used when the kernel does not
/// publish its own names. The values are platform-specific in principle;
/// these are the ones current platforms use.
pub const EPP_POLICIES: &[(&str, i64)] = &[
    ("performance", 0),
    ("balance_performance", 0x80),
    ("balance_power", 0xC0),
    ("power", 0xFF),
];

const NO_SPECIALS: &[(&str, i64)] = &[];

/// Build the descriptor table for `platform`.
///
/// Scope and support adjustments that depend on the CPU model are applied
/// here and nowhere else: EPB scope widens on Silvermont/Westmere/Sandy
/// Bridge parts, the MSR_POWER_CTL knobs get CPU I/O scope on models
/// where that register is physically per-core, and C-state prewake is
/// gated to models where it is known to work.
pub fn build(platform: &Platform) -> Vec<Property> {
    let epb_scope = platform.epb_scope();
    let power_ctl_ioscope = platform.power_ctl_ioscope();

    vec![
        Property {
            id: PropertyId::Turbo,
            name: "turbo",
            unit: None,
            kind: ValueKind::Bool,
            scope: ScopeUnit::Package,
            ioscope: ScopeUnit::Package,
            mechanisms: vec![MechanismId::Sysfs, MechanismId::Msr],
            writable: true,
            range: None,
            special_vals: NO_SPECIALS,
            verify: false,
            supported: true,
            subprops: &[],
        },
        Property {
            id: PropertyId::Epb,
            name: "Energy Performance Bias",
            unit: None,
            kind: ValueKind::Int,
            scope: epb_scope,
            ioscope: epb_scope,
            mechanisms: vec![MechanismId::Sysfs, MechanismId::Msr],
            writable: true,
            range: Some((0, 15)),
            special_vals: NO_SPECIALS,
            verify: false,
            supported: true,
            subprops: &[],
        },
        Property {
            id: PropertyId::Epp,
            name: "Energy Performance Preference",
            unit: None,
            kind: ValueKind::Int,
            scope: ScopeUnit::Cpu,
            ioscope: ScopeUnit::Cpu,
            mechanisms: vec![MechanismId::Sysfs, MechanismId::Msr],
            writable: true,
            range: Some((0, 255)),
            special_vals: EPP_POLICIES,
            verify: false,
            supported: true,
            subprops: &[PropertyId::EppPolicies],
        },
        Property {
            id: PropertyId::EppPolicies,
            name: "available EPP policies",
            unit: None,
            kind: ValueKind::Str,
            scope: ScopeUnit::Cpu,
            ioscope: ScopeUnit::Cpu,
            mechanisms: vec![MechanismId::Sysfs],
            writable: false,
            range: None,
            special_vals: NO_SPECIALS,
            verify: false,
            supported: true,
            subprops: &[],
        },
        Property {
            id: PropertyId::MinUncoreFreq,
            name: "minimum uncore frequency",
            unit: Some("Hz"),
            kind: ValueKind::Int,
            scope: ScopeUnit::Die,
            ioscope: ScopeUnit::Die,
            mechanisms: vec![MechanismId::Sysfs, MechanismId::Msr],
            writable: true,
            range: None,
            special_vals: NO_SPECIALS,
            verify: false,
            supported: true,
            subprops: &[],
        },
        Property {
            id: PropertyId::MaxUncoreFreq,
            name: "maximum uncore frequency",
            unit: Some("Hz"),
            kind: ValueKind::Int,
            scope: ScopeUnit::Die,
            ioscope: ScopeUnit::Die,
            mechanisms: vec![MechanismId::Sysfs, MechanismId::Msr],
            writable: true,
            range: None,
            special_vals: NO_SPECIALS,
            verify: false,
            supported: true,
            subprops: &[],
        },
        Property {
            id: PropertyId::C1eAutopromote,
            name: "C1E autopromote",
            unit: None,
            kind: ValueKind::Bool,
            scope: ScopeUnit::Package,
            ioscope: power_ctl_ioscope,
            mechanisms: vec![MechanismId::Msr],
            writable: true,
            range: None,
            special_vals: NO_SPECIALS,
            verify: true,
            supported: true,
            subprops: &[],
        },
        Property {
            id: PropertyId::CstatePrewake,
            name: "C-state prewake",
            unit: None,
            kind: ValueKind::Bool,
            scope: ScopeUnit::Package,
            ioscope: power_ctl_ioscope,
            mechanisms: vec![MechanismId::Msr],
            writable: true,
            range: None,
            special_vals: NO_SPECIALS,
            verify: true,
            supported: platform.has_cstate_prewake(),
            subprops: &[],
        },
        Property {
            id: PropertyId::BusClock,
            name: "bus clock frequency",
            unit: Some("Hz"),
            kind: ValueKind::Float,
            scope: ScopeUnit::Package,
            ioscope: ScopeUnit::Package,
            mechanisms: vec![MechanismId::Doc],
            writable: false,
            range: None,
            special_vals: NO_SPECIALS,
            verify: false,
            supported: true,
            subprops: &[],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_overrides() {
        let skx = Platform {
            vendor_intel: true,
            family: 6,
            model: 0x55,
        };
        let props = build(&skx);

        let c1e = props
            .iter()
            .find(|p| p.id == PropertyId::C1eAutopromote)
            .unwrap();
        assert_eq!(c1e.scope, ScopeUnit::Package);
        assert_eq!(c1e.ioscope, ScopeUnit::Cpu, "POWER_CTL per-core on SKX");

        let snb = Platform {
            vendor_intel: true,
            family: 6,
            model: 0x2A,
        };
        let props = build(&snb);
        let epb = props.iter().find(|p| p.id == PropertyId::Epb).unwrap();
        assert_eq!(epb.scope, ScopeUnit::Package);
        let prewake = props
            .iter()
            .find(|p| p.id == PropertyId::CstatePrewake)
            .unwrap();
        assert!(!prewake.supported);
    }
}

//! Property model: identifiers, values, descriptors and the registry
//!
//! A property is a named, typed, host-configurable power-management
//! setting. The registry is a closed descriptor table assembled once at
//! construction from the static declarations in [`table`] plus
//! platform-detection overrides; there is no runtime property
//! registration.

pub mod table;

use std::fmt;

use crate::error::{PwrknobError, Result};
use crate::knob_enum;
use crate::platform::Platform;
use crate::topology::ScopeUnit;

knob_enum! {
    /// Every property pwrknob knows about.
    pub enum PropertyId {
        /// Turbo boost enabled.
        Turbo => "turbo",
        /// Energy Performance Bias hint, 0 (performance) to 15 (energy).
        Epb => "epb",
        /// Energy Performance Preference, 0 (performance) to 255 (energy).
        Epp => "epp",
        /// Names of the EPP policies the kernel accepts. Read-only
        /// sub-property of `epp`.
        EppPolicies => "epp_policies",
        /// Minimum uncore frequency limit, Hz.
        MinUncoreFreq => "min_uncore_freq",
        /// Maximum uncore frequency limit, Hz.
        MaxUncoreFreq => "max_uncore_freq",
        /// Convert all C1 idle requests to C1E.
        C1eAutopromote => "c1e_autopromote",
        /// Start exiting C6 before the next local APIC timer event.
        CstatePrewake => "cstate_prewake",
        /// Bus clock frequency, Hz. Documentation-derived constant.
        BusClock => "bus_clock",
    }
}

knob_enum! {
    /// A concrete channel for reading or writing a property.
    pub enum MechanismId {
        Sysfs => "sysfs",
        Msr => "msr",
        Doc => "doc",
    }
}

impl MechanismId {
    pub fn describe(&self) -> &'static str {
        match self {
            MechanismId::Sysfs => "Linux sysfs file-system",
            MechanismId::Msr => "Model Specific Register (MSR)",
            MechanismId::Doc => "hardware documentation",
        }
    }

    /// Some mechanisms are inherently read-only: a documentation-derived
    /// constant has nothing to write to.
    pub fn is_writable(&self) -> bool {
        !matches!(self, MechanismId::Doc)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Bool,
    Int,
    Float,
    Str,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Canonical boolean form.
            PropertyValue::Bool(true) => write!(f, "on"),
            PropertyValue::Bool(false) => write!(f, "off"),
            PropertyValue::Int(v) => write!(f, "{v}"),
            PropertyValue::Float(v) => write!(f, "{v}"),
            PropertyValue::Str(v) => write!(f, "{v}"),
        }
    }
}

/// The topology target of a get/set result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Cpu(u32),
    Die { package: u32, die: u32 },
    Package(u32),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Cpu(cpu) => write!(f, "CPU {cpu}"),
            Target::Die { package, die } => write!(f, "package {package} die {die}"),
            Target::Package(package) => write!(f, "package {package}"),
        }
    }
}

/// The result of one get or set: which target, which property, the value
/// (absent when no mechanism supports the property there) and the
/// mechanism that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueRecord {
    pub target: Target,
    pub property: PropertyId,
    pub value: Option<PropertyValue>,
    pub mechanism: Option<MechanismId>,
}

impl ValueRecord {
    pub fn is_supported(&self) -> bool {
        self.value.is_some()
    }
}

/// Static description of one property.
#[derive(Debug, Clone)]
pub struct Property {
    pub id: PropertyId,
    /// Display name for diagnostics, e.g. "Energy Performance Bias".
    pub name: &'static str,
    pub unit: Option<&'static str>,
    pub kind: ValueKind,
    /// The coarsest unit at which the value is logically uniform.
    pub scope: ScopeUnit,
    /// The unit at which the mechanisms physically read/write. Never
    /// coarser than `scope`; finer means the I/O-scope reconciler runs on
    /// die/package reads.
    pub ioscope: ScopeUnit,
    /// Mechanisms in default trial order.
    pub mechanisms: Vec<MechanismId>,
    pub writable: bool,
    /// Inclusive numeric domain for int-kind properties.
    pub range: Option<(i64, i64)>,
    /// Named input values mapped to numbers, e.g. EPP policy names.
    pub special_vals: &'static [(&'static str, i64)],
    /// Read back register writes and fail on mismatch.
    pub verify: bool,
    /// False when platform detection has ruled the property out entirely.
    pub supported: bool,
    /// Read-only sub-properties that only make sense while this property
    /// is supported.
    pub subprops: &'static [PropertyId],
}

/// The closed property-descriptor table.
pub struct Registry {
    props: Vec<Property>,
}

impl Registry {
    /// Assemble the registry for `platform`. Static declarations first,
    /// then platform overrides (see [`table`]).
    pub fn new(platform: &Platform) -> Self {
        let props = table::build(platform);
        debug_assert!(props.iter().all(|p| p.ioscope <= p.scope));
        debug_assert_eq!(props.len(), PropertyId::all().len());
        Self { props }
    }

    pub fn get(&self, id: PropertyId) -> &Property {
        self.props
            .iter()
            .find(|p| p.id == id)
            .expect("registry covers every property id")
    }

    /// Look a property up by its user-facing name.
    pub fn resolve(&self, name: &str) -> Result<&Property> {
        match PropertyId::from_name(name) {
            Some(id) => Ok(self.get(id)),
            None => Err(PwrknobError::UnknownProperty {
                name: name.to_string(),
                known: PropertyId::all()
                    .iter()
                    .map(|id| id.name())
                    .collect::<Vec<_>>()
                    .join(", "),
            }),
        }
    }

    pub fn properties(&self) -> &[Property] {
        &self.props
    }

    /// Mechanisms that at least one property supports.
    pub fn mechanisms(&self) -> Vec<MechanismId> {
        MechanismId::all()
            .into_iter()
            .filter(|m| self.props.iter().any(|p| p.mechanisms.contains(m)))
            .collect()
    }

    /// Validate and normalize a mechanism list for `prop`.
    ///
    /// `None` means "the property's declared order". Explicit lists are
    /// deduplicated preserving order, and each entry must be declared for
    /// the property. With `require_writable`, read-only mechanisms are
    /// rejected rather than skipped, so a caller asking to write through
    /// `doc` gets a clear error instead of silent fallback.
    pub fn normalize_mechanisms(
        &self,
        prop: &Property,
        mechanisms: Option<&[MechanismId]>,
        require_writable: bool,
    ) -> Result<Vec<MechanismId>> {
        let supported = || {
            prop.mechanisms
                .iter()
                .map(|m| m.name())
                .collect::<Vec<_>>()
                .join(", ")
        };

        let mut out = Vec::new();
        match mechanisms {
            None => {
                for &mech in &prop.mechanisms {
                    if require_writable && !mech.is_writable() {
                        continue;
                    }
                    out.push(mech);
                }
                if require_writable && out.is_empty() {
                    // Every declared mechanism is read-only.
                    return Err(PwrknobError::ReadOnlyProperty { prop: prop.name });
                }
            }
            Some(list) => {
                for &mech in list {
                    if !prop.mechanisms.contains(&mech) {
                        return Err(PwrknobError::UnsupportedMechanism {
                            prop: prop.name,
                            mechanism: mech.name(),
                            supported: supported(),
                        });
                    }
                    if require_writable && !mech.is_writable() {
                        return Err(PwrknobError::ReadOnlyMechanism {
                            prop: prop.name,
                            mechanism: mech.name(),
                        });
                    }
                    if !out.contains(&mech) {
                        out.push(mech);
                    }
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Registry {
        Registry::new(&Platform {
            vendor_intel: true,
            family: 6,
            model: 0x55,
        })
    }

    #[test]
    fn test_resolve() {
        let reg = registry();
        assert_eq!(reg.resolve("epb").unwrap().id, PropertyId::Epb);

        let err = reg.resolve("no_such_knob").unwrap_err();
        match err {
            PwrknobError::UnknownProperty { name, known } => {
                assert_eq!(name, "no_such_knob");
                assert!(known.contains("turbo"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_registry_invariants() {
        let reg = registry();
        for prop in reg.properties() {
            assert!(
                prop.ioscope <= prop.scope,
                "{}: I/O scope coarser than scope",
                prop.name
            );
            assert!(!prop.mechanisms.is_empty(), "{}: no mechanisms", prop.name);
        }
        // Subproperties are read-only.
        for prop in reg.properties() {
            for &sub in prop.subprops {
                assert!(!reg.get(sub).writable);
            }
        }
    }

    #[test]
    fn test_normalize_mechanisms() {
        let reg = registry();
        let turbo = reg.get(PropertyId::Turbo);

        assert_eq!(
            reg.normalize_mechanisms(turbo, None, false).unwrap(),
            vec![MechanismId::Sysfs, MechanismId::Msr]
        );
        assert_eq!(
            reg.normalize_mechanisms(turbo, Some(&[MechanismId::Msr, MechanismId::Msr]), true)
                .unwrap(),
            vec![MechanismId::Msr]
        );

        let err = reg
            .normalize_mechanisms(turbo, Some(&[MechanismId::Doc]), false)
            .unwrap_err();
        assert!(matches!(err, PwrknobError::UnsupportedMechanism { .. }));

        let bclk = reg.get(PropertyId::BusClock);
        let err = reg
            .normalize_mechanisms(bclk, Some(&[MechanismId::Doc]), true)
            .unwrap_err();
        assert!(matches!(err, PwrknobError::ReadOnlyMechanism { .. }));
    }

    #[test]
    fn test_bool_canonical_display() {
        assert_eq!(PropertyValue::Bool(true).to_string(), "on");
        assert_eq!(PropertyValue::Bool(false).to_string(), "off");
    }
}

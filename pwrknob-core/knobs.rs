//! The property-access framework
//!
//! [`PowerKnobs`] resolves a named, typed, scope-aware property to a
//! concrete value by trying the property's mechanisms in order, validates
//! that the requested topology target covers the property's scope,
//! reconciles properties whose physical access granularity is finer than
//! their logical scope, caches read results, and batches register writes
//! into grouped transactions.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use pwrknob_raw::register::Bits;
use pwrknob_raw::regs::{
    energy_perf_bias, hwp_request, misc_enable, power_ctl, uncore_ratio_limit,
};

use crate::cache::PropsCache;
use crate::error::{PwrknobError, Result};
use crate::hostfs::{HostFs, LocalHostFs};
use crate::human;
use crate::msr::{Msr, MsrIo, RegisterIo};
use crate::platform::Platform;
use crate::props::{
    MechanismId, Property, PropertyId, PropertyValue, Registry, Target, ValueKind, ValueRecord,
};
use crate::topology::{ScopeUnit, TargetSpec, Topology};

const SYSFS_CPU: &str = "/sys/devices/system/cpu";

pub struct PowerKnobsBuilder {
    fs: Option<Arc<dyn HostFs>>,
    register_io: Option<Arc<dyn RegisterIo>>,
    topology: Option<Topology>,
    platform: Option<Platform>,
    enable_cache: bool,
}

impl PowerKnobsBuilder {
    pub fn new() -> Self {
        Self {
            fs: None,
            register_io: None,
            topology: None,
            platform: None,
            enable_cache: true,
        }
    }

    /// Substitute the host file-system accessor. Caller-supplied
    /// accessors are shared; the framework never tears them down.
    pub fn host_fs(mut self, fs: Arc<dyn HostFs>) -> Self {
        self.fs = Some(fs);
        self
    }

    /// Substitute the register backend used when the MSR accessor is
    /// first needed.
    pub fn register_io(mut self, io: Arc<dyn RegisterIo>) -> Self {
        self.register_io = Some(io);
        self
    }

    pub fn topology(mut self, topology: Topology) -> Self {
        self.topology = Some(topology);
        self
    }

    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Disable result caching, making every get a direct passthrough.
    pub fn enable_cache(mut self, enable: bool) -> Self {
        self.enable_cache = enable;
        self
    }

    pub fn build(self) -> Result<PowerKnobs> {
        let fs = self.fs.unwrap_or_else(|| Arc::new(LocalHostFs));
        let topology = match self.topology {
            Some(topology) => topology,
            None => Topology::detect(fs.as_ref())?,
        };
        let platform = self.platform.unwrap_or_else(Platform::host);

        Ok(PowerKnobs {
            registry: Registry::new(&platform),
            fs,
            topology,
            platform,
            cache: PropsCache::new(self.enable_cache),
            caller_register_io: self.register_io,
            msr: None,
        })
    }
}

impl Default for PowerKnobsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct PowerKnobs {
    fs: Arc<dyn HostFs>,
    topology: Topology,
    registry: Registry,
    platform: Platform,
    cache: PropsCache,
    /// Caller-supplied register backend, shared and never torn down here.
    caller_register_io: Option<Arc<dyn RegisterIo>>,
    /// Framework-owned MSR accessor, constructed on first use and dropped
    /// with the instance.
    msr: Option<Msr>,
}

impl PowerKnobs {
    pub fn builder() -> PowerKnobsBuilder {
        PowerKnobsBuilder::new()
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn msr_mut(&mut self) -> &mut Msr {
        if self.msr.is_none() {
            let io = self
                .caller_register_io
                .clone()
                .unwrap_or_else(|| Arc::new(MsrIo::new()));
            self.msr = Some(Msr::new(io));
        }
        self.msr.as_mut().expect("initialized above")
    }

    /// Open a register-write transaction: subsequent register-backed
    /// writes buffer until [`Self::commit_transaction`].
    pub fn start_transaction(&mut self) -> Result<()> {
        self.msr_mut().start_transaction()
    }

    pub fn commit_transaction(&mut self) -> Result<()> {
        self.msr_mut().commit_transaction()
    }

    // ---------------------------------------------------------------- //
    // Per-CPU access.
    // ---------------------------------------------------------------- //

    /// Read a property for every CPU in `cpus`.
    ///
    /// Mechanisms are tried in the given (or property-declared) order;
    /// the first one producing a value wins and tags the record. A CPU
    /// where no mechanism produces a value yields a record with an absent
    /// value, not an error.
    pub fn get_prop_cpus(
        &mut self,
        id: PropertyId,
        cpus: &TargetSpec,
        mechanisms: Option<&[MechanismId]>,
    ) -> Result<Vec<ValueRecord>> {
        let prop = self.registry.get(id).clone();
        let mnames = self.registry.normalize_mechanisms(&prop, mechanisms, false)?;
        let cpus = self.topology.normalize_cpus(cpus, false)?;

        let mut records = Vec::with_capacity(cpus.len());
        for cpu in cpus {
            let record = self.get_cpu_record(&prop, cpu, &mnames)?;
            tracing::debug!(
                "'{}' is '{}' for CPU {cpu} via '{}'",
                id.name(),
                record
                    .value
                    .as_ref()
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "unsupported".to_string()),
                record
                    .mechanism
                    .map(|m| m.name())
                    .unwrap_or("none"),
            );
            records.push(record);
        }
        Ok(records)
    }

    /// Single-CPU form of [`Self::get_prop_cpus`].
    pub fn get_cpu_prop(
        &mut self,
        id: PropertyId,
        cpu: u32,
        mechanisms: Option<&[MechanismId]>,
    ) -> Result<ValueRecord> {
        let mut records = self.get_prop_cpus(id, &TargetSpec::List(vec![cpu]), mechanisms)?;
        Ok(records.remove(0))
    }

    pub fn is_supported_cpu(&mut self, id: PropertyId, cpu: u32) -> Result<bool> {
        Ok(self.get_cpu_prop(id, cpu, None)?.is_supported())
    }

    /// Set a property for every CPU in `cpus`. Returns the mechanism that
    /// performed the final write.
    ///
    /// The input value is normalized first: boolean synonyms, named
    /// special values, SI-prefixed units and domain validation. The CPU
    /// set must cover whole scope units of the property.
    pub fn set_prop_cpus(
        &mut self,
        id: PropertyId,
        value: &str,
        cpus: &TargetSpec,
        mechanisms: Option<&[MechanismId]>,
    ) -> Result<MechanismId> {
        let prop = self.registry.get(id).clone();
        let mnames = self.registry.normalize_mechanisms(&prop, mechanisms, true)?;
        let value = self.normalize_input(&prop, value)?;
        let cpus = self.topology.normalize_cpus(cpus, false)?;
        self.validate_cpus_vs_scope(&prop, &cpus)?;

        let mut used = None;
        for &cpu in &cpus {
            used = Some(self.set_cpu_value(&prop, &value, cpu, &mnames)?);
        }
        used.ok_or_else(|| PwrknobError::InvalidTarget("no CPUs targeted".to_string()))
    }

    // ---------------------------------------------------------------- //
    // Per-die and per-package access.
    //
    // Thin adapters over the per-CPU path: they validate the access
    // level against the property scope, pick one representative CPU per
    // unit, and invoke the I/O-scope reconciler when the property's
    // physical granularity is finer than its scope.
    // ---------------------------------------------------------------- //

    pub fn get_die_prop(
        &mut self,
        id: PropertyId,
        package: u32,
        die: u32,
        mechanisms: Option<&[MechanismId]>,
    ) -> Result<ValueRecord> {
        let prop = self.registry.get(id).clone();
        let mnames = self.registry.normalize_mechanisms(&prop, mechanisms, false)?;
        self.validate_cross_scope(&prop, ScopeUnit::Die)?;
        self.topology
            .normalize_dies(package, &TargetSpec::List(vec![die]))?;

        let cpus = self.topology.die_cpus(package, die);
        let target = Target::Die { package, die };
        self.read_unit(&prop, target, &cpus, &mnames)
    }

    pub fn get_prop_dies(
        &mut self,
        id: PropertyId,
        dies: &[(u32, u32)],
        mechanisms: Option<&[MechanismId]>,
    ) -> Result<Vec<ValueRecord>> {
        dies.iter()
            .map(|&(package, die)| self.get_die_prop(id, package, die, mechanisms))
            .collect()
    }

    pub fn get_package_prop(
        &mut self,
        id: PropertyId,
        package: u32,
        mechanisms: Option<&[MechanismId]>,
    ) -> Result<ValueRecord> {
        let prop = self.registry.get(id).clone();
        let mnames = self.registry.normalize_mechanisms(&prop, mechanisms, false)?;
        self.validate_cross_scope(&prop, ScopeUnit::Package)?;
        self.topology
            .normalize_packages(&TargetSpec::List(vec![package]))?;

        let cpus = self.topology.package_cpus(package);
        let target = Target::Package(package);
        self.read_unit(&prop, target, &cpus, &mnames)
    }

    pub fn get_prop_packages(
        &mut self,
        id: PropertyId,
        packages: &TargetSpec,
        mechanisms: Option<&[MechanismId]>,
    ) -> Result<Vec<ValueRecord>> {
        let packages = self.topology.normalize_packages(packages)?;
        packages
            .into_iter()
            .map(|package| self.get_package_prop(id, package, mechanisms))
            .collect()
    }

    pub fn set_die_prop(
        &mut self,
        id: PropertyId,
        value: &str,
        package: u32,
        die: u32,
        mechanisms: Option<&[MechanismId]>,
    ) -> Result<MechanismId> {
        let prop = self.registry.get(id).clone();
        let mnames = self.registry.normalize_mechanisms(&prop, mechanisms, true)?;
        self.validate_cross_scope(&prop, ScopeUnit::Die)?;
        self.topology
            .normalize_dies(package, &TargetSpec::List(vec![die]))?;
        let value = self.normalize_input(&prop, value)?;

        let cpus = self.topology.die_cpus(package, die);
        self.write_unit(&prop, &value, &cpus, &mnames)
    }

    pub fn set_package_prop(
        &mut self,
        id: PropertyId,
        value: &str,
        package: u32,
        mechanisms: Option<&[MechanismId]>,
    ) -> Result<MechanismId> {
        let prop = self.registry.get(id).clone();
        let mnames = self.registry.normalize_mechanisms(&prop, mechanisms, true)?;
        self.validate_cross_scope(&prop, ScopeUnit::Package)?;
        self.topology
            .normalize_packages(&TargetSpec::List(vec![package]))?;
        let value = self.normalize_input(&prop, value)?;

        let cpus = self.topology.package_cpus(package);
        self.write_unit(&prop, &value, &cpus, &mnames)
    }

    pub fn set_prop_dies(
        &mut self,
        id: PropertyId,
        value: &str,
        dies: &[(u32, u32)],
        mechanisms: Option<&[MechanismId]>,
    ) -> Result<MechanismId> {
        let mut used = None;
        for &(package, die) in dies {
            used = Some(self.set_die_prop(id, value, package, die, mechanisms)?);
        }
        used.ok_or_else(|| PwrknobError::InvalidTarget("no dies targeted".to_string()))
    }

    pub fn set_prop_packages(
        &mut self,
        id: PropertyId,
        value: &str,
        packages: &TargetSpec,
        mechanisms: Option<&[MechanismId]>,
    ) -> Result<MechanismId> {
        let packages = self.topology.normalize_packages(packages)?;
        let mut used = None;
        for package in packages {
            used = Some(self.set_package_prop(id, value, package, mechanisms)?);
        }
        used.ok_or_else(|| PwrknobError::InvalidTarget("no packages targeted".to_string()))
    }

    fn read_unit(
        &mut self,
        prop: &Property,
        target: Target,
        cpus: &[u32],
        mnames: &[MechanismId],
    ) -> Result<ValueRecord> {
        if prop.ioscope < prop.scope {
            self.reconcile_unit(prop, target, cpus, mnames)?;
        }

        let record = self.get_cpu_record(prop, cpus[0], mnames)?;
        Ok(ValueRecord {
            target,
            property: prop.id,
            value: record.value,
            mechanism: record.mechanism,
        })
    }

    fn write_unit(
        &mut self,
        prop: &Property,
        value: &PropertyValue,
        cpus: &[u32],
        mnames: &[MechanismId],
    ) -> Result<MechanismId> {
        // With I/O scope finer than scope, one representative write would
        // leave the other CPUs' registers stale; hit every CPU backing
        // the unit instead.
        let targets: &[u32] = if prop.ioscope < prop.scope {
            cpus
        } else {
            &cpus[..1]
        };

        let mut used = None;
        for &cpu in targets {
            used = Some(self.set_cpu_value(prop, value, cpu, mnames)?);
        }
        used.ok_or_else(|| PwrknobError::InvalidTarget("no CPUs targeted".to_string()))
    }

    // ---------------------------------------------------------------- //
    // Scope validation.
    // ---------------------------------------------------------------- //

    fn validate_cpus_vs_scope(&self, prop: &Property, cpus: &[u32]) -> Result<()> {
        match prop.scope {
            ScopeUnit::Cpu => Ok(()),
            ScopeUnit::Global => {
                let missing: Vec<u32> = self
                    .topology
                    .cpus()
                    .into_iter()
                    .filter(|cpu| !cpus.contains(cpu))
                    .collect();
                if missing.is_empty() {
                    return Ok(());
                }
                Err(PwrknobError::ScopeViolation(format!(
                    "{} has global scope, so the list of CPUs must include all CPUs.\n\
                     The following CPUs are missing from the list: {}",
                    prop.name,
                    human::rangify(&missing)
                )))
            }
            level => {
                let (_, leftover) = self.topology.partition(cpus, level);
                if leftover.is_empty() {
                    return Ok(());
                }
                Err(PwrknobError::ScopeViolation(
                    self.scope_violation_message(prop, level, &leftover),
                ))
            }
        }
    }

    /// Build the per-package unit-boundary listing that makes a scope
    /// violation diagnosable from the error text alone.
    fn scope_violation_message(
        &self,
        prop: &Property,
        level: ScopeUnit,
        leftover: &[u32],
    ) -> String {
        let sname = level.name();
        let mut mapping = String::new();

        for package in self.topology.packages() {
            let pkg_cpus = self.topology.package_cpus(package);
            mapping += &format!(
                "\n  * package {package}: CPUs: {}",
                human::rangify(&pkg_cpus)
            );

            if matches!(level, ScopeUnit::Die | ScopeUnit::Core) {
                let units = match level {
                    ScopeUnit::Die => self.topology.package_dies(package),
                    _ => self.topology.package_cores(package),
                };
                mapping += &format!("\n    {sname}s: {}", human::rangify(&units));

                let members: Vec<String> = units
                    .iter()
                    .map(|&unit| {
                        let unit_cpus = match level {
                            ScopeUnit::Die => self.topology.die_cpus(package, unit),
                            _ => self.topology.core_cpus(package, unit),
                        };
                        format!("{unit}:{}", human::rangify(&unit_cpus))
                    })
                    .collect();
                mapping += &format!("\n    {sname}s to CPUs: {}", members.join(", "));
            }
        }

        format!(
            "{} has {sname} scope, so the list of CPUs must include all CPUs \
             in one or multiple {sname}s.\n\
             The following CPUs do not comprise full {sname}(s): {}\n\
             Relation between CPUs and {sname}s:{mapping}",
            prop.name,
            human::rangify(leftover)
        )
    }

    /// Die-level access is permitted for die/package/global-scoped
    /// properties, package-level only for package/global. With exactly
    /// one die per package the two levels are interchangeable.
    fn validate_cross_scope(&self, prop: &Property, level: ScopeUnit) -> Result<()> {
        let mut ok_scopes = match level {
            ScopeUnit::Die => vec![ScopeUnit::Die, ScopeUnit::Package, ScopeUnit::Global],
            ScopeUnit::Package => vec![ScopeUnit::Package, ScopeUnit::Global],
            _ => return Ok(()),
        };

        if self.topology.one_die_per_package() && !ok_scopes.contains(&ScopeUnit::Die) {
            ok_scopes.push(ScopeUnit::Die);
        }

        if ok_scopes.contains(&prop.scope) {
            return Ok(());
        }

        let snames: Vec<&str> = ok_scopes.iter().map(|s| s.name()).collect();
        Err(PwrknobError::ScopeViolation(format!(
            "cannot access {} on per-{} basis because it has {} scope.\n\
             Per-{} access is only allowed for properties with the following \
             scopes: {}",
            prop.name,
            level.name(),
            prop.scope.name(),
            level.name(),
            snames.join(", ")
        )))
    }

    /// Verify that every CPU of a die/package agrees on the property
    /// value. Only runs for properties whose I/O scope is finer than
    /// their scope; disagreement means a misconfigured state the
    /// framework refuses to paper over.
    fn reconcile_unit(
        &mut self,
        prop: &Property,
        target: Target,
        cpus: &[u32],
        mnames: &[MechanismId],
    ) -> Result<()> {
        let mut observed: Vec<(u32, Option<PropertyValue>)> = Vec::with_capacity(cpus.len());
        for &cpu in cpus {
            let record = self.get_cpu_record(prop, cpu, mnames)?;
            observed.push((cpu, record.value));
        }

        let all_same = observed.windows(2).all(|w| w[0].1 == w[1].1);
        if all_same {
            return Ok(());
        }

        let disagreeing = observed
            .iter()
            .find(|(_, v)| *v != observed[0].1)
            .expect("a disagreeing CPU exists");

        let describe = |v: &Option<PropertyValue>| match v {
            Some(v) => format!("'{v}'"),
            None => "no value".to_string(),
        };
        let details = format!(
            "CPU {} has {} but CPU {} has {}, even though both are in the same {}",
            observed[0].0,
            describe(&observed[0].1),
            disagreeing.0,
            describe(&disagreeing.1),
            match target {
                Target::Die { .. } => "die",
                _ => "package",
            },
        );

        Err(PwrknobError::AmbiguousScope {
            prop: prop.name,
            unit: target.to_string(),
            scope: prop.scope.name(),
            ioscope: prop.ioscope.name(),
            details,
            pairs: observed
                .into_iter()
                .filter_map(|(cpu, v)| v.map(|v| (cpu, v)))
                .collect(),
        })
    }

    // ---------------------------------------------------------------- //
    // Mechanism resolution.
    // ---------------------------------------------------------------- //

    fn get_cpu_record(
        &mut self,
        prop: &Property,
        cpu: u32,
        mnames: &[MechanismId],
    ) -> Result<ValueRecord> {
        for &mech in mnames {
            if let Some(value) = self.cache.get(prop.id, cpu, mech) {
                return Ok(ValueRecord {
                    target: Target::Cpu(cpu),
                    property: prop.id,
                    value: Some(value),
                    mechanism: Some(mech),
                });
            }

            if let Some(value) = self.read_prop_mech(prop, cpu, mech)? {
                let value = self.cache.add(prop.id, cpu, mech, value);
                return Ok(ValueRecord {
                    target: Target::Cpu(cpu),
                    property: prop.id,
                    value: Some(value),
                    mechanism: Some(mech),
                });
            }
        }

        Ok(ValueRecord {
            target: Target::Cpu(cpu),
            property: prop.id,
            value: None,
            mechanism: None,
        })
    }

    /// Write through the first mechanism that is present on this host.
    /// Only "not found" class failures fall through to the next
    /// mechanism; permission or hardware-level failures propagate.
    fn set_cpu_value(
        &mut self,
        prop: &Property,
        value: &PropertyValue,
        cpu: u32,
        mnames: &[MechanismId],
    ) -> Result<MechanismId> {
        let mut last_not_found = None;

        for &mech in mnames {
            // Invalidate before the write so no stale read is observable
            // even if the write fails halfway.
            self.cache.remove(prop.id, cpu);

            match self.write_prop_mech(prop, cpu, mech, value) {
                Ok(()) => {
                    self.cache.add(prop.id, cpu, mech, value.clone());
                    tracing::debug!(
                        "set '{}' to '{value}' for CPU {cpu} via '{}'",
                        prop.id.name(),
                        mech.name()
                    );
                    return Ok(mech);
                }
                Err(err) if err.is_not_found() => {
                    tracing::debug!(
                        "'{}' not writable via '{}' for CPU {cpu}, trying next: {err}",
                        prop.id.name(),
                        mech.name()
                    );
                    last_not_found = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_not_found.unwrap_or_else(|| PwrknobError::NotSupported {
            what: prop.name.to_string(),
        }))
    }

    // ---------------------------------------------------------------- //
    // Per-mechanism readers and writers. The closed dispatch table: one
    // arm per declared (property, mechanism) pair.
    // ---------------------------------------------------------------- //

    fn read_prop_mech(
        &mut self,
        prop: &Property,
        cpu: u32,
        mech: MechanismId,
    ) -> Result<Option<PropertyValue>> {
        if !prop.supported {
            return Ok(None);
        }

        match (prop.id, mech) {
            (PropertyId::Turbo, MechanismId::Sysfs) => {
                Ok(self
                    .read_sysfs(&turbo_sysfs_path())?
                    .and_then(|s| s.parse::<u8>().ok())
                    .map(|no_turbo| PropertyValue::Bool(no_turbo == 0)))
            }
            (PropertyId::Turbo, MechanismId::Msr) => Ok(self
                .msr_read_bits(misc_enable::ADDR, misc_enable::TURBO_DISABLE_BITS, cpu)?
                .map(|disabled| PropertyValue::Bool(disabled == 0))),

            (PropertyId::Epb, MechanismId::Sysfs) => Ok(self
                .read_sysfs(&epb_sysfs_path(cpu))?
                .and_then(|s| s.parse::<i64>().ok())
                .map(PropertyValue::Int)),
            (PropertyId::Epb, MechanismId::Msr) => Ok(self
                .msr_read_bits(energy_perf_bias::ADDR, energy_perf_bias::EPB_BITS, cpu)?
                .map(|v| PropertyValue::Int(v as i64))),

            (PropertyId::Epp, MechanismId::Sysfs) => {
                match self.read_sysfs(&epp_sysfs_path(cpu))? {
                    None => Ok(None),
                    Some(text) => Ok(Some(self.parse_epp_text(prop, &text)?)),
                }
            }
            (PropertyId::Epp, MechanismId::Msr) => Ok(self
                .msr_read_bits(hwp_request::ADDR, hwp_request::EPP_BITS, cpu)?
                .map(|v| PropertyValue::Int(v as i64))),

            (PropertyId::EppPolicies, MechanismId::Sysfs) => Ok(self
                .read_sysfs(&epp_policies_sysfs_path(cpu))?
                .map(PropertyValue::Str)),

            (PropertyId::MinUncoreFreq, MechanismId::Sysfs) => {
                self.read_uncore_sysfs(cpu, "min_freq_khz")
            }
            (PropertyId::MaxUncoreFreq, MechanismId::Sysfs) => {
                self.read_uncore_sysfs(cpu, "max_freq_khz")
            }
            (PropertyId::MinUncoreFreq, MechanismId::Msr) => {
                self.read_uncore_msr(cpu, uncore_ratio_limit::MIN_RATIO_BITS)
            }
            (PropertyId::MaxUncoreFreq, MechanismId::Msr) => {
                self.read_uncore_msr(cpu, uncore_ratio_limit::MAX_RATIO_BITS)
            }

            (PropertyId::C1eAutopromote, MechanismId::Msr) => Ok(self
                .msr_read_bits(power_ctl::ADDR, power_ctl::C1E_AUTOPROMOTE_BITS, cpu)?
                .map(|v| PropertyValue::Bool(v != 0))),
            (PropertyId::CstatePrewake, MechanismId::Msr) => Ok(self
                .msr_read_bits(power_ctl::ADDR, power_ctl::CSTATE_PREWAKE_DISABLE_BITS, cpu)?
                .map(|v| PropertyValue::Bool(v == 0))),

            (PropertyId::BusClock, MechanismId::Doc) => {
                Ok(Some(PropertyValue::Float(self.platform.bus_clock_hz())))
            }

            _ => Ok(None),
        }
    }

    fn write_prop_mech(
        &mut self,
        prop: &Property,
        cpu: u32,
        mech: MechanismId,
        value: &PropertyValue,
    ) -> Result<()> {
        if !prop.supported {
            return Err(PwrknobError::NotSupported {
                what: prop.name.to_string(),
            });
        }

        match (prop.id, mech) {
            (PropertyId::Turbo, MechanismId::Sysfs) => {
                let no_turbo = if value_as_bool(prop, value)? { "0" } else { "1" };
                self.fs.write(&turbo_sysfs_path(), no_turbo)
            }
            (PropertyId::Turbo, MechanismId::Msr) => {
                let disable = !value_as_bool(prop, value)? as u64;
                self.msr_mut().write_bits(
                    misc_enable::ADDR,
                    misc_enable::TURBO_DISABLE_BITS,
                    disable,
                    cpu,
                    prop.verify,
                )
            }

            (PropertyId::Epb, MechanismId::Sysfs) => {
                let epb = value_as_int(prop, value)?;
                self.fs.write(&epb_sysfs_path(cpu), &epb.to_string())
            }
            (PropertyId::Epb, MechanismId::Msr) => {
                let epb = value_as_int(prop, value)? as u64;
                self.msr_mut().write_bits(
                    energy_perf_bias::ADDR,
                    energy_perf_bias::EPB_BITS,
                    epb,
                    cpu,
                    prop.verify,
                )
            }

            (PropertyId::Epp, MechanismId::Sysfs) => {
                let epp = value_as_int(prop, value)?;
                self.fs.write(&epp_sysfs_path(cpu), &epp.to_string())
            }
            (PropertyId::Epp, MechanismId::Msr) => {
                let epp = value_as_int(prop, value)? as u64;
                self.msr_mut().write_bits(
                    hwp_request::ADDR,
                    hwp_request::EPP_BITS,
                    epp,
                    cpu,
                    prop.verify,
                )
            }

            (PropertyId::MinUncoreFreq, MechanismId::Sysfs) => {
                self.write_uncore_sysfs(cpu, "min_freq_khz", value_as_int(prop, value)?)
            }
            (PropertyId::MaxUncoreFreq, MechanismId::Sysfs) => {
                self.write_uncore_sysfs(cpu, "max_freq_khz", value_as_int(prop, value)?)
            }
            (PropertyId::MinUncoreFreq, MechanismId::Msr) => self.write_uncore_msr(
                prop,
                cpu,
                uncore_ratio_limit::MIN_RATIO_BITS,
                value_as_int(prop, value)?,
            ),
            (PropertyId::MaxUncoreFreq, MechanismId::Msr) => self.write_uncore_msr(
                prop,
                cpu,
                uncore_ratio_limit::MAX_RATIO_BITS,
                value_as_int(prop, value)?,
            ),

            (PropertyId::C1eAutopromote, MechanismId::Msr) => {
                let on = value_as_bool(prop, value)? as u64;
                self.msr_mut().write_bits(
                    power_ctl::ADDR,
                    power_ctl::C1E_AUTOPROMOTE_BITS,
                    on,
                    cpu,
                    prop.verify,
                )
            }
            (PropertyId::CstatePrewake, MechanismId::Msr) => {
                let disable = !value_as_bool(prop, value)? as u64;
                self.msr_mut().write_bits(
                    power_ctl::ADDR,
                    power_ctl::CSTATE_PREWAKE_DISABLE_BITS,
                    disable,
                    cpu,
                    prop.verify,
                )
            }

            _ => Err(PwrknobError::NotSupported {
                what: format!("writing {} via '{}'", prop.name, mech.name()),
            }),
        }
    }

    // ---------------------------------------------------------------- //
    // Mechanism plumbing.
    // ---------------------------------------------------------------- //

    fn read_sysfs(&self, path: &Path) -> Result<Option<String>> {
        match self.fs.read(path) {
            Ok(text) => Ok(Some(text.trim().to_string())),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn msr_read_bits(&mut self, addr: u64, bits: Bits, cpu: u32) -> Result<Option<u64>> {
        match self.msr_mut().read_bits(addr, bits, cpu) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn parse_epp_text(&self, prop: &Property, text: &str) -> Result<PropertyValue> {
        if let Ok(num) = text.parse::<i64>() {
            return Ok(PropertyValue::Int(num));
        }
        match prop.special_vals.iter().find(|(name, _)| *name == text) {
            Some(&(_, num)) => Ok(PropertyValue::Int(num)),
            None => Err(PwrknobError::InvalidValue {
                prop: prop.name,
                value: text.to_string(),
                reason: "the kernel reported a policy name this tool does not know".to_string(),
            }),
        }
    }

    fn uncore_sysfs_path(&self, cpu: u32, file: &str) -> Result<PathBuf> {
        let location = self.topology.cpu_location(cpu).ok_or_else(|| {
            PwrknobError::InvalidTarget(format!("CPU {cpu} does not exist"))
        })?;
        Ok(PathBuf::from(format!(
            "{SYSFS_CPU}/intel_uncore_frequency/package_{:02}_die_{:02}/{file}",
            location.package, location.die
        )))
    }

    fn read_uncore_sysfs(&mut self, cpu: u32, file: &str) -> Result<Option<PropertyValue>> {
        let path = self.uncore_sysfs_path(cpu, file)?;
        Ok(self
            .read_sysfs(&path)?
            .and_then(|s| s.parse::<i64>().ok())
            .map(|khz| PropertyValue::Int(khz * 1000)))
    }

    fn write_uncore_sysfs(&mut self, cpu: u32, file: &str, hz: i64) -> Result<()> {
        let path = self.uncore_sysfs_path(cpu, file)?;
        self.fs.write(&path, &(hz / 1000).to_string())
    }

    fn read_uncore_msr(&mut self, cpu: u32, bits: Bits) -> Result<Option<PropertyValue>> {
        let bclk = self.platform.bus_clock_hz();
        Ok(self
            .msr_read_bits(uncore_ratio_limit::ADDR, bits, cpu)?
            .map(|ratio| PropertyValue::Int((ratio as f64 * bclk) as i64)))
    }

    fn write_uncore_msr(&mut self, prop: &Property, cpu: u32, bits: Bits, hz: i64) -> Result<()> {
        let bclk = self.platform.bus_clock_hz();
        let ratio = (hz as f64 / bclk).round() as i64;
        if !(0..=0x7F).contains(&ratio) {
            return Err(PwrknobError::OutOfRange {
                prop: prop.name,
                value: format!("{hz}"),
                min: 0,
                max: (0x7F as f64 * bclk) as i64,
            });
        }
        self.msr_mut()
            .write_bits(uncore_ratio_limit::ADDR, bits, ratio as u64, cpu, prop.verify)
    }

    // ---------------------------------------------------------------- //
    // Input value normalization.
    // ---------------------------------------------------------------- //

    fn normalize_input(&self, prop: &Property, value: &str) -> Result<PropertyValue> {
        if !prop.writable {
            return Err(PwrknobError::ReadOnlyProperty { prop: prop.name });
        }

        let value = value.trim();
        match prop.kind {
            ValueKind::Bool => match human::parse_bool(value) {
                Some(b) => Ok(PropertyValue::Bool(b)),
                None => Err(PwrknobError::InvalidValue {
                    prop: prop.name,
                    value: value.to_string(),
                    reason: "use one of: on, off, enable, disable".to_string(),
                }),
            },
            ValueKind::Int => {
                if let Some(&(_, num)) =
                    prop.special_vals.iter().find(|(name, _)| *name == value)
                {
                    return Ok(PropertyValue::Int(num));
                }

                let num = if let Some(unit) = prop.unit {
                    human::parse_si_value(value, unit)
                        .map(|v| v.round() as i64)
                        .ok_or_else(|| PwrknobError::InvalidValue {
                            prop: prop.name,
                            value: value.to_string(),
                            reason: format!("expected a number with an optional '{unit}' unit"),
                        })?
                } else {
                    value.parse::<i64>().map_err(|_| PwrknobError::InvalidValue {
                        prop: prop.name,
                        value: value.to_string(),
                        reason: "expected an integer".to_string(),
                    })?
                };

                if let Some((min, max)) = prop.range {
                    if num < min || num > max {
                        return Err(PwrknobError::OutOfRange {
                            prop: prop.name,
                            value: value.to_string(),
                            min,
                            max,
                        });
                    }
                }
                Ok(PropertyValue::Int(num))
            }
            ValueKind::Float => {
                let num = match prop.unit {
                    Some(unit) => human::parse_si_value(value, unit),
                    None => value.parse::<f64>().ok(),
                }
                .ok_or_else(|| PwrknobError::InvalidValue {
                    prop: prop.name,
                    value: value.to_string(),
                    reason: "expected a number".to_string(),
                })?;
                Ok(PropertyValue::Float(num))
            }
            ValueKind::Str => Ok(PropertyValue::Str(value.to_string())),
        }
    }
}

fn value_as_bool(prop: &Property, value: &PropertyValue) -> Result<bool> {
    match value {
        PropertyValue::Bool(b) => Ok(*b),
        other => Err(PwrknobError::InvalidValue {
            prop: prop.name,
            value: other.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}

fn value_as_int(prop: &Property, value: &PropertyValue) -> Result<i64> {
    match value {
        PropertyValue::Int(v) => Ok(*v),
        other => Err(PwrknobError::InvalidValue {
            prop: prop.name,
            value: other.to_string(),
            reason: "expected an integer".to_string(),
        }),
    }
}

fn turbo_sysfs_path() -> PathBuf {
    PathBuf::from(format!("{SYSFS_CPU}/intel_pstate/no_turbo"))
}

fn epb_sysfs_path(cpu: u32) -> PathBuf {
    PathBuf::from(format!("{SYSFS_CPU}/cpu{cpu}/power/energy_perf_bias"))
}

fn epp_sysfs_path(cpu: u32) -> PathBuf {
    PathBuf::from(format!(
        "{SYSFS_CPU}/cpu{cpu}/cpufreq/energy_performance_preference"
    ))
}

fn epp_policies_sysfs_path(cpu: u32) -> PathBuf {
    PathBuf::from(format!(
        "{SYSFS_CPU}/cpu{cpu}/cpufreq/energy_performance_available_preferences"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hostfs::mock::MockHostFs;
    use crate::msr::mock::MockRegisterIo;
    use crate::topology::testutil::{small_topology, two_package_topology};

    const NO_TURBO: &str = "/sys/devices/system/cpu/intel_pstate/no_turbo";
    const EPB0: &str = "/sys/devices/system/cpu/cpu0/power/energy_perf_bias";
    const EPP0: &str = "/sys/devices/system/cpu/cpu0/cpufreq/energy_performance_preference";
    const UNCORE_MIN: &str =
        "/sys/devices/system/cpu/intel_uncore_frequency/package_00_die_00/min_freq_khz";

    fn skx() -> Platform {
        Platform {
            vendor_intel: true,
            family: 6,
            model: 0x55,
        }
    }

    fn harness(topology: Topology) -> (PowerKnobs, Arc<MockHostFs>, Arc<MockRegisterIo>) {
        let fs = Arc::new(MockHostFs::new());
        let io = MockRegisterIo::new();
        let knobs = PowerKnobs::builder()
            .host_fs(fs.clone())
            .register_io(io.clone())
            .topology(topology)
            .platform(skx())
            .build()
            .unwrap();
        (knobs, fs, io)
    }

    #[test]
    fn test_sysfs_preferred_over_msr() {
        let (mut knobs, fs, io) = harness(small_topology());
        fs.insert(NO_TURBO, "0\n");
        io.preset(misc_enable::ADDR, 0, 1 << 38);

        let rec = knobs.get_cpu_prop(PropertyId::Turbo, 0, None).unwrap();
        assert_eq!(rec.value, Some(PropertyValue::Bool(true)));
        assert_eq!(rec.mechanism, Some(MechanismId::Sysfs));
        assert_eq!(io.read_count(), 0, "sysfs answered, the MSR must not be touched");
    }

    #[test]
    fn test_msr_fallback_when_sysfs_absent() {
        // The intel_pstate no_turbo file does not exist; the read falls
        // back to IA32_MISC_ENABLE and the record says so.
        let (mut knobs, _fs, io) = harness(small_topology());
        io.preset(misc_enable::ADDR, 0, 0);

        let rec = knobs.get_package_prop(PropertyId::Turbo, 0, None).unwrap();
        assert_eq!(rec.value, Some(PropertyValue::Bool(true)));
        assert_eq!(rec.mechanism, Some(MechanismId::Msr));
        assert_eq!(rec.target, Target::Package(0));
    }

    #[test]
    fn test_unsupported_when_no_mechanism_answers() {
        let fs = Arc::new(MockHostFs::new());
        let mut knobs = PowerKnobs::builder()
            .host_fs(fs)
            .register_io(MockRegisterIo::unavailable())
            .topology(small_topology())
            .platform(skx())
            .build()
            .unwrap();

        let rec = knobs.get_cpu_prop(PropertyId::Epb, 0, None).unwrap();
        assert!(!rec.is_supported());
        assert_eq!(rec.mechanism, None);
        assert!(!knobs.is_supported_cpu(PropertyId::Epb, 0).unwrap());
    }

    #[test]
    fn test_set_requires_whole_scope_units() {
        let (mut knobs, _fs, io) = harness(two_package_topology());

        // CPUs 0-1 are half of package 0.
        let err = knobs
            .set_prop_cpus(PropertyId::Turbo, "off", &TargetSpec::List(vec![0, 1]), None)
            .unwrap_err();
        match err {
            PwrknobError::ScopeViolation(msg) => {
                assert!(msg.contains("package scope"), "{msg}");
                assert!(msg.contains("0-1"), "{msg}");
            }
            other => panic!("unexpected error: {other}"),
        }

        // The whole package passes and, with no sysfs file, lands in the
        // MSR on every CPU of the package.
        let mech = knobs
            .set_prop_cpus(
                PropertyId::Turbo,
                "off",
                &TargetSpec::List((0..8).collect()),
                None,
            )
            .unwrap();
        assert_eq!(mech, MechanismId::Msr);
        for cpu in 0..8 {
            assert_eq!(io.value(misc_enable::ADDR, cpu) >> 38, 1);
        }
    }

    #[test]
    fn test_global_scope_needs_all_cpus() {
        let (knobs, _fs, _io) = harness(small_topology());
        let err = knobs
            .validate_cpus_vs_scope(
                &Property {
                    scope: ScopeUnit::Global,
                    ..knobs.registry.get(PropertyId::Turbo).clone()
                },
                &[0, 1],
            )
            .unwrap_err();
        assert!(err.to_string().contains("2-3"));
    }

    #[test]
    fn test_cached_read_hits_file_once() {
        let (mut knobs, fs, _io) = harness(small_topology());
        fs.insert(EPB0, "7\n");

        for _ in 0..3 {
            let rec = knobs.get_cpu_prop(PropertyId::Epb, 0, None).unwrap();
            assert_eq!(rec.value, Some(PropertyValue::Int(7)));
        }
        assert_eq!(fs.reads_of(EPB0), 1);
    }

    #[test]
    fn test_disabled_cache_is_passthrough() {
        let fs = Arc::new(MockHostFs::new());
        fs.insert(EPB0, "7\n");
        let mut knobs = PowerKnobs::builder()
            .host_fs(fs.clone())
            .register_io(MockRegisterIo::new())
            .topology(small_topology())
            .platform(skx())
            .enable_cache(false)
            .build()
            .unwrap();

        knobs.get_cpu_prop(PropertyId::Epb, 0, None).unwrap();
        knobs.get_cpu_prop(PropertyId::Epb, 0, None).unwrap();
        assert_eq!(fs.reads_of(EPB0), 2);
    }

    #[test]
    fn test_write_through_cache() {
        let (mut knobs, fs, _io) = harness(small_topology());
        fs.insert(EPB0, "7\n");

        let rec = knobs.get_cpu_prop(PropertyId::Epb, 0, None).unwrap();
        assert_eq!(rec.value, Some(PropertyValue::Int(7)));

        knobs
            .set_prop_cpus(PropertyId::Epb, "6", &TargetSpec::List(vec![0]), None)
            .unwrap();
        assert_eq!(fs.contents(EPB0).unwrap(), "6");

        // The written value is served from the cache, no re-read.
        let rec = knobs.get_cpu_prop(PropertyId::Epb, 0, None).unwrap();
        assert_eq!(rec.value, Some(PropertyValue::Int(6)));
        assert_eq!(fs.reads_of(EPB0), 1);
    }

    #[test]
    fn test_epp_policy_name_round_trip() {
        let (mut knobs, fs, _io) = harness(small_topology());
        fs.insert(EPP0, "balance_power\n");

        let rec = knobs.get_cpu_prop(PropertyId::Epp, 0, None).unwrap();
        assert_eq!(rec.value, Some(PropertyValue::Int(0xC0)));

        knobs
            .set_prop_cpus(
                PropertyId::Epp,
                "performance",
                &TargetSpec::List(vec![0]),
                None,
            )
            .unwrap();
        assert_eq!(fs.contents(EPP0).unwrap(), "0");
    }

    #[test]
    fn test_ambiguous_scope_on_disagreeing_package() {
        // On this model MSR_POWER_CTL is physically per-CPU while C1E
        // autopromote has package scope; disagreeing CPUs make the
        // package value undefined.
        let (mut knobs, _fs, io) = harness(two_package_topology());
        io.preset(power_ctl::ADDR, 0, 0x2);

        let err = knobs
            .get_package_prop(PropertyId::C1eAutopromote, 0, None)
            .unwrap_err();
        match err {
            PwrknobError::AmbiguousScope {
                scope,
                ioscope,
                pairs,
                ..
            } => {
                assert_eq!(scope, "package");
                assert_eq!(ioscope, "CPU");
                assert_eq!(pairs.len(), 8);
                assert_eq!(pairs[0], (0, PropertyValue::Bool(true)));
                assert_eq!(pairs[1], (1, PropertyValue::Bool(false)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_agreeing_package_reads_fine() {
        let (mut knobs, _fs, io) = harness(two_package_topology());
        for cpu in 0..8 {
            io.preset(power_ctl::ADDR, cpu, 0x2);
        }

        let rec = knobs
            .get_package_prop(PropertyId::C1eAutopromote, 0, None)
            .unwrap();
        assert_eq!(rec.value, Some(PropertyValue::Bool(true)));
    }

    #[test]
    fn test_fine_ioscope_write_hits_every_cpu() {
        let (mut knobs, _fs, io) = harness(two_package_topology());

        let mech = knobs
            .set_package_prop(PropertyId::C1eAutopromote, "on", 0, None)
            .unwrap();
        assert_eq!(mech, MechanismId::Msr);
        for cpu in 0..8 {
            assert_eq!(io.value(power_ctl::ADDR, cpu) & 0x2, 0x2);
        }
        // The other package is untouched.
        assert_eq!(io.value(power_ctl::ADDR, 8), 0);
    }

    #[test]
    fn test_cross_scope_access_levels() {
        let (mut knobs, _fs, io) = harness(two_package_topology());

        // Die-level access to a package-scoped property is fine: every
        // CPU of the die shares the package value.
        io.preset(misc_enable::ADDR, 0, 0);
        let rec = knobs.get_die_prop(PropertyId::Turbo, 0, 0, None).unwrap();
        assert_eq!(rec.value, Some(PropertyValue::Bool(true)));
        assert_eq!(rec.target, Target::Die { package: 0, die: 0 });

        // The reverse is not: a die-scoped property has no single value
        // for a package with two dies.
        let err = knobs
            .get_package_prop(PropertyId::MinUncoreFreq, 0, None)
            .unwrap_err();
        match err {
            PwrknobError::ScopeViolation(msg) => {
                assert!(msg.contains("per-package"), "{msg}");
                assert!(msg.contains("die scope"), "{msg}");
            }
            other => panic!("unexpected error: {other}"),
        }
        let err = knobs
            .set_package_prop(PropertyId::MinUncoreFreq, "800MHz", 0, None)
            .unwrap_err();
        assert!(matches!(err, PwrknobError::ScopeViolation(_)));

        // With one die per package the two levels are interchangeable.
        let (mut knobs, _fs, io) = harness(small_topology());
        io.preset(uncore_ratio_limit::ADDR, 0, (8 << 8) | 24);
        let rec = knobs
            .get_package_prop(PropertyId::MinUncoreFreq, 0, None)
            .unwrap();
        assert_eq!(rec.value, Some(PropertyValue::Int(800_000_000)));
    }

    #[test]
    fn test_per_die_records_across_host() {
        let (mut knobs, _fs, io) = harness(two_package_topology());
        // Lowest-numbered CPUs of the four dies: 0, 4, 8, 12.
        for (i, cpu) in [0u32, 4, 8, 12].into_iter().enumerate() {
            io.preset(uncore_ratio_limit::ADDR, cpu, (8 << 8) | (20 + i as u64));
        }

        let dies = knobs.topology().all_dies();
        assert_eq!(dies, vec![(0, 0), (0, 1), (1, 0), (1, 1)]);

        let recs = knobs
            .get_prop_dies(PropertyId::MaxUncoreFreq, &dies, None)
            .unwrap();
        assert_eq!(recs.len(), 4);
        assert_eq!(recs[0].value, Some(PropertyValue::Int(2_000_000_000)));
        assert_eq!(recs[3].value, Some(PropertyValue::Int(2_300_000_000)));
        assert_eq!(recs[3].target, Target::Die { package: 1, die: 1 });
    }

    #[test]
    fn test_read_only_property() {
        let (mut knobs, _fs, _io) = harness(small_topology());

        let rec = knobs.get_package_prop(PropertyId::BusClock, 0, None).unwrap();
        assert_eq!(rec.value, Some(PropertyValue::Float(100_000_000.0)));
        assert_eq!(rec.mechanism, Some(MechanismId::Doc));

        let err = knobs
            .set_prop_cpus(PropertyId::BusClock, "1", &TargetSpec::All, None)
            .unwrap_err();
        assert!(matches!(err, PwrknobError::ReadOnlyProperty { .. }));
    }

    #[test]
    fn test_value_normalization_errors() {
        let (mut knobs, fs, _io) = harness(small_topology());
        fs.insert(EPB0, "7\n");

        let err = knobs
            .set_prop_cpus(PropertyId::Epb, "16", &TargetSpec::List(vec![0]), None)
            .unwrap_err();
        assert!(matches!(
            err,
            PwrknobError::OutOfRange { min: 0, max: 15, .. }
        ));

        let err = knobs
            .set_prop_cpus(PropertyId::Turbo, "maybe", &TargetSpec::All, None)
            .unwrap_err();
        assert!(matches!(err, PwrknobError::InvalidValue { .. }));
    }

    #[test]
    fn test_uncore_si_units_and_khz_conversion() {
        let (mut knobs, fs, _io) = harness(small_topology());
        fs.insert(UNCORE_MIN, "800000\n");

        let rec = knobs
            .get_die_prop(PropertyId::MinUncoreFreq, 0, 0, None)
            .unwrap();
        assert_eq!(rec.value, Some(PropertyValue::Int(800_000_000)));
        assert_eq!(rec.mechanism, Some(MechanismId::Sysfs));

        knobs
            .set_die_prop(PropertyId::MinUncoreFreq, "1.2GHz", 0, 0, None)
            .unwrap();
        assert_eq!(fs.contents(UNCORE_MIN).unwrap(), "1200000");
    }

    #[test]
    fn test_uncore_msr_ratio_scaling() {
        let (mut knobs, _fs, io) = harness(small_topology());
        io.preset(uncore_ratio_limit::ADDR, 0, (8 << 8) | 24);

        let rec = knobs
            .get_die_prop(PropertyId::MaxUncoreFreq, 0, 0, None)
            .unwrap();
        assert_eq!(rec.value, Some(PropertyValue::Int(2_400_000_000)));
        assert_eq!(rec.mechanism, Some(MechanismId::Msr));

        let rec = knobs
            .get_die_prop(PropertyId::MinUncoreFreq, 0, 0, None)
            .unwrap();
        assert_eq!(rec.value, Some(PropertyValue::Int(800_000_000)));

        knobs
            .set_die_prop(PropertyId::MaxUncoreFreq, "2.6GHz", 0, 0, None)
            .unwrap();
        assert_eq!(
            extract_bits_for_test(io.value(uncore_ratio_limit::ADDR, 0), (6, 0)),
            26
        );
    }

    fn extract_bits_for_test(value: u64, bits: Bits) -> u64 {
        pwrknob_raw::register::extract_bits(value, bits)
    }

    #[test]
    fn test_transaction_one_write_per_register_and_cpu() {
        let (mut knobs, _fs, io) = harness(small_topology());

        knobs.start_transaction().unwrap();
        knobs
            .set_prop_cpus(PropertyId::C1eAutopromote, "on", &TargetSpec::All, None)
            .unwrap();
        knobs
            .set_prop_cpus(PropertyId::CstatePrewake, "on", &TargetSpec::All, None)
            .unwrap();
        assert!(io.write_log().is_empty(), "writes must buffer until commit");

        knobs.commit_transaction().unwrap();

        // Both knobs live in MSR_POWER_CTL: one write per CPU, not two.
        let log = io.write_log();
        assert_eq!(log.len(), 4);
        for (addr, _cpu, value) in log {
            assert_eq!(addr, power_ctl::ADDR);
            assert_eq!(value, 0x2);
        }
    }

    #[test]
    fn test_explicit_mechanism_list() {
        let (mut knobs, fs, io) = harness(small_topology());
        fs.insert(NO_TURBO, "0\n");

        // Forcing 'msr' bypasses the sysfs file entirely.
        let rec = knobs
            .get_cpu_prop(PropertyId::Turbo, 0, Some(&[MechanismId::Msr]))
            .unwrap();
        assert_eq!(rec.mechanism, Some(MechanismId::Msr));
        assert!(io.read_count() > 0);
        assert_eq!(fs.reads_of(NO_TURBO), 0);
    }

    #[test]
    fn test_per_cpu_records() {
        let (mut knobs, fs, _io) = harness(small_topology());
        fs.insert(EPB0, "5\n");
        fs.insert("/sys/devices/system/cpu/cpu1/power/energy_perf_bias", "9\n");

        let recs = knobs
            .get_prop_cpus(PropertyId::Epb, &TargetSpec::List(vec![0, 1]), None)
            .unwrap();
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].target, Target::Cpu(0));
        assert_eq!(recs[0].value, Some(PropertyValue::Int(5)));
        assert_eq!(recs[1].value, Some(PropertyValue::Int(9)));
    }
}

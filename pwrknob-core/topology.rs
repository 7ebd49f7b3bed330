//! CPU topology model
//!
//! Immutable after construction: a mapping from CPU number to its core,
//! die and package, built once from a provider (the sysfs walker or an
//! explicit table) and queried by the scope validator and the die/package
//! property adapters.
//!
//! Die and core numbers are package-relative, as in sysfs: a two-socket
//! host has a die 0 in both package 0 and package 1.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::{PwrknobError, Result};
use crate::hostfs::HostFs;
use crate::human;

/// Topology units a property can be scoped to, totally ordered by
/// containment: `Cpu < Core < Die < Package < Global`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ScopeUnit {
    Cpu,
    Core,
    Die,
    Package,
    Global,
}

impl ScopeUnit {
    pub fn name(&self) -> &'static str {
        match self {
            ScopeUnit::Cpu => "CPU",
            ScopeUnit::Core => "core",
            ScopeUnit::Die => "die",
            ScopeUnit::Package => "package",
            ScopeUnit::Global => "global",
        }
    }
}

/// One complete topology unit, as returned by [`Topology::partition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Core { package: u32, core: u32 },
    Die { package: u32, die: u32 },
    Package(u32),
}

/// A caller's target specification, before expansion to concrete numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSpec {
    All,
    List(Vec<u32>),
}

impl TargetSpec {
    /// Parse `"all"` or a range list like `"0-3,8"`.
    pub fn parse(s: &str) -> Result<Self> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(TargetSpec::All);
        }
        Ok(TargetSpec::List(human::parse_int_list(s)?))
    }
}

impl From<&[u32]> for TargetSpec {
    fn from(nums: &[u32]) -> Self {
        TargetSpec::List(nums.to_vec())
    }
}

/// Raw placement of one online CPU, as supplied by a topology provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuLocation {
    pub cpu: u32,
    pub core: u32,
    pub die: u32,
    pub package: u32,
}

#[derive(Debug)]
pub struct Topology {
    /// Online CPUs, ascending by CPU number.
    rows: Vec<CpuLocation>,
    /// Offline CPUs known to exist.
    offline: Vec<u32>,
}

const SYSFS_CPU: &str = "/sys/devices/system/cpu";

impl Topology {
    /// Build from explicit rows. Rows are sorted by CPU number; duplicate
    /// CPU numbers are rejected.
    pub fn new(mut rows: Vec<CpuLocation>, mut offline: Vec<u32>) -> Result<Self> {
        rows.sort_unstable_by_key(|r| r.cpu);
        offline.sort_unstable();
        offline.dedup();

        for pair in rows.windows(2) {
            if pair[0].cpu == pair[1].cpu {
                return Err(PwrknobError::InvalidTarget(format!(
                    "CPU {} appears twice in the topology table",
                    pair[0].cpu
                )));
            }
        }
        if rows.is_empty() {
            return Err(PwrknobError::InvalidTarget(
                "topology table contains no online CPUs".to_string(),
            ));
        }

        Ok(Self { rows, offline })
    }

    /// Walk sysfs and build the topology of the local host.
    pub fn detect(fs: &dyn HostFs) -> Result<Self> {
        let online_str = fs.read(&PathBuf::from(format!("{SYSFS_CPU}/online")))?;
        let online = human::parse_int_list(&online_str)?;

        let offline_path = PathBuf::from(format!("{SYSFS_CPU}/offline"));
        let offline = if fs.exists(&offline_path) {
            human::parse_int_list(fs.read(&offline_path)?.trim()).unwrap_or_default()
        } else {
            Vec::new()
        };

        let mut rows = Vec::with_capacity(online.len());
        for cpu in online {
            let read_id = |name: &str| -> Result<u32> {
                let path = PathBuf::from(format!("{SYSFS_CPU}/cpu{cpu}/topology/{name}"));
                let text = fs.read(&path)?;
                text.trim().parse().map_err(|_| {
                    PwrknobError::InvalidTarget(format!(
                        "cannot parse '{}' as {name} of CPU {cpu}",
                        text.trim()
                    ))
                })
            };

            let core = read_id("core_id")?;
            let package = read_id("physical_package_id")?;
            // Kernels without multi-die support do not expose die_id.
            let die = match read_id("die_id") {
                Ok(die) => die,
                Err(err) if err.is_not_found() => 0,
                Err(err) => return Err(err),
            };

            rows.push(CpuLocation {
                cpu,
                core,
                die,
                package,
            });
        }

        let topology = Self::new(rows, offline)?;
        tracing::info!(
            "detected {} online CPUs across {} package(s)",
            topology.rows.len(),
            topology.packages().len()
        );
        Ok(topology)
    }

    pub fn cpus(&self) -> Vec<u32> {
        self.rows.iter().map(|r| r.cpu).collect()
    }

    pub fn offline_cpus(&self) -> &[u32] {
        &self.offline
    }

    pub fn cpu_location(&self, cpu: u32) -> Option<&CpuLocation> {
        self.rows.iter().find(|r| r.cpu == cpu)
    }

    pub fn packages(&self) -> Vec<u32> {
        let mut pkgs: Vec<u32> = self.rows.iter().map(|r| r.package).collect();
        pkgs.sort_unstable();
        pkgs.dedup();
        pkgs
    }

    pub fn package_dies(&self, package: u32) -> Vec<u32> {
        let mut dies: Vec<u32> = self
            .rows
            .iter()
            .filter(|r| r.package == package)
            .map(|r| r.die)
            .collect();
        dies.sort_unstable();
        dies.dedup();
        dies
    }

    pub fn package_cores(&self, package: u32) -> Vec<u32> {
        let mut cores: Vec<u32> = self
            .rows
            .iter()
            .filter(|r| r.package == package)
            .map(|r| r.core)
            .collect();
        cores.sort_unstable();
        cores.dedup();
        cores
    }

    pub fn package_cpus(&self, package: u32) -> Vec<u32> {
        self.rows
            .iter()
            .filter(|r| r.package == package)
            .map(|r| r.cpu)
            .collect()
    }

    pub fn die_cpus(&self, package: u32, die: u32) -> Vec<u32> {
        self.rows
            .iter()
            .filter(|r| r.package == package && r.die == die)
            .map(|r| r.cpu)
            .collect()
    }

    pub fn core_cpus(&self, package: u32, core: u32) -> Vec<u32> {
        self.rows
            .iter()
            .filter(|r| r.package == package && r.core == core)
            .map(|r| r.cpu)
            .collect()
    }

    /// All (package, die) pairs of the host.
    pub fn all_dies(&self) -> Vec<(u32, u32)> {
        let mut dies = Vec::new();
        for package in self.packages() {
            for die in self.package_dies(package) {
                dies.push((package, die));
            }
        }
        dies
    }

    /// Whether every package has exactly one die, in which case die and
    /// package access levels are interchangeable.
    pub fn one_die_per_package(&self) -> bool {
        self.packages()
            .iter()
            .all(|&pkg| self.package_dies(pkg).len() == 1)
    }

    /// Expand a CPU target specification into ascending, deduplicated
    /// concrete CPU numbers.
    ///
    /// Unknown CPU numbers fail with `InvalidTarget`; offline CPUs fail
    /// too unless `allow_offline` is set.
    pub fn normalize_cpus(&self, spec: &TargetSpec, allow_offline: bool) -> Result<Vec<u32>> {
        match spec {
            TargetSpec::All => Ok(self.cpus()),
            TargetSpec::List(list) => {
                let mut cpus = list.clone();
                cpus.sort_unstable();
                cpus.dedup();

                for &cpu in &cpus {
                    if self.cpu_location(cpu).is_some() {
                        continue;
                    }
                    if self.offline.contains(&cpu) {
                        if allow_offline {
                            continue;
                        }
                        return Err(PwrknobError::InvalidTarget(format!(
                            "CPU {cpu} is offline"
                        )));
                    }
                    return Err(PwrknobError::InvalidTarget(format!(
                        "CPU {cpu} does not exist, valid CPUs are: {}",
                        human::rangify(&self.cpus())
                    )));
                }
                Ok(cpus)
            }
        }
    }

    /// Expand a package target specification.
    pub fn normalize_packages(&self, spec: &TargetSpec) -> Result<Vec<u32>> {
        let known = self.packages();
        match spec {
            TargetSpec::All => Ok(known),
            TargetSpec::List(list) => {
                let mut pkgs = list.clone();
                pkgs.sort_unstable();
                pkgs.dedup();
                for &pkg in &pkgs {
                    if !known.contains(&pkg) {
                        return Err(PwrknobError::InvalidTarget(format!(
                            "package {pkg} does not exist, valid packages are: {}",
                            human::rangify(&known)
                        )));
                    }
                }
                Ok(pkgs)
            }
        }
    }

    /// Expand a die target specification within one package.
    pub fn normalize_dies(&self, package: u32, spec: &TargetSpec) -> Result<Vec<u32>> {
        let known = self.package_dies(package);
        if known.is_empty() {
            return Err(PwrknobError::InvalidTarget(format!(
                "package {package} does not exist, valid packages are: {}",
                human::rangify(&self.packages())
            )));
        }
        match spec {
            TargetSpec::All => Ok(known),
            TargetSpec::List(list) => {
                let mut dies = list.clone();
                dies.sort_unstable();
                dies.dedup();
                for &die in &dies {
                    if !known.contains(&die) {
                        return Err(PwrknobError::InvalidTarget(format!(
                            "die {die} does not exist in package {package}, \
                             valid dies are: {}",
                            human::rangify(&known)
                        )));
                    }
                }
                Ok(dies)
            }
        }
    }

    /// Split `cpus` into complete units at `level` plus the leftover CPUs
    /// that do not fill any whole unit. The basis of scope checking.
    ///
    /// `level` must be `Core`, `Die` or `Package`; the CPU and global
    /// levels have no meaningful partition.
    pub fn partition(&self, cpus: &[u32], level: ScopeUnit) -> (Vec<Unit>, Vec<u32>) {
        let set: std::collections::BTreeSet<u32> = cpus.iter().copied().collect();

        // Group the unit members of every unit that has at least one CPU
        // in the input set.
        let mut units: BTreeMap<(u32, u32), Vec<u32>> = BTreeMap::new();
        for row in &self.rows {
            if !set.contains(&row.cpu) {
                continue;
            }
            let key = match level {
                ScopeUnit::Core => (row.package, row.core),
                ScopeUnit::Die => (row.package, row.die),
                ScopeUnit::Package => (row.package, 0),
                ScopeUnit::Cpu | ScopeUnit::Global => unreachable!("partition at {level:?}"),
            };
            units.entry(key).or_default().push(row.cpu);
        }

        let mut complete = Vec::new();
        let mut leftover = Vec::new();

        for ((package, sub), members) in units {
            let full = match level {
                ScopeUnit::Core => self.core_cpus(package, sub),
                ScopeUnit::Die => self.die_cpus(package, sub),
                ScopeUnit::Package => self.package_cpus(package),
                ScopeUnit::Cpu | ScopeUnit::Global => unreachable!(),
            };
            if members.len() == full.len() {
                complete.push(match level {
                    ScopeUnit::Core => Unit::Core { package, core: sub },
                    ScopeUnit::Die => Unit::Die { package, die: sub },
                    ScopeUnit::Package => Unit::Package(package),
                    ScopeUnit::Cpu | ScopeUnit::Global => unreachable!(),
                });
            } else {
                leftover.extend(members);
            }
        }

        leftover.sort_unstable();
        (complete, leftover)
    }
}

#[cfg(test)]
pub mod testutil {
    use super::{CpuLocation, Topology};

    /// Two packages, two dies each, two cores per die, two CPUs per core:
    /// CPUs 0-7 in package 0, CPUs 8-15 in package 1.
    pub fn two_package_topology() -> Topology {
        let mut rows = Vec::new();
        for cpu in 0u32..16 {
            rows.push(CpuLocation {
                cpu,
                core: (cpu % 8) / 2,
                die: (cpu % 8) / 4,
                package: cpu / 8,
            });
        }
        Topology::new(rows, vec![]).unwrap()
    }

    /// One package, one die, four cores, no SMT, CPU 4 offline.
    pub fn small_topology() -> Topology {
        let rows = (0u32..4)
            .map(|cpu| CpuLocation {
                cpu,
                core: cpu,
                die: 0,
                package: 0,
            })
            .collect();
        Topology::new(rows, vec![4]).unwrap()
    }
}

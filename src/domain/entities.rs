//! Domain entities: core data structures

use std::collections::BTreeMap;
use std::fmt;

use crate::domain::cpuset::{self, CpuSet};
use crate::domain::error::{DomainError, DomainResult};

/// Kernel CPU id.
pub type CpuId = usize;

/// Run-queue load; the unit is whatever the sample source exports.
pub type Load = u64;

/// Level of the terminal CPU leaf.
pub const LEAF_LEVEL: usize = 0;

/// Type name carried by every CPU leaf.
pub const LEAF_TYPE: &str = "CPU";

/// Identity of a scheduling domain: two descriptors with equal keys,
/// observed from any CPUs, denote the same domain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DomainKey {
    pub level: usize,
    pub members: CpuSet,
}

impl DomainKey {
    pub fn new(level: usize, members: CpuSet) -> Self {
        Self { level, members }
    }

    /// Key of the CPU leaf for `cpu`.
    pub fn leaf(cpu: CpuId) -> Self {
        Self {
            level: LEAF_LEVEL,
            members: CpuSet::from_cpus([cpu]),
        }
    }
}

impl fmt::Display for DomainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}[{}]", self.level, self.members)
    }
}

/// One domain descriptor inside a [`PerCpuChain`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainLink {
    pub level: usize,
    pub members: CpuSet,
}

impl ChainLink {
    pub fn new(level: usize, members: CpuSet) -> Self {
        Self { level, members }
    }

    pub fn key(&self) -> DomainKey {
        DomainKey::new(self.level, self.members.clone())
    }
}

/// The domains enclosing one CPU, largest first, implicitly terminated by
/// the CPU leaf itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerCpuChain {
    pub cpu: CpuId,
    pub links: Vec<ChainLink>,
}

impl PerCpuChain {
    pub fn new(cpu: CpuId, links: Vec<ChainLink>) -> Self {
        Self { cpu, links }
    }

    /// Convert one tokenized schedstat record into a root-to-leaf chain.
    ///
    /// `domain<K>` becomes level `K + 1`; records list the innermost domain
    /// first, so the order is reversed.
    pub fn from_record(record: &SchedstatRecord, max_cpus: usize) -> DomainResult<Self> {
        if record.cpu >= max_cpus {
            return Err(DomainError::CpuOutOfRange {
                cpu: record.cpu,
                max_cpus,
            });
        }
        let mut links = record
            .domains
            .iter()
            .map(|d| Ok(ChainLink::new(d.index + 1, cpuset::decode(&d.mask, max_cpus)?)))
            .collect::<DomainResult<Vec<_>>>()?;
        links.reverse();
        Ok(Self::new(record.cpu, links))
    }
}

/// One `domain<K> [name] <mask> ...` line of a schedstat record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainRecord {
    pub index: usize,
    pub mask: String,
    /// Inline domain name, printed by schedstat version 17 and later.
    pub name: Option<String>,
}

impl DomainRecord {
    pub fn new(index: usize, mask: impl Into<String>) -> Self {
        Self {
            index,
            mask: mask.into(),
            name: None,
        }
    }
}

/// A `cpu<N>` line of `/proc/schedstat` with the domain lines following it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedstatRecord {
    pub cpu: CpuId,
    pub domains: Vec<DomainRecord>,
}

/// Literal token the kernel uses for a domain level, e.g. `domain0`.
pub fn domain_token(level: usize) -> String {
    format!("domain{}", level.saturating_sub(1))
}

/// Immutable domain-name lookup, resolved once before building.
///
/// Names are normally read for a single reference CPU and assumed uniform
/// across all CPUs at a level. Per-CPU entries, when present, take
/// precedence for their CPU.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainNames {
    reference: BTreeMap<usize, String>,
    per_cpu: BTreeMap<(CpuId, usize), String>,
}

impl DomainNames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(level, name)` pairs of the reference CPU.
    pub fn from_levels<I, S>(levels: I) -> Self
    where
        I: IntoIterator<Item = (usize, S)>,
        S: Into<String>,
    {
        let mut names = Self::new();
        for (level, name) in levels {
            names.insert(level, name);
        }
        names
    }

    pub fn insert(&mut self, level: usize, name: impl Into<String>) {
        self.reference.insert(level, name.into());
    }

    pub fn insert_for_cpu(&mut self, cpu: CpuId, level: usize, name: impl Into<String>) {
        self.per_cpu.insert((cpu, level), name.into());
    }

    /// Name of `level` as seen from `cpu`.
    pub fn get(&self, cpu: CpuId, level: usize) -> Option<&str> {
        self.per_cpu
            .get(&(cpu, level))
            .or_else(|| self.reference.get(&level))
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.reference.is_empty() && self.per_cpu.is_empty()
    }
}

/// Per-CPU load sample for one reporting cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CpuLoadSample {
    loads: BTreeMap<CpuId, Load>,
}

impl CpuLoadSample {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, cpu: CpuId, load: Load) {
        self.loads.insert(cpu, load);
    }

    pub fn get(&self, cpu: CpuId) -> Option<Load> {
        self.loads.get(&cpu).copied()
    }

    /// Add a zero entry for every listed CPU that has no sample.
    pub fn fill_missing<I: IntoIterator<Item = CpuId>>(&mut self, cpus: I) {
        for cpu in cpus {
            self.loads.entry(cpu).or_insert(0);
        }
    }

    /// Samples in ascending CPU order.
    pub fn iter(&self) -> impl Iterator<Item = (CpuId, Load)> + '_ {
        self.loads.iter().map(|(&cpu, &load)| (cpu, load))
    }

    /// Sum of every sample, None if it does not fit a [`Load`].
    pub fn total(&self) -> Option<Load> {
        self.loads
            .values()
            .try_fold(0 as Load, |acc, &load| acc.checked_add(load))
    }

    pub fn len(&self) -> usize {
        self.loads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loads.is_empty()
    }
}

impl FromIterator<(CpuId, Load)> for CpuLoadSample {
    fn from_iter<I: IntoIterator<Item = (CpuId, Load)>>(iter: I) -> Self {
        Self {
            loads: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_schedstat_record_when_converting_then_reverses_and_shifts_levels() {
        let record = SchedstatRecord {
            cpu: 1,
            domains: vec![DomainRecord::new(0, "3"), DomainRecord::new(1, "f")],
        };

        let chain = PerCpuChain::from_record(&record, 8).unwrap();

        assert_eq!(chain.cpu, 1);
        assert_eq!(
            chain.links,
            vec![
                ChainLink::new(2, CpuSet::from_cpus([0, 1, 2, 3])),
                ChainLink::new(1, CpuSet::from_cpus([0, 1])),
            ]
        );
    }

    #[test]
    fn given_bad_mask_when_converting_then_fails() {
        let record = SchedstatRecord {
            cpu: 0,
            domains: vec![DomainRecord::new(0, "zz")],
        };
        assert!(PerCpuChain::from_record(&record, 8).is_err());
    }

    #[test]
    fn given_per_cpu_name_when_resolving_then_overrides_reference() {
        let mut names = DomainNames::from_levels([(1, "SMT"), (2, "MC")]);
        names.insert_for_cpu(3, 2, "PKG");

        assert_eq!(names.get(0, 2), Some("MC"));
        assert_eq!(names.get(3, 2), Some("PKG"));
        assert_eq!(names.get(3, 1), Some("SMT"));
        assert_eq!(names.get(0, 3), None);
        assert_eq!(domain_token(3), "domain2");
    }

    #[test]
    fn given_loads_beyond_u64_when_totalling_then_returns_none() {
        let sample: CpuLoadSample = [(0, u64::MAX / 2 + 1), (1, u64::MAX / 2 + 1)]
            .into_iter()
            .collect();
        assert_eq!(sample.total(), None);
    }

    #[test]
    fn given_partial_sample_when_filling_then_adds_zeroes_only() {
        let mut sample: CpuLoadSample = [(0, 10), (2, 5)].into_iter().collect();
        sample.fill_missing(0..4);

        assert_eq!(sample.len(), 4);
        assert_eq!(sample.get(0), Some(10));
        assert_eq!(sample.get(1), Some(0));
        assert_eq!(sample.total(), Some(15));
    }
}

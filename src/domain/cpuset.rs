//! CPU sets decoded from kernel cpumask text.
//!
//! The kernel exports cpumasks as hexadecimal text split into comma
//! separated 32-bit groups, most significant group first:
//!
//! ```text
//! 00000000,00000000,00000000,0000000f   -> {0, 1, 2, 3}
//! ```
//!
//! A [`CpuSet`] is an immutable, order-independent set of CPU ids. The
//! backing bit vector never carries trailing zero bits, so equality and
//! hashing are plain set equality no matter how wide the source mask was.

use std::fmt;

use bitvec::prelude::*;
use itertools::Itertools;
use sscanf::sscanf;
use tracing::trace;

use crate::domain::entities::CpuId;
use crate::domain::error::{DomainError, DomainResult};

#[derive(Debug, Default, Eq, Clone, Hash, Ord, PartialEq, PartialOrd)]
pub struct CpuSet {
    mask: BitVec<u64, Lsb0>,
}

impl CpuSet {
    /// Build an empty CpuSet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a CpuSet holding exactly the given CPUs.
    pub fn from_cpus<I: IntoIterator<Item = CpuId>>(cpus: I) -> Self {
        let mut mask: BitVec<u64, Lsb0> = BitVec::new();
        for cpu in cpus {
            if cpu >= mask.len() {
                mask.resize(cpu + 1, false);
            }
            mask.set(cpu, true);
        }
        Self::from_bitvec(mask)
    }

    fn from_bitvec(mut mask: BitVec<u64, Lsb0>) -> Self {
        let len = mask.last_one().map_or(0, |last| last + 1);
        mask.truncate(len);
        Self { mask }
    }

    /// Build a CpuSet from kernel cpulist syntax, e.g. `0-3,8,10-11`.
    pub fn from_cpulist(cpulist: &str) -> DomainResult<Self> {
        let cpulist = cpulist.trim().trim_end_matches('\0');
        if cpulist.is_empty() {
            return Ok(Self::new());
        }

        let mut cpus = Vec::new();
        for group in cpulist.split(',') {
            let (min, max) = match sscanf!(group.trim(), "{usize}-{usize}") {
                Ok((x, y)) => (x, y),
                Err(_) => match sscanf!(group.trim(), "{usize}") {
                    Ok(x) => (x, x),
                    Err(_) => {
                        return Err(DomainError::InvalidMask {
                            mask: cpulist.to_string(),
                            reason: format!("bad cpulist group {:?}", group.trim()),
                        });
                    }
                },
            };
            cpus.extend(min..=max);
        }

        Ok(Self::from_cpus(cpus))
    }

    /// Test whether the CPU is a member of the set.
    pub fn contains(&self, cpu: CpuId) -> bool {
        self.mask.get(cpu).map(|bit| *bit).unwrap_or(false)
    }

    /// Number of CPUs in the set.
    pub fn weight(&self) -> usize {
        self.mask.count_ones()
    }

    pub fn is_empty(&self) -> bool {
        self.mask.not_any()
    }

    /// Iterate the member CPUs in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = CpuId> + '_ {
        self.mask.iter_ones()
    }

    pub fn is_subset(&self, other: &CpuSet) -> bool {
        self.iter().all(|cpu| other.contains(cpu))
    }

}

impl FromIterator<CpuId> for CpuSet {
    fn from_iter<I: IntoIterator<Item = CpuId>>(iter: I) -> Self {
        Self::from_cpus(iter)
    }
}

/// Cpulist form, e.g. `0-3,8`.
impl fmt::Display for CpuSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        let mut ranges: Vec<(CpuId, CpuId)> = Vec::new();
        for cpu in self.iter() {
            match ranges.last_mut() {
                Some((_, end)) if *end + 1 == cpu => *end = cpu,
                _ => ranges.push((cpu, cpu)),
            }
        }
        let text = ranges
            .iter()
            .map(|&(start, end)| {
                if start == end {
                    start.to_string()
                } else {
                    format!("{start}-{end}")
                }
            })
            .join(",");
        write!(f, "{text}")
    }
}

/// Decode kernel cpumask text into a [`CpuSet`].
///
/// Only `[0-9a-fA-F,]` is accepted. Groups are concatenated into one value
/// before bits are extracted; bits at positions `>= max_cpus` are dropped.
pub fn decode(mask_text: &str, max_cpus: usize) -> DomainResult<CpuSet> {
    if let Some(bad) = mask_text
        .chars()
        .find(|c| !(c.is_ascii_hexdigit() || *c == ','))
    {
        return Err(DomainError::InvalidMask {
            mask: mask_text.to_string(),
            reason: format!("unexpected character {bad:?}"),
        });
    }

    let mut hex_str: String = mask_text.chars().filter(|c| *c != ',').collect();
    if hex_str.is_empty() {
        return Err(DomainError::InvalidMask {
            mask: mask_text.to_string(),
            reason: "no hex digits".to_string(),
        });
    }
    if hex_str.len() % 2 != 0 {
        hex_str.insert(0, '0');
    }
    let bytes = hex::decode(&hex_str).map_err(|e| DomainError::InvalidMask {
        mask: mask_text.to_string(),
        reason: e.to_string(),
    })?;

    // The text cannot set more bits than it has digits for.
    let width = max_cpus.min(bytes.len() * 8);
    let mut mask = bitvec![u64, Lsb0; 0; width];
    for (index, &val) in bytes.iter().rev().enumerate() {
        let mut v = val;
        while v != 0 {
            let lsb = v.trailing_zeros() as usize;
            v &= !(1u8 << lsb);
            let cpu = index * 8 + lsb;
            if cpu < width {
                mask.set(cpu, true);
            } else {
                trace!(cpu, max_cpus, "dropping cpu beyond mask width");
            }
        }
    }

    Ok(CpuSet::from_bitvec(mask))
}

/// Encode a [`CpuSet`] the way the kernel prints a `max_cpus`-wide cpumask.
///
/// Every group is 8 hex digits except the leading one, which only carries
/// the digits needed for `max_cpus`. CPUs `>= max_cpus` are not encoded.
pub fn encode(set: &CpuSet, max_cpus: usize) -> String {
    let nr_groups = max_cpus.div_ceil(32).max(1);
    let mut groups = vec![0u32; nr_groups];
    for cpu in set.iter().take_while(|&cpu| cpu < max_cpus) {
        groups[cpu / 32] |= 1 << (cpu % 32);
    }

    let width = match max_cpus.div_ceil(4) % 8 {
        0 => 8,
        v => v,
    };
    let mut out = String::with_capacity(nr_groups * 9);
    let mut rest = groups.iter().rev();
    if let Some(top) = rest.next() {
        out.push_str(&format!("{top:0width$x}"));
    }
    for group in rest {
        out.push_str(&format!(",{group:08x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("f", vec![0, 1, 2, 3])]
    #[case("3", vec![0, 1])]
    #[case("c", vec![2, 3])]
    #[case("00000000,00000003", vec![0, 1])]
    #[case("00000001,00000000", vec![32])]
    #[case("80000000,00000001", vec![0, 63])]
    #[case("FF", vec![0, 1, 2, 3, 4, 5, 6, 7])]
    #[case("0", vec![])]
    fn given_kernel_mask_when_decoding_then_returns_set_bits(
        #[case] text: &str,
        #[case] expected: Vec<CpuId>,
    ) {
        let set = decode(text, 1024).unwrap();
        assert_eq!(set.iter().collect::<Vec<_>>(), expected);
    }

    #[rstest]
    #[case("0xf")]
    #[case("ff ff")]
    #[case("g1")]
    #[case("")]
    #[case(",")]
    fn given_invalid_text_when_decoding_then_parse_error(#[case] text: &str) {
        let err = decode(text, 64).unwrap_err();
        assert!(matches!(err, DomainError::InvalidMask { .. }));
    }

    #[test]
    fn given_bits_beyond_width_when_decoding_then_drops_them() {
        let set = decode("1,0000000f", 4).unwrap();
        assert_eq!(set, CpuSet::from_cpus([0, 1, 2, 3]));
        assert!(!set.contains(32));
    }

    #[test]
    fn given_huge_width_when_decoding_then_sizes_to_the_text() {
        let set = decode("3", usize::MAX / 2).unwrap();
        assert_eq!(set, CpuSet::from_cpus([0, 1]));
    }

    #[test]
    fn given_different_widths_when_comparing_then_set_equality_holds() {
        let narrow = decode("3", 8).unwrap();
        let wide = decode("00000000,00000000,00000003", 96).unwrap();
        assert_eq!(narrow, wide);

        let mut seen = std::collections::HashSet::new();
        seen.insert(narrow);
        assert!(seen.contains(&wide));
    }

    #[test]
    fn given_sets_within_width_when_encoding_then_decodes_back() {
        let max_cpus = 96;
        let samples = [
            CpuSet::new(),
            CpuSet::from_cpus([0]),
            CpuSet::from_cpus([31, 32]),
            CpuSet::from_cpus([1, 17, 40, 63, 64, 95]),
            CpuSet::from_cpus(0..max_cpus),
        ];
        for set in samples {
            let text = encode(&set, max_cpus);
            assert_eq!(text.split(',').count(), 3, "{text}");
            assert_eq!(decode(&text, max_cpus).unwrap(), set, "{text}");
        }
    }

    #[test]
    fn given_narrow_width_when_encoding_then_trims_leading_group() {
        assert_eq!(encode(&CpuSet::from_cpus([0, 3]), 8), "09");
        assert_eq!(encode(&CpuSet::from_cpus([0, 33]), 40), "02,00000001");
    }

    #[test]
    fn given_cpulist_when_parsing_then_expands_ranges() {
        let set = CpuSet::from_cpulist("0-3,8,10-11\n").unwrap();
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![0, 1, 2, 3, 8, 10, 11]);
        assert_eq!(set.to_string(), "0-3,8,10-11");
        assert!(CpuSet::from_cpulist("0-x").is_err());
    }

    #[test]
    fn given_two_sets_when_comparing_then_subset_holds_one_way() {
        let a = CpuSet::from_cpus([0, 1]);
        let b = CpuSet::from_cpus([0, 1, 2, 3]);
        assert!(a.is_subset(&b));
        assert!(!b.is_subset(&a));
        assert!(!CpuSet::from_cpus([5]).is_subset(&b));
        assert!(CpuSet::new().is_subset(&a));
    }
}

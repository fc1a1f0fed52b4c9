//! Domain-name lookup from the kernel's `sched_domain` name files.
//!
//! Depending on the kernel, names live under
//! `/proc/sys/kernel/sched_domain/cpu<N>/domain<K>/name` or
//! `/sys/kernel/debug/sched/domains/cpu<N>/domain<K>/name`.

use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use crate::domain::{CpuId, DomainNames, SchedstatRecord};
use crate::infrastructure::traits::FileSystem;

/// Upper bound on `domain<K>` directories read per CPU.
pub const MAX_DOMAIN_LEVELS: usize = 16;

/// Path of the name file for `domain<index>` of `cpu` below `root`.
pub fn name_path(root: &Path, cpu: CpuId, index: usize) -> PathBuf {
    root.join(format!("cpu{cpu}"))
        .join(format!("domain{index}"))
        .join("name")
}

/// `(level, name)` pairs for one CPU, stopping at the first unreadable level.
fn read_cpu_names(fs: &dyn FileSystem, root: &Path, cpu: CpuId) -> Vec<(usize, String)> {
    (0..MAX_DOMAIN_LEVELS)
        .map_while(|index| {
            let name = fs.read_to_string(&name_path(root, cpu, index)).ok()?;
            let name = name.trim();
            (!name.is_empty()).then(|| (index + 1, name.to_string()))
        })
        .collect()
}

/// Read domain names for `reference_cpu` from the first root that has any.
///
/// With `per_cpu` non-empty the same root is also read for each listed CPU so
/// asymmetric names become visible to the builder. Unreadable names are left
/// out; the builder reports them and falls back to the `domain<K>` token.
#[instrument(level = "debug", skip(fs, per_cpu))]
pub fn read_domain_names(
    fs: &dyn FileSystem,
    roots: &[PathBuf],
    reference_cpu: CpuId,
    per_cpu: &[CpuId],
) -> DomainNames {
    let mut names = DomainNames::new();

    let Some((root, reference)) = roots.iter().find_map(|root| {
        let found = read_cpu_names(fs, root, reference_cpu);
        (!found.is_empty()).then_some((root, found))
    }) else {
        debug!("no readable domain names");
        return names;
    };

    debug!(root = %root.display(), levels = reference.len(), "domain names found");
    for (level, name) in reference {
        names.insert(level, name);
    }
    for &cpu in per_cpu.iter().filter(|&&cpu| cpu != reference_cpu) {
        for (level, name) in read_cpu_names(fs, root, cpu) {
            names.insert_for_cpu(cpu, level, name);
        }
    }
    names
}

/// Domain names printed inline by newer schedstat versions.
pub fn names_from_records(
    records: &[SchedstatRecord],
    reference_cpu: CpuId,
    per_cpu: bool,
) -> DomainNames {
    let mut names = DomainNames::new();
    for record in records {
        let is_reference = record.cpu == reference_cpu;
        if !is_reference && !per_cpu {
            continue;
        }
        for domain in &record.domains {
            let Some(name) = &domain.name else {
                continue;
            };
            if is_reference {
                names.insert(domain.index + 1, name.clone());
            } else {
                names.insert_for_cpu(record.cpu, domain.index + 1, name.clone());
            }
        }
    }
    names
}

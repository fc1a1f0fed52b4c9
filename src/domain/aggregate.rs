//! Attributes per-CPU load samples to every enclosing domain.

use generational_arena::Index;
use tracing::{debug, instrument, trace};

use crate::domain::arena::HierarchyTree;
use crate::domain::entities::{CpuId, CpuLoadSample, Load};
use crate::domain::error::{Diagnostics, DomainError, DomainResult};

/// Walks a built tree once per sampled CPU and adds the CPU's load to the
/// virtual root and to every node on its path.
///
/// After `apply`, every node's load is the sum of the sample over its
/// members and the root total is the sum of all applied samples. CPUs that
/// are absent from the sample contribute nothing. A CPU whose load would
/// overflow any accumulator on its path is reported and skipped.
#[derive(Debug, Default)]
pub struct LoadAggregator;

impl LoadAggregator {
    pub fn new() -> Self {
        Self
    }

    #[instrument(level = "debug", skip_all, fields(cpus = samples.len()))]
    pub fn apply(&self, tree: &mut HierarchyTree, samples: &CpuLoadSample) -> Diagnostics {
        let mut diagnostics = Diagnostics::new();

        for (cpu, load) in samples.iter() {
            // Resolve the whole path first so a partition violation leaves
            // every accumulator untouched.
            let path = match path_to(tree, cpu) {
                Ok(path) => path,
                Err(e) => {
                    diagnostics.push(e);
                    continue;
                }
            };
            if path.is_empty() {
                debug!(cpu, "cpu not present in hierarchy");
            }
            match add_along(tree, &path, cpu, load) {
                Ok(()) => trace!(cpu, load, depth = path.len(), "load attributed"),
                Err(e) => diagnostics.push(e),
            }
        }

        diagnostics
    }
}

/// Indices of the nodes containing `cpu`, from the top level down.
pub fn path_to(tree: &HierarchyTree, cpu: CpuId) -> DomainResult<Vec<Index>> {
    let mut path = Vec::new();
    let mut current: Option<Index> = None;

    loop {
        let mut matches = tree.children_of(current).iter().copied().filter(|&idx| {
            tree.get_node(idx)
                .map(|node| node.members().contains(cpu))
                .unwrap_or(false)
        });
        let Some(next) = matches.next() else {
            break;
        };
        let extra = matches.count();
        if extra > 0 {
            let level = tree.get_node(next).map(|n| n.level()).unwrap_or_default();
            return Err(DomainError::PartitionViolation {
                cpu,
                level,
                count: extra + 1,
            });
        }

        path.push(next);
        current = Some(next);
    }

    Ok(path)
}

/// Add `load` to the root and every node on `path`, or to none of them if
/// any accumulator would overflow.
fn add_along(
    tree: &mut HierarchyTree,
    path: &[Index],
    cpu: CpuId,
    load: Load,
) -> DomainResult<()> {
    let overflow = || DomainError::LoadOverflow { cpu, load };

    let root = tree.root_load().checked_add(load).ok_or_else(overflow)?;
    let sums = path
        .iter()
        .map(|&idx| {
            let current = tree.get_node(idx).map_or(0, |node| node.load);
            current.checked_add(load).ok_or_else(overflow)
        })
        .collect::<DomainResult<Vec<Load>>>()?;

    tree.set_root_load(root);
    for (&idx, sum) in path.iter().zip(sums) {
        if let Some(node) = tree.get_node_mut(idx) {
            node.load = sum;
        }
    }
    Ok(())
}

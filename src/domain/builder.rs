//! Merges per-CPU domain chains into one deduplicated hierarchy.

use std::collections::{HashMap, HashSet};

use generational_arena::Index;
use tracing::{debug, instrument, trace};

use crate::domain::arena::{DomainNode, HierarchyTree};
use crate::domain::entities::{
    domain_token, DomainKey, DomainNames, PerCpuChain, SchedstatRecord, LEAF_LEVEL, LEAF_TYPE,
};
use crate::domain::error::{Diagnostics, DomainError, DomainResult};

/// A built hierarchy together with everything that went wrong building it.
#[derive(Debug)]
pub struct BuildOutput {
    pub tree: HierarchyTree,
    pub diagnostics: Diagnostics,
}

/// One step of a chain walk: the key to find or create and its type name.
struct Step {
    key: DomainKey,
    type_name: String,
    /// The type name is the `domain<K>` fallback.
    unnamed: bool,
    is_leaf_cpu: bool,
}

/// Constructs a [`HierarchyTree`] from [`PerCpuChain`]s.
///
/// Structurally identical domains reached from different CPUs resolve to the
/// same node through a key to index table that only lives for the build.
pub struct HierarchyBuilder<'a> {
    names: &'a DomainNames,
    tree: HierarchyTree,
    index: HashMap<DomainKey, Index>,
    diagnostics: Diagnostics,
    missing_levels: HashSet<usize>,
}

impl<'a> HierarchyBuilder<'a> {
    pub fn new(names: &'a DomainNames) -> Self {
        Self {
            names,
            tree: HierarchyTree::new(),
            index: HashMap::new(),
            diagnostics: Diagnostics::new(),
            missing_levels: HashSet::new(),
        }
    }

    /// Build a tree from already decoded chains.
    #[instrument(level = "debug", skip_all, fields(chains = chains.len()))]
    pub fn build(mut self, chains: &[PerCpuChain]) -> BuildOutput {
        for chain in chains {
            self.add_chain(chain);
        }
        self.finish()
    }

    /// Decode tokenized schedstat records and build a tree from them.
    ///
    /// Records whose masks do not decode are reported and skipped.
    #[instrument(level = "debug", skip_all, fields(records = records.len()))]
    pub fn build_records(mut self, records: &[SchedstatRecord], max_cpus: usize) -> BuildOutput {
        for record in records {
            match PerCpuChain::from_record(record, max_cpus) {
                Ok(chain) => {
                    self.add_chain(&chain);
                }
                Err(e) => self.diagnostics.push(e),
            }
        }
        self.finish()
    }

    /// Merge one chain into the tree.
    ///
    /// Returns false if the chain was rejected; the tree is then unchanged.
    pub fn add_chain(&mut self, chain: &PerCpuChain) -> bool {
        debug!(cpu = chain.cpu, links = chain.links.len(), "adding chain");
        if let Err(e) = validate(chain) {
            self.diagnostics.push(e);
            return false;
        }

        let steps = self.steps(chain);
        let (parent, first_new) = match self.plan(chain, &steps) {
            Ok(planned) => planned,
            Err(e) => {
                self.diagnostics.push(e);
                return false;
            }
        };

        let mut parent = parent;
        for step in steps.into_iter().skip(first_new) {
            if step.unnamed {
                self.note_missing_name(step.key.level, &step.type_name);
            }
            let node = if step.is_leaf_cpu {
                DomainNode::cpu_leaf(chain.cpu)
            } else {
                DomainNode::domain(step.key.clone(), step.type_name)
            };
            trace!(key = %step.key, "creating node");
            let idx = self.tree.insert_node(node, parent);
            self.index.insert(step.key, idx);
            parent = Some(idx);
        }
        true
    }

    pub fn finish(self) -> BuildOutput {
        debug!(
            nodes = self.tree.len(),
            diagnostics = self.diagnostics.len(),
            "build finished"
        );
        BuildOutput {
            tree: self.tree,
            diagnostics: self.diagnostics,
        }
    }

    fn steps(&self, chain: &PerCpuChain) -> Vec<Step> {
        let mut steps: Vec<Step> = chain
            .links
            .iter()
            .map(|link| {
                let (type_name, unnamed) = match self.names.get(chain.cpu, link.level) {
                    Some(name) => (name.to_string(), false),
                    None => (domain_token(link.level), true),
                };
                Step {
                    key: link.key(),
                    type_name,
                    unnamed,
                    is_leaf_cpu: false,
                }
            })
            .collect();
        steps.push(Step {
            key: DomainKey::leaf(chain.cpu),
            type_name: LEAF_TYPE.to_string(),
            unnamed: false,
            is_leaf_cpu: true,
        });
        steps
    }

    /// Walk the existing tree along `steps` without mutating it.
    ///
    /// Returns the deepest reused node and the index of the first step that
    /// needs a new node.
    fn plan(&self, chain: &PerCpuChain, steps: &[Step]) -> DomainResult<(Option<Index>, usize)> {
        let mut parent = None;
        let mut first_new = None;

        for (i, step) in steps.iter().enumerate() {
            let existing = self.index.get(&step.key).copied();
            match (existing, first_new) {
                (Some(idx), None) => {
                    let node = self.tree.get_node(idx).ok_or_else(|| identity(chain, step))?;
                    if node.parent != parent {
                        return Err(identity(chain, step));
                    }
                    if node.type_name != step.type_name {
                        return Err(DomainError::TypeConflict {
                            cpu: chain.cpu,
                            level: step.key.level,
                            members: step.key.members.clone(),
                            existing: node.type_name.clone(),
                            found: step.type_name.clone(),
                        });
                    }
                    trace!(key = %step.key, "reusing node");
                    parent = Some(idx);
                }
                (Some(_), Some(_)) => return Err(identity(chain, step)),
                (None, None) => first_new = Some(i),
                (None, Some(_)) => {}
            }
        }

        Ok((parent, first_new.unwrap_or(steps.len())))
    }

    /// Report a missing name once per level, when a node actually uses it.
    fn note_missing_name(&mut self, level: usize, fallback: &str) {
        if self.missing_levels.insert(level) {
            self.diagnostics.push(DomainError::MissingName {
                level,
                fallback: fallback.to_string(),
            });
        }
    }
}

fn identity(chain: &PerCpuChain, step: &Step) -> DomainError {
    DomainError::IdentityConflict {
        cpu: chain.cpu,
        level: step.key.level,
        members: step.key.members.clone(),
    }
}

/// Check a chain for structural consistency before touching the tree.
fn validate(chain: &PerCpuChain) -> DomainResult<()> {
    for link in &chain.links {
        if link.level <= LEAF_LEVEL {
            return Err(DomainError::NonMonotonicLevels {
                cpu: chain.cpu,
                upper: link.level,
                lower: LEAF_LEVEL,
            });
        }
        if !link.members.contains(chain.cpu) {
            return Err(DomainError::CpuNotInDomain {
                cpu: chain.cpu,
                level: link.level,
                members: link.members.clone(),
            });
        }
    }

    for pair in chain.links.windows(2) {
        let (upper, lower) = (&pair[0], &pair[1]);
        if upper.level <= lower.level {
            return Err(DomainError::NonMonotonicLevels {
                cpu: chain.cpu,
                upper: upper.level,
                lower: lower.level,
            });
        }
        if !lower.members.is_subset(&upper.members) {
            return Err(DomainError::DomainNotNested {
                cpu: chain.cpu,
                level: lower.level,
                members: lower.members.clone(),
            });
        }
    }

    Ok(())
}

//! Topology service
//!
//! Runs one complete reporting cycle: read the procfs inputs, build the
//! domain hierarchy, attribute the load sample.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::application::{ApplicationResult, IoResultExt};
use crate::config::Settings;
use crate::domain::{
    BuildOutput, CpuId, CpuLoadSample, Diagnostics, DomainError, DomainNames, HierarchyBuilder,
    HierarchyTree, LoadAggregator, SchedstatRecord,
};
use crate::infrastructure::names::{names_from_records, read_domain_names};
use crate::infrastructure::procfs;
use crate::infrastructure::traits::FileSystem;

/// Result of one reporting cycle.
#[derive(Debug)]
pub struct CycleOutput {
    /// Aggregated hierarchy, possibly partial
    pub tree: HierarchyTree,
    /// Every non-fatal error met while reading, building and aggregating
    pub diagnostics: Diagnostics,
    /// The load sample that was applied, after zero fill
    pub sample: CpuLoadSample,
}

/// Service producing one domain hierarchy per cycle.
pub struct TopologyService {
    fs: Arc<dyn FileSystem>,
    settings: Arc<Settings>,
}

impl TopologyService {
    /// Create a new topology service.
    pub fn new(fs: Arc<dyn FileSystem>, settings: Arc<Settings>) -> Self {
        Self { fs, settings }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Read and tokenize `/proc/schedstat`. An unreadable file is fatal.
    pub fn read_schedstat(&self) -> ApplicationResult<(Vec<SchedstatRecord>, Diagnostics)> {
        let path = self.settings.schedstat_path();
        let text = self.fs.read_to_string(&path).with_path_context(&path)?;
        Ok(procfs::parse_schedstat(&text))
    }

    /// Resolve domain names once, before any building.
    ///
    /// Name files are preferred; schedstat records carrying inline names
    /// (version 17 and later) are the fallback.
    #[instrument(level = "debug", skip_all)]
    pub fn resolve_names(&self, records: &[SchedstatRecord]) -> DomainNames {
        let per_cpu: Vec<CpuId> = if self.settings.per_cpu_names {
            records.iter().map(|r| r.cpu).collect()
        } else {
            Vec::new()
        };

        let names = read_domain_names(
            self.fs.as_ref(),
            &self.settings.name_roots,
            self.settings.reference_cpu,
            &per_cpu,
        );
        if !names.is_empty() {
            return names;
        }
        debug!("falling back to inline schedstat names");
        names_from_records(
            records,
            self.settings.reference_cpu,
            self.settings.per_cpu_names,
        )
    }

    /// Read the names the way the first cycle would.
    pub fn load_names(&self) -> ApplicationResult<DomainNames> {
        let (records, _) = self.read_schedstat()?;
        Ok(self.resolve_names(&records))
    }

    /// One full cycle, resolving names from the current inputs.
    pub fn run_cycle(&self) -> ApplicationResult<CycleOutput> {
        let (records, diagnostics) = self.read_schedstat()?;
        let names = self.resolve_names(&records);
        self.cycle(&records, diagnostics, &names)
    }

    /// One full cycle with names resolved earlier.
    pub fn run_cycle_with(&self, names: &DomainNames) -> ApplicationResult<CycleOutput> {
        let (records, diagnostics) = self.read_schedstat()?;
        self.cycle(&records, diagnostics, names)
    }

    #[instrument(level = "debug", skip_all, fields(records = records.len()))]
    fn cycle(
        &self,
        records: &[SchedstatRecord],
        mut diagnostics: Diagnostics,
        names: &DomainNames,
    ) -> ApplicationResult<CycleOutput> {
        let BuildOutput {
            mut tree,
            diagnostics: built,
        } = HierarchyBuilder::new(names).build_records(records, self.settings.max_cpus);
        diagnostics.extend(built);

        let mut sample = self.read_sample(&mut diagnostics)?;
        match self.read_optional(&self.settings.cpuinfo_path(), &mut diagnostics) {
            Some(text) => sample.fill_missing(procfs::parse_cpuinfo(&text)),
            None => sample.fill_missing(tree.leaf_cpus()),
        }

        diagnostics.extend(LoadAggregator::new().apply(&mut tree, &sample));
        info!(
            nodes = tree.len(),
            depth = tree.depth(),
            total = tree.root_load(),
            diagnostics = diagnostics.len(),
            "cycle complete"
        );

        Ok(CycleOutput {
            tree,
            diagnostics,
            sample,
        })
    }

    fn read_sample(&self, diagnostics: &mut Diagnostics) -> ApplicationResult<CpuLoadSample> {
        let path = self.settings.sched_debug_path();
        let Some(text) = self.read_optional(&path, diagnostics) else {
            warn!("no load sample, every cpu counts as idle");
            return Ok(CpuLoadSample::new());
        };
        Ok(procfs::parse_sched_debug(&text)?)
    }

    /// Optional inputs degrade to a MissingData diagnostic.
    fn read_optional(&self, path: &Path, diagnostics: &mut Diagnostics) -> Option<String> {
        match self.fs.read_to_string(path) {
            Ok(text) => Some(text),
            Err(e) => {
                diagnostics.push(DomainError::MissingInput {
                    what: format!("{}: {}", path.display(), e),
                });
                None
            }
        }
    }
}

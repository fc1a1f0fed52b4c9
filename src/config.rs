//! Configuration management with layered loading
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. Global config: `$XDG_CONFIG_HOME/schedtree/schedtree.toml`
//! 3. Explicit config file (`--config <file>`)
//! 4. Environment variables: `SCHEDTREE_*` prefix
//!
//! Command-line flags are applied on top by the CLI.

use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::application::ApplicationError;
use crate::domain::CpuId;

/// Largest `max_cpus` accepted; the kernel's `NR_CPUS` ceiling.
pub const MAX_CPUS_LIMIT: usize = 8192;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "SCHEDTREE";

/// Unified configuration for schedtree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Width of every cpumask; bits at or above it are dropped
    pub max_cpus: usize,
    /// Directory holding `schedstat`, `sched_debug` and `cpuinfo`
    pub proc_root: PathBuf,
    /// Directories searched, in order, for `cpu<N>/domain<K>/name`
    pub name_roots: Vec<PathBuf>,
    /// CPU whose domain names label every level
    pub reference_cpu: CpuId,
    /// Read names for every CPU instead of only the reference CPU
    pub per_cpu_names: bool,
    /// Seconds between cycles in watch mode
    pub interval_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_cpus: 1024,
            proc_root: PathBuf::from("/proc"),
            name_roots: vec![
                PathBuf::from("/proc/sys/kernel/sched_domain"),
                PathBuf::from("/sys/kernel/debug/sched/domains"),
            ],
            reference_cpu: 0,
            per_cpu_names: false,
            interval_secs: 5,
        }
    }
}

/// Raw settings for intermediate parsing (`None` means "not specified").
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawSettings {
    pub max_cpus: Option<usize>,
    pub proc_root: Option<PathBuf>,
    pub name_roots: Option<Vec<PathBuf>>,
    pub reference_cpu: Option<CpuId>,
    pub per_cpu_names: Option<bool>,
    pub interval_secs: Option<u64>,
}

/// Get the XDG config directory for schedtree.
pub fn global_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "schedtree").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("schedtree.toml"))
}

/// Load a TOML file into RawSettings for manual merging.
fn load_raw_settings(path: &Path) -> Result<RawSettings, ApplicationError> {
    let content = std::fs::read_to_string(path).map_err(|e| ApplicationError::Config {
        message: format!("read {}: {}", path.display(), e),
    })?;
    toml::from_str(&content).map_err(|e| ApplicationError::Config {
        message: format!("parse {}: {}", path.display(), e),
    })
}

fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    match shellexpand::full(raw.as_ref()) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => path.to_path_buf(),
    }
}

impl Settings {
    pub fn schedstat_path(&self) -> PathBuf {
        self.proc_root.join("schedstat")
    }

    pub fn sched_debug_path(&self) -> PathBuf {
        self.proc_root.join("sched_debug")
    }

    pub fn cpuinfo_path(&self) -> PathBuf {
        self.proc_root.join("cpuinfo")
    }

    /// Expand shell variables and tilde in path-like fields.
    fn expand_paths(&mut self) {
        self.proc_root = expand_path(&self.proc_root);
        self.name_roots = self.name_roots.iter().map(|p| expand_path(p)).collect();
    }

    /// Overlay wins field by field where it specifies a value.
    pub fn merge_with(&self, overlay: &RawSettings) -> Self {
        Self {
            max_cpus: overlay.max_cpus.unwrap_or(self.max_cpus),
            proc_root: overlay
                .proc_root
                .clone()
                .unwrap_or_else(|| self.proc_root.clone()),
            name_roots: overlay
                .name_roots
                .clone()
                .unwrap_or_else(|| self.name_roots.clone()),
            reference_cpu: overlay.reference_cpu.unwrap_or(self.reference_cpu),
            per_cpu_names: overlay.per_cpu_names.unwrap_or(self.per_cpu_names),
            interval_secs: overlay.interval_secs.unwrap_or(self.interval_secs),
        }
    }

    /// Load settings with layered precedence.
    ///
    /// # Arguments
    /// * `explicit` - Optional config file given on the command line; unlike
    ///   the global file it must exist.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ApplicationError> {
        let mut current = Self::default();

        if let Some(global_path) = global_config_path() {
            if global_path.exists() {
                debug!("global config: {}", global_path.display());
                current = current.merge_with(&load_raw_settings(&global_path)?);
            }
        }

        if let Some(path) = explicit {
            debug!("explicit config: {}", path.display());
            current = current.merge_with(&load_raw_settings(path)?);
        }

        current = current.apply_env_overrides(Self::environment())?;
        current.expand_paths();
        current.validate()?;

        Ok(current)
    }

    fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("name_roots")
    }

    /// Apply `SCHEDTREE_*` variables as explicit overrides.
    fn apply_env_overrides(mut self, env: Environment) -> Result<Self, ApplicationError> {
        let config = Config::builder()
            .add_source(env)
            .build()
            .map_err(config_err)?;

        if let Ok(val) = config.get::<usize>("max_cpus") {
            self.max_cpus = val;
        }
        if let Ok(val) = config.get_string("proc_root") {
            self.proc_root = PathBuf::from(val);
        }
        if let Ok(val) = config.get::<Vec<String>>("name_roots") {
            self.name_roots = val.into_iter().map(PathBuf::from).collect();
        }
        if let Ok(val) = config.get::<usize>("reference_cpu") {
            self.reference_cpu = val;
        }
        if let Ok(val) = config.get_bool("per_cpu_names") {
            self.per_cpu_names = val;
        }
        if let Ok(val) = config.get::<u64>("interval_secs") {
            self.interval_secs = val;
        }

        Ok(self)
    }

    /// Reject settings no cycle could run with.
    pub fn validate(&self) -> Result<(), ApplicationError> {
        if self.max_cpus == 0 || self.max_cpus > MAX_CPUS_LIMIT {
            return Err(ApplicationError::Config {
                message: format!(
                    "max_cpus {} is outside 1..={}",
                    self.max_cpus, MAX_CPUS_LIMIT
                ),
            });
        }
        if self.reference_cpu >= self.max_cpus {
            return Err(ApplicationError::Config {
                message: format!(
                    "reference_cpu {} is outside max_cpus {}",
                    self.reference_cpu, self.max_cpus
                ),
            });
        }
        Ok(())
    }

    /// Show the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ApplicationError> {
        toml::to_string_pretty(self).map_err(|e| ApplicationError::Config {
            message: format!("serialize config: {e}"),
        })
    }

    /// Generate a template config file.
    pub fn template() -> String {
        r#"# schedtree configuration
#
# Locations (by precedence, lowest to highest):
#   Global: ~/.config/schedtree/schedtree.toml
#   File:   schedtree --config <file>
#   Env:    SCHEDTREE_* environment variables (e.g. SCHEDTREE_MAX_CPUS=256)
#   Flags:  --proc-root, --max-cpus

# Width of every cpumask (1 to 8192); bits at or above it are ignored
# max_cpus = 1024

# Directory holding schedstat, sched_debug and cpuinfo
# proc_root = "/proc"

# Where to look for cpu<N>/domain<K>/name, first match wins
# name_roots = ["/proc/sys/kernel/sched_domain", "/sys/kernel/debug/sched/domains"]

# CPU whose domain names label every level
# reference_cpu = 0

# Read names for every CPU; disagreements are reported as type conflicts
# per_cpu_names = false

# Seconds between cycles for `schedtree watch`
# interval_secs = 5
"#
        .to_string()
    }
}

fn config_err(e: ConfigError) -> ApplicationError {
    ApplicationError::Config {
        message: e.to_string(),
    }
}

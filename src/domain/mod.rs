//! Domain layer: scheduling-domain model and algorithms
//!
//! This layer is independent of external concerns (no I/O, no CLI, no config loading).
//! It consumes tokenized schedstat records, an immutable name lookup and a
//! load sample, and produces one aggregated hierarchy per reporting cycle.

pub mod aggregate;
pub mod arena;
pub mod builder;
pub mod cpuset;
pub mod entities;
pub mod error;
pub mod report;

pub use aggregate::LoadAggregator;
pub use arena::{DomainNode, HierarchyTree};
pub use builder::{BuildOutput, HierarchyBuilder};
pub use cpuset::{decode, encode, CpuSet};
pub use entities::*;
pub use error::{Diagnostics, DomainError, DomainResult, ErrorKind};
pub use report::{LevelLoads, NodeView, Report};

//! schedtree: rebuild the kernel's scheduling-domain hierarchy from
//! `/proc/schedstat` and attribute per-CPU run-queue load to every domain.

pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod exitcode;
pub mod infrastructure;
pub mod util;

//! Infrastructure layer: procfs readers, tokenizers and DI container
//!
//! This layer implements the I/O boundary and wires up services.

pub mod di;
pub mod error;
pub mod names;
pub mod procfs;
pub mod traits;

pub use error::{InfraError, InfraResult};

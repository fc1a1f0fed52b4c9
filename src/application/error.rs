//! Application-level errors
//!
//! Domain problems are collected as diagnostics, so only input, pattern and
//! configuration failures abort a cycle.

use std::path::PathBuf;
use thiserror::Error;

/// Failures that stop a cycle before any tree is built.
#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("cannot read {path}: {source}")]
    Input {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("config error: {message}")]
    Config { message: String },
}

/// Result type for application layer operations.
pub type ApplicationResult<T> = Result<T, ApplicationError>;

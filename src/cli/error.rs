//! CLI-level errors (wraps infrastructure errors)

use thiserror::Error;

use crate::application::ApplicationError;
use crate::infrastructure::InfraError;

/// CLI errors are the top-level error type.
/// These are what get displayed to the user.
#[derive(Error, Debug)]
pub enum CliError {
    #[error("{0}")]
    Infra(#[from] InfraError),

    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("{0}")]
    Usage(String),

    /// `--strict` run that met parse or integrity diagnostics.
    #[error("{count} parse/integrity diagnostic(s) in strict mode")]
    Strict { count: usize },
}

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

impl From<ApplicationError> for CliError {
    fn from(e: ApplicationError) -> Self {
        CliError::Infra(InfraError::Application(e))
    }
}

impl CliError {
    /// Get the appropriate exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::InvalidArgs(_) | CliError::Usage(_) => crate::exitcode::USAGE,
            CliError::Strict { .. } => crate::exitcode::DATAERR,
            CliError::Infra(e) => match e {
                InfraError::Io { .. } => crate::exitcode::IOERR,
                InfraError::Application(app) => match app {
                    ApplicationError::Config { .. } => crate::exitcode::CONFIG,
                    ApplicationError::Input { .. } => crate::exitcode::NOINPUT,
                    ApplicationError::Pattern(_) => crate::exitcode::SOFTWARE,
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn given_unreadable_schedstat_when_mapping_then_exits_noinput() {
        let err: CliError = ApplicationError::Input {
            path: PathBuf::from("/proc/schedstat"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        }
        .into();
        assert_eq!(err.exit_code(), crate::exitcode::NOINPUT);
    }

    #[test]
    fn given_strict_failure_when_mapping_then_exits_dataerr() {
        assert_eq!(CliError::Strict { count: 2 }.exit_code(), crate::exitcode::DATAERR);
    }

    #[test]
    fn given_bad_pattern_when_mapping_then_exits_software() {
        let source = regex::Regex::new("(").unwrap_err();
        let err: CliError = ApplicationError::Pattern(source).into();
        assert_eq!(err.exit_code(), crate::exitcode::SOFTWARE);
    }
}

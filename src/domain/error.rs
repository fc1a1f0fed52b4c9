//! Domain-level errors (no external dependencies)

use std::fmt;

use thiserror::Error;

use crate::domain::cpuset::CpuSet;
use crate::domain::entities::CpuId;

/// Coarse classification of a [`DomainError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed input: the offending record is skipped.
    Parse,
    /// Input contradicts the topology invariants.
    Integrity,
    /// Optional data was unavailable; a fallback was used.
    MissingData,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Parse => write!(f, "parse"),
            ErrorKind::Integrity => write!(f, "integrity"),
            ErrorKind::MissingData => write!(f, "missing data"),
        }
    }
}

/// Domain errors represent malformed or contradictory topology input.
///
/// None of them is fatal inside the core: builder and aggregator collect them
/// into [`Diagnostics`] and keep going with the remaining input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid cpumask {mask:?}: {reason}")]
    InvalidMask { mask: String, reason: String },

    #[error("cpu{cpu}: domain levels not strictly decreasing ({upper} then {lower})")]
    NonMonotonicLevels {
        cpu: CpuId,
        upper: usize,
        lower: usize,
    },

    #[error("cpu{cpu}: not a member of its own level {level} domain {members}")]
    CpuNotInDomain {
        cpu: CpuId,
        level: usize,
        members: CpuSet,
    },

    #[error("cpu{cpu}: level {level} domain {members} is not contained in its parent")]
    DomainNotNested {
        cpu: CpuId,
        level: usize,
        members: CpuSet,
    },

    #[error("cpu{cpu} is out of range (max {max_cpus})")]
    CpuOutOfRange { cpu: CpuId, max_cpus: usize },

    #[error("malformed record at line {line}: {message}")]
    MalformedRecord { line: usize, message: String },

    #[error("level {level} domain {members}: type {existing:?} conflicts with {found:?} seen from cpu{cpu}")]
    TypeConflict {
        cpu: CpuId,
        level: usize,
        members: CpuSet,
        existing: String,
        found: String,
    },

    #[error("cpu{cpu}: level {level} domain {members} already exists under a different parent")]
    IdentityConflict {
        cpu: CpuId,
        level: usize,
        members: CpuSet,
    },

    #[error("cpu{cpu} belongs to {count} sibling domains at level {level}")]
    PartitionViolation {
        cpu: CpuId,
        level: usize,
        count: usize,
    },

    #[error("cpu{cpu}: load {load} overflows the accumulated total")]
    LoadOverflow { cpu: CpuId, load: u64 },

    #[error("no name for domain level {level}, using {fallback:?}")]
    MissingName { level: usize, fallback: String },

    #[error("input unavailable: {what}")]
    MissingInput { what: String },
}

impl DomainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::InvalidMask { .. }
            | DomainError::NonMonotonicLevels { .. }
            | DomainError::CpuNotInDomain { .. }
            | DomainError::DomainNotNested { .. }
            | DomainError::CpuOutOfRange { .. }
            | DomainError::MalformedRecord { .. } => ErrorKind::Parse,
            DomainError::TypeConflict { .. }
            | DomainError::IdentityConflict { .. }
            | DomainError::PartitionViolation { .. }
            | DomainError::LoadOverflow { .. } => ErrorKind::Integrity,
            DomainError::MissingName { .. } | DomainError::MissingInput { .. } => {
                ErrorKind::MissingData
            }
        }
    }
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

/// Non-fatal errors collected during one reporting cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    errors: Vec<DomainError>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: DomainError) {
        tracing::debug!(kind = %error.kind(), "{}", error);
        self.errors.push(error);
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.errors.extend(other.errors);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DomainError> {
        self.errors.iter()
    }

    /// Errors of the given kind, in the order they were recorded.
    pub fn of_kind(&self, kind: ErrorKind) -> impl Iterator<Item = &DomainError> {
        self.errors.iter().filter(move |e| e.kind() == kind)
    }

    pub fn has_kind(&self, kind: ErrorKind) -> bool {
        self.of_kind(kind).next().is_some()
    }
}

impl IntoIterator for Diagnostics {
    type Item = DomainError;
    type IntoIter = std::vec::IntoIter<DomainError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}

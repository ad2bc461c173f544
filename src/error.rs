use crate::{NodeId, Sequence};
use num_bigint::BigInt;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use thiserror::Error;

/// A malformed line. The line is skipped and processing continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LineError {
    #[error("[{kind}] doesn't have at least {expected} parts (found {found}), skip!")]
    TooFewFields {
        kind: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("unknown record tag {0:?}, skip!")]
    UnknownTag(String),
    #[error("field {field} is not a number: {value:?}, skip!")]
    InvalidNumber { field: &'static str, value: String },
}

/// A state violation between the two traces. Always fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TraceError {
    #[error("control packet with sequence {0} registered twice")]
    DuplicateRegistration(Sequence),
    #[error("cannot find control packet with sequence {0}")]
    UnknownSequence(Sequence),
    #[error("duplicate allocating control packet with sequence {0}")]
    DuplicateAllocation(Sequence),
    #[error("freeing control packet with sequence {0} before allocating it")]
    FreeBeforeAllocate(Sequence),
    #[error("duplicate freeing control packet with sequence {0}")]
    DuplicateFree(Sequence),
    #[error("freeing an extra seq=0, no node allocated its first entry yet")]
    EmptyFirstEntryQueue,
    #[error("multiple allocation for a control packet")]
    MultipleAllocations,
    #[error("no allocation for a control packet")]
    MissingAllocation,
    #[error("sequence 0 is the reserved first-entry slot and cannot be allocated")]
    ReservedAllocation,
    #[error("cannot find node id {0}")]
    UnknownNode(NodeId),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArithmeticError {
    #[error("{dividend} / {divisor} is not exact at scale {scale}")]
    Inexact {
        dividend: BigInt,
        divisor: BigInt,
        scale: u32,
    },
}

/// `path:line` of the record that triggered an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceLocation {
    pub path: PathBuf,
    pub line: u64,
}

impl Display for TraceLocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.path.display(), self.line)
    }
}

#[derive(Debug, Error)]
pub enum CalcError {
    #[error("{location} {source}")]
    Trace {
        location: TraceLocation,
        source: TraceError,
    },
    #[error(transparent)]
    Arithmetic(#[from] ArithmeticError),
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot create lifetime histogram: {0}")]
    Histogram(String),
}

impl CalcError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> CalcError {
        let path = path.into();
        move |source| CalcError::Io { path, source }
    }
}

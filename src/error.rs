use crate::coder::CoderError;
use crate::position::Position;
use std::io;

/// A cross-stage disagreement about ground truth. Always fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityViolation {
    /// The feature generator emitted a position no filtered truth alignment covers.
    OutsideCoverage { contig: String, position: Position },
    /// A reference column has no truth label.
    MissingLabel { contig: String, position: Position },
}

impl std::fmt::Display for IntegrityViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntegrityViolation::OutsideCoverage { contig, position } => write!(
                f,
                "position {} on {} lies outside every filtered truth alignment",
                position, contig
            ),
            IntegrityViolation::MissingLabel { contig, position } => write!(
                f,
                "no label mapping for reference column {} on {}",
                position, contig
            ),
        }
    }
}

#[derive(Debug)]
pub enum DataError {
    /// No truth alignment survived for a region. The region is skipped.
    NoAlignments { region: String },
    Integrity(IntegrityViolation),
    Configuration(String),
    Coder(CoderError),
    Format(String),
    Io(io::Error),
}

impl DataError {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, DataError::NoAlignments { .. })
    }
}

impl std::fmt::Display for DataError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataError::NoAlignments { region } => write!(f, "No truth alignments for {}", region),
            DataError::Integrity(v) => write!(f, "Integrity violation: {}", v),
            DataError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            DataError::Coder(e) => write!(f, "{}", e),
            DataError::Format(msg) => write!(f, "Invalid data: {}", msg),
            DataError::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for DataError {}

impl From<io::Error> for DataError {
    fn from(e: io::Error) -> Self {
        DataError::Io(e)
    }
}

impl From<CoderError> for DataError {
    fn from(e: CoderError) -> Self {
        DataError::Coder(e)
    }
}

impl From<IntegrityViolation> for DataError {
    fn from(v: IntegrityViolation) -> Self {
        DataError::Integrity(v)
    }
}

impl From<DataError> for io::Error {
    fn from(e: DataError) -> Self {
        match e {
            DataError::Io(e) => e,
            DataError::Configuration(_) => io::Error::new(io::ErrorKind::InvalidInput, e.to_string()),
            DataError::Format(_) => io::Error::new(io::ErrorKind::InvalidData, e.to_string()),
            other => io::Error::other(other.to_string()),
        }
    }
}

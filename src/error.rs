use core::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::{error, io};

use thiserror::Error;

use crate::digest::HexDigest;
use crate::digest_map::MapError;

pub type Result<T, E = OcflError> = core::result::Result<T, E>;

/// Library errors
#[derive(Error)]
pub enum OcflError {
    #[error("Object {object_id} is corrupt: {message}")]
    CorruptObject { object_id: String, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Illegal argument: {0}")]
    IllegalArgument(String),

    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("{path} is not a regular file")]
    InvalidFileType { path: String },

    #[error(transparent)]
    InvalidMap(#[from] MapError),

    #[error("{path} failed fixity check: {}", join_mismatches(.mismatches))]
    FixityCheck {
        path: String,
        mismatches: Vec<DigestMismatch>,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Commit(#[from] Box<CommitError>),

    #[error("{0}")]
    General(String),

    #[error("{0}")]
    Io(io::Error),

    #[error("{0}")]
    Wrapped(Box<dyn error::Error + Send + Sync>),
}

/// A single content digest that did not match its expected value. All mismatches for one
/// file are reported together, not just the first.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DigestMismatch {
    pub algorithm: String,
    pub expected: HexDigest,
    pub found: HexDigest,
}

/// Error returned by a failed commit. `dirty` indicates whether the target directory may
/// contain a partial write.
#[derive(Error, Debug)]
#[error("Failed to commit version: {source}{}", dirty_suffix(.dirty))]
pub struct CommitError {
    pub dirty: bool,
    #[source]
    pub source: Box<OcflError>,
}

fn dirty_suffix(dirty: &bool) -> &'static str {
    if *dirty {
        " (the object may contain a partial version)"
    } else {
        ""
    }
}

impl CommitError {
    pub fn clean(source: OcflError) -> Self {
        Self {
            dirty: false,
            source: Box::new(source),
        }
    }

    pub fn dirty(source: OcflError) -> Self {
        Self {
            dirty: true,
            source: Box::new(source),
        }
    }
}

impl DigestMismatch {
    pub fn new(
        algorithm: impl Into<String>,
        expected: HexDigest,
        found: HexDigest,
    ) -> DigestMismatch {
        DigestMismatch {
            algorithm: algorithm.into(),
            expected,
            found,
        }
    }
}

impl Display for DigestMismatch {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} expected {} but found {}",
            self.algorithm, self.expected, self.found
        )
    }
}

fn join_mismatches(mismatches: &[DigestMismatch]) -> String {
    let parts: Vec<String> = mismatches.iter().map(|m| m.to_string()).collect();
    parts.join("; ")
}

/// Constructs an `OcflError::NotFound` for an object or object version
pub fn not_found(object_id: &str, version_num: Option<crate::types::VersionNum>) -> OcflError {
    match version_num {
        Some(version) => OcflError::NotFound(format!("Object {} version {}", object_id, version)),
        None => OcflError::NotFound(format!("Object {}", object_id)),
    }
}

impl Debug for OcflError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

impl From<io::Error> for OcflError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::NotFound {
            OcflError::NotFound(e.to_string())
        } else {
            OcflError::Io(e)
        }
    }
}

impl From<serde_json::Error> for OcflError {
    fn from(e: serde_json::Error) -> Self {
        OcflError::Wrapped(Box::new(e))
    }
}

impl From<CommitError> for OcflError {
    fn from(e: CommitError) -> Self {
        OcflError::Commit(Box::new(e))
    }
}

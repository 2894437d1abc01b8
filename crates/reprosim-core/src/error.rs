//! Error types for the engine.
//!
//! "Valid identifier, no instance present" is normal control flow and is
//! expressed as `Option`, never as an error. The enums here cover the
//! genuinely exceptional paths: contract violations at call boundaries,
//! unregistered type identifiers, and malformed saved state.

use std::fmt;

/// Errors from reproductive-system operations.
#[derive(Debug)]
pub enum SystemError {
    /// A tracker with this identifier is already registered on the system.
    DuplicateTracker(&'static str),
}

impl fmt::Display for SystemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SystemError::DuplicateTracker(id) => {
                write!(f, "tracker '{}' already exists on this system", id)
            }
        }
    }
}

impl std::error::Error for SystemError {}

/// Tracker-local simulation failures.
///
/// Caught at the system's per-tracker dispatch boundary and logged; sibling
/// trackers are unaffected.
#[derive(Debug)]
pub enum TrackerError {
    /// A weighted probability table had no positive-weight entries.
    EmptyTable(&'static str),
}

impl fmt::Display for TrackerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackerError::EmptyTable(label) => {
                write!(f, "weighted table '{}' has no drawable entries", label)
            }
        }
    }
}

impl std::error::Error for TrackerError {}

/// Save/load failures.
#[derive(Debug)]
pub enum PersistError {
    Io(std::io::Error),
    Bincode(Box<bincode::ErrorKind>),
    VersionMismatch { expected: u32, found: u32 },
    /// Saved state names a tracker type no registry entry exists for.
    UnknownTracker(String),
    /// Saved container state names an effect/handler type with no registry entry.
    UnknownHosted(String),
    /// A state field was present but held the wrong value kind.
    BadField { key: String, expected: &'static str },
}

impl From<std::io::Error> for PersistError {
    fn from(e: std::io::Error) -> Self {
        PersistError::Io(e)
    }
}

impl From<Box<bincode::ErrorKind>> for PersistError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        PersistError::Bincode(e)
    }
}

impl fmt::Display for PersistError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistError::Io(e) => write!(f, "IO error: {}", e),
            PersistError::Bincode(e) => write!(f, "Serialization error: {}", e),
            PersistError::VersionMismatch { expected, found } => {
                write!(
                    f,
                    "Save version mismatch: expected {}, found {}",
                    expected, found
                )
            }
            PersistError::UnknownTracker(id) => write!(f, "unknown tracker type '{}'", id),
            PersistError::UnknownHosted(id) => write!(f, "unknown effect/handler type '{}'", id),
            PersistError::BadField { key, expected } => {
                write!(f, "state field '{}' is not a {}", key, expected)
            }
        }
    }
}

impl std::error::Error for PersistError {}

/// Invalid settings values, rejected at the setter boundary.
#[derive(Debug)]
pub enum SettingsError {
    NonPositive { name: &'static str, value: f64 },
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingsError::NonPositive { name, value } => {
                write!(f, "setting '{}' must be positive, got {}", name, value)
            }
        }
    }
}

impl std::error::Error for SettingsError {}

/// A guide-group matcher failure; treated as non-matching by the registry.
#[derive(Debug)]
pub struct MatcherError {
    pub message: String,
}

impl fmt::Display for MatcherError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "matcher failed: {}", self.message)
    }
}

impl std::error::Error for MatcherError {}

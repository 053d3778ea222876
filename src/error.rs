//! Error types for statusbuf

use std::io;
use thiserror::Error;

/// Result type for status buffer operations
pub type Result<T> = std::result::Result<T, StatusError>;

/// Errors that can occur while accessing a status region
#[derive(Debug, Error)]
pub enum StatusError {
    /// Region key override is too long for a shm name
    #[error("Region key too long: max {max} chars, got {got}")]
    KeyTooLong { max: usize, got: usize },

    /// Region key override contains forbidden characters
    #[error("Invalid region key: {reason}")]
    InvalidKey { reason: &'static str },

    /// Failed to create a shared memory segment (owner side)
    #[error("Failed to create shared memory '{name}': {source}")]
    ShmCreate {
        name: String,
        #[source]
        source: io::Error,
    },

    /// Failed to attach to an existing shared memory segment
    #[error("Failed to attach to shared memory '{name}': {source}")]
    ShmOpen {
        name: String,
        #[source]
        source: io::Error,
    },

    /// Failed to map a segment into the address space
    #[error("Failed to map memory: {0}")]
    Mmap(#[source] io::Error),

    /// Failed to size a freshly created segment
    #[error("Failed to set shared memory size: {0}")]
    Truncate(#[source] io::Error),

    /// Attached segment is smaller than the status region layout requires
    #[error("Shared memory '{name}' too small: need {expected} bytes, got {got}")]
    RegionSize {
        name: String,
        expected: usize,
        got: usize,
    },

    /// Lock segment does not carry the expected magic number
    #[error("Invalid lock magic number: expected 0x{expected:08X}, got 0x{got:08X}")]
    InvalidMagic { expected: u32, got: u32 },

    /// The lock primitive itself failed
    #[error("Region lock failure: {0}")]
    Lock(#[source] io::Error),

    /// Lock acquisition exceeded the configured timeout
    #[error("Timed out waiting for the region lock")]
    LockTimeout,

    /// No room left before the end marker for a new card
    #[error("Status region full: {cards} cards in use")]
    CapacityExhausted { cards: usize },

    /// Region holds no end-marker card; refusing to mutate it
    #[error("Status region has no end-marker card")]
    EndMarkerMissing,

    /// Keyword rejected before any buffer access
    #[error("Invalid keyword {keyword:?}: {reason}")]
    InvalidKeyword {
        keyword: String,
        reason: &'static str,
    },

    /// Keyword is present but its value does not parse as the requested type
    #[error("Value {value:?} for keyword {keyword:?} is not numeric")]
    MalformedValue { keyword: String, value: String },
}

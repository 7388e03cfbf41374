//! Cache store error types
//!
//! These never leave the store. Each variant maps to a fixed recovery:
//! corruption deletes the record, other I/O and allocation failures become a
//! miss and leave the file alone.

use std::io;

#[derive(Debug, thiserror::Error)]
pub(crate) enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Bad magic number {0:#010x}")]
    BadMagic(u32),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Stored key {found:?} does not match requested key {expected:?}")]
    KeyMismatch { expected: String, found: String },

    #[error("Cannot allocate {0} bytes for cached payload")]
    OutOfResource(u64),
}

impl CacheError {
    /// Whether the backing file should be deleted when this error is seen
    ///
    /// Short reads and undecodable bytes are corruption, and so is a file
    /// that vanished from under its index entry. Other I/O failures are
    /// transient.
    pub(crate) fn is_corruption(&self) -> bool {
        match self {
            CacheError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::UnexpectedEof | io::ErrorKind::InvalidData | io::ErrorKind::NotFound
            ),
            CacheError::BadMagic(_) | CacheError::Corrupt(_) => true,
            CacheError::KeyMismatch { .. } | CacheError::OutOfResource(_) => false,
        }
    }
}

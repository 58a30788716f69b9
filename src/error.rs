//! Error types for the register simulator.

use std::io;
use thiserror::Error;

/// Result type alias for simulator operations.
pub type Result<T> = std::result::Result<T, SimError>;

/// Errors that can occur while building, running, or reading the simulated
/// register image.
#[derive(Debug, Error)]
pub enum SimError {
    /// A configuration row could not be parsed. The row is skipped and
    /// ingestion continues.
    #[error("config row {line}: {reason}")]
    ConfigParse {
        /// 1-based row number in the configuration input.
        line: u64,
        /// Description of the parse failure.
        reason: String,
    },

    /// A tag descriptor carries values that cannot drive a waveform
    /// (for example `min > max` or a non-positive step or period).
    #[error("invalid descriptor '{tag}': {reason}")]
    InvalidDescriptor {
        /// Tag address in `DB<n>,REAL<offset>` form.
        tag: String,
        /// Description of the invalid field.
        reason: String,
    },

    /// A read or write exceeds the bounds of a region buffer.
    #[error("out of range: offset {offset} + length {len} exceeds {size} byte buffer")]
    OutOfRange {
        /// Starting byte offset of the access.
        offset: usize,
        /// Length of the access in bytes.
        len: usize,
        /// Size of the target buffer in bytes.
        size: usize,
    },

    /// A remote device reported a failure for a read request. Always scoped
    /// to a single item or batch; sibling items are unaffected.
    #[error("remote read failed: {reason}")]
    RemoteRead {
        /// Description of the remote failure.
        reason: String,
    },

    /// The external protocol stack rejected a region at registration time.
    #[error("failed to register area {area}: {reason}")]
    Registration {
        /// Display name of the rejected area (e.g. `DB101`).
        area: String,
        /// Description reported by the registrar.
        reason: String,
    },

    /// I/O error while reading configuration input.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl SimError {
    /// Creates a new `ConfigParse` error.
    ///
    /// # Example
    ///
    /// ```
    /// use s7_regsim::SimError;
    ///
    /// let err = SimError::config_parse(3, "expected 5 fields, got 2");
    /// ```
    pub fn config_parse(line: u64, reason: impl Into<String>) -> Self {
        Self::ConfigParse {
            line,
            reason: reason.into(),
        }
    }

    /// Creates a new `InvalidDescriptor` error.
    ///
    /// # Example
    ///
    /// ```
    /// use s7_regsim::SimError;
    ///
    /// let err = SimError::invalid_descriptor("DB1,REAL0", "step must be positive");
    /// ```
    pub fn invalid_descriptor(tag: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDescriptor {
            tag: tag.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new `OutOfRange` error.
    ///
    /// # Example
    ///
    /// ```
    /// use s7_regsim::SimError;
    ///
    /// let err = SimError::out_of_range(10, 4, 12);
    /// ```
    pub fn out_of_range(offset: usize, len: usize, size: usize) -> Self {
        Self::OutOfRange { offset, len, size }
    }

    /// Creates a new `RemoteRead` error.
    pub fn remote_read(reason: impl Into<String>) -> Self {
        Self::RemoteRead {
            reason: reason.into(),
        }
    }

    /// Creates a new `Registration` error.
    pub fn registration(area: impl std::fmt::Display, reason: impl Into<String>) -> Self {
        Self::Registration {
            area: area.to_string(),
            reason: reason.into(),
        }
    }
}

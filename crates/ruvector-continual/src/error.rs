//! Error types for the continual-learning engine
//!
//! Configuration problems fail fast at construction. Checkpoint problems are
//! reported to the caller as recoverable faults. Data-volume conditions (full
//! buffer, too few trajectories to extract patterns) are never errors.

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, ContinualError>;

/// Main error type for the continual-learning engine
#[derive(Error, Debug)]
pub enum ContinualError {
    /// Invalid configuration (rank above dimension, zero capacity, ...)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Vector length does not match the configured embedding dimension
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Configured dimension
        expected: usize,
        /// Dimension that was supplied
        actual: usize,
    },

    /// Checkpoint content does not match its integrity hash
    #[error("Integrity error: expected hash {expected}, computed {actual}")]
    Integrity {
        /// Hash stored in the checkpoint
        expected: String,
        /// Hash recomputed from the loaded state
        actual: String,
    },

    /// Checkpoint written by a format version this build cannot read
    #[error("Unsupported checkpoint format version {found} (supported: {supported})")]
    UnsupportedFormat {
        /// Version found in the document
        found: u32,
        /// Version this build writes and reads
        supported: u32,
    },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ContinualError {
    /// Whether the caller can recover by discarding the checkpoint and
    /// continuing with a cold-started engine.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ContinualError::Integrity { .. }
                | ContinualError::UnsupportedFormat { .. }
                | ContinualError::Io(_)
                | ContinualError::Serialization(_)
        )
    }
}

impl From<serde_json::Error> for ContinualError {
    fn from(err: serde_json::Error) -> Self {
        ContinualError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for ContinualError {
    fn from(err: toml::de::Error) -> Self {
        ContinualError::Config(err.to_string())
    }
}

//! Errors in the library.
use thiserror::Error;

/// Errors in the library.
///
/// Functions in this workspace return [`anyhow::Result`]; these variants are
/// wrapped in it and can be recovered with [`anyhow::Error::downcast_ref`].
#[derive(Error, Debug)]
pub enum OffrlError {
    /// Invalid configuration, raised at construction.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Tensors that must agree in shape do not.
    #[error("Losses shape mismatch: {0}")]
    ShapeMismatch(String),

    /// A key is missing in a batch.
    #[error("Key not found in batch: {0}")]
    MissingKey(String),

    /// A tensor does not carry the batch dimensions of its container.
    #[error("Batch size error: {0}")]
    BatchSize(String),

    /// Record key error.
    #[error("Record key error: {0}")]
    RecordKeyError(String),

    /// Record value type error.
    #[error("Record value type error: {0}")]
    RecordValueTypeError(String),
}

//! Error types for the stand-up trainer.

use thiserror::Error;

/// Errors produced while loading models, stepping the simulation, training
/// the policy or persisting checkpoints.
#[derive(Debug, Error)]
pub enum Error {
    /// Filesystem error while reading a model or writing a checkpoint.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The model description file is not valid JSON for a body description.
    #[error("failed to parse model description: {0}")]
    ModelParse(#[source] serde_json::Error),

    /// The model description parsed but describes an unusable body.
    #[error("invalid model description: {0}")]
    InvalidModel(String),

    /// The checkpoint blob could not be encoded or decoded.
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] bincode::Error),

    /// Normalizer statistics could not be encoded or decoded.
    #[error("JSON error: {0}")]
    Json(#[source] serde_json::Error),

    /// A vector did not have the dimensionality fixed at construction.
    #[error("shape mismatch for {what}: expected {expected}, got {actual}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A transition was pushed into a full experience buffer.
    #[error("experience buffer is full (capacity {capacity})")]
    BufferFull { capacity: usize },

    /// NaN or infinity showed up where a finite number is required.
    #[error("non-finite value in {0}")]
    NonFinite(&'static str),

    /// Tensor data could not be read back from the backend.
    #[error("tensor error: {0}")]
    Tensor(String),

    /// The burn recorder failed to save or load policy weights.
    #[error("recorder error: {0}")]
    Recorder(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Reads a float tensor back into a `Vec<f32>`.
pub(crate) fn tensor_to_vec(data: burn::tensor::TensorData) -> Result<Vec<f32>> {
    data.to_vec::<f32>()
        .map_err(|e| Error::Tensor(format!("{e:?}")))
}

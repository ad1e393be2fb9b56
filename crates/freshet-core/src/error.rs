use crate::dtype::DType;
use crate::shape::Shape;

/// All errors that can occur within Freshet.
///
/// One error type across the workspace: tensor-level failures, optimizer
/// construction/validation failures, blob-metadata lookups, and compute
/// backend dispatch failures all land here, which keeps propagation with
/// `?` uniform across crates.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Shape mismatch between two tensors or blobs.
    #[error("shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: Shape, got: Shape },

    /// DType mismatch between operands.
    #[error("dtype mismatch: expected {expected}, got {got}")]
    DTypeMismatch { expected: DType, got: DType },

    /// Dimension index out of range for the shape's rank.
    #[error("dimension out of range: dim {dim} for rank {rank}")]
    DimOutOfRange { dim: usize, rank: usize },

    /// Element count mismatch when creating a tensor from a slice.
    #[error("element count mismatch: shape {shape} requires {expected} elements, got {got}")]
    ElementCountMismatch {
        shape: Shape,
        expected: usize,
        got: usize,
    },

    /// An optimizer hyperparameter failed construction-time validation.
    /// Raised eagerly; invalid values are never silently corrected.
    #[error("invalid hyperparameter {name}: {value}")]
    InvalidHyperparameter { name: &'static str, value: f64 },

    /// A parameter that is not a leaf (and therefore not optimizable) was
    /// handed to an optimizer.
    #[error("parameter {name:?} is not a leaf tensor and cannot be optimized")]
    NonLeafParameter { name: String },

    /// The job-metadata registry has no record for a logical blob name.
    #[error("unknown logical blob name {lbn:?} in job {job:?}")]
    UnknownBlobName { job: String, lbn: String },

    /// The compute backend failed to execute a dispatched op. Fatal; the
    /// failed call is never retried.
    #[error("backend dispatch failed in {op}: {reason}")]
    BackendDispatch { op: &'static str, reason: String },

    /// A blob handle was queried, or an op was built, after its owning job
    /// context was finalized.
    #[error("job {job:?} is already finalized")]
    JobContextFinalized { job: String },

    /// Generic message for cases not covered above.
    #[error("{0}")]
    Msg(String),
}

impl Error {
    /// Create an error from any string message.
    pub fn msg(s: impl Into<String>) -> Self {
        Error::Msg(s.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

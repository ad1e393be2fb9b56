//! # freshet
//!
//! Umbrella crate for the Freshet deep-learning framework core.
//!
//! Re-exports the tensor primitives (`freshet-core`), the blob/graph layer
//! (`freshet-graph`), and the optimizer (`freshet-optim`), and adds
//! persistence for the finalized job descriptor.

pub mod descriptor_io;

pub use freshet_core::{Error, Result};

/// Everything most callers need, in one import.
pub mod prelude {
    pub use freshet_core::{
        AdamUpdateAttrs, Backend, CpuBackend, CpuDevice, CpuTensor, DType, Error, Result, Shape,
        Tensor,
    };
    pub use freshet_graph::{
        ops, remote_blob, BlobHandle, BlobMeta, ConsistentBlob, Distribute, InMemoryMetadata,
        JobConf, JobContext, LogicalBlobId, MirrorBlob, TrainConf, VariableConf,
    };
    pub use freshet_optim::{Adam, GroupOptions, ParamGroup, ParamId, Parameter};
}

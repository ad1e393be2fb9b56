//! # freshet-graph
//!
//! The graph-construction side of Freshet: logical blob identities, the
//! job-metadata query surface, blob handles over consistent and mirrored
//! tensors, symbolic op builders, and the serializable job descriptor.
//!
//! Nothing in this crate executes numerics. Building an op records it in
//! the owning [`JobContext`]; resolving a blob attribute is a synchronous
//! metadata query. The compiled descriptor is consumed by an external
//! graph compiler at job-finalization time.

pub mod blob;
pub mod blob_id;
pub mod descriptor;
pub mod job;
pub mod metadata;
pub mod ops;

pub use blob::{remote_blob, BlobHandle, ConsistentBlob, MirrorBlob};
pub use blob_id::{Distribute, LogicalBlobId};
pub use descriptor::{
    AdamConf, ClipConf, JobConf, OpConf, OptimizerConf, ParallelConf, TrainConf, VariableConf,
};
pub use job::JobContext;
pub use metadata::{BlobMeta, InMemoryMetadata, MetadataQuery, MetadataRegistry};

use std::sync::Arc;

use freshet_core::{DType, Result, Shape};

use crate::blob_id::{Distribute, LogicalBlobId};
use crate::descriptor::ParallelConf;
use crate::job::JobContext;
use crate::metadata::MetadataQuery;

// Blob handles — Logical tensor references inside a job under construction
//
// A handle names a logical blob and resolves its attributes on demand
// through the owning context's metadata provider. The variant is decided
// ONCE, by the `remote_blob` factory: a consistent blob has a single
// physical tensor and routes to the plain query entry points; a mirrored
// blob fans out into per-shard sub-blobs and routes its own (logical,
// unsharded) attributes to the mirror-prefixed entry points, while each
// child describes one physical shard.
//
// Handles deliberately do NOT implement symbolic comparison through
// operator traits; `ops::equal` and friends build comparison ops, and
// identity lives on `LogicalBlobId`.

#[derive(Clone)]
struct BlobCore {
    ctx: Arc<JobContext>,
    lbi: LogicalBlobId,
    lbn: String,
    /// Local override consulted before the remote `disable_boxing` query.
    disable_boxing_override: Option<bool>,
    distribute: Distribute,
}

impl BlobCore {
    fn new(ctx: Arc<JobContext>, lbi: LogicalBlobId) -> Self {
        let lbn = lbi.lbn();
        BlobCore {
            ctx,
            lbi,
            lbn,
            disable_boxing_override: None,
            distribute: Distribute::Auto,
        }
    }
}

/// A logical blob with a single physical tensor.
#[derive(Clone)]
pub struct ConsistentBlob {
    core: BlobCore,
}

impl ConsistentBlob {
    pub(crate) fn new(ctx: Arc<JobContext>, lbi: LogicalBlobId) -> Self {
        ConsistentBlob {
            core: BlobCore::new(ctx, lbi),
        }
    }

    pub fn lbi(&self) -> &LogicalBlobId {
        &self.core.lbi
    }

    pub fn lbn(&self) -> &str {
        &self.core.lbn
    }

    pub fn job_name(&self) -> &str {
        self.core.ctx.job_name()
    }

    pub fn distribute(&self) -> Distribute {
        self.core.distribute
    }

    pub(crate) fn set_distribute(&mut self, distribute: Distribute) {
        self.core.distribute = distribute;
    }

    pub(crate) fn context(&self) -> &Arc<JobContext> {
        &self.core.ctx
    }

    pub fn static_shape(&self) -> Result<Shape> {
        let c = &self.core;
        c.ctx.ensure_open()?;
        c.ctx.metadata().static_shape(c.ctx.job_name(), &c.lbn)
    }

    pub fn dtype(&self) -> Result<DType> {
        let c = &self.core;
        c.ctx.ensure_open()?;
        c.ctx.metadata().data_type(c.ctx.job_name(), &c.lbn)
    }

    pub fn batch_axis(&self) -> Result<Option<usize>> {
        let c = &self.core;
        c.ctx.ensure_open()?;
        c.ctx.metadata().batch_axis(c.ctx.job_name(), &c.lbn)
    }

    pub fn is_dynamic(&self) -> Result<bool> {
        let c = &self.core;
        c.ctx.ensure_open()?;
        c.ctx.metadata().is_dynamic(c.ctx.job_name(), &c.lbn)
    }

    pub fn disable_boxing(&self) -> Result<bool> {
        let c = &self.core;
        c.ctx.ensure_open()?;
        if let Some(v) = c.disable_boxing_override {
            return Ok(v);
        }
        c.ctx.metadata().disable_boxing(c.ctx.job_name(), &c.lbn)
    }

    /// Set the local `disable_boxing` override; later reads return this
    /// value without consulting the metadata service.
    pub fn set_disable_boxing(&mut self, value: bool) {
        self.core.disable_boxing_override = Some(value);
    }

    pub fn is_tensor_list(&self) -> Result<bool> {
        let c = &self.core;
        c.ctx.ensure_open()?;
        c.ctx.metadata().is_tensor_list(c.ctx.job_name(), &c.lbn)
    }

    pub fn parallel_conf(&self) -> Result<ParallelConf> {
        let c = &self.core;
        c.ctx.ensure_open()?;
        c.ctx.metadata().parallel_conf(c.ctx.job_name(), &c.lbn)
    }
}

impl std::fmt::Debug for ConsistentBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ConsistentBlob({}:{})", self.job_name(), self.lbn())
    }
}

/// A logical blob replicated/sharded across per-shard sub-blobs.
///
/// The mirror's own attributes describe the logical (unsharded) view; the
/// per-shard physical views live on its children. The child list is
/// resolved eagerly at construction and owned exclusively by this handle.
#[derive(Clone)]
pub struct MirrorBlob {
    core: BlobCore,
    sub_consistent_blobs: Vec<ConsistentBlob>,
}

impl MirrorBlob {
    pub(crate) fn new(ctx: Arc<JobContext>, lbi: LogicalBlobId) -> Result<Self> {
        let core = BlobCore::new(ctx, lbi);
        let job = core.ctx.job_name().to_string();
        let num_sub = core
            .ctx
            .metadata()
            .mirror_blob_num_sub_lbi(&job, &core.lbn)?;
        let mut sub_consistent_blobs = Vec::with_capacity(num_sub);
        for i in 0..num_sub {
            let sub_lbi = core
                .ctx
                .metadata()
                .mirror_blob_sub_lbi(&job, &core.lbn, i)?;
            sub_consistent_blobs.push(ConsistentBlob::new(Arc::clone(&core.ctx), sub_lbi));
        }
        Ok(MirrorBlob {
            core,
            sub_consistent_blobs,
        })
    }

    pub fn lbi(&self) -> &LogicalBlobId {
        &self.core.lbi
    }

    pub fn lbn(&self) -> &str {
        &self.core.lbn
    }

    pub fn job_name(&self) -> &str {
        self.core.ctx.job_name()
    }

    pub fn distribute(&self) -> Distribute {
        self.core.distribute
    }

    pub(crate) fn set_distribute(&mut self, distribute: Distribute) {
        self.core.distribute = distribute;
    }

    pub(crate) fn context(&self) -> &Arc<JobContext> {
        &self.core.ctx
    }

    /// The per-shard sub-blobs, in shard order. May be empty.
    pub fn sub_consistent_blobs(&self) -> &[ConsistentBlob] {
        &self.sub_consistent_blobs
    }

    pub fn static_shape(&self) -> Result<Shape> {
        let c = &self.core;
        c.ctx.ensure_open()?;
        c.ctx
            .metadata()
            .mirror_static_shape(c.ctx.job_name(), &c.lbn)
    }

    pub fn dtype(&self) -> Result<DType> {
        let c = &self.core;
        c.ctx.ensure_open()?;
        c.ctx.metadata().mirror_data_type(c.ctx.job_name(), &c.lbn)
    }

    pub fn batch_axis(&self) -> Result<Option<usize>> {
        let c = &self.core;
        c.ctx.ensure_open()?;
        c.ctx
            .metadata()
            .mirror_batch_axis(c.ctx.job_name(), &c.lbn)
    }

    pub fn is_dynamic(&self) -> Result<bool> {
        let c = &self.core;
        c.ctx.ensure_open()?;
        c.ctx
            .metadata()
            .mirror_is_dynamic(c.ctx.job_name(), &c.lbn)
    }

    pub fn disable_boxing(&self) -> Result<bool> {
        let c = &self.core;
        c.ctx.ensure_open()?;
        if let Some(v) = c.disable_boxing_override {
            return Ok(v);
        }
        c.ctx
            .metadata()
            .mirror_disable_boxing(c.ctx.job_name(), &c.lbn)
    }

    /// Set the local `disable_boxing` override; later reads return this
    /// value without consulting the metadata service.
    pub fn set_disable_boxing(&mut self, value: bool) {
        self.core.disable_boxing_override = Some(value);
    }

    pub fn is_tensor_list(&self) -> Result<bool> {
        let c = &self.core;
        c.ctx.ensure_open()?;
        c.ctx
            .metadata()
            .mirror_is_tensor_list(c.ctx.job_name(), &c.lbn)
    }

    pub fn parallel_conf(&self) -> Result<ParallelConf> {
        let c = &self.core;
        c.ctx.ensure_open()?;
        c.ctx
            .metadata()
            .mirror_parallel_conf(c.ctx.job_name(), &c.lbn)
    }
}

impl std::fmt::Debug for MirrorBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "MirrorBlob({}:{}, {} sub-blobs)",
            self.job_name(),
            self.lbn(),
            self.sub_consistent_blobs.len()
        )
    }
}

/// A blob handle: one of the two variants, decided at construction.
#[derive(Debug, Clone)]
pub enum BlobHandle {
    Consistent(ConsistentBlob),
    Mirror(MirrorBlob),
}

/// Resolve a logical blob into the matching handle variant.
///
/// Classifies the blob through one `is_mirror_blob` query, then constructs
/// the variant; a mirrored blob eagerly resolves its sub-blob list.
pub fn remote_blob(ctx: &Arc<JobContext>, lbi: LogicalBlobId) -> Result<BlobHandle> {
    ctx.ensure_open()?;
    let lbn = lbi.lbn();
    if ctx.metadata().is_mirror_blob(ctx.job_name(), &lbn)? {
        Ok(BlobHandle::Mirror(MirrorBlob::new(Arc::clone(ctx), lbi)?))
    } else {
        Ok(BlobHandle::Consistent(ConsistentBlob::new(
            Arc::clone(ctx),
            lbi,
        )))
    }
}

impl BlobHandle {
    pub fn lbi(&self) -> &LogicalBlobId {
        match self {
            BlobHandle::Consistent(b) => b.lbi(),
            BlobHandle::Mirror(b) => b.lbi(),
        }
    }

    pub fn lbn(&self) -> &str {
        match self {
            BlobHandle::Consistent(b) => b.lbn(),
            BlobHandle::Mirror(b) => b.lbn(),
        }
    }

    pub fn job_name(&self) -> &str {
        match self {
            BlobHandle::Consistent(b) => b.job_name(),
            BlobHandle::Mirror(b) => b.job_name(),
        }
    }

    pub fn is_mirror(&self) -> bool {
        matches!(self, BlobHandle::Mirror(_))
    }

    pub fn as_mirror(&self) -> Option<&MirrorBlob> {
        match self {
            BlobHandle::Mirror(b) => Some(b),
            BlobHandle::Consistent(_) => None,
        }
    }

    pub fn as_consistent(&self) -> Option<&ConsistentBlob> {
        match self {
            BlobHandle::Consistent(b) => Some(b),
            BlobHandle::Mirror(_) => None,
        }
    }

    pub(crate) fn context(&self) -> &Arc<JobContext> {
        match self {
            BlobHandle::Consistent(b) => b.context(),
            BlobHandle::Mirror(b) => b.context(),
        }
    }

    pub fn distribute(&self) -> Distribute {
        match self {
            BlobHandle::Consistent(b) => b.distribute(),
            BlobHandle::Mirror(b) => b.distribute(),
        }
    }

    /// A fresh handle to the same logical blob carrying the given
    /// placement annotation.
    pub fn with_distribute(&self, distribute: Distribute) -> Result<BlobHandle> {
        let mut handle = remote_blob(self.context(), self.lbi().clone())?;
        match &mut handle {
            BlobHandle::Consistent(b) => b.set_distribute(distribute),
            BlobHandle::Mirror(b) => b.set_distribute(distribute),
        }
        Ok(handle)
    }

    pub fn static_shape(&self) -> Result<Shape> {
        match self {
            BlobHandle::Consistent(b) => b.static_shape(),
            BlobHandle::Mirror(b) => b.static_shape(),
        }
    }

    pub fn dtype(&self) -> Result<DType> {
        match self {
            BlobHandle::Consistent(b) => b.dtype(),
            BlobHandle::Mirror(b) => b.dtype(),
        }
    }

    pub fn batch_axis(&self) -> Result<Option<usize>> {
        match self {
            BlobHandle::Consistent(b) => b.batch_axis(),
            BlobHandle::Mirror(b) => b.batch_axis(),
        }
    }

    pub fn is_dynamic(&self) -> Result<bool> {
        match self {
            BlobHandle::Consistent(b) => b.is_dynamic(),
            BlobHandle::Mirror(b) => b.is_dynamic(),
        }
    }

    pub fn disable_boxing(&self) -> Result<bool> {
        match self {
            BlobHandle::Consistent(b) => b.disable_boxing(),
            BlobHandle::Mirror(b) => b.disable_boxing(),
        }
    }

    pub fn set_disable_boxing(&mut self, value: bool) {
        match self {
            BlobHandle::Consistent(b) => b.set_disable_boxing(value),
            BlobHandle::Mirror(b) => b.set_disable_boxing(value),
        }
    }

    pub fn is_tensor_list(&self) -> Result<bool> {
        match self {
            BlobHandle::Consistent(b) => b.is_tensor_list(),
            BlobHandle::Mirror(b) => b.is_tensor_list(),
        }
    }

    pub fn parallel_conf(&self) -> Result<ParallelConf> {
        match self {
            BlobHandle::Consistent(b) => b.parallel_conf(),
            BlobHandle::Mirror(b) => b.parallel_conf(),
        }
    }
}

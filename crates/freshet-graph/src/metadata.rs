use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use freshet_core::{DType, Error, Result, Shape};

use crate::blob_id::LogicalBlobId;
use crate::descriptor::ParallelConf;

// Job-metadata service — The query surface blob handles resolve against
//
// Every blob attribute a handle exposes routes to one of these entry
// points. Consistent blobs use the plain entries; mirrored blobs use the
// mirror-prefixed ones, which describe the logical (unsharded) view while
// the per-shard views live on the mirror's child blobs. The split is
// load-bearing and mirrors the service boundary of the real system.
//
// `InMemoryMetadata` is the process-local implementation used for tests
// and for single-process graph construction. It counts queries so tests
// can assert that local overrides short-circuit the service.

/// Everything the registry knows about one logical blob.
#[derive(Debug, Clone)]
pub struct BlobMeta {
    pub shape: Shape,
    pub dtype: DType,
    pub batch_axis: Option<usize>,
    pub is_dynamic: bool,
    pub disable_boxing: bool,
    pub is_tensor_list: bool,
    pub parallel_conf: ParallelConf,
    /// For a mirrored blob: the identities of its per-shard sub-blobs,
    /// in shard order. `None` marks a consistent blob.
    pub sub_lbis: Option<Vec<LogicalBlobId>>,
}

impl BlobMeta {
    /// A consistent blob with default placement, batch axis 0, and no
    /// dynamic/tensor-list flags. Matches what input-blob registration
    /// produces for a plain dense input.
    pub fn new(shape: impl Into<Shape>, dtype: DType) -> Self {
        BlobMeta {
            shape: shape.into(),
            dtype,
            batch_axis: Some(0),
            is_dynamic: false,
            disable_boxing: false,
            is_tensor_list: false,
            parallel_conf: ParallelConf::default(),
            sub_lbis: None,
        }
    }

    pub fn with_batch_axis(mut self, batch_axis: Option<usize>) -> Self {
        self.batch_axis = batch_axis;
        self
    }

    pub fn with_is_dynamic(mut self, is_dynamic: bool) -> Self {
        self.is_dynamic = is_dynamic;
        self
    }

    pub fn with_disable_boxing(mut self, disable_boxing: bool) -> Self {
        self.disable_boxing = disable_boxing;
        self
    }

    pub fn with_is_tensor_list(mut self, is_tensor_list: bool) -> Self {
        self.is_tensor_list = is_tensor_list;
        self
    }

    pub fn with_parallel_conf(mut self, parallel_conf: ParallelConf) -> Self {
        self.parallel_conf = parallel_conf;
        self
    }

    /// Mark this blob mirrored, fanning out into the given sub-blobs.
    pub fn with_sub_lbis(mut self, sub_lbis: Vec<LogicalBlobId>) -> Self {
        self.sub_lbis = Some(sub_lbis);
        self
    }
}

/// The job-metadata query surface.
///
/// All queries are synchronous and idempotent for the lifetime of the
/// owning job-construction context. Unknown lbns fail with
/// [`Error::UnknownBlobName`].
pub trait MetadataQuery: Send + Sync {
    fn is_mirror_blob(&self, job: &str, lbn: &str) -> Result<bool>;

    fn static_shape(&self, job: &str, lbn: &str) -> Result<Shape>;
    fn data_type(&self, job: &str, lbn: &str) -> Result<DType>;
    fn batch_axis(&self, job: &str, lbn: &str) -> Result<Option<usize>>;
    fn is_dynamic(&self, job: &str, lbn: &str) -> Result<bool>;
    fn disable_boxing(&self, job: &str, lbn: &str) -> Result<bool>;
    fn is_tensor_list(&self, job: &str, lbn: &str) -> Result<bool>;
    fn parallel_conf(&self, job: &str, lbn: &str) -> Result<ParallelConf>;

    fn mirror_static_shape(&self, job: &str, lbn: &str) -> Result<Shape>;
    fn mirror_data_type(&self, job: &str, lbn: &str) -> Result<DType>;
    fn mirror_batch_axis(&self, job: &str, lbn: &str) -> Result<Option<usize>>;
    fn mirror_is_dynamic(&self, job: &str, lbn: &str) -> Result<bool>;
    fn mirror_disable_boxing(&self, job: &str, lbn: &str) -> Result<bool>;
    fn mirror_is_tensor_list(&self, job: &str, lbn: &str) -> Result<bool>;
    fn mirror_parallel_conf(&self, job: &str, lbn: &str) -> Result<ParallelConf>;

    fn mirror_blob_num_sub_lbi(&self, job: &str, lbn: &str) -> Result<usize>;
    fn mirror_blob_sub_lbi(&self, job: &str, lbn: &str, index: usize) -> Result<LogicalBlobId>;
}

/// Query surface plus registration, for providers that also serve as the
/// graph-construction sink (derived blobs produced by op builders).
pub trait MetadataRegistry: MetadataQuery {
    fn add_blob(&self, job: &str, lbi: &LogicalBlobId, meta: BlobMeta) -> Result<()>;
}

/// Process-local metadata registry with query counting.
#[derive(Default)]
pub struct InMemoryMetadata {
    blobs: RwLock<HashMap<(String, String), BlobMeta>>,
    queries: AtomicUsize,
}

impl InMemoryMetadata {
    pub fn new() -> Self {
        InMemoryMetadata::default()
    }

    /// Register a blob definition under `(job, lbi)`. Later registrations
    /// replace earlier ones, which keeps test setup simple.
    pub fn register(&self, job: &str, lbi: &LogicalBlobId, meta: BlobMeta) {
        let mut blobs = self.blobs.write().expect("metadata lock poisoned");
        blobs.insert((job.to_string(), lbi.lbn()), meta);
    }

    /// Number of queries served so far. Local attribute overrides on blob
    /// handles must NOT show up here.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::Relaxed)
    }

    fn lookup<T>(
        &self,
        job: &str,
        lbn: &str,
        f: impl FnOnce(&BlobMeta) -> T,
    ) -> Result<T> {
        self.queries.fetch_add(1, Ordering::Relaxed);
        let blobs = self.blobs.read().expect("metadata lock poisoned");
        match blobs.get(&(job.to_string(), lbn.to_string())) {
            Some(meta) => Ok(f(meta)),
            None => {
                log::trace!("metadata miss: job={job} lbn={lbn}");
                Err(Error::UnknownBlobName {
                    job: job.to_string(),
                    lbn: lbn.to_string(),
                })
            }
        }
    }

    fn lookup_mirror<T>(
        &self,
        job: &str,
        lbn: &str,
        f: impl FnOnce(&BlobMeta, &[LogicalBlobId]) -> T,
    ) -> Result<T> {
        self.lookup(job, lbn, |meta| {
            meta.sub_lbis
                .as_ref()
                .map(|subs| f(meta, subs))
                .ok_or_else(|| {
                    Error::msg(format!("blob {lbn:?} in job {job:?} is not mirrored"))
                })
        })?
    }
}

impl MetadataQuery for InMemoryMetadata {
    fn is_mirror_blob(&self, job: &str, lbn: &str) -> Result<bool> {
        self.lookup(job, lbn, |m| m.sub_lbis.is_some())
    }

    fn static_shape(&self, job: &str, lbn: &str) -> Result<Shape> {
        self.lookup(job, lbn, |m| m.shape.clone())
    }

    fn data_type(&self, job: &str, lbn: &str) -> Result<DType> {
        self.lookup(job, lbn, |m| m.dtype)
    }

    fn batch_axis(&self, job: &str, lbn: &str) -> Result<Option<usize>> {
        self.lookup(job, lbn, |m| m.batch_axis)
    }

    fn is_dynamic(&self, job: &str, lbn: &str) -> Result<bool> {
        self.lookup(job, lbn, |m| m.is_dynamic)
    }

    fn disable_boxing(&self, job: &str, lbn: &str) -> Result<bool> {
        self.lookup(job, lbn, |m| m.disable_boxing)
    }

    fn is_tensor_list(&self, job: &str, lbn: &str) -> Result<bool> {
        self.lookup(job, lbn, |m| m.is_tensor_list)
    }

    fn parallel_conf(&self, job: &str, lbn: &str) -> Result<ParallelConf> {
        self.lookup(job, lbn, |m| m.parallel_conf.clone())
    }

    fn mirror_static_shape(&self, job: &str, lbn: &str) -> Result<Shape> {
        self.lookup_mirror(job, lbn, |m, _| m.shape.clone())
    }

    fn mirror_data_type(&self, job: &str, lbn: &str) -> Result<DType> {
        self.lookup_mirror(job, lbn, |m, _| m.dtype)
    }

    fn mirror_batch_axis(&self, job: &str, lbn: &str) -> Result<Option<usize>> {
        self.lookup_mirror(job, lbn, |m, _| m.batch_axis)
    }

    fn mirror_is_dynamic(&self, job: &str, lbn: &str) -> Result<bool> {
        self.lookup_mirror(job, lbn, |m, _| m.is_dynamic)
    }

    fn mirror_disable_boxing(&self, job: &str, lbn: &str) -> Result<bool> {
        self.lookup_mirror(job, lbn, |m, _| m.disable_boxing)
    }

    fn mirror_is_tensor_list(&self, job: &str, lbn: &str) -> Result<bool> {
        self.lookup_mirror(job, lbn, |m, _| m.is_tensor_list)
    }

    fn mirror_parallel_conf(&self, job: &str, lbn: &str) -> Result<ParallelConf> {
        self.lookup_mirror(job, lbn, |m, _| m.parallel_conf.clone())
    }

    fn mirror_blob_num_sub_lbi(&self, job: &str, lbn: &str) -> Result<usize> {
        self.lookup_mirror(job, lbn, |_, subs| subs.len())
    }

    fn mirror_blob_sub_lbi(&self, job: &str, lbn: &str, index: usize) -> Result<LogicalBlobId> {
        self.lookup_mirror(job, lbn, |_, subs| {
            subs.get(index).cloned().ok_or_else(|| {
                Error::msg(format!(
                    "sub-blob index {index} out of range for {lbn:?} ({} sub-blobs)",
                    subs.len()
                ))
            })
        })?
    }
}

impl MetadataRegistry for InMemoryMetadata {
    fn add_blob(&self, job: &str, lbi: &LogicalBlobId, meta: BlobMeta) -> Result<()> {
        self.register(job, lbi, meta);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_blob_name() {
        let reg = InMemoryMetadata::new();
        let err = reg.static_shape("job", "nope/out").unwrap_err();
        assert!(matches!(err, Error::UnknownBlobName { .. }));
    }

    #[test]
    fn test_register_and_query() {
        let reg = InMemoryMetadata::new();
        let lbi = LogicalBlobId::new("images", "out");
        reg.register(
            "train",
            &lbi,
            BlobMeta::new((8, 3, 224, 224), DType::F32).with_is_dynamic(true),
        );

        assert!(!reg.is_mirror_blob("train", "images/out").unwrap());
        assert_eq!(
            reg.static_shape("train", "images/out").unwrap(),
            Shape::from(vec![8, 3, 224, 224])
        );
        assert!(reg.is_dynamic("train", "images/out").unwrap());
        assert_eq!(reg.batch_axis("train", "images/out").unwrap(), Some(0));
    }

    #[test]
    fn test_mirror_queries_require_mirror_blob() {
        let reg = InMemoryMetadata::new();
        let lbi = LogicalBlobId::new("x", "out");
        reg.register("j", &lbi, BlobMeta::new((2,), DType::F32));
        assert!(reg.mirror_static_shape("j", "x/out").is_err());
        assert!(reg.mirror_blob_num_sub_lbi("j", "x/out").is_err());
    }

    #[test]
    fn test_query_count_increments() {
        let reg = InMemoryMetadata::new();
        let lbi = LogicalBlobId::new("x", "out");
        reg.register("j", &lbi, BlobMeta::new((2,), DType::F32));
        assert_eq!(reg.query_count(), 0);
        reg.static_shape("j", "x/out").unwrap();
        reg.data_type("j", "x/out").unwrap();
        assert_eq!(reg.query_count(), 2);
    }
}

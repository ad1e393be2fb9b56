use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use freshet_core::{Error, Result};

use crate::descriptor::{JobConf, OpConf, TrainConf};
use crate::metadata::MetadataRegistry;

// JobContext — One job's graph-construction state
//
// A context owns the job name, the metadata provider every blob handle in
// the job resolves against, and the list of ops recorded by the symbolic
// builders. Construction is single-threaded per context; independent
// contexts (each with their own provider state) may be built concurrently.
//
// Finalizing a context attaches the training configuration and yields the
// serializable descriptor. After finalization the context is closed: blob
// metadata queries and op building both fail.

pub struct JobContext {
    job_name: String,
    metadata: Arc<dyn MetadataRegistry>,
    ops: RwLock<Vec<OpConf>>,
    next_op_id: AtomicU64,
    finalized: AtomicBool,
}

impl JobContext {
    pub fn new(job_name: impl Into<String>, metadata: Arc<dyn MetadataRegistry>) -> Arc<Self> {
        Arc::new(JobContext {
            job_name: job_name.into(),
            metadata,
            ops: RwLock::new(Vec::new()),
            next_op_id: AtomicU64::new(0),
            finalized: AtomicBool::new(false),
        })
    }

    /// The name of the job under construction. Every metadata query made
    /// through this context carries it.
    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    pub fn metadata(&self) -> &Arc<dyn MetadataRegistry> {
        &self.metadata
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized.load(Ordering::Acquire)
    }

    /// Fail if this context has been finalized. Called at the top of every
    /// blob accessor and op builder.
    pub fn ensure_open(&self) -> Result<()> {
        if self.is_finalized() {
            return Err(Error::JobContextFinalized {
                job: self.job_name.clone(),
            });
        }
        Ok(())
    }

    /// Allocate a fresh op name for a generated op of the given kind,
    /// unique within this context.
    pub fn fresh_op_name(&self, kind: &str) -> String {
        let id = self.next_op_id.fetch_add(1, Ordering::Relaxed);
        format!("{}_{}", kind, id)
    }

    /// Record an op produced by a symbolic builder.
    pub fn record_op(&self, op: OpConf) -> Result<()> {
        self.ensure_open()?;
        let mut ops = self.ops.write().map_err(|_| Error::msg("op list poisoned"))?;
        ops.push(op);
        Ok(())
    }

    /// Number of ops recorded so far.
    pub fn op_count(&self) -> usize {
        self.ops.read().map(|ops| ops.len()).unwrap_or(0)
    }

    /// Attach the training configuration, close the context, and produce
    /// the job descriptor. Fails if already finalized.
    pub fn finalize(&self, train_conf: TrainConf) -> Result<JobConf> {
        self.ensure_open()?;
        self.finalized.store(true, Ordering::Release);
        let ops = self.ops.read().map_err(|_| Error::msg("op list poisoned"))?;
        log::debug!(
            "finalized job {:?}: {} ops, {} optimizer conf(s)",
            self.job_name,
            ops.len(),
            train_conf.optimizer_conf.len()
        );
        Ok(JobConf {
            job_name: self.job_name.clone(),
            op_conf: ops.clone(),
            train_conf,
        })
    }
}

impl std::fmt::Debug for JobContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobContext")
            .field("job_name", &self.job_name)
            .field("ops", &self.op_count())
            .field("finalized", &self.is_finalized())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::InMemoryMetadata;

    #[test]
    fn test_finalize_closes_context() {
        let ctx = JobContext::new("train", Arc::new(InMemoryMetadata::new()));
        assert!(!ctx.is_finalized());

        let conf = ctx.finalize(TrainConf::new()).unwrap();
        assert_eq!(conf.job_name, "train");
        assert!(ctx.is_finalized());

        let err = ctx.finalize(TrainConf::new()).unwrap_err();
        assert!(matches!(err, Error::JobContextFinalized { .. }));
        assert!(ctx.record_op(OpConf {
            name: "add_0".into(),
            op_type: "add".into(),
            inputs: vec![],
            output: "add_0/out".into(),
        })
        .is_err());
    }

    #[test]
    fn test_fresh_op_names_unique() {
        let ctx = JobContext::new("j", Arc::new(InMemoryMetadata::new()));
        let a = ctx.fresh_op_name("add");
        let b = ctx.fresh_op_name("add");
        assert_ne!(a, b);
    }
}

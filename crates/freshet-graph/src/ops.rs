use std::sync::Arc;

use freshet_core::{DType, Error, Result, Shape};

use crate::blob::{remote_blob, BlobHandle};
use crate::blob_id::LogicalBlobId;
use crate::descriptor::OpConf;
use crate::metadata::{BlobMeta, MetadataRegistry};

// Symbolic op builders — Deferred graph construction over blob handles
//
// Each builder validates its operands, infers the result blob's metadata,
// registers the op and the result blob in the owning context, and returns
// a fresh handle to the result. Nothing is computed; the recorded op list
// is what the external graph compiler lowers at finalization.
//
// Comparison builders return blob handles like every other op. They are
// named functions on purpose: native `==`/`<` on handles is identity and
// ordering of the HANDLE, never a graph edge.

fn binary_op(kind: &'static str, comparison: bool, a: &BlobHandle, b: &BlobHandle) -> Result<BlobHandle> {
    let ctx = a.context();
    if !Arc::ptr_eq(ctx, b.context()) {
        return Err(Error::msg(format!(
            "operands {} and {} belong to different job contexts",
            a.lbn(),
            b.lbn()
        )));
    }
    ctx.ensure_open()?;

    let a_dtype = a.dtype()?;
    let b_dtype = b.dtype()?;
    if a_dtype != b_dtype {
        return Err(Error::DTypeMismatch {
            expected: a_dtype,
            got: b_dtype,
        });
    }
    let shape = Shape::broadcast_shape(&a.static_shape()?, &b.static_shape()?)?;
    let result_dtype = if comparison { DType::U8 } else { a_dtype };

    let op_name = ctx.fresh_op_name(kind);
    let lbi = LogicalBlobId::new(op_name.clone(), "out");
    let meta = BlobMeta::new(shape, result_dtype)
        .with_batch_axis(a.batch_axis()?)
        .with_is_dynamic(a.is_dynamic()? || b.is_dynamic()?)
        .with_parallel_conf(a.parallel_conf()?);
    ctx.metadata().add_blob(ctx.job_name(), &lbi, meta)?;
    ctx.record_op(OpConf {
        name: op_name,
        op_type: kind.to_string(),
        inputs: vec![a.lbn().to_string(), b.lbn().to_string()],
        output: lbi.lbn(),
    })?;

    remote_blob(ctx, lbi)
}

// Element-wise arithmetic

pub fn add(a: &BlobHandle, b: &BlobHandle) -> Result<BlobHandle> {
    binary_op("add", false, a, b)
}

pub fn subtract(a: &BlobHandle, b: &BlobHandle) -> Result<BlobHandle> {
    binary_op("subtract", false, a, b)
}

pub fn multiply(a: &BlobHandle, b: &BlobHandle) -> Result<BlobHandle> {
    binary_op("multiply", false, a, b)
}

pub fn divide(a: &BlobHandle, b: &BlobHandle) -> Result<BlobHandle> {
    binary_op("divide", false, a, b)
}

// Element-wise comparison (results are U8 mask blobs)

pub fn equal(a: &BlobHandle, b: &BlobHandle) -> Result<BlobHandle> {
    binary_op("equal", true, a, b)
}

pub fn not_equal(a: &BlobHandle, b: &BlobHandle) -> Result<BlobHandle> {
    binary_op("not_equal", true, a, b)
}

pub fn less(a: &BlobHandle, b: &BlobHandle) -> Result<BlobHandle> {
    binary_op("less", true, a, b)
}

pub fn less_equal(a: &BlobHandle, b: &BlobHandle) -> Result<BlobHandle> {
    binary_op("less_equal", true, a, b)
}

pub fn greater(a: &BlobHandle, b: &BlobHandle) -> Result<BlobHandle> {
    binary_op("greater", true, a, b)
}

pub fn greater_equal(a: &BlobHandle, b: &BlobHandle) -> Result<BlobHandle> {
    binary_op("greater_equal", true, a, b)
}

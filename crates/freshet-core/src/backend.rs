use crate::dtype::DType;
use crate::error::Result;
use crate::shape::Shape;
use std::fmt;

// Backend — Abstraction over compute devices
//
// The Backend trait is the op-dispatch seam between the optimizer/graph
// layers and the kernel execution engine. Each backend provides its own
// storage type plus implementations of the handful of operations this core
// dispatches: tensor creation, data movement, the fused Adam update, and
// the reductions gradient clipping needs.
//
// The kernel library proper (matmul, convolution, ...) lives behind this
// seam and is not part of this workspace.

/// Identifies a compute device (e.g., "cpu", "cuda:0").
pub trait BackendDevice: Clone + fmt::Debug + Send + Sync + 'static {
    /// A human-readable name for this device.
    fn name(&self) -> String;
}

/// A storage buffer holding tensor data on a specific device.
pub trait BackendStorage: Clone + Send + Sync + 'static {
    /// The data type of the elements in this storage.
    fn dtype(&self) -> DType;

    /// Total number of elements in this storage.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Scalar attributes of the fused Adam update op.
///
/// These travel alongside the tensor operands on every dispatch; the
/// backend is the sole interpreter of their semantics (see
/// [`Backend::adam_update`]).
#[derive(Debug, Clone, Copy)]
pub struct AdamUpdateAttrs {
    pub learning_rate: f64,
    pub bias_correction1: f64,
    pub bias_correction2: f64,
    /// Decoupled weight-decay coefficient (the descriptor calls this `l2`).
    pub l2: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    pub do_bias_correction: bool,
    pub amsgrad: bool,
    pub step: u64,
}

/// The main Backend trait. Implementing this makes a type a complete
/// compute backend for the Freshet core.
pub trait Backend: Clone + Send + Sync + fmt::Debug + 'static {
    /// The device type for this backend.
    type Device: BackendDevice;
    /// The storage type for this backend.
    type Storage: BackendStorage;

    // Creation / movement

    /// Allocate storage filled with zeros.
    fn zeros(shape: &Shape, dtype: DType, device: &Self::Device) -> Result<Self::Storage>;

    /// Create storage from a flat f64 slice, converting to the target dtype.
    fn from_f64_slice(data: &[f64], dtype: DType, device: &Self::Device) -> Result<Self::Storage>;

    /// Read storage back as a flat f64 vector.
    fn to_f64_vec(storage: &Self::Storage) -> Result<Vec<f64>>;

    // Fused optimizer update

    /// Execute the fused Adam update in place.
    ///
    /// Input slots: `model` (the parameter), `model_diff` (its gradient),
    /// `m` / `v` (first/second moments), and `max_v` (running max of `v`,
    /// present iff `attrs.amsgrad`). `model`, `m`, `v`, and `max_v` are
    /// mutated; `model_diff` is read-only. Semantics:
    ///
    /// ```text
    /// m ← β1·m + (1−β1)·g
    /// v ← β2·v + (1−β2)·g⊙g
    /// amsgrad:  max_v ← max(max_v, v), then use max_v below
    /// step_size = lr / bias_correction1        (bias correction on, else lr)
    /// denom     = √v / √bias_correction2 + ε   (bias correction on, else √v + ε)
    /// model ← model − l2·lr·model − step_size·m/denom
    /// ```
    ///
    /// Any failure is a fatal dispatch error; partial effects across the
    /// operand set are unspecified.
    fn adam_update(
        model: &mut Self::Storage,
        model_diff: &Self::Storage,
        m: &mut Self::Storage,
        v: &mut Self::Storage,
        max_v: Option<&mut Self::Storage>,
        attrs: &AdamUpdateAttrs,
    ) -> Result<()>;

    // Reductions + in-place scale (gradient clipping)

    /// Sum of |x|^p over all elements.
    fn abs_pow_sum(storage: &Self::Storage, p: f64) -> Result<f64>;

    /// Maximum of |x| over all elements (the +inf norm).
    fn abs_max(storage: &Self::Storage) -> Result<f64>;

    /// Multiply every element by `factor`, in place.
    fn scale(storage: &mut Self::Storage, factor: f64) -> Result<()>;
}

use std::sync::{Arc, RwLock};

use crate::backend::{AdamUpdateAttrs, Backend};
use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::shape::Shape;

// Tensor — Shared-storage n-dimensional array handle
//
// A Tensor is a cheap-to-clone handle: the inner data lives behind
// Arc<RwLock<Storage>> so several handles can share one buffer and in-place
// ops (the fused optimizer update, gradient scaling) stay visible to every
// holder. All tensors in this core are contiguous; shape is fixed at
// construction.

struct TensorInner<B: Backend> {
    /// The raw data stored on the backend's device.
    storage: Arc<RwLock<B::Storage>>,
    /// The shape of the tensor. Contiguous, row-major.
    shape: Shape,
    /// Data type of the elements.
    dtype: DType,
    /// The device this tensor lives on.
    device: B::Device,
}

/// An n-dimensional array of numbers on a specific backend.
pub struct Tensor<B: Backend> {
    inner: Arc<TensorInner<B>>,
}

// Manual Clone: Arc::clone is cheap (just increments a refcount).
impl<B: Backend> Clone for Tensor<B> {
    fn clone(&self) -> Self {
        Tensor {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: Backend> std::fmt::Debug for Tensor<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Tensor(shape={}, dtype={}, device={:?})",
            self.inner.shape, self.inner.dtype, self.inner.device,
        )
    }
}

impl<B: Backend> Tensor<B> {
    fn from_storage(storage: B::Storage, shape: Shape, dtype: DType, device: B::Device) -> Self {
        Tensor {
            inner: Arc::new(TensorInner {
                storage: Arc::new(RwLock::new(storage)),
                shape,
                dtype,
                device,
            }),
        }
    }

    // Creation

    /// Create a tensor filled with zeros.
    pub fn zeros(shape: impl Into<Shape>, dtype: DType, device: &B::Device) -> Result<Self> {
        let shape = shape.into();
        let storage = B::zeros(&shape, dtype, device)?;
        Ok(Self::from_storage(storage, shape, dtype, device.clone()))
    }

    /// Create a zero tensor with the same shape, dtype, and device as `other`.
    pub fn zeros_like(other: &Self) -> Result<Self> {
        Self::zeros(other.shape().clone(), other.dtype(), other.device())
    }

    /// Create a tensor from a flat slice of f64 values, converted to `dtype`.
    pub fn from_f64_slice(
        data: &[f64],
        shape: impl Into<Shape>,
        dtype: DType,
        device: &B::Device,
    ) -> Result<Self> {
        let shape = shape.into();
        if data.len() != shape.elem_count() {
            return Err(Error::ElementCountMismatch {
                shape: shape.clone(),
                expected: shape.elem_count(),
                got: data.len(),
            });
        }
        let storage = B::from_f64_slice(data, dtype, device)?;
        Ok(Self::from_storage(storage, shape, dtype, device.clone()))
    }

    // Accessors

    /// The shape of this tensor.
    pub fn shape(&self) -> &Shape {
        &self.inner.shape
    }

    /// The dimensions as a slice (shortcut for `shape().dims()`).
    pub fn dims(&self) -> &[usize] {
        self.inner.shape.dims()
    }

    /// Number of dimensions (rank).
    pub fn rank(&self) -> usize {
        self.inner.shape.rank()
    }

    /// Total number of elements.
    pub fn elem_count(&self) -> usize {
        self.inner.shape.elem_count()
    }

    /// Data type of the elements.
    pub fn dtype(&self) -> DType {
        self.inner.dtype
    }

    /// The device this tensor is on.
    pub fn device(&self) -> &B::Device {
        &self.inner.device
    }

    fn read_storage(&self) -> Result<std::sync::RwLockReadGuard<'_, B::Storage>> {
        self.inner
            .storage
            .read()
            .map_err(|_| Error::msg("storage lock poisoned"))
    }

    fn write_storage(&self) -> Result<std::sync::RwLockWriteGuard<'_, B::Storage>> {
        self.inner
            .storage
            .write()
            .map_err(|_| Error::msg("storage lock poisoned"))
    }

    /// Read the tensor back as a flat f64 vector.
    pub fn to_f64_vec(&self) -> Result<Vec<f64>> {
        let guard = self.read_storage()?;
        B::to_f64_vec(&guard)
    }

    // Dispatched ops

    fn check_operand(&self, other: &Self, slot: &'static str) -> Result<()> {
        if other.shape() != self.shape() {
            return Err(Error::ShapeMismatch {
                expected: self.shape().clone(),
                got: other.shape().clone(),
            });
        }
        if other.dtype() != self.dtype() {
            return Err(Error::DTypeMismatch {
                expected: self.dtype(),
                got: other.dtype(),
            });
        }
        // Aliased storage would deadlock on the second write lock.
        if Arc::ptr_eq(&self.inner.storage, &other.inner.storage) {
            return Err(Error::msg(format!(
                "operand {slot} aliases the model tensor's storage"
            )));
        }
        Ok(())
    }

    /// Dispatch the fused Adam update for this parameter tensor.
    ///
    /// `self` is the model slot; `model_diff` is read, `m`, `v`, and
    /// (when present) `max_v` are updated in place together with `self`.
    /// All operands must match `self` in shape and dtype.
    pub fn adam_update(
        &self,
        model_diff: &Self,
        m: &Self,
        v: &Self,
        max_v: Option<&Self>,
        attrs: &AdamUpdateAttrs,
    ) -> Result<()> {
        self.check_operand(model_diff, "model_diff")?;
        self.check_operand(m, "m")?;
        self.check_operand(v, "v")?;
        if let Some(mv) = max_v {
            self.check_operand(mv, "max_v")?;
        }

        let mut model = self.write_storage()?;
        let diff = model_diff.read_storage()?;
        let mut m_guard = m.write_storage()?;
        let mut v_guard = v.write_storage()?;
        let mut max_v_guard = match max_v {
            Some(mv) => Some(mv.write_storage()?),
            None => None,
        };

        B::adam_update(
            &mut model,
            &diff,
            &mut m_guard,
            &mut v_guard,
            max_v_guard.as_deref_mut(),
            attrs,
        )
    }

    /// Sum of |x|^p over all elements.
    pub fn abs_pow_sum(&self, p: f64) -> Result<f64> {
        let guard = self.read_storage()?;
        B::abs_pow_sum(&guard, p)
    }

    /// Maximum of |x| over all elements.
    pub fn abs_max(&self) -> Result<f64> {
        let guard = self.read_storage()?;
        B::abs_max(&guard)
    }

    /// Multiply every element by `factor`, in place.
    pub fn scale(&self, factor: f64) -> Result<()> {
        let mut guard = self.write_storage()?;
        B::scale(&mut guard, factor)
    }
}

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use freshet_core::{Backend, Error, Result, Tensor};

// Parameter — A trainable tensor with identity and an attached gradient
//
// Parameters are cheap-to-clone handles (Arc inner) so the model and the
// optimizer can hold the same parameter. The gradient slot is written by
// the external backward pass and read by the optimizer; it sits behind its
// own lock, separate from the value storage.
//
// Identity is a process-unique ParamId. Optimizer state and per-variable
// conf annotations key on it, never on value equality.

/// Unique identifier for a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParamId(u64);

impl ParamId {
    fn fresh() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(0);
        ParamId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

struct ParameterInner<B: Backend> {
    id: ParamId,
    name: String,
    value: Tensor<B>,
    grad: RwLock<Option<Tensor<B>>>,
    requires_grad: bool,
    is_leaf: bool,
}

/// A named, trainable tensor.
pub struct Parameter<B: Backend> {
    inner: Arc<ParameterInner<B>>,
}

impl<B: Backend> Clone for Parameter<B> {
    fn clone(&self) -> Self {
        Parameter {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: Backend> std::fmt::Debug for Parameter<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Parameter({:?}, id={:?}, shape={})",
            self.inner.name,
            self.inner.id,
            self.inner.value.shape()
        )
    }
}

impl<B: Backend> Parameter<B> {
    /// Create a leaf parameter that tracks gradients.
    pub fn new(name: impl Into<String>, value: Tensor<B>) -> Self {
        Parameter {
            inner: Arc::new(ParameterInner {
                id: ParamId::fresh(),
                name: name.into(),
                value,
                grad: RwLock::new(None),
                requires_grad: true,
                is_leaf: true,
            }),
        }
    }

    /// Create a non-leaf parameter (the result of graph computation).
    /// Non-leaf parameters cannot be handed to an optimizer.
    pub fn derived(name: impl Into<String>, value: Tensor<B>) -> Self {
        Parameter {
            inner: Arc::new(ParameterInner {
                id: ParamId::fresh(),
                name: name.into(),
                value,
                grad: RwLock::new(None),
                requires_grad: true,
                is_leaf: false,
            }),
        }
    }

    /// Create a leaf parameter that does not track gradients (frozen).
    pub fn frozen(name: impl Into<String>, value: Tensor<B>) -> Self {
        Parameter {
            inner: Arc::new(ParameterInner {
                id: ParamId::fresh(),
                name: name.into(),
                value,
                grad: RwLock::new(None),
                requires_grad: false,
                is_leaf: true,
            }),
        }
    }

    pub fn id(&self) -> ParamId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The parameter's value tensor. Updates happen in place through this
    /// handle's shared storage.
    pub fn value(&self) -> &Tensor<B> {
        &self.inner.value
    }

    pub fn requires_grad(&self) -> bool {
        self.inner.requires_grad
    }

    pub fn is_leaf(&self) -> bool {
        self.inner.is_leaf
    }

    /// The currently attached gradient, if any.
    pub fn grad(&self) -> Option<Tensor<B>> {
        self.inner
            .grad
            .read()
            .ok()
            .and_then(|guard| guard.clone())
    }

    /// Attach a gradient, replacing any previous one. The gradient must
    /// match the value's shape and dtype.
    pub fn set_grad(&self, grad: Tensor<B>) -> Result<()> {
        if grad.shape() != self.inner.value.shape() {
            return Err(Error::ShapeMismatch {
                expected: self.inner.value.shape().clone(),
                got: grad.shape().clone(),
            });
        }
        if grad.dtype() != self.inner.value.dtype() {
            return Err(Error::DTypeMismatch {
                expected: self.inner.value.dtype(),
                got: grad.dtype(),
            });
        }
        let mut guard = self
            .inner
            .grad
            .write()
            .map_err(|_| Error::msg("gradient lock poisoned"))?;
        *guard = Some(grad);
        Ok(())
    }

    /// Clear the attached gradient.
    pub fn clear_grad(&self) {
        if let Ok(mut guard) = self.inner.grad.write() {
            *guard = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use freshet_core::{CpuBackend, CpuDevice, DType};

    fn param(name: &str, data: &[f64]) -> Parameter<CpuBackend> {
        let value =
            Tensor::<CpuBackend>::from_f64_slice(data, data.len(), DType::F64, &CpuDevice).unwrap();
        Parameter::new(name, value)
    }

    #[test]
    fn test_identity_is_unique() {
        let a = param("a", &[1.0]);
        let b = param("b", &[1.0]);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.id(), a.clone().id());
    }

    #[test]
    fn test_grad_lifecycle() {
        let p = param("w", &[1.0, 2.0]);
        assert!(p.grad().is_none());

        let g = Tensor::<CpuBackend>::from_f64_slice(&[0.1, 0.2], 2, DType::F64, &CpuDevice)
            .unwrap();
        p.set_grad(g).unwrap();
        assert!(p.grad().is_some());

        p.clear_grad();
        assert!(p.grad().is_none());
    }

    #[test]
    fn test_set_grad_validates_shape() {
        let p = param("w", &[1.0, 2.0]);
        let bad = Tensor::<CpuBackend>::from_f64_slice(&[0.1], 1, DType::F64, &CpuDevice).unwrap();
        assert!(p.set_grad(bad).is_err());
    }
}

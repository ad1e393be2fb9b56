use crate::backend::{AdamUpdateAttrs, Backend, BackendDevice, BackendStorage};
use crate::dtype::{DType, WithDType};
use crate::error::{Error, Result};
use crate::shape::Shape;
use crate::tensor::Tensor;

// CpuBackend — Reference CPU implementation of the Backend trait
//
// Storage is a plain enum over typed Vecs. The fused Adam update computes
// in f64 regardless of storage dtype and writes back in the storage's own
// precision.

/// The CPU device (there is only one).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuDevice;

impl BackendDevice for CpuDevice {
    fn name(&self) -> String {
        "cpu".to_string()
    }
}

/// CPU storage: one typed Vec per supported dtype.
#[derive(Debug, Clone)]
pub enum CpuStorage {
    F32(Vec<f32>),
    F64(Vec<f64>),
    U8(Vec<u8>),
    I8(Vec<i8>),
    I32(Vec<i32>),
    I64(Vec<i64>),
}

impl BackendStorage for CpuStorage {
    fn dtype(&self) -> DType {
        match self {
            CpuStorage::F32(_) => DType::F32,
            CpuStorage::F64(_) => DType::F64,
            CpuStorage::U8(_) => DType::U8,
            CpuStorage::I8(_) => DType::I8,
            CpuStorage::I32(_) => DType::I32,
            CpuStorage::I64(_) => DType::I64,
        }
    }

    fn len(&self) -> usize {
        match self {
            CpuStorage::F32(v) => v.len(),
            CpuStorage::F64(v) => v.len(),
            CpuStorage::U8(v) => v.len(),
            CpuStorage::I8(v) => v.len(),
            CpuStorage::I32(v) => v.len(),
            CpuStorage::I64(v) => v.len(),
        }
    }
}

/// The CPU backend marker type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuBackend;

/// Convenience alias: a tensor on the CPU backend.
pub type CpuTensor = Tensor<CpuBackend>;

fn dispatch_err(op: &'static str, reason: impl Into<String>) -> Error {
    Error::BackendDispatch {
        op,
        reason: reason.into(),
    }
}

// The fused update kernel, element-wise over one parameter's operand set.
// Math runs in f64 and is written back in T's precision.
fn adam_kernel<T: WithDType>(
    model: &mut [T],
    model_diff: &[T],
    m: &mut [T],
    v: &mut [T],
    mut max_v: Option<&mut [T]>,
    attrs: &AdamUpdateAttrs,
) -> Result<()> {
    let n = model.len();
    if model_diff.len() != n || m.len() != n || v.len() != n {
        return Err(dispatch_err(
            "adam_update",
            format!(
                "operand length mismatch: model {}, model_diff {}, m {}, v {}",
                n,
                model_diff.len(),
                m.len(),
                v.len()
            ),
        ));
    }
    if let Some(ref mv) = max_v {
        if mv.len() != n {
            return Err(dispatch_err(
                "adam_update",
                format!("max_v length {} does not match model length {}", mv.len(), n),
            ));
        }
    }
    if attrs.amsgrad && max_v.is_none() {
        return Err(dispatch_err(
            "adam_update",
            "amsgrad requires the max_v input slot",
        ));
    }

    for i in 0..n {
        let g = model_diff[i].to_f64();
        let mut m_i = m[i].to_f64();
        let mut v_i = v[i].to_f64();

        m_i = attrs.beta1 * m_i + (1.0 - attrs.beta1) * g;
        v_i = attrs.beta2 * v_i + (1.0 - attrs.beta2) * g * g;
        m[i] = T::from_f64(m_i);
        v[i] = T::from_f64(v_i);

        let v_eff = if attrs.amsgrad {
            let mv = max_v.as_mut().map(|s| &mut s[i]).ok_or_else(|| {
                dispatch_err("adam_update", "amsgrad requires the max_v input slot")
            })?;
            let updated = mv.to_f64().max(v_i);
            *mv = T::from_f64(updated);
            updated
        } else {
            v_i
        };

        let (step_size, denom) = if attrs.do_bias_correction {
            (
                attrs.learning_rate / attrs.bias_correction1,
                v_eff.sqrt() / attrs.bias_correction2.sqrt() + attrs.epsilon,
            )
        } else {
            (attrs.learning_rate, v_eff.sqrt() + attrs.epsilon)
        };

        let p = model[i].to_f64();
        let next = p - attrs.l2 * attrs.learning_rate * p - step_size * m_i / denom;
        model[i] = T::from_f64(next);
    }
    Ok(())
}

fn float_slice_f64(storage: &CpuStorage, op: &'static str) -> Result<Vec<f64>> {
    match storage {
        CpuStorage::F32(v) => Ok(v.iter().map(|x| *x as f64).collect()),
        CpuStorage::F64(v) => Ok(v.clone()),
        other => Err(dispatch_err(
            op,
            format!("expected a float storage, got {}", other.dtype()),
        )),
    }
}

impl Backend for CpuBackend {
    type Device = CpuDevice;
    type Storage = CpuStorage;

    fn zeros(shape: &Shape, dtype: DType, _device: &Self::Device) -> Result<Self::Storage> {
        let n = shape.elem_count();
        Ok(match dtype {
            DType::F32 => CpuStorage::F32(vec![0.0; n]),
            DType::F64 => CpuStorage::F64(vec![0.0; n]),
            DType::U8 => CpuStorage::U8(vec![0; n]),
            DType::I8 => CpuStorage::I8(vec![0; n]),
            DType::I32 => CpuStorage::I32(vec![0; n]),
            DType::I64 => CpuStorage::I64(vec![0; n]),
        })
    }

    fn from_f64_slice(data: &[f64], dtype: DType, _device: &Self::Device) -> Result<Self::Storage> {
        Ok(match dtype {
            DType::F32 => CpuStorage::F32(data.iter().map(|x| *x as f32).collect()),
            DType::F64 => CpuStorage::F64(data.to_vec()),
            DType::U8 => CpuStorage::U8(data.iter().map(|x| *x as u8).collect()),
            DType::I8 => CpuStorage::I8(data.iter().map(|x| *x as i8).collect()),
            DType::I32 => CpuStorage::I32(data.iter().map(|x| *x as i32).collect()),
            DType::I64 => CpuStorage::I64(data.iter().map(|x| *x as i64).collect()),
        })
    }

    fn to_f64_vec(storage: &Self::Storage) -> Result<Vec<f64>> {
        Ok(match storage {
            CpuStorage::F32(v) => v.iter().map(|x| *x as f64).collect(),
            CpuStorage::F64(v) => v.clone(),
            CpuStorage::U8(v) => v.iter().map(|x| *x as f64).collect(),
            CpuStorage::I8(v) => v.iter().map(|x| *x as f64).collect(),
            CpuStorage::I32(v) => v.iter().map(|x| *x as f64).collect(),
            CpuStorage::I64(v) => v.iter().map(|x| *x as f64).collect(),
        })
    }

    fn adam_update(
        model: &mut Self::Storage,
        model_diff: &Self::Storage,
        m: &mut Self::Storage,
        v: &mut Self::Storage,
        max_v: Option<&mut Self::Storage>,
        attrs: &AdamUpdateAttrs,
    ) -> Result<()> {
        match (model, model_diff, m, v) {
            (
                CpuStorage::F32(model),
                CpuStorage::F32(model_diff),
                CpuStorage::F32(m),
                CpuStorage::F32(v),
            ) => {
                let max_v = match max_v {
                    None => None,
                    Some(CpuStorage::F32(mv)) => Some(mv.as_mut_slice()),
                    Some(other) => {
                        return Err(dispatch_err(
                            "adam_update",
                            format!("max_v dtype {} does not match model dtype f32", other.dtype()),
                        ))
                    }
                };
                adam_kernel(model, model_diff, m, v, max_v, attrs)
            }
            (
                CpuStorage::F64(model),
                CpuStorage::F64(model_diff),
                CpuStorage::F64(m),
                CpuStorage::F64(v),
            ) => {
                let max_v = match max_v {
                    None => None,
                    Some(CpuStorage::F64(mv)) => Some(mv.as_mut_slice()),
                    Some(other) => {
                        return Err(dispatch_err(
                            "adam_update",
                            format!("max_v dtype {} does not match model dtype f64", other.dtype()),
                        ))
                    }
                };
                adam_kernel(model, model_diff, m, v, max_v, attrs)
            }
            (model, model_diff, ..) => Err(dispatch_err(
                "adam_update",
                format!(
                    "unsupported operand dtypes: model {}, model_diff {}",
                    model.dtype(),
                    model_diff.dtype()
                ),
            )),
        }
    }

    fn abs_pow_sum(storage: &Self::Storage, p: f64) -> Result<f64> {
        let data = float_slice_f64(storage, "abs_pow_sum")?;
        Ok(data.iter().map(|x| x.abs().powf(p)).sum())
    }

    fn abs_max(storage: &Self::Storage) -> Result<f64> {
        let data = float_slice_f64(storage, "abs_max")?;
        Ok(data.iter().fold(0.0f64, |acc, x| acc.max(x.abs())))
    }

    fn scale(storage: &mut Self::Storage, factor: f64) -> Result<()> {
        match storage {
            CpuStorage::F32(v) => {
                for x in v.iter_mut() {
                    *x = (*x as f64 * factor) as f32;
                }
                Ok(())
            }
            CpuStorage::F64(v) => {
                for x in v.iter_mut() {
                    *x *= factor;
                }
                Ok(())
            }
            other => Err(dispatch_err(
                "scale",
                format!("expected a float storage, got {}", other.dtype()),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(lr: f64) -> AdamUpdateAttrs {
        AdamUpdateAttrs {
            learning_rate: lr,
            bias_correction1: 1.0,
            bias_correction2: 1.0,
            l2: 0.0,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            do_bias_correction: false,
            amsgrad: false,
            step: 0,
        }
    }

    #[test]
    fn test_adam_update_moments() {
        let dev = CpuDevice;
        let mut model = CpuBackend::from_f64_slice(&[1.0], DType::F64, &dev).unwrap();
        let diff = CpuBackend::from_f64_slice(&[0.5], DType::F64, &dev).unwrap();
        let mut m = CpuBackend::zeros(&Shape::from(1), DType::F64, &dev).unwrap();
        let mut v = CpuBackend::zeros(&Shape::from(1), DType::F64, &dev).unwrap();

        CpuBackend::adam_update(&mut model, &diff, &mut m, &mut v, None, &attrs(0.0)).unwrap();

        let m = CpuBackend::to_f64_vec(&m).unwrap();
        let v = CpuBackend::to_f64_vec(&v).unwrap();
        assert!((m[0] - 0.05).abs() < 1e-12);
        assert!((v[0] - 0.00025).abs() < 1e-12);
    }

    #[test]
    fn test_adam_update_rejects_length_mismatch() {
        let dev = CpuDevice;
        let mut model = CpuBackend::from_f64_slice(&[1.0, 2.0], DType::F64, &dev).unwrap();
        let diff = CpuBackend::from_f64_slice(&[0.5], DType::F64, &dev).unwrap();
        let mut m = CpuBackend::zeros(&Shape::from(2), DType::F64, &dev).unwrap();
        let mut v = CpuBackend::zeros(&Shape::from(2), DType::F64, &dev).unwrap();

        let err =
            CpuBackend::adam_update(&mut model, &diff, &mut m, &mut v, None, &attrs(0.1))
                .unwrap_err();
        assert!(matches!(err, Error::BackendDispatch { .. }));
    }

    #[test]
    fn test_adam_update_rejects_missing_max_v() {
        let dev = CpuDevice;
        let mut model = CpuBackend::from_f64_slice(&[1.0], DType::F64, &dev).unwrap();
        let diff = CpuBackend::from_f64_slice(&[0.5], DType::F64, &dev).unwrap();
        let mut m = CpuBackend::zeros(&Shape::from(1), DType::F64, &dev).unwrap();
        let mut v = CpuBackend::zeros(&Shape::from(1), DType::F64, &dev).unwrap();

        let mut a = attrs(0.1);
        a.amsgrad = true;
        let err = CpuBackend::adam_update(&mut model, &diff, &mut m, &mut v, None, &a).unwrap_err();
        assert!(matches!(err, Error::BackendDispatch { .. }));
    }

    #[test]
    fn test_norm_reductions() {
        let dev = CpuDevice;
        let s = CpuBackend::from_f64_slice(&[3.0, -4.0], DType::F64, &dev).unwrap();
        assert!((CpuBackend::abs_pow_sum(&s, 2.0).unwrap() - 25.0).abs() < 1e-12);
        assert!((CpuBackend::abs_max(&s).unwrap() - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_scale_in_place() {
        let dev = CpuDevice;
        let mut s = CpuBackend::from_f64_slice(&[1.0, -2.0], DType::F64, &dev).unwrap();
        CpuBackend::scale(&mut s, 0.5).unwrap();
        assert_eq!(CpuBackend::to_f64_vec(&s).unwrap(), vec![0.5, -1.0]);
    }

    #[test]
    fn test_int_storage_rejected_by_float_ops() {
        let dev = CpuDevice;
        let mut s = CpuBackend::from_f64_slice(&[1.0], DType::I32, &dev).unwrap();
        assert!(CpuBackend::abs_pow_sum(&s, 2.0).is_err());
        assert!(CpuBackend::scale(&mut s, 2.0).is_err());
    }
}

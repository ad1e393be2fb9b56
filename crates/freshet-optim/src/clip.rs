use freshet_core::{Backend, Result, Tensor};

use crate::parameter::Parameter;

// Gradient clipping — Rescale a parameter set's gradients by total norm
//
// The total norm is taken over the concatenation of every present
// gradient: the p-norm for finite norm types, the max absolute value for
// +inf. Scaling happens in place so every holder of a gradient handle
// sees the clipped values.

/// Clip the gradients of `params` so their total norm does not exceed
/// `max_norm`. Returns the total norm measured BEFORE clipping.
///
/// Parameters without a gradient contribute nothing. A total norm at or
/// below `max_norm` leaves the gradients untouched.
pub fn clip_grad_norm<B: Backend>(
    params: &[Parameter<B>],
    max_norm: f64,
    norm_type: f64,
) -> Result<f64> {
    let grads: Vec<Tensor<B>> = params.iter().filter_map(|p| p.grad()).collect();
    if grads.is_empty() {
        return Ok(0.0);
    }

    let total_norm = if norm_type.is_infinite() {
        let mut max_abs = 0.0f64;
        for g in &grads {
            max_abs = max_abs.max(g.abs_max()?);
        }
        max_abs
    } else {
        let mut sum = 0.0f64;
        for g in &grads {
            sum += g.abs_pow_sum(norm_type)?;
        }
        sum.powf(1.0 / norm_type)
    };

    let clip_coef = max_norm / (total_norm + 1e-6);
    if clip_coef < 1.0 {
        for g in &grads {
            g.scale(clip_coef)?;
        }
    }
    Ok(total_norm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use freshet_core::{CpuBackend, CpuDevice, DType};

    fn param_with_grad(data: &[f64], grad: &[f64]) -> Parameter<CpuBackend> {
        let dev = CpuDevice;
        let value =
            Tensor::<CpuBackend>::from_f64_slice(data, data.len(), DType::F64, &dev).unwrap();
        let p = Parameter::new("p", value);
        let g = Tensor::<CpuBackend>::from_f64_slice(grad, grad.len(), DType::F64, &dev).unwrap();
        p.set_grad(g).unwrap();
        p
    }

    #[test]
    fn test_two_norm_clipping() {
        let p = param_with_grad(&[0.0, 0.0], &[3.0, 4.0]);
        let total = clip_grad_norm(&[p.clone()], 1.0, 2.0).unwrap();
        assert!((total - 5.0).abs() < 1e-9);

        let clipped = p.grad().unwrap().to_f64_vec().unwrap();
        let new_norm = (clipped[0] * clipped[0] + clipped[1] * clipped[1]).sqrt();
        assert!((new_norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_norm_below_max_leaves_grads_alone() {
        let p = param_with_grad(&[0.0], &[0.5]);
        let total = clip_grad_norm(&[p.clone()], 1.0, 2.0).unwrap();
        assert!((total - 0.5).abs() < 1e-9);
        assert_eq!(p.grad().unwrap().to_f64_vec().unwrap(), vec![0.5]);
    }

    #[test]
    fn test_inf_norm() {
        let p = param_with_grad(&[0.0, 0.0], &[-3.0, 2.0]);
        let total = clip_grad_norm(&[p.clone()], 6.0, f64::INFINITY).unwrap();
        assert!((total - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_grads_is_zero_norm() {
        let dev = CpuDevice;
        let value = Tensor::<CpuBackend>::zeros(2, DType::F64, &dev).unwrap();
        let p: Parameter<CpuBackend> = Parameter::new("p", value);
        assert_eq!(clip_grad_norm(&[p], 1.0, 2.0).unwrap(), 0.0);
    }
}

//! # freshet-optim
//!
//! The optimizer side of Freshet: parameters with identity and externally
//! attached gradients, parameter groups with validated hyperparameters,
//! the Adam optimizer (moment tracking, bias correction, AMSGrad, gradient
//! clipping), and the emitter that serializes per-group optimizer
//! configuration into the job's training conf.
//!
//! Numeric execution happens behind the [`freshet_core::Backend`] seam:
//! `step()` dispatches one fused update per parameter and the backend
//! mutates the operands in place.

pub mod adam;
pub mod clip;
pub mod param_group;
pub mod parameter;

pub use adam::{Adam, ParamState};
pub use clip::clip_grad_norm;
pub use param_group::{GroupOptions, ParamGroup};
pub use parameter::{ParamId, Parameter};

use freshet_core::{Backend, Error, Result};

use crate::parameter::Parameter;

// ParamGroup — Parameters sharing one set of hyperparameters
//
// User-supplied options are immutable once validated; the derived
// per-step quantities (bias corrections) live in a separate runtime record
// the optimizer rewrites on every step.

/// User-supplied hyperparameters for one parameter group.
///
/// Validated eagerly by [`ParamGroup::new`]; an invalid field fails
/// construction with [`Error::InvalidHyperparameter`] naming it.
#[derive(Debug, Clone)]
pub struct GroupOptions {
    pub lr: f64,
    pub betas: (f64, f64),
    pub eps: f64,
    pub weight_decay: f64,
    pub amsgrad: bool,
    pub do_bias_correction: bool,
    /// When set, `clip_grads` rescales this group's gradients so their
    /// total norm does not exceed it.
    pub clip_grad_max_norm: Option<f64>,
    pub clip_grad_norm_type: f64,
    /// Base learning rate recorded in the emitted conf when a schedule has
    /// moved `lr` away from its initial value.
    pub initial_lr: Option<f64>,
}

impl Default for GroupOptions {
    fn default() -> Self {
        GroupOptions {
            lr: 1e-3,
            betas: (0.9, 0.999),
            eps: 1e-8,
            weight_decay: 0.0,
            amsgrad: false,
            do_bias_correction: true,
            clip_grad_max_norm: None,
            clip_grad_norm_type: 2.0,
            initial_lr: None,
        }
    }
}

impl GroupOptions {
    pub fn new() -> Self {
        GroupOptions::default()
    }

    pub fn lr(mut self, lr: f64) -> Self {
        self.lr = lr;
        self
    }

    pub fn betas(mut self, beta1: f64, beta2: f64) -> Self {
        self.betas = (beta1, beta2);
        self
    }

    pub fn eps(mut self, eps: f64) -> Self {
        self.eps = eps;
        self
    }

    pub fn weight_decay(mut self, weight_decay: f64) -> Self {
        self.weight_decay = weight_decay;
        self
    }

    pub fn amsgrad(mut self, amsgrad: bool) -> Self {
        self.amsgrad = amsgrad;
        self
    }

    pub fn do_bias_correction(mut self, do_bias_correction: bool) -> Self {
        self.do_bias_correction = do_bias_correction;
        self
    }

    pub fn clip_grad(mut self, max_norm: f64, norm_type: f64) -> Self {
        self.clip_grad_max_norm = Some(max_norm);
        self.clip_grad_norm_type = norm_type;
        self
    }

    pub fn initial_lr(mut self, initial_lr: f64) -> Self {
        self.initial_lr = Some(initial_lr);
        self
    }

    fn invalid(name: &'static str, value: f64) -> Error {
        Error::InvalidHyperparameter { name, value }
    }

    /// Check every field against its legal range.
    pub fn validate(&self) -> Result<()> {
        if !self.lr.is_finite() || self.lr < 0.0 {
            return Err(Self::invalid("lr", self.lr));
        }
        if !self.eps.is_finite() || self.eps < 0.0 {
            return Err(Self::invalid("eps", self.eps));
        }
        if !(0.0..1.0).contains(&self.betas.0) {
            return Err(Self::invalid("betas[0]", self.betas.0));
        }
        if !(0.0..1.0).contains(&self.betas.1) {
            return Err(Self::invalid("betas[1]", self.betas.1));
        }
        if !self.weight_decay.is_finite() || self.weight_decay < 0.0 {
            return Err(Self::invalid("weight_decay", self.weight_decay));
        }
        if let Some(max_norm) = self.clip_grad_max_norm {
            if !max_norm.is_finite() || max_norm < 0.0 {
                return Err(Self::invalid("clip_grad_max_norm", max_norm));
            }
            if self.clip_grad_norm_type <= 0.0 {
                return Err(Self::invalid(
                    "clip_grad_norm_type",
                    self.clip_grad_norm_type,
                ));
            }
        }
        Ok(())
    }
}

/// Derived per-step state, recomputed by the optimizer each step.
#[derive(Debug, Clone)]
pub(crate) struct GroupRuntime {
    pub(crate) bias_correction1: f64,
    pub(crate) bias_correction2: f64,
}

impl Default for GroupRuntime {
    fn default() -> Self {
        GroupRuntime {
            bias_correction1: 1.0,
            bias_correction2: 1.0,
        }
    }
}

/// An ordered collection of parameters sharing one options set.
#[derive(Debug)]
pub struct ParamGroup<B: Backend> {
    parameters: Vec<Parameter<B>>,
    options: GroupOptions,
    pub(crate) runtime: GroupRuntime,
}

impl<B: Backend> ParamGroup<B> {
    /// Build a group, validating the options eagerly.
    pub fn new(parameters: Vec<Parameter<B>>, options: GroupOptions) -> Result<Self> {
        options.validate()?;
        Ok(ParamGroup {
            parameters,
            options,
            runtime: GroupRuntime::default(),
        })
    }

    pub fn parameters(&self) -> &[Parameter<B>] {
        &self.parameters
    }

    pub fn options(&self) -> &GroupOptions {
        &self.options
    }

    /// The bias-correction term recorded at the most recent step.
    pub fn bias_correction1(&self) -> f64 {
        self.runtime.bias_correction1
    }

    pub fn bias_correction2(&self) -> f64 {
        self.runtime.bias_correction2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use freshet_core::CpuBackend;

    fn group(options: GroupOptions) -> Result<ParamGroup<CpuBackend>> {
        ParamGroup::new(vec![], options)
    }

    #[test]
    fn test_default_options_valid() {
        assert!(group(GroupOptions::default()).is_ok());
    }

    #[test]
    fn test_negative_lr_rejected() {
        let err = group(GroupOptions::new().lr(-0.1)).unwrap_err();
        match err {
            Error::InvalidHyperparameter { name, value } => {
                assert_eq!(name, "lr");
                assert_eq!(value, -0.1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_beta_out_of_range_rejected() {
        assert!(group(GroupOptions::new().betas(1.0, 0.999)).is_err());
        assert!(group(GroupOptions::new().betas(0.9, -0.1)).is_err());
        assert!(group(GroupOptions::new().betas(0.0, 0.0)).is_ok());
    }

    #[test]
    fn test_negative_eps_and_weight_decay_rejected() {
        assert!(group(GroupOptions::new().eps(-1e-8)).is_err());
        assert!(group(GroupOptions::new().weight_decay(-0.01)).is_err());
    }

    #[test]
    fn test_clip_options_validated() {
        assert!(group(GroupOptions::new().clip_grad(1.0, 2.0)).is_ok());
        assert!(group(GroupOptions::new().clip_grad(-1.0, 2.0)).is_err());
        assert!(group(GroupOptions::new().clip_grad(1.0, 0.0)).is_err());
        assert!(group(GroupOptions::new().clip_grad(1.0, f64::INFINITY)).is_ok());
    }
}

use std::collections::HashMap;

use freshet_core::{AdamUpdateAttrs, Backend, Error, Result, Tensor};
use freshet_graph::{AdamConf, ClipConf, OptimizerConf, TrainConf, VariableConf};

use crate::clip::clip_grad_norm;
use crate::param_group::{GroupOptions, ParamGroup};
use crate::parameter::{ParamId, Parameter};

// Adam — Adaptive moment estimation with decoupled weight decay
//
// The optimizer walks its groups, and for every parameter carrying a
// gradient dispatches ONE fused backend update with the parameter, the
// gradient, and the moment buffers as operands. Moment buffers are
// allocated lazily on the first step that sees a gradient for the
// parameter. A single global step counter drives bias correction and is
// advanced exactly once per step() call, after all groups.

/// Per-parameter optimizer state: lazily materialized moment buffers.
#[derive(Debug)]
pub struct ParamState<B: Backend> {
    exp_avg: Option<Tensor<B>>,
    exp_avg_sq: Option<Tensor<B>>,
    max_exp_avg_sq: Option<Tensor<B>>,
}

impl<B: Backend> ParamState<B> {
    fn new() -> Self {
        ParamState {
            exp_avg: None,
            exp_avg_sq: None,
            max_exp_avg_sq: None,
        }
    }

    /// First-moment buffer (`exp_avg`), if materialized.
    pub fn exp_avg(&self) -> Option<&Tensor<B>> {
        self.exp_avg.as_ref()
    }

    /// Second-moment buffer (`exp_avg_sq`), if materialized.
    pub fn exp_avg_sq(&self) -> Option<&Tensor<B>> {
        self.exp_avg_sq.as_ref()
    }

    /// Running max of the second moment (`max_exp_avg_sq`); only AMSGrad
    /// groups materialize it.
    pub fn max_exp_avg_sq(&self) -> Option<&Tensor<B>> {
        self.max_exp_avg_sq.as_ref()
    }
}

/// The Adam optimizer.
#[derive(Debug)]
pub struct Adam<B: Backend> {
    param_groups: Vec<ParamGroup<B>>,
    state: HashMap<ParamId, ParamState<B>>,
    step_count: u64,
}

impl<B: Backend> Adam<B> {
    /// Build an optimizer over the given groups.
    ///
    /// Every parameter must be a leaf; state entries are created empty and
    /// the moment buffers inside them stay unallocated until first use.
    pub fn new(param_groups: Vec<ParamGroup<B>>) -> Result<Self> {
        let mut state = HashMap::new();
        for group in &param_groups {
            for param in group.parameters() {
                if !param.is_leaf() {
                    return Err(Error::NonLeafParameter {
                        name: param.name().to_string(),
                    });
                }
                state.insert(param.id(), ParamState::new());
            }
        }
        Ok(Adam {
            param_groups,
            state,
            step_count: 0,
        })
    }

    /// Convenience constructor: one group over `parameters`.
    pub fn from_parameters(parameters: Vec<Parameter<B>>, options: GroupOptions) -> Result<Self> {
        Adam::new(vec![ParamGroup::new(parameters, options)?])
    }

    pub fn param_groups(&self) -> &[ParamGroup<B>] {
        &self.param_groups
    }

    /// The optimizer state for a parameter, keyed by identity.
    pub fn state_of(&self, id: ParamId) -> Option<&ParamState<B>> {
        self.state.get(&id)
    }

    /// Number of completed `step()` calls.
    pub fn global_step(&self) -> u64 {
        self.step_count
    }

    /// Whether the graph compiler may lower this optimizer's update to a
    /// sparse (indexed) kernel for embedding-style variables. The eager
    /// path always dispatches the dense fused op.
    pub fn support_sparse(&self) -> bool {
        true
    }

    /// Clear every parameter's gradient across all groups.
    pub fn zero_grad(&self) {
        for group in &self.param_groups {
            for param in group.parameters() {
                param.clear_grad();
            }
        }
    }

    /// Apply per-group gradient clipping for every group configured with
    /// `clip_grad_max_norm`. Call between the backward pass and `step()`.
    ///
    /// Returns one entry per group: the total gradient norm measured before
    /// clipping, or `None` for groups without clip options.
    pub fn clip_grads(&self) -> Result<Vec<Option<f64>>> {
        let mut norms = Vec::with_capacity(self.param_groups.len());
        for group in &self.param_groups {
            match group.options().clip_grad_max_norm {
                Some(max_norm) => {
                    let norm = clip_grad_norm(
                        group.parameters(),
                        max_norm,
                        group.options().clip_grad_norm_type,
                    )?;
                    norms.push(Some(norm));
                }
                None => norms.push(None),
            }
        }
        Ok(norms)
    }

    /// Perform a single optimization step.
    pub fn step(&mut self) -> Result<()> {
        self.update_all()
    }

    /// Perform a single optimization step, evaluating `closure` once
    /// before the update pass; its value is returned as the loss.
    pub fn step_with_closure<F>(&mut self, closure: F) -> Result<f64>
    where
        F: FnOnce() -> Result<f64>,
    {
        let loss = closure()?;
        self.update_all()?;
        Ok(loss)
    }

    fn update_all(&mut self) -> Result<()> {
        let mut updated = 0usize;
        for group in self.param_groups.iter_mut() {
            let opts = group.options().clone();
            if opts.do_bias_correction {
                // Shared by every parameter in the group; computed once per
                // group per step from the step about to be taken.
                group.runtime.bias_correction1 =
                    1.0 - opts.betas.0.powf((self.step_count + 1) as f64);
                group.runtime.bias_correction2 =
                    1.0 - opts.betas.1.powf((self.step_count + 1) as f64);
            }
            let bias_correction1 = group.runtime.bias_correction1;
            let bias_correction2 = group.runtime.bias_correction2;

            for param in group.parameters() {
                let grad = match param.grad() {
                    Some(g) => g,
                    None => continue,
                };

                let state = self
                    .state
                    .entry(param.id())
                    .or_insert_with(ParamState::new);
                if state.exp_avg.is_none() {
                    state.exp_avg = Some(Tensor::zeros_like(param.value())?);
                }
                if state.exp_avg_sq.is_none() {
                    state.exp_avg_sq = Some(Tensor::zeros_like(param.value())?);
                }
                if opts.amsgrad && state.max_exp_avg_sq.is_none() {
                    state.max_exp_avg_sq = Some(Tensor::zeros_like(param.value())?);
                }

                let attrs = AdamUpdateAttrs {
                    learning_rate: opts.lr,
                    bias_correction1,
                    bias_correction2,
                    l2: opts.weight_decay,
                    beta1: opts.betas.0,
                    beta2: opts.betas.1,
                    epsilon: opts.eps,
                    do_bias_correction: opts.do_bias_correction,
                    amsgrad: opts.amsgrad,
                    step: self.step_count,
                };

                let exp_avg = state
                    .exp_avg
                    .as_ref()
                    .ok_or_else(|| Error::msg("exp_avg not materialized"))?;
                let exp_avg_sq = state
                    .exp_avg_sq
                    .as_ref()
                    .ok_or_else(|| Error::msg("exp_avg_sq not materialized"))?;
                param.value().adam_update(
                    &grad,
                    exp_avg,
                    exp_avg_sq,
                    state.max_exp_avg_sq.as_ref(),
                    &attrs,
                )?;
                updated += 1;
            }
        }

        self.step_count += 1;
        log::debug!(
            "adam step {}: dispatched {} fused update(s)",
            self.step_count,
            updated
        );
        Ok(())
    }

    /// Emit one optimizer-configuration record per group into the job's
    /// training conf, and record each parameter's weight-decay annotation
    /// in `vars_conf`. Only parameters with `requires_grad` appear in a
    /// record's `variable_op_names`.
    pub fn generate_conf_for_graph(
        &self,
        train_conf: &mut TrainConf,
        vars_conf: &mut HashMap<ParamId, VariableConf>,
    ) {
        for group in &self.param_groups {
            let opts = group.options();
            let mut optimizer_conf = OptimizerConf {
                base_learning_rate: opts.initial_lr.unwrap_or(opts.lr),
                adam_conf: AdamConf {
                    beta1: opts.betas.0,
                    beta2: opts.betas.1,
                    epsilon: opts.eps,
                    do_bias_correction: opts.do_bias_correction,
                    amsgrad: opts.amsgrad,
                },
                clip_conf: opts.clip_grad_max_norm.map(|max_norm| ClipConf {
                    max_norm,
                    norm_type: opts.clip_grad_norm_type,
                }),
                variable_op_names: Vec::new(),
            };

            for param in group.parameters() {
                let entry = vars_conf.entry(param.id()).or_insert_with(|| VariableConf {
                    name: param.name().to_string(),
                    l2: 0.0,
                });
                entry.l2 = opts.weight_decay;
                if param.requires_grad() {
                    optimizer_conf.variable_op_names.push(entry.name.clone());
                }
            }

            train_conf.optimizer_conf.push(optimizer_conf);
        }
    }
}

use serde::{Deserialize, Serialize};

// Job descriptor — The persisted training-graph configuration
//
// These are the records the external graph compiler consumes at
// job-finalization time: the op list accumulated during construction plus
// the training configuration the optimizer emits (one OptimizerConf per
// parameter group). Everything here is plain serde data.

/// Device placement of a blob's producer: a device tag ("cpu", "gpu") and
/// machine-device ranges in `"machine:device[-device]"` form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParallelConf {
    pub device_tag: String,
    pub device_name: Vec<String>,
}

impl Default for ParallelConf {
    fn default() -> Self {
        ParallelConf {
            device_tag: "cpu".to_string(),
            device_name: vec!["0:0".to_string()],
        }
    }
}

/// One recorded op: name, kind, input lbns, output lbn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpConf {
    pub name: String,
    pub op_type: String,
    pub inputs: Vec<String>,
    pub output: String,
}

/// The Adam-specific block of an optimizer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdamConf {
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    pub do_bias_correction: bool,
    pub amsgrad: bool,
}

/// Gradient-clipping block of an optimizer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipConf {
    pub max_norm: f64,
    pub norm_type: f64,
}

/// One optimizer-configuration record, covering one parameter group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConf {
    pub base_learning_rate: f64,
    pub adam_conf: AdamConf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clip_conf: Option<ClipConf>,
    /// Names of the variable ops this record applies to (only parameters
    /// with `requires_grad` appear here).
    pub variable_op_names: Vec<String>,
}

/// The job's training configuration: one record per parameter group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainConf {
    pub optimizer_conf: Vec<OptimizerConf>,
}

impl TrainConf {
    pub fn new() -> Self {
        TrainConf::default()
    }
}

/// Per-variable annotations emitted alongside the train conf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableConf {
    pub name: String,
    /// Weight-decay coefficient applied to this variable.
    pub l2: f64,
}

/// The finalized job descriptor: everything the graph compiler needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConf {
    pub job_name: String,
    pub op_conf: Vec<OpConf>,
    pub train_conf: TrainConf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_train_conf_round_trip() {
        let conf = TrainConf {
            optimizer_conf: vec![OptimizerConf {
                base_learning_rate: 0.001,
                adam_conf: AdamConf {
                    beta1: 0.9,
                    beta2: 0.999,
                    epsilon: 1e-8,
                    do_bias_correction: true,
                    amsgrad: false,
                },
                clip_conf: Some(ClipConf {
                    max_norm: 1.0,
                    norm_type: 2.0,
                }),
                variable_op_names: vec!["w".to_string(), "b".to_string()],
            }],
        };
        let json = serde_json::to_string(&conf).unwrap();
        let back: TrainConf = serde_json::from_str(&json).unwrap();
        assert_eq!(back, conf);
    }

    #[test]
    fn test_clip_conf_omitted_when_absent() {
        let conf = OptimizerConf {
            base_learning_rate: 0.01,
            adam_conf: AdamConf {
                beta1: 0.9,
                beta2: 0.999,
                epsilon: 1e-8,
                do_bias_correction: false,
                amsgrad: false,
            },
            clip_conf: None,
            variable_op_names: vec![],
        };
        let json = serde_json::to_string(&conf).unwrap();
        assert!(!json.contains("clip_conf"));
    }
}

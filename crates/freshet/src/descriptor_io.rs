// Descriptor persistence — Save and load the finalized job descriptor
//
// The descriptor is written as JSON so the external graph compiler (and
// humans) can consume it directly:
//
//   descriptor_io::save("train_job.json", &job_conf)?;
//   let job_conf = descriptor_io::load("train_job.json")?;

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use freshet_core::{Error, Result};
use freshet_graph::JobConf;

/// Write a finalized job descriptor to `path` as pretty-printed JSON.
pub fn save(path: impl AsRef<Path>, conf: &JobConf) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)
        .map_err(|e| Error::msg(format!("cannot create {}: {e}", path.display())))?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, conf)
        .map_err(|e| Error::msg(format!("cannot serialize job descriptor: {e}")))
}

/// Read a job descriptor back from `path`.
pub fn load(path: impl AsRef<Path>) -> Result<JobConf> {
    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|e| Error::msg(format!("cannot open {}: {e}", path.display())))?;
    let reader = BufReader::new(file);
    serde_json::from_reader(reader)
        .map_err(|e| Error::msg(format!("cannot parse job descriptor: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use freshet_graph::{AdamConf, OpConf, OptimizerConf, TrainConf};

    fn sample_conf() -> JobConf {
        JobConf {
            job_name: "train".to_string(),
            op_conf: vec![OpConf {
                name: "add_0".to_string(),
                op_type: "add".to_string(),
                inputs: vec!["a/out".to_string(), "b/out".to_string()],
                output: "add_0/out".to_string(),
            }],
            train_conf: TrainConf {
                optimizer_conf: vec![OptimizerConf {
                    base_learning_rate: 0.001,
                    adam_conf: AdamConf {
                        beta1: 0.9,
                        beta2: 0.999,
                        epsilon: 1e-8,
                        do_bias_correction: true,
                        amsgrad: false,
                    },
                    clip_conf: None,
                    variable_op_names: vec!["w".to_string()],
                }],
            },
        }
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = std::env::temp_dir().join("freshet_descriptor_io_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("job.json");

        let conf = sample_conf();
        save(&path, &conf).unwrap();
        let back = load(&path).unwrap();
        assert_eq!(back, conf);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_missing_file_errors() {
        assert!(load("/nonexistent/freshet/job.json").is_err());
    }
}

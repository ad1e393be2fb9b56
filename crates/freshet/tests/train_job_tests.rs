// End-to-end tests: construct a training job — input blobs, symbolic ops,
// parameters, optimizer — then emit the training conf, finalize the job,
// and persist the descriptor.

use std::collections::HashMap;
use std::sync::Arc;

use freshet::descriptor_io;
use freshet::prelude::*;

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn tensor(data: &[f64]) -> CpuTensor {
    Tensor::from_f64_slice(data, data.len(), DType::F64, &CpuDevice).unwrap()
}

#[test]
fn test_build_and_finalize_training_job() {
    init_logs();

    // Register the input blobs the job consumes.
    let reg = Arc::new(InMemoryMetadata::new());
    reg.register(
        "train",
        &LogicalBlobId::new("images", "out"),
        BlobMeta::new((8, 32), DType::F32).with_is_dynamic(true),
    );
    reg.register(
        "train",
        &LogicalBlobId::new("labels", "out"),
        BlobMeta::new((8, 32), DType::F32),
    );
    let ctx = JobContext::new("train", reg);

    // Symbolic graph construction: a couple of deferred element-wise ops.
    let images = remote_blob(&ctx, LogicalBlobId::new("images", "out")).unwrap();
    let labels = remote_blob(&ctx, LogicalBlobId::new("labels", "out")).unwrap();
    let diff = ops::subtract(&images, &labels).unwrap();
    let sq = ops::multiply(&diff, &diff).unwrap();
    assert_eq!(sq.static_shape().unwrap(), Shape::from((8, 32)));
    assert!(sq.is_dynamic().unwrap());

    // Parameters and optimizer.
    let w = Parameter::new("fc/weight", tensor(&[0.5, -0.5]));
    let mut adam = Adam::from_parameters(
        vec![w.clone()],
        GroupOptions::new().lr(0.01).weight_decay(1e-4),
    )
    .unwrap();

    w.set_grad(tensor(&[0.1, 0.2])).unwrap();
    adam.step().unwrap();
    assert_eq!(adam.global_step(), 1);

    // Emit the optimizer conf and finalize.
    let mut train_conf = TrainConf::new();
    let mut vars_conf: HashMap<ParamId, VariableConf> = HashMap::new();
    adam.generate_conf_for_graph(&mut train_conf, &mut vars_conf);

    let job_conf = ctx.finalize(train_conf).unwrap();
    assert_eq!(job_conf.job_name, "train");
    assert_eq!(job_conf.op_conf.len(), 2);
    assert_eq!(job_conf.train_conf.optimizer_conf.len(), 1);
    assert_eq!(
        job_conf.train_conf.optimizer_conf[0].variable_op_names,
        vec!["fc/weight"]
    );

    // Blob queries are rejected once the job is closed.
    assert!(images.static_shape().is_err());
}

#[test]
fn test_descriptor_round_trips_through_disk() {
    init_logs();

    let reg = Arc::new(InMemoryMetadata::new());
    reg.register(
        "persist",
        &LogicalBlobId::new("x", "out"),
        BlobMeta::new((4,), DType::F32),
    );
    let ctx = JobContext::new("persist", reg);
    let x = remote_blob(&ctx, LogicalBlobId::new("x", "out")).unwrap();
    let _mask = ops::greater(&x, &x).unwrap();

    let w = Parameter::new("w", tensor(&[1.0]));
    let adam = Adam::from_parameters(
        vec![w],
        GroupOptions::new().lr(0.1).clip_grad(1.0, 2.0).amsgrad(true),
    )
    .unwrap();

    let mut train_conf = TrainConf::new();
    let mut vars_conf = HashMap::new();
    adam.generate_conf_for_graph(&mut train_conf, &mut vars_conf);
    let job_conf = ctx.finalize(train_conf).unwrap();

    let dir = std::env::temp_dir().join("freshet_train_job_test");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("persist_job.json");

    descriptor_io::save(&path, &job_conf).unwrap();
    let back = descriptor_io::load(&path).unwrap();
    assert_eq!(back, job_conf);
    assert!(back.train_conf.optimizer_conf[0].adam_conf.amsgrad);
    assert_eq!(
        back.train_conf.optimizer_conf[0]
            .clip_conf
            .as_ref()
            .unwrap()
            .max_norm,
        1.0
    );

    std::fs::remove_file(&path).ok();
}

#[test]
fn test_mirror_blob_end_to_end() {
    init_logs();

    let reg = Arc::new(InMemoryMetadata::new());
    let parent = LogicalBlobId::new("data", "out");
    let subs: Vec<LogicalBlobId> = (0..2)
        .map(|i| LogicalBlobId::new(format!("data_{}", i), "out"))
        .collect();
    reg.register(
        "mirrored",
        &parent,
        BlobMeta::new((8, 4), DType::F32).with_sub_lbis(subs.clone()),
    );
    for sub in &subs {
        reg.register("mirrored", sub, BlobMeta::new((4, 4), DType::F32));
    }

    let ctx = JobContext::new("mirrored", reg);
    let blob = remote_blob(&ctx, parent).unwrap();
    let mirror = blob.as_mirror().unwrap();

    // Logical view vs per-shard physical views.
    assert_eq!(blob.static_shape().unwrap(), Shape::from((8, 4)));
    assert_eq!(mirror.sub_consistent_blobs().len(), 2);
    for sub in mirror.sub_consistent_blobs() {
        assert_eq!(sub.static_shape().unwrap(), Shape::from((4, 4)));
    }
}

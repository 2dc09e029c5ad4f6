use burn::backend::{Autodiff, NdArray};
use burn::module::{Module, ModuleVisitor, Param};
use burn::prelude::*;
use cifar_resnet::data::{CifarSplit, IMAGE_BYTES};
use cifar_resnet::training::{CheckpointError, NetworkMode, Trainer, TrainingConfig};
use std::path::Path;

type TestBackend = Autodiff<NdArray>;

fn tiny_config(modeldir: &Path) -> TrainingConfig {
    TrainingConfig {
        resnet_version: 1,
        resnet_size: 1,
        num_classes: 10,
        first_num_filters: 2,
        batch_size: 4,
        save_interval: 2,
        seed: Some(7),
        modeldir: modeldir.display().to_string(),
        ..Default::default()
    }
}

#[derive(Default)]
struct ParamValues(Vec<TensorData>);

impl<B: Backend> ModuleVisitor<B> for ParamValues {
    fn visit_float<const D: usize>(&mut self, param: &Param<Tensor<B, D>>) {
        self.0.push(param.val().to_data());
    }
}

fn param_values<M: Module<TestBackend>>(module: &M) -> Vec<TensorData> {
    let mut values = ParamValues::default();
    module.visit(&mut values);
    values.0
}

fn synthetic_split(n: usize) -> CifarSplit {
    let images = (0..n)
        .map(|i| {
            let mut image = [0u8; IMAGE_BYTES];
            for (j, px) in image.iter_mut().enumerate() {
                *px = ((i * 37 + j * 11) % 256) as u8;
            }
            image
        })
        .collect();
    let labels = (0..n).map(|i| i % 10).collect();
    CifarSplit::new(images, labels).unwrap()
}

#[test]
fn checkpoints_follow_save_interval() {
    let dir = tempfile::tempdir().unwrap();
    let modeldir = dir.path().join("model_v1");
    let mut trainer = Trainer::<TestBackend>::new(tiny_config(&modeldir), Default::default()).unwrap();

    // 10 samples in batches of 4: the trailing 2 are dropped.
    let history = trainer.train(&synthetic_split(10), 3).unwrap();

    assert_eq!(history.len(), 3);
    assert!(history.iter().all(|s| s.batches == 2));
    assert!(history.iter().all(|s| s.loss.is_finite()));
    assert_eq!(
        history.iter().map(|s| s.checkpoint_saved).collect::<Vec<_>>(),
        vec![false, true, false]
    );

    assert!(modeldir.join("model-2.ckpt").exists());
    assert!(!modeldir.join("model-1.ckpt").exists());
    assert!(!modeldir.join("model-3.ckpt").exists());
}

#[test]
fn zero_epochs_leaves_disk_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let modeldir = dir.path().join("never_created");
    let mut trainer = Trainer::<TestBackend>::new(tiny_config(&modeldir), Default::default()).unwrap();

    let history = trainer.train(&synthetic_split(8), 0).unwrap();

    assert!(history.is_empty());
    assert!(!modeldir.exists());
}

#[test]
fn fewer_samples_than_a_batch_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut trainer =
        Trainer::<TestBackend>::new(tiny_config(dir.path()), Default::default()).unwrap();

    let err = trainer.train(&synthetic_split(3), 1).unwrap_err();
    assert!(err.to_string().contains("fewer than one batch"));
}

#[test]
fn out_of_range_labels_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = TrainingConfig {
        num_classes: 5,
        ..tiny_config(dir.path())
    };
    let mut trainer = Trainer::<TestBackend>::new(config, Default::default()).unwrap();

    let err = trainer.train(&synthetic_split(8), 1).unwrap_err();
    assert!(err.to_string().contains("out of range"));
}

#[test]
fn learning_rate_decays_every_step_size_epochs() {
    let dir = tempfile::tempdir().unwrap();
    let config = TrainingConfig {
        learning_rate: 0.1,
        lr_step_size: 2,
        lr_gamma: 0.5,
        save_interval: 100,
        ..tiny_config(dir.path())
    };
    let mut trainer = Trainer::<TestBackend>::new(config, Default::default()).unwrap();

    let history = trainer.train(&synthetic_split(4), 5).unwrap();
    let rates: Vec<f64> = history.iter().map(|s| s.learning_rate).collect();
    let expected = [0.1, 0.1, 0.05, 0.05, 0.025];

    for (rate, want) in rates.iter().zip(expected) {
        assert!((rate - want).abs() < 1e-9, "got {rates:?}");
    }
}

#[test]
fn saved_checkpoint_reproduces_predictions() {
    let dir = tempfile::tempdir().unwrap();
    let config = tiny_config(dir.path());
    let data = synthetic_split(8);

    let mut trained = Trainer::<TestBackend>::new(config.clone(), Default::default()).unwrap();
    trained.train(&data, 1).unwrap();
    let path = trained.save(4).unwrap();
    assert_eq!(path, dir.path().join("model-4.ckpt"));

    let mut restored = Trainer::<TestBackend>::new(config, Default::default()).unwrap();
    restored.load(&path).unwrap();

    let before = param_values(&trained.model);
    let after = param_values(&restored.model);
    assert!(!before.is_empty());
    assert_eq!(before.len(), after.len());
    for (a, b) in before.iter().zip(&after) {
        assert_eq!(a, b);
    }

    for image in data.images() {
        let a = trained.predict(image).unwrap();
        let b = restored.predict(image).unwrap();
        assert_eq!(a.class, b.class);
        for (x, y) in a.probabilities.iter().zip(&b.probabilities) {
            assert!((x - y).abs() < 1e-5);
        }
    }
}

#[test]
fn save_overwrites_existing_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let trainer = Trainer::<TestBackend>::new(tiny_config(dir.path()), Default::default()).unwrap();

    let path = dir.path().join("model-1.ckpt");
    std::fs::write(&path, b"stale").unwrap();
    trainer.save(1).unwrap();

    assert!(std::fs::metadata(&path).unwrap().len() > 5);
}

#[test]
fn evaluation_reports_each_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let mut trainer =
        Trainer::<TestBackend>::new(tiny_config(dir.path()), Default::default()).unwrap();
    let data = synthetic_split(8);

    trainer.train(&data, 2).unwrap();
    assert_eq!(trainer.mode(), NetworkMode::Training);

    let reports = trainer.test_or_validate(&data, &[2]).unwrap();
    assert_eq!(trainer.mode(), NetworkMode::Evaluation);

    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report.checkpoint, 2);
    assert_eq!(report.total, 8);
    assert!(report.correct <= report.total);
    assert!((0.0..=1.0).contains(&report.accuracy));
    assert!((report.accuracy - report.correct as f32 / 8.0).abs() < 1e-6);
}

#[test]
fn empty_split_scores_zero() {
    let dir = tempfile::tempdir().unwrap();
    let mut trainer =
        Trainer::<TestBackend>::new(tiny_config(dir.path()), Default::default()).unwrap();
    trainer.save(1).unwrap();

    let empty = CifarSplit::new(Vec::new(), Vec::new()).unwrap();
    let reports = trainer.test_or_validate(&empty, &[1]).unwrap();
    assert_eq!(reports[0].total, 0);
    assert_eq!(reports[0].accuracy, 0.0);
}

#[test]
fn missing_checkpoint_fails_evaluation() {
    let dir = tempfile::tempdir().unwrap();
    let mut trainer =
        Trainer::<TestBackend>::new(tiny_config(dir.path()), Default::default()).unwrap();

    let err = trainer
        .test_or_validate(&synthetic_split(4), &[999])
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CheckpointError>(),
        Some(CheckpointError::Io { .. })
    ));
}

#[test]
fn mismatched_architecture_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let narrow = Trainer::<TestBackend>::new(tiny_config(dir.path()), Default::default()).unwrap();
    let path = narrow.save(1).unwrap();

    let wide_config = TrainingConfig {
        first_num_filters: 4,
        ..tiny_config(dir.path())
    };
    let mut wide = Trainer::<TestBackend>::new(wide_config, Default::default()).unwrap();

    let err = wide.load(&path).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CheckpointError>(),
        Some(CheckpointError::ParameterMismatch { .. })
    ));
}

#[test]
fn invalid_config_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = TrainingConfig {
        resnet_version: 3,
        ..tiny_config(dir.path())
    };
    assert!(Trainer::<TestBackend>::new(config, Default::default()).is_err());
}

#[test]
fn trainer_keeps_its_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = tiny_config(dir.path());
    let trainer = Trainer::<TestBackend>::new(config.clone(), Default::default()).unwrap();
    assert_eq!(trainer.config(), &config);
}

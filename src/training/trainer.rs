use crate::data::dataset::{IMAGE_SIZE, NUM_CHANNELS};
use crate::data::{num_batches, CifarDataLoader, CifarSplit, RawImage, RecordParser};
use crate::model::ResNet;
use crate::training::checkpoint::{load_checkpoint, save_checkpoint};
use crate::training::metrics::{argmax, EpochSummary, EvalReport};
use crate::training::TrainingConfig;
use anyhow::{anyhow, bail, Context, Result};
use burn::lr_scheduler::step::{StepLrScheduler, StepLrSchedulerConfig};
use burn::lr_scheduler::LrScheduler;
use burn::module::AutodiffModule;
use burn::nn::loss::{CrossEntropyLoss, CrossEntropyLossConfig};
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::decay::WeightDecayConfig;
use burn::optim::momentum::MomentumConfig;
use burn::optim::{GradientsParams, Optimizer, Sgd, SgdConfig};
use burn::prelude::*;
use burn::tensor::activation::softmax;
use burn::tensor::backend::AutodiffBackend;
use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Which statistics batch norm uses. Training runs on the autodiff
/// backend; evaluation runs on `model.valid()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkMode {
    Training,
    Evaluation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub class: usize,
    pub probabilities: Vec<f32>,
}

pub struct Trainer<B: AutodiffBackend> {
    pub model: ResNet<B>,
    loss_fn: CrossEntropyLoss<B>,
    optimizer: OptimizerAdaptor<Sgd<B::InnerBackend>, ResNet<B>, B>,
    scheduler: StepLrScheduler,
    config: TrainingConfig,
    device: B::Device,
    parser: RecordParser,
    rng: StdRng,
    mode: NetworkMode,
}

impl<B: AutodiffBackend> Trainer<B> {
    pub fn new(config: TrainingConfig, device: B::Device) -> Result<Self> {
        config.validate()?;

        let model = ResNet::new(
            &device,
            config.version()?,
            config.resnet_size,
            config.num_classes,
            config.first_num_filters,
        );

        let loss_fn = CrossEntropyLossConfig::new().init(&device);

        let optimizer = SgdConfig::new()
            .with_momentum(Some(
                MomentumConfig::new()
                    .with_momentum(config.momentum)
                    .with_dampening(0.0)
                    .with_nesterov(true),
            ))
            .with_weight_decay(Some(WeightDecayConfig::new(config.weight_decay as f32)))
            .init();

        let scheduler = StepLrSchedulerConfig::new(config.learning_rate, config.lr_step_size)
            .with_gamma(config.lr_gamma)
            .init()
            .map_err(|e| anyhow!("Invalid learning-rate schedule: {e}"))?;

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let parser = RecordParser::new(config.seed.map(|seed| seed.wrapping_add(1)));

        Ok(Self {
            model,
            loss_fn,
            optimizer,
            scheduler,
            config,
            device,
            parser,
            rng,
            mode: NetworkMode::Training,
        })
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn mode(&self) -> NetworkMode {
        self.mode
    }

    pub fn train(&mut self, dataset: &CifarSplit, max_epoch: usize) -> Result<Vec<EpochSummary>> {
        self.mode = NetworkMode::Training;

        if max_epoch == 0 {
            return Ok(Vec::new());
        }

        let num_batches = num_batches(dataset.len(), self.config.batch_size);
        if num_batches == 0 {
            bail!(
                "Training split has {} samples, fewer than one batch of {}",
                dataset.len(),
                self.config.batch_size
            );
        }
        self.check_labels(dataset)?;

        log::info!(
            "### Training... ### {} samples, {} batches of {} per epoch",
            dataset.len(),
            num_batches,
            self.config.batch_size
        );

        let mut history = Vec::with_capacity(max_epoch);
        for epoch in 1..=max_epoch {
            history.push(self.train_epoch(dataset, epoch, num_batches)?);
        }

        Ok(history)
    }

    fn train_epoch(
        &mut self,
        dataset: &CifarSplit,
        epoch: usize,
        num_batches: usize,
    ) -> Result<EpochSummary> {
        let epoch_start = Instant::now();
        let learning_rate = self.scheduler.step();

        let dataloader: CifarDataLoader<B> = CifarDataLoader::new(
            dataset,
            &mut self.parser,
            self.config.batch_size,
            true,
            Some(&mut self.rng),
            self.device.clone(),
        );

        let mut total_loss = 0.0;
        let mut batches = 0;

        for (batch_idx, batch) in dataloader.enumerate() {
            let output = self.model.forward(batch.images);
            let loss = self.loss_fn.forward(output, batch.labels);

            let loss_value = loss.clone().into_scalar().elem::<f32>();
            total_loss += loss_value;
            batches += 1;

            // Gradients are produced fresh by each backward pass.
            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &self.model);
            self.model = self
                .optimizer
                .step(learning_rate, self.model.clone(), grads);

            log::debug!(
                "Batch {}/{} Loss {:.6}",
                batch_idx + 1,
                num_batches,
                loss_value
            );
        }

        let loss = total_loss / num_batches as f32;
        let duration = epoch_start.elapsed();
        log::info!(
            "Epoch {} Loss {:.6} LR {:.6} Duration {:.3} seconds.",
            epoch,
            loss,
            learning_rate,
            duration.as_secs_f32()
        );

        let checkpoint_saved = self.config.is_save_epoch(epoch);
        if checkpoint_saved {
            self.save(epoch)?;
        }

        Ok(EpochSummary {
            epoch,
            loss,
            learning_rate,
            batches,
            duration,
            checkpoint_saved,
        })
    }

    pub fn test_or_validate(
        &mut self,
        dataset: &CifarSplit,
        checkpoints: &[usize],
    ) -> Result<Vec<EvalReport>> {
        self.mode = NetworkMode::Evaluation;
        log::info!("### Test or Validation ###");

        let mut reports = Vec::with_capacity(checkpoints.len());
        for &checkpoint in checkpoints {
            let path = self.config.checkpoint_path(checkpoint);
            self.load(&path)?;

            let predictions = self.predict_split(dataset)?;
            let report = EvalReport::new(checkpoint, &predictions, dataset.labels());
            log::info!(
                "Checkpoint {} test accuracy: {:.4} ({}/{})",
                checkpoint,
                report.accuracy,
                report.correct,
                report.total
            );
            reports.push(report);
        }

        Ok(reports)
    }

    fn predict_split(&mut self, dataset: &CifarSplit) -> Result<Vec<usize>> {
        let model = self.model.valid();

        let pb = ProgressBar::new(dataset.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?,
        );

        let mut predictions = Vec::with_capacity(dataset.len());
        for image in dataset.images() {
            let input = self.single_input::<B::InnerBackend>(image);
            let scores = model.forward(input);
            let class = scores.argmax(1).into_scalar().elem::<i64>();
            predictions.push(class as usize);
            pb.inc(1);
        }
        pb.finish_and_clear();

        Ok(predictions)
    }

    pub fn predict(&mut self, image: &RawImage) -> Result<Prediction> {
        self.mode = NetworkMode::Evaluation;
        let model = self.model.valid();

        let input = self.single_input::<B::InnerBackend>(image);
        let probabilities = softmax(model.forward(input), 1)
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| anyhow!("Cannot read class scores: {e:?}"))?;

        Ok(Prediction {
            class: argmax(&probabilities),
            probabilities,
        })
    }

    fn single_input<IB: Backend<Device = B::Device>>(&mut self, image: &RawImage) -> Tensor<IB, 4> {
        let pixels = self.parser.parse_record(image, false);
        Tensor::<IB, 4>::from_data(
            TensorData::new(pixels, [1, NUM_CHANNELS, IMAGE_SIZE, IMAGE_SIZE]),
            &self.device,
        )
    }

    pub fn save(&self, epoch: usize) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.config.modeldir)
            .with_context(|| format!("Cannot create model directory {}", self.config.modeldir))?;

        let path = self.config.checkpoint_path(epoch);
        save_checkpoint(&self.model, epoch, &path)?;
        log::info!("Checkpoint has been created: {}", path.display());

        Ok(path)
    }

    /// Replaces the network parameters with the snapshot at `checkpoint_path`.
    /// Fails without touching the network when the file is missing or was
    /// taken from a differently shaped network.
    pub fn load(&mut self, checkpoint_path: &Path) -> Result<()> {
        let (model, epoch) = load_checkpoint(self.model.clone(), checkpoint_path, &self.device)?;
        self.model = model;
        log::info!(
            "Restored model parameters from {} (epoch {})",
            checkpoint_path.display(),
            epoch
        );
        Ok(())
    }

    fn check_labels(&self, dataset: &CifarSplit) -> Result<()> {
        if let Some(&label) = dataset
            .labels()
            .iter()
            .find(|&&label| label >= self.config.num_classes)
        {
            bail!(
                "Label {} is out of range for {} classes",
                label,
                self.config.num_classes
            );
        }
        Ok(())
    }
}

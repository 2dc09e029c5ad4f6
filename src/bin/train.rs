use anyhow::Result;
use burn::backend::{Autodiff, NdArray};
use clap::Parser;
use std::path::{Path, PathBuf};

use cifar_resnet::data::{load_cifar10, train_valid_split};
use cifar_resnet::training::{Trainer, TrainingConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Train a ResNet on CIFAR-10 (CPU)")]
struct Args {
    /// YAML config, written with defaults when missing
    #[arg(short, long, default_value = "configs/train_config.yaml")]
    config: PathBuf,

    /// Directory holding the CIFAR-10 binary batches
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Overrides `max_epoch` from the config
    #[arg(short, long)]
    max_epoch: Option<usize>,

    /// Evaluate the configured checkpoints on the validation split afterwards
    #[arg(long)]
    validate: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    type MyBackend = NdArray;
    type MyAutodiffBackend = Autodiff<MyBackend>;
    let device = Default::default();

    let mut config = TrainingConfig::load_or_create(&args.config)?;
    if let Some(data_dir) = &args.data_dir {
        config.data_dir = data_dir.display().to_string();
    }
    if let Some(max_epoch) = args.max_epoch {
        config.max_epoch = max_epoch;
    }

    let (train_all, _test) = load_cifar10(Path::new(&config.data_dir))?;
    let total = train_all.len();
    let (x_train, x_valid) = train_valid_split(train_all, config.train_ratio)?;
    log::info!(
        "Split {} training images into {} train / {} valid",
        total,
        x_train.len(),
        x_valid.len()
    );

    let mut trainer = Trainer::<MyAutodiffBackend>::new(config, device)?;
    let config = trainer.config().clone();

    log::info!(
        "ResNet v{} size {} | {} classes | {} filters | batch {} | {} epochs | lr {} | modeldir {}",
        config.version()?.number(),
        config.resnet_size,
        config.num_classes,
        config.first_num_filters,
        config.batch_size,
        config.max_epoch,
        config.learning_rate,
        config.modeldir
    );

    let history = trainer.train(&x_train, config.max_epoch)?;
    if let Some(last) = history.last() {
        log::info!("Training finished after {} epochs, final loss {:.6}", last.epoch, last.loss);
    }

    if args.validate {
        for report in trainer.test_or_validate(&x_valid, &config.checkpoints)? {
            println!(
                "model-{}: validation accuracy {:.4} ({}/{})",
                report.checkpoint, report.accuracy, report.correct, report.total
            );
        }
    }

    Ok(())
}

use anyhow::{Context, Result};
use burn::backend::{Autodiff, NdArray};
use clap::Parser;
use std::path::PathBuf;

use cifar_resnet::data::{image_to_record, CIFAR10_CLASSES};
use cifar_resnet::training::{Trainer, TrainingConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Classify an image with a trained checkpoint")]
struct Args {
    /// Path to input image
    #[arg(short, long)]
    image: PathBuf,

    #[arg(short, long, default_value = "configs/train_config.yaml")]
    config: PathBuf,

    /// Checkpoint epoch inside the configured model directory
    #[arg(long, default_value_t = 200)]
    checkpoint: usize,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    type MyAutodiffBackend = Autodiff<NdArray>;
    let device = Default::default();

    let config = TrainingConfig::load_or_create(&args.config)?;
    let checkpoint_path = config.checkpoint_path(args.checkpoint);
    let mut trainer = Trainer::<MyAutodiffBackend>::new(config, device)?;
    trainer.load(&checkpoint_path)?;

    let img = image::open(&args.image)
        .with_context(|| format!("Cannot open image {}", args.image.display()))?;
    let prediction = trainer.predict(&image_to_record(&img))?;

    let name = CIFAR10_CLASSES
        .get(prediction.class)
        .copied()
        .unwrap_or("unknown");
    println!(
        "{}: {} ({:.1}%)",
        args.image.display(),
        name,
        prediction.probabilities[prediction.class] * 100.0
    );

    Ok(())
}

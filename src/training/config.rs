use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::model::ResNetVersion;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    // Model
    pub resnet_version: usize,
    /// Residual blocks per stack.
    pub resnet_size: usize,
    pub num_classes: usize,
    pub first_num_filters: usize,

    // Optimization
    pub learning_rate: f64,
    pub momentum: f64,
    pub weight_decay: f64,
    /// Epochs between learning-rate decays.
    pub lr_step_size: usize,
    pub lr_gamma: f64,
    pub batch_size: usize,
    pub max_epoch: usize,
    pub seed: Option<u64>,

    // Data
    pub data_dir: String,
    pub train_ratio: f64,

    // Checkpointing
    pub modeldir: String,
    pub save_interval: usize,
    pub checkpoints: Vec<usize>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            resnet_version: 2,
            resnet_size: 18,
            num_classes: 10,
            first_num_filters: 16,
            learning_rate: 0.1,
            momentum: 0.9,
            weight_decay: 2e-4,
            lr_step_size: 80,
            lr_gamma: 0.1,
            batch_size: 128,
            max_epoch: 200,
            seed: None,
            data_dir: "data/cifar-10-batches-bin".to_string(),
            train_ratio: 0.8,
            modeldir: "model_v2".to_string(),
            save_interval: 10,
            checkpoints: vec![160, 170, 180, 190, 200],
        }
    }
}

impl TrainingConfig {
    pub fn from_yaml(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read config {}", path.display()))?;
        let config: TrainingConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)
            .with_context(|| format!("Cannot write config {}", path.display()))?;
        Ok(())
    }

    /// Reads `path`, or writes the defaults there when it does not exist yet.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            log::info!("Loading config from {}", path.display());
            return Self::from_yaml(path);
        }
        let config = Self::default();
        config.save(path)?;
        log::info!("Created default config at {}", path.display());
        Ok(config)
    }

    pub fn version(&self) -> Result<ResNetVersion> {
        ResNetVersion::try_from(self.resnet_version)
    }

    pub fn validate(&self) -> Result<()> {
        self.version()?;
        if self.resnet_size == 0 {
            bail!("resnet_size must be at least 1");
        }
        if self.num_classes == 0 {
            bail!("num_classes must be at least 1");
        }
        if self.first_num_filters == 0 {
            bail!("first_num_filters must be at least 1");
        }
        if self.batch_size == 0 {
            bail!("batch_size must be at least 1");
        }
        if self.save_interval == 0 {
            bail!("save_interval must be at least 1");
        }
        if self.lr_step_size == 0 {
            bail!("lr_step_size must be at least 1");
        }
        Ok(())
    }

    /// `<modeldir>/model-<epoch>.ckpt`
    pub fn checkpoint_path(&self, epoch: usize) -> PathBuf {
        Path::new(&self.modeldir).join(format!("model-{epoch}.ckpt"))
    }

    pub fn is_save_epoch(&self, epoch: usize) -> bool {
        self.save_interval > 0 && epoch % self.save_interval == 0
    }
}

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const IMAGE_SIZE: usize = 32;
pub const NUM_CHANNELS: usize = 3;
/// Pixel bytes per record, channel-first: 1024 red, 1024 green, 1024 blue.
pub const IMAGE_BYTES: usize = NUM_CHANNELS * IMAGE_SIZE * IMAGE_SIZE;
/// Label byte followed by the pixels.
pub const RECORD_BYTES: usize = 1 + IMAGE_BYTES;

pub type RawImage = [u8; IMAGE_BYTES];

pub const CIFAR10_CLASSES: [&str; 10] = [
    "airplane",
    "automobile",
    "bird",
    "cat",
    "deer",
    "dog",
    "frog",
    "horse",
    "ship",
    "truck",
];

#[derive(Debug, Clone, Default)]
pub struct CifarSplit {
    images: Vec<RawImage>,
    labels: Vec<usize>,
}

impl CifarSplit {
    pub fn new(images: Vec<RawImage>, labels: Vec<usize>) -> Result<Self> {
        if images.len() != labels.len() {
            bail!(
                "Got {} images but {} labels",
                images.len(),
                labels.len()
            );
        }
        Ok(Self { images, labels })
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn images(&self) -> &[RawImage] {
        &self.images
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    pub fn get(&self, idx: usize) -> Option<(&RawImage, usize)> {
        Some((self.images.get(idx)?, *self.labels.get(idx)?))
    }

    pub fn extend(&mut self, other: CifarSplit) {
        self.images.extend(other.images);
        self.labels.extend(other.labels);
    }
}

pub fn read_batch_file(path: &Path) -> Result<CifarSplit> {
    let bytes =
        fs::read(path).with_context(|| format!("Cannot read batch file {}", path.display()))?;
    parse_batch(&bytes).with_context(|| format!("Invalid batch file {}", path.display()))
}

fn parse_batch(bytes: &[u8]) -> Result<CifarSplit> {
    if bytes.len() % RECORD_BYTES != 0 {
        bail!(
            "{} bytes is not a whole number of {}-byte records",
            bytes.len(),
            RECORD_BYTES
        );
    }

    let count = bytes.len() / RECORD_BYTES;
    let mut images = Vec::with_capacity(count);
    let mut labels = Vec::with_capacity(count);

    for record in bytes.chunks_exact(RECORD_BYTES) {
        let mut image = [0u8; IMAGE_BYTES];
        image.copy_from_slice(&record[1..]);
        labels.push(record[0] as usize);
        images.push(image);
    }

    CifarSplit::new(images, labels)
}

/// Expected layout (searched recursively, so the archive's
/// `cifar-10-batches-bin/` folder may sit anywhere under `data_dir`):
/// ```text
/// data_batch_1.bin .. data_batch_5.bin   training split
/// test_batch.bin                         test split
/// ```
pub fn load_cifar10(data_dir: &Path) -> Result<(CifarSplit, CifarSplit)> {
    if !data_dir.exists() {
        bail!("Data directory not found: {}", data_dir.display());
    }

    let mut train_files: Vec<PathBuf> = Vec::new();
    let mut test_file: Option<PathBuf> = None;

    for entry in WalkDir::new(data_dir).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if name.starts_with("data_batch_") && name.ends_with(".bin") {
            train_files.push(entry.path().to_path_buf());
        } else if name == "test_batch.bin" {
            test_file = Some(entry.path().to_path_buf());
        }
    }

    if train_files.is_empty() {
        bail!("No data_batch_*.bin files under {}", data_dir.display());
    }
    let test_file = test_file
        .with_context(|| format!("No test_batch.bin under {}", data_dir.display()))?;

    train_files.sort();

    let mut train = CifarSplit::default();
    for path in &train_files {
        train.extend(read_batch_file(path)?);
    }
    let test = read_batch_file(&test_file)?;

    log::info!(
        "Loaded CIFAR-10 from {}: {} train / {} test samples",
        data_dir.display(),
        train.len(),
        test.len()
    );

    Ok((train, test))
}

/// Splits off the leading `train_ratio` share for training and keeps the
/// remainder for validation. No shuffling.
pub fn train_valid_split(split: CifarSplit, train_ratio: f64) -> Result<(CifarSplit, CifarSplit)> {
    if !(0.0..=1.0).contains(&train_ratio) {
        bail!("train_ratio must be within [0, 1], got {train_ratio}");
    }

    let split_index = (split.len() as f64 * train_ratio).floor() as usize;
    let CifarSplit {
        mut images,
        mut labels,
    } = split;

    let valid_images = images.split_off(split_index);
    let valid_labels = labels.split_off(split_index);

    Ok((
        CifarSplit::new(images, labels)?,
        CifarSplit::new(valid_images, valid_labels)?,
    ))
}

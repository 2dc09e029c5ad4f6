use burn::module::{ModuleVisitor, Param};
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, Record};
use std::fs;
use std::path::{Path, PathBuf};

use crate::model::{ResNet, ResNetRecord};

/// On-disk snapshot: the network record plus the parameter layout it was
/// taken from, so a restore can refuse a network of a different shape.
#[derive(Record)]
pub struct CheckpointRecord<B: Backend> {
    pub epoch: usize,
    pub shapes: Vec<Vec<usize>>,
    pub model: ResNetRecord<B>,
}

type CheckpointItem<B> = <CheckpointRecord<B> as Record<B>>::Item<FullPrecisionSettings>;

#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("cannot access checkpoint {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot encode checkpoint: {0}")]
    Encode(String),
    #[error("cannot decode checkpoint {}: {reason}", .path.display())]
    Decode { path: PathBuf, reason: String },
    #[error(
        "checkpoint {} does not match the network: {found} parameters saved, {expected} expected{}",
        .path.display(),
        describe_difference(.expected_shapes, .found_shapes)
    )]
    ParameterMismatch {
        path: PathBuf,
        expected: usize,
        found: usize,
        expected_shapes: Vec<Vec<usize>>,
        found_shapes: Vec<Vec<usize>>,
    },
}

fn describe_difference(expected: &[Vec<usize>], found: &[Vec<usize>]) -> String {
    expected
        .iter()
        .zip(found)
        .position(|(e, f)| e != f)
        .map(|i| {
            format!(
                " (parameter #{i}: saved {:?}, expected {:?})",
                found[i], expected[i]
            )
        })
        .unwrap_or_default()
}

#[derive(Default)]
struct ShapeCollector {
    shapes: Vec<Vec<usize>>,
}

impl<B: Backend> ModuleVisitor<B> for ShapeCollector {
    fn visit_float<const D: usize>(&mut self, param: &Param<Tensor<B, D>>) {
        self.shapes.push(param.val().dims().to_vec());
    }
}

pub fn parameter_shapes<B: Backend, M: Module<B>>(module: &M) -> Vec<Vec<usize>> {
    let mut collector = ShapeCollector::default();
    module.visit(&mut collector);
    collector.shapes
}

pub fn save_checkpoint<B: Backend>(
    model: &ResNet<B>,
    epoch: usize,
    path: &Path,
) -> Result<(), CheckpointError> {
    let record = CheckpointRecord {
        epoch,
        shapes: parameter_shapes(model),
        model: model.clone().into_record(),
    };

    let bytes = bincode::serde::encode_to_vec(
        record.into_item::<FullPrecisionSettings>(),
        bincode::config::standard(),
    )
    .map_err(|e| CheckpointError::Encode(e.to_string()))?;

    fs::write(path, bytes).map_err(|source| CheckpointError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Restores `model` from `path`. Every parameter must exist in the file
/// with the same shape; nothing is loaded otherwise.
pub fn load_checkpoint<B: Backend>(
    model: ResNet<B>,
    path: &Path,
    device: &B::Device,
) -> Result<(ResNet<B>, usize), CheckpointError> {
    let bytes = fs::read(path).map_err(|source| CheckpointError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let (item, _): (CheckpointItem<B>, usize) =
        bincode::serde::decode_from_slice(&bytes, bincode::config::standard()).map_err(|e| {
            CheckpointError::Decode {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        })?;
    let record = CheckpointRecord::<B>::from_item(item, device);

    let expected_shapes = parameter_shapes(&model);
    if record.shapes != expected_shapes {
        return Err(CheckpointError::ParameterMismatch {
            path: path.to_path_buf(),
            expected: expected_shapes.len(),
            found: record.shapes.len(),
            expected_shapes,
            found_shapes: record.shapes,
        });
    }

    Ok((model.load_record(record.model), record.epoch))
}

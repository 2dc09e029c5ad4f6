use burn::prelude::*;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::data::dataset::{CifarSplit, IMAGE_SIZE, NUM_CHANNELS};
use crate::data::transforms::RecordParser;

/// Iterates one epoch of fixed-size batches.
///
/// A trailing partial batch is never yielded, so every epoch produces
/// exactly `len / batch_size` batches.
pub struct CifarDataLoader<'a, B: Backend> {
    dataset: &'a CifarSplit,
    parser: &'a mut RecordParser,
    batch_size: usize,
    augment: bool,
    device: B::Device,
    indices: Vec<usize>,
    current_idx: usize,
}

pub struct CifarBatch<B: Backend> {
    pub images: Tensor<B, 4>,
    pub labels: Tensor<B, 1, Int>,
    /// Positions of the samples in the source split.
    pub indices: Vec<usize>,
}

impl<'a, B: Backend> CifarDataLoader<'a, B> {
    /// Pass an RNG to draw a fresh permutation of the samples; `None`
    /// keeps file order.
    pub fn new<R: Rng>(
        dataset: &'a CifarSplit,
        parser: &'a mut RecordParser,
        batch_size: usize,
        augment: bool,
        shuffle: Option<&mut R>,
        device: B::Device,
    ) -> Self {
        let mut indices: Vec<usize> = (0..dataset.len()).collect();

        if let Some(rng) = shuffle {
            indices.shuffle(rng);
        }

        Self {
            dataset,
            parser,
            batch_size,
            augment,
            device,
            indices,
            current_idx: 0,
        }
    }

    pub fn num_batches(&self) -> usize {
        num_batches(self.dataset.len(), self.batch_size)
    }
}

pub fn num_batches(num_samples: usize, batch_size: usize) -> usize {
    if batch_size == 0 {
        0
    } else {
        num_samples / batch_size
    }
}

impl<B: Backend> Iterator for CifarDataLoader<'_, B> {
    type Item = CifarBatch<B>;

    fn next(&mut self) -> Option<Self::Item> {
        let end_idx = self.current_idx + self.batch_size;
        if self.batch_size == 0 || end_idx > self.indices.len() {
            return None;
        }

        let batch_indices = self.indices[self.current_idx..end_idx].to_vec();
        self.current_idx = end_idx;

        let mut images_vec = Vec::with_capacity(self.batch_size * NUM_CHANNELS * IMAGE_SIZE * IMAGE_SIZE);
        let mut labels_vec = Vec::with_capacity(self.batch_size);

        for &idx in &batch_indices {
            let (image, label) = self.dataset.get(idx)?;
            images_vec.extend(self.parser.parse_record(image, self.augment));
            labels_vec.push(label as i64);
        }

        let images = Tensor::<B, 4>::from_data(
            TensorData::new(
                images_vec,
                [self.batch_size, NUM_CHANNELS, IMAGE_SIZE, IMAGE_SIZE],
            ),
            &self.device,
        );
        let labels = Tensor::<B, 1, Int>::from_data(
            TensorData::new(labels_vec, [self.batch_size]),
            &self.device,
        );

        Some(CifarBatch {
            images,
            labels,
            indices: batch_indices,
        })
    }
}

use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::data::dataset::{RawImage, IMAGE_BYTES, IMAGE_SIZE, NUM_CHANNELS};

/// Zero border added on each side before the random crop.
const PAD: u32 = 4;

pub struct DataAugmentation {
    pub enable: bool,
}

impl DataAugmentation {
    pub fn new(enable: bool) -> Self {
        Self { enable }
    }

    pub fn apply<R: Rng>(&self, img: RgbImage, rng: &mut R) -> RgbImage {
        if !self.enable {
            return img;
        }

        let size = IMAGE_SIZE as u32;
        let mut padded = RgbImage::new(size + 2 * PAD, size + 2 * PAD);
        imageops::overlay(&mut padded, &img, PAD as i64, PAD as i64);

        let x = rng.gen_range(0..=2 * PAD);
        let y = rng.gen_range(0..=2 * PAD);
        let mut img = imageops::crop_imm(&padded, x, y, size, size).to_image();

        if rng.gen_bool(0.5) {
            imageops::flip_horizontal_in_place(&mut img);
        }

        img
    }
}

pub struct RecordParser {
    rng: StdRng,
}

impl RecordParser {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }

    /// Returns `3 * 32 * 32` standardized floats in `[channel][row][col]`
    /// order. `training` enables the stochastic augmentation.
    pub fn parse_record(&mut self, record: &RawImage, training: bool) -> Vec<f32> {
        let img = record_to_image(record);
        let img = DataAugmentation::new(training).apply(img, &mut self.rng);
        standardize(&image_to_chw(&img))
    }
}

fn record_to_image(record: &RawImage) -> RgbImage {
    let plane = IMAGE_SIZE * IMAGE_SIZE;
    RgbImage::from_fn(IMAGE_SIZE as u32, IMAGE_SIZE as u32, |x, y| {
        let idx = y as usize * IMAGE_SIZE + x as usize;
        Rgb([record[idx], record[plane + idx], record[2 * plane + idx]])
    })
}

fn image_to_chw(img: &RgbImage) -> RawImage {
    let plane = IMAGE_SIZE * IMAGE_SIZE;
    let mut out = [0u8; IMAGE_BYTES];
    for (x, y, pixel) in img.enumerate_pixels() {
        let idx = y as usize * IMAGE_SIZE + x as usize;
        for c in 0..NUM_CHANNELS {
            out[c * plane + idx] = pixel[c];
        }
    }
    out
}

/// Per-image standardization. The std floor keeps flat images finite.
fn standardize(pixels: &[u8]) -> Vec<f32> {
    let n = pixels.len() as f32;
    let mean = pixels.iter().map(|&p| p as f32).sum::<f32>() / n;
    let var = pixels
        .iter()
        .map(|&p| {
            let d = p as f32 - mean;
            d * d
        })
        .sum::<f32>()
        / n;
    let std = var.sqrt().max(1.0 / n.sqrt());

    pixels.iter().map(|&p| (p as f32 - mean) / std).collect()
}

pub fn image_to_record(img: &DynamicImage) -> RawImage {
    let size = IMAGE_SIZE as u32;
    let resized = img.resize_exact(size, size, FilterType::Triangle).to_rgb8();
    image_to_chw(&resized)
}

pub mod dataset;
pub mod dataloader;
pub mod transforms;

pub use dataset::{
    load_cifar10, read_batch_file, train_valid_split, CifarSplit, RawImage, CIFAR10_CLASSES,
    IMAGE_BYTES, IMAGE_SIZE,
};
pub use dataloader::{num_batches, CifarBatch, CifarDataLoader};
pub use transforms::{image_to_record, DataAugmentation, RecordParser};

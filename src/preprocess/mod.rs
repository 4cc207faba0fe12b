pub mod normalizer;

pub use normalizer::{
    find_ink_bounds, CropMode, ImageNormalizer, InkBounds, NormalizerConfig, INK_THRESHOLD, PADDING,
    WORK_SIZE,
};

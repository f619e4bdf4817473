pub mod generators;
pub mod utils;

/// Device size of every generated image, in blocks
pub const IMAGE_BLOCKS: usize = 64;

// src/engine.rs
//
// The core of imgconv. Every pixel operation reads its input through a
// Scanner (any SourceImage layout, or a PixelBuffer) and produces a
// canonical non-premultiplied RGBA PixelBuffer.
//
// This file is a facade over the modules in engine/

// =============================================================================
// SECURITY LIMITS
// =============================================================================

/// Maximum allowed image dimension (width or height).
/// Larger images are rejected before decoding to stop decompression bombs.
pub const MAX_DIMENSION: u32 = 32768;

/// Maximum allowed total pixels (width * height).
/// 100 megapixels = 400MB as canonical RGBA.
pub const MAX_PIXELS: u64 = 100_000_000;

// =============================================================================
// MODULES
// =============================================================================

pub mod api;
pub mod buffer;
pub mod common;
pub mod decoder;
pub mod encoder;
pub mod gray;
pub mod orientation;
pub mod pool;
pub mod resize;
pub mod scanner;
pub mod source;
pub mod split;
pub mod transform;
pub mod watermark;

pub use api::{open, save, write, Options, ResizeOptions, DEFAULT_OPACITY};
pub use buffer::{PixelBuffer, Rect};
pub use common::EngineResult;
pub use decoder::{
    check_dimensions, decode, decode_config, decode_with, Decoded, DecodeOptions,
};
pub use gray::to_gray;
pub use orientation::{fix_orientation, read_orientation, read_orientation_from_bytes, Orientation};
pub use pool::Parallel;
pub use resize::{resize, target_size, ResampleFilter, LANCZOS};
pub use scanner::{ScanRegion, Scanner};
pub use source::{Packed, Paletted, PixelSource, SourceImage, SubsampleRatio, YCbCr};
pub use split::{split, split_horizontal, split_rects, split_vertical, SplitMode};
pub use transform::{
    flip_h, flip_v, rotate, rotate180, rotate270, rotate90, transpose, transverse,
};
pub use watermark::{watermark, watermark_with_rng, Placement, WatermarkOptions};

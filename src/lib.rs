// lib.rs
//
// imgconv: a batch image conversion engine.
//
// Decodes any supported container into a source image, optionally converts
// it to gray, resizes it with a Lanczos filter and composites a watermark,
// then re-encodes it as JPEG, PNG, GIF, TIFF, BMP or PDF. WebP is read but
// never written.

pub mod config;
pub mod engine;
pub mod error;
pub mod ops;

pub use engine::{
    decode, decode_config, decode_with, open, save, write, Decoded, DecodeOptions, Options,
    Orientation, Parallel, PixelBuffer, ResizeOptions, SourceImage, WatermarkOptions,
};
pub use error::{ErrorCategory, ImgconvError, Result};
pub use ops::{Format, FormatOptions, GifOptions, PngCompression, TiffCompression};

/// Input extensions the batch converter picks up when walking a directory.
pub const SUPPORTED_INPUT_EXTENSIONS: &[&str] =
    &["jpg", "jpeg", "png", "gif", "tif", "tiff", "bmp", "webp"];

/// True when `path` has one of [`SUPPORTED_INPUT_EXTENSIONS`] (any case).
pub fn is_supported_input(path: &std::path::Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            SUPPORTED_INPUT_EXTENSIONS
                .iter()
                .any(|s| s.eq_ignore_ascii_case(e))
        })
        .unwrap_or(false)
}

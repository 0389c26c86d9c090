// src/engine/split.rs
//
// Cut an image into n equal strips. Remainder pixels past the last full
// strip are dropped.

use super::buffer::{PixelBuffer, Rect};
use super::common::EngineResult;
use crate::error::ImgconvError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SplitMode {
    /// Side-by-side columns, each `width / n` wide.
    #[default]
    Horizontal,
    /// Stacked rows, each `height / n` tall.
    Vertical,
}

/// Strip rectangles inside `bounds`. Empty when a strip would be zero pixels
/// wide (or tall) or `n` is not positive.
pub fn split_rects(bounds: Rect, n: i64, mode: SplitMode) -> Vec<Rect> {
    if n < 1 {
        return Vec::new();
    }
    let (w, h) = (bounds.width() as i64, bounds.height() as i64);
    let (width, height) = match mode {
        SplitMode::Horizontal => (w / n, h),
        SplitMode::Vertical => (w, h / n),
    };
    if width <= 0 || height <= 0 {
        return Vec::new();
    }
    let (width, height) = (width as i32, height as i32);

    (0..n as i32)
        .map(|i| match mode {
            SplitMode::Horizontal => Rect::new(
                bounds.min_x + width * i,
                bounds.min_y,
                bounds.min_x + width * (i + 1),
                bounds.min_y + height,
            ),
            SplitMode::Vertical => Rect::new(
                bounds.min_x,
                bounds.min_y + height * i,
                bounds.min_x + width,
                bounds.min_y + height * (i + 1),
            ),
        })
        .collect()
}

/// Split `img` into `n` owned strips.
pub fn split(img: &PixelBuffer, n: i64, mode: SplitMode) -> EngineResult<Vec<PixelBuffer>> {
    if n < 1 {
        return Err(ImgconvError::split_failed(
            img.dimensions(),
            n,
            "number of parts must be at least 1",
        ));
    }
    let rects = split_rects(img.bounds(), n, mode);
    if rects.is_empty() {
        return Err(ImgconvError::split_failed(
            img.dimensions(),
            n,
            "invalid dimensions or too many parts",
        ));
    }
    tracing::debug!(parts = n, ?mode, "split image");
    Ok(rects.into_iter().map(|r| img.sub_image(r)).collect())
}

pub fn split_horizontal(img: &PixelBuffer, n: i64) -> EngineResult<Vec<PixelBuffer>> {
    split(img, n, SplitMode::Horizontal)
}

pub fn split_vertical(img: &PixelBuffer, n: i64) -> EngineResult<Vec<PixelBuffer>> {
    split(img, n, SplitMode::Vertical)
}

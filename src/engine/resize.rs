// src/engine/resize.rs
//
// Separable resampling: a horizontal pass over rows, then a vertical pass
// over columns, each driven by a weight table computed once per pass.

use super::buffer::PixelBuffer;
use super::common::clamp;
use super::pool::Parallel;
use super::scanner::ScanRegion;
use super::transform;

/// A resampling kernel with finite support.
#[derive(Clone, Copy, Debug)]
pub struct ResampleFilter {
    pub support: f64,
    pub kernel: fn(f64) -> f64,
}

fn sinc(x: f64) -> f64 {
    if x == 0.0 {
        return 1.0;
    }
    (std::f64::consts::PI * x).sin() / (std::f64::consts::PI * x)
}

fn lanczos3(x: f64) -> f64 {
    let x = x.abs();
    if x < 3.0 {
        sinc(x) * sinc(x / 3.0)
    } else {
        0.0
    }
}

/// Lanczos windowed sinc, radius 3.
pub const LANCZOS: ResampleFilter = ResampleFilter {
    support: 3.0,
    kernel: lanczos3,
};

impl Default for ResampleFilter {
    fn default() -> Self {
        LANCZOS
    }
}

/// One source sample contributing to a destination sample.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IndexWeight {
    pub index: usize,
    pub weight: f64,
}

/// For every destination index, the source samples and normalized weights
/// that produce it.
///
/// The kernel is stretched by `max(src/dst, 1)` so downsampling averages over
/// the whole footprint while upsampling keeps the kernel at its natural
/// width. The same clamped scale sets the search radius and the kernel
/// argument. Destination indices whose weights sum to zero keep their
/// (non-normalized) entries and fall through to a transparent pixel.
pub fn precompute_weights(
    dst_size: usize,
    src_size: usize,
    filter: &ResampleFilter,
) -> Vec<Vec<IndexWeight>> {
    let du = src_size as f64 / dst_size as f64;
    let scale = du.max(1.0);
    let ru = (scale * filter.support).ceil();

    let mut out = Vec::with_capacity(dst_size);
    for v in 0..dst_size {
        let fu = (v as f64 + 0.5) * du - 0.5;

        let begin = ((fu - ru).ceil() as i64).max(0);
        let end = ((fu + ru).floor() as i64).min(src_size as i64 - 1);

        let mut weights = Vec::with_capacity((end - begin + 1).max(0) as usize);
        let mut sum = 0.0;
        for u in begin..=end {
            let w = (filter.kernel)((u as f64 - fu) / scale);
            if w != 0.0 {
                sum += w;
                weights.push(IndexWeight {
                    index: u as usize,
                    weight: w,
                });
            }
        }
        if sum != 0.0 {
            for iw in &mut weights {
                iw.weight /= sum;
            }
        }
        out.push(weights);
    }
    out
}

/// Resize to `width`x`height`.
///
/// A negative target, or both targets zero, yields an empty buffer. When one
/// target is zero it is derived from the other, keeping the aspect ratio
/// (rounded, never below 1). Equal dimensions return an exact copy.
pub fn resize<S: ScanRegion + ?Sized>(
    img: &S,
    width: i32,
    height: i32,
    filter: &ResampleFilter,
    parallel: &Parallel,
) -> PixelBuffer {
    let (src_w, src_h) = img.dimensions();
    let Some((dst_w, dst_h)) = target_size(src_w, src_h, width, height) else {
        return PixelBuffer::default();
    };

    tracing::trace!(src_w, src_h, dst_w, dst_h, "resize");

    match (src_w == dst_w, src_h == dst_h) {
        (true, true) => transform::clone(img, parallel),
        (false, true) => resize_horizontal(img, dst_w, filter, parallel),
        (true, false) => resize_vertical(img, dst_h, filter, parallel),
        (false, false) => {
            let tmp = resize_horizontal(img, dst_w, filter, parallel);
            resize_vertical(&tmp, dst_h, filter, parallel)
        }
    }
}

/// Resolve requested dimensions; None means "empty result".
pub fn target_size(src_w: u32, src_h: u32, width: i32, height: i32) -> Option<(u32, u32)> {
    if width < 0 || height < 0 || (width == 0 && height == 0) {
        return None;
    }
    if src_w == 0 || src_h == 0 {
        return None;
    }
    let derive = |t: i32, num: u32, den: u32| -> u32 {
        let v = t as f64 * num as f64 / den as f64;
        (v + 0.5).floor().max(1.0) as u32
    };
    let w = if width == 0 {
        derive(height, src_w, src_h)
    } else {
        width as u32
    };
    let h = if height == 0 {
        derive(width, src_h, src_w)
    } else {
        height as u32
    };
    Some((w, h))
}

/// Weighted sum of `samples` (canonical RGBA) into one output pixel. Color
/// channels are alpha-weighted; zero total alpha leaves `d` untouched.
#[inline]
fn accumulate(samples: &[u8], weights: &[IndexWeight], d: &mut [u8]) {
    let (mut r, mut g, mut b, mut a) = (0.0, 0.0, 0.0, 0.0);
    for w in weights {
        let s = &samples[w.index * 4..w.index * 4 + 4];
        let aw = s[3] as f64 * w.weight;
        r += s[0] as f64 * aw;
        g += s[1] as f64 * aw;
        b += s[2] as f64 * aw;
        a += aw;
    }
    if a != 0.0 {
        let inv = 1.0 / a;
        d[0] = clamp(r * inv);
        d[1] = clamp(g * inv);
        d[2] = clamp(b * inv);
        d[3] = clamp(a);
    }
}

fn resize_horizontal<S: ScanRegion + ?Sized>(
    img: &S,
    width: u32,
    filter: &ResampleFilter,
    parallel: &Parallel,
) -> PixelBuffer {
    let (src_w, src_h) = img.dimensions();
    let mut dst = PixelBuffer::new(width, src_h);
    let weights = precompute_weights(width as usize, src_w as usize, filter);
    let stride = dst.stride();

    parallel.for_each_row_mut(dst.pix_mut(), stride, src_h as usize, |y, row| {
        let mut line = vec![0u8; src_w as usize * 4];
        img.scan(0, y as u32, src_w, y as u32 + 1, &mut line);
        for (x, ws) in weights.iter().enumerate() {
            accumulate(&line, ws, &mut row[x * 4..x * 4 + 4]);
        }
    });
    dst
}

fn resize_vertical<S: ScanRegion + ?Sized>(
    img: &S,
    height: u32,
    filter: &ResampleFilter,
    parallel: &Parallel,
) -> PixelBuffer {
    let (src_w, src_h) = img.dimensions();
    let weights = precompute_weights(height as usize, src_h as usize, filter);

    let columns = parallel.map(0, src_w as usize, |x| {
        let mut line = vec![0u8; src_h as usize * 4];
        img.scan(x as u32, 0, x as u32 + 1, src_h, &mut line);
        let mut col = vec![0u8; height as usize * 4];
        for (y, ws) in weights.iter().enumerate() {
            accumulate(&line, ws, &mut col[y * 4..y * 4 + 4]);
        }
        col
    });

    let mut dst = PixelBuffer::new(src_w, height);
    let stride = dst.stride();
    parallel.for_each_row_mut(dst.pix_mut(), stride, height as usize, |y, row| {
        for (x, col) in columns.iter().enumerate() {
            row[x * 4..x * 4 + 4].copy_from_slice(&col[y * 4..y * 4 + 4]);
        }
    });
    dst
}

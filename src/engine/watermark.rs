// src/engine/watermark.rs
//
// Watermark compositing: paste a mark over a base image through a uniform
// opacity mask, either centered with a fixed offset or at a random position
// and tilt inside the central band of the base.

use super::buffer::{PixelBuffer, Rect};
use super::pool::Parallel;
use super::resize::{resize, LANCZOS};
use super::scanner::ScanRegion;
use super::transform;
use rand::Rng;

/// Where the mark goes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Placement {
    /// Centered on the base, then shifted by `(x, y)`.
    Fixed { x: i32, y: i32 },
    /// Shrunk to at most a third of the base, tilted by about ±30° and placed
    /// inside the band between 1/6 and 5/6 of each base dimension.
    Random,
}

impl Default for Placement {
    fn default() -> Self {
        Placement::Fixed { x: 0, y: 0 }
    }
}

#[derive(Clone, Debug)]
pub struct WatermarkOptions {
    pub mark: PixelBuffer,
    pub opacity: u8,
    pub placement: Placement,
}

impl WatermarkOptions {
    pub fn new(mark: PixelBuffer, opacity: u8) -> Self {
        Self {
            mark,
            opacity,
            placement: Placement::default(),
        }
    }

    pub fn with_random(mut self, random: bool) -> Self {
        self.placement = if random {
            Placement::Random
        } else {
            Placement::Fixed { x: 0, y: 0 }
        };
        self
    }

    pub fn with_offset(mut self, x: i32, y: i32) -> Self {
        self.placement = Placement::Fixed { x, y };
        self
    }
}

/// Composite the mark onto a copy of `base`, drawing randomness (if any)
/// from the thread-local generator.
pub fn watermark<S: ScanRegion + ?Sized>(
    base: &S,
    opts: &WatermarkOptions,
    parallel: &Parallel,
) -> PixelBuffer {
    watermark_with_rng(base, opts, &mut rand::thread_rng(), parallel)
}

/// As [`watermark`], with an explicit random source.
pub fn watermark_with_rng<S, R>(
    base: &S,
    opts: &WatermarkOptions,
    rng: &mut R,
    parallel: &Parallel,
) -> PixelBuffer
where
    S: ScanRegion + ?Sized,
    R: Rng,
{
    let mut out = transform::clone(base, parallel);
    if opts.mark.is_empty() || opts.opacity == 0 {
        return out;
    }
    let (bw, bh) = (out.width() as i32, out.height() as i32);

    let (mark, offset) = match opts.placement {
        Placement::Fixed { x, y } => {
            let (mw, mh) = (opts.mark.width() as i32, opts.mark.height() as i32);
            (None, (bw / 2 - mw / 2 + x, bh / 2 - mh / 2 + y))
        }
        Placement::Random => {
            let (mw, mh) = (opts.mark.width() as i32, opts.mark.height() as i32);
            let shrunk = if mw >= bw / 3 || mh >= bh / 3 {
                if calc_resize_xy((bw, bh), (mw, mh)) {
                    resize(&opts.mark, bw / 3, 0, &LANCZOS, parallel)
                } else {
                    resize(&opts.mark, 0, bh / 3, &LANCZOS, parallel)
                }
            } else {
                opts.mark.clone()
            };
            let angle = rand_range(rng, -30, 30) as f64 + rng.gen::<f64>();
            let tilted = transform::rotate(&shrunk, angle, [0, 0, 0, 0], parallel);

            let (tw, th) = (tilted.width() as i32, tilted.height() as i32);
            let x = band_offset(rng, bw / 6, bw * 5 / 6 - tw);
            let y = band_offset(rng, bh / 6, bh * 5 / 6 - th);
            tracing::debug!(angle, x, y, mark_w = tw, mark_h = th, "random watermark placement");
            (Some(tilted), (x, y))
        }
    };

    let mark = mark.as_ref().unwrap_or(&opts.mark);
    draw_over(&mut out, mark, offset, opts.opacity, parallel);
    out
}

/// True when shrinking the mark to a third of the base width keeps its
/// height under the base height; otherwise shrink to a third of the height.
pub fn calc_resize_xy(base: (i32, i32), mark: (i32, i32)) -> bool {
    if mark.0 == 0 {
        return false;
    }
    base.0 * mark.1 / mark.0 < base.1
}

/// Uniform integer in the inclusive range between `a` and `b`, in either
/// order.
pub fn rand_range<R: Rng>(rng: &mut R, a: i32, b: i32) -> i32 {
    let (lo, hi) = if b < a { (b, a) } else { (a, b) };
    rng.gen_range(lo..=hi)
}

/// Random offset in `[min, max]`; a band too narrow for the mark pins it to
/// `min`.
fn band_offset<R: Rng>(rng: &mut R, min: i32, max: i32) -> i32 {
    if max < min {
        min
    } else {
        rng.gen_range(min..=max)
    }
}

/// Source-over composite of `src` placed at `offset` onto `dst`, through a
/// uniform mask of `opacity`. Blending runs at 16 bits on premultiplied
/// values; the result is stored non-premultiplied.
pub fn draw_over(
    dst: &mut PixelBuffer,
    src: &PixelBuffer,
    offset: (i32, i32),
    opacity: u8,
    parallel: &Parallel,
) {
    let target = src.bounds().translate(offset.0, offset.1).intersect(&dst.bounds());
    if target.is_empty() || opacity == 0 {
        return;
    }
    let Rect {
        min_x,
        min_y,
        max_x,
        max_y,
    } = target;

    const M: u32 = 0xffff;
    let ma = opacity as u32 * 0x101;

    let stride = dst.stride();
    let rows = dst.height() as usize;
    parallel.for_each_row_mut(dst.pix_mut(), stride, rows, |y, row| {
        let y = y as i32;
        if y < min_y || y >= max_y {
            return;
        }
        let sy = (y - offset.1) as u32;
        for x in min_x..max_x {
            let s = premultiplied16(src.pixel((x - offset.0) as u32, sy));
            let d = &mut row[x as usize * 4..x as usize * 4 + 4];
            let dp = premultiplied16([d[0], d[1], d[2], d[3]]);

            let a = M - s[3] * ma / M;
            let blended = [
                (dp[0] * a + s[0] * ma) / M,
                (dp[1] * a + s[1] * ma) / M,
                (dp[2] * a + s[2] * ma) / M,
                (dp[3] * a + s[3] * ma) / M,
            ];
            d.copy_from_slice(&unpremultiplied8(blended));
        }
    });
}

#[inline]
fn premultiplied16(c: [u8; 4]) -> [u32; 4] {
    let a = c[3] as u32 * 0x101;
    [
        c[0] as u32 * 0x101 * a / 0xffff,
        c[1] as u32 * 0x101 * a / 0xffff,
        c[2] as u32 * 0x101 * a / 0xffff,
        a,
    ]
}

#[inline]
fn unpremultiplied8(c: [u32; 4]) -> [u8; 4] {
    let a = c[3];
    match a {
        0xffff => [(c[0] >> 8) as u8, (c[1] >> 8) as u8, (c[2] >> 8) as u8, 0xff],
        0 => [0, 0, 0, 0],
        _ => [
            ((c[0] * 0xffff / a) >> 8) as u8,
            ((c[1] * 0xffff / a) >> 8) as u8,
            ((c[2] * 0xffff / a) >> 8) as u8,
            (a >> 8) as u8,
        ],
    }
}

// src/engine/transform.rs
//
// Geometric transforms. Quarter turns, flips and transposes are pure index
// relabeling built from scans of one source row or column per output row;
// arbitrary angles go through bilinear interpolation.
//
// All rotations are counter-clockwise.

use super::buffer::PixelBuffer;
use super::common::{clamp, reverse};
use super::pool::Parallel;
use super::scanner::{ScanRegion, Scanner};
use super::source::SourceImage;

/// Which source strip feeds an output row.
#[derive(Clone, Copy)]
enum Strip {
    Row(u32),
    Column(u32),
}

/// Build a `dst_w`x`dst_h` buffer where output row `y` is the source strip
/// `strip(y)`, optionally reversed.
fn relabel<S, F>(img: &S, dst_w: u32, dst_h: u32, parallel: &Parallel, strip: F) -> PixelBuffer
where
    S: ScanRegion + ?Sized,
    F: Fn(u32) -> (Strip, bool) + Sync,
{
    let (src_w, src_h) = img.dimensions();
    let mut dst = PixelBuffer::new(dst_w, dst_h);
    let stride = dst.stride();
    let row_size = dst_w as usize * 4;
    parallel.for_each_row_mut(dst.pix_mut(), stride, dst_h as usize, |y, row| {
        let row = &mut row[..row_size];
        let (s, rev) = strip(y as u32);
        match s {
            Strip::Row(sy) => img.scan(0, sy, src_w, sy + 1, row),
            Strip::Column(sx) => img.scan(sx, 0, sx + 1, src_h, row),
        }
        if rev {
            reverse(row);
        }
    });
    dst
}

/// Canonical copy of any scannable image.
pub fn clone<S: ScanRegion + ?Sized>(img: &S, parallel: &Parallel) -> PixelBuffer {
    let (w, h) = img.dimensions();
    relabel(img, w, h, parallel, |y| (Strip::Row(y), false))
}

pub fn clone_image(img: &SourceImage, parallel: &Parallel) -> PixelBuffer {
    clone(&Scanner::new(img), parallel)
}

/// Mirror left to right.
pub fn flip_h<S: ScanRegion + ?Sized>(img: &S, parallel: &Parallel) -> PixelBuffer {
    let (w, h) = img.dimensions();
    relabel(img, w, h, parallel, |y| (Strip::Row(y), true))
}

/// Mirror top to bottom.
pub fn flip_v<S: ScanRegion + ?Sized>(img: &S, parallel: &Parallel) -> PixelBuffer {
    let (w, h) = img.dimensions();
    relabel(img, w, h, parallel, move |y| (Strip::Row(h - 1 - y), false))
}

/// Flip across the main diagonal.
pub fn transpose<S: ScanRegion + ?Sized>(img: &S, parallel: &Parallel) -> PixelBuffer {
    let (w, h) = img.dimensions();
    relabel(img, h, w, parallel, |y| (Strip::Column(y), false))
}

/// Flip across the anti-diagonal.
pub fn transverse<S: ScanRegion + ?Sized>(img: &S, parallel: &Parallel) -> PixelBuffer {
    let (w, h) = img.dimensions();
    relabel(img, h, w, parallel, move |y| (Strip::Column(w - 1 - y), true))
}

pub fn rotate90<S: ScanRegion + ?Sized>(img: &S, parallel: &Parallel) -> PixelBuffer {
    let (w, h) = img.dimensions();
    relabel(img, h, w, parallel, move |y| (Strip::Column(w - 1 - y), false))
}

pub fn rotate180<S: ScanRegion + ?Sized>(img: &S, parallel: &Parallel) -> PixelBuffer {
    let (w, h) = img.dimensions();
    relabel(img, w, h, parallel, move |y| (Strip::Row(h - 1 - y), true))
}

pub fn rotate270<S: ScanRegion + ?Sized>(img: &S, parallel: &Parallel) -> PixelBuffer {
    let (w, h) = img.dimensions();
    relabel(img, h, w, parallel, |y| (Strip::Column(y), true))
}

#[inline]
fn rotate_point(x: f64, y: f64, sin: f64, cos: f64) -> (f64, f64) {
    (x * cos - y * sin, x * sin + y * cos)
}

/// Size of the canvas that holds a `w`x`h` image rotated by `angle` degrees.
pub fn rotated_size(w: u32, h: u32, angle: f64) -> (u32, u32) {
    if w == 0 || h == 0 {
        return (0, 0);
    }
    let (sin, cos) = (std::f64::consts::PI * angle / 180.0).sin_cos();
    let (x1, y1) = rotate_point((w - 1) as f64, 0.0, sin, cos);
    let (x2, y2) = rotate_point((w - 1) as f64, (h - 1) as f64, sin, cos);
    let (x3, y3) = rotate_point(0.0, (h - 1) as f64, sin, cos);

    let min_x = x1.min(x2).min(x3).min(0.0);
    let max_x = x1.max(x2).max(x3).max(0.0);
    let min_y = y1.min(y2).min(y3).min(0.0);
    let max_y = y1.max(y2).max(y3).max(0.0);

    let mut new_w = max_x - min_x + 1.0;
    if new_w - new_w.floor() > 0.1 {
        new_w += 1.0;
    }
    let mut new_h = max_y - min_y + 1.0;
    if new_h - new_h.floor() > 0.1 {
        new_h += 1.0;
    }
    (new_w as u32, new_h as u32)
}

/// Rotate by `angle` degrees counter-clockwise, growing the canvas to fit.
/// Uncovered area is filled with `background` (non-premultiplied RGBA).
///
/// Angles that normalize to a multiple of 90 take the exact quarter-turn
/// path.
pub fn rotate<S: ScanRegion + ?Sized>(
    img: &S,
    angle: f64,
    background: [u8; 4],
    parallel: &Parallel,
) -> PixelBuffer {
    let angle = angle - (angle / 360.0).floor() * 360.0;
    if angle == 0.0 {
        return clone(img, parallel);
    } else if angle == 90.0 {
        return rotate90(img, parallel);
    } else if angle == 180.0 {
        return rotate180(img, parallel);
    } else if angle == 270.0 {
        return rotate270(img, parallel);
    }

    let src = clone(img, parallel);
    let (src_w, src_h) = src.dimensions();
    let (dst_w, dst_h) = rotated_size(src_w, src_h, angle);
    let mut dst = PixelBuffer::new(dst_w, dst_h);
    if dst_w == 0 || dst_h == 0 {
        return dst;
    }

    let src_x_off = src_w as f64 / 2.0 - 0.5;
    let src_y_off = src_h as f64 / 2.0 - 0.5;
    let dst_x_off = dst_w as f64 / 2.0 - 0.5;
    let dst_y_off = dst_h as f64 / 2.0 - 0.5;
    let (sin, cos) = (std::f64::consts::PI * angle / 180.0).sin_cos();

    let stride = dst.stride();
    parallel.for_each_row_mut(dst.pix_mut(), stride, dst_h as usize, |y, row| {
        for x in 0..dst_w as usize {
            let (xf, yf) = rotate_point(x as f64 - dst_x_off, y as f64 - dst_y_off, sin, cos);
            interpolate_point(
                &mut row[x * 4..x * 4 + 4],
                &src,
                xf + src_x_off,
                yf + src_y_off,
                background,
            );
        }
    });
    dst
}

/// Bilinear sample of `src` at `(xf, yf)`. Neighbors outside the image
/// contribute `bg` with their share of the weight.
fn interpolate_point(d: &mut [u8], src: &PixelBuffer, xf: f64, yf: f64, bg: [u8; 4]) {
    let x0 = xf.floor() as i64;
    let y0 = yf.floor() as i64;
    let (w, h) = (src.width() as i64, src.height() as i64);

    if !(-1..w).contains(&x0) || !(-1..h).contains(&y0) {
        d.copy_from_slice(&bg);
        return;
    }

    let xq = xf - x0 as f64;
    let yq = yf - y0 as f64;
    let points = [(x0, y0), (x0 + 1, y0), (x0, y0 + 1), (x0 + 1, y0 + 1)];
    let weights = [
        (1.0 - xq) * (1.0 - yq),
        xq * (1.0 - yq),
        (1.0 - xq) * yq,
        xq * yq,
    ];

    let (mut r, mut g, mut b, mut a) = (0.0, 0.0, 0.0, 0.0);
    for ((px, py), weight) in points.into_iter().zip(weights) {
        let s = if (0..w).contains(&px) && (0..h).contains(&py) {
            src.pixel(px as u32, py as u32)
        } else {
            bg
        };
        let wa = s[3] as f64 * weight;
        r += s[0] as f64 * wa;
        g += s[1] as f64 * wa;
        b += s[2] as f64 * wa;
        a += wa;
    }
    if a != 0.0 {
        let inv = 1.0 / a;
        d[0] = clamp(r * inv);
        d[1] = clamp(g * inv);
        d[2] = clamp(b * inv);
        d[3] = clamp(a);
    }
}

// src/engine/gray.rs
//
// Grayscale conversion. Luma is computed from 16-bit premultiplied channels,
// so translucent pixels darken toward black and alpha is dropped.

use super::pool::Parallel;
use super::scanner::ScanRegion;
use super::source::{Packed, SourceImage};

#[inline]
fn luma(px: &[u8]) -> u8 {
    let a = px[3] as u32 * 0x101;
    let r = px[0] as u32 * 0x101 * a / 0xffff;
    let g = px[1] as u32 * 0x101 * a / 0xffff;
    let b = px[2] as u32 * 0x101 * a / 0xffff;
    ((19595 * r + 38470 * g + 7471 * b + (1 << 15)) >> 24) as u8
}

/// 8-bit grayscale copy of `img`.
pub fn to_gray<S: ScanRegion + ?Sized>(img: &S, parallel: &Parallel) -> SourceImage {
    let (w, h) = img.dimensions();
    let mut pix = vec![0u8; w as usize * h as usize];
    parallel.for_each_row_mut(&mut pix, w as usize, h as usize, |y, row| {
        let mut line = vec![0u8; w as usize * 4];
        img.scan(0, y as u32, w, y as u32 + 1, &mut line);
        for (dst, px) in row.iter_mut().zip(line.chunks_exact(4)) {
            *dst = luma(px);
        }
    });
    SourceImage::Gray(Packed {
        width: w,
        height: h,
        stride: w as usize,
        pix,
    })
}

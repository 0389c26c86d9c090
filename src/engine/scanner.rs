// src/engine/scanner.rs
//
// Scanner: reads rectangular regions of any SourceImage as canonical
// 8-bit non-premultiplied RGBA. The variant is resolved once per scan call;
// the per-pixel loops below are monomorphic.

use super::buffer::PixelBuffer;
use super::source::{Packed, PixelSource, SourceImage, SubsampleRatio, YCbCr};

/// Anything that can produce canonical RGBA for a region of itself.
pub trait ScanRegion: Sync {
    fn dimensions(&self) -> (u32, u32);

    /// Write `(x2-x1)*(y2-y1)*4` bytes of canonical RGBA for the region
    /// `[x1, x2) x [y1, y2)` into the front of `dst`, row-major, no padding.
    ///
    /// The region must lie inside the image; this is not checked.
    fn scan(&self, x1: u32, y1: u32, x2: u32, y2: u32, dst: &mut [u8]);
}

enum Layout<'a> {
    Nrgba(&'a PixelBuffer),
    Rgba(&'a Packed<u8>),
    Nrgba64(&'a Packed<u16>),
    Rgba64(&'a Packed<u16>),
    Gray(&'a Packed<u8>),
    Gray16(&'a Packed<u16>),
    Paletted {
        indices: &'a Packed<u8>,
        palette: Vec<[u8; 4]>,
    },
    YCbCr(&'a YCbCr),
    Generic(&'a dyn PixelSource),
}

/// Borrowing scanner over a SourceImage.
pub struct Scanner<'a> {
    width: u32,
    height: u32,
    layout: Layout<'a>,
}

impl<'a> Scanner<'a> {
    pub fn new(img: &'a SourceImage) -> Self {
        let (width, height) = img.dimensions();
        let layout = match img {
            SourceImage::Nrgba(b) => Layout::Nrgba(b),
            SourceImage::Rgba(p) => Layout::Rgba(p),
            SourceImage::Nrgba64(p) => Layout::Nrgba64(p),
            SourceImage::Rgba64(p) => Layout::Rgba64(p),
            SourceImage::Gray(p) => Layout::Gray(p),
            SourceImage::Gray16(p) => Layout::Gray16(p),
            SourceImage::Paletted(p) => Layout::Paletted {
                indices: &p.indices,
                palette: p.palette.iter().map(|&c| unpremultiply_color(c)).collect(),
            },
            SourceImage::YCbCr(y) => Layout::YCbCr(y),
            SourceImage::Generic(g) => Layout::Generic(g.as_ref()),
        };
        Self {
            width,
            height,
            layout,
        }
    }
}

impl ScanRegion for Scanner<'_> {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn scan(&self, x1: u32, y1: u32, x2: u32, y2: u32, dst: &mut [u8]) {
        let (x1, y1, x2, y2) = (x1 as usize, y1 as usize, x2 as usize, y2 as usize);
        match &self.layout {
            Layout::Nrgba(b) => b.scan(x1 as u32, y1 as u32, x2 as u32, y2 as u32, dst),
            Layout::Rgba(p) => scan_rgba(p, x1, y1, x2, y2, dst),
            Layout::Nrgba64(p) => scan_nrgba64(p, x1, y1, x2, y2, dst),
            Layout::Rgba64(p) => scan_rgba64(p, x1, y1, x2, y2, dst),
            Layout::Gray(p) => scan_gray(p, x1, y1, x2, y2, dst),
            Layout::Gray16(p) => scan_gray16(p, x1, y1, x2, y2, dst),
            Layout::Paletted { indices, palette } => {
                scan_paletted(indices, palette, x1, y1, x2, y2, dst)
            }
            Layout::YCbCr(img) => scan_ycbcr(img, x1, y1, x2, y2, dst),
            Layout::Generic(src) => scan_generic(*src, x1, y1, x2, y2, dst),
        }
    }
}

impl ScanRegion for PixelBuffer {
    fn dimensions(&self) -> (u32, u32) {
        PixelBuffer::dimensions(self)
    }

    fn scan(&self, x1: u32, y1: u32, x2: u32, y2: u32, dst: &mut [u8]) {
        let size = (x2 - x1) as usize * 4;
        let pix = self.as_raw();
        let mut j = 0;
        for y in y1..y2 {
            let i = y as usize * self.stride() + x1 as usize * 4;
            dst[j..j + size].copy_from_slice(&pix[i..i + size]);
            j += size;
        }
    }
}

/// Premultiplied 8-bit palette entry to non-premultiplied, via the 16-bit
/// path so results match a 16-bit source with the same value.
fn unpremultiply_color(c: [u8; 4]) -> [u8; 4] {
    let a = c[3] as u32 * 0x101;
    match a {
        0 => [0, 0, 0, 0],
        0xffff => [c[0], c[1], c[2], 0xff],
        _ => {
            let un = |v: u8| ((v as u32 * 0x101 * 0xffff / a) >> 8) as u8;
            [un(c[0]), un(c[1]), un(c[2]), c[3]]
        }
    }
}

fn scan_rgba(p: &Packed<u8>, x1: usize, y1: usize, x2: usize, y2: usize, dst: &mut [u8]) {
    let mut j = 0;
    for y in y1..y2 {
        let i = y * p.stride + x1 * 4;
        for s in p.pix[i..i + (x2 - x1) * 4].chunks_exact(4) {
            let d = &mut dst[j..j + 4];
            match s[3] {
                0 => d.fill(0),
                0xff => d.copy_from_slice(s),
                a => {
                    let a16 = a as u16;
                    d[0] = (s[0] as u16 * 0xff / a16) as u8;
                    d[1] = (s[1] as u16 * 0xff / a16) as u8;
                    d[2] = (s[2] as u16 * 0xff / a16) as u8;
                    d[3] = a;
                }
            }
            j += 4;
        }
    }
}

fn scan_nrgba64(p: &Packed<u16>, x1: usize, y1: usize, x2: usize, y2: usize, dst: &mut [u8]) {
    let mut j = 0;
    for y in y1..y2 {
        let i = y * p.stride + x1 * 4;
        for &v in &p.pix[i..i + (x2 - x1) * 4] {
            dst[j] = (v >> 8) as u8;
            j += 1;
        }
    }
}

fn scan_rgba64(p: &Packed<u16>, x1: usize, y1: usize, x2: usize, y2: usize, dst: &mut [u8]) {
    let mut j = 0;
    for y in y1..y2 {
        let i = y * p.stride + x1 * 4;
        for s in p.pix[i..i + (x2 - x1) * 4].chunks_exact(4) {
            let d = &mut dst[j..j + 4];
            // Branch on the high byte of alpha, as an 8-bit reader would.
            match s[3] >> 8 {
                0 => d.fill(0),
                0xff => {
                    d[0] = (s[0] >> 8) as u8;
                    d[1] = (s[1] >> 8) as u8;
                    d[2] = (s[2] >> 8) as u8;
                    d[3] = 0xff;
                }
                ah => {
                    let a = s[3] as u32;
                    d[0] = ((s[0] as u32 * 0xffff / a) >> 8) as u8;
                    d[1] = ((s[1] as u32 * 0xffff / a) >> 8) as u8;
                    d[2] = ((s[2] as u32 * 0xffff / a) >> 8) as u8;
                    d[3] = ah as u8;
                }
            }
            j += 4;
        }
    }
}

fn scan_gray(p: &Packed<u8>, x1: usize, y1: usize, x2: usize, y2: usize, dst: &mut [u8]) {
    let mut j = 0;
    for y in y1..y2 {
        let i = y * p.stride + x1;
        for &c in &p.pix[i..i + (x2 - x1)] {
            dst[j..j + 4].copy_from_slice(&[c, c, c, 0xff]);
            j += 4;
        }
    }
}

fn scan_gray16(p: &Packed<u16>, x1: usize, y1: usize, x2: usize, y2: usize, dst: &mut [u8]) {
    let mut j = 0;
    for y in y1..y2 {
        let i = y * p.stride + x1;
        for &v in &p.pix[i..i + (x2 - x1)] {
            let c = (v >> 8) as u8;
            dst[j..j + 4].copy_from_slice(&[c, c, c, 0xff]);
            j += 4;
        }
    }
}

fn scan_paletted(
    p: &Packed<u8>,
    palette: &[[u8; 4]],
    x1: usize,
    y1: usize,
    x2: usize,
    y2: usize,
    dst: &mut [u8],
) {
    let mut j = 0;
    for y in y1..y2 {
        let i = y * p.stride + x1;
        for &idx in &p.pix[i..i + (x2 - x1)] {
            dst[j..j + 4].copy_from_slice(&palette[idx as usize]);
            j += 4;
        }
    }
}

/// Fixed-point YCbCr to RGB, 16.16, saturating through the sign bit.
#[inline]
fn ycbcr_to_rgb(yy: u8, cb: u8, cr: u8) -> [u8; 3] {
    let yy1 = yy as i32 * 0x10101;
    let cb1 = cb as i32 - 128;
    let cr1 = cr as i32 - 128;

    let sat = |v: i32| -> u8 {
        if (v as u32) & 0xff00_0000 == 0 {
            (v >> 16) as u8
        } else {
            !(v >> 31) as u8
        }
    };

    let r = yy1 + 91881 * cr1;
    let g = yy1 - 22554 * cb1 - 46802 * cr1;
    let b = yy1 + 116130 * cb1;
    [sat(r), sat(g), sat(b)]
}

fn scan_ycbcr(img: &YCbCr, x1: usize, y1: usize, x2: usize, y2: usize, dst: &mut [u8]) {
    let mut j = 0;
    for y in y1..y2 {
        let mut iy = y * img.y_stride + x1;
        let c_base = match img.ratio {
            SubsampleRatio::Ratio444 | SubsampleRatio::Ratio422 => y * img.c_stride,
            SubsampleRatio::Ratio420 | SubsampleRatio::Ratio440 => (y / 2) * img.c_stride,
        };
        for x in x1..x2 {
            let ic = match img.ratio {
                SubsampleRatio::Ratio444 | SubsampleRatio::Ratio440 => c_base + x,
                SubsampleRatio::Ratio422 | SubsampleRatio::Ratio420 => c_base + x / 2,
            };
            let [r, g, b] = ycbcr_to_rgb(img.y[iy], img.cb[ic], img.cr[ic]);
            dst[j..j + 4].copy_from_slice(&[r, g, b, 0xff]);
            iy += 1;
            j += 4;
        }
    }
}

fn scan_generic(
    src: &dyn PixelSource,
    x1: usize,
    y1: usize,
    x2: usize,
    y2: usize,
    dst: &mut [u8],
) {
    let mut j = 0;
    for y in y1..y2 {
        for x in x1..x2 {
            let [r, g, b, a] = src.rgba64(x as u32, y as u32);
            let d = &mut dst[j..j + 4];
            match a {
                0xffff => {
                    d[0] = (r >> 8) as u8;
                    d[1] = (g >> 8) as u8;
                    d[2] = (b >> 8) as u8;
                    d[3] = 0xff;
                }
                0 => d.fill(0),
                _ => {
                    d[0] = (((r * 0xffff) / a) >> 8) as u8;
                    d[1] = (((g * 0xffff) / a) >> 8) as u8;
                    d[2] = (((b * 0xffff) / a) >> 8) as u8;
                    d[3] = (a >> 8) as u8;
                }
            }
            j += 4;
        }
    }
}

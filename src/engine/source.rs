// src/engine/source.rs
//
// Source images: every pixel layout a decoder can hand us. The scanner turns
// any of these into canonical RGBA rows; nothing downstream looks inside.

use super::buffer::PixelBuffer;
use super::pool::Parallel;
use super::transform;
use image::{DynamicImage, GenericImageView};

/// Row-major samples with `channels` values per pixel and `stride` values
/// between row starts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packed<T> {
    pub width: u32,
    pub height: u32,
    pub stride: usize,
    pub pix: Vec<T>,
}

impl<T> Packed<T> {
    /// Tightly packed samples. None if `pix` is too short.
    pub fn new(width: u32, height: u32, channels: usize, pix: Vec<T>) -> Option<Self> {
        Self::with_stride(width, height, channels, width as usize * channels, pix)
    }

    pub fn with_stride(
        width: u32,
        height: u32,
        channels: usize,
        stride: usize,
        pix: Vec<T>,
    ) -> Option<Self> {
        let row = width as usize * channels;
        if stride < row {
            return None;
        }
        let needed = if height == 0 {
            0
        } else {
            stride * (height as usize - 1) + row
        };
        (pix.len() >= needed).then_some(Self {
            width,
            height,
            stride,
            pix,
        })
    }
}

/// 8-bit indices into a color table. Table entries are premultiplied RGBA.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Paletted {
    pub indices: Packed<u8>,
    pub palette: Vec<[u8; 4]>,
}

impl Paletted {
    /// None if any index points past the end of the palette.
    pub fn new(indices: Packed<u8>, palette: Vec<[u8; 4]>) -> Option<Self> {
        let w = indices.width as usize;
        let in_range = (0..indices.height as usize).all(|y| {
            let i = y * indices.stride;
            indices.pix[i..i + w]
                .iter()
                .all(|&idx| (idx as usize) < palette.len())
        });
        in_range.then_some(Self { indices, palette })
    }
}

/// Chroma subsampling layout of a YCbCr image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubsampleRatio {
    Ratio444,
    Ratio422,
    Ratio420,
    Ratio440,
}

impl SubsampleRatio {
    /// Chroma plane size for a luma plane of `w`x`h`.
    pub fn chroma_size(self, w: u32, h: u32) -> (u32, u32) {
        match self {
            SubsampleRatio::Ratio444 => (w, h),
            SubsampleRatio::Ratio422 => (w.div_ceil(2), h),
            SubsampleRatio::Ratio420 => (w.div_ceil(2), h.div_ceil(2)),
            SubsampleRatio::Ratio440 => (w, h.div_ceil(2)),
        }
    }
}

/// Luma plane at full resolution plus two (possibly subsampled) chroma planes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct YCbCr {
    pub width: u32,
    pub height: u32,
    pub y: Vec<u8>,
    pub cb: Vec<u8>,
    pub cr: Vec<u8>,
    pub y_stride: usize,
    pub c_stride: usize,
    pub ratio: SubsampleRatio,
}

impl YCbCr {
    /// Tightly packed planes; None if a plane is too short for the ratio.
    pub fn new(
        width: u32,
        height: u32,
        ratio: SubsampleRatio,
        y: Vec<u8>,
        cb: Vec<u8>,
        cr: Vec<u8>,
    ) -> Option<Self> {
        let (cw, ch) = ratio.chroma_size(width, height);
        let luma = width as usize * height as usize;
        let chroma = cw as usize * ch as usize;
        if y.len() < luma || cb.len() < chroma || cr.len() < chroma {
            return None;
        }
        Some(Self {
            width,
            height,
            y,
            cb,
            cr,
            y_stride: width as usize,
            c_stride: cw as usize,
            ratio,
        })
    }
}

/// Fallback for layouts the engine has no dedicated path for: one pixel at a
/// time, as premultiplied 16-bit RGBA (`[r, g, b, a]`, each in 0..=0xffff).
pub trait PixelSource: Send + Sync {
    fn dimensions(&self) -> (u32, u32);
    fn rgba64(&self, x: u32, y: u32) -> [u32; 4];
}

impl PixelSource for DynamicImage {
    fn dimensions(&self) -> (u32, u32) {
        GenericImageView::dimensions(self)
    }

    fn rgba64(&self, x: u32, y: u32) -> [u32; 4] {
        let [r, g, b, a] = match self {
            DynamicImage::ImageRgb16(img) => {
                let p = img.get_pixel(x, y).0;
                [p[0] as u32, p[1] as u32, p[2] as u32, 0xffff]
            }
            DynamicImage::ImageRgba16(img) => {
                let p = img.get_pixel(x, y).0;
                [p[0] as u32, p[1] as u32, p[2] as u32, p[3] as u32]
            }
            DynamicImage::ImageLuma16(img) => {
                let l = img.get_pixel(x, y).0[0] as u32;
                [l, l, l, 0xffff]
            }
            DynamicImage::ImageLumaA16(img) => {
                let p = img.get_pixel(x, y).0;
                [p[0] as u32, p[0] as u32, p[0] as u32, p[1] as u32]
            }
            other => {
                let p = other.get_pixel(x, y).0;
                [
                    p[0] as u32 * 0x101,
                    p[1] as u32 * 0x101,
                    p[2] as u32 * 0x101,
                    p[3] as u32 * 0x101,
                ]
            }
        };
        [r * a / 0xffff, g * a / 0xffff, b * a / 0xffff, a]
    }
}

/// A decoded image in whatever layout the decoder produced.
pub enum SourceImage {
    /// 8-bit non-premultiplied RGBA (the canonical layout).
    Nrgba(PixelBuffer),
    /// 8-bit premultiplied RGBA. No decoder produces this; it is for callers
    /// holding premultiplied pixels.
    Rgba(Packed<u8>),
    /// 16-bit non-premultiplied RGBA.
    Nrgba64(Packed<u16>),
    /// 16-bit premultiplied RGBA, for callers like `Rgba`.
    Rgba64(Packed<u16>),
    Gray(Packed<u8>),
    Gray16(Packed<u16>),
    Paletted(Paletted),
    YCbCr(YCbCr),
    Generic(Box<dyn PixelSource>),
}

impl std::fmt::Debug for SourceImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (w, h) = self.dimensions();
        write!(f, "SourceImage::{}({w}x{h})", self.layout_name())
    }
}

impl SourceImage {
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            SourceImage::Nrgba(b) => b.dimensions(),
            SourceImage::Rgba(p) | SourceImage::Gray(p) => (p.width, p.height),
            SourceImage::Nrgba64(p) | SourceImage::Rgba64(p) | SourceImage::Gray16(p) => {
                (p.width, p.height)
            }
            SourceImage::Paletted(p) => (p.indices.width, p.indices.height),
            SourceImage::YCbCr(img) => (img.width, img.height),
            SourceImage::Generic(src) => src.dimensions(),
        }
    }

    pub fn width(&self) -> u32 {
        self.dimensions().0
    }

    pub fn height(&self) -> u32 {
        self.dimensions().1
    }

    pub fn layout_name(&self) -> &'static str {
        match self {
            SourceImage::Nrgba(_) => "Nrgba",
            SourceImage::Rgba(_) => "Rgba",
            SourceImage::Nrgba64(_) => "Nrgba64",
            SourceImage::Rgba64(_) => "Rgba64",
            SourceImage::Gray(_) => "Gray",
            SourceImage::Gray16(_) => "Gray16",
            SourceImage::Paletted(_) => "Paletted",
            SourceImage::YCbCr(_) => "YCbCr",
            SourceImage::Generic(_) => "Generic",
        }
    }

    /// Canonical copy of the whole image.
    pub fn to_pixel_buffer(&self, parallel: &Parallel) -> PixelBuffer {
        transform::clone_image(self, parallel)
    }

    /// Canonical form, reusing the allocation when already canonical.
    pub fn into_pixel_buffer(self, parallel: &Parallel) -> PixelBuffer {
        match self {
            SourceImage::Nrgba(buf) => buf,
            other => transform::clone_image(&other, parallel),
        }
    }
}

impl From<PixelBuffer> for SourceImage {
    fn from(buf: PixelBuffer) -> Self {
        SourceImage::Nrgba(buf)
    }
}

impl From<DynamicImage> for SourceImage {
    fn from(img: DynamicImage) -> Self {
        match img {
            DynamicImage::ImageRgba8(buf) => SourceImage::Nrgba(PixelBuffer::from(buf)),
            DynamicImage::ImageRgb8(buf) => {
                let (w, h) = buf.dimensions();
                let mut pix = Vec::with_capacity(w as usize * h as usize * 4);
                for px in buf.as_raw().chunks_exact(3) {
                    pix.extend_from_slice(&[px[0], px[1], px[2], 0xff]);
                }
                match PixelBuffer::from_raw(w, h, pix) {
                    Some(b) => SourceImage::Nrgba(b),
                    None => SourceImage::Generic(Box::new(DynamicImage::ImageRgb8(buf))),
                }
            }
            DynamicImage::ImageLuma8(buf) => {
                let (w, h) = buf.dimensions();
                SourceImage::Gray(Packed {
                    width: w,
                    height: h,
                    stride: w as usize,
                    pix: buf.into_raw(),
                })
            }
            DynamicImage::ImageLuma16(buf) => {
                let (w, h) = buf.dimensions();
                SourceImage::Gray16(Packed {
                    width: w,
                    height: h,
                    stride: w as usize,
                    pix: buf.into_raw(),
                })
            }
            DynamicImage::ImageRgba16(buf) => {
                let (w, h) = buf.dimensions();
                SourceImage::Nrgba64(Packed {
                    width: w,
                    height: h,
                    stride: w as usize * 4,
                    pix: buf.into_raw(),
                })
            }
            other => SourceImage::Generic(Box::new(other)),
        }
    }
}

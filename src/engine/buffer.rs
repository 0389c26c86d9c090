// src/engine/buffer.rs
//
// Canonical pixel buffer: 8-bit non-premultiplied RGBA, row-major, with a
// stride that may exceed width*4.

use image::{DynamicImage, RgbaImage};

/// Integer rectangle, half-open on max: `[min_x, max_x) x [min_y, max_y)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Rect {
    pub min_x: i32,
    pub min_y: i32,
    pub max_x: i32,
    pub max_y: i32,
}

impl Rect {
    /// Build a rectangle from two corners, swapping them if needed.
    pub fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self {
            min_x: x0.min(x1),
            min_y: y0.min(y1),
            max_x: x0.max(x1),
            max_y: y0.max(y1),
        }
    }

    pub fn from_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width as i32, height as i32)
    }

    pub fn width(&self) -> i32 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> i32 {
        self.max_y - self.min_y
    }

    pub fn is_empty(&self) -> bool {
        self.min_x >= self.max_x || self.min_y >= self.max_y
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        self.min_x <= x && x < self.max_x && self.min_y <= y && y < self.max_y
    }

    pub fn translate(&self, dx: i32, dy: i32) -> Self {
        Self {
            min_x: self.min_x + dx,
            min_y: self.min_y + dy,
            max_x: self.max_x + dx,
            max_y: self.max_y + dy,
        }
    }

    /// Largest rectangle contained in both; empty (all zero) when disjoint.
    pub fn intersect(&self, other: &Rect) -> Rect {
        let r = Rect {
            min_x: self.min_x.max(other.min_x),
            min_y: self.min_y.max(other.min_y),
            max_x: self.max_x.min(other.max_x),
            max_y: self.max_y.min(other.max_y),
        };
        if r.is_empty() {
            Rect::default()
        } else {
            r
        }
    }
}

/// The engine's canonical image: non-premultiplied 8-bit RGBA.
///
/// Invariant: `stride >= width * 4` and `pix.len() >= stride * height`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    stride: usize,
    pix: Vec<u8>,
}

impl PixelBuffer {
    /// Transparent black buffer of the given size.
    pub fn new(width: u32, height: u32) -> Self {
        let stride = width as usize * 4;
        Self {
            width,
            height,
            stride,
            pix: vec![0; stride * height as usize],
        }
    }

    pub fn filled(width: u32, height: u32, color: [u8; 4]) -> Self {
        let mut buf = Self::new(width, height);
        for px in buf.pix.chunks_exact_mut(4) {
            px.copy_from_slice(&color);
        }
        buf
    }

    /// Wrap tightly packed RGBA bytes. Returns None on a length mismatch.
    pub fn from_raw(width: u32, height: u32, pix: Vec<u8>) -> Option<Self> {
        Self::from_raw_with_stride(width, height, width as usize * 4, pix)
    }

    /// Wrap RGBA rows that are `stride` bytes apart.
    pub fn from_raw_with_stride(
        width: u32,
        height: u32,
        stride: usize,
        pix: Vec<u8>,
    ) -> Option<Self> {
        let row = width as usize * 4;
        if stride < row {
            return None;
        }
        let needed = if height == 0 {
            0
        } else {
            stride * (height as usize - 1) + row
        };
        if pix.len() < needed {
            return None;
        }
        Some(Self {
            width,
            height,
            stride,
            pix,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn bounds(&self) -> Rect {
        Rect::from_size(self.width, self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn as_raw(&self) -> &[u8] {
        &self.pix
    }

    pub(crate) fn pix_mut(&mut self) -> &mut [u8] {
        &mut self.pix
    }

    /// Pixel bytes of row `y`, without stride padding.
    pub fn row(&self, y: u32) -> &[u8] {
        let i = y as usize * self.stride;
        &self.pix[i..i + self.width as usize * 4]
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = y as usize * self.stride + x as usize * 4;
        [self.pix[i], self.pix[i + 1], self.pix[i + 2], self.pix[i + 3]]
    }

    pub fn put_pixel(&mut self, x: u32, y: u32, color: [u8; 4]) {
        let i = y as usize * self.stride + x as usize * 4;
        self.pix[i..i + 4].copy_from_slice(&color);
    }

    /// True when every pixel has alpha 255.
    pub fn is_opaque(&self) -> bool {
        (0..self.height).all(|y| self.row(y).chunks_exact(4).all(|px| px[3] == 0xff))
    }

    /// Copy of the pixels inside `rect` (clipped to the buffer bounds).
    pub fn sub_image(&self, rect: Rect) -> PixelBuffer {
        let r = rect.intersect(&self.bounds());
        let mut out = PixelBuffer::new(r.width() as u32, r.height() as u32);
        let row_len = r.width() as usize * 4;
        for (dy, y) in (r.min_y..r.max_y).enumerate() {
            let src = y as usize * self.stride + r.min_x as usize * 4;
            let dst = dy * out.stride;
            out.pix[dst..dst + row_len].copy_from_slice(&self.pix[src..src + row_len]);
        }
        out
    }

    /// Tightly packed copy as an `image` crate buffer.
    pub fn to_rgba_image(&self) -> RgbaImage {
        let mut packed = Vec::with_capacity(self.width as usize * self.height as usize * 4);
        for y in 0..self.height {
            packed.extend_from_slice(self.row(y));
        }
        // Length is width*height*4 by construction.
        RgbaImage::from_raw(self.width, self.height, packed).unwrap_or_default()
    }

    pub fn into_rgba_image(self) -> RgbaImage {
        if self.stride == self.width as usize * 4 {
            let (w, h) = (self.width, self.height);
            let mut pix = self.pix;
            pix.truncate(w as usize * h as usize * 4);
            RgbaImage::from_raw(w, h, pix).unwrap_or_default()
        } else {
            self.to_rgba_image()
        }
    }

    pub fn into_dynamic(self) -> DynamicImage {
        DynamicImage::ImageRgba8(self.into_rgba_image())
    }
}

impl From<RgbaImage> for PixelBuffer {
    fn from(img: RgbaImage) -> Self {
        let (w, h) = img.dimensions();
        Self {
            width: w,
            height: h,
            stride: w as usize * 4,
            pix: img.into_raw(),
        }
    }
}

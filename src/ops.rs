// src/ops.rs
//
// Output formats and their encode parameters.
// Cheap to build and clone; the codec work happens in engine::encoder.

use crate::engine::buffer::PixelBuffer;
use crate::engine::encoder;
use crate::engine::pool::Parallel;
use crate::error::{ImgconvError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

/// Container formats the converter can write.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Format {
    #[default]
    Jpeg,
    Png,
    Gif,
    Tiff,
    Bmp,
    Pdf,
}

/// Extension table. Several aliases may map to one format.
const EXTENSIONS: &[(&str, Format)] = &[
    ("jpg", Format::Jpeg),
    ("jpeg", Format::Jpeg),
    ("png", Format::Png),
    ("gif", Format::Gif),
    ("tif", Format::Tiff),
    ("tiff", Format::Tiff),
    ("bmp", Format::Bmp),
    ("pdf", Format::Pdf),
];

impl Format {
    pub const ALL: [Format; 6] = [
        Format::Jpeg,
        Format::Png,
        Format::Gif,
        Format::Tiff,
        Format::Bmp,
        Format::Pdf,
    ];

    /// Case-insensitive lookup; a leading dot is allowed.
    pub fn from_extension(ext: &str) -> Result<Self> {
        let bare = ext.strip_prefix('.').unwrap_or(ext);
        EXTENSIONS
            .iter()
            .find(|(e, _)| e.eq_ignore_ascii_case(bare))
            .map(|&(_, f)| f)
            .ok_or_else(|| ImgconvError::unsupported_format(ext.to_string()))
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| ImgconvError::unsupported_format(path.display().to_string()))?;
        Self::from_extension(ext)
    }

    pub fn name(self) -> &'static str {
        match self {
            Format::Jpeg => "jpeg",
            Format::Png => "png",
            Format::Gif => "gif",
            Format::Tiff => "tiff",
            Format::Bmp => "bmp",
            Format::Pdf => "pdf",
        }
    }

    /// Canonical output extension, with the dot.
    pub fn extension(self) -> &'static str {
        match self {
            Format::Jpeg => ".jpg",
            Format::Png => ".png",
            Format::Gif => ".gif",
            Format::Tiff => ".tif",
            Format::Bmp => ".bmp",
            Format::Pdf => ".pdf",
        }
    }

    /// Whether the container stores alpha. Images bound for formats that
    /// don't are flattened over black before encoding.
    pub fn supports_alpha(self) -> bool {
        !matches!(self, Format::Jpeg | Format::Pdf)
    }

    /// Formats the decoder can read back.
    pub fn is_decodable(self) -> bool {
        self != Format::Pdf
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Format {
    type Err = ImgconvError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_extension(s)
    }
}

impl TryFrom<String> for Format {
    type Error = ImgconvError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Format> for String {
    fn from(f: Format) -> Self {
        f.name().to_string()
    }
}

/// TIFF compression scheme.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TiffCompression {
    Uncompressed,
    Lzw,
    #[default]
    Deflate,
    PackBits,
}

impl FromStr for TiffCompression {
    type Err = ImgconvError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "uncompressed" => Ok(Self::Uncompressed),
            "lzw" => Ok(Self::Lzw),
            "deflate" => Ok(Self::Deflate),
            "packbits" => Ok(Self::PackBits),
            _ => Err(ImgconvError::invalid_argument(
                "compression",
                s.to_string(),
                "expected none, lzw, deflate or packbits",
            )),
        }
    }
}

/// PNG compression effort.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PngCompression {
    #[default]
    Default,
    /// Fastest deflate, no row filtering.
    Fast,
    /// Maximum deflate, then a lossless oxipng pass.
    Best,
}

impl FromStr for PngCompression {
    type Err = ImgconvError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "default" => Ok(Self::Default),
            "fast" | "none" => Ok(Self::Fast),
            "best" => Ok(Self::Best),
            _ => Err(ImgconvError::invalid_argument(
                "png_compression",
                s.to_string(),
                "expected default, fast or best",
            )),
        }
    }
}

/// Palette settings for GIF output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GifOptions {
    /// Palette size, 1..=256.
    pub num_colors: u16,
    /// Floyd-Steinberg error diffusion.
    pub dither: bool,
}

impl Default for GifOptions {
    fn default() -> Self {
        Self {
            num_colors: 256,
            dither: false,
        }
    }
}

pub const DEFAULT_QUALITY: u8 = 75;

/// A format plus everything its encoder needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormatOptions {
    pub format: Format,
    /// JPEG and PDF quality, 1..=100.
    pub quality: u8,
    pub tiff_compression: TiffCompression,
    pub png_compression: PngCompression,
    pub gif: GifOptions,
    /// Flatten onto this color (non-premultiplied RGBA) before encoding.
    pub background: Option<[u8; 4]>,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            format: Format::Jpeg,
            quality: DEFAULT_QUALITY,
            tiff_compression: TiffCompression::default(),
            png_compression: PngCompression::default(),
            gif: GifOptions::default(),
            background: None,
        }
    }
}

impl FormatOptions {
    pub fn new(format: Format) -> Self {
        Self {
            format,
            ..Self::default()
        }
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_tiff_compression(mut self, compression: TiffCompression) -> Self {
        self.tiff_compression = compression;
        self
    }

    pub fn with_png_compression(mut self, compression: PngCompression) -> Self {
        self.png_compression = compression;
        self
    }

    pub fn with_gif(mut self, gif: GifOptions) -> Self {
        self.gif = gif;
        self
    }

    pub fn with_background(mut self, color: [u8; 4]) -> Self {
        self.background = Some(color);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.quality) {
            return Err(ImgconvError::invalid_argument(
                "quality",
                self.quality.to_string(),
                "must be between 1 and 100",
            ));
        }
        if !(1..=256).contains(&self.gif.num_colors) {
            return Err(ImgconvError::invalid_argument(
                "gif.num_colors",
                self.gif.num_colors.to_string(),
                "must be between 1 and 256",
            ));
        }
        Ok(())
    }

    /// Encode `img` into `w`.
    pub fn encode<W: Write>(&self, img: &PixelBuffer, w: &mut W) -> Result<()> {
        self.encode_with(img, w, &Parallel::default())
    }

    /// As [`FormatOptions::encode`], running any pixel pass (background
    /// flattening) under `parallel`.
    pub fn encode_with<W: Write>(
        &self,
        img: &PixelBuffer,
        w: &mut W,
        parallel: &Parallel,
    ) -> Result<()> {
        let bytes = self.encode_to_vec_with(img, parallel)?;
        w.write_all(&bytes)
            .map_err(|e| ImgconvError::encode_failed(self.format.name(), e.to_string()))
    }

    pub fn encode_to_vec(&self, img: &PixelBuffer) -> Result<Vec<u8>> {
        self.encode_to_vec_with(img, &Parallel::default())
    }

    pub fn encode_to_vec_with(&self, img: &PixelBuffer, parallel: &Parallel) -> Result<Vec<u8>> {
        self.validate()?;
        encoder::encode(img, self, parallel)
    }
}

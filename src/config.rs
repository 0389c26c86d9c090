//! Batch configuration.
//!
//! A `BatchConfig` is read from an optional TOML file; every key has a
//! default and unknown keys are rejected. The converter binary overlays its
//! command-line flags on top of the loaded values.
//!
//! ```toml
//! src = "photos"
//! dst = "output"
//! format = "png"            # jpg, jpeg, png, gif, tif, tiff, bmp, pdf
//! quality = 75              # JPEG and PDF, 1-100
//! compression = "deflate"   # TIFF: none, lzw, deflate, packbits
//! png_compression = "default"
//! gif_colors = 256
//! gif_dither = false
//! white_background = false
//! gray = false
//! auto_orientation = false
//! workers = 5               # files converted at once
//! max_parallelism = 0       # threads per pixel operation, 0 = all cores
//!
//! [watermark]
//! path = "mark.png"
//! opacity = 128
//! random = false
//! x = 0
//! y = 0
//!
//! [resize]
//! width = 0
//! height = 0
//! percent = 50.0
//! ```

use crate::engine::api::{open, Options, ResizeOptions, DEFAULT_OPACITY};
use crate::engine::decoder::DecodeOptions;
use crate::engine::pool::Parallel;
use crate::error::{ImgconvError, Result};
use crate::ops::{Format, FormatOptions, GifOptions, PngCompression, TiffCompression, DEFAULT_QUALITY};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_WORKERS: usize = 5;

const WHITE: [u8; 4] = [255, 255, 255, 255];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchConfig {
    /// Source file or directory.
    pub src: Option<PathBuf>,
    /// Destination file or directory.
    pub dst: PathBuf,
    pub format: Format,
    pub quality: u8,
    /// TIFF compression.
    pub compression: TiffCompression,
    pub png_compression: PngCompression,
    pub gif_colors: u16,
    pub gif_dither: bool,
    /// Flatten transparency onto white.
    pub white_background: bool,
    pub gray: bool,
    pub auto_orientation: bool,
    /// Files converted concurrently.
    pub workers: usize,
    /// Thread cap for each pixel operation; 0 means all cores.
    pub max_parallelism: usize,
    /// Overwrite existing outputs.
    pub force: bool,
    /// Decode inputs only, write nothing.
    pub test: bool,
    pub watermark: Option<WatermarkConfig>,
    pub resize: Option<ResizeConfig>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            src: None,
            dst: PathBuf::from("output"),
            format: Format::default(),
            quality: DEFAULT_QUALITY,
            compression: TiffCompression::default(),
            png_compression: PngCompression::default(),
            gif_colors: 256,
            gif_dither: false,
            white_background: false,
            gray: false,
            auto_orientation: false,
            workers: DEFAULT_WORKERS,
            max_parallelism: 0,
            force: false,
            test: false,
            watermark: None,
            resize: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatermarkConfig {
    pub path: PathBuf,
    /// 0 selects the default of 128.
    pub opacity: u8,
    pub random: bool,
    /// Offset of the mark's center from the base's center; ignored when random.
    pub x: i32,
    pub y: i32,
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            opacity: DEFAULT_OPACITY,
            random: false,
            x: 0,
            y: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResizeConfig {
    pub width: i32,
    pub height: i32,
    pub percent: f64,
}

impl ResizeConfig {
    pub fn is_noop(&self) -> bool {
        self.width == 0 && self.height == 0 && self.percent == 0.0
    }
}

impl BatchConfig {
    /// Read `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ImgconvError::file_read_failed(path.display().to_string(), e)),
        };
        let config = Self::parse(&content)
            .map_err(|e| ImgconvError::invalid_config(path.display().to_string(), e))?;
        config
            .validate()
            .map_err(|e| ImgconvError::invalid_config(path.display().to_string(), e.to_string()))?;
        Ok(config)
    }

    pub fn parse(content: &str) -> std::result::Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    pub fn validate(&self) -> Result<()> {
        self.format_options().validate()?;
        if self.workers == 0 {
            return Err(ImgconvError::invalid_argument(
                "workers",
                "0",
                "must be at least 1",
            ));
        }
        Ok(())
    }

    pub fn format_options(&self) -> FormatOptions {
        let mut opts = FormatOptions::new(self.format)
            .with_quality(self.quality)
            .with_tiff_compression(self.compression)
            .with_png_compression(self.png_compression)
            .with_gif(GifOptions {
                num_colors: self.gif_colors,
                dither: self.gif_dither,
            });
        if self.white_background {
            opts = opts.with_background(WHITE);
        }
        opts
    }

    pub fn decode_options(&self) -> DecodeOptions {
        DecodeOptions {
            auto_orientation: self.auto_orientation,
            parallel: self.parallel(),
        }
    }

    pub fn parallel(&self) -> Parallel {
        Parallel::with_max_workers(self.max_parallelism)
    }

    /// Build the conversion options. Opens the watermark image, if any.
    pub fn to_options(&self) -> Result<Options> {
        self.validate()?;
        let mut opts = Options::new();
        opts.set_format(self.format_options())
            .set_gray(self.gray)
            .set_parallel(self.parallel());

        if let Some(r) = self.resize.filter(|r| !r.is_noop()) {
            opts.set_resize(ResizeOptions::new(r.width, r.height, r.percent));
        }

        if let Some(w) = &self.watermark {
            let mark = open(&w.path, &DecodeOptions::default())?.into_pixel_buffer(&self.parallel());
            opts.set_watermark(mark, w.opacity);
            if let Some(mark) = opts.watermark.take() {
                opts.watermark = Some(if w.random {
                    mark.with_random(true)
                } else {
                    mark.with_offset(w.x, w.y)
                });
            }
        }
        Ok(opts)
    }
}

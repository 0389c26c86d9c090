// src/engine/api.rs
//
// Conversion pipeline and file helpers.
// Options holds everything one conversion needs; convert() runs
// gray -> resize -> watermark -> encode in that order.

use crate::engine::buffer::PixelBuffer;
use crate::engine::common::EngineResult;
use crate::engine::decoder::{decode_with, DecodeOptions};
use crate::engine::gray::to_gray;
use crate::engine::pool::Parallel;
use crate::engine::resize::{resize, LANCZOS};
use crate::engine::scanner::Scanner;
use crate::engine::source::SourceImage;
use crate::engine::watermark::{watermark_with_rng, WatermarkOptions};
use crate::error::ImgconvError;
use crate::ops::FormatOptions;
use rand::Rng;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const DEFAULT_OPACITY: u8 = 128;

/// Resize request. Explicit dimensions win; `percent` is only consulted when
/// both are zero.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ResizeOptions {
    pub width: i32,
    pub height: i32,
    pub percent: f64,
}

impl ResizeOptions {
    pub fn new(width: i32, height: i32, percent: f64) -> Self {
        Self {
            width,
            height,
            percent,
        }
    }

    /// Target `(width, height)` arguments for [`resize`]; a zero keeps the
    /// aspect ratio.
    pub fn target(&self, src_w: u32) -> (i32, i32) {
        if self.width == 0 && self.height == 0 {
            ((src_w as f64 * self.percent / 100.0) as i32, 0)
        } else {
            (self.width, self.height)
        }
    }

    pub fn apply(&self, img: &SourceImage, parallel: &Parallel) -> PixelBuffer {
        let (w, h) = self.target(img.width());
        resize(&Scanner::new(img), w, h, &LANCZOS, parallel)
    }
}

/// One conversion job.
#[derive(Clone, Debug, Default)]
pub struct Options {
    pub format: FormatOptions,
    pub resize: Option<ResizeOptions>,
    pub watermark: Option<WatermarkOptions>,
    pub gray: bool,
    pub parallel: Parallel,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_format(&mut self, format: FormatOptions) -> &mut Self {
        self.format = format;
        self
    }

    pub fn set_gray(&mut self, gray: bool) -> &mut Self {
        self.gray = gray;
        self
    }

    pub fn set_resize(&mut self, resize: ResizeOptions) -> &mut Self {
        self.resize = Some(resize);
        self
    }

    /// Attach a watermark. An opacity of 0 selects [`DEFAULT_OPACITY`].
    pub fn set_watermark(&mut self, mark: PixelBuffer, opacity: u8) -> &mut Self {
        let opacity = if opacity == 0 { DEFAULT_OPACITY } else { opacity };
        self.watermark = Some(WatermarkOptions::new(mark, opacity));
        self
    }

    pub fn set_parallel(&mut self, parallel: Parallel) -> &mut Self {
        self.parallel = parallel;
        self
    }

    /// Run the pipeline on `img` and write the encoded bytes to `w`.
    pub fn convert<W: Write>(&self, w: &mut W, img: &SourceImage) -> EngineResult<()> {
        self.convert_with_rng(w, img, &mut rand::thread_rng())
    }

    /// As [`Options::convert`], with an explicit random source for random
    /// watermark placement.
    pub fn convert_with_rng<W: Write, R: Rng>(
        &self,
        w: &mut W,
        img: &SourceImage,
        rng: &mut R,
    ) -> EngineResult<()> {
        let out = self.process_with_rng(img, rng);
        self.format.encode_with(&out, w, &self.parallel)
    }

    /// Pixel stages only: gray, resize, watermark.
    pub fn process_with_rng<R: Rng>(&self, img: &SourceImage, rng: &mut R) -> PixelBuffer {
        let par = &self.parallel;

        let grayed;
        let img = if self.gray {
            grayed = to_gray(&Scanner::new(img), par);
            &grayed
        } else {
            img
        };

        let mut buf = match &self.resize {
            Some(r) => r.apply(img, par),
            None => img.to_pixel_buffer(par),
        };

        if let Some(mark) = &self.watermark {
            buf = watermark_with_rng(&buf, mark, rng, par);
        }
        buf
    }

    /// `path` with its extension replaced by the output format's.
    pub fn convert_ext(&self, path: &Path) -> PathBuf {
        let ext = self.format.format.extension();
        path.with_extension(ext.trim_start_matches('.'))
    }
}

/// Read and decode an image file.
pub fn open(path: &Path, opts: &DecodeOptions) -> EngineResult<SourceImage> {
    let display = path.display().to_string();
    let bytes = std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ImgconvError::file_not_found(display.clone()),
        _ => ImgconvError::file_read_failed(display.clone(), e),
    })?;
    let decoded = decode_with(&bytes, opts)?;
    tracing::debug!(path = %path.display(), format = decoded.format, "opened");
    Ok(decoded.image)
}

/// Encode `img` into `w`.
pub fn write<W: Write>(w: &mut W, img: &PixelBuffer, format: &FormatOptions) -> EngineResult<()> {
    format.encode(img, w)
}

/// Encode `img` and write it to `path`, replacing any existing file.
pub fn save(path: &Path, img: &PixelBuffer, format: &FormatOptions) -> EngineResult<()> {
    let bytes = format.encode_to_vec(img)?;
    std::fs::write(path, bytes)
        .map_err(|e| ImgconvError::file_write_failed(path.display().to_string(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::decoder::decode;
    use crate::ops::Format;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn create_test_image(width: u32, height: u32) -> SourceImage {
        SourceImage::from(PixelBuffer::filled(width, height, [200, 40, 40, 255]))
    }

    fn decode_buffer(bytes: &[u8]) -> PixelBuffer {
        decode(bytes)
            .unwrap()
            .image
            .into_pixel_buffer(&Parallel::serial())
    }

    mod resize_option_tests {
        use super::*;

        #[test]
        fn test_percent_only_when_no_dimensions() {
            assert_eq!(ResizeOptions::new(0, 0, 50.0).target(301), (150, 0));
            assert_eq!(ResizeOptions::new(80, 0, 50.0).target(301), (80, 0));
            assert_eq!(ResizeOptions::new(0, 20, 50.0).target(301), (0, 20));
        }

        #[test]
        fn test_percent_keeps_aspect() {
            let img = create_test_image(200, 100);
            let out = ResizeOptions::new(0, 0, 25.0).apply(&img, &Parallel::serial());
            assert_eq!(out.dimensions(), (50, 25));
        }

        #[test]
        fn test_zero_percent_is_empty() {
            let img = create_test_image(20, 10);
            let out = ResizeOptions::new(0, 0, 0.0).apply(&img, &Parallel::serial());
            assert!(out.is_empty());
        }
    }

    mod pipeline_tests {
        use super::*;

        #[test]
        fn test_default_options_encode_jpeg() {
            let mut out = Vec::new();
            Options::new().convert(&mut out, &create_test_image(8, 8)).unwrap();
            assert_eq!(&out[..2], &[0xFF, 0xD8]);
        }

        #[test]
        fn test_serial_pipeline_with_background() {
            let src = SourceImage::from(PixelBuffer::filled(9, 5, [10, 20, 30, 0]));
            let mut opts = Options::new();
            opts.set_format(FormatOptions::new(Format::Png).with_background([255, 255, 255, 255]))
                .set_parallel(Parallel::serial());
            let mut out = Vec::new();
            opts.convert(&mut out, &src).unwrap();
            assert_eq!(decode_buffer(&out).pixel(8, 4), [255, 255, 255, 255]);
        }

        #[test]
        fn test_gray_then_resize() {
            let mut opts = Options::new();
            opts.set_format(FormatOptions::new(Format::Png))
                .set_gray(true)
                .set_resize(ResizeOptions::new(4, 0, 0.0));
            let mut out = Vec::new();
            opts.convert(&mut out, &create_test_image(16, 8)).unwrap();
            let back = decode_buffer(&out);
            assert_eq!(back.dimensions(), (4, 2));
            let [r, g, b, a] = back.pixel(1, 1);
            assert!(r == g && g == b);
            assert_eq!(a, 255);
        }

        #[test]
        fn test_watermark_default_opacity() {
            let mut opts = Options::new();
            opts.set_watermark(PixelBuffer::filled(2, 2, [0, 0, 0, 255]), 0);
            assert_eq!(opts.watermark.as_ref().unwrap().opacity, DEFAULT_OPACITY);
            opts.set_watermark(PixelBuffer::filled(2, 2, [0, 0, 0, 255]), 255);
            assert_eq!(opts.watermark.as_ref().unwrap().opacity, 255);
        }

        #[test]
        fn test_watermark_is_centered() {
            let mut opts = Options::new();
            opts.set_format(FormatOptions::new(Format::Png))
                .set_watermark(PixelBuffer::filled(2, 2, [0, 0, 255, 255]), 255);
            let mut out = Vec::new();
            let mut rng = StdRng::seed_from_u64(7);
            opts.convert_with_rng(&mut out, &create_test_image(10, 10), &mut rng)
                .unwrap();
            let back = decode_buffer(&out);
            assert_eq!(back.pixel(4, 4), [0, 0, 255, 255]);
            assert_eq!(back.pixel(0, 0), [200, 40, 40, 255]);
        }

        #[test]
        fn test_invalid_quality_is_reported() {
            let mut opts = Options::new();
            opts.set_format(FormatOptions::new(Format::Jpeg).with_quality(0));
            let err = opts
                .convert(&mut Vec::new(), &create_test_image(2, 2))
                .unwrap_err();
            assert!(matches!(err, ImgconvError::InvalidArgument { .. }));
        }
    }

    #[test]
    fn test_convert_ext() {
        let mut opts = Options::new();
        opts.set_format(FormatOptions::new(Format::Tiff));
        assert_eq!(
            opts.convert_ext(Path::new("out/a/photo.JPG")),
            PathBuf::from("out/a/photo.tif")
        );
        assert_eq!(opts.convert_ext(Path::new("noext")), PathBuf::from("noext.tif"));
    }

    #[test]
    fn test_open_and_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.bmp");
        let img = PixelBuffer::filled(3, 2, [1, 2, 3, 255]);
        save(&path, &img, &FormatOptions::new(Format::Bmp)).unwrap();
        let back = open(&path, &DecodeOptions::default()).unwrap();
        assert_eq!(back.to_pixel_buffer(&Parallel::serial()), img);

        let missing = open(&dir.path().join("nope.png"), &DecodeOptions::default());
        assert!(matches!(missing, Err(ImgconvError::FileNotFound { .. })));
    }
}

// src/engine/decoder.rs
//
// Decoder operations: JPEG (mozjpeg), PNG (zune-png), GIF into a paletted
// source (gif), everything else (BMP, TIFF, WebP) via the image crate, with
// a permissive TIFF retry for files strict decoders reject.

use crate::engine::common::{run_with_panic_policy, EngineResult};
use crate::engine::orientation::{fix_orientation, read_orientation_from_bytes, Orientation};
use crate::engine::pool::Parallel;
use crate::engine::scanner::Scanner;
use crate::engine::source::{Packed, Paletted, SourceImage, SubsampleRatio, YCbCr};
use crate::engine::{PixelBuffer, MAX_DIMENSION, MAX_PIXELS};
use crate::error::ImgconvError;
use image::{DynamicImage, GrayAlphaImage, GrayImage, ImageFormat, ImageReader, RgbImage, RgbaImage};
use mozjpeg::Decompress;
use std::io::Cursor;
use zune_core::bytestream::ZCursor;
use zune_core::colorspace::ColorSpace;
use zune_core::options::DecoderOptions;
use zune_png::PngDecoder;

/// A decoded image and the name of the container it came from.
#[derive(Debug)]
pub struct Decoded {
    pub image: SourceImage,
    pub format: &'static str,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DecodeOptions {
    /// Apply the EXIF orientation tag, if any, after decoding.
    pub auto_orientation: bool,
    pub parallel: Parallel,
}

/// Decode JPEG using mozjpeg (backed by libjpeg-turbo)
pub fn decode_jpeg_mozjpeg(data: &[u8]) -> EngineResult<DynamicImage> {
    run_with_panic_policy("decode:mozjpeg", || {
        if !data.windows(2).any(|pair| pair == [0xFF, 0xD9]) {
            return Err(ImgconvError::decode_failed("mozjpeg: missing JPEG EOI marker"));
        }

        let decompress = Decompress::new_mem(data).map_err(|e| {
            ImgconvError::decode_failed(format!("mozjpeg decompress init failed: {e:?}"))
        })?;

        let mut decompress = decompress.rgb().map_err(|e| {
            ImgconvError::decode_failed(format!("mozjpeg rgb conversion failed: {e:?}"))
        })?;

        let width = decompress.width() as u32;
        let height = decompress.height() as u32;
        check_dimensions(width, height)?;

        let pixels: Vec<[u8; 3]> = decompress.read_scanlines().map_err(|e| {
            ImgconvError::decode_failed(format!("mozjpeg: failed to read scanlines: {e:?}"))
        })?;
        let flat_pixels: Vec<u8> = pixels.into_iter().flatten().collect();

        let rgb_image = RgbImage::from_raw(width, height, flat_pixels).ok_or_else(|| {
            ImgconvError::decode_failed("mozjpeg: failed to create image from raw data")
        })?;

        Ok(DynamicImage::ImageRgb8(rgb_image))
    })
}

/// Decode through the image crate under the panic policy.
pub fn decode_with_image_crate(data: &[u8]) -> EngineResult<DynamicImage> {
    run_with_panic_policy("decode:image", || {
        image::load_from_memory(data)
            .map_err(|e| ImgconvError::decode_failed(format!("decode failed: {e}")))
    })
}

/// Decode PNG using zune-png. 16-bit input is stripped to 8 bits.
pub fn decode_png_zune(data: &[u8]) -> EngineResult<DynamicImage> {
    run_with_panic_policy("decode:png", || {
        let options = DecoderOptions::default().png_set_strip_to_8bit(true);
        let mut decoder = PngDecoder::new_with_options(ZCursor::new(data), options);
        let pixels = decoder
            .decode()
            .map_err(|e| ImgconvError::decode_failed(format!("png: decode failed: {e}")))?;

        let (width, height) = decoder
            .dimensions()
            .ok_or_else(|| ImgconvError::decode_failed("png: missing header info"))?;
        let (width, height) = (width as u32, height as u32);
        check_dimensions(width, height)?;

        let buf = match pixels {
            zune_core::result::DecodingResult::U8(v) => v,
            _ => {
                return Err(ImgconvError::decode_failed(
                    "png: unexpected non-U8 pixel buffer",
                ))
            }
        };

        let colorspace = decoder
            .colorspace()
            .ok_or_else(|| ImgconvError::decode_failed("png: missing colorspace"))?;

        let img = match colorspace {
            ColorSpace::RGB => RgbImage::from_raw(width, height, buf).map(DynamicImage::ImageRgb8),
            ColorSpace::RGBA => RgbaImage::from_raw(width, height, buf).map(DynamicImage::ImageRgba8),
            ColorSpace::Luma => GrayImage::from_raw(width, height, buf).map(DynamicImage::ImageLuma8),
            ColorSpace::LumaA => {
                GrayAlphaImage::from_raw(width, height, buf).map(DynamicImage::ImageLumaA8)
            }
            other => {
                return Err(ImgconvError::decode_failed(format!(
                    "png: unsupported colorspace {other:?}"
                )))
            }
        };
        img.ok_or_else(|| ImgconvError::decode_failed("png: pixel buffer size mismatch"))
    })
}

/// True for the two TIFF byte-order headers.
pub fn is_tiff(data: &[u8]) -> bool {
    data.starts_with(b"II*\0") || data.starts_with(b"MM\0*")
}

/// Permissive TIFF decode for files the image crate refuses (odd tag
/// layouts, oversized strips). Decoder limits are lifted; our own dimension
/// limits still apply.
pub fn decode_tiff_permissive(data: &[u8]) -> EngineResult<SourceImage> {
    use tiff::decoder::{Decoder, DecodingResult, Limits};
    use tiff::tags::Tag;
    use tiff::ColorType;

    run_with_panic_policy("decode:tiff", || {
        let tiff_err = |e: tiff::TiffError| ImgconvError::decode_failed(format!("tiff: {e}"));

        let mut decoder = Decoder::new(Cursor::new(data))
            .map_err(tiff_err)?
            .with_limits(Limits::unlimited());
        let (width, height) = decoder.dimensions().map_err(tiff_err)?;
        check_dimensions(width, height)?;
        let color = decoder.colortype().map_err(tiff_err)?;
        // JPEG-compressed YCbCr comes back from the codec already as RGB.
        let jpeg_compressed = matches!(
            decoder.find_tag_unsigned::<u16>(Tag::Compression).map_err(tiff_err)?,
            Some(6 | 7)
        );
        let subsampling = decoder
            .find_tag_unsigned_vec::<u16>(Tag::Unknown(TAG_YCBCR_SUBSAMPLING))
            .map_err(tiff_err)?;
        let image = decoder.read_image().map_err(tiff_err)?;

        let short = || ImgconvError::decode_failed("tiff: pixel buffer size mismatch");
        let source = match (color, image) {
            (ColorType::RGBA(8), DecodingResult::U8(buf)) => {
                SourceImage::Nrgba(PixelBuffer::from_raw(width, height, buf).ok_or_else(short)?)
            }
            (ColorType::RGB(8), DecodingResult::U8(buf)) => {
                let img = RgbImage::from_raw(width, height, buf).ok_or_else(short)?;
                SourceImage::from(DynamicImage::ImageRgb8(img))
            }
            (ColorType::Gray(8), DecodingResult::U8(buf)) => {
                SourceImage::Gray(Packed::new(width, height, 1, buf).ok_or_else(short)?)
            }
            (ColorType::GrayA(8), DecodingResult::U8(buf)) => {
                let img = GrayAlphaImage::from_raw(width, height, buf).ok_or_else(short)?;
                SourceImage::from(DynamicImage::ImageLumaA8(img))
            }
            (ColorType::RGBA(16), DecodingResult::U16(buf)) => {
                SourceImage::Nrgba64(Packed::new(width, height, 4, buf).ok_or_else(short)?)
            }
            (ColorType::RGB(16), DecodingResult::U16(buf)) => {
                let mut pix = Vec::with_capacity(buf.len() / 3 * 4);
                for px in buf.chunks_exact(3) {
                    pix.extend_from_slice(&[px[0], px[1], px[2], 0xffff]);
                }
                SourceImage::Nrgba64(Packed::new(width, height, 4, pix).ok_or_else(short)?)
            }
            (ColorType::Gray(16), DecodingResult::U16(buf)) => {
                SourceImage::Gray16(Packed::new(width, height, 1, buf).ok_or_else(short)?)
            }
            (ColorType::YCbCr(8), DecodingResult::U8(buf)) if jpeg_compressed => {
                let img = RgbImage::from_raw(width, height, buf).ok_or_else(short)?;
                SourceImage::from(DynamicImage::ImageRgb8(img))
            }
            (ColorType::YCbCr(8), DecodingResult::U8(buf)) => {
                // Absent tag means the 2x2 default, whose block layout isn't handled.
                if subsampling.as_deref() != Some(&[1u16, 1][..]) {
                    return Err(ImgconvError::decode_failed(format!(
                        "tiff: unsupported YCbCr subsampling {subsampling:?}"
                    )));
                }
                SourceImage::YCbCr(split_ycbcr_444(width, height, &buf).ok_or_else(short)?)
            }
            (other, _) => {
                return Err(ImgconvError::decode_failed(format!(
                    "tiff: unsupported color type {other:?}"
                )))
            }
        };
        Ok(source)
    })
}

const TAG_YCBCR_SUBSAMPLING: u16 = 530;

/// Interleaved full-resolution Y, Cb, Cr samples into three planes.
fn split_ycbcr_444(width: u32, height: u32, samples: &[u8]) -> Option<YCbCr> {
    let n = width as usize * height as usize;
    if samples.len() < n * 3 {
        return None;
    }
    let (mut y, mut cb, mut cr) = (Vec::with_capacity(n), Vec::with_capacity(n), Vec::with_capacity(n));
    for px in samples.chunks_exact(3).take(n) {
        y.push(px[0]);
        cb.push(px[1]);
        cr.push(px[2]);
    }
    YCbCr::new(width, height, SubsampleRatio::Ratio444, y, cb, cr)
}

/// Decode the first GIF frame as indices into its color table, with the
/// transparent index (if any) mapped to a fully transparent entry.
///
/// `Ok(None)` means the frame needs the generic path: it doesn't cover the
/// whole logical screen, or an index falls outside the table.
pub fn decode_gif_paletted(data: &[u8]) -> EngineResult<Option<SourceImage>> {
    run_with_panic_policy("decode:gif", || {
        let gif_err = |e: gif::DecodingError| ImgconvError::decode_failed(format!("gif: {e}"));

        let mut options = gif::DecodeOptions::new();
        options.set_color_output(gif::ColorOutput::Indexed);
        let mut decoder = options.read_info(data).map_err(gif_err)?;
        let (screen_w, screen_h) = (decoder.width(), decoder.height());
        check_dimensions(screen_w as u32, screen_h as u32)?;
        let global = decoder.global_palette().map(<[u8]>::to_vec);

        let frame = decoder
            .read_next_frame()
            .map_err(gif_err)?
            .ok_or_else(|| ImgconvError::decode_failed("gif: no image frames"))?;
        if frame.left != 0 || frame.top != 0 || frame.width != screen_w || frame.height != screen_h {
            return Ok(None);
        }

        let table = frame
            .palette
            .clone()
            .or(global)
            .ok_or_else(|| ImgconvError::decode_failed("gif: missing color table"))?;
        let mut palette: Vec<[u8; 4]> = table
            .chunks_exact(3)
            .map(|c| [c[0], c[1], c[2], 0xff])
            .collect();
        if let Some(entry) = frame.transparent.and_then(|t| palette.get_mut(t as usize)) {
            *entry = [0, 0, 0, 0];
        }

        let (w, h) = (frame.width as u32, frame.height as u32);
        let indices = Packed::new(w, h, 1, frame.buffer.to_vec())
            .ok_or_else(|| ImgconvError::decode_failed("gif: frame buffer size mismatch"))?;
        Ok(Paletted::new(indices, palette).map(SourceImage::Paletted))
    })
}

/// Detect input format using magic bytes. Returns None if unknown.
pub fn detect_format(bytes: &[u8]) -> Option<ImageFormat> {
    image::guess_format(bytes).ok()
}

pub fn format_name(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "jpeg",
        ImageFormat::Png => "png",
        ImageFormat::Gif => "gif",
        ImageFormat::Tiff => "tiff",
        ImageFormat::Bmp => "bmp",
        ImageFormat::WebP => "webp",
        _ => "unknown",
    }
}

/// Route by magic bytes: JPEG to mozjpeg (falling back to the image crate),
/// PNG to zune-png, everything else to the image crate.
pub fn decode_image(bytes: &[u8]) -> EngineResult<(DynamicImage, Option<ImageFormat>)> {
    let detected = detect_format(bytes);
    let img = match detected {
        Some(ImageFormat::Jpeg) => match decode_jpeg_mozjpeg(bytes) {
            Ok(img) => img,
            Err(e @ ImgconvError::DimensionExceedsLimit { .. })
            | Err(e @ ImgconvError::PixelCountExceedsLimit { .. }) => return Err(e),
            Err(e) => {
                tracing::debug!(error = %e, "mozjpeg rejected input, retrying with image crate");
                decode_with_image_crate(bytes)?
            }
        },
        Some(ImageFormat::Png) => decode_png_zune(bytes)?,
        Some(_) => decode_with_image_crate(bytes)?,
        None => return Err(ImgconvError::unsupported_format("unknown")),
    };
    Ok((img, detected))
}

/// GIF goes to the paletted decoder first; everything else, and any GIF it
/// declines, goes through [`decode_image`].
fn decode_source(bytes: &[u8]) -> EngineResult<(SourceImage, Option<ImageFormat>)> {
    if detect_format(bytes) == Some(ImageFormat::Gif) {
        match decode_gif_paletted(bytes) {
            Ok(Some(img)) => return Ok((img, Some(ImageFormat::Gif))),
            Ok(None) => {}
            Err(e) if !is_retryable(&e) => return Err(e),
            Err(e) => {
                tracing::debug!(error = %e, "paletted GIF decode failed, retrying with image crate")
            }
        }
    }
    let (img, format) = decode_image(bytes)?;
    check_dimensions(img.width(), img.height())?;
    Ok((SourceImage::from(img), format))
}

pub fn decode(bytes: &[u8]) -> EngineResult<Decoded> {
    decode_with(bytes, &DecodeOptions::default())
}

/// Decode to a SourceImage. On failure, TIFF-shaped input gets a second
/// chance through the permissive TIFF decoder.
pub fn decode_with(bytes: &[u8], opts: &DecodeOptions) -> EngineResult<Decoded> {
    ensure_dimensions_safe(bytes)?;

    let decoded = match decode_source(bytes) {
        Ok((image, format)) => Decoded {
            image,
            format: format.map(format_name).unwrap_or("unknown"),
        },
        Err(e) if is_tiff(bytes) && is_retryable(&e) => {
            tracing::warn!(error = %e, "strict TIFF decode failed, retrying permissively");
            Decoded {
                image: decode_tiff_permissive(bytes)?,
                format: "tiff",
            }
        }
        Err(e) => return Err(e),
    };
    tracing::debug!(
        format = decoded.format,
        layout = decoded.image.layout_name(),
        width = decoded.image.width(),
        height = decoded.image.height(),
        "decoded"
    );

    if !opts.auto_orientation {
        return Ok(decoded);
    }
    match read_orientation_from_bytes(bytes) {
        Orientation::Unspecified | Orientation::Normal => Ok(decoded),
        o => {
            tracing::debug!(orientation = o.tag(), "applying EXIF orientation");
            let fixed = fix_orientation(&Scanner::new(&decoded.image), o, &opts.parallel);
            Ok(Decoded {
                image: SourceImage::Nrgba(fixed),
                format: decoded.format,
            })
        }
    }
}

fn is_retryable(e: &ImgconvError) -> bool {
    !matches!(
        e,
        ImgconvError::DimensionExceedsLimit { .. } | ImgconvError::PixelCountExceedsLimit { .. }
    )
}

/// Header-only read: `(width, height, format name)`.
pub fn decode_config(bytes: &[u8]) -> EngineResult<(u32, u32, &'static str)> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| ImgconvError::decode_failed(format!("header read failed: {e}")))?;
    let format = reader.format();
    match reader.into_dimensions() {
        Ok((w, h)) => Ok((w, h, format.map(format_name).unwrap_or("unknown"))),
        Err(e) if is_tiff(bytes) => {
            tracing::debug!(error = %e, "strict TIFF header read failed, retrying permissively");
            let mut decoder = tiff::decoder::Decoder::new(Cursor::new(bytes))
                .map_err(|e| ImgconvError::decode_failed(format!("tiff: {e}")))?;
            let (w, h) = decoder
                .dimensions()
                .map_err(|e| ImgconvError::decode_failed(format!("tiff: {e}")))?;
            Ok((w, h, "tiff"))
        }
        Err(e) => Err(match format {
            None => ImgconvError::unsupported_format("unknown"),
            Some(_) => ImgconvError::decode_failed(format!("header read failed: {e}")),
        }),
    }
}

/// Check if image dimensions are within safe limits.
/// Returns an error if the image is too large (potential decompression bomb).
pub fn check_dimensions(width: u32, height: u32) -> EngineResult<()> {
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(ImgconvError::dimension_exceeds_limit(
            width.max(height),
            MAX_DIMENSION,
        ));
    }
    let pixels = width as u64 * height as u64;
    if pixels > MAX_PIXELS {
        return Err(ImgconvError::pixel_count_exceeds_limit(pixels, MAX_PIXELS));
    }
    Ok(())
}

/// Inspect encoded bytes and ensure the image dimensions are safe before decoding.
pub fn ensure_dimensions_safe(bytes: &[u8]) -> EngineResult<()> {
    let cursor = Cursor::new(bytes);
    if let Ok(reader) = ImageReader::new(cursor).with_guessed_format() {
        if let Ok((width, height)) = reader.into_dimensions() {
            return check_dimensions(width, height);
        }
    }
    Ok(())
}

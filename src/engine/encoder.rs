// src/engine/encoder.rs
//
// Encoder operations: one function per container format, plus the
// background flatten that runs before any of them.

use crate::engine::buffer::PixelBuffer;
use crate::engine::common::{run_with_panic_policy, EngineResult};
use crate::engine::pool::Parallel;
use crate::engine::watermark::draw_over;
use crate::error::ImgconvError;
use crate::ops::{Format, FormatOptions, GifOptions, PngCompression, TiffCompression};
use color_quant::NeuQuant;
use image::codecs::bmp::BmpEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ExtendedColorType, ImageEncoder};
use mozjpeg::{ColorSpace, Compress};
use std::io::Cursor;

const OPAQUE_BLACK: [u8; 4] = [0, 0, 0, 255];

/// Encode `img` as described by `opts`.
///
/// With a background set, the image is composited over it first. Formats
/// without an alpha channel (JPEG, PDF) otherwise get a translucent image
/// composited over opaque black, so hidden color under zero alpha never
/// shows up in the output.
pub fn encode(img: &PixelBuffer, opts: &FormatOptions, parallel: &Parallel) -> EngineResult<Vec<u8>> {
    let flattened;
    let img = match opts.background {
        Some(color) => {
            flattened = flatten(img, color, parallel);
            &flattened
        }
        None if !opts.format.supports_alpha() && !img.is_opaque() => {
            flattened = flatten(img, OPAQUE_BLACK, parallel);
            &flattened
        }
        None => img,
    };

    let bytes = match opts.format {
        Format::Jpeg => encode_jpeg(img, opts.quality)?,
        Format::Png => encode_png(img, opts.png_compression)?,
        Format::Gif => encode_gif(img, &opts.gif)?,
        Format::Tiff => encode_tiff(img, opts.tiff_compression)?,
        Format::Bmp => encode_bmp(img)?,
        Format::Pdf => encode_pdf(img, opts.quality)?,
    };
    tracing::debug!(
        format = opts.format.name(),
        width = img.width(),
        height = img.height(),
        bytes = bytes.len(),
        "encoded"
    );
    Ok(bytes)
}

/// Composite `img` over a solid `color`.
pub fn flatten(img: &PixelBuffer, color: [u8; 4], parallel: &Parallel) -> PixelBuffer {
    let mut out = PixelBuffer::filled(img.width(), img.height(), color);
    draw_over(&mut out, img, (0, 0), 255, parallel);
    out
}

/// Packed RGB rows without alpha.
fn rgb_bytes(img: &PixelBuffer) -> Vec<u8> {
    let (w, h) = img.dimensions();
    let mut out = Vec::with_capacity(w as usize * h as usize * 3);
    for y in 0..h {
        for px in img.row(y).chunks_exact(4) {
            out.extend_from_slice(&px[..3]);
        }
    }
    out
}

/// Packed RGBA rows with any stride padding removed.
fn rgba_bytes(img: &PixelBuffer) -> Vec<u8> {
    let (w, h) = img.dimensions();
    if img.stride() == w as usize * 4 {
        return img.as_raw()[..w as usize * h as usize * 4].to_vec();
    }
    let mut out = Vec::with_capacity(w as usize * h as usize * 4);
    for y in 0..h {
        out.extend_from_slice(img.row(y));
    }
    out
}

fn encode_err(format: &'static str) -> impl Fn(String) -> ImgconvError {
    move |message| ImgconvError::encode_failed(format, message)
}

/// Encode to JPEG using mozjpeg. Alpha is dropped.
pub fn encode_jpeg(img: &PixelBuffer, quality: u8) -> EngineResult<Vec<u8>> {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return Err(ImgconvError::encode_failed("jpeg", "image has no pixels"));
    }
    let rgb = rgb_bytes(img);

    run_with_panic_policy("encode:jpeg", || {
        let err = encode_err("jpeg");
        let mut comp = Compress::new(ColorSpace::JCS_RGB);
        comp.set_size(w as usize, h as usize);
        comp.set_color_space(ColorSpace::JCS_YCbCr);
        comp.set_quality(quality as f32);
        comp.set_optimize_coding(true);

        let mut output = Vec::new();
        {
            let mut writer = comp
                .start_compress(&mut output)
                .map_err(|e| err(format!("mozjpeg: failed to start compress: {e:?}")))?;
            writer
                .write_scanlines(&rgb)
                .map_err(|e| err(format!("mozjpeg: failed to write scanlines: {e:?}")))?;
            writer
                .finish()
                .map_err(|e| err(format!("mozjpeg: failed to finish: {e:?}")))?;
        }
        Ok(output)
    })
}

/// Encode to PNG with the image crate. `Best` runs the result through
/// oxipng afterwards.
pub fn encode_png(img: &PixelBuffer, compression: PngCompression) -> EngineResult<Vec<u8>> {
    let (w, h) = img.dimensions();
    let (level, filter) = match compression {
        PngCompression::Default => (CompressionType::Default, FilterType::Adaptive),
        PngCompression::Fast => (CompressionType::Fast, FilterType::NoFilter),
        PngCompression::Best => (CompressionType::Best, FilterType::Adaptive),
    };

    let buf = run_with_panic_policy("encode:png", || {
        let mut buf = Vec::new();
        let encoder = PngEncoder::new_with_quality(&mut buf, level, filter);
        let result = if img.is_opaque() {
            encoder.write_image(&rgb_bytes(img), w, h, ExtendedColorType::Rgb8)
        } else {
            encoder.write_image(&rgba_bytes(img), w, h, ExtendedColorType::Rgba8)
        };
        result.map_err(|e| ImgconvError::encode_failed("png", e.to_string()))?;
        Ok(buf)
    })?;

    if compression != PngCompression::Best {
        return Ok(buf);
    }
    run_with_panic_policy("encode:png:oxipng", || {
        let mut options = oxipng::Options::from_preset(4);
        // Metadata stays; only the deflate stream is re-optimized.
        options.strip = oxipng::StripChunks::None;
        oxipng::optimize_from_memory(&buf, &options).map_err(|e| {
            ImgconvError::encode_failed("png", format!("oxipng optimization failed: {e}"))
        })
    })
}

/// Encode to a single-frame GIF. The palette comes from NeuQuant; pixels
/// are mapped to it directly or with Floyd-Steinberg error diffusion.
pub fn encode_gif(img: &PixelBuffer, opts: &GifOptions) -> EngineResult<Vec<u8>> {
    let (w, h) = img.dimensions();
    let (gw, gh) = match (u16::try_from(w), u16::try_from(h)) {
        (Ok(gw), Ok(gh)) if gw > 0 && gh > 0 => (gw, gh),
        _ => {
            return Err(ImgconvError::encode_failed(
                "gif",
                format!("{w}x{h} does not fit a GIF logical screen"),
            ))
        }
    };

    run_with_panic_policy("encode:gif", || {
        let err = encode_err("gif");
        let rgba = rgba_bytes(img);
        // NeuQuant needs at least two network entries.
        let colors = (opts.num_colors as usize).clamp(2, 256);
        let quantizer = NeuQuant::new(10, colors, &rgba);
        let indices = if opts.dither {
            dither_indices(&rgba, w as usize, &quantizer)
        } else {
            rgba.chunks_exact(4)
                .map(|px| quantizer.index_of(px) as u8)
                .collect()
        };

        let palette_rgba = quantizer.color_map_rgba();
        let transparent = palette_rgba
            .chunks_exact(4)
            .enumerate()
            .min_by_key(|(_, c)| c[3])
            .filter(|(_, c)| c[3] < 128)
            .map(|(i, _)| i as u8);

        let frame = gif::Frame {
            width: gw,
            height: gh,
            buffer: indices.into(),
            palette: Some(quantizer.color_map_rgb()),
            transparent,
            ..gif::Frame::default()
        };

        let mut out = Vec::new();
        {
            let mut encoder =
                gif::Encoder::new(&mut out, gw, gh, &[]).map_err(|e| err(e.to_string()))?;
            encoder.write_frame(&frame).map_err(|e| err(e.to_string()))?;
        }
        Ok(out)
    })
}

/// Palette indices with Floyd-Steinberg error diffusion over all four
/// channels.
fn dither_indices(rgba: &[u8], width: usize, quantizer: &NeuQuant) -> Vec<u8> {
    let mut indices = Vec::with_capacity(rgba.len() / 4);
    // Error carried into the current and next row, one slot of padding on
    // each side.
    let mut cur = vec![[0i32; 4]; width + 2];
    let mut next = vec![[0i32; 4]; width + 2];

    for row in rgba.chunks_exact(width * 4) {
        for (x, px) in row.chunks_exact(4).enumerate() {
            let mut want = [0u8; 4];
            for c in 0..4 {
                want[c] = (px[c] as i32 + cur[x + 1][c] / 16).clamp(0, 255) as u8;
            }
            let idx = quantizer.index_of(&want);
            indices.push(idx as u8);

            let got = quantizer.lookup(idx).unwrap_or(want);
            for c in 0..4 {
                let e = want[c] as i32 - got[c] as i32;
                cur[x + 2][c] += e * 7;
                next[x][c] += e * 3;
                next[x + 1][c] += e * 5;
                next[x + 2][c] += e;
            }
        }
        std::mem::swap(&mut cur, &mut next);
        next.iter_mut().for_each(|e| *e = [0; 4]);
    }
    indices
}

/// Encode to RGBA TIFF with the selected compression.
pub fn encode_tiff(img: &PixelBuffer, compression: TiffCompression) -> EngineResult<Vec<u8>> {
    use tiff::encoder::{colortype, compression as c, TiffEncoder};

    let (w, h) = img.dimensions();
    let data = rgba_bytes(img);
    run_with_panic_policy("encode:tiff", || {
        let err = |e: tiff::TiffError| ImgconvError::encode_failed("tiff", e.to_string());
        let mut out = Vec::new();
        {
            let mut encoder = TiffEncoder::new(Cursor::new(&mut out)).map_err(err)?;
            match compression {
                TiffCompression::Uncompressed => encoder
                    .write_image_with_compression::<colortype::RGBA8, _>(w, h, c::Uncompressed, &data),
                TiffCompression::Lzw => encoder
                    .write_image_with_compression::<colortype::RGBA8, _>(w, h, c::Lzw, &data),
                TiffCompression::Deflate => encoder
                    .write_image_with_compression::<colortype::RGBA8, _>(w, h, c::Deflate::default(), &data),
                TiffCompression::PackBits => encoder
                    .write_image_with_compression::<colortype::RGBA8, _>(w, h, c::Packbits, &data),
            }
            .map_err(err)?;
        }
        Ok(out)
    })
}

/// Encode to BMP: 24-bit when opaque, 32-bit otherwise.
pub fn encode_bmp(img: &PixelBuffer) -> EngineResult<Vec<u8>> {
    let (w, h) = img.dimensions();
    run_with_panic_policy("encode:bmp", || {
        let mut out = Vec::new();
        let encoder = BmpEncoder::new(&mut out);
        let result = if img.is_opaque() {
            encoder.write_image(&rgb_bytes(img), w, h, ExtendedColorType::Rgb8)
        } else {
            encoder.write_image(&rgba_bytes(img), w, h, ExtendedColorType::Rgba8)
        };
        result.map_err(|e| ImgconvError::encode_failed("bmp", e.to_string()))?;
        Ok(out)
    })
}

/// Single-page PDF whose page is the image, embedded as a JPEG at
/// `quality`. The page is sized one point per pixel.
pub fn encode_pdf(img: &PixelBuffer, quality: u8) -> EngineResult<Vec<u8>> {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    let jpeg = encode_jpeg(img, quality)?;
    let (w, h) = (img.width() as i64, img.height() as i64);

    run_with_panic_policy("encode:pdf", || {
        let err = encode_err("pdf");
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let mut image = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => w,
                "Height" => h,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            jpeg,
        );
        image.allows_compression = false;
        let image_id = doc.add_object(image);

        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![w.into(), 0.into(), 0.into(), h.into(), 0.into(), 0.into()],
                ),
                Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let content = content.encode().map_err(|e| err(e.to_string()))?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, content));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), w.into(), h.into()],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im0" => image_id },
            },
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut out = Vec::new();
        doc.save_to(&mut out).map_err(|e| err(e.to_string()))?;
        Ok(out)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::decoder::decode;

    fn create_test_image(width: u32, height: u32) -> PixelBuffer {
        let mut img = PixelBuffer::new(width, height);
        for y in 0..height {
            for x in 0..width {
                img.put_pixel(x, y, [(x * 7) as u8, (y * 5) as u8, 90, 255]);
            }
        }
        img
    }

    fn decoded_buffer(bytes: &[u8]) -> PixelBuffer {
        decode(bytes)
            .unwrap()
            .image
            .into_pixel_buffer(&Parallel::serial())
    }

    mod flatten_tests {
        use super::*;

        #[test]
        fn test_flatten_transparent_onto_white() {
            let img = PixelBuffer::filled(2, 2, [10, 20, 30, 0]);
            let out = flatten(&img, [255, 255, 255, 255], &Parallel::serial());
            assert_eq!(out.pixel(1, 1), [255, 255, 255, 255]);
        }

        #[test]
        fn test_flatten_keeps_opaque_pixels() {
            let img = PixelBuffer::filled(2, 2, [10, 20, 30, 255]);
            let out = flatten(&img, [255, 255, 255, 255], &Parallel::serial());
            assert_eq!(out.pixel(0, 0), [10, 20, 30, 255]);
            assert!(out.is_opaque());
        }

        #[test]
        fn test_background_option_applies_before_encode() {
            let img = PixelBuffer::filled(3, 3, [0, 0, 0, 0]);
            let opts = FormatOptions::new(Format::Png).with_background([255, 0, 0, 255]);
            let back = decoded_buffer(&encode(&img, &opts, &Parallel::serial()).unwrap());
            assert_eq!(back.pixel(1, 1), [255, 0, 0, 255]);
        }

        #[test]
        fn test_background_flatten_honors_serial_cap() {
            let mut img = create_test_image(33, 17);
            img.put_pixel(4, 4, [0, 0, 0, 0]);
            let opts = FormatOptions::new(Format::Bmp).with_background([255, 255, 255, 255]);
            let serial = encode(&img, &opts, &Parallel::serial()).unwrap();
            let wide = encode(&img, &opts, &Parallel::with_max_workers(4)).unwrap();
            assert_eq!(serial, wide);
            let back = decoded_buffer(&serial);
            assert_eq!(back.pixel(4, 4), [255, 255, 255, 255]);
            assert!(back.is_opaque());
        }

        #[test]
        fn test_hidden_color_is_black_without_alpha_channel() {
            let img = PixelBuffer::filled(8, 8, [255, 0, 0, 0]);
            let opts = FormatOptions::new(Format::Jpeg);
            let back = decoded_buffer(&encode(&img, &opts, &Parallel::serial()).unwrap());
            let px = back.pixel(4, 4);
            assert!(px[0] <= 8 && px[1] <= 8 && px[2] <= 8, "{px:?}");
        }

        #[test]
        fn test_half_alpha_is_darkened_without_alpha_channel() {
            let img = PixelBuffer::filled(8, 8, [200, 200, 200, 128]);
            let opts = FormatOptions::new(Format::Jpeg).with_quality(100);
            let back = decoded_buffer(&encode(&img, &opts, &Parallel::serial()).unwrap());
            let px = back.pixel(4, 4);
            assert!(px[0].abs_diff(100) <= 4, "{px:?}");
        }

        #[test]
        fn test_alpha_formats_keep_hidden_color() {
            let img = PixelBuffer::filled(2, 2, [255, 0, 0, 0]);
            let opts = FormatOptions::new(Format::Png);
            let back = decoded_buffer(&encode(&img, &opts, &Parallel::serial()).unwrap());
            assert_eq!(back.pixel(1, 1), [255, 0, 0, 0]);
        }
    }

    mod lossless_tests {
        use super::*;

        #[test]
        fn test_png_preserves_rgba() {
            let mut img = create_test_image(9, 4);
            img.put_pixel(2, 2, [1, 2, 3, 4]);
            for level in [PngCompression::Default, PngCompression::Fast] {
                let back = decoded_buffer(&encode_png(&img, level).unwrap());
                assert_eq!(back.as_raw(), img.as_raw());
            }
        }

        #[test]
        fn test_png_best_runs_oxipng() {
            let img = create_test_image(16, 16);
            let best = encode_png(&img, PngCompression::Best).unwrap();
            let back = decoded_buffer(&best);
            assert_eq!(back.as_raw(), img.as_raw());
        }

        #[test]
        fn test_bmp_preserves_rgba() {
            let mut img = create_test_image(5, 3);
            let back = decoded_buffer(&encode_bmp(&img).unwrap());
            assert_eq!(back.as_raw(), img.as_raw());
            img.put_pixel(0, 0, [9, 9, 9, 100]);
            let back = decoded_buffer(&encode_bmp(&img).unwrap());
            assert_eq!(back.pixel(0, 0), [9, 9, 9, 100]);
        }

        #[test]
        fn test_tiff_every_compression_round_trips() {
            let mut img = create_test_image(6, 6);
            img.put_pixel(5, 5, [200, 100, 50, 25]);
            for c in [
                TiffCompression::Uncompressed,
                TiffCompression::Lzw,
                TiffCompression::Deflate,
                TiffCompression::PackBits,
            ] {
                let bytes = encode_tiff(&img, c).unwrap();
                assert!(bytes.starts_with(b"II*\0") || bytes.starts_with(b"MM\0*"));
                let back = decoded_buffer(&bytes);
                assert_eq!(back.as_raw(), img.as_raw(), "{c:?}");
            }
        }
    }

    mod lossy_tests {
        use super::*;

        #[test]
        fn test_jpeg_keeps_bounds() {
            let img = create_test_image(17, 9);
            let bytes = encode_jpeg(&img, 90).unwrap();
            assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
            assert_eq!(decoded_buffer(&bytes).dimensions(), (17, 9));
        }

        #[test]
        fn test_jpeg_rejects_empty_image() {
            assert!(encode_jpeg(&PixelBuffer::new(0, 0), 75).is_err());
        }

        #[test]
        fn test_gif_palette_size_and_bounds() {
            let img = create_test_image(12, 7);
            for dither in [false, true] {
                let opts = GifOptions { num_colors: 16, dither };
                let bytes = encode_gif(&img, &opts).unwrap();
                assert!(bytes.starts_with(b"GIF89a"));
                assert_eq!(decoded_buffer(&bytes).dimensions(), (12, 7));
            }
        }

        #[test]
        fn test_gif_single_color() {
            let img = PixelBuffer::filled(4, 4, [40, 80, 120, 255]);
            let opts = GifOptions { num_colors: 1, dither: false };
            let back = decoded_buffer(&encode_gif(&img, &opts).unwrap());
            let px = back.pixel(2, 2);
            assert!(px[0].abs_diff(40) <= 2 && px[1].abs_diff(80) <= 2 && px[2].abs_diff(120) <= 2);
        }

        #[test]
        fn test_pdf_wraps_jpeg_page() {
            let img = create_test_image(20, 10);
            let bytes = encode_pdf(&img, 80).unwrap();
            assert!(bytes.starts_with(b"%PDF-1.5"));
            let doc = lopdf::Document::load_mem(&bytes).unwrap();
            assert_eq!(doc.get_pages().len(), 1);
        }
    }
}

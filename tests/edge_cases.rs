// tests/edge_cases.rs
//
// Edge case tests for imgconv
// Tests boundary values, invalid inputs, and error handling

use imgconv::engine::{
    check_dimensions, decode, decode_config, resize, rotate, split, split_rects, to_gray,
    watermark_with_rng, PixelBuffer, Rect, ScanRegion, Scanner, SplitMode, WatermarkOptions,
    LANCZOS, MAX_DIMENSION,
};
use imgconv::{Format, FormatOptions, GifOptions, ImgconvError, Parallel, SourceImage};
use rand::rngs::StdRng;
use rand::SeedableRng;

// Helper function to create test images
fn create_test_image(width: u32, height: u32) -> PixelBuffer {
    let mut img = PixelBuffer::new(width, height);
    for y in 0..height {
        for x in 0..width {
            img.put_pixel(x, y, [(x % 256) as u8, (y % 256) as u8, 128, 255]);
        }
    }
    img
}

mod minimal_image_tests {
    use super::*;

    #[test]
    fn test_1x1_resize_up() {
        let img = PixelBuffer::filled(1, 1, [9, 8, 7, 255]);
        let out = resize(&img, 100, 100, &LANCZOS, &Parallel::default());
        assert_eq!(out.dimensions(), (100, 100));
        assert_eq!(out.pixel(50, 50), [9, 8, 7, 255]);
    }

    #[test]
    fn test_1x1_rotate_odd_angle() {
        let img = PixelBuffer::filled(1, 1, [0, 0, 0, 255]);
        let out = rotate(&img, 45.0, [0, 0, 0, 0], &Parallel::default());
        assert!(!out.is_empty());
    }

    #[test]
    fn test_1x1_encode_every_format() {
        let img = PixelBuffer::filled(1, 1, [1, 2, 3, 255]);
        for format in Format::ALL {
            let bytes = FormatOptions::new(format).encode_to_vec(&img).unwrap();
            assert!(!bytes.is_empty(), "{format}");
        }
    }
}

mod degenerate_geometry_tests {
    use super::*;

    #[test]
    fn test_negative_or_zero_resize_is_empty() {
        let img = create_test_image(10, 10);
        let par = Parallel::default();
        assert!(resize(&img, -1, 10, &LANCZOS, &par).is_empty());
        assert!(resize(&img, 10, -1, &LANCZOS, &par).is_empty());
        assert!(resize(&img, 0, 0, &LANCZOS, &par).is_empty());
    }

    #[test]
    fn test_resize_of_empty_image_is_empty() {
        let out = resize(&PixelBuffer::new(0, 0), 10, 10, &LANCZOS, &Parallel::default());
        assert!(out.is_empty());
    }

    #[test]
    fn test_fully_transparent_resize_stays_transparent() {
        let img = PixelBuffer::filled(8, 8, [255, 255, 255, 0]);
        let out = resize(&img, 3, 3, &LANCZOS, &Parallel::default());
        assert_eq!(out.pixel(1, 1), [0, 0, 0, 0]);
    }

    #[test]
    fn test_split_more_parts_than_pixels() {
        let img = create_test_image(3, 3);
        let err = split(&img, 4, SplitMode::Vertical).unwrap_err();
        assert!(matches!(err, ImgconvError::SplitFailed { .. }));
        assert!(split_rects(Rect::from_size(3, 3), 4, SplitMode::Vertical).is_empty());
    }

    #[test]
    fn test_watermark_outside_base_is_clipped() {
        let base = create_test_image(10, 10);
        let mark = WatermarkOptions::new(PixelBuffer::filled(4, 4, [0, 0, 0, 255]), 255)
            .with_offset(100, 100);
        let mut rng = StdRng::seed_from_u64(1);
        let out = watermark_with_rng(&base, &mark, &mut rng, &Parallel::default());
        assert_eq!(out, base);
    }

    #[test]
    fn test_random_watermark_larger_than_base() {
        let base = create_test_image(12, 12);
        let mark = WatermarkOptions::new(PixelBuffer::filled(40, 40, [0, 0, 0, 255]), 200)
            .with_random(true);
        for seed in 0..8 {
            let mut rng = StdRng::seed_from_u64(seed);
            let out = watermark_with_rng(&base, &mark, &mut rng, &Parallel::default());
            assert_eq!(out.dimensions(), (12, 12));
        }
    }
}

mod invalid_input_tests {
    use super::*;

    #[test]
    fn test_decode_empty_input() {
        assert!(decode(&[]).is_err());
        assert!(decode_config(&[]).is_err());
    }

    #[test]
    fn test_decode_truncated_jpeg() {
        let jpeg = FormatOptions::new(Format::Jpeg)
            .encode_to_vec(&create_test_image(32, 32))
            .unwrap();
        assert!(decode(&jpeg[..jpeg.len() / 3]).is_err());
    }

    #[test]
    fn test_decode_tiff_header_only() {
        let err = decode(b"II*\0\x08\0\0\0").unwrap_err();
        assert!(matches!(
            err,
            ImgconvError::DecodeFailed { .. } | ImgconvError::UnsupportedFormat { .. }
        ));
    }

    #[test]
    fn test_encode_rejects_bad_parameters() {
        let img = create_test_image(4, 4);
        let bad_quality = FormatOptions::new(Format::Pdf).with_quality(101);
        assert!(bad_quality.encode_to_vec(&img).is_err());
        let bad_gif = FormatOptions::new(Format::Gif).with_gif(GifOptions {
            num_colors: 300,
            dither: true,
        });
        assert!(matches!(
            bad_gif.encode_to_vec(&img),
            Err(ImgconvError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_encode_empty_image_fails() {
        let empty = PixelBuffer::new(0, 0);
        assert!(FormatOptions::new(Format::Jpeg).encode_to_vec(&empty).is_err());
        assert!(FormatOptions::new(Format::Gif).encode_to_vec(&empty).is_err());
    }

    #[test]
    fn test_unknown_extension() {
        let err = "webp".parse::<Format>().unwrap_err();
        assert!(matches!(err, ImgconvError::UnsupportedFormat { .. }));
        assert_eq!(err.category(), imgconv::ErrorCategory::CodecError);
    }
}

mod tiff_fallback_tests {
    use super::*;

    const SHORT: u16 = 3;
    const LONG: u16 = 4;

    fn entry(out: &mut Vec<u8>, tag: u16, kind: u16, count: u32, value: [u8; 4]) {
        out.extend_from_slice(&tag.to_le_bytes());
        out.extend_from_slice(&kind.to_le_bytes());
        out.extend_from_slice(&count.to_le_bytes());
        out.extend_from_slice(&value);
    }

    fn short(v: u16) -> [u8; 4] {
        let [a, b] = v.to_le_bytes();
        [a, b, 0, 0]
    }

    /// Uncompressed little-endian TIFF with YCbCr photometric and one
    /// interleaved Y, Cb, Cr triple per pixel.
    fn ycbcr_tiff(width: u16, height: u16, samples: &[u8], subsampling: Option<[u16; 2]>) -> Vec<u8> {
        let entries = if subsampling.is_some() { 10 } else { 9 };
        let data_offset = 8 + 2 + entries * 12 + 4;

        let mut out = b"II*\0".to_vec();
        out.extend_from_slice(&8u32.to_le_bytes());
        out.extend_from_slice(&(entries as u16).to_le_bytes());
        entry(&mut out, 256, SHORT, 1, short(width));
        entry(&mut out, 257, SHORT, 1, short(height));
        entry(&mut out, 258, SHORT, 1, short(8));
        entry(&mut out, 259, SHORT, 1, short(1));
        entry(&mut out, 262, SHORT, 1, short(6));
        entry(&mut out, 273, LONG, 1, (data_offset as u32).to_le_bytes());
        entry(&mut out, 277, SHORT, 1, short(3));
        entry(&mut out, 278, SHORT, 1, short(height));
        entry(&mut out, 279, LONG, 1, (samples.len() as u32).to_le_bytes());
        if let Some([h, v]) = subsampling {
            let ([a, b], [c, d]) = (h.to_le_bytes(), v.to_le_bytes());
            entry(&mut out, 530, SHORT, 2, [a, b, c, d]);
        }
        out.extend_from_slice(&0u32.to_le_bytes());
        assert_eq!(out.len(), data_offset);
        out.extend_from_slice(samples);
        out
    }

    #[test]
    fn test_strictly_rejected_tiff_decodes_permissively() {
        let samples = [200, 128, 128, 50, 128, 128, 0, 128, 128, 255, 128, 128];
        let bytes = ycbcr_tiff(2, 2, &samples, Some([1, 1]));
        assert!(image::load_from_memory(&bytes).is_err());

        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.format, "tiff");
        assert!(matches!(decoded.image, SourceImage::YCbCr(_)));
        let buf = decoded.image.into_pixel_buffer(&Parallel::default());
        assert_eq!(buf.pixel(0, 0), [200, 200, 200, 255]);
        assert_eq!(buf.pixel(1, 0), [50, 50, 50, 255]);
        assert_eq!(buf.pixel(1, 1), [255, 255, 255, 255]);
        assert_eq!(decode_config(&bytes).unwrap(), (2, 2, "tiff"));
    }

    #[test]
    fn test_permissive_retry_still_fails_on_unhandled_layout() {
        let samples = [200, 128, 128, 50, 128, 128];
        let err = decode(&ycbcr_tiff(2, 1, &samples, None)).unwrap_err();
        assert!(matches!(err, ImgconvError::DecodeFailed { .. }));
    }
}

mod limit_tests {
    use super::*;

    #[test]
    fn test_dimension_boundaries() {
        assert!(check_dimensions(MAX_DIMENSION, 1000).is_ok());
        let err = check_dimensions(MAX_DIMENSION + 1, 1).unwrap_err();
        assert!(matches!(err, ImgconvError::DimensionExceedsLimit { .. }));
        assert!(err.is_recoverable());
        let err = check_dimensions(20_000, 20_000).unwrap_err();
        assert!(matches!(err, ImgconvError::PixelCountExceedsLimit { .. }));
    }
}

mod layout_tests {
    use super::*;

    #[test]
    fn test_gray_scans_as_opaque_rgb() {
        let gray = to_gray(&create_test_image(5, 5), &Parallel::default());
        let mut row = vec![0u8; 5 * 4];
        Scanner::new(&gray).scan(0, 2, 5, 3, &mut row);
        for px in row.chunks_exact(4) {
            assert_eq!(px[0], px[1]);
            assert_eq!(px[1], px[2]);
            assert_eq!(px[3], 255);
        }
    }

    #[test]
    fn test_padded_stride_buffer_encodes() {
        let mut pix = vec![0u8; 3 * 40];
        for y in 0..3 {
            for x in 0..8 {
                pix[y * 40 + x * 4..y * 40 + x * 4 + 4].copy_from_slice(&[7, 7, 7, 255]);
            }
        }
        let img = PixelBuffer::from_raw_with_stride(8, 3, 40, pix).unwrap();
        let bytes = FormatOptions::new(Format::Png).encode_to_vec(&img).unwrap();
        let back = decode(&bytes).unwrap().image;
        assert_eq!(back.dimensions(), (8, 3));
        match back {
            SourceImage::Nrgba(b) => assert_eq!(b.pixel(7, 2), [7, 7, 7, 255]),
            other => panic!("unexpected layout {other:?}"),
        }
    }
}

use imgconv::engine::transform::{
    flip_h, flip_v, rotate, rotate180, rotate270, rotate90, rotated_size, transpose, transverse,
};
use imgconv::engine::{
    resize, split_rects, target_size, PixelBuffer, Rect, SplitMode, LANCZOS,
};
use imgconv::{Format, FormatOptions, Parallel};
use proptest::prelude::*;

fn create_test_image(width: u32, height: u32) -> PixelBuffer {
    let mut img = PixelBuffer::new(width, height);
    for y in 0..height {
        for x in 0..width {
            img.put_pixel(x, y, [(x % 256) as u8, (y % 256) as u8, 128, (x * y % 256) as u8]);
        }
    }
    img
}

fn dims_strategy() -> impl Strategy<Value = (u32, u32)> {
    (1u32..=48, 1u32..=48)
}

fn workers_strategy() -> impl Strategy<Value = Parallel> {
    (0usize..=4).prop_map(Parallel::with_max_workers)
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_resize_hits_requested_size(
        (w, h) in dims_strategy(),
        tw in 1i32..=64,
        th in 1i32..=64,
        par in workers_strategy(),
    ) {
        let out = resize(&create_test_image(w, h), tw, th, &LANCZOS, &par);
        prop_assert_eq!(out.dimensions(), (tw as u32, th as u32));
    }

    #[test]
    fn prop_resize_zero_side_keeps_aspect((w, h) in dims_strategy(), tw in 1i32..=64) {
        let (dw, dh) = target_size(w, h, tw, 0).unwrap();
        prop_assert_eq!(dw, tw as u32);
        let expected = ((tw as f64 * h as f64 / w as f64) + 0.5).floor().max(1.0) as u32;
        prop_assert_eq!(dh, expected);
    }

    #[test]
    fn prop_resize_is_independent_of_worker_count(
        (w, h) in dims_strategy(),
        tw in 1i32..=40,
        th in 1i32..=40,
    ) {
        let img = create_test_image(w, h);
        let serial = resize(&img, tw, th, &LANCZOS, &Parallel::serial());
        let parallel = resize(&img, tw, th, &LANCZOS, &Parallel::with_max_workers(4));
        prop_assert_eq!(serial, parallel);
    }

    #[test]
    fn prop_resize_of_solid_color_is_solid((w, h) in dims_strategy(), tw in 1i32..=64, th in 1i32..=64) {
        let img = PixelBuffer::filled(w, h, [10, 120, 240, 255]);
        let out = resize(&img, tw, th, &LANCZOS, &Parallel::default());
        for y in 0..out.height() {
            for x in 0..out.width() {
                prop_assert_eq!(out.pixel(x, y), [10, 120, 240, 255]);
            }
        }
    }

    #[test]
    fn prop_quarter_turns_compose_to_identity((w, h) in dims_strategy(), par in workers_strategy()) {
        let img = create_test_image(w, h);
        let r = rotate90(&rotate90(&rotate90(&rotate90(&img, &par), &par), &par), &par);
        prop_assert_eq!(&r, &img);
        prop_assert_eq!(&rotate180(&rotate180(&img, &par), &par), &img);
        prop_assert_eq!(&rotate270(&rotate90(&img, &par), &par), &img);
    }

    #[test]
    fn prop_flips_are_involutions((w, h) in dims_strategy()) {
        let img = create_test_image(w, h);
        let par = Parallel::default();
        prop_assert_eq!(&flip_h(&flip_h(&img, &par), &par), &img);
        prop_assert_eq!(&flip_v(&flip_v(&img, &par), &par), &img);
        prop_assert_eq!(&transpose(&transpose(&img, &par), &par), &img);
        prop_assert_eq!(&transverse(&transverse(&img, &par), &par), &img);
    }

    #[test]
    fn prop_transpose_swaps_dimensions((w, h) in dims_strategy(), x in 0u32..48, y in 0u32..48) {
        let img = create_test_image(w, h);
        let t = transpose(&img, &Parallel::default());
        prop_assert_eq!(t.dimensions(), (h, w));
        let (x, y) = (x % w, y % h);
        prop_assert_eq!(t.pixel(y, x), img.pixel(x, y));
    }

    #[test]
    fn prop_rotate_matches_rotated_size((w, h) in dims_strategy(), angle in -720.0f64..720.0) {
        let img = create_test_image(w, h);
        let out = rotate(&img, angle, [0, 0, 0, 0], &Parallel::default());
        let a = angle - (angle / 360.0).floor() * 360.0;
        if a == 0.0 || a == 180.0 {
            prop_assert_eq!(out.dimensions(), (w, h));
        } else if a == 90.0 || a == 270.0 {
            prop_assert_eq!(out.dimensions(), (h, w));
        } else {
            prop_assert_eq!(out.dimensions(), rotated_size(w, h, a));
        }
    }

    #[test]
    fn prop_split_rects_tile_inside_bounds(
        x0 in -50i32..50,
        y0 in -50i32..50,
        (w, h) in dims_strategy(),
        n in 1i64..=8,
        vertical in any::<bool>(),
    ) {
        let bounds = Rect::new(x0, y0, x0 + w as i32, y0 + h as i32);
        let mode = if vertical { SplitMode::Vertical } else { SplitMode::Horizontal };
        let rects = split_rects(bounds, n, mode);
        let side = if vertical { h as i64 } else { w as i64 };
        if side / n == 0 {
            prop_assert!(rects.is_empty());
        } else {
            prop_assert_eq!(rects.len() as i64, n);
            for pair in rects.windows(2) {
                prop_assert_eq!(pair[0].width(), pair[1].width());
                prop_assert_eq!(pair[0].height(), pair[1].height());
            }
            for r in &rects {
                prop_assert_eq!(r.intersect(&bounds), *r);
            }
        }
    }

    #[test]
    fn prop_png_round_trip_is_exact((w, h) in (1u32..=16, 1u32..=16)) {
        let img = create_test_image(w, h);
        let bytes = FormatOptions::new(Format::Png).encode_to_vec(&img).unwrap();
        let back = imgconv::decode(&bytes).unwrap().image.into_pixel_buffer(&Parallel::default());
        prop_assert_eq!(back.as_raw(), img.as_raw());
    }
}

#![no_main]

use arbitrary::{Arbitrary, Unstructured};
use imgconv::engine::{
    flip_h, flip_v, resize, rotate, split, to_gray, transpose, watermark_with_rng, Scanner,
    SplitMode, WatermarkOptions, LANCZOS,
};
use imgconv::{Parallel, PixelBuffer};
use libfuzzer_sys::fuzz_target;
use rand::rngs::StdRng;
use rand::SeedableRng;

#[derive(Arbitrary, Debug)]
struct OperationSeed {
    kind: u8,
    a: i32,
    b: i32,
    angle: f32,
}

fn build_image(data: &[u8]) -> PixelBuffer {
    let width = data.first().copied().unwrap_or(0) as u32 % 64 + 1;
    let height = data.get(1).copied().unwrap_or(0) as u32 % 64 + 1;
    let mut img = PixelBuffer::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let i = ((y * width + x) * 4) as usize;
            let px = [0, 1, 2, 3].map(|c| data.get((i + c) % data.len()).copied().unwrap_or(0));
            img.put_pixel(x, y, px);
        }
    }
    img
}

fn apply(img: PixelBuffer, seed: &OperationSeed, par: &Parallel) -> PixelBuffer {
    match seed.kind % 8 {
        0 => resize(&img, seed.a % 128, seed.b % 128, &LANCZOS, par),
        1 if seed.angle.is_finite() => rotate(&img, seed.angle as f64, [0, 0, 0, 0], par),
        2 => flip_h(&img, par),
        3 => flip_v(&img, par),
        4 => transpose(&img, par),
        5 => {
            let gray = to_gray(&img, par);
            resize(&Scanner::new(&gray), img.width() as i32, 0, &LANCZOS, par)
        }
        6 => {
            let mark = WatermarkOptions::new(img.clone(), seed.a as u8).with_random(seed.b % 2 == 0);
            let mut rng = StdRng::seed_from_u64(seed.a as u64);
            watermark_with_rng(&img, &mark, &mut rng, par)
        }
        7 => split(&img, (seed.a % 5) as i64, SplitMode::Vertical)
            .ok()
            .and_then(|parts| parts.into_iter().next())
            .unwrap_or(img),
        _ => img,
    }
}

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    let mut unstructured = Unstructured::new(data);
    let seeds: Vec<OperationSeed> = match Vec::arbitrary(&mut unstructured) {
        Ok(v) => v,
        Err(_) => return,
    };

    let par = Parallel::with_max_workers(2);
    let mut img = build_image(data);
    for seed in seeds.iter().take(8) {
        img = apply(img, seed, &par);
        if img.is_empty() {
            break;
        }
    }
});

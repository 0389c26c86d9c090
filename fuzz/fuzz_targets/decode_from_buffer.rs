#![no_main]

use imgconv::{decode_config, decode_with, DecodeOptions, Parallel};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    let _ = decode_config(data);
    let opts = DecodeOptions {
        auto_orientation: true,
        parallel: Parallel::serial(),
    };
    if let Ok(decoded) = decode_with(data, &opts) {
        let (w, h) = decoded.image.dimensions();
        let buf = decoded.image.into_pixel_buffer(&Parallel::serial());
        assert_eq!(buf.dimensions(), (w, h));
    }
});

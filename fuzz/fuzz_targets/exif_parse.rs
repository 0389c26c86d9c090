#![no_main]

//! Fuzz target for the EXIF orientation reader.
//! Malformed input must come back as Unspecified, never panic.

use imgconv::engine::read_orientation_from_bytes;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let o = read_orientation_from_bytes(data);
    assert!(o.tag() <= 8);
});

// src/engine/common.rs
//
// Common utilities shared across engine modules.

use crate::error::ImgconvError;
use std::panic::{catch_unwind, AssertUnwindSafe};

pub type EngineResult<T> = std::result::Result<T, ImgconvError>;

/// Run a codec call, turning a panic inside third-party code into
/// `InternalPanic` so one bad file cannot take down a batch worker.
pub fn run_with_panic_policy<T, F>(stage: &'static str, f: F) -> EngineResult<T>
where
    F: FnOnce() -> EngineResult<T>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let detail = if let Some(s) = payload.downcast_ref::<&str>() {
                (*s).to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic payload".to_string()
            };
            tracing::error!(stage, %detail, "codec panicked");
            Err(ImgconvError::internal_panic(format!("{stage}: {detail}")))
        }
    }
}

/// Round and clamp an accumulated channel value into a byte.
#[inline]
pub(crate) fn clamp(x: f64) -> u8 {
    let v = (x + 0.5) as i64;
    if v > 255 {
        255
    } else if v > 0 {
        v as u8
    } else {
        0
    }
}

/// Reverse the order of 4-byte pixels in place.
pub(crate) fn reverse(pix: &mut [u8]) {
    if pix.len() <= 4 {
        return;
    }
    let mut i = 0;
    let mut j = pix.len() - 4;
    while i < j {
        for k in 0..4 {
            pix.swap(i + k, j + k);
        }
        i += 4;
        j -= 4;
    }
}

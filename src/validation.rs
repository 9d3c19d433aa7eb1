//! Frame validation before a buffer's layout is trusted.
//!
//! Some drivers silently fall back to a default format when the requested
//! one cannot be delivered, so every frame that is about to be persisted is
//! checked against the format negotiated at configure time.

use crate::error::{CameraError, Result};
use crate::traits::{Format, FrameBuffer};

/// Validates that a frame matches the expected format.
///
/// # Arguments
///
/// * `frame` - The frame to validate
/// * `expected` - Format negotiated when the camera was configured
///
/// # Errors
///
/// - `FormatMismatch` if width, height, or pixel format differ
/// - `LengthMismatch` if an uncompressed frame is shorter than `expected.size` bytes
/// - `Acquire` if the frame is empty
pub fn validate_frame(frame: &FrameBuffer, expected: &Format) -> Result<()> {
    if !frame.format().same_layout(expected) {
        return Err(CameraError::FormatMismatch {
            expected: expected.clone(),
            actual: frame.format().clone(),
        });
    }

    if frame.is_empty() {
        return Err(CameraError::Acquire(
            "driver delivered an empty frame".to_owned(),
        ));
    }

    // Compressed formats have no fixed size. Drivers may pad past the
    // image, so only a truncated frame is rejected.
    if expected.size != 0 && frame.len() < expected.size as usize {
        return Err(CameraError::LengthMismatch {
            expected: expected.size,
            actual: frame.len(),
        });
    }

    Ok(())
}

// SPDX-License-Identifier: GPL-3.0-only

//! Camera capture backend
//!
//! ```text
//! ┌──────────────────┐   acquire    ┌───────────────┐  publish  ┌─────────────┐
//! │ CaptureDevice    │ ───────────▶ │ CaptureWorker │ ────────▶ │ FrameBuffer │
//! │ (V4L2 / pattern) │              │ (own thread)  │           │ (one slot)  │
//! └──────────────────┘              └───────────────┘           └─────────────┘
//! ```
//!
//! The device lives on the capture thread; the only state shared with the
//! viewer is the [`FrameBuffer`].

pub mod capture_worker;
pub mod format_converters;
pub mod frame_buffer;
pub mod test_pattern;
pub mod types;
pub mod v4l2;

pub use capture_worker::{CaptureStats, CaptureWorker};
pub use frame_buffer::FrameBuffer;
pub use test_pattern::{TEST_PATTERN_SOURCE, TestPatternSource};
pub use types::*;
pub use v4l2::{V4l2Camera, list_cameras};

use crate::errors::CaptureResult;

/// Frame rate of the synthetic source
const TEST_PATTERN_FPS: u32 = 30;

/// Open the capture device named by `source`
///
/// `"test-pattern"` selects the synthetic source, anything else is handed
/// to V4L2 (`"0"` or `/dev/video0`).
pub fn open_device(source: &str, width: u32, height: u32) -> CaptureResult<Box<dyn CaptureDevice>> {
    if source.trim() == TEST_PATTERN_SOURCE {
        return Ok(Box::new(TestPatternSource::new(width, height, TEST_PATTERN_FPS)?));
    }
    Ok(Box::new(V4l2Camera::open(source, width, height)?))
}

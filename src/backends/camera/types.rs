// SPDX-License-Identifier: GPL-3.0-only

//! Shared types for camera backends

use crate::errors::CaptureResult;
use image::RgbImage;
use std::sync::Arc;
use std::time::Instant;

/// Bytes per pixel of the packed RGB layout every frame uses
pub const RGB_CHANNELS: u32 = 3;

/// A captured camera frame
///
/// Pixels are packed RGB8, row-major, without stride padding. The pixel data
/// sits behind an `Arc` and is never mutated after capture: cloning a frame
/// is cheap and a later capture can only replace the frame, not rewrite it.
/// Code that draws on a frame takes its own copy with [`Frame::to_rgb_image`].
#[derive(Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Packed RGB8 pixels (`width * height * 3` bytes)
    pub data: Arc<[u8]>,
    /// Per-device capture counter, starts at 0
    pub sequence: u64,
    /// When the frame was acquired
    pub captured_at: Instant,
}

impl Frame {
    /// Build a frame from packed RGB bytes
    ///
    /// Returns `None` when the buffer length does not match the dimensions.
    pub fn from_rgb(width: u32, height: u32, data: Vec<u8>, sequence: u64) -> Option<Self> {
        let expected = (width as usize) * (height as usize) * RGB_CHANNELS as usize;
        if width == 0 || height == 0 || data.len() != expected {
            return None;
        }
        Some(Self {
            width,
            height,
            data: Arc::from(data.into_boxed_slice()),
            sequence,
            captured_at: Instant::now(),
        })
    }

    /// Copy the pixels into a mutable image buffer
    pub fn to_rgb_image(&self) -> RgbImage {
        // Length is validated on construction
        RgbImage::from_raw(self.width, self.height, self.data.to_vec())
            .unwrap_or_else(|| RgbImage::new(self.width, self.height))
    }

    /// Row stride in bytes
    pub fn stride(&self) -> u32 {
        self.width * RGB_CHANNELS
    }

    /// RGB value at (x, y), clamped to the frame edges
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let x = x.min(self.width - 1);
        let y = y.min(self.height - 1);
        let idx = (y * self.stride() + x * RGB_CHANNELS) as usize;
        [self.data[idx], self.data[idx + 1], self.data[idx + 2]]
    }

    /// Age of the frame relative to `now`
    pub fn age(&self, now: Instant) -> std::time::Duration {
        now.saturating_duration_since(self.captured_at)
    }
}

impl PartialEq for Frame {
    fn eq(&self, other: &Self) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.sequence == other.sequence
            && self.data == other.data
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sequence", &self.sequence)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// A camera that frames can be pulled from
///
/// Implementations are moved onto the capture thread and used only from
/// there. `acquire_frame` may block for as long as the hardware needs to
/// produce the next frame.
pub trait CaptureDevice: Send {
    /// Human-readable description for logs
    fn describe(&self) -> String;

    /// Block until the next frame is available
    fn acquire_frame(&mut self) -> CaptureResult<Frame>;

    /// Stop streaming and close the device
    fn release(self: Box<Self>) {}
}

/// Camera found during enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraInfo {
    /// Index used on the command line (`/dev/videoN`)
    pub index: usize,
    /// Device node path
    pub path: String,
    /// Card name reported by the driver
    pub name: String,
    /// FourCC codes of the supported capture formats
    pub formats: Vec<String>,
}

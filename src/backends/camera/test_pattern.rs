// SPDX-License-Identifier: GPL-3.0-only

//! Synthetic camera producing scrolling colour bars
//!
//! Selected with `--camera test-pattern`. Useful on machines without a
//! webcam and for exercising the viewer end to end.

use super::types::{CaptureDevice, Frame};
use crate::errors::{CaptureError, CaptureResult};
use std::time::{Duration, Instant};
use tracing::debug;

/// Source name that selects this device
pub const TEST_PATTERN_SOURCE: &str = "test-pattern";

const BARS: [[u8; 3]; 8] = [
    [255, 255, 255],
    [255, 255, 0],
    [0, 255, 255],
    [0, 255, 0],
    [255, 0, 255],
    [255, 0, 0],
    [0, 0, 255],
    [16, 16, 16],
];

/// Paced generator of colour-bar frames
pub struct TestPatternSource {
    width: u32,
    height: u32,
    frame_interval: Duration,
    next_deadline: Option<Instant>,
    sequence: u64,
}

impl TestPatternSource {
    pub fn new(width: u32, height: u32, fps: u32) -> CaptureResult<Self> {
        if width == 0 || height == 0 || fps == 0 {
            return Err(CaptureError::OpenFailed(format!(
                "invalid test pattern geometry {}x{}@{}",
                width, height, fps
            )));
        }
        debug!(width, height, fps, "Creating test pattern source");
        Ok(Self {
            width,
            height,
            frame_interval: Duration::from_secs(1) / fps,
            next_deadline: None,
            sequence: 0,
        })
    }

    fn render(&self) -> Vec<u8> {
        let bar_width = (self.width / BARS.len() as u32).max(1);
        let shift = (self.sequence.wrapping_mul(4) % u64::from(self.width)) as u32;
        let mut data = Vec::with_capacity((self.width * self.height * 3) as usize);

        for y in 0..self.height {
            for x in 0..self.width {
                let bar = (((x + shift) % self.width) / bar_width) as usize % BARS.len();
                let [r, g, b] = BARS[bar];
                // Darken the bottom quarter so motion is visible in monochrome too
                if y > self.height * 3 / 4 {
                    data.extend_from_slice(&[r / 2, g / 2, b / 2]);
                } else {
                    data.extend_from_slice(&[r, g, b]);
                }
            }
        }
        data
    }
}

impl CaptureDevice for TestPatternSource {
    fn describe(&self) -> String {
        format!("test pattern {}x{}", self.width, self.height)
    }

    fn acquire_frame(&mut self) -> CaptureResult<Frame> {
        // Block like real hardware would until the next frame is due
        let now = Instant::now();
        let deadline = self.next_deadline.unwrap_or(now);
        if deadline > now {
            std::thread::sleep(deadline - now);
        }
        self.next_deadline = Some(deadline.max(now) + self.frame_interval);

        let frame = Frame::from_rgb(self.width, self.height, self.render(), self.sequence)
            .ok_or_else(|| CaptureError::Decode("test pattern size mismatch".to_string()))?;
        self.sequence += 1;
        Ok(frame)
    }
}

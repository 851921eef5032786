// SPDX-License-Identifier: GPL-3.0-only

//! Sink without a window
//!
//! Frames are counted and dropped. There is no window to close, so the
//! window state is `Unsupported` until an optional frame limit is reached.
//! An interrupt flag (set from a signal handler) is turned into a quit key.

use super::{Key, RenderSink, WindowState};
use crate::errors::{AppResult, ControlError};
use crate::pipeline::session::ConfidenceControl;
use image::RgbImage;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info};

pub struct HeadlessSink {
    control: ConfidenceControl,
    frames_shown: u64,
    max_frames: Option<u64>,
    interrupted: Arc<AtomicBool>,
    last_status: String,
}

impl HeadlessSink {
    pub fn new(initial_confidence: i32, max_frames: Option<u64>, interrupted: Arc<AtomicBool>) -> Self {
        Self {
            control: ConfidenceControl::new(initial_confidence),
            frames_shown: 0,
            max_frames,
            interrupted,
            last_status: String::new(),
        }
    }

    pub fn frames_shown(&self) -> u64 {
        self.frames_shown
    }
}

impl RenderSink for HeadlessSink {
    fn create_window(&mut self, name: &str, width: u32, height: u32) -> AppResult<()> {
        info!(window = name, width, height, max_frames = ?self.max_frames, "Running headless");
        Ok(())
    }

    fn show(&mut self, _name: &str, image: &RgbImage, status: &str) -> AppResult<()> {
        self.frames_shown += 1;
        if status != self.last_status {
            if !status.is_empty() {
                info!(status, "Status");
            }
            self.last_status = status.to_string();
        }
        debug!(
            frame = self.frames_shown,
            width = image.width(),
            height = image.height(),
            "Frame composed"
        );
        Ok(())
    }

    fn window_state(&self, _name: &str) -> WindowState {
        match self.max_frames {
            Some(max) if self.frames_shown >= max => WindowState::Closed,
            _ => WindowState::Unsupported,
        }
    }

    fn poll_key(&mut self, timeout: Duration) -> AppResult<Option<Key>> {
        if self.interrupted.load(Ordering::SeqCst) {
            return Ok(Some(Key::Interrupt));
        }
        std::thread::sleep(timeout);
        Ok(None)
    }

    fn confidence_value(&self) -> Result<i32, ControlError> {
        Ok(self.control.value())
    }

    fn adjust_confidence(&mut self, delta: i32) -> Result<i32, ControlError> {
        Ok(self.control.adjust(delta))
    }
}

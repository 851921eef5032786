// SPDX-License-Identifier: GPL-3.0-only

//! Background capture thread
//!
//! Owns the capture device for its whole life on a dedicated thread, pulls
//! frames as fast as the device delivers them and publishes each one into
//! the shared [`FrameBuffer`]. Read failures are absorbed here: the buffer
//! keeps its last good frame and the loop tries again.

use super::frame_buffer::FrameBuffer;
use super::types::CaptureDevice;
use crate::constants::{CAPTURE_FAILURE_LOG_INTERVAL, EMPTY_FRAME_BACKOFF};
use crate::errors::{CaptureError, CaptureResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, trace, warn};

/// Action returned by one loop iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopAction {
    Continue,
    Stop,
}

/// Counters updated by the capture thread
#[derive(Debug, Default)]
pub struct CaptureStats {
    frames: AtomicU64,
    failures: AtomicU64,
    consecutive_failures: AtomicU64,
}

impl CaptureStats {
    /// Frames successfully published
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    /// Failed acquisitions since start
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Failed acquisitions since the last good frame
    pub fn consecutive_failures(&self) -> u64 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }
}

/// Handle to the running capture thread
///
/// The thread hands the device back when it exits so the caller can release
/// it after the join, never while the thread might still be using it.
pub struct CaptureWorker {
    thread_handle: Option<JoinHandle<Box<dyn CaptureDevice>>>,
    stop_signal: Arc<AtomicBool>,
    stats: Arc<CaptureStats>,
    name: String,
}

impl CaptureWorker {
    /// Move `device` onto a new thread and start publishing into `buffer`
    pub fn start(
        name: &str,
        device: Box<dyn CaptureDevice>,
        buffer: Arc<FrameBuffer>,
    ) -> CaptureResult<Self> {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(CaptureStats::default());

        let thread_stop = Arc::clone(&stop_signal);
        let thread_stats = Arc::clone(&stats);
        let thread_name = name.to_string();

        info!(name = %name, device = %device.describe(), "Starting capture thread");

        let thread_handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || capture_loop(&thread_name, device, &buffer, &thread_stop, &thread_stats))
            .map_err(|e| CaptureError::OpenFailed(format!("failed to spawn capture thread: {}", e)))?;

        Ok(Self {
            thread_handle: Some(thread_handle),
            stop_signal,
            stats,
            name: name.to_string(),
        })
    }

    /// Whether the thread is still running
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Shared capture counters
    pub fn stats(&self) -> Arc<CaptureStats> {
        Arc::clone(&self.stats)
    }

    /// Ask the thread to exit after the current acquisition (non-blocking)
    pub fn request_stop(&self) {
        debug!(name = %self.name, "Requesting capture thread stop");
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Stop the thread, wait for it and take the device back
    ///
    /// Returns `None` if the thread was already joined or panicked.
    pub fn stop(&mut self) -> Option<Box<dyn CaptureDevice>> {
        self.request_stop();
        let handle = self.thread_handle.take()?;

        debug!(name = %self.name, "Waiting for capture thread to finish");
        match handle.join() {
            Ok(device) => {
                debug!(name = %self.name, "Capture thread finished");
                Some(device)
            }
            Err(e) => {
                warn!(name = %self.name, "Capture thread panicked: {:?}", e);
                None
            }
        }
    }
}

impl Drop for CaptureWorker {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            debug!(name = %self.name, "CaptureWorker dropped, stopping thread");
            if let Some(device) = self.stop() {
                device.release();
            }
        }
    }
}

fn capture_loop(
    name: &str,
    mut device: Box<dyn CaptureDevice>,
    buffer: &FrameBuffer,
    stop_signal: &AtomicBool,
    stats: &CaptureStats,
) -> Box<dyn CaptureDevice> {
    debug!(name = %name, "Capture thread started");

    loop {
        if stop_signal.load(Ordering::SeqCst) {
            debug!(name = %name, "Stop signal received");
            break;
        }

        match capture_once(name, device.as_mut(), buffer, stats) {
            LoopAction::Continue => {}
            LoopAction::Stop => break,
        }
    }

    info!(
        name = %name,
        frames = stats.frames(),
        failures = stats.failures(),
        "Capture thread exiting"
    );
    device
}

fn capture_once(
    name: &str,
    device: &mut dyn CaptureDevice,
    buffer: &FrameBuffer,
    stats: &CaptureStats,
) -> LoopAction {
    match device.acquire_frame() {
        Ok(frame) => {
            let previous_failures = stats.consecutive_failures.swap(0, Ordering::Relaxed);
            if previous_failures > 0 {
                info!(name = %name, previous_failures, "Capture recovered");
            }
            trace!(sequence = frame.sequence, "Publishing frame");
            buffer.publish(frame);
            stats.frames.fetch_add(1, Ordering::Relaxed);
            LoopAction::Continue
        }
        Err(CaptureError::Stopped) => {
            warn!(name = %name, "Device no longer available, capture thread stopping");
            LoopAction::Stop
        }
        Err(e) => {
            stats.failures.fetch_add(1, Ordering::Relaxed);
            let consecutive = stats.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
            if consecutive == 1 || consecutive % CAPTURE_FAILURE_LOG_INTERVAL == 0 {
                warn!(name = %name, error = %e, consecutive, "Failed to capture frame");
            }
            // Devices that fail instantly would otherwise spin this thread
            thread::sleep(EMPTY_FRAME_BACKOFF);
            LoopAction::Continue
        }
    }
}

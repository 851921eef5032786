// SPDX-License-Identifier: GPL-3.0-only

//! Foreground viewer loop
//!
//! One cycle: check the window, take the latest frame, detect and annotate,
//! update FPS, draw the status overlay, show, handle one key. The loop only
//! ever reads the frame buffer; it never waits on the capture thread.

use crate::annotator::{self, StatusOverlay};
use crate::backends::camera::{CaptureDevice, CaptureWorker, Frame, FrameBuffer};
use crate::config::Config;
use crate::constants::{
    DEFAULT_CAPTURE_HEIGHT, DEFAULT_CAPTURE_WIDTH, DEFAULT_IOU_THRESHOLD, EMPTY_FRAME_BACKOFF,
    KEY_POLL_TIMEOUT, STALE_FRAME_THRESHOLD, WARM_UP_ATTEMPTS, WINDOW_NAME, confidence,
};
use crate::display::{Command, RenderSink, WindowState};
use crate::errors::{AppResult, CaptureError};
use crate::frame_processor::DetectionAdapter;
use crate::pipeline::session::{SessionState, threshold_from_control};
use crate::pipeline::snapshot::SnapshotWriter;
use image::RgbImage;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

const CAPTURE_THREAD_NAME: &str = "capture";
const HELP_MESSAGE: &str = "'s' save | 'd' detection | +/- confidence | 'q' quit";

/// Why the loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Quit key or interrupt
    Quit,
    /// The sink reported its window closed
    WindowClosed,
}

/// Result of one cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cycle {
    /// A frame was shown
    Shown,
    /// No frame captured yet; slept briefly
    Idle,
    Exit(ExitReason),
}

/// Tunables for [`PipelineController`]
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub window_name: String,
    pub detection_enabled: bool,
    pub initial_confidence_percent: i32,
    pub fallback_confidence_percent: i32,
    pub iou_threshold: f32,
    /// Sleep when the buffer is still empty
    pub idle_sleep: Duration,
    pub key_poll_timeout: Duration,
    /// Frame age after which the feed counts as lost
    pub stale_after: Duration,
    pub warm_up_attempts: u32,
    /// Window size used until a frame tells us the real one
    pub window_size: (u32, u32),
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            window_name: WINDOW_NAME.to_string(),
            detection_enabled: true,
            initial_confidence_percent: confidence::INITIAL,
            fallback_confidence_percent: confidence::FALLBACK,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            idle_sleep: EMPTY_FRAME_BACKOFF,
            key_poll_timeout: KEY_POLL_TIMEOUT,
            stale_after: STALE_FRAME_THRESHOLD,
            warm_up_attempts: WARM_UP_ATTEMPTS,
            window_size: (DEFAULT_CAPTURE_WIDTH, DEFAULT_CAPTURE_HEIGHT),
        }
    }
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            detection_enabled: config.detection.enabled_at_start,
            initial_confidence_percent: config.detection.initial_confidence_percent,
            fallback_confidence_percent: config.detection.fallback_confidence_percent,
            iou_threshold: config.detection.iou_threshold,
            window_size: (config.camera.width, config.camera.height),
            ..Self::default()
        }
    }
}

/// Owns the capture side and drives the viewer loop
pub struct PipelineController<S: RenderSink, A: DetectionAdapter> {
    settings: PipelineSettings,
    buffer: Arc<FrameBuffer>,
    worker: Option<CaptureWorker>,
    sink: S,
    detector: A,
    snapshots: SnapshotWriter,
    session: SessionState,
    last_composed: Option<RgbImage>,
    feed_stale: bool,
    shut_down: bool,
}

impl<S: RenderSink, A: DetectionAdapter> PipelineController<S, A> {
    /// Warm up `device`, start the capture thread and open the window
    ///
    /// Errors here are fatal: the loop must not be entered.
    pub fn start(
        mut device: Box<dyn CaptureDevice>,
        mut sink: S,
        detector: A,
        snapshots: SnapshotWriter,
        settings: PipelineSettings,
    ) -> AppResult<Self> {
        info!(device = %device.describe(), "Starting pipeline");

        let buffer = Arc::new(FrameBuffer::new());
        let mut window_size = settings.window_size;

        match warm_up(device.as_mut(), settings.warm_up_attempts) {
            Ok(Some(frame)) => {
                window_size = (frame.width, frame.height);
                buffer.publish(frame);
            }
            Ok(None) => {
                warn!(
                    attempts = settings.warm_up_attempts,
                    "No frame during warm-up, waiting for the capture thread"
                );
            }
            Err(e) => {
                error!(error = %e, "Capture device unusable");
                device.release();
                return Err(e.into());
            }
        }

        if let Err(e) = sink.create_window(&settings.window_name, window_size.0, window_size.1) {
            device.release();
            return Err(e);
        }

        let worker = match CaptureWorker::start(CAPTURE_THREAD_NAME, device, Arc::clone(&buffer)) {
            Ok(worker) => worker,
            Err(e) => {
                if let Err(restore_err) = sink.restore() {
                    warn!(error = %restore_err, "Failed to restore display");
                }
                return Err(e.into());
            }
        };

        let session = SessionState::new(
            settings.detection_enabled,
            settings.initial_confidence_percent,
        );

        Ok(Self {
            settings,
            buffer,
            worker: Some(worker),
            sink,
            detector,
            snapshots,
            session,
            last_composed: None,
            feed_stale: false,
            shut_down: false,
        })
    }

    /// Run cycles until an exit condition, then shut down
    pub fn run(&mut self) -> AppResult<ExitReason> {
        let result = loop {
            match self.step() {
                Ok(Cycle::Exit(reason)) => break Ok(reason),
                Ok(Cycle::Shown) | Ok(Cycle::Idle) => {}
                Err(e) => break Err(e),
            }
        };

        match &result {
            Ok(reason) => info!(reason = ?reason, "Viewer loop finished"),
            Err(e) => error!(error = %e, "Viewer loop failed"),
        }
        self.shutdown();
        result
    }

    /// Run a single cycle
    pub fn step(&mut self) -> AppResult<Cycle> {
        let name = self.settings.window_name.as_str();
        if self.sink.window_state(name) == WindowState::Closed {
            info!(window = name, "Window closed");
            return Ok(Cycle::Exit(ExitReason::WindowClosed));
        }

        let Some(frame) = self.buffer.read_latest() else {
            std::thread::sleep(self.settings.idle_sleep);
            return Ok(Cycle::Idle);
        };

        let threshold = threshold_from_control(
            self.sink.confidence_value(),
            self.settings.fallback_confidence_percent,
        );
        self.session.confidence_threshold = threshold;

        let mut composed = self.compose(&frame, threshold);

        let now = Instant::now();
        let fps = self.session.fps.tick(now);
        self.check_staleness(&frame, now);

        annotator::draw_status(
            &mut composed,
            &StatusOverlay {
                fps,
                detection_enabled: self.session.detection_enabled,
                feed_stale: self.feed_stale,
            },
        );

        let status = self.status_line();
        self.sink
            .show(&self.settings.window_name, &composed, &status)?;
        self.last_composed = Some(composed);

        if let Some(key) = self.sink.poll_key(self.settings.key_poll_timeout)? {
            trace!(key = ?key, "Key pressed");
            if let Some(command) = Command::from_key(key)
                && let Some(reason) = self.handle_command(command)
            {
                return Ok(Cycle::Exit(reason));
            }
        }

        Ok(Cycle::Shown)
    }

    fn compose(&mut self, frame: &Frame, threshold: f32) -> RgbImage {
        if !self.session.detection_enabled {
            return frame.to_rgb_image();
        }

        match self
            .detector
            .detect(frame, threshold, self.settings.iou_threshold)
        {
            Ok(detections) => {
                trace!(
                    sequence = frame.sequence,
                    count = detections.len(),
                    threshold,
                    "Detections"
                );
                let detector = &self.detector;
                annotator::annotate_detections(frame, &detections, |id| detector.class_name(id))
            }
            Err(e) => {
                warn!(sequence = frame.sequence, error = %e, "Detection failed, frame shown unannotated");
                frame.to_rgb_image()
            }
        }
    }

    fn check_staleness(&mut self, frame: &Frame, now: Instant) {
        let stale = frame.age(now) > self.settings.stale_after;
        if stale && !self.feed_stale {
            let worker_running = self.worker.as_ref().is_some_and(|w| w.is_running());
            warn!(
                age_ms = frame.age(now).as_millis() as u64,
                worker_running, "No new frames from the camera"
            );
            self.session.status_message = "No signal from camera".to_string();
        } else if !stale && self.feed_stale {
            info!("Camera feed resumed");
            self.session.status_message.clear();
        }
        self.feed_stale = stale;
    }

    fn status_line(&self) -> String {
        let message = if self.session.status_message.is_empty() {
            HELP_MESSAGE
        } else {
            self.session.status_message.as_str()
        };
        format!("{} | FPS {:.1}", message, self.session.fps.smoothed())
    }

    /// Apply a command; returns the exit reason for quit
    fn handle_command(&mut self, command: Command) -> Option<ExitReason> {
        match command {
            Command::Quit => {
                info!("Quit requested");
                return Some(ExitReason::Quit);
            }
            Command::Save => self.save_snapshot(),
            Command::ToggleDetection => {
                let enabled = self.session.toggle_detection();
                info!(enabled, "Detection toggled");
            }
            Command::AdjustConfidence(delta) => match self.sink.adjust_confidence(delta) {
                Ok(value) => {
                    debug!(value, "Confidence adjusted");
                    self.session.status_message = format!("Confidence {}%", value);
                }
                Err(e) => warn!(error = %e, "Cannot adjust confidence"),
            },
        }
        None
    }

    fn save_snapshot(&mut self) {
        let Some(image) = &self.last_composed else {
            self.session.status_message = "Nothing to save yet".to_string();
            return;
        };
        match self.snapshots.save(image) {
            Ok(path) => {
                self.session.status_message = format!("Saved: {}", path.display());
            }
            Err(e) => {
                error!(error = %e, "Failed to save snapshot");
                self.session.status_message = format!("Error: {}", e);
            }
        }
    }

    /// Stop capture, release the device, restore the display
    ///
    /// The capture thread is joined before the device is released. Safe to
    /// call more than once.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        if let Some(mut worker) = self.worker.take() {
            let stats = worker.stats();
            match worker.stop() {
                Some(device) => {
                    device.release();
                    info!(
                        frames = stats.frames(),
                        failures = stats.failures(),
                        "Capture device released"
                    );
                }
                None => warn!("Capture thread did not return the device"),
            }
        }

        if let Err(e) = self.sink.restore() {
            warn!(error = %e, "Failed to restore display");
        }
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn frame_buffer(&self) -> &Arc<FrameBuffer> {
        &self.buffer
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn detector(&self) -> &A {
        &self.detector
    }

    /// The last frame handed to the sink, overlays included
    pub fn last_composed(&self) -> Option<&RgbImage> {
        self.last_composed.as_ref()
    }

    /// Whether the capture thread is alive
    pub fn capture_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| w.is_running())
    }
}

impl<S: RenderSink, A: DetectionAdapter> Drop for PipelineController<S, A> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Read a first frame synchronously
///
/// Read errors are retried up to `attempts` times (early frames from some
/// cameras fail to decode). A device that reports itself gone is an error.
fn warm_up(device: &mut dyn CaptureDevice, attempts: u32) -> Result<Option<Frame>, CaptureError> {
    for attempt in 1..=attempts {
        match device.acquire_frame() {
            Ok(frame) => {
                debug!(attempt, width = frame.width, height = frame.height, "Warm-up frame");
                return Ok(Some(frame));
            }
            Err(CaptureError::Stopped) => {
                return Err(CaptureError::OpenFailed(
                    "device stopped during warm-up".to_string(),
                ));
            }
            Err(e) => {
                debug!(attempt, error = %e, "Warm-up read failed");
                std::thread::sleep(EMPTY_FRAME_BACKOFF);
            }
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::CaptureResult;

    struct Flaky {
        failures_left: u32,
        error: CaptureError,
    }

    impl CaptureDevice for Flaky {
        fn describe(&self) -> String {
            "flaky".to_string()
        }

        fn acquire_frame(&mut self) -> CaptureResult<Frame> {
            if self.failures_left > 0 {
                self.failures_left -= 1;
                return Err(self.error.clone());
            }
            Ok(Frame::from_rgb(2, 2, vec![0; 12], 0).unwrap())
        }
    }

    #[test]
    fn test_warm_up_retries_read_errors() {
        let mut device = Flaky {
            failures_left: 2,
            error: CaptureError::ReadFailed("corrupt".to_string()),
        };
        let frame = warm_up(&mut device, 5).unwrap();
        assert!(frame.is_some());
    }

    #[test]
    fn test_warm_up_gives_up_quietly() {
        let mut device = Flaky {
            failures_left: 10,
            error: CaptureError::ReadFailed("corrupt".to_string()),
        };
        assert_eq!(warm_up(&mut device, 3).unwrap(), None);
        assert_eq!(device.failures_left, 7);
    }

    #[test]
    fn test_warm_up_stopped_device_is_fatal() {
        let mut device = Flaky {
            failures_left: 1,
            error: CaptureError::Stopped,
        };
        assert!(matches!(
            warm_up(&mut device, 5),
            Err(CaptureError::OpenFailed(_))
        ));
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = Config::default();
        config.detection.enabled_at_start = false;
        config.detection.fallback_confidence_percent = 60;
        config.camera.width = 320;
        let settings = PipelineSettings::from_config(&config);
        assert!(!settings.detection_enabled);
        assert_eq!(settings.fallback_confidence_percent, 60);
        assert_eq!(settings.window_size, (320, 720));
        assert_eq!(settings.window_name, WINDOW_NAME);
    }
}

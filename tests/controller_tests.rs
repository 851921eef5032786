// SPDX-License-Identifier: GPL-3.0-only

//! End-to-end scenarios for the viewer loop with scripted devices and sinks

use image::{Rgb, RgbImage};
use live_detect::annotator::class_color;
use live_detect::backends::camera::{CaptureDevice, Frame};
use live_detect::display::{HeadlessSink, Key, RenderSink, WindowState};
use live_detect::errors::{AppResult, CaptureError, CaptureResult, ControlError, DetectionError};
use live_detect::frame_processor::{BoundingBox, Detection, DetectionAdapter};
use live_detect::pipeline::{
    Cycle, ExitReason, PipelineController, PipelineSettings, SnapshotFormat, SnapshotWriter,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const WIDTH: u32 = 320;
const HEIGHT: u32 = 240;

// ===== Devices =====

#[derive(Clone, Default)]
struct DeviceLog {
    events: Arc<Mutex<Vec<&'static str>>>,
    released: Arc<AtomicBool>,
}

impl DeviceLog {
    fn push(&self, event: &'static str) {
        self.events.lock().unwrap().push(event);
    }

    fn events(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().clone()
    }
}

/// Device producing gray frames (or failing every read)
struct FakeCamera {
    log: DeviceLog,
    fail_after: Option<u64>,
    sequence: u64,
}

impl FakeCamera {
    fn working(log: &DeviceLog) -> Box<dyn CaptureDevice> {
        Box::new(Self {
            log: log.clone(),
            fail_after: None,
            sequence: 0,
        })
    }

    /// Succeeds for `frames` reads, then fails every read
    fn failing_after(log: &DeviceLog, frames: u64) -> Box<dyn CaptureDevice> {
        Box::new(Self {
            log: log.clone(),
            fail_after: Some(frames),
            sequence: 0,
        })
    }
}

impl CaptureDevice for FakeCamera {
    fn describe(&self) -> String {
        "fake camera".to_string()
    }

    fn acquire_frame(&mut self) -> CaptureResult<Frame> {
        if self.log.released.load(Ordering::SeqCst) {
            self.log.push("acquire-after-release");
        }
        // Hardware pacing
        std::thread::sleep(Duration::from_millis(2));

        if let Some(limit) = self.fail_after
            && self.sequence >= limit
        {
            return Err(CaptureError::ReadFailed("no data".to_string()));
        }
        let frame = Frame::from_rgb(WIDTH, HEIGHT, vec![90; (WIDTH * HEIGHT * 3) as usize], self.sequence)
            .ok_or_else(|| CaptureError::Decode("size".to_string()))?;
        self.sequence += 1;
        Ok(frame)
    }

    fn release(self: Box<Self>) {
        self.log.push("release");
        self.log.released.store(true, Ordering::SeqCst);
    }
}

/// Device that vanishes immediately
struct Unplugged(DeviceLog);

impl CaptureDevice for Unplugged {
    fn describe(&self) -> String {
        "unplugged".to_string()
    }

    fn acquire_frame(&mut self) -> CaptureResult<Frame> {
        Err(CaptureError::Stopped)
    }

    fn release(self: Box<Self>) {
        self.0.push("release");
    }
}

// ===== Detector =====

/// Reports one fixed box and records how it was called
#[derive(Default)]
struct FixedDetector {
    calls: usize,
    thresholds: Vec<f32>,
    fail: bool,
}

const BOX: (f32, f32, f32, f32) = (40.0, 40.0, 100.0, 90.0);

impl DetectionAdapter for FixedDetector {
    fn detect(
        &mut self,
        _frame: &Frame,
        confidence: f32,
        _iou: f32,
    ) -> Result<Vec<Detection>, DetectionError> {
        self.calls += 1;
        self.thresholds.push(confidence);
        if self.fail {
            return Err(DetectionError::Backend("model crashed".to_string()));
        }
        Ok(vec![Detection::new(
            BoundingBox::new(BOX.0, BOX.1, BOX.2, BOX.3),
            0.9,
            3,
        )])
    }

    fn class_name(&self, _class_id: u32) -> String {
        "thing".to_string()
    }
}

// ===== Sink =====

/// Sink fed from a key script, recording everything shown
struct ScriptedSink {
    keys: VecDeque<Option<Key>>,
    close_after: Option<usize>,
    window_state: WindowState,
    control: Result<i32, ControlError>,
    shown: Vec<RgbImage>,
    statuses: Vec<String>,
    restored: bool,
}

impl ScriptedSink {
    fn new(keys: Vec<Option<Key>>) -> Self {
        Self {
            keys: keys.into(),
            close_after: None,
            window_state: WindowState::Open,
            control: Ok(45),
            shown: Vec::new(),
            statuses: Vec::new(),
            restored: false,
        }
    }

    fn closing_after(mut self, frames: usize) -> Self {
        self.close_after = Some(frames);
        self
    }
}

impl RenderSink for ScriptedSink {
    fn create_window(&mut self, _name: &str, _width: u32, _height: u32) -> AppResult<()> {
        Ok(())
    }

    fn show(&mut self, _name: &str, image: &RgbImage, status: &str) -> AppResult<()> {
        self.shown.push(image.clone());
        self.statuses.push(status.to_string());
        Ok(())
    }

    fn window_state(&self, _name: &str) -> WindowState {
        match self.close_after {
            Some(n) if self.shown.len() >= n => WindowState::Closed,
            _ => self.window_state,
        }
    }

    fn poll_key(&mut self, _timeout: Duration) -> AppResult<Option<Key>> {
        Ok(self.keys.pop_front().flatten())
    }

    fn confidence_value(&self) -> Result<i32, ControlError> {
        self.control
    }

    fn adjust_confidence(&mut self, delta: i32) -> Result<i32, ControlError> {
        let value = (self.control? + delta).clamp(0, 100);
        self.control = Ok(value);
        Ok(value)
    }

    fn restore(&mut self) -> AppResult<()> {
        self.restored = true;
        Ok(())
    }
}

// ===== Helpers =====

fn snapshots() -> (tempfile::TempDir, SnapshotWriter) {
    let dir = tempfile::tempdir().unwrap();
    let writer = SnapshotWriter::new(dir.path(), "capture", SnapshotFormat::Png);
    (dir, writer)
}

fn settings() -> PipelineSettings {
    PipelineSettings {
        key_poll_timeout: Duration::ZERO,
        ..PipelineSettings::default()
    }
}

fn has_box_edge(image: &RgbImage) -> bool {
    *image.get_pixel(70, BOX.3 as u32) == class_color(3)
}

// ===== Scenarios =====

#[test]
fn test_device_without_frames_idles_without_fps() {
    let log = DeviceLog::default();
    let (_dir, writer) = snapshots();
    let mut controller = PipelineController::start(
        FakeCamera::failing_after(&log, 0),
        ScriptedSink::new(vec![]),
        FixedDetector::default(),
        writer,
        PipelineSettings {
            warm_up_attempts: 1,
            ..settings()
        },
    )
    .unwrap();

    let start = Instant::now();
    for _ in 0..5 {
        assert_eq!(controller.step().unwrap(), Cycle::Idle);
    }

    // Each idle cycle sleeps instead of spinning
    assert!(start.elapsed() >= Duration::from_millis(50));
    assert!(controller.session().fps.last_tick().is_none());
    assert_eq!(controller.session().fps.fps(), 0.0);
    assert!(controller.sink().shown.is_empty());
    assert_eq!(controller.detector().calls, 0);
    assert!(controller.capture_running());

    controller.shutdown();
    assert_eq!(log.events(), vec!["release"]);
}

#[test]
fn test_window_close_joins_capture_before_release() {
    let log = DeviceLog::default();
    let (_dir, writer) = snapshots();
    let mut controller = PipelineController::start(
        FakeCamera::working(&log),
        ScriptedSink::new(vec![]).closing_after(3),
        FixedDetector::default(),
        writer,
        settings(),
    )
    .unwrap();

    let reason = controller.run().unwrap();
    assert_eq!(reason, ExitReason::WindowClosed);
    assert_eq!(controller.sink().shown.len(), 3);
    assert!(controller.sink().restored);
    assert!(!controller.capture_running());

    // Give a leaked capture thread time to misbehave
    std::thread::sleep(Duration::from_millis(20));
    let events = log.events();
    assert_eq!(events, vec!["release"]);
}

#[test]
fn test_first_cycle_fps_is_zero() {
    let log = DeviceLog::default();
    let (_dir, writer) = snapshots();
    let mut controller = PipelineController::start(
        FakeCamera::working(&log),
        ScriptedSink::new(vec![]),
        FixedDetector::default(),
        writer,
        settings(),
    )
    .unwrap();

    assert_eq!(controller.step().unwrap(), Cycle::Shown);
    assert_eq!(controller.session().fps.fps(), 0.0);
    std::thread::sleep(Duration::from_millis(5));
    controller.step().unwrap();
    assert!(controller.session().fps.fps() > 0.0);
}

#[test]
fn test_quit_key_exits() {
    let log = DeviceLog::default();
    let (_dir, writer) = snapshots();
    let mut controller = PipelineController::start(
        FakeCamera::working(&log),
        ScriptedSink::new(vec![None, Some(Key::Char('x')), Some(Key::Char('q'))]),
        FixedDetector::default(),
        writer,
        settings(),
    )
    .unwrap();

    assert_eq!(controller.run().unwrap(), ExitReason::Quit);
    assert_eq!(controller.sink().shown.len(), 3);
    assert_eq!(log.events(), vec!["release"]);
}

#[test]
fn test_toggle_round_trip() {
    let log = DeviceLog::default();
    let (_dir, writer) = snapshots();
    let keys = vec![
        None,
        Some(Key::Char('d')),
        None,
        Some(Key::Char('d')),
        None,
        Some(Key::Char('q')),
    ];
    let mut controller = PipelineController::start(
        FakeCamera::working(&log),
        ScriptedSink::new(keys),
        FixedDetector::default(),
        writer,
        settings(),
    )
    .unwrap();

    controller.run().unwrap();
    let shown = &controller.sink().shown;
    assert_eq!(shown.len(), 6);

    // Key in cycle n takes effect from cycle n + 1
    let boxes: Vec<bool> = shown.iter().map(has_box_edge).collect();
    assert_eq!(boxes, vec![true, true, false, false, true, true]);
    assert_eq!(controller.detector().calls, 4);
    assert!(controller.session().detection_enabled);

    // Away from the box and the status text the frame passes through unchanged
    for image in shown {
        assert_eq!(*image.get_pixel(WIDTH - 5, 70), Rgb([90, 90, 90]));
    }
}

#[test]
fn test_detection_failure_shows_plain_frame() {
    let log = DeviceLog::default();
    let (_dir, writer) = snapshots();
    let mut controller = PipelineController::start(
        FakeCamera::working(&log),
        ScriptedSink::new(vec![None, Some(Key::Char('q'))]),
        FixedDetector {
            fail: true,
            ..FixedDetector::default()
        },
        writer,
        settings(),
    )
    .unwrap();

    assert_eq!(controller.run().unwrap(), ExitReason::Quit);
    let shown = &controller.sink().shown;
    assert_eq!(shown.len(), 2);
    assert!(shown.iter().all(|image| !has_box_edge(image)));
}

#[test]
fn test_broken_control_uses_fallback_threshold() {
    let log = DeviceLog::default();
    let (_dir, writer) = snapshots();
    let mut sink = ScriptedSink::new(vec![]);
    sink.control = Err(ControlError::Unavailable);

    let mut controller = PipelineController::start(
        FakeCamera::working(&log),
        sink,
        FixedDetector::default(),
        writer,
        settings(),
    )
    .unwrap();

    controller.step().unwrap();
    assert_eq!(controller.session().confidence_threshold, 0.5);
    assert_eq!(controller.detector().thresholds, vec![0.5]);
}

#[test]
fn test_confidence_keys_move_threshold() {
    let log = DeviceLog::default();
    let (_dir, writer) = snapshots();
    let mut controller = PipelineController::start(
        FakeCamera::working(&log),
        ScriptedSink::new(vec![Some(Key::Char('+')), Some(Key::Down), None]),
        FixedDetector::default(),
        writer,
        settings(),
    )
    .unwrap();

    for _ in 0..3 {
        controller.step().unwrap();
    }
    assert_eq!(controller.detector().thresholds, vec![0.45, 0.50, 0.49]);
}

#[test]
fn test_double_save_keeps_both_files() {
    let log = DeviceLog::default();
    let (dir, writer) = snapshots();
    let mut controller = PipelineController::start(
        FakeCamera::working(&log),
        ScriptedSink::new(vec![Some(Key::Char('s')), Some(Key::Char('s')), Some(Key::Char('q'))]),
        FixedDetector::default(),
        writer,
        settings(),
    )
    .unwrap();

    controller.run().unwrap();

    let files: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    assert_eq!(files.len(), 2);
    for path in &files {
        let saved = image::open(path).unwrap().to_rgb8();
        assert_eq!(saved.dimensions(), (WIDTH, HEIGHT));
    }
    assert!(
        controller
            .sink()
            .statuses
            .last()
            .unwrap()
            .starts_with("Saved: ")
    );
}

#[test]
fn test_stale_feed_is_reported() {
    let log = DeviceLog::default();
    let (_dir, writer) = snapshots();
    let mut controller = PipelineController::start(
        FakeCamera::failing_after(&log, 1),
        ScriptedSink::new(vec![]),
        FixedDetector::default(),
        writer,
        PipelineSettings {
            stale_after: Duration::from_millis(20),
            ..settings()
        },
    )
    .unwrap();

    controller.step().unwrap();
    assert!(controller.session().status_message.is_empty());

    std::thread::sleep(Duration::from_millis(40));
    controller.step().unwrap();
    assert_eq!(controller.session().status_message, "No signal from camera");
    assert!(
        controller
            .sink()
            .statuses
            .last()
            .unwrap()
            .starts_with("No signal")
    );
}

#[test]
fn test_unplugged_device_is_fatal_and_released() {
    let log = DeviceLog::default();
    let (_dir, writer) = snapshots();
    let result = PipelineController::start(
        Box::new(Unplugged(log.clone())),
        ScriptedSink::new(vec![]),
        FixedDetector::default(),
        writer,
        settings(),
    );

    assert!(result.is_err());
    assert_eq!(log.events(), vec!["release"]);
}

#[test]
fn test_headless_sink_is_not_mistaken_for_closed() {
    let log = DeviceLog::default();
    let (_dir, writer) = snapshots();
    let sink = HeadlessSink::new(45, Some(4), Arc::new(AtomicBool::new(false)));
    let mut controller = PipelineController::start(
        FakeCamera::working(&log),
        sink,
        FixedDetector::default(),
        writer,
        settings(),
    )
    .unwrap();

    assert_eq!(controller.run().unwrap(), ExitReason::WindowClosed);
    assert_eq!(controller.sink().frames_shown(), 4);
}

#[test]
fn test_headless_interrupt_quits() {
    let log = DeviceLog::default();
    let (_dir, writer) = snapshots();
    let interrupted = Arc::new(AtomicBool::new(true));
    let sink = HeadlessSink::new(45, None, interrupted);
    let mut controller = PipelineController::start(
        FakeCamera::working(&log),
        sink,
        FixedDetector::default(),
        writer,
        settings(),
    )
    .unwrap();

    assert_eq!(controller.run().unwrap(), ExitReason::Quit);
    assert_eq!(controller.sink().frames_shown(), 1);
}

// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use std::time::Duration;

/// Name of the display window (terminal title / log field)
pub const WINDOW_NAME: &str = "Real-Time Object Detection";

/// Requested capture resolution (devices may ignore it)
pub const DEFAULT_CAPTURE_WIDTH: u32 = 1280;
pub const DEFAULT_CAPTURE_HEIGHT: u32 = 720;

/// Confidence control range and defaults (value / 100.0 = threshold)
pub mod confidence {
    /// Lowest control value
    pub const MIN: i32 = 0;
    /// Highest control value
    pub const MAX: i32 = 100;
    /// Control position at startup
    pub const INITIAL: i32 = 45;
    /// Value substituted when the control cannot be read
    pub const FALLBACK: i32 = 50;
    /// Coarse step for `+` / `-`
    pub const COARSE_STEP: i32 = 5;
    /// Fine step for arrow keys
    pub const FINE_STEP: i32 = 1;
}

/// Fixed non-maximum-suppression IoU threshold passed to the detector
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.45;

/// Sleep when no frame has been captured yet
pub const EMPTY_FRAME_BACKOFF: Duration = Duration::from_millis(10);

/// Key poll timeout per cycle (keeps the loop responsive without spinning)
pub const KEY_POLL_TIMEOUT: Duration = Duration::from_millis(1);

/// Newest frame older than this is reported as a lost feed
pub const STALE_FRAME_THRESHOLD: Duration = Duration::from_secs(2);

/// Log every Nth consecutive capture failure after the first
pub const CAPTURE_FAILURE_LOG_INTERVAL: u64 = 30;

/// First-frame read attempts before the device counts as unusable
pub const WARM_UP_ATTEMPTS: u32 = 5;

/// Longest a single V4L2 dequeue may block (lets the stop flag be observed)
pub const V4L2_DEQUEUE_TIMEOUT: Duration = Duration::from_secs(1);

/// Memory-mapped buffers requested from V4L2 devices
pub const V4L2_BUFFER_COUNT: u32 = 4;

/// Detector input is downscaled so neither side exceeds this
pub const DEFAULT_DETECTOR_MAX_DIMENSION: u32 = 640;

/// YOLO model loaded when the config names none
pub const DEFAULT_MODEL_PATH: &str = "yolov8s.onnx";

/// Side of the square YOLO input (must be a multiple of the model stride)
pub const DEFAULT_YOLO_INPUT_SIZE: u32 = 640;
pub const YOLO_STRIDE: u32 = 32;

/// Smoothing factor for the FPS moving average
pub const FPS_SMOOTHING: f32 = 0.1;

/// Tracker tuning
pub mod tracking {
    /// Minimum IoU to continue an existing track
    pub const MATCH_IOU: f32 = 0.3;
    /// Calls a track survives without a match
    pub const MAX_AGE: u32 = 30;
}

/// Default snapshot file name prefix
pub const SNAPSHOT_PREFIX: &str = "capture";

/// Box colours indexed by class id (RGB)
pub const CLASS_COLORS: [[u8; 3]; 13] = [
    [0, 0, 255],
    [0, 255, 0],
    [255, 0, 0],
    [0, 255, 255],
    [255, 255, 0],
    [255, 0, 255],
    [192, 192, 192],
    [0, 0, 128],
    [0, 128, 128],
    [0, 128, 0],
    [128, 0, 128],
    [128, 128, 0],
    [128, 0, 0],
];

/// Overlay colours (RGB)
pub mod colors {
    pub const FPS: [u8; 3] = [0, 255, 0];
    pub const DETECTION_ON: [u8; 3] = [0, 255, 0];
    pub const DETECTION_OFF: [u8; 3] = [255, 0, 0];
    pub const LABEL_TEXT: [u8; 3] = [255, 255, 255];
    pub const WARNING: [u8; 3] = [255, 200, 0];
}

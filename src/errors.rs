// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the live detection viewer

use std::fmt;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for capture device operations
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Main application error type
#[derive(Debug, Clone)]
pub enum AppError {
    /// Capture device errors (fatal only at startup)
    Capture(CaptureError),
    /// Detection adapter errors (fatal only when building the detector)
    Detection(DetectionError),
    /// Render sink / terminal errors
    Display(String),
    /// Configuration errors
    Config(String),
    /// Filesystem errors
    Io(String),
}

/// Capture device errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// No device exists for the requested source
    DeviceNotFound(String),
    /// Device exists but could not be opened or started
    OpenFailed(String),
    /// Device refused every pixel format we can decode
    FormatNotSupported(String),
    /// A single frame acquisition failed
    ReadFailed(String),
    /// Frame bytes could not be decoded to RGB
    Decode(String),
    /// Device was already released
    Stopped,
}

/// Detection adapter errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectionError {
    /// Frame dimensions or data unusable for detection
    InvalidFrame(String),
    /// Detector backend failed
    Backend(String),
}

/// Snapshot save errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    /// No composed frame available yet
    NoFrame,
    /// Image encoding failed
    Encode(String),
    /// Writing the file failed
    Io(String),
}

/// Live control read errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlError {
    /// Control is not available (window gone, toolkit glitch)
    Unavailable,
    /// Control reported a value outside its range
    OutOfRange(i32),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Capture(e) => write!(f, "Capture error: {}", e),
            AppError::Detection(e) => write!(f, "Detection error: {}", e),
            AppError::Display(msg) => write!(f, "Display error: {}", msg),
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::DeviceNotFound(msg) => write!(f, "Device not found: {}", msg),
            CaptureError::OpenFailed(msg) => write!(f, "Failed to open device: {}", msg),
            CaptureError::FormatNotSupported(msg) => write!(f, "Format not supported: {}", msg),
            CaptureError::ReadFailed(msg) => write!(f, "Frame read failed: {}", msg),
            CaptureError::Decode(msg) => write!(f, "Frame decode failed: {}", msg),
            CaptureError::Stopped => write!(f, "Device released"),
        }
    }
}

impl fmt::Display for DetectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectionError::InvalidFrame(msg) => write!(f, "Invalid frame: {}", msg),
            DetectionError::Backend(msg) => write!(f, "Detector failed: {}", msg),
        }
    }
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotError::NoFrame => write!(f, "No frame available to save"),
            SnapshotError::Encode(msg) => write!(f, "Encoding failed: {}", msg),
            SnapshotError::Io(msg) => write!(f, "Save failed: {}", msg),
        }
    }
}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlError::Unavailable => write!(f, "Control unavailable"),
            ControlError::OutOfRange(v) => write!(f, "Control value {} out of range", v),
        }
    }
}

impl std::error::Error for AppError {}
impl std::error::Error for CaptureError {}
impl std::error::Error for DetectionError {}
impl std::error::Error for SnapshotError {}
impl std::error::Error for ControlError {}

impl From<CaptureError> for AppError {
    fn from(err: CaptureError) -> Self {
        AppError::Capture(err)
    }
}

impl From<DetectionError> for AppError {
    fn from(err: DetectionError) -> Self {
        AppError::Detection(err)
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io(err.to_string())
    }
}

impl From<std::io::Error> for SnapshotError {
    fn from(err: std::io::Error) -> Self {
        SnapshotError::Io(err.to_string())
    }
}

impl From<image::ImageError> for SnapshotError {
    fn from(err: image::ImageError) -> Self {
        SnapshotError::Encode(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Config(err.to_string())
    }
}

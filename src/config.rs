// SPDX-License-Identifier: GPL-3.0-only

use crate::constants::{
    DEFAULT_CAPTURE_HEIGHT, DEFAULT_CAPTURE_WIDTH, DEFAULT_DETECTOR_MAX_DIMENSION,
    DEFAULT_IOU_THRESHOLD, DEFAULT_MODEL_PATH, DEFAULT_YOLO_INPUT_SIZE, SNAPSHOT_PREFIX,
    YOLO_STRIDE, confidence,
};
use crate::errors::{AppError, AppResult};
use crate::pipeline::snapshot::SnapshotFormat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

/// Directory name under the user config dir
const CONFIG_DIR_NAME: &str = "live-detect";
const CONFIG_FILE_NAME: &str = "config.json";

/// Capture device settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    /// Device index (`"0"`), device path (`/dev/video2`) or `"test-pattern"`
    pub source: String,
    /// Requested width (the device may pick another)
    pub width: u32,
    /// Requested height (the device may pick another)
    pub height: u32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            source: "0".to_string(),
            width: DEFAULT_CAPTURE_WIDTH,
            height: DEFAULT_CAPTURE_HEIGHT,
        }
    }
}

/// Which detection adapter drives the overlay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorKind {
    /// YOLOv8 ONNX model with COCO labels
    #[default]
    Yolo,
    /// QR code finder
    Qr,
    /// Viewer only, nothing is detected
    None,
}

impl FromStr for DetectorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "yolo" => Ok(Self::Yolo),
            "qr" => Ok(Self::Qr),
            "none" => Ok(Self::None),
            other => Err(format!(
                "unknown detector '{}' (expected yolo, qr or none)",
                other
            )),
        }
    }
}

impl fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Yolo => write!(f, "yolo"),
            Self::Qr => write!(f, "qr"),
            Self::None => write!(f, "none"),
        }
    }
}

/// Detection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionSettings {
    /// Adapter to build at startup
    pub detector: DetectorKind,
    /// ONNX model for the YOLO adapter
    pub model_path: PathBuf,
    /// Square YOLO input side in pixels
    pub input_size: u32,
    /// Whether detection runs from the first frame
    pub enabled_at_start: bool,
    /// Confidence control position at startup (0..=100)
    pub initial_confidence_percent: i32,
    /// Used when the control cannot be read (0..=100)
    pub fallback_confidence_percent: i32,
    /// NMS overlap threshold
    pub iou_threshold: f32,
    /// Attach the IoU tracker for stable ids
    pub tracking: bool,
    /// QR detector input is downscaled to this
    pub max_dimension: u32,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            detector: DetectorKind::default(),
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            input_size: DEFAULT_YOLO_INPUT_SIZE,
            enabled_at_start: true,
            initial_confidence_percent: confidence::INITIAL,
            fallback_confidence_percent: confidence::FALLBACK,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            tracking: true,
            max_dimension: DEFAULT_DETECTOR_MAX_DIMENSION,
        }
    }
}

/// Snapshot settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotSettings {
    /// Output directory, current directory when unset
    pub directory: Option<PathBuf>,
    pub prefix: String,
    pub format: SnapshotFormat,
}

impl Default for SnapshotSettings {
    fn default() -> Self {
        Self {
            directory: None,
            prefix: SNAPSHOT_PREFIX.to_string(),
            format: SnapshotFormat::default(),
        }
    }
}

impl SnapshotSettings {
    pub fn directory(&self) -> PathBuf {
        self.directory.clone().unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Display settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    /// Run without a window
    pub headless: bool,
    /// Stop after this many displayed frames
    pub max_frames: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub camera: CameraSettings,
    pub detection: DetectionSettings,
    pub snapshot: SnapshotSettings,
    pub display: DisplaySettings,
}

impl Config {
    /// Default config file location (`~/.config/live-detect/config.json`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Parse and validate a config file
    pub fn from_file(path: &Path) -> AppResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))?;
        let config: Config = serde_json::from_str(&text)?;
        config.validate()?;
        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Load `explicit` if given, else the default file if it exists, else defaults
    ///
    /// An explicit path that cannot be read is an error; a missing default
    /// file is not.
    pub fn load(explicit: Option<&Path>) -> AppResult<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => {
                info!(path = %path.display(), "Using config file");
                Self::from_file(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> AppResult<()> {
        if self.camera.source.trim().is_empty() {
            return Err(AppError::Config("camera.source is empty".to_string()));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(AppError::Config(format!(
                "camera size {}x{} is invalid",
                self.camera.width, self.camera.height
            )));
        }

        let percent_range = confidence::MIN..=confidence::MAX;
        for (name, value) in [
            (
                "detection.initial_confidence_percent",
                self.detection.initial_confidence_percent,
            ),
            (
                "detection.fallback_confidence_percent",
                self.detection.fallback_confidence_percent,
            ),
        ] {
            if !percent_range.contains(&value) {
                return Err(AppError::Config(format!(
                    "{} must be within {}..={}, got {}",
                    name,
                    confidence::MIN,
                    confidence::MAX,
                    value
                )));
            }
        }

        if !(0.0..=1.0).contains(&self.detection.iou_threshold) {
            return Err(AppError::Config(format!(
                "detection.iou_threshold must be within 0..=1, got {}",
                self.detection.iou_threshold
            )));
        }
        if self.detection.input_size == 0 || self.detection.input_size % YOLO_STRIDE != 0 {
            return Err(AppError::Config(format!(
                "detection.input_size must be a positive multiple of {}, got {}",
                YOLO_STRIDE, self.detection.input_size
            )));
        }
        if self.detection.detector == DetectorKind::Yolo
            && self.detection.model_path.as_os_str().is_empty()
        {
            return Err(AppError::Config(
                "detection.model_path is empty".to_string(),
            ));
        }
        if self.detection.max_dimension == 0 {
            return Err(AppError::Config(
                "detection.max_dimension must be positive".to_string(),
            ));
        }
        if self.snapshot.prefix.is_empty()
            || self
                .snapshot
                .prefix
                .contains(|c: char| c == '/' || c == '\\')
        {
            return Err(AppError::Config(format!(
                "snapshot.prefix {:?} is not a valid file name prefix",
                self.snapshot.prefix
            )));
        }
        if self.display.max_frames == Some(0) {
            return Err(AppError::Config(
                "display.max_frames must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config =
            serde_json::from_str(r#"{ "camera": { "source": "test-pattern" } }"#).unwrap();
        assert_eq!(config.camera.source, "test-pattern");
        assert_eq!(config.camera.width, DEFAULT_CAPTURE_WIDTH);
        assert_eq!(config.detection.initial_confidence_percent, 45);
        assert_eq!(config.snapshot.format, SnapshotFormat::Jpg);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.detection.initial_confidence_percent = 101;
        assert!(matches!(config.validate(), Err(AppError::Config(_))));

        let mut config = Config::default();
        config.detection.iou_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.snapshot.prefix = "../x".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.camera.width = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.detection.input_size = 600;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_detector_kind_parsing() {
        assert_eq!("YOLO".parse::<DetectorKind>(), Ok(DetectorKind::Yolo));
        assert_eq!("none".parse::<DetectorKind>(), Ok(DetectorKind::None));
        assert!("ssd".parse::<DetectorKind>().is_err());

        let config: Config =
            serde_json::from_str(r#"{ "detection": { "detector": "qr" } }"#).unwrap();
        assert_eq!(config.detection.detector, DetectorKind::Qr);
        assert_eq!(config.detection.model_path, PathBuf::from(DEFAULT_MODEL_PATH));
    }
}

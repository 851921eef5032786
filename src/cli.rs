// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! This module provides command-line functionality for:
//! - Listing available cameras
//! - Running the live viewer

use clap::Args;
use live_detect::backends::camera::{self, list_cameras as enumerate_cameras};
use live_detect::config::{Config, DetectorKind};
use live_detect::display::{HeadlessSink, RenderSink, TerminalSink};
use live_detect::frame_processor::{self, DetectionAdapter};
use live_detect::pipeline::{PipelineController, PipelineSettings, SnapshotWriter};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

/// Options for the viewer; each one overrides the config file
#[derive(Args, Debug, Default, Clone)]
pub struct RunArgs {
    /// Camera index, device path, or "test-pattern"
    #[arg(short, long)]
    pub camera: Option<String>,

    /// Requested capture width
    #[arg(long)]
    pub width: Option<u32>,

    /// Requested capture height
    #[arg(long)]
    pub height: Option<u32>,

    /// Config file (default: ~/.config/live-detect/config.json)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Run without a window (logs only)
    #[arg(long)]
    pub headless: bool,

    /// Stop after this many frames
    #[arg(long)]
    pub max_frames: Option<u64>,

    /// Start with detection paused
    #[arg(long)]
    pub no_detect: bool,

    /// Detector: yolo, qr or none
    #[arg(long)]
    pub detector: Option<DetectorKind>,

    /// YOLOv8 ONNX model file
    #[arg(long)]
    pub model: Option<PathBuf>,

    /// Directory for saved snapshots
    #[arg(long)]
    pub snapshot_dir: Option<PathBuf>,
}

impl RunArgs {
    /// Apply command-line overrides on top of the loaded config
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(camera) = &self.camera {
            config.camera.source = camera.clone();
        }
        if let Some(width) = self.width {
            config.camera.width = width;
        }
        if let Some(height) = self.height {
            config.camera.height = height;
        }
        if self.headless {
            config.display.headless = true;
        }
        if self.max_frames.is_some() {
            config.display.max_frames = self.max_frames;
        }
        if self.no_detect {
            config.detection.enabled_at_start = false;
        }
        if let Some(detector) = self.detector {
            config.detection.detector = detector;
        }
        if let Some(model) = &self.model {
            config.detection.model_path = model.clone();
        }
        if let Some(dir) = &self.snapshot_dir {
            config.snapshot.directory = Some(dir.clone());
        }
    }
}

/// List all available cameras
pub fn list_cameras() -> Result<(), Box<dyn std::error::Error>> {
    let cameras = enumerate_cameras();

    if cameras.is_empty() {
        println!("No cameras found.");
        println!("Use --camera {} to run without one.", camera::TEST_PATTERN_SOURCE);
        return Ok(());
    }

    println!("Available cameras:");
    println!();
    for camera in &cameras {
        println!("  [{}] {}", camera.index, camera.name);
        println!("      Device: {}", camera.path);
        if !camera.formats.is_empty() {
            println!("      Formats: {}", camera.formats.join(", "));
        }
        println!();
    }

    Ok(())
}

/// Run the live viewer until quit or window close
pub fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::load(args.config.as_deref())?;
    args.apply_to(&mut config);
    config.validate()?;

    // SIGINT/SIGTERM/SIGHUP: quit when headless, window closed for the terminal
    let interrupted = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&interrupted);
    ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::SeqCst);
    })?;

    // Load the model before claiming the camera
    let detector = frame_processor::build_detector(&config.detection)?;
    let device = camera::open_device(
        &config.camera.source,
        config.camera.width,
        config.camera.height,
    )?;

    let snapshots = SnapshotWriter::new(
        config.snapshot.directory(),
        config.snapshot.prefix.clone(),
        config.snapshot.format,
    );
    let settings = PipelineSettings::from_config(&config);
    let initial = config.detection.initial_confidence_percent;

    if config.display.headless {
        let sink = HeadlessSink::new(initial, config.display.max_frames, interrupted);
        run_with(device, sink, detector, snapshots, settings)
    } else {
        let sink = TerminalSink::new(initial, interrupted);
        run_with(device, sink, detector, snapshots, settings)
    }
}

fn run_with<S: RenderSink>(
    device: Box<dyn camera::CaptureDevice>,
    sink: S,
    detector: Box<dyn DetectionAdapter>,
    snapshots: SnapshotWriter,
    settings: PipelineSettings,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut controller = PipelineController::start(device, sink, detector, snapshots, settings)?;
    let reason = controller.run()?;
    info!(reason = ?reason, "Exiting");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let mut config = Config::default();
        let args = RunArgs {
            camera: Some("test-pattern".to_string()),
            width: Some(640),
            max_frames: Some(10),
            no_detect: true,
            detector: Some(DetectorKind::Qr),
            ..RunArgs::default()
        };
        args.apply_to(&mut config);

        assert_eq!(config.camera.source, "test-pattern");
        assert_eq!(config.camera.width, 640);
        assert_eq!(config.camera.height, 720);
        assert_eq!(config.display.max_frames, Some(10));
        assert!(!config.detection.enabled_at_start);
        assert!(!config.display.headless);
        assert_eq!(config.detection.detector, DetectorKind::Qr);
        assert_eq!(config.detection.model_path, Config::default().detection.model_path);
    }
}

// SPDX-License-Identifier: GPL-3.0-only

//! Detection boundary
//!
//! The viewer talks to detectors only through [`DetectionAdapter`]. Adapters
//! run synchronously on the viewer thread, once per displayed frame, and may
//! keep state between calls (see [`tasks::tracker`]).

pub mod tasks;
pub mod types;

pub use tasks::qr_detector::QrDetector;
pub use tasks::tracker::Tracker;
pub use tasks::yolo_detector::YoloDetector;
pub use types::{BoundingBox, Detection};

use crate::backends::camera::Frame;
use crate::config::{DetectionSettings, DetectorKind};
use crate::errors::{AppResult, DetectionError};
use tracing::info;

/// A detector that can be driven frame by frame
pub trait DetectionAdapter {
    /// Detect objects in `frame`
    ///
    /// Results have confidence `>= confidence` and have been through
    /// non-maximum suppression at `iou`.
    fn detect(
        &mut self,
        frame: &Frame,
        confidence: f32,
        iou: f32,
    ) -> Result<Vec<Detection>, DetectionError>;

    /// Display name for a class id
    fn class_name(&self, class_id: u32) -> String {
        class_id.to_string()
    }
}

impl<T: DetectionAdapter + ?Sized> DetectionAdapter for Box<T> {
    fn detect(
        &mut self,
        frame: &Frame,
        confidence: f32,
        iou: f32,
    ) -> Result<Vec<Detection>, DetectionError> {
        (**self).detect(frame, confidence, iou)
    }

    fn class_name(&self, class_id: u32) -> String {
        (**self).class_name(class_id)
    }
}

/// Adapter that never reports anything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDetector;

impl DetectionAdapter for NullDetector {
    fn detect(&mut self, _: &Frame, _: f32, _: f32) -> Result<Vec<Detection>, DetectionError> {
        Ok(Vec::new())
    }
}

/// Build the adapter named by `settings`
///
/// YOLO and QR adapters are wrapped in a [`Tracker`] when tracking is on.
/// A YOLO model that cannot be loaded is an error.
pub fn build_detector(settings: &DetectionSettings) -> AppResult<Box<dyn DetectionAdapter>> {
    info!(detector = %settings.detector, tracking = settings.tracking, "Building detector");
    let detector: Box<dyn DetectionAdapter> = match settings.detector {
        DetectorKind::Yolo => {
            let yolo = YoloDetector::load(&settings.model_path, settings.input_size)?;
            with_tracking(yolo, settings.tracking)
        }
        DetectorKind::Qr => with_tracking(
            QrDetector::with_max_dimension(settings.max_dimension),
            settings.tracking,
        ),
        DetectorKind::None => Box::new(NullDetector),
    };
    Ok(detector)
}

fn with_tracking<A>(adapter: A, tracking: bool) -> Box<dyn DetectionAdapter>
where
    A: DetectionAdapter + 'static,
{
    if tracking {
        Box::new(Tracker::new(adapter))
    } else {
        Box::new(adapter)
    }
}

/// Normalise raw detector output
///
/// Drops detections below `confidence`, clamps boxes to the frame, and runs
/// class-aware greedy non-maximum suppression at `iou`. Output is sorted by
/// descending confidence.
pub fn postprocess(
    mut detections: Vec<Detection>,
    confidence: f32,
    iou: f32,
    width: u32,
    height: u32,
) -> Vec<Detection> {
    detections.retain(|d| d.confidence >= confidence);
    for d in &mut detections {
        d.bbox = d.bbox.clamped(width, height);
    }
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
    for candidate in detections {
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == candidate.class_id && k.bbox.iou(&candidate.bbox) > iou);
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

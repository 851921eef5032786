// SPDX-License-Identifier: GPL-3.0-only

//! QR code detection adapter
//!
//! Finds QR symbols with the rqrr crate. Frames are converted to grayscale
//! and downscaled before the search; boxes are mapped back to full-frame
//! pixel coordinates. A symbol that decodes cleanly is reported with
//! confidence 1.0, one whose grid was found but did not decode with 0.5.

use crate::backends::camera::Frame;
use crate::constants::DEFAULT_DETECTOR_MAX_DIMENSION;
use crate::errors::DetectionError;
use crate::frame_processor::types::{BoundingBox, Detection};
use crate::frame_processor::{DetectionAdapter, postprocess};
use std::time::Instant;
use tracing::{debug, trace};

/// Class id of QR symbols
pub const QR_CLASS_ID: u32 = 0;

const DECODED_CONFIDENCE: f32 = 1.0;
const UNDECODED_CONFIDENCE: f32 = 0.5;

/// QR code detector
pub struct QrDetector {
    /// Maximum dimension for processing (frames are downscaled to this)
    max_dimension: u32,
}

impl Default for QrDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl QrDetector {
    pub fn new() -> Self {
        Self {
            max_dimension: DEFAULT_DETECTOR_MAX_DIMENSION,
        }
    }

    pub fn with_max_dimension(max_dimension: u32) -> Self {
        Self {
            max_dimension: max_dimension.max(1),
        }
    }
}

impl DetectionAdapter for QrDetector {
    fn detect(
        &mut self,
        frame: &Frame,
        confidence: f32,
        iou: f32,
    ) -> Result<Vec<Detection>, DetectionError> {
        if frame.width == 0 || frame.height == 0 {
            return Err(DetectionError::InvalidFrame("empty frame".to_string()));
        }

        let raw = detect_sync(frame, self.max_dimension);
        Ok(postprocess(raw, confidence, iou, frame.width, frame.height))
    }

    fn class_name(&self, class_id: u32) -> String {
        match class_id {
            QR_CLASS_ID => "qr-code".to_string(),
            other => other.to_string(),
        }
    }
}

/// Downscale factor so neither side exceeds `max_dimension` (never upscales)
fn processing_scale(width: u32, height: u32, max_dimension: u32) -> f32 {
    let scale = (width as f32 / max_dimension as f32).max(height as f32 / max_dimension as f32);
    scale.max(1.0)
}

fn detect_sync(frame: &Frame, max_dimension: u32) -> Vec<Detection> {
    let start = Instant::now();

    let scale = processing_scale(frame.width, frame.height, max_dimension);
    let proc_width = ((frame.width as f32 / scale) as usize).max(1);
    let proc_height = ((frame.height as f32 / scale) as usize).max(1);
    let luma = downscale_luma(frame, proc_width, proc_height);

    let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(proc_width, proc_height, |x, y| {
        luma[y * proc_width + x]
    });
    let grids = prepared.detect_grids();

    trace!(
        proc_width,
        proc_height,
        scale,
        grids = grids.len(),
        elapsed_ms = start.elapsed().as_millis(),
        "QR grid search complete"
    );

    grids
        .iter()
        .filter_map(|grid| {
            let bbox = BoundingBox::enclosing(
                grid.bounds
                    .iter()
                    .map(|p| (p.x as f32, p.y as f32)),
            )?
            .scaled(scale);

            let confidence = match grid.decode() {
                Ok((_, content)) => {
                    debug!(content = %content, "Decoded QR code");
                    DECODED_CONFIDENCE
                }
                Err(e) => {
                    debug!(error = ?e, "QR grid found but not decodable");
                    UNDECODED_CONFIDENCE
                }
            };

            Some(Detection::new(bbox, confidence, QR_CLASS_ID))
        })
        .collect()
}

/// Convert to BT.601 luma and downscale with box sampling
fn downscale_luma(frame: &Frame, dst_width: usize, dst_height: usize) -> Vec<u8> {
    let x_ratio = frame.width as f32 / dst_width as f32;
    let y_ratio = frame.height as f32 / dst_height as f32;
    let mut result = Vec::with_capacity(dst_width * dst_height);

    for y in 0..dst_height {
        let y0 = (y as f32 * y_ratio) as u32;
        let y1 = (((y + 1) as f32 * y_ratio) as u32).max(y0 + 1).min(frame.height);
        for x in 0..dst_width {
            let x0 = (x as f32 * x_ratio) as u32;
            let x1 = (((x + 1) as f32 * x_ratio) as u32).max(x0 + 1).min(frame.width);

            let mut sum = 0u32;
            let mut count = 0u32;
            for sy in y0..y1 {
                for sx in x0..x1 {
                    let [r, g, b] = frame.pixel(sx, sy);
                    sum += (299 * r as u32 + 587 * g as u32 + 114 * b as u32) / 1000;
                    count += 1;
                }
            }
            result.push((sum / count.max(1)) as u8);
        }
    }

    result
}

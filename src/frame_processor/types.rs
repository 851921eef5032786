// SPDX-License-Identifier: GPL-3.0-only

//! Core types for detection results
//!
//! Every detector's native output is normalised into [`Detection`] at the
//! adapter boundary, so the rest of the pipeline never sees backend types.

/// Axis-aligned box in frame pixel coordinates
///
/// Always satisfies `x1 <= x2` and `y1 <= y2`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    /// Build a box from two corners in any order
    pub fn new(xa: f32, ya: f32, xb: f32, yb: f32) -> Self {
        Self {
            x1: xa.min(xb),
            y1: ya.min(yb),
            x2: xa.max(xb),
            y2: ya.max(yb),
        }
    }

    /// Smallest box containing all points
    pub fn enclosing(points: impl IntoIterator<Item = (f32, f32)>) -> Option<Self> {
        points.into_iter().fold(None, |acc, (x, y)| {
            Some(match acc {
                None => Self::new(x, y, x, y),
                Some(b) => Self::new(b.x1.min(x), b.y1.min(y), b.x2.max(x), b.y2.max(y)),
            })
        })
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Multiply all coordinates by `factor`
    pub fn scaled(&self, factor: f32) -> Self {
        Self::new(
            self.x1 * factor,
            self.y1 * factor,
            self.x2 * factor,
            self.y2 * factor,
        )
    }

    /// Restrict the box to a `width` x `height` frame
    pub fn clamped(&self, width: u32, height: u32) -> Self {
        let max_x = width.saturating_sub(1) as f32;
        let max_y = height.saturating_sub(1) as f32;
        Self::new(
            self.x1.clamp(0.0, max_x),
            self.y1.clamp(0.0, max_y),
            self.x2.clamp(0.0, max_x),
            self.y2.clamp(0.0, max_y),
        )
    }

    /// Intersection over union, 0.0 for disjoint or degenerate boxes
    pub fn iou(&self, other: &Self) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);

        let intersection = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 { 0.0 } else { intersection / union }
    }

    /// Integer pixel corners (rounded)
    pub fn to_pixels(&self) -> (i32, i32, i32, i32) {
        (
            self.x1.round() as i32,
            self.y1.round() as i32,
            self.x2.round() as i32,
            self.y2.round() as i32,
        )
    }
}

/// One detected object
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    /// Detector confidence in `[0, 1]`
    pub confidence: f32,
    pub class_id: u32,
    /// Stable id across frames, when a tracker is attached
    pub track_id: Option<u64>,
}

impl Detection {
    pub fn new(bbox: BoundingBox, confidence: f32, class_id: u32) -> Self {
        Self {
            bbox,
            confidence: confidence.clamp(0.0, 1.0),
            class_id,
            track_id: None,
        }
    }
}

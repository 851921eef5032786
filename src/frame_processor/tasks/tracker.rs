// SPDX-License-Identifier: GPL-3.0-only

//! IoU tracker giving detections stable ids across frames
//!
//! Wraps another adapter. Each call matches the new detections against the
//! tracks from previous calls (greedy, best overlap first, same class only);
//! matched detections inherit the track id, the rest start new tracks.
//! Tracks unmatched for more than `max_age` calls are forgotten.

use crate::backends::camera::Frame;
use crate::constants::tracking;
use crate::errors::DetectionError;
use crate::frame_processor::DetectionAdapter;
use crate::frame_processor::types::{BoundingBox, Detection};
use tracing::trace;

#[derive(Debug, Clone)]
struct Track {
    id: u64,
    bbox: BoundingBox,
    class_id: u32,
    misses: u32,
}

/// Adapter wrapper that assigns track ids
pub struct Tracker<A> {
    inner: A,
    tracks: Vec<Track>,
    next_id: u64,
    match_iou: f32,
    max_age: u32,
}

impl<A: DetectionAdapter> Tracker<A> {
    pub fn new(inner: A) -> Self {
        Self::with_params(inner, tracking::MATCH_IOU, tracking::MAX_AGE)
    }

    pub fn with_params(inner: A, match_iou: f32, max_age: u32) -> Self {
        Self {
            inner,
            tracks: Vec::new(),
            next_id: 1,
            match_iou,
            max_age,
        }
    }

    /// Number of live tracks
    pub fn active_tracks(&self) -> usize {
        self.tracks.len()
    }

    fn assign(&mut self, detections: &mut [Detection]) {
        let mut pairs: Vec<(f32, usize, usize)> = Vec::new();
        for (ti, track) in self.tracks.iter().enumerate() {
            for (di, det) in detections.iter().enumerate() {
                if track.class_id != det.class_id {
                    continue;
                }
                let overlap = track.bbox.iou(&det.bbox);
                if overlap >= self.match_iou {
                    pairs.push((overlap, ti, di));
                }
            }
        }
        pairs.sort_by(|a, b| b.0.total_cmp(&a.0));

        let mut track_matched = vec![false; self.tracks.len()];
        let mut det_matched = vec![false; detections.len()];

        for (_, ti, di) in pairs {
            if track_matched[ti] || det_matched[di] {
                continue;
            }
            track_matched[ti] = true;
            det_matched[di] = true;

            let track = &mut self.tracks[ti];
            track.bbox = detections[di].bbox;
            track.misses = 0;
            detections[di].track_id = Some(track.id);
        }

        for (track, matched) in self.tracks.iter_mut().zip(&track_matched) {
            if !matched {
                track.misses += 1;
            }
        }
        let max_age = self.max_age;
        self.tracks.retain(|t| t.misses <= max_age);

        for (det, matched) in detections.iter_mut().zip(det_matched) {
            if matched {
                continue;
            }
            let id = self.next_id;
            self.next_id += 1;
            det.track_id = Some(id);
            self.tracks.push(Track {
                id,
                bbox: det.bbox,
                class_id: det.class_id,
                misses: 0,
            });
            trace!(track_id = id, class_id = det.class_id, "New track");
        }
    }
}

impl<A: DetectionAdapter> DetectionAdapter for Tracker<A> {
    fn detect(
        &mut self,
        frame: &Frame,
        confidence: f32,
        iou: f32,
    ) -> Result<Vec<Detection>, DetectionError> {
        let mut detections = self.inner.detect(frame, confidence, iou)?;
        self.assign(&mut detections);
        Ok(detections)
    }

    fn class_name(&self, class_id: u32) -> String {
        self.inner.class_name(class_id)
    }
}

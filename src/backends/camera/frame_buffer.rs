// SPDX-License-Identifier: GPL-3.0-only

//! Latest-frame slot shared between the capture thread and the viewer
//!
//! The capture thread overwrites the slot with every new frame and never
//! waits for the reader. The reader takes whatever is newest and never
//! waits for the writer to produce something new. Frames the reader did
//! not get to in time are simply lost.

use super::types::Frame;
use std::sync::{Mutex, PoisonError};
use tracing::warn;

#[derive(Default)]
struct Slot {
    latest: Option<Frame>,
    published: u64,
}

/// Single-slot frame hand-off guarded by one lock
///
/// The lock is only held to swap or clone the slot contents. Frame pixel
/// data is immutable and reference counted, so a reader holds a complete
/// frame even after the writer has moved on.
#[derive(Default)]
pub struct FrameBuffer {
    slot: Mutex<Slot>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the latest frame
    pub fn publish(&self, frame: Frame) {
        let mut slot = self.slot.lock().unwrap_or_else(|poisoned| {
            warn!("Frame buffer lock poisoned, recovering");
            PoisonError::into_inner(poisoned)
        });
        // Previous frame is dropped after the guard, outside the lock
        let previous = slot.latest.replace(frame);
        slot.published += 1;
        drop(slot);
        drop(previous);
    }

    /// The most recent frame, or `None` if nothing was published yet
    pub fn read_latest(&self) -> Option<Frame> {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.latest.clone()
    }

    /// Total number of frames published so far
    pub fn published_count(&self) -> u64 {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .published
    }

    /// Whether a frame has ever been published
    pub fn is_valid(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .latest
            .is_some()
    }
}

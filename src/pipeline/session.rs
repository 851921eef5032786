// SPDX-License-Identifier: GPL-3.0-only

//! Foreground session state
//!
//! Everything here is owned by the viewer thread and never shared.

use crate::constants::{FPS_SMOOTHING, confidence};
use crate::errors::ControlError;
use std::time::Instant;
use tracing::warn;

/// Frame-rate counter
///
/// The first tick reports 0 since there is no previous timestamp to
/// measure against.
#[derive(Debug, Clone, Default)]
pub struct FpsCounter {
    last_tick: Option<Instant>,
    fps: f32,
    smoothed: f32,
}

impl FpsCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a displayed frame at `now` and return the instantaneous FPS
    pub fn tick(&mut self, now: Instant) -> f32 {
        self.fps = match self.last_tick {
            Some(prev) => {
                let elapsed = now.saturating_duration_since(prev).as_secs_f32();
                if elapsed > 0.0 { 1.0 / elapsed } else { 0.0 }
            }
            None => 0.0,
        };
        self.last_tick = Some(now);

        self.smoothed = if self.smoothed == 0.0 {
            self.fps
        } else {
            FPS_SMOOTHING * self.fps + (1.0 - FPS_SMOOTHING) * self.smoothed
        };
        self.fps
    }

    pub fn fps(&self) -> f32 {
        self.fps
    }

    /// Exponential moving average of the instantaneous FPS
    pub fn smoothed(&self) -> f32 {
        self.smoothed
    }

    pub fn last_tick(&self) -> Option<Instant> {
        self.last_tick
    }
}

/// Integer confidence control (0..=100) as exposed by the display sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfidenceControl {
    value: i32,
}

impl Default for ConfidenceControl {
    fn default() -> Self {
        Self::new(confidence::INITIAL)
    }
}

impl ConfidenceControl {
    pub fn new(value: i32) -> Self {
        Self {
            value: value.clamp(confidence::MIN, confidence::MAX),
        }
    }

    pub fn value(&self) -> i32 {
        self.value
    }

    /// Move the control by `delta`, saturating at the ends
    pub fn adjust(&mut self, delta: i32) -> i32 {
        self.value = self
            .value
            .saturating_add(delta)
            .clamp(confidence::MIN, confidence::MAX);
        self.value
    }

    pub fn threshold(&self) -> f32 {
        control_to_threshold(self.value)
    }
}

/// Map a control position to a detection threshold (`value / 100.0`)
pub fn control_to_threshold(value: i32) -> f32 {
    value.clamp(confidence::MIN, confidence::MAX) as f32 / 100.0
}

/// Turn a control read into a threshold
///
/// Unreadable or out-of-range values fall back to `fallback_percent` so a
/// glitching control never stops the loop.
pub fn threshold_from_control(read: Result<i32, ControlError>, fallback_percent: i32) -> f32 {
    match read.and_then(check_control_range) {
        Ok(value) => control_to_threshold(value),
        Err(e) => {
            warn!(error = %e, fallback_percent, "Confidence control unusable");
            control_to_threshold(fallback_percent)
        }
    }
}

/// Reject control positions outside `confidence::MIN..=confidence::MAX`
pub fn check_control_range(value: i32) -> Result<i32, ControlError> {
    if (confidence::MIN..=confidence::MAX).contains(&value) {
        Ok(value)
    } else {
        Err(ControlError::OutOfRange(value))
    }
}

/// Mutable state of one viewer session
#[derive(Debug, Clone)]
pub struct SessionState {
    pub detection_enabled: bool,
    /// Threshold used on the most recent cycle, in `[0, 1]`
    pub confidence_threshold: f32,
    pub fps: FpsCounter,
    /// One-line message for the sink's status line
    pub status_message: String,
}

impl SessionState {
    pub fn new(detection_enabled: bool, initial_confidence_percent: i32) -> Self {
        Self {
            detection_enabled,
            confidence_threshold: control_to_threshold(initial_confidence_percent),
            fps: FpsCounter::new(),
            status_message: String::new(),
        }
    }

    /// Flip detection on or off and return the new state
    pub fn toggle_detection(&mut self) -> bool {
        self.detection_enabled = !self.detection_enabled;
        self.status_message = if self.detection_enabled {
            "Detection resumed".to_string()
        } else {
            "Detection paused".to_string()
        };
        self.detection_enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_first_tick_is_zero() {
        let mut counter = FpsCounter::new();
        assert_eq!(counter.tick(Instant::now()), 0.0);
        assert_eq!(counter.smoothed(), 0.0);
    }

    #[test]
    fn test_tick_measures_interval() {
        let mut counter = FpsCounter::new();
        let start = Instant::now();
        counter.tick(start);
        let fps = counter.tick(start + Duration::from_millis(50));
        assert!((fps - 20.0).abs() < 0.01);
        assert!((counter.smoothed() - 20.0).abs() < 0.01);

        counter.tick(start + Duration::from_millis(75));
        // 40 fps blended in at 10%
        assert!((counter.smoothed() - 22.0).abs() < 0.01);
    }

    #[test]
    fn test_same_instant_does_not_divide_by_zero() {
        let mut counter = FpsCounter::new();
        let now = Instant::now();
        counter.tick(now);
        assert_eq!(counter.tick(now), 0.0);
    }

    #[test]
    fn test_control_mapping() {
        assert_eq!(control_to_threshold(45), 0.45);
        assert_eq!(control_to_threshold(0), 0.0);
        assert_eq!(control_to_threshold(100), 1.0);
        assert_eq!(control_to_threshold(250), 1.0);
        assert_eq!(ConfidenceControl::default().threshold(), 0.45);
    }

    #[test]
    fn test_control_adjust_saturates() {
        let mut control = ConfidenceControl::new(97);
        assert_eq!(control.adjust(5), 100);
        assert_eq!(control.adjust(-101), 0);
        assert_eq!(control.adjust(i32::MIN), 0);
    }

    #[test]
    fn test_threshold_fallback() {
        assert_eq!(threshold_from_control(Ok(30), 50), 0.30);
        assert_eq!(threshold_from_control(Ok(-1), 50), 0.5);
        assert_eq!(threshold_from_control(Err(ControlError::Unavailable), 50), 0.5);
    }

    #[test]
    fn test_control_range_check() {
        assert_eq!(check_control_range(0), Ok(0));
        assert_eq!(check_control_range(100), Ok(100));
        assert_eq!(check_control_range(101), Err(ControlError::OutOfRange(101)));
        assert_eq!(
            threshold_from_control(Err(ControlError::OutOfRange(140)), 50),
            0.5
        );
    }

    #[test]
    fn test_toggle_round_trip() {
        let mut session = SessionState::new(true, 45);
        assert!(!session.toggle_detection());
        assert!(session.toggle_detection());
        assert!(session.detection_enabled);
        assert_eq!(session.status_message, "Detection resumed");
    }
}

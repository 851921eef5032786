// SPDX-License-Identifier: GPL-3.0-only

//! Render and input sink boundary
//!
//! The controller only ever talks to a [`RenderSink`]: it shows composed
//! frames, polls one key per cycle, asks whether the window is still open,
//! and reads the live confidence control.

pub mod headless;
pub mod terminal;

pub use headless::HeadlessSink;
pub use terminal::TerminalSink;

use crate::constants::confidence;
use crate::errors::{AppResult, ControlError};
use image::RgbImage;
use std::time::Duration;

/// Window state as reported by a sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    Open,
    Closed,
    /// The sink has no notion of a window (must not be taken as closed)
    Unsupported,
}

/// Key presses the controller understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Up,
    Down,
    Escape,
    /// Ctrl+C in raw mode, or an interrupt signal
    Interrupt,
}

/// What a key asks the controller to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Quit,
    Save,
    ToggleDetection,
    AdjustConfidence(i32),
}

impl Command {
    pub fn from_key(key: Key) -> Option<Self> {
        match key {
            Key::Char('q') | Key::Char('Q') | Key::Escape | Key::Interrupt => Some(Command::Quit),
            Key::Char('s') | Key::Char('S') => Some(Command::Save),
            Key::Char('d') | Key::Char('D') => Some(Command::ToggleDetection),
            Key::Char('+') | Key::Char('=') => Some(Command::AdjustConfidence(confidence::COARSE_STEP)),
            Key::Char('-') | Key::Char('_') => {
                Some(Command::AdjustConfidence(-confidence::COARSE_STEP))
            }
            Key::Up => Some(Command::AdjustConfidence(confidence::FINE_STEP)),
            Key::Down => Some(Command::AdjustConfidence(-confidence::FINE_STEP)),
            Key::Char(_) => None,
        }
    }
}

/// A place composed frames are shown and keys come from
pub trait RenderSink {
    /// Create the display window; called once before the first frame
    fn create_window(&mut self, name: &str, width: u32, height: u32) -> AppResult<()>;

    /// Present a composed frame with a one-line status message
    fn show(&mut self, name: &str, image: &RgbImage, status: &str) -> AppResult<()>;

    /// Whether the user closed the window
    fn window_state(&self, name: &str) -> WindowState;

    /// Wait up to `timeout` for one key press
    fn poll_key(&mut self, timeout: Duration) -> AppResult<Option<Key>>;

    /// Current position of the confidence control (0..=100)
    fn confidence_value(&self) -> Result<i32, ControlError>;

    /// Move the confidence control, returning its new position
    fn adjust_confidence(&mut self, delta: i32) -> Result<i32, ControlError>;

    /// Give the terminal/window back; called once on shutdown
    fn restore(&mut self) -> AppResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_commands() {
        assert_eq!(Command::from_key(Key::Char('q')), Some(Command::Quit));
        assert_eq!(Command::from_key(Key::Escape), Some(Command::Quit));
        assert_eq!(Command::from_key(Key::Interrupt), Some(Command::Quit));
        assert_eq!(Command::from_key(Key::Char('s')), Some(Command::Save));
        assert_eq!(Command::from_key(Key::Char('d')), Some(Command::ToggleDetection));
        assert_eq!(
            Command::from_key(Key::Char('-')),
            Some(Command::AdjustConfidence(-5))
        );
        assert_eq!(Command::from_key(Key::Up), Some(Command::AdjustConfidence(1)));
        assert_eq!(Command::from_key(Key::Char('x')), None);
    }
}

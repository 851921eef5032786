// SPDX-License-Identifier: GPL-3.0-only

//! Live Detect - live camera viewer with detection overlays
//!
//! A capture thread keeps the newest camera frame in a single shared slot;
//! the foreground loop reads that slot, runs a detector, draws boxes and a
//! status overlay, and shows the result while handling keys.
//!
//! # Architecture
//!
//! - [`backends`]: capture devices, the frame buffer and the capture thread
//! - [`frame_processor`]: the detection boundary, QR detector and tracker
//! - [`annotator`]: box, label and status drawing
//! - [`pipeline`]: the viewer loop, session state and snapshots
//! - [`display`]: terminal and headless sinks
//! - [`config`]: user configuration handling

pub mod annotator;
pub mod backends;
pub mod config;
pub mod constants;
pub mod display;
pub mod errors;
pub mod frame_processor;
pub mod pipeline;

// Re-export commonly used types
pub use backends::camera::{Frame, FrameBuffer};
pub use config::Config;
pub use errors::{AppError, AppResult};
pub use frame_processor::{BoundingBox, Detection, DetectionAdapter};
pub use pipeline::{ExitReason, PipelineController};

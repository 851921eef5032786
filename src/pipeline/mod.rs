// SPDX-License-Identifier: GPL-3.0-only

//! Viewer loop, its session state and snapshot output

pub mod controller;
pub mod session;
pub mod snapshot;

pub use controller::{Cycle, ExitReason, PipelineController, PipelineSettings};
pub use session::{ConfidenceControl, FpsCounter, SessionState};
pub use snapshot::{SnapshotFormat, SnapshotWriter};

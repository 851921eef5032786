// SPDX-License-Identifier: GPL-3.0-only

//! Hardware access layer
//!
//! - [`camera`]: capture devices, the capture thread and the shared frame slot

pub mod camera;

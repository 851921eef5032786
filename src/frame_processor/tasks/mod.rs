// SPDX-License-Identifier: GPL-3.0-only

//! Detection adapters and wrappers

pub mod qr_detector;
pub mod tracker;
pub mod yolo_detector;

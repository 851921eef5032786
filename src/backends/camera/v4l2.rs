// SPDX-License-Identifier: GPL-3.0-only

//! V4L2 webcam capture using the v4l crate
//!
//! Opens `/dev/videoN`, negotiates the first pixel format we can decode at
//! (or near) the requested resolution, and streams through memory-mapped
//! buffers. Every dequeued buffer is converted to packed RGB before it
//! leaves this module.

use super::format_converters::{self, PixelFormat};
use super::types::{CameraInfo, CaptureDevice, Frame};
use crate::constants::{V4L2_BUFFER_COUNT, V4L2_DEQUEUE_TIMEOUT};
use crate::errors::{CaptureError, CaptureResult};
use std::io;
use std::path::Path;
use tracing::{debug, info, warn};
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::{Format, FourCC};

/// Resolve a command-line source to a device node
///
/// A bare number selects `/dev/videoN`; anything else is used as a path.
pub fn resolve_device_path(source: &str) -> String {
    match source.trim().parse::<usize>() {
        Ok(index) => format!("/dev/video{}", index),
        Err(_) => source.trim().to_string(),
    }
}

/// Streaming V4L2 capture device
pub struct V4l2Camera {
    path: String,
    name: String,
    width: u32,
    height: u32,
    stride: u32,
    format: PixelFormat,
    sequence: u64,
    // Declared before `device` so streaming stops before the fd closes
    stream: Option<Stream<'static>>,
    device: Device,
}

impl V4l2Camera {
    /// Open a device and start streaming
    ///
    /// `width_hint`/`height_hint` are requests only; the negotiated size is
    /// whatever the driver settles on.
    pub fn open(source: &str, width_hint: u32, height_hint: u32) -> CaptureResult<Self> {
        let path = resolve_device_path(source);
        if !Path::new(&path).exists() {
            return Err(CaptureError::DeviceNotFound(path));
        }

        info!(path = %path, width_hint, height_hint, "Opening V4L2 device");

        let device = Device::with_path(&path)
            .map_err(|e| CaptureError::OpenFailed(format!("{}: {}", path, e)))?;

        let name = device
            .query_caps()
            .map(|caps| caps.card)
            .unwrap_or_else(|_| path.clone());

        let (format, negotiated) = negotiate_format(&device, width_hint, height_hint)?;

        if negotiated.width != width_hint || negotiated.height != height_hint {
            info!(
                requested = format!("{}x{}", width_hint, height_hint),
                actual = format!("{}x{}", negotiated.width, negotiated.height),
                "Device did not honor resolution hint"
            );
        }

        let mut stream = Stream::with_buffers(&device, Type::VideoCapture, V4L2_BUFFER_COUNT)
            .map_err(|e| CaptureError::OpenFailed(format!("failed to create stream: {}", e)))?;
        stream.set_timeout(V4L2_DEQUEUE_TIMEOUT);

        info!(
            path = %path,
            name = %name,
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?negotiated.fourcc,
            "V4L2 capture stream ready"
        );

        Ok(Self {
            path,
            name,
            width: negotiated.width,
            height: negotiated.height,
            stride: negotiated.stride,
            format,
            sequence: 0,
            stream: Some(stream),
            device,
        })
    }

    /// Negotiated frame size
    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

fn negotiate_format(
    device: &Device,
    width: u32,
    height: u32,
) -> CaptureResult<(PixelFormat, Format)> {
    let supported: Vec<FourCC> = device
        .enum_formats()
        .map(|formats| formats.into_iter().map(|f| f.fourcc).collect())
        .unwrap_or_default();

    for candidate in PixelFormat::PREFERRED {
        let fourcc = FourCC::new(candidate.fourcc());
        if !supported.is_empty() && !supported.contains(&fourcc) {
            continue;
        }

        match device.set_format(&Format::new(width, height, fourcc)) {
            Ok(actual) if actual.fourcc == fourcc => return Ok((candidate, actual)),
            Ok(actual) => {
                debug!(requested = ?fourcc, got = ?actual.fourcc, "Format substituted by driver");
            }
            Err(e) => {
                debug!(fourcc = ?fourcc, error = %e, "Format rejected");
            }
        }
    }

    // Fall back to whatever the device is already configured for
    let current = device
        .format()
        .map_err(|e| CaptureError::OpenFailed(format!("failed to query format: {}", e)))?;
    match PixelFormat::from_fourcc(&current.fourcc.repr) {
        Some(format) => {
            warn!(fourcc = ?current.fourcc, "Using device's current format");
            Ok((format, current))
        }
        None => Err(CaptureError::FormatNotSupported(format!(
            "no decodable format (device offers {:?})",
            supported
        ))),
    }
}

impl CaptureDevice for V4l2Camera {
    fn describe(&self) -> String {
        format!(
            "{} ({}, {}x{} {:?})",
            self.name, self.path, self.width, self.height, self.format
        )
    }

    fn acquire_frame(&mut self) -> CaptureResult<Frame> {
        let stream = self.stream.as_mut().ok_or(CaptureError::Stopped)?;

        let (buf, meta) = stream.next().map_err(|e| match e.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::BrokenPipe => CaptureError::Stopped,
            _ if e.raw_os_error() == Some(19) => CaptureError::Stopped, // ENODEV: unplugged
            _ => CaptureError::ReadFailed(e.to_string()),
        })?;

        let used = (meta.bytesused as usize).min(buf.len());
        let data = if used > 0 { &buf[..used] } else { buf };

        let rgb = format_converters::to_rgb(self.format, data, self.width, self.height, self.stride)?;
        let sequence = self.sequence;
        self.sequence += 1;

        Frame::from_rgb(self.width, self.height, rgb, sequence)
            .ok_or_else(|| CaptureError::Decode("converted frame has wrong size".to_string()))
    }

    fn release(mut self: Box<Self>) {
        info!(path = %self.path, frames = self.sequence, "Releasing V4L2 device");
        // Dropping the stream issues STREAMOFF and unmaps the buffers
        self.stream.take();
    }
}

/// Enumerate V4L2 capture devices
pub fn list_cameras() -> Vec<CameraInfo> {
    let mut cameras: Vec<CameraInfo> = v4l::context::enum_devices()
        .into_iter()
        .filter_map(|node| {
            let path = node.path().to_string_lossy().to_string();
            let device = Device::with_path(&path).ok()?;
            let formats: Vec<String> = device
                .enum_formats()
                .ok()?
                .into_iter()
                .map(|f| String::from_utf8_lossy(&f.fourcc.repr).trim().to_string())
                .collect();

            // Metadata nodes expose no capture formats
            if formats.is_empty() {
                return None;
            }

            let name = node
                .name()
                .or_else(|| device.query_caps().ok().map(|c| c.card))
                .unwrap_or_else(|| path.clone());

            Some(CameraInfo {
                index: node.index(),
                path,
                name,
                formats,
            })
        })
        .collect();

    cameras.sort_by_key(|c| c.index);
    cameras
}

// SPDX-License-Identifier: GPL-3.0-only

//! Pixel format conversion from device-native layouts to packed RGB8
//!
//! Webcams typically deliver MJPEG or packed YUYV 4:2:2; a few monochrome
//! sensors deliver GREY. Everything downstream of the capture device works
//! on packed RGB, so conversion happens on the capture thread.

use crate::errors::{CaptureError, CaptureResult};

/// Native capture layouts we know how to decode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Motion JPEG, one complete JPEG per buffer
    Mjpeg,
    /// Packed YUV 4:2:2: Y0 U Y1 V
    Yuyv,
    /// 8-bit luma only
    Grey,
    /// Packed RGB, 3 bytes per pixel
    Rgb24,
}

impl PixelFormat {
    /// FourCC bytes used by V4L2
    pub fn fourcc(&self) -> &'static [u8; 4] {
        match self {
            PixelFormat::Mjpeg => b"MJPG",
            PixelFormat::Yuyv => b"YUYV",
            PixelFormat::Grey => b"GREY",
            PixelFormat::Rgb24 => b"RGB3",
        }
    }

    /// Map a FourCC back to a known format
    pub fn from_fourcc(fourcc: &[u8; 4]) -> Option<Self> {
        match fourcc {
            b"MJPG" | b"JPEG" => Some(PixelFormat::Mjpeg),
            b"YUYV" => Some(PixelFormat::Yuyv),
            b"GREY" => Some(PixelFormat::Grey),
            b"RGB3" => Some(PixelFormat::Rgb24),
            _ => None,
        }
    }

    /// Preference order when negotiating with a device
    pub const PREFERRED: [PixelFormat; 4] = [
        PixelFormat::Mjpeg,
        PixelFormat::Yuyv,
        PixelFormat::Rgb24,
        PixelFormat::Grey,
    ];
}

/// Decode one device buffer into packed RGB
///
/// `stride` is the bytes-per-line the driver reported (0 means tightly packed).
pub fn to_rgb(
    format: PixelFormat,
    data: &[u8],
    width: u32,
    height: u32,
    stride: u32,
) -> CaptureResult<Vec<u8>> {
    match format {
        PixelFormat::Mjpeg => mjpeg_to_rgb(data, width, height),
        PixelFormat::Yuyv => yuyv_to_rgb(data, width, height, stride),
        PixelFormat::Grey => grey_to_rgb(data, width, height, stride),
        PixelFormat::Rgb24 => rgb_without_stride(data, width, height, stride),
    }
}

/// Convert YUV (BT.601) to RGB
pub fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y = y as f32;
    let u = u as f32 - 128.0;
    let v = v as f32 - 128.0;

    let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
    let g = (y - 0.344136 * u - 0.714136 * v).clamp(0.0, 255.0) as u8;
    let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;

    [r, g, b]
}

/// Convert packed YUYV 4:2:2 to RGB
///
/// Each 4-byte group encodes two horizontally adjacent pixels sharing chroma.
pub fn yuyv_to_rgb(data: &[u8], width: u32, height: u32, stride: u32) -> CaptureResult<Vec<u8>> {
    if width % 2 == 1 {
        return Err(CaptureError::Decode(format!("YUYV width {} is odd", width)));
    }
    let row_bytes = (width * 2) as usize;
    let stride = if stride == 0 { row_bytes } else { stride as usize };
    check_len(data, stride, row_bytes, height)?;

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for row in data.chunks(stride).take(height as usize) {
        for chunk in row[..row_bytes].chunks_exact(4) {
            let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
            rgb.extend_from_slice(&yuv_to_rgb(y0, u, v));
            rgb.extend_from_slice(&yuv_to_rgb(y1, u, v));
        }
    }
    Ok(rgb)
}

/// Expand 8-bit grayscale to RGB
pub fn grey_to_rgb(data: &[u8], width: u32, height: u32, stride: u32) -> CaptureResult<Vec<u8>> {
    let row_bytes = width as usize;
    let stride = if stride == 0 { row_bytes } else { stride as usize };
    check_len(data, stride, row_bytes, height)?;

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for row in data.chunks(stride).take(height as usize) {
        for &v in &row[..row_bytes] {
            rgb.extend_from_slice(&[v, v, v]);
        }
    }
    Ok(rgb)
}

/// Decode a JPEG buffer to RGB, rejecting images with unexpected dimensions
pub fn mjpeg_to_rgb(data: &[u8], width: u32, height: u32) -> CaptureResult<Vec<u8>> {
    let image = image::load_from_memory_with_format(data, image::ImageFormat::Jpeg)
        .map_err(|e| CaptureError::Decode(format!("MJPEG: {}", e)))?
        .to_rgb8();

    if image.width() != width || image.height() != height {
        return Err(CaptureError::Decode(format!(
            "MJPEG frame is {}x{}, expected {}x{}",
            image.width(),
            image.height(),
            width,
            height
        )));
    }
    Ok(image.into_raw())
}

fn rgb_without_stride(data: &[u8], width: u32, height: u32, stride: u32) -> CaptureResult<Vec<u8>> {
    let row_bytes = (width * 3) as usize;
    let stride = if stride == 0 { row_bytes } else { stride as usize };
    check_len(data, stride, row_bytes, height)?;

    let mut rgb = Vec::with_capacity(row_bytes * height as usize);
    for row in data.chunks(stride).take(height as usize) {
        rgb.extend_from_slice(&row[..row_bytes]);
    }
    Ok(rgb)
}

fn check_len(data: &[u8], stride: usize, row_bytes: usize, height: u32) -> CaptureResult<()> {
    if height == 0 || stride < row_bytes {
        return Err(CaptureError::Decode(format!(
            "invalid geometry: stride {} < row {}",
            stride, row_bytes
        )));
    }
    // Last row may omit its padding
    let needed = stride * (height as usize - 1) + row_bytes;
    if data.len() < needed {
        return Err(CaptureError::Decode(format!(
            "short buffer: {} bytes, need {}",
            data.len(),
            needed
        )));
    }
    Ok(())
}

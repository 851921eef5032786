// SPDX-License-Identifier: GPL-3.0-only

//! Frame annotation
//!
//! Draws detection boxes with class labels and the status overlay (FPS and
//! detection state) onto a copy of the captured frame. Nothing here touches
//! the frame buffer; callers always get a fresh image to display or save.

pub mod font;

use crate::backends::camera::Frame;
use crate::constants::{CLASS_COLORS, colors};
use crate::frame_processor::Detection;
use font::draw_text;
use image::{Rgb, RgbImage};

/// Box outline width in pixels
const BOX_THICKNESS: u32 = 2;
/// Height of the filled strip behind a label
const LABEL_HEIGHT: u32 = 25;
const LABEL_SCALE: u32 = 2;
const LABEL_PADDING: i32 = 4;
const STATUS_SCALE: u32 = 3;
const STATUS_MARGIN: i32 = 20;

/// Everything the status overlay shows
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusOverlay {
    pub fps: f32,
    pub detection_enabled: bool,
    /// Newest frame is old enough that the feed looks lost
    pub feed_stale: bool,
}

/// Colour for a class id, cycling through the palette
pub fn class_color(class_id: u32) -> Rgb<u8> {
    Rgb(CLASS_COLORS[class_id as usize % CLASS_COLORS.len()])
}

/// Label drawn above a box, e.g. `person 0.87` or `person 0.87 #4`
pub fn label_text(detection: &Detection, class_name: &str) -> String {
    match detection.track_id {
        Some(id) => format!("{} {:.2} #{}", class_name, detection.confidence, id),
        None => format!("{} {:.2}", class_name, detection.confidence),
    }
}

/// Copy `frame` and draw every detection onto the copy
pub fn annotate_detections<F>(frame: &Frame, detections: &[Detection], class_name: F) -> RgbImage
where
    F: Fn(u32) -> String,
{
    let mut image = frame.to_rgb_image();
    draw_detections(&mut image, detections, class_name);
    image
}

/// Draw boxes and labels in place
pub fn draw_detections<F>(image: &mut RgbImage, detections: &[Detection], class_name: F)
where
    F: Fn(u32) -> String,
{
    for detection in detections {
        let color = class_color(detection.class_id);
        let (x1, y1, x2, y2) = detection.bbox.to_pixels();
        draw_rectangle(image, x1, y1, x2, y2, BOX_THICKNESS, color);

        let text = label_text(detection, &class_name(detection.class_id));
        let (text_width, text_height) = font::text_size(&text, LABEL_SCALE);

        // Above the box when there is room, otherwise just inside its top edge
        let label_top = if y1 >= LABEL_HEIGHT as i32 {
            y1 - LABEL_HEIGHT as i32
        } else {
            y1
        };
        fill_rect(
            image,
            x1,
            label_top,
            x1.saturating_add(text_width as i32 + 2 * LABEL_PADDING),
            label_top.saturating_add(LABEL_HEIGHT as i32),
            color,
        );
        let text_y = label_top.saturating_add((LABEL_HEIGHT as i32 - text_height as i32) / 2);
        draw_text(
            image,
            x1.saturating_add(LABEL_PADDING),
            text_y,
            &text,
            LABEL_SCALE,
            Rgb(colors::LABEL_TEXT),
        );
    }
}

/// Draw the FPS counter (top-left), detection state (bottom-left) and the
/// lost-feed warning (top-right)
pub fn draw_status(image: &mut RgbImage, status: &StatusOverlay) {
    let fps_text = format!("FPS: {}", status.fps.max(0.0) as u32);
    draw_text(
        image,
        STATUS_MARGIN,
        STATUS_MARGIN,
        &fps_text,
        STATUS_SCALE,
        Rgb(colors::FPS),
    );

    let (state_text, state_color) = if status.detection_enabled {
        ("Detection: ON", colors::DETECTION_ON)
    } else {
        ("Detection: OFF (Paused)", colors::DETECTION_OFF)
    };
    let (_, text_height) = font::text_size(state_text, STATUS_SCALE);
    let state_y = image.height() as i32 - STATUS_MARGIN - text_height as i32;
    draw_text(
        image,
        STATUS_MARGIN,
        state_y,
        state_text,
        STATUS_SCALE,
        Rgb(state_color),
    );

    if status.feed_stale {
        let warning = "NO SIGNAL";
        let (width, _) = font::text_size(warning, STATUS_SCALE);
        let x = image.width() as i32 - STATUS_MARGIN - width as i32;
        draw_text(
            image,
            x,
            STATUS_MARGIN,
            warning,
            STATUS_SCALE,
            Rgb(colors::WARNING),
        );
    }
}

fn draw_rectangle(
    image: &mut RgbImage,
    x1: i32,
    y1: i32,
    x2: i32,
    y2: i32,
    thickness: u32,
    color: Rgb<u8>,
) {
    let inset = thickness.max(1) as i32 - 1;
    fill_rect(image, x1, y1, x2, y1.saturating_add(inset), color);
    fill_rect(image, x1, y2.saturating_sub(inset), x2, y2, color);
    fill_rect(image, x1, y1, x1.saturating_add(inset), y2, color);
    fill_rect(image, x2.saturating_sub(inset), y1, x2, y2, color);
}

/// Fill the inclusive rectangle (x1, y1)..=(x2, y2), clipped to the image
fn fill_rect(image: &mut RgbImage, x1: i32, y1: i32, x2: i32, y2: i32, color: Rgb<u8>) {
    let (width, height) = (image.width() as i32, image.height() as i32);
    if width == 0 || height == 0 {
        return;
    }
    if x1.max(x2) < 0 || y1.max(y2) < 0 || x1.min(x2) >= width || y1.min(y2) >= height {
        return;
    }
    let left = x1.min(x2).clamp(0, width - 1);
    let right = x1.max(x2).clamp(0, width - 1);
    let top = y1.min(y2).clamp(0, height - 1);
    let bottom = y1.max(y2).clamp(0, height - 1);

    for y in top..=bottom {
        for x in left..=right {
            image.put_pixel(x as u32, y as u32, color);
        }
    }
}

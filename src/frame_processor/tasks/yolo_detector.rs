// SPDX-License-Identifier: GPL-3.0-only

//! YOLOv8 object detection through ONNX Runtime
//!
//! Loads an exported YOLOv8 model (`yolo export format=onnx`), letterboxes
//! each frame to the square model input, and decodes the raw output tensor
//! into [`Detection`]s in frame pixel coordinates. Class ids index the
//! 80-entry COCO label table.
//!
//! The output is `[1, 4 + classes, anchors]` (rows are `cx, cy, w, h` in
//! model-input pixels followed by one score per class). The transposed
//! `[1, anchors, 4 + classes]` layout some exporters emit is accepted too.

use crate::backends::camera::Frame;
use crate::errors::DetectionError;
use crate::frame_processor::types::{BoundingBox, Detection};
use crate::frame_processor::{DetectionAdapter, postprocess};
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgb, RgbImage};
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, trace};

/// COCO class names (80 classes)
pub const COCO_CLASSES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat",
    "dog", "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack",
    "umbrella", "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball",
    "kite", "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket",
    "bottle", "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple",
    "sandwich", "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair",
    "couch", "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse",
    "remote", "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator",
    "book", "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

/// Grey used for letterbox padding
const PAD_VALUE: u8 = 114;

/// Box rows preceding the class scores
const BOX_ROWS: usize = 4;

/// COCO label for `class_id`, or the id itself for custom models
pub fn coco_class_name(class_id: u32) -> String {
    COCO_CLASSES
        .get(class_id as usize)
        .map(|name| name.to_string())
        .unwrap_or_else(|| class_id.to_string())
}

/// Placement of a frame inside the square model input
///
/// The frame is scaled uniformly to fit and centred; the rest is padding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: u32,
    pub pad_y: u32,
    pub scaled_width: u32,
    pub scaled_height: u32,
}

impl Letterbox {
    pub fn fit(width: u32, height: u32, input_size: u32) -> Self {
        let scale = (input_size as f32 / width.max(1) as f32)
            .min(input_size as f32 / height.max(1) as f32);
        let scaled_width = ((width as f32 * scale).round() as u32).clamp(1, input_size);
        let scaled_height = ((height as f32 * scale).round() as u32).clamp(1, input_size);
        Self {
            scale,
            pad_x: (input_size - scaled_width) / 2,
            pad_y: (input_size - scaled_height) / 2,
            scaled_width,
            scaled_height,
        }
    }

    /// Map a point from model-input pixels back to frame pixels
    pub fn to_frame(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (x - self.pad_x as f32) / self.scale,
            (y - self.pad_y as f32) / self.scale,
        )
    }
}

/// Letterbox `frame` into a normalised CHW tensor of side `input_size`
pub fn preprocess(frame: &Frame, input_size: u32) -> Result<(Vec<f32>, Letterbox), DetectionError> {
    let view: ImageBuffer<Rgb<u8>, &[u8]> =
        ImageBuffer::from_raw(frame.width, frame.height, &frame.data[..])
            .ok_or_else(|| DetectionError::InvalidFrame("frame size mismatch".to_string()))?;

    let letterbox = Letterbox::fit(frame.width, frame.height, input_size);
    let resized = imageops::resize(
        &view,
        letterbox.scaled_width,
        letterbox.scaled_height,
        FilterType::Triangle,
    );
    let mut canvas = RgbImage::from_pixel(input_size, input_size, Rgb([PAD_VALUE; 3]));
    imageops::replace(
        &mut canvas,
        &resized,
        i64::from(letterbox.pad_x),
        i64::from(letterbox.pad_y),
    );

    let plane = (input_size * input_size) as usize;
    let mut tensor = vec![0.0f32; plane * 3];
    for (index, pixel) in canvas.pixels().enumerate() {
        for channel in 0..3 {
            tensor[channel * plane + index] = pixel[channel] as f32 / 255.0;
        }
    }
    Ok((tensor, letterbox))
}

/// Decode a raw YOLOv8 output tensor
///
/// Keeps anchors whose best class score is at least `min_score`. Boxes are
/// returned in frame pixels; clamping and NMS are left to [`postprocess`].
pub fn decode_output(
    shape: &[i64],
    data: &[f32],
    letterbox: &Letterbox,
    min_score: f32,
) -> Result<Vec<Detection>, DetectionError> {
    let [batch, dim_a, dim_b] = shape else {
        return Err(DetectionError::Backend(format!(
            "unexpected output rank: {:?}",
            shape
        )));
    };
    if *batch < 1 || *dim_a <= 0 || *dim_b <= 0 {
        return Err(DetectionError::Backend(format!(
            "unexpected output shape: {:?}",
            shape
        )));
    }

    // Anchors always outnumber attribute rows
    let (rows, anchors, transposed) = if dim_a <= dim_b {
        (*dim_a as usize, *dim_b as usize, false)
    } else {
        (*dim_b as usize, *dim_a as usize, true)
    };
    if rows <= BOX_ROWS {
        return Err(DetectionError::Backend(format!(
            "output has no class scores: {:?}",
            shape
        )));
    }
    if data.len() < rows * anchors {
        return Err(DetectionError::Backend(format!(
            "output holds {} values, shape {:?} needs {}",
            data.len(),
            shape,
            rows * anchors
        )));
    }

    let value = |row: usize, anchor: usize| {
        if transposed {
            data[anchor * rows + row]
        } else {
            data[row * anchors + anchor]
        }
    };

    let mut detections = Vec::new();
    for anchor in 0..anchors {
        let (class_id, score) = (BOX_ROWS..rows)
            .map(|row| (row - BOX_ROWS, value(row, anchor)))
            .fold((0, f32::NEG_INFINITY), |best, candidate| {
                if candidate.1 > best.1 { candidate } else { best }
            });
        if !score.is_finite() || score < min_score {
            continue;
        }

        let (cx, cy, w, h) = (
            value(0, anchor),
            value(1, anchor),
            value(2, anchor),
            value(3, anchor),
        );
        if ![cx, cy, w, h].iter().all(|v| v.is_finite()) {
            continue;
        }

        let (x1, y1) = letterbox.to_frame(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = letterbox.to_frame(cx + w / 2.0, cy + h / 2.0);
        detections.push(Detection::new(
            BoundingBox::new(x1, y1, x2, y2),
            score.min(1.0),
            class_id as u32,
        ));
    }
    Ok(detections)
}

/// YOLOv8 adapter backed by an ONNX Runtime session
pub struct YoloDetector {
    session: Session,
    input_size: u32,
}

impl YoloDetector {
    /// Load the model and run one warm-up inference
    pub fn load(model_path: &Path, input_size: u32) -> Result<Self, DetectionError> {
        if !model_path.is_file() {
            return Err(DetectionError::Backend(format!(
                "model file not found: {}",
                model_path.display()
            )));
        }

        let session = open_session(model_path).map_err(|e| {
            DetectionError::Backend(format!(
                "failed to load YOLO model {}: {}",
                model_path.display(),
                e
            ))
        })?;
        info!(path = %model_path.display(), input_size, "YOLO model loaded");

        let mut detector = Self {
            session,
            input_size,
        };
        detector.warm_up()?;
        Ok(detector)
    }

    /// Run once on a blank input so the first live frame is not slowed
    /// by runtime allocation
    fn warm_up(&mut self) -> Result<(), DetectionError> {
        let side = self.input_size;
        let blank = Frame::from_rgb(side, side, vec![0; (side * side * 3) as usize], 0)
            .ok_or_else(|| DetectionError::InvalidFrame("bad warm-up size".to_string()))?;
        let start = Instant::now();
        self.infer(&blank, 1.0)?;
        info!(
            elapsed_ms = start.elapsed().as_millis(),
            "YOLO model warmed up"
        );
        Ok(())
    }

    fn infer(&mut self, frame: &Frame, min_score: f32) -> Result<Vec<Detection>, DetectionError> {
        let start = Instant::now();
        let side = self.input_size as usize;
        let (input, letterbox) = preprocess(frame, self.input_size)?;

        let tensor = Tensor::from_array(([1usize, 3, side, side], input))
            .map_err(|e| DetectionError::Backend(format!("failed to build input: {}", e)))?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .map_err(|e| DetectionError::Backend(format!("YOLO inference failed: {}", e)))?;
        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectionError::Backend(format!("bad YOLO output: {}", e)))?;
        let shape: Vec<i64> = shape.iter().copied().collect();

        let detections = decode_output(&shape, data, &letterbox, min_score)?;
        trace!(
            candidates = detections.len(),
            elapsed_ms = start.elapsed().as_millis(),
            "YOLO inference complete"
        );
        Ok(detections)
    }
}

fn open_session(model_path: &Path) -> ort::Result<Session> {
    Session::builder()?.commit_from_file(model_path)
}

impl DetectionAdapter for YoloDetector {
    fn detect(
        &mut self,
        frame: &Frame,
        confidence: f32,
        iou: f32,
    ) -> Result<Vec<Detection>, DetectionError> {
        if frame.width == 0 || frame.height == 0 {
            return Err(DetectionError::InvalidFrame("empty frame".to_string()));
        }

        let raw = self.infer(frame, confidence)?;
        let detections = postprocess(raw, confidence, iou, frame.width, frame.height);
        debug!(count = detections.len(), "YOLO detections");
        Ok(detections)
    }

    fn class_name(&self, class_id: u32) -> String {
        coco_class_name(class_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLASSES: usize = 80;
    const ROWS: usize = BOX_ROWS + CLASSES;
    const ANCHORS: usize = 100;

    /// Channels-first output; anchors after the given ones score zero
    fn output(anchors: &[([f32; 4], usize, f32)]) -> (Vec<i64>, Vec<f32>) {
        let n = ANCHORS;
        let mut data = vec![0.0f32; ROWS * n];
        for (i, (bbox, class, score)) in anchors.iter().enumerate() {
            for (row, v) in bbox.iter().enumerate() {
                data[row * n + i] = *v;
            }
            data[(BOX_ROWS + class) * n + i] = *score;
        }
        (vec![1, ROWS as i64, n as i64], data)
    }

    #[test]
    fn test_letterbox_fit() {
        let square = Letterbox::fit(640, 640, 640);
        assert_eq!((square.scale, square.pad_x, square.pad_y), (1.0, 0, 0));

        let wide = Letterbox::fit(1280, 720, 640);
        assert_eq!(wide.scale, 0.5);
        assert_eq!((wide.scaled_width, wide.scaled_height), (640, 360));
        assert_eq!((wide.pad_x, wide.pad_y), (0, 140));
        assert_eq!(wide.to_frame(320.0, 320.0), (640.0, 360.0));
    }

    #[test]
    fn test_decode_picks_best_class_and_filters_scores() {
        let (shape, data) = output(&[
            ([320.0, 320.0, 100.0, 50.0], 2, 0.9),
            ([100.0, 100.0, 10.0, 10.0], 0, 0.2),
        ]);
        let letterbox = Letterbox::fit(640, 640, 640);
        let detections = decode_output(&shape, &data, &letterbox, 0.5).unwrap();

        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].class_id, 2);
        assert_eq!(detections[0].confidence, 0.9);
        assert_eq!(
            detections[0].bbox,
            BoundingBox::new(270.0, 295.0, 370.0, 345.0)
        );
        assert_eq!(coco_class_name(detections[0].class_id), "car");
    }

    #[test]
    fn test_decode_undoes_letterbox() {
        // 1280x720 frame: scale 0.5, 140 px of padding above and below
        let (shape, data) = output(&[([320.0, 320.0, 64.0, 32.0], 0, 0.8)]);
        let letterbox = Letterbox::fit(1280, 720, 640);
        let detections = decode_output(&shape, &data, &letterbox, 0.25).unwrap();

        assert_eq!(
            detections[0].bbox,
            BoundingBox::new(576.0, 328.0, 704.0, 392.0)
        );
    }

    #[test]
    fn test_decode_accepts_transposed_layout() {
        let (_, channels_first) = output(&[
            ([50.0, 60.0, 20.0, 20.0], 15, 0.7),
            ([10.0, 10.0, 4.0, 4.0], 1, 0.1),
        ]);
        let mut transposed = vec![0.0f32; channels_first.len()];
        for row in 0..ROWS {
            for anchor in 0..ANCHORS {
                transposed[anchor * ROWS + row] = channels_first[row * ANCHORS + anchor];
            }
        }

        let letterbox = Letterbox::fit(640, 640, 640);
        let shape = [1, ANCHORS as i64, ROWS as i64];
        let detections = decode_output(&shape, &transposed, &letterbox, 0.5).unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(coco_class_name(detections[0].class_id), "cat");
        assert_eq!(detections[0].bbox, BoundingBox::new(40.0, 50.0, 60.0, 70.0));
    }

    #[test]
    fn test_decode_rejects_malformed_output() {
        let letterbox = Letterbox::fit(640, 640, 640);
        assert!(decode_output(&[1, 84], &[0.0; 84], &letterbox, 0.5).is_err());
        assert!(decode_output(&[1, 4, 100], &[0.0; 400], &letterbox, 0.5).is_err());
        assert!(decode_output(&[1, 84, 10], &[0.0; 100], &letterbox, 0.5).is_err());
    }

    #[test]
    fn test_preprocess_pads_and_normalises() {
        let frame = Frame::from_rgb(4, 2, vec![255; 4 * 2 * 3], 0).unwrap();
        let (tensor, letterbox) = preprocess(&frame, 8).unwrap();

        assert_eq!(tensor.len(), 3 * 8 * 8);
        assert_eq!((letterbox.pad_x, letterbox.pad_y), (0, 2));
        // Top row is padding, centre row is the white frame
        assert_eq!(tensor[0], PAD_VALUE as f32 / 255.0);
        assert_eq!(tensor[4 * 8 + 3], 1.0);
        assert_eq!(tensor[2 * 64 + 4 * 8 + 3], 1.0);
    }

    #[test]
    fn test_class_names_fall_back_to_id() {
        assert_eq!(coco_class_name(0), "person");
        assert_eq!(coco_class_name(79), "toothbrush");
        assert_eq!(coco_class_name(80), "80");
    }

    #[test]
    fn test_missing_model_is_reported() {
        let err = YoloDetector::load(Path::new("/nonexistent/yolov8s.onnx"), 640)
            .err()
            .unwrap();
        assert!(matches!(err, DetectionError::Backend(msg) if msg.contains("not found")));
    }
}

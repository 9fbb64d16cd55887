//! SCRFD face detector.
//!
//! Decodes the anchor-free SCRFD output layout (three strides, two
//! anchors per feature cell, distance-format box regression) and runs
//! confidence-sorted non-maximum suppression over the candidates.

use std::sync::Arc;

use anyhow::Result;
use image::{DynamicImage, GenericImageView};
use openvino::InferRequest;
use tracing::debug;

use super::pool::{tensor_from_nchw, tensor_to_vec, ModelKind, ModelPool};
use super::preprocess::{detector_input, LetterboxMap, DETECTOR_INPUT_SIZE};

const STRIDES: [i32; 3] = [8, 16, 32];
const ANCHORS_PER_CELL: usize = 2;

/// One detected face region, in original image coordinates.
#[derive(Debug, Clone)]
pub struct FaceBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
}

impl FaceBox {
    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }
}

pub struct FaceDetector {
    pool: Arc<ModelPool>,
    confidence_threshold: f32,
    nms_threshold: f32,
}

impl FaceDetector {
    pub fn new(pool: Arc<ModelPool>, confidence_threshold: f32) -> Self {
        Self {
            pool,
            confidence_threshold,
            nms_threshold: 0.4,
        }
    }

    /// Detect faces in an image. The returned order is confidence
    /// descending (the NMS keep order).
    pub fn detect(&self, image: &DynamicImage) -> Result<Vec<FaceBox>> {
        let map = LetterboxMap::new(image.dimensions(), DETECTOR_INPUT_SIZE);
        let input = tensor_from_nchw(&detector_input(image))?;

        let model = self.pool.get(ModelKind::Detector)?;
        let mut request = model.create_infer_request()?;
        request.set_input_tensor(&input)?;
        request.infer()?;

        let candidates = self.decode_outputs(&request, &map)?;
        let faces = nms(candidates, self.nms_threshold);
        debug!(count = faces.len(), "faces detected");
        Ok(faces)
    }

    /// Decode the det_10g output layout: tensors 0..3 are per-stride
    /// scores, tensors 3..6 the matching box deltas. Box deltas are
    /// distances from the anchor center, in stride units.
    fn decode_outputs(&self, request: &InferRequest, map: &LetterboxMap) -> Result<Vec<FaceBox>> {
        let (input_w, input_h) = (DETECTOR_INPUT_SIZE.0 as i32, DETECTOR_INPUT_SIZE.1 as i32);
        let mut boxes = Vec::new();

        for (idx, &stride) in STRIDES.iter().enumerate() {
            let scores = tensor_to_vec(&request.get_output_tensor_by_index(idx)?)?;
            let deltas = tensor_to_vec(&request.get_output_tensor_by_index(idx + STRIDES.len())?)?;

            let cells_x = input_w / stride;
            let cells_y = input_h / stride;

            let mut anchor = 0usize;
            for cell_y in 0..cells_y {
                for cell_x in 0..cells_x {
                    for _ in 0..ANCHORS_PER_CELL {
                        let i = anchor;
                        anchor += 1;

                        let score = match scores.get(i) {
                            Some(&s) => s,
                            None => continue,
                        };
                        if score < self.confidence_threshold {
                            continue;
                        }

                        let d = i * 4;
                        if d + 3 >= deltas.len() {
                            continue;
                        }

                        let cx = cell_x as f32 * stride as f32;
                        let cy = cell_y as f32 * stride as f32;
                        let s = stride as f32;

                        let (x1, y1) = map.to_original(cx - deltas[d] * s, cy - deltas[d + 1] * s);
                        let (x2, y2) =
                            map.to_original(cx + deltas[d + 2] * s, cy + deltas[d + 3] * s);

                        boxes.push(FaceBox {
                            x1: x1.clamp(0.0, map.original_width as f32),
                            y1: y1.clamp(0.0, map.original_height as f32),
                            x2: x2.clamp(0.0, map.original_width as f32),
                            y2: y2.clamp(0.0, map.original_height as f32),
                            confidence: score,
                        });
                    }
                }
            }
        }

        debug!(candidates = boxes.len(), "detector candidates before NMS");
        Ok(boxes)
    }
}

/// Intersection over union of two boxes.
pub fn iou(a: &FaceBox, b: &FaceBox) -> f32 {
    let x1 = a.x1.max(b.x1);
    let y1 = a.y1.max(b.y1);
    let x2 = a.x2.min(b.x2);
    let y2 = a.y2.min(b.y2);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = a.area() + b.area() - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

/// Non-maximum suppression, keeping the highest-confidence box of each
/// overlapping cluster.
pub fn nms(mut boxes: Vec<FaceBox>, iou_threshold: f32) -> Vec<FaceBox> {
    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<FaceBox> = Vec::new();
    for candidate in boxes {
        if keep.iter().all(|kept| iou(kept, &candidate) <= iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

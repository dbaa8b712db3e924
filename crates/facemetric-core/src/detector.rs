//! SSD-style face detector via ONNX Runtime.
//!
//! Runs an UltraFace-family graph: two-class scores plus normalized corner
//! boxes, decoded with a confidence filter and NMS post-processing.

use crate::types::FaceBox;
use image::{imageops::FilterType, DynamicImage, GenericImageView};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const DETECTOR_INPUT_WIDTH: u32 = 320;
const DETECTOR_INPUT_HEIGHT: u32 = 240;
const DETECTOR_MEAN: f32 = 127.0;
const DETECTOR_STD: f32 = 128.0;
const DETECTOR_CONFIDENCE_THRESHOLD: f32 = 0.7;
const DETECTOR_NMS_THRESHOLD: f32 = 0.3;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Face detector producing boxes in original-image coordinates.
pub struct FaceDetector {
    session: Session,
}

impl FaceDetector {
    /// Load the detection ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(
                model_path.display().to_string(),
            ));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(path = %model_path.display(), "loaded face detection model");

        Ok(Self { session })
    }

    /// Detect faces, returning boxes sorted by confidence descending.
    pub fn detect(&mut self, image: &DynamicImage) -> Result<Vec<FaceBox>, DetectorError> {
        let (image_width, image_height) = image.dimensions();
        let input = Self::preprocess(image);

        let outputs = self
            .session
            .run(ort::inputs!["input" => TensorRef::from_array_view(input.view())?])?;

        let scores_value = outputs
            .get("scores")
            .ok_or_else(|| DetectorError::InferenceFailed("missing `scores` output".into()))?;
        let boxes_value = outputs
            .get("boxes")
            .ok_or_else(|| DetectorError::InferenceFailed("missing `boxes` output".into()))?;

        let (scores_shape, scores) = scores_value
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::InferenceFailed(format!("scores: {e}")))?;
        let (_, boxes) = boxes_value
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::InferenceFailed(format!("boxes: {e}")))?;

        // scores laid out [1, N, 2] (background, face); boxes [1, N, 4]
        // as corner coordinates normalized to [0, 1].
        let num_anchors = scores_shape[1] as usize;

        let detections = decode_boxes(
            scores,
            boxes,
            num_anchors,
            image_width as f32,
            image_height as f32,
            DETECTOR_CONFIDENCE_THRESHOLD,
        );

        Ok(nms(detections, DETECTOR_NMS_THRESHOLD))
    }

    /// Resize to the detector input resolution and normalize into an NCHW
    /// float tensor.
    fn preprocess(image: &DynamicImage) -> Array4<f32> {
        let resized = image
            .resize_exact(
                DETECTOR_INPUT_WIDTH,
                DETECTOR_INPUT_HEIGHT,
                FilterType::Triangle,
            )
            .to_rgb8();

        let (width, height) = (
            DETECTOR_INPUT_WIDTH as usize,
            DETECTOR_INPUT_HEIGHT as usize,
        );
        let mut tensor = Array4::<f32>::zeros((1, 3, height, width));

        for (x, y, pixel) in resized.enumerate_pixels() {
            for channel in 0..3 {
                tensor[[0, channel, y as usize, x as usize]] =
                    (pixel[channel] as f32 - DETECTOR_MEAN) / DETECTOR_STD;
            }
        }

        tensor
    }
}

/// Decode anchor scores and normalized corner boxes into image-space
/// detections above the confidence threshold.
fn decode_boxes(
    scores: &[f32],
    boxes: &[f32],
    num_anchors: usize,
    image_width: f32,
    image_height: f32,
    threshold: f32,
) -> Vec<FaceBox> {
    let mut detections = Vec::new();

    for idx in 0..num_anchors {
        // Class 1 is the face score.
        let Some(&confidence) = scores.get(idx * 2 + 1) else {
            break;
        };
        if confidence <= threshold {
            continue;
        }
        if (idx + 1) * 4 > boxes.len() {
            break;
        }

        let x1 = (boxes[idx * 4] * image_width).max(0.0);
        let y1 = (boxes[idx * 4 + 1] * image_height).max(0.0);
        let x2 = (boxes[idx * 4 + 2] * image_width).min(image_width);
        let y2 = (boxes[idx * 4 + 3] * image_height).min(image_height);

        let width = x2 - x1;
        let height = y2 - y1;
        if width <= 0.0 || height <= 0.0 {
            continue;
        }

        detections.push(FaceBox {
            x: x1,
            y: y1,
            width,
            height,
            confidence,
        });
    }

    detections
}

/// Non-Maximum Suppression: drop detections overlapping a higher-confidence
/// one. Output stays sorted by confidence descending.
fn nms(mut detections: Vec<FaceBox>, iou_threshold: f32) -> Vec<FaceBox> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<FaceBox> = Vec::new();

    for candidate in detections {
        if keep.iter().all(|kept| iou(kept, &candidate) <= iou_threshold) {
            keep.push(candidate);
        }
    }

    keep
}

/// Intersection-over-Union of two boxes.
fn iou(a: &FaceBox, b: &FaceBox) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width).min(b.x + b.width);
    let y2 = (a.y + a.height).min(b.y + b.height);

    let inter_area = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union_area = a.width * a.height + b.width * b.height - inter_area;

    if union_area > 0.0 {
        inter_area / union_area
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_box(x: f32, y: f32, w: f32, h: f32, conf: f32) -> FaceBox {
        FaceBox {
            x,
            y,
            width: w,
            height: h,
            confidence: conf,
        }
    }

    #[test]
    fn test_iou_identical() {
        let a = make_box(0.0, 0.0, 100.0, 100.0, 1.0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_disjoint() {
        let a = make_box(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = make_box(20.0, 20.0, 10.0, 10.0, 1.0);
        assert!(iou(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_iou_half_overlap() {
        let a = make_box(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = make_box(5.0, 0.0, 10.0, 10.0, 1.0);
        // Overlap 5x10 = 50, union 150
        assert!((iou(&a, &b) - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn test_nms_suppresses_overlapping() {
        let detections = vec![
            make_box(0.0, 0.0, 100.0, 100.0, 0.9),
            make_box(5.0, 5.0, 100.0, 100.0, 0.8),
            make_box(200.0, 200.0, 50.0, 50.0, 0.7),
        ];
        let kept = nms(detections, 0.3);
        assert_eq!(kept.len(), 2);
        assert!((kept[0].confidence - 0.9).abs() < 1e-6);
        assert!((kept[1].confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_nms_keeps_disjoint() {
        let detections = vec![
            make_box(0.0, 0.0, 10.0, 10.0, 0.8),
            make_box(50.0, 50.0, 10.0, 10.0, 0.9),
        ];
        let kept = nms(detections, 0.3);
        assert_eq!(kept.len(), 2);
        // Sorted by confidence descending
        assert!((kept[0].confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_nms_empty() {
        assert!(nms(vec![], 0.3).is_empty());
    }

    #[test]
    fn test_decode_boxes_filters_and_scales() {
        // Two anchors: one confident face, one background.
        let scores = [0.1, 0.9, 0.8, 0.2];
        let boxes = [0.1, 0.2, 0.5, 0.6, 0.0, 0.0, 1.0, 1.0];

        let detections = decode_boxes(&scores, &boxes, 2, 320.0, 240.0, 0.7);

        assert_eq!(detections.len(), 1);
        let d = &detections[0];
        assert!((d.x - 32.0).abs() < 1e-4);
        assert!((d.y - 48.0).abs() < 1e-4);
        assert!((d.width - 128.0).abs() < 1e-4);
        assert!((d.height - 96.0).abs() < 1e-4);
        assert!((d.confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_decode_boxes_clamps_to_image() {
        let scores = [0.0, 0.95];
        let boxes = [-0.1, -0.1, 1.2, 1.2];

        let detections = decode_boxes(&scores, &boxes, 1, 100.0, 100.0, 0.7);

        assert_eq!(detections.len(), 1);
        let d = &detections[0];
        assert_eq!(d.x, 0.0);
        assert_eq!(d.y, 0.0);
        assert!((d.width - 100.0).abs() < 1e-4);
        assert!((d.height - 100.0).abs() < 1e-4);
    }

    #[test]
    fn test_decode_boxes_drops_degenerate() {
        let scores = [0.0, 0.95];
        // x2 < x1 after scaling
        let boxes = [0.5, 0.5, 0.4, 0.6];

        let detections = decode_boxes(&scores, &boxes, 1, 100.0, 100.0, 0.7);
        assert!(detections.is_empty());
    }

    #[test]
    fn test_preprocess_shape_and_normalization() {
        let image = DynamicImage::new_rgb8(64, 48);
        let tensor = FaceDetector::preprocess(&image);

        assert_eq!(
            tensor.shape(),
            &[
                1,
                3,
                DETECTOR_INPUT_HEIGHT as usize,
                DETECTOR_INPUT_WIDTH as usize
            ]
        );
        // Black input: (0 - 127) / 128
        let expected = (0.0 - DETECTOR_MEAN) / DETECTOR_STD;
        assert!((tensor[[0, 0, 0, 0]] - expected).abs() < 1e-6);
    }
}

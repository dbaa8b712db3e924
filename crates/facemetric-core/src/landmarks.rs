//! 68-point facial landmark regressor via ONNX Runtime.
//!
//! Predicts landmarks on a padded crop of the detection box and maps them
//! back to original-image coordinates. The five canonical alignment points
//! (eye centers, nose tip, mouth corners) are derived from the 68.

use crate::types::FaceBox;
use image::{imageops::FilterType, DynamicImage, GenericImageView};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::ops::Range;
use std::path::Path;
use thiserror::Error;

const LANDMARK_INPUT_SIZE: u32 = 112;
const LANDMARK_COUNT: usize = 68;
/// Fraction of the detection box added on each side before cropping.
const CROP_PADDING: f32 = 0.2;

// Standard 68-point topology indices.
const LEFT_EYE: Range<usize> = 36..42;
const RIGHT_EYE: Range<usize> = 42..48;
const NOSE_TIP: usize = 30;
const LEFT_MOUTH_CORNER: usize = 48;
const RIGHT_MOUTH_CORNER: usize = 54;

#[derive(Error, Debug)]
pub enum LandmarkError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// 68 landmark points in original-image pixel coordinates.
#[derive(Debug, Clone)]
pub struct Landmarks {
    pub points: Vec<(f32, f32)>,
}

impl Landmarks {
    /// The five alignment points: eye centers, nose tip, mouth corners.
    pub fn alignment_points(&self) -> [(f32, f32); 5] {
        [
            centroid(&self.points[LEFT_EYE]),
            centroid(&self.points[RIGHT_EYE]),
            self.points[NOSE_TIP],
            self.points[LEFT_MOUTH_CORNER],
            self.points[RIGHT_MOUTH_CORNER],
        ]
    }
}

fn centroid(points: &[(f32, f32)]) -> (f32, f32) {
    let n = points.len() as f32;
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), (x, y)| (sx + x, sy + y));
    (sx / n, sy / n)
}

/// Crop rectangle in original-image pixel coordinates.
struct CropRect {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

/// Expand the detection box by [`CROP_PADDING`] on each side, clamped to the
/// image bounds.
fn padded_crop_rect(face: &FaceBox, image_width: u32, image_height: u32) -> CropRect {
    let pad_x = face.width * CROP_PADDING;
    let pad_y = face.height * CROP_PADDING;

    let x0 = (face.x - pad_x).max(0.0) as u32;
    let y0 = (face.y - pad_y).max(0.0) as u32;
    let x1 = ((face.x + face.width + pad_x).max(0.0) as u32).min(image_width);
    let y1 = ((face.y + face.height + pad_y).max(0.0) as u32).min(image_height);

    CropRect {
        x: x0,
        y: y0,
        width: x1.saturating_sub(x0).max(1),
        height: y1.saturating_sub(y0).max(1),
    }
}

/// Landmark predictor over padded face crops.
pub struct LandmarkPredictor {
    session: Session,
}

impl LandmarkPredictor {
    /// Load the landmark ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, LandmarkError> {
        if !model_path.exists() {
            return Err(LandmarkError::ModelNotFound(
                model_path.display().to_string(),
            ));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(path = %model_path.display(), "loaded landmark model");

        Ok(Self { session })
    }

    /// Predict the 68 landmarks for a detected face.
    pub fn predict(
        &mut self,
        image: &DynamicImage,
        face: &FaceBox,
    ) -> Result<Landmarks, LandmarkError> {
        let rect = padded_crop_rect(face, image.width(), image.height());
        let crop = image.crop_imm(rect.x, rect.y, rect.width, rect.height);
        let input = Self::preprocess(&crop);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| LandmarkError::InferenceFailed(format!("landmark regression: {e}")))?;

        if raw.len() != LANDMARK_COUNT * 2 {
            return Err(LandmarkError::InferenceFailed(format!(
                "expected {} landmark coordinates, got {}",
                LANDMARK_COUNT * 2,
                raw.len()
            )));
        }

        // Model output is normalized to the crop; map back into the image.
        let points = (0..LANDMARK_COUNT)
            .map(|i| {
                (
                    rect.x as f32 + raw[i * 2] * rect.width as f32,
                    rect.y as f32 + raw[i * 2 + 1] * rect.height as f32,
                )
            })
            .collect();

        Ok(Landmarks { points })
    }

    /// Resize the crop to the landmark input resolution and scale pixels to
    /// [0, 1] in an NCHW float tensor.
    fn preprocess(crop: &DynamicImage) -> Array4<f32> {
        let resized = crop
            .resize_exact(LANDMARK_INPUT_SIZE, LANDMARK_INPUT_SIZE, FilterType::Triangle)
            .to_rgb8();

        let size = LANDMARK_INPUT_SIZE as usize;
        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

        for (x, y, pixel) in resized.enumerate_pixels() {
            for channel in 0..3 {
                tensor[[0, channel, y as usize, x as usize]] = pixel[channel] as f32 / 255.0;
            }
        }

        tensor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic_landmarks() -> Landmarks {
        // Place every point at (i, i) so derived points are easy to check.
        let points = (0..LANDMARK_COUNT).map(|i| (i as f32, i as f32)).collect();
        Landmarks { points }
    }

    #[test]
    fn test_centroid() {
        let points = [(0.0, 0.0), (2.0, 4.0), (4.0, 2.0)];
        let (cx, cy) = centroid(&points);
        assert!((cx - 2.0).abs() < 1e-6);
        assert!((cy - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_alignment_points_topology() {
        let landmarks = synthetic_landmarks();
        let [left_eye, right_eye, nose, left_mouth, right_mouth] = landmarks.alignment_points();

        // Eye centers are the centroids of indices 36..42 and 42..48.
        assert!((left_eye.0 - 38.5).abs() < 1e-6);
        assert!((right_eye.0 - 44.5).abs() < 1e-6);
        assert_eq!(nose, (30.0, 30.0));
        assert_eq!(left_mouth, (48.0, 48.0));
        assert_eq!(right_mouth, (54.0, 54.0));
    }

    #[test]
    fn test_padded_crop_rect_interior() {
        let face = FaceBox {
            x: 100.0,
            y: 100.0,
            width: 50.0,
            height: 50.0,
            confidence: 0.9,
        };
        let rect = padded_crop_rect(&face, 640, 480);

        assert_eq!(rect.x, 90);
        assert_eq!(rect.y, 90);
        assert_eq!(rect.width, 70);
        assert_eq!(rect.height, 70);
    }

    #[test]
    fn test_padded_crop_rect_clamps_to_image() {
        let face = FaceBox {
            x: 0.0,
            y: 0.0,
            width: 100.0,
            height: 100.0,
            confidence: 0.9,
        };
        let rect = padded_crop_rect(&face, 110, 110);

        assert_eq!(rect.x, 0);
        assert_eq!(rect.y, 0);
        assert_eq!(rect.width, 110);
        assert_eq!(rect.height, 110);
    }

    #[test]
    fn test_preprocess_shape_and_scale() {
        let crop = DynamicImage::new_rgb8(50, 50);
        let tensor = LandmarkPredictor::preprocess(&crop);

        let size = LANDMARK_INPUT_SIZE as usize;
        assert_eq!(tensor.shape(), &[1, 3, size, size]);
        assert_eq!(tensor[[0, 0, 0, 0]], 0.0);
    }
}

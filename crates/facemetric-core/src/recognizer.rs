//! ArcFace-family face recognizer via ONNX Runtime.
//!
//! Extracts an L2-normalized 512-dimensional descriptor from an aligned
//! 112×112 face crop.

use crate::types::Descriptor;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const RECOGNIZER_INPUT_SIZE: u32 = 112;
const RECOGNIZER_MEAN: f32 = 127.5;
const RECOGNIZER_STD: f32 = 127.5;

/// Dimension of the descriptors this recognizer produces.
pub const DESCRIPTOR_DIM: usize = 512;

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Face recognizer over aligned crops.
pub struct FaceRecognizer {
    session: Session,
}

impl FaceRecognizer {
    /// Load the recognition ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, RecognizerError> {
        if !model_path.exists() {
            return Err(RecognizerError::ModelNotFound(
                model_path.display().to_string(),
            ));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(path = %model_path.display(), "loaded face recognition model");

        Ok(Self { session })
    }

    /// Extract a descriptor from an aligned 112×112 crop.
    pub fn extract(&mut self, aligned: &RgbImage) -> Result<Descriptor, RecognizerError> {
        let input = Self::preprocess(aligned);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RecognizerError::InferenceFailed(format!("descriptor extraction: {e}")))?;

        if raw.len() != DESCRIPTOR_DIM {
            return Err(RecognizerError::InferenceFailed(format!(
                "expected {DESCRIPTOR_DIM}-dim descriptor, got {}",
                raw.len()
            )));
        }

        // L2-normalize
        let norm: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
        let values = if norm > 0.0 {
            raw.iter().map(|x| x / norm).collect()
        } else {
            raw.to_vec()
        };

        Ok(Descriptor::new(values))
    }

    /// Normalize an aligned crop into an NCHW float tensor with symmetric
    /// (p - 127.5) / 127.5 scaling. Pixels beyond the crop read as black.
    fn preprocess(aligned: &RgbImage) -> Array4<f32> {
        let size = RECOGNIZER_INPUT_SIZE as usize;
        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

        for y in 0..size {
            for x in 0..size {
                let pixel = aligned
                    .get_pixel_checked(x as u32, y as u32)
                    .map(|p| p.0)
                    .unwrap_or([0, 0, 0]);

                for channel in 0..3 {
                    tensor[[0, channel, y, x]] =
                        (pixel[channel] as f32 - RECOGNIZER_MEAN) / RECOGNIZER_STD;
                }
            }
        }

        tensor
    }
}

//! Face engine boundary: one probe image in, at most one descriptor out.
//!
//! Session logic depends only on [`FaceEngine`]; the ONNX pipeline behind it
//! (detect → landmarks → align → embed) never leaks past this module.

use crate::alignment;
use crate::detector::{DetectorError, FaceDetector};
use crate::landmarks::{LandmarkError, LandmarkPredictor};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::Descriptor;
use image::DynamicImage;
use std::path::PathBuf;
use thiserror::Error;

/// Model files expected inside a model directory.
pub const DETECTOR_MODEL_FILE: &str = "ultraface-rfb-320.onnx";
pub const LANDMARK_MODEL_FILE: &str = "landmark68.onnx";
pub const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";

/// Default model directory, relative to the working directory.
pub fn default_model_dir() -> PathBuf {
    PathBuf::from("models")
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("landmarks: {0}")]
    Landmarks(#[from] LandmarkError),
    #[error("recognizer: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// External face engine boundary.
///
/// Given an image, compute the descriptor of its single best face, or `None`
/// when no face is present. Images with multiple faces use only the
/// highest-confidence detection.
pub trait FaceEngine {
    fn detect_single_face(
        &mut self,
        image: &DynamicImage,
    ) -> Result<Option<Descriptor>, EngineError>;
}

/// ONNX implementation composing the three models.
pub struct OnnxFaceEngine {
    detector: FaceDetector,
    landmarks: LandmarkPredictor,
    recognizer: FaceRecognizer,
}

impl OnnxFaceEngine {
    pub fn new(
        detector: FaceDetector,
        landmarks: LandmarkPredictor,
        recognizer: FaceRecognizer,
    ) -> Self {
        Self {
            detector,
            landmarks,
            recognizer,
        }
    }
}

impl FaceEngine for OnnxFaceEngine {
    fn detect_single_face(
        &mut self,
        image: &DynamicImage,
    ) -> Result<Option<Descriptor>, EngineError> {
        let faces = self.detector.detect(image)?;
        let Some(face) = faces.first() else {
            tracing::debug!("no face detected");
            return Ok(None);
        };

        let landmarks = self.landmarks.predict(image, face)?;
        let aligned = alignment::align_face(image, &landmarks.alignment_points());
        let descriptor = self.recognizer.extract(&aligned)?;

        tracing::debug!(
            confidence = face.confidence,
            "descriptor extracted from best detection"
        );

        Ok(Some(descriptor))
    }
}

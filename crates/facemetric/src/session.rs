use std::collections::HashMap;
use std::path::Path;

use facemetric_core::detector::FaceDetector;
use facemetric_core::engine::{
    self, EngineError, FaceEngine, OnnxFaceEngine,
};
use facemetric_core::landmarks::LandmarkPredictor;
use facemetric_core::matcher::{FaceMatcher, LabeledDescriptors};
use facemetric_core::recognizer::FaceRecognizer;
use facemetric_core::types::Descriptor;
use image::DynamicImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("models not loaded; call load_models first")]
    ModelsNotLoaded,
    #[error("no face detected in input")]
    NoFaceDetected,
    #[error("no reference set; call set_anchor_references first")]
    NoReferenceSet,
    #[error("engine: {0}")]
    Engine(#[from] EngineError),
    #[error("model load task failed: {0}")]
    ModelLoad(#[from] tokio::task::JoinError),
}

/// A label together with the reference images asserted to belong to it.
pub struct AnchorGroup {
    pub label: String,
    pub images: Vec<DynamicImage>,
}

/// Face distance session.
///
/// Owns three pieces of state: the engine slot (populated by
/// [`load_models`](FaceSession::load_models)), the installed matcher
/// (replaced wholesale by
/// [`set_anchor_references`](FaceSession::set_anchor_references)), and the
/// name→distance map written by
/// [`add_name_distance`](FaceSession::add_name_distance). The map is never
/// cleared for the lifetime of the session.
pub struct FaceSession<E = OnnxFaceEngine> {
    engine: Option<E>,
    matcher: Option<FaceMatcher>,
    distances: HashMap<String, f32>,
}

impl<E: FaceEngine> Default for FaceSession<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl FaceSession<OnnxFaceEngine> {
    /// Load the three face models from `model_dir`.
    ///
    /// The loads run concurrently on blocking tasks; the engine is installed
    /// only once all of them have succeeded, so any failure leaves the
    /// session unloaded. Re-invoke to retry after a failure.
    pub async fn load_models(&mut self, model_dir: impl AsRef<Path>) -> Result<(), SessionError> {
        let dir = model_dir.as_ref().to_path_buf();

        let detector = tokio::task::spawn_blocking({
            let path = dir.join(engine::DETECTOR_MODEL_FILE);
            move || FaceDetector::load(&path)
        });
        let landmarks = tokio::task::spawn_blocking({
            let path = dir.join(engine::LANDMARK_MODEL_FILE);
            move || LandmarkPredictor::load(&path)
        });
        let recognizer = tokio::task::spawn_blocking({
            let path = dir.join(engine::RECOGNIZER_MODEL_FILE);
            move || FaceRecognizer::load(&path)
        });

        let (detector, landmarks, recognizer) = tokio::try_join!(detector, landmarks, recognizer)?;

        self.engine = Some(OnnxFaceEngine::new(
            detector.map_err(EngineError::from)?,
            landmarks.map_err(EngineError::from)?,
            recognizer.map_err(EngineError::from)?,
        ));

        tracing::info!(dir = %dir.display(), "face models loaded");
        Ok(())
    }
}

impl<E: FaceEngine> FaceSession<E> {
    pub fn new() -> Self {
        Self {
            engine: None,
            matcher: None,
            distances: HashMap::new(),
        }
    }

    /// Wrap an already-constructed engine.
    pub fn with_engine(engine: E) -> Self {
        Self {
            engine: Some(engine),
            matcher: None,
            distances: HashMap::new(),
        }
    }

    /// Whether [`load_models`](FaceSession::load_models) has completed.
    pub fn models_loaded(&self) -> bool {
        self.engine.is_some()
    }

    /// The currently installed matcher, if references have been registered.
    pub fn matcher(&self) -> Option<&FaceMatcher> {
        self.matcher.as_ref()
    }

    /// The name→distance map. Keys are unique; entries live for the session
    /// lifetime.
    pub fn distances(&self) -> &HashMap<String, f32> {
        &self.distances
    }

    /// Compute the descriptor of the single best face in `image`.
    fn compute_descriptor(&mut self, image: &DynamicImage) -> Result<Descriptor, SessionError> {
        let engine = self.engine.as_mut().ok_or(SessionError::ModelsNotLoaded)?;
        engine
            .detect_single_face(image)?
            .ok_or(SessionError::NoFaceDetected)
    }

    /// Build a matcher from labeled reference images and install it,
    /// replacing any previous matcher.
    ///
    /// Descriptors are computed strictly in input order, one per image. The
    /// replacement is atomic from the caller's view: the new matcher is
    /// installed only after every descriptor computation has succeeded, so on
    /// error the previous matcher (if any) stays in place.
    pub fn set_anchor_references(
        &mut self,
        groups: &[AnchorGroup],
        max_distance: f32,
    ) -> Result<&FaceMatcher, SessionError> {
        let mut labeled = Vec::with_capacity(groups.len());
        for group in groups {
            let mut descriptors = Vec::with_capacity(group.images.len());
            for image in &group.images {
                descriptors.push(self.compute_descriptor(image)?);
            }
            labeled.push(LabeledDescriptors::new(group.label.clone(), descriptors));
        }

        tracing::info!(
            groups = labeled.len(),
            max_distance,
            "anchor references installed"
        );

        Ok(self.matcher.insert(FaceMatcher::new(labeled, max_distance)))
    }

    /// Compute the probe's distance to the nearest anchor reference and
    /// record it under `name`, overwriting any prior entry.
    ///
    /// The matcher's threshold plays no part here: the returned value is
    /// always the raw nearest distance, even past the threshold.
    pub fn add_name_distance(
        &mut self,
        name: impl Into<String>,
        image: &DynamicImage,
    ) -> Result<f32, SessionError> {
        if self.matcher.is_none() {
            return Err(SessionError::NoReferenceSet);
        }

        let probe = self.compute_descriptor(image)?;
        let best = self
            .matcher
            .as_ref()
            .ok_or(SessionError::NoReferenceSet)?
            .find_best_match(&probe);

        let name = name.into();
        tracing::debug!(name = %name, label = %best.label, distance = best.distance, "distance recorded");
        self.distances.insert(name, best.distance);

        Ok(best.distance)
    }
}

//! facemetric-core — Face descriptor pipeline and matcher.
//!
//! Runs an SSD-style face detector, a 68-point landmark regressor, and an
//! ArcFace-family recognition net via ONNX Runtime, and classifies probe
//! descriptors against labeled reference groups by Euclidean distance.

pub mod alignment;
pub mod detector;
pub mod engine;
pub mod landmarks;
pub mod matcher;
pub mod recognizer;
pub mod types;

pub use engine::{EngineError, FaceEngine, OnnxFaceEngine};
pub use matcher::{BestMatch, FaceMatcher, LabeledDescriptors, DEFAULT_MAX_DISTANCE};
pub use types::{Descriptor, FaceBox};

//! facemetric — anchor-reference face distances.
//!
//! A [`FaceSession`] owns the loaded models, the installed matcher, and the
//! name→distance ledger. There is no global state: callers needing isolation
//! construct independent sessions.

mod session;

pub use facemetric_core::engine::default_model_dir;
pub use facemetric_core::{
    BestMatch, Descriptor, EngineError, FaceEngine, FaceMatcher, LabeledDescriptors,
    OnnxFaceEngine, DEFAULT_MAX_DISTANCE,
};
pub use session::{AnchorGroup, FaceSession, SessionError};

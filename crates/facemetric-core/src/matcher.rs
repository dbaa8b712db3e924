//! Nearest-reference classification of probe descriptors.
//!
//! A [`FaceMatcher`] holds all labeled descriptor groups plus a maximum
//! distance; the threshold decides the reported *label* only, never the
//! numeric distance.

use crate::types::Descriptor;

/// Label reported when the nearest reference is further than `max_distance`.
pub const UNKNOWN_LABEL: &str = "unknown";

/// Default maximum descriptor distance for a positive label.
pub const DEFAULT_MAX_DISTANCE: f32 = 0.6;

/// A label paired with the descriptors derived from its reference images.
#[derive(Debug, Clone)]
pub struct LabeledDescriptors {
    pub label: String,
    pub descriptors: Vec<Descriptor>,
}

impl LabeledDescriptors {
    pub fn new(label: impl Into<String>, descriptors: Vec<Descriptor>) -> Self {
        Self {
            label: label.into(),
            descriptors,
        }
    }
}

/// Result of classifying a probe descriptor.
#[derive(Debug, Clone)]
pub struct BestMatch {
    pub label: String,
    /// Euclidean distance to the nearest reference descriptor.
    pub distance: f32,
}

/// Compares a probe descriptor against labeled reference groups.
///
/// Replaced wholesale each time references are registered; never mutated
/// in place.
#[derive(Debug, Clone)]
pub struct FaceMatcher {
    groups: Vec<LabeledDescriptors>,
    max_distance: f32,
}

impl FaceMatcher {
    pub fn new(groups: Vec<LabeledDescriptors>, max_distance: f32) -> Self {
        Self {
            groups,
            max_distance,
        }
    }

    pub fn max_distance(&self) -> f32 {
        self.max_distance
    }

    pub fn groups(&self) -> &[LabeledDescriptors] {
        &self.groups
    }

    /// Find the labeled group containing the reference descriptor nearest to
    /// `probe`.
    ///
    /// Every reference in every group is compared. The distance is always the
    /// raw nearest Euclidean distance; when it exceeds `max_distance` the
    /// label degrades to [`UNKNOWN_LABEL`] but the distance is reported
    /// unchanged. An empty matcher reports [`UNKNOWN_LABEL`] at infinite
    /// distance.
    pub fn find_best_match(&self, probe: &Descriptor) -> BestMatch {
        let mut best_distance = f32::INFINITY;
        let mut best_label: Option<&str> = None;

        for group in &self.groups {
            for reference in &group.descriptors {
                let distance = probe.euclidean_distance(reference);
                if distance < best_distance {
                    best_distance = distance;
                    best_label = Some(&group.label);
                }
            }
        }

        match best_label {
            Some(label) if best_distance <= self.max_distance => BestMatch {
                label: label.to_string(),
                distance: best_distance,
            },
            Some(_) => BestMatch {
                label: UNKNOWN_LABEL.to_string(),
                distance: best_distance,
            },
            None => BestMatch {
                label: UNKNOWN_LABEL.to_string(),
                distance: f32::INFINITY,
            },
        }
    }
}

//! Seam to the face-landmark model.
//!
//! The model itself is a black box: a frame goes in, zero or more faces
//! come out as ordered keypoint sets. Only the first face is ever used.

mod scripted;

pub use scripted::ScriptedDetector;

use crate::error::InferenceError;
use crate::frame::FrameData;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One landmark in normalized image space, with optional relative depth
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f64,
    pub y: f64,
    pub z: Option<f64>,
}

impl Keypoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: None }
    }

    pub fn with_depth(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z: Some(z) }
    }
}

/// Ordered keypoints of a single detected face
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FaceLandmarks {
    pub keypoints: Vec<Keypoint>,
}

impl FaceLandmarks {
    pub fn new(keypoints: Vec<Keypoint>) -> Self {
        Self { keypoints }
    }

    pub fn get(&self, index: usize) -> Option<&Keypoint> {
        self.keypoints.get(index)
    }
}

/// Output of one inference pass over a frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InferenceResult {
    pub frame_id: u64,
    pub faces: Vec<FaceLandmarks>,
}

impl InferenceResult {
    pub fn no_face(frame_id: u64) -> Self {
        Self {
            frame_id,
            faces: Vec::new(),
        }
    }

    /// The tracked face, if any
    pub fn primary_face(&self) -> Option<&FaceLandmarks> {
        self.faces.first()
    }
}

/// Face-landmark inference engine
#[async_trait]
pub trait LandmarkDetector: Send + Sync {
    /// Load the model. May take arbitrarily long; failure is not fatal to the stream.
    async fn initialize(&self) -> Result<(), InferenceError>;

    /// Whether `detect` can be called yet
    fn is_ready(&self) -> bool;

    /// Run the model over one frame
    fn detect(&self, frame: &FrameData) -> Result<InferenceResult, InferenceError>;
}

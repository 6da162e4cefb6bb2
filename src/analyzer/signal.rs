use crate::config::SamplingConfig;
use crate::inference::{InferenceResult, Keypoint};
use tracing::trace;

/// Turns one inference result into the scalar spread between two anchor keypoints.
#[derive(Debug, Clone)]
pub struct SignalExtractor {
    anchors: (usize, usize),
    use_depth: bool,
}

impl SignalExtractor {
    pub fn new(anchors: (usize, usize), use_depth: bool) -> Self {
        Self { anchors, use_depth }
    }

    pub fn from_config(config: &SamplingConfig) -> Self {
        Self::new(config.anchor_keypoints, config.use_depth)
    }

    /// Spread of the primary face, or `None` when there is no usable signal.
    ///
    /// A frame without a face, or a face missing either anchor, is an
    /// ordinary outcome and never an error.
    pub fn extract(&self, result: &InferenceResult) -> Option<f64> {
        let face = match result.primary_face() {
            Some(face) => face,
            None => {
                trace!("No face in frame {}", result.frame_id);
                return None;
            }
        };

        let (a, b) = match (face.get(self.anchors.0), face.get(self.anchors.1)) {
            (Some(a), Some(b)) => (a, b),
            _ => {
                trace!(
                    "Face in frame {} lacks anchor keypoints {:?} ({} keypoints)",
                    result.frame_id,
                    self.anchors,
                    face.keypoints.len()
                );
                return None;
            }
        };

        let spread = self.distance(a, b);
        if spread.is_finite() {
            Some(spread)
        } else {
            None
        }
    }

    fn distance(&self, a: &Keypoint, b: &Keypoint) -> f64 {
        let planar = (b.x - a.x).hypot(b.y - a.y);
        match (self.use_depth, a.z, b.z) {
            (true, Some(za), Some(zb)) => planar.hypot(zb - za),
            _ => planar,
        }
    }
}

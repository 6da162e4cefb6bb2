use super::{FaceLandmarks, InferenceResult, Keypoint, LandmarkDetector};
use crate::error::InferenceError;
use crate::frame::FrameData;
use async_trait::async_trait;
use std::f64::consts::TAU;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, trace};

#[derive(Debug, Clone)]
enum Script {
    /// Played in order, the last entry repeats forever. `None` is a frame without a face.
    Sequence(Vec<Option<f64>>),
    /// Spread oscillating around `base`
    Wave {
        base: f64,
        amplitude: f64,
        period: u64,
    },
}

/// Landmark detector that synthesizes faces whose anchor spread follows a script.
///
/// Stands in for the real model in the demo binary and in tests.
#[derive(Debug)]
pub struct ScriptedDetector {
    anchors: (usize, usize),
    script: Script,
    ready: AtomicBool,
    init_delay: Duration,
    init_failure: Option<String>,
    calls: AtomicU64,
}

impl ScriptedDetector {
    /// Detector replaying `spreads` for the given anchor keypoints
    pub fn from_spreads<I>(anchors: (usize, usize), spreads: I) -> Self
    where
        I: IntoIterator<Item = Option<f64>>,
    {
        let mut spreads: Vec<Option<f64>> = spreads.into_iter().collect();
        if spreads.is_empty() {
            spreads.push(None);
        }
        Self::with_script(anchors, Script::Sequence(spreads))
    }

    /// Detector whose spread oscillates sinusoidally, one cycle every `period` detections
    pub fn wave(anchors: (usize, usize), base: f64, amplitude: f64, period: u64) -> Self {
        Self::with_script(
            anchors,
            Script::Wave {
                base,
                amplitude,
                period: period.max(1),
            },
        )
    }

    fn with_script(anchors: (usize, usize), script: Script) -> Self {
        Self {
            anchors,
            script,
            ready: AtomicBool::new(false),
            init_delay: Duration::ZERO,
            init_failure: None,
            calls: AtomicU64::new(0),
        }
    }

    /// Simulate a slow model load
    pub fn with_init_delay(mut self, delay: Duration) -> Self {
        self.init_delay = delay;
        self
    }

    /// Make `initialize` fail with the given message
    pub fn with_init_failure<S: Into<String>>(mut self, details: S) -> Self {
        self.init_failure = Some(details.into());
        self
    }

    /// Skip initialization entirely
    pub fn ready(self) -> Self {
        self.ready.store(true, Ordering::SeqCst);
        self
    }

    /// Number of `detect` calls so far
    pub fn detections(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn spread_at(&self, step: u64) -> Option<f64> {
        match &self.script {
            Script::Sequence(spreads) => {
                let index = (step as usize).min(spreads.len() - 1);
                spreads[index]
            }
            Script::Wave {
                base,
                amplitude,
                period,
            } => {
                let phase = (step % period) as f64 / *period as f64;
                Some(base + amplitude * (TAU * phase).sin())
            }
        }
    }

    fn synthesize_face(&self, spread: f64) -> FaceLandmarks {
        let (a, b) = self.anchors;
        let mut keypoints = vec![Keypoint::new(0.5, 0.5); a.max(b) + 1];
        keypoints[a] = Keypoint::new(0.0, 0.5);
        keypoints[b] = Keypoint::new(spread, 0.5);
        FaceLandmarks::new(keypoints)
    }
}

#[async_trait]
impl LandmarkDetector for ScriptedDetector {
    async fn initialize(&self) -> Result<(), InferenceError> {
        if self.is_ready() {
            return Ok(());
        }

        if !self.init_delay.is_zero() {
            debug!("Scripted detector loading for {:?}", self.init_delay);
            tokio::time::sleep(self.init_delay).await;
        }

        if let Some(details) = &self.init_failure {
            return Err(InferenceError::Initialization {
                details: details.clone(),
            });
        }

        self.ready.store(true, Ordering::SeqCst);
        info!("Scripted landmark detector ready");
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn detect(&self, frame: &FrameData) -> Result<InferenceResult, InferenceError> {
        if !self.is_ready() {
            return Err(InferenceError::NotInitialized);
        }

        let step = self.calls.fetch_add(1, Ordering::SeqCst);
        let faces = match self.spread_at(step) {
            Some(spread) => vec![self.synthesize_face(spread)],
            None => Vec::new(),
        };

        trace!(
            "Scripted detection {} on frame {}: {} face(s)",
            step,
            frame.id,
            faces.len()
        );

        Ok(InferenceResult {
            frame_id: frame.id,
            faces,
        })
    }
}

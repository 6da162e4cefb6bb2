use super::interface::{CameraSource, CaptureRequest};
use crate::error::CameraError;
use crate::frame::{FrameData, FrameFormat};
use async_trait::async_trait;
use gstreamer::prelude::*;
use gstreamer::Pipeline;
use gstreamer_app::AppSink;
use gstreamer_video::VideoInfo;
use parking_lot::Mutex;
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, error, info, trace, warn};

/// V4L2 camera captured through a GStreamer pipeline, converted to RGB
pub struct GstCamera {
    pipeline: Mutex<Option<Pipeline>>,
    latest: Arc<Mutex<Option<FrameData>>>,
    frame_counter: Arc<AtomicU64>,
}

impl GstCamera {
    pub fn new() -> Result<Self, CameraError> {
        gstreamer::init().map_err(|e| CameraError::Configuration {
            details: format!("Failed to initialize GStreamer: {}", e),
        })?;

        Ok(Self {
            pipeline: Mutex::new(None),
            latest: Arc::new(Mutex::new(None)),
            frame_counter: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Open the device node once so access problems surface with a precise reason
    fn probe_device(request: &CaptureRequest) -> Result<(), CameraError> {
        let device_path = format!("/dev/video{}", request.device_index);
        match OpenOptions::new().read(true).open(&device_path) {
            Ok(_) => Ok(()),
            Err(e) => Err(match e.kind() {
                ErrorKind::NotFound => CameraError::NotFound {
                    device: request.device_index,
                },
                ErrorKind::PermissionDenied => CameraError::PermissionDenied {
                    device: request.device_index,
                },
                _ => CameraError::Busy {
                    device: request.device_index,
                    details: e.to_string(),
                },
            }),
        }
    }

    fn build_pipeline_string(request: &CaptureRequest) -> String {
        format!(
            "v4l2src device=/dev/video{} io-mode=mmap do-timestamp=true ! \
             video/x-raw,width={},height={},framerate={}/1 ! \
             videoconvert ! video/x-raw,format=RGB ! \
             appsink name=sink sync=false max-buffers=1 drop=true emit-signals=false",
            request.device_index, request.width, request.height, request.max_fps
        )
    }

    fn build_pipeline(&self, request: &CaptureRequest) -> Result<Pipeline, CameraError> {
        let pipeline_desc = Self::build_pipeline_string(request);
        info!("Creating GStreamer pipeline: {}", pipeline_desc);

        let pipeline = gstreamer::parse::launch(&pipeline_desc)
            .map_err(|e| CameraError::Configuration {
                details: format!("Failed to create pipeline: {}", e),
            })?
            .downcast::<Pipeline>()
            .map_err(|_| CameraError::Configuration {
                details: "Failed to downcast to Pipeline".to_string(),
            })?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| CameraError::Configuration {
                details: "Pipeline has no appsink".to_string(),
            })?
            .downcast::<AppSink>()
            .map_err(|_| CameraError::Configuration {
                details: "Failed to downcast to AppSink".to_string(),
            })?;

        let latest = Arc::clone(&self.latest);
        let frame_counter = Arc::clone(&self.frame_counter);

        appsink.set_callbacks(
            gstreamer_app::AppSinkCallbacks::builder()
                .new_sample(move |appsink| {
                    let sample = appsink
                        .pull_sample()
                        .map_err(|_| gstreamer::FlowError::Eos)?;
                    match Self::sample_to_frame(&sample, &frame_counter) {
                        Ok(frame) => *latest.lock() = Some(frame),
                        Err(e) => warn!("Dropping camera sample: {}", e),
                    }
                    Ok(gstreamer::FlowSuccess::Ok)
                })
                .build(),
        );

        Ok(pipeline)
    }

    fn sample_to_frame(
        sample: &gstreamer::Sample,
        frame_counter: &AtomicU64,
    ) -> Result<FrameData, CameraError> {
        let buffer = sample.buffer().ok_or_else(|| CameraError::CaptureStream {
            details: "No buffer in sample".to_string(),
        })?;

        let caps = sample.caps().ok_or_else(|| CameraError::CaptureStream {
            details: "No caps in sample".to_string(),
        })?;

        let video_info = VideoInfo::from_caps(caps).map_err(|e| CameraError::CaptureStream {
            details: format!("Failed to get video info: {}", e),
        })?;

        let map = buffer
            .map_readable()
            .map_err(|e| CameraError::CaptureStream {
                details: format!("Failed to map buffer: {}", e),
            })?;

        let frame_id = frame_counter.fetch_add(1, Ordering::Relaxed);
        trace!(
            "Captured RGB frame {} ({}x{}, {} bytes)",
            frame_id,
            video_info.width(),
            video_info.height(),
            map.len()
        );

        Ok(FrameData::new(
            frame_id,
            SystemTime::now(),
            map.as_slice().to_vec(),
            video_info.width(),
            video_info.height(),
            FrameFormat::Rgb24,
        ))
    }
}

#[async_trait]
impl CameraSource for GstCamera {
    async fn acquire(&self, request: &CaptureRequest) -> Result<(), CameraError> {
        if self.is_acquired() {
            warn!("GStreamer camera is already acquired");
            return Ok(());
        }

        Self::probe_device(request)?;
        let pipeline = self.build_pipeline(request)?;

        if let Err(e) = pipeline.set_state(gstreamer::State::Playing) {
            error!("Failed to start GStreamer pipeline: {}", e);
            let _ = pipeline.set_state(gstreamer::State::Null);
            return Err(CameraError::UnsupportedConstraints {
                width: request.width,
                height: request.height,
                fps: request.max_fps,
            });
        }

        info!("GStreamer pipeline started successfully");
        *self.pipeline.lock() = Some(pipeline);
        Ok(())
    }

    async fn release(&self) {
        let pipeline = self.pipeline.lock().take();
        match pipeline {
            Some(pipeline) => {
                if let Err(e) = pipeline.set_state(gstreamer::State::Null) {
                    error!("Failed to stop GStreamer pipeline: {}", e);
                }
                *self.latest.lock() = None;
                info!("GStreamer camera released");
            }
            None => debug!("GStreamer camera is not acquired"),
        }
    }

    fn is_acquired(&self) -> bool {
        self.pipeline.lock().is_some()
    }

    fn latest_frame(&self) -> Option<FrameData> {
        self.latest.lock().clone()
    }
}

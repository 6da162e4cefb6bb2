use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ProxZoomConfig {
    pub camera: CameraConfig,
    pub sampling: SamplingConfig,
    pub zoom: ZoomConfig,
    pub channel: ChannelConfig,
    pub face_loss: FaceLossConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CameraConfig {
    /// Camera device index (e.g., 0 for /dev/video0)
    #[serde(default = "default_camera_index")]
    pub index: u32,

    /// Requested capture resolution (width, height)
    #[serde(default = "default_camera_resolution")]
    pub resolution: (u32, u32),

    /// Requested maximum frame rate
    #[serde(default = "default_camera_fps")]
    pub fps: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SamplingConfig {
    /// Milliseconds between inference samples
    #[serde(default = "default_sampling_interval_ms")]
    pub interval_ms: u64,

    /// Number of valid samples averaged into the baseline
    #[serde(default = "default_calibration_window")]
    pub calibration_window: usize,

    /// Indices of the two keypoints whose distance is the spread
    #[serde(default = "default_anchor_keypoints")]
    pub anchor_keypoints: (usize, usize),

    /// Include the depth coordinate in the spread when both keypoints carry one
    #[serde(default)]
    pub use_depth: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ZoomConfig {
    /// EMA smoothing factor (higher = more responsive)
    #[serde(default = "default_smoothing_alpha")]
    pub smoothing_alpha: f64,

    /// Lower edge of the no-change band
    #[serde(default = "default_deadband_low")]
    pub deadband_low: f64,

    /// Upper edge of the no-change band
    #[serde(default = "default_deadband_high")]
    pub deadband_high: f64,

    /// Ratio at which the zoom-out leg reaches `min_zoom`
    #[serde(default = "default_near_ratio")]
    pub near_ratio: f64,

    /// Smallest zoom factor ever applied
    #[serde(default = "default_min_zoom")]
    pub min_zoom: f64,

    /// Ratio at which the zoom-in leg reaches the configured maximum
    #[serde(default = "default_far_ratio")]
    pub far_ratio: f64,

    /// Minimum change between two applied zoom commands
    #[serde(default = "default_min_delta")]
    pub min_delta: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ChannelConfig {
    /// Heartbeat cadence from the capture side
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Jitter allowance on top of one heartbeat interval
    #[serde(default = "default_liveness_margin_ms")]
    pub liveness_margin_ms: u64,

    /// Fixed delay between reconnect attempts while streaming
    #[serde(default = "default_reconnect_backoff_ms")]
    pub reconnect_backoff_ms: u64,

    /// Bound on waiting for the first connection after creating the host
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Poll cadence while waiting for the first connection
    #[serde(default = "default_connect_poll_ms")]
    pub connect_poll_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FaceLossPolicy {
    /// Keep the last applied zoom
    Hold,
    /// Snap back to zoom 1.0 once
    Neutral,
    /// Step toward zoom 1.0 on every check
    Decay,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct FaceLossConfig {
    #[serde(default = "default_face_loss_policy")]
    pub policy: FaceLossPolicy,

    /// How long without readings counts as a lost face
    #[serde(default = "default_face_loss_timeout_ms")]
    pub timeout_ms: u64,

    /// Zoom step per check under the decay policy
    #[serde(default = "default_decay_step")]
    pub decay_step: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,

    /// Where user settings (max zoom, excluded sites) are persisted
    #[serde(default = "default_settings_path")]
    pub settings_path: String,
}

impl SamplingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl ChannelConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Silence longer than this means the connection is lost
    pub fn liveness_window(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms + self.liveness_margin_ms)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn connect_poll(&self) -> Duration {
        Duration::from_millis(self.connect_poll_ms)
    }
}

impl FaceLossConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl ProxZoomConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("proximity-zoom.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("camera.index", default_camera_index())?
            .set_default(
                "camera.resolution",
                vec![default_camera_resolution().0, default_camera_resolution().1],
            )?
            .set_default("camera.fps", default_camera_fps())?
            .set_default(
                "sampling.interval_ms",
                default_sampling_interval_ms() as i64,
            )?
            .set_default(
                "sampling.calibration_window",
                default_calibration_window() as i64,
            )?
            .set_default(
                "sampling.anchor_keypoints",
                vec![
                    default_anchor_keypoints().0 as i64,
                    default_anchor_keypoints().1 as i64,
                ],
            )?
            .set_default("sampling.use_depth", false)?
            .set_default("zoom.smoothing_alpha", default_smoothing_alpha())?
            .set_default("zoom.deadband_low", default_deadband_low())?
            .set_default("zoom.deadband_high", default_deadband_high())?
            .set_default("zoom.near_ratio", default_near_ratio())?
            .set_default("zoom.min_zoom", default_min_zoom())?
            .set_default("zoom.far_ratio", default_far_ratio())?
            .set_default("zoom.min_delta", default_min_delta())?
            .set_default(
                "channel.heartbeat_interval_ms",
                default_heartbeat_interval_ms() as i64,
            )?
            .set_default(
                "channel.liveness_margin_ms",
                default_liveness_margin_ms() as i64,
            )?
            .set_default(
                "channel.reconnect_backoff_ms",
                default_reconnect_backoff_ms() as i64,
            )?
            .set_default(
                "channel.connect_timeout_ms",
                default_connect_timeout_ms() as i64,
            )?
            .set_default("channel.connect_poll_ms", default_connect_poll_ms() as i64)?
            .set_default("face_loss.policy", "hold")?
            .set_default(
                "face_loss.timeout_ms",
                default_face_loss_timeout_ms() as i64,
            )?
            .set_default("face_loss.decay_step", default_decay_step())?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            .set_default("system.settings_path", default_settings_path())?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables with PROXZOOM_ prefix, e.g. PROXZOOM_ZOOM__MIN_DELTA
            .add_source(
                Environment::with_prefix("PROXZOOM")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: ProxZoomConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.camera.resolution.0 == 0 || self.camera.resolution.1 == 0 {
            return Err(ConfigError::Message(
                "Camera resolution must be greater than 0".to_string(),
            ));
        }

        if self.camera.fps == 0 {
            return Err(ConfigError::Message(
                "Camera fps must be greater than 0".to_string(),
            ));
        }

        if !(200..=1000).contains(&self.sampling.interval_ms) {
            return Err(ConfigError::Message(
                "Sampling interval_ms must be between 200 and 1000".to_string(),
            ));
        }

        if self.sampling.calibration_window == 0 {
            return Err(ConfigError::Message(
                "Calibration window must hold at least one sample".to_string(),
            ));
        }

        if self.sampling.anchor_keypoints.0 == self.sampling.anchor_keypoints.1 {
            return Err(ConfigError::Message(
                "Anchor keypoints must be two different landmarks".to_string(),
            ));
        }

        let zoom = &self.zoom;
        if !(zoom.smoothing_alpha > 0.0 && zoom.smoothing_alpha <= 1.0) {
            return Err(ConfigError::Message(
                "Smoothing alpha must be in (0, 1]".to_string(),
            ));
        }

        if !(zoom.far_ratio < zoom.deadband_low
            && zoom.deadband_low <= 1.0
            && 1.0 <= zoom.deadband_high
            && zoom.deadband_high < zoom.near_ratio)
        {
            return Err(ConfigError::Message(
                "Zoom ratios must satisfy far_ratio < deadband_low <= 1 <= deadband_high < near_ratio"
                    .to_string(),
            ));
        }

        if !(zoom.min_zoom > 0.0 && zoom.min_zoom <= 1.0) {
            return Err(ConfigError::Message(
                "Minimum zoom must be in (0, 1]".to_string(),
            ));
        }

        if zoom.min_delta < 0.0 {
            return Err(ConfigError::Message(
                "Minimum zoom delta must not be negative".to_string(),
            ));
        }

        let channel = &self.channel;
        if channel.heartbeat_interval_ms == 0
            || channel.connect_timeout_ms == 0
            || channel.connect_poll_ms == 0
        {
            return Err(ConfigError::Message(
                "Channel timings must be greater than 0".to_string(),
            ));
        }

        if !(self.face_loss.decay_step > 0.0) {
            return Err(ConfigError::Message(
                "Face-loss decay step must be greater than 0".to_string(),
            ));
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for ProxZoomConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig::default(),
            sampling: SamplingConfig::default(),
            zoom: ZoomConfig::default(),
            channel: ChannelConfig::default(),
            face_loss: FaceLossConfig::default(),
            system: SystemConfig::default(),
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: default_camera_index(),
            resolution: default_camera_resolution(),
            fps: default_camera_fps(),
        }
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_sampling_interval_ms(),
            calibration_window: default_calibration_window(),
            anchor_keypoints: default_anchor_keypoints(),
            use_depth: false,
        }
    }
}

impl Default for ZoomConfig {
    fn default() -> Self {
        Self {
            smoothing_alpha: default_smoothing_alpha(),
            deadband_low: default_deadband_low(),
            deadband_high: default_deadband_high(),
            near_ratio: default_near_ratio(),
            min_zoom: default_min_zoom(),
            far_ratio: default_far_ratio(),
            min_delta: default_min_delta(),
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            liveness_margin_ms: default_liveness_margin_ms(),
            reconnect_backoff_ms: default_reconnect_backoff_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            connect_poll_ms: default_connect_poll_ms(),
        }
    }
}

impl Default for FaceLossConfig {
    fn default() -> Self {
        Self {
            policy: default_face_loss_policy(),
            timeout_ms: default_face_loss_timeout_ms(),
            decay_step: default_decay_step(),
        }
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            event_bus_capacity: default_event_bus_capacity(),
            settings_path: default_settings_path(),
        }
    }
}

// Default value functions
fn default_camera_index() -> u32 {
    0
}
fn default_camera_resolution() -> (u32, u32) {
    (640, 480)
}
fn default_camera_fps() -> u32 {
    30
}

fn default_sampling_interval_ms() -> u64 {
    200
}
fn default_calibration_window() -> usize {
    5
}
fn default_anchor_keypoints() -> (usize, usize) {
    (33, 263)
} // outer eye corners in the 468-point face mesh

fn default_smoothing_alpha() -> f64 {
    0.4
}
fn default_deadband_low() -> f64 {
    0.95
}
fn default_deadband_high() -> f64 {
    1.05
}
fn default_near_ratio() -> f64 {
    2.0
}
fn default_min_zoom() -> f64 {
    0.3
}
fn default_far_ratio() -> f64 {
    0.3
}
fn default_min_delta() -> f64 {
    0.01
}

fn default_heartbeat_interval_ms() -> u64 {
    20_000
}
fn default_liveness_margin_ms() -> u64 {
    5_000
}
fn default_reconnect_backoff_ms() -> u64 {
    500
}
fn default_connect_timeout_ms() -> u64 {
    2_000
}
fn default_connect_poll_ms() -> u64 {
    100
}

fn default_face_loss_policy() -> FaceLossPolicy {
    FaceLossPolicy::Hold
}
fn default_face_loss_timeout_ms() -> u64 {
    3_000
}
fn default_decay_step() -> f64 {
    0.05
}

fn default_event_bus_capacity() -> usize {
    100
}
fn default_settings_path() -> String {
    "proximity-zoom-settings.toml".to_string()
}

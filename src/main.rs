use anyhow::Result;
use clap::Parser;
use proximity_zoom::{
    CameraBackend, CameraBuilder, ConsoleDriver, Destination, ProxZoomConfig,
    ProximityZoomOrchestrator, ScriptedDetector, SettingsStore,
};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "proximity-zoom")]
#[command(about = "Keeps content zoom matched to how far you sit from the screen")]
#[command(version)]
#[command(long_about = "Watches the camera for a face, calibrates a baseline distance and \
scales the zoom of the active view as you lean in or back off. The capture side runs in its \
own host and talks to the controller over a heartbeat-supervised channel.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "proximity-zoom.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Override the settings file from the configuration
    #[arg(long, value_name = "PATH", help = "Path to the persisted user settings")]
    settings: Option<String>,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Dry run mode - build everything but don't enable the loop
    #[arg(long, help = "Build the controller but don't start capturing")]
    dry_run: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Also write logs to daily rotated files in this directory
    #[arg(long, value_name = "DIR", help = "Directory for rotated log files")]
    log_dir: Option<String>,

    /// Keyboard control: e=enable r=reset n=next x=exclude q=quit
    #[arg(short, long, help = "Enable keyboard control in raw terminal mode")]
    keyboard: bool,

    /// Use synthetic frames even when a camera backend is compiled in
    #[arg(long, help = "Use the mock camera instead of a real device")]
    mock_camera: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config();
        return Ok(());
    }

    let _log_guard = init_logging(&args)?;

    info!("Starting proximity zoom v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match ProxZoomConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                info!("Configuration validation successful");
                println!("✓ Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                error!("Configuration validation failed: {}", e);
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
        }
    }

    let settings_path = args
        .settings
        .clone()
        .unwrap_or_else(|| config.system.settings_path.clone());
    let settings = Arc::new(SettingsStore::load_from_file(&settings_path)?);
    info!("Settings loaded from {}", settings_path);

    let camera = CameraBuilder::new()
        .backend(camera_backend(&args))
        .build()
        .map_err(|e| {
            error!("Failed to create camera: {}", e);
            e
        })?;

    // No landmark model ships with the binary; a scripted face drifts back and forth
    let detector = Arc::new(ScriptedDetector::wave(
        config.sampling.anchor_keypoints,
        0.2,
        0.05,
        50,
    ));

    let destinations = vec![
        Destination::new(1, "news.example"),
        Destination::new(2, "docs.example"),
    ];

    let mut builder = ProximityZoomOrchestrator::builder()
        .config(config)
        .settings(settings)
        .capture(camera, detector)
        .driver(Arc::new(ConsoleDriver::new()))
        .destination(destinations[0].clone());
    if args.keyboard {
        builder = builder.keyboard(destinations);
    }

    let mut orchestrator = builder.build().map_err(|e| {
        error!("Failed to create orchestrator: {}", e);
        e
    })?;

    if args.dry_run {
        info!("Dry run mode - controller built but not started");
        println!("✓ Dry run completed successfully");
        orchestrator.shutdown().await?;
        return Ok(());
    }

    orchestrator.start().await.map_err(|e| {
        error!("Failed to start: {}", e);
        e
    })?;

    let exit_code = orchestrator.run().await.map_err(|e| {
        error!("Error during execution: {}", e);
        e
    })?;

    info!("Proximity zoom exited with code: {}", exit_code);
    std::process::exit(exit_code);
}

#[cfg(all(feature = "camera", target_os = "linux"))]
fn camera_backend(args: &Args) -> CameraBackend {
    if args.mock_camera {
        CameraBackend::Mock
    } else {
        CameraBackend::V4l2
    }
}

#[cfg(not(all(feature = "camera", target_os = "linux")))]
fn camera_backend(args: &Args) -> CameraBackend {
    if !args.mock_camera {
        info!("No camera backend compiled in, using synthetic frames");
    }
    CameraBackend::Mock
}

fn init_logging(args: &Args) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    use tracing_subscriber::{
        fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
    };

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("proximity_zoom={}", log_level)));

    // Raw mode mangles multi-line output, so keyboard runs log compactly
    let format = match args.log_format.as_deref() {
        None if args.keyboard => Some("compact"),
        other => other,
    };

    let fmt_layer = match format {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    let (file_layer, guard) = match &args.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "proximity-zoom.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(file_layer)
        .with(env_filter)
        .init();

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() {
    println!("# Proximity Zoom Configuration File");
    println!("# Every key is optional; values can also come from PROXZOOM_<SECTION>__<KEY>");
    println!();

    let default_config = r#"[camera]
# Camera device index (e.g., 0 for /dev/video0)
index = 0
# Requested resolution (width, height)
resolution = [640, 480]
# Requested maximum frames per second
fps = 30

[sampling]
# Milliseconds between inference samples (200-1000)
interval_ms = 200
# Valid samples averaged into the baseline
calibration_window = 5
# Keypoints whose distance is measured (outer eye corners)
anchor_keypoints = [33, 263]
# Include depth in the distance when available
use_depth = false

[zoom]
# EMA smoothing factor, higher is more responsive
smoothing_alpha = 0.4
# Ratios inside [deadband_low, deadband_high] keep zoom at 1.0
deadband_low = 0.95
deadband_high = 1.05
# Leaning in to this ratio reaches min_zoom
near_ratio = 2.0
min_zoom = 0.3
# Backing off to this ratio reaches the maximum zoom from settings
far_ratio = 0.3
# Smallest zoom change worth applying
min_delta = 0.01

[channel]
heartbeat_interval_ms = 20000
# Extra silence tolerated before the connection is considered lost
liveness_margin_ms = 5000
reconnect_backoff_ms = 500
# Bound on waiting for a new capture host to connect
connect_timeout_ms = 2000
connect_poll_ms = 100

[face_loss]
# hold, neutral or decay
policy = "hold"
timeout_ms = 3000
# Zoom step per check under the decay policy
decay_step = 0.05

[system]
event_bus_capacity = 100
# Persisted user settings (max zoom, excluded sites)
settings_path = "proximity-zoom-settings.toml"
"#;

    println!("{}", default_config);
}

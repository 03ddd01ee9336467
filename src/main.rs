use anyhow::Result;
use gyrosight_capture::{OverlayCompositor, TestPatternSource};
use gyrosight_config::{AppConfig, SensorBackend, SensorConfig};
use gyrosight_imu::simulated::SimulatedImu;
use gyrosight_imu::wt61pc::Wt61pcSensor;
use gyrosight_imu::{EngineConfig, OrientationEngine, OrientationReader, SensorSource};
use gyrosight_tracker::{CameraModel, PoiTracker, TrackerError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How often the newest frame is composed and status is logged.
const DRAW_INTERVAL: Duration = Duration::from_millis(500);

/// How long to wait for the sensor's first sample before setting the baseline.
const FIRST_SAMPLE_TIMEOUT: Duration = Duration::from_secs(5);

fn simulated_sensor(config: &SensorConfig) -> Box<dyn SensorSource> {
    let mut imu = SimulatedImu::new(config.simulated_sample_rate_hz);
    if let Some(precision) = config.calibration_precision {
        imu = imu.with_calibration_precision(precision);
    }
    Box::new(imu)
}

/// Open the configured sensor, falling back to the simulated IMU.
fn open_sensor(config: &SensorConfig) -> Box<dyn SensorSource> {
    match config.backend {
        SensorBackend::Simulated => simulated_sensor(config),
        SensorBackend::Wt61pc => match std::fs::File::open(&config.device_path) {
            Ok(port) => {
                info!(path = %config.device_path, "WT61PC device opened");
                Box::new(Wt61pcSensor::new(port))
            }
            Err(e) => {
                warn!(?e, path = %config.device_path, "WT61PC not available, using simulated IMU");
                simulated_sensor(config)
            }
        },
    }
}

fn engine_config(config: &SensorConfig) -> EngineConfig {
    EngineConfig {
        max_degrees_per_second: config.max_degrees_per_second,
        madgwick_beta: config.madgwick_beta,
        calibration_max_windows: config.calibration_max_windows,
        ..EngineConfig::default()
    }
}

fn main() -> Result<()> {
    // Initialize logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "gyrosight=info,gyrosight_imu=info,gyrosight_tracker=info".into()
            }),
        )
        .init();

    info!("Gyrosight starting");

    // Load config.
    let config = gyrosight_config::load_config().unwrap_or_else(|e| {
        warn!(?e, "Failed to load config, using defaults");
        AppConfig::default()
    });
    info!(backend = ?config.sensor.backend, width = config.camera.width, height = config.camera.height, "Config loaded");

    // Calibration blocks until the sensor is still. It runs before the
    // runtime exists so Ctrl-C keeps its default behavior meanwhile.
    let mut engine = OrientationEngine::new(open_sensor(&config.sensor), engine_config(&config.sensor));
    info!("Calibrating, hold the device still");
    engine.start()?;
    let orientation = engine.reader();
    orientation.wait_for_sample(FIRST_SAMPLE_TIMEOUT)?;
    orientation.start_local_transform()?;

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    let result = runtime.block_on(track(&config, orientation));

    engine.stop();
    if let Err(e) = gyrosight_config::save_config(&config) {
        warn!(?e, "Failed to save config");
    }
    result
}

/// Capture and draw until Ctrl-C.
async fn track(config: &AppConfig, orientation: OrientationReader) -> Result<()> {
    let camera_config = &config.camera;
    let camera = CameraModel::new(camera_config.width, camera_config.height)
        .with_horizontal_fov(camera_config.horizontal_fov_deg)
        .with_video_latency(Duration::from_millis(camera_config.video_latency_ms));
    let source = TestPatternSource::new(camera_config.width, camera_config.height)?
        .with_frame_rate(camera_config.capture_fps);
    let mut tracker = PoiTracker::new(camera, Arc::new(orientation.clone()), Box::new(source));
    tracker.set_camera_direction_in_gyro_space(camera_config.forward, camera_config.right)?;
    if let Some(poi) = &config.point_of_interest {
        tracker.set_point_of_interest(poi.position, poi.radius);
    }
    tracker.start()?;

    let mut compositor = OverlayCompositor::default();
    let mut ticker = tokio::time::interval(DRAW_INTERVAL);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match tracker.draw(&mut compositor) {
                    Ok(()) | Err(TrackerError::NoFrame) => {}
                    Err(e) => warn!(?e, "Draw failed"),
                }
                let poi = tracker.point_of_interest();
                info!(
                    video_fps = tracker.video_fps(),
                    imu_rate = orientation.sample_rate(),
                    poi = ?poi.map(|p| p.position),
                    "Status"
                );
                debug!(local = ?orientation.local_transform(), accel = ?orientation.accel(), "Orientation");
            }
            result = &mut shutdown => {
                if let Err(e) = result {
                    warn!(?e, "Failed to listen for Ctrl-C");
                }
                break;
            }
        }
    }

    info!("Shutting down");
    tracker.stop();
    Ok(())
}

pub mod calibration;
pub mod fusion;
pub mod protocol;
pub mod reader;
pub mod sensor;
pub mod simulated;
pub mod types;
pub mod wt61pc;

pub use reader::{invert_rotation, OrientationReader, OrientationSource};
pub use sensor::{SensorError, SensorSource};
pub use types::{OrientationState, SensorReading};

use calibration::calibrate;
use fusion::SensorFusion;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::watch;

/// Sleep when the sensor has nothing ready.
const IDLE_SLEEP: Duration = Duration::from_millis(1);

/// Floor for the measured sample interval.
const MIN_SAMPLE_INTERVAL: Duration = Duration::from_micros(1);

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("sensor failed to start")]
    SensorUnavailable(#[source] SensorError),
    #[error("gyro calibration did not converge after {windows} windows")]
    CalibrationTimeout { windows: u32 },
    #[error("orientation engine is already running")]
    AlreadyStarted,
    #[error("previous sampling thread has not exited yet")]
    StillStopping,
    #[error("no orientation sample within {timeout:?}")]
    NoSample { timeout: Duration },
    #[error("rotation is not invertible")]
    DegenerateRotation,
    #[error("failed to spawn sampling thread")]
    Spawn(#[source] std::io::Error),
}

/// Construction-time engine parameters.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum angular rate the sensor is configured for (deg/s).
    pub max_degrees_per_second: u32,
    /// Madgwick filter beta parameter.
    pub madgwick_beta: f32,
    /// Give up calibration after this many windows. `None` blocks until the
    /// device is held still.
    pub calibration_max_windows: Option<u32>,
    /// How long `stop` waits for the sampling thread to acknowledge.
    pub stop_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_degrees_per_second: 1000,
            madgwick_beta: 0.1,
            calibration_max_windows: None,
            stop_timeout: Duration::from_secs(1),
        }
    }
}

/// What the sampling thread hands back when it exits.
type LoopResources = (Box<dyn SensorSource>, watch::Sender<OrientationState>);

struct SamplingWorker {
    handle: JoinHandle<LoopResources>,
    stop: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
}

/// Orientation estimation engine.
///
/// Calibrates the sensor, then runs a background thread that reads it,
/// fuses the readings and publishes the latest orientation snapshot.
pub struct OrientationEngine {
    config: EngineConfig,
    /// Present while stopped; owned by the sampling thread while running.
    sensor: Option<Box<dyn SensorSource>>,
    state_tx: Option<watch::Sender<OrientationState>>,
    reader: OrientationReader,
    worker: Option<SamplingWorker>,
    /// Thread that missed the stop timeout; still owns the sensor.
    detached: Option<SamplingWorker>,
}

impl OrientationEngine {
    pub fn new(sensor: Box<dyn SensorSource>, config: EngineConfig) -> Self {
        let (state_tx, state_rx) = watch::channel(OrientationState::default());
        Self {
            config,
            sensor: Some(sensor),
            state_tx: Some(state_tx),
            reader: OrientationReader::new(state_rx, Arc::new(RwLock::new(glam::Mat3::IDENTITY))),
            worker: None,
            detached: None,
        }
    }

    /// Start the sensor, calibrate it and launch the sampling thread.
    ///
    /// Calibration runs on the calling thread.
    pub fn start(&mut self) -> Result<(), EngineError> {
        if self.worker.is_some() {
            return Err(EngineError::AlreadyStarted);
        }
        self.reclaim_detached()?;
        let (Some(mut sensor), Some(state_tx)) = (self.sensor.take(), self.state_tx.take()) else {
            // Only a failed spawn loses them.
            return Err(EngineError::SensorUnavailable(SensorError::Closed));
        };

        if let Err(e) = sensor.start_sensor(self.config.max_degrees_per_second) {
            tracing::warn!(?e, "Sensor failed to start");
            self.sensor = Some(sensor);
            self.state_tx = Some(state_tx);
            return Err(EngineError::SensorUnavailable(e));
        }

        let precision = sensor.required_calibration_precision();
        let calibration = match calibrate(sensor.as_mut(), precision, self.config.calibration_max_windows) {
            Ok(calibration) => calibration,
            Err(e) => {
                self.sensor = Some(sensor);
                self.state_tx = Some(state_tx);
                return Err(e);
            }
        };

        state_tx.send_modify(|state| {
            state.gyro_bias = calibration.bias;
            state.calibration_dispersion = calibration.dispersion;
            // Nothing sampled in this run yet.
            state.timestamp = None;
        });

        let fusion = SensorFusion::new(self.config.madgwick_beta, calibration.bias);
        let stop = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));
        let loop_stop = stop.clone();
        let loop_finished = finished.clone();

        // The closure owns the sensor and sender; on spawn failure they are gone.
        let handle = std::thread::Builder::new()
            .name("gyrosight-sampling".into())
            .spawn(move || sampling_loop(sensor, state_tx, fusion, loop_stop, loop_finished))
            .map_err(EngineError::Spawn)?;

        self.worker = Some(SamplingWorker {
            handle,
            stop,
            finished,
        });
        tracing::info!("Orientation engine started");
        Ok(())
    }

    /// Stop the sampling thread. Safe to call repeatedly.
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        worker.stop.store(true, Ordering::Release);

        let deadline = Instant::now() + self.config.stop_timeout;
        while !worker.finished.load(Ordering::Acquire) && Instant::now() < deadline {
            std::thread::sleep(IDLE_SLEEP);
        }
        if !worker.finished.load(Ordering::Acquire) {
            tracing::warn!(
                timeout = ?self.config.stop_timeout,
                "Sampling thread did not acknowledge stop, detaching it"
            );
            self.detached = Some(worker);
            return;
        }

        self.join_worker(worker);
        tracing::info!("Orientation engine stopped");
    }

    /// Take the sensor back from a thread detached by `stop`, once it exits.
    fn reclaim_detached(&mut self) -> Result<(), EngineError> {
        let Some(worker) = self.detached.take() else {
            return Ok(());
        };
        if !worker.finished.load(Ordering::Acquire) {
            self.detached = Some(worker);
            return Err(EngineError::StillStopping);
        }
        self.join_worker(worker);
        Ok(())
    }

    fn join_worker(&mut self, worker: SamplingWorker) {
        match worker.handle.join() {
            Ok((sensor, state_tx)) => {
                self.sensor = Some(sensor);
                self.state_tx = Some(state_tx);
            }
            Err(_) => tracing::error!("Sampling thread panicked"),
        }
    }

    /// Whether the sampling thread is running.
    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// A handle for reading orientation from any thread.
    pub fn reader(&self) -> OrientationReader {
        self.reader.clone()
    }

    /// Thread-safe snapshot of the current rotation.
    pub fn transform(&self) -> glam::Mat3 {
        self.reader.transform()
    }

    /// Capture the current rotation as the zero reference.
    pub fn start_local_transform(&self) -> Result<(), EngineError> {
        self.reader.start_local_transform()
    }

    /// Rotation relative to the zero reference.
    pub fn local_transform(&self) -> glam::Mat3 {
        self.reader.local_transform()
    }

    /// Latest acceleration (m/s^2).
    pub fn accel(&self) -> glam::Vec3 {
        self.reader.accel()
    }
}

impl Drop for OrientationEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Background loop: read the sensor, run fusion, publish the snapshot.
fn sampling_loop(
    mut sensor: Box<dyn SensorSource>,
    state_tx: watch::Sender<OrientationState>,
    mut fusion: SensorFusion,
    stop: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
) -> LoopResources {
    let mut last_sample = Instant::now();
    let mut sample_count: u64 = 0;

    while !stop.load(Ordering::Acquire) {
        match sensor.collect() {
            Ok(Some(reading)) => {
                let now = Instant::now();
                let dt = now.duration_since(last_sample).max(MIN_SAMPLE_INTERVAL);
                last_sample = now;

                let output = fusion.update(&reading, dt);
                state_tx.send_modify(|state| {
                    state.previous_quaternion = state.quaternion;
                    state.rotation = output.rotation;
                    state.quaternion = output.quaternion;
                    state.accel = output.accel;
                    state.gyro_rate = output.gyro_rate;
                    state.sample_rate = 1.0 / dt.as_secs_f32();
                    state.timestamp = Some(now);
                    state.sample_interval = dt;
                });

                sample_count += 1;
                if sample_count % 1000 == 0 {
                    tracing::debug!(sample_count, "IMU samples processed");
                }
            }
            Ok(None) => std::thread::sleep(IDLE_SLEEP),
            Err(e) => {
                tracing::trace!(?e, "Skipping failed sensor read");
                std::thread::sleep(IDLE_SLEEP);
            }
        }
    }

    tracing::debug!(sample_count, "Sampling thread exiting");
    finished.store(true, Ordering::Release);
    (sensor, state_tx)
}

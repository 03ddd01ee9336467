use crate::sensor::{SensorError, SensorSource};
use crate::types::SensorReading;
use glam::Vec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::{Duration, Instant};
use tracing::info;

/// Raw IMU that synthesizes readings for a body spinning at a constant rate.
///
/// Used when no hardware is attached and for testing.
pub struct SimulatedImu {
    /// True angular rate (deg/s).
    angular_rate: Vec3,
    /// Constant gyro offset added to every reading (deg/s).
    gyro_bias: Vec3,
    gravity: Vec3,
    /// Uniform noise amplitude per axis.
    noise: f32,
    rng: StdRng,
    /// `None` emits a sample on every call.
    period: Option<Duration>,
    next_due: Option<Instant>,
    calibration_precision: f32,
    samples_emitted: u64,
}

impl SimulatedImu {
    /// A stationary, noiseless IMU sampling at `sample_rate_hz` (0 = unpaced).
    pub fn new(sample_rate_hz: f32) -> Self {
        let period = (sample_rate_hz > 0.0).then(|| Duration::from_secs_f32(1.0 / sample_rate_hz));
        Self {
            angular_rate: Vec3::ZERO,
            gyro_bias: Vec3::ZERO,
            gravity: Vec3::new(0.0, 0.0, 9.81),
            noise: 0.0,
            rng: StdRng::seed_from_u64(0),
            period,
            next_due: None,
            calibration_precision: 1.0,
            samples_emitted: 0,
        }
    }

    pub fn with_angular_rate(mut self, degrees_per_second: Vec3) -> Self {
        self.angular_rate = degrees_per_second;
        self
    }

    pub fn with_gyro_bias(mut self, bias: Vec3) -> Self {
        self.gyro_bias = bias;
        self
    }

    pub fn with_gravity(mut self, gravity: Vec3) -> Self {
        self.gravity = gravity;
        self
    }

    pub fn with_noise(mut self, amplitude: f32, seed: u64) -> Self {
        self.noise = amplitude.abs();
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn with_calibration_precision(mut self, precision: f32) -> Self {
        self.calibration_precision = precision;
        self
    }

    pub fn samples_emitted(&self) -> u64 {
        self.samples_emitted
    }

    fn jitter(&mut self) -> Vec3 {
        if self.noise == 0.0 {
            return Vec3::ZERO;
        }
        let n = self.noise;
        Vec3::new(
            self.rng.gen_range(-n..=n),
            self.rng.gen_range(-n..=n),
            self.rng.gen_range(-n..=n),
        )
    }
}

impl SensorSource for SimulatedImu {
    fn start_sensor(&mut self, max_degrees_per_second: u32) -> Result<(), SensorError> {
        info!(max_degrees_per_second, period = ?self.period, "Simulated IMU started");
        Ok(())
    }

    fn collect(&mut self) -> Result<Option<SensorReading>, SensorError> {
        if let Some(period) = self.period {
            let now = Instant::now();
            if self.next_due.is_some_and(|due| now < due) {
                return Ok(None);
            }
            self.next_due = Some(now + period);
        }

        let gyro = self.angular_rate + self.gyro_bias + self.jitter();
        let accel = self.gravity + self.jitter();
        self.samples_emitted += 1;

        Ok(Some(SensorReading::Inertial {
            accel,
            gyro,
            mag: None,
        }))
    }

    fn required_calibration_precision(&self) -> f32 {
        self.calibration_precision
    }
}

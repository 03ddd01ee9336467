use glam::{Mat3, Quat, Vec3};
use std::time::{Duration, Instant};

/// One sample reported by a sensor backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SensorReading {
    /// Raw inertial data; orientation has to be fused from it.
    Inertial {
        /// Linear acceleration (m/s^2).
        accel: Vec3,
        /// Angular velocity (deg/s).
        gyro: Vec3,
        /// Magnetic field, when the device has a magnetometer.
        mag: Option<Vec3>,
    },
    /// The device estimates its own absolute orientation.
    Absolute {
        /// Linear acceleration (m/s^2).
        accel: Vec3,
        /// Angular velocity (deg/s).
        gyro: Vec3,
        /// Euler angles (degrees).
        euler: Vec3,
    },
}

impl SensorReading {
    pub fn accel(&self) -> Vec3 {
        match *self {
            SensorReading::Inertial { accel, .. } | SensorReading::Absolute { accel, .. } => accel,
        }
    }

    pub fn gyro(&self) -> Vec3 {
        match *self {
            SensorReading::Inertial { gyro, .. } | SensorReading::Absolute { gyro, .. } => gyro,
        }
    }
}

/// Snapshot published by the sampling loop.
///
/// Readers always get a whole snapshot from one loop iteration.
#[derive(Debug, Clone, Copy)]
pub struct OrientationState {
    /// Current rotation.
    pub rotation: Mat3,
    /// Current rotation as a unit quaternion.
    pub quaternion: Quat,
    /// Rotation published by the previous iteration.
    pub previous_quaternion: Quat,
    /// Latest acceleration, device frame (m/s^2).
    pub accel: Vec3,
    /// Latest bias-corrected angular rate, device frame (deg/s).
    pub gyro_rate: Vec3,
    /// Measured sample rate (Hz).
    pub sample_rate: f32,
    /// Gyro bias subtracted from every reading (deg/s).
    pub gyro_bias: Vec3,
    /// Mean dispersion of the accepted calibration window (deg/s).
    pub calibration_dispersion: f32,
    /// When the latest sample was taken. `None` until the first sample.
    pub timestamp: Option<Instant>,
    /// Time between the latest two samples.
    pub sample_interval: Duration,
}

impl Default for OrientationState {
    fn default() -> Self {
        Self {
            rotation: Mat3::IDENTITY,
            quaternion: Quat::IDENTITY,
            previous_quaternion: Quat::IDENTITY,
            accel: Vec3::new(0.0, 0.0, 9.81),
            gyro_rate: Vec3::ZERO,
            sample_rate: 0.0,
            gyro_bias: Vec3::ZERO,
            calibration_dispersion: 0.0,
            timestamp: None,
            sample_interval: Duration::ZERO,
        }
    }
}

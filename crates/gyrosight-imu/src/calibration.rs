//! Gyroscope bias calibration.
//!
//! The device is assumed stationary while windows of consecutive gyro
//! samples are collected. The first window whose samples stay close enough
//! to their own mean gives the bias.

use crate::sensor::SensorSource;
use crate::EngineError;
use glam::Vec3;
use std::time::Duration;
use tracing::{debug, info, trace};

/// Consecutive samples per calibration window.
pub const CALIBRATION_WINDOW: usize = 50;

/// Pause between calibration reads.
const SAMPLE_INTERVAL: Duration = Duration::from_millis(1);

/// Accepted calibration result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GyroCalibration {
    /// Gyro bias (deg/s).
    pub bias: Vec3,
    /// Mean distance of the window's samples from the bias (deg/s).
    pub dispersion: f32,
    /// Windows evaluated, including the accepted one.
    pub windows: u32,
}

/// Fixed-size window of gyro samples.
#[derive(Debug, Clone)]
pub struct CalibrationWindow {
    samples: Vec<Vec3>,
}

impl CalibrationWindow {
    pub fn new() -> Self {
        Self {
            samples: Vec::with_capacity(CALIBRATION_WINDOW),
        }
    }

    /// Add a sample. When the window fills up, returns its mean and mean
    /// dispersion and starts over.
    pub fn push(&mut self, gyro: Vec3) -> Option<(Vec3, f32)> {
        self.samples.push(gyro);
        if self.samples.len() < CALIBRATION_WINDOW {
            return None;
        }
        let stats = window_statistics(&self.samples);
        self.samples.clear();
        Some(stats)
    }
}

impl Default for CalibrationWindow {
    fn default() -> Self {
        Self::new()
    }
}

/// Mean vector and average Euclidean distance of each sample from it.
pub fn window_statistics(samples: &[Vec3]) -> (Vec3, f32) {
    if samples.is_empty() {
        return (Vec3::ZERO, 0.0);
    }
    let n = samples.len() as f32;
    let mean = samples.iter().copied().sum::<Vec3>() / n;
    let dispersion = samples.iter().map(|s| s.distance(mean)).sum::<f32>() / n;
    (mean, dispersion)
}

/// Estimate the gyro bias of a stationary sensor.
///
/// A precision of zero skips calibration. Without `max_windows` this keeps
/// collecting until a window converges.
pub fn calibrate(
    sensor: &mut dyn SensorSource,
    precision: f32,
    max_windows: Option<u32>,
) -> Result<GyroCalibration, EngineError> {
    if precision <= 0.0 {
        info!("Gyro calibration disabled");
        return Ok(GyroCalibration {
            bias: Vec3::ZERO,
            dispersion: 0.0,
            windows: 0,
        });
    }

    info!(precision, "Gyro calibration started, keep the device still");
    let mut window = CalibrationWindow::new();
    let mut windows = 0u32;

    loop {
        match sensor.collect() {
            Ok(Some(reading)) => {
                if let Some((mean, dispersion)) = window.push(reading.gyro()) {
                    windows += 1;
                    debug!(windows, dispersion, "Calibration window evaluated");
                    if dispersion < precision {
                        info!(
                            bias_x = mean.x,
                            bias_y = mean.y,
                            bias_z = mean.z,
                            dispersion,
                            windows,
                            "Gyro calibration complete"
                        );
                        return Ok(GyroCalibration {
                            bias: mean,
                            dispersion,
                            windows,
                        });
                    }
                    if max_windows.is_some_and(|max| windows >= max) {
                        return Err(EngineError::CalibrationTimeout { windows });
                    }
                }
            }
            Ok(None) => {}
            Err(e) => trace!(?e, "Skipping failed calibration read"),
        }
        std::thread::sleep(SAMPLE_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::SimulatedImu;

    #[test]
    fn statistics_of_constant_window() {
        let samples = vec![Vec3::new(1.0, 2.0, 3.0); 10];
        let (mean, dispersion) = window_statistics(&samples);
        assert!(mean.abs_diff_eq(Vec3::new(1.0, 2.0, 3.0), 1e-6));
        assert!(dispersion.abs() < 1e-6);
    }

    #[test]
    fn statistics_of_symmetric_spread() {
        let samples = [Vec3::new(1.0, 0.0, 0.0), Vec3::new(-1.0, 0.0, 0.0)];
        let (mean, dispersion) = window_statistics(&samples);
        assert!(mean.abs_diff_eq(Vec3::ZERO, 1e-6));
        assert!((dispersion - 1.0).abs() < 1e-6);
    }

    #[test]
    fn window_reports_only_when_full() {
        let mut window = CalibrationWindow::new();
        for _ in 0..CALIBRATION_WINDOW - 1 {
            assert!(window.push(Vec3::ONE).is_none());
        }
        let (mean, _) = window.push(Vec3::ONE).unwrap();
        assert!(mean.abs_diff_eq(Vec3::ONE, 1e-6));
        // Starts over afterwards.
        assert!(window.push(Vec3::ONE).is_none());
    }

    #[test]
    fn converges_to_constant_bias_under_noise() {
        let bias = Vec3::new(0.8, -1.2, 0.3);
        let mut sensor = SimulatedImu::new(0.0)
            .with_gyro_bias(bias)
            .with_noise(0.2, 7);
        let result = calibrate(&mut sensor, 1.0, Some(5)).unwrap();
        assert_eq!(result.windows, 1);
        assert!(result.dispersion < 1.0);
        assert!(result.bias.abs_diff_eq(bias, 0.1), "bias {:?}", result.bias);
    }

    #[test]
    fn zero_precision_skips_calibration() {
        let mut sensor = SimulatedImu::new(0.0).with_gyro_bias(Vec3::splat(5.0));
        let result = calibrate(&mut sensor, 0.0, None).unwrap();
        assert_eq!(result.bias, Vec3::ZERO);
        assert_eq!(result.windows, 0);
        assert_eq!(sensor.samples_emitted(), 0);
    }

    #[test]
    fn bounded_calibration_gives_up_on_moving_device() {
        let mut sensor = SimulatedImu::new(0.0).with_noise(20.0, 3);
        let err = calibrate(&mut sensor, 1.0, Some(2)).unwrap_err();
        assert!(matches!(err, EngineError::CalibrationTimeout { windows: 2 }));
    }
}

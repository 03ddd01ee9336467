use crate::types::SensorReading;
use ahrs::{Ahrs, Madgwick};
use glam::{Mat3, Quat, Vec3};
use std::time::Duration;

/// Number of interpolated filter steps between two consecutive readings.
pub const SUB_STEPS: u32 = 2;

/// Result of feeding one reading through [`SensorFusion`].
#[derive(Debug, Clone, Copy)]
pub struct FusionOutput {
    pub rotation: Mat3,
    pub quaternion: Quat,
    pub accel: Vec3,
    /// Bias-corrected angular rate (deg/s).
    pub gyro_rate: Vec3,
}

/// Sensor fusion using the Madgwick AHRS filter.
///
/// Integrates bias-corrected gyro + accelerometer readings into a rotation,
/// or passes a device-supplied absolute orientation straight through.
pub struct SensorFusion {
    filter: Madgwick<f64>,
    beta: f64,
    /// Gyroscope bias (deg/s), fixed by calibration.
    gyro_bias: Vec3,
    /// Accel and gyro (rad/s) of the previous fused reading.
    previous: Option<(Vec3, Vec3)>,
}

impl SensorFusion {
    pub fn new(beta: f32, gyro_bias: Vec3) -> Self {
        // The sample period is replaced on every step; this one is never used.
        let sample_dt = 1.0 / 1000.0;
        Self {
            filter: Madgwick::new(sample_dt, beta as f64),
            beta: beta as f64,
            gyro_bias,
            previous: None,
        }
    }

    pub fn gyro_bias(&self) -> Vec3 {
        self.gyro_bias
    }

    /// Current filter quaternion.
    pub fn quaternion(&self) -> Quat {
        let q = self.filter.quat;
        Quat::from_xyzw(
            q.coords[0] as f32,
            q.coords[1] as f32,
            q.coords[2] as f32,
            q.coords[3] as f32, // w component
        )
    }

    /// Process one reading taken `dt` after the previous one.
    pub fn update(&mut self, reading: &SensorReading, dt: Duration) -> FusionOutput {
        let gyro_rate = reading.gyro() - self.gyro_bias;

        match *reading {
            SensorReading::Absolute { accel, euler, .. } => {
                let rotation = absolute_rotation(euler);
                FusionOutput {
                    rotation,
                    quaternion: Quat::from_mat3(&rotation),
                    accel,
                    gyro_rate,
                }
            }
            SensorReading::Inertial { accel, mag, .. } => {
                let gyro = gyro_rate * (std::f32::consts::PI / 180.0);
                let dt = dt.as_secs_f64();

                match self.previous {
                    None => self.step(gyro, accel, mag, dt),
                    Some((prev_accel, prev_gyro)) => {
                        // Linear interpolation between readings keeps the
                        // integration error down at low loop rates.
                        let da = (accel - prev_accel) / SUB_STEPS as f32;
                        let dg = (gyro - prev_gyro) / SUB_STEPS as f32;
                        let sub_dt = dt / SUB_STEPS as f64;
                        for k in 1..=SUB_STEPS {
                            let k = k as f32;
                            self.step(prev_gyro + dg * k, prev_accel + da * k, mag, sub_dt);
                        }
                    }
                }
                self.previous = Some((accel, gyro));

                let quaternion = self.quaternion();
                FusionOutput {
                    rotation: Mat3::from_quat(quaternion),
                    quaternion,
                    accel,
                    gyro_rate,
                }
            }
        }
    }

    /// One filter step. `gyro` is in rad/s.
    fn step(&mut self, gyro: Vec3, accel: Vec3, mag: Option<Vec3>, dt: f64) {
        // Madgwick keeps a fixed sample period, so rebuild it around the
        // current estimate with this step's period.
        self.filter = Madgwick::new_with_quat(dt, self.beta, self.filter.quat);

        let gyro = [gyro.x as f64, gyro.y as f64, gyro.z as f64];
        let accel = [accel.x as f64, accel.y as f64, accel.z as f64];

        let fused = match mag {
            Some(mag) => {
                let mag = [mag.x as f64, mag.y as f64, mag.z as f64];
                self.filter
                    .update(&gyro.into(), &accel.into(), &mag.into())
                    .is_ok()
            }
            None => self.filter.update_imu(&gyro.into(), &accel.into()).is_ok(),
        };

        // Zero accelerometer (or magnetometer) norm: integrate the gyro alone.
        if !fused {
            self.filter.update_gyro(&gyro.into());
        }
    }
}

/// Rotation built as Rx * Ry * Rz from Euler angles in degrees.
pub fn euler_matrix(euler_degrees: Vec3) -> Mat3 {
    let e = euler_degrees * (std::f32::consts::PI / 180.0);
    Mat3::from_rotation_x(e.x) * Mat3::from_rotation_y(e.y) * Mat3::from_rotation_z(e.z)
}

/// World-to-body rotation for a device-reported orientation (degrees).
pub fn absolute_rotation(euler_degrees: Vec3) -> Mat3 {
    euler_matrix(-euler_degrees).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRAVITY: Vec3 = Vec3::new(0.0, 0.0, 9.81);

    fn inertial(gyro: Vec3) -> SensorReading {
        SensorReading::Inertial {
            accel: GRAVITY,
            gyro,
            mag: None,
        }
    }

    #[test]
    fn constant_yaw_rate_integrates_to_quarter_turn() {
        let mut fusion = SensorFusion::new(0.1, Vec3::ZERO);
        let dt = Duration::from_millis(1);
        let mut out = None;
        for _ in 0..1000 {
            out = Some(fusion.update(&inertial(Vec3::new(0.0, 0.0, 90.0)), dt));
        }
        let out = out.unwrap();

        let (axis, angle) = out.quaternion.to_axis_angle();
        assert!((angle.to_degrees() - 90.0).abs() < 3.0, "angle {}", angle.to_degrees());
        assert!(axis.z > 0.99, "axis {axis:?}");

        let x = out.rotation * Vec3::X;
        assert!(x.abs_diff_eq(Vec3::Y, 0.05), "x maps to {x:?}");
    }

    #[test]
    fn bias_is_removed_before_integration() {
        let bias = Vec3::new(1.5, -0.7, 2.0);
        let mut fusion = SensorFusion::new(0.1, bias);
        let dt = Duration::from_millis(2);
        let mut out = None;
        for _ in 0..500 {
            out = Some(fusion.update(&inertial(bias), dt));
        }
        let out = out.unwrap();
        assert!(out.gyro_rate.abs_diff_eq(Vec3::ZERO, 1e-6));
        assert!(out.rotation.abs_diff_eq(Mat3::IDENTITY, 1e-3));
    }

    #[test]
    fn absolute_reading_skips_filter() {
        let mut fusion = SensorFusion::new(0.1, Vec3::ZERO);
        let reading = SensorReading::Absolute {
            accel: GRAVITY,
            gyro: Vec3::ZERO,
            euler: Vec3::new(30.0, 0.0, 0.0),
        };
        let out = fusion.update(&reading, Duration::from_millis(10));

        let (s, c) = 30.0_f32.to_radians().sin_cos();
        assert!(out.rotation.row(0).abs_diff_eq(Vec3::new(1.0, 0.0, 0.0), 1e-6));
        assert!(out.rotation.row(1).abs_diff_eq(Vec3::new(0.0, c, -s), 1e-6));
        assert!(out.rotation.row(2).abs_diff_eq(Vec3::new(0.0, s, c), 1e-6));
        assert!(out.rotation.abs_diff_eq(euler_matrix(Vec3::new(-30.0, 0.0, 0.0)).transpose(), 1e-6));

        // The filter itself did not move.
        assert!(fusion.quaternion().abs_diff_eq(Quat::IDENTITY, 1e-6));
    }

    #[test]
    fn euler_matrix_matches_axis_composition() {
        let m = euler_matrix(Vec3::new(10.0, 20.0, 30.0));
        let (sx, cx) = 10.0_f32.to_radians().sin_cos();
        let (sy, cy) = 20.0_f32.to_radians().sin_cos();
        let (sz, cz) = 30.0_f32.to_radians().sin_cos();
        let row0 = Vec3::new(cy * cz, -cy * sz, sy);
        let row1 = Vec3::new(cx * sz + sx * sy * cz, cx * cz - sx * sy * sz, -sx * cy);
        let row2 = Vec3::new(sx * sz - cx * sy * cz, sx * cz + cx * sy * sz, cx * cy);
        assert!(m.row(0).abs_diff_eq(row0, 1e-5));
        assert!(m.row(1).abs_diff_eq(row1, 1e-5));
        assert!(m.row(2).abs_diff_eq(row2, 1e-5));
    }

    #[test]
    fn zero_accel_falls_back_to_gyro_integration() {
        let mut fusion = SensorFusion::new(0.1, Vec3::ZERO);
        let reading = SensorReading::Inertial {
            accel: Vec3::ZERO,
            gyro: Vec3::new(0.0, 0.0, 90.0),
            mag: None,
        };
        for _ in 0..100 {
            fusion.update(&reading, Duration::from_millis(10));
        }
        let (_, angle) = fusion.quaternion().to_axis_angle();
        assert!((angle.to_degrees() - 90.0).abs() < 3.0);
    }
}

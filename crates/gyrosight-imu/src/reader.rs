use crate::types::OrientationState;
use crate::EngineError;
use glam::{Mat3, Quat, Vec3};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Poll interval while waiting for the first sample.
const SAMPLE_POLL: Duration = Duration::from_millis(1);

/// Below this |determinant| a rotation is treated as singular.
const MIN_DETERMINANT: f32 = 1e-6;

/// Read-only view of an orientation estimate.
pub trait OrientationSource: Send + Sync {
    /// Current rotation.
    fn transform(&self) -> Mat3;

    /// Rotation as it was `time_shift_secs` from now (negative = past).
    fn transform_at(&self, time_shift_secs: f32) -> Mat3 {
        let _ = time_shift_secs;
        self.transform()
    }
}

/// Inverse of `m`, or [`EngineError::DegenerateRotation`] if it is singular.
pub fn invert_rotation(m: Mat3) -> Result<Mat3, EngineError> {
    let det = m.determinant();
    if !det.is_finite() || det.abs() < MIN_DETERMINANT {
        return Err(EngineError::DegenerateRotation);
    }
    Ok(m.inverse())
}

/// Cloneable, thread-safe reader for the engine's published orientation.
///
/// The zero reference is shared by every clone.
#[derive(Clone)]
pub struct OrientationReader {
    state_rx: watch::Receiver<OrientationState>,
    /// Inverse of the rotation captured by `start_local_transform`.
    baseline: Arc<RwLock<Mat3>>,
}

impl OrientationReader {
    pub(crate) fn new(state_rx: watch::Receiver<OrientationState>, baseline: Arc<RwLock<Mat3>>) -> Self {
        Self { state_rx, baseline }
    }

    /// Get the latest published snapshot (non-blocking).
    pub fn state(&self) -> OrientationState {
        *self.state_rx.borrow()
    }

    /// Block until the sampling thread has published a sample in this run.
    ///
    /// Call before [`start_local_transform`](Self::start_local_transform) so
    /// the zero reference is the device's real attitude.
    pub fn wait_for_sample(&self, timeout: Duration) -> Result<OrientationState, EngineError> {
        let deadline = Instant::now() + timeout;
        loop {
            let state = self.state();
            if state.timestamp.is_some() {
                return Ok(state);
            }
            if Instant::now() >= deadline {
                return Err(EngineError::NoSample { timeout });
            }
            std::thread::sleep(SAMPLE_POLL);
        }
    }

    pub fn transform(&self) -> Mat3 {
        self.state_rx.borrow().rotation
    }

    /// Set the current rotation as the zero reference.
    ///
    /// Must be called before relying on [`local_transform`](Self::local_transform).
    pub fn start_local_transform(&self) -> Result<(), EngineError> {
        let inverse = invert_rotation(self.transform())?;
        *self.baseline.write() = inverse;
        tracing::info!("Zero reference set");
        Ok(())
    }

    /// Current rotation relative to the zero reference.
    pub fn local_transform(&self) -> Mat3 {
        self.transform() * *self.baseline.read()
    }

    /// Latest acceleration (m/s^2).
    pub fn accel(&self) -> Vec3 {
        self.state_rx.borrow().accel
    }

    /// Latest bias-corrected angular rate (deg/s).
    pub fn gyro_rate(&self) -> Vec3 {
        self.state_rx.borrow().gyro_rate
    }

    /// Measured sample rate (Hz).
    pub fn sample_rate(&self) -> f32 {
        self.state_rx.borrow().sample_rate
    }

    pub fn gyro_bias(&self) -> Vec3 {
        self.state_rx.borrow().gyro_bias
    }

    pub fn transform_at(&self, time_shift_secs: f32) -> Mat3 {
        shifted_rotation(&self.state(), Instant::now(), time_shift_secs)
    }
}

impl OrientationSource for OrientationReader {
    fn transform(&self) -> Mat3 {
        OrientationReader::transform(self)
    }

    fn transform_at(&self, time_shift_secs: f32) -> Mat3 {
        OrientationReader::transform_at(self, time_shift_secs)
    }
}

/// Rotation at `now + time_shift_secs`, interpolated between the last two
/// samples. Never extrapolates past the latest sample.
fn shifted_rotation(state: &OrientationState, now: Instant, time_shift_secs: f32) -> Mat3 {
    let Some(timestamp) = state.timestamp else {
        return state.rotation;
    };
    let age = now.saturating_duration_since(timestamp).as_secs_f32() + time_shift_secs;
    if age >= 0.0 {
        return state.rotation;
    }

    let interval = state.sample_interval.as_secs_f32();
    if interval <= 0.0 || age <= -interval {
        return Mat3::from_quat(state.previous_quaternion);
    }

    let t = 1.0 + age / interval;
    Mat3::from_quat(slerp_shortest(state.previous_quaternion, state.quaternion, t))
}

fn slerp_shortest(from: Quat, to: Quat, t: f32) -> Quat {
    let to = if from.dot(to) < 0.0 { -to } else { to };
    from.slerp(to, t).normalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader_with(state: OrientationState) -> (watch::Sender<OrientationState>, OrientationReader) {
        let (tx, rx) = watch::channel(state);
        (tx, OrientationReader::new(rx, Arc::new(RwLock::new(Mat3::IDENTITY))))
    }

    fn two_sample_state(now: Instant) -> OrientationState {
        let current = Quat::from_rotation_z(20_f32.to_radians());
        OrientationState {
            rotation: Mat3::from_quat(current),
            quaternion: current,
            previous_quaternion: Quat::IDENTITY,
            timestamp: Some(now),
            sample_interval: Duration::from_millis(10),
            ..OrientationState::default()
        }
    }

    #[test]
    fn inverse_times_rotation_is_identity() {
        for m in [
            Mat3::from_rotation_x(0.3),
            Mat3::from_euler(glam::EulerRot::ZYX, 1.0, -0.4, 2.2),
            Mat3::from_axis_angle(Vec3::new(1.0, 1.0, 0.0).normalize(), 2.5),
        ] {
            let inv = invert_rotation(m).unwrap();
            assert!((m * inv).abs_diff_eq(Mat3::IDENTITY, 1e-5));
        }
    }

    #[test]
    fn singular_matrix_is_rejected() {
        let m = Mat3::from_cols(Vec3::X, Vec3::X, Vec3::Z);
        assert!(matches!(invert_rotation(m), Err(EngineError::DegenerateRotation)));
        assert!(invert_rotation(Mat3::ZERO).is_err());
    }

    #[test]
    fn local_transform_tracks_rotation_since_reset() {
        let start = Mat3::from_rotation_y(0.7);
        let (tx, reader) = reader_with(OrientationState {
            rotation: start,
            ..OrientationState::default()
        });
        reader.start_local_transform().unwrap();
        assert!(reader.local_transform().abs_diff_eq(Mat3::IDENTITY, 1e-5));

        let turn = Mat3::from_rotation_z(0.25);
        tx.send_modify(|s| s.rotation = turn * start);
        assert!(reader.local_transform().abs_diff_eq(turn * start * start.inverse(), 1e-5));

        // Clones share the zero reference.
        let clone = reader.clone();
        assert!(clone.local_transform().abs_diff_eq(reader.local_transform(), 1e-6));
    }

    #[test]
    fn shifted_rotation_interpolates_between_samples() {
        let now = Instant::now();
        let state = two_sample_state(now);

        assert!(shifted_rotation(&state, now, 0.0).abs_diff_eq(state.rotation, 1e-6));
        assert!(shifted_rotation(&state, now, -0.05).abs_diff_eq(Mat3::IDENTITY, 1e-5));

        let half = shifted_rotation(&state, now, -0.005);
        assert!(half.abs_diff_eq(Mat3::from_rotation_z(10_f32.to_radians()), 1e-4));
    }

    #[test]
    fn wait_for_sample_sees_published_state() {
        let (tx, reader) = reader_with(OrientationState::default());
        assert!(matches!(
            reader.wait_for_sample(Duration::from_millis(5)),
            Err(EngineError::NoSample { .. })
        ));

        let publisher = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            tx.send_modify(|s| s.timestamp = Some(Instant::now()));
            tx
        });
        let state = reader.wait_for_sample(Duration::from_secs(2)).unwrap();
        assert!(state.timestamp.is_some());
        drop(publisher.join().unwrap());
    }

    #[test]
    fn shifted_rotation_without_samples_is_current() {
        let state = OrientationState::default();
        assert!(shifted_rotation(&state, Instant::now(), -1.0).abs_diff_eq(Mat3::IDENTITY, 1e-6));
    }
}

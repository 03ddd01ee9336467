use crate::TrackerError;
use glam::{Mat3, Vec2, Vec3};
use gyrosight_imu::invert_rotation;
use std::time::Duration;

/// Rays with a forward component below this cannot be projected.
const MIN_RAY_DEPTH: f32 = 1e-6;

/// Pinhole camera producing `width` x `height` frames.
///
/// Camera space is x right, y up, z along the optical axis, scaled so one
/// unit of x spans the image width at the focal depth.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraModel {
    pub width: u32,
    pub height: u32,
    pub horizontal_fov_deg: f32,
    /// How far the video lags the IMU.
    pub video_latency: Duration,
}

impl CameraModel {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            horizontal_fov_deg: 90.0,
            video_latency: Duration::ZERO,
        }
    }

    pub fn with_horizontal_fov(mut self, degrees: f32) -> Self {
        self.horizontal_fov_deg = degrees;
        self
    }

    pub fn with_video_latency(mut self, latency: Duration) -> Self {
        self.video_latency = latency;
        self
    }

    /// Forward component of every ray built from a pixel.
    pub fn focal_depth(&self) -> f32 {
        0.5 / (self.horizontal_fov_deg.to_radians() / 2.0).tan()
    }

    /// Pixel to camera-space ray.
    pub fn image_to_cam(&self, point: Vec2) -> Vec3 {
        let w = self.width as f32;
        let h = self.height as f32;
        Vec3::new((point.x - w / 2.0) / w, (h / 2.0 - point.y) / w, self.focal_depth())
    }

    /// Camera-space ray to pixel, projecting onto the focal plane.
    pub fn cam_to_image(&self, ray: Vec3) -> Result<Vec2, TrackerError> {
        if !ray.is_finite() || ray.z < MIN_RAY_DEPTH {
            return Err(TrackerError::DegenerateProjection);
        }
        let w = self.width as f32;
        let h = self.height as f32;
        let scale = self.focal_depth() / ray.z;
        Ok(Vec2::new(ray.x * scale * w + w / 2.0, h / 2.0 - ray.y * scale * w))
    }
}

/// Camera axes expressed in the orientation engine's frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraBasis {
    pub forward: Vec3,
    pub right: Vec3,
    pub up: Vec3,
}

impl CameraBasis {
    /// Build an orthonormal basis. `up` is `right x forward`; `right` is then
    /// re-derived so the three axes stay perpendicular.
    pub fn new(forward: Vec3, right: Vec3) -> Result<Self, TrackerError> {
        let forward = forward.try_normalize().ok_or(TrackerError::DegenerateBasis)?;
        let up = right
            .cross(forward)
            .try_normalize()
            .ok_or(TrackerError::DegenerateBasis)?;
        let right = forward.cross(up).normalize();
        Ok(Self { forward, right, up })
    }

    pub fn cam_to_gyro(&self, v: Vec3) -> Vec3 {
        self.right * v.x + self.up * v.y + self.forward * v.z
    }

    pub fn gyro_to_cam(&self, v: Vec3) -> Vec3 {
        Vec3::new(v.dot(self.right), v.dot(self.up), v.dot(self.forward))
    }
}

impl Default for CameraBasis {
    fn default() -> Self {
        Self {
            forward: Vec3::Z,
            right: Vec3::X,
            up: Vec3::NEG_Y,
        }
    }
}

/// Predict where `point`, seen in a frame captured at `previous_rotation`,
/// appears in a frame captured at `current_rotation`. Rotation only.
pub fn reproject(
    camera: &CameraModel,
    point: Vec2,
    previous_rotation: Mat3,
    previous_basis: &CameraBasis,
    current_rotation: Mat3,
    current_basis: &CameraBasis,
) -> Result<Vec2, TrackerError> {
    let inverse = invert_rotation(previous_rotation).map_err(|_| TrackerError::DegenerateRotation)?;
    let delta = current_rotation * inverse;

    let ray = previous_basis.cam_to_gyro(camera.image_to_cam(point));
    camera.cam_to_image(current_basis.gyro_to_cam(delta * ray))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> CameraModel {
        CameraModel::new(640, 480)
    }

    #[test]
    fn image_cam_round_trip() {
        for fov in [60.0, 90.0, 110.0] {
            let cam = camera().with_horizontal_fov(fov);
            for point in [
                Vec2::new(0.0, 0.0),
                Vec2::new(320.0, 240.0),
                Vec2::new(639.0, 12.5),
                Vec2::new(100.25, 479.0),
            ] {
                let back = cam.cam_to_image(cam.image_to_cam(point)).unwrap();
                assert!(back.abs_diff_eq(point, 1e-3), "{point} -> {back}");
            }
        }
    }

    #[test]
    fn center_pixel_is_optical_axis() {
        let cam = camera();
        let ray = cam.image_to_cam(Vec2::new(320.0, 240.0));
        assert!(ray.abs_diff_eq(Vec3::new(0.0, 0.0, 0.5), 1e-6));
    }

    #[test]
    fn ray_behind_camera_is_rejected() {
        let cam = camera();
        assert!(matches!(
            cam.cam_to_image(Vec3::new(0.1, 0.0, -1.0)),
            Err(TrackerError::DegenerateProjection)
        ));
        assert!(cam.cam_to_image(Vec3::new(0.1, 0.0, 0.0)).is_err());
    }

    #[test]
    fn basis_is_orthonormal() {
        let basis = CameraBasis::new(Vec3::new(0.0, 1.0, 0.1), Vec3::new(1.0, 0.2, 0.0)).unwrap();
        assert!(basis.forward.dot(basis.right).abs() < 1e-5);
        assert!(basis.forward.dot(basis.up).abs() < 1e-5);
        assert!(basis.right.dot(basis.up).abs() < 1e-5);
        assert!((basis.right.length() - 1.0).abs() < 1e-5);

        let v = Vec3::new(0.3, -0.2, 0.9);
        assert!(basis.gyro_to_cam(basis.cam_to_gyro(v)).abs_diff_eq(v, 1e-5));
    }

    #[test]
    fn default_basis_matches_constructed() {
        let built = CameraBasis::new(Vec3::Z, Vec3::X).unwrap();
        let default = CameraBasis::default();
        assert!(built.up.abs_diff_eq(default.up, 1e-6));
        assert!(built.right.abs_diff_eq(default.right, 1e-6));
    }

    #[test]
    fn parallel_axes_are_rejected() {
        assert!(matches!(
            CameraBasis::new(Vec3::X, Vec3::X * 2.0),
            Err(TrackerError::DegenerateBasis)
        ));
        assert!(CameraBasis::new(Vec3::ZERO, Vec3::X).is_err());
    }

    #[test]
    fn zero_rotation_leaves_point_unchanged() {
        let cam = camera();
        let basis = CameraBasis::default();
        let r = Mat3::from_rotation_y(0.4);
        let p = Vec2::new(100.0, 300.0);
        let out = reproject(&cam, p, r, &basis, r, &basis).unwrap();
        assert!(out.abs_diff_eq(p, 1e-3));
    }

    #[test]
    fn singular_previous_rotation_is_rejected() {
        let basis = CameraBasis::default();
        let out = reproject(&camera(), Vec2::ZERO, Mat3::ZERO, &basis, Mat3::IDENTITY, &basis);
        assert!(matches!(out, Err(TrackerError::DegenerateRotation)));
    }

    #[test]
    fn composed_rotation_matches_two_steps() {
        let cam = camera();
        let basis = CameraBasis::new(Vec3::new(0.0, 0.0, 1.0), Vec3::new(1.0, 0.1, 0.0)).unwrap();
        let r0 = Mat3::from_rotation_x(0.1);
        let a = Mat3::from_rotation_y(0.15);
        let b = Mat3::from_rotation_x(-0.1) * Mat3::from_rotation_z(0.3);
        let p = Vec2::new(250.0, 200.0);

        let step = reproject(&cam, p, r0, &basis, a * r0, &basis).unwrap();
        let two_steps = reproject(&cam, step, a * r0, &basis, b * a * r0, &basis).unwrap();
        let direct = reproject(&cam, p, r0, &basis, b * a * r0, &basis).unwrap();
        assert!(two_steps.abs_diff_eq(direct, 1e-2), "{two_steps} vs {direct}");
    }

    #[test]
    fn roll_about_optical_axis_keeps_center() {
        let cam = camera();
        let basis = CameraBasis::default();
        let center = Vec2::new(320.0, 240.0);
        let roll = Mat3::from_axis_angle(basis.forward, 0.8);
        let out = reproject(&cam, center, Mat3::IDENTITY, &basis, roll, &basis).unwrap();
        assert!(out.abs_diff_eq(center, 1e-3));

        // Off-center points move.
        let off = Vec2::new(400.0, 240.0);
        let moved = reproject(&cam, off, Mat3::IDENTITY, &basis, roll, &basis).unwrap();
        assert!(moved.distance(off) > 1.0);
    }
}

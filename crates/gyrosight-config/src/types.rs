use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Orientation sensor configuration.
    pub sensor: SensorConfig,
    /// Camera geometry and capture settings.
    pub camera: CameraConfig,
    /// Target to track from startup. `None` means not tracking.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub point_of_interest: Option<PointOfInterestConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorBackend {
    /// WitMotion WT61PC on a serial device (reports absolute angles).
    Wt61pc,
    /// Synthetic raw IMU.
    Simulated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    pub backend: SensorBackend,
    /// Serial device the WT61PC is attached to.
    pub device_path: String,
    /// Maximum angular rate the sensor is configured for (deg/s).
    pub max_degrees_per_second: u32,
    /// Madgwick filter beta parameter. Higher = more responsive, less smooth.
    pub madgwick_beta: f32,
    /// Calibration precision of the simulated IMU (deg/s); `None` keeps its default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calibration_precision: Option<f32>,
    /// Give up calibration after this many 50-sample windows.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calibration_max_windows: Option<u32>,
    /// Sample rate of the simulated IMU (Hz).
    pub simulated_sample_rate_hz: f32,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            backend: SensorBackend::Wt61pc,
            device_path: "/dev/ttyUSB0".into(),
            max_degrees_per_second: 1000,
            madgwick_beta: 0.1,
            calibration_precision: None,
            calibration_max_windows: None,
            simulated_sample_rate_hz: 500.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub width: u32,
    pub height: u32,
    pub horizontal_fov_deg: f32,
    /// Optical axis in the sensor's frame.
    #[serde(with = "vec3_serde")]
    pub forward: Vec3,
    /// Horizontal image axis in the sensor's frame.
    #[serde(with = "vec3_serde")]
    pub right: Vec3,
    /// How far video lags the IMU, in milliseconds.
    pub video_latency_ms: u64,
    /// Frame rate of the test-pattern source.
    pub capture_fps: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            horizontal_fov_deg: 90.0,
            forward: Vec3::Z,
            right: Vec3::X,
            video_latency_ms: 0,
            capture_fps: 30.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointOfInterestConfig {
    /// Pixel coordinates.
    #[serde(with = "vec2_serde")]
    pub position: Vec2,
    /// Marker radius in pixels.
    pub radius: f32,
}

// Serde helpers for glam types (which implement Serialize but we want
// a cleaner TOML representation as arrays).

mod vec3_serde {
    use glam::Vec3;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(v: &Vec3, s: S) -> Result<S::Ok, S::Error> {
        [v.x, v.y, v.z].serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec3, D::Error> {
        let [x, y, z] = <[f32; 3]>::deserialize(d)?;
        Ok(Vec3::new(x, y, z))
    }
}

mod vec2_serde {
    use glam::Vec2;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(v: &Vec2, s: S) -> Result<S::Ok, S::Error> {
        [v.x, v.y].serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec2, D::Error> {
        let [x, y] = <[f32; 2]>::deserialize(d)?;
        Ok(Vec2::new(x, y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = AppConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        assert!(!text.contains("point_of_interest"));
        let parsed: AppConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let text = r#"
            [sensor]
            backend = "simulated"
            calibration_max_windows = 20

            [camera]
            forward = [1.0, 0.0, 0.0]

            [point_of_interest]
            position = [320.0, 200.0]
            radius = 12.0
        "#;
        let config: AppConfig = toml::from_str(text).unwrap();
        assert_eq!(config.sensor.backend, SensorBackend::Simulated);
        assert_eq!(config.sensor.calibration_max_windows, Some(20));
        assert_eq!(config.sensor.max_degrees_per_second, 1000);
        assert_eq!(config.camera.forward, Vec3::X);
        assert_eq!(config.camera.right, Vec3::X);
        assert_eq!(config.camera.width, 640);
        assert_eq!(
            config.point_of_interest,
            Some(PointOfInterestConfig {
                position: Vec2::new(320.0, 200.0),
                radius: 12.0,
            })
        );
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let text = "[sensor]\nbackend = \"bno055\"\n";
        assert!(toml::from_str::<AppConfig>(text).is_err());
    }
}

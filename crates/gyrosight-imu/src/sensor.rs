use crate::protocol::ProtocolError;
use crate::types::SensorReading;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SensorError {
    #[error("sensor I/O failed")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("sensor unavailable: {0}")]
    Unavailable(String),
    #[error("sensor stream closed")]
    Closed,
}

/// Capability interface every sensor backend implements.
///
/// Angular rates are in degrees/second, accelerations in m/s^2 and Euler
/// angles in degrees.
pub trait SensorSource: Send {
    /// Bring the device up, configured for at most `max_degrees_per_second`.
    fn start_sensor(&mut self, max_degrees_per_second: u32) -> Result<(), SensorError>;

    /// Read one sample. `Ok(None)` means nothing is ready yet.
    fn collect(&mut self) -> Result<Option<SensorReading>, SensorError>;

    /// Calibration precision the backend needs (deg/s). Zero disables calibration.
    fn required_calibration_precision(&self) -> f32 {
        1.0
    }
}

impl<S: SensorSource + ?Sized> SensorSource for Box<S> {
    fn start_sensor(&mut self, max_degrees_per_second: u32) -> Result<(), SensorError> {
        (**self).start_sensor(max_degrees_per_second)
    }

    fn collect(&mut self) -> Result<Option<SensorReading>, SensorError> {
        (**self).collect()
    }

    fn required_calibration_precision(&self) -> f32 {
        (**self).required_calibration_precision()
    }
}

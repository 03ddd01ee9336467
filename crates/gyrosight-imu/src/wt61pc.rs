use crate::protocol::{Packet, ProtocolParser};
use crate::sensor::{SensorError, SensorSource};
use crate::types::SensorReading;
use glam::Vec3;
use std::io::Read;
use tracing::{info, trace, warn};

/// Gyro range the WT61PC always runs at.
const DEVICE_RANGE_DPS: u32 = 2000;

/// WT61PC six-axis module on a serial stream.
///
/// The module runs its own fusion and reports Euler angles, so readings are
/// [`SensorReading::Absolute`] and calibration is not needed.
pub struct Wt61pcSensor<R> {
    port: R,
    parser: ProtocolParser,
    accel: Option<Vec3>,
    gyro: Option<Vec3>,
    buf: [u8; 64],
}

impl<R: Read + Send> Wt61pcSensor<R> {
    pub fn new(port: R) -> Self {
        Self {
            port,
            parser: ProtocolParser::new(),
            accel: None,
            gyro: None,
            buf: [0u8; 64],
        }
    }

    /// Drain decoded packets; yields a reading on each angle packet once
    /// acceleration and rate have been seen.
    fn drain(&mut self) -> Option<SensorReading> {
        while let Some(result) = self.parser.next_packet() {
            match result {
                Ok(Packet::Accel(a)) => self.accel = Some(a),
                Ok(Packet::Gyro(g)) => self.gyro = Some(g),
                Ok(Packet::Angle(euler)) => {
                    if let (Some(accel), Some(gyro)) = (self.accel, self.gyro) {
                        return Some(SensorReading::Absolute { accel, gyro, euler });
                    }
                }
                Err(e) => trace!(?e, "Skipping bad WT61PC packet"),
            }
        }
        None
    }
}

impl<R: Read + Send> SensorSource for Wt61pcSensor<R> {
    fn start_sensor(&mut self, max_degrees_per_second: u32) -> Result<(), SensorError> {
        if max_degrees_per_second > DEVICE_RANGE_DPS {
            warn!(
                requested = max_degrees_per_second,
                range = DEVICE_RANGE_DPS,
                "WT61PC gyro range is fixed"
            );
        }
        info!("WT61PC sensor started");
        Ok(())
    }

    fn collect(&mut self) -> Result<Option<SensorReading>, SensorError> {
        if let Some(reading) = self.drain() {
            return Ok(Some(reading));
        }
        let n = self.port.read(&mut self.buf)?;
        if n == 0 {
            return Err(SensorError::Closed);
        }
        self.parser.push_data(&self.buf[..n]);
        Ok(self.drain())
    }

    fn required_calibration_precision(&self) -> f32 {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::tests::make_test_packet;
    use std::io::Cursor;

    fn stream(euler: [f32; 3]) -> Vec<u8> {
        let mut bytes = make_test_packet(0x51, [0.0, 0.0, 9.81], 16.0 * 9.81);
        bytes.extend(make_test_packet(0x52, [0.0, 0.0, 10.0], 2000.0));
        bytes.extend(make_test_packet(0x53, euler, 180.0));
        bytes
    }

    #[test]
    fn emits_absolute_reading_after_full_triple() {
        let mut sensor = Wt61pcSensor::new(Cursor::new(stream([30.0, 0.0, -60.0])));
        sensor.start_sensor(1000).unwrap();

        let reading = loop {
            if let Some(reading) = sensor.collect().unwrap() {
                break reading;
            }
        };
        match reading {
            SensorReading::Absolute { accel, gyro, euler } => {
                assert!(accel.abs_diff_eq(Vec3::new(0.0, 0.0, 9.81), 0.01));
                assert!(gyro.abs_diff_eq(Vec3::new(0.0, 0.0, 10.0), 0.1));
                assert!(euler.abs_diff_eq(Vec3::new(30.0, 0.0, -60.0), 0.01));
            }
            other => panic!("unexpected reading {other:?}"),
        }
    }

    #[test]
    fn angle_without_rates_is_held_back() {
        let bytes = make_test_packet(0x53, [10.0, 0.0, 0.0], 180.0);
        let mut sensor = Wt61pcSensor::new(Cursor::new(bytes));
        assert!(sensor.collect().unwrap().is_none());
        assert!(matches!(sensor.collect(), Err(SensorError::Closed)));
    }

    #[test]
    fn calibration_is_disabled() {
        let sensor = Wt61pcSensor::new(Cursor::new(Vec::new()));
        assert_eq!(sensor.required_calibration_precision(), 0.0);
    }
}

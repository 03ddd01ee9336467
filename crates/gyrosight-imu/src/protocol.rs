use glam::Vec3;
use std::collections::VecDeque;
use thiserror::Error;

/// First byte of every WT61PC packet.
const HEADER: u8 = 0x55;
/// Header + type + 4 x i16 + checksum.
const PACKET_LEN: usize = 11;

const TYPE_ACCEL: u8 = 0x51;
const TYPE_GYRO: u8 = 0x52;
const TYPE_ANGLE: u8 = 0x53;

/// Full-scale ranges of the device.
const ACCEL_RANGE_G: f32 = 16.0;
const GYRO_RANGE_DPS: f32 = 2000.0;
const ANGLE_RANGE_DEG: f32 = 180.0;
const STANDARD_GRAVITY: f32 = 9.81;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Checksum mismatch (expected {expected:#04x}, got {actual:#04x})")]
    ChecksumMismatch { expected: u8, actual: u8 },
    #[error("Unsupported packet type {0:#04x}")]
    UnsupportedPacket(u8),
}

/// One decoded WT61PC packet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Packet {
    /// Acceleration (m/s^2).
    Accel(Vec3),
    /// Angular rate (deg/s).
    Gyro(Vec3),
    /// Euler angles (degrees).
    Angle(Vec3),
}

/// Streaming parser for the WT61PC serial protocol.
///
/// Feed raw serial bytes via `push_data`, then drain packets via `next_packet`.
pub struct ProtocolParser {
    buffer: VecDeque<u8>,
}

impl ProtocolParser {
    pub fn new() -> Self {
        Self {
            buffer: VecDeque::with_capacity(256),
        }
    }

    /// Append received bytes to the internal buffer.
    pub fn push_data(&mut self, data: &[u8]) {
        self.buffer.extend(data);
    }

    /// Try to extract the next complete packet from the buffer.
    /// Returns `None` if no complete packet is available yet.
    pub fn next_packet(&mut self) -> Option<Result<Packet, ProtocolError>> {
        // Resynchronize on the header byte.
        let header_pos = self.buffer.iter().position(|&b| b == HEADER);
        match header_pos {
            Some(pos) => {
                self.buffer.drain(..pos);
            }
            None => {
                self.buffer.clear();
                return None;
            }
        }

        if self.buffer.len() < PACKET_LEN {
            return None;
        }

        let mut packet = [0u8; PACKET_LEN];
        for (dst, src) in packet.iter_mut().zip(self.buffer.iter()) {
            *dst = *src;
        }

        let expected = packet[..PACKET_LEN - 1]
            .iter()
            .fold(0u8, |acc, &b| acc.wrapping_add(b));
        let actual = packet[PACKET_LEN - 1];
        if expected != actual {
            // Probably a 0x55 inside payload data; drop it and rescan.
            self.buffer.pop_front();
            return Some(Err(ProtocolError::ChecksumMismatch { expected, actual }));
        }

        self.buffer.drain(..PACKET_LEN);
        Some(parse_packet(&packet))
    }
}

impl Default for ProtocolParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode a checksummed packet.
fn parse_packet(packet: &[u8; PACKET_LEN]) -> Result<Packet, ProtocolError> {
    let raw = |offset: usize| -> f32 {
        i16::from_le_bytes([packet[2 + offset * 2], packet[3 + offset * 2]]) as f32 / 32768.0
    };
    let scaled = |range: f32| Vec3::new(raw(0) * range, raw(1) * range, raw(2) * range);

    match packet[1] {
        TYPE_ACCEL => Ok(Packet::Accel(scaled(ACCEL_RANGE_G * STANDARD_GRAVITY))),
        TYPE_GYRO => Ok(Packet::Gyro(scaled(GYRO_RANGE_DPS))),
        TYPE_ANGLE => Ok(Packet::Angle(scaled(ANGLE_RANGE_DEG))),
        other => Err(ProtocolError::UnsupportedPacket(other)),
    }
}

// Typed replies
//
// The engine returns raw link frames. Decoders strip the 5-byte link header and
// read payload-relative offsets: every reply payload is [Opcode, Length, Data...],
// so data starts at payload offset 2 (frame offset 7).

use super::error::{LinkbotError, Result};
use super::frame::Opcode;
use super::inbox::ReceivedFrame;

/// Offset of the first data byte inside a reply payload
pub const REPLY_DATA_OFFSET: usize = 2;

/// A reply record decoded from a fixed layout
pub trait Reply: Sized {
    /// Opcode of the query this reply answers
    const OPCODE: Opcode;

    /// Number of data bytes the layout reads
    const DATA_LEN: usize;

    /// Decode from the data bytes; `data.len() >= DATA_LEN` is guaranteed
    fn from_data(data: &[u8]) -> Self;

    fn decode(frame: &ReceivedFrame) -> Result<Self> {
        let payload = frame.payload();
        let data = payload
            .get(REPLY_DATA_OFFSET..REPLY_DATA_OFFSET + Self::DATA_LEN)
            .ok_or(LinkbotError::ShortReply {
                opcode: Self::OPCODE,
                len: frame.len(),
            })?;
        Ok(Self::from_data(data))
    }
}

fn f32_at(data: &[u8], offset: usize) -> f32 {
    f32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

fn three_floats(data: &[u8]) -> [f32; 3] {
    [f32_at(data, 0), f32_at(data, 4), f32_at(data, 8)]
}

/// Absolute joint angles in radians
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointAngles(pub [f32; 3]);

impl Reply for JointAngles {
    const OPCODE: Opcode = Opcode::GetMotorAnglesAbs;
    const DATA_LEN: usize = 12;

    fn from_data(data: &[u8]) -> Self {
        Self(three_floats(data))
    }
}

/// Accelerometer reading, one value per axis
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Acceleration {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Reply for Acceleration {
    const OPCODE: Opcode = Opcode::GetAccel;
    const DATA_LEN: usize = 12;

    fn from_data(data: &[u8]) -> Self {
        let [x, y, z] = three_floats(data);
        Self { x, y, z }
    }
}

/// Battery voltage in volts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatteryVoltage(pub f32);

impl Reply for BatteryVoltage {
    const OPCODE: Opcode = Opcode::GetBatteryVoltage;
    const DATA_LEN: usize = 4;

    fn from_data(data: &[u8]) -> Self {
        Self(f32_at(data, 0))
    }
}

/// Motion flag: non-zero while any joint is still moving
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionFlag(pub u8);

impl MotionFlag {
    pub fn is_moving(self) -> bool {
        self.0 != 0
    }
}

impl Reply for MotionFlag {
    const OPCODE: Opcode = Opcode::IsMoving;
    const DATA_LEN: usize = 1;

    fn from_data(data: &[u8]) -> Self {
        Self(data[0])
    }
}

// Linkbot command payloads and link-layer envelope
//
// Payload format: [Opcode, Length, Args..., 0x00]
// Envelope format: [Opcode, Length+6, AddrHi, AddrLo, Hop, Payload..., 0x00]

use super::error::{LinkbotError, Result};

/// Command payload capacity on the module side
pub const PAYLOAD_CAPACITY: usize = 64;

/// Link-layer envelope capacity
pub const ENVELOPE_CAPACITY: usize = 256;

/// Opcode, length, address (2), hop
pub const ENVELOPE_HEADER_LEN: usize = 5;

/// Header plus trailing terminator
pub const ENVELOPE_OVERHEAD: usize = ENVELOPE_HEADER_LEN + 1;

/// Routing byte for a single hop through the gateway
const HOP: u8 = 1;

const TERMINATOR: u8 = 0x00;

/// Length byte of a command with no arguments
const SIMPLE_LENGTH: u8 = 3;

/// LED commands address every LED channel
const LED_ALL: u8 = 0xFF;

/// Joint mask selecting all three motors
pub const ALL_JOINTS_MASK: u8 = 0x07;

/// Command set understood by the module firmware
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Status = 0x31,
    SetMotorDirection = 0x32,
    SetMotorSpeed = 0x34,
    SetMotorAnglesAbs = 0x37,
    SetMotorAnglesPid = 0x39,
    GetMotorAnglesAbs = 0x3B,
    SetMotorAngleAbs = 0x3F,
    SetMotorAnglePid = 0x41,
    Stop = 0x4D,
    ResetAbsCounter = 0x51,
    GetAccel = 0x62,
    GetBatteryVoltage = 0x63,
    RgbLed = 0x64,
    SetMotorStates = 0x65,
    IsMoving = 0x66,
    SetMotorPower = 0x67,
}

/// One application-level command, built field by field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPayload {
    bytes: Vec<u8>,
}

impl CommandPayload {
    /// Start a parameterized command: opcode followed by the reserved length byte
    pub fn parameterized(opcode: Opcode) -> Self {
        let mut bytes = Vec::with_capacity(PAYLOAD_CAPACITY);
        bytes.push(opcode as u8);
        bytes.push(0x00);
        Self { bytes }
    }

    /// A status query with no arguments
    pub fn simple(opcode: Opcode) -> Self {
        let mut bytes = Vec::with_capacity(PAYLOAD_CAPACITY);
        bytes.extend_from_slice(&[opcode as u8, SIMPLE_LENGTH, TERMINATOR]);
        Self { bytes }
    }

    pub fn push_u8(&mut self, byte: u8) -> Result<&mut Self> {
        self.extend(&[byte])
    }

    /// Raw 4-byte float image, little-endian as the module firmware stores it
    pub fn push_f32(&mut self, value: f32) -> Result<&mut Self> {
        self.extend(&value.to_le_bytes())
    }

    /// Signed 16-bit value, high byte first
    pub fn push_i16_be(&mut self, value: i16) -> Result<&mut Self> {
        self.extend(&value.to_be_bytes())
    }

    /// Append the trailing terminator
    pub fn terminate(&mut self) -> Result<&mut Self> {
        self.push_u8(TERMINATOR)
    }

    fn extend(&mut self, data: &[u8]) -> Result<&mut Self> {
        if self.bytes.len() + data.len() > PAYLOAD_CAPACITY {
            return Err(LinkbotError::PayloadOverflow {
                capacity: PAYLOAD_CAPACITY,
            });
        }
        self.bytes.extend_from_slice(data);
        Ok(self)
    }

    pub fn opcode(&self) -> u8 {
        self.bytes[0]
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    // === Payload families ===

    /// Joint index plus one float: absolute angle, PID angle or speed
    /// [op, 0x00, joint, value_f32, 0x00]
    pub fn single_joint(opcode: Opcode, joint: u8, value: f32) -> Result<Self> {
        let mut payload = Self::parameterized(opcode);
        payload.push_u8(joint)?.push_f32(value)?.terminate()?;
        Ok(payload)
    }

    /// Three joint angles; the firmware expects a fourth slot and reads the third again
    /// [op, 0x00, a1, a2, a3, a3, 0x00]
    pub fn joint_angles(opcode: Opcode, angles: [f32; 3]) -> Result<Self> {
        let mut payload = Self::parameterized(opcode);
        for angle in angles {
            payload.push_f32(angle)?;
        }
        payload.push_f32(angles[2])?.terminate()?;
        Ok(payload)
    }

    /// Direction of a single joint
    /// [op, 0x00, joint, state, 0x00]
    pub fn joint_direction(joint: u8, state: u8) -> Result<Self> {
        let mut payload = Self::parameterized(Opcode::SetMotorDirection);
        payload.push_u8(joint)?.push_u8(state)?.terminate()?;
        Ok(payload)
    }

    /// States and speeds of all joints; the fourth speed slot repeats the first
    /// [op, 0x00, s1, s2, s3, 0x00, v1, v2, v3, v1, 0x00]
    pub fn joint_states(states: [u8; 3], speeds: [f32; 3]) -> Result<Self> {
        let mut payload = Self::parameterized(Opcode::SetMotorStates);
        for state in states {
            payload.push_u8(state)?;
        }
        payload.push_u8(0x00)?;
        for speed in speeds {
            payload.push_f32(speed)?;
        }
        payload.push_f32(speeds[0])?.terminate()?;
        Ok(payload)
    }

    /// [op, 0xff, 0xff, 0xff, r, g, b, 0x00]
    pub fn rgb_led(r: u8, g: u8, b: u8) -> Result<Self> {
        let mut payload = Self::parameterized(Opcode::RgbLed);
        // the reserved byte doubles as the first channel selector
        payload.bytes[1] = LED_ALL;
        payload.push_u8(LED_ALL)?.push_u8(LED_ALL)?;
        payload.push_u8(r)?.push_u8(g)?.push_u8(b)?.terminate()?;
        Ok(payload)
    }

    /// Raw motor power for the joints selected by `mask`
    /// [op, 0x00, mask, (hi, lo) x3, 0x00]
    pub fn motor_power(mask: u8, powers: [i16; 3]) -> Result<Self> {
        let mut payload = Self::parameterized(Opcode::SetMotorPower);
        payload.push_u8(mask)?;
        for power in powers {
            payload.push_i16_be(power)?;
        }
        payload.terminate()?;
        Ok(payload)
    }
}

/// Link-layer envelope routing one payload to a peer module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    bytes: Vec<u8>,
}

impl Envelope {
    /// Wrap a payload for `peer`. The payload's length byte is patched to its final size.
    pub fn wrap(peer: u16, payload: &CommandPayload) -> Result<Self> {
        let total = payload.len() + ENVELOPE_OVERHEAD;
        if total > ENVELOPE_CAPACITY {
            return Err(LinkbotError::PayloadOverflow {
                capacity: ENVELOPE_CAPACITY - ENVELOPE_OVERHEAD,
            });
        }

        let [addr_hi, addr_lo] = peer.to_be_bytes();
        let mut bytes = Vec::with_capacity(total);
        bytes.extend_from_slice(&[payload.opcode(), total as u8, addr_hi, addr_lo, HOP]);
        bytes.extend_from_slice(payload.as_bytes());
        bytes[ENVELOPE_HEADER_LEN + 1] = payload.len() as u8;
        bytes.push(TERMINATOR);

        Ok(Self { bytes })
    }

    pub fn total_length(&self) -> u8 {
        self.bytes[1]
    }

    pub fn destination(&self) -> u16 {
        u16::from_be_bytes([self.bytes[2], self.bytes[3]])
    }

    /// The wrapped payload, with its length byte as transmitted
    pub fn payload(&self) -> &[u8] {
        &self.bytes[ENVELOPE_HEADER_LEN..self.bytes.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

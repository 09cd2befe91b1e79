// Message types for the command bridge

use serde::{Deserialize, Serialize};

use crate::linkbot::JointState;

// Command from teleop/scripts -> runtime
// Angles in degrees, speeds in deg/s. `wait` selects the blocking form of a motion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RobotCommand {
    CheckStatus,
    MoveJointTo { joint: u8, angle: f32, #[serde(default)] wait: bool },
    MoveTo { angles: [f32; 3], #[serde(default)] wait: bool },
    MoveJoint { joint: u8, delta: f32, #[serde(default)] wait: bool },
    Move { deltas: [f32; 3], #[serde(default)] wait: bool },
    DriveJointTo { joint: u8, angle: f32, #[serde(default)] wait: bool },
    DriveTo { angles: [f32; 3], #[serde(default)] wait: bool },
    SetJointSpeed { joint: u8, speed: f32 },
    SetJointSpeeds { speeds: [f32; 3] },
    SetJointState { joint: u8, state: JointState },
    SetJointStates { states: [JointState; 3], speeds: [f32; 3] },
    SetLedColor { r: u8, g: u8, b: u8 },
    SetMotorPower { joint: u8, power: i16 },
    SetMotorPowers { powers: [i16; 3] },
    Stop,
    Reset,
    ResetToZero,
    GetJointAngles,
    GetAccelerometer,
    GetBatteryVoltage,
}

impl RobotCommand {
    /// Commands that keep the motors running until told otherwise; the watchdog
    /// stops the module if these are not refreshed
    pub fn is_sustained(&self) -> bool {
        match self {
            RobotCommand::SetMotorPower { power, .. } => *power != 0,
            RobotCommand::SetMotorPowers { powers } => powers.iter().any(|&p| p != 0),
            RobotCommand::SetJointState { state, .. } => *state != JointState::Neutral,
            RobotCommand::SetJointStates { states, .. } => {
                states.iter().any(|&s| s != JointState::Neutral)
            }
            _ => false,
        }
    }

    /// Short name used in outcomes and logs
    pub fn name(&self) -> &'static str {
        match self {
            RobotCommand::CheckStatus => "check_status",
            RobotCommand::MoveJointTo { .. } => "move_joint_to",
            RobotCommand::MoveTo { .. } => "move_to",
            RobotCommand::MoveJoint { .. } => "move_joint",
            RobotCommand::Move { .. } => "move",
            RobotCommand::DriveJointTo { .. } => "drive_joint_to",
            RobotCommand::DriveTo { .. } => "drive_to",
            RobotCommand::SetJointSpeed { .. } => "set_joint_speed",
            RobotCommand::SetJointSpeeds { .. } => "set_joint_speeds",
            RobotCommand::SetJointState { .. } => "set_joint_state",
            RobotCommand::SetJointStates { .. } => "set_joint_states",
            RobotCommand::SetLedColor { .. } => "set_led_color",
            RobotCommand::SetMotorPower { .. } => "set_motor_power",
            RobotCommand::SetMotorPowers { .. } => "set_motor_powers",
            RobotCommand::Stop => "stop",
            RobotCommand::Reset => "reset",
            RobotCommand::ResetToZero => "reset_to_zero",
            RobotCommand::GetJointAngles => "get_joint_angles",
            RobotCommand::GetAccelerometer => "get_accelerometer",
            RobotCommand::GetBatteryVoltage => "get_battery_voltage",
        }
    }
}

/// Sensor data returned by query commands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reading {
    JointAngles([f32; 3]),
    Accelerometer([f32; 3]),
    BatteryVoltage(f32),
}

/// Result of one command, published by the runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandOutcome {
    pub command: String,
    /// 0 on success, -1 on failure
    pub status: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reading: Option<Reading>,
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
    Unreachable,
}

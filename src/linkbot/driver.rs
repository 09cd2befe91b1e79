// High-level driver for one Linkbot module
//
// Every motion command has a non-blocking `_nb` form (one transaction) and a
// blocking form that additionally waits for the module to report it stopped.
// Angles are degrees on this API and radians on the wire.

use serde::{Deserialize, Serialize};
use std::thread;
use tracing::{debug, info, warn};

use super::engine::TransactionEngine;
use super::error::{LinkbotError, Result};
use super::frame::{CommandPayload, Opcode, ALL_JOINTS_MASK};
use super::inbox::ReceivedFrame;
use super::reply::{Acceleration, BatteryVoltage, JointAngles, MotionFlag, Reply};
use super::transport::BusTransport;
use super::units::{deg_to_rad, rad_to_deg};

/// Joint selector
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Joint {
    One = 1,
    Two = 2,
    Three = 3,
}

impl Joint {
    pub const ALL: [Joint; 3] = [Joint::One, Joint::Two, Joint::Three];

    /// Zero-based position in three-joint arrays
    pub fn index(self) -> usize {
        self as usize - 1
    }
}

impl TryFrom<u8> for Joint {
    type Error = LinkbotError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Joint::One),
            2 => Ok(Joint::Two),
            3 => Ok(Joint::Three),
            other => Err(LinkbotError::InvalidJoint(other)),
        }
    }
}

/// Logical joint state
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JointState {
    Neutral = 0,
    Forward = 1,
    Backward = 2,
    Hold = 3,
    Positive = 4,
    Negative = 5,
    Accel = 6,
}

/// Physical configuration of a module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormFactor {
    Null,
    Original,
    I,
    L,
    T,
}

/// Outcome of one motion status query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveStatus {
    Moving,
    Stopped,
    /// The status query itself failed
    Unreachable,
}

/// Driver for the module at one peer address
pub struct Linkbot<T: BusTransport> {
    engine: TransactionEngine<T>,
    address: u16,
}

impl<T: BusTransport> Linkbot<T> {
    /// Create a driver for the module at `address` (0 = the locally attached module)
    pub fn new(engine: TransactionEngine<T>, address: u16) -> Self {
        info!("Linkbot driver for module 0x{:04X}", address);
        Self { engine, address }
    }

    pub fn address(&self) -> u16 {
        self.address
    }

    fn transact(&self, payload: &CommandPayload) -> Result<ReceivedFrame> {
        self.engine.transact(self.address, payload)
    }

    fn query<R: Reply>(&self) -> Result<R> {
        let frame = self.transact(&CommandPayload::simple(R::OPCODE))?;
        R::decode(&frame)
    }

    /// Ping the module
    pub fn check_status(&self) -> Result<()> {
        self.transact(&CommandPayload::simple(Opcode::Status))?;
        Ok(())
    }

    // === Absolute moves ===

    pub fn move_joint_to(&self, joint: Joint, angle: f32) -> Result<()> {
        self.move_joint_to_nb(joint, angle)?;
        self.move_wait()
    }

    pub fn move_joint_to_nb(&self, joint: Joint, angle: f32) -> Result<()> {
        let payload =
            CommandPayload::single_joint(Opcode::SetMotorAngleAbs, joint as u8, deg_to_rad(angle))?;
        self.transact(&payload)?;
        Ok(())
    }

    pub fn move_to(&self, angle1: f32, angle2: f32, angle3: f32) -> Result<()> {
        self.move_to_nb(angle1, angle2, angle3)?;
        self.move_wait()
    }

    pub fn move_to_nb(&self, angle1: f32, angle2: f32, angle3: f32) -> Result<()> {
        let angles = [angle1, angle2, angle3].map(deg_to_rad);
        let payload = CommandPayload::joint_angles(Opcode::SetMotorAnglesAbs, angles)?;
        self.transact(&payload)?;
        Ok(())
    }

    // === Relative moves: read the current angle, then move to angle + delta ===

    pub fn move_joint(&self, joint: Joint, delta: f32) -> Result<()> {
        self.move_joint_nb(joint, delta)?;
        self.move_wait()
    }

    pub fn move_joint_nb(&self, joint: Joint, delta: f32) -> Result<()> {
        let current = self.get_joint_angle(joint)?;
        self.move_joint_to_nb(joint, current + delta)
    }

    /// Relative move of all three joints
    pub fn move_by(&self, delta1: f32, delta2: f32, delta3: f32) -> Result<()> {
        self.move_by_nb(delta1, delta2, delta3)?;
        self.move_wait()
    }

    pub fn move_by_nb(&self, delta1: f32, delta2: f32, delta3: f32) -> Result<()> {
        let [a1, a2, a3] = self.get_joint_angles()?;
        self.move_to_nb(a1 + delta1, a2 + delta2, a3 + delta3)
    }

    // === Closed-loop drives ===

    pub fn drive_joint_to(&self, joint: Joint, angle: f32) -> Result<()> {
        self.drive_joint_to_nb(joint, angle)?;
        self.move_wait()
    }

    pub fn drive_joint_to_nb(&self, joint: Joint, angle: f32) -> Result<()> {
        let payload =
            CommandPayload::single_joint(Opcode::SetMotorAnglePid, joint as u8, deg_to_rad(angle))?;
        self.transact(&payload)?;
        Ok(())
    }

    pub fn drive_to(&self, angle1: f32, angle2: f32, angle3: f32) -> Result<()> {
        self.drive_to_nb(angle1, angle2, angle3)?;
        self.move_wait()
    }

    pub fn drive_to_nb(&self, angle1: f32, angle2: f32, angle3: f32) -> Result<()> {
        let angles = [angle1, angle2, angle3].map(deg_to_rad);
        let payload = CommandPayload::joint_angles(Opcode::SetMotorAnglesPid, angles)?;
        self.transact(&payload)?;
        Ok(())
    }

    // === Motion status ===

    /// Query the motion flag. A failed query is reported as `Unreachable`.
    pub fn is_moving(&self) -> MoveStatus {
        match self.query::<MotionFlag>() {
            Ok(flag) if flag.is_moving() => MoveStatus::Moving,
            Ok(_) => MoveStatus::Stopped,
            Err(e) => {
                debug!("Motion status query failed: {}", e);
                MoveStatus::Unreachable
            }
        }
    }

    /// Poll the motion flag until the module reports it stopped.
    ///
    /// Gives up with `LostContact` after `max_missed_polls` consecutive failed queries.
    pub fn move_wait(&self) -> Result<()> {
        let config = self.engine.config();
        let mut misses = 0;

        loop {
            match self.is_moving() {
                MoveStatus::Stopped => return Ok(()),
                MoveStatus::Moving => misses = 0,
                MoveStatus::Unreachable => {
                    misses += 1;
                    warn!(
                        "Module 0x{:04X} missed status poll {}/{}",
                        self.address, misses, config.max_missed_polls
                    );
                    if misses >= config.max_missed_polls {
                        return Err(LinkbotError::LostContact {
                            peer: self.address,
                            misses,
                        });
                    }
                }
            }
            thread::sleep(config.poll_interval);
        }
    }

    // === Sensors ===

    /// Current angle of one joint, in degrees
    pub fn get_joint_angle(&self, joint: Joint) -> Result<f32> {
        let angles = self.get_joint_angles()?;
        Ok(angles[joint.index()])
    }

    /// Current angles of all joints, in degrees
    pub fn get_joint_angles(&self) -> Result<[f32; 3]> {
        let JointAngles(radians) = self.query::<JointAngles>()?;
        let degrees = radians.map(rad_to_deg);
        debug!("Joint angles: {:?} rad = {:?} deg", radians, degrees);
        Ok(degrees)
    }

    pub fn get_accelerometer_data(&self) -> Result<Acceleration> {
        self.query()
    }

    pub fn get_battery_voltage(&self) -> Result<f32> {
        let BatteryVoltage(volts) = self.query::<BatteryVoltage>()?;
        Ok(volts)
    }

    /// The firmware has no LED readback
    pub fn get_color_rgb(&self) -> Result<(u8, u8, u8)> {
        Err(LinkbotError::Unsupported {
            operation: "get_color_rgb",
        })
    }

    /// The firmware does not report its form factor
    pub fn get_form_factor(&self) -> Result<FormFactor> {
        Err(LinkbotError::Unsupported {
            operation: "get_form_factor",
        })
    }

    // === Setters ===

    /// Joint speed in deg/s
    pub fn set_joint_speed(&self, joint: Joint, speed: f32) -> Result<()> {
        let payload =
            CommandPayload::single_joint(Opcode::SetMotorSpeed, joint as u8, deg_to_rad(speed))?;
        self.transact(&payload)?;
        Ok(())
    }

    /// One transaction per joint; stops at the first failure
    pub fn set_joint_speeds(&self, speed1: f32, speed2: f32, speed3: f32) -> Result<()> {
        for (joint, speed) in Joint::ALL.into_iter().zip([speed1, speed2, speed3]) {
            self.set_joint_speed(joint, speed)?;
        }
        Ok(())
    }

    pub fn set_joint_state(&self, joint: Joint, state: JointState) -> Result<()> {
        let payload = CommandPayload::joint_direction(joint as u8, state as u8)?;
        self.transact(&payload)?;
        Ok(())
    }

    /// States of all joints with their speeds (sent as-is)
    pub fn set_joint_states(&self, states: [JointState; 3], speeds: [f32; 3]) -> Result<()> {
        let payload = CommandPayload::joint_states(states.map(|s| s as u8), speeds)?;
        self.transact(&payload)?;
        Ok(())
    }

    pub fn set_led_color(&self, r: u8, g: u8, b: u8) -> Result<()> {
        self.transact(&CommandPayload::rgb_led(r, g, b)?)?;
        Ok(())
    }

    /// Raw power for one joint
    pub fn set_motor_power(&self, joint: Joint, power: i16) -> Result<()> {
        let mask = 1u8 << (joint as u8);
        self.transact(&CommandPayload::motor_power(mask, [power; 3])?)?;
        Ok(())
    }

    pub fn set_motor_powers(&self, power1: i16, power2: i16, power3: i16) -> Result<()> {
        let payload = CommandPayload::motor_power(ALL_JOINTS_MASK, [power1, power2, power3])?;
        self.transact(&payload)?;
        Ok(())
    }

    pub fn stop(&self) -> Result<()> {
        info!("Stopping module 0x{:04X}", self.address);
        self.transact(&CommandPayload::simple(Opcode::Stop))?;
        Ok(())
    }

    /// Reset the multi-turn angle counters
    pub fn reset(&self) -> Result<()> {
        self.transact(&CommandPayload::simple(Opcode::ResetAbsCounter))?;
        Ok(())
    }

    /// Reset the counters, then move every joint to zero and wait
    pub fn reset_to_zero(&self) -> Result<()> {
        self.reset()?;
        self.move_to(0.0, 0.0, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::linkbot::sim::{floats, SimLog, SimTransport};
    use std::f32::consts::FRAC_PI_2;
    use std::time::{Duration, Instant};

    fn robot() -> (Linkbot<SimTransport>, SimLog) {
        let (transport, log) = SimTransport::new();
        let engine = TransactionEngine::new(transport).unwrap();
        (Linkbot::new(engine, 0), log)
    }

    /// Short timeouts for tests that exercise failure paths
    fn fast_robot() -> (Linkbot<SimTransport>, SimLog) {
        let (transport, log) = SimTransport::new();
        let config = EngineConfig {
            reply_timeout: Duration::from_millis(30),
            poll_interval: Duration::from_millis(10),
            max_missed_polls: 3,
        };
        let engine = TransactionEngine::with_config(transport, config).unwrap();
        (Linkbot::new(engine, 0x0042), log)
    }

    #[test]
    fn test_joint_from_u8() {
        assert_eq!(Joint::try_from(2).unwrap(), Joint::Two);
        assert!(matches!(Joint::try_from(0), Err(LinkbotError::InvalidJoint(0))));
        assert!(matches!(Joint::try_from(4), Err(LinkbotError::InvalidJoint(4))));
    }

    #[test]
    fn test_move_joint_to_payload() {
        let (robot, log) = robot();
        log.reply(Opcode::SetMotorAngleAbs, &[]);

        robot.move_joint_to_nb(Joint::Two, 90.0).unwrap();

        log.with_sent(|sent| {
            let mut expected = vec![0x3F, 8, 0x02];
            expected.extend_from_slice(&FRAC_PI_2.to_le_bytes());
            expected.push(0x00);
            // length byte patched to the payload size on the wire
            assert_eq!(sent[0].payload(), expected.as_slice());
        });
    }

    #[test]
    fn test_blocking_move_polls_until_stopped() {
        let (robot, log) = robot();
        log.reply(Opcode::SetMotorAnglesAbs, &[]);
        log.reply(Opcode::IsMoving, &[1]);
        log.reply(Opcode::IsMoving, &[1]);
        log.reply(Opcode::IsMoving, &[0]);

        robot.move_to(10.0, 20.0, 30.0).unwrap();

        let moving = Opcode::IsMoving as u8;
        assert_eq!(
            log.sent_opcodes(),
            vec![Opcode::SetMotorAnglesAbs as u8, moving, moving, moving]
        );
        log.with_sent(|sent| {
            for pair in sent[1..].windows(2) {
                let gap = pair[1].at.duration_since(pair[0].at);
                assert!(gap >= Duration::from_millis(100), "polled too fast: {:?}", gap);
            }
        });
    }

    #[test]
    fn test_blocking_move_timeout_skips_polling() {
        let (robot, log) = fast_robot();
        log.silent();

        let result = robot.drive_to(1.0, 2.0, 3.0);

        assert!(matches!(result, Err(LinkbotError::Timeout { peer: 0x0042 })));
        assert_eq!(log.sent_opcodes(), vec![Opcode::SetMotorAnglesPid as u8]);
    }

    #[test]
    fn test_move_wait_gives_up_after_missed_polls() {
        let (robot, log) = fast_robot();
        log.reply(Opcode::IsMoving, &[1]);
        // a single miss between answers does not count against the module
        log.silent();
        log.reply(Opcode::IsMoving, &[1]);
        for _ in 0..3 {
            log.silent();
        }

        let result = robot.move_wait();

        assert!(matches!(
            result,
            Err(LinkbotError::LostContact { peer: 0x0042, misses: 3 })
        ));
        assert_eq!(log.sent_opcodes().len(), 6);
    }

    #[test]
    fn test_is_moving_outcomes() {
        let (robot, log) = fast_robot();
        log.reply(Opcode::IsMoving, &[1]);
        log.reply(Opcode::IsMoving, &[0]);
        log.silent();

        assert_eq!(robot.is_moving(), MoveStatus::Moving);
        assert_eq!(robot.is_moving(), MoveStatus::Stopped);
        assert_eq!(robot.is_moving(), MoveStatus::Unreachable);
    }

    #[test]
    fn test_relative_move_adds_current_angle() {
        let (robot, log) = robot();
        log.reply(Opcode::GetMotorAnglesAbs, &floats(&[0.0, FRAC_PI_2, 0.0]));
        log.reply(Opcode::SetMotorAngleAbs, &[]);

        robot.move_joint_nb(Joint::Two, 90.0).unwrap();

        log.with_sent(|sent| {
            assert_eq!(sent.len(), 2);
            let payload = sent[1].payload();
            assert_eq!(payload[2], 2);
            let radians = f32::from_le_bytes([payload[3], payload[4], payload[5], payload[6]]);
            assert!((radians - std::f32::consts::PI).abs() < 1e-5);
        });
    }

    #[test]
    fn test_move_by_adds_current_angles() {
        let (robot, log) = robot();
        log.reply(Opcode::GetMotorAnglesAbs, &floats(&[FRAC_PI_2, 0.0, -FRAC_PI_2]));
        log.reply(Opcode::SetMotorAnglesAbs, &[]);
        log.reply(Opcode::IsMoving, &[0]);

        robot.move_by(90.0, 45.0, 90.0).unwrap();

        assert_eq!(
            log.sent_opcodes(),
            vec![
                Opcode::GetMotorAnglesAbs as u8,
                Opcode::SetMotorAnglesAbs as u8,
                Opcode::IsMoving as u8
            ]
        );
        log.with_sent(|sent| {
            let payload = sent[1].payload();
            let angle = |i: usize| {
                let at = 2 + i * 4;
                f32::from_le_bytes([payload[at], payload[at + 1], payload[at + 2], payload[at + 3]])
            };
            let expected = [
                std::f32::consts::PI,
                std::f32::consts::FRAC_PI_4,
                0.0,
                0.0, // third angle repeated
            ];
            for (i, want) in expected.iter().enumerate() {
                assert!((angle(i) - want).abs() < 1e-5, "angle {}: {}", i, angle(i));
            }
        });
    }

    #[test]
    fn test_move_by_nb_stops_when_read_fails() {
        let (robot, log) = fast_robot();
        log.silent();

        let result = robot.move_by_nb(10.0, 10.0, 10.0);

        assert!(matches!(result, Err(LinkbotError::Timeout { peer: 0x0042 })));
        assert_eq!(log.sent_opcodes(), vec![Opcode::GetMotorAnglesAbs as u8]);
    }

    #[test]
    fn test_drive_joint_to_uses_position_controller() {
        let (robot, log) = robot();
        log.reply(Opcode::SetMotorAnglePid, &[]);
        log.reply(Opcode::IsMoving, &[1]);
        log.reply(Opcode::IsMoving, &[0]);

        robot.drive_joint_to(Joint::Three, -90.0).unwrap();

        let moving = Opcode::IsMoving as u8;
        assert_eq!(
            log.sent_opcodes(),
            vec![Opcode::SetMotorAnglePid as u8, moving, moving]
        );
        log.with_sent(|sent| {
            let mut expected = vec![0x41, 8, 0x03];
            expected.extend_from_slice(&(-FRAC_PI_2).to_le_bytes());
            expected.push(0x00);
            assert_eq!(sent[0].payload(), expected.as_slice());
        });
    }

    #[test]
    fn test_drive_joint_to_nb_does_not_poll() {
        let (robot, log) = robot();
        log.reply(Opcode::SetMotorAnglePid, &[]);

        robot.drive_joint_to_nb(Joint::One, 30.0).unwrap();

        assert_eq!(log.sent_opcodes(), vec![Opcode::SetMotorAnglePid as u8]);
    }

    #[test]
    fn test_get_joint_angles_in_degrees() {
        let (robot, log) = robot();
        log.reply(Opcode::GetMotorAnglesAbs, &floats(&[FRAC_PI_2, 0.0, -FRAC_PI_2]));

        let angles = robot.get_joint_angles().unwrap();
        assert!((angles[0] - 90.0).abs() < 1e-4);
        assert!(angles[1].abs() < 1e-6);
        assert!((angles[2] + 90.0).abs() < 1e-4);
    }

    #[test]
    fn test_sensor_readings() {
        let (robot, log) = robot();
        log.reply(Opcode::GetBatteryVoltage, &floats(&[4.2]));
        log.reply(Opcode::GetAccel, &floats(&[0.0, 0.5, 1.0]));

        assert_eq!(robot.get_battery_voltage().unwrap(), 4.2);
        let accel = robot.get_accelerometer_data().unwrap();
        assert_eq!((accel.x, accel.y, accel.z), (0.0, 0.5, 1.0));
    }

    #[test]
    fn test_unsupported_reads() {
        let (robot, log) = robot();
        assert!(matches!(robot.get_color_rgb(), Err(LinkbotError::Unsupported { .. })));
        assert!(matches!(robot.get_form_factor(), Err(LinkbotError::Unsupported { .. })));
        assert!(log.sent_opcodes().is_empty());
    }

    #[test]
    fn test_set_led_color() {
        let (robot, log) = robot();
        log.reply(Opcode::RgbLed, &[]);

        robot.set_led_color(10, 20, 30).unwrap();

        log.with_sent(|sent| {
            assert_eq!(sent[0].payload(), &[0x64, 8, 0xFF, 0xFF, 10, 20, 30, 0x00]);
        });
    }

    #[test]
    fn test_motor_power_masks() {
        let (robot, log) = robot();
        log.reply(Opcode::SetMotorPower, &[]);
        log.reply(Opcode::SetMotorPower, &[]);

        robot.set_motor_power(Joint::Two, 300).unwrap();
        robot.set_motor_powers(1, -1, 0).unwrap();

        log.with_sent(|sent| {
            assert_eq!(&sent[0].payload()[2..], &[0x04, 0x01, 0x2C, 0x01, 0x2C, 0x01, 0x2C, 0x00]);
            assert_eq!(&sent[1].payload()[2..], &[0x07, 0x00, 0x01, 0xFF, 0xFF, 0x00, 0x00, 0x00]);
        });
    }

    #[test]
    fn test_set_joint_speeds_stops_on_failure() {
        let (robot, log) = fast_robot();
        log.reply(Opcode::SetMotorSpeed, &[]);
        log.silent();

        let result = robot.set_joint_speeds(10.0, 20.0, 30.0);

        assert!(matches!(result, Err(LinkbotError::Timeout { .. })));
        assert_eq!(log.sent_opcodes().len(), 2);
    }

    #[test]
    fn test_set_joint_states_payload() {
        let (robot, log) = robot();
        log.reply(Opcode::SetMotorStates, &[]);

        robot
            .set_joint_states(
                [JointState::Forward, JointState::Hold, JointState::Backward],
                [1.0, 2.0, 3.0],
            )
            .unwrap();

        log.with_sent(|sent| {
            assert_eq!(&sent[0].payload()[2..6], &[1, 3, 2, 0]);
        });
    }

    #[test]
    fn test_stop_transacts() {
        let (robot, log) = robot();
        log.reply(Opcode::Stop, &[]);
        robot.stop().unwrap();
        assert_eq!(log.sent_opcodes(), vec![Opcode::Stop as u8]);
    }

    #[test]
    fn test_reset_to_zero() {
        let (robot, log) = robot();
        log.reply(Opcode::ResetAbsCounter, &[]);
        log.reply(Opcode::SetMotorAnglesAbs, &[]);
        log.reply(Opcode::IsMoving, &[0]);

        let start = Instant::now();
        robot.reset_to_zero().unwrap();

        assert_eq!(
            log.sent_opcodes(),
            vec![
                Opcode::ResetAbsCounter as u8,
                Opcode::SetMotorAnglesAbs as u8,
                Opcode::IsMoving as u8
            ]
        );
        // stopped on the first poll, no inter-poll delay
        assert!(start.elapsed() < Duration::from_millis(100));
    }
}

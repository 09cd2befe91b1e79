// Command bridge: zenoh commands in, Linkbot transactions out, with a watchdog
// Note: motor power and joint-state commands keep the motors running until told
// otherwise. If the controller stops refreshing them, the watchdog stops the module.

use std::future::Future;
use std::time::{Duration, Instant};
use tokio::task::block_in_place;
use tokio::time::{interval, Interval};
use tracing::{info, warn};

// local imports
use crate::config::{CMD_TIMEOUT, HEALTH_PROBE_INTERVAL, LOOP_HZ, TOPIC_CMD, TOPIC_HEALTH, TOPIC_OUTCOME};
use crate::linkbot::{
    status_code, BusTransport, Joint, Linkbot, LinkbotError, Result, SerialBridge, TransactionEngine,
};
use crate::messages::{CommandOutcome, Reading, RobotCommand, RuntimeHealth};

pub struct Runtime<T: BusTransport> {
    robot: Linkbot<T>,
    sustained_since: Option<Instant>,
    last_probe: Option<Instant>,
    reachable: bool,
    stale: bool,
}

impl<T: BusTransport> Runtime<T> {
    pub fn new(robot: Linkbot<T>) -> Self {
        Self {
            robot,
            sustained_since: None,
            last_probe: None,
            reachable: false, // Unreachable until the first probe answers
            stale: false,
        }
    }

    pub fn robot(&self) -> &Linkbot<T> {
        &self.robot
    }

    pub fn health(&self) -> RuntimeHealth {
        if !self.reachable {
            RuntimeHealth::Unreachable
        } else if self.stale {
            RuntimeHealth::CmdStale
        } else {
            RuntimeHealth::Ok
        }
    }

    /// Run one command to completion (blocking forms block here)
    pub fn execute(&mut self, cmd: &RobotCommand) -> CommandOutcome {
        info!("Received command: {:?}", cmd);
        let result = self.dispatch(cmd);

        match &result {
            Ok(_) => {
                self.reachable = true;
                self.stale = false;
                if cmd.is_sustained() {
                    self.sustained_since = Some(Instant::now());
                } else if releases_motors(cmd) {
                    self.sustained_since = None;
                }
            }
            Err(LinkbotError::Timeout { .. }) | Err(LinkbotError::LostContact { .. }) => {
                self.reachable = false;
            }
            Err(_) => {}
        }

        if let Err(e) = &result {
            warn!("Command {} failed: {}", cmd.name(), e);
        }

        CommandOutcome {
            command: cmd.name().to_string(),
            status: status_code(&result),
            error: result.as_ref().err().map(|e| e.to_string()),
            reading: result.ok().flatten(),
        }
    }

    fn dispatch(&self, cmd: &RobotCommand) -> Result<Option<Reading>> {
        let robot = &self.robot;
        match *cmd {
            RobotCommand::CheckStatus => robot.check_status()?,
            RobotCommand::MoveJointTo { joint, angle, wait } => {
                let joint = Joint::try_from(joint)?;
                if wait {
                    robot.move_joint_to(joint, angle)?
                } else {
                    robot.move_joint_to_nb(joint, angle)?
                }
            }
            RobotCommand::MoveTo { angles: [a1, a2, a3], wait } => {
                if wait {
                    robot.move_to(a1, a2, a3)?
                } else {
                    robot.move_to_nb(a1, a2, a3)?
                }
            }
            RobotCommand::MoveJoint { joint, delta, wait } => {
                let joint = Joint::try_from(joint)?;
                if wait {
                    robot.move_joint(joint, delta)?
                } else {
                    robot.move_joint_nb(joint, delta)?
                }
            }
            RobotCommand::Move { deltas: [d1, d2, d3], wait } => {
                if wait {
                    robot.move_by(d1, d2, d3)?
                } else {
                    robot.move_by_nb(d1, d2, d3)?
                }
            }
            RobotCommand::DriveJointTo { joint, angle, wait } => {
                let joint = Joint::try_from(joint)?;
                if wait {
                    robot.drive_joint_to(joint, angle)?
                } else {
                    robot.drive_joint_to_nb(joint, angle)?
                }
            }
            RobotCommand::DriveTo { angles: [a1, a2, a3], wait } => {
                if wait {
                    robot.drive_to(a1, a2, a3)?
                } else {
                    robot.drive_to_nb(a1, a2, a3)?
                }
            }
            RobotCommand::SetJointSpeed { joint, speed } => {
                robot.set_joint_speed(Joint::try_from(joint)?, speed)?
            }
            RobotCommand::SetJointSpeeds { speeds: [s1, s2, s3] } => robot.set_joint_speeds(s1, s2, s3)?,
            RobotCommand::SetJointState { joint, state } => {
                robot.set_joint_state(Joint::try_from(joint)?, state)?
            }
            RobotCommand::SetJointStates { states, speeds } => robot.set_joint_states(states, speeds)?,
            RobotCommand::SetLedColor { r, g, b } => robot.set_led_color(r, g, b)?,
            RobotCommand::SetMotorPower { joint, power } => {
                robot.set_motor_power(Joint::try_from(joint)?, power)?
            }
            RobotCommand::SetMotorPowers { powers: [p1, p2, p3] } => robot.set_motor_powers(p1, p2, p3)?,
            RobotCommand::Stop => robot.stop()?,
            RobotCommand::Reset => robot.reset()?,
            RobotCommand::ResetToZero => robot.reset_to_zero()?,
            RobotCommand::GetJointAngles => {
                return Ok(Some(Reading::JointAngles(robot.get_joint_angles()?)));
            }
            RobotCommand::GetAccelerometer => {
                let accel = robot.get_accelerometer_data()?;
                return Ok(Some(Reading::Accelerometer([accel.x, accel.y, accel.z])));
            }
            RobotCommand::GetBatteryVoltage => {
                return Ok(Some(Reading::BatteryVoltage(robot.get_battery_voltage()?)));
            }
        }
        Ok(None)
    }

    /// Stop the module if a sustained command has not been refreshed in time
    pub fn watchdog(&mut self) {
        let Some(since) = self.sustained_since else {
            return;
        };

        let age = since.elapsed();
        if age > CMD_TIMEOUT {
            // Watchdog triggered - stop the robot
            warn!("Command stale ({:?} old), stopping robot", age);
            self.sustained_since = None;
            self.stale = true;
            if let Err(e) = self.robot.stop() {
                warn!("Failed to stop module: {}", e);
                self.reachable = false;
            }
        }
    }

    /// Ping the module if the last probe is old enough
    fn probe(&mut self) {
        let due = self
            .last_probe
            .is_none_or(|at| at.elapsed() >= HEALTH_PROBE_INTERVAL);
        if !due {
            return;
        }

        let reachable = self.robot.check_status().is_ok();
        if reachable != self.reachable {
            if reachable {
                info!("Module 0x{:04X} responding", self.robot.address());
            } else {
                warn!("Module 0x{:04X} not responding", self.robot.address());
            }
        }
        self.reachable = reachable;
        self.last_probe = Some(Instant::now());
    }

    /// Leave the module idle before the runtime exits
    pub fn shutdown(&mut self) {
        info!("Shutting down, stopping module");
        self.sustained_since = None;
        if let Err(e) = self.robot.stop() {
            warn!("Failed to stop module on shutdown: {}", e);
        }
    }

    /// One loop iteration: watchdog, health probe, current health
    pub fn tick(&mut self) -> RuntimeHealth {
        self.watchdog();
        self.probe();
        self.health()
    }
}

/// Wait for the next loop tick. Returns false once `shutdown` has resolved.
///
/// `shutdown` must outlive the loop: a signal raised while the loop body runs
/// is only seen by a listener that already exists.
async fn next_tick<F: Future + Unpin>(tick: &mut Interval, shutdown: &mut F) -> bool {
    tokio::select! {
        biased;
        _ = shutdown => false,
        _ = tick.tick() => true,
    }
}

/// Commands that leave the motors idle
fn releases_motors(cmd: &RobotCommand) -> bool {
    matches!(
        cmd,
        RobotCommand::Stop
            | RobotCommand::SetMotorPower { .. }
            | RobotCommand::SetMotorPowers { .. }
            | RobotCommand::SetJointState { .. }
            | RobotCommand::SetJointStates { .. }
    )
}

pub async fn run(
    port: &str,
    baudrate: u32,
    address: u16,
) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let bridge = SerialBridge::open_with_baudrate(port, baudrate)?;
    let engine = TransactionEngine::new(bridge)?;
    let mut runtime = Runtime::new(Linkbot::new(engine, address));

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let subscriber = session.declare_subscriber(TOPIC_CMD).await?;
    let pub_outcome = session.declare_publisher(TOPIC_OUTCOME).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    let mut tick = interval(Duration::from_millis(1000 / LOOP_HZ));

    info!(
        "Runtime started: {}Hz loop, {}ms watchdog timeout, module 0x{:04X}",
        LOOP_HZ,
        CMD_TIMEOUT.as_millis(),
        address
    );
    info!("Subscribed to: {}", TOPIC_CMD);
    info!("Publishing to: {}, {}", TOPIC_OUTCOME, TOPIC_HEALTH);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        if !next_tick(&mut tick, &mut ctrl_c).await {
            block_in_place(|| runtime.shutdown());
            return Ok(());
        }

        // 1. Drain pending commands; each runs to completion on the bus
        while let Ok(Some(sample)) = subscriber.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<RobotCommand>(&payload) {
                Ok(cmd) => {
                    let outcome = block_in_place(|| runtime.execute(&cmd));
                    pub_outcome.put(serde_json::to_string(&outcome)?).await?;
                }
                Err(e) => {
                    warn!("Failed to parse command: {}", e);
                }
            }
        }

        // 2. Watchdog and health probe
        let health = block_in_place(|| runtime.tick());

        // 3. Publish health
        let health_json = serde_json::to_string(&health)?;
        pub_health.put(health_json).await?;
    }
}

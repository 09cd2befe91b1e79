use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use linkbot_driver::config::{BRIDGE_BAUDRATE, BRIDGE_PORT, LOCAL_PEER};
use linkbot_driver::linkbot::{JointState, Linkbot, SerialBridge, TransactionEngine};
use linkbot_driver::messages::RobotCommand;
use linkbot_driver::runtime::{self, Runtime};

/// Drive a Linkbot module over a serial-attached bus bridge
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Serial port of the bus bridge
    #[arg(long, default_value = BRIDGE_PORT)]
    port: String,

    #[arg(long, default_value_t = BRIDGE_BAUDRATE)]
    baud: u32,

    /// Peer address of the module (0 = locally attached, hex with 0x prefix accepted)
    #[arg(long, default_value_t = LOCAL_PEER, value_parser = parse_address)]
    address: u16,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Bridge zenoh commands to the module until Ctrl+C
    Serve,
    /// Ping the module
    Status,
    /// Move one joint to an absolute angle (degrees)
    MoveJointTo {
        joint: u8,
        #[arg(allow_negative_numbers = true)]
        angle: f32,
        #[arg(long)]
        no_wait: bool,
    },
    /// Move all joints to absolute angles (degrees)
    MoveTo {
        #[arg(allow_negative_numbers = true)]
        angles: Vec<f32>,
        #[arg(long)]
        no_wait: bool,
    },
    /// Move one joint by a relative angle (degrees)
    MoveJoint {
        joint: u8,
        #[arg(allow_negative_numbers = true)]
        delta: f32,
        #[arg(long)]
        no_wait: bool,
    },
    /// Move all joints by relative angles (degrees)
    Move {
        #[arg(allow_negative_numbers = true)]
        deltas: Vec<f32>,
        #[arg(long)]
        no_wait: bool,
    },
    /// Drive one joint to an absolute angle with the module's position controller
    DriveJointTo {
        joint: u8,
        #[arg(allow_negative_numbers = true)]
        angle: f32,
        #[arg(long)]
        no_wait: bool,
    },
    /// Drive all joints to absolute angles with the module's position controller
    DriveTo {
        #[arg(allow_negative_numbers = true)]
        angles: Vec<f32>,
        #[arg(long)]
        no_wait: bool,
    },
    /// Read joint angles (degrees)
    Angles,
    /// Read the accelerometer
    Accel,
    /// Read the battery voltage
    Battery,
    /// Set the LED color
    Led { r: u8, g: u8, b: u8 },
    /// Set one joint's speed (deg/s)
    Speed {
        joint: u8,
        #[arg(allow_negative_numbers = true)]
        speed: f32,
    },
    /// Set all joint speeds (deg/s)
    Speeds {
        #[arg(allow_negative_numbers = true)]
        speeds: Vec<f32>,
    },
    /// Set one joint's logical state
    State { joint: u8, state: String },
    /// Set the logical state and speed (deg/s) of every joint
    States {
        states: Vec<String>,
        #[arg(long, num_args = 3, required = true, allow_negative_numbers = true)]
        speeds: Vec<f32>,
    },
    /// Set raw motor power for one joint
    Power {
        joint: u8,
        #[arg(allow_negative_numbers = true)]
        power: i16,
    },
    /// Set raw motor power for every joint
    Powers {
        #[arg(allow_negative_numbers = true)]
        powers: Vec<i16>,
    },
    /// Stop all motors
    Stop,
    /// Reset the multi-turn angle counters
    Reset,
    /// Reset the counters and move every joint to zero
    ResetToZero,
}

fn parse_address(s: &str) -> Result<u16, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid address {s:?}: {e}"))
}

fn three<T: Copy>(values: &[T]) -> Result<[T; 3], String> {
    <[T; 3]>::try_from(values).map_err(|_| format!("expected 3 values, got {}", values.len()))
}

fn parse_state(s: &str) -> Result<JointState, String> {
    serde_json::from_value(serde_json::Value::String(s.to_lowercase()))
        .map_err(|_| format!("unknown joint state {s:?}"))
}

impl Command {
    fn to_robot_command(&self) -> Result<RobotCommand, String> {
        let cmd = match self {
            Command::Serve => return Err("serve is not a robot command".to_string()),
            Command::Status => RobotCommand::CheckStatus,
            Command::MoveJointTo { joint, angle, no_wait } => RobotCommand::MoveJointTo {
                joint: *joint,
                angle: *angle,
                wait: !no_wait,
            },
            Command::MoveTo { angles, no_wait } => RobotCommand::MoveTo {
                angles: three(angles)?,
                wait: !no_wait,
            },
            Command::MoveJoint { joint, delta, no_wait } => RobotCommand::MoveJoint {
                joint: *joint,
                delta: *delta,
                wait: !no_wait,
            },
            Command::Move { deltas, no_wait } => RobotCommand::Move {
                deltas: three(deltas)?,
                wait: !no_wait,
            },
            Command::DriveJointTo { joint, angle, no_wait } => RobotCommand::DriveJointTo {
                joint: *joint,
                angle: *angle,
                wait: !no_wait,
            },
            Command::DriveTo { angles, no_wait } => RobotCommand::DriveTo {
                angles: three(angles)?,
                wait: !no_wait,
            },
            Command::Angles => RobotCommand::GetJointAngles,
            Command::Accel => RobotCommand::GetAccelerometer,
            Command::Battery => RobotCommand::GetBatteryVoltage,
            Command::Led { r, g, b } => RobotCommand::SetLedColor { r: *r, g: *g, b: *b },
            Command::Speed { joint, speed } => RobotCommand::SetJointSpeed {
                joint: *joint,
                speed: *speed,
            },
            Command::Speeds { speeds } => RobotCommand::SetJointSpeeds {
                speeds: three(speeds)?,
            },
            Command::State { joint, state } => RobotCommand::SetJointState {
                joint: *joint,
                state: parse_state(state)?,
            },
            Command::States { states, speeds } => {
                let states = states
                    .iter()
                    .map(|s| parse_state(s))
                    .collect::<Result<Vec<_>, _>>()?;
                RobotCommand::SetJointStates {
                    states: three(&states)?,
                    speeds: three(speeds)?,
                }
            }
            Command::Power { joint, power } => RobotCommand::SetMotorPower {
                joint: *joint,
                power: *power,
            },
            Command::Powers { powers } => RobotCommand::SetMotorPowers {
                powers: three(powers)?,
            },
            Command::Stop => RobotCommand::Stop,
            Command::Reset => RobotCommand::Reset,
            Command::ResetToZero => RobotCommand::ResetToZero,
        };
        Ok(cmd)
    }
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init(); // installs the subscriber globally

    let cli = Cli::parse();

    if let Command::Serve = cli.command {
        if let Err(e) = runtime::run(&cli.port, cli.baud, cli.address).await {
            eprintln!("Runtime error: {}", e);
            std::process::exit(1);
        }
        return;
    }

    let cmd = match cli.command.to_robot_command() {
        Ok(cmd) => cmd,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(2);
        }
    };

    let robot = match SerialBridge::open_with_baudrate(&cli.port, cli.baud)
        .and_then(TransactionEngine::new)
    {
        Ok(engine) => Linkbot::new(engine, cli.address),
        Err(e) => {
            eprintln!("Failed to open bus bridge: {}", e);
            std::process::exit(1);
        }
    };

    let outcome = tokio::task::block_in_place(|| Runtime::new(robot).execute(&cmd));
    match serde_json::to_string_pretty(&outcome) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to encode outcome: {}", e),
    }
    if outcome.status != 0 {
        std::process::exit(1);
    }
}

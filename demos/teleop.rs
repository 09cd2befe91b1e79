// Keyboard teleop: 1/2/3 select joint, Up/Down nudge it, R/F step size, L cycle LED, Space stop, Q quit
//
// Publishes RobotCommand JSON to the runtime started with `linkbot-driver serve`.
// Usage: cargo run --example teleop
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::Duration;
use tracing::info;

use linkbot_driver::config::TOPIC_CMD;
use linkbot_driver::messages::RobotCommand;

const STEPS: [f32; 3] = [5.0, 15.0, 45.0]; // degrees per key press
const COLORS: [(u8, u8, u8); 4] = [(255, 0, 0), (0, 255, 0), (0, 0, 255), (255, 255, 255)];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let publisher = session.declare_publisher(TOPIC_CMD).await?;

    info!("Controls: 1/2/3=joint, Up/Down=nudge, R/F=step, L=LED, Space=stop, Q=quit");
    info!("Joint 1, step {} deg", STEPS[0]);

    enable_raw_mode()?;
    let result = run_teleop(&publisher).await;
    disable_raw_mode()?;

    result
}

async fn run_teleop(
    publisher: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut joint: u8 = 1;
    let mut step_idx: usize = 0;
    let mut color_idx: usize = 0;

    loop {
        if !event::poll(Duration::from_millis(50))? {
            continue;
        }
        let Event::Key(KeyEvent { code, kind, .. }) = event::read()? else {
            continue;
        };
        if kind != KeyEventKind::Press {
            continue;
        }

        let cmd = match code {
            KeyCode::Char(c @ '1'..='3') => {
                joint = c as u8 - b'0';
                info!("Joint {}", joint);
                None
            }
            KeyCode::Up => Some(RobotCommand::MoveJoint {
                joint,
                delta: STEPS[step_idx],
                wait: false,
            }),
            KeyCode::Down => Some(RobotCommand::MoveJoint {
                joint,
                delta: -STEPS[step_idx],
                wait: false,
            }),
            KeyCode::Char('r') => {
                step_idx = (step_idx + 1).min(STEPS.len() - 1);
                info!("Step {} deg", STEPS[step_idx]);
                None
            }
            KeyCode::Char('f') => {
                step_idx = step_idx.saturating_sub(1);
                info!("Step {} deg", STEPS[step_idx]);
                None
            }
            KeyCode::Char('l') => {
                color_idx = (color_idx + 1) % COLORS.len();
                let (r, g, b) = COLORS[color_idx];
                Some(RobotCommand::SetLedColor { r, g, b })
            }
            KeyCode::Char(' ') => Some(RobotCommand::Stop),
            KeyCode::Char('q') | KeyCode::Esc => {
                publisher.put(serde_json::to_string(&RobotCommand::Stop)?).await?;
                break;
            }
            _ => None,
        };

        if let Some(cmd) = cmd {
            publisher.put(serde_json::to_string(&cmd)?).await?;
        }
    }

    Ok(())
}

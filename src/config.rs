// Timeouts, addresses, topics, bridge configuration
use std::time::Duration;

// Transaction timing
// How long the engine waits for a reply after a transmission
pub const REPLY_TIMEOUT: Duration = Duration::from_millis(500);

// Delay between is-moving polls while waiting for motion to finish
pub const MOVE_POLL_INTERVAL: Duration = Duration::from_millis(100);

// Consecutive unanswered is-moving polls before giving up on the module
pub const MAX_MISSED_POLLS: u32 = 3;

// Bus addressing
// Every physical transmission goes to the locally attached gateway
pub const GATEWAY_ADDRESS: u8 = 0x01;

// Peer address of the module attached directly to the gateway
pub const LOCAL_PEER: u16 = 0x0000;

// Serial bridge
pub const BRIDGE_PORT: &str = "/dev/ttyACM0";
pub const BRIDGE_BAUDRATE: u32 = 115_200;
pub const BRIDGE_READ_TIMEOUT: Duration = Duration::from_millis(50);

// Runtime loop frequency
pub const LOOP_HZ: u64 = 20;

// Health probe interval (check_status on the module)
pub const HEALTH_PROBE_INTERVAL: Duration = Duration::from_secs(1);

// Sustained commands (motor power, joint states) are stopped after this long without a refresh
pub const CMD_TIMEOUT: Duration = Duration::from_millis(500);

// Zenoh topics
pub const TOPIC_CMD: &str = "linkbot/cmd"; // commands
pub const TOPIC_OUTCOME: &str = "linkbot/outcome"; // per-command results
pub const TOPIC_HEALTH: &str = "linkbot/state/health"; // health status

/// Timing knobs for one bus. Defaults match the robot firmware's expectations.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub reply_timeout: Duration,
    pub poll_interval: Duration,
    pub max_missed_polls: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reply_timeout: REPLY_TIMEOUT,
            poll_interval: MOVE_POLL_INTERVAL,
            max_missed_polls: MAX_MISSED_POLLS,
        }
    }
}

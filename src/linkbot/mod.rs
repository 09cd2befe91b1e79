// Linkbot module driver over the two-wire bus
//
// Provides:
// - Command payload packing and link-layer envelope framing
// - A per-bus reply slot fed by the transport's receive handler
// - The send/await/timeout transaction engine
// - Typed reply decoding
// - The high-level driver API with blocking and non-blocking motion

mod driver;
pub mod engine;
mod error;
pub mod frame;
pub mod inbox;
pub mod reply;
pub mod transport;
pub mod units;

#[cfg(test)]
pub(crate) mod sim;

pub use driver::{FormFactor, Joint, JointState, Linkbot, MoveStatus};
pub use engine::TransactionEngine;
pub use error::{status_code, LinkbotError, Result};
pub use frame::{CommandPayload, Envelope, Opcode};
pub use reply::Acceleration;
pub use transport::{BusTransport, SerialBridge};

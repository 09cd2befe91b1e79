// Transaction engine: one send/await/timeout cycle at a time per bus
//
// Sequence per transaction:
//   1. take the bus permit
//   2. drop any stale reply
//   3. frame the payload for the peer
//   4. wait for the bus to become ready (unbounded spin)
//   5. write the envelope to the gateway
//   6. block on the reply slot until a frame arrives or the timeout elapses

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::{debug, warn};

use super::error::{LinkbotError, Result};
use super::frame::{CommandPayload, Envelope};
use super::inbox::{Inbox, ReceivedFrame};
use super::transport::BusTransport;
use crate::config::{EngineConfig, GATEWAY_ADDRESS};

struct BusState<T> {
    transport: T,
    inbox: Inbox,
}

/// Shared handle to one physical bus. Clones talk to the same bus and
/// are serialized against each other.
pub struct TransactionEngine<T: BusTransport> {
    state: Arc<Mutex<BusState<T>>>,
    config: EngineConfig,
}

impl<T: BusTransport> Clone for TransactionEngine<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            config: self.config,
        }
    }
}

impl<T: BusTransport> TransactionEngine<T> {
    /// Take ownership of a transport and register the reply slot with it
    pub fn new(transport: T) -> Result<Self> {
        Self::with_config(transport, EngineConfig::default())
    }

    /// Create with custom timing
    pub fn with_config(mut transport: T, config: EngineConfig) -> Result<Self> {
        let inbox = Inbox::new();
        transport.attach(inbox.handle())?;

        Ok(Self {
            state: Arc::new(Mutex::new(BusState { transport, inbox })),
            config,
        })
    }

    pub fn config(&self) -> EngineConfig {
        self.config
    }

    /// Send `payload` to `peer` and wait for its reply.
    ///
    /// The returned frame is the raw link frame as received; decoding is up to the caller.
    pub fn transact(&self, peer: u16, payload: &CommandPayload) -> Result<ReceivedFrame> {
        // The guard is the transaction permit: held until the reply or the timeout
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let stale = state.inbox.reset();
        if stale > 0 {
            debug!("Dropped {} stale frame(s) before transaction", stale);
        }

        let envelope = Envelope::wrap(peer, payload)?;

        while !state.transport.is_ready() {
            std::hint::spin_loop();
        }

        let started = Instant::now();
        debug!(
            "Transact with 0x{:04X}: {:02X?}",
            peer,
            envelope.as_bytes()
        );
        if let Err(e) = state.transport.write_to(GATEWAY_ADDRESS, envelope.as_bytes()) {
            // the reply (or its absence) decides the outcome
            debug!("Bus write reported {}", e);
        }

        // the timeout counts from the start of the transmission, not from its end
        let remaining = self.config.reply_timeout.saturating_sub(started.elapsed());
        match state.inbox.wait(remaining) {
            Some(frame) => {
                debug!(
                    "Reply from 0x{:04X} after {:?}: {:?}",
                    peer,
                    started.elapsed(),
                    frame
                );
                Ok(frame)
            }
            None => {
                warn!(
                    "Timeout after {:?} waiting for module 0x{:04X} (opcode 0x{:02X})",
                    started.elapsed(),
                    peer,
                    payload.opcode()
                );
                Err(LinkbotError::Timeout { peer })
            }
        }
    }
}

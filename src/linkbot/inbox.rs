// Receive side of the bus: one reply slot per bus
//
// The transport's receive handler is the only producer. The engine drains the
// slot before each transmission and then blocks on it with a deadline.

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::time::Duration;
use tracing::warn;

use super::frame::ENVELOPE_HEADER_LEN;

/// Receive buffer capacity
pub const RECEIVE_CAPACITY: usize = 256;

/// One inbound link frame, copied out of the transport's buffer
#[derive(Clone)]
pub struct ReceivedFrame {
    len: usize,
    buf: [u8; RECEIVE_CAPACITY],
}

impl ReceivedFrame {
    /// Copy a frame; anything past the buffer capacity is dropped
    pub fn from_bytes(data: &[u8]) -> Self {
        let len = data.len().min(RECEIVE_CAPACITY);
        let mut buf = [0u8; RECEIVE_CAPACITY];
        buf[..len].copy_from_slice(&data[..len]);
        Self { len, buf }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// The frame with its link-layer header stripped
    pub fn payload(&self) -> &[u8] {
        self.as_bytes().get(ENVELOPE_HEADER_LEN..).unwrap_or(&[])
    }
}

impl std::fmt::Debug for ReceivedFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReceivedFrame({:02X?})", self.as_bytes())
    }
}

/// Single-slot mailbox owned by the transaction engine
pub struct Inbox {
    tx: Sender<ReceivedFrame>,
    rx: Receiver<ReceivedFrame>,
}

impl Inbox {
    pub fn new() -> Self {
        let (tx, rx) = channel::bounded(1);
        Self { tx, rx }
    }

    /// Handle given to the transport at construction time
    pub fn handle(&self) -> ReceiveHandle {
        ReceiveHandle {
            tx: self.tx.clone(),
        }
    }

    /// Discard anything left over from an earlier transaction.
    /// Returns the number of stale frames dropped.
    pub fn reset(&self) -> usize {
        self.rx.try_iter().count()
    }

    /// Block until a frame arrives or `timeout` elapses
    pub fn wait(&self, timeout: Duration) -> Option<ReceivedFrame> {
        match self.rx.recv_timeout(timeout) {
            Ok(frame) => Some(frame),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}

impl Default for Inbox {
    fn default() -> Self {
        Self::new()
    }
}

/// Producer side of an [`Inbox`], called from the transport's receive context
#[derive(Clone)]
pub struct ReceiveHandle {
    tx: Sender<ReceivedFrame>,
}

impl ReceiveHandle {
    /// Hand a received frame to the engine. Empty frames are ignored.
    /// Returns whether the frame was accepted.
    pub fn deliver(&self, data: &[u8]) -> bool {
        if data.is_empty() {
            return false;
        }
        if data.len() > RECEIVE_CAPACITY {
            warn!(
                "Received frame of {} bytes, truncating to {}",
                data.len(),
                RECEIVE_CAPACITY
            );
        }

        match self.tx.try_send(ReceivedFrame::from_bytes(data)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Reply slot occupied, dropping {} byte frame", data.len());
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

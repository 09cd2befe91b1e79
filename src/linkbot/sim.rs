// Simulated bus for tests: records every transmission and answers from a script,
// delivering replies from a separate thread the way a bus interrupt would.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use super::error::Result;
use super::frame::Opcode;
use super::inbox::ReceiveHandle;
use super::transport::BusTransport;

pub(crate) enum SimReply {
    /// Deliver `frame` this long after the write
    After(Duration, Vec<u8>),
    /// Never answer
    Silent,
}

pub(crate) struct Sent {
    pub address: u8,
    pub bytes: Vec<u8>,
    pub at: Instant,
}

impl Sent {
    pub fn opcode(&self) -> u8 {
        self.bytes[0]
    }

    /// Payload inside the envelope
    pub fn payload(&self) -> &[u8] {
        &self.bytes[5..self.bytes.len() - 1]
    }
}

#[derive(Clone, Default)]
pub(crate) struct SimLog {
    script: Arc<Mutex<VecDeque<SimReply>>>,
    sent: Arc<Mutex<Vec<Sent>>>,
    busy_polls: Arc<AtomicU32>,
    write_delay: Arc<Mutex<Duration>>,
    handle: Arc<Mutex<Option<ReceiveHandle>>>,
}

impl SimLog {
    pub fn push(&self, reply: SimReply) {
        self.script.lock().unwrap().push_back(reply);
    }

    /// Queue an immediate reply carrying `data` after the opcode/length prefix
    pub fn reply(&self, opcode: Opcode, data: &[u8]) {
        self.push(SimReply::After(Duration::ZERO, reply_frame(opcode, data)));
    }

    pub fn silent(&self) {
        self.push(SimReply::Silent);
    }

    /// Report the bus busy for the next `polls` readiness checks
    pub fn set_busy(&self, polls: u32) {
        self.busy_polls.store(polls, Ordering::SeqCst);
    }

    /// Make every write take this long before it returns
    pub fn set_write_delay(&self, delay: Duration) {
        *self.write_delay.lock().unwrap() = delay;
    }

    /// Deliver a frame outside any transaction
    pub fn inject(&self, frame: &[u8]) {
        if let Some(handle) = self.handle.lock().unwrap().as_ref() {
            handle.deliver(frame);
        }
    }

    pub fn sent_opcodes(&self) -> Vec<u8> {
        self.sent.lock().unwrap().iter().map(Sent::opcode).collect()
    }

    pub fn with_sent<R>(&self, f: impl FnOnce(&[Sent]) -> R) -> R {
        f(&self.sent.lock().unwrap())
    }
}

pub(crate) struct SimTransport {
    log: SimLog,
}

impl SimTransport {
    pub fn new() -> (Self, SimLog) {
        let log = SimLog::default();
        (Self { log: log.clone() }, log)
    }
}

impl BusTransport for SimTransport {
    fn attach(&mut self, handle: ReceiveHandle) -> Result<()> {
        *self.log.handle.lock().unwrap() = Some(handle);
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.log
            .busy_polls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_err()
    }

    fn write_to(&mut self, address: u8, data: &[u8]) -> Result<()> {
        let delay = *self.log.write_delay.lock().unwrap();
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        self.log.sent.lock().unwrap().push(Sent {
            address,
            bytes: data.to_vec(),
            at: Instant::now(),
        });

        let next = self.log.script.lock().unwrap().pop_front();
        if let Some(SimReply::After(delay, frame)) = next {
            let handle = self.log.handle.lock().unwrap().clone();
            if let Some(handle) = handle {
                thread::spawn(move || {
                    thread::sleep(delay);
                    handle.deliver(&frame);
                });
            }
        }
        Ok(())
    }
}

/// Build a link frame the way the module answers: header, [opcode, len, data..., 0x00], terminator
pub(crate) fn reply_frame(opcode: Opcode, data: &[u8]) -> Vec<u8> {
    let payload_len = data.len() + 3;
    let mut frame = vec![opcode as u8, (payload_len + 6) as u8, 0x00, 0x00, 1];
    frame.push(opcode as u8);
    frame.push(payload_len as u8);
    frame.extend_from_slice(data);
    frame.push(0x00);
    frame.push(0x00);
    frame
}

/// Little-endian float images back to back
pub(crate) fn floats(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

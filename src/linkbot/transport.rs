// Bus transports
//
// The engine only needs three things from the physical bus: a readiness flag,
// a "write N bytes to address P" primitive, and a place to deliver received
// frames. `SerialBridge` provides them over a serial-attached bus bridge.
//
// Bridge framing:
//   host -> bridge: [Address, Length, Data...]
//   bridge -> host: raw link frames, byte 1 carries the total frame length

use serialport::{self, SerialPort};
use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

use super::error::{LinkbotError, Result};
use super::frame::ENVELOPE_OVERHEAD;
use super::inbox::ReceiveHandle;
use crate::config::{BRIDGE_BAUDRATE, BRIDGE_READ_TIMEOUT};

/// Physical bus primitives used by the transaction engine
pub trait BusTransport: Send {
    /// Register the receive handler. Called once when the engine is built.
    fn attach(&mut self, handle: ReceiveHandle) -> Result<()>;

    /// Whether the bus can accept a transmission right now
    fn is_ready(&self) -> bool;

    /// Write `data` to the bus peer at `address`
    fn write_to(&mut self, address: u8, data: &[u8]) -> Result<()>;
}

/// Serial-attached bus bridge
pub struct SerialBridge {
    port: Box<dyn SerialPort>,
    receiving: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl SerialBridge {
    /// Open the bridge on a serial port
    pub fn open(port_name: &str) -> Result<Self> {
        Self::open_with_baudrate(port_name, BRIDGE_BAUDRATE)
    }

    /// Open with custom baudrate
    pub fn open_with_baudrate(port_name: &str, baudrate: u32) -> Result<Self> {
        info!("Opening bus bridge on {} at {} baud", port_name, baudrate);
        let port = serialport::new(port_name, baudrate)
            .timeout(BRIDGE_READ_TIMEOUT)
            .open()?;

        Ok(Self {
            port,
            receiving: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(AtomicBool::new(false)),
            reader: None,
        })
    }
}

impl BusTransport for SerialBridge {
    fn attach(&mut self, handle: ReceiveHandle) -> Result<()> {
        let port = self.port.try_clone()?;
        let receiving = Arc::clone(&self.receiving);
        let shutdown = Arc::clone(&self.shutdown);

        let reader = thread::Builder::new()
            .name("linkbot-bridge-rx".to_string())
            .spawn(move || receive_loop(port, handle, receiving, shutdown))?;
        self.reader = Some(reader);
        Ok(())
    }

    fn is_ready(&self) -> bool {
        // half-duplex: the bus is busy while a frame is still coming in
        !self.receiving.load(Ordering::Acquire)
    }

    fn write_to(&mut self, address: u8, data: &[u8]) -> Result<()> {
        let len = u8::try_from(data.len()).map_err(|_| LinkbotError::PayloadOverflow {
            capacity: u8::MAX as usize,
        })?;

        let mut packet = Vec::with_capacity(data.len() + 2);
        packet.push(address);
        packet.push(len);
        packet.extend_from_slice(data);

        debug!("Bridge write to 0x{:02X}: {:02X?}", address, data);
        self.port.write_all(&packet)?;
        self.port.flush()?;
        Ok(())
    }
}

impl Drop for SerialBridge {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(reader) = self.reader.take() {
            if reader.join().is_err() {
                warn!("Bridge reader thread panicked");
            }
        }
    }
}

/// Reader thread: frames inbound bytes and hands each frame to the engine
fn receive_loop(
    mut port: Box<dyn SerialPort>,
    handle: ReceiveHandle,
    receiving: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
) {
    while !shutdown.load(Ordering::Acquire) {
        match read_frame(port.as_mut(), &receiving) {
            Ok(Some(frame)) => {
                debug!("Bridge received {:02X?}", frame);
                handle.deliver(&frame);
            }
            Ok(None) => {}
            Err(e) => {
                warn!("Bridge read failed: {}", e);
                thread::sleep(BRIDGE_READ_TIMEOUT);
            }
        }
        receiving.store(false, Ordering::Release);
    }
}

/// Read one link frame. `Ok(None)` when the line stayed idle.
///
/// A frame cut short by a timeout or a bad length byte leaves the stream
/// misaligned; the rest of the line is skipped until it goes idle.
fn read_frame<P: Read + ?Sized>(port: &mut P, receiving: &AtomicBool) -> std::io::Result<Option<Vec<u8>>> {
    let mut head = [0u8; 2];
    match port.read(&mut head[..1]) {
        Ok(0) => return Ok(None),
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::TimedOut => return Ok(None),
        Err(e) => return Err(e),
    }

    receiving.store(true, Ordering::Release);
    if let Err(e) = port.read_exact(&mut head[1..]) {
        skip_until_idle(port);
        return Err(e);
    }

    let total = head[1] as usize;
    if total < ENVELOPE_OVERHEAD {
        warn!("Discarding frame with bad length byte {}", total);
        skip_until_idle(port);
        return Ok(None);
    }

    let mut frame = vec![0u8; total];
    frame[..2].copy_from_slice(&head);
    if let Err(e) = port.read_exact(&mut frame[2..]) {
        skip_until_idle(port);
        return Err(e);
    }
    Ok(Some(frame))
}

/// Drop inbound bytes until one read times out
fn skip_until_idle<P: Read + ?Sized>(port: &mut P) {
    let mut scratch = [0u8; 64];
    let mut skipped = 0;
    loop {
        match port.read(&mut scratch) {
            Ok(0) | Err(_) => break,
            Ok(n) => skipped += n,
        }
    }
    if skipped > 0 {
        debug!("Skipped {} bytes to resync", skipped);
    }
}

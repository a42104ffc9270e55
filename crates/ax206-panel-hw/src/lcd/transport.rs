//! Bulk-only command transport.
//!
//! Every device command is a three-phase exchange: envelope out, optional
//! payload in either direction, status reply in. Only the status phase is
//! retried.

use std::time::Duration;

use rusb::{DeviceHandle, UsbContext};
use tracing::{debug, warn};

use super::protocol::{build_envelope, CommandBlock, StatusReply, STATUS_SIGNATURE, STATUS_SIZE};
use crate::error::Phase;
use crate::{Error, Result, ENDPOINT_IN, ENDPOINT_OUT};

/// Timeout for sending the command envelope.
pub const COMMAND_TIMEOUT: Duration = Duration::from_millis(1000);

/// Timeout for the OUT data phase.
pub const WRITE_TIMEOUT: Duration = Duration::from_millis(3000);

/// Timeout for the IN data phase.
pub const READ_TIMEOUT: Duration = Duration::from_millis(4000);

/// Per-attempt timeout for reading the status reply.
pub const STATUS_TIMEOUT: Duration = Duration::from_millis(5000);

/// Total attempts for the status phase.
pub const STATUS_ATTEMPTS: usize = 5;

/// Raw bulk endpoint access.
///
/// Implemented for [`rusb::DeviceHandle`]; tests substitute scripted pipes.
pub trait BulkPipe {
    /// Writes `buf` to `endpoint`, returning the number of bytes sent.
    fn write_bulk(&mut self, endpoint: u8, buf: &[u8], timeout: Duration) -> rusb::Result<usize>;

    /// Reads into `buf` from `endpoint`, returning the number of bytes received.
    fn read_bulk(&mut self, endpoint: u8, buf: &mut [u8], timeout: Duration)
        -> rusb::Result<usize>;
}

impl<T: UsbContext> BulkPipe for DeviceHandle<T> {
    fn write_bulk(&mut self, endpoint: u8, buf: &[u8], timeout: Duration) -> rusb::Result<usize> {
        DeviceHandle::write_bulk(self, endpoint, buf, timeout)
    }

    fn read_bulk(
        &mut self,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> rusb::Result<usize> {
        DeviceHandle::read_bulk(self, endpoint, buf, timeout)
    }
}

/// Data phase of a command, which also fixes its direction and length.
#[derive(Debug)]
pub enum DataPhase<'a> {
    /// No payload.
    None,
    /// Host to device.
    Out(&'a [u8]),
    /// Device to host; the whole slice must be filled.
    In(&'a mut [u8]),
}

impl DataPhase<'_> {
    /// Length announced in the envelope.
    pub fn len(&self) -> usize {
        match self {
            DataPhase::None => 0,
            DataPhase::Out(data) => data.len(),
            DataPhase::In(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Runs `op` up to `attempts` times, returning the first success or the last error.
pub fn retry<T, E: std::fmt::Display>(
    attempts: usize,
    mut op: impl FnMut(usize) -> std::result::Result<T, E>,
) -> std::result::Result<T, E> {
    let mut attempt = 1;
    loop {
        match op(attempt) {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts => {
                warn!("Attempt {}/{} failed: {}", attempt, attempts, e);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

fn write_exact<P: BulkPipe>(
    pipe: &mut P,
    phase: Phase,
    data: &[u8],
    timeout: Duration,
) -> Result<()> {
    let written = pipe
        .write_bulk(ENDPOINT_OUT, data, timeout)
        .map_err(|source| Error::Transfer { phase, source })?;
    if written != data.len() {
        return Err(Error::ShortTransfer {
            phase,
            expected: data.len(),
            actual: written,
        });
    }
    Ok(())
}

fn read_exact<P: BulkPipe>(
    pipe: &mut P,
    phase: Phase,
    data: &mut [u8],
    timeout: Duration,
) -> Result<()> {
    let read = pipe
        .read_bulk(ENDPOINT_IN, data, timeout)
        .map_err(|source| Error::Transfer { phase, source })?;
    if read != data.len() {
        return Err(Error::ShortTransfer {
            phase,
            expected: data.len(),
            actual: read,
        });
    }
    Ok(())
}

/// Executes one command and returns the peer's return code.
pub fn execute<P: BulkPipe>(
    pipe: &mut P,
    command: &CommandBlock,
    data: DataPhase<'_>,
) -> Result<u8> {
    let envelope = build_envelope(command, data.len() as u32);
    write_exact(pipe, Phase::Command, &envelope, COMMAND_TIMEOUT)?;

    match data {
        DataPhase::None => {}
        DataPhase::Out(payload) => {
            write_exact(pipe, Phase::Data, payload, WRITE_TIMEOUT)?;
            debug!("Data phase: {} bytes out", payload.len());
        }
        DataPhase::In(payload) => {
            read_exact(pipe, Phase::Data, payload, READ_TIMEOUT)?;
            debug!("Data phase: {} bytes in", payload.len());
        }
    }

    let mut status = [0u8; STATUS_SIZE];
    retry(STATUS_ATTEMPTS, |_| {
        read_exact(pipe, Phase::Status, &mut status, STATUS_TIMEOUT)
    })?;

    let reply = StatusReply::from_bytes(status);
    if !reply.is_valid() {
        debug!(
            "Expected status signature {:02X?}, got {:02X?}",
            STATUS_SIGNATURE,
            reply.signature()
        );
        return Err(Error::StatusSignature(reply.signature()));
    }
    Ok(reply.return_code())
}

use serialport::SerialPort;
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use crate::transport::{Transport, TransportError};

const WRITE_CHUNK: usize = 4096;

/// Transport over a serial line (USB CDC or UART).
///
/// Writes are collected in memory and pushed to the port on `flush` or once
/// 4 KiB are pending.
pub struct SerialTransport {
    serial: Box<dyn SerialPort>,
    pending: Vec<u8>,
}

impl SerialTransport {
    /// Open `port` at `baud_rate`
    pub fn open(port: &str, baud_rate: u32) -> Result<Self, TransportError> {
        log::debug!("Opening serial port {} at {} baud", port, baud_rate);
        let serial = serialport::new(port, baud_rate)
            .timeout(Duration::from_millis(10))
            .open()?;

        let mut transport = Self::new(serial);
        transport.discard_input()?;
        Ok(transport)
    }

    /// Wrap an already opened port
    pub fn new(serial: Box<dyn SerialPort>) -> Self {
        Self {
            serial,
            pending: Vec::with_capacity(WRITE_CHUNK),
        }
    }

    /// Drop stale bytes the host sent before we were listening
    pub fn discard_input(&mut self) -> Result<(), TransportError> {
        self.serial.clear(serialport::ClearBuffer::Input)?;
        Ok(())
    }

    pub fn name(&self) -> Option<String> {
        self.serial.name()
    }
}

impl Transport for SerialTransport {
    fn available(&mut self) -> Result<usize, TransportError> {
        Ok(self.serial.bytes_to_read()? as usize)
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<(), TransportError> {
        let mut offset = 0;
        while offset < buf.len() {
            match self.serial.read(&mut buf[offset..]) {
                Ok(0) => return Err(TransportError::Exhausted),
                Ok(n) => offset += n,
                Err(ref e) if e.kind() == ErrorKind::TimedOut => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.pending.extend_from_slice(bytes);
        if self.pending.len() >= WRITE_CHUNK {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        if !self.pending.is_empty() {
            self.serial.write_all(&self.pending)?;
            self.pending.clear();
        }
        self.serial.flush()?;
        Ok(())
    }
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("port", &self.serial.name())
            .field("pending", &self.pending.len())
            .finish()
    }
}

use std::collections::VecDeque;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Serial port error: {0}")]
    SerialPort(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport input exhausted")]
    Exhausted,
}

/// Byte stream to the host.
///
/// `available` never blocks. Reads block until the bytes arrive. Writes may be
/// buffered until `flush`.
pub trait Transport {
    /// Number of bytes that can be read without blocking.
    fn available(&mut self) -> Result<usize, TransportError>;

    fn read_byte(&mut self) -> Result<u8, TransportError> {
        let mut byte = [0u8; 1];
        self.read_bytes(&mut byte)?;
        Ok(byte[0])
    }

    /// Fills `buf` completely.
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<(), TransportError>;

    fn write_byte(&mut self, byte: u8) -> Result<(), TransportError> {
        self.write_bytes(&[byte])
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Big-endian 32-bit word.
    fn write_word(&mut self, word: u32) -> Result<(), TransportError> {
        self.write_bytes(&word.to_be_bytes())
    }

    fn flush(&mut self) -> Result<(), TransportError>;
}

impl<X: Transport + ?Sized> Transport for &mut X {
    fn available(&mut self) -> Result<usize, TransportError> {
        (**self).available()
    }

    fn read_byte(&mut self) -> Result<u8, TransportError> {
        (**self).read_byte()
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<(), TransportError> {
        (**self).read_bytes(buf)
    }

    fn write_byte(&mut self, byte: u8) -> Result<(), TransportError> {
        (**self).write_byte(byte)
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        (**self).write_bytes(bytes)
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        (**self).flush()
    }
}

/// In-memory transport: the host side pushes input and inspects output.
///
/// A blocking read on drained input fails with `Exhausted` instead of hanging.
#[derive(Debug, Default, Clone)]
pub struct MemoryTransport {
    input: VecDeque<u8>,
    output: Vec<u8>,
    flushed: usize,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input(bytes: impl AsRef<[u8]>) -> Self {
        let mut transport = Self::new();
        transport.push_input(bytes);
        transport
    }

    pub fn push_input(&mut self, bytes: impl AsRef<[u8]>) {
        self.input.extend(bytes.as_ref());
    }

    pub fn pending_input(&self) -> usize {
        self.input.len()
    }

    /// Everything written so far, flushed or not.
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    /// Number of output bytes covered by the last `flush`.
    pub fn flushed(&self) -> usize {
        self.flushed
    }

    pub fn take_output(&mut self) -> Vec<u8> {
        self.flushed = 0;
        std::mem::take(&mut self.output)
    }
}

impl Transport for MemoryTransport {
    fn available(&mut self) -> Result<usize, TransportError> {
        Ok(self.input.len())
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<(), TransportError> {
        let n = buf.len();
        if self.input.len() < n {
            return Err(TransportError::Exhausted);
        }
        for (slot, byte) in buf.iter_mut().zip(self.input.drain(..n)) {
            *slot = byte;
        }
        Ok(())
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.output.extend_from_slice(bytes);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        self.flushed = self.output.len();
        Ok(())
    }
}

//! SUMP command decoding and encoding.
//!
//! Every command is one opcode byte. Long commands (opcodes with the high bit set)
//! are followed by a 4-byte argument. The opcode itself carries no length, so the
//! dispatcher decides per opcode whether to read the argument.

use std::time::Duration;

use embedded_hal::delay::DelayNs;

use crate::transport::{Transport, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Reset,
    Arm,
    Id,
    GetMetadata,
    Xon,
    Xoff,
    SetDivider,
    SetReadDelayCount,
    SetFlags,
    SetTriggerMask,
    SetTriggerValues,
    SetTriggerConfig,
}

/// Opcode byte with no known meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Unknown SUMP opcode 0x{0:02x}")]
pub struct UnknownOpcode(pub u8);

impl UnknownOpcode {
    /// Long commands carry a 4-byte argument even when unknown.
    pub fn is_long(&self) -> bool {
        self.0 & 0x80 != 0
    }
}

impl Opcode {
    pub fn as_u8(&self) -> u8 {
        match self {
            Opcode::Reset => 0x00,
            Opcode::Arm => 0x01,
            Opcode::Id => 0x02,
            Opcode::GetMetadata => 0x04,
            Opcode::Xon => 0x11,
            Opcode::Xoff => 0x13,
            Opcode::SetDivider => 0x80,
            Opcode::SetReadDelayCount => 0x81,
            Opcode::SetFlags => 0x82,
            Opcode::SetTriggerMask => 0xC0,
            Opcode::SetTriggerValues => 0xC1,
            Opcode::SetTriggerConfig => 0xC2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Opcode::Reset => "SUMP_RESET",
            Opcode::Arm => "SUMP_ARM",
            Opcode::Id => "SUMP_ID",
            Opcode::GetMetadata => "SUMP_GET_METADATA",
            Opcode::Xon => "SUMP_XON",
            Opcode::Xoff => "SUMP_XOFF",
            Opcode::SetDivider => "SUMP_SET_DIVIDER",
            Opcode::SetReadDelayCount => "SUMP_SET_READ_DELAY_COUNT",
            Opcode::SetFlags => "SUMP_SET_FLAGS",
            Opcode::SetTriggerMask => "SUMP_TRIGGER_MASK",
            Opcode::SetTriggerValues => "SUMP_TRIGGER_VALUES",
            Opcode::SetTriggerConfig => "SUMP_TRIGGER_CONFIG",
        }
    }
}

impl TryFrom<u8> for Opcode {
    type Error = UnknownOpcode;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0x00 => Ok(Opcode::Reset),
            0x01 => Ok(Opcode::Arm),
            0x02 => Ok(Opcode::Id),
            0x04 => Ok(Opcode::GetMetadata),
            0x11 => Ok(Opcode::Xon),
            0x13 => Ok(Opcode::Xoff),
            0x80 => Ok(Opcode::SetDivider),
            0x81 => Ok(Opcode::SetReadDelayCount),
            0x82 => Ok(Opcode::SetFlags),
            0xC0 => Ok(Opcode::SetTriggerMask),
            0xC1 => Ok(Opcode::SetTriggerValues),
            0xC2 => Ok(Opcode::SetTriggerConfig),
            other => Err(UnknownOpcode(other)),
        }
    }
}

/// The 4-byte argument of a long command, kept in wire (big-endian) order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandArg {
    bytes: [u8; 4],
}

impl CommandArg {
    pub fn from_raw(bytes: [u8; 4]) -> Self {
        Self { bytes }
    }

    pub fn raw(&self) -> &[u8; 4] {
        &self.bytes
    }

    /// Big-endian half-word `idx` (0 or 1) in host order. Any other index reads as 0.
    pub fn half_word(&self, idx: usize) -> u16 {
        match idx {
            0 => u16::from_be_bytes([self.bytes[0], self.bytes[1]]),
            1 => u16::from_be_bytes([self.bytes[2], self.bytes[3]]),
            _ => 0,
        }
    }

    /// The whole argument as a big-endian word in host order.
    pub fn word(&self) -> u32 {
        u32::from_be_bytes(self.bytes)
    }
}

/// Reads opcodes and arguments from a transport.
#[derive(Debug, Clone)]
pub struct CommandReader {
    settle: Duration,
}

impl CommandReader {
    pub fn new(settle: Duration) -> Self {
        Self { settle }
    }

    /// Next opcode byte, or `None` when nothing is pending. Never blocks.
    pub fn next_opcode<X: Transport>(
        &self,
        transport: &mut X,
    ) -> Result<Option<u8>, TransportError> {
        if transport.available()? == 0 {
            return Ok(None);
        }
        transport.read_byte().map(Some)
    }

    /// Reads exactly 4 argument bytes after giving a slow sender time to catch up.
    pub fn read_arg<X: Transport, D: DelayNs>(
        &self,
        transport: &mut X,
        delay: &mut D,
    ) -> Result<CommandArg, TransportError> {
        if !self.settle.is_zero() {
            delay.delay_us(u32::try_from(self.settle.as_micros()).unwrap_or(u32::MAX));
        }
        let mut bytes = [0u8; 4];
        transport.read_bytes(&mut bytes)?;
        Ok(CommandArg::from_raw(bytes))
    }
}

/// A host-side SUMP command, encodable to its exact wire form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Reset,
    Arm,
    Id,
    GetMetadata,
    SetDivider(u32),
    SetReadDelayCount { read_count: u16, delay_count: u16 },
    SetFlags([u8; 4]),
    SetTriggerMask([u8; 4]),
    SetTriggerValues([u8; 4]),
    SetTriggerConfig([u8; 4]),
}

impl Command {
    pub fn opcode(&self) -> Opcode {
        match self {
            Command::Reset => Opcode::Reset,
            Command::Arm => Opcode::Arm,
            Command::Id => Opcode::Id,
            Command::GetMetadata => Opcode::GetMetadata,
            Command::SetDivider(_) => Opcode::SetDivider,
            Command::SetReadDelayCount { .. } => Opcode::SetReadDelayCount,
            Command::SetFlags(_) => Opcode::SetFlags,
            Command::SetTriggerMask(_) => Opcode::SetTriggerMask,
            Command::SetTriggerValues(_) => Opcode::SetTriggerValues,
            Command::SetTriggerConfig(_) => Opcode::SetTriggerConfig,
        }
    }

    /// Continuous-capture flag set in a SET_FLAGS argument.
    pub fn continuous_flags() -> Self {
        Command::SetFlags([0x00, 0x40, 0x00, 0x00])
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![self.opcode().as_u8()];
        match self {
            Command::Reset | Command::Arm | Command::Id | Command::GetMetadata => {}
            Command::SetDivider(divider) => bytes.extend_from_slice(&divider.to_be_bytes()),
            Command::SetReadDelayCount {
                read_count,
                delay_count,
            } => {
                bytes.extend_from_slice(&read_count.to_be_bytes());
                bytes.extend_from_slice(&delay_count.to_be_bytes());
            }
            Command::SetFlags(arg)
            | Command::SetTriggerMask(arg)
            | Command::SetTriggerValues(arg)
            | Command::SetTriggerConfig(arg) => bytes.extend_from_slice(arg),
        }
        bytes
    }
}

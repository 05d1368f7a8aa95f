use std::fmt::Debug;
use std::ops::{BitAnd, BitOr, BitXor, Not};

use crate::command::CommandArg;

/// A fixed-width word holding the logic level of every captured pin at one instant.
///
/// Bit `i` of the word is pin `pin_start + i`. The width is fixed per build, so the
/// engine is generic over it instead of dispatching at runtime.
pub trait Sample:
    Copy
    + Default
    + Eq
    + Debug
    + BitAnd<Output = Self>
    + BitOr<Output = Self>
    + BitXor<Output = Self>
    + Not<Output = Self>
    + 'static
{
    /// Number of pins one word can hold.
    const BITS: u32;

    /// All pins low.
    const ZERO: Self;

    /// Decodes a pin bitmap from a 4-byte SUMP argument.
    fn from_command_arg(arg: &CommandArg) -> Self;

    /// Encodes a pin bitmap the way `from_command_arg` decodes it.
    fn to_command_arg(self) -> [u8; 4];

    /// Truncates a pin bitmap to this width.
    fn from_levels(levels: u32) -> Self;

    /// Widens to a bitmap with the pins in the low bits.
    fn to_levels(self) -> u32;

    /// The sample left-justified in a 32-bit word, as it is sent to the host.
    fn to_wire_word(self) -> u32 {
        self.to_levels() << (32 - Self::BITS)
    }

    /// Single pin as a one-bit mask, `ZERO` when `bit` is out of range.
    fn bit(bit: u32) -> Self {
        if bit < Self::BITS {
            Self::from_levels(1 << bit)
        } else {
            Self::ZERO
        }
    }
}

impl Sample for u8 {
    const BITS: u32 = u8::BITS;
    const ZERO: Self = 0;

    fn from_command_arg(arg: &CommandArg) -> Self {
        arg.raw()[0]
    }

    fn to_command_arg(self) -> [u8; 4] {
        [self, 0, 0, 0]
    }

    fn from_levels(levels: u32) -> Self {
        levels as Self
    }

    fn to_levels(self) -> u32 {
        u32::from(self)
    }
}

impl Sample for u16 {
    const BITS: u32 = u16::BITS;
    const ZERO: Self = 0;

    fn from_command_arg(arg: &CommandArg) -> Self {
        arg.half_word(0)
    }

    fn to_command_arg(self) -> [u8; 4] {
        let [hi, lo] = self.to_be_bytes();
        [hi, lo, 0, 0]
    }

    fn from_levels(levels: u32) -> Self {
        levels as Self
    }

    fn to_levels(self) -> u32 {
        u32::from(self)
    }
}

impl Sample for u32 {
    const BITS: u32 = u32::BITS;
    const ZERO: Self = 0;

    fn from_command_arg(arg: &CommandArg) -> Self {
        arg.word()
    }

    fn to_command_arg(self) -> [u8; 4] {
        self.to_be_bytes()
    }

    fn from_levels(levels: u32) -> Self {
        levels
    }

    fn to_levels(self) -> u32 {
        self
    }
}

use crate::command::Command;
use crate::sample::Sample;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitState {
    High,
    Low,
    DontCare,
}

/// Pins that must match (`mask`) and the level each must have (`values`).
///
/// An all-zero mask means capture starts without waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TriggerPattern<T: Sample> {
    pub mask: T,
    pub values: T,
}

impl<T: Sample> TriggerPattern<T> {
    pub fn new(mask: T, values: T) -> Self {
        Self { mask, values }
    }

    /// Starts immediately.
    pub fn immediate() -> Self {
        Self::new(T::ZERO, T::ZERO)
    }

    pub fn is_immediate(&self) -> bool {
        self.mask == T::ZERO
    }

    /// True when every masked pin of `sample` has the requested level.
    pub fn matches(&self, sample: T) -> bool {
        (self.values ^ sample) & self.mask == T::ZERO
    }

    /// The SET_TRIGGER_MASK and SET_TRIGGER_VALUES commands a host sends for this pattern.
    pub fn to_commands(&self) -> [Command; 2] {
        [
            Command::SetTriggerMask(self.mask.to_command_arg()),
            Command::SetTriggerValues(self.values.to_command_arg()),
        ]
    }
}

#[derive(Debug)]
pub struct TriggerBuilder<T: Sample> {
    mask: T,
    values: T,
}

impl<T: Sample> TriggerBuilder<T> {
    pub fn new() -> Self {
        Self {
            mask: T::ZERO,
            values: T::ZERO,
        }
    }

    pub fn start_capturing_when() -> Self {
        Self::new()
    }

    /// Bits beyond the sample width are ignored.
    pub fn bit(mut self, bit: u32, state: BitState) -> Self {
        if bit >= T::BITS {
            log::warn!(
                "Trigger bit {} out of range, must be between 0 and {}",
                bit,
                T::BITS - 1
            );
            return self;
        }
        let pin = T::bit(bit);
        match state {
            BitState::High => {
                self.mask = self.mask | pin;
                self.values = self.values | pin;
            }
            BitState::Low => {
                self.mask = self.mask | pin;
                self.values = self.values & !pin;
            }
            BitState::DontCare => {
                self.mask = self.mask & !pin;
                self.values = self.values & !pin;
            }
        }
        self
    }

    pub fn bit0(self, state: BitState) -> Self {
        self.bit(0, state)
    }

    pub fn bit1(self, state: BitState) -> Self {
        self.bit(1, state)
    }

    pub fn bit2(self, state: BitState) -> Self {
        self.bit(2, state)
    }

    pub fn bit3(self, state: BitState) -> Self {
        self.bit(3, state)
    }

    pub fn bit4(self, state: BitState) -> Self {
        self.bit(4, state)
    }

    pub fn bit5(self, state: BitState) -> Self {
        self.bit(5, state)
    }

    pub fn bit6(self, state: BitState) -> Self {
        self.bit(6, state)
    }

    pub fn bit7(self, state: BitState) -> Self {
        self.bit(7, state)
    }

    pub fn matching(self) -> TriggerPattern<T> {
        TriggerPattern::new(self.mask, self.values)
    }
}

impl<T: Sample> Default for TriggerBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_mask_and_values() {
        let trigger = TriggerBuilder::<u8>::start_capturing_when()
            .bit0(BitState::High)
            .bit1(BitState::Low)
            .bit2(BitState::DontCare)
            .bit7(BitState::High)
            .matching();
        assert_eq!(trigger.mask, 0b1000_0011);
        assert_eq!(trigger.values, 0b1000_0001);
    }

    #[test]
    fn test_later_state_overrides_earlier() {
        let trigger = TriggerBuilder::<u8>::new()
            .bit3(BitState::High)
            .bit3(BitState::DontCare)
            .matching();
        assert!(trigger.is_immediate());
        assert_eq!(trigger.values, 0);
    }

    #[test]
    fn test_out_of_range_bit_ignored() {
        let trigger = TriggerBuilder::<u8>::new().bit(12, BitState::High).matching();
        assert_eq!(trigger, TriggerPattern::immediate());
    }

    #[test]
    fn test_matches_only_masked_bits() {
        let trigger = TriggerPattern::<u8>::new(0b0000_0101, 0b0000_0001);
        assert!(trigger.matches(0b0000_0001));
        assert!(trigger.matches(0b1111_1011));
        assert!(!trigger.matches(0b0000_0101));
        assert!(!trigger.matches(0b0000_0000));
    }

    #[test]
    fn test_immediate_matches_everything() {
        let trigger = TriggerPattern::<u32>::immediate();
        assert!(trigger.matches(0));
        assert!(trigger.matches(u32::MAX));
    }

    #[test]
    fn test_to_commands() {
        let trigger = TriggerPattern::<u16>::new(0x0102, 0x0100);
        assert_eq!(
            trigger.to_commands(),
            [
                Command::SetTriggerMask([0x01, 0x02, 0, 0]),
                Command::SetTriggerValues([0x01, 0x00, 0, 0]),
            ]
        );
    }
}

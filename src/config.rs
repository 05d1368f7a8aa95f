use std::time::Duration;

use crate::sample::Sample;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("At least one pin must be captured")]
    NoPins,

    #[error("{pin_count} pins do not fit in a {bits} bit sample")]
    TooManyPins { pin_count: u8, bits: u32 },

    #[error("Device id must be 4 ASCII bytes")]
    InvalidDeviceId,

    #[error("Description must not contain NUL bytes")]
    InvalidDescription,

    #[error("Paced threshold {threshold} Hz is above the max frequency {max} Hz")]
    ThresholdAboveMax { threshold: u64, max: u64 },
}

/// Static limits of the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzerConfig {
    /// Ring buffer capacity, also the clamp for read and delay counts.
    pub max_capture_size: usize,
    /// Advertised sample rate in Hz.
    pub max_frequency: u64,
    /// Requested rates at or above this use the unpaced loop.
    pub max_paced_frequency: u64,
    pub pin_start: u8,
    pub pin_count: u8,
    pub description: String,
    pub device_id: [u8; 4],
    /// Repeated resets within this window are absorbed.
    pub reset_debounce: Duration,
    /// Wait before reading a 4-byte argument.
    pub command_settle: Duration,
}

impl AnalyzerConfig {
    pub const DEFAULT_CAPTURE_SIZE: usize = 1000;
    pub const DEFAULT_MAX_FREQUENCY: u64 = 1_000_000;

    pub fn new(max_capture_size: usize) -> Self {
        Self {
            max_capture_size,
            ..Self::default()
        }
    }

    pub fn with_max_frequency(mut self, hz: u64) -> Self {
        self.max_frequency = hz;
        self
    }

    pub fn with_max_paced_frequency(mut self, hz: u64) -> Self {
        self.max_paced_frequency = hz;
        self
    }

    pub fn with_pins(mut self, pin_start: u8, pin_count: u8) -> Self {
        self.pin_start = pin_start;
        self.pin_count = pin_count;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_device_id(mut self, device_id: [u8; 4]) -> Self {
        self.device_id = device_id;
        self
    }

    pub fn with_reset_debounce(mut self, window: Duration) -> Self {
        self.reset_debounce = window;
        self
    }

    pub fn with_command_settle(mut self, settle: Duration) -> Self {
        self.command_settle = settle;
        self
    }

    pub fn validate<T: Sample>(&self) -> Result<(), ConfigError> {
        if self.pin_count == 0 {
            return Err(ConfigError::NoPins);
        }
        if u32::from(self.pin_count) > T::BITS {
            return Err(ConfigError::TooManyPins {
                pin_count: self.pin_count,
                bits: T::BITS,
            });
        }
        if !self.device_id.is_ascii() {
            return Err(ConfigError::InvalidDeviceId);
        }
        if self.description.contains('\0') {
            return Err(ConfigError::InvalidDescription);
        }
        if self.max_paced_frequency > self.max_frequency {
            return Err(ConfigError::ThresholdAboveMax {
                threshold: self.max_paced_frequency,
                max: self.max_frequency,
            });
        }
        Ok(())
    }
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            max_capture_size: Self::DEFAULT_CAPTURE_SIZE,
            max_frequency: Self::DEFAULT_MAX_FREQUENCY,
            max_paced_frequency: Self::DEFAULT_MAX_FREQUENCY,
            pin_start: 0,
            pin_count: 8,
            description: "RUST-SUMP".to_string(),
            device_id: *b"1ALS",
            reset_debounce: Duration::from_millis(500),
            command_settle: Duration::from_millis(10),
        }
    }
}

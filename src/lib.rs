//! # SUMP Analyzer
//!
//! Device side of the SUMP logic analyzer protocol, as spoken by PulseView (sigrok)
//! and the OLS client.
//!
//! The host configures a capture with a handful of one and five byte commands, arms
//! it, and gets the samples back as 32-bit big-endian words. This crate implements
//! everything between the byte stream and the pins:
//!
//! - **Protocol dispatch**: [`LogicAnalyzer`] reads commands and answers ID and metadata queries
//! - **Capture engine**: trigger matching, pre-trigger history, paced and unpaced sampling
//! - **Continuous mode**: samples streamed straight to the host until canceled
//! - **Ring buffer**: fixed capacity, oldest samples overwritten
//! - **Transports**: serial ports via `serialport`, in-memory for tests and simulations
//! - **Pins**: any closure, or a set of `embedded-hal` input pins
//! - **Hardware capture**: plug in a DMA or PIO sampler through [`CaptureBackend`]
//!
//! ## Examples
//!
//! ### Scripted Session
//!
//! ```rust
//! use sump_analyzer::{AnalyzerConfig, Command, LogicAnalyzer, MemoryTransport, NoDelay};
//!
//! let mut counter = 0u8;
//! let pins = move || {
//!     counter = counter.wrapping_add(1);
//!     counter
//! };
//!
//! let mut analyzer =
//!     LogicAnalyzer::new(AnalyzerConfig::default(), MemoryTransport::new(), pins, NoDelay)?;
//!
//! for command in [
//!     Command::SetReadDelayCount { read_count: 4, delay_count: 4 },
//!     Command::Arm,
//! ] {
//!     analyzer.transport_mut().push_input(command.to_bytes());
//! }
//! analyzer.process_pending()?;
//!
//! // Each 8-bit sample sits in the high byte of its word
//! assert_eq!(&analyzer.transport().output()[..4], &[1, 0, 0, 0]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Trigger Pattern
//!
//! ```rust
//! use sump_analyzer::{BitState, TriggerBuilder};
//!
//! let trigger = TriggerBuilder::<u8>::start_capturing_when()
//!     .bit0(BitState::High)
//!     .bit3(BitState::Low)
//!     .matching();
//!
//! assert!(trigger.matches(0b0000_0001));
//! assert!(!trigger.matches(0b0000_1001));
//! ```
//!
//! ### Serial Device
//!
//! ```rust,no_run
//! use sump_analyzer::{AnalyzerConfig, LogicAnalyzer, SerialTransport, SpinDelay};
//!
//! let transport = SerialTransport::open("/dev/ttyACM0", 115_200)?;
//! let pins = || 0u16;
//! let config = AnalyzerConfig::new(4096).with_pins(0, 16);
//! let mut analyzer = LogicAnalyzer::new(config, transport, pins, SpinDelay)?;
//!
//! loop {
//!     if !analyzer.process_command()? {
//!         std::thread::yield_now();
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod backend;
pub mod capture_engine;
pub mod command;
pub mod config;
pub mod delay;
pub mod event;
pub mod logic_analyzer;
pub mod pin_reader;
pub mod ring_buffer;
pub mod sample;
pub mod serial_transport;
pub mod transport;
pub mod trigger_config;

// Re-export the main types for convenience
pub use backend::{CancelHandle, CaptureBackend, CaptureParams};

pub use capture_engine::{CaptureEngine, CaptureOutcome, CaptureSession, Speed, Status};

pub use command::{Command, CommandArg, CommandReader, Opcode, UnknownOpcode};

pub use config::{AnalyzerConfig, ConfigError};

pub use delay::{NoDelay, SpinDelay};

pub use event::{Event, EventBus};

pub use logic_analyzer::{AnalyzerError, LogicAnalyzer};

pub use pin_reader::{GpioPinReader, PinReader};

pub use ring_buffer::RingBuffer;

pub use sample::Sample;

pub use serial_transport::SerialTransport;

pub use transport::{MemoryTransport, Transport, TransportError};

pub use trigger_config::{BitState, TriggerBuilder, TriggerPattern};

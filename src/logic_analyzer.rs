//! SUMP protocol dispatcher.
//!
//! When a host connects it sends RESET (several times), ID and GET_METADATA to
//! identify the device. Pressing capture sends the trigger, divider, count and flag
//! settings followed by ARM. Once ARM starts a capture no further command byte is
//! read until the capture is over.

use std::time::Instant;

use embedded_hal::delay::DelayNs;

use crate::backend::{CancelHandle, CaptureBackend};
use crate::capture_engine::{CaptureEngine, CaptureOutcome, CaptureSession, Status};
use crate::command::{CommandArg, CommandReader, Opcode, UnknownOpcode};
use crate::config::{AnalyzerConfig, ConfigError};
use crate::event::{Event, EventBus};
use crate::pin_reader::PinReader;
use crate::ring_buffer::RingBuffer;
use crate::sample::Sample;
use crate::transport::{Transport, TransportError};

/// Metadata tags of the extended SUMP (OLS) `GET_METADATA` reply.
mod metadata {
    pub const DEVICE_NAME: u8 = 0x01;
    pub const FIRMWARE_VERSION: u8 = 0x02;
    pub const PROBE_COUNT: u8 = 0x20;
    pub const SAMPLE_MEMORY: u8 = 0x21;
    pub const SAMPLE_RATE: u8 = 0x23;
    pub const PROTOCOL_VERSION: u8 = 0x41;
    pub const END: u8 = 0x00;
}

const PROTOCOL_VERSION: u8 = 0x02;

/// SET_FLAGS bits in argument byte 1.
const FLAG_CONTINUOUS: u8 = 0x40;
const FLAG_RLE: u8 = 0x01;

#[derive(Debug, thiserror::Error)]
pub enum AnalyzerError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

pub struct LogicAnalyzer<T: Sample, X, P, D> {
    config: AnalyzerConfig,
    engine: CaptureEngine<T, P, D>,
    transport: X,
    reader: CommandReader,
    events: EventBus,
    last_reset: Option<Instant>,
    last_outcome: Option<CaptureOutcome>,
}

impl<T, X, P, D> LogicAnalyzer<T, X, P, D>
where
    T: Sample,
    X: Transport,
    P: PinReader<T>,
    D: DelayNs,
{
    /// Sets up the analyzer in `Stopped` state.
    ///
    /// `pins` samples the configured pins and `delay` paces slow captures.
    pub fn new(
        config: AnalyzerConfig,
        transport: X,
        pins: P,
        delay: D,
    ) -> Result<Self, AnalyzerError> {
        config.validate::<T>()?;
        log::info!(
            "Logic analyzer: {} pins from {}, {} samples, max {} Hz",
            config.pin_count,
            config.pin_start,
            config.max_capture_size,
            config.max_frequency
        );

        let engine = CaptureEngine::new(&config, pins, delay);
        Ok(Self {
            reader: CommandReader::new(config.command_settle),
            config,
            engine,
            transport,
            events: EventBus::new(),
            last_reset: None,
            last_outcome: None,
        })
    }

    pub fn with_backend(mut self, backend: Box<dyn CaptureBackend<T>>) -> Self {
        self.engine.set_backend(Some(backend));
        self
    }

    pub fn with_cancel_handle(mut self, cancel: CancelHandle) -> Self {
        self.engine = self.engine.with_cancel_handle(cancel);
        self
    }

    /// Replaces the event subscriber.
    pub fn set_event_handler<F>(&mut self, handler: F)
    where
        F: FnMut(Event) + 'static,
    {
        self.events.subscribe(handler);
    }

    pub fn status(&self) -> Status {
        self.engine.status()
    }

    pub fn session(&self) -> &CaptureSession<T> {
        self.engine.session()
    }

    pub fn buffer(&self) -> &RingBuffer<T> {
        self.engine.buffer()
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.engine.cancel_handle()
    }

    pub fn engine_mut(&mut self) -> &mut CaptureEngine<T, P, D> {
        &mut self.engine
    }

    pub fn transport(&self) -> &X {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut X {
        &mut self.transport
    }

    pub fn into_transport(self) -> X {
        self.transport
    }

    /// Result of the most recent ARM.
    pub fn last_outcome(&self) -> Option<CaptureOutcome> {
        self.last_outcome
    }

    /// Handles the next pending command, if any. Returns whether one was handled.
    pub fn process_command(&mut self) -> Result<bool, AnalyzerError> {
        match self.reader.next_opcode(&mut self.transport)? {
            Some(byte) => {
                self.process_opcode(byte)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Handles every command already waiting on the transport.
    pub fn process_pending(&mut self) -> Result<usize, AnalyzerError> {
        let mut handled = 0;
        while self.process_command()? {
            handled += 1;
        }
        Ok(handled)
    }

    pub fn process_opcode(&mut self, byte: u8) -> Result<(), AnalyzerError> {
        let opcode = match Opcode::try_from(byte) {
            Ok(opcode) => opcode,
            Err(unknown) => return self.skip_unknown(unknown),
        };
        log::debug!("->{}", opcode.as_str());

        match opcode {
            Opcode::Reset => self.reset(),
            Opcode::Id => {
                self.transport.write_bytes(&self.config.device_id)?;
                self.transport.flush()?;
            }
            Opcode::GetMetadata => self.send_metadata()?,
            Opcode::Arm => self.arm()?,
            Opcode::Xon | Opcode::Xoff => {
                log::trace!("flow control ignored");
            }
            Opcode::SetTriggerMask => {
                let mask = T::from_command_arg(&self.read_arg()?);
                self.engine.set_trigger_mask(mask, &mut self.events);
            }
            Opcode::SetTriggerValues => {
                let values = T::from_command_arg(&self.read_arg()?);
                self.engine.set_trigger_values(values, &mut self.events);
            }
            Opcode::SetTriggerConfig => {
                self.read_arg()?;
            }
            Opcode::SetDivider => {
                let divider = self.read_arg()?.word();
                self.engine.set_divider(divider, &mut self.events);
            }
            Opcode::SetReadDelayCount => {
                let arg = self.read_arg()?;
                self.engine.set_read_delay_count(
                    usize::from(arg.half_word(0)),
                    usize::from(arg.half_word(1)),
                    &mut self.events,
                );
            }
            Opcode::SetFlags => {
                let flags = self.read_arg()?.raw()[1];
                if flags & FLAG_RLE != 0 {
                    log::warn!("RLE requested but not supported, sending raw samples");
                }
                self.engine
                    .set_continuous(flags & FLAG_CONTINUOUS != 0, &mut self.events);
            }
        }
        Ok(())
    }

    /// Resets are sent in bursts, so one arriving within the debounce window of the
    /// last accepted reset is dropped.
    fn reset(&mut self) {
        let now = Instant::now();
        if let Some(last) = self.last_reset {
            if now.duration_since(last) < self.config.reset_debounce {
                log::trace!("reset debounced");
                return;
            }
        }
        self.last_reset = Some(now);
        self.last_outcome = None;
        self.engine.reset(&mut self.events);
    }

    fn arm(&mut self) -> Result<(), AnalyzerError> {
        self.engine.arm(&mut self.events);
        let speed = self.engine.speed_for(self.config.max_paced_frequency);
        let outcome = self
            .engine
            .capture(&mut self.transport, &mut self.events, speed, true)?;
        self.last_outcome = Some(outcome);
        Ok(())
    }

    fn send_metadata(&mut self) -> Result<(), TransportError> {
        let x = &mut self.transport;
        write_string(x, metadata::DEVICE_NAME, &self.config.description)?;
        write_string(x, metadata::FIRMWARE_VERSION, env!("CARGO_PKG_VERSION"))?;
        write_u32(x, metadata::PROBE_COUNT, u32::from(self.config.pin_count))?;
        write_u32(
            x,
            metadata::SAMPLE_MEMORY,
            u32::try_from(self.config.max_capture_size).unwrap_or(u32::MAX),
        )?;
        write_u32(
            x,
            metadata::SAMPLE_RATE,
            u32::try_from(self.config.max_frequency).unwrap_or(u32::MAX),
        )?;
        x.write_bytes(&[metadata::PROTOCOL_VERSION, PROTOCOL_VERSION, metadata::END])?;
        x.flush()
    }

    fn read_arg(&mut self) -> Result<CommandArg, TransportError> {
        self.reader
            .read_arg(&mut self.transport, self.engine.delay_mut())
    }

    fn skip_unknown(&mut self, unknown: UnknownOpcode) -> Result<(), AnalyzerError> {
        log::warn!("->UNHANDLED command: 0x{:02x}", unknown.0);
        if unknown.is_long() {
            self.read_arg()?;
        }
        Ok(())
    }
}

fn write_string<X: Transport>(x: &mut X, tag: u8, value: &str) -> Result<(), TransportError> {
    x.write_byte(tag)?;
    x.write_bytes(value.as_bytes())?;
    x.write_byte(0)
}

fn write_u32<X: Transport>(x: &mut X, tag: u8, value: u32) -> Result<(), TransportError> {
    x.write_byte(tag)?;
    x.write_word(value)
}

impl<T: Sample, X, P, D> std::fmt::Debug for LogicAnalyzer<T, X, P, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogicAnalyzer")
            .field("config", &self.config)
            .field("engine", &self.engine)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

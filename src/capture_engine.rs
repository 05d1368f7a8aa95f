//! Trigger wait, pre/post-trigger windowing and the sampling loops.
//!
//! A capture runs to completion on the calling thread. The only way to stop it early
//! is the [`CancelHandle`], which every loop polls between samples.

use embedded_hal::delay::DelayNs;

use crate::backend::{CancelHandle, CaptureBackend, CaptureParams};
use crate::config::AnalyzerConfig;
use crate::event::{Event, EventBus};
use crate::pin_reader::PinReader;
use crate::ring_buffer::RingBuffer;
use crate::sample::Sample;
use crate::transport::{Transport, TransportError};
use crate::trigger_config::TriggerPattern;

/// Reference clock the SUMP divider is relative to.
pub const SUMP_CLOCK_HZ: u64 = 100_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Armed,
    Triggered,
    Stopped,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Armed => "ARMED",
            Status::Triggered => "TRIGGERED",
            Status::Stopped => "STOPPED",
        }
    }
}

/// Paced sampling waits `delay_time_us` after every sample, `Max` never waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speed {
    Paced,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// Batch capture filled the buffer; `samples` were dumped (or left in the buffer).
    Completed { samples: usize },
    /// Continuous capture ended after streaming `samples` words.
    Streamed { samples: usize },
    /// Batch capture aborted; only the sentinel word was sent.
    Canceled,
}

/// Settings of the current capture, mutated by commands and by the capture loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSession<T: Sample> {
    pub status: Status,
    /// Total samples to return.
    pub read_count: usize,
    /// Samples to take after the trigger fired.
    pub delay_count: usize,
    pub trigger: TriggerPattern<T>,
    pub capture_frequency: u64,
    pub delay_time_us: u32,
    pub continuous: bool,
}

impl<T: Sample> CaptureSession<T> {
    pub fn new(config: &AnalyzerConfig) -> Self {
        let capture_frequency = config.max_frequency.max(1);
        Self {
            status: Status::Stopped,
            read_count: config.max_capture_size,
            delay_count: config.max_capture_size,
            trigger: TriggerPattern::immediate(),
            capture_frequency,
            delay_time_us: inter_sample_delay_us(capture_frequency),
            continuous: false,
        }
    }
}

/// Sample rate requested by a SUMP divider, never below 1 Hz.
pub fn divider_to_frequency(divider: u32) -> u64 {
    (SUMP_CLOCK_HZ / (u64::from(divider) + 1)).max(1)
}

/// Microseconds to wait between paced samples at `frequency` Hz.
pub fn inter_sample_delay_us(frequency: u64) -> u32 {
    let delay = (1_000_000 / frequency.max(1)).saturating_sub(1);
    u32::try_from(delay).unwrap_or(u32::MAX)
}

pub struct CaptureEngine<T: Sample, P, D> {
    buffer: RingBuffer<T>,
    pins: P,
    delay: D,
    session: CaptureSession<T>,
    defaults: CaptureSession<T>,
    max_capture_size: usize,
    pin_start: u8,
    pin_count: u8,
    backend: Option<Box<dyn CaptureBackend<T>>>,
    cancel: CancelHandle,
}

impl<T, P, D> CaptureEngine<T, P, D>
where
    T: Sample,
    P: PinReader<T>,
    D: DelayNs,
{
    pub fn new(config: &AnalyzerConfig, pins: P, delay: D) -> Self {
        let session = CaptureSession::new(config);
        Self {
            buffer: RingBuffer::new(config.max_capture_size),
            pins,
            delay,
            defaults: session.clone(),
            session,
            max_capture_size: config.max_capture_size,
            pin_start: config.pin_start,
            pin_count: config.pin_count,
            backend: None,
            cancel: CancelHandle::new(),
        }
    }

    /// Share an abort flag created elsewhere (e.g. owned by an interrupt handler).
    pub fn with_cancel_handle(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_backend(mut self, backend: Box<dyn CaptureBackend<T>>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn set_backend(&mut self, backend: Option<Box<dyn CaptureBackend<T>>>) {
        self.backend = backend;
    }

    pub fn status(&self) -> Status {
        self.session.status
    }

    pub fn session(&self) -> &CaptureSession<T> {
        &self.session
    }

    pub fn buffer(&self) -> &RingBuffer<T> {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut RingBuffer<T> {
        &mut self.buffer
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn pins_mut(&mut self) -> &mut P {
        &mut self.pins
    }

    pub(crate) fn delay_mut(&mut self) -> &mut D {
        &mut self.delay
    }

    pub fn set_status(&mut self, status: Status, events: &mut EventBus) {
        log::debug!("status: {}", status.as_str());
        self.session.status = status;
        events.raise(Event::Status);
    }

    pub fn set_trigger_mask(&mut self, mask: T, events: &mut EventBus) {
        log::debug!("--> trigger mask: {:?}", mask);
        self.session.trigger.mask = mask;
        events.raise(Event::TriggerMask);
    }

    pub fn set_trigger_values(&mut self, values: T, events: &mut EventBus) {
        log::debug!("--> trigger values: {:?}", values);
        self.session.trigger.values = values;
        events.raise(Event::TriggerValues);
    }

    pub fn set_trigger(&mut self, trigger: TriggerPattern<T>, events: &mut EventBus) {
        self.set_trigger_mask(trigger.mask, events);
        self.set_trigger_values(trigger.values, events);
    }

    /// Both counts are clamped to the buffer capacity.
    pub fn set_read_delay_count(
        &mut self,
        read_count: usize,
        delay_count: usize,
        events: &mut EventBus,
    ) {
        self.session.read_count = read_count.min(self.max_capture_size);
        self.session.delay_count = delay_count.min(self.max_capture_size);
        log::debug!("--> read_count: {}", self.session.read_count);
        log::debug!("--> delay_count: {}", self.session.delay_count);
        events.raise(Event::ReadDelayCount);
    }

    pub fn set_capture_frequency(&mut self, frequency: u64, events: &mut EventBus) {
        let frequency = frequency.max(1);
        self.session.capture_frequency = frequency;
        self.session.delay_time_us = inter_sample_delay_us(frequency);
        log::debug!("--> capture frequency: {} Hz", frequency);
        log::debug!("--> delay_time_us: {}", self.session.delay_time_us);
        events.raise(Event::CaptureFrequency);
    }

    pub fn set_divider(&mut self, divider: u32, events: &mut EventBus) {
        log::debug!("--> divider: {}", divider);
        self.set_capture_frequency(divider_to_frequency(divider), events);
    }

    pub fn set_continuous(&mut self, continuous: bool, events: &mut EventBus) {
        log::debug!("--> continuous capture: {}", continuous);
        self.session.continuous = continuous;
        events.raise(Event::Flags);
    }

    /// Stops, zero-fills the buffer and restores the session defaults.
    pub fn reset(&mut self, events: &mut EventBus) {
        self.cancel.clear();
        self.set_status(Status::Stopped, events);
        self.buffer.reset();
        self.session = self.defaults.clone();
        events.raise(Event::Reset);
    }

    /// Prepares a new capture: clears a stale abort and enters `Armed`.
    pub fn arm(&mut self, events: &mut EventBus) {
        self.cancel.clear();
        self.buffer.clear_ignore();
        self.set_status(Status::Armed, events);
    }

    /// Unpaced sampling is used at or above `threshold` Hz.
    pub fn speed_for(&self, threshold: u64) -> Speed {
        if self.session.capture_frequency >= threshold {
            Speed::Max
        } else {
            Speed::Paced
        }
    }

    /// Runs a full capture: trigger wait, windowing, sampling and (optionally) the dump.
    ///
    /// The status is `Stopped` when this returns, also on error.
    pub fn capture<X: Transport>(
        &mut self,
        transport: &mut X,
        events: &mut EventBus,
        speed: Speed,
        dump: bool,
    ) -> Result<CaptureOutcome, TransportError> {
        #[cfg(feature = "cpu-profiling")]
        let _span = tracy_client::Client::running()
            .map(|client| client.span(tracy_client::span_location!("capture"), 0));

        let outcome = self.run_capture(transport, events, speed, dump);
        if self.session.status != Status::Stopped {
            self.set_status(Status::Stopped, events);
        }
        outcome
    }

    fn run_capture<X: Transport>(
        &mut self,
        transport: &mut X,
        events: &mut EventBus,
        speed: Speed,
        dump: bool,
    ) -> Result<CaptureOutcome, TransportError> {
        log::debug!("capture(trigger)");
        if !self.wait_for_trigger(speed) {
            return self.finish_canceled(transport, events, dump);
        }
        self.set_status(Status::Triggered, events);

        log::debug!("capture(buffer)");
        self.apply_window();

        if self.session.continuous {
            let samples = self.stream(transport, speed)?;
            self.set_status(Status::Stopped, events);
            log::debug!("continuous capture stopped after {} samples", samples);
            return Ok(CaptureOutcome::Streamed { samples });
        }

        if speed == Speed::Max && self.backend.is_some() {
            self.capture_with_backend();
        } else {
            self.fill_buffer(speed);
        }
        if self.buffer.ignore_count() > 0 {
            log::debug!("dropping {} pending skips", self.buffer.ignore_count());
            self.buffer.clear_ignore();
        }
        if self.cancel.is_cancelled() {
            return self.finish_canceled(transport, events, dump);
        }

        self.set_status(Status::Stopped, events);
        let samples = self.buffer.available();
        log::debug!("capture-done: {}", samples);
        events.raise(Event::CaptureSize);
        if dump {
            self.dump(transport)?;
        }
        Ok(CaptureOutcome::Completed { samples })
    }

    /// Samples until the trigger matches. Returns false when canceled first.
    ///
    /// In batch mode every sample read here is kept as pre-trigger history.
    fn wait_for_trigger(&mut self, speed: Speed) -> bool {
        let trigger = self.session.trigger;
        if trigger.is_immediate() {
            return true;
        }

        log::debug!("waiting for trigger");
        let keep_history = !self.session.continuous;
        loop {
            if self.cancel.is_cancelled() {
                return false;
            }
            let sample = self.pins.read_all();
            if keep_history {
                self.buffer.write(sample);
            }
            if trigger.matches(sample) {
                log::debug!("triggered");
                return true;
            }
            if speed == Speed::Paced {
                self.delay.delay_us(self.session.delay_time_us);
            }
        }
    }

    /// Trims the buffer so `read_count` samples are reached after `delay_count`
    /// post-trigger samples.
    fn apply_window(&mut self) {
        let read_count = self.session.read_count;
        let delay_count = self.session.delay_count;
        let available = self.buffer.available();

        match read_count.cmp(&delay_count) {
            std::cmp::Ordering::Greater => {
                let keep = read_count - delay_count;
                if available > keep {
                    log::debug!("keeping last {} entries", keep);
                    self.buffer.clear_n(available - keep);
                }
            }
            std::cmp::Ordering::Less => {
                let ignore = delay_count - read_count;
                log::debug!("ignoring first {} entries", ignore);
                self.buffer.clear_n(available + ignore);
            }
            std::cmp::Ordering::Equal => {
                log::debug!("starting with clean buffer");
                self.buffer.clear();
            }
        }
    }

    fn fill_buffer(&mut self, speed: Speed) {
        let target = self.session.read_count.min(self.buffer.size());
        log::debug!("capturing {} entries", target);

        match speed {
            Speed::Paced => {
                let delay_us = self.session.delay_time_us;
                while self.buffer.available() < target && !self.cancel.is_cancelled() {
                    self.buffer.write(self.pins.read_all());
                    self.delay.delay_us(delay_us);
                }
            }
            Speed::Max => {
                while self.buffer.available() < target && !self.cancel.is_cancelled() {
                    self.buffer.write(self.pins.read_all());
                }
            }
        }
    }

    /// The backend writes through the ring buffer, so the request covers the
    /// samples still missing plus the skips armed by the window.
    fn capture_with_backend(&mut self) {
        let missing = self
            .session
            .read_count
            .min(self.buffer.size())
            .saturating_sub(self.buffer.available());
        let params = CaptureParams {
            pin_start: self.pin_start,
            pin_count: self.pin_count,
            sample_count: (missing + self.buffer.ignore_count()).min(self.buffer.size()),
            frequency: self.session.capture_frequency,
            cancel: self.cancel.clone(),
        };
        if let Some(backend) = self.backend.as_mut() {
            log::debug!("capturing {} entries with hardware backend", params.sample_count);
            backend.start(&params);
            let captured = backend.wait_until_complete(&mut self.buffer);
            if self.cancel.is_cancelled() {
                log::debug!("hardware capture canceled after {} entries", captured);
                backend.cancel();
            }
        }
    }

    /// Streams every sample straight to the host until canceled.
    fn stream<X: Transport>(
        &mut self,
        transport: &mut X,
        speed: Speed,
    ) -> Result<usize, TransportError> {
        log::debug!("continuous capturing");
        let mut samples = 0;
        match speed {
            Speed::Paced => {
                let delay_us = self.session.delay_time_us;
                while !self.cancel.is_cancelled() {
                    transport.write_word(self.pins.read_all().to_wire_word())?;
                    samples += 1;
                    self.delay.delay_us(delay_us);
                }
            }
            Speed::Max => {
                while !self.cancel.is_cancelled() {
                    transport.write_word(self.pins.read_all().to_wire_word())?;
                    samples += 1;
                }
            }
        }
        transport.flush()?;
        Ok(samples)
    }

    /// Sends the whole buffer, oldest sample first.
    pub fn dump<X: Transport>(&mut self, transport: &mut X) -> Result<usize, TransportError> {
        log::debug!("dumpData: {}", self.buffer.available());
        let mut sent = 0;
        for sample in self.buffer.drain() {
            transport.write_word(sample.to_wire_word())?;
            sent += 1;
        }
        transport.flush()?;
        Ok(sent)
    }

    /// Drops what was captured and unblocks the host with a single zero word.
    fn finish_canceled<X: Transport>(
        &mut self,
        transport: &mut X,
        events: &mut EventBus,
        dump: bool,
    ) -> Result<CaptureOutcome, TransportError> {
        log::info!("capture canceled");
        self.buffer.clear();
        self.set_status(Status::Stopped, events);
        if dump {
            transport.write_word(0)?;
            transport.flush()?;
        }
        Ok(CaptureOutcome::Canceled)
    }
}

impl<T: Sample, P, D> std::fmt::Debug for CaptureEngine<T, P, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureEngine")
            .field("session", &self.session)
            .field("available", &self.buffer.available())
            .field("size", &self.buffer.size())
            .field("backend", &self.backend.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delay::NoDelay;
    use crate::transport::MemoryTransport;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Pin reader yielding 0, 1, 2, ... and counting reads.
    fn counter() -> (impl FnMut() -> u8, Rc<RefCell<usize>>) {
        let reads = Rc::new(RefCell::new(0usize));
        let seen = Rc::clone(&reads);
        let reader = move || {
            let mut n = seen.borrow_mut();
            let value = *n as u8;
            *n += 1;
            value
        };
        (reader, reads)
    }

    /// Pin reader yielding 0, 1, 2, ... that sets `cancel` on read number `after`.
    fn canceling_counter(cancel: CancelHandle, after: usize) -> impl FnMut() -> u8 {
        let mut n = 0usize;
        move || {
            n += 1;
            if n == after {
                cancel.cancel();
            }
            (n - 1) as u8
        }
    }

    #[derive(Default)]
    struct RecordingDelay {
        calls: Vec<u32>,
    }

    impl DelayNs for RecordingDelay {
        fn delay_ns(&mut self, ns: u32) {
            self.calls.push(ns);
        }
    }

    fn config(capacity: usize) -> AnalyzerConfig {
        AnalyzerConfig::new(capacity)
    }

    fn words(output: &[u8]) -> Vec<u32> {
        output
            .chunks_exact(4)
            .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    fn dumped_samples(output: &[u8]) -> Vec<u8> {
        words(output).into_iter().map(|w| (w >> 24) as u8).collect()
    }

    #[test]
    fn test_divider_to_frequency() {
        assert_eq!(divider_to_frequency(99), 1_000_000);
        assert_eq!(inter_sample_delay_us(1_000_000), 0);
        assert_eq!(divider_to_frequency(199), 500_000);
        assert_eq!(inter_sample_delay_us(500_000), 1);
        assert_eq!(divider_to_frequency(u32::MAX), 1);
        assert_eq!(inter_sample_delay_us(1), 999_999);
        assert_eq!(inter_sample_delay_us(50_000_000), 0);
    }

    #[test]
    fn test_set_divider_updates_session() {
        let mut events = EventBus::new();
        let (pins, _) = counter();
        let mut engine = CaptureEngine::new(&config(16), pins, NoDelay);
        engine.set_divider(199, &mut events);
        assert_eq!(engine.session().capture_frequency, 500_000);
        assert_eq!(engine.session().delay_time_us, 1);
    }

    #[test]
    fn test_read_delay_count_clamped() {
        let mut events = EventBus::new();
        let (pins, _) = counter();
        let mut engine = CaptureEngine::new(&config(100), pins, NoDelay);
        engine.set_read_delay_count(5000, 60, &mut events);
        assert_eq!(engine.session().read_count, 100);
        assert_eq!(engine.session().delay_count, 60);
    }

    #[test]
    fn test_immediate_trigger_consumes_no_sample() {
        let mut events = EventBus::new();
        let mut transport = MemoryTransport::new();
        let (pins, reads) = counter();
        let mut engine = CaptureEngine::new(&config(16), pins, NoDelay);
        engine.set_read_delay_count(4, 4, &mut events);

        engine.arm(&mut events);
        let outcome = engine
            .capture(&mut transport, &mut events, Speed::Max, true)
            .unwrap();

        assert_eq!(outcome, CaptureOutcome::Completed { samples: 4 });
        assert_eq!(*reads.borrow(), 4);
        assert_eq!(dumped_samples(transport.output()), vec![0, 1, 2, 3]);
        assert_eq!(engine.status(), Status::Stopped);
        assert!(engine.buffer().is_empty());
    }

    #[test]
    fn test_trigger_waits_for_masked_match() {
        let mut events = EventBus::new();
        let mut transport = MemoryTransport::new();
        let (pins, _) = counter();
        let mut engine = CaptureEngine::new(&config(16), pins, NoDelay);
        engine.set_trigger(TriggerPattern::new(0x0F, 0x05), &mut events);
        engine.set_read_delay_count(4, 4, &mut events);

        engine.arm(&mut events);
        engine
            .capture(&mut transport, &mut events, Speed::Max, true)
            .unwrap();

        // 0..=5 read while waiting, dropped by the 0/100 window
        assert_eq!(dumped_samples(transport.output()), vec![6, 7, 8, 9]);
    }

    #[test]
    fn test_window_keeps_pre_trigger_samples() {
        let mut events = EventBus::new();
        let mut transport = MemoryTransport::new();
        let (pins, _) = counter();
        let mut engine = CaptureEngine::new(&config(16), pins, NoDelay);
        engine.set_trigger(TriggerPattern::new(0xFF, 5), &mut events);
        engine.set_read_delay_count(6, 3, &mut events);

        engine.arm(&mut events);
        engine
            .capture(&mut transport, &mut events, Speed::Max, true)
            .unwrap();

        assert_eq!(dumped_samples(transport.output()), vec![3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_window_with_short_history_keeps_everything() {
        let mut events = EventBus::new();
        let mut transport = MemoryTransport::new();
        let (pins, _) = counter();
        let mut engine = CaptureEngine::new(&config(16), pins, NoDelay);
        engine.set_trigger(TriggerPattern::new(0xFF, 1), &mut events);
        engine.set_read_delay_count(8, 2, &mut events);

        engine.arm(&mut events);
        engine
            .capture(&mut transport, &mut events, Speed::Max, true)
            .unwrap();

        // only 2 pre-trigger samples exist, the rest is filled after the trigger
        assert_eq!(
            dumped_samples(transport.output()),
            vec![0, 1, 2, 3, 4, 5, 6, 7]
        );
    }

    #[test]
    fn test_window_negative_keep_ignores_post_trigger_samples() {
        let mut events = EventBus::new();
        let mut transport = MemoryTransport::new();
        let (pins, _) = counter();
        let mut engine = CaptureEngine::new(&config(16), pins, NoDelay);
        engine.set_trigger(TriggerPattern::new(0xFF, 5), &mut events);
        engine.set_read_delay_count(2, 5, &mut events);

        engine.arm(&mut events);
        engine
            .capture(&mut transport, &mut events, Speed::Max, true)
            .unwrap();

        // 6, 7 and 8 fall into the ignored part of the delay
        assert_eq!(dumped_samples(transport.output()), vec![9, 10]);
    }

    #[test]
    fn test_window_arithmetic_on_prefilled_buffer() {
        let (pins, _) = counter();
        let mut events = EventBus::new();
        let mut engine = CaptureEngine::new(&config(2000), pins, NoDelay);
        let prefill = |engine: &mut CaptureEngine<u8, _, NoDelay>| {
            engine.buffer_mut().clear();
            for v in 0..800u32 {
                engine.buffer_mut().write(v as u8);
            }
        };

        prefill(&mut engine);
        engine.set_read_delay_count(1000, 1000, &mut events);
        engine.apply_window();
        assert_eq!(engine.buffer().available(), 0);
        assert_eq!(engine.buffer().ignore_count(), 0);

        prefill(&mut engine);
        engine.set_read_delay_count(1000, 500, &mut events);
        engine.apply_window();
        assert_eq!(engine.buffer().available(), 500);

        prefill(&mut engine);
        engine.set_read_delay_count(500, 1000, &mut events);
        engine.apply_window();
        assert_eq!(engine.buffer().available(), 0);
        assert_eq!(engine.buffer().ignore_count(), 500);
    }

    #[test]
    fn test_paced_capture_waits_between_samples() {
        let mut events = EventBus::new();
        let mut transport = MemoryTransport::new();
        let (pins, _) = counter();
        let mut engine = CaptureEngine::new(&config(16), pins, RecordingDelay::default());
        engine.set_divider(199, &mut events);
        engine.set_read_delay_count(5, 5, &mut events);

        engine.arm(&mut events);
        engine
            .capture(&mut transport, &mut events, Speed::Paced, true)
            .unwrap();

        assert_eq!(engine.delay_mut().calls, vec![1000; 5]);
    }

    #[test]
    fn test_max_speed_capture_never_waits() {
        let mut events = EventBus::new();
        let mut transport = MemoryTransport::new();
        let (pins, _) = counter();
        let mut engine = CaptureEngine::new(&config(16), pins, RecordingDelay::default());
        engine.set_divider(199, &mut events);
        engine.set_read_delay_count(5, 5, &mut events);

        engine.arm(&mut events);
        engine
            .capture(&mut transport, &mut events, Speed::Max, true)
            .unwrap();

        assert!(engine.delay_mut().calls.is_empty());
    }

    #[test]
    fn test_speed_threshold() {
        let mut events = EventBus::new();
        let (pins, _) = counter();
        let mut engine = CaptureEngine::new(&config(16), pins, NoDelay);
        engine.set_divider(99, &mut events);
        assert_eq!(engine.speed_for(1_000_000), Speed::Max);
        assert_eq!(engine.speed_for(2_000_000), Speed::Paced);
    }

    #[test]
    fn test_canceled_capture_sends_sentinel() {
        let mut events = EventBus::new();
        let mut transport = MemoryTransport::new();
        let cancel = CancelHandle::new();
        let pins = canceling_counter(cancel.clone(), 3);
        let mut engine =
            CaptureEngine::new(&config(16), pins, NoDelay).with_cancel_handle(cancel);
        engine.set_read_delay_count(10, 10, &mut events);

        engine.arm(&mut events);
        let outcome = engine
            .capture(&mut transport, &mut events, Speed::Max, true)
            .unwrap();

        assert_eq!(outcome, CaptureOutcome::Canceled);
        assert_eq!(transport.output(), &[0, 0, 0, 0]);
        assert_eq!(transport.flushed(), 4);
        assert!(engine.buffer().is_empty());
        assert_eq!(engine.status(), Status::Stopped);
    }

    #[test]
    fn test_cancel_during_trigger_wait() {
        let mut events = EventBus::new();
        let mut transport = MemoryTransport::new();
        let cancel = CancelHandle::new();
        let pins = canceling_counter(cancel.clone(), 20);
        let mut engine =
            CaptureEngine::new(&config(16), pins, NoDelay).with_cancel_handle(cancel);
        // never matches: the counter stays below 0x80 here
        engine.set_trigger(TriggerPattern::new(0x80, 0x80), &mut events);

        engine.arm(&mut events);
        let outcome = engine
            .capture(&mut transport, &mut events, Speed::Max, true)
            .unwrap();

        assert_eq!(outcome, CaptureOutcome::Canceled);
        assert_eq!(transport.output(), &[0, 0, 0, 0]);
    }

    #[test]
    fn test_arm_clears_stale_cancel() {
        let mut events = EventBus::new();
        let mut transport = MemoryTransport::new();
        let (pins, _) = counter();
        let mut engine = CaptureEngine::new(&config(16), pins, NoDelay);
        engine.set_read_delay_count(2, 2, &mut events);
        engine.cancel_handle().cancel();

        engine.arm(&mut events);
        let outcome = engine
            .capture(&mut transport, &mut events, Speed::Max, true)
            .unwrap();
        assert_eq!(outcome, CaptureOutcome::Completed { samples: 2 });
    }

    #[test]
    fn test_continuous_streams_until_canceled() {
        let mut events = EventBus::new();
        let mut transport = MemoryTransport::new();
        let cancel = CancelHandle::new();
        let pins = canceling_counter(cancel.clone(), 5);
        let mut engine =
            CaptureEngine::new(&config(16), pins, NoDelay).with_cancel_handle(cancel);
        engine.set_continuous(true, &mut events);

        engine.arm(&mut events);
        let outcome = engine
            .capture(&mut transport, &mut events, Speed::Max, true)
            .unwrap();

        assert_eq!(outcome, CaptureOutcome::Streamed { samples: 5 });
        assert_eq!(dumped_samples(transport.output()), vec![0, 1, 2, 3, 4]);
        assert!(engine.buffer().is_empty());
        assert_eq!(engine.status(), Status::Stopped);
    }

    #[test]
    fn test_continuous_does_not_stream_trigger_wait() {
        let mut events = EventBus::new();
        let mut transport = MemoryTransport::new();
        let cancel = CancelHandle::new();
        let pins = canceling_counter(cancel.clone(), 6);
        let mut engine =
            CaptureEngine::new(&config(16), pins, NoDelay).with_cancel_handle(cancel);
        engine.set_trigger(TriggerPattern::new(0xFF, 3), &mut events);
        engine.set_continuous(true, &mut events);

        engine.arm(&mut events);
        let outcome = engine
            .capture(&mut transport, &mut events, Speed::Max, true)
            .unwrap();

        assert_eq!(outcome, CaptureOutcome::Streamed { samples: 2 });
        assert_eq!(dumped_samples(transport.output()), vec![4, 5]);
        assert!(engine.buffer().is_empty());
    }

    #[test]
    fn test_skips_do_not_leak_into_next_capture() {
        let mut events = EventBus::new();
        let mut transport = MemoryTransport::new();
        let (pins, _) = counter();
        let mut engine = CaptureEngine::new(&config(16), pins, NoDelay);

        engine.set_read_delay_count(0, 5, &mut events);
        engine.arm(&mut events);
        let outcome = engine
            .capture(&mut transport, &mut events, Speed::Max, true)
            .unwrap();
        assert_eq!(outcome, CaptureOutcome::Completed { samples: 0 });
        assert_eq!(engine.buffer().ignore_count(), 0);

        engine.set_read_delay_count(4, 2, &mut events);
        engine.arm(&mut events);
        engine
            .capture(&mut transport, &mut events, Speed::Max, true)
            .unwrap();
        assert_eq!(dumped_samples(transport.output()), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_status_events_in_order() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let mut events = EventBus::new();
        let mut transport = MemoryTransport::new();
        let (pins, _) = counter();
        let mut engine = CaptureEngine::new(&config(16), pins, NoDelay);
        engine.set_read_delay_count(1, 1, &mut events);

        let statuses = Rc::new(RefCell::new(Vec::new()));
        let status_sink = Rc::clone(&statuses);
        events.subscribe(move |e| sink.borrow_mut().push(e));
        engine.arm(&mut events);
        status_sink.borrow_mut().push(engine.status());
        engine
            .capture(&mut transport, &mut events, Speed::Max, true)
            .unwrap();
        status_sink.borrow_mut().push(engine.status());

        assert_eq!(
            *seen.borrow(),
            vec![
                Event::Status,
                Event::Status,
                Event::Status,
                Event::CaptureSize
            ]
        );
        assert_eq!(*statuses.borrow(), vec![Status::Armed, Status::Stopped]);
    }

    #[test]
    fn test_zero_capacity_capture_finishes() {
        let mut events = EventBus::new();
        let mut transport = MemoryTransport::new();
        let (pins, reads) = counter();
        let mut engine = CaptureEngine::new(&config(0), pins, NoDelay);

        engine.arm(&mut events);
        let outcome = engine
            .capture(&mut transport, &mut events, Speed::Max, true)
            .unwrap();

        assert_eq!(outcome, CaptureOutcome::Completed { samples: 0 });
        assert_eq!(*reads.borrow(), 0);
        assert!(transport.output().is_empty());
    }

    #[test]
    fn test_reset_restores_defaults() {
        let mut events = EventBus::new();
        let (pins, _) = counter();
        let cfg = config(32);
        let mut engine = CaptureEngine::new(&cfg, pins, NoDelay);
        engine.set_trigger(TriggerPattern::new(1, 1), &mut events);
        engine.set_read_delay_count(8, 4, &mut events);
        engine.set_continuous(true, &mut events);
        engine.set_divider(199, &mut events);
        engine.buffer_mut().write(9);

        engine.reset(&mut events);

        assert_eq!(*engine.session(), CaptureSession::new(&cfg));
        assert!(engine.buffer().is_empty());
    }

    struct FakeBackend {
        started: Rc<RefCell<Option<CaptureParams>>>,
        canceled: Rc<RefCell<bool>>,
        cancel_during_wait: bool,
    }

    impl CaptureBackend<u8> for FakeBackend {
        fn start(&mut self, params: &CaptureParams) {
            *self.started.borrow_mut() = Some(params.clone());
        }

        fn cancel(&mut self) {
            *self.canceled.borrow_mut() = true;
        }

        fn wait_until_complete(&mut self, buffer: &mut RingBuffer<u8>) -> usize {
            let params = self.started.borrow().clone();
            let Some(params) = params else {
                return 0;
            };
            if self.cancel_during_wait {
                params.cancel.cancel();
                return 0;
            }
            for v in 0..params.sample_count {
                buffer.write(0xA0 | v as u8);
            }
            params.sample_count
        }
    }

    fn backend_engine(
        cancel_during_wait: bool,
    ) -> (
        CaptureEngine<u8, impl FnMut() -> u8, NoDelay>,
        Rc<RefCell<Option<CaptureParams>>>,
        Rc<RefCell<bool>>,
    ) {
        let started = Rc::new(RefCell::new(None));
        let canceled = Rc::new(RefCell::new(false));
        let backend = FakeBackend {
            started: Rc::clone(&started),
            canceled: Rc::clone(&canceled),
            cancel_during_wait,
        };
        let (pins, _) = counter();
        let engine = CaptureEngine::new(&config(16).with_pins(2, 4), pins, NoDelay)
            .with_backend(Box::new(backend));
        (engine, started, canceled)
    }

    #[test]
    fn test_backend_used_for_max_speed_batch() {
        let mut events = EventBus::new();
        let mut transport = MemoryTransport::new();
        let (mut engine, started, canceled) = backend_engine(false);
        engine.set_read_delay_count(3, 3, &mut events);

        engine.arm(&mut events);
        let outcome = engine
            .capture(&mut transport, &mut events, Speed::Max, true)
            .unwrap();

        assert_eq!(outcome, CaptureOutcome::Completed { samples: 3 });
        assert_eq!(dumped_samples(transport.output()), vec![0xA0, 0xA1, 0xA2]);
        let params = started.borrow().clone().unwrap();
        assert_eq!(params.sample_count, 3);
        assert_eq!(params.pin_start, 2);
        assert_eq!(params.pin_count, 4);
        assert!(!*canceled.borrow());
    }

    #[test]
    fn test_backend_not_used_when_paced() {
        let mut events = EventBus::new();
        let mut transport = MemoryTransport::new();
        let (mut engine, started, _) = backend_engine(false);
        engine.set_read_delay_count(3, 3, &mut events);

        engine.arm(&mut events);
        engine
            .capture(&mut transport, &mut events, Speed::Paced, true)
            .unwrap();

        assert!(started.borrow().is_none());
        assert_eq!(dumped_samples(transport.output()), vec![0, 1, 2]);
    }

    #[test]
    fn test_backend_cancel() {
        let mut events = EventBus::new();
        let mut transport = MemoryTransport::new();
        let (mut engine, _, canceled) = backend_engine(true);
        engine.set_read_delay_count(3, 3, &mut events);

        engine.arm(&mut events);
        let outcome = engine
            .capture(&mut transport, &mut events, Speed::Max, true)
            .unwrap();

        assert_eq!(outcome, CaptureOutcome::Canceled);
        assert!(*canceled.borrow());
        assert_eq!(transport.output(), &[0, 0, 0, 0]);
    }

    #[test]
    fn test_backend_fills_after_kept_history() {
        let mut events = EventBus::new();
        let mut transport = MemoryTransport::new();
        let (mut engine, started, _) = backend_engine(false);
        engine.set_trigger(TriggerPattern::new(0xFF, 5), &mut events);
        engine.set_read_delay_count(6, 3, &mut events);

        engine.arm(&mut events);
        let outcome = engine
            .capture(&mut transport, &mut events, Speed::Max, true)
            .unwrap();

        assert_eq!(outcome, CaptureOutcome::Completed { samples: 6 });
        assert_eq!(started.borrow().clone().unwrap().sample_count, 3);
        assert_eq!(
            dumped_samples(transport.output()),
            vec![3, 4, 5, 0xA0, 0xA1, 0xA2]
        );
    }

    #[test]
    fn test_backend_covers_skipped_samples() {
        let mut events = EventBus::new();
        let mut transport = MemoryTransport::new();
        let (mut engine, started, _) = backend_engine(false);
        engine.set_trigger(TriggerPattern::new(0xFF, 5), &mut events);
        engine.set_read_delay_count(2, 5, &mut events);

        engine.arm(&mut events);
        let outcome = engine
            .capture(&mut transport, &mut events, Speed::Max, true)
            .unwrap();

        assert_eq!(outcome, CaptureOutcome::Completed { samples: 2 });
        assert_eq!(started.borrow().clone().unwrap().sample_count, 5);
        assert_eq!(dumped_samples(transport.output()), vec![0xA3, 0xA4]);
    }
}

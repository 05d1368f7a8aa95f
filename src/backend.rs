//! Optional hardware capture path (DMA, PIO or any peripheral that samples on its own).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::ring_buffer::RingBuffer;
use crate::sample::Sample;

/// Shared abort flag.
///
/// Clones observe the same flag, so it can be set from an interrupt handler or
/// another thread while a capture loop is running.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    pub(crate) fn clear(&self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// What a hardware backend needs to run one batch capture.
#[derive(Debug, Clone)]
pub struct CaptureParams {
    pub pin_start: u8,
    pub pin_count: u8,
    pub sample_count: usize,
    pub frequency: u64,
    pub cancel: CancelHandle,
}

/// A sampler that runs without the CPU once started.
///
/// The engine only uses it for unpaced batch captures. `wait_until_complete` blocks
/// until the requested samples are in the buffer or `params.cancel` is set.
pub trait CaptureBackend<T: Sample> {
    fn start(&mut self, params: &CaptureParams);

    /// Stops the peripheral. Called at most once per capture, after cancellation was observed.
    fn cancel(&mut self);

    /// Returns the number of samples written into `buffer`.
    fn wait_until_complete(&mut self, buffer: &mut RingBuffer<T>) -> usize;
}

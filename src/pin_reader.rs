use embedded_hal::digital::InputPin;

use crate::sample::Sample;

/// Instantaneous read of every captured pin.
pub trait PinReader<T: Sample> {
    fn read_all(&mut self) -> T;
}

impl<T: Sample, F: FnMut() -> T> PinReader<T> for F {
    fn read_all(&mut self) -> T {
        self()
    }
}

/// Polls GPIO inputs one by one; pin `i` lands in bit `i`.
///
/// Pins beyond the sample width are never read. A pin that fails to read counts as low.
#[derive(Debug)]
pub struct GpioPinReader<P> {
    pins: Vec<P>,
}

impl<P: InputPin> GpioPinReader<P> {
    pub fn new(pins: Vec<P>) -> Self {
        Self { pins }
    }

    pub fn pin_count(&self) -> usize {
        self.pins.len()
    }

    pub fn into_pins(self) -> Vec<P> {
        self.pins
    }
}

impl<T: Sample, P: InputPin> PinReader<T> for GpioPinReader<P> {
    fn read_all(&mut self) -> T {
        let mut levels = 0u32;
        for (i, pin) in self.pins.iter_mut().take(T::BITS as usize).enumerate() {
            if pin.is_high().unwrap_or(false) {
                levels |= 1 << i;
            }
        }
        T::from_levels(levels)
    }
}

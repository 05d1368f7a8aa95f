//! Capture memory. If the buffer is full the oldest entries are overwritten.

use crate::sample::Sample;

/// Fixed-capacity circular sample store.
///
/// The storage has exactly `capacity` slots and both cursors wrap at `capacity`.
/// When the buffer is full the oldest entry sits at `write_pos`, so a write
/// replaces it and the read cursor moves to the slot after it.
#[derive(Debug, Clone)]
pub struct RingBuffer<T: Sample> {
    data: Vec<T>,
    write_pos: usize,
    read_pos: usize,
    available: usize,
    ignore_count: usize,
}

impl<T: Sample> RingBuffer<T> {
    /// Allocates `capacity` slots.
    ///
    /// If the memory can't be reserved the buffer degrades to capacity 0: writes are
    /// dropped and reads return `T::ZERO`.
    pub fn new(capacity: usize) -> Self {
        let mut data = Vec::new();
        if let Err(e) = data.try_reserve_exact(capacity) {
            log::error!("Requested capture size {} is too big: {}", capacity, e);
        } else {
            data.resize(capacity, T::ZERO);
        }

        Self {
            data,
            write_pos: 0,
            read_pos: 0,
            available: 0,
            ignore_count: 0,
        }
    }

    /// Adds an entry, overwriting the oldest one when full.
    pub fn write(&mut self, value: T) {
        if self.ignore_count > 0 {
            self.ignore_count -= 1;
            return;
        }
        let capacity = self.data.len();
        if capacity == 0 {
            return;
        }

        self.data[self.write_pos] = value;
        self.write_pos = (self.write_pos + 1) % capacity;
        if self.available < capacity {
            self.available += 1;
        } else {
            self.read_pos = self.write_pos;
        }
    }

    /// Removes and returns the oldest entry, or `T::ZERO` when empty.
    pub fn read(&mut self) -> T {
        if self.available == 0 {
            return T::ZERO;
        }
        let value = self.data[self.read_pos];
        self.read_pos = (self.read_pos + 1) % self.data.len();
        self.available -= 1;
        value
    }

    /// Drops all entries and any pending ignore count.
    pub fn clear(&mut self) {
        self.write_pos = 0;
        self.read_pos = 0;
        self.available = 0;
        self.ignore_count = 0;
    }

    /// Drops the `count` oldest entries.
    ///
    /// When `count` exceeds what is stored, the shortfall is taken from the next
    /// writes: they are discarded as if they had already arrived and been dropped.
    pub fn clear_n(&mut self, count: usize) {
        self.ignore_count = count.saturating_sub(self.available);
        let dropped = count.min(self.available);
        if dropped > 0 {
            self.read_pos = (self.read_pos + dropped) % self.data.len();
            self.available -= dropped;
        }
    }

    /// Cancels a pending skip left by `clear_n`, keeping the stored entries.
    pub fn clear_ignore(&mut self) {
        self.ignore_count = 0;
    }

    /// Empties the buffer and zero-fills its memory.
    pub fn reset(&mut self) {
        self.data.fill(T::ZERO);
        self.clear();
    }

    /// Iterator that reads entries until the buffer is empty.
    pub fn drain(&mut self) -> impl Iterator<Item = T> + '_ {
        std::iter::from_fn(move || (self.available > 0).then(|| self.read()))
    }

    pub fn available(&self) -> usize {
        self.available
    }

    /// Max number of entries.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.available == 0
    }

    pub fn is_full(&self) -> bool {
        self.available == self.data.len()
    }

    /// Future writes that will still be discarded.
    pub fn ignore_count(&self) -> usize {
        self.ignore_count
    }
}

/// Number of frames the tracker keeps.
pub const MAX_TRACK_FRAMES: usize = 100;

/// Fixed-capacity history indexed by a monotonically increasing write counter.
///
/// Slots are reused in place once the ring wraps; index 0 is the newest entry.
pub struct FrameRing<T> {
    slots: Vec<Option<T>>,
    written: u64,
}

impl<T> FrameRing<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            written: 0,
        }
    }

    pub fn push(&mut self, item: T) {
        let capacity = self.slots.len() as u64;
        let slot = (self.written % capacity) as usize;
        self.slots[slot] = Some(item);
        self.written += 1;
    }

    /// The entry `age` pushes before the newest, or `None` if it was never
    /// written or has been overwritten.
    pub fn get(&self, age: usize) -> Option<&T> {
        if age >= self.len() {
            return None;
        }
        let capacity = self.slots.len() as u64;
        let slot = ((self.written - 1 - age as u64) % capacity) as usize;
        self.slots[slot].as_ref()
    }

    /// Entries currently retrievable.
    pub fn len(&self) -> usize {
        self.written.min(self.slots.len() as u64) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.written == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Total pushes since creation.
    pub fn total_written(&self) -> u64 {
        self.written
    }
}

impl<T> Default for FrameRing<T> {
    fn default() -> Self {
        Self::new(MAX_TRACK_FRAMES)
    }
}

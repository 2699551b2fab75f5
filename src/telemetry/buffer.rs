use std::collections::VecDeque;
use crate::telemetry::Sample;
/// Default capacity: twelve hours at one sample per second.
pub const DEFAULT_MAX_POINTS: usize = 12 * 60 * 60;
/// Rolling window of the most recent samples, oldest first.
pub struct SampleWindow {
    samples: VecDeque<Sample>,
    capacity: usize,
}
impl SampleWindow {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            // Grows on demand; a full-day window is never allocated up front.
            samples: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }
    pub fn capacity(&self) -> usize {
        self.capacity
    }
    pub fn len(&self) -> usize {
        self.samples.len()
    }
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
    pub fn append(&mut self, sample: Sample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }
    /// Every buffered sample in arrival order.
    pub fn all(&self) -> impl DoubleEndedIterator<Item = &Sample> + ExactSizeIterator {
        self.samples.iter()
    }
    pub fn latest(&self) -> Option<&Sample> {
        self.samples.back()
    }
}
impl Default for SampleWindow {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MAX_POINTS)
    }
}

//! Bounded FIFO of decoded frames
//!
//! The ingestion driver appends, the query side reads. A single mutex guards
//! both; every operation is a handful of pointer moves so nothing finer is
//! needed. Readers take a [`FrameSnapshot`] and iterate it outside the lock.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::trace;

use crate::types::Frame;

/// Default number of frames kept in memory.
pub const DEFAULT_CAPACITY: usize = 100;

/// Insertion-ordered, capacity-bounded frame collection.
///
/// Appending to a full buffer silently evicts the oldest frame.
#[derive(Debug)]
pub struct FrameBuffer {
    capacity: usize,
    frames: Mutex<VecDeque<Arc<Frame>>>,
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl FrameBuffer {
    /// Create an empty buffer. A capacity of 0 is raised to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { capacity, frames: Mutex::new(VecDeque::with_capacity(capacity)) }
    }

    /// Maximum number of frames retained.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a frame, evicting the oldest one when full.
    pub fn append(&self, frame: Frame) -> Arc<Frame> {
        let frame = Arc::new(frame);
        let mut frames = self.lock();
        if frames.len() == self.capacity {
            frames.pop_front();
            trace!(capacity = self.capacity, "Evicted oldest frame");
        }
        frames.push_back(Arc::clone(&frame));
        frame
    }

    /// Replace the whole content, keeping only the newest `capacity` frames.
    pub fn replace<I>(&self, frames: I) -> usize
    where
        I: IntoIterator<Item = Frame>,
    {
        let mut guard = self.lock();
        guard.clear();
        for frame in frames {
            if guard.len() == self.capacity {
                guard.pop_front();
            }
            guard.push_back(Arc::new(frame));
        }
        guard.len()
    }

    /// Remove every frame.
    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Most recently appended frame.
    pub fn last(&self) -> Option<Arc<Frame>> {
        self.lock().back().cloned()
    }

    /// Point-in-time copy of the buffer content, oldest first.
    pub fn snapshot(&self) -> FrameSnapshot {
        FrameSnapshot { frames: self.lock().iter().cloned().collect() }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Arc<Frame>>> {
        // A panic while holding the lock cannot leave the deque half-updated
        self.frames.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Frames captured from a [`FrameBuffer`] at one instant.
///
/// Iteration is restartable and never touches the live buffer.
#[derive(Debug, Clone, Default)]
pub struct FrameSnapshot {
    frames: Vec<Arc<Frame>>,
}

impl FrameSnapshot {
    /// Oldest first, the order later frames override earlier ones in.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Frame> + ExactSizeIterator {
        self.frames.iter().map(Arc::as_ref)
    }

    /// Newest first, for display.
    pub fn iter_newest_first(&self) -> impl Iterator<Item = &Frame> {
        self.iter().rev()
    }

    /// Shared handles to the frames, oldest first.
    pub fn frames(&self) -> &[Arc<Frame>] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn last(&self) -> Option<&Frame> {
        self.frames.last().map(Arc::as_ref)
    }
}

impl From<Vec<Frame>> for FrameSnapshot {
    fn from(frames: Vec<Frame>) -> Self {
        Self { frames: frames.into_iter().map(Arc::new).collect() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(node: u8) -> Frame {
        Frame::decode(&[node, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]).unwrap()
    }

    fn nodes(snapshot: &FrameSnapshot) -> Vec<u8> {
        snapshot.iter().map(Frame::node).collect()
    }

    #[test]
    fn keeps_the_most_recent_frames() {
        let buffer = FrameBuffer::new(3);
        for node in 1..=5 {
            buffer.append(frame(node));
        }

        assert_eq!(buffer.len(), 3);
        assert_eq!(nodes(&buffer.snapshot()), vec![3, 4, 5]);
        assert_eq!(buffer.last().map(|f| f.node()), Some(5));
    }

    #[test]
    fn snapshot_iterates_both_ways_and_restarts() {
        let buffer = FrameBuffer::new(10);
        for node in 1..=4 {
            buffer.append(frame(node));
        }
        let snapshot = buffer.snapshot();

        let newest: Vec<u8> = snapshot.iter_newest_first().map(Frame::node).collect();
        assert_eq!(newest, vec![4, 3, 2, 1]);
        assert_eq!(nodes(&snapshot), vec![1, 2, 3, 4]);
        assert_eq!(nodes(&snapshot), vec![1, 2, 3, 4]);
    }

    #[test]
    fn snapshot_is_detached_from_later_writes() {
        let buffer = FrameBuffer::new(2);
        buffer.append(frame(1));
        let snapshot = buffer.snapshot();

        buffer.append(frame(2));
        buffer.append(frame(3));
        buffer.clear();

        assert_eq!(nodes(&snapshot), vec![1]);
        assert!(buffer.is_empty());
        assert!(buffer.last().is_none());
    }

    #[test]
    fn replace_honours_capacity() {
        let buffer = FrameBuffer::new(2);
        buffer.append(frame(9));
        let kept = buffer.replace((1..=4).map(frame));

        assert_eq!(kept, 2);
        assert_eq!(nodes(&buffer.snapshot()), vec![3, 4]);
    }

    #[test]
    fn zero_capacity_is_raised() {
        let buffer = FrameBuffer::new(0);
        buffer.append(frame(1));
        buffer.append(frame(2));
        assert_eq!(buffer.capacity(), 1);
        assert_eq!(nodes(&buffer.snapshot()), vec![2]);
    }

    #[test]
    fn concurrent_appends_respect_capacity() {
        let buffer = Arc::new(FrameBuffer::new(50));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let buffer = Arc::clone(&buffer);
                std::thread::spawn(move || {
                    for i in 0..100u8 {
                        buffer.append(frame(t * 50 + i % 50));
                        let _ = buffer.snapshot().len();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(buffer.len(), 50);
    }
}

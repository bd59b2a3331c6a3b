//! Bounded pre-roll ring: the last few analysis windows seen while idle.

use std::collections::VecDeque;

use super::UtteranceBuffer;

/// Strict-FIFO ring of analysis windows, written only while no utterance is
/// engaged. At onset the contents are copied (not drained) into the front of
/// the utterance arena so the dispatched segment keeps a little audio from
/// before detection triggered.
#[derive(Debug)]
pub struct LookbackRing {
    windows: VecDeque<Vec<f32>>,
    max_windows: usize,
}

impl LookbackRing {
    pub fn new(max_windows: usize) -> Self {
        Self {
            windows: VecDeque::with_capacity(max_windows),
            max_windows,
        }
    }

    /// Push a window, evicting the oldest when at capacity.
    pub fn push(&mut self, window: Vec<f32>) {
        if self.max_windows == 0 {
            return;
        }
        if self.windows.len() == self.max_windows {
            self.windows.pop_front();
        }
        self.windows.push_back(window);
    }

    /// Total samples currently retained.
    pub fn len_samples(&self) -> usize {
        self.windows.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Copy all retained windows, oldest first, into `buffer`.
    pub fn copy_into(&self, buffer: &mut UtteranceBuffer) {
        for window in &self.windows {
            buffer.append(window);
        }
    }

    pub fn clear(&mut self) {
        self.windows.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(fill: f32, len: usize) -> Vec<f32> {
        vec![fill; len]
    }

    #[test]
    fn evicts_oldest_at_capacity() {
        let mut ring = LookbackRing::new(2);
        ring.push(window(1.0, 4));
        ring.push(window(2.0, 4));
        ring.push(window(3.0, 4));

        assert_eq!(ring.len_samples(), 8);

        let mut buf = UtteranceBuffer::new(16);
        ring.copy_into(&mut buf);
        assert_eq!(buf.filled(), &[2.0, 2.0, 2.0, 2.0, 3.0, 3.0, 3.0, 3.0]);
    }

    #[test]
    fn copy_preserves_chronological_order_and_contents() {
        let mut ring = LookbackRing::new(3);
        ring.push(vec![1.0, 2.0]);
        ring.push(vec![3.0, 4.0]);

        let mut buf = UtteranceBuffer::new(8);
        ring.copy_into(&mut buf);
        assert_eq!(buf.filled(), &[1.0, 2.0, 3.0, 4.0]);

        // Copy, not move: the ring still holds its windows.
        assert_eq!(ring.len_samples(), 4);
    }

    #[test]
    fn zero_capacity_ring_holds_nothing() {
        let mut ring = LookbackRing::new(0);
        ring.push(window(1.0, 4));
        assert!(ring.is_empty());
        assert_eq!(ring.len_samples(), 0);
    }
}

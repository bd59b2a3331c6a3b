//! Fixed-capacity utterance arena with manual write-position tracking.
//!
//! Allocated once at segmenter construction and never resized, so memory
//! stays bounded and predictable over arbitrarily long sessions. `append`
//! copies in place and reports how much fit; the caller decides what to do
//! with the rest (overflow dispatch).

/// Pre-allocated sample arena. `write_pos ≤ capacity` always holds.
#[derive(Debug)]
pub struct UtteranceBuffer {
    samples: Vec<f32>,
    write_pos: usize,
}

impl UtteranceBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: vec![0.0; capacity],
            write_pos: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.samples.len()
    }

    pub fn write_pos(&self) -> usize {
        self.write_pos
    }

    pub fn remaining(&self) -> usize {
        self.samples.len() - self.write_pos
    }

    pub fn is_empty(&self) -> bool {
        self.write_pos == 0
    }

    /// Copy as much of `src` as fits, advance the write position, and
    /// return the number of samples consumed. A return shorter than
    /// `src.len()` means the arena is now full.
    pub fn append(&mut self, src: &[f32]) -> usize {
        let n = src.len().min(self.remaining());
        self.samples[self.write_pos..self.write_pos + n].copy_from_slice(&src[..n]);
        self.write_pos += n;
        n
    }

    /// The written prefix `[0, write_pos)`.
    pub fn filled(&self) -> &[f32] {
        &self.samples[..self.write_pos]
    }

    /// The prefix `[0, end)`. `end` must not exceed the write position.
    pub fn slice_to(&self, end: usize) -> &[f32] {
        debug_assert!(end <= self.write_pos);
        &self.samples[..end.min(self.write_pos)]
    }

    /// Rewind to empty. The allocation is retained.
    pub fn reset(&mut self) {
        self.write_pos = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_tracks_write_position() {
        let mut buf = UtteranceBuffer::new(8);
        assert_eq!(buf.append(&[1.0, 2.0, 3.0]), 3);
        assert_eq!(buf.write_pos(), 3);
        assert_eq!(buf.filled(), &[1.0, 2.0, 3.0]);
        assert_eq!(buf.remaining(), 5);
    }

    #[test]
    fn append_past_capacity_reports_partial_write() {
        let mut buf = UtteranceBuffer::new(4);
        assert_eq!(buf.append(&[1.0, 2.0, 3.0]), 3);
        // Only one sample fits; the caller keeps the overflow.
        assert_eq!(buf.append(&[4.0, 5.0, 6.0]), 1);
        assert_eq!(buf.write_pos(), 4);
        assert_eq!(buf.filled(), &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(buf.remaining(), 0);
    }

    #[test]
    fn reset_rewinds_without_reallocating() {
        let mut buf = UtteranceBuffer::new(4);
        buf.append(&[1.0, 2.0]);
        buf.reset();
        assert!(buf.is_empty());
        assert_eq!(buf.capacity(), 4);
        buf.append(&[9.0]);
        assert_eq!(buf.filled(), &[9.0]);
    }
}

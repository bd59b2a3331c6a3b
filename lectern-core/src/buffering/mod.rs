//! Lock-free SPSC ring buffer between the capture callback and the pipeline.
//!
//! Uses `ringbuf::HeapRb<f32>` whose wait-free `push_slice` is safe to call
//! from the real-time audio callback.

pub mod frame;

use ringbuf::{traits::Split, HeapRb};

pub use ringbuf::traits::{Consumer, Producer};

/// Type alias for the producer half — held by the audio callback thread.
pub type AudioProducer = ringbuf::HeapProd<f32>;

/// Type alias for the consumer half — held by the pipeline thread.
pub type AudioConsumer = ringbuf::HeapCons<f32>;

/// Ring capacity: 2^22 = 4 194 304 f32 samples ≈ 87 s at 48 kHz.
/// Sized so long sermons survive a transcription stall without callback drops.
pub const RING_CAPACITY: usize = 1 << 22;

/// Create a matched producer/consumer pair backed by a heap-allocated ring buffer.
pub fn create_audio_ring() -> (AudioProducer, AudioConsumer) {
    HeapRb::<f32>::new(RING_CAPACITY).split()
}

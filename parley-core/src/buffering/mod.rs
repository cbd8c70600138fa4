//! Sample buffering.
//!
//! - [`chunk::ChunkAccumulator`] collects processed 16 kHz blocks until a
//!   transport-sized chunk is ready.
//! - [`pcm::PcmChunk`] is the encoded 16-bit payload handed to the host.
//! - The SPSC ring below carries raw capture frames from the cpal callback to
//!   the pipeline thread. `ringbuf::HeapRb<f32>` gives a wait-free
//!   `push_slice` that is safe to call from the real-time audio callback.

pub mod chunk;
pub mod pcm;

use ringbuf::{traits::Split, HeapRb};

pub use ringbuf::traits::{Consumer, Observer, Producer};

/// Type alias for the producer half, held by the audio callback thread.
pub type AudioProducer = ringbuf::HeapProd<f32>;

/// Type alias for the consumer half, held by the pipeline thread.
pub type AudioConsumer = ringbuf::HeapCons<f32>;

/// Buffer capacity: 2^18 = 262 144 f32 samples ≈ 5.4 s at 48 kHz.
/// The pipeline drains one render quantum at a time, so this only has to
/// absorb scheduling hiccups on the processing thread.
pub const RING_CAPACITY: usize = 1 << 18;

/// Create a matched producer/consumer pair backed by a heap-allocated ring buffer.
pub fn create_audio_ring() -> (AudioProducer, AudioConsumer) {
    HeapRb::<f32>::new(RING_CAPACITY).split()
}

//! Float accumulator between per-block processing and chunk emission.

use super::pcm::PcmChunk;

/// Growing buffer of processed mono f32 samples in [-1.0, 1.0].
///
/// Capacity is reserved up front for two chunks so steady-state pushes never
/// reallocate on the processing thread.
#[derive(Debug, Clone)]
pub struct ChunkAccumulator {
    samples: Vec<f32>,
    chunk_size: usize,
}

impl ChunkAccumulator {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            samples: Vec::with_capacity(chunk_size.saturating_mul(2)),
            chunk_size,
        }
    }

    pub fn push(&mut self, block: &[f32]) {
        self.samples.extend_from_slice(block);
    }

    /// `true` once at least one full chunk is buffered.
    pub fn is_ready(&self) -> bool {
        self.chunk_size > 0 && self.samples.len() >= self.chunk_size
    }

    /// Encode the oldest `chunk_size` samples without consuming them.
    ///
    /// Callers check [`is_ready`](Self::is_ready) first.
    pub fn encode_front(&self) -> PcmChunk {
        PcmChunk::encode(&self.samples[..self.chunk_size.min(self.samples.len())])
    }

    /// Drop the oldest chunk, keeping the remainder in order.
    pub fn consume_front(&mut self) {
        let n = self.chunk_size.min(self.samples.len());
        self.samples.drain(..n);
    }

    /// Discard everything buffered.
    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.samples
    }
}

//! Signed 16-bit PCM encoding for the speech transport.

/// Full-scale multiplier. Symmetric, so -1.0 maps to -32767 (never -32768).
pub const PCM_SCALE: f32 = 32767.0;

/// `round(clamp(sample, -1, 1) * 32767)`.
#[inline]
pub fn encode_sample(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * PCM_SCALE).round() as i16
}

/// Inverse of [`encode_sample`], within one quantisation step.
#[inline]
pub fn decode_sample(sample: i16) -> f32 {
    sample as f32 / PCM_SCALE
}

/// One ready-to-send chunk of mono 16-bit PCM.
///
/// Owns its buffer; handing it to the host moves it, so the processor keeps
/// no reference to emitted audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmChunk {
    samples: Vec<i16>,
}

impl PcmChunk {
    /// Encode a float slice.
    pub fn encode(samples: &[f32]) -> Self {
        Self {
            samples: samples.iter().copied().map(encode_sample).collect(),
        }
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<i16> {
        self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Wire bytes, little-endian.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    /// Parse little-endian wire bytes. Returns `None` for an odd byte count.
    pub fn from_le_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() % 2 != 0 {
            return None;
        }
        let samples = bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Some(Self { samples })
    }

    /// Decode back to floats in [-1.0, 1.0].
    pub fn to_f32(&self) -> Vec<f32> {
        self.samples.iter().copied().map(decode_sample).collect()
    }

    /// Returns the duration of this chunk in seconds at `sample_rate`.
    pub fn duration_secs(&self, sample_rate: u32) -> f64 {
        self.samples.len() as f64 / sample_rate as f64
    }
}

//! Sample-rate normalisation by nearest-neighbour decimation.
//!
//! ## Design
//!
//! The capture device runs at whatever rate the host gives us (commonly 48 kHz).
//! The speech transport expects 16 kHz mono. `RateNormalizer` picks, for each
//! output index `i`, the input sample at `floor(i * source / target)`. There is
//! no interpolation and no anti-alias filter; aliasing is accepted for speech
//! transcription quality.
//!
//! When source rate == target rate the normalizer is a passthrough.
//!
//! ## Source rate hint
//!
//! Some hosts cannot query the true device rate reliably. They must say which
//! assumption applies through [`SourceRate`] rather than letting the processor
//! guess from ambient state.
//!
//! ```ignore
//! let rn = RateNormalizer::new(SourceRate::Reported(48_000), 16_000)?;
//! let out = rn.process(&block); // len == block.len() / 3
//! ```

use tracing::info;

use crate::error::{ParleyError, Result};

/// Rate assumed for [`SourceRate::AssumeHardwareDefault`] (Hz).
pub const HARDWARE_DEFAULT_RATE: u32 = 48_000;

/// Where the processor's idea of the incoming sample rate comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceRate {
    /// The host queried the device and knows the real rate.
    Reported(u32),
    /// Rate unknown; the host asked the device for the target rate and trusts it
    /// was honoured.
    #[default]
    AssumeTarget,
    /// Rate unknown; the host knows its platform ignores rate requests and runs
    /// at the common 48 kHz hardware default.
    AssumeHardwareDefault,
}

impl SourceRate {
    /// Resolve the hint to a concrete rate in Hz.
    pub fn resolve(self, target_rate: u32) -> u32 {
        match self {
            SourceRate::Reported(hz) => hz,
            SourceRate::AssumeTarget => target_rate,
            SourceRate::AssumeHardwareDefault => HARDWARE_DEFAULT_RATE,
        }
    }
}

/// Output length for `input_len` samples going from `source_rate` to `target_rate`.
///
/// Equals `floor(input_len * target / source)`.
pub fn output_len(input_len: usize, source_rate: u32, target_rate: u32) -> usize {
    (input_len as u64 * target_rate as u64 / source_rate as u64) as usize
}

/// Converts f32 mono blocks from one fixed sample rate to another.
#[derive(Debug, Clone)]
pub struct RateNormalizer {
    source_rate: u32,
    target_rate: u32,
}

impl RateNormalizer {
    /// Create a new normalizer.
    ///
    /// # Errors
    /// Returns `ParleyError::InvalidConfig` if either rate is zero.
    pub fn new(source: SourceRate, target_rate: u32) -> Result<Self> {
        let source_rate = source.resolve(target_rate);
        if source_rate == 0 || target_rate == 0 {
            return Err(ParleyError::InvalidConfig(format!(
                "sample rates must be non-zero (source={source_rate}, target={target_rate})"
            )));
        }

        if source_rate != target_rate {
            info!(
                source_rate,
                target_rate,
                ratio = source_rate as f64 / target_rate as f64,
                ?source,
                "rate normalisation enabled"
            );
        }

        Ok(Self {
            source_rate,
            target_rate,
        })
    }

    /// Decimate one block. Passthrough copies the input.
    pub fn process(&self, samples: &[f32]) -> Vec<f32> {
        if self.is_passthrough() {
            return samples.to_vec();
        }

        let src = self.source_rate as u64;
        let dst = self.target_rate as u64;
        let len = output_len(samples.len(), self.source_rate, self.target_rate);

        (0..len as u64)
            .map(|i| samples[(i * src / dst) as usize])
            .collect()
    }

    /// `source / target`.
    pub fn ratio(&self) -> f64 {
        self.source_rate as f64 / self.target_rate as f64
    }

    pub fn source_rate(&self) -> u32 {
        self.source_rate
    }

    pub fn target_rate(&self) -> u32 {
        self.target_rate
    }

    /// Returns `true` when source rate == target rate.
    pub fn is_passthrough(&self) -> bool {
        self.source_rate == self.target_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_identity() {
        let rn = RateNormalizer::new(SourceRate::Reported(16_000), 16_000).unwrap();
        assert!(rn.is_passthrough());
        let samples: Vec<f32> = (0..128).map(|i| i as f32 * 0.001).collect();
        assert_eq!(rn.process(&samples), samples);
    }

    #[test]
    fn decimates_48k_block_by_picking_every_third_sample() {
        let rn = RateNormalizer::new(SourceRate::Reported(48_000), 16_000).unwrap();
        let samples: Vec<f32> = (0..4800).map(|i| (i as f32 / 4800.0) * 2.0 - 1.0).collect();
        let out = rn.process(&samples);

        assert_eq!(out.len(), 1600);
        for (i, s) in out.iter().enumerate() {
            assert_eq!(*s, samples[i * 3], "mismatch at output index {i}");
        }
    }

    #[test]
    fn output_length_matches_floor_for_non_integer_ratio() {
        let rn = RateNormalizer::new(SourceRate::Reported(44_100), 16_000).unwrap();
        for n in [1usize, 2, 3, 127, 128, 441, 1000, 4410] {
            let out = rn.process(&vec![0.25; n]);
            assert_eq!(out.len(), n * 16_000 / 44_100, "n={n}");
        }
    }

    #[test]
    fn non_integer_ratio_uses_floor_index() {
        let rn = RateNormalizer::new(SourceRate::Reported(44_100), 16_000).unwrap();
        let samples: Vec<f32> = (0..128).map(|i| i as f32).collect();
        let out = rn.process(&samples);
        let ratio = rn.ratio();
        for (i, s) in out.iter().enumerate() {
            let expected = (i as f64 * ratio).floor() as usize;
            assert_eq!(*s as usize, expected);
        }
    }

    #[test]
    fn empty_block_yields_empty_output() {
        let rn = RateNormalizer::new(SourceRate::Reported(48_000), 16_000).unwrap();
        assert!(rn.process(&[]).is_empty());
    }

    #[test]
    fn rate_hints_resolve_explicitly() {
        assert_eq!(SourceRate::Reported(44_100).resolve(16_000), 44_100);
        assert_eq!(SourceRate::AssumeTarget.resolve(16_000), 16_000);
        assert_eq!(SourceRate::AssumeHardwareDefault.resolve(16_000), 48_000);

        let rn = RateNormalizer::new(SourceRate::AssumeHardwareDefault, 16_000).unwrap();
        assert_eq!(rn.process(&[0.0; 128]).len(), 42);
    }

    #[test]
    fn zero_rate_is_rejected() {
        assert!(RateNormalizer::new(SourceRate::Reported(0), 16_000).is_err());
    }
}

//! Block-rate automatic gain control.
//!
//! ## Algorithm (once per block)
//!
//! 1. RMS of the incoming block.
//! 2. AGC disabled or RMS exactly zero → block untouched, gain untouched.
//! 3. Target gain = `target_rms / max(rms, RMS_EPSILON)`, clamped to
//!    `[MIN_GAIN, MAX_GAIN]`.
//! 4. One-pole smoothing toward the target. The coefficient is derived from the
//!    real number of blocks per second, not a per-sample rate:
//!    `coeff = exp(-1 / (time_constant * blocks_per_second))`.
//!    The attack constant is used while the gain is rising toward its target,
//!    the release constant while it is falling.
//! 5. Multiply every sample by the gain and hard-clip to [-1.0, 1.0].

use tracing::warn;

/// Default output level the controller steers toward.
pub const DEFAULT_TARGET_RMS: f32 = 0.15;
/// Lower gain bound.
pub const MIN_GAIN: f32 = 0.1;
/// Upper gain bound (+20 dB).
pub const MAX_GAIN: f32 = 10.0;
/// Time constant used while gain increases (seconds).
pub const ATTACK_SECS: f32 = 0.010;
/// Time constant used while gain decreases (seconds).
pub const RELEASE_SECS: f32 = 0.100;
/// Guards the target-gain division for near-silent blocks.
pub const RMS_EPSILON: f32 = 1e-6;
/// Range accepted for `target_rms` from control messages.
pub const TARGET_RMS_MIN: f32 = 0.001;
pub const TARGET_RMS_MAX: f32 = 1.0;

/// Runtime-mutable AGC settings (the `config` control message).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgcSettings {
    pub enabled: bool,
    pub target_rms: f32,
}

impl Default for AgcSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            target_rms: DEFAULT_TARGET_RMS,
        }
    }
}

/// Compute the root-mean-square of a sample slice. Empty input → 0.0.
pub fn compute_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// One-pole smoothing coefficient for a time constant at a given block rate.
///
/// Returns 0.0 (jump straight to target) for non-positive inputs.
#[inline]
pub fn smoothing_coeff(time_secs: f32, blocks_per_second: f32) -> f32 {
    if time_secs <= 0.0 || blocks_per_second <= 0.0 {
        return 0.0;
    }
    (-1.0 / (time_secs * blocks_per_second)).exp()
}

/// Validate a requested target level. Non-finite values are rejected,
/// everything else is clamped into `[TARGET_RMS_MIN, TARGET_RMS_MAX]`.
pub fn clamp_target_rms(requested: f32) -> Option<f32> {
    if !requested.is_finite() {
        return None;
    }
    Some(requested.clamp(TARGET_RMS_MIN, TARGET_RMS_MAX))
}

/// Smoothed gain state. Owned by the block processor.
#[derive(Debug, Clone)]
pub struct GainController {
    settings: AgcSettings,
    /// Current linear multiplier, always in `[MIN_GAIN, MAX_GAIN]`.
    gain: f32,
}

impl GainController {
    pub fn new(settings: AgcSettings) -> Self {
        Self {
            settings,
            gain: 1.0,
        }
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn settings(&self) -> AgcSettings {
        self.settings
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.settings.enabled = enabled;
    }

    /// Apply a new target level. Returns the value actually stored, or `None`
    /// when the request was rejected.
    pub fn set_target_rms(&mut self, requested: f32) -> Option<f32> {
        match clamp_target_rms(requested) {
            Some(level) => {
                if level != requested {
                    warn!(requested, applied = level, "target RMS clamped");
                }
                self.settings.target_rms = level;
                Some(level)
            }
            None => {
                warn!(requested, "ignoring non-finite target RMS");
                None
            }
        }
    }

    /// Run one block through the controller in place.
    ///
    /// `blocks_per_second` is the real invocation rate (source rate / source
    /// block length). Returns the block's RMS measured before gain.
    pub fn process(&mut self, samples: &mut [f32], blocks_per_second: f32) -> f32 {
        let rms = compute_rms(samples);
        if !self.settings.enabled || rms == 0.0 {
            return rms;
        }

        let target_gain = (self.settings.target_rms / rms.max(RMS_EPSILON)).clamp(MIN_GAIN, MAX_GAIN);

        let time_constant = if target_gain > self.gain {
            ATTACK_SECS
        } else {
            RELEASE_SECS
        };
        let coeff = smoothing_coeff(time_constant, blocks_per_second);
        self.gain += (1.0 - coeff) * (target_gain - self.gain);
        self.gain = self.gain.clamp(MIN_GAIN, MAX_GAIN);

        let gain = self.gain;
        for sample in samples.iter_mut() {
            *sample = (*sample * gain).clamp(-1.0, 1.0);
        }

        rms
    }
}

impl Default for GainController {
    fn default() -> Self {
        Self::new(AgcSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// 16 kHz with 128-sample blocks.
    const BLOCKS_PER_SECOND: f32 = 125.0;

    fn square(amplitude: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| if i % 2 == 0 { amplitude } else { -amplitude })
            .collect()
    }

    /// Small deterministic LCG so property-style tests need no extra crates.
    fn noise(seed: &mut u32, len: usize, amplitude: f32) -> Vec<f32> {
        (0..len)
            .map(|_| {
                *seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                ((*seed >> 8) as f32 / (1u32 << 24) as f32 * 2.0 - 1.0) * amplitude
            })
            .collect()
    }

    #[test]
    fn rms_of_square_wave() {
        assert_relative_eq!(compute_rms(&square(0.5, 256)), 0.5, epsilon = 1e-6);
        assert_eq!(compute_rms(&[]), 0.0);
    }

    #[test]
    fn silence_leaves_gain_and_samples_untouched() {
        let mut agc = GainController::default();
        let mut block = vec![0.0f32; 128];
        let rms = agc.process(&mut block, BLOCKS_PER_SECOND);
        assert_eq!(rms, 0.0);
        assert_eq!(agc.gain(), 1.0);
        assert!(block.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn disabled_agc_is_passthrough() {
        let mut agc = GainController::new(AgcSettings {
            enabled: false,
            target_rms: 0.15,
        });
        let original = square(0.03, 128);
        let mut block = original.clone();
        let rms = agc.process(&mut block, BLOCKS_PER_SECOND);
        assert_relative_eq!(rms, 0.03, epsilon = 1e-6);
        assert_eq!(block, original);
        assert_eq!(agc.gain(), 1.0);
    }

    #[test]
    fn gain_rises_toward_target_ratio_for_quiet_input() {
        let mut agc = GainController::default();
        let mut previous = agc.gain();
        for _ in 0..60 {
            let mut block = square(0.03, 128);
            agc.process(&mut block, BLOCKS_PER_SECOND);
            assert!(agc.gain() >= previous - 1e-6, "gain must not fall");
            assert!(agc.gain() <= MAX_GAIN);
            previous = agc.gain();
        }
        assert_relative_eq!(agc.gain(), 5.0, epsilon = 1e-2);
    }

    #[test]
    fn single_step_uses_block_rate_coefficient() {
        let mut agc = GainController::default();
        let mut block = square(0.03, 128);
        agc.process(&mut block, BLOCKS_PER_SECOND);

        let coeff = smoothing_coeff(ATTACK_SECS, BLOCKS_PER_SECOND);
        let expected = 1.0 + (1.0 - coeff) * (5.0 - 1.0);
        assert_relative_eq!(agc.gain(), expected, epsilon = 1e-3);
        assert_relative_eq!(block[0], 0.03 * expected, epsilon = 1e-4);
    }

    #[test]
    fn falling_gain_uses_slower_release_constant() {
        let mut rising = GainController::default();
        let mut block = square(0.03, 128);
        rising.process(&mut block, BLOCKS_PER_SECOND);
        let rise = rising.gain() - 1.0;

        let mut falling = GainController::default();
        let mut block = square(0.75, 128);
        falling.process(&mut block, BLOCKS_PER_SECOND);
        let fall = 1.0 - falling.gain();

        let attack = 1.0 - smoothing_coeff(ATTACK_SECS, BLOCKS_PER_SECOND);
        let release = 1.0 - smoothing_coeff(RELEASE_SECS, BLOCKS_PER_SECOND);
        assert_relative_eq!(rise, attack * 4.0, epsilon = 1e-3);
        assert_relative_eq!(fall, release * 0.8, epsilon = 1e-3);
    }

    #[test]
    fn gain_and_output_stay_bounded_for_arbitrary_input() {
        let mut agc = GainController::default();
        let mut seed = 7u32;
        for round in 0..400 {
            let amplitude = match round % 4 {
                0 => 1e-5,
                1 => 0.002,
                2 => 0.4,
                _ => 1.0,
            };
            let mut block = noise(&mut seed, 128, amplitude);
            agc.process(&mut block, BLOCKS_PER_SECOND);
            assert!((MIN_GAIN..=MAX_GAIN).contains(&agc.gain()));
            assert!(block.iter().all(|s| (-1.0..=1.0).contains(s)));
        }
    }

    #[test]
    fn loud_input_is_hard_clipped() {
        let mut agc = GainController::default();
        // Drive gain to the ceiling with a whisper, then hit it with a near-full-scale block.
        for _ in 0..200 {
            let mut block = square(0.001, 128);
            agc.process(&mut block, BLOCKS_PER_SECOND);
        }
        assert_relative_eq!(agc.gain(), MAX_GAIN, epsilon = 1e-3);

        let mut block = square(0.9, 128);
        agc.process(&mut block, BLOCKS_PER_SECOND);
        assert!(block.iter().all(|s| s.abs() <= 1.0));
        assert!(block.iter().any(|s| s.abs() == 1.0));
    }

    #[test]
    fn coefficient_depends_on_block_rate() {
        let slow = smoothing_coeff(RELEASE_SECS, 125.0);
        let fast = smoothing_coeff(RELEASE_SECS, 375.0);
        assert!(fast > slow, "more blocks per second → smaller step per block");
        assert_eq!(smoothing_coeff(0.0, 125.0), 0.0);
        assert_eq!(smoothing_coeff(0.1, 0.0), 0.0);
    }

    #[test]
    fn target_rms_is_clamped_or_rejected() {
        let mut agc = GainController::default();
        assert_eq!(agc.set_target_rms(-0.5), Some(TARGET_RMS_MIN));
        assert_eq!(agc.set_target_rms(4.0), Some(TARGET_RMS_MAX));
        assert_eq!(agc.set_target_rms(0.2), Some(0.2));
        assert_eq!(agc.set_target_rms(f32::NAN), None);
        assert_eq!(agc.settings().target_rms, 0.2);
    }
}

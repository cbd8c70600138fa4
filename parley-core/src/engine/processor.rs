//! Per-block capture processor.
//!
//! ## Stages (per `process_block` call)
//!
//! ```text
//! 0. Apply pending control messages (start / stop / config)
//! 1. Inactive or empty input → return nothing
//! 2. Normalise to the target rate (nearest-neighbour)
//! 3. AGC: RMS, smoothed gain update, gain + hard clip
//! 4. Noise floor: count block, record RMS, maybe re-estimate, maybe report
//! 5. Append to the accumulator
//! 6. Drain full chunks → 16-bit PCM → `ProcessorMessage::Audio`
//! ```
//!
//! All state is owned here. The host talks to it only through a
//! [`ControlInbox`] and by receiving the returned messages. The inbox is
//! polled at the start of each block and again right before each chunk is
//! built and right before it is emitted, so a `stop` that lands mid-drain
//! always wins: the chunk in flight is dropped and the accumulator cleared.

use std::collections::VecDeque;

use crossbeam_channel::Receiver;
use tracing::{debug, info};

use crate::{
    audio::{
        gain::{AgcSettings, GainController},
        resample::{RateNormalizer, SourceRate},
    },
    buffering::chunk::ChunkAccumulator,
    error::{ParleyError, Result},
    ipc::events::{ControlMessage, NoiseFloorReport, ProcessorMessage},
    vad::NoiseFloorEstimator,
};

/// Default transport rate (Hz).
pub const DEFAULT_TARGET_RATE: u32 = 16_000;
/// Default chunk length in samples at the target rate (≈1 s at 16 kHz).
pub const DEFAULT_CHUNK_SIZE: usize = 16_384;

/// Ordered source of control messages, drained without blocking.
pub trait ControlInbox {
    /// Next pending message, or `None` when nothing is waiting.
    fn poll(&mut self) -> Option<ControlMessage>;
}

impl ControlInbox for Receiver<ControlMessage> {
    fn poll(&mut self) -> Option<ControlMessage> {
        self.try_recv().ok()
    }
}

impl ControlInbox for VecDeque<ControlMessage> {
    fn poll(&mut self) -> Option<ControlMessage> {
        self.pop_front()
    }
}

/// An inbox that never has anything in it.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoControl;

impl ControlInbox for NoControl {
    fn poll(&mut self) -> Option<ControlMessage> {
        None
    }
}

/// Construction-time parameters supplied by the host.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Rate the transport expects. Default: 16000.
    pub target_sample_rate: u32,
    /// Samples per emitted chunk. Default: 16384.
    pub chunk_size: usize,
    /// Which source-rate assumption applies.
    pub source_rate: SourceRate,
    /// Initial AGC enablement and target level.
    pub agc: AgcSettings,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: DEFAULT_TARGET_RATE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            source_rate: SourceRate::default(),
            agc: AgcSettings::default(),
        }
    }
}

/// Owns all per-session DSP state and turns source blocks into messages.
pub struct CaptureProcessor {
    normalizer: RateNormalizer,
    gain: GainController,
    noise: NoiseFloorEstimator,
    accumulator: ChunkAccumulator,
    active: bool,
    /// Bumped on every `stop`; a chunk built under an older value is stale.
    stop_epoch: u64,
}

impl CaptureProcessor {
    /// # Errors
    /// `ParleyError::InvalidConfig` for a zero chunk size or zero sample rate.
    pub fn new(config: ProcessorConfig) -> Result<Self> {
        if config.chunk_size == 0 {
            return Err(ParleyError::InvalidConfig("chunk size must be non-zero".into()));
        }
        let normalizer = RateNormalizer::new(config.source_rate, config.target_sample_rate)?;

        let mut gain = GainController::new(AgcSettings {
            enabled: config.agc.enabled,
            ..AgcSettings::default()
        });
        gain.set_target_rms(config.agc.target_rms);

        info!(
            source_rate = normalizer.source_rate(),
            target_rate = normalizer.target_rate(),
            chunk_size = config.chunk_size,
            agc = config.agc.enabled,
            "capture processor ready"
        );

        Ok(Self {
            normalizer,
            gain,
            noise: NoiseFloorEstimator::new(),
            accumulator: ChunkAccumulator::new(config.chunk_size),
            active: true,
            stop_epoch: 0,
        })
    }

    /// Apply one control message immediately.
    pub fn handle_control(&mut self, message: ControlMessage) {
        match message {
            ControlMessage::Start => {
                if !self.active {
                    self.active = true;
                    info!("capture started");
                }
            }
            ControlMessage::Stop => {
                let dropped = self.accumulator.len();
                self.accumulator.clear();
                self.stop_epoch += 1;
                if self.active {
                    self.active = false;
                    info!(dropped_samples = dropped, "capture stopped");
                }
            }
            ControlMessage::Config {
                enable_agc,
                target_rms,
            } => {
                if let Some(enabled) = enable_agc {
                    self.gain.set_enabled(enabled);
                }
                if let Some(level) = target_rms {
                    self.gain.set_target_rms(level);
                }
                let settings = self.gain.settings();
                info!(
                    agc = settings.enabled,
                    target_rms = settings.target_rms,
                    "agc settings updated"
                );
            }
        }
    }

    /// Drain and apply everything waiting in `inbox`, in order.
    pub fn apply_pending<I: ControlInbox + ?Sized>(&mut self, inbox: &mut I) {
        while let Some(message) = inbox.poll() {
            self.handle_control(message);
        }
    }

    /// Process one input block at the source rate.
    ///
    /// Never fails: empty input, silence and disabled AGC all degrade to
    /// passthrough or no-op. Returned messages are in emission order.
    pub fn process_block<I: ControlInbox + ?Sized>(
        &mut self,
        inbox: &mut I,
        input: &[f32],
    ) -> Vec<ProcessorMessage> {
        self.apply_pending(inbox);

        let mut out = Vec::new();
        if input.is_empty() || !self.active {
            return out;
        }

        let blocks_per_second = self.normalizer.source_rate() as f32 / input.len() as f32;
        let mut block = self.normalizer.process(input);
        if block.is_empty() {
            // Too short to yield a sample at the target rate.
            return out;
        }
        let rms = self.gain.process(&mut block, blocks_per_second);

        self.noise.observe(rms);
        if self.noise.should_report() {
            out.push(ProcessorMessage::NoiseFloor(NoiseFloorReport {
                noise_floor: self.noise.noise_floor(),
                current_rms: rms,
                current_gain: self.gain.gain(),
            }));
        }

        self.accumulator.push(&block);
        self.drain_chunks(inbox, &mut out);
        out
    }

    fn drain_chunks<I: ControlInbox + ?Sized>(
        &mut self,
        inbox: &mut I,
        out: &mut Vec<ProcessorMessage>,
    ) {
        while self.accumulator.is_ready() {
            let epoch = self.stop_epoch;

            self.apply_pending(inbox);
            if self.stopped_since(epoch) {
                self.abandon_drain(out);
                return;
            }

            let chunk = self.accumulator.encode_front();

            self.apply_pending(inbox);
            if self.stopped_since(epoch) {
                debug!(samples = chunk.len(), "stop arrived mid-drain, chunk discarded");
                self.abandon_drain(out);
                return;
            }

            out.push(ProcessorMessage::Audio(chunk));
            self.accumulator.consume_front();
        }
    }

    fn stopped_since(&self, epoch: u64) -> bool {
        !self.active || self.stop_epoch != epoch
    }

    /// Chunks only reach the host when `process_block` returns, so anything
    /// queued earlier in this call is withdrawn too.
    fn abandon_drain(&mut self, out: &mut Vec<ProcessorMessage>) {
        self.accumulator.clear();
        out.retain(|m| !matches!(m, ProcessorMessage::Audio(_)));
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn gain(&self) -> f32 {
        self.gain.gain()
    }

    pub fn agc_settings(&self) -> AgcSettings {
        self.gain.settings()
    }

    pub fn noise_floor(&self) -> f32 {
        self.noise.noise_floor()
    }

    /// Active blocks processed since construction.
    pub fn chunk_count(&self) -> u64 {
        self.noise.chunk_count()
    }

    /// Noise-floor re-estimations performed so far.
    pub fn noise_estimates(&self) -> u64 {
        self.noise.estimates()
    }

    /// Samples waiting in the accumulator.
    pub fn buffered_len(&self) -> usize {
        self.accumulator.len()
    }

    pub fn chunk_size(&self) -> usize {
        self.accumulator.chunk_size()
    }

    pub fn source_rate(&self) -> u32 {
        self.normalizer.source_rate()
    }

    pub fn target_rate(&self) -> u32 {
        self.normalizer.target_rate()
    }
}

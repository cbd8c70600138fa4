//! Blocking pipeline loop.
//!
//! ## Per iteration
//!
//! ```text
//! 1. Check running flag
//! 2. Less than one render quantum in the ring → apply pending controls, sleep
//! 3. Pop exactly one quantum
//! 4. CaptureProcessor::process_block (controls applied first, inside)
//! 5. Forward: audio → bounded crossbeam channel (try_send, never blocks)
//!             noiseFloor → tokio broadcast (lossy)
//! ```
//!
//! Control messages and block processing share this one thread, so the
//! processor needs no locking. This loop runs in `spawn_blocking`, keeping the
//! Tokio executor free.

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{
    buffering::{pcm::PcmChunk, AudioConsumer, Consumer, Observer},
    engine::processor::CaptureProcessor,
    ipc::events::{ControlMessage, NoiseFloorReport, ProcessorMessage},
};

/// Live pipeline counters, shared between the loop and the engine.
#[derive(Default)]
pub struct PipelineDiagnostics {
    pub frames_in: AtomicUsize,
    pub blocks_processed: AtomicUsize,
    pub chunks_emitted: AtomicUsize,
    pub chunks_dropped: AtomicUsize,
    pub reports_emitted: AtomicUsize,
}

impl PipelineDiagnostics {
    pub fn reset(&self) {
        self.frames_in.store(0, Ordering::Relaxed);
        self.blocks_processed.store(0, Ordering::Relaxed);
        self.chunks_emitted.store(0, Ordering::Relaxed);
        self.chunks_dropped.store(0, Ordering::Relaxed);
        self.reports_emitted.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            frames_in: self.frames_in.load(Ordering::Relaxed),
            blocks_processed: self.blocks_processed.load(Ordering::Relaxed),
            chunks_emitted: self.chunks_emitted.load(Ordering::Relaxed),
            chunks_dropped: self.chunks_dropped.load(Ordering::Relaxed),
            reports_emitted: self.reports_emitted.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`PipelineDiagnostics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiagnosticsSnapshot {
    pub frames_in: usize,
    pub blocks_processed: usize,
    pub chunks_emitted: usize,
    pub chunks_dropped: usize,
    pub reports_emitted: usize,
}

/// All context the pipeline needs, passed as one struct so the closure stays tidy.
pub struct PipelineContext {
    pub processor: CaptureProcessor,
    pub consumer: AudioConsumer,
    pub control_rx: Receiver<ControlMessage>,
    pub running: Arc<AtomicBool>,
    /// Source frames handed to the processor per invocation.
    pub render_quantum: usize,
    pub audio_tx: Sender<PcmChunk>,
    pub noise_tx: broadcast::Sender<NoiseFloorReport>,
    pub diagnostics: Arc<PipelineDiagnostics>,
}

/// Sleep when less than one quantum is buffered.
const EMPTY_SLEEP_MS: u64 = 2;
/// Blocks between level log lines (≈4 s of 128-frame quanta at 48 kHz).
const LEVEL_LOG_INTERVAL: usize = 1_500;

/// Run the blocking pipeline until `ctx.running` becomes false.
pub fn run(mut ctx: PipelineContext) {
    info!(
        render_quantum = ctx.render_quantum,
        source_rate = ctx.processor.source_rate(),
        "pipeline started"
    );

    let mut block = vec![0f32; ctx.render_quantum.max(1)];

    loop {
        if !ctx.running.load(Ordering::Relaxed) {
            break;
        }

        if ctx.consumer.occupied_len() < block.len() {
            // Honour stop/start even while no audio is arriving.
            ctx.processor.apply_pending(&mut ctx.control_rx);
            std::thread::sleep(Duration::from_millis(EMPTY_SLEEP_MS));
            continue;
        }

        let n = ctx.consumer.pop_slice(&mut block);
        ctx.diagnostics.frames_in.fetch_add(n, Ordering::Relaxed);
        let blocks = ctx.diagnostics.blocks_processed.fetch_add(1, Ordering::Relaxed) + 1;

        let messages = ctx.processor.process_block(&mut ctx.control_rx, &block[..n]);
        forward(&ctx, messages);

        if blocks % LEVEL_LOG_INTERVAL == 0 {
            debug!(
                gain = ctx.processor.gain(),
                noise_floor = ctx.processor.noise_floor(),
                buffered = ctx.processor.buffered_len(),
                active = ctx.processor.is_active(),
                "pipeline levels"
            );
        }
    }

    // Whatever is still queued (typically the stop sent by the engine) is applied
    // so the accumulator is cleared before the processor is dropped.
    ctx.processor.apply_pending(&mut ctx.control_rx);
    info!(
        diagnostics = ?ctx.diagnostics.snapshot(),
        "pipeline stopped"
    );
}

fn forward(ctx: &PipelineContext, messages: Vec<ProcessorMessage>) {
    for message in messages {
        match message {
            ProcessorMessage::Audio(chunk) => match ctx.audio_tx.try_send(chunk) {
                Ok(()) => {
                    ctx.diagnostics.chunks_emitted.fetch_add(1, Ordering::Relaxed);
                }
                Err(TrySendError::Full(_)) => {
                    ctx.diagnostics.chunks_dropped.fetch_add(1, Ordering::Relaxed);
                    warn!("audio consumer is behind, chunk dropped");
                }
                Err(TrySendError::Disconnected(_)) => {
                    ctx.diagnostics.chunks_dropped.fetch_add(1, Ordering::Relaxed);
                    debug!("no audio consumer, chunk dropped");
                }
            },
            ProcessorMessage::NoiseFloor(report) => {
                debug!(
                    noise_floor = report.noise_floor,
                    rms = report.current_rms,
                    gain = report.current_gain,
                    "noise floor report"
                );
                // No subscribers is fine; reports are informational.
                let _ = ctx.noise_tx.send(report);
                ctx.diagnostics.reports_emitted.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

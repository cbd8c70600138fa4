//! # parley-core
//!
//! Real-time microphone capture and conditioning for speech transport.
//!
//! ## Architecture
//!
//! ```text
//! Microphone → AudioCapture → SPSC RingBuffer → Pipeline(spawn_blocking)
//!                                                    │
//!                                    CaptureProcessor::process_block
//!                          (rate normalise → AGC → noise floor → accumulate)
//!                                                    │
//!                         ┌──────────────────────────┴───────────────┐
//!          crossbeam::Sender<PcmChunk>              broadcast::Sender<NoiseFloorReport>
//! ```
//!
//! The audio callback is lock-free. All per-block work happens on the pipeline
//! thread, which also owns the processor and applies control messages.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod engine;
pub mod error;
pub mod ipc;
pub mod vad;

// Convenience re-exports for downstream crates
pub use audio::{gain::AgcSettings, resample::SourceRate};
pub use buffering::pcm::PcmChunk;
pub use engine::processor::{CaptureProcessor, ControlInbox, NoControl, ProcessorConfig};
pub use engine::{CaptureEngine, EngineConfig};
pub use error::ParleyError;
pub use ipc::events::{
    ControlMessage, EngineStatus, EngineStatusEvent, NoiseFloorReport, ProcessorMessage,
};

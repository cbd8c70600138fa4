//! `CaptureEngine`: top-level lifecycle controller.
//!
//! ## Lifecycle
//!
//! ```text
//! CaptureEngine::new()
//!     └─► start()              → mic open, pipeline spawned, status = Capturing
//!         ├─► pause_capture()  → `stop` sent, buffered audio discarded, status = Paused
//!         ├─► resume_capture() → `start` sent, status = Capturing
//!         ├─► configure()      → `config` sent
//!         └─► stop()           → `stop` sent, running=false, device released, status = Stopped
//! ```
//!
//! ## Threading
//!
//! `cpal::Stream` is `!Send` on Windows/macOS. `AudioCapture` is created
//! inside the `spawn_blocking` closure and never crosses a thread boundary. A
//! sync oneshot channel propagates open-device errors back to `start()`.
//!
//! The processor itself lives on that same blocking thread. The engine only
//! holds the sending half of the control channel.
//!
//! Every `start()` creates a fresh [`Session`] with its own running flag, so a
//! quick stop/start never revives the previous pipeline. `stop()` waits for
//! the old thread to drop its stream before returning.

pub mod pipeline;
pub mod processor;

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::{
    audio::{gain::AgcSettings, resample::SourceRate, AudioCapture},
    buffering::{create_audio_ring, pcm::PcmChunk},
    error::{ParleyError, Result},
    ipc::events::{ControlMessage, EngineStatus, EngineStatusEvent, NoiseFloorReport},
};

use self::processor::{CaptureProcessor, ProcessorConfig, DEFAULT_CHUNK_SIZE, DEFAULT_TARGET_RATE};

/// Broadcast channel capacity for telemetry and status events.
const BROADCAST_CAP: usize = 64;
/// Upper bound on how long `stop()` waits for the pipeline thread to exit.
const STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Configuration for `CaptureEngine`.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Transport sample rate (Hz). Default: 16000.
    pub target_sample_rate: u32,
    /// Samples per emitted chunk. Default: 16384.
    pub chunk_size: usize,
    /// Source frames per processor invocation. Default: 128.
    pub render_quantum: usize,
    /// Pin the source-rate assumption. `None` trusts the rate the device reports.
    pub source_rate: Option<SourceRate>,
    /// Initial AGC settings.
    pub agc: AgcSettings,
    /// Input device name; `None` uses the system default.
    pub preferred_input_device: Option<String>,
    /// Chunks buffered for a slow audio consumer before new ones are dropped.
    pub audio_queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: DEFAULT_TARGET_RATE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            render_quantum: 128,
            source_rate: None,
            agc: AgcSettings::default(),
            preferred_input_device: None,
            audio_queue_capacity: 8,
        }
    }
}

impl EngineConfig {
    /// Processor parameters for a device running at `device_rate`.
    pub fn processor_config(&self, device_rate: u32) -> ProcessorConfig {
        ProcessorConfig {
            target_sample_rate: self.target_sample_rate,
            chunk_size: self.chunk_size,
            source_rate: self
                .source_rate
                .unwrap_or(SourceRate::Reported(device_rate)),
            agc: self.agc,
        }
    }
}

/// Handles for one start → stop cycle.
struct Session {
    /// Cleared by `stop()`; the pipeline loop and capture callback watch it.
    running: Arc<AtomicBool>,
    control_tx: Sender<ControlMessage>,
    /// Disconnects when the pipeline thread has released the device.
    finished: Receiver<()>,
}

/// The top-level engine handle.
///
/// `Send + Sync`; wrap in `Arc` to share between the host's control and
/// consumer tasks.
pub struct CaptureEngine {
    config: EngineConfig,
    /// Live capture session, `None` while idle or stopped.
    session: Mutex<Option<Session>>,
    status: Arc<Mutex<EngineStatus>>,
    audio_tx: Sender<PcmChunk>,
    /// Handed out once through `take_audio_receiver`.
    audio_rx: Mutex<Option<Receiver<PcmChunk>>>,
    noise_tx: broadcast::Sender<NoiseFloorReport>,
    status_tx: broadcast::Sender<EngineStatusEvent>,
    diagnostics: Arc<pipeline::PipelineDiagnostics>,
}

impl CaptureEngine {
    /// Create a new engine. Does not open the device; call `start()`.
    pub fn new(config: EngineConfig) -> Self {
        let (audio_tx, audio_rx) = crossbeam_channel::bounded(config.audio_queue_capacity.max(1));
        let (noise_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (status_tx, _) = broadcast::channel(BROADCAST_CAP);

        Self {
            config,
            session: Mutex::new(None),
            status: Arc::new(Mutex::new(EngineStatus::Idle)),
            audio_tx,
            audio_rx: Mutex::new(Some(audio_rx)),
            noise_tx,
            status_tx,
            diagnostics: Arc::new(pipeline::PipelineDiagnostics::default()),
        }
    }

    /// Open the microphone and start the pipeline.
    ///
    /// Blocks until the device is confirmed open (or fails). Must be called
    /// from within a Tokio runtime.
    ///
    /// # Errors
    /// - `ParleyError::AlreadyRunning` if already started.
    /// - `ParleyError::NoDefaultInputDevice` / `ParleyError::AudioStream` on device error.
    /// - `ParleyError::InvalidConfig` if the processor rejects the configuration.
    pub fn start(&self) -> Result<()> {
        let mut session = self.session.lock();
        if session.is_some() {
            return Err(ParleyError::AlreadyRunning);
        }

        self.diagnostics.reset();

        let (producer, consumer) = create_audio_ring();
        let (control_tx, control_rx) = crossbeam_channel::unbounded();
        let (finished_tx, finished_rx) = crossbeam_channel::bounded::<()>(0);

        let config = self.config.clone();
        let session_running = Arc::new(AtomicBool::new(true));
        let running = Arc::clone(&session_running);
        let audio_tx = self.audio_tx.clone();
        let noise_tx = self.noise_tx.clone();
        let diagnostics = Arc::clone(&self.diagnostics);

        // Carries the device rate on success.
        let (open_tx, open_rx) = std::sync::mpsc::channel::<Result<u32>>();

        tokio::task::spawn_blocking(move || {
            // Dropped when this closure returns, on every path.
            let _finished = finished_tx;

            // ── Open audio device (must happen on THIS thread, cpal::Stream is !Send) ──
            let capture = match AudioCapture::open_with_preference(
                producer,
                Arc::clone(&running),
                config.preferred_input_device.as_deref(),
            ) {
                Ok(c) => c,
                Err(e) => {
                    let _ = open_tx.send(Err(e));
                    running.store(false, Ordering::SeqCst);
                    return;
                }
            };

            let processor = match CaptureProcessor::new(config.processor_config(capture.sample_rate))
            {
                Ok(p) => p,
                Err(e) => {
                    capture.stop();
                    let _ = open_tx.send(Err(e));
                    running.store(false, Ordering::SeqCst);
                    return;
                }
            };
            let _ = open_tx.send(Ok(capture.sample_rate));

            pipeline::run(pipeline::PipelineContext {
                processor,
                consumer,
                control_rx,
                running,
                render_quantum: config.render_quantum,
                audio_tx,
                noise_tx,
                diagnostics,
            });

            // Stream drops here, releasing the audio device on this thread.
            capture.stop();
            drop(capture);
        });

        match open_rx.recv() {
            Ok(Ok(rate)) => {
                *session = Some(Session {
                    running: session_running,
                    control_tx,
                    finished: finished_rx,
                });
                self.set_status(EngineStatus::Capturing, Some(format!("{rate} Hz")));
                info!(device_rate = rate, "engine started, capturing");
                Ok(())
            }
            Ok(Err(e)) => {
                self.set_status(EngineStatus::Error, Some(e.to_string()));
                Err(e)
            }
            Err(_) => {
                session_running.store(false, Ordering::SeqCst);
                self.set_status(EngineStatus::Error, Some("pipeline failed to start".into()));
                Err(ParleyError::Other(anyhow::anyhow!(
                    "pipeline task died unexpectedly"
                )))
            }
        }
    }

    /// Discard buffered audio, end the pipeline and release the device.
    ///
    /// Blocks until the pipeline thread has exited (bounded by a timeout).
    ///
    /// # Errors
    /// `ParleyError::NotRunning` if not currently running.
    pub fn stop(&self) -> Result<()> {
        let session = self.session.lock().take().ok_or(ParleyError::NotRunning)?;

        let _ = session.control_tx.send(ControlMessage::Stop);
        session.running.store(false, Ordering::SeqCst);
        if let Err(RecvTimeoutError::Timeout) = session.finished.recv_timeout(STOP_TIMEOUT) {
            warn!("pipeline did not exit within {STOP_TIMEOUT:?}");
        }

        self.set_status(EngineStatus::Stopped, None);
        info!("engine stopped, device released");
        Ok(())
    }

    /// Send `stop` without releasing the device.
    pub fn pause_capture(&self) -> Result<()> {
        self.send_control(ControlMessage::Stop)?;
        self.set_status(EngineStatus::Paused, None);
        Ok(())
    }

    /// Send `start` after a pause.
    pub fn resume_capture(&self) -> Result<()> {
        self.send_control(ControlMessage::Start)?;
        self.set_status(EngineStatus::Capturing, None);
        Ok(())
    }

    /// Send a `config` message carrying both AGC fields.
    pub fn configure(&self, settings: AgcSettings) -> Result<()> {
        self.send_control(ControlMessage::Config {
            enable_agc: Some(settings.enabled),
            target_rms: Some(settings.target_rms),
        })
    }

    /// Queue a control message for the processor. It is applied before the
    /// next block is processed.
    ///
    /// # Errors
    /// - `ParleyError::NotRunning` before `start()` / after `stop()`.
    /// - `ParleyError::ControlChannelClosed` if the pipeline thread has exited.
    pub fn send_control(&self, message: ControlMessage) -> Result<()> {
        let guard = self.session.lock();
        let session = guard.as_ref().ok_or(ParleyError::NotRunning)?;
        session
            .control_tx
            .send(message)
            .map_err(|_| ParleyError::ControlChannelClosed)
    }

    /// Current engine status (snapshot).
    pub fn status(&self) -> EngineStatus {
        *self.status.lock()
    }

    pub fn is_running(&self) -> bool {
        self.session
            .lock()
            .as_ref()
            .is_some_and(|s| s.running.load(Ordering::SeqCst))
    }

    /// Receiver for encoded chunks. Returns `None` once taken; chunks are
    /// delivered to a single consumer.
    pub fn take_audio_receiver(&self) -> Option<Receiver<PcmChunk>> {
        self.audio_rx.lock().take()
    }

    /// Subscribe to periodic noise floor telemetry.
    pub fn subscribe_noise_floor(&self) -> broadcast::Receiver<NoiseFloorReport> {
        self.noise_tx.subscribe()
    }

    /// Subscribe to engine status changes.
    pub fn subscribe_status(&self) -> broadcast::Receiver<EngineStatusEvent> {
        self.status_tx.subscribe()
    }

    /// Snapshot of pipeline counters for observability.
    pub fn pipeline_diagnostics_snapshot(&self) -> pipeline::DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn set_status(&self, new_status: EngineStatus, detail: Option<String>) {
        *self.status.lock() = new_status;
        let _ = self.status_tx.send(EngineStatusEvent {
            status: new_status,
            detail,
        });
    }
}

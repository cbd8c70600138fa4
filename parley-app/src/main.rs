//! Parley reference host.
//!
//! Opens the microphone through `CaptureEngine`, writes every emitted chunk to
//! an optional WAV file, logs noise floor telemetry, and accepts control
//! commands on stdin until `quit`, Ctrl-C or `--seconds` elapses.

mod console;
mod settings;
mod sink;

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Context};
use console::ConsoleCommand;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use parley_core::{CaptureEngine, ControlMessage, PcmChunk};
use settings::{
    apply_env_overrides, default_settings_path, load_settings, save_settings, AppSettings,
};
use sink::WavSink;
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tracing::{debug, info, warn};

const USAGE: &str = "Usage: parley [--settings <file>] [--output <file.wav>] [--device <name>] [--seconds <n>]";

#[derive(Debug, Default, PartialEq)]
struct Args {
    settings_path: Option<PathBuf>,
    output: Option<PathBuf>,
    device: Option<String>,
    seconds: Option<u64>,
    help: bool,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Args, String> {
    let mut parsed = Args::default();

    let mut it = args.into_iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--settings" => {
                let Some(v) = it.next() else {
                    return Err("missing value for --settings".into());
                };
                parsed.settings_path = Some(PathBuf::from(v));
            }
            "--output" => {
                let Some(v) = it.next() else {
                    return Err("missing value for --output".into());
                };
                parsed.output = Some(PathBuf::from(v));
            }
            "--device" => {
                let Some(v) = it.next() else {
                    return Err("missing value for --device".into());
                };
                parsed.device = Some(v);
            }
            "--seconds" => {
                let Some(v) = it.next() else {
                    return Err("missing value for --seconds".into());
                };
                let secs = v
                    .parse::<u64>()
                    .map_err(|_| "invalid value for --seconds".to_string())?;
                parsed.seconds = Some(secs.max(1));
            }
            "--help" | "-h" => parsed.help = true,
            other => {
                return Err(format!("unknown argument: {other}"));
            }
        }
    }
    Ok(parsed)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Tracing ───────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("parley=info,parley_core=info")),
        )
        .init();

    let args = parse_args(std::env::args().skip(1)).map_err(|e| anyhow!("{e}\n{USAGE}"))?;
    if args.help {
        println!("{USAGE}\n{}", console::HELP);
        return Ok(());
    }

    // ── Settings ──────────────────────────────────────────────────────────
    let settings_path = args.settings_path.clone().unwrap_or_else(default_settings_path);
    if !settings_path.exists() {
        if let Err(e) = save_settings(&settings_path, &AppSettings::default()) {
            warn!(settings_path = ?settings_path, "could not write default settings: {e}");
        }
    }
    let mut app_settings = load_settings(&settings_path);
    apply_env_overrides(&mut app_settings);
    if let Some(device) = args.device.clone() {
        app_settings.preferred_input_device = Some(device);
    }
    info!(
        settings_path = ?settings_path,
        agc = app_settings.enable_agc,
        target_rms = app_settings.target_rms,
        chunk_size = app_settings.chunk_size,
        source_rate_hint = %app_settings.source_rate_hint,
        "runtime settings loaded"
    );

    // ── Engine setup ──────────────────────────────────────────────────────
    let config = app_settings.engine_config();
    let target_rate = config.target_sample_rate;
    let engine = Arc::new(CaptureEngine::new(config));

    let audio_rx = engine
        .take_audio_receiver()
        .context("audio receiver already taken")?;
    spawn_status_logger(&engine);
    spawn_noise_floor_logger(&engine);

    let sink = match &args.output {
        Some(path) => {
            info!(output = ?path, "writing chunks to WAV");
            Some(WavSink::create(path, target_rate)?)
        }
        None => None,
    };
    let sink_running = Arc::new(AtomicBool::new(true));
    let sink_handle = spawn_sink(audio_rx, sink, Arc::clone(&sink_running));

    engine.start().context("failed to start capture")?;

    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel();
    spawn_console(cmd_tx);

    let seconds = args.seconds;
    let deadline = async move {
        match seconds {
            Some(s) => tokio::time::sleep(Duration::from_secs(s)).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            Some(command) = cmd_rx.recv() => match command {
                ConsoleCommand::Quit => break,
                ConsoleCommand::Control(message) => apply_control(&engine, message),
            },
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received");
                break;
            }
            _ = &mut deadline => {
                info!("capture duration elapsed");
                break;
            }
        }
    }

    // ── Shutdown ──────────────────────────────────────────────────────────
    if let Err(e) = engine.stop() {
        warn!("engine stop: {e}");
    }
    sink_running.store(false, Ordering::SeqCst);
    let samples_written = sink_handle
        .join()
        .map_err(|_| anyhow!("sink thread panicked"))??;

    info!(
        samples_written,
        diagnostics = ?engine.pipeline_diagnostics_snapshot(),
        "parley stopped"
    );
    Ok(())
}

fn apply_control(engine: &CaptureEngine, message: ControlMessage) {
    let result = match message {
        ControlMessage::Start => engine.resume_capture(),
        ControlMessage::Stop => engine.pause_capture(),
        config @ ControlMessage::Config { .. } => engine.send_control(config),
    };
    if let Err(e) = result {
        warn!(?message, "control rejected: {e}");
    }
}

fn spawn_status_logger(engine: &CaptureEngine) {
    let mut status_rx = engine.subscribe_status();
    tokio::spawn(async move {
        loop {
            match status_rx.recv().await {
                Ok(event) => info!(status = ?event.status, detail = ?event.detail, "engine status"),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });
}

fn spawn_noise_floor_logger(engine: &CaptureEngine) {
    let mut noise_rx = engine.subscribe_noise_floor();
    tokio::spawn(async move {
        loop {
            match noise_rx.recv().await {
                Ok(report) => info!(
                    noise_floor = report.noise_floor,
                    rms = report.current_rms,
                    gain = report.current_gain,
                    "noise floor"
                ),
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "noise floor reports lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });
}

/// Blocking stdin reader. Exits on `quit`, EOF, or once the receiver is gone.
fn spawn_console(cmd_tx: mpsc::UnboundedSender<ConsoleCommand>) {
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else { break };
            match console::parse_line(&line) {
                Ok(Some(command)) => {
                    let quit = command == ConsoleCommand::Quit;
                    if cmd_tx.send(command).is_err() || quit {
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("{e:#}"),
            }
        }
    });
}

/// Consume chunks until shutdown, appending them to the WAV sink if any.
/// Returns the number of samples received.
fn spawn_sink(
    audio_rx: Receiver<PcmChunk>,
    mut sink: Option<WavSink>,
    running: Arc<AtomicBool>,
) -> JoinHandle<anyhow::Result<u64>> {
    std::thread::spawn(move || {
        let mut samples = 0u64;
        loop {
            match audio_rx.recv_timeout(Duration::from_millis(100)) {
                Ok(chunk) => {
                    samples += chunk.len() as u64;
                    if let Some(sink) = sink.as_mut() {
                        sink.write_chunk(&chunk)?;
                    }
                    debug!(
                        samples = chunk.len(),
                        bytes = chunk.len() * 2,
                        total = samples,
                        "audio chunk"
                    );
                }
                Err(RecvTimeoutError::Timeout) => {
                    if !running.load(Ordering::SeqCst) {
                        break;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        match sink {
            Some(sink) => {
                debug_assert_eq!(sink.samples_written(), samples);
                sink.finalize()
            }
            None => Ok(samples),
        }
    })
}

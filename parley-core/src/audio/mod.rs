//! Audio capture and the per-block signal stages.
//!
//! - [`resample`]: nearest-neighbour rate normalisation to the transport rate.
//! - [`gain`]: block-rate AGC.
//! - [`AudioCapture`]: cpal input stream feeding the SPSC ring.
//!
//! # Capture constraints
//!
//! The cpal input callback runs on an OS audio thread at elevated priority. It
//! must not block or perform I/O. It only downmixes to mono into a scratch
//! buffer that is sized once, and pushes into the lock-free ring producer.
//!
//! `cpal::Stream` is `!Send` on most platforms, so `AudioCapture` must be created
//! and dropped on the same thread. The engine does both inside `spawn_blocking`.

pub mod gain;
pub mod resample;

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, StreamTrait},
    FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig,
};

use crate::{
    buffering::AudioProducer,
    error::{ParleyError, Result},
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
#[cfg(feature = "audio-cpal")]
use tracing::{error, info, warn};

/// Scratch capacity for the mono downmix (frames). Larger callbacks are split.
#[cfg(feature = "audio-cpal")]
const MIX_SCRATCH_FRAMES: usize = 4_096;

/// Handle to an active microphone stream.
///
/// **Not `Send`**: create and drop on the same OS thread.
pub struct AudioCapture {
    /// Kept alive so the stream is not dropped prematurely.
    #[cfg(feature = "audio-cpal")]
    _stream: Stream,
    /// Shared flag. Set to `false` to make the callback a no-op.
    running: Arc<AtomicBool>,
    /// Rate the device actually runs at (Hz).
    pub sample_rate: u32,
    /// Name of the opened device, when the backend reports one.
    pub device_name: String,
}

impl AudioCapture {
    /// Open an input device by preferred name, otherwise the default input
    /// device, otherwise the first available one.
    #[cfg(feature = "audio-cpal")]
    pub fn open_with_preference(
        producer: AudioProducer,
        running: Arc<AtomicBool>,
        preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        use cpal::traits::HostTrait;

        let host = cpal::default_host();

        let preferred = preferred_device_name.and_then(|wanted| {
            let found = host
                .input_devices()
                .map_err(|e| warn!("failed to list input devices: {e}"))
                .ok()?
                .find(|d| d.name().map(|n| n == wanted).unwrap_or(false));
            if found.is_none() {
                warn!(device = wanted, "preferred input device not found, falling back");
            }
            found
        });

        let device = match preferred.or_else(|| host.default_input_device()) {
            Some(device) => device,
            None => {
                warn!("no default input device, falling back to first available input");
                host.input_devices()
                    .map_err(|e| ParleyError::AudioDevice(e.to_string()))?
                    .next()
                    .ok_or(ParleyError::NoDefaultInputDevice)?
            }
        };

        let device_name = device.name().unwrap_or_default();
        let supported = device
            .default_input_config()
            .map_err(|e| ParleyError::AudioDevice(e.to_string()))?;
        let sample_rate = supported.sample_rate().0;
        let config: StreamConfig = supported.config();

        info!(
            device = device_name.as_str(),
            sample_rate,
            channels = config.channels,
            format = ?supported.sample_format(),
            "opening input device"
        );

        let stream = match supported.sample_format() {
            SampleFormat::F32 => build_mono_stream::<f32>(&device, &config, producer, &running),
            SampleFormat::I16 => build_mono_stream::<i16>(&device, &config, producer, &running),
            SampleFormat::U16 => build_mono_stream::<u16>(&device, &config, producer, &running),
            SampleFormat::U8 => build_mono_stream::<u8>(&device, &config, producer, &running),
            fmt => {
                return Err(ParleyError::AudioStream(format!(
                    "unsupported sample format: {fmt:?}"
                )))
            }
        }
        .map_err(|e| ParleyError::AudioStream(e.to_string()))?;

        stream
            .play()
            .map_err(|e| ParleyError::AudioStream(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            running,
            sample_rate,
            device_name,
        })
    }

    /// Open the system default microphone.
    ///
    /// # Errors
    /// `ParleyError::NoDefaultInputDevice` when no microphone is available,
    /// `ParleyError::AudioStream` if cpal fails to build the stream.
    #[cfg(feature = "audio-cpal")]
    pub fn open_default(producer: AudioProducer, running: Arc<AtomicBool>) -> Result<Self> {
        Self::open_with_preference(producer, running, None)
    }

    /// Signal the callback to no-op on its next invocation.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

#[cfg(feature = "audio-cpal")]
fn build_mono_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut producer: AudioProducer,
    running: &Arc<AtomicBool>,
) -> std::result::Result<Stream, cpal::BuildStreamError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    use crate::buffering::Producer;

    let channels = config.channels as usize;
    let running = Arc::clone(running);
    let mut mono: Vec<f32> = Vec::with_capacity(MIX_SCRATCH_FRAMES);

    device.build_input_stream(
        config,
        move |data: &[T], _info| {
            if !running.load(Ordering::Relaxed) {
                return;
            }
            downmix_in_pieces(data, channels, &mut mono, |piece| {
                let written = producer.push_slice(piece);
                if written < piece.len() {
                    warn!(dropped = piece.len() - written, "capture ring full");
                }
            });
        },
        |err| error!("audio stream error: {err}"),
        None,
    )
}

/// Downmix `data` through `scratch` without growing it, handing each mono
/// piece to `sink` in order.
#[cfg(feature = "audio-cpal")]
pub fn downmix_in_pieces<T>(
    data: &[T],
    channels: usize,
    scratch: &mut Vec<f32>,
    mut sink: impl FnMut(&[f32]),
) where
    T: Sample,
    f32: FromSample<T>,
{
    let channels = channels.max(1);
    let frames_per_piece = scratch.capacity().max(1);
    for piece in data.chunks(frames_per_piece * channels) {
        downmix_into(piece, channels, scratch);
        sink(scratch);
    }
}

/// Average interleaved frames down to mono f32 in `out` (cleared first).
#[cfg(feature = "audio-cpal")]
pub fn downmix_into<T>(data: &[T], channels: usize, out: &mut Vec<f32>)
where
    T: Sample,
    f32: FromSample<T>,
{
    out.clear();
    let channels = channels.max(1);
    for frame in data.chunks_exact(channels) {
        let sum: f32 = frame.iter().map(|s| s.to_sample::<f32>()).sum();
        out.push(sum / channels as f32);
    }
}

/// Stub when the `audio-cpal` feature is disabled.
#[cfg(not(feature = "audio-cpal"))]
impl AudioCapture {
    pub fn open_with_preference(
        _producer: AudioProducer,
        _running: Arc<AtomicBool>,
        _preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        Err(ParleyError::AudioStream(
            "compiled without audio-cpal feature".into(),
        ))
    }

    pub fn open_default(producer: AudioProducer, running: Arc<AtomicBool>) -> Result<Self> {
        Self::open_with_preference(producer, running, None)
    }
}

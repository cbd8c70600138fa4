use thiserror::Error;

/// All errors produced by parley-core.
///
/// None of these cross the real-time block path: `CaptureProcessor::process_block`
/// absorbs every anomaly. They surface only from engine lifecycle calls.
#[derive(Debug, Error)]
pub enum ParleyError {
    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("no default input device found")]
    NoDefaultInputDevice,

    #[error("capture engine is already running")]
    AlreadyRunning,

    #[error("capture engine is not running")]
    NotRunning,

    #[error("control channel closed: processor is gone")]
    ControlChannelClosed,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ParleyError>;

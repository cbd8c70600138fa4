//! Inbound control messages, outbound processor messages, engine status.
//!
//! | Direction | Message | JSON shape |
//! |-----------|---------|------------|
//! | host → processor | `ControlMessage::Start` | `{"type":"start"}` |
//! | host → processor | `ControlMessage::Stop` | `{"type":"stop"}` |
//! | host → processor | `ControlMessage::Config` | `{"type":"config","enableAGC":true,"targetRMS":0.15}` |
//! | processor → host | `ProcessorMessage::Audio` | binary, little-endian i16 |
//! | processor → host | `ProcessorMessage::NoiseFloor` | `{"noiseFloor":..,"currentRMS":..,"currentGain":..}` |

use serde::{Deserialize, Serialize};

use crate::buffering::pcm::PcmChunk;

// ---------------------------------------------------------------------------
// Host → processor
// ---------------------------------------------------------------------------

/// Control instruction from the host. Applied before any further audio is
/// emitted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ControlMessage {
    /// Resume accepting and emitting audio. Discarded audio is not restored.
    Start,
    /// Stop immediately and discard everything buffered.
    Stop,
    /// Update AGC settings; absent fields are left unchanged.
    Config {
        #[serde(rename = "enableAGC", default, skip_serializing_if = "Option::is_none")]
        enable_agc: Option<bool>,
        #[serde(rename = "targetRMS", default, skip_serializing_if = "Option::is_none")]
        target_rms: Option<f32>,
    },
}

// ---------------------------------------------------------------------------
// Processor → host
// ---------------------------------------------------------------------------

/// Periodic level telemetry. Losing one is harmless.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoiseFloorReport {
    #[serde(rename = "noiseFloor")]
    pub noise_floor: f32,
    #[serde(rename = "currentRMS")]
    pub current_rms: f32,
    #[serde(rename = "currentGain")]
    pub current_gain: f32,
}

/// Everything a `process_block` call can hand back to the host, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessorMessage {
    /// One complete chunk of 16-bit PCM at the target rate.
    Audio(PcmChunk),
    /// Noise floor telemetry.
    NoiseFloor(NoiseFloorReport),
}

impl ProcessorMessage {
    /// Wire tag used by the transport.
    pub fn tag(&self) -> &'static str {
        match self {
            ProcessorMessage::Audio(_) => "audio",
            ProcessorMessage::NoiseFloor(_) => "noiseFloor",
        }
    }
}

// ---------------------------------------------------------------------------
// Engine status events
// ---------------------------------------------------------------------------

/// Broadcast when the capture engine changes state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatusEvent {
    pub status: EngineStatus,
    /// Optional human-readable detail (e.g. error message).
    pub detail: Option<String>,
}

/// Current state of the capture engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    /// Engine created but `start()` not yet called.
    Idle,
    /// Device open and audio flowing to the processor.
    Capturing,
    /// Device open, processor told to `stop`; nothing is emitted.
    Paused,
    /// Device released; engine may be restarted.
    Stopped,
    /// Unrecoverable error; restart required.
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_messages_parse_from_tagged_json() {
        let start: ControlMessage = serde_json::from_str(r#"{"type":"start"}"#).unwrap();
        assert_eq!(start, ControlMessage::Start);

        let stop: ControlMessage = serde_json::from_str(r#"{"type":"stop"}"#).unwrap();
        assert_eq!(stop, ControlMessage::Stop);

        let config: ControlMessage =
            serde_json::from_str(r#"{"type":"config","enableAGC":false,"targetRMS":0.2}"#)
                .unwrap();
        assert_eq!(
            config,
            ControlMessage::Config {
                enable_agc: Some(false),
                target_rms: Some(0.2),
            }
        );
    }

    #[test]
    fn config_fields_are_optional() {
        let config: ControlMessage = serde_json::from_str(r#"{"type":"config"}"#).unwrap();
        assert_eq!(
            config,
            ControlMessage::Config {
                enable_agc: None,
                target_rms: None,
            }
        );

        let json = serde_json::to_value(ControlMessage::Config {
            enable_agc: Some(true),
            target_rms: None,
        })
        .unwrap();
        assert_eq!(json["type"], "config");
        assert_eq!(json["enableAGC"], true);
        assert!(json.get("targetRMS").is_none());
    }

    #[test]
    fn unknown_control_tag_is_rejected() {
        assert!(serde_json::from_str::<ControlMessage>(r#"{"type":"flush"}"#).is_err());
        assert!(serde_json::from_str::<ControlMessage>(r#"{"type":"Stop"}"#).is_err());
    }

    #[test]
    fn noise_floor_report_uses_wire_field_names() {
        let report = NoiseFloorReport {
            noise_floor: 0.004,
            current_rms: 0.03,
            current_gain: 2.5,
        };
        let json = serde_json::to_value(report).unwrap();
        let floor = json["noiseFloor"].as_f64().expect("noiseFloor is a number");
        assert!((floor - 0.004).abs() < 1e-6);
        assert!(json.get("currentRMS").is_some());
        assert_eq!(json["currentGain"], 2.5);
        assert_eq!(ProcessorMessage::NoiseFloor(report).tag(), "noiseFloor");
    }

    #[test]
    fn engine_status_event_serializes_with_lowercase_status() {
        let event = EngineStatusEvent {
            status: EngineStatus::Capturing,
            detail: Some("48000 Hz".into()),
        };

        let json = serde_json::to_value(&event).expect("serialize status event");
        assert_eq!(json["status"], "capturing");
        assert_eq!(json["detail"], "48000 Hz");

        let round_trip: EngineStatusEvent =
            serde_json::from_value(json).expect("deserialize status event");
        assert_eq!(round_trip.status, EngineStatus::Capturing);
    }
}

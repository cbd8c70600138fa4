//! Persistent host settings (JSON file in the app data directory).

use std::fs;
use std::path::{Path, PathBuf};

use parley_core::audio::gain::{clamp_target_rms, DEFAULT_TARGET_RMS};
use parley_core::engine::processor::{DEFAULT_CHUNK_SIZE, DEFAULT_TARGET_RATE};
use parley_core::{AgcSettings, EngineConfig, SourceRate};
use serde::{Deserialize, Serialize};
use tracing::warn;

const MIN_CHUNK_SIZE: usize = 1_024;
const MAX_CHUNK_SIZE: usize = 262_144;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    pub preferred_input_device: Option<String>,
    /// `device` (trust the reported rate), `target`, `hardware`, or a rate in Hz.
    pub source_rate_hint: String,
    #[serde(rename = "enableAGC")]
    pub enable_agc: bool,
    #[serde(rename = "targetRMS")]
    pub target_rms: f32,
    pub chunk_size: usize,
    pub target_sample_rate: u32,
    pub audio_queue_capacity: usize,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            preferred_input_device: None,
            source_rate_hint: "device".into(),
            enable_agc: true,
            target_rms: DEFAULT_TARGET_RMS,
            chunk_size: DEFAULT_CHUNK_SIZE,
            target_sample_rate: DEFAULT_TARGET_RATE,
            audio_queue_capacity: 8,
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        self.preferred_input_device = self
            .preferred_input_device
            .as_ref()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        self.source_rate_hint = normalize_source_rate_hint(&self.source_rate_hint);
        self.target_rms = clamp_target_rms(self.target_rms).unwrap_or(DEFAULT_TARGET_RMS);
        self.chunk_size = self.chunk_size.clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE);
        if self.target_sample_rate == 0 {
            self.target_sample_rate = DEFAULT_TARGET_RATE;
        }
        self.audio_queue_capacity = self.audio_queue_capacity.clamp(1, 256);
    }

    /// Engine parameters derived from these settings.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            target_sample_rate: self.target_sample_rate,
            chunk_size: self.chunk_size,
            source_rate: parse_source_rate_hint(&self.source_rate_hint),
            agc: AgcSettings {
                enabled: self.enable_agc,
                target_rms: self.target_rms,
            },
            preferred_input_device: self.preferred_input_device.clone(),
            audio_queue_capacity: self.audio_queue_capacity,
            ..EngineConfig::default()
        }
    }
}

pub fn normalize_source_rate_hint(raw: &str) -> String {
    let hint = raw.trim().to_ascii_lowercase();
    match hint.as_str() {
        "target" | "assume-target" => "target".into(),
        "hardware" | "hardware-default" | "48000" => "hardware".into(),
        _ => match hint.parse::<u32>() {
            Ok(rate) if rate > 0 => rate.to_string(),
            _ => "device".into(),
        },
    }
}

/// `None` means "use whatever the device reports".
pub fn parse_source_rate_hint(hint: &str) -> Option<SourceRate> {
    match hint {
        "target" => Some(SourceRate::AssumeTarget),
        "hardware" => Some(SourceRate::AssumeHardwareDefault),
        other => other.parse::<u32>().ok().map(SourceRate::Reported),
    }
}

/// Apply `PARLEY_*` environment overrides on top of loaded settings.
pub fn apply_env_overrides(settings: &mut AppSettings) {
    apply_overrides_from(settings, |key| std::env::var(key).ok());
}

fn apply_overrides_from(settings: &mut AppSettings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(raw) = lookup("PARLEY_TARGET_RMS") {
        match raw.trim().parse::<f32>() {
            Ok(level) => settings.target_rms = level,
            Err(_) => warn!(value = %raw, "ignoring unparsable PARLEY_TARGET_RMS"),
        }
    }
    if let Some(raw) = lookup("PARLEY_DISABLE_AGC") {
        if matches!(raw.trim(), "1" | "true" | "yes") {
            settings.enable_agc = false;
        }
    }
    settings.normalize();
}

pub fn default_settings_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Parley")
            .join("settings.json")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("parley")
            .join("settings.json")
    }
}

pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = fs::read_to_string(path)
        .ok()
        .and_then(|raw| match serde_json::from_str::<AppSettings>(&raw) {
            Ok(s) => Some(s),
            Err(e) => {
                warn!(path = ?path, "settings file unreadable, using defaults: {e}");
                None
            }
        })
        .unwrap_or_default();
    settings.normalize();
    settings
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(std::io::Error::other)?;
    fs::write(path, json)
}

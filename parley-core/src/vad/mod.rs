//! Level analysis that feeds downstream voice-activity heuristics.
//!
//! This crate stops at an ambient noise-floor estimate; speech
//! decisions are made by whoever consumes the `noiseFloor` reports.

pub mod noise_floor;

pub use noise_floor::NoiseFloorEstimator;

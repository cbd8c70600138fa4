//! Messages crossing the boundary between the host and the block processor.
//!
//! Control messages and telemetry derive `serde::Serialize` + `Deserialize` so a
//! host can relay them as JSON, keyed by a `type` tag. Audio chunks stay binary.

pub mod events;

//! Percentile-based ambient noise floor.
//!
//! ## Algorithm
//!
//! 1. Every active block bumps the chunk counter and pushes the block RMS into
//!    a bounded history (oldest evicted past `HISTORY_CAPACITY`).
//! 2. The first `WARMUP_BLOCKS` blocks never re-estimate, so startup clicks and
//!    device settling do not calibrate the floor.
//! 3. Afterwards, once the history holds at least `MIN_HISTORY` values, the
//!    history is sorted and the value at `floor(len * NOISE_PERCENTILE)` becomes
//!    the floor, clamped up to `NOISE_FLOOR_EPSILON`. The low percentile tracks
//!    background level while ignoring the speaker's own bursts.

use std::collections::VecDeque;

/// Capacity of the RMS history window.
pub const HISTORY_CAPACITY: usize = 50;
/// Blocks skipped before the first estimate.
pub const WARMUP_BLOCKS: u64 = 15;
/// History length required before estimating.
pub const MIN_HISTORY: usize = 10;
/// Quantile taken from the sorted history.
pub const NOISE_PERCENTILE: f32 = 0.1;
/// Lowest floor ever reported.
pub const NOISE_FLOOR_EPSILON: f32 = 0.001;
/// Floor reported until the first estimate lands.
pub const INITIAL_NOISE_FLOOR: f32 = 0.01;
/// Blocks between `noiseFloor` reports.
pub const REPORT_INTERVAL: u64 = 30;

/// Value at `floor(len * quantile)` of an ascending slice. Empty → 0.0.
pub fn percentile(sorted: &[f32], quantile: f32) -> f32 {
    if sorted.is_empty() {
        return 0.0;
    }
    let index = (sorted.len() as f32 * quantile.clamp(0.0, 1.0)).floor() as usize;
    sorted[index.min(sorted.len() - 1)]
}

#[derive(Debug, Clone)]
pub struct NoiseFloorEstimator {
    history: VecDeque<f32>,
    /// Reused sort buffer; keeps the block path allocation-free.
    scratch: Vec<f32>,
    noise_floor: f32,
    chunk_count: u64,
    estimates: u64,
}

impl NoiseFloorEstimator {
    pub fn new() -> Self {
        Self {
            history: VecDeque::with_capacity(HISTORY_CAPACITY),
            scratch: Vec::with_capacity(HISTORY_CAPACITY),
            noise_floor: INITIAL_NOISE_FLOOR,
            chunk_count: 0,
            estimates: 0,
        }
    }

    /// Record one active block. Returns `true` if the floor was re-estimated.
    pub fn observe(&mut self, rms: f32) -> bool {
        self.chunk_count = self.chunk_count.saturating_add(1);

        if self.history.len() == HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.history.push_back(rms);

        if self.chunk_count <= WARMUP_BLOCKS || self.history.len() < MIN_HISTORY {
            return false;
        }

        self.scratch.clear();
        self.scratch.extend(self.history.iter().copied());
        self.scratch.sort_unstable_by(|a, b| a.total_cmp(b));
        self.noise_floor = percentile(&self.scratch, NOISE_PERCENTILE).max(NOISE_FLOOR_EPSILON);
        self.estimates += 1;
        true
    }

    /// Whether the block just observed lands on a report boundary.
    pub fn should_report(&self) -> bool {
        self.chunk_count > 0 && self.chunk_count % REPORT_INTERVAL == 0
    }

    pub fn noise_floor(&self) -> f32 {
        self.noise_floor
    }

    /// Active blocks observed since construction.
    pub fn chunk_count(&self) -> u64 {
        self.chunk_count
    }

    /// Number of re-estimations performed.
    pub fn estimates(&self) -> u64 {
        self.estimates
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }
}

impl Default for NoiseFloorEstimator {
    fn default() -> Self {
        Self::new()
    }
}

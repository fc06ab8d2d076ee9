//! Quality-gated experience buffer
//!
//! Retention is by quality only: when the buffer is full, the lowest-quality
//! entries are evicted, never the oldest.

use crate::types::Trajectory;
use serde::{Deserialize, Serialize};

/// Fraction of capacity kept after an eviction pass
pub const RETAIN_FRACTION: f32 = 0.8;

/// Summary statistics carried into checkpoints
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BufferStats {
    /// Trajectories recorded over the buffer's lifetime
    pub total: u64,
    /// Current entries at or above the success bar
    pub successful: usize,
    /// Mean final quality of current entries
    pub avg_quality: f32,
}

/// Bounded store of trajectories
#[derive(Debug, Clone)]
pub struct ExperienceBuffer {
    entries: Vec<Trajectory>,
    capacity: usize,
    success_bar: f32,
    total_recorded: u64,
    evicted: u64,
}

impl ExperienceBuffer {
    /// Create an empty buffer
    pub fn new(capacity: usize, success_bar: f32) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
            success_bar,
            total_recorded: 0,
            evicted: 0,
        }
    }

    /// Create an empty buffer that continues a lifetime count
    pub fn resume(capacity: usize, success_bar: f32, total_recorded: u64) -> Self {
        Self {
            total_recorded,
            ..Self::new(capacity, success_bar)
        }
    }

    /// Record a trajectory, evicting the bottom of the quality ranking first
    /// when the buffer is full
    ///
    /// Trajectories with a non-finite quality are rejected and `false` is
    /// returned.
    pub fn record(&mut self, trajectory: Trajectory) -> bool {
        if !trajectory.final_quality.is_finite() {
            tracing::warn!(id = trajectory.id, "Rejecting trajectory with non-finite quality");
            return false;
        }
        if self.entries.len() >= self.capacity {
            let keep = (self.capacity as f32 * RETAIN_FRACTION).floor() as usize;
            self.sort_by_quality();
            let dropped = self.entries.len().saturating_sub(keep);
            self.entries.truncate(keep);
            self.evicted += dropped as u64;
            tracing::debug!(dropped, kept = keep, "Evicted low-quality trajectories");
        }
        self.entries.push(trajectory);
        self.total_recorded += 1;
        true
    }

    /// Remove and return every trajectory with `final_quality >= threshold`
    pub fn drain_high_quality(&mut self, threshold: f32) -> Vec<Trajectory> {
        let (drained, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|t| t.final_quality >= threshold);
        self.entries = kept;
        drained
    }

    /// The `count` highest-quality trajectories, without removing them
    pub fn sample_for_replay(&self, count: usize) -> Vec<Trajectory> {
        let mut ranked: Vec<&Trajectory> = self.entries.iter().collect();
        ranked.sort_by(|a, b| b.final_quality.total_cmp(&a.final_quality));
        ranked.into_iter().take(count).cloned().collect()
    }

    /// Summary statistics
    pub fn stats(&self) -> BufferStats {
        let successful = self
            .entries
            .iter()
            .filter(|t| t.final_quality >= self.success_bar)
            .count();
        let avg_quality = if self.entries.is_empty() {
            0.0
        } else {
            self.entries.iter().map(|t| t.final_quality).sum::<f32>() / self.entries.len() as f32
        };
        BufferStats {
            total: self.total_recorded,
            successful,
            avg_quality,
        }
    }

    /// Current entries
    pub fn entries(&self) -> &[Trajectory] {
        &self.entries
    }

    /// Number of current entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the buffer holds nothing
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum entries
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Trajectories dropped by eviction
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    fn sort_by_quality(&mut self) {
        self.entries
            .sort_by(|a, b| b.final_quality.total_cmp(&a.final_quality));
    }
}

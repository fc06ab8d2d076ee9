//! MicroLoRA: low-rank additive correction with momentum updates
//!
//! The adapter holds `rank` direction pairs `(a_r, b_r)` over a `dim`-length
//! feature space and produces the correction
//!
//! ```text
//! delta(x) = (alpha / rank) * sum_r (a_r . x) * b_r
//! ```
//!
//! Gradients are accumulated per task and applied in one momentum-smoothed
//! step at the epoch boundary. A starts small and random, B starts at zero
//! (standard LoRA init), so a fresh adapter is an exact no-op.

use crate::config::ContinualConfig;
use crate::error::{ContinualError, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Parameter count at or above which the adapter gets rank 4
pub const LARGE_CAPACITY: f64 = 1.0e9;
/// Parameter count at or above which the adapter gets rank 2
pub const MEDIUM_CAPACITY: f64 = 1.0e8;

/// Map a declared model capacity (in parameters) to an adapter rank
pub fn rank_for_capacity(parameters: f64) -> usize {
    if parameters >= LARGE_CAPACITY {
        4
    } else if parameters >= MEDIUM_CAPACITY {
        2
    } else {
        1
    }
}

/// Serializable view of the adapter weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoraSnapshot {
    /// Projection directions, rank x dim
    pub lora_a: Vec<Vec<f32>>,
    /// Output directions, rank x dim
    pub lora_b: Vec<Vec<f32>>,
    /// Number of direction pairs
    pub rank: usize,
    /// Scale (alpha)
    pub scale: f32,
}

/// Low-rank adapter with pending-gradient accumulation
#[derive(Debug, Clone)]
pub struct MicroLora {
    dim: usize,
    rank: usize,
    alpha: f32,
    /// Step per unit of quality when accumulating
    gradient_step: f32,
    /// Momentum coefficient (beta)
    momentum_beta: f32,
    lora_a: Vec<Vec<f32>>,
    lora_b: Vec<Vec<f32>>,
    grad_a: Vec<Vec<f32>>,
    grad_b: Vec<Vec<f32>>,
    momentum: Vec<Vec<f32>>,
    pending_updates: usize,
    applied_batches: u64,
}

impl MicroLora {
    /// Create an adapter with randomly initialised A and zero B
    pub fn new<R: Rng + ?Sized>(
        dim: usize,
        rank: usize,
        alpha: f32,
        gradient_step: f32,
        momentum_beta: f32,
        rng: &mut R,
    ) -> Result<Self> {
        validate_shape(dim, rank)?;

        let std_a = (2.0 / dim as f32).sqrt();
        let lora_a = (0..rank)
            .map(|_| (0..dim).map(|_| rng.gen_range(-std_a..std_a)).collect())
            .collect();

        Ok(Self {
            dim,
            rank,
            alpha,
            gradient_step,
            momentum_beta,
            lora_a,
            lora_b: zeros(rank, dim),
            grad_a: zeros(rank, dim),
            grad_b: zeros(rank, dim),
            momentum: zeros(rank, dim),
            pending_updates: 0,
            applied_batches: 0,
        })
    }

    /// Create from engine configuration
    pub fn from_config<R: Rng + ?Sized>(config: &ContinualConfig, rng: &mut R) -> Result<Self> {
        Self::new(
            config.embedding_dim,
            config.resolved_rank(),
            config.alpha,
            config.gradient_step,
            config.momentum,
            rng,
        )
    }

    /// Rebuild from a snapshot; accumulators and momentum start at zero
    pub fn from_snapshot(
        snapshot: &LoraSnapshot,
        gradient_step: f32,
        momentum_beta: f32,
    ) -> Result<Self> {
        let rank = snapshot.rank;
        let dim = snapshot.lora_a.first().map(Vec::len).unwrap_or(0);
        validate_shape(dim, rank)?;

        if snapshot.lora_a.len() != rank || snapshot.lora_b.len() != rank {
            return Err(ContinualError::Config(format!(
                "snapshot has {} A rows and {} B rows for rank {}",
                snapshot.lora_a.len(),
                snapshot.lora_b.len(),
                rank
            )));
        }
        for row in snapshot.lora_a.iter().chain(snapshot.lora_b.iter()) {
            if row.len() != dim {
                return Err(ContinualError::DimensionMismatch {
                    expected: dim,
                    actual: row.len(),
                });
            }
        }

        Ok(Self {
            dim,
            rank,
            alpha: snapshot.scale,
            gradient_step,
            momentum_beta,
            lora_a: snapshot.lora_a.clone(),
            lora_b: snapshot.lora_b.clone(),
            grad_a: zeros(rank, dim),
            grad_b: zeros(rank, dim),
            momentum: zeros(rank, dim),
            pending_updates: 0,
            applied_batches: 0,
        })
    }

    /// Correction for `input`; always `dim` long
    pub fn forward(&self, input: &[f32]) -> Vec<f32> {
        let mut output = vec![0.0f32; self.dim];
        self.forward_add(input, &mut output);
        output
    }

    /// Add the correction for `input` into `output`
    pub fn forward_add(&self, input: &[f32], output: &mut [f32]) {
        debug_assert_eq!(input.len(), self.dim);
        debug_assert_eq!(output.len(), self.dim);

        let scaling = self.scaling();
        for (a, b) in self.lora_a.iter().zip(self.lora_b.iter()) {
            let projection: f32 = a.iter().zip(input.iter()).map(|(w, x)| w * x).sum();
            let coeff = projection * scaling;
            if coeff == 0.0 {
                continue;
            }
            for (o, &bv) in output.iter_mut().zip(b.iter()) {
                *o += coeff * bv;
            }
        }
    }

    /// Per-update step for an outcome of the given quality
    pub fn learning_rate(&self, quality: f32) -> f32 {
        quality.clamp(0.0, 1.0) * self.gradient_step
    }

    /// Accumulate a gradient estimate without touching the weights
    pub fn accumulate_gradient(&mut self, query: &[f32], gradient: &[f32], quality: f32) {
        let lr = self.learning_rate(quality);

        for r in 0..self.rank {
            let grad_a = &mut self.grad_a[r];
            for ((ga, &q), &g) in grad_a.iter_mut().zip(query.iter()).zip(gradient.iter()) {
                *ga += lr * q * g;
            }
            for (gb, &g) in self.grad_b[r].iter_mut().zip(gradient.iter()) {
                *gb += lr * g;
            }
        }

        self.pending_updates += 1;
    }

    /// Apply pending gradients
    ///
    /// Returns `None` without touching the weights when nothing is pending,
    /// otherwise the adapted rate `base_lr * min(2, 1 + pending / 100)`.
    pub fn apply_accumulated(&mut self, base_lr: f32) -> Option<f32> {
        if self.pending_updates == 0 {
            return None;
        }

        let pending = self.pending_updates as f32;
        let step = base_lr / pending;
        let beta = self.momentum_beta;

        for r in 0..self.rank {
            for i in 0..self.dim {
                let m = beta * self.momentum[r][i] + (1.0 - beta) * self.grad_a[r][i];
                self.momentum[r][i] = m;
                self.lora_a[r][i] -= m * step;
                self.lora_b[r][i] -= self.grad_b[r][i] * step;
                self.grad_a[r][i] = 0.0;
                self.grad_b[r][i] = 0.0;
            }
        }

        let effective = base_lr * (1.0 + pending / 100.0).min(2.0);
        self.pending_updates = 0;
        self.applied_batches += 1;

        tracing::debug!(
            pending = pending as usize,
            effective_lr = effective,
            "Applied adapter updates"
        );

        Some(effective)
    }

    /// Diagonal of the low-rank delta: `scaling * sum_r a_r[i] * b_r[i]`
    pub fn diagonal(&self) -> Vec<f32> {
        let scaling = self.scaling();
        let mut diag = vec![0.0f32; self.dim];
        for (a, b) in self.lora_a.iter().zip(self.lora_b.iter()) {
            for ((d, &av), &bv) in diag.iter_mut().zip(a.iter()).zip(b.iter()) {
                *d += av * bv * scaling;
            }
        }
        diag
    }

    /// Serializable weights
    pub fn snapshot(&self) -> LoraSnapshot {
        LoraSnapshot {
            lora_a: self.lora_a.clone(),
            lora_b: self.lora_b.clone(),
            rank: self.rank,
            scale: self.alpha,
        }
    }

    /// Get (A, B) weights
    pub fn weights(&self) -> (&[Vec<f32>], &[Vec<f32>]) {
        (&self.lora_a, &self.lora_b)
    }

    /// Updates waiting for the next apply
    pub fn pending_updates(&self) -> usize {
        self.pending_updates
    }

    /// Number of applied batches since construction
    pub fn applied_batches(&self) -> u64 {
        self.applied_batches
    }

    /// Rank
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Feature dimension
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Scale divided by rank
    pub fn scaling(&self) -> f32 {
        self.alpha / self.rank as f32
    }
}

fn validate_shape(dim: usize, rank: usize) -> Result<()> {
    if dim == 0 {
        return Err(ContinualError::Config("adapter dimension must be > 0".into()));
    }
    if rank == 0 || rank > dim {
        return Err(ContinualError::Config(format!(
            "adapter rank {} must be in 1..={}",
            rank, dim
        )));
    }
    Ok(())
}

fn zeros(rows: usize, cols: usize) -> Vec<Vec<f32>> {
    vec![vec![0.0f32; cols]; rows]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn adapter(dim: usize, rank: usize) -> MicroLora {
        let mut rng = StdRng::seed_from_u64(11);
        MicroLora::new(dim, rank, 1.0, 0.1, 0.9, &mut rng).unwrap()
    }

    #[test]
    fn test_rank_for_capacity() {
        assert_eq!(rank_for_capacity(7.0e9), 4);
        assert_eq!(rank_for_capacity(3.5e8), 2);
        assert_eq!(rank_for_capacity(1.0e6), 1);
    }

    #[test]
    fn test_rank_above_dim_rejected() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(MicroLora::new(2, 4, 1.0, 0.1, 0.9, &mut rng).is_err());
        assert!(MicroLora::new(8, 0, 1.0, 0.1, 0.9, &mut rng).is_err());
    }

    #[test]
    fn test_fresh_adapter_is_noop() {
        let lora = adapter(16, 2);
        let out = lora.forward(&vec![1.0; 16]);
        assert_eq!(out.len(), 16);
        assert!(out.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_accumulate_and_apply() {
        let mut lora = adapter(8, 2);
        lora.accumulate_gradient(&vec![1.0; 8], &vec![0.5; 8], 1.0);
        lora.accumulate_gradient(&vec![1.0; 8], &vec![0.5; 8], 0.5);
        assert_eq!(lora.pending_updates(), 2);

        let effective = lora.apply_accumulated(0.01).unwrap();
        assert!((effective - 0.01 * 1.02).abs() < 1e-7);
        assert_eq!(lora.pending_updates(), 0);

        // B moved against the gradient
        let (_, b) = lora.weights();
        assert!(b[0].iter().all(|&v| v < 0.0));
        assert!(lora.forward(&vec![1.0; 8]).iter().any(|&v| v != 0.0));
    }

    #[test]
    fn test_apply_without_pending_is_noop() {
        let mut lora = adapter(8, 2);
        let before = lora.snapshot();
        assert_eq!(lora.apply_accumulated(0.5), None);
        assert_eq!(lora.snapshot(), before);
    }

    #[test]
    fn test_effective_rate_capped() {
        let mut lora = adapter(4, 1);
        for _ in 0..250 {
            lora.accumulate_gradient(&[1.0; 4], &[0.1; 4], 1.0);
        }
        assert_eq!(lora.apply_accumulated(0.1), Some(0.2));
    }

    #[test]
    fn test_learning_rate_scales_with_quality() {
        let lora = adapter(4, 1);
        assert!(lora.learning_rate(0.9) > lora.learning_rate(0.3));
        assert_eq!(lora.learning_rate(0.0), 0.0);
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let mut lora = adapter(8, 2);
        lora.accumulate_gradient(&[0.3; 8], &[0.2; 8], 0.8);
        lora.apply_accumulated(0.05);

        let restored = MicroLora::from_snapshot(&lora.snapshot(), 0.1, 0.9).unwrap();
        let x = vec![0.7; 8];
        assert_eq!(restored.forward(&x), lora.forward(&x));
        assert_eq!(restored.pending_updates(), 0);
    }

    #[test]
    fn test_snapshot_shape_checked() {
        let mut snapshot = adapter(8, 2).snapshot();
        snapshot.lora_b[1].pop();
        assert!(MicroLora::from_snapshot(&snapshot, 0.1, 0.9).is_err());
    }
}

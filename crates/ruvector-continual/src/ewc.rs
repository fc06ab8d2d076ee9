//! Elastic weight consolidation guard
//!
//! Tracks a per-dimension Fisher estimate (EMA of squared gradients) and
//! shrinks future gradients along dimensions that mattered for earlier tasks.

use crate::error::{ContinualError, Result};
use serde::{Deserialize, Serialize};

/// Weight kept on the running importance at each update
pub const IMPORTANCE_DECAY: f32 = 0.95;

const IMPORTANCE_EPSILON: f32 = 1e-8;

/// Serializable consolidation state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidationSnapshot {
    /// Per-dimension importance
    pub importance: Vec<f32>,
    /// Reference weights of the last completed task
    pub optimal_weights: Vec<f32>,
    /// Registered tasks
    pub task_count: u64,
    /// Regularization strength
    pub lambda: f32,
}

/// EWC guard over a `dim`-length parameter view
#[derive(Debug, Clone)]
pub struct ConsolidationGuard {
    importance: Vec<f32>,
    optimal_weights: Vec<f32>,
    task_count: u64,
    lambda: f32,
}

impl ConsolidationGuard {
    /// Create a guard with zero importance
    pub fn new(dim: usize, lambda: f32) -> Self {
        Self {
            importance: vec![0.0; dim],
            optimal_weights: vec![0.0; dim],
            task_count: 0,
            lambda,
        }
    }

    /// Rebuild from a snapshot
    pub fn from_snapshot(snapshot: &ConsolidationSnapshot) -> Result<Self> {
        if snapshot.importance.len() != snapshot.optimal_weights.len() {
            return Err(ContinualError::DimensionMismatch {
                expected: snapshot.importance.len(),
                actual: snapshot.optimal_weights.len(),
            });
        }
        if snapshot.importance.iter().any(|&v| !(v >= 0.0)) {
            return Err(ContinualError::Config(
                "consolidation importance must be non-negative".into(),
            ));
        }
        Ok(Self {
            importance: snapshot.importance.clone(),
            optimal_weights: snapshot.optimal_weights.clone(),
            task_count: snapshot.task_count,
            lambda: snapshot.lambda,
        })
    }

    /// EMA update: `importance = 0.95 * importance + 0.05 * g^2`
    pub fn update_importance(&mut self, gradient: &[f32]) {
        for (imp, &g) in self.importance.iter_mut().zip(gradient.iter()) {
            *imp = IMPORTANCE_DECAY * *imp + (1.0 - IMPORTANCE_DECAY) * g * g;
        }
    }

    /// Start protecting what has been learned so far
    pub fn register_task(&mut self) {
        self.task_count += 1;
        tracing::debug!(task_count = self.task_count, "Registered consolidation task");
    }

    /// Shrink a gradient along important dimensions
    ///
    /// Passthrough until the first task is registered.
    pub fn dampen(&self, gradient: &[f32]) -> Vec<f32> {
        if self.task_count == 0 {
            return gradient.to_vec();
        }
        gradient
            .iter()
            .zip(self.importance.iter())
            .map(|(&g, &imp)| g / (1.0 + self.lambda * (imp + IMPORTANCE_EPSILON)))
            .collect()
    }

    /// Store the reference point for the most recent task
    pub fn set_optimal_weights(&mut self, weights: &[f32]) {
        self.optimal_weights.clear();
        self.optimal_weights.extend_from_slice(weights);
    }

    /// Quadratic penalty `lambda/2 * sum F_i (w_i - w*_i)^2` for callers that
    /// regularize their own weights against the stored reference
    pub fn penalty(&self, weights: &[f32]) -> f32 {
        if self.task_count == 0 {
            return 0.0;
        }
        let sum: f32 = self
            .importance
            .iter()
            .zip(weights.iter().zip(self.optimal_weights.iter()))
            .map(|(&f, (&w, &w_opt))| f * (w - w_opt).powi(2))
            .sum();
        self.lambda * sum / 2.0
    }

    /// Serializable state
    pub fn snapshot(&self) -> ConsolidationSnapshot {
        ConsolidationSnapshot {
            importance: self.importance.clone(),
            optimal_weights: self.optimal_weights.clone(),
            task_count: self.task_count,
            lambda: self.lambda,
        }
    }

    /// Per-dimension importance
    pub fn importance(&self) -> &[f32] {
        &self.importance
    }

    /// Reference weights
    pub fn optimal_weights(&self) -> &[f32] {
        &self.optimal_weights
    }

    /// Registered tasks
    pub fn task_count(&self) -> u64 {
        self.task_count
    }

    /// Regularization strength
    pub fn lambda(&self) -> f32 {
        self.lambda
    }

    /// Set regularization strength
    pub fn set_lambda(&mut self, lambda: f32) {
        self.lambda = lambda;
    }
}

//! Core types shared across the engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// A single step inside a trajectory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryStep {
    /// Hidden state (the adapter correction)
    pub hidden: Vec<f32>,
    /// Output state (the adapted representation)
    pub output: Vec<f32>,
    /// Quality of this step
    pub quality: f32,
}

/// One recorded attempt at a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    /// Monotonic identifier
    pub id: u64,
    /// Feature vector the attempt started from
    pub query_embedding: Vec<f32>,
    /// Ordered steps
    pub steps: Vec<TrajectoryStep>,
    /// Final quality in [0, 1]
    pub final_quality: f32,
    /// Completion time
    pub timestamp: DateTime<Utc>,
}

impl Trajectory {
    /// Output of the last step, if any
    pub fn final_output(&self) -> Option<&[f32]> {
        self.steps.last().map(|s| s.output.as_slice())
    }
}

/// Builder for a trajectory in flight
///
/// Dropping a builder discards the attempt; nothing reaches the buffer until
/// [`TrajectoryBuilder::build`] is called and the result is recorded.
#[derive(Debug, Clone)]
pub struct TrajectoryBuilder {
    id: u64,
    query_embedding: Vec<f32>,
    steps: Vec<TrajectoryStep>,
}

impl TrajectoryBuilder {
    /// Start a trajectory
    pub fn new(id: u64, query_embedding: Vec<f32>) -> Self {
        Self {
            id,
            query_embedding,
            steps: Vec::new(),
        }
    }

    /// Append a step
    pub fn add_step(&mut self, hidden: Vec<f32>, output: Vec<f32>, quality: f32) {
        self.steps.push(TrajectoryStep {
            hidden,
            output,
            quality,
        });
    }

    /// Number of steps so far
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether no steps were added
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Complete the trajectory
    pub fn build(self, final_quality: f32) -> Trajectory {
        Trajectory {
            id: self.id,
            query_embedding: self.query_embedding,
            steps: self.steps,
            final_quality: final_quality.clamp(0.0, 1.0),
            timestamp: Utc::now(),
        }
    }
}

/// A unit of work handed to the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Task identifier
    pub id: String,
    /// Type tag
    pub task_type: String,
    /// Feature vector describing the task
    pub features: Vec<f32>,
    /// Difficulty in [0, 1]
    pub difficulty: f32,
}

impl Task {
    /// Create a task
    pub fn new(
        id: impl Into<String>,
        task_type: impl Into<String>,
        features: Vec<f32>,
        difficulty: f32,
    ) -> Self {
        Self {
            id: id.into(),
            task_type: task_type.into(),
            features,
            difficulty: difficulty.clamp(0.0, 1.0),
        }
    }
}

/// Outcome returned to the caller for one task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    /// Task this answers
    pub task_id: String,
    /// Whether the attempt succeeded
    pub success: bool,
    /// Confidence in [0, 1]
    pub confidence: f32,
    /// Wall time spent on the task
    pub latency: Duration,
    /// Number of output units produced
    pub units_produced: usize,
    /// Whether a stored pattern boosted confidence
    pub pattern_matched: bool,
    /// Whether the attempt fed the adapter
    pub learning_applied: bool,
}

/// Snapshot emitted at every epoch boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// Epoch index, starting at 1
    pub epoch: u64,
    /// Trajectories recorded during the epoch
    pub trajectory_count: usize,
    /// Centroids held after extraction
    pub patterns_learned: usize,
    /// Adapter updates pending at the boundary, before any apply
    pub pending_adapter_updates: usize,
    /// Tasks registered with the consolidation guard
    pub tasks_protected: u64,
    /// Fraction of tasks that succeeded
    pub resolve_rate: f32,
    /// Mean confidence over the epoch
    pub avg_confidence: f32,
    /// Curriculum level after the boundary
    pub curriculum_level: u32,
    /// Temperature after the boundary
    pub temperature: f32,
    /// Trajectories replayed into the adapter
    pub replay_count: usize,
    /// Rate returned by the adapter, zero if no update was applied
    pub effective_learning_rate: f32,
}

/// Where the engine is in its epoch cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnginePhase {
    /// Between epochs
    Idle,
    /// Executing tasks
    RunningTasks,
    /// Applying the epoch boundary
    Consolidating,
}

impl fmt::Display for EnginePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EnginePhase::Idle => "idle",
            EnginePhase::RunningTasks => "running-tasks",
            EnginePhase::Consolidating => "consolidating",
        };
        write!(f, "{}", name)
    }
}

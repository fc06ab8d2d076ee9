//! Continual-learning engine
//!
//! Drives the epoch cycle `Idle -> RunningTasks -> Consolidating -> Idle`.
//! The engine owns the adapter, the consolidation guard, the experience
//! buffer and the pattern bank; none of them reference each other.
//!
//! Per task: adapter forward, pattern lookup, confidence, trajectory record,
//! and for successful or confident outcomes an importance update plus a
//! dampened gradient accumulation.
//!
//! Per epoch: batched adapter apply, consolidation registration, pattern
//! extraction from drained high-quality trajectories, replay, schedule
//! advance and a metrics record.

use crate::buffer::{BufferStats, ExperienceBuffer};
use crate::checkpoint::Checkpoint;
use crate::confidence::{self, ConfidenceTerms};
use crate::config::ContinualConfig;
use crate::error::{ContinualError, Result};
use crate::ewc::ConsolidationGuard;
use crate::lora::MicroLora;
use crate::reasoning_bank::{PatternBank, PatternMatch};
use crate::types::{EnginePhase, EpochMetrics, Task, TaskResult, TrajectoryBuilder};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Mixed into the seed when resuming so a restored engine does not replay
/// the random stream of epoch zero
const RESUME_SEED_MIX: u64 = 0x9E37_79B9_7F4A_7C15;

/// Results of one epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochReport {
    /// Per-task results, in execution order
    pub results: Vec<TaskResult>,
    /// Metrics emitted at the boundary
    pub metrics: EpochMetrics,
}

/// Point-in-time engine statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStats {
    /// Current phase
    pub phase: EnginePhase,
    /// Completed epochs
    pub epochs: u64,
    /// Tasks run since construction or restore
    pub tasks_run: u64,
    /// Buffer summary
    pub buffer: BufferStats,
    /// Stored pattern centroids
    pub patterns: usize,
    /// Tasks registered with the consolidation guard
    pub tasks_protected: u64,
    /// Adapter updates waiting for the next boundary
    pub pending_updates: usize,
    /// Current temperature
    pub temperature: f32,
    /// Current curriculum level
    pub curriculum_level: u32,
}

/// Running totals for the epoch in progress
#[derive(Debug, Clone, Copy, Default)]
struct EpochTally {
    tasks: usize,
    successes: usize,
    confidence_sum: f32,
}

/// Continual-learning engine
pub struct ContinualEngine<R: Rng = StdRng> {
    config: ContinualConfig,
    adapter: MicroLora,
    guard: ConsolidationGuard,
    buffer: ExperienceBuffer,
    patterns: PatternBank,
    rng: R,
    phase: EnginePhase,
    epoch: u64,
    temperature: f32,
    curriculum_level: u32,
    metrics: Vec<EpochMetrics>,
    tally: EpochTally,
    next_trajectory_id: u64,
    tasks_run: u64,
}

impl ContinualEngine<StdRng> {
    /// Create an engine seeded from `config.seed`
    pub fn new(config: ContinualConfig) -> Result<Self> {
        let rng = StdRng::seed_from_u64(config.seed);
        Self::with_rng(config, rng)
    }

    /// Rebuild an engine from a verified checkpoint
    pub fn restore(config: ContinualConfig, checkpoint: &Checkpoint) -> Result<Self> {
        let epochs = checkpoint.metrics.len() as u64;
        let seed = config.seed ^ epochs.wrapping_mul(RESUME_SEED_MIX);
        Self::restore_with_rng(config, checkpoint, StdRng::seed_from_u64(seed))
    }

    /// Restore from `path`, or start cold when the checkpoint is missing or
    /// unusable
    pub fn load_or_cold_start(config: ContinualConfig, path: impl AsRef<Path>) -> Result<Self> {
        config.validate()?;
        let path = path.as_ref();

        match Checkpoint::load(path).and_then(|ckpt| Self::restore(config.clone(), &ckpt)) {
            Ok(engine) => {
                info!(path = %path.display(), epoch = engine.epoch, "Resumed from checkpoint");
                Ok(engine)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Checkpoint unusable, starting cold");
                Self::new(config)
            }
        }
    }
}

impl<R: Rng> ContinualEngine<R> {
    /// Create an engine drawing every random value from `rng`
    pub fn with_rng(config: ContinualConfig, mut rng: R) -> Result<Self> {
        config.validate()?;

        let adapter = MicroLora::from_config(&config, &mut rng)?;
        let guard = ConsolidationGuard::new(config.embedding_dim, config.lambda);
        let buffer = ExperienceBuffer::new(config.buffer_capacity, config.success_bar);
        let patterns =
            PatternBank::new(config.max_patterns, config.min_trajectories_for_extraction);

        info!(
            dim = config.embedding_dim,
            rank = adapter.rank(),
            lambda = config.lambda,
            "Continual engine initialized"
        );

        Ok(Self {
            temperature: config.initial_temperature,
            curriculum_level: 1,
            config,
            adapter,
            guard,
            buffer,
            patterns,
            rng,
            phase: EnginePhase::Idle,
            epoch: 0,
            metrics: Vec::new(),
            tally: EpochTally::default(),
            next_trajectory_id: 0,
            tasks_run: 0,
        })
    }

    /// Rebuild an engine from a checkpoint with an injected random source
    pub fn restore_with_rng(config: ContinualConfig, checkpoint: &Checkpoint, rng: R) -> Result<Self> {
        config.validate()?;
        checkpoint.verify()?;

        let adapter =
            MicroLora::from_snapshot(&checkpoint.adapter, config.gradient_step, config.momentum)?;
        if adapter.dim() != config.embedding_dim {
            return Err(ContinualError::DimensionMismatch {
                expected: config.embedding_dim,
                actual: adapter.dim(),
            });
        }
        if adapter.rank() != config.resolved_rank() {
            warn!(
                checkpoint_rank = adapter.rank(),
                config_rank = config.resolved_rank(),
                "Checkpoint rank differs from config, keeping checkpoint rank"
            );
        }

        let mut guard = ConsolidationGuard::from_snapshot(&checkpoint.consolidation)?;
        if guard.importance().len() != config.embedding_dim {
            return Err(ContinualError::DimensionMismatch {
                expected: config.embedding_dim,
                actual: guard.importance().len(),
            });
        }
        if guard.lambda() != config.lambda {
            warn!(
                checkpoint_lambda = guard.lambda(),
                config_lambda = config.lambda,
                "Checkpoint lambda differs from config, using config lambda"
            );
            guard.set_lambda(config.lambda);
        }

        let patterns = PatternBank::from_centroids(
            config.max_patterns,
            config.min_trajectories_for_extraction,
            checkpoint.patterns.clone(),
        )?;
        let buffer = ExperienceBuffer::resume(
            config.buffer_capacity,
            config.success_bar,
            checkpoint.buffer.total,
        );

        let epoch = checkpoint.metrics.len() as u64;
        let (temperature, curriculum_level) = match checkpoint.metrics.last() {
            Some(last) => (last.temperature, last.curriculum_level),
            None => (config.initial_temperature, 1),
        };

        Ok(Self {
            next_trajectory_id: checkpoint.buffer.total,
            config,
            adapter,
            guard,
            buffer,
            patterns,
            rng,
            phase: EnginePhase::Idle,
            epoch,
            temperature,
            curriculum_level,
            metrics: checkpoint.metrics.clone(),
            tally: EpochTally::default(),
            tasks_run: 0,
        })
    }

    /// Run one task; never fails
    pub fn run_task(&mut self, task: &Task) -> TaskResult {
        let start = Instant::now();
        self.phase = EnginePhase::RunningTasks;

        let features = self.fit_features(task);
        let difficulty = Self::fit_difficulty(task);
        let model = &self.config.confidence;

        let correction = self.adapter.forward(&features);
        let adapted: Vec<f32> = features
            .iter()
            .zip(correction.iter())
            .map(|(x, c)| x + c)
            .collect();

        let best = self.patterns.find_similar(&features, 1).into_iter().next();
        let (pattern, pattern_matched) = confidence::pattern_boost(model, best.as_ref());
        let terms = ConfidenceTerms {
            base: confidence::base_capability(model, difficulty),
            learning: confidence::learning_boost(model, &features, &correction),
            pattern,
            curriculum: confidence::curriculum_adjustment(
                model,
                self.curriculum_level,
                difficulty,
            ),
            noise: confidence::noise(model, self.temperature, self.rng.gen::<f32>()),
        };
        let confidence = confidence::combine(&terms);
        let success = self.rng.gen::<f32>() < confidence;
        let quality = confidence::outcome_quality(model, success, confidence);

        let mut builder = TrajectoryBuilder::new(self.next_trajectory_id, features.to_vec());
        self.next_trajectory_id += 1;
        builder.add_step(correction, adapted.clone(), confidence);
        self.buffer.record(builder.build(quality));

        let gradient: Vec<f32> = adapted.iter().map(|v| v * confidence).collect();
        let gradient_finite = gradient.iter().all(|v| v.is_finite());
        if !gradient_finite {
            warn!(task_id = %task.id, "Skipping adapter update for non-finite gradient");
        }
        let learning_applied = gradient_finite
            && (success || confidence >= self.config.high_confidence_threshold);
        if learning_applied {
            self.guard.update_importance(&gradient);
            let dampened = self.guard.dampen(&gradient);
            self.adapter
                .accumulate_gradient(&features, &dampened, quality);
        }

        self.tally.tasks += 1;
        self.tally.confidence_sum += confidence;
        if success {
            self.tally.successes += 1;
        }
        self.tasks_run += 1;

        debug!(
            task_id = %task.id,
            confidence,
            success,
            pattern_matched,
            "Task complete"
        );

        TaskResult {
            task_id: task.id.clone(),
            success,
            confidence,
            latency: start.elapsed(),
            units_produced: adapted.len(),
            pattern_matched,
            learning_applied,
        }
    }

    /// Close the current epoch and return its metrics
    pub fn end_epoch(&mut self) -> EpochMetrics {
        self.phase = EnginePhase::Consolidating;

        let pending = self.adapter.pending_updates();
        let effective_learning_rate = if pending >= self.config.min_batch_updates {
            self.adapter
                .apply_accumulated(self.config.base_learning_rate)
                .unwrap_or(0.0)
        } else {
            if pending > 0 {
                debug!(pending, "Deferring adapter updates below batch minimum");
            }
            0.0
        };

        if self.tally.successes > 0 {
            self.guard.register_task();
            self.guard.set_optimal_weights(&self.adapter.diagonal());
        }

        let drained = self.buffer.drain_high_quality(self.config.pattern_threshold);
        self.patterns
            .extract_patterns(&drained, self.config.max_patterns, &mut self.rng);

        let replay = self.buffer.sample_for_replay(self.config.replay_count);
        for trajectory in &replay {
            let Some(output) = trajectory.final_output() else {
                continue;
            };
            let gradient: Vec<f32> = output.iter().map(|v| v * trajectory.final_quality).collect();
            let dampened = self.guard.dampen(&gradient);
            self.adapter.accumulate_gradient(
                &trajectory.query_embedding,
                &dampened,
                trajectory.final_quality * self.config.replay_weight,
            );
        }

        self.epoch += 1;
        self.temperature = confidence::next_temperature(
            self.temperature,
            self.config.temperature_decay_rate,
            self.config.temperature_floor,
        );
        self.curriculum_level = self.curriculum_level.max(confidence::curriculum_level(
            self.epoch,
            self.config.curriculum_epochs_per_level,
        ));

        let tally = std::mem::take(&mut self.tally);
        let (resolve_rate, avg_confidence) = if tally.tasks == 0 {
            (0.0, 0.0)
        } else {
            (
                tally.successes as f32 / tally.tasks as f32,
                tally.confidence_sum / tally.tasks as f32,
            )
        };

        let metrics = EpochMetrics {
            epoch: self.epoch,
            trajectory_count: tally.tasks,
            patterns_learned: self.patterns.len(),
            pending_adapter_updates: pending,
            tasks_protected: self.guard.task_count(),
            resolve_rate,
            avg_confidence,
            curriculum_level: self.curriculum_level,
            temperature: self.temperature,
            replay_count: replay.len(),
            effective_learning_rate,
        };

        info!(
            epoch = metrics.epoch,
            patterns = metrics.patterns_learned,
            resolve_rate = metrics.resolve_rate,
            temperature = metrics.temperature,
            level = metrics.curriculum_level,
            "Epoch complete"
        );

        self.metrics.push(metrics.clone());
        self.phase = EnginePhase::Idle;
        metrics
    }

    /// Run every task, then close the epoch
    pub fn run_epoch(&mut self, tasks: &[Task]) -> EpochReport {
        let results = tasks.iter().map(|task| self.run_task(task)).collect();
        let metrics = self.end_epoch();
        EpochReport { results, metrics }
    }

    /// Pattern centroids most similar to `query`
    pub fn find_patterns(&self, query: &[f32], k: usize) -> Vec<PatternMatch> {
        self.patterns.find_similar(query, k)
    }

    /// Capture a checkpoint of the current state
    pub fn checkpoint(&self) -> Result<Checkpoint> {
        Checkpoint::capture(self)
    }

    /// Point-in-time statistics
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            phase: self.phase,
            epochs: self.epoch,
            tasks_run: self.tasks_run,
            buffer: self.buffer.stats(),
            patterns: self.patterns.len(),
            tasks_protected: self.guard.task_count(),
            pending_updates: self.adapter.pending_updates(),
            temperature: self.temperature,
            curriculum_level: self.curriculum_level,
        }
    }

    /// Current phase
    pub fn phase(&self) -> EnginePhase {
        self.phase
    }

    /// Completed epochs
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Current temperature
    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    /// Current curriculum level
    pub fn curriculum_level(&self) -> u32 {
        self.curriculum_level
    }

    /// Metrics of every completed epoch
    pub fn metrics_history(&self) -> &[EpochMetrics] {
        &self.metrics
    }

    /// Configuration
    pub fn config(&self) -> &ContinualConfig {
        &self.config
    }

    /// Adapter
    pub fn adapter(&self) -> &MicroLora {
        &self.adapter
    }

    /// Consolidation guard
    pub fn guard(&self) -> &ConsolidationGuard {
        &self.guard
    }

    /// Experience buffer
    pub fn buffer(&self) -> &ExperienceBuffer {
        &self.buffer
    }

    /// Pattern bank
    pub fn patterns(&self) -> &PatternBank {
        &self.patterns
    }

    fn fit_features<'a>(&self, task: &'a Task) -> Cow<'a, [f32]> {
        let dim = self.config.embedding_dim;
        let finite = task.features.iter().all(|v| v.is_finite());
        if task.features.len() == dim && finite {
            return Cow::Borrowed(&task.features);
        }

        if task.features.len() != dim {
            warn!(
                task_id = %task.id,
                expected = dim,
                actual = task.features.len(),
                "Fitting feature vector to embedding dimension"
            );
        }
        if !finite {
            warn!(task_id = %task.id, "Zeroing non-finite feature values");
        }
        let mut fitted: Vec<f32> = task
            .features
            .iter()
            .map(|&v| if v.is_finite() { v } else { 0.0 })
            .collect();
        fitted.resize(dim, 0.0);
        Cow::Owned(fitted)
    }

    fn fit_difficulty(task: &Task) -> f32 {
        if task.difficulty.is_finite() {
            task.difficulty.clamp(0.0, 1.0)
        } else {
            warn!(task_id = %task.id, "Non-finite difficulty treated as hardest");
            1.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::TaskGenerator;

    fn small_config() -> ContinualConfig {
        ContinualConfig::builder()
            .embedding_dim(16)
            .rank(2)
            .buffer_capacity(64)
            .min_trajectories_for_extraction(3)
            .seed(17)
            .build()
            .unwrap()
    }

    #[test]
    fn test_invalid_config_fails_fast() {
        let mut config = small_config();
        config.rank = crate::config::RankSelection::Fixed { rank: 32 };
        assert!(ContinualEngine::new(config).is_err());
    }

    #[test]
    fn test_run_task_records_trajectory() {
        let mut engine = ContinualEngine::new(small_config()).unwrap();
        let task = Task::new("t-0", "code-edit", vec![0.25; 16], 0.2);

        let result = engine.run_task(&task);
        assert_eq!(result.task_id, "t-0");
        assert!((0.0..=1.0).contains(&result.confidence));
        assert_eq!(result.units_produced, 16);
        assert_eq!(engine.buffer().len(), 1);
        assert_eq!(engine.phase(), EnginePhase::RunningTasks);
    }

    #[test]
    fn test_wrong_length_features_are_fitted() {
        let mut engine = ContinualEngine::new(small_config()).unwrap();
        let short = Task::new("short", "review", vec![1.0; 3], 0.5);
        let long = Task::new("long", "review", vec![1.0; 40], 0.5);

        engine.run_task(&short);
        engine.run_task(&long);
        assert!(engine
            .buffer()
            .entries()
            .iter()
            .all(|t| t.query_embedding.len() == 16));
    }

    #[test]
    fn test_end_epoch_advances_schedule() {
        let mut engine = ContinualEngine::new(small_config()).unwrap();
        let mut generator = TaskGenerator::standard(16, 3);

        let report = engine.run_epoch(&generator.generate(10, 1));
        assert_eq!(report.results.len(), 10);
        assert_eq!(report.metrics.epoch, 1);
        assert_eq!(report.metrics.trajectory_count, 10);
        assert!((engine.temperature() - 0.92).abs() < 1e-6);
        assert_eq!(engine.phase(), EnginePhase::Idle);
        assert_eq!(engine.metrics_history().len(), 1);
    }

    #[test]
    fn test_small_batches_stay_pending() {
        let config = ContinualConfig::builder()
            .embedding_dim(8)
            .rank(1)
            .replay_count(0)
            .seed(5)
            .build()
            .unwrap();
        let mut engine = ContinualEngine::new(config).unwrap();

        // trivial tasks with high confidence always train the adapter
        let tasks: Vec<_> = (0..2)
            .map(|i| Task::new(format!("t-{}", i), "code-edit", vec![0.5; 8], 0.0))
            .collect();
        for task in &tasks {
            engine.run_task(task);
        }
        let pending = engine.adapter().pending_updates();
        let metrics = engine.end_epoch();

        assert!(pending < 5);
        assert_eq!(metrics.effective_learning_rate, 0.0);
        assert_eq!(engine.adapter().pending_updates(), pending);
    }

    #[test]
    fn test_same_seed_is_deterministic() {
        let run = || {
            let mut engine = ContinualEngine::new(small_config()).unwrap();
            let mut generator = TaskGenerator::standard(16, 8);
            for level in 1..=2 {
                engine.run_epoch(&generator.generate(12, level));
            }
            engine.adapter().snapshot()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_stats() {
        let mut engine = ContinualEngine::new(small_config()).unwrap();
        let mut generator = TaskGenerator::standard(16, 9);
        engine.run_epoch(&generator.generate(6, 1));

        let stats = engine.stats();
        assert_eq!(stats.epochs, 1);
        assert_eq!(stats.tasks_run, 6);
        assert_eq!(stats.buffer.total, 6);
        assert_eq!(stats.phase, EnginePhase::Idle);
    }
}

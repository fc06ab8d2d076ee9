//! Configuration for the continual-learning engine

use crate::confidence::ConfidenceModel;
use crate::error::{ContinualError, Result};
use crate::lora::rank_for_capacity;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How the adapter rank is chosen
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RankSelection {
    /// Use this rank directly
    Fixed {
        /// Number of direction pairs
        rank: usize,
    },
    /// Derive the rank from the declared model capacity
    Capacity {
        /// Declared model size in parameters
        parameters: f64,
    },
}

impl RankSelection {
    /// Resolve to a concrete rank
    pub fn resolve(&self) -> usize {
        match *self {
            RankSelection::Fixed { rank } => rank,
            RankSelection::Capacity { parameters } => rank_for_capacity(parameters),
        }
    }
}

impl Default for RankSelection {
    fn default() -> Self {
        RankSelection::Fixed { rank: 2 }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContinualConfig {
    /// Length of every feature vector the engine sees
    pub embedding_dim: usize,
    /// Adapter rank policy
    #[serde(default)]
    pub rank: RankSelection,
    /// Adapter scale (alpha)
    #[serde(default = "default_alpha")]
    pub alpha: f32,
    /// Step applied per unit of quality when accumulating gradients
    #[serde(default = "default_gradient_step")]
    pub gradient_step: f32,
    /// Momentum coefficient for the A directions
    #[serde(default = "default_momentum")]
    pub momentum: f32,
    /// Consolidation strength
    #[serde(default = "default_lambda")]
    pub lambda: f32,
    /// Maximum trajectories held by the experience buffer
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
    /// Quality at which a trajectory counts as successful in buffer stats
    #[serde(default = "default_success_bar")]
    pub success_bar: f32,
    /// Minimum quality for a trajectory to feed pattern extraction
    #[serde(default = "default_pattern_threshold")]
    pub pattern_threshold: f32,
    /// Maximum number of pattern centroids
    #[serde(default = "default_max_patterns")]
    pub max_patterns: usize,
    /// Trajectories required before an extraction pass runs
    #[serde(default = "default_min_trajectories")]
    pub min_trajectories_for_extraction: usize,
    /// Trajectories replayed per epoch
    #[serde(default = "default_replay_count")]
    pub replay_count: usize,
    /// Weight applied to replayed quality
    #[serde(default = "default_replay_weight")]
    pub replay_weight: f32,
    /// Learning rate handed to the adapter at epoch boundaries
    #[serde(default = "default_base_learning_rate")]
    pub base_learning_rate: f32,
    /// Pending updates required before the adapter applies them
    #[serde(default = "default_min_batch_updates")]
    pub min_batch_updates: usize,
    /// Temperature at epoch zero
    #[serde(default = "default_initial_temperature")]
    pub initial_temperature: f32,
    /// Temperature subtracted per epoch
    #[serde(default = "default_temperature_decay")]
    pub temperature_decay_rate: f32,
    /// Lowest temperature reachable
    #[serde(default = "default_temperature_floor")]
    pub temperature_floor: f32,
    /// Epochs spent at each curriculum level
    #[serde(default = "default_epochs_per_level")]
    pub curriculum_epochs_per_level: u32,
    /// Confidence at which an unsuccessful outcome still trains the adapter
    #[serde(default = "default_high_confidence")]
    pub high_confidence_threshold: f32,
    /// Seed for every random draw the engine makes
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Confidence model coefficients
    #[serde(default)]
    pub confidence: ConfidenceModel,
}

fn default_alpha() -> f32 {
    1.0
}
fn default_gradient_step() -> f32 {
    0.01
}
fn default_momentum() -> f32 {
    0.9
}
fn default_lambda() -> f32 {
    500.0
}
fn default_buffer_capacity() -> usize {
    1000
}
fn default_success_bar() -> f32 {
    0.5
}
fn default_pattern_threshold() -> f32 {
    0.6
}
fn default_max_patterns() -> usize {
    50
}
fn default_min_trajectories() -> usize {
    5
}
fn default_replay_count() -> usize {
    8
}
fn default_replay_weight() -> f32 {
    0.5
}
fn default_base_learning_rate() -> f32 {
    0.01
}
fn default_min_batch_updates() -> usize {
    5
}
fn default_initial_temperature() -> f32 {
    1.0
}
fn default_temperature_decay() -> f32 {
    0.08
}
fn default_temperature_floor() -> f32 {
    0.3
}
fn default_epochs_per_level() -> u32 {
    3
}
fn default_high_confidence() -> f32 {
    0.8
}
fn default_seed() -> u64 {
    42
}

impl Default for ContinualConfig {
    fn default() -> Self {
        Self {
            embedding_dim: 128,
            rank: RankSelection::default(),
            alpha: default_alpha(),
            gradient_step: default_gradient_step(),
            momentum: default_momentum(),
            lambda: default_lambda(),
            buffer_capacity: default_buffer_capacity(),
            success_bar: default_success_bar(),
            pattern_threshold: default_pattern_threshold(),
            max_patterns: default_max_patterns(),
            min_trajectories_for_extraction: default_min_trajectories(),
            replay_count: default_replay_count(),
            replay_weight: default_replay_weight(),
            base_learning_rate: default_base_learning_rate(),
            min_batch_updates: default_min_batch_updates(),
            initial_temperature: default_initial_temperature(),
            temperature_decay_rate: default_temperature_decay(),
            temperature_floor: default_temperature_floor(),
            curriculum_epochs_per_level: default_epochs_per_level(),
            high_confidence_threshold: default_high_confidence(),
            seed: default_seed(),
            confidence: ConfidenceModel::default(),
        }
    }
}

impl ContinualConfig {
    /// Create a new config builder
    pub fn builder() -> ContinualConfigBuilder {
        ContinualConfigBuilder::default()
    }

    /// Load config from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ContinualConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ContinualError::Serialization(e.to_string()))
    }

    /// Rank after applying the selection policy
    pub fn resolved_rank(&self) -> usize {
        self.rank.resolve()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.embedding_dim == 0 {
            return Err(ContinualError::Config("embedding_dim must be > 0".into()));
        }
        let rank = self.resolved_rank();
        if rank == 0 {
            return Err(ContinualError::Config("rank must be > 0".into()));
        }
        if rank > self.embedding_dim {
            return Err(ContinualError::Config(format!(
                "rank {} exceeds embedding_dim {}",
                rank, self.embedding_dim
            )));
        }
        if self.buffer_capacity == 0 {
            return Err(ContinualError::Config("buffer_capacity must be > 0".into()));
        }
        if self.max_patterns == 0 {
            return Err(ContinualError::Config("max_patterns must be > 0".into()));
        }
        if self.curriculum_epochs_per_level == 0 {
            return Err(ContinualError::Config(
                "curriculum_epochs_per_level must be > 0".into(),
            ));
        }
        for (name, value) in [
            ("pattern_threshold", self.pattern_threshold),
            ("success_bar", self.success_bar),
            ("high_confidence_threshold", self.high_confidence_threshold),
            ("momentum", self.momentum),
            ("replay_weight", self.replay_weight),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ContinualError::Config(format!(
                    "{} must be in [0, 1], got {}",
                    name, value
                )));
            }
        }
        for (name, value) in [
            ("lambda", self.lambda),
            ("gradient_step", self.gradient_step),
            ("base_learning_rate", self.base_learning_rate),
            ("temperature_decay_rate", self.temperature_decay_rate),
            ("temperature_floor", self.temperature_floor),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ContinualError::Config(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        for (name, value) in [
            ("alpha", self.alpha),
            ("initial_temperature", self.initial_temperature),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ContinualError::Config(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        let model = &self.confidence;
        for (name, value) in [
            ("confidence.base", model.base),
            ("confidence.difficulty_penalty", model.difficulty_penalty),
            ("confidence.max_learning_boost", model.max_learning_boost),
            ("confidence.pattern_boost", model.pattern_boost),
            ("confidence.match_threshold", model.match_threshold),
            ("confidence.curriculum_weight", model.curriculum_weight),
            ("confidence.noise_scale", model.noise_scale),
            ("confidence.failure_quality_scale", model.failure_quality_scale),
        ] {
            if !value.is_finite() {
                return Err(ContinualError::Config(format!(
                    "{} must be finite, got {}",
                    name, value
                )));
            }
        }
        if self.temperature_floor > self.initial_temperature {
            return Err(ContinualError::Config(format!(
                "temperature_floor {} exceeds initial_temperature {}",
                self.temperature_floor, self.initial_temperature
            )));
        }
        Ok(())
    }
}

/// Config builder for fluent API
#[derive(Debug, Default)]
pub struct ContinualConfigBuilder {
    config: ContinualConfig,
}

impl ContinualConfigBuilder {
    /// Set embedding dimension
    pub fn embedding_dim(mut self, dim: usize) -> Self {
        self.config.embedding_dim = dim;
        self
    }

    /// Use a fixed adapter rank
    pub fn rank(mut self, rank: usize) -> Self {
        self.config.rank = RankSelection::Fixed { rank };
        self
    }

    /// Derive the adapter rank from a declared model capacity
    pub fn capacity(mut self, parameters: f64) -> Self {
        self.config.rank = RankSelection::Capacity { parameters };
        self
    }

    /// Set adapter scale
    pub fn alpha(mut self, alpha: f32) -> Self {
        self.config.alpha = alpha;
        self
    }

    /// Set gradient step per unit of quality
    pub fn gradient_step(mut self, step: f32) -> Self {
        self.config.gradient_step = step;
        self
    }

    /// Set momentum coefficient
    pub fn momentum(mut self, beta: f32) -> Self {
        self.config.momentum = beta;
        self
    }

    /// Set consolidation strength
    pub fn lambda(mut self, lambda: f32) -> Self {
        self.config.lambda = lambda;
        self
    }

    /// Set experience buffer capacity
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.config.buffer_capacity = capacity;
        self
    }

    /// Set pattern extraction threshold
    pub fn pattern_threshold(mut self, threshold: f32) -> Self {
        self.config.pattern_threshold = threshold;
        self
    }

    /// Set maximum pattern count
    pub fn max_patterns(mut self, max: usize) -> Self {
        self.config.max_patterns = max;
        self
    }

    /// Set minimum trajectories for extraction
    pub fn min_trajectories_for_extraction(mut self, min: usize) -> Self {
        self.config.min_trajectories_for_extraction = min;
        self
    }

    /// Set replay count
    pub fn replay_count(mut self, count: usize) -> Self {
        self.config.replay_count = count;
        self
    }

    /// Set replay weight
    pub fn replay_weight(mut self, weight: f32) -> Self {
        self.config.replay_weight = weight;
        self
    }

    /// Set minimum pending updates per apply
    pub fn min_batch_updates(mut self, min: usize) -> Self {
        self.config.min_batch_updates = min;
        self
    }

    /// Set confidence at which failed outcomes still train
    pub fn high_confidence_threshold(mut self, threshold: f32) -> Self {
        self.config.high_confidence_threshold = threshold;
        self
    }

    /// Set base learning rate
    pub fn base_learning_rate(mut self, lr: f32) -> Self {
        self.config.base_learning_rate = lr;
        self
    }

    /// Set temperature schedule
    pub fn temperature(mut self, initial: f32, decay: f32, floor: f32) -> Self {
        self.config.initial_temperature = initial;
        self.config.temperature_decay_rate = decay;
        self.config.temperature_floor = floor;
        self
    }

    /// Set epochs per curriculum level
    pub fn curriculum_epochs_per_level(mut self, epochs: u32) -> Self {
        self.config.curriculum_epochs_per_level = epochs;
        self
    }

    /// Set random seed
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    /// Set confidence model
    pub fn confidence(mut self, model: ConfidenceModel) -> Self {
        self.config.confidence = model;
        self
    }

    /// Build the config
    pub fn build(self) -> Result<ContinualConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

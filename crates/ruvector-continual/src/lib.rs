//! # Ruvector Continual
//!
//! Online continual-learning engine over fixed-length feature vectors.
//!
//! ## Components
//!
//! - **MicroLoRA** ([`lora`]): low-rank additive correction with batched,
//!   momentum-smoothed updates
//! - **EWC guard** ([`ewc`]): Fisher-style importance that dampens gradients
//!   along dimensions earlier tasks relied on
//! - **Experience buffer** ([`buffer`]): quality-ranked retention, draining
//!   for pattern extraction and non-destructive replay sampling
//! - **ReasoningBank** ([`reasoning_bank`]): bounded set of high-quality
//!   centroids answering cosine-similarity queries
//! - **Engine** ([`orchestrator`]): the epoch loop with curriculum and
//!   temperature schedules, plus hash-verified [`checkpoint`]s
//!
//! ## Example
//!
//! ```rust,no_run
//! use ruvector_continual::{ContinualConfig, ContinualEngine, TaskGenerator};
//!
//! let config = ContinualConfig::builder()
//!     .embedding_dim(64)
//!     .rank(2)
//!     .build()?;
//! let mut engine = ContinualEngine::new(config)?;
//! let mut tasks = TaskGenerator::standard(64, 7);
//!
//! for _ in 0..10 {
//!     let batch = tasks.generate(32, engine.curriculum_level());
//!     let report = engine.run_epoch(&batch);
//!     println!("epoch {} resolve {:.2}", report.metrics.epoch, report.metrics.resolve_rate);
//! }
//!
//! engine.checkpoint()?.save("continual.json")?;
//! # Ok::<(), ruvector_continual::ContinualError>(())
//! ```

#![warn(missing_docs)]

pub mod buffer;
pub mod checkpoint;
pub mod confidence;
pub mod config;
pub mod error;
pub mod ewc;
pub mod lora;
pub mod orchestrator;
pub mod reasoning_bank;
pub mod tasks;
pub mod types;

pub use buffer::{BufferStats, ExperienceBuffer};
pub use checkpoint::{Checkpoint, FORMAT_VERSION};
pub use confidence::{ConfidenceModel, ConfidenceTerms, MAX_CURRICULUM_LEVEL};
pub use config::{ContinualConfig, ContinualConfigBuilder, RankSelection};
pub use error::{ContinualError, Result};
pub use ewc::{ConsolidationGuard, ConsolidationSnapshot};
pub use lora::{rank_for_capacity, LoraSnapshot, MicroLora};
pub use orchestrator::{ContinualEngine, EngineStats, EpochReport};
pub use reasoning_bank::{cosine_similarity, PatternBank, PatternCentroid, PatternMatch};
pub use tasks::TaskGenerator;
pub use types::{
    EnginePhase, EpochMetrics, Task, TaskResult, Trajectory, TrajectoryBuilder, TrajectoryStep,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

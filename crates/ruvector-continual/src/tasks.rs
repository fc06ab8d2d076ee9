//! Seeded synthetic task source
//!
//! Each task type owns a fixed unit-length prototype direction; generated
//! tasks are the prototype plus small seeded noise, with difficulty drawn from
//! the band of the requested curriculum level. Embedders with real workloads
//! construct [`Task`]s directly instead.

use crate::confidence::MAX_CURRICULUM_LEVEL;
use crate::types::Task;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Task types produced by [`TaskGenerator::standard`]
pub const STANDARD_TASK_TYPES: [&str; 4] = ["code-edit", "bug-fix", "refactor", "review"];

/// Amplitude of per-task feature noise
const FEATURE_NOISE: f32 = 0.15;

/// Difficulty band `[low, high)` for a curriculum level
pub fn difficulty_band(level: u32) -> (f32, f32) {
    match level.clamp(1, MAX_CURRICULUM_LEVEL) {
        1 => (0.0, 0.4),
        2 => (0.3, 0.7),
        _ => (0.6, 1.0),
    }
}

/// Deterministic task generator
#[derive(Debug, Clone)]
pub struct TaskGenerator {
    rng: StdRng,
    dim: usize,
    prototypes: Vec<(String, Vec<f32>)>,
    next_id: u64,
}

impl TaskGenerator {
    /// Generator over the given task types
    pub fn new<S: AsRef<str>>(dim: usize, task_types: &[S], seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let prototypes = task_types
            .iter()
            .map(|name| (name.as_ref().to_string(), random_unit(&mut rng, dim)))
            .collect();
        Self {
            rng,
            dim,
            prototypes,
            next_id: 0,
        }
    }

    /// Generator over [`STANDARD_TASK_TYPES`]
    pub fn standard(dim: usize, seed: u64) -> Self {
        Self::new(dim, &STANDARD_TASK_TYPES, seed)
    }

    /// Generate `count` tasks for a curriculum level
    pub fn generate(&mut self, count: usize, level: u32) -> Vec<Task> {
        (0..count).map(|_| self.next_task(level)).collect()
    }

    /// Generate one task for a curriculum level
    pub fn next_task(&mut self, level: u32) -> Task {
        let (low, high) = difficulty_band(level);
        let difficulty = self.rng.gen_range(low..high);
        let id = self.next_id;
        self.next_id += 1;

        if self.prototypes.is_empty() {
            let features = random_unit(&mut self.rng, self.dim);
            return Task::new(format!("task-{}", id), "generic", features, difficulty);
        }

        let index = self.rng.gen_range(0..self.prototypes.len());
        let (task_type, prototype) = &self.prototypes[index];
        let features = prototype
            .iter()
            .map(|&p| p + self.rng.gen_range(-FEATURE_NOISE..FEATURE_NOISE) / (self.dim as f32).sqrt())
            .collect();

        Task::new(
            format!("{}-{}", task_type, id),
            task_type.clone(),
            features,
            difficulty,
        )
    }

    /// Task types and their prototype directions
    pub fn prototypes(&self) -> &[(String, Vec<f32>)] {
        &self.prototypes
    }

    /// Feature dimension
    pub fn dim(&self) -> usize {
        self.dim
    }
}

fn random_unit<R: Rng + ?Sized>(rng: &mut R, dim: usize) -> Vec<f32> {
    let mut v: Vec<f32> = (0..dim).map(|_| rng.gen_range(-1.0f32..1.0)).collect();
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 1e-8 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

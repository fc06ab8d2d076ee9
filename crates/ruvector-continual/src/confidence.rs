//! Confidence model and training schedules
//!
//! A task's confidence is the clamped sum of independent terms:
//!
//! ```text
//! confidence = base_capability(difficulty)
//!            + learning_boost(adapter correction)
//!            + pattern_boost(best pattern match)
//!            + curriculum_adjustment(level, difficulty)
//!            + noise(temperature)
//! ```
//!
//! Every coefficient lives in [`ConfidenceModel`] so deployments can retune
//! them; none of the defaults carry meaning beyond giving the loop a
//! plausible shape.

use crate::reasoning_bank::PatternMatch;
use serde::{Deserialize, Serialize};

/// Highest curriculum level; levels run from 1 to this value
pub const MAX_CURRICULUM_LEVEL: u32 = 3;

const NORM_EPSILON: f32 = 1e-8;

/// Coefficients of the confidence model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceModel {
    /// Confidence on a trivial task before any learning
    pub base: f32,
    /// Confidence lost per unit of difficulty
    pub difficulty_penalty: f32,
    /// Ceiling of the adapter-driven boost
    pub max_learning_boost: f32,
    /// Weight of a matched pattern's similarity × quality
    pub pattern_boost: f32,
    /// Similarity a pattern needs before it boosts confidence
    pub match_threshold: f32,
    /// Weight of curriculum progress on hard tasks
    pub curriculum_weight: f32,
    /// Amplitude of temperature-scaled noise
    pub noise_scale: f32,
    /// Quality multiplier for failed attempts
    pub failure_quality_scale: f32,
}

impl Default for ConfidenceModel {
    fn default() -> Self {
        Self {
            base: 0.7,
            difficulty_penalty: 0.45,
            max_learning_boost: 0.15,
            pattern_boost: 0.12,
            match_threshold: 0.7,
            curriculum_weight: 0.1,
            noise_scale: 0.1,
            failure_quality_scale: 0.5,
        }
    }
}

/// Individual confidence terms for one task
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceTerms {
    /// Capability before learning
    pub base: f32,
    /// Contribution of the adapter
    pub learning: f32,
    /// Contribution of the best matching pattern
    pub pattern: f32,
    /// Curriculum progress adjustment
    pub curriculum: f32,
    /// Temperature-scaled noise
    pub noise: f32,
}

/// Capability before learning: harder tasks start lower
pub fn base_capability(model: &ConfidenceModel, difficulty: f32) -> f32 {
    model.base - model.difficulty_penalty * difficulty.clamp(0.0, 1.0)
}

/// Boost from the adapter's correction, relative to the input magnitude
pub fn learning_boost(model: &ConfidenceModel, input: &[f32], correction: &[f32]) -> f32 {
    let input_norm = l2_norm(input);
    let correction_norm = l2_norm(correction);
    model.max_learning_boost * (correction_norm / (input_norm + NORM_EPSILON)).tanh()
}

/// Boost from the closest stored pattern, and whether it counted as a match
pub fn pattern_boost(model: &ConfidenceModel, best: Option<&PatternMatch>) -> (f32, bool) {
    match best {
        Some(m) if m.similarity >= model.match_threshold => {
            (model.pattern_boost * m.similarity * m.quality, true)
        }
        _ => (0.0, false),
    }
}

/// Adjustment from curriculum progress; higher levels handle hard tasks better
pub fn curriculum_adjustment(model: &ConfidenceModel, level: u32, difficulty: f32) -> f32 {
    let progress = level.min(MAX_CURRICULUM_LEVEL) as f32 / MAX_CURRICULUM_LEVEL as f32;
    model.curriculum_weight * progress * difficulty.clamp(0.0, 1.0)
}

/// Zero-mean noise scaled by temperature; `sample` is uniform in [0, 1)
pub fn noise(model: &ConfidenceModel, temperature: f32, sample: f32) -> f32 {
    model.noise_scale * temperature * (2.0 * sample - 1.0)
}

/// Sum the terms and clamp to [0, 1]
///
/// A NaN sum collapses to zero.
pub fn combine(terms: &ConfidenceTerms) -> f32 {
    let sum = terms.base + terms.learning + terms.pattern + terms.curriculum + terms.noise;
    if sum.is_nan() {
        return 0.0;
    }
    sum.clamp(0.0, 1.0)
}

/// Trajectory quality for an outcome
pub fn outcome_quality(model: &ConfidenceModel, success: bool, confidence: f32) -> f32 {
    let quality = if success {
        confidence
    } else {
        confidence * model.failure_quality_scale
    };
    quality.clamp(0.0, 1.0)
}

/// Temperature after one more epoch
pub fn next_temperature(current: f32, decay: f32, floor: f32) -> f32 {
    (current - decay).max(floor)
}

/// Curriculum level after `epochs_done` completed epochs
pub fn curriculum_level(epochs_done: u64, epochs_per_level: u32) -> u32 {
    let per_level = u64::from(epochs_per_level.max(1));
    let level = 1 + epochs_done / per_level;
    level.min(u64::from(MAX_CURRICULUM_LEVEL)) as u32
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_capability_drops_with_difficulty() {
        let model = ConfidenceModel::default();
        assert!(base_capability(&model, 0.9) < base_capability(&model, 0.1));
    }

    #[test]
    fn test_learning_boost_zero_without_correction() {
        let model = ConfidenceModel::default();
        assert_eq!(learning_boost(&model, &[1.0, 2.0], &[0.0, 0.0]), 0.0);
        let boost = learning_boost(&model, &[1.0, 0.0], &[100.0, 0.0]);
        assert!(boost > 0.0 && boost <= model.max_learning_boost);
    }

    #[test]
    fn test_pattern_boost_threshold() {
        let model = ConfidenceModel::default();
        let weak = PatternMatch {
            embedding: vec![1.0],
            quality: 0.9,
            similarity: 0.2,
        };
        let strong = PatternMatch {
            similarity: 0.95,
            ..weak.clone()
        };

        assert_eq!(pattern_boost(&model, None), (0.0, false));
        assert_eq!(pattern_boost(&model, Some(&weak)), (0.0, false));
        let (boost, matched) = pattern_boost(&model, Some(&strong));
        assert!(matched);
        assert!((boost - model.pattern_boost * 0.95 * 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_curriculum_adjustment_monotonic_in_level() {
        let model = ConfidenceModel::default();
        let low = curriculum_adjustment(&model, 1, 0.8);
        let high = curriculum_adjustment(&model, 3, 0.8);
        assert!(high > low);
        assert_eq!(curriculum_adjustment(&model, 9, 0.8), high);
    }

    #[test]
    fn test_noise_is_centered() {
        let model = ConfidenceModel::default();
        assert_eq!(noise(&model, 1.0, 0.5), 0.0);
        assert!(noise(&model, 1.0, 0.0) < 0.0);
        assert_eq!(noise(&model, 0.0, 0.99), 0.0);
    }

    #[test]
    fn test_combine_clamps() {
        let high = ConfidenceTerms {
            base: 0.9,
            learning: 0.3,
            ..Default::default()
        };
        assert_eq!(combine(&high), 1.0);
        let low = ConfidenceTerms {
            base: 0.1,
            noise: -0.5,
            ..Default::default()
        };
        assert_eq!(combine(&low), 0.0);
        let broken = ConfidenceTerms {
            learning: f32::NAN,
            ..high
        };
        assert_eq!(combine(&broken), 0.0);
    }

    #[test]
    fn test_failed_outcome_quality_scaled() {
        let model = ConfidenceModel::default();
        assert_eq!(outcome_quality(&model, true, 0.8), 0.8);
        assert!((outcome_quality(&model, false, 0.8) - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_temperature_schedule() {
        let mut t = 1.0f32;
        t = next_temperature(t, 0.08, 0.3);
        assert!((t - 0.92).abs() < 1e-6);
        for _ in 1..10 {
            t = next_temperature(t, 0.08, 0.3);
        }
        assert_eq!(t, 0.3);
    }

    #[test]
    fn test_curriculum_level_capped() {
        assert_eq!(curriculum_level(0, 3), 1);
        assert_eq!(curriculum_level(2, 3), 1);
        assert_eq!(curriculum_level(3, 3), 2);
        assert_eq!(curriculum_level(6, 3), 3);
        assert_eq!(curriculum_level(600, 3), MAX_CURRICULUM_LEVEL);
    }
}

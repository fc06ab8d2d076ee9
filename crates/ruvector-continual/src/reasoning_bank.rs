//! ReasoningBank - bounded store of high-quality interaction patterns
//!
//! Each extraction pass replaces the whole centroid set with the best of the
//! trajectories it was given, so the bank tracks recent behavior instead of
//! accumulating stale patterns.

use crate::error::{ContinualError, Result};
use crate::types::Trajectory;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Relative width of the random tie-break applied to quality during selection
pub const TIEBREAK_JITTER: f32 = 0.1;

const SIMILARITY_EPSILON: f32 = 1e-8;

/// A stored pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternCentroid {
    /// Representative embedding
    pub embedding: Vec<f32>,
    /// Quality of the trajectory it came from
    pub quality: f32,
}

/// Result of a similarity query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternMatch {
    /// Centroid embedding
    pub embedding: Vec<f32>,
    /// Centroid quality
    pub quality: f32,
    /// Cosine similarity to the query
    pub similarity: f32,
}

/// Cosine similarity, `dot(a, b) / (|a| |b| + eps)`
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    dot / (norm_a * norm_b + SIMILARITY_EPSILON)
}

/// Pattern bank
#[derive(Debug, Clone)]
pub struct PatternBank {
    centroids: Vec<PatternCentroid>,
    max_patterns: usize,
    min_trajectories: usize,
    extractions: u64,
}

impl PatternBank {
    /// Create an empty bank
    pub fn new(max_patterns: usize, min_trajectories: usize) -> Self {
        Self {
            centroids: Vec::new(),
            max_patterns,
            min_trajectories,
            extractions: 0,
        }
    }

    /// Rebuild a bank from stored centroids
    pub fn from_centroids(
        max_patterns: usize,
        min_trajectories: usize,
        centroids: Vec<PatternCentroid>,
    ) -> Result<Self> {
        if centroids.len() > max_patterns {
            return Err(ContinualError::Config(format!(
                "{} stored patterns exceed max_patterns {}",
                centroids.len(),
                max_patterns
            )));
        }
        Ok(Self {
            centroids,
            ..Self::new(max_patterns, min_trajectories)
        })
    }

    /// Replace the centroid set with up to `k` of the best trajectories
    ///
    /// Returns `None` and keeps the current centroids when fewer than the
    /// minimum number of trajectories is supplied.
    pub fn extract_patterns<R: Rng + ?Sized>(
        &mut self,
        trajectories: &[Trajectory],
        k: usize,
        rng: &mut R,
    ) -> Option<usize> {
        if trajectories.len() < self.min_trajectories {
            tracing::debug!(
                available = trajectories.len(),
                required = self.min_trajectories,
                "Skipping pattern extraction"
            );
            return None;
        }

        let mut ranked: Vec<(f32, &Trajectory)> = trajectories
            .iter()
            .map(|t| {
                let tiebreak = 1.0 - TIEBREAK_JITTER + TIEBREAK_JITTER * rng.gen::<f32>();
                (t.final_quality * tiebreak, t)
            })
            .collect();
        ranked.sort_by(|a, b| b.0.total_cmp(&a.0));

        let take = k.min(self.max_patterns);
        self.centroids = ranked
            .into_iter()
            .take(take)
            .map(|(_, t)| PatternCentroid {
                embedding: t.query_embedding.clone(),
                quality: t.final_quality,
            })
            .collect();
        self.extractions += 1;

        Some(self.centroids.len())
    }

    /// The `top_k` centroids most similar to `query`, best first
    pub fn find_similar(&self, query: &[f32], top_k: usize) -> Vec<PatternMatch> {
        let mut matches: Vec<PatternMatch> = self
            .centroids
            .iter()
            .map(|c| PatternMatch {
                embedding: c.embedding.clone(),
                quality: c.quality,
                similarity: cosine_similarity(query, &c.embedding),
            })
            .collect();
        matches.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        matches.truncate(top_k);
        matches
    }

    /// Stored centroids
    pub fn centroids(&self) -> &[PatternCentroid] {
        &self.centroids
    }

    /// Number of stored centroids
    pub fn len(&self) -> usize {
        self.centroids.len()
    }

    /// Whether the bank is empty
    pub fn is_empty(&self) -> bool {
        self.centroids.is_empty()
    }

    /// Upper bound on stored centroids
    pub fn max_patterns(&self) -> usize {
        self.max_patterns
    }

    /// Completed extraction passes
    pub fn extractions(&self) -> u64 {
        self.extractions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TrajectoryBuilder;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn trajectory(id: u64, embedding: Vec<f32>, quality: f32) -> Trajectory {
        TrajectoryBuilder::new(id, embedding).build(quality)
    }

    fn axis(dim: usize, i: usize) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        v[i % dim] = 1.0;
        v
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_insufficient_input_keeps_centroids() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut bank = PatternBank::new(10, 5);
        let first: Vec<_> = (0..6).map(|i| trajectory(i, axis(8, i as usize), 0.9)).collect();
        assert_eq!(bank.extract_patterns(&first, 10, &mut rng), Some(6));
        let before = bank.centroids().to_vec();

        let few: Vec<_> = (0..4).map(|i| trajectory(i, axis(8, 7), 1.0)).collect();
        assert_eq!(bank.extract_patterns(&few, 10, &mut rng), None);
        assert_eq!(bank.centroids(), before.as_slice());
    }

    #[test]
    fn test_extraction_replaces_and_bounds() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut bank = PatternBank::new(3, 2);
        let batch: Vec<_> = (0..8)
            .map(|i| trajectory(i, axis(8, i as usize), 0.1 * i as f32))
            .collect();
        assert_eq!(bank.extract_patterns(&batch, 10, &mut rng), Some(3));
        assert_eq!(bank.len(), 3);

        let second: Vec<_> = (0..2).map(|i| trajectory(i, vec![1.0; 8], 0.5)).collect();
        bank.extract_patterns(&second, 10, &mut rng);
        assert_eq!(bank.len(), 2);
        assert!(bank.centroids().iter().all(|c| c.embedding == vec![1.0; 8]));
    }

    #[test]
    fn test_high_quality_preferred() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut bank = PatternBank::new(2, 1);
        let batch = vec![
            trajectory(0, axis(4, 0), 0.2),
            trajectory(1, axis(4, 1), 0.95),
            trajectory(2, axis(4, 2), 0.3),
            trajectory(3, axis(4, 3), 0.9),
        ];
        bank.extract_patterns(&batch, 2, &mut rng);
        let mut qualities: Vec<f32> = bank.centroids().iter().map(|c| c.quality).collect();
        qualities.sort_by(|a, b| b.total_cmp(a));
        assert_eq!(qualities, vec![0.95, 0.9]);
    }

    #[test]
    fn test_find_similar_sorted_and_self_match() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut bank = PatternBank::new(10, 1);
        let batch: Vec<_> = (0..5)
            .map(|i| trajectory(i, vec![1.0, i as f32, 0.5], 0.8))
            .collect();
        bank.extract_patterns(&batch, 5, &mut rng);

        let query = vec![1.0, 2.0, 0.5];
        let matches = bank.find_similar(&query, 3);
        assert_eq!(matches.len(), 3);
        assert!(matches.windows(2).all(|w| w[0].similarity >= w[1].similarity));
        assert!((matches[0].similarity - 1.0).abs() < 1e-5);
        assert_eq!(matches[0].embedding, query);
    }

    #[test]
    fn test_from_centroids_bounded() {
        let centroids = vec![
            PatternCentroid {
                embedding: vec![1.0],
                quality: 0.5,
            };
            3
        ];
        assert!(PatternBank::from_centroids(2, 1, centroids.clone()).is_err());
        assert_eq!(PatternBank::from_centroids(3, 1, centroids).unwrap().len(), 3);
    }
}

//! Hash-verified engine checkpoints
//!
//! A checkpoint is an immutable snapshot. The integrity hash is SHA-256 over
//! the JSON of the {adapter, consolidation, patterns} triple; metrics and
//! buffer summary are carried but not hashed.

use crate::buffer::BufferStats;
use crate::error::{ContinualError, Result};
use crate::ewc::ConsolidationSnapshot;
use crate::lora::LoraSnapshot;
use crate::orchestrator::ContinualEngine;
use crate::reasoning_bank::PatternCentroid;
use crate::types::EpochMetrics;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Checkpoint format written and accepted by this build
pub const FORMAT_VERSION: u32 = 1;

/// Serialized engine state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Format version
    pub format_version: u32,
    /// Adapter weights
    pub adapter: LoraSnapshot,
    /// Buffer summary
    pub buffer: BufferStats,
    /// Consolidation state
    pub consolidation: ConsolidationSnapshot,
    /// Pattern centroids
    pub patterns: Vec<PatternCentroid>,
    /// Full metrics history
    pub metrics: Vec<EpochMetrics>,
    /// Capture time
    pub created_at: DateTime<Utc>,
    /// Lowercase hex SHA-256 of the hashed triple
    pub integrity_hash: String,
}

#[derive(Serialize)]
struct HashedState<'a> {
    adapter: &'a LoraSnapshot,
    consolidation: &'a ConsolidationSnapshot,
    patterns: &'a [PatternCentroid],
}

#[derive(Deserialize)]
struct VersionProbe {
    format_version: u32,
}

fn state_hash(
    adapter: &LoraSnapshot,
    consolidation: &ConsolidationSnapshot,
    patterns: &[PatternCentroid],
) -> Result<String> {
    let bytes = serde_json::to_vec(&HashedState {
        adapter,
        consolidation,
        patterns,
    })?;
    let mut h = Sha256::new();
    h.update(&bytes);
    Ok(h.finalize().iter().map(|b| format!("{:02x}", b)).collect())
}

impl Checkpoint {
    /// Snapshot an engine
    pub fn capture<R: Rng>(engine: &ContinualEngine<R>) -> Result<Self> {
        let adapter = engine.adapter().snapshot();
        let consolidation = engine.guard().snapshot();
        let patterns = engine.patterns().centroids().to_vec();
        let integrity_hash = state_hash(&adapter, &consolidation, &patterns)?;

        Ok(Self {
            format_version: FORMAT_VERSION,
            adapter,
            buffer: engine.buffer().stats(),
            consolidation,
            patterns,
            metrics: engine.metrics_history().to_vec(),
            created_at: Utc::now(),
            integrity_hash,
        })
    }

    /// Recompute the integrity hash from the carried state
    pub fn integrity_hash(&self) -> Result<String> {
        state_hash(&self.adapter, &self.consolidation, &self.patterns)
    }

    /// Check the stored hash against the carried state
    pub fn verify(&self) -> Result<()> {
        let actual = self.integrity_hash()?;
        if actual != self.integrity_hash {
            tracing::warn!(
                expected = %self.integrity_hash,
                actual = %actual,
                "Checkpoint failed verification"
            );
            return Err(ContinualError::Integrity {
                expected: self.integrity_hash.clone(),
                actual,
            });
        }
        Ok(())
    }

    /// Render as pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse, check the format version, and verify
    pub fn from_json(json: &str) -> Result<Self> {
        let probe: VersionProbe = serde_json::from_str(json)?;
        if probe.format_version != FORMAT_VERSION {
            return Err(ContinualError::UnsupportedFormat {
                found: probe.format_version,
                supported: FORMAT_VERSION,
            });
        }
        let checkpoint: Checkpoint = serde_json::from_str(json)?;
        checkpoint.verify()?;
        Ok(checkpoint)
    }

    /// Write to `path` via a temporary sibling and an atomic rename
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp = temp_path(path);
        let written = self.write_to(&tmp);
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        fs::rename(&tmp, path)?;

        tracing::info!(
            path = %path.display(),
            epochs = self.metrics.len(),
            hash = %self.integrity_hash,
            "Checkpoint saved"
        );
        Ok(())
    }

    /// Read and verify a checkpoint file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Adapter rank
    pub fn rank(&self) -> usize {
        self.adapter.rank
    }

    /// Feature dimension
    pub fn dim(&self) -> usize {
        self.consolidation.importance.len()
    }

    fn write_to(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "checkpoint".into());
    name.push(".tmp");
    path.with_file_name(name)
}

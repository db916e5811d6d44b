//! Resume checkpointing.
//!
//! After every chunk the full set of completed indices is rewritten
//! atomically (temp file + rename) together with a hash of the configuration,
//! so a resumed run can detect config drift.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::BatchConfig;
use crate::foundation::error::{ForgeError, ForgeResult};

pub const CHECKPOINT_FILENAME: &str = ".generation_checkpoint";

#[derive(Clone, Debug, Serialize, Deserialize)]
struct CheckpointFile {
    config_hash: String,
    total_images: u64,
    completed: Vec<u64>,
}

pub struct CheckpointManager {
    path: PathBuf,
    config_hash: String,
    total_images: u64,
    completed: BTreeSet<u64>,
}

impl CheckpointManager {
    pub fn new(output_dir: &Path, config: &BatchConfig) -> Self {
        Self {
            path: output_dir.join(CHECKPOINT_FILENAME),
            config_hash: config.content_hash(),
            total_images: config.total_images,
            completed: BTreeSet::new(),
        }
    }

    /// Load an existing checkpoint. Returns true when the stored config hash
    /// differs from the current one (the caller warns and continues).
    pub fn load(&mut self) -> ForgeResult<bool> {
        if !self.path.exists() {
            return Ok(false);
        }
        let raw = std::fs::read_to_string(&self.path)?;
        let file: CheckpointFile = serde_json::from_str(&raw)
            .map_err(|e| ForgeError::invariant(format!("corrupt checkpoint: {e}")))?;

        let mismatch = file.config_hash != self.config_hash;
        if mismatch {
            tracing::warn!(
                path = %self.path.display(),
                "checkpoint was written by a different configuration; \
                 resumed outputs may be inconsistent"
            );
        }
        self.completed = file.completed.into_iter().collect();
        Ok(mismatch)
    }

    pub fn is_completed(&self, index: u64) -> bool {
        self.completed.contains(&index)
    }

    pub fn mark_completed(&mut self, index: u64) {
        self.completed.insert(index);
    }

    pub fn completed_count(&self) -> u64 {
        self.completed.len() as u64
    }

    /// Atomically rewrite the checkpoint file.
    pub fn flush(&self) -> ForgeResult<()> {
        let file = CheckpointFile {
            config_hash: self.config_hash.clone(),
            total_images: self.total_images,
            completed: self.completed.iter().copied().collect(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| ForgeError::invariant(format!("checkpoint serialization: {e}")))?;

        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

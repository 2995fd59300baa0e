//! Checkpoint file format: the durable serialization of the state store.
//!
//! The document is JSON (via `serde_json`) with an integrity checksum over
//! the rest of its content, computed with `sha2::Sha256`. On load, the
//! checksum must verify; a format/version mismatch or checksum failure is
//! fatal and surfaces to the operator as
//! [`ManagerError::CheckpointCorrupt`](crate::error::ManagerError::CheckpointCorrupt).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::cpuset::CpuSet;
use crate::error::ManagerError;

pub const STATE_FILE_NAME: &str = "cpu_manager_state";

pub fn state_file_path(state_dir: &Path) -> PathBuf {
    state_dir.join(STATE_FILE_NAME)
}

/// One exclusive assignment entry as persisted on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckpointEntry {
    pub pod_uid: String,
    pub container_name: String,
    pub cpu_set: CpuSet,
}

/// The full durable state: policy name, default set, and every exclusive
/// assignment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Checkpoint {
    pub policy_name: String,
    pub default_cpu_set: CpuSet,
    pub entries: Vec<CheckpointEntry>,
    #[serde(default)]
    pub checksum: String,
}

impl Checkpoint {
    pub fn new(policy_name: impl Into<String>, default_cpu_set: CpuSet, entries: Vec<CheckpointEntry>) -> Self {
        let mut checkpoint = Self {
            policy_name: policy_name.into(),
            default_cpu_set,
            entries,
            checksum: String::new(),
        };
        checkpoint.checksum = checkpoint.compute_checksum();
        checkpoint
    }

    /// Computes the checksum over the canonical (checksum-field-cleared,
    /// sorted-key) JSON encoding of this checkpoint.
    fn compute_checksum(&self) -> String {
        let mut unchecksummed = self.clone();
        unchecksummed.checksum = String::new();
        // BTreeMap re-serialization guarantees sorted keys regardless of the
        // struct's field declaration order.
        let value = serde_json::to_value(&unchecksummed).expect("checkpoint always serializes");
        let sorted: BTreeMap<String, serde_json::Value> =
            serde_json::from_value(value).expect("checkpoint is always a JSON object");
        let canonical = serde_json::to_string(&sorted).expect("sorted map always serializes");

        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn verify_checksum(&self) -> bool {
        self.checksum == self.compute_checksum()
    }

    /// Serialize and write to `state_dir/cpu_manager_state`.
    pub async fn flush(&self, state_dir: &Path) -> Result<(), ManagerError> {
        let path = state_file_path(state_dir);
        let json = serde_json::to_string_pretty(self).map_err(|e| ManagerError::CheckpointCorrupt {
            reason: format!("failed to serialize checkpoint: {e}"),
        })?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ManagerError::CheckpointCorrupt {
                    reason: format!("failed to create state directory: {e}"),
                })?;
        }

        // Write to a temp file and rename so a crash never leaves a
        // half-written checkpoint on disk.
        let tmp_path = path.with_extension("tmp");
        tokio::fs::write(&tmp_path, json.as_bytes())
            .await
            .map_err(|e| ManagerError::CheckpointCorrupt {
                reason: format!("failed to write checkpoint: {e}"),
            })?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| ManagerError::CheckpointCorrupt {
                reason: format!("failed to install checkpoint: {e}"),
            })?;

        debug!(path = %path.display(), "checkpoint flushed");
        Ok(())
    }

    /// Load and integrity-check a checkpoint from `state_dir`. Returns
    /// `Ok(None)` if no checkpoint file exists yet (fresh start).
    pub async fn load(state_dir: &Path) -> Result<Option<Checkpoint>, ManagerError> {
        let path = state_file_path(state_dir);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(ManagerError::CheckpointCorrupt {
                    reason: format!("failed to read checkpoint: {e}"),
                })
            }
        };

        let checkpoint: Checkpoint = serde_json::from_str(&content).map_err(|e| ManagerError::CheckpointCorrupt {
            reason: format!("malformed checkpoint JSON: {e}"),
        })?;

        if !checkpoint.verify_checksum() {
            return Err(ManagerError::CheckpointCorrupt {
                reason: "checksum mismatch".to_string(),
            });
        }

        info!(
            path = %path.display(),
            policy = %checkpoint.policy_name,
            entries = checkpoint.entries.len(),
            "checkpoint loaded"
        );
        Ok(Some(checkpoint))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> Checkpoint {
        Checkpoint::new(
            "static",
            "6-7".parse().unwrap(),
            vec![
                CheckpointEntry {
                    pod_uid: "p1".to_string(),
                    container_name: "c1".to_string(),
                    cpu_set: "0-3".parse().unwrap(),
                },
                CheckpointEntry {
                    pod_uid: "p2".to_string(),
                    container_name: "c2".to_string(),
                    cpu_set: "4-5".parse().unwrap(),
                },
            ],
        )
    }

    #[tokio::test]
    async fn round_trip_preserves_state() {
        let dir = TempDir::new().unwrap();
        let original = sample();
        original.flush(dir.path()).await.unwrap();

        let loaded = Checkpoint::load(dir.path()).await.unwrap().unwrap();
        assert_eq!(loaded, original);
    }

    #[tokio::test]
    async fn missing_file_returns_none() {
        let dir = TempDir::new().unwrap();
        let loaded = Checkpoint::load(dir.path()).await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn tampered_checksum_is_rejected() {
        let dir = TempDir::new().unwrap();
        let original = sample();
        original.flush(dir.path()).await.unwrap();

        let path = state_file_path(dir.path());
        let mut on_disk: Checkpoint = serde_json::from_str(&tokio::fs::read_to_string(&path).await.unwrap()).unwrap();
        on_disk.default_cpu_set = "0-7".parse().unwrap(); // tamper without updating checksum
        tokio::fs::write(&path, serde_json::to_string(&on_disk).unwrap()).await.unwrap();

        let err = Checkpoint::load(dir.path()).await.unwrap_err();
        assert!(matches!(err, ManagerError::CheckpointCorrupt { .. }));
    }

    #[tokio::test]
    async fn malformed_json_is_rejected() {
        let dir = TempDir::new().unwrap();
        tokio::fs::create_dir_all(dir.path()).await.unwrap();
        tokio::fs::write(state_file_path(dir.path()), b"not json at all")
            .await
            .unwrap();

        let err = Checkpoint::load(dir.path()).await.unwrap_err();
        assert!(matches!(err, ManagerError::CheckpointCorrupt { .. }));
    }

    #[test]
    fn checksum_is_stable_for_identical_content() {
        let a = sample();
        let b = sample();
        assert_eq!(a.checksum, b.checksum);
    }
}

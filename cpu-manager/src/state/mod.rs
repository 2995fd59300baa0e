//! The state store: the single source of truth for exclusive CPU
//! assignments, mirrored to a checkpoint on every mutation.
//!
//! [`StateStore`] owns the in-memory [`Assignment`] map, the
//! policy-provided default set, and the [`ContainerMap`] index. It is always
//! reached through `Manager`'s mutex (see [`crate::manager`]); nothing here
//! does its own locking.

pub mod checkpoint;
pub mod container_map;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::cpuset::CpuSet;
use crate::error::ManagerError;
use checkpoint::{Checkpoint, CheckpointEntry};
use container_map::ContainerMap;

/// A pod's UID, as reported by the source of truth for running pods.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct PodUid(String);

impl From<&str> for PodUid {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PodUid {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for PodUid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for PodUid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A container's name within its pod spec (not its runtime id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct ContainerName(String);

impl From<&str> for ContainerName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ContainerName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for ContainerName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ContainerName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Every container's exclusive assignment, keyed by pod then container name.
pub type Assignment = HashMap<PodUid, HashMap<ContainerName, CpuSet>>;

/// The in-memory state plus its checkpoint mirror.
///
/// Mutating methods are synchronous — they only ever touch memory, the way
/// a `Policy` needs to apply them without an `.await` in the middle of a
/// mutex-held critical section. [`StateStore::flush`] is the one async
/// method; callers (in practice only `Manager`) are responsible for calling
/// it after a mutation and before releasing the mutex, so a crash between
/// mutation and the next reconcile tick never loses state.
#[derive(Debug)]
pub struct StateStore {
    policy_name: String,
    default_cpu_set: CpuSet,
    assignment: Assignment,
    container_map: ContainerMap,
    state_dir: PathBuf,
}

impl StateStore {
    /// Construct a fresh, empty store (no checkpoint on disk yet).
    pub fn new(policy_name: impl Into<String>, default_cpu_set: CpuSet, state_dir: impl Into<PathBuf>) -> Self {
        Self {
            policy_name: policy_name.into(),
            default_cpu_set,
            assignment: Assignment::new(),
            container_map: ContainerMap::new(),
            state_dir: state_dir.into(),
        }
    }

    /// Load from an existing checkpoint if present, otherwise start fresh.
    /// Rejects a checkpoint written by a different policy (§7: stale state
    /// from a policy switch is never silently reinterpreted).
    pub async fn load_or_new(
        policy_name: impl Into<String>,
        default_cpu_set: CpuSet,
        state_dir: impl Into<PathBuf>,
    ) -> Result<Self, ManagerError> {
        let policy_name = policy_name.into();
        let state_dir = state_dir.into();

        match Checkpoint::load(&state_dir).await? {
            None => Ok(Self::new(policy_name, default_cpu_set, state_dir)),
            Some(checkpoint) if checkpoint.policy_name != policy_name => Err(ManagerError::PolicyMismatch {
                checkpointed: checkpoint.policy_name,
                configured: policy_name,
            }),
            Some(checkpoint) => {
                let mut assignment = Assignment::new();
                for entry in checkpoint.entries {
                    let pod_uid = PodUid::from(entry.pod_uid);
                    let container_name = ContainerName::from(entry.container_name);
                    assignment
                        .entry(pod_uid)
                        .or_default()
                        .insert(container_name, entry.cpu_set);
                }
                // Container id links aren't checkpointed; the reconcile loop's
                // active-pods sweep rebuilds them once the runtime reports ids again.
                Ok(Self {
                    policy_name,
                    default_cpu_set: checkpoint.default_cpu_set,
                    assignment,
                    container_map: ContainerMap::new(),
                    state_dir,
                })
            }
        }
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn get_cpu_set(&self, pod_uid: &PodUid, container_name: &ContainerName) -> Option<CpuSet> {
        self.assignment.get(pod_uid)?.get(container_name).cloned()
    }

    pub fn get_cpu_set_or_default(&self, pod_uid: &PodUid, container_name: &ContainerName) -> CpuSet {
        self.get_cpu_set(pod_uid, container_name)
            .unwrap_or_else(|| self.default_cpu_set.clone())
    }

    pub fn set_cpu_set(&mut self, pod_uid: PodUid, container_name: ContainerName, cpu_set: CpuSet) {
        self.assignment
            .entry(pod_uid)
            .or_default()
            .insert(container_name, cpu_set);
    }

    /// Removes a container's assignment and its container-id link, if any.
    pub fn delete(&mut self, pod_uid: &PodUid, container_name: &ContainerName) {
        if let Some(containers) = self.assignment.get_mut(pod_uid) {
            containers.remove(container_name);
            if containers.is_empty() {
                self.assignment.remove(pod_uid);
            }
        }
        self.container_map.remove_by_ref(pod_uid, container_name);
    }

    pub fn get_default_cpu_set(&self) -> CpuSet {
        self.default_cpu_set.clone()
    }

    pub fn set_default_cpu_set(&mut self, cpu_set: CpuSet) {
        self.default_cpu_set = cpu_set;
    }

    /// A snapshot of every exclusive assignment currently held.
    pub fn get_cpu_assignments(&self) -> Assignment {
        self.assignment.clone()
    }

    pub fn container_map(&self) -> &ContainerMap {
        &self.container_map
    }

    pub fn container_map_mut(&mut self) -> &mut ContainerMap {
        &mut self.container_map
    }

    /// Wipes all state (used by stale-state GC when a pod UID disappears
    /// entirely). Does not flush by itself — callers batch a GC pass and
    /// flush once at the end via [`StateStore::flush`].
    pub fn clear_state(&mut self) {
        self.assignment.clear();
        self.container_map = ContainerMap::new();
    }

    pub async fn flush(&self) -> Result<(), ManagerError> {
        let mut entries = Vec::new();
        for (pod_uid, containers) in &self.assignment {
            for (container_name, cpu_set) in containers {
                entries.push(CheckpointEntry {
                    pod_uid: pod_uid.to_string(),
                    container_name: container_name.to_string(),
                    cpu_set: cpu_set.clone(),
                });
            }
        }
        entries.sort_by(|a, b| (&a.pod_uid, &a.container_name).cmp(&(&b.pod_uid, &b.container_name)));

        let checkpoint = Checkpoint::new(self.policy_name.clone(), self.default_cpu_set.clone(), entries);
        checkpoint.flush(&self.state_dir).await?;
        debug!(entries = checkpoint.entries.len(), "state store checkpointed");
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

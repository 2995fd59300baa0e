//! Bidirectional index between a runtime-assigned container id and the
//! (pod, container name) pair the Policy actually reasons about.

use std::collections::HashMap;

use super::{ContainerName, PodUid};

/// `containerID ↔ (podUID, containerName)`.
///
/// Populated when the Policy accepts a container, removed on
/// `RemoveContainer` or stale-state GC. Every key in the Assignment has at
/// most one containerID entry here.
#[derive(Debug, Default, Clone)]
pub struct ContainerMap {
    id_to_ref: HashMap<String, (PodUid, ContainerName)>,
    ref_to_id: HashMap<(PodUid, ContainerName), String>,
}

impl ContainerMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `container_id` resolves to `(pod_uid, container_name)`.
    /// Overwrites any existing mapping for either key.
    pub fn insert(&mut self, pod_uid: PodUid, container_name: ContainerName, container_id: String) {
        self.remove_by_ref(&pod_uid, &container_name);
        self.remove_by_id(&container_id);
        self.ref_to_id
            .insert((pod_uid.clone(), container_name.clone()), container_id.clone());
        self.id_to_ref.insert(container_id, (pod_uid, container_name));
    }

    pub fn get_container_ref(&self, container_id: &str) -> Option<(PodUid, ContainerName)> {
        self.id_to_ref.get(container_id).cloned()
    }

    pub fn get_container_id(&self, pod_uid: &PodUid, container_name: &ContainerName) -> Option<&String> {
        self.ref_to_id.get(&(pod_uid.clone(), container_name.clone()))
    }

    pub fn remove_by_id(&mut self, container_id: &str) -> Option<(PodUid, ContainerName)> {
        let key = self.id_to_ref.remove(container_id)?;
        self.ref_to_id.remove(&key);
        Some(key)
    }

    pub fn remove_by_ref(&mut self, pod_uid: &PodUid, container_name: &ContainerName) -> Option<String> {
        let id = self.ref_to_id.remove(&(pod_uid.clone(), container_name.clone()))?;
        self.id_to_ref.remove(&id);
        Some(id)
    }

    pub fn len(&self) -> usize {
        self.id_to_ref.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_ref.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! The outer world's view of what's running: pods, their containers, their
//! runtime container ids, and a readiness gate.
//!
//! In production these are backed by the kubelet's own pod cache and status
//! manager, both out of scope (§1). What's in scope is the surface the
//! Manager's reconcile loop consumes, so here it's three small async traits
//! plus a YAML-backed implementation for scenario-driven tests and the sim
//! crate — the same `serde_yaml` + `anyhow::Context` idiom
//! `NodeConfigManager::load_from_file` uses.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::state::{ContainerName, PodUid};

/// Pod-level Quality of Service class. Only `Guaranteed` pods may receive
/// exclusive CPUs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QosClass {
    Guaranteed,
    Burstable,
    BestEffort,
}

/// A single container's CPU resource spec, as declared in the pod.
#[derive(Debug, Clone, Deserialize)]
pub struct Container {
    pub name: ContainerName,
    pub cpu_request_millicores: i64,
    pub cpu_limit_millicores: i64,
}

impl Container {
    /// A container requests integral CPUs when request equals limit and
    /// that shared value is a whole number of CPUs.
    pub fn requests_integral_cpus(&self) -> bool {
        self.cpu_limit_millicores > 0
            && self.cpu_request_millicores == self.cpu_limit_millicores
            && self.cpu_limit_millicores % 1000 == 0
    }

    pub fn cpu_count(&self) -> usize {
        (self.cpu_limit_millicores / 1000) as usize
    }
}

/// A pod as the Manager needs to see it: identity, QoS class, its app
/// containers, and its init containers.
///
/// Init containers run to completion before any app container starts, so
/// once an app container is being added, every init container's exclusive
/// CPUs are reclaimed (§4.4 AddContainer step 1).
#[derive(Debug, Clone, Deserialize)]
pub struct Pod {
    pub uid: PodUid,
    pub qos: QosClass,
    pub containers: Vec<Container>,
    #[serde(default)]
    pub init_containers: Vec<Container>,
}

impl Pod {
    pub fn container(&self, name: &ContainerName) -> Option<&Container> {
        self.containers.iter().find(|c| &c.name == name)
    }
}

/// A container qualifies for exclusive CPUs iff its pod is `Guaranteed` and
/// it requests a whole number of CPUs with request == limit (§4.2.2).
pub fn qualifies_for_exclusive_cpus(pod: &Pod, container: &Container) -> bool {
    pod.qos == QosClass::Guaranteed && container.requests_integral_cpus()
}

/// Source of the currently active (desired) pods on this node.
#[async_trait]
pub trait ActivePodsSource: Send + Sync {
    async fn active_pods(&self) -> Vec<Pod>;
}

/// Resolves a (pod, container) pair to the runtime-assigned container id,
/// once the runtime has created it.
#[async_trait]
pub trait PodStatusProvider: Send + Sync {
    async fn container_id(&self, pod_uid: &PodUid, container_name: &ContainerName) -> Option<String>;
}

/// Signals whether the upstream config sources (pods, status) have
/// completed their initial sync. The reconcile loop's stale-state GC only
/// runs once this is true, to avoid treating a not-yet-populated pod list
/// as "nothing is running".
pub trait SourcesReadyGate: Send + Sync {
    fn sources_ready(&self) -> bool;
}

// ── YAML-backed scenario source ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ScenarioFile {
    #[serde(default)]
    pods: Vec<Pod>,
    #[serde(default)]
    container_ids: HashMap<String, HashMap<String, String>>,
}

/// Loads a fixed scenario from a YAML file: the active pods list plus the
/// container ids the runtime has already assigned them. Used by
/// integration tests and the sim crate; never mutated once loaded, so
/// `sources_ready` is always true.
#[derive(Debug, Clone)]
pub struct YamlPodsSource {
    pods: Vec<Pod>,
    container_ids: HashMap<(PodUid, ContainerName), String>,
}

impl YamlPodsSource {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot open scenario file: {}", path.display()))?;
        let file: ScenarioFile = serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse scenario YAML: {}", path.display()))?;

        let mut container_ids = HashMap::new();
        for (pod_uid, containers) in file.container_ids {
            for (container_name, container_id) in containers {
                container_ids.insert(
                    (PodUid::from(pod_uid.clone()), ContainerName::from(container_name)),
                    container_id,
                );
            }
        }

        Ok(Self {
            pods: file.pods,
            container_ids,
        })
    }

    pub fn empty() -> Self {
        Self {
            pods: Vec::new(),
            container_ids: HashMap::new(),
        }
    }

    pub fn with_pods(pods: Vec<Pod>) -> Self {
        Self {
            pods,
            container_ids: HashMap::new(),
        }
    }

    /// The scenario's container ids, keyed the way `Manager::start`'s
    /// `initial_containers` expects, for seeding the `ContainerMap` before
    /// the first reconcile tick.
    pub fn initial_containers(&self) -> HashMap<(PodUid, ContainerName), String> {
        self.container_ids.clone()
    }
}

#[async_trait]
impl ActivePodsSource for YamlPodsSource {
    async fn active_pods(&self) -> Vec<Pod> {
        self.pods.clone()
    }
}

#[async_trait]
impl PodStatusProvider for YamlPodsSource {
    async fn container_id(&self, pod_uid: &PodUid, container_name: &ContainerName) -> Option<String> {
        self.container_ids
            .get(&(pod_uid.clone(), container_name.clone()))
            .cloned()
    }
}

impl SourcesReadyGate for YamlPodsSource {
    fn sources_ready(&self) -> bool {
        true
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn guaranteed_container(name: &str, millicores: i64) -> Container {
        Container {
            name: ContainerName::from(name),
            cpu_request_millicores: millicores,
            cpu_limit_millicores: millicores,
        }
    }

    #[test]
    fn integral_guaranteed_container_qualifies() {
        let pod = Pod {
            uid: PodUid::from("p1"),
            qos: QosClass::Guaranteed,
            containers: vec![guaranteed_container("c1", 4000)],
            init_containers: vec![],
        };
        let container = pod.container(&ContainerName::from("c1")).unwrap();
        assert!(qualifies_for_exclusive_cpus(&pod, container));
        assert_eq!(container.cpu_count(), 4);
    }

    #[test]
    fn burstable_pod_never_qualifies() {
        let pod = Pod {
            uid: PodUid::from("p1"),
            qos: QosClass::Burstable,
            containers: vec![guaranteed_container("c1", 4000)],
            init_containers: vec![],
        };
        let container = pod.container(&ContainerName::from("c1")).unwrap();
        assert!(!qualifies_for_exclusive_cpus(&pod, container));
    }

    #[test]
    fn fractional_request_does_not_qualify() {
        let container = Container {
            name: ContainerName::from("c1"),
            cpu_request_millicores: 1500,
            cpu_limit_millicores: 1500,
        };
        assert!(!container.requests_integral_cpus());
    }

    #[test]
    fn request_not_equal_to_limit_does_not_qualify() {
        let container = Container {
            name: ContainerName::from("c1"),
            cpu_request_millicores: 1000,
            cpu_limit_millicores: 2000,
        };
        assert!(!container.requests_integral_cpus());
    }

    #[tokio::test]
    async fn yaml_source_parses_pods_and_container_ids() {
        let yaml = r#"
pods:
  - uid: p1
    qos: guaranteed
    containers:
      - name: c1
        cpu_request_millicores: 2000
        cpu_limit_millicores: 2000
container_ids:
  p1:
    c1: cid-123
"#;
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(yaml.as_bytes()).unwrap();

        let source = YamlPodsSource::load_from_file(f.path()).unwrap();
        let pods = source.active_pods().await;
        assert_eq!(pods.len(), 1);
        assert_eq!(
            source
                .container_id(&PodUid::from("p1"), &ContainerName::from("c1"))
                .await,
            Some("cid-123".to_string())
        );
        assert!(source.sources_ready());
    }
}

//! The `none` policy: exclusive CPU pinning is disabled. Every container
//! runs on the shared default set; no reconcile loop runs (§4.2.1).

use crate::error::ManagerError;
use crate::policy::{PolicyOps, TopologyHint};
use crate::sources::{Container, Pod};
use crate::state::{ContainerName, PodUid, StateStore};
use crate::topology::CpuTopology;

#[derive(Debug, Clone)]
pub struct NonePolicy {
    all_cpus: crate::cpuset::CpuSet,
}

impl NonePolicy {
    pub fn new(topology: &CpuTopology) -> Self {
        Self {
            all_cpus: topology.all_cpus(),
        }
    }
}

impl PolicyOps for NonePolicy {
    fn name(&self) -> &'static str {
        "none"
    }

    /// The default set is every CPU on the node; a checkpoint carrying any
    /// exclusive assignment under this policy is a startup error (§4.2.1).
    fn start(&self, state: &mut StateStore) -> Result<(), ManagerError> {
        if !state.get_cpu_assignments().is_empty() {
            return Err(ManagerError::PolicyMismatch {
                checkpointed: "static".to_string(),
                configured: "none".to_string(),
            });
        }
        state.set_default_cpu_set(self.all_cpus.clone());
        Ok(())
    }

    fn add_container(&self, _state: &mut StateStore, _pod: &Pod, _container: &Container) -> Result<(), ManagerError> {
        Ok(())
    }

    fn remove_container(
        &self,
        _state: &mut StateStore,
        _pod_uid: &PodUid,
        _container_name: &ContainerName,
    ) -> Result<(), ManagerError> {
        Ok(())
    }

    fn topology_hints(&self, _state: &StateStore, _pod: &Pod, _container: &Container) -> Vec<TopologyHint> {
        Vec::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateStore;
    use crate::topology::two_socket_smt_topology;
    use tempfile::TempDir;

    fn store() -> (TempDir, StateStore) {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new("none", crate::cpuset::CpuSet::empty(), dir.path());
        (dir, store)
    }

    #[test]
    fn start_sets_default_to_all_cpus() {
        let topo = two_socket_smt_topology();
        let policy = NonePolicy::new(&topo);
        let (_dir, mut state) = store();

        policy.start(&mut state).unwrap();
        assert_eq!(state.get_default_cpu_set(), topo.all_cpus());
    }

    #[test]
    fn start_rejects_nonempty_checkpointed_assignment() {
        let topo = two_socket_smt_topology();
        let policy = NonePolicy::new(&topo);
        let (_dir, mut state) = store();
        state.set_cpu_set(PodUid::from("p1"), ContainerName::from("c1"), "0-1".parse().unwrap());

        let err = policy.start(&mut state).unwrap_err();
        assert!(matches!(err, ManagerError::PolicyMismatch { .. }));
    }

    #[test]
    fn add_and_remove_container_are_no_ops() {
        let topo = two_socket_smt_topology();
        let policy = NonePolicy::new(&topo);
        let (_dir, mut state) = store();
        let pod = crate::sources::Pod {
            uid: PodUid::from("p1"),
            qos: crate::sources::QosClass::Guaranteed,
            containers: vec![],
            init_containers: vec![],
        };
        let container = crate::sources::Container {
            name: ContainerName::from("c1"),
            cpu_request_millicores: 2000,
            cpu_limit_millicores: 2000,
        };

        policy.add_container(&mut state, &pod, &container).unwrap();
        assert!(state.get_cpu_assignments().is_empty());
        policy
            .remove_container(&mut state, &PodUid::from("p1"), &ContainerName::from("c1"))
            .unwrap();
    }

    #[test]
    fn topology_hints_are_always_empty() {
        let topo = two_socket_smt_topology();
        let policy = NonePolicy::new(&topo);
        let (_dir, state) = store();
        let pod = crate::sources::Pod {
            uid: PodUid::from("p1"),
            qos: crate::sources::QosClass::Guaranteed,
            containers: vec![],
            init_containers: vec![],
        };
        let container = crate::sources::Container {
            name: ContainerName::from("c1"),
            cpu_request_millicores: 2000,
            cpu_limit_millicores: 2000,
        };
        assert!(policy.topology_hints(&state, &pod, &container).is_empty());
    }
}

//! The `static` policy: pins whole-CPU `Guaranteed` containers to
//! exclusive, topology-aware CPU sets and leaves everything else on the
//! shared default set (§4.2.2–§4.2.4).

use crate::cpuset::CpuSet;
use crate::error::ManagerError;
use crate::policy::allocate::take_by_topology;
use crate::policy::{PolicyOps, TopologyHint};
use crate::sources::{qualifies_for_exclusive_cpus, Container, Pod};
use crate::state::{ContainerName, PodUid, StateStore};
use crate::topology::CpuTopology;

#[derive(Debug, Clone)]
pub struct StaticPolicy {
    reserved: CpuSet,
    topology: CpuTopology,
}

impl StaticPolicy {
    /// Builds the policy, computing the reserved set from `num_reserved_cpus`
    /// via the topology-aware algorithm unless `explicit_reserved` overrides
    /// it (§4.2.2, and Open Question 1: the reserved set is fixed here, once,
    /// before any checkpoint is consulted).
    pub fn new(
        topology: &CpuTopology,
        num_reserved_cpus: usize,
        explicit_reserved: Option<CpuSet>,
    ) -> Result<Self, ManagerError> {
        let all_cpus = topology.all_cpus();
        let reserved = match explicit_reserved {
            Some(set) => set,
            None => take_by_topology(topology, &all_cpus, num_reserved_cpus)?,
        };

        if !reserved.is_subset(&all_cpus) {
            return Err(ManagerError::InvalidReservedCpuSet {
                reason: "reserved CPU set is not a subset of the node's CPUs".to_string(),
            });
        }

        Ok(Self {
            reserved,
            topology: topology.clone(),
        })
    }

    pub fn reserved(&self) -> &CpuSet {
        &self.reserved
    }

    /// Hints for a container that does not yet hold an exclusive assignment:
    /// every non-empty NUMA-node subset whose combined free CPUs — reserved
    /// CPUs excluded, since those are never handed out exclusively — in the
    /// default set satisfies the request, with the minimum-popcount subsets
    /// marked preferred (§4.2.4).
    fn candidate_hints(&self, state: &StateStore, num_cpus: usize) -> Vec<TopologyHint> {
        let available = state.get_default_cpu_set().difference(&self.reserved);
        let nodes = self.topology.numa_nodes();
        if nodes.is_empty() || num_cpus == 0 {
            return Vec::new();
        }

        let mut satisfying: Vec<(Vec<u32>, usize)> = Vec::new();
        for mask in 1u32..(1u32 << nodes.len()) {
            let subset: Vec<u32> = nodes
                .iter()
                .enumerate()
                .filter(|(bit, _)| mask & (1 << bit) != 0)
                .map(|(_, node)| *node)
                .collect();
            let cpus = self.topology.details.cpus_in_numa_nodes(&subset);
            let free = available.intersection(&cpus).len();
            if free >= num_cpus {
                satisfying.push((subset, mask.count_ones() as usize));
            }
        }

        let min_popcount = satisfying.iter().map(|(_, popcount)| *popcount).min();
        satisfying
            .into_iter()
            .map(|(subset, popcount)| TopologyHint {
                numa_affinity: subset,
                preferred: Some(popcount) == min_popcount,
            })
            .collect()
    }
}

impl PolicyOps for StaticPolicy {
    fn name(&self) -> &'static str {
        "static"
    }

    /// Fresh state: `DefaultCPUSet = AllCPUs`, `Assignment` empty — reserved
    /// CPUs stay in the shared pool, they are only kept out of it transiently
    /// while `AddContainer` is choosing cpus for a qualifying container
    /// (§4.2.2 Start). Checkpointed state: validated against the three
    /// invariants of §4.2.2 — (i) `DefaultCPUSet ∪ ⋃Assignment = AllCPUs`,
    /// (ii) `reserved ⊆ DefaultCPUSet`, (iii) every exclusive set is disjoint
    /// from the default set and from every other exclusive set. Any
    /// violation is a fatal mismatch the operator must resolve by draining
    /// (§9 Open Question 1).
    fn start(&self, state: &mut StateStore) -> Result<(), ManagerError> {
        let assignment = state.get_cpu_assignments();
        let all_cpus = self.topology.all_cpus();

        if assignment.is_empty() && state.get_default_cpu_set().is_empty() {
            state.set_default_cpu_set(all_cpus);
            return Ok(());
        }

        let default_set = state.get_default_cpu_set();
        let assigned_sets: Vec<CpuSet> = assignment
            .values()
            .flat_map(|containers| containers.values().cloned())
            .collect();

        let assigned = assigned_sets
            .iter()
            .fold(CpuSet::empty(), |acc, set| acc.union(set));
        let reconstructed = default_set.union(&assigned);
        if reconstructed != all_cpus {
            return Err(ManagerError::PolicyMismatch {
                checkpointed: format!("default ∪ assigned = {reconstructed}"),
                configured: format!("all CPUs = {all_cpus}"),
            });
        }

        if !self.reserved.is_subset(&default_set) {
            return Err(ManagerError::PolicyMismatch {
                checkpointed: format!("default set = {default_set}"),
                configured: format!("reserved = {}", self.reserved),
            });
        }

        for (i, set) in assigned_sets.iter().enumerate() {
            if !set.is_disjoint(&default_set) {
                return Err(ManagerError::PolicyMismatch {
                    checkpointed: format!("exclusive set {set} overlaps the default set"),
                    configured: format!("default set = {default_set}"),
                });
            }
            for other in &assigned_sets[i + 1..] {
                if !set.is_disjoint(other) {
                    return Err(ManagerError::PolicyMismatch {
                        checkpointed: format!("exclusive set {set} overlaps {other}"),
                        configured: "exclusive assignments must be pairwise disjoint".to_string(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Reserves `N` CPUs for a qualifying container out of the default set
    /// minus the reserved set — reserved CPUs are members of the shared pool
    /// but are never handed out exclusively (§4.2.2 AddContainer step 2).
    /// Non-qualifying containers and idempotent re-adds are no-ops.
    fn add_container(&self, state: &mut StateStore, pod: &Pod, container: &Container) -> Result<(), ManagerError> {
        if !qualifies_for_exclusive_cpus(pod, container) {
            return Ok(());
        }
        if state.get_cpu_set(&pod.uid, &container.name).is_some() {
            return Ok(());
        }

        let default_set = state.get_default_cpu_set();
        let available = default_set.difference(&self.reserved);
        let taken = take_by_topology(&self.topology, &available, container.cpu_count())?;

        state.set_default_cpu_set(default_set.difference(&taken));
        state.set_cpu_set(pod.uid.clone(), container.name.clone(), taken);
        Ok(())
    }

    /// Idempotent: releasing an unknown container is success, matching the
    /// spec's requirement that `RemoveContainer` tolerate GC racing a
    /// container that was never assigned (§4.2, §7).
    fn remove_container(
        &self,
        state: &mut StateStore,
        pod_uid: &PodUid,
        container_name: &ContainerName,
    ) -> Result<(), ManagerError> {
        if let Some(freed) = state.get_cpu_set(pod_uid, container_name) {
            state.delete(pod_uid, container_name);
            let reclaimed = state.get_default_cpu_set().union(&freed);
            state.set_default_cpu_set(reclaimed);
        }
        Ok(())
    }

    fn topology_hints(&self, state: &StateStore, pod: &Pod, container: &Container) -> Vec<TopologyHint> {
        if let Some(cpu_set) = state.get_cpu_set(&pod.uid, &container.name) {
            let mut nodes: Vec<u32> = cpu_set
                .iter()
                .filter_map(|cpu| self.topology.details.info(cpu))
                .map(|info| info.numa_node_id)
                .collect();
            nodes.sort_unstable();
            nodes.dedup();
            return vec![TopologyHint {
                numa_affinity: nodes,
                preferred: true,
            }];
        }

        if !qualifies_for_exclusive_cpus(pod, container) {
            return Vec::new();
        }

        self.candidate_hints(state, container.cpu_count())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::QosClass;
    use crate::topology::two_socket_smt_topology;
    use tempfile::TempDir;

    fn store() -> (TempDir, StateStore) {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new("static", CpuSet::empty(), dir.path());
        (dir, store)
    }

    fn guaranteed_pod(pod_uid: &str, container_name: &str, num_cpus: i64) -> (Pod, Container) {
        let container = Container {
            name: ContainerName::from(container_name),
            cpu_request_millicores: num_cpus * 1000,
            cpu_limit_millicores: num_cpus * 1000,
        };
        let pod = Pod {
            uid: PodUid::from(pod_uid),
            qos: QosClass::Guaranteed,
            containers: vec![container.clone()],
            init_containers: vec![],
        };
        (pod, container)
    }

    #[test]
    fn start_reserves_cpus_out_of_default_set_on_fresh_state() {
        let topo = two_socket_smt_topology();
        let policy = StaticPolicy::new(&topo, 1, None).unwrap();
        let (_dir, mut state) = store();

        policy.start(&mut state).unwrap();
        assert_eq!(policy.reserved(), &CpuSet::from_iter([0]));
        // Reserved CPUs are members of the shared pool, not removed from it.
        assert_eq!(state.get_default_cpu_set(), topo.all_cpus());
    }

    #[test]
    fn explicit_reserved_set_overrides_computed_one() {
        let topo = two_socket_smt_topology();
        let explicit: CpuSet = "4".parse().unwrap();
        let policy = StaticPolicy::new(&topo, 1, Some(explicit.clone())).unwrap();
        assert_eq!(policy.reserved(), &explicit);
    }

    #[test]
    fn scenario_one_full_socket_goes_to_four_cpu_pod() {
        let topo = two_socket_smt_topology();
        let policy = StaticPolicy::new(&topo, 1, None).unwrap();
        let (_dir, mut state) = store();
        policy.start(&mut state).unwrap();

        let (pod, container) = guaranteed_pod("p1", "c1", 4);
        policy.add_container(&mut state, &pod, &container).unwrap();

        let assigned = state.get_cpu_set(&pod.uid, &container.name).unwrap();
        assert_eq!(assigned, [4, 5, 6, 7].into_iter().collect());
        // AllCPUs(8) - assigned(4); the reserved CPU (0) stays in the default set.
        assert_eq!(state.get_default_cpu_set(), [0, 1, 2, 3].into_iter().collect());
    }

    #[test]
    fn scenario_two_full_core_goes_to_two_cpu_pod_after_scenario_one() {
        let topo = two_socket_smt_topology();
        let policy = StaticPolicy::new(&topo, 1, None).unwrap();
        let (_dir, mut state) = store();
        policy.start(&mut state).unwrap();

        let (p1, c1) = guaranteed_pod("p1", "c1", 4);
        policy.add_container(&mut state, &p1, &c1).unwrap();

        let (p2, c2) = guaranteed_pod("p2", "c2", 2);
        policy.add_container(&mut state, &p2, &c2).unwrap();

        let assigned = state.get_cpu_set(&p2.uid, &c2.name).unwrap();
        assert_eq!(assigned, [2, 3].into_iter().collect());
        assert_eq!(state.get_default_cpu_set(), [0, 1].into_iter().collect());
    }

    #[test]
    fn burstable_pod_is_not_assigned_exclusive_cpus() {
        let topo = two_socket_smt_topology();
        let policy = StaticPolicy::new(&topo, 1, None).unwrap();
        let (_dir, mut state) = store();
        policy.start(&mut state).unwrap();

        let container = Container {
            name: ContainerName::from("c1"),
            cpu_request_millicores: 2000,
            cpu_limit_millicores: 2000,
        };
        let pod = Pod {
            uid: PodUid::from("p1"),
            qos: QosClass::Burstable,
            containers: vec![container.clone()],
            init_containers: vec![],
        };

        policy.add_container(&mut state, &pod, &container).unwrap();
        assert!(state.get_cpu_set(&pod.uid, &container.name).is_none());
        assert_eq!(state.get_default_cpu_set(), topo.all_cpus());
    }

    #[test]
    fn remove_container_reclaims_cpus_into_default_set() {
        let topo = two_socket_smt_topology();
        let policy = StaticPolicy::new(&topo, 1, None).unwrap();
        let (_dir, mut state) = store();
        policy.start(&mut state).unwrap();

        let (pod, container) = guaranteed_pod("p1", "c1", 4);
        policy.add_container(&mut state, &pod, &container).unwrap();
        policy.remove_container(&mut state, &pod.uid, &container.name).unwrap();

        assert!(state.get_cpu_set(&pod.uid, &container.name).is_none());
        assert_eq!(state.get_default_cpu_set(), topo.all_cpus());
    }

    #[test]
    fn remove_container_on_unknown_container_is_a_no_op_success() {
        let topo = two_socket_smt_topology();
        let policy = StaticPolicy::new(&topo, 1, None).unwrap();
        let (_dir, mut state) = store();
        policy.start(&mut state).unwrap();

        policy
            .remove_container(&mut state, &PodUid::from("ghost"), &ContainerName::from("c"))
            .unwrap();
    }

    #[test]
    fn not_enough_cpus_surfaces_as_error() {
        let topo = two_socket_smt_topology();
        let policy = StaticPolicy::new(&topo, 1, None).unwrap();
        let (_dir, mut state) = store();
        policy.start(&mut state).unwrap();

        let (pod, container) = guaranteed_pod("p1", "c1", 100);
        let err = policy.add_container(&mut state, &pod, &container).unwrap_err();
        assert!(matches!(err, ManagerError::NotEnoughCpus { .. }));
    }

    #[test]
    fn start_rejects_checkpoint_whose_reserved_set_changed() {
        let topo = two_socket_smt_topology();
        let policy = StaticPolicy::new(&topo, 1, None).unwrap();
        let (_dir, mut state) = store();
        // Simulate a checkpoint from a prior run that reserved CPU 4 instead
        // of 0: default set already set, no exclusive assignments yet.
        state.set_default_cpu_set(topo.all_cpus().difference(&CpuSet::from_iter([4])));
        let err = policy.start(&mut state).unwrap_err();
        assert!(matches!(err, ManagerError::PolicyMismatch { .. }));
    }

    #[test]
    fn start_rejects_checkpoint_where_reserved_cpu_is_exclusively_assigned() {
        let topo = two_socket_smt_topology();
        let policy = StaticPolicy::new(&topo, 1, None).unwrap();
        let (_dir, mut state) = store();
        // default ∪ assigned = AllCPUs holds, but the reserved CPU (0) ended
        // up inside the exclusive assignment instead of the default set.
        state.set_default_cpu_set(topo.all_cpus().difference(&CpuSet::from_iter([0])));
        state.set_cpu_set(PodUid::from("p1"), ContainerName::from("c1"), CpuSet::from_iter([0]));

        let err = policy.start(&mut state).unwrap_err();
        assert!(matches!(err, ManagerError::PolicyMismatch { .. }));
    }

    #[test]
    fn start_rejects_checkpoint_with_overlapping_exclusive_assignments() {
        let topo = two_socket_smt_topology();
        let policy = StaticPolicy::new(&topo, 1, None).unwrap();
        let (_dir, mut state) = store();
        // default ∪ assigned = AllCPUs and reserved ⊆ default both hold, but
        // the two exclusive sets overlap at CPUs 3 and 4.
        state.set_default_cpu_set(CpuSet::from_iter([0]));
        state.set_cpu_set(PodUid::from("p1"), ContainerName::from("c1"), CpuSet::from_iter([1, 2, 3, 4]));
        state.set_cpu_set(PodUid::from("p2"), ContainerName::from("c2"), CpuSet::from_iter([3, 4, 5, 6, 7]));

        let err = policy.start(&mut state).unwrap_err();
        assert!(matches!(err, ManagerError::PolicyMismatch { .. }));
    }

    #[test]
    fn assigned_container_gets_a_single_preferred_hint_for_its_current_cpus() {
        let topo = two_socket_smt_topology();
        let policy = StaticPolicy::new(&topo, 1, None).unwrap();
        let (_dir, mut state) = store();
        policy.start(&mut state).unwrap();

        let (pod, container) = guaranteed_pod("p1", "c1", 4);
        policy.add_container(&mut state, &pod, &container).unwrap();

        let hints = policy.topology_hints(&state, &pod, &container);
        assert_eq!(hints.len(), 1);
        assert!(hints[0].preferred);
        assert_eq!(hints[0].numa_affinity, vec![1]);
    }

    #[test]
    fn pending_container_gets_hints_for_satisfying_numa_subsets() {
        let topo = two_socket_smt_topology();
        let policy = StaticPolicy::new(&topo, 1, None).unwrap();
        let (_dir, mut state) = store();
        policy.start(&mut state).unwrap();

        let (pod, container) = guaranteed_pod("p1", "c1", 4);
        let hints = policy.topology_hints(&state, &pod, &container);

        // Only the cross-socket union has 4+ free CPUs pre-allocation minus
        // the single reserved CPU on socket 0 (free: socket0=3, socket1=4).
        assert!(hints.iter().any(|h| h.numa_affinity == vec![0, 1]));
        let single_node_hint = hints.iter().find(|h| h.numa_affinity == vec![1]);
        assert!(single_node_hint.is_some());
        assert!(single_node_hint.unwrap().preferred);
    }

    #[test]
    fn non_qualifying_pending_container_gets_no_hints() {
        let topo = two_socket_smt_topology();
        let policy = StaticPolicy::new(&topo, 1, None).unwrap();
        let (_dir, mut state) = store();
        policy.start(&mut state).unwrap();

        let container = Container {
            name: ContainerName::from("c1"),
            cpu_request_millicores: 500,
            cpu_limit_millicores: 500,
        };
        let pod = Pod {
            uid: PodUid::from("p1"),
            qos: QosClass::Guaranteed,
            containers: vec![container.clone()],
            init_containers: vec![],
        };
        assert!(policy.topology_hints(&state, &pod, &container).is_empty());
    }
}

//! CPU topology: an immutable description of sockets, cores, logical CPUs,
//! and NUMA nodes, discovered once at manager startup.
//!
//! Real discovery means reading `/sys/devices/system/cpu` or parsing
//! cAdvisor's `MachineInfo` — that collaborator is out of scope (§1). What
//! *is* in scope is the pure function that turns a machine description into
//! a [`CpuTopology`], so here that description is a small YAML file (the
//! same `serde_yaml` + `anyhow::Context` idiom the teacher uses for node
//! configuration in `NodeConfigManager::load_from_file`), and discovery is
//! just parsing it.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

use crate::cpuset::CpuSet;

/// One logical CPU's placement in the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct CpuInfo {
    pub socket_id: u32,
    pub core_id: u32,
    pub numa_node_id: u32,
}

/// YAML wrapper matching the on-disk topology description.
///
/// ```yaml
/// cpus:
///   0: { socket_id: 0, core_id: 0, numa_node_id: 0 }
///   1: { socket_id: 0, core_id: 1, numa_node_id: 0 }
/// ```
#[derive(Debug, Deserialize)]
struct TopologyFile {
    cpus: BTreeMap<u32, CpuInfo>,
}

/// Per-CPU placement details plus the derived views the static policy and
/// the hint provider both need.
#[derive(Debug, Clone, Default)]
pub struct CpuDetails {
    by_cpu: BTreeMap<u32, CpuInfo>,
}

impl CpuDetails {
    pub fn all_cpus(&self) -> CpuSet {
        self.by_cpu.keys().copied().collect()
    }

    pub fn sockets(&self) -> Vec<u32> {
        let mut sockets: Vec<u32> = self.by_cpu.values().map(|c| c.socket_id).collect();
        sockets.sort_unstable();
        sockets.dedup();
        sockets
    }

    pub fn numa_nodes(&self) -> Vec<u32> {
        let mut nodes: Vec<u32> = self.by_cpu.values().map(|c| c.numa_node_id).collect();
        nodes.sort_unstable();
        nodes.dedup();
        nodes
    }

    /// All CPUs on the given socket.
    pub fn cpus_in_socket(&self, socket_id: u32) -> CpuSet {
        self.by_cpu
            .iter()
            .filter(|(_, info)| info.socket_id == socket_id)
            .map(|(cpu, _)| *cpu)
            .collect()
    }

    /// All CPUs sharing a (socket, core) pair — SMT siblings.
    pub fn cpus_in_core(&self, socket_id: u32, core_id: u32) -> CpuSet {
        self.by_cpu
            .iter()
            .filter(|(_, info)| info.socket_id == socket_id && info.core_id == core_id)
            .map(|(cpu, _)| *cpu)
            .collect()
    }

    pub fn cpus_in_numa_node(&self, numa_node_id: u32) -> CpuSet {
        self.by_cpu
            .iter()
            .filter(|(_, info)| info.numa_node_id == numa_node_id)
            .map(|(cpu, _)| *cpu)
            .collect()
    }

    pub fn cpus_in_numa_nodes<'a, I: IntoIterator<Item = &'a u32>>(&self, ids: I) -> CpuSet {
        ids.into_iter()
            .fold(CpuSet::empty(), |acc, id| acc.union(&self.cpus_in_numa_node(*id)))
    }

    pub fn cpus_in_sockets<'a, I: IntoIterator<Item = &'a u32>>(&self, ids: I) -> CpuSet {
        ids.into_iter()
            .fold(CpuSet::empty(), |acc, id| acc.union(&self.cpus_in_socket(*id)))
    }

    /// `(socket_id, core_id)` pairs present in the set, each paired with its
    /// full CPU membership. Sorted for deterministic iteration.
    pub fn cores(&self) -> Vec<((u32, u32), CpuSet)> {
        let mut seen: Vec<(u32, u32)> = self
            .by_cpu
            .values()
            .map(|info| (info.socket_id, info.core_id))
            .collect();
        seen.sort_unstable();
        seen.dedup();
        seen.into_iter()
            .map(|(socket, core)| ((socket, core), self.cpus_in_core(socket, core)))
            .collect()
    }

    pub fn info(&self, cpu: u32) -> Option<CpuInfo> {
        self.by_cpu.get(&cpu).copied()
    }
}

/// Immutable description of the node's CPU topology, discovered once at
/// startup and never mutated afterward.
#[derive(Debug, Clone)]
pub struct CpuTopology {
    pub num_cpus: usize,
    pub details: CpuDetails,
}

impl CpuTopology {
    /// CPUs per core, assuming a uniform SMT width across the machine.
    /// Returns `1` if the topology is empty or has no cores (defensive;
    /// callers should not construct a topology with zero CPUs).
    pub fn cpus_per_core(&self) -> usize {
        self.details
            .cores()
            .first()
            .map(|(_, cpus)| cpus.len().max(1))
            .unwrap_or(1)
    }

    /// CPUs per socket, assuming uniform socket sizing.
    pub fn cpus_per_socket(&self) -> usize {
        self.details
            .sockets()
            .first()
            .map(|&socket| self.details.cpus_in_socket(socket).len().max(1))
            .unwrap_or(1)
    }

    pub fn numa_nodes(&self) -> Vec<u32> {
        self.details.numa_nodes()
    }

    pub fn all_cpus(&self) -> CpuSet {
        self.details.all_cpus()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TopologyError {
    #[error("failed to read topology file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse topology file: {0}")]
    Parse(String),
    #[error("topology file describes zero CPUs")]
    Empty,
}

/// Discover the node's CPU topology from a YAML description.
///
/// This stands in for the real source's `cadvisor`-backed machine info
/// parser: that is out of scope (§1), this function's contract (a pure
/// transform from a machine description to a [`CpuTopology`]) is not.
pub fn discover_from_file(path: &Path) -> Result<CpuTopology, TopologyError> {
    info!(path = %path.display(), "discovering CPU topology");
    let content = std::fs::read_to_string(path)?;
    let file: TopologyFile =
        serde_yaml::from_str(&content).map_err(|e| TopologyError::Parse(e.to_string()))?;

    if file.cpus.is_empty() {
        return Err(TopologyError::Empty);
    }

    let num_cpus = file.cpus.len();
    let details = CpuDetails { by_cpu: file.cpus };

    info!(
        num_cpus,
        num_sockets = details.sockets().len(),
        num_numa_nodes = details.numa_nodes().len(),
        "CPU topology discovered"
    );

    Ok(CpuTopology { num_cpus, details })
}

/// Build a [`CpuTopology`] programmatically (used by tests and the sim
/// crate). `layout` is `(socket_id, core_id, numa_node_id)` per CPU id,
/// indexed by position.
pub fn from_layout(layout: &[(u32, u32, u32)]) -> CpuTopology {
    let mut by_cpu = BTreeMap::new();
    for (cpu, &(socket_id, core_id, numa_node_id)) in layout.iter().enumerate() {
        by_cpu.insert(
            cpu as u32,
            CpuInfo {
                socket_id,
                core_id,
                numa_node_id,
            },
        );
    }
    CpuTopology {
        num_cpus: layout.len(),
        details: CpuDetails { by_cpu },
    }
}

/// Helper matching scenario 1 of §8: 2 sockets × 2 cores × 2 threads = 8
/// CPUs, one NUMA node per socket.
#[cfg(any(test, feature = "test-fixtures"))]
pub fn two_socket_smt_topology() -> CpuTopology {
    // cpu: (socket, core, numa)
    from_layout(&[
        (0, 0, 0),
        (0, 0, 0),
        (0, 1, 0),
        (0, 1, 0),
        (1, 0, 1),
        (1, 0, 1),
        (1, 1, 1),
        (1, 1, 1),
    ])
}

// ── Tests ─────────────────────────────────────────────────────────────────────

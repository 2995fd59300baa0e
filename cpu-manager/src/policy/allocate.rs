//! The topology-aware allocation algorithm shared by reserved-set selection
//! (at `StaticPolicy` construction) and exclusive `AddContainer` assignment.
//!
//! Three phases, in order, each preferring the coarsest unit that still fits
//! the remaining request:
//!
//! 1. **Full sockets** — while the remaining count is at least a socket's
//!    width and some socket is wholly free, take it. Ties: lowest socket id.
//! 2. **Full cores** — while the remaining count is at least a core's width
//!    and some core is wholly free, take the one on the socket with the
//!    most free CPUs. Ties: lowest socket id, then lowest core id.
//! 3. **Individual CPUs** — take one CPU at a time from the socket with the
//!    most free CPUs, then the core within it with the most free CPUs.
//!    Ties: lowest socket id, lowest core id, lowest CPU id.
//!
//! This ordering is inferred behavior (open question in the design), fixed
//! here and covered by [`tests::allocation_is_deterministic_across_repeated_calls`].

use std::cmp::Reverse;

use crate::cpuset::CpuSet;
use crate::error::ManagerError;
use crate::topology::CpuTopology;

/// Selects `n` CPUs out of `from` using the topology-aware algorithm.
///
/// `from` need not be the full machine topology — it is whatever pool the
/// caller is drawing from (the full CPU set for reserved-set selection, the
/// current `DefaultCPUSet` for `AddContainer`).
pub fn take_by_topology(topology: &CpuTopology, from: &CpuSet, n: usize) -> Result<CpuSet, ManagerError> {
    if n > from.len() {
        return Err(ManagerError::NotEnoughCpus {
            requested: n,
            available: from.len(),
        });
    }

    let mut pool = from.clone();
    let mut taken = CpuSet::empty();
    let mut remaining = n;

    let cpus_per_socket = topology.cpus_per_socket();
    while cpus_per_socket > 0 && remaining >= cpus_per_socket {
        match pick_full_socket(topology, &pool) {
            Some(socket) => {
                let cpus = topology.details.cpus_in_socket(socket);
                pool = pool.difference(&cpus);
                taken = taken.union(&cpus);
                remaining -= cpus_per_socket;
            }
            None => break,
        }
    }

    let cpus_per_core = topology.cpus_per_core();
    while cpus_per_core > 0 && remaining >= cpus_per_core {
        match pick_full_core(topology, &pool) {
            Some((socket, core)) => {
                let cpus = topology.details.cpus_in_core(socket, core);
                pool = pool.difference(&cpus);
                taken = taken.union(&cpus);
                remaining -= cpus_per_core;
            }
            None => break,
        }
    }

    while remaining > 0 {
        let cpu = pick_individual_cpu(topology, &pool).ok_or(ManagerError::NotEnoughCpus {
            requested: n,
            available: from.len(),
        })?;
        pool = pool.difference(&CpuSet::from_iter([cpu]));
        taken = taken.with_inserted(cpu);
        remaining -= 1;
    }

    Ok(taken)
}

fn pick_full_socket(topology: &CpuTopology, pool: &CpuSet) -> Option<u32> {
    topology
        .details
        .sockets()
        .into_iter()
        .filter(|&socket| topology.details.cpus_in_socket(socket).is_subset(pool))
        .min()
}

fn pick_full_core(topology: &CpuTopology, pool: &CpuSet) -> Option<(u32, u32)> {
    topology
        .details
        .cores()
        .into_iter()
        .filter(|(_, cpus)| cpus.is_subset(pool))
        .map(|((socket, core), _)| {
            let socket_free = pool.intersection(&topology.details.cpus_in_socket(socket)).len();
            ((socket, core), socket_free)
        })
        .min_by_key(|&((socket, core), free)| (Reverse(free), socket, core))
        .map(|(key, _)| key)
}

fn pick_individual_cpu(topology: &CpuTopology, pool: &CpuSet) -> Option<u32> {
    let best_socket = topology
        .details
        .sockets()
        .into_iter()
        .filter_map(|socket| {
            let free = pool.intersection(&topology.details.cpus_in_socket(socket)).len();
            (free > 0).then_some((socket, free))
        })
        .min_by_key(|&(socket, free)| (Reverse(free), socket))
        .map(|(socket, _)| socket)?;

    let best_core = topology
        .details
        .cores()
        .into_iter()
        .map(|(key, _)| key)
        .filter(|&(socket, _)| socket == best_socket)
        .filter_map(|(socket, core)| {
            let free = pool.intersection(&topology.details.cpus_in_core(socket, core)).len();
            (free > 0).then_some(((socket, core), free))
        })
        .min_by_key(|&((socket, core), free)| (Reverse(free), socket, core))
        .map(|(key, _)| key)?;

    let (socket, core) = best_core;
    topology.details.cpus_in_core(socket, core).iter().filter(|cpu| pool.contains(*cpu)).min()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! The Manager: owns the mutex serializing every state mutation, wires the
//! Policy to the runtime client, and drives the reconciliation loop (§5, §6).
//!
//! One invariant threads through every method here: the mutex is held only
//! across in-memory mutation and the checkpoint flush, never across a
//! runtime RPC. `AddContainer` is the clearest example — mutate under lock,
//! release, call the runtime, and only re-acquire the lock to roll back if
//! that call fails.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

use crate::config::{ManagerConfig, PolicyKind};
use crate::cpuset::CpuSet;
use crate::error::ManagerError;
use crate::policy::{NonePolicy, Policy, PolicyOps, StaticPolicy, TopologyHint};
use crate::runtime::ContainerRuntime;
use crate::sources::{ActivePodsSource, Container, Pod, PodStatusProvider, SourcesReadyGate};
use crate::state::{Assignment, ContainerName, PodUid, StateStore};
use crate::topology::CpuTopology;

pub struct Manager {
    state: Mutex<StateStore>,
    policy: Policy,
    runtime: Arc<dyn ContainerRuntime>,
    pods_source: Arc<dyn ActivePodsSource>,
    status: Arc<dyn PodStatusProvider>,
    ready_gate: Arc<dyn SourcesReadyGate>,
    reconcile_period: std::time::Duration,
    shutdown_tx: watch::Sender<bool>,
}

impl Manager {
    /// Builds the policy from configuration, loads (or initializes) state,
    /// and — for policies that need one (§4.2.1) — spawns the reconcile
    /// loop. Returns an `Arc` because the loop holds its own clone.
    ///
    /// `initial_containers` seeds the `ContainerMap` with whatever
    /// (pod, container) → containerID bindings the caller already knows
    /// about (typically from the runtime's own listing) before the first
    /// reconcile tick runs, so a `RemoveContainer` landing in that window
    /// resolves instead of silently no-opping (§4.3).
    pub async fn start(
        config: &ManagerConfig,
        topology: CpuTopology,
        runtime: Arc<dyn ContainerRuntime>,
        pods_source: Arc<dyn ActivePodsSource>,
        status: Arc<dyn PodStatusProvider>,
        ready_gate: Arc<dyn SourcesReadyGate>,
        initial_containers: HashMap<(PodUid, ContainerName), String>,
    ) -> Result<Arc<Self>, ManagerError> {
        let policy = match config.policy {
            PolicyKind::None => Policy::None(NonePolicy::new(&topology)),
            PolicyKind::Static => Policy::Static(StaticPolicy::new(
                &topology,
                config.reserved_cpus,
                config.explicit_reserved_cpu_set.clone(),
            )?),
        };

        let mut state = StateStore::load_or_new(policy.name(), CpuSet::empty(), config.state_dir.clone()).await?;
        policy.start(&mut state)?;
        for ((pod_uid, container_name), container_id) in initial_containers {
            state.container_map_mut().insert(pod_uid, container_name, container_id);
        }
        state.flush().await?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let manager = Arc::new(Self {
            state: Mutex::new(state),
            policy,
            runtime,
            pods_source,
            status,
            ready_gate,
            reconcile_period: config.reconcile_period,
            shutdown_tx,
        });

        if manager.policy.runs_reconcile_loop() {
            let loop_handle = manager.clone();
            tokio::spawn(async move { loop_handle.run_reconcile_loop(shutdown_rx).await });
        }

        info!(policy = manager.policy.name(), "CPU manager started");
        Ok(manager)
    }

    /// Signals the reconcile loop (if any) to stop after its current tick.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// §5: mutate under lock, release, call the runtime, re-acquire only to
    /// roll back on failure.
    pub async fn add_container(&self, pod: &Pod, container: &Container, container_id: &str) -> Result<(), ManagerError> {
        let cpu_set = {
            let mut state = self.state.lock().await;

            // Init containers run to completion before any app container
            // starts, so the one being added reclaims every sibling init
            // container's exclusive CPUs (§4.4 AddContainer step 1).
            for init_container in &pod.init_containers {
                if init_container.name == container.name {
                    continue;
                }
                if let Err(err) = self.policy.remove_container(&mut state, &pod.uid, &init_container.name) {
                    warn!(pod_uid = %pod.uid, container = %init_container.name, %err, "failed to reclaim init container cpus");
                }
                state.container_map_mut().remove_by_ref(&pod.uid, &init_container.name);
            }

            self.policy.add_container(&mut state, pod, container)?;
            state
                .container_map_mut()
                .insert(pod.uid.clone(), container.name.clone(), container_id.to_string());
            state.flush().await?;
            state.get_cpu_set_or_default(&pod.uid, &container.name)
        };

        if cpu_set.is_empty() {
            // Burstable/BestEffort and non-qualifying Guaranteed containers
            // stay on the shared pool; the runtime was never told to pin
            // them, so there's nothing to push (§4.4 step 4).
            return Ok(());
        }

        if let Err(err) = self
            .runtime
            .update_container_resources(container_id, &cpu_set.to_string())
            .await
        {
            warn!(container_id, %err, "runtime update failed, rolling back assignment");
            let mut state = self.state.lock().await;
            if let Err(rollback_err) = self.policy.remove_container(&mut state, &pod.uid, &container.name) {
                warn!(%rollback_err, "rollback of Policy state failed");
            }
            state.container_map_mut().remove_by_id(container_id);
            if let Err(flush_err) = state.flush().await {
                warn!(%flush_err, "checkpoint flush failed during rollback");
            }
            return Err(err);
        }

        Ok(())
    }

    /// Idempotent: an unknown `container_id` is success (§7).
    pub async fn remove_container(&self, container_id: &str) -> Result<(), ManagerError> {
        let mut state = self.state.lock().await;
        let Some((pod_uid, container_name)) = state.container_map().get_container_ref(container_id) else {
            return Ok(());
        };
        self.policy.remove_container(&mut state, &pod_uid, &container_name)?;
        state.container_map_mut().remove_by_id(container_id);
        state.flush().await
    }

    /// A read-only snapshot of every current exclusive assignment.
    pub async fn state_snapshot(&self) -> Assignment {
        self.state.lock().await.get_cpu_assignments()
    }

    pub async fn topology_hints(&self, pod: &Pod, container: &Container) -> Vec<TopologyHint> {
        let state = self.state.lock().await;
        self.policy.topology_hints(&state, pod, container)
    }

    async fn run_reconcile_loop(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.reconcile_period);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.reconcile_tick().await,
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("reconcile loop shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// One reconcile tick: `removeStaleState` followed by the active-pods
    /// sweep (§5). Skipped entirely until the sources report ready, and the
    /// stale-state pass only runs when there is at least one active pod —
    /// an empty list more often means "not synced yet" than "node is empty".
    async fn reconcile_tick(&self) {
        if !self.ready_gate.sources_ready() {
            return;
        }
        let active_pods = self.pods_source.active_pods().await;
        if active_pods.is_empty() {
            return;
        }

        self.remove_stale_state(&active_pods).await;
        self.sweep_active_pods(&active_pods).await;
    }

    async fn remove_stale_state(&self, active_pods: &[Pod]) {
        let mut state = self.state.lock().await;
        let assignment = state.get_cpu_assignments();

        let mut stale = Vec::new();
        for (pod_uid, containers) in &assignment {
            let active_pod = active_pods.iter().find(|p| &p.uid == pod_uid);
            for container_name in containers.keys() {
                let still_declared = active_pod
                    .map(|p| p.container(container_name).is_some())
                    .unwrap_or(false);
                if !still_declared {
                    stale.push((pod_uid.clone(), container_name.clone()));
                }
            }
        }

        if stale.is_empty() {
            return;
        }

        for (pod_uid, container_name) in &stale {
            if let Err(err) = self.policy.remove_container(&mut state, pod_uid, container_name) {
                warn!(%pod_uid, %container_name, %err, "stale-state removal failed");
            }
            state.container_map_mut().remove_by_ref(pod_uid, container_name);
        }
        if let Err(err) = state.flush().await {
            warn!(%err, "checkpoint flush failed after stale-state GC");
        }
    }

    /// Admits every active container whose runtime id is now known but not
    /// yet tracked, and — for containers already tracked — unconditionally
    /// re-pushes their current assignment to the runtime every tick. The
    /// re-push is the self-healing path for a runtime-side cgroup reset: the
    /// Manager's own state is still correct, only the container's cgroup
    /// needs to be told again (§4.4, §5).
    async fn sweep_active_pods(&self, active_pods: &[Pod]) {
        for pod in active_pods {
            for container in &pod.containers {
                let Some(container_id) = self.status.container_id(&pod.uid, &container.name).await else {
                    continue; // ContainerIdNotInStatus: transient, retried next tick
                };

                let already_tracked = {
                    let state = self.state.lock().await;
                    state
                        .container_map()
                        .get_container_id(&pod.uid, &container.name)
                        .is_some()
                };

                if !already_tracked {
                    if let Err(err) = self.add_container(pod, container, &container_id).await {
                        warn!(pod_uid = %pod.uid, container = %container.name, %err, "reconcile failed to add container");
                    }
                    continue;
                }

                let cpu_set = {
                    let state = self.state.lock().await;
                    state.get_cpu_set_or_default(&pod.uid, &container.name)
                };
                if cpu_set.is_empty() {
                    warn!(pod_uid = %pod.uid, container = %container.name, "skipping runtime refresh: empty cpu set");
                    continue;
                }
                if let Err(err) = self
                    .runtime
                    .update_container_resources(&container_id, &cpu_set.to_string())
                    .await
                {
                    warn!(pod_uid = %pod.uid, container = %container.name, %err, "reconcile failed to refresh runtime cpuset");
                }
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Adds and removes a handful of synthetic containers directly through
//! `Manager::add_container` / `Manager::remove_container` against a fake
//! runtime, printing the assignment after each step. Useful for watching
//! the topology-aware allocator's tie-breaks by hand without a scenario
//! file.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use cpu_manager::config::{ManagerConfig, PolicyKind};
use cpu_manager::manager::Manager;
use cpu_manager::runtime::FakeContainerRuntime;
use cpu_manager::sources::{Container, Pod, QosClass};
use cpu_manager::state::{ContainerName, PodUid};
use cpu_manager::topology;

#[derive(Debug, Parser)]
#[command(name = "drift-check")]
struct Cli {
    #[arg(long)]
    topology: PathBuf,
    /// Whole-CPU request per synthetic pod, one value per pod added.
    #[arg(long, value_delimiter = ',', default_value = "4,2,1")]
    requests: Vec<i64>,
    #[arg(long, default_value_t = 1)]
    reserved_cpus_millicores_thousands: i64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let topo = topology::discover_from_file(&cli.topology).context("discovering CPU topology")?;

    let state_dir = tempfile::tempdir().context("creating scratch state dir")?;
    let config = ManagerConfig {
        policy: PolicyKind::Static,
        reconcile_period: std::time::Duration::from_secs(3600),
        reserved_cpus: cli.reserved_cpus_millicores_thousands as usize,
        explicit_reserved_cpu_set: None,
        state_dir: state_dir.path().to_path_buf(),
    };

    let runtime = Arc::new(FakeContainerRuntime::new());
    let empty_source = Arc::new(cpu_manager::sources::YamlPodsSource::empty());
    let manager = Manager::start(
        &config,
        topo,
        runtime.clone(),
        empty_source.clone(),
        empty_source.clone(),
        empty_source,
        std::collections::HashMap::new(),
    )
    .await
    .context("starting manager")?;

    for (i, num_cpus) in cli.requests.iter().enumerate() {
        let pod_uid = format!("sim-pod-{i}");
        let container_name = "c1";
        let container = Container {
            name: ContainerName::from(container_name),
            cpu_request_millicores: num_cpus * 1000,
            cpu_limit_millicores: num_cpus * 1000,
        };
        let pod = Pod {
            uid: PodUid::from(pod_uid.as_str()),
            qos: QosClass::Guaranteed,
            containers: vec![container.clone()],
            init_containers: vec![],
        };

        let container_id = format!("cid-{i}");
        manager.add_container(&pod, &container, &container_id).await?;

        let snapshot = manager.state_snapshot().await;
        let assigned = &snapshot[&pod.uid][&container.name];
        println!("added {pod_uid}/{container_name} (request={num_cpus}) -> {assigned}");
    }

    manager.shutdown();
    Ok(())
}

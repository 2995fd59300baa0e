/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Loads a manager config, a topology, and a pods scenario; starts a real
//! `Manager` against a `FakeContainerRuntime`; runs its sweep once; prints
//! the resulting assignment. Not wired to a live container runtime — see
//! `drift-check` for a multi-step interactive walk.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use cpu_manager::config::ManagerConfig;
use cpu_manager::manager::Manager;
use cpu_manager::runtime::FakeContainerRuntime;
use cpu_manager::sources::YamlPodsSource;
use cpu_manager::topology;

#[derive(Debug, Parser)]
#[command(name = "run-scenario")]
struct Cli {
    #[arg(long)]
    config: PathBuf,
    #[arg(long)]
    topology: PathBuf,
    #[arg(long)]
    pods: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = ManagerConfig::load_from_file(&cli.config).context("loading manager configuration")?;
    let topo = topology::discover_from_file(&cli.topology).context("discovering CPU topology")?;
    let pods_source = Arc::new(YamlPodsSource::load_from_file(&cli.pods).context("loading pods scenario")?);
    let runtime = Arc::new(FakeContainerRuntime::new());

    let initial_containers = pods_source.initial_containers();
    let manager = Manager::start(
        &config,
        topo,
        runtime.clone(),
        pods_source.clone(),
        pods_source.clone(),
        pods_source,
        initial_containers,
    )
    .await
    .context("starting manager")?;

    // Give the spawned reconcile loop one tick to run, then inspect state.
    tokio::time::sleep(config.reconcile_period + std::time::Duration::from_millis(50)).await;

    let snapshot = manager.state_snapshot().await;
    println!("{} pod(s) with exclusive assignments:", snapshot.len());
    for (pod_uid, containers) in &snapshot {
        for (container_name, cpu_set) in containers {
            println!("  {pod_uid}/{container_name} -> {cpu_set}");
        }
    }

    for call in runtime.calls().await {
        println!("runtime call: container={} cpuset_cpus={}", call.container_id, call.cpuset_cpus);
    }

    manager.shutdown();
    Ok(())
}

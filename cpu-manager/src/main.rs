/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! `cpu-managerd` — the CPU manager binary.
//!
//! Wires configuration, topology discovery, the runtime gRPC client, and
//! the pod/status sources into a [`Manager`] and keeps it running until
//! interrupted.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use cpu_manager::config::ManagerConfig;
use cpu_manager::manager::Manager;
use cpu_manager::runtime::GrpcContainerRuntime;
use cpu_manager::sources::YamlPodsSource;
use cpu_manager::topology;

/// Node-local CPU manager: topology-aware exclusive CPU allocation for pod
/// containers.
#[derive(Debug, Parser)]
#[command(name = "cpu-managerd", version, about)]
struct Cli {
    /// Manager configuration YAML (policy, reserved CPUs, state directory).
    #[arg(long, default_value = "/etc/cpu-manager/config.yaml")]
    config: PathBuf,

    /// CPU topology description YAML.
    #[arg(long, default_value = "/etc/cpu-manager/topology.yaml")]
    topology: PathBuf,

    /// Active-pods / container-id scenario YAML standing in for the
    /// kubelet's pod cache and status manager (out of scope per design;
    /// see YamlPodsSource).
    #[arg(long, default_value = "/etc/cpu-manager/pods.yaml")]
    pods: PathBuf,

    /// Container runtime gRPC endpoint (`runtime.v1.RuntimeService`).
    #[arg(long, default_value = "http://127.0.0.1:50051")]
    runtime_endpoint: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let config = ManagerConfig::load_from_file(&cli.config).context("loading manager configuration")?;
    let topo = topology::discover_from_file(&cli.topology).context("discovering CPU topology")?;

    let channel = tonic::transport::Channel::from_shared(cli.runtime_endpoint.clone())
        .context("invalid runtime endpoint")?
        .connect_lazy();
    let runtime = Arc::new(GrpcContainerRuntime::new(channel));

    let pods_source = Arc::new(
        YamlPodsSource::load_from_file(&cli.pods).context("loading active-pods source")?,
    );

    let initial_containers = pods_source.initial_containers();
    let manager = Manager::start(
        &config,
        topo,
        runtime,
        pods_source.clone(),
        pods_source.clone(),
        pods_source,
        initial_containers,
    )
    .await
    .context("starting CPU manager")?;

    info!("cpu-managerd running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
    manager.shutdown();
    info!("shutdown requested, exiting");

    Ok(())
}

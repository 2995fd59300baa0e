/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! cpu-manager — node-local CPU manager
//!
//! Topology-aware exclusive CPU allocation for pod containers, with
//! checkpointed state and a periodic reconciliation loop.
//!
//! ```text
//! lib.rs
//! ├── cpuset.rs        – canonical CPU-set type
//! ├── topology.rs       – CPU topology discovery
//! ├── config.rs         – manager configuration loading
//! ├── sources.rs         – active-pods / pod-status surface
//! ├── state/             – state store, container map, checkpoint
//! ├── policy/             – none/static policies, topology-aware allocation
//! ├── runtime/             – container runtime gRPC client
//! ├── manager.rs            – Manager: the mutex, the reconcile loop
//! └── error.rs               – ManagerError
//! ```

pub mod config;
pub mod cpuset;
pub mod error;
pub mod manager;
pub mod policy;
pub mod runtime;
pub mod sources;
pub mod state;
pub mod topology;

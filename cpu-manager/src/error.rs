/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Structured error types for the CPU manager.
//!
//! One flat enum carries every failure mode named in the design: the first
//! five variants are fatal at startup, the rest are surfaced to callers or
//! recorded during reconciliation (see module docs on [`Manager`] for which
//! is which).
//!
//! [`Manager`]: crate::manager::Manager

use thiserror::Error;

/// Directive shown to operators whenever the checkpoint cannot be trusted.
pub const DRAIN_AND_REMOVE_DIRECTIVE: &str =
    "drain this node and remove the CPU manager state file before restarting";

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("unknown CPU manager policy: '{0}' (valid: none, static)")]
    UnknownPolicy(String),

    #[error("static policy requires a positive reserved CPU quantity, got {millicores}m")]
    MissingReservedCpus { millicores: i64 },

    #[error("explicit reserved CPU set is invalid: {reason}")]
    InvalidReservedCpuSet { reason: String },

    #[error("CPU topology discovery failed: {0}")]
    TopologyDiscoveryFailed(#[from] crate::topology::TopologyError),

    #[error("checkpoint file is corrupt ({reason}) — {}", crate::error::DRAIN_AND_REMOVE_DIRECTIVE)]
    CheckpointCorrupt { reason: String },

    #[error(
        "checkpoint was written by policy '{checkpointed}' but the node is configured for \
         policy '{configured}' — {}", crate::error::DRAIN_AND_REMOVE_DIRECTIVE
    )]
    PolicyMismatch {
        checkpointed: String,
        configured: String,
    },

    #[error("not enough CPUs available: requested {requested}, available {available}")]
    NotEnoughCpus { requested: usize, available: usize },

    #[error("runtime failed to update resources for container '{container_id}': {reason}")]
    RuntimeUpdateFailed {
        container_id: String,
        reason: String,
    },

    #[error("container id for '{pod_uid}/{container_name}' not present in pod status")]
    ContainerIdNotInStatus {
        pod_uid: String,
        container_name: String,
    },

    #[error("no assignment found for container id '{0}'")]
    UnknownContainerId(String),
}

//! Manager configuration loading.
//!
//! The expected YAML structure is:
//! ```yaml
//! policy: static
//! reconcile_period_seconds: 10
//! reserved_cpus_millicores: 1000
//! reserved_cpu_set: "0"      # optional, see below
//! state_dir: /var/lib/cpu-manager
//! ```
//!
//! `reserved_cpu_set` is an explicit operator override of which CPUs back
//! the reservation; when absent the static policy picks them itself (§4.2,
//! topology-aware, lowest-numbered socket first). Supplying both a
//! `reserved_cpu_set` whose size doesn't match the ceiling of
//! `reserved_cpus_millicores` / 1000 is a startup error.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

use crate::cpuset::CpuSet;
use crate::error::ManagerError;

fn default_reconcile_period_seconds() -> u64 {
    10
}

fn default_state_dir() -> String {
    "/var/lib/cpu-manager".to_string()
}

#[derive(Debug, Deserialize)]
struct ManagerConfigFile {
    policy: String,
    #[serde(default = "default_reconcile_period_seconds")]
    reconcile_period_seconds: u64,
    #[serde(default)]
    reserved_cpus_millicores: i64,
    #[serde(default)]
    reserved_cpu_set: Option<String>,
    #[serde(default = "default_state_dir")]
    state_dir: String,
}

/// The policy named by configuration, already validated against the set of
/// policies this manager knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    None,
    Static,
}

impl PolicyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyKind::None => "none",
            PolicyKind::Static => "static",
        }
    }

    fn parse(s: &str) -> Result<Self, ManagerError> {
        match s {
            "none" => Ok(PolicyKind::None),
            "static" => Ok(PolicyKind::Static),
            other => Err(ManagerError::UnknownPolicy(other.to_string())),
        }
    }
}

/// Resolved, validated manager configuration.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub policy: PolicyKind,
    pub reconcile_period: std::time::Duration,
    /// Ceiling of `reserved_cpus_millicores / 1000`; zero for the `none`
    /// policy.
    pub reserved_cpus: usize,
    pub explicit_reserved_cpu_set: Option<CpuSet>,
    pub state_dir: PathBuf,
}

impl ManagerConfig {
    /// Parses and validates `path`. See module docs for the YAML shape.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        info!(path = %path.display(), "loading manager configuration");
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot open configuration file: {}", path.display()))?;
        let file: ManagerConfigFile = serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse YAML file: {}", path.display()))?;

        Self::from_file(file).context("invalid manager configuration")
    }

    fn from_file(file: ManagerConfigFile) -> Result<Self, ManagerError> {
        let policy = PolicyKind::parse(&file.policy)?;

        let reserved_cpus = millicores_to_cpus_ceil(file.reserved_cpus_millicores);
        if policy == PolicyKind::Static && reserved_cpus == 0 {
            return Err(ManagerError::MissingReservedCpus {
                millicores: file.reserved_cpus_millicores,
            });
        }

        let explicit_reserved_cpu_set = match file.reserved_cpu_set {
            None => None,
            Some(raw) => {
                let parsed: CpuSet = raw
                    .parse()
                    .map_err(|e: crate::cpuset::CpuSetParseError| ManagerError::InvalidReservedCpuSet {
                        reason: e.to_string(),
                    })?;
                if parsed.len() != reserved_cpus {
                    return Err(ManagerError::InvalidReservedCpuSet {
                        reason: format!(
                            "reserved_cpu_set has {} CPUs but reserved_cpus_millicores requires {}",
                            parsed.len(),
                            reserved_cpus
                        ),
                    });
                }
                Some(parsed)
            }
        };

        Ok(Self {
            policy,
            reconcile_period: std::time::Duration::from_secs(file.reconcile_period_seconds),
            reserved_cpus,
            explicit_reserved_cpu_set,
            state_dir: PathBuf::from(file.state_dir),
        })
    }
}

/// `ceil(millicores / 1000)`, matching the kubelet's reserved-CPU rounding:
/// any fractional CPU still reserves a whole one.
fn millicores_to_cpus_ceil(millicores: i64) -> usize {
    if millicores <= 0 {
        return 0;
    }
    ((millicores + 999) / 1000) as usize
}

// ── Tests ─────────────────────────────────────────────────────────────────────

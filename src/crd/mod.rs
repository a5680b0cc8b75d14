//! Custom Resource Definitions for the fleet.dev API group
//!
//! This module defines the CRDs the health-check engine operates on:
//! FleetCluster, Machine, and MachineHealthCheck.

mod cluster;
mod machine;
mod machine_health_check;
mod types;

pub use cluster::{ControlPlaneEndpoint, FleetCluster, FleetClusterSpec, FleetClusterStatus};
pub use machine::{Machine, MachineSpec, MachineStatus};
pub use machine_health_check::{
    MachineHealthCheck, MachineHealthCheckSpec, MachineHealthCheckStatus,
    DEFAULT_NODE_STARTUP_TIMEOUT_SECONDS,
};
pub use types::*;

//! fleet-health: a Kubernetes operator that health-checks fleet machines
//!
//! The operator watches MachineHealthCheck policies in the management
//! cluster, classifies each governed Machine against the health of its
//! backing workload-cluster Node, and marks conclusively-unhealthy
//! machines for remediation. A per-policy maxUnhealthy bound acts as a
//! circuit breaker during mass outages. Actual machine replacement is
//! left to a downstream remediation controller.

pub mod controller;
pub mod crd;
pub mod error;
pub mod remote;
pub mod server;

pub use error::{Error, Result};

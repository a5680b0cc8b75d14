//! FleetCluster Custom Resource Definition
//!
//! A FleetCluster is the owning object for a set of Machines. The operator
//! reads it to resolve ownership and the paused flag; the kubeconfig used to
//! reach the workload cluster lives in a `<name>-kubeconfig` Secret next to it.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::Condition;

/// The FleetCluster CRD represents one managed compute cluster.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "fleet.dev",
    version = "v1alpha1",
    kind = "FleetCluster",
    namespaced,
    status = "FleetClusterStatus",
    shortname = "fc",
    printcolumn = r#"{"name":"Paused","type":"boolean","jsonPath":".spec.paused"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct FleetClusterSpec {
    /// Pause all reconciliation for this cluster and everything it owns
    #[serde(default)]
    pub paused: bool,

    /// Endpoint of the workload cluster's API server (informational)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub control_plane_endpoint: Option<ControlPlaneEndpoint>,
}

/// Host and port of the workload cluster's API server
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ControlPlaneEndpoint {
    pub host: String,
    pub port: i32,
}

/// Status subresource for FleetCluster
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FleetClusterStatus {
    /// Current phase of the cluster lifecycle
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,

    /// Readiness conditions following Kubernetes conventions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl FleetCluster {
    /// Name of the Secret holding this cluster's kubeconfig
    pub fn kubeconfig_secret_name(&self) -> String {
        format!(
            "{}-kubeconfig",
            self.metadata.name.as_deref().unwrap_or_default()
        )
    }
}

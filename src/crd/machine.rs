//! Machine Custom Resource Definition
//!
//! A Machine represents one fleet member: a provisioned worker backed by a
//! Node in the workload cluster. This operator only ever touches a Machine
//! to set its remediation-requested condition; creation and deletion belong
//! to other controllers.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{
    get_condition, Condition, NodeRef, REMEDIATION_REQUESTED_CONDITION,
};

/// The Machine CRD represents one member of a FleetCluster.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "fleet.dev",
    version = "v1alpha1",
    kind = "Machine",
    namespaced,
    status = "MachineStatus",
    shortname = "ma",
    printcolumn = r#"{"name":"Cluster","type":"string","jsonPath":".spec.clusterName"}"#,
    printcolumn = r#"{"name":"Node","type":"string","jsonPath":".status.nodeRef.name"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MachineSpec {
    /// Name of the FleetCluster this machine belongs to
    pub cluster_name: String,

    /// Provider-specific identifier of the underlying instance
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
}

/// Status subresource for Machine
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MachineStatus {
    /// Back-reference to the workload-cluster Node backing this machine,
    /// absent until the node has registered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_ref: Option<NodeRef>,

    /// Conditions following Kubernetes conventions. The health-check
    /// engine owns the RemediationRequested entry.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl Machine {
    /// Name of the backing Node, if one has been bound
    pub fn node_name(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.node_ref.as_ref())
            .map(|r| r.name.as_str())
    }

    /// Whether this machine currently carries the remediation-requested
    /// condition. This is the handoff contract to the remediation
    /// controller.
    pub fn remediation_requested(&self) -> bool {
        self.status
            .as_ref()
            .and_then(|s| get_condition(&s.conditions, REMEDIATION_REQUESTED_CONDITION))
            .map(|c| c.status == "True")
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::types::set_condition;

    fn machine_with_status(status: Option<MachineStatus>) -> Machine {
        let mut machine = Machine::new(
            "worker-0",
            MachineSpec {
                cluster_name: "prod".to_string(),
                provider_id: None,
            },
        );
        machine.status = status;
        machine
    }

    #[test]
    fn test_node_name_resolution() {
        let machine = machine_with_status(Some(MachineStatus {
            node_ref: Some(NodeRef {
                name: "node-a".to_string(),
            }),
            conditions: vec![],
        }));
        assert_eq!(machine.node_name(), Some("node-a"));

        let bare = machine_with_status(None);
        assert_eq!(bare.node_name(), None);
    }

    #[test]
    fn test_remediation_requested_contract() {
        let mut status = MachineStatus::default();
        set_condition(
            &mut status.conditions,
            Condition::remediation_requested("health check failed"),
        );
        let marked = machine_with_status(Some(status));
        assert!(marked.remediation_requested());

        let unmarked = machine_with_status(Some(MachineStatus::default()));
        assert!(!unmarked.remediation_requested());
    }
}

//! MachineHealthCheck Custom Resource Definition
//!
//! A MachineHealthCheck declares which Machines of a FleetCluster are
//! monitored, the node conditions that make them unhealthy, and the
//! circuit-breaker bound on concurrent remediation.
//!
//! # Example
//!
//! ```yaml
//! apiVersion: fleet.dev/v1alpha1
//! kind: MachineHealthCheck
//! metadata:
//!   name: workers
//!   namespace: fleet-system
//! spec:
//!   clusterName: prod
//!   selector:
//!     matchLabels:
//!       role: worker
//!   unhealthyConditions:
//!     - type: Ready
//!       status: "False"
//!       timeoutSeconds: 300
//!     - type: Ready
//!       status: Unknown
//!       timeoutSeconds: 300
//!   nodeStartupTimeoutSeconds: 600
//!   maxUnhealthy: "40%"
//! ```

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{Condition, MaxUnhealthy, Selector, UnhealthyCondition};

/// Default grace period for a machine whose node never registers
pub const DEFAULT_NODE_STARTUP_TIMEOUT_SECONDS: i64 = 600;

/// The MachineHealthCheck CRD declares a health-check policy over Machines.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "fleet.dev",
    version = "v1alpha1",
    kind = "MachineHealthCheck",
    namespaced,
    status = "MachineHealthCheckStatus",
    shortname = "mhc",
    printcolumn = r#"{"name":"Cluster","type":"string","jsonPath":".spec.clusterName"}"#,
    printcolumn = r#"{"name":"ExpectedMachines","type":"integer","jsonPath":".status.expectedMachines"}"#,
    printcolumn = r#"{"name":"CurrentHealthy","type":"integer","jsonPath":".status.currentHealthy"}"#,
    printcolumn = r#"{"name":"MaxUnhealthy","type":"string","jsonPath":".spec.maxUnhealthy"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MachineHealthCheckSpec {
    /// Name of the FleetCluster whose machines are monitored
    pub cluster_name: String,

    /// Label selector describing which Machines this check governs
    pub selector: Selector,

    /// Node conditions that classify a target as unhealthy once they
    /// have held for their configured timeout
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unhealthy_conditions: Vec<UnhealthyCondition>,

    /// How long to wait for a machine's node to register before the
    /// machine is deemed unhealthy. Defaults to ten minutes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_startup_timeout_seconds: Option<i64>,

    /// Circuit breaker: when more than this many machines (absolute or
    /// percentage of expected) are unhealthy at once, remediation is
    /// withheld. Unset means always remediate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_unhealthy: Option<MaxUnhealthy>,
}

impl MachineHealthCheckSpec {
    /// Node startup timeout with the default applied
    pub fn node_startup_timeout_seconds(&self) -> i64 {
        self.node_startup_timeout_seconds
            .unwrap_or(DEFAULT_NODE_STARTUP_TIMEOUT_SECONDS)
    }

    /// Validate the spec
    pub fn validate(&self) -> Result<(), String> {
        if self.cluster_name.trim().is_empty() {
            return Err("clusterName must not be empty".to_string());
        }
        if self.selector.match_labels.is_empty() {
            return Err("selector.matchLabels must not be empty".to_string());
        }
        for (i, rule) in self.unhealthy_conditions.iter().enumerate() {
            if rule.type_.trim().is_empty() {
                return Err(format!("unhealthyConditions[{}].type must not be empty", i));
            }
            if rule.timeout_seconds < 0 {
                return Err(format!(
                    "unhealthyConditions[{}].timeoutSeconds must not be negative",
                    i
                ));
            }
        }
        if let Some(timeout) = self.node_startup_timeout_seconds {
            if timeout < 0 {
                return Err("nodeStartupTimeoutSeconds must not be negative".to_string());
            }
        }
        Ok(())
    }
}

/// Status subresource for MachineHealthCheck
///
/// Every field is recomputed on each reconciliation pass, never carried
/// over from a previous one.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MachineHealthCheckStatus {
    /// Number of machines currently governed by this check
    #[serde(default)]
    pub expected_machines: i32,

    /// Number of governed machines currently classified healthy
    #[serde(default)]
    pub current_healthy: i32,

    /// Names of the governed machines
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<String>,

    /// Stringified selector, for scale-subresource style consumers
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub selector: String,

    /// Generation observed by the last reconciliation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Conditions, including the RemediationAllowed admission decision
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn valid_spec() -> MachineHealthCheckSpec {
        MachineHealthCheckSpec {
            cluster_name: "prod".to_string(),
            selector: Selector {
                match_labels: BTreeMap::from([("role".to_string(), "worker".to_string())]),
            },
            unhealthy_conditions: vec![UnhealthyCondition {
                type_: "Ready".to_string(),
                status: "False".to_string(),
                timeout_seconds: 300,
            }],
            node_startup_timeout_seconds: None,
            max_unhealthy: Some(MaxUnhealthy::Percent("40%".to_string())),
        }
    }

    #[test]
    fn test_valid_spec_passes() {
        assert!(valid_spec().validate().is_ok());
    }

    #[test]
    fn test_empty_selector_rejected() {
        let mut spec = valid_spec();
        spec.selector.match_labels.clear();
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_negative_timeouts_rejected() {
        let mut spec = valid_spec();
        spec.unhealthy_conditions[0].timeout_seconds = -1;
        assert!(spec.validate().is_err());

        let mut spec = valid_spec();
        spec.node_startup_timeout_seconds = Some(-5);
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_node_startup_timeout_default() {
        let spec = valid_spec();
        assert_eq!(
            spec.node_startup_timeout_seconds(),
            DEFAULT_NODE_STARTUP_TIMEOUT_SECONDS
        );
    }

    #[test]
    fn test_spec_round_trips_through_json() {
        let spec = valid_spec();
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["maxUnhealthy"], "40%");
        assert_eq!(json["unhealthyConditions"][0]["timeoutSeconds"], 300);

        let back: MachineHealthCheckSpec = serde_json::from_value(json).unwrap();
        assert_eq!(back.cluster_name, "prod");
        assert_eq!(back.max_unhealthy, spec.max_unhealthy);
    }
}

//! Event routing: map watched objects back to the health checks to re-run
//!
//! The controller watches three secondary sources (FleetClusters, Machines
//! and workload-cluster Nodes) and each observed event must be translated
//! into the set of MachineHealthChecks whose verdict it might change.
//! There is exactly one mapping per source kind; the mappers are pure
//! functions over a snapshot of the known health checks so they can be
//! tested without a cluster.

use std::sync::Arc;

use k8s_openapi::api::core::v1::Node;
use kube::runtime::reflector::ObjectRef;
use kube::ResourceExt;
use tracing::{debug, warn};

use crate::crd::{FleetCluster, Machine, MachineHealthCheck, CLUSTER_NAME_LABEL};

/// The FleetCluster a health check governs. The cluster-name label wins
/// when present; otherwise the spec field is authoritative.
pub fn policy_cluster_name(mhc: &MachineHealthCheck) -> &str {
    mhc.labels()
        .get(CLUSTER_NAME_LABEL)
        .map(String::as_str)
        .unwrap_or(mhc.spec.cluster_name.as_str())
}

/// A FleetCluster event re-runs every health check in its namespace that
/// governs it. Pause toggles and kubeconfig rotation both arrive this way.
pub fn cluster_to_health_checks(
    cluster: &FleetCluster,
    health_checks: &[Arc<MachineHealthCheck>],
) -> Vec<ObjectRef<MachineHealthCheck>> {
    health_checks
        .iter()
        .filter(|mhc| mhc.namespace() == cluster.namespace())
        .filter(|mhc| policy_cluster_name(mhc) == cluster.name_any())
        .map(|mhc| ObjectRef::from_obj(mhc.as_ref()))
        .collect()
}

/// A Machine event re-runs every health check whose selector covers it
/// within the same cluster and namespace.
pub fn machine_to_health_checks(
    machine: &Machine,
    health_checks: &[Arc<MachineHealthCheck>],
) -> Vec<ObjectRef<MachineHealthCheck>> {
    health_checks
        .iter()
        .filter(|mhc| mhc.namespace() == machine.namespace())
        .filter(|mhc| policy_cluster_name(mhc) == machine.spec.cluster_name)
        .filter(|mhc| mhc.spec.selector.matches(machine.metadata.labels.as_ref()))
        .map(|mhc| ObjectRef::from_obj(mhc.as_ref()))
        .collect()
}

/// A workload-cluster Node event first resolves to the Machine that claims
/// it, then routes like a Machine event. A node claimed by zero machines is
/// not ours; one claimed by several is ambiguous and dropped with a warning
/// rather than guessed at.
pub fn node_to_health_checks(
    cluster_name: &str,
    node: &Node,
    machines: &[Arc<Machine>],
    health_checks: &[Arc<MachineHealthCheck>],
) -> Vec<ObjectRef<MachineHealthCheck>> {
    let node_name = node.name_any();
    let claimants: Vec<&Arc<Machine>> = machines
        .iter()
        .filter(|m| m.spec.cluster_name == cluster_name)
        .filter(|m| m.node_name() == Some(node_name.as_str()))
        .collect();

    match claimants.as_slice() {
        [machine] => machine_to_health_checks(machine, health_checks),
        [] => {
            debug!(
                node = %node_name,
                cluster = %cluster_name,
                "node is not claimed by any machine, dropping event"
            );
            Vec::new()
        }
        _ => {
            warn!(
                node = %node_name,
                cluster = %cluster_name,
                claimants = claimants.len(),
                "node is claimed by multiple machines, dropping event"
            );
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{
        FleetClusterSpec, MachineHealthCheckSpec, MachineSpec, MachineStatus, NodeRef, Selector,
    };
    use std::collections::BTreeMap;

    fn health_check(name: &str, cluster: &str, labels: &[(&str, &str)]) -> Arc<MachineHealthCheck> {
        let mut mhc = MachineHealthCheck::new(
            name,
            MachineHealthCheckSpec {
                cluster_name: cluster.to_string(),
                selector: Selector {
                    match_labels: labels
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                },
                unhealthy_conditions: vec![],
                node_startup_timeout_seconds: None,
                max_unhealthy: None,
            },
        );
        mhc.metadata.namespace = Some("fleet-system".to_string());
        Arc::new(mhc)
    }

    fn machine(name: &str, cluster: &str, labels: &[(&str, &str)], node: Option<&str>) -> Machine {
        let mut machine = Machine::new(
            name,
            MachineSpec {
                cluster_name: cluster.to_string(),
                provider_id: None,
            },
        );
        machine.metadata.namespace = Some("fleet-system".to_string());
        machine.metadata.labels = Some(
            labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
        );
        if let Some(node_name) = node {
            machine.status = Some(MachineStatus {
                node_ref: Some(NodeRef {
                    name: node_name.to_string(),
                }),
                conditions: vec![],
            });
        }
        machine
    }

    fn cluster(name: &str) -> FleetCluster {
        let mut cluster = FleetCluster::new(
            name,
            FleetClusterSpec {
                paused: false,
                control_plane_endpoint: None,
            },
        );
        cluster.metadata.namespace = Some("fleet-system".to_string());
        cluster
    }

    fn node(name: &str) -> Node {
        let mut node = Node::default();
        node.metadata.name = Some(name.to_string());
        node
    }

    #[test]
    fn test_cluster_event_routes_to_its_health_checks() {
        let checks = vec![
            health_check("workers", "prod", &[("role", "worker")]),
            health_check("cp", "prod", &[("role", "control-plane")]),
            health_check("other", "staging", &[("role", "worker")]),
        ];

        let refs = cluster_to_health_checks(&cluster("prod"), &checks);
        let names: Vec<String> = refs.iter().map(|r| r.name.clone()).collect();
        assert_eq!(names, vec!["workers", "cp"]);
    }

    #[test]
    fn test_cluster_name_label_overrides_spec() {
        let mut mhc = MachineHealthCheck::clone(&health_check("workers", "prod", &[("a", "b")]));
        mhc.metadata.labels = Some(BTreeMap::from([(
            CLUSTER_NAME_LABEL.to_string(),
            "staging".to_string(),
        )]));
        assert_eq!(policy_cluster_name(&mhc), "staging");

        let checks = vec![Arc::new(mhc)];
        assert!(cluster_to_health_checks(&cluster("prod"), &checks).is_empty());
        assert_eq!(cluster_to_health_checks(&cluster("staging"), &checks).len(), 1);
    }

    #[test]
    fn test_machine_event_routes_by_selector_and_cluster() {
        let checks = vec![
            health_check("workers", "prod", &[("role", "worker")]),
            health_check("cp", "prod", &[("role", "control-plane")]),
            health_check("staging-workers", "staging", &[("role", "worker")]),
        ];

        let worker = machine("worker-0", "prod", &[("role", "worker")], None);
        let refs = machine_to_health_checks(&worker, &checks);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].name, "workers");

        let unlabeled = machine("orphan", "prod", &[], None);
        assert!(machine_to_health_checks(&unlabeled, &checks).is_empty());
    }

    #[test]
    fn test_machine_routing_follows_cluster_name_label() {
        // A policy relabeled to another cluster must route machine events
        // by the label, the same rule the cluster mapper uses
        let mut mhc = MachineHealthCheck::clone(&health_check("workers", "prod", &[("role", "worker")]));
        mhc.metadata.labels = Some(BTreeMap::from([(
            CLUSTER_NAME_LABEL.to_string(),
            "staging".to_string(),
        )]));
        let checks = vec![Arc::new(mhc)];

        let prod_machine = machine("worker-0", "prod", &[("role", "worker")], None);
        assert!(machine_to_health_checks(&prod_machine, &checks).is_empty());

        let staging_machine = machine("stg-0", "staging", &[("role", "worker")], None);
        assert_eq!(machine_to_health_checks(&staging_machine, &checks).len(), 1);
    }

    #[test]
    fn test_node_event_resolves_through_single_claimant() {
        let checks = vec![health_check("workers", "prod", &[("role", "worker")])];
        let machines = vec![
            Arc::new(machine("worker-0", "prod", &[("role", "worker")], Some("node-a"))),
            Arc::new(machine("worker-1", "prod", &[("role", "worker")], Some("node-b"))),
        ];

        let refs = node_to_health_checks("prod", &node("node-a"), &machines, &checks);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].name, "workers");

        // Unclaimed node: not ours
        assert!(node_to_health_checks("prod", &node("node-z"), &machines, &checks).is_empty());
    }

    #[test]
    fn test_node_claimed_by_multiple_machines_is_dropped() {
        let checks = vec![health_check("workers", "prod", &[("role", "worker")])];
        let machines = vec![
            Arc::new(machine("worker-0", "prod", &[("role", "worker")], Some("node-a"))),
            Arc::new(machine("worker-1", "prod", &[("role", "worker")], Some("node-a"))),
        ];
        assert!(node_to_health_checks("prod", &node("node-a"), &machines, &checks).is_empty());
    }

    #[test]
    fn test_node_claim_is_scoped_to_cluster() {
        let checks = vec![health_check("workers", "prod", &[("role", "worker")])];
        // Same node name claimed in another cluster does not collide
        let machines = vec![
            Arc::new(machine("worker-0", "prod", &[("role", "worker")], Some("node-a"))),
            Arc::new(machine("stg-0", "staging", &[("role", "worker")], Some("node-a"))),
        ];
        let refs = node_to_health_checks("prod", &node("node-a"), &machines, &checks);
        assert_eq!(refs.len(), 1);
    }
}

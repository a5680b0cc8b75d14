//! Target resolution and per-target health evaluation
//!
//! A target pairs one governed Machine with its backing workload-cluster
//! Node, which may be absent while the node is still registering (or never
//! registers at all). Targets are recomputed from scratch on every
//! reconciliation pass and are never persisted.
//!
//! Classification is a pure function of the target, the policy spec and an
//! explicit `now`, so the timeout arithmetic is unit-testable without a
//! cluster.

use chrono::{DateTime, Duration, Utc};
use k8s_openapi::api::core::v1::Node;
use kube::{
    api::{Api, ListParams},
    Client, ResourceExt,
};
use tracing::debug;

use crate::crd::{Machine, MachineHealthCheck, MachineHealthCheckSpec};
use crate::error::Result;

/// One health-check target: a Machine and its (possibly absent) Node
#[derive(Debug, Clone)]
pub struct Target {
    pub machine: Machine,
    pub node: Option<Node>,
}

impl Target {
    /// Human-readable identity used in events and logs
    pub fn describe(&self) -> String {
        match &self.node {
            Some(node) => format!("{}/{}", self.machine.name_any(), node.name_any()),
            None => format!("{}/(no node)", self.machine.name_any()),
        }
    }
}

/// Outcome of classifying a single target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetHealth {
    Healthy,
    Unhealthy { reason: String },
    Pending { next_check: DateTime<Utc> },
}

/// Targets partitioned by classification, plus the earliest instant at
/// which a pending target could flip to unhealthy
#[derive(Debug, Default)]
pub struct ClassifiedTargets {
    pub healthy: Vec<Target>,
    pub unhealthy: Vec<(Target, String)>,
    pub next_check: Option<DateTime<Utc>>,
}

/// Resolve the current set of targets governed by a health check.
///
/// Machines are listed from the management cluster by the policy's label
/// selector, then filtered to the policy's cluster; machines already being
/// deleted are excluded. Each machine's backing node is fetched from the
/// workload cluster; a missing node is not an error, it yields a target
/// with `node: None`.
pub async fn resolve_targets(
    client: &Client,
    workload: &Client,
    mhc: &MachineHealthCheck,
) -> Result<Vec<Target>> {
    let namespace = mhc.namespace().unwrap_or_else(|| "default".to_string());
    let machine_api: Api<Machine> = Api::namespaced(client.clone(), &namespace);
    let node_api: Api<Node> = Api::all(workload.clone());

    let selector = mhc.spec.selector.to_selector_string();
    let machines = machine_api
        .list(&ListParams::default().labels(&selector))
        .await?;

    let mut targets = Vec::new();
    for machine in machines.items {
        if machine.spec.cluster_name != mhc.spec.cluster_name {
            continue;
        }
        if machine.metadata.deletion_timestamp.is_some() {
            debug!(machine = %machine.name_any(), "skipping machine being deleted");
            continue;
        }

        let node = match machine.node_name() {
            Some(node_name) => node_api.get_opt(node_name).await?,
            None => None,
        };

        targets.push(Target { machine, node });
    }

    Ok(targets)
}

/// Classify a single target against the policy's rules.
///
/// A target with no node is unhealthy once the node-startup timeout has
/// elapsed since the machine was created, and pending before that. A
/// target with a node is unhealthy as soon as any configured condition
/// rule has held for its timeout; a rule currently matching but not yet
/// timed out makes the target pending. The boundary is inclusive: a
/// target becomes unhealthy exactly at the deadline, not after it.
pub fn evaluate_target(
    target: &Target,
    spec: &MachineHealthCheckSpec,
    now: DateTime<Utc>,
) -> TargetHealth {
    let Some(node) = &target.node else {
        let created = target
            .machine
            .metadata
            .creation_timestamp
            .as_ref()
            .map(|t| t.0)
            .unwrap_or(now);
        let deadline = created + Duration::seconds(spec.node_startup_timeout_seconds());
        if now >= deadline {
            return TargetHealth::Unhealthy {
                reason: format!(
                    "node was not provisioned within {}s of machine creation",
                    spec.node_startup_timeout_seconds()
                ),
            };
        }
        return TargetHealth::Pending {
            next_check: deadline,
        };
    };

    let node_conditions = node
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_deref())
        .unwrap_or_default();

    let mut next_check: Option<DateTime<Utc>> = None;
    for rule in &spec.unhealthy_conditions {
        let Some(condition) = node_conditions.iter().find(|c| c.type_ == rule.type_) else {
            continue;
        };
        if condition.status != rule.status {
            continue;
        }
        // No recorded transition time means the condition has held for as
        // long as we can tell: treat the timeout as already elapsed.
        let Some(since) = condition.last_transition_time.as_ref().map(|t| t.0) else {
            return TargetHealth::Unhealthy {
                reason: unhealthy_reason(rule.type_.as_str(), rule.status.as_str(), rule.timeout_seconds),
            };
        };
        let deadline = since + Duration::seconds(rule.timeout_seconds);
        if now >= deadline {
            return TargetHealth::Unhealthy {
                reason: unhealthy_reason(rule.type_.as_str(), rule.status.as_str(), rule.timeout_seconds),
            };
        }
        next_check = Some(match next_check {
            Some(current) => current.min(deadline),
            None => deadline,
        });
    }

    match next_check {
        Some(next_check) => TargetHealth::Pending { next_check },
        None => TargetHealth::Healthy,
    }
}

fn unhealthy_reason(condition_type: &str, status: &str, timeout_seconds: i64) -> String {
    format!(
        "node condition {} has been {} for more than {}s",
        condition_type, status, timeout_seconds
    )
}

/// Classify every target and keep the minimum pending deadline as the
/// requeue candidate for this pass.
pub fn classify_targets(
    targets: Vec<Target>,
    spec: &MachineHealthCheckSpec,
    now: DateTime<Utc>,
) -> ClassifiedTargets {
    let mut classified = ClassifiedTargets::default();
    for target in targets {
        match evaluate_target(&target, spec, now) {
            TargetHealth::Healthy => classified.healthy.push(target),
            TargetHealth::Unhealthy { reason } => classified.unhealthy.push((target, reason)),
            TargetHealth::Pending { next_check } => {
                classified.next_check = Some(match classified.next_check {
                    Some(current) => current.min(next_check),
                    None => next_check,
                });
            }
        }
    }
    classified
}

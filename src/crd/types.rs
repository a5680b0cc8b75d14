//! Shared types for the fleet.dev API group
//!
//! These types are used across the CRD definitions and controller logic.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Label carried by Machines and MachineHealthChecks to record which
/// FleetCluster they belong to
pub const CLUSTER_NAME_LABEL: &str = "fleet.dev/cluster-name";

/// Annotation that pauses reconciliation for a single object
pub const PAUSED_ANNOTATION: &str = "fleet.dev/paused";

/// Reference to a workload-cluster Node backing a Machine
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NodeRef {
    /// Name of the Node in the workload cluster
    pub name: String,
}

/// Exact-match label selector describing which Machines a health check governs
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Selector {
    /// Labels a Machine must carry, all of them, to be selected
    #[serde(default)]
    pub match_labels: BTreeMap<String, String>,
}

impl Selector {
    /// Check whether the given label set satisfies this selector.
    /// An empty selector matches nothing, so a misconfigured health check
    /// cannot accidentally govern the whole fleet.
    pub fn matches(&self, labels: Option<&BTreeMap<String, String>>) -> bool {
        if self.match_labels.is_empty() {
            return false;
        }
        let Some(labels) = labels else {
            return false;
        };
        self.match_labels
            .iter()
            .all(|(key, value)| labels.get(key) == Some(value))
    }

    /// Stringified form for the status subresource (`k1=v1,k2=v2`)
    pub fn to_selector_string(&self) -> String {
        self.match_labels
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// A rule describing one way a backing Node can be deemed unhealthy:
/// its condition of the given type has held the given status for at
/// least the configured duration.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UnhealthyCondition {
    /// Node condition type to inspect (e.g. "Ready")
    #[serde(rename = "type")]
    pub type_: String,
    /// Condition status considered unhealthy (e.g. "False", "Unknown")
    pub status: String,
    /// How long the condition must hold that status before the target
    /// is classified unhealthy
    pub timeout_seconds: i64,
}

/// Upper bound on simultaneously-unhealthy machines before remediation
/// is short-circuited. Either an absolute count or a percentage of the
/// expected machine count.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(untagged)]
pub enum MaxUnhealthy {
    /// Absolute number of machines
    Count(i32),
    /// Percentage of expected machines, e.g. "40%"
    Percent(String),
}

impl MaxUnhealthy {
    /// Resolve against the expected machine count.
    ///
    /// Percentages round down (integer division): "50%" of 3 machines
    /// resolves to 1. Returns `None` for malformed values (negative
    /// counts, negative or non-numeric percentages, missing `%`), which
    /// callers treat as a remediation deny.
    pub fn resolve(&self, expected_machines: i32) -> Option<i32> {
        match self {
            MaxUnhealthy::Count(count) if *count >= 0 => Some(*count),
            MaxUnhealthy::Count(_) => None,
            MaxUnhealthy::Percent(raw) => {
                let percent: i64 = raw.strip_suffix('%')?.trim().parse().ok()?;
                if percent < 0 || expected_machines < 0 {
                    return None;
                }
                Some((i64::from(expected_machines) * percent / 100) as i32)
            }
        }
    }
}

impl std::fmt::Display for MaxUnhealthy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MaxUnhealthy::Count(count) => write!(f, "{}", count),
            MaxUnhealthy::Percent(raw) => write!(f, "{}", raw),
        }
    }
}

/// Condition for status reporting (Kubernetes convention)
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition (e.g. "RemediationAllowed", "RemediationRequested")
    #[serde(rename = "type")]
    pub type_: String,
    /// Status of the condition: "True", "False", or "Unknown"
    pub status: String,
    /// Severity classifying the impact when the condition is not "True"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    /// Last time the condition transitioned
    pub last_transition_time: String,
    /// Machine-readable reason for the condition
    pub reason: String,
    /// Human-readable message
    pub message: String,
}

/// Condition type placed on a Machine when its health check failed and
/// remediation was admitted. The downstream remediation controller acts
/// on its presence.
pub const REMEDIATION_REQUESTED_CONDITION: &str = "RemediationRequested";

/// Condition type on a MachineHealthCheck recording the admission decision
pub const REMEDIATION_ALLOWED_CONDITION: &str = "RemediationAllowed";

/// Fixed reason carried by the remediation-requested condition
pub const WAITING_FOR_REMEDIATION_REASON: &str = "WaitingForRemediation";

impl Condition {
    /// Condition marking a Machine as waiting for remediation
    pub fn remediation_requested(message: &str) -> Self {
        Self {
            type_: REMEDIATION_REQUESTED_CONDITION.to_string(),
            status: "True".to_string(),
            severity: Some("Warning".to_string()),
            last_transition_time: chrono::Utc::now().to_rfc3339(),
            reason: WAITING_FOR_REMEDIATION_REASON.to_string(),
            message: message.to_string(),
        }
    }

    /// Condition recording whether remediation is currently admitted
    pub fn remediation_allowed(allowed: bool, reason: &str, message: &str) -> Self {
        Self {
            type_: REMEDIATION_ALLOWED_CONDITION.to_string(),
            status: if allowed { "True" } else { "False" }.to_string(),
            severity: if allowed {
                None
            } else {
                Some("Warning".to_string())
            },
            last_transition_time: chrono::Utc::now().to_rfc3339(),
            reason: reason.to_string(),
            message: message.to_string(),
        }
    }
}

/// Insert or update a condition in place, keyed by type.
///
/// The existing entry is left untouched (transition time included) when
/// status, reason and message are unchanged, so repeated reconciliations
/// of unchanged state produce no status diff. Returns whether the
/// condition set was modified.
pub fn set_condition(conditions: &mut Vec<Condition>, condition: Condition) -> bool {
    match conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        Some(existing) => {
            if existing.status == condition.status
                && existing.reason == condition.reason
                && existing.message == condition.message
            {
                return false;
            }
            *existing = condition;
            true
        }
        None => {
            conditions.push(condition);
            true
        }
    }
}

/// Find a condition by type
pub fn get_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_matches_all_labels() {
        let mut selector = Selector::default();
        selector
            .match_labels
            .insert("role".to_string(), "worker".to_string());
        selector
            .match_labels
            .insert("pool".to_string(), "a".to_string());

        let mut labels = BTreeMap::new();
        labels.insert("role".to_string(), "worker".to_string());
        labels.insert("pool".to_string(), "a".to_string());
        labels.insert("extra".to_string(), "ignored".to_string());
        assert!(selector.matches(Some(&labels)));

        labels.insert("pool".to_string(), "b".to_string());
        assert!(!selector.matches(Some(&labels)));
        assert!(!selector.matches(None));
    }

    #[test]
    fn test_empty_selector_matches_nothing() {
        let selector = Selector::default();
        let labels = BTreeMap::from([("role".to_string(), "worker".to_string())]);
        assert!(!selector.matches(Some(&labels)));
    }

    #[test]
    fn test_selector_string() {
        let mut selector = Selector::default();
        selector
            .match_labels
            .insert("role".to_string(), "worker".to_string());
        selector
            .match_labels
            .insert("pool".to_string(), "a".to_string());
        // BTreeMap iterates in key order
        assert_eq!(selector.to_selector_string(), "pool=a,role=worker");
    }

    #[test]
    fn test_max_unhealthy_count() {
        assert_eq!(MaxUnhealthy::Count(2).resolve(5), Some(2));
        assert_eq!(MaxUnhealthy::Count(0).resolve(5), Some(0));
        assert_eq!(MaxUnhealthy::Count(-1).resolve(5), None);
    }

    #[test]
    fn test_max_unhealthy_percent_rounds_down() {
        // 50% of 3 machines resolves to 1, not 2
        assert_eq!(MaxUnhealthy::Percent("50%".to_string()).resolve(3), Some(1));
        assert_eq!(MaxUnhealthy::Percent("40%".to_string()).resolve(5), Some(2));
        assert_eq!(MaxUnhealthy::Percent("100%".to_string()).resolve(4), Some(4));
        assert_eq!(MaxUnhealthy::Percent("0%".to_string()).resolve(4), Some(0));
    }

    #[test]
    fn test_max_unhealthy_malformed_resolves_to_none() {
        assert_eq!(MaxUnhealthy::Percent("half".to_string()).resolve(4), None);
        assert_eq!(MaxUnhealthy::Percent("50".to_string()).resolve(4), None);
        assert_eq!(MaxUnhealthy::Percent("-10%".to_string()).resolve(4), None);
        assert_eq!(MaxUnhealthy::Percent("".to_string()).resolve(4), None);
    }

    #[test]
    fn test_max_unhealthy_untagged_serde() {
        let count: MaxUnhealthy = serde_json::from_str("2").unwrap();
        assert_eq!(count, MaxUnhealthy::Count(2));

        let percent: MaxUnhealthy = serde_json::from_str("\"40%\"").unwrap();
        assert_eq!(percent, MaxUnhealthy::Percent("40%".to_string()));

        assert_eq!(serde_json::to_string(&count).unwrap(), "2");
        assert_eq!(serde_json::to_string(&percent).unwrap(), "\"40%\"");
    }

    #[test]
    fn test_set_condition_is_idempotent() {
        let mut conditions = Vec::new();
        assert!(set_condition(
            &mut conditions,
            Condition::remediation_requested("health check failed")
        ));
        let first_transition = conditions[0].last_transition_time.clone();

        // Same state again: no modification, transition time preserved
        assert!(!set_condition(
            &mut conditions,
            Condition::remediation_requested("health check failed")
        ));
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].last_transition_time, first_transition);
    }

    #[test]
    fn test_set_condition_replaces_on_change() {
        let mut conditions = vec![Condition::remediation_allowed(true, "WithinLimit", "ok")];
        assert!(set_condition(
            &mut conditions,
            Condition::remediation_allowed(false, "TooManyUnhealthy", "2 of 3 unhealthy")
        ));
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].status, "False");
        assert_eq!(conditions[0].severity.as_deref(), Some("Warning"));
    }
}

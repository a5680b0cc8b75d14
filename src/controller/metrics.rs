//! Prometheus metrics for the fleet-health operator

use once_cell::sync::Lazy;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use std::sync::atomic::AtomicI64;

/// Labels identifying one MachineHealthCheck
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct PolicyLabels {
    pub namespace: String,
    pub name: String,
}

/// Counter of reconciliation passes per health check
pub static RECONCILIATIONS: Lazy<Family<PolicyLabels, Counter>> = Lazy::new(Family::default);

/// Counter of machines marked for remediation
pub static REMEDIATIONS_SIGNALED: Lazy<Family<PolicyLabels, Counter>> = Lazy::new(Family::default);

/// Counter of passes in which the maxUnhealthy bound withheld remediation
pub static REMEDIATION_RESTRICTED: Lazy<Family<PolicyLabels, Counter>> = Lazy::new(Family::default);

/// Gauge tracking the number of governed machines per health check
pub static EXPECTED_MACHINES: Lazy<Family<PolicyLabels, Gauge<i64, AtomicI64>>> =
    Lazy::new(Family::default);

/// Gauge tracking the number of currently-healthy machines per health check
pub static CURRENT_HEALTHY: Lazy<Family<PolicyLabels, Gauge<i64, AtomicI64>>> =
    Lazy::new(Family::default);

/// Global metrics registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let mut registry = Registry::default();
    registry.register(
        "fleet_health_reconciliations",
        "Reconciliation passes per MachineHealthCheck",
        RECONCILIATIONS.clone(),
    );
    registry.register(
        "fleet_health_remediations_signaled",
        "Machines marked for remediation",
        REMEDIATIONS_SIGNALED.clone(),
    );
    registry.register(
        "fleet_health_remediation_restricted",
        "Passes in which the maxUnhealthy bound withheld remediation",
        REMEDIATION_RESTRICTED.clone(),
    );
    registry.register(
        "fleet_health_expected_machines",
        "Machines governed by the MachineHealthCheck",
        EXPECTED_MACHINES.clone(),
    );
    registry.register(
        "fleet_health_current_healthy",
        "Governed machines currently classified healthy",
        CURRENT_HEALTHY.clone(),
    );
    registry
});

/// Record the fleet counts observed by one reconciliation pass
pub fn observe_pass(namespace: &str, name: &str, expected: i32, healthy: i32) {
    let labels = PolicyLabels {
        namespace: namespace.to_string(),
        name: name.to_string(),
    };
    RECONCILIATIONS.get_or_create(&labels).inc();
    EXPECTED_MACHINES
        .get_or_create(&labels)
        .set(i64::from(expected));
    CURRENT_HEALTHY
        .get_or_create(&labels)
        .set(i64::from(healthy));
}

/// Record one machine marked for remediation
pub fn observe_remediation(namespace: &str, name: &str) {
    REMEDIATIONS_SIGNALED
        .get_or_create(&PolicyLabels {
            namespace: namespace.to_string(),
            name: name.to_string(),
        })
        .inc();
}

/// Record one pass denied by the circuit breaker
pub fn observe_restricted(namespace: &str, name: &str) {
    REMEDIATION_RESTRICTED
        .get_or_create(&PolicyLabels {
            namespace: namespace.to_string(),
            name: name.to_string(),
        })
        .inc();
}

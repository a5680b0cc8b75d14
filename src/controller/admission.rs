//! Remediation admission: the circuit breaker
//!
//! Before any unhealthy machine is marked for remediation, the current
//! unhealthy count is checked against the policy's `maxUnhealthy` bound.
//! During a mass outage this short-circuits remediation entirely rather
//! than replacing a large fraction of the fleet at once.

use crate::crd::MaxUnhealthy;

/// Decide whether remediation of unhealthy targets is permitted this cycle.
///
/// The unhealthy count is `expected - current_healthy`, so targets in the
/// pending state (not yet conclusively unhealthy) count against the bound:
/// a fleet that is half pending is treated as cautiously as one that is
/// half unhealthy.
///
/// An unset bound always admits. A bound that cannot be resolved (see
/// [`MaxUnhealthy::resolve`]) denies: a misconfigured policy must fail
/// closed, not trigger mass remediation.
pub fn is_allowed_remediation(
    expected_machines: i32,
    current_healthy: i32,
    max_unhealthy: Option<&MaxUnhealthy>,
) -> bool {
    let Some(max_unhealthy) = max_unhealthy else {
        return true;
    };
    let Some(resolved_max) = max_unhealthy.resolve(expected_machines) else {
        return false;
    };
    let unhealthy = expected_machines - current_healthy;
    unhealthy <= resolved_max
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_bound_always_admits() {
        assert!(is_allowed_remediation(10, 0, None));
    }

    #[test]
    fn test_absolute_bound_boundary() {
        let max = MaxUnhealthy::Count(1);
        // 1 unhealthy of 3: admitted
        assert!(is_allowed_remediation(3, 2, Some(&max)));
        // 2 unhealthy of 3: denied
        assert!(!is_allowed_remediation(3, 1, Some(&max)));
    }

    #[test]
    fn test_percent_bound_uses_floor() {
        // 50% of 3 resolves to 1
        let max = MaxUnhealthy::Percent("50%".to_string());
        assert!(is_allowed_remediation(3, 2, Some(&max)));
        assert!(!is_allowed_remediation(3, 1, Some(&max)));
    }

    #[test]
    fn test_malformed_bound_fails_closed() {
        let max = MaxUnhealthy::Percent("lots".to_string());
        assert!(!is_allowed_remediation(3, 3, Some(&max)));
    }

    #[test]
    fn test_zero_expected_machines() {
        let max = MaxUnhealthy::Percent("40%".to_string());
        assert!(is_allowed_remediation(0, 0, Some(&max)));
    }
}

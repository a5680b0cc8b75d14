//! Central error types for the fleet-health operator
//!
//! Uses `thiserror` for ergonomic, type-safe error handling with
//! automatic `Display` and `Error` trait implementations.

use thiserror::Error;

/// Central error type for the fleet-health operator
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error from kube-rs
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Configuration error (bad flags, malformed spec fields)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Workload cluster is unreachable or its kubeconfig is unusable.
    /// Always treated as transient: the outer scheduler retries.
    #[error("Workload cluster access error: {0}")]
    RemoteClusterError(String),

    /// Several failures from a single reconciliation pass, combined so
    /// the deferred status patch cannot mask the primary error
    #[error("Multiple errors: [{}]", .0.join("; "))]
    Aggregate(Vec<String>),
}

/// Result type alias for operator operations
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Check if this error type should trigger a fast retry
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Error::KubeError(_) | Error::RemoteClusterError(_) | Error::Aggregate(_)
        )
    }

    /// Combine a primary result with a deferred patch result, keeping both
    /// failures visible when both fail.
    pub fn aggregate<T>(primary: Result<T>, deferred: Result<()>) -> Result<T> {
        match (primary, deferred) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(patch_err)) => Err(patch_err),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(patch_err)) => {
                Err(Error::Aggregate(vec![err.to_string(), patch_err.to_string()]))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_keeps_both_errors() {
        let primary: Result<()> = Err(Error::ConfigError("bad spec".to_string()));
        let deferred: Result<()> = Err(Error::ConfigError("patch failed".to_string()));

        match Error::aggregate(primary, deferred) {
            Err(Error::Aggregate(parts)) => {
                assert_eq!(parts.len(), 2);
                assert!(parts[0].contains("bad spec"));
                assert!(parts[1].contains("patch failed"));
            }
            other => panic!("expected aggregate error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_aggregate_passes_through_success() {
        let value = Error::aggregate(Ok(7), Ok(())).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn test_aggregate_surfaces_patch_error_alone() {
        let deferred: Result<()> = Err(Error::ConfigError("patch failed".to_string()));
        assert!(Error::aggregate(Ok(()), deferred).is_err());
    }

    #[test]
    fn test_remote_errors_are_retriable() {
        assert!(Error::RemoteClusterError("unreachable".to_string()).is_retriable());
        assert!(!Error::ConfigError("bad".to_string()).is_retriable());
    }
}

//! Error types for traincrd-kube

use std::fmt;

use thiserror::Error;
use traincrd_core::CoreError;

use crate::managed::ResourceKind;

/// Result type for traincrd-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Errors that can occur while talking to the cluster or building managed resources
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// The job could not be translated or one of its quantities is malformed
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl KubeError {
    /// Check if this is a Kubernetes 404 Not Found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, KubeError::Api(kube::Error::Api(resp)) if resp.code == 404)
    }

    /// Check if this is a conflict error (409)
    pub fn is_conflict(&self) -> bool {
        matches!(self, KubeError::Api(kube::Error::Api(resp)) if resp.code == 409)
    }

    /// Whether repeating the same operation may succeed
    ///
    /// Malformed quantities and requests the API server rejects as invalid or
    /// forbidden fail the same way every time.
    pub fn is_retryable(&self) -> bool {
        match self {
            KubeError::Api(kube::Error::Api(resp)) => !matches!(resp.code, 400 | 401 | 403 | 422),
            KubeError::Api(_) => true,
            KubeError::Core(_) | KubeError::InvalidConfig(_) => false,
        }
    }
}

/// Step of a reconciliation that touched one managed resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Create => write!(f, "create"),
            Operation::Update => write!(f, "update"),
            Operation::Delete => write!(f, "delete"),
        }
    }
}

/// First error of a reconciliation, with the failing step identified
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The resource snapshot could not be translated into a job spec
    #[error("cannot translate training job: {0}")]
    Translate(#[from] CoreError),

    /// A managed resource operation failed
    #[error("failed to {operation} {kind} '{name}' in namespace '{namespace}': {source}")]
    Step {
        operation: Operation,
        kind: ResourceKind,
        name: String,
        namespace: String,
        #[source]
        source: KubeError,
    },
}

impl ReconcileError {
    /// Kind of the managed resource whose step failed
    pub fn kind(&self) -> Option<ResourceKind> {
        match self {
            ReconcileError::Translate(_) => None,
            ReconcileError::Step { kind, .. } => Some(*kind),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            ReconcileError::Translate(_) => false,
            ReconcileError::Step { source, .. } => source.is_retryable(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_error(code: u16) -> KubeError {
        KubeError::Api(kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "boom".to_string(),
            reason: "Test".to_string(),
            code,
        }))
    }

    #[test]
    fn test_status_classification() {
        assert!(api_error(404).is_not_found());
        assert!(!api_error(404).is_conflict());
        assert!(api_error(409).is_conflict());
        assert!(!api_error(500).is_not_found());
    }

    #[test]
    fn test_retryable() {
        assert!(api_error(500).is_retryable());
        assert!(api_error(409).is_retryable());
        assert!(api_error(429).is_retryable());
        assert!(!api_error(422).is_retryable());
        assert!(!api_error(403).is_retryable());

        let quantity = KubeError::Core(CoreError::InvalidQuantity {
            field: "cpu".to_string(),
            value: "x".to_string(),
        });
        assert!(!quantity.is_retryable());
    }

    #[test]
    fn test_step_error_message() {
        let err = ReconcileError::Step {
            operation: Operation::Create,
            kind: ResourceKind::Service,
            name: "alice-nlp".to_string(),
            namespace: "ns1".to_string(),
            source: KubeError::Core(CoreError::InvalidQuantity {
                field: "cpu".to_string(),
                value: "two".to_string(),
            }),
        };

        assert_eq!(err.kind(), Some(ResourceKind::Service));
        assert!(!err.is_retryable());
        insta::assert_snapshot!(
            err.to_string(),
            @"failed to create Service 'alice-nlp' in namespace 'ns1': Invalid quantity for cpu: 'two'"
        );
    }
}

use attrax_core::engine::ResolveError;
use attrax_storage::traits::StorageError;

use crate::policy::PolicyError;

#[derive(Debug, thiserror::Error)]
pub enum PdpError {
    #[error("resolution error: {0}")]
    Resolve(#[from] ResolveError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("policy error: {0}")]
    Policy(#[from] PolicyError),
}

impl PdpError {
    /// Data-integrity and resource-bound failures are client errors: the
    /// input violates an invariant and retrying unchanged cannot help.
    pub fn is_client_error(&self) -> bool {
        match self {
            PdpError::Resolve(ResolveError::Storage(_)) => false,
            PdpError::Resolve(_) => true,
            PdpError::Storage(StorageError::Internal(_)) => false,
            PdpError::Storage(_) => true,
            PdpError::Policy(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attrax_core::entity::EntityKind;

    #[test]
    fn pdp_error_from_resolve_error() {
        let err: PdpError = ResolveError::TraversalLimitExceeded {
            gathered: 300,
            limit: 256,
        }
        .into();

        assert!(
            err.to_string().contains("256"),
            "expected limit in message, got: {err}"
        );
        assert!(err.is_client_error());
    }

    #[test]
    fn pdp_error_from_storage_error() {
        let err: PdpError = StorageError::SelfReference {
            kind: EntityKind::Subject,
            identifier: "marissa".to_string(),
        }
        .into();

        assert!(
            err.to_string().contains("marissa"),
            "expected identifier in message, got: {err}"
        );
        assert!(err.is_client_error());
    }

    #[test]
    fn internal_failures_are_not_client_errors() {
        let storage: PdpError = StorageError::Internal("connection reset".to_string()).into();
        let policy: PdpError = PolicyError::Store("unavailable".to_string()).into();

        assert!(!storage.is_client_error());
        assert!(!policy.is_client_error());
    }

    #[test]
    fn error_messages_name_the_violated_invariant() {
        let cycle: PdpError = StorageError::CyclicReference {
            kind: EntityKind::Subject,
            identifier: "a".to_string(),
            via: "c".to_string(),
        }
        .into();
        let missing: PdpError = StorageError::ParentNotFound {
            kind: EntityKind::Subject,
            identifier: "mulder".to_string(),
            parent: "ghost".to_string(),
        }
        .into();

        assert!(cycle.to_string().contains("ancestor"));
        assert!(missing.to_string().contains("ghost"));
    }
}

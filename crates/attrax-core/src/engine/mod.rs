mod resolve;

pub use resolve::{AttributeResolver, Resolution};

use std::future::Future;

use crate::entity::{Entity, EntityKind, ZoneId};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("parent '{parent}' of {kind} '{identifier}' not found in zone")]
    ParentNotFound {
        kind: EntityKind,
        identifier: String,
        parent: String,
    },

    #[error("inheritance traversal gathered {gathered} attributes, limit is {limit}")]
    TraversalLimitExceeded { gathered: usize, limit: usize },

    #[error("storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound on the attribute union gathered by one inheritance
    /// resolution. Exceeding it fails the request rather than truncating.
    pub traversal_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            traversal_limit: 256,
        }
    }
}

pub trait EntityReader: Send + Sync {
    fn read_entity(
        &self,
        zone_id: &ZoneId,
        kind: EntityKind,
        identifier: &str,
    ) -> impl Future<Output = Result<Option<Entity>, ResolveError>> + Send;
}

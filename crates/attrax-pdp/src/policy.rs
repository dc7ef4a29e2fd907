use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::Mutex;

use attrax_core::entity::{Attribute, ZoneId};
use attrax_core::policy::Effect;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    #[error("policy store error: {0}")]
    Store(String),
}

/// Identity and version of a policy set. The contents are opaque to this
/// core; the external decision engine interprets them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicySetHandle {
    pub id: String,
    pub version: u64,
}

pub trait PolicyStore: Send + Sync {
    fn policy_set(
        &self,
        zone_id: &ZoneId,
        id: &str,
    ) -> impl Future<Output = Result<Option<PolicySetHandle>, PolicyError>> + Send;

    /// Current version of the policy set, 0 when it does not exist.
    fn policy_set_version(
        &self,
        zone_id: &ZoneId,
        id: &str,
    ) -> impl Future<Output = Result<u64, PolicyError>> + Send;
}

/// Inputs handed to the external Policy Decision Engine. Attributes are
/// already resolved through the hierarchy and merged with the request's
/// supplemental attributes.
#[derive(Debug, Clone)]
pub struct EvaluationContext {
    pub zone_id: ZoneId,
    pub subject_identifier: String,
    pub subject_attributes: BTreeSet<Attribute>,
    pub resource_identifier: String,
    pub resource_attributes: BTreeSet<Attribute>,
    pub action: String,
    pub policy_set: PolicySetHandle,
}

/// The external evaluation engine. Implementations fold their internal
/// failures into `Effect::Indeterminate`; the orchestrator never sees an
/// engine error.
pub trait DecisionEngine: Send + Sync {
    fn evaluate(&self, context: &EvaluationContext) -> impl Future<Output = Effect> + Send;
}

/// In-process policy store: version-bumping upserts keyed by zone and id.
#[derive(Debug, Default)]
pub struct InMemoryPolicyStore {
    sets: Mutex<HashMap<(ZoneId, String), u64>>,
}

impl InMemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates or replaces the policy set, returning its new version.
    pub fn put_policy_set(&self, zone_id: &ZoneId, id: &str) -> u64 {
        let mut sets = self.sets.lock().unwrap();
        let version = sets
            .entry((*zone_id, id.to_string()))
            .and_modify(|v| *v += 1)
            .or_insert(1);
        *version
    }

    pub fn delete_policy_set(&self, zone_id: &ZoneId, id: &str) -> bool {
        self.sets
            .lock()
            .unwrap()
            .remove(&(*zone_id, id.to_string()))
            .is_some()
    }
}

impl PolicyStore for InMemoryPolicyStore {
    async fn policy_set(
        &self,
        zone_id: &ZoneId,
        id: &str,
    ) -> Result<Option<PolicySetHandle>, PolicyError> {
        let sets = self.sets.lock().unwrap();
        Ok(sets
            .get(&(*zone_id, id.to_string()))
            .map(|version| PolicySetHandle {
                id: id.to_string(),
                version: *version,
            }))
    }

    async fn policy_set_version(&self, zone_id: &ZoneId, id: &str) -> Result<u64, PolicyError> {
        let sets = self.sets.lock().unwrap();
        Ok(*sets.get(&(*zone_id, id.to_string())).unwrap_or(&0))
    }
}

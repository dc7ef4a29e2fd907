mod decision;

pub use decision::{CacheConfig, DecisionCache};

use std::collections::BTreeSet;
use std::future::Future;

use crate::entity::{Attribute, EntityKind, ZoneId};

/// Identity of a cached decision. Policy-set order is significant: the
/// same sets requested in a different order combine differently and must
/// not share an entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DecisionKey {
    pub zone_id: ZoneId,
    pub subject_identifier: String,
    pub resource_identifier: String,
    pub action: String,
    pub policy_set_ids: Vec<String>,
    pub supplemental_subject_attributes: BTreeSet<Attribute>,
    pub supplemental_resource_attributes: BTreeSet<Attribute>,
}

/// One fact a cached decision depended on, pinned at the version observed
/// during evaluation. `version` 0 records that the dependency did not
/// exist at the time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Dependency {
    Entity {
        kind: EntityKind,
        zone_id: ZoneId,
        identifier: String,
        version: u64,
    },
    PolicySet {
        zone_id: ZoneId,
        id: String,
        version: u64,
    },
}

impl Dependency {
    pub fn version(&self) -> u64 {
        match self {
            Dependency::Entity { version, .. } | Dependency::PolicySet { version, .. } => *version,
        }
    }

    pub fn unversioned(&self) -> DependencyRef {
        match self {
            Dependency::Entity {
                kind,
                zone_id,
                identifier,
                ..
            } => DependencyRef::Entity {
                kind: *kind,
                zone_id: *zone_id,
                identifier: identifier.clone(),
            },
            Dependency::PolicySet { zone_id, id, .. } => DependencyRef::PolicySet {
                zone_id: *zone_id,
                id: id.clone(),
            },
        }
    }
}

/// A dependency stripped of its version: the inverted-index key used to
/// find every cache entry that must go when the dependency changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DependencyRef {
    Entity {
        kind: EntityKind,
        zone_id: ZoneId,
        identifier: String,
    },
    PolicySet {
        zone_id: ZoneId,
        id: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("dependency version lookup failed: {0}")]
pub struct VersionLookupError(pub String);

/// Source of current dependency versions, consulted on every cache lookup
/// to revalidate fingerprints. Returns 0 for identifiers that do not
/// exist.
pub trait VersionReader: Send + Sync {
    fn current_version(
        &self,
        dependency: &DependencyRef,
    ) -> impl Future<Output = Result<u64, VersionLookupError>> + Send;
}

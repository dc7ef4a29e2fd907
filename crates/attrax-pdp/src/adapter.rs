use std::sync::Arc;

use attrax_core::cache::{DependencyRef, VersionLookupError, VersionReader};
use attrax_core::engine::{EntityReader, ResolveError};
use attrax_core::entity::{Entity, EntityKind, ZoneId};
use attrax_storage::traits::{EntityStore, ZoneStoreFactory};

use crate::policy::PolicyStore;

/// Bridges the zone-partitioned store factory to the resolver's
/// `EntityReader`.
pub struct StoreEntityReader<F: ZoneStoreFactory> {
    factory: Arc<F>,
}

impl<F: ZoneStoreFactory> StoreEntityReader<F> {
    pub fn new(factory: Arc<F>) -> Self {
        Self { factory }
    }
}

impl<F: ZoneStoreFactory> EntityReader for StoreEntityReader<F> {
    async fn read_entity(
        &self,
        zone_id: &ZoneId,
        kind: EntityKind,
        identifier: &str,
    ) -> Result<Option<Entity>, ResolveError> {
        self.factory
            .for_zone(zone_id)
            .get(kind, identifier)
            .await
            .map_err(|e| ResolveError::Storage(e.to_string()))
    }
}

/// Bridges entity and policy-set version lookups to the decision cache's
/// `VersionReader`, which revalidates fingerprints on every lookup.
pub struct GraphVersionReader<F: ZoneStoreFactory, P: PolicyStore> {
    factory: Arc<F>,
    policies: Arc<P>,
}

impl<F: ZoneStoreFactory, P: PolicyStore> GraphVersionReader<F, P> {
    pub fn new(factory: Arc<F>, policies: Arc<P>) -> Self {
        Self { factory, policies }
    }
}

impl<F: ZoneStoreFactory, P: PolicyStore> VersionReader for GraphVersionReader<F, P> {
    async fn current_version(
        &self,
        dependency: &DependencyRef,
    ) -> Result<u64, VersionLookupError> {
        match dependency {
            DependencyRef::Entity {
                kind,
                zone_id,
                identifier,
            } => self
                .factory
                .for_zone(zone_id)
                .current_version(*kind, identifier)
                .await
                .map_err(|e| VersionLookupError(e.to_string())),
            DependencyRef::PolicySet { zone_id, id } => self
                .policies
                .policy_set_version(zone_id, id)
                .await
                .map_err(|e| VersionLookupError(e.to_string())),
        }
    }
}

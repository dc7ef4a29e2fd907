use std::collections::HashSet;
use std::future::Future;

use attrax_core::entity::{Entity, EntityKind, ZoneId};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("{kind} '{identifier}' lists itself as a parent")]
    SelfReference {
        kind: EntityKind,
        identifier: String,
    },

    #[error("{kind} '{identifier}' would become its own ancestor via '{via}'")]
    CyclicReference {
        kind: EntityKind,
        identifier: String,
        via: String,
    },

    #[error("parent {kind} '{parent}' of '{identifier}' does not exist in zone")]
    ParentNotFound {
        kind: EntityKind,
        identifier: String,
        parent: String,
    },

    #[error("{kind} '{identifier}' already exists in zone")]
    DuplicateIdentifier {
        kind: EntityKind,
        identifier: String,
    },

    #[error("entity belongs to zone {entity_zone}, store is scoped to {store_zone}")]
    ZoneMismatch {
        entity_zone: ZoneId,
        store_zone: ZoneId,
    },

    #[error("internal storage error: {0}")]
    Internal(String),
}

/// Zone-scoped graph store of Subject and Resource vertices with parent
/// edges. Mutations are atomic: validation failures leave the store
/// untouched, and each successful update bumps the entity version by one.
pub trait EntityStore: Send + Sync {
    /// Inserts a new entity at version 1. Fails with
    /// `DuplicateIdentifier` when the identifier is already taken for the
    /// kind.
    fn create(&self, entity: &Entity) -> impl Future<Output = Result<Entity, StorageError>> + Send;

    /// Creates the entity if absent, otherwise replaces its attributes and
    /// all outgoing parent edges and increments its version.
    fn upsert(&self, entity: &Entity) -> impl Future<Output = Result<Entity, StorageError>> + Send;

    /// Returns the entity with only its directly-owned attributes.
    fn get(
        &self,
        kind: EntityKind,
        identifier: &str,
    ) -> impl Future<Output = Result<Option<Entity>, StorageError>> + Send;

    /// Removes the entity. Dangling parent references held by other
    /// entities are tolerated here and surface at resolution time.
    fn delete(
        &self,
        kind: EntityKind,
        identifier: &str,
    ) -> impl Future<Output = Result<bool, StorageError>> + Send;

    /// Removes every entity in the zone.
    fn delete_all(&self) -> impl Future<Output = Result<(), StorageError>> + Send;

    fn identifiers(
        &self,
        kind: EntityKind,
    ) -> impl Future<Output = Result<Vec<String>, StorageError>> + Send;

    /// Current version of the entity, 0 when it does not exist.
    fn current_version(
        &self,
        kind: EntityKind,
        identifier: &str,
    ) -> impl Future<Output = Result<u64, StorageError>> + Send;

    /// Every identifier from which `identifier` is reachable over parent
    /// edges: the invalidation scope of a change to it. Always contains
    /// `identifier` itself, and works off edges alone so that children
    /// holding dangling references to a not-yet-created parent are found.
    fn descendant_identifiers(
        &self,
        kind: EntityKind,
        identifier: &str,
    ) -> impl Future<Output = Result<HashSet<String>, StorageError>> + Send;
}

pub trait ZoneStoreFactory: Send + Sync {
    type Store: EntityStore;

    fn for_zone(&self, zone_id: &ZoneId) -> Self::Store;

    /// Zones that currently hold data; drives migration rollback.
    fn zones(&self) -> Vec<ZoneId>;
}

/// Persisted marker gating the one-shot flat-store migration.
pub trait MigrationStateStore: Send + Sync {
    fn migration_version(&self) -> impl Future<Output = Result<Option<u64>, StorageError>> + Send;

    fn set_migration_version(
        &self,
        version: u64,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    fn clear_migration_version(&self) -> impl Future<Output = Result<(), StorageError>> + Send;
}

/// Read side of the legacy flat entity store consumed by migration.
/// Pages are ordered by the flat store's own id, so repeated reads cover
/// every row exactly once. Never mutated.
pub trait FlatEntityStore: Send + Sync {
    fn read_page(
        &self,
        kind: EntityKind,
        offset: usize,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<Entity>, StorageError>> + Send;
}

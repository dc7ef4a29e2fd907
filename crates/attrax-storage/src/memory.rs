use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use attrax_core::entity::{Attribute, Entity, EntityKind, Parent, ZoneId};
use uuid::Uuid;

use crate::traits::{EntityStore, MigrationStateStore, StorageError, ZoneStoreFactory};

#[derive(Debug, Clone)]
struct StoredEntity {
    id: Uuid,
    attributes: BTreeSet<Attribute>,
    parents: Vec<Parent>,
    version: u64,
}

#[derive(Debug, Default)]
struct ZoneState {
    entities: HashMap<(EntityKind, String), StoredEntity>,
}

impl ZoneState {
    fn contains(&self, kind: EntityKind, identifier: &str) -> bool {
        self.entities
            .contains_key(&(kind, identifier.to_string()))
    }

    /// Rejects self-referencing edges and edges to parents missing from
    /// the zone. Runs before any mutation.
    fn validate_parents(
        &self,
        kind: EntityKind,
        identifier: &str,
        parents: &[Parent],
    ) -> Result<(), StorageError> {
        for parent in parents {
            if parent.identifier == identifier {
                return Err(StorageError::SelfReference {
                    kind,
                    identifier: identifier.to_string(),
                });
            }
        }
        for parent in parents {
            if !self.contains(kind, &parent.identifier) {
                return Err(StorageError::ParentNotFound {
                    kind,
                    identifier: identifier.to_string(),
                    parent: parent.identifier.clone(),
                });
            }
        }
        Ok(())
    }

    /// Walks the ancestor closure of each proposed parent over committed
    /// edges. If `identifier` shows up, the write would close a cycle.
    /// Ancestors missing mid-walk are skipped; dangling references are a
    /// resolution-time concern.
    fn validate_acyclic(
        &self,
        kind: EntityKind,
        identifier: &str,
        parents: &[Parent],
    ) -> Result<(), StorageError> {
        for direct in parents {
            let mut visited: HashSet<String> = HashSet::new();
            let mut frontier: VecDeque<String> = VecDeque::new();
            frontier.push_back(direct.identifier.clone());

            while let Some(current) = frontier.pop_front() {
                if current == identifier {
                    return Err(StorageError::CyclicReference {
                        kind,
                        identifier: identifier.to_string(),
                        via: direct.identifier.clone(),
                    });
                }
                if !visited.insert(current.clone()) {
                    continue;
                }
                if let Some(stored) = self.entities.get(&(kind, current)) {
                    for parent in &stored.parents {
                        frontier.push_back(parent.identifier.clone());
                    }
                }
            }
        }
        Ok(())
    }
}

/// In-memory zone-scoped graph store. Clones handed out by the factory
/// share one state; the whole-store mutex is the transaction boundary, so
/// validation, edge replacement and the version bump of a single mutation
/// are atomic and same-entity writes are serialized.
#[derive(Debug, Clone)]
pub struct InMemoryGraphStore {
    zone_id: ZoneId,
    state: Arc<Mutex<ZoneState>>,
}

impl InMemoryGraphStore {
    pub fn new(zone_id: ZoneId) -> Self {
        Self {
            zone_id,
            state: Arc::new(Mutex::new(ZoneState::default())),
        }
    }

    pub fn zone_id(&self) -> &ZoneId {
        &self.zone_id
    }

    fn check_zone(&self, entity: &Entity) -> Result<(), StorageError> {
        if entity.zone_id != self.zone_id {
            return Err(StorageError::ZoneMismatch {
                entity_zone: entity.zone_id,
                store_zone: self.zone_id,
            });
        }
        Ok(())
    }

    fn to_entity(&self, kind: EntityKind, identifier: &str, stored: &StoredEntity) -> Entity {
        Entity {
            id: Some(stored.id),
            zone_id: self.zone_id,
            kind,
            identifier: identifier.to_string(),
            attributes: stored.attributes.clone(),
            parents: stored.parents.clone(),
            version: stored.version,
        }
    }
}

impl EntityStore for InMemoryGraphStore {
    async fn create(&self, entity: &Entity) -> Result<Entity, StorageError> {
        self.check_zone(entity)?;
        let mut state = self.state.lock().unwrap();

        if state.contains(entity.kind, &entity.identifier) {
            return Err(StorageError::DuplicateIdentifier {
                kind: entity.kind,
                identifier: entity.identifier.clone(),
            });
        }
        state.validate_parents(entity.kind, &entity.identifier, &entity.parents)?;
        state.validate_acyclic(entity.kind, &entity.identifier, &entity.parents)?;

        let stored = StoredEntity {
            id: Uuid::new_v4(),
            attributes: entity.attributes.clone(),
            parents: entity.parents.clone(),
            version: 1,
        };
        let created = self.to_entity(entity.kind, &entity.identifier, &stored);
        state
            .entities
            .insert((entity.kind, entity.identifier.clone()), stored);
        Ok(created)
    }

    async fn upsert(&self, entity: &Entity) -> Result<Entity, StorageError> {
        self.check_zone(entity)?;
        let mut state = self.state.lock().unwrap();

        state.validate_parents(entity.kind, &entity.identifier, &entity.parents)?;
        state.validate_acyclic(entity.kind, &entity.identifier, &entity.parents)?;

        let key = (entity.kind, entity.identifier.clone());
        let stored = match state.entities.get(&key) {
            Some(existing) => StoredEntity {
                id: existing.id,
                attributes: entity.attributes.clone(),
                parents: entity.parents.clone(),
                version: existing.version + 1,
            },
            None => StoredEntity {
                id: Uuid::new_v4(),
                attributes: entity.attributes.clone(),
                parents: entity.parents.clone(),
                version: 1,
            },
        };
        let result = self.to_entity(entity.kind, &entity.identifier, &stored);
        state.entities.insert(key, stored);
        Ok(result)
    }

    async fn get(
        &self,
        kind: EntityKind,
        identifier: &str,
    ) -> Result<Option<Entity>, StorageError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .entities
            .get(&(kind, identifier.to_string()))
            .map(|stored| self.to_entity(kind, identifier, stored)))
    }

    async fn delete(&self, kind: EntityKind, identifier: &str) -> Result<bool, StorageError> {
        let mut state = self.state.lock().unwrap();
        Ok(state
            .entities
            .remove(&(kind, identifier.to_string()))
            .is_some())
    }

    async fn delete_all(&self) -> Result<(), StorageError> {
        let mut state = self.state.lock().unwrap();
        state.entities.clear();
        Ok(())
    }

    async fn identifiers(&self, kind: EntityKind) -> Result<Vec<String>, StorageError> {
        let state = self.state.lock().unwrap();
        let mut identifiers: Vec<String> = state
            .entities
            .keys()
            .filter(|(k, _)| *k == kind)
            .map(|(_, identifier)| identifier.clone())
            .collect();
        identifiers.sort();
        Ok(identifiers)
    }

    async fn current_version(
        &self,
        kind: EntityKind,
        identifier: &str,
    ) -> Result<u64, StorageError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .entities
            .get(&(kind, identifier.to_string()))
            .map_or(0, |stored| stored.version))
    }

    async fn descendant_identifiers(
        &self,
        kind: EntityKind,
        identifier: &str,
    ) -> Result<HashSet<String>, StorageError> {
        let state = self.state.lock().unwrap();

        let mut descendants: HashSet<String> = HashSet::new();
        descendants.insert(identifier.to_string());
        let mut frontier: VecDeque<String> = VecDeque::new();
        frontier.push_back(identifier.to_string());

        while let Some(current) = frontier.pop_front() {
            for ((k, child), stored) in &state.entities {
                if *k != kind || descendants.contains(child) {
                    continue;
                }
                // Scoped edges count too: invalidation scope is
                // conservative over all possible caller scopes.
                if stored.parents.iter().any(|p| p.identifier == current) {
                    descendants.insert(child.clone());
                    frontier.push_back(child.clone());
                }
            }
        }

        Ok(descendants)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryGraphFactory {
    zones: Mutex<HashMap<ZoneId, InMemoryGraphStore>>,
    migration_version: Mutex<Option<u64>>,
}

impl InMemoryGraphFactory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ZoneStoreFactory for InMemoryGraphFactory {
    type Store = InMemoryGraphStore;

    fn for_zone(&self, zone_id: &ZoneId) -> InMemoryGraphStore {
        let mut zones = self.zones.lock().unwrap();
        zones
            .entry(*zone_id)
            .or_insert_with(|| InMemoryGraphStore::new(*zone_id))
            .clone()
    }

    fn zones(&self) -> Vec<ZoneId> {
        self.zones.lock().unwrap().keys().copied().collect()
    }
}

impl MigrationStateStore for InMemoryGraphFactory {
    async fn migration_version(&self) -> Result<Option<u64>, StorageError> {
        Ok(*self.migration_version.lock().unwrap())
    }

    async fn set_migration_version(&self, version: u64) -> Result<(), StorageError> {
        *self.migration_version.lock().unwrap() = Some(version);
        Ok(())
    }

    async fn clear_migration_version(&self) -> Result<(), StorageError> {
        *self.migration_version.lock().unwrap() = None;
        Ok(())
    }
}

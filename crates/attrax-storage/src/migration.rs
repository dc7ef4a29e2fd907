use std::sync::{Arc, Mutex};

use attrax_core::entity::{Entity, EntityKind};

use crate::traits::{
    EntityStore, FlatEntityStore, MigrationStateStore, StorageError, ZoneStoreFactory,
};

/// Marker value persisted once the flat-store copy has completed. Bump
/// only if a future deployment needs to re-run the copy against a changed
/// graph layout.
pub const MIGRATION_VERSION: u64 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub migrated: usize,
    pub pages: usize,
    pub skipped: bool,
}

/// One-shot bulk copy from the legacy flat entity store into the graph
/// store. Page-based because the flat store can exceed memory; marker-
/// gated so re-running after completion is a no-op; `rollback` restores
/// the graph to empty so a partial run can be retried from scratch.
pub struct MigrationManager<F, G, M> {
    flat: Arc<F>,
    graph: Arc<G>,
    marker: Arc<M>,
    page_size: usize,
}

impl<F, G, M> MigrationManager<F, G, M>
where
    F: FlatEntityStore,
    G: ZoneStoreFactory,
    M: MigrationStateStore,
{
    pub fn new(flat: Arc<F>, graph: Arc<G>, marker: Arc<M>, page_size: usize) -> Self {
        Self {
            flat,
            graph,
            marker,
            page_size,
        }
    }

    pub async fn migrate(&self) -> Result<MigrationReport, StorageError> {
        if let Some(version) = self.marker.migration_version().await?
            && version >= MIGRATION_VERSION
        {
            tracing::info!(version, "entity migration already applied, skipping");
            return Ok(MigrationReport {
                migrated: 0,
                pages: 0,
                skipped: true,
            });
        }

        let mut migrated = 0;
        let mut pages = 0;
        for kind in [EntityKind::Subject, EntityKind::Resource] {
            let mut offset = 0;
            loop {
                let page = self.flat.read_page(kind, offset, self.page_size).await?;
                if page.is_empty() {
                    break;
                }
                let count = page.len();
                for mut entity in page {
                    // The graph store assigns its own surrogate ids and
                    // versions; flat-store values must not leak through.
                    entity.id = None;
                    entity.version = 0;
                    let store = self.graph.for_zone(&entity.zone_id);
                    store.upsert(&entity).await?;
                }
                migrated += count;
                pages += 1;
                tracing::info!(%kind, offset, count, "migrated entity page");
                offset += count;
                if count < self.page_size {
                    break;
                }
            }
        }

        self.marker.set_migration_version(MIGRATION_VERSION).await?;
        tracing::info!(migrated, pages, "entity migration complete");

        Ok(MigrationReport {
            migrated,
            pages,
            skipped: false,
        })
    }

    /// Deletes all migrated data and clears the marker so `migrate` can be
    /// re-run from empty. The flat store is left untouched.
    pub async fn rollback(&self) -> Result<(), StorageError> {
        for zone_id in self.graph.zones() {
            self.graph.for_zone(&zone_id).delete_all().await?;
        }
        self.marker.clear_migration_version().await?;
        tracing::info!("entity migration rolled back");
        Ok(())
    }
}

/// Flat legacy store double: rows in insertion order stand in for the
/// flat store's id ordering.
#[derive(Debug, Default)]
pub struct InMemoryFlatStore {
    rows: Mutex<Vec<Entity>>,
}

impl InMemoryFlatStore {
    pub fn new(rows: Vec<Entity>) -> Self {
        Self {
            rows: Mutex::new(rows),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FlatEntityStore for InMemoryFlatStore {
    async fn read_page(
        &self,
        kind: EntityKind,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Entity>, StorageError> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .filter(|e| e.kind == kind)
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }
}

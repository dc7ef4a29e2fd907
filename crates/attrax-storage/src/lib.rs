pub mod memory;
pub mod migration;
pub mod traits;

pub use memory::{InMemoryGraphFactory, InMemoryGraphStore};
pub use migration::{InMemoryFlatStore, MIGRATION_VERSION, MigrationManager, MigrationReport};
pub use traits::{
    EntityStore, FlatEntityStore, MigrationStateStore, StorageError, ZoneStoreFactory,
};

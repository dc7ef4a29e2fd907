pub mod cache;
pub mod engine;
pub mod entity;
pub mod policy;

pub use cache::{
    CacheConfig, DecisionCache, DecisionKey, Dependency, DependencyRef, VersionLookupError,
    VersionReader,
};
pub use engine::{AttributeResolver, EngineConfig, EntityReader, Resolution, ResolveError};
pub use entity::{ABSENT_VERSION, Attribute, Entity, EntityKind, Parent, ZoneId};
pub use policy::{Effect, combine_effects};

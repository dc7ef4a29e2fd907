use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::Arc;

use crate::entity::{ABSENT_VERSION, Attribute, EntityKind, ZoneId};

use super::{EngineConfig, EntityReader, ResolveError};

/// Result of one inheritance resolution: the attribute union and every
/// `(identifier, version)` the traversal actually touched. The dependency
/// list always contains the root, at `ABSENT_VERSION` when it does not
/// exist, so a decision computed against a missing entity still carries an
/// invalidatable fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub attributes: BTreeSet<Attribute>,
    pub dependencies: Vec<(String, u64)>,
}

impl Resolution {
    pub fn exists(&self) -> bool {
        self.dependencies
            .first()
            .is_some_and(|(_, version)| *version != ABSENT_VERSION)
    }
}

pub struct AttributeResolver<R: EntityReader> {
    reader: Arc<R>,
    config: EngineConfig,
}

impl<R: EntityReader> AttributeResolver<R> {
    pub fn new(reader: Arc<R>, config: EngineConfig) -> Self {
        Self { reader, config }
    }

    /// Gathers the union of the entity's own attributes and every attribute
    /// reachable over unconditional parent edges or edges whose scope
    /// matches `caller_scopes`. Each identifier is visited at most once;
    /// write-time validation keeps the graph acyclic, but the visited set
    /// makes the walk terminate even on a corrupted store.
    pub async fn resolve(
        &self,
        zone_id: &ZoneId,
        kind: EntityKind,
        identifier: &str,
        caller_scopes: &BTreeSet<Attribute>,
    ) -> Result<Resolution, ResolveError> {
        let root = self.reader.read_entity(zone_id, kind, identifier).await?;

        let Some(root) = root else {
            return Ok(Resolution {
                attributes: BTreeSet::new(),
                dependencies: vec![(identifier.to_string(), ABSENT_VERSION)],
            });
        };

        let mut attributes = BTreeSet::new();
        let mut dependencies = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut frontier = VecDeque::new();

        visited.insert(root.identifier.clone());
        frontier.push_back(root);

        while let Some(entity) = frontier.pop_front() {
            attributes.extend(entity.attributes.iter().cloned());
            if attributes.len() > self.config.traversal_limit {
                return Err(ResolveError::TraversalLimitExceeded {
                    gathered: attributes.len(),
                    limit: self.config.traversal_limit,
                });
            }
            dependencies.push((entity.identifier.clone(), entity.version));

            for parent in &entity.parents {
                if !parent.qualifies(caller_scopes) || visited.contains(&parent.identifier) {
                    continue;
                }
                let ancestor = self
                    .reader
                    .read_entity(zone_id, kind, &parent.identifier)
                    .await?
                    .ok_or_else(|| ResolveError::ParentNotFound {
                        kind,
                        identifier: entity.identifier.clone(),
                        parent: parent.identifier.clone(),
                    })?;
                visited.insert(ancestor.identifier.clone());
                frontier.push_back(ancestor);
            }
        }

        Ok(Resolution {
            attributes,
            dependencies,
        })
    }
}

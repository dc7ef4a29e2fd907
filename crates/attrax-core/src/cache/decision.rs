use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use crate::entity::ZoneId;
use crate::policy::Effect;

use super::{DecisionKey, Dependency, DependencyRef, VersionReader};

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Capacity bound, enforced FIFO. Eviction order is a resource
    /// concern; correctness rests on fingerprint revalidation alone.
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { max_entries: 10_000 }
    }
}

#[derive(Debug, Clone)]
struct CachedDecision {
    effect: Effect,
    fingerprint: Vec<Dependency>,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<DecisionKey, CachedDecision>,
    by_dependency: HashMap<DependencyRef, HashSet<DecisionKey>>,
    insertion_order: VecDeque<DecisionKey>,
}

impl CacheState {
    fn remove(&mut self, key: &DecisionKey) -> Option<CachedDecision> {
        let entry = self.entries.remove(key)?;
        for dependency in &entry.fingerprint {
            let dep_ref = dependency.unversioned();
            if let Some(keys) = self.by_dependency.get_mut(&dep_ref) {
                keys.remove(key);
                if keys.is_empty() {
                    self.by_dependency.remove(&dep_ref);
                }
            }
        }
        self.insertion_order.retain(|k| k != key);
        Some(entry)
    }

    fn insert(&mut self, key: DecisionKey, entry: CachedDecision) {
        self.remove(&key);
        for dependency in &entry.fingerprint {
            self.by_dependency
                .entry(dependency.unversioned())
                .or_default()
                .insert(key.clone());
        }
        self.insertion_order.push_back(key.clone());
        self.entries.insert(key, entry);
    }
}

/// Keyed store of evaluation outcomes, each carrying the versions of every
/// entity and policy set the decision depended on. A hit requires all of
/// those versions to still be current, so a `store` racing an
/// `invalidate` cannot resurrect pre-change data: the next lookup
/// revalidates and evicts it.
pub struct DecisionCache<V: VersionReader> {
    reader: Arc<V>,
    config: CacheConfig,
    state: Mutex<CacheState>,
}

impl<V: VersionReader> DecisionCache<V> {
    pub fn new(reader: Arc<V>, config: CacheConfig) -> Self {
        Self {
            reader,
            config,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Returns the cached effect when present and still valid. A stale
    /// entry found here is evicted. A version-lookup fault is a forced
    /// miss: the caller recomputes, the entry stays for the next attempt.
    pub async fn lookup(&self, key: &DecisionKey) -> Option<Effect> {
        let (effect, fingerprint) = {
            let state = self.state.lock().unwrap();
            let entry = state.entries.get(key)?;
            (entry.effect, entry.fingerprint.clone())
        };

        for dependency in &fingerprint {
            match self.reader.current_version(&dependency.unversioned()).await {
                Ok(current) if current == dependency.version() => {}
                Ok(_) => {
                    self.state.lock().unwrap().remove(key);
                    return None;
                }
                Err(_) => return None,
            }
        }

        Some(effect)
    }

    pub fn store(&self, key: DecisionKey, effect: Effect, fingerprint: Vec<Dependency>) {
        let mut state = self.state.lock().unwrap();
        state.insert(key, CachedDecision { effect, fingerprint });
        while state.entries.len() > self.config.max_entries {
            let Some(oldest) = state.insertion_order.front().cloned() else {
                break;
            };
            state.remove(&oldest);
        }
    }

    /// Drops every entry whose fingerprint references any of the given
    /// dependencies. Callers pass the changed entity or policy set plus,
    /// for entities, every descendant identifier, since a changed ancestor
    /// changes what descendants inherit.
    pub fn invalidate_dependencies<I>(&self, dependencies: I) -> usize
    where
        I: IntoIterator<Item = DependencyRef>,
    {
        let mut state = self.state.lock().unwrap();
        let mut removed = 0;
        for dep_ref in dependencies {
            let keys: Vec<DecisionKey> = match state.by_dependency.get(&dep_ref) {
                Some(keys) => keys.iter().cloned().collect(),
                None => continue,
            };
            for key in keys {
                if state.remove(&key).is_some() {
                    removed += 1;
                }
            }
        }
        removed
    }

    /// Drops every entry for the zone; used on zone deletion.
    pub fn invalidate_zone(&self, zone_id: &ZoneId) -> usize {
        let mut state = self.state.lock().unwrap();
        let keys: Vec<DecisionKey> = state
            .entries
            .keys()
            .filter(|k| k.zone_id == *zone_id)
            .cloned()
            .collect();
        let removed = keys.len();
        for key in keys {
            state.remove(&key);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

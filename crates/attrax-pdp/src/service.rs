use std::collections::BTreeSet;
use std::sync::Arc;

use attrax_core::cache::{CacheConfig, DecisionCache, DecisionKey, Dependency, DependencyRef};
use attrax_core::engine::{AttributeResolver, EngineConfig, Resolution};
use attrax_core::entity::{ABSENT_VERSION, Attribute, Entity, EntityKind, ZoneId};
use attrax_core::policy::{Effect, combine_effects};
use attrax_storage::traits::{EntityStore, ZoneStoreFactory};

use crate::adapter::{GraphVersionReader, StoreEntityReader};
use crate::error::PdpError;
use crate::policy::{DecisionEngine, EvaluationContext, PolicyStore};

#[derive(Debug, Clone)]
pub struct EvaluationRequest {
    pub zone_id: ZoneId,
    pub subject_identifier: String,
    pub resource_identifier: String,
    pub action: String,
    /// Evaluated in order; the first PERMIT or DENY wins.
    pub policy_set_ids: Vec<String>,
    pub supplemental_subject_attributes: BTreeSet<Attribute>,
    pub supplemental_resource_attributes: BTreeSet<Attribute>,
}

impl EvaluationRequest {
    pub fn new(
        zone_id: ZoneId,
        subject_identifier: impl Into<String>,
        resource_identifier: impl Into<String>,
        action: impl Into<String>,
        policy_set_ids: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            zone_id,
            subject_identifier: subject_identifier.into(),
            resource_identifier: resource_identifier.into(),
            action: action.into(),
            policy_set_ids: policy_set_ids.into_iter().collect(),
            supplemental_subject_attributes: BTreeSet::new(),
            supplemental_resource_attributes: BTreeSet::new(),
        }
    }

    fn decision_key(&self) -> DecisionKey {
        DecisionKey {
            zone_id: self.zone_id,
            subject_identifier: self.subject_identifier.clone(),
            resource_identifier: self.resource_identifier.clone(),
            action: self.action.clone(),
            policy_set_ids: self.policy_set_ids.clone(),
            supplemental_subject_attributes: self.supplemental_subject_attributes.clone(),
            supplemental_resource_attributes: self.supplemental_resource_attributes.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub effect: Effect,
    pub cached: bool,
}

/// Coordination layer over the entity graph store, the decision cache and
/// the external policy machinery: resolves inherited attributes, consults
/// the cache, delegates misses to the decision engine, and keeps the
/// cache honest by invalidating synchronously with every mutation.
pub struct PdpService<F, P, E>
where
    F: ZoneStoreFactory,
    P: PolicyStore,
    E: DecisionEngine,
{
    factory: Arc<F>,
    policies: Arc<P>,
    engine: Arc<E>,
    resolver: AttributeResolver<StoreEntityReader<F>>,
    cache: DecisionCache<GraphVersionReader<F, P>>,
}

impl<F, P, E> PdpService<F, P, E>
where
    F: ZoneStoreFactory,
    P: PolicyStore,
    E: DecisionEngine,
{
    pub fn new(
        factory: Arc<F>,
        policies: Arc<P>,
        engine: Arc<E>,
        engine_config: EngineConfig,
        cache_config: CacheConfig,
    ) -> Self {
        let resolver = AttributeResolver::new(
            Arc::new(StoreEntityReader::new(Arc::clone(&factory))),
            engine_config,
        );
        let cache = DecisionCache::new(
            Arc::new(GraphVersionReader::new(
                Arc::clone(&factory),
                Arc::clone(&policies),
            )),
            cache_config,
        );
        Self {
            factory,
            policies,
            engine,
            resolver,
            cache,
        }
    }

    pub async fn evaluate(&self, request: &EvaluationRequest) -> Result<Decision, PdpError> {
        let key = request.decision_key();

        if let Some(effect) = self.cache.lookup(&key).await {
            tracing::debug!(
                zone_id = %request.zone_id,
                subject = %request.subject_identifier,
                resource = %request.resource_identifier,
                %effect,
                "decision served from cache"
            );
            return Ok(Decision {
                effect,
                cached: true,
            });
        }

        let resource = self
            .resolver
            .resolve(
                &request.zone_id,
                EntityKind::Resource,
                &request.resource_identifier,
                &request.supplemental_resource_attributes,
            )
            .await?;
        let mut resource_attributes = resource.attributes.clone();
        resource_attributes.extend(request.supplemental_resource_attributes.iter().cloned());

        // Subject inheritance is scoped by what is being accessed: the
        // resource's effective attributes gate scoped parent edges.
        let subject = self
            .resolver
            .resolve(
                &request.zone_id,
                EntityKind::Subject,
                &request.subject_identifier,
                &resource_attributes,
            )
            .await?;
        let mut subject_attributes = subject.attributes.clone();
        subject_attributes.extend(request.supplemental_subject_attributes.iter().cloned());

        let mut fingerprint = Vec::new();
        self.record_entity_dependencies(&mut fingerprint, request.zone_id, EntityKind::Subject, &subject);
        self.record_entity_dependencies(&mut fingerprint, request.zone_id, EntityKind::Resource, &resource);

        let mut effects = Vec::with_capacity(request.policy_set_ids.len());
        for policy_set_id in &request.policy_set_ids {
            let handle = self.policies.policy_set(&request.zone_id, policy_set_id).await?;
            let effect = match handle {
                Some(handle) => {
                    fingerprint.push(Dependency::PolicySet {
                        zone_id: request.zone_id,
                        id: handle.id.clone(),
                        version: handle.version,
                    });
                    let context = EvaluationContext {
                        zone_id: request.zone_id,
                        subject_identifier: request.subject_identifier.clone(),
                        subject_attributes: subject_attributes.clone(),
                        resource_identifier: request.resource_identifier.clone(),
                        resource_attributes: resource_attributes.clone(),
                        action: request.action.clone(),
                        policy_set: handle,
                    };
                    self.engine.evaluate(&context).await
                }
                None => {
                    // A policy set named in the request but absent from the
                    // store: consulted as INDETERMINATE and fingerprinted at
                    // the sentinel so its later creation invalidates.
                    fingerprint.push(Dependency::PolicySet {
                        zone_id: request.zone_id,
                        id: policy_set_id.clone(),
                        version: ABSENT_VERSION,
                    });
                    Effect::Indeterminate
                }
            };
            let decisive = effect.is_decisive();
            effects.push(effect);
            if decisive {
                break;
            }
        }

        let effect = combine_effects(effects);
        self.cache.store(key, effect, fingerprint);

        tracing::debug!(
            zone_id = %request.zone_id,
            subject = %request.subject_identifier,
            resource = %request.resource_identifier,
            %effect,
            "decision evaluated"
        );

        Ok(Decision {
            effect,
            cached: false,
        })
    }

    /// Returns the entity with only its directly-owned attributes.
    pub async fn get_entity(
        &self,
        zone_id: &ZoneId,
        kind: EntityKind,
        identifier: &str,
    ) -> Result<Option<Entity>, PdpError> {
        Ok(self.factory.for_zone(zone_id).get(kind, identifier).await?)
    }

    /// Returns the entity's inherited attribute union for the given caller
    /// scopes.
    pub async fn resolve_entity(
        &self,
        zone_id: &ZoneId,
        kind: EntityKind,
        identifier: &str,
        caller_scopes: &BTreeSet<Attribute>,
    ) -> Result<Resolution, PdpError> {
        Ok(self
            .resolver
            .resolve(zone_id, kind, identifier, caller_scopes)
            .await?)
    }

    pub async fn create_entity(&self, entity: &Entity) -> Result<Entity, PdpError> {
        let store = self.factory.for_zone(&entity.zone_id);
        let created = store.create(entity).await?;
        self.invalidate_entity(&store, &created).await?;
        Ok(created)
    }

    pub async fn put_entity(&self, entity: &Entity) -> Result<Entity, PdpError> {
        let store = self.factory.for_zone(&entity.zone_id);
        let stored = store.upsert(entity).await?;
        self.invalidate_entity(&store, &stored).await?;
        Ok(stored)
    }

    pub async fn delete_entity(
        &self,
        zone_id: &ZoneId,
        kind: EntityKind,
        identifier: &str,
    ) -> Result<bool, PdpError> {
        let store = self.factory.for_zone(zone_id);
        let removed = store.delete(kind, identifier).await?;
        if removed {
            let descendants = store.descendant_identifiers(kind, identifier).await?;
            self.invalidate_identifiers(*zone_id, kind, descendants);
        }
        Ok(removed)
    }

    /// Invalidation hook for policy-set mutations, called by the policy
    /// write path in the same logical request as the write.
    pub fn notify_policy_set_changed(&self, zone_id: &ZoneId, id: &str) {
        let removed = self.cache.invalidate_dependencies([DependencyRef::PolicySet {
            zone_id: *zone_id,
            id: id.to_string(),
        }]);
        tracing::debug!(%zone_id, policy_set = id, removed, "cache invalidated for policy set change");
    }

    /// Removes the zone's entities and every cached decision for it.
    pub async fn delete_zone(&self, zone_id: &ZoneId) -> Result<(), PdpError> {
        self.factory.for_zone(zone_id).delete_all().await?;
        let removed = self.cache.invalidate_zone(zone_id);
        tracing::info!(%zone_id, removed, "zone deleted");
        Ok(())
    }

    pub fn cached_decisions(&self) -> usize {
        self.cache.len()
    }

    fn record_entity_dependencies(
        &self,
        fingerprint: &mut Vec<Dependency>,
        zone_id: ZoneId,
        kind: EntityKind,
        resolution: &Resolution,
    ) {
        for (identifier, version) in &resolution.dependencies {
            fingerprint.push(Dependency::Entity {
                kind,
                zone_id,
                identifier: identifier.clone(),
                version: *version,
            });
        }
    }

    async fn invalidate_entity(
        &self,
        store: &F::Store,
        entity: &Entity,
    ) -> Result<(), PdpError> {
        let descendants = store
            .descendant_identifiers(entity.kind, &entity.identifier)
            .await?;
        self.invalidate_identifiers(entity.zone_id, entity.kind, descendants);
        Ok(())
    }

    fn invalidate_identifiers(
        &self,
        zone_id: ZoneId,
        kind: EntityKind,
        identifiers: impl IntoIterator<Item = String>,
    ) {
        let refs = identifiers
            .into_iter()
            .map(|identifier| DependencyRef::Entity {
                kind,
                zone_id,
                identifier,
            });
        let removed = self.cache.invalidate_dependencies(refs);
        if removed > 0 {
            tracing::debug!(%zone_id, %kind, removed, "cache invalidated for entity change");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::InMemoryPolicyStore;
    use attrax_core::engine::ResolveError;
    use attrax_storage::memory::InMemoryGraphFactory;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    fn zone() -> ZoneId {
        ZoneId::new(Uuid::nil())
    }

    fn attr(name: &str, value: &str) -> Attribute {
        Attribute::new("https://acme.example", name, value)
    }

    /// Engine scripted per policy-set id, counting evaluations.
    struct ScriptedEngine {
        effects: HashMap<String, Effect>,
        calls: AtomicUsize,
    }

    impl ScriptedEngine {
        fn new(effects: impl IntoIterator<Item = (&'static str, Effect)>) -> Self {
            Self {
                effects: effects
                    .into_iter()
                    .map(|(id, effect)| (id.to_string(), effect))
                    .collect(),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl DecisionEngine for ScriptedEngine {
        async fn evaluate(&self, context: &EvaluationContext) -> Effect {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self
                .effects
                .get(&context.policy_set.id)
                .unwrap_or(&Effect::NotApplicable)
        }
    }

    /// Engine permitting when the subject carries a required attribute.
    struct RequireSubjectAttribute {
        required: Attribute,
    }

    impl DecisionEngine for RequireSubjectAttribute {
        async fn evaluate(&self, context: &EvaluationContext) -> Effect {
            if context.subject_attributes.contains(&self.required) {
                Effect::Permit
            } else {
                Effect::Deny
            }
        }
    }

    type Service<E> = PdpService<InMemoryGraphFactory, InMemoryPolicyStore, E>;

    struct Fixture<E: DecisionEngine> {
        factory: Arc<InMemoryGraphFactory>,
        policies: Arc<InMemoryPolicyStore>,
        service: Service<E>,
    }

    fn fixture<E: DecisionEngine>(engine: E) -> Fixture<E> {
        let factory = Arc::new(InMemoryGraphFactory::new());
        let policies = Arc::new(InMemoryPolicyStore::new());
        let service = PdpService::new(
            Arc::clone(&factory),
            Arc::clone(&policies),
            Arc::new(engine),
            EngineConfig::default(),
            CacheConfig::default(),
        );
        Fixture {
            factory,
            policies,
            service,
        }
    }

    fn request(subject: &str, resource: &str, policy_sets: &[&str]) -> EvaluationRequest {
        EvaluationRequest::new(
            zone(),
            subject,
            resource,
            "GET",
            policy_sets.iter().map(|s| s.to_string()),
        )
    }

    #[tokio::test]
    async fn empty_policy_set_list_is_not_applicable() {
        let fx = fixture(ScriptedEngine::new([]));

        let decision = fx.service.evaluate(&request("mulder", "/x-files", &[])).await.unwrap();

        assert_eq!(decision.effect, Effect::NotApplicable);
        assert!(!decision.cached);
    }

    #[tokio::test]
    async fn repeat_evaluation_is_served_from_cache() {
        let fx = fixture(ScriptedEngine::new([("deny-all", Effect::Deny)]));
        fx.policies.put_policy_set(&zone(), "deny-all");

        let req = request("mulder", "/x-files", &["deny-all"]);
        let first = fx.service.evaluate(&req).await.unwrap();
        let second = fx.service.evaluate(&req).await.unwrap();

        assert_eq!(first.effect, Effect::Deny);
        assert!(!first.cached);
        assert_eq!(second.effect, Effect::Deny);
        assert!(second.cached);
    }

    #[tokio::test]
    async fn decisive_policy_set_short_circuits_the_rest() {
        let engine = ScriptedEngine::new([
            ("deny-all", Effect::Deny),
            ("site-based-permit", Effect::Permit),
        ]);
        let fx = fixture(engine);
        fx.policies.put_policy_set(&zone(), "deny-all");
        fx.policies.put_policy_set(&zone(), "site-based-permit");

        let decision = fx
            .service
            .evaluate(&request("mulder", "/x-files", &["deny-all", "site-based-permit"]))
            .await
            .unwrap();

        assert_eq!(decision.effect, Effect::Deny);
        assert_eq!(fx.service.engine.calls(), 1, "second set must not be consulted");
    }

    #[tokio::test]
    async fn unknown_policy_set_contributes_indeterminate() {
        let fx = fixture(ScriptedEngine::new([]));

        let decision = fx
            .service
            .evaluate(&request("mulder", "/x-files", &["missing"]))
            .await
            .unwrap();

        assert_eq!(decision.effect, Effect::Indeterminate);
    }

    #[tokio::test]
    async fn late_policy_set_creation_invalidates_cached_indeterminate() {
        let fx = fixture(ScriptedEngine::new([("deny-all", Effect::Deny)]));

        let req = request("mulder", "/x-files", &["deny-all"]);
        let before = fx.service.evaluate(&req).await.unwrap();
        assert_eq!(before.effect, Effect::Indeterminate);

        fx.policies.put_policy_set(&zone(), "deny-all");
        fx.service.notify_policy_set_changed(&zone(), "deny-all");

        let after = fx.service.evaluate(&req).await.unwrap();
        assert_eq!(after.effect, Effect::Deny);
        assert!(!after.cached);
    }

    #[tokio::test]
    async fn entity_mutation_through_service_invalidates_descendants() {
        let engine = RequireSubjectAttribute {
            required: attr("classification", "top secret"),
        };
        let fx = fixture(engine);
        fx.policies.put_policy_set(&zone(), "classified");

        fx.service
            .create_entity(&Entity::new(zone(), EntityKind::Subject, "special-agents"))
            .await
            .unwrap();
        fx.service
            .create_entity(
                &Entity::new(zone(), EntityKind::Subject, "mulder")
                    .with_parents([attrax_core::entity::Parent::unconditional("special-agents")]),
            )
            .await
            .unwrap();

        let req = request("mulder", "/x-files", &["classified"]);
        assert_eq!(fx.service.evaluate(&req).await.unwrap().effect, Effect::Deny);

        fx.service
            .put_entity(
                &Entity::new(zone(), EntityKind::Subject, "special-agents")
                    .with_attributes([attr("classification", "top secret")]),
            )
            .await
            .unwrap();

        let after = fx.service.evaluate(&req).await.unwrap();
        assert_eq!(after.effect, Effect::Permit);
        assert!(!after.cached, "ancestor change must force a recompute");
    }

    #[tokio::test]
    async fn traversal_limit_surfaces_as_resolve_error() {
        let fx = fixture(ScriptedEngine::new([]));
        let factory = Arc::clone(&fx.factory);
        let service = PdpService::new(
            factory,
            Arc::clone(&fx.policies),
            Arc::new(ScriptedEngine::new([])),
            EngineConfig { traversal_limit: 1 },
            CacheConfig::default(),
        );

        service
            .create_entity(
                &Entity::new(zone(), EntityKind::Subject, "mulder")
                    .with_attributes([attr("a", "1"), attr("b", "2")]),
            )
            .await
            .unwrap();

        let err = service
            .evaluate(&request("mulder", "/x-files", &[]))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PdpError::Resolve(ResolveError::TraversalLimitExceeded { .. })
        ));
    }

    #[tokio::test]
    async fn delete_zone_clears_entities_and_cache() {
        let fx = fixture(ScriptedEngine::new([("deny-all", Effect::Deny)]));
        fx.policies.put_policy_set(&zone(), "deny-all");
        fx.service
            .create_entity(&Entity::new(zone(), EntityKind::Subject, "mulder"))
            .await
            .unwrap();

        let req = request("mulder", "/x-files", &["deny-all"]);
        fx.service.evaluate(&req).await.unwrap();
        assert_eq!(fx.service.cached_decisions(), 1);

        fx.service.delete_zone(&zone()).await.unwrap();

        assert_eq!(fx.service.cached_decisions(), 0);
        assert_eq!(
            fx.service
                .get_entity(&zone(), EntityKind::Subject, "mulder")
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn fingerprint_covers_every_traversed_ancestor() {
        // Changing the top of a three-level chain must invalidate the
        // leaf's cached decision even though the leaf never changed.
        let engine = RequireSubjectAttribute {
            required: attr("agency", "fbi"),
        };
        let fx = fixture(engine);
        fx.policies.put_policy_set(&zone(), "agency-gate");

        fx.service
            .create_entity(&Entity::new(zone(), EntityKind::Subject, "fbi"))
            .await
            .unwrap();
        fx.service
            .create_entity(
                &Entity::new(zone(), EntityKind::Subject, "special-agents")
                    .with_parents([attrax_core::entity::Parent::unconditional("fbi")]),
            )
            .await
            .unwrap();
        fx.service
            .create_entity(
                &Entity::new(zone(), EntityKind::Subject, "mulder")
                    .with_parents([attrax_core::entity::Parent::unconditional("special-agents")]),
            )
            .await
            .unwrap();

        let req = request("mulder", "/x-files", &["agency-gate"]);
        assert_eq!(fx.service.evaluate(&req).await.unwrap().effect, Effect::Deny);

        fx.service
            .put_entity(
                &Entity::new(zone(), EntityKind::Subject, "fbi")
                    .with_attributes([attr("agency", "fbi")]),
            )
            .await
            .unwrap();

        let after = fx.service.evaluate(&req).await.unwrap();
        assert_eq!(after.effect, Effect::Permit);
        assert!(!after.cached);
    }

    #[tokio::test]
    async fn get_entity_returns_direct_attributes_only() {
        let fx = fixture(ScriptedEngine::new([]));
        fx.service
            .create_entity(
                &Entity::new(zone(), EntityKind::Subject, "fbi")
                    .with_attributes([attr("agency", "fbi")]),
            )
            .await
            .unwrap();
        fx.service
            .create_entity(
                &Entity::new(zone(), EntityKind::Subject, "mulder")
                    .with_parents([attrax_core::entity::Parent::unconditional("fbi")]),
            )
            .await
            .unwrap();

        let direct = fx
            .service
            .get_entity(&zone(), EntityKind::Subject, "mulder")
            .await
            .unwrap()
            .unwrap();
        assert!(direct.attributes.is_empty());

        let resolved = fx
            .service
            .resolve_entity(&zone(), EntityKind::Subject, "mulder", &BTreeSet::new())
            .await
            .unwrap();
        assert!(resolved.attributes.contains(&attr("agency", "fbi")));
    }
}

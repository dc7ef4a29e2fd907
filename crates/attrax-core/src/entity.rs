use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Version sentinel for an identifier that does not exist in its zone.
/// Persisted entities are versioned from 1, so fingerprints recorded
/// against an absent entity are always invalidated by its creation.
pub const ABSENT_VERSION: u64 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ZoneId(Uuid);

impl ZoneId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for ZoneId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Subject,
    Resource,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Subject => write!(f, "subject"),
            EntityKind::Resource => write!(f, "resource"),
        }
    }
}

/// An `(issuer, name, value)` fact. Attributes compare structurally; an
/// entity's attribute set never holds two equal triples.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Attribute {
    pub issuer: String,
    pub name: String,
    pub value: String,
}

impl Attribute {
    pub fn new(
        issuer: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            issuer: issuer.into(),
            name: name.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}={}", self.issuer, self.name, self.value)
    }
}

/// A directed edge to a parent entity in the same zone, named by the
/// parent's identifier. An empty scope set makes the edge unconditional;
/// otherwise the edge only contributes to inheritance when at least one
/// scope attribute is present in the caller's scopes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Parent {
    pub identifier: String,
    pub scopes: BTreeSet<Attribute>,
}

impl Parent {
    pub fn unconditional(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            scopes: BTreeSet::new(),
        }
    }

    pub fn scoped(
        identifier: impl Into<String>,
        scopes: impl IntoIterator<Item = Attribute>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            scopes: scopes.into_iter().collect(),
        }
    }

    pub fn qualifies(&self, caller_scopes: &BTreeSet<Attribute>) -> bool {
        self.scopes.is_empty() || self.scopes.iter().any(|s| caller_scopes.contains(s))
    }
}

/// A Subject or Resource vertex. `identifier` is the caller-supplied
/// business key, unique per `(zone, kind)`; `id` is the store-assigned
/// surrogate and is `None` until the store has persisted the entity.
/// `version` is store-managed: 0 on unpersisted input, 1 on first insert,
/// incremented on every attribute or parent-edge mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: Option<Uuid>,
    pub zone_id: ZoneId,
    pub kind: EntityKind,
    pub identifier: String,
    pub attributes: BTreeSet<Attribute>,
    pub parents: Vec<Parent>,
    pub version: u64,
}

impl Entity {
    pub fn new(zone_id: ZoneId, kind: EntityKind, identifier: impl Into<String>) -> Self {
        Self {
            id: None,
            zone_id,
            kind,
            identifier: identifier.into(),
            attributes: BTreeSet::new(),
            parents: Vec::new(),
            version: 0,
        }
    }

    pub fn with_attributes(mut self, attributes: impl IntoIterator<Item = Attribute>) -> Self {
        self.attributes = attributes.into_iter().collect();
        self
    }

    pub fn with_parents(mut self, parents: impl IntoIterator<Item = Parent>) -> Self {
        self.parents = parents.into_iter().collect();
        self
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@{}", self.kind, self.identifier, self.zone_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attr(name: &str, value: &str) -> Attribute {
        Attribute::new("https://acme.example", name, value)
    }

    #[test]
    fn attribute_equality_is_structural() {
        let a = attr("site", "sanramon");
        let b = Attribute::new("https://acme.example", "site", "sanramon");

        assert_eq!(a, b);
    }

    #[test]
    fn attribute_set_deduplicates_triples() {
        let set: BTreeSet<Attribute> = [attr("site", "sanramon"), attr("site", "sanramon")]
            .into_iter()
            .collect();

        assert_eq!(set.len(), 1);
    }

    #[test]
    fn unconditional_parent_qualifies_for_any_scopes() {
        let parent = Parent::unconditional("fbi");

        assert!(parent.qualifies(&BTreeSet::new()));
        assert!(parent.qualifies(&[attr("site", "sanramon")].into_iter().collect()));
    }

    #[test]
    fn scoped_parent_requires_matching_caller_scope() {
        let parent = Parent::scoped("special-agents", [attr("site", "sanramon")]);

        assert!(!parent.qualifies(&BTreeSet::new()));
        assert!(!parent.qualifies(&[attr("site", "losangeles")].into_iter().collect()));
        assert!(parent.qualifies(&[attr("site", "sanramon")].into_iter().collect()));
    }

    #[test]
    fn scoped_parent_qualifies_on_any_scope_element() {
        let parent = Parent::scoped(
            "special-agents",
            [attr("site", "sanramon"), attr("site", "losangeles")],
        );

        assert!(parent.qualifies(&[attr("site", "losangeles")].into_iter().collect()));
    }

    #[test]
    fn new_entity_starts_unpersisted() {
        let zone = ZoneId::new(uuid::Uuid::new_v4());
        let entity = Entity::new(zone, EntityKind::Subject, "marissa");

        assert_eq!(entity.id, None);
        assert_eq!(entity.version, 0);
        assert!(entity.attributes.is_empty());
        assert!(entity.parents.is_empty());
    }

    #[test]
    fn builder_sets_attributes_and_parents() {
        let zone = ZoneId::new(uuid::Uuid::new_v4());
        let entity = Entity::new(zone, EntityKind::Subject, "mulder")
            .with_attributes([attr("department", "x-files")])
            .with_parents([Parent::unconditional("special-agents")]);

        assert_eq!(entity.attributes.len(), 1);
        assert_eq!(entity.parents.len(), 1);
        assert_eq!(entity.parents[0].identifier, "special-agents");
    }

    #[test]
    fn entity_display_names_kind_identifier_and_zone() {
        let zone = ZoneId::new(uuid::Uuid::new_v4());
        let entity = Entity::new(zone, EntityKind::Resource, "/sites/sanramon");

        assert_eq!(format!("{entity}"), format!("resource:/sites/sanramon@{zone}"));
    }
}

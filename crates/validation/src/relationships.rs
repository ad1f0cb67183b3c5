//! Read-only index of cross-module entity relationships.
//!
//! The index is rebuilt wholesale from the owning modules' data (they remain
//! the source of truth); queries never mutate it. Links are directed — a
//! `Lead → Project` link reads "the lead belongs to the project" — but most
//! queries look in both directions.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use leadstack_core::{EntityId, EntityKind, EntityRef, UserId};

/// One directed relationship between two entities.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct EntityLink {
    pub from: EntityRef,
    pub to: EntityRef,
}

impl EntityLink {
    pub fn new(from: EntityRef, to: EntityRef) -> Self {
        Self { from, to }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelationshipStats {
    pub entity_count: usize,
    pub link_count: usize,
    pub last_indexed_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct Index {
    entities: HashSet<EntityRef>,
    forward: HashMap<EntityRef, BTreeSet<EntityRef>>,
    reverse: HashMap<EntityRef, BTreeSet<EntityRef>>,
    link_count: usize,
    last_indexed_at: Option<DateTime<Utc>>,
}

/// Cross-module relationship queries over the rebuilt index.
#[derive(Default)]
pub struct RelationshipService {
    index: RwLock<Index>,
}

impl RelationshipService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole index with a fresh set of links.
    pub fn rebuild(&self, links: impl IntoIterator<Item = EntityLink>) {
        let mut next = Index {
            last_indexed_at: Some(Utc::now()),
            ..Index::default()
        };
        for link in links {
            next.entities.insert(link.from);
            next.entities.insert(link.to);
            if next.forward.entry(link.from).or_default().insert(link.to) {
                next.link_count += 1;
            }
            next.reverse.entry(link.to).or_default().insert(link.from);
        }
        info!(
            entities = next.entities.len(),
            links = next.link_count,
            "relationship index rebuilt"
        );
        *self.index.write().expect("relationship index lock poisoned") = next;
    }

    pub fn exists(&self, entity: &EntityRef) -> bool {
        self.read().entities.contains(entity)
    }

    /// Whether two entities are directly linked, in either direction.
    pub fn linked(&self, a: &EntityRef, b: &EntityRef) -> bool {
        let index = self.read();
        index.forward.get(a).is_some_and(|s| s.contains(b))
            || index.forward.get(b).is_some_and(|s| s.contains(a))
    }

    /// Entities that point at `entity` — the things that would dangle if it
    /// were deleted.
    pub fn dependents(&self, entity: &EntityRef) -> Vec<EntityRef> {
        self.read()
            .reverse
            .get(entity)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    /// All entities directly related to `entity`, in either direction.
    pub fn related_entities(&self, entity: &EntityRef) -> Vec<EntityRef> {
        let index = self.read();
        let mut related: BTreeSet<EntityRef> = BTreeSet::new();
        if let Some(out) = index.forward.get(entity) {
            related.extend(out.iter().copied());
        }
        if let Some(inc) = index.reverse.get(entity) {
            related.extend(inc.iter().copied());
        }
        related.into_iter().collect()
    }

    /// Related entities of `entity`, filtered to one kind.
    pub fn related_of_kind(&self, entity: &EntityRef, kind: EntityKind) -> Vec<EntityRef> {
        self.related_entities(entity)
            .into_iter()
            .filter(|e| e.kind == kind)
            .collect()
    }

    /// Everything across the platform touching this user.
    pub fn user_related_entities(&self, user_id: UserId) -> Vec<EntityRef> {
        self.related_entities(&EntityRef::user(user_id))
    }

    pub fn project_related_entities(&self, project_id: EntityId) -> Vec<EntityRef> {
        self.related_entities(&EntityRef::new(EntityKind::Project, project_id))
    }

    pub fn lead_related_entities(&self, lead_id: EntityId) -> Vec<EntityRef> {
        self.related_entities(&EntityRef::new(EntityKind::Lead, lead_id))
    }

    pub fn stats(&self) -> RelationshipStats {
        let index = self.read();
        RelationshipStats {
            entity_count: index.entities.len(),
            link_count: index.link_count,
            last_indexed_at: index.last_indexed_at,
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Index> {
        self.index.read().expect("relationship index lock poisoned")
    }
}

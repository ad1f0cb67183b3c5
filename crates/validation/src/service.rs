//! Validation service with a TTL'd decision cache.
//!
//! The cache exists because the same question is asked twice in quick
//! succession: once as an interactive pre-flight check and once when the
//! resulting event is processed. Invalidation is a generation bump — O(1)
//! regardless of how many entries exist — and stale entries are evicted
//! lazily on lookup.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info};

use leadstack_core::{EntityKind, EntityRef};

use crate::relationships::RelationshipService;
use crate::rules::ValidationRule;

pub const DEFAULT_CACHE_TIMEOUT: Duration = Duration::from_secs(300);

/// Outcome of evaluating one validation rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub reason: Option<String>,
}

impl ValidationResult {
    pub fn pass() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationStats {
    pub rule_count: usize,
    pub cache_timeout_secs: u64,
    pub cache_entries: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub hit_rate: f64,
}

#[derive(PartialEq, Eq, Hash)]
struct CacheKey {
    rule: ValidationRule,
    subjects: Vec<EntityRef>,
}

struct CacheEntry {
    result: ValidationResult,
    inserted_at: Instant,
    generation: u64,
}

#[derive(Default)]
struct Cache {
    entries: HashMap<CacheKey, CacheEntry>,
    generation: u64,
    hits: u64,
    misses: u64,
}

/// Evaluates cross-module validation rules against the relationship index.
pub struct ValidationService {
    relationships: Arc<RelationshipService>,
    cache: Mutex<Cache>,
    cache_timeout: Duration,
}

impl ValidationService {
    pub fn new(relationships: Arc<RelationshipService>) -> Self {
        Self::with_cache_timeout(relationships, DEFAULT_CACHE_TIMEOUT)
    }

    pub fn with_cache_timeout(
        relationships: Arc<RelationshipService>,
        cache_timeout: Duration,
    ) -> Self {
        Self {
            relationships,
            cache: Mutex::new(Cache::default()),
            cache_timeout,
        }
    }

    pub fn cache_timeout(&self) -> Duration {
        self.cache_timeout
    }

    /// Evaluate a rule for the given subjects, serving a cached decision when
    /// one is still live.
    ///
    /// The cache lock is held across the evaluation: evaluators only read the
    /// in-memory relationship index, and holding the lock guarantees one
    /// evaluation per (rule, subjects) within the TTL.
    pub fn validate(&self, rule: ValidationRule, subjects: &[EntityRef]) -> ValidationResult {
        let mut key_subjects = subjects.to_vec();
        key_subjects.sort();
        let key = CacheKey {
            rule,
            subjects: key_subjects,
        };

        let mut cache = self.cache.lock().expect("validation cache lock poisoned");
        let generation = cache.generation;
        match cache.entries.get(&key) {
            Some(entry)
                if entry.generation == generation
                    && entry.inserted_at.elapsed() < self.cache_timeout =>
            {
                let result = entry.result.clone();
                cache.hits += 1;
                return result;
            }
            Some(_) => {
                cache.entries.remove(&key);
            }
            None => {}
        }

        let result = self.evaluate(rule, subjects);
        debug!(
            rule = %rule,
            valid = result.valid,
            reason = result.reason.as_deref().unwrap_or(""),
            "validation evaluated"
        );
        cache.misses += 1;
        cache.entries.insert(
            key,
            CacheEntry {
                result: result.clone(),
                inserted_at: Instant::now(),
                generation,
            },
        );
        result
    }

    /// Invalidate every cached decision. O(1): bumps the generation; stale
    /// entries are evicted lazily when next looked up.
    pub fn clear_cache(&self) {
        let mut cache = self.cache.lock().expect("validation cache lock poisoned");
        cache.generation += 1;
        info!(generation = cache.generation, "validation cache invalidated");
    }

    pub fn stats(&self) -> ValidationStats {
        let cache = self.cache.lock().expect("validation cache lock poisoned");
        let lookups = cache.hits + cache.misses;
        ValidationStats {
            rule_count: ValidationRule::ALL.len(),
            cache_timeout_secs: self.cache_timeout.as_secs(),
            cache_entries: cache.entries.len(),
            cache_hits: cache.hits,
            cache_misses: cache.misses,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                cache.hits as f64 / lookups as f64
            },
        }
    }

    fn evaluate(&self, rule: ValidationRule, subjects: &[EntityRef]) -> ValidationResult {
        match rule {
            ValidationRule::UserProjectAssociation => {
                let Some((user, project)) =
                    pair(subjects, EntityKind::User, EntityKind::Project)
                else {
                    return ValidationResult::fail("requires a user and a project subject");
                };
                if self.relationships.linked(&user, &project) {
                    ValidationResult::pass()
                } else {
                    ValidationResult::fail(format!("user {user} is not associated with {project}"))
                }
            }
            ValidationRule::LeadConversion => {
                let Some(lead) = of_kind(subjects, EntityKind::Lead) else {
                    return ValidationResult::fail("requires a lead subject");
                };
                if !self.relationships.exists(&lead) {
                    return ValidationResult::fail(format!("lead {lead} does not exist"));
                }
                if self
                    .relationships
                    .related_of_kind(&lead, EntityKind::Project)
                    .is_empty()
                {
                    ValidationResult::fail(format!("lead {lead} is not linked to any project"))
                } else {
                    ValidationResult::pass()
                }
            }
            ValidationRule::PostSocialAssociation => {
                let Some((post, account)) =
                    pair(subjects, EntityKind::Post, EntityKind::SocialAccount)
                else {
                    return ValidationResult::fail("requires a post and a social account subject");
                };
                if self.relationships.linked(&post, &account) {
                    ValidationResult::pass()
                } else {
                    ValidationResult::fail(format!("post {post} is not linked to {account}"))
                }
            }
            ValidationRule::EmailCampaignSending => {
                let Some(campaign) = of_kind(subjects, EntityKind::EmailCampaign) else {
                    return ValidationResult::fail("requires an email campaign subject");
                };
                if self
                    .relationships
                    .related_of_kind(&campaign, EntityKind::EmailList)
                    .is_empty()
                {
                    ValidationResult::fail(format!("campaign {campaign} has no recipient list"))
                } else {
                    ValidationResult::pass()
                }
            }
            ValidationRule::WorkflowExecution => {
                let Some(workflow) = of_kind(subjects, EntityKind::Workflow) else {
                    return ValidationResult::fail("requires a workflow subject");
                };
                if self.relationships.exists(&workflow) {
                    ValidationResult::pass()
                } else {
                    ValidationResult::fail(format!("workflow {workflow} does not exist"))
                }
            }
            ValidationRule::EntityDeletion => {
                let Some(entity) = subjects.first().copied() else {
                    return ValidationResult::fail("requires a subject");
                };
                let dependents = self.relationships.dependents(&entity);
                if dependents.is_empty() {
                    ValidationResult::pass()
                } else {
                    ValidationResult::fail(format!(
                        "{entity} still has {} dependent entities",
                        dependents.len()
                    ))
                }
            }
            ValidationRule::EntityUpdate => {
                let Some(entity) = subjects.first().copied() else {
                    return ValidationResult::fail("requires a subject");
                };
                if self.relationships.exists(&entity) {
                    ValidationResult::pass()
                } else {
                    ValidationResult::fail(format!("{entity} does not exist"))
                }
            }
        }
    }
}

fn of_kind(subjects: &[EntityRef], kind: EntityKind) -> Option<EntityRef> {
    subjects.iter().copied().find(|s| s.kind == kind)
}

fn pair(subjects: &[EntityRef], a: EntityKind, b: EntityKind) -> Option<(EntityRef, EntityRef)> {
    Some((of_kind(subjects, a)?, of_kind(subjects, b)?))
}

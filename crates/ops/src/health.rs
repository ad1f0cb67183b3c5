//! Integration health validation (`validate-integrations`).
//!
//! Read-only by default: every check inspects state and reports issues.
//! `--fix` applies the two safe remediations (reset dispatcher config, clear
//! the validation cache) and re-runs the checks; anything still reported
//! needs a human or a code change, and keeps being reported until it does.

use core::str::FromStr;

use chrono::{Duration, Utc};
use clap::ValueEnum;
use serde::Serialize;
use tracing::info;

use leadstack_core::{DomainError, Module};
use leadstack_events::DispatcherConfig;
use leadstack_saga::{SagaStatus, SagaStore};

use crate::context::PlatformContext;

/// A running saga untouched for this long is suspicious.
const STALE_SAGA_AFTER_HOURS: i64 = 24;

/// Scope filter: one module or the whole platform.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum ModuleFilter {
    #[default]
    All,
    Only(Module),
}

impl ModuleFilter {
    fn admits(&self, module: Option<Module>) -> bool {
        match self {
            ModuleFilter::All => true,
            ModuleFilter::Only(wanted) => module == Some(*wanted),
        }
    }
}

impl FromStr for ModuleFilter {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "all" {
            Ok(ModuleFilter::All)
        } else {
            Ok(ModuleFilter::Only(s.parse()?))
        }
    }
}

/// Which check group to run.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, ValueEnum)]
pub enum Check {
    #[default]
    All,
    Events,
    Relationships,
    Validations,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// Events are waiting and nothing is draining them.
    PendingBacklog,
    /// A claimed event has been processing past the stuck threshold.
    StuckProcessing,
    /// A pending event's type has no registered handler.
    UnmappedEventType,
    /// Validation caching is disabled (zero timeout).
    MissingCacheTimeout,
    /// The relationship index has never been built or holds nothing.
    RelationshipIndexEmpty,
    /// A running saga has not advanced for over a day.
    StaleRunningSaga,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub kind: IssueKind,
    /// Module the issue is attributable to, when one is.
    pub module: Option<Module>,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct HealthReport {
    pub issues: Vec<Issue>,
    /// Remediations applied under `--fix`.
    pub fixes_applied: Vec<String>,
}

impl HealthReport {
    pub fn healthy(&self) -> bool {
        self.issues.is_empty()
    }
}

#[derive(Debug, Copy, Clone, Default)]
pub struct HealthArgs {
    pub module: ModuleFilter,
    pub check: Check,
    pub fix: bool,
}

pub fn validate_integrations(ctx: &PlatformContext, args: HealthArgs) -> HealthReport {
    let mut report = HealthReport::default();

    if args.fix {
        ctx.dispatcher.configure(DispatcherConfig::default());
        ctx.validation.clear_cache();
        report.fixes_applied = vec![
            "dispatcher config reset to defaults".to_string(),
            "validation cache cleared".to_string(),
        ];
        info!("remediations applied; re-running checks");
    }

    if matches!(args.check, Check::All | Check::Events) {
        check_events(ctx, &args.module, &mut report.issues);
        check_sagas(ctx, &args.module, &mut report.issues);
    }
    if matches!(args.check, Check::All | Check::Relationships) {
        check_relationships(ctx, &args.module, &mut report.issues);
    }
    if matches!(args.check, Check::All | Check::Validations) {
        check_validations(ctx, &args.module, &mut report.issues);
    }

    report
}

fn check_events(ctx: &PlatformContext, filter: &ModuleFilter, issues: &mut Vec<Issue>) {
    let pending = ctx.dispatcher.pending_events();
    let registered = ctx.dispatcher.registered_event_types();

    let backlog = pending
        .iter()
        .filter(|e| filter.admits(Some(e.origin_module())))
        .count();
    if backlog > 0 && matches!(filter, ModuleFilter::All) {
        issues.push(Issue {
            kind: IssueKind::PendingBacklog,
            module: None,
            detail: format!("{backlog} events pending; no drain has claimed them"),
        });
    }

    let mut unmapped: Vec<&_> = pending
        .iter()
        .filter(|e| {
            filter.admits(Some(e.origin_module()))
                && !registered.iter().any(|t| t == e.event_type())
        })
        .collect();
    unmapped.sort_by_key(|e| e.event_type().to_string());
    unmapped.dedup_by_key(|e| e.event_type().to_string());
    for event in unmapped {
        issues.push(Issue {
            kind: IssueKind::UnmappedEventType,
            module: Some(event.origin_module()),
            detail: format!("no handler registered for event type {}", event.event_type()),
        });
    }

    let stuck_after =
        Duration::from_std(ctx.dispatcher.config().stuck_after).unwrap_or_else(|_| Duration::zero());
    let now = Utc::now();
    for entry in ctx.dispatcher.processing_events() {
        if now - entry.claimed_at > stuck_after && filter.admits(None) {
            issues.push(Issue {
                kind: IssueKind::StuckProcessing,
                module: None,
                detail: format!(
                    "event {} ({}) claimed at {} and never resolved",
                    entry.event_id, entry.event_type, entry.claimed_at
                ),
            });
        }
    }
}

fn check_sagas(ctx: &PlatformContext, filter: &ModuleFilter, issues: &mut Vec<Issue>) {
    let threshold = Utc::now() - Duration::hours(STALE_SAGA_AFTER_HOURS);
    for record in ctx.sagas.list_by_status(SagaStatus::Running) {
        if record.updated_at() >= threshold {
            continue;
        }
        let module = record.next_pending_step().map(|s| s.module);
        if filter.admits(module) {
            issues.push(Issue {
                kind: IssueKind::StaleRunningSaga,
                module,
                detail: format!(
                    "saga {} running since {} with no progress",
                    record.saga_id(),
                    record.updated_at()
                ),
            });
        }
    }
}

fn check_relationships(ctx: &PlatformContext, filter: &ModuleFilter, issues: &mut Vec<Issue>) {
    if !matches!(filter, ModuleFilter::All) {
        return;
    }
    let stats = ctx.relationships.stats();
    if stats.entity_count == 0 {
        issues.push(Issue {
            kind: IssueKind::RelationshipIndexEmpty,
            module: None,
            detail: "relationship index is empty; cross-module validations will fail".to_string(),
        });
    }
}

fn check_validations(ctx: &PlatformContext, filter: &ModuleFilter, issues: &mut Vec<Issue>) {
    if !matches!(filter, ModuleFilter::All) {
        return;
    }
    if ctx.validation.cache_timeout().is_zero() {
        issues.push(Issue {
            kind: IssueKind::MissingCacheTimeout,
            module: None,
            detail: "validation cache timeout is zero; every check re-evaluates".to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use leadstack_core::TenantId;
    use leadstack_events::EventEnvelope;
    use leadstack_validation::EntityLink;
    use leadstack_core::{EntityId, EntityKind, EntityRef};

    fn indexed_context() -> PlatformContext {
        let ctx = PlatformContext::new();
        ctx.relationships.rebuild([EntityLink::new(
            EntityRef::new(EntityKind::Lead, EntityId::new()),
            EntityRef::new(EntityKind::Project, EntityId::new()),
        )]);
        ctx
    }

    #[test]
    fn quiet_platform_is_healthy() {
        let ctx = indexed_context();
        let report = validate_integrations(&ctx, HealthArgs::default());
        assert!(report.healthy(), "unexpected issues: {:?}", report.issues);
    }

    #[test]
    fn empty_relationship_index_is_reported() {
        let ctx = PlatformContext::new();
        let report = validate_integrations(
            &ctx,
            HealthArgs {
                check: Check::Relationships,
                ..Default::default()
            },
        );
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].kind, IssueKind::RelationshipIndexEmpty);
    }

    #[test]
    fn pending_unmapped_event_is_flagged_with_its_module() {
        let ctx = indexed_context();
        ctx.dispatcher.publish(EventEnvelope::new(
            TenantId::new(),
            "lead.imported",
            Module::Leads,
            serde_json::json!({}),
        ));

        let report = validate_integrations(
            &ctx,
            HealthArgs {
                check: Check::Events,
                ..Default::default()
            },
        );
        assert!(report.issues.iter().any(|i| i.kind == IssueKind::PendingBacklog));
        let unmapped: Vec<_> = report
            .issues
            .iter()
            .filter(|i| i.kind == IssueKind::UnmappedEventType)
            .collect();
        assert_eq!(unmapped.len(), 1);
        assert_eq!(unmapped[0].module, Some(Module::Leads));
    }

    #[test]
    fn module_filter_narrows_the_report() {
        let ctx = indexed_context();
        ctx.dispatcher.publish(EventEnvelope::new(
            TenantId::new(),
            "lead.imported",
            Module::Leads,
            serde_json::json!({}),
        ));

        let report = validate_integrations(
            &ctx,
            HealthArgs {
                module: ModuleFilter::Only(Module::Social),
                check: Check::Events,
                ..Default::default()
            },
        );
        assert!(
            report.issues.iter().all(|i| i.kind != IssueKind::UnmappedEventType),
            "leads-module issue leaked through the social filter"
        );
    }

    #[test]
    fn fix_resets_config_but_cannot_invent_handlers() {
        let ctx = indexed_context();
        ctx.dispatcher.configure(leadstack_events::DispatcherConfig {
            max_retries: 99,
            ..Default::default()
        });
        ctx.dispatcher.publish(EventEnvelope::new(
            TenantId::new(),
            "lead.imported",
            Module::Leads,
            serde_json::json!({}),
        ));

        let report = validate_integrations(
            &ctx,
            HealthArgs {
                fix: true,
                check: Check::Events,
                ..Default::default()
            },
        );
        assert_eq!(ctx.dispatcher.config().max_retries, 3);
        assert_eq!(report.fixes_applied.len(), 2);
        // Still unhealthy: a missing handler is a code change, not a fix.
        assert!(report.issues.iter().any(|i| i.kind == IssueKind::UnmappedEventType));
    }

    #[test]
    fn module_filter_parses_all_and_names() {
        assert_eq!("all".parse::<ModuleFilter>().unwrap(), ModuleFilter::All);
        assert_eq!(
            "social".parse::<ModuleFilter>().unwrap(),
            ModuleFilter::Only(Module::Social)
        );
        assert!("billing".parse::<ModuleFilter>().is_err());
    }

    #[test]
    fn registered_handler_is_not_unmapped() {
        let ctx = indexed_context();
        ctx.dispatcher
            .register_handler("lead.imported", Arc::new(("ok", |_: &EventEnvelope| Ok(()))));
        ctx.dispatcher.publish(EventEnvelope::new(
            TenantId::new(),
            "lead.imported",
            Module::Leads,
            serde_json::json!({}),
        ));

        let report = validate_integrations(
            &ctx,
            HealthArgs {
                check: Check::Events,
                ..Default::default()
            },
        );
        assert!(report.issues.iter().all(|i| i.kind != IssueKind::UnmappedEventType));
    }
}

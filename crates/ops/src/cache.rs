use clap::ValueEnum;
use serde::Serialize;
use tracing::warn;

use crate::context::PlatformContext;

/// What `clear-cache` is allowed to discard.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum CacheKind {
    /// Everything below.
    All,
    /// Dead-letter events.
    Events,
    /// Cached validation decisions.
    Validations,
    /// Pending and in-flight queue entries. Destructive: queued events are
    /// lost, not re-delivered.
    Queue,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct CacheClearReport {
    pub dead_letters_cleared: usize,
    pub queue_cleared: usize,
    pub validations_cleared: bool,
}

pub fn clear_cache(ctx: &PlatformContext, kind: CacheKind) -> CacheClearReport {
    let mut report = CacheClearReport::default();
    if matches!(kind, CacheKind::All | CacheKind::Events) {
        report.dead_letters_cleared = ctx.dispatcher.clear_dead_letters();
    }
    if matches!(kind, CacheKind::All | CacheKind::Validations) {
        ctx.validation.clear_cache();
        report.validations_cleared = true;
    }
    if matches!(kind, CacheKind::All | CacheKind::Queue) {
        report.queue_cleared = ctx.dispatcher.clear_queue();
        if report.queue_cleared > 0 {
            warn!(dropped = report.queue_cleared, "queued events discarded");
        }
    }
    report
}

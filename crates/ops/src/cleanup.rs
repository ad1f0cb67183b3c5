use serde::Serialize;

use leadstack_saga::{RETENTION_DAYS, SagaStore, SagaStoreStats};

use crate::context::PlatformContext;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub deleted: usize,
    pub retention_days: i64,
    pub remaining: SagaStoreStats,
}

/// Delete terminal saga records older than the retention window.
///
/// The window is fixed: the command exists for scheduled housekeeping, not
/// for ad-hoc deletion of coordination history.
pub fn cleanup_sagas(ctx: &PlatformContext) -> CleanupReport {
    let deleted = ctx.sagas.cleanup_older_than(RETENTION_DAYS);
    CleanupReport {
        deleted,
        retention_days: RETENTION_DAYS,
        remaining: ctx.sagas.stats(),
    }
}

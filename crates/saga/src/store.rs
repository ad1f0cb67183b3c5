use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{Duration, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use leadstack_core::{SagaId, StepId, TenantId};
use leadstack_events::SagaHook;

use crate::record::{SagaRecord, SagaStatus, SagaStepSpec, StepResult};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SagaStoreError {
    #[error("saga {0} not found")]
    NotFound(SagaId),

    /// The saga already reached `Completed` or `Failed`.
    #[error("saga {0} is terminal and cannot advance")]
    Terminal(SagaId),

    #[error("saga {saga_id} has no step {step_id}")]
    UnknownStep { saga_id: SagaId, step_id: StepId },

    #[error("saga {saga_id}: got result for {step_id}, expected {expected}")]
    OutOfOrder {
        saga_id: SagaId,
        step_id: StepId,
        expected: StepId,
    },

    #[error("saga requires at least one step")]
    EmptySteps,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SagaStoreStats {
    pub total: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Storage contract for saga records.
///
/// The in-memory implementation below is the only one in this crate; a
/// durable backend would implement the same trait.
pub trait SagaStore: Send + Sync {
    /// Start a new saga in `Running` status.
    fn create(
        &self,
        tenant_id: TenantId,
        steps: Vec<SagaStepSpec>,
    ) -> Result<SagaId, SagaStoreError>;

    fn get(&self, saga_id: SagaId) -> Result<SagaRecord, SagaStoreError>;

    /// Record a step outcome; returns the saga's status afterwards.
    fn advance(&self, saga_id: SagaId, result: StepResult) -> Result<SagaStatus, SagaStoreError>;

    fn list_by_status(&self, status: SagaStatus) -> Vec<SagaRecord>;

    /// Delete terminal sagas last updated more than `days` days ago.
    /// Running sagas are never deleted, whatever their age.
    fn cleanup_older_than(&self, days: i64) -> usize;

    fn stats(&self) -> SagaStoreStats;
}

#[derive(Default)]
pub struct InMemorySagaStore {
    sagas: RwLock<HashMap<SagaId, SagaRecord>>,
}

impl InMemorySagaStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn insert_for_test(&self, record: SagaRecord) {
        self.sagas
            .write()
            .expect("saga store lock poisoned")
            .insert(record.saga_id(), record);
    }
}

impl SagaStore for InMemorySagaStore {
    fn create(
        &self,
        tenant_id: TenantId,
        steps: Vec<SagaStepSpec>,
    ) -> Result<SagaId, SagaStoreError> {
        if steps.is_empty() {
            return Err(SagaStoreError::EmptySteps);
        }
        let record = SagaRecord::new(tenant_id, steps);
        let saga_id = record.saga_id();
        info!(saga_id = %saga_id, steps = record.steps().len(), "saga started");
        self.sagas
            .write()
            .expect("saga store lock poisoned")
            .insert(saga_id, record);
        Ok(saga_id)
    }

    fn get(&self, saga_id: SagaId) -> Result<SagaRecord, SagaStoreError> {
        self.sagas
            .read()
            .expect("saga store lock poisoned")
            .get(&saga_id)
            .cloned()
            .ok_or(SagaStoreError::NotFound(saga_id))
    }

    fn advance(&self, saga_id: SagaId, result: StepResult) -> Result<SagaStatus, SagaStoreError> {
        let mut sagas = self.sagas.write().expect("saga store lock poisoned");
        let record = sagas
            .get_mut(&saga_id)
            .ok_or(SagaStoreError::NotFound(saga_id))?;
        let status = record.apply(result)?;
        if status.is_terminal() {
            info!(saga_id = %saga_id, status = %status, "saga finished");
        }
        Ok(status)
    }

    fn list_by_status(&self, status: SagaStatus) -> Vec<SagaRecord> {
        let mut records: Vec<SagaRecord> = self
            .sagas
            .read()
            .expect("saga store lock poisoned")
            .values()
            .filter(|r| r.status() == status)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.created_at());
        records
    }

    fn cleanup_older_than(&self, days: i64) -> usize {
        let threshold = Utc::now() - Duration::days(days);
        let mut sagas = self.sagas.write().expect("saga store lock poisoned");
        let before = sagas.len();
        sagas.retain(|_, r| !r.status().is_terminal() || r.updated_at() > threshold);
        let deleted = before - sagas.len();
        if deleted > 0 {
            info!(deleted, days, "terminal sagas cleaned up");
        }
        deleted
    }

    fn stats(&self) -> SagaStoreStats {
        let sagas = self.sagas.read().expect("saga store lock poisoned");
        let mut stats = SagaStoreStats {
            total: sagas.len(),
            running: 0,
            completed: 0,
            failed: 0,
        };
        for record in sagas.values() {
            match record.status() {
                SagaStatus::Running => stats.running += 1,
                SagaStatus::Completed => stats.completed += 1,
                SagaStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }
}

/// Event-dispatch callback: events carrying a saga step reference resolve
/// that step here. Outcome mismatches (late duplicate deliveries against a
/// terminal saga) are logged, not propagated — the dispatcher must not fail
/// an event because its saga already finished.
impl SagaHook for InMemorySagaStore {
    fn step_succeeded(&self, saga_id: SagaId, step_id: StepId) {
        if let Err(e) = self.advance(saga_id, StepResult::succeeded(step_id)) {
            warn!(saga_id = %saga_id, step_id = %step_id, error = %e, "saga step success not recorded");
        }
    }

    fn step_failed(&self, saga_id: SagaId, step_id: StepId, reason: &str) {
        if let Err(e) = self.advance(saga_id, StepResult::failed(step_id, reason)) {
            warn!(saga_id = %saga_id, step_id = %step_id, error = %e, "saga step failure not recorded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadstack_core::Module;

    fn specs() -> Vec<SagaStepSpec> {
        vec![
            SagaStepSpec::new(Module::Projects, "reassign_project"),
            SagaStepSpec::new(Module::EmailMarketing, "migrate_campaign"),
        ]
    }

    #[test]
    fn create_rejects_empty_step_list() {
        let store = InMemorySagaStore::new();
        let err = store.create(TenantId::new(), vec![]).unwrap_err();
        assert_eq!(err, SagaStoreError::EmptySteps);
    }

    #[test]
    fn advance_walks_a_saga_to_completion() {
        let store = InMemorySagaStore::new();
        let saga_id = store.create(TenantId::new(), specs()).unwrap();

        assert_eq!(
            store.advance(saga_id, StepResult::succeeded(StepId(0))).unwrap(),
            SagaStatus::Running
        );
        assert_eq!(
            store.advance(saga_id, StepResult::succeeded(StepId(1))).unwrap(),
            SagaStatus::Completed
        );
        assert_eq!(store.get(saga_id).unwrap().status(), SagaStatus::Completed);
    }

    #[test]
    fn advance_on_unknown_saga_is_an_error() {
        let store = InMemorySagaStore::new();
        let err = store
            .advance(SagaId::new(), StepResult::succeeded(StepId(0)))
            .unwrap_err();
        assert!(matches!(err, SagaStoreError::NotFound(_)));
    }

    #[test]
    fn terminal_saga_cannot_be_advanced_again() {
        let store = InMemorySagaStore::new();
        let saga_id = store.create(TenantId::new(), specs()).unwrap();
        store
            .advance(saga_id, StepResult::failed(StepId(0), "boom"))
            .unwrap();

        let err = store
            .advance(saga_id, StepResult::succeeded(StepId(1)))
            .unwrap_err();
        assert_eq!(err, SagaStoreError::Terminal(saga_id));
    }

    #[test]
    fn list_by_status_partitions_records() {
        let store = InMemorySagaStore::new();
        let tenant = TenantId::new();
        let running = store.create(tenant, specs()).unwrap();
        let failed = store.create(tenant, specs()).unwrap();
        store
            .advance(failed, StepResult::failed(StepId(0), "boom"))
            .unwrap();

        let running_list = store.list_by_status(SagaStatus::Running);
        assert_eq!(running_list.len(), 1);
        assert_eq!(running_list[0].saga_id(), running);
        assert_eq!(store.list_by_status(SagaStatus::Failed).len(), 1);
        assert!(store.list_by_status(SagaStatus::Completed).is_empty());
    }

    #[test]
    fn cleanup_deletes_only_old_terminal_sagas() {
        let store = InMemorySagaStore::new();
        let tenant = TenantId::new();
        let old_at = Utc::now() - Duration::days(45);

        let mut old_completed = SagaRecord::new(tenant, specs());
        old_completed.apply(StepResult::succeeded(StepId(0))).unwrap();
        old_completed.apply(StepResult::succeeded(StepId(1))).unwrap();
        store.insert_for_test(old_completed.updated_at_for_test(old_at));

        // Running and just as old, but cleanup must never touch it.
        let old_running = SagaRecord::new(tenant, specs()).updated_at_for_test(old_at);
        let old_running_id = old_running.saga_id();
        store.insert_for_test(old_running);

        let recent_failed = store.create(tenant, specs()).unwrap();
        store
            .advance(recent_failed, StepResult::failed(StepId(0), "boom"))
            .unwrap();

        assert_eq!(store.cleanup_older_than(30), 1);
        assert!(store.get(old_running_id).is_ok());
        assert!(store.get(recent_failed).is_ok());
        assert_eq!(store.stats().total, 2);
    }

    #[test]
    fn stats_count_by_status() {
        let store = InMemorySagaStore::new();
        let tenant = TenantId::new();
        store.create(tenant, specs()).unwrap();
        let failed = store.create(tenant, specs()).unwrap();
        store
            .advance(failed, StepResult::failed(StepId(0), "boom"))
            .unwrap();

        let stats = store.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.running, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.completed, 0);
    }

    #[test]
    fn saga_hook_resolves_steps_from_event_outcomes() {
        let store = InMemorySagaStore::new();
        let saga_id = store.create(TenantId::new(), specs()).unwrap();

        store.step_succeeded(saga_id, StepId(0));
        store.step_failed(saga_id, StepId(1), "campaign migration rejected");

        let record = store.get(saga_id).unwrap();
        assert_eq!(record.status(), SagaStatus::Failed);

        // A late duplicate delivery is absorbed, not an error.
        store.step_succeeded(saga_id, StepId(1));
        assert_eq!(store.get(saga_id).unwrap().status(), SagaStatus::Failed);
    }
}

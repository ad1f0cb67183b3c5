use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use leadstack_core::{EventId, Module, SagaId, StepId, TenantId};

/// Link from an event to the saga step it executes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SagaStepRef {
    pub saga_id: SagaId,
    pub step_id: StepId,
}

/// Envelope for one integration event.
///
/// This is the unit the dispatcher queues and delivers.
///
/// Notes:
/// - **Multi-tenancy** is carried here via `tenant_id`.
/// - The envelope itself is immutable once published; only `attempt_count`
///   advances, and only the dispatcher advances it.
/// - `payload` is an opaque JSON map owned by the originating module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    event_id: EventId,
    tenant_id: TenantId,

    /// Semantic event tag, e.g. `lead.converted`.
    event_type: String,
    origin_module: Module,

    payload: JsonValue,
    created_at: DateTime<Utc>,

    /// Attempts made so far; incremented by the dispatcher per retry.
    attempt_count: u32,

    /// Present when this event executes one step of a saga.
    saga_step: Option<SagaStepRef>,
}

impl EventEnvelope {
    pub fn new(
        tenant_id: TenantId,
        event_type: impl Into<String>,
        origin_module: Module,
        payload: JsonValue,
    ) -> Self {
        Self {
            event_id: EventId::new(),
            tenant_id,
            event_type: event_type.into(),
            origin_module,
            payload,
            created_at: Utc::now(),
            attempt_count: 0,
            saga_step: None,
        }
    }

    /// Attach the saga step this event executes.
    pub fn for_saga_step(mut self, saga_id: SagaId, step_id: StepId) -> Self {
        self.saga_step = Some(SagaStepRef { saga_id, step_id });
        self
    }

    #[cfg(test)]
    pub(crate) fn created_at_for_test(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self
    }

    pub fn event_id(&self) -> EventId {
        self.event_id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn origin_module(&self) -> Module {
        self.origin_module
    }

    pub fn payload(&self) -> &JsonValue {
        &self.payload
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn saga_step(&self) -> Option<SagaStepRef> {
        self.saga_step
    }

    /// Age measured from the original `created_at`.
    ///
    /// Retries never reset the age: a much-retried event eventually crosses
    /// the stale threshold and is skipped by unforced drains.
    pub fn age_in_minutes(&self) -> i64 {
        (Utc::now() - self.created_at).num_minutes()
    }

    pub(crate) fn record_attempt(&mut self) {
        self.attempt_count += 1;
    }
}

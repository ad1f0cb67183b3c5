//! `leadstack-saga` — coordination records for multi-step cross-module
//! transactions.
//!
//! A saga tracks a long-running business flow (e.g. "convert lead: reassign
//! project, migrate campaign, notify owner") as an ordered list of steps. The
//! record's status is monotonic: once `Completed` or `Failed` it never moves
//! again. Step execution itself happens through the event dispatcher; this
//! crate only records outcomes and answers queries.

pub mod record;
pub mod store;

pub use record::{SagaRecord, SagaStatus, SagaStep, SagaStepSpec, StepOutcome, StepResult, StepState};
pub use store::{InMemorySagaStore, SagaStore, SagaStoreError, SagaStoreStats};

/// Terminal sagas older than this are eligible for cleanup.
pub const RETENTION_DAYS: i64 = 30;

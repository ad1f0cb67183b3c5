use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use leadstack_core::{Module, SagaId, StepId, TenantId};

use crate::store::SagaStoreError;

/// Overall state of one saga instance.
///
/// Monotonic: `Running` may become `Completed` or `Failed`; the terminal
/// states never change.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SagaStatus {
    Running,
    Completed,
    Failed,
}

impl SagaStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SagaStatus::Completed | SagaStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStatus::Running => "running",
            SagaStatus::Completed => "completed",
            SagaStatus::Failed => "failed",
        }
    }
}

impl core::fmt::Display for SagaStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of one step within a saga.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum StepState {
    Pending,
    Succeeded,
    Failed { reason: String },
}

/// Blueprint for one step, supplied at saga creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SagaStepSpec {
    /// Module responsible for executing this step.
    pub module: Module,
    /// Human-readable step name, e.g. `reassign_project`.
    pub name: String,
}

impl SagaStepSpec {
    pub fn new(module: Module, name: impl Into<String>) -> Self {
        Self {
            module,
            name: name.into(),
        }
    }
}

/// One step of a running saga.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SagaStep {
    pub step_id: StepId,
    pub module: Module,
    pub name: String,
    pub state: StepState,
}

/// Outcome of executing one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Succeeded,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepResult {
    pub step_id: StepId,
    pub outcome: StepOutcome,
}

impl StepResult {
    pub fn succeeded(step_id: StepId) -> Self {
        Self {
            step_id,
            outcome: StepOutcome::Succeeded,
        }
    }

    pub fn failed(step_id: StepId, reason: impl Into<String>) -> Self {
        Self {
            step_id,
            outcome: StepOutcome::Failed(reason.into()),
        }
    }
}

/// Persistent record of one saga instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SagaRecord {
    saga_id: SagaId,
    tenant_id: TenantId,
    status: SagaStatus,
    steps: Vec<SagaStep>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SagaRecord {
    /// Start a new saga with all steps pending. Step ids are assigned
    /// sequentially from zero.
    pub fn new(tenant_id: TenantId, specs: Vec<SagaStepSpec>) -> Self {
        let now = Utc::now();
        let steps = specs
            .into_iter()
            .enumerate()
            .map(|(i, spec)| SagaStep {
                step_id: StepId(i as u32),
                module: spec.module,
                name: spec.name,
                state: StepState::Pending,
            })
            .collect();
        Self {
            saga_id: SagaId::new(),
            tenant_id,
            status: SagaStatus::Running,
            steps,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn saga_id(&self) -> SagaId {
        self.saga_id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn status(&self) -> SagaStatus {
        self.status
    }

    pub fn steps(&self) -> &[SagaStep] {
        &self.steps
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// The next step awaiting execution, if any.
    pub fn next_pending_step(&self) -> Option<&SagaStep> {
        self.steps
            .iter()
            .find(|s| matches!(s.state, StepState::Pending))
    }

    /// Record the outcome of one step and derive the new saga status.
    ///
    /// Steps resolve strictly in order: the result must be for the first
    /// pending step. A terminal saga rejects any further results so callers
    /// observe monotonicity violations instead of silently losing them.
    pub fn apply(&mut self, result: StepResult) -> Result<SagaStatus, SagaStoreError> {
        if self.status.is_terminal() {
            return Err(SagaStoreError::Terminal(self.saga_id));
        }
        let expected = self
            .next_pending_step()
            .map(|s| s.step_id)
            .ok_or(SagaStoreError::Terminal(self.saga_id))?;
        if !self.steps.iter().any(|s| s.step_id == result.step_id) {
            return Err(SagaStoreError::UnknownStep {
                saga_id: self.saga_id,
                step_id: result.step_id,
            });
        }
        if result.step_id != expected {
            return Err(SagaStoreError::OutOfOrder {
                saga_id: self.saga_id,
                step_id: result.step_id,
                expected,
            });
        }

        let step = &mut self.steps[result.step_id.index()];
        match result.outcome {
            StepOutcome::Succeeded => {
                step.state = StepState::Succeeded;
                if self.next_pending_step().is_none() {
                    self.status = SagaStatus::Completed;
                }
            }
            StepOutcome::Failed(reason) => {
                step.state = StepState::Failed { reason };
                self.status = SagaStatus::Failed;
            }
        }
        self.updated_at = Utc::now();
        Ok(self.status)
    }

    #[cfg(test)]
    pub(crate) fn updated_at_for_test(mut self, at: DateTime<Utc>) -> Self {
        self.updated_at = at;
        self
    }
}

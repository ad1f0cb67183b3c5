use thiserror::Error;

use leadstack_core::{SagaId, StepId};

use crate::envelope::EventEnvelope;

/// Failure reported by an event handler.
///
/// The retry decision is data-driven: handlers classify their own failures
/// instead of signalling "retry me" through a panic or an opaque error type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// A momentarily-invalid precondition; worth another attempt.
    #[error("retryable: {0}")]
    Retryable(String),

    /// The event can never be handled; goes straight to the dead-letter sink.
    #[error("terminal: {0}")]
    Terminal(String),
}

impl HandlerError {
    pub fn retryable(msg: impl Into<String>) -> Self {
        Self::Retryable(msg.into())
    }

    pub fn terminal(msg: impl Into<String>) -> Self {
        Self::Terminal(msg.into())
    }
}

/// Per-event-type handler supplied by a domain module.
///
/// Registration is the only coupling between modules: a module registers zero
/// or more handlers for event types it understands, and the dispatcher knows
/// nothing about the business semantics behind them.
///
/// Handlers must be **idempotent** — delivery is at-least-once — and short:
/// the drain deadline is checked between events, so one slow handler can
/// overrun it by its own duration.
pub trait EventHandler: Send + Sync {
    /// Stable name used in logs and dead-letter diagnostics.
    fn name(&self) -> &str;

    fn handle(&self, event: &EventEnvelope) -> Result<(), HandlerError>;
}

impl<F> EventHandler for (&'static str, F)
where
    F: Fn(&EventEnvelope) -> Result<(), HandlerError> + Send + Sync,
{
    fn name(&self) -> &str {
        self.0
    }

    fn handle(&self, event: &EventEnvelope) -> Result<(), HandlerError> {
        (self.1)(event)
    }
}

/// Callback into the saga layer for events that execute saga steps.
///
/// Kept as a narrow trait so this crate does not depend on the saga store;
/// the wiring layer connects the two. Implementations must not panic — the
/// dispatcher calls them inside its own containment boundary.
pub trait SagaHook: Send + Sync {
    fn step_succeeded(&self, saga_id: SagaId, step_id: StepId);

    fn step_failed(&self, saga_id: SagaId, step_id: StepId, reason: &str);
}

//! `leadstack-events` — cross-module event dispatch.
//!
//! Domain modules publish integration events here instead of calling each
//! other directly. The dispatcher owns the pending/processing queues, applies
//! a fixed-delay retry policy with a hard attempt cap, and dead-letters
//! events that exhaust their retries.
//!
//! ## Delivery guarantees
//!
//! - **At-least-once**: a published event is either handled successfully or
//!   dead-lettered after exactly `max_retries + 1` attempts; it is never
//!   silently dropped.
//! - **No double-claim**: an event id is held by at most one worker at any
//!   instant. Claiming is a single critical section on the queue lock.
//! - **No cross-type ordering**: only an individual event's retry history is
//!   sequential.
//!
//! Handlers must be idempotent — duplicates are possible, exactly-once is not
//! provided.

pub mod dispatcher;
pub mod envelope;
pub mod handler;

pub use dispatcher::{
    DeadLetterEvent, DispatcherConfig, DispatcherStats, DrainOptions, DrainReport,
    EventDispatcher, EventOutcome, ProcessError, ProcessingEntry,
};
pub use envelope::{EventEnvelope, SagaStepRef};
pub use handler::{EventHandler, HandlerError, SagaHook};

//! Cross-module event dispatcher.
//!
//! Owns the pending/processing queues exclusively. Claiming an event
//! (pending → processing) is a single critical section on the queue lock, so
//! two concurrent drain cycles can never claim the same event id.
//!
//! Retry uses a **fixed delay with a hard attempt cap** rather than
//! exponential backoff: cross-module preconditions ("is this lead still
//! assigned to this project") either resolve quickly or not at all, and
//! unbounded backoff would let stale validation decisions accumulate.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use leadstack_core::EventId;

use crate::envelope::EventEnvelope;
use crate::handler::{EventHandler, HandlerError, SagaHook};

/// Runtime-tunable dispatcher configuration.
///
/// Swapped atomically by `configure`; an event keeps the config it was
/// claimed under for its own retry decision.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Retries after the first attempt (so `max_retries + 1` attempts total).
    pub max_retries: u32,
    /// Fixed delay before a failed event becomes claimable again.
    pub retry_delay: Duration,
    /// Events older than this are skipped by unforced drains.
    pub stale_after: Duration,
    /// Processing entries older than this are reported as stuck.
    pub stuck_after: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(5),
            stale_after: Duration::from_secs(60 * 60),
            stuck_after: Duration::from_secs(5 * 60),
        }
    }
}

/// Options for one drain cycle.
#[derive(Debug, Copy, Clone)]
pub struct DrainOptions {
    /// Maximum events to claim in this cycle.
    pub limit: usize,
    /// Cooperative deadline, checked between events.
    pub timeout: Duration,
    /// Process events past the stale threshold as well.
    pub force: bool,
}

impl Default for DrainOptions {
    fn default() -> Self {
        Self {
            limit: 100,
            timeout: Duration::from_secs(300),
            force: false,
        }
    }
}

/// Outcome of one drain cycle.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// Events handled successfully.
    pub processed: usize,
    /// Events whose attempt ended in a retry or the dead-letter sink.
    pub errors: usize,
    /// Stale events left pending (not dropped) because `force` was unset.
    pub skipped: usize,
}

/// Snapshot of one claimed event, for stuck-event reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessingEntry {
    pub event_id: EventId,
    pub event_type: String,
    pub claimed_at: DateTime<Utc>,
}

/// Event that exhausted its retries (or failed terminally).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeadLetterEvent {
    pub envelope: EventEnvelope,
    pub reason: String,
    pub dead_lettered_at: DateTime<Utc>,
}

/// Dispatcher statistics, shaped for the operational surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatcherStats {
    pub queue_size: usize,
    pub processing_count: usize,
    pub dead_letter_count: usize,
    pub max_retries: u32,
    pub retry_delay_secs: u64,
    pub total_processed: u64,
    pub total_errors: u64,
    pub total_dead_lettered: u64,
}

/// Result of processing one claimed event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// Handled successfully and discarded.
    Handled,
    /// Failed; returned to pending with the given attempt count recorded.
    Retried { attempt: u32 },
    /// Moved to the dead-letter sink.
    DeadLettered { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProcessError {
    /// The event is not in the pending queue (unknown, already claimed, or
    /// still inside its retry delay).
    #[error("event not claimable: {0}")]
    NotClaimable(EventId),
}

struct PendingEvent {
    envelope: EventEnvelope,
    /// Earliest instant the event may be claimed again (retry delay).
    not_before: Option<DateTime<Utc>>,
}

struct QueueState {
    pending: VecDeque<PendingEvent>,
    processing: HashMap<EventId, ProcessingEntry>,
    dead_letters: Vec<DeadLetterEvent>,
}

#[derive(Default)]
struct DispatchTotals {
    processed: u64,
    errors: u64,
    dead_lettered: u64,
}

struct ClaimedEvent {
    envelope: EventEnvelope,
    /// Config snapshot taken at claim time; reconfiguration mid-flight does
    /// not change this event's retry decision.
    config: DispatcherConfig,
}

/// In-process integration event dispatcher.
///
/// Constructed once at process start and shared by reference; there is no
/// hidden static state.
pub struct EventDispatcher {
    state: Mutex<QueueState>,
    config: RwLock<DispatcherConfig>,
    handlers: RwLock<HashMap<String, Vec<Arc<dyn EventHandler>>>>,
    saga_hook: RwLock<Option<Arc<dyn SagaHook>>>,
    totals: Mutex<DispatchTotals>,
}

impl EventDispatcher {
    pub fn new(config: DispatcherConfig) -> Self {
        Self {
            state: Mutex::new(QueueState {
                pending: VecDeque::new(),
                processing: HashMap::new(),
                dead_letters: Vec::new(),
            }),
            config: RwLock::new(config),
            handlers: RwLock::new(HashMap::new()),
            saga_hook: RwLock::new(None),
            totals: Mutex::new(DispatchTotals::default()),
        }
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new(DispatcherConfig::default()))
    }

    /// Register a handler for an event type. Any module may register zero or
    /// more handlers for types it understands.
    pub fn register_handler(&self, event_type: impl Into<String>, handler: Arc<dyn EventHandler>) {
        let event_type = event_type.into();
        debug!(event_type = %event_type, handler = handler.name(), "handler registered");
        self.handlers
            .write()
            .expect("handler registry lock poisoned")
            .entry(event_type)
            .or_default()
            .push(handler);
    }

    /// Connect the saga layer; events carrying a saga step reference report
    /// their outcome through this hook.
    pub fn set_saga_hook(&self, hook: Arc<dyn SagaHook>) {
        *self.saga_hook.write().expect("saga hook lock poisoned") = Some(hook);
    }

    /// Append an event to the pending queue.
    ///
    /// Never runs handlers inline and never blocks on handler execution; safe
    /// to call from any thread at any time.
    pub fn publish(&self, envelope: EventEnvelope) {
        debug!(
            event_id = %envelope.event_id(),
            event_type = envelope.event_type(),
            origin = %envelope.origin_module(),
            "event published"
        );
        self.lock_state().pending.push_back(PendingEvent {
            envelope,
            not_before: None,
        });
    }

    /// Snapshot of events not yet claimed by a worker.
    pub fn pending_events(&self) -> Vec<EventEnvelope> {
        self.lock_state()
            .pending
            .iter()
            .map(|p| p.envelope.clone())
            .collect()
    }

    /// Snapshot of currently-claimed events, with claim timestamps so callers
    /// can spot stuck entries. Reporting only; nothing is auto-recovered.
    pub fn processing_events(&self) -> Vec<ProcessingEntry> {
        self.lock_state().processing.values().cloned().collect()
    }

    /// Snapshot of the dead-letter sink.
    pub fn dead_letters(&self) -> Vec<DeadLetterEvent> {
        self.lock_state().dead_letters.clone()
    }

    /// Event types that currently have at least one registered handler.
    pub fn registered_event_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self
            .handlers
            .read()
            .expect("handler registry lock poisoned")
            .keys()
            .cloned()
            .collect();
        types.sort();
        types
    }

    /// Claim and process one specific pending event.
    pub fn process_event(&self, event_id: EventId) -> Result<EventOutcome, ProcessError> {
        let config = self.current_config();
        let claimed = {
            let mut state = self.lock_state();
            let now = Utc::now();
            let position = state
                .pending
                .iter()
                .position(|p| {
                    p.envelope.event_id() == event_id
                        && p.not_before.is_none_or(|t| t <= now)
                })
                .ok_or(ProcessError::NotClaimable(event_id))?;
            let pending = state
                .pending
                .remove(position)
                .ok_or(ProcessError::NotClaimable(event_id))?;
            claim(&mut state, pending.envelope, config)
        };
        Ok(self.run_claimed(claimed))
    }

    /// Drain up to `limit` pending events or until the deadline passes.
    ///
    /// The deadline is cooperative: it is checked between events, and an
    /// already-claimed event is allowed to finish. Stale events (older than
    /// the configured threshold) are skipped, not dropped, unless `force` is
    /// set — re-triggering business logic that depended on time-sensitive
    /// external state is an operator decision.
    pub fn process_queue(&self, options: DrainOptions) -> DrainReport {
        let deadline = Instant::now() + options.timeout;
        let mut report = DrainReport::default();

        if !options.force {
            let stale_after = self.current_config().stale_after;
            report.skipped = self
                .lock_state()
                .pending
                .iter()
                .filter(|p| is_stale(&p.envelope, stale_after))
                .count();
        }

        while report.processed + report.errors < options.limit {
            if Instant::now() >= deadline {
                debug!("drain deadline reached; leaving remaining events pending");
                break;
            }
            let Some(claimed) = self.claim_next(options.force) else {
                break;
            };
            match self.run_claimed(claimed) {
                EventOutcome::Handled => report.processed += 1,
                EventOutcome::Retried { .. } | EventOutcome::DeadLettered { .. } => {
                    report.errors += 1;
                }
            }
        }

        info!(
            processed = report.processed,
            errors = report.errors,
            skipped = report.skipped,
            "drain cycle finished"
        );
        report
    }

    /// Discard all pending and processing state.
    ///
    /// Maintenance tooling only; never part of a normal business flow.
    pub fn clear_queue(&self) -> usize {
        let mut state = self.lock_state();
        let dropped = state.pending.len() + state.processing.len();
        state.pending.clear();
        state.processing.clear();
        if dropped > 0 {
            warn!(dropped, "event queue cleared");
        }
        dropped
    }

    /// Drop all dead-letter entries.
    pub fn clear_dead_letters(&self) -> usize {
        let mut state = self.lock_state();
        let dropped = state.dead_letters.len();
        state.dead_letters.clear();
        dropped
    }

    pub fn stats(&self) -> DispatcherStats {
        let state = self.lock_state();
        let config = self.current_config();
        let totals = self.totals.lock().expect("totals lock poisoned");
        DispatcherStats {
            queue_size: state.pending.len(),
            processing_count: state.processing.len(),
            dead_letter_count: state.dead_letters.len(),
            max_retries: config.max_retries,
            retry_delay_secs: config.retry_delay.as_secs(),
            total_processed: totals.processed,
            total_errors: totals.errors,
            total_dead_lettered: totals.dead_lettered,
        }
    }

    pub fn config(&self) -> DispatcherConfig {
        self.current_config()
    }

    /// Atomically swap the configuration.
    ///
    /// Applies to events claimed after the call; an in-flight event keeps the
    /// config captured at its claim.
    pub fn configure(&self, config: DispatcherConfig) {
        info!(
            max_retries = config.max_retries,
            retry_delay_secs = config.retry_delay.as_secs(),
            "dispatcher reconfigured"
        );
        *self.config.write().expect("config lock poisoned") = config;
    }

    fn current_config(&self) -> DispatcherConfig {
        *self.config.read().expect("config lock poisoned")
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.state.lock().expect("queue lock poisoned")
    }

    /// Claim the oldest claimable pending event. One critical section: the
    /// removal from pending and the processing insert are never observable
    /// separately.
    fn claim_next(&self, force: bool) -> Option<ClaimedEvent> {
        let config = self.current_config();
        let mut state = self.lock_state();
        let now = Utc::now();

        let position = state.pending.iter().position(|p| {
            p.not_before.is_none_or(|t| t <= now)
                && (force || !is_stale(&p.envelope, config.stale_after))
        })?;
        let pending = state.pending.remove(position)?;
        Some(claim(&mut state, pending.envelope, config))
    }

    fn run_claimed(&self, claimed: ClaimedEvent) -> EventOutcome {
        let ClaimedEvent {
            mut envelope,
            config,
        } = claimed;

        let handlers: Vec<Arc<dyn EventHandler>> = self
            .handlers
            .read()
            .expect("handler registry lock poisoned")
            .get(envelope.event_type())
            .cloned()
            .unwrap_or_default();

        let failure = if handlers.is_empty() {
            Some(HandlerError::retryable(format!(
                "no handler registered for event type {}",
                envelope.event_type()
            )))
        } else {
            run_handlers(&handlers, &envelope)
        };

        envelope.record_attempt();

        match failure {
            None => {
                let event_id = envelope.event_id();
                {
                    let mut state = self.lock_state();
                    state.processing.remove(&event_id);
                }
                self.bump_totals(|t| t.processed += 1);
                debug!(event_id = %event_id, event_type = envelope.event_type(), "event handled");
                if let Some(step) = envelope.saga_step() {
                    self.with_saga_hook(|h| h.step_succeeded(step.saga_id, step.step_id));
                }
                EventOutcome::Handled
            }
            Some(HandlerError::Retryable(reason))
                if envelope.attempt_count() <= config.max_retries =>
            {
                let attempt = envelope.attempt_count();
                debug!(
                    event_id = %envelope.event_id(),
                    attempt,
                    reason = %reason,
                    "handler failed; event returned to pending"
                );
                let not_before = Utc::now()
                    + chrono::Duration::from_std(config.retry_delay)
                        .unwrap_or_else(|_| chrono::Duration::zero());
                let mut state = self.lock_state();
                state.processing.remove(&envelope.event_id());
                state.pending.push_back(PendingEvent {
                    envelope,
                    not_before: Some(not_before),
                });
                drop(state);
                self.bump_totals(|t| t.errors += 1);
                EventOutcome::Retried { attempt }
            }
            Some(err) => {
                let reason = match err {
                    HandlerError::Terminal(r) => r,
                    HandlerError::Retryable(r) => {
                        format!("retries exhausted after {} attempts: {r}", envelope.attempt_count())
                    }
                };
                self.dead_letter(envelope, reason.clone());
                EventOutcome::DeadLettered { reason }
            }
        }
    }

    fn dead_letter(&self, envelope: EventEnvelope, reason: String) {
        warn!(
            event_id = %envelope.event_id(),
            event_type = envelope.event_type(),
            attempts = envelope.attempt_count(),
            reason = %reason,
            "event dead-lettered"
        );
        if let Some(step) = envelope.saga_step() {
            let reason = reason.clone();
            self.with_saga_hook(move |h| h.step_failed(step.saga_id, step.step_id, &reason));
        }
        let mut state = self.lock_state();
        state.processing.remove(&envelope.event_id());
        state.dead_letters.push(DeadLetterEvent {
            envelope,
            reason,
            dead_lettered_at: Utc::now(),
        });
        drop(state);
        self.bump_totals(|t| {
            t.errors += 1;
            t.dead_lettered += 1;
        });
    }

    fn with_saga_hook(&self, f: impl FnOnce(&dyn SagaHook)) {
        let hook = self
            .saga_hook
            .read()
            .expect("saga hook lock poisoned")
            .clone();
        if let Some(hook) = hook {
            f(hook.as_ref());
        }
    }

    fn bump_totals(&self, f: impl FnOnce(&mut DispatchTotals)) {
        f(&mut self.totals.lock().expect("totals lock poisoned"));
    }
}

fn is_stale(envelope: &EventEnvelope, stale_after: Duration) -> bool {
    envelope.age_in_minutes() >= (stale_after.as_secs() / 60) as i64
}

fn claim(state: &mut QueueState, envelope: EventEnvelope, config: DispatcherConfig) -> ClaimedEvent {
    state.processing.insert(
        envelope.event_id(),
        ProcessingEntry {
            event_id: envelope.event_id(),
            event_type: envelope.event_type().to_string(),
            claimed_at: Utc::now(),
        },
    );
    ClaimedEvent { envelope, config }
}

/// Run all handlers for the type; the most severe failure wins (terminal
/// beats retryable). Handler errors never propagate to the publisher.
fn run_handlers(
    handlers: &[Arc<dyn EventHandler>],
    envelope: &EventEnvelope,
) -> Option<HandlerError> {
    let mut failure: Option<HandlerError> = None;
    for handler in handlers {
        match handler.handle(envelope) {
            Ok(()) => {}
            Err(err @ HandlerError::Terminal(_)) => {
                warn!(
                    event_id = %envelope.event_id(),
                    handler = handler.name(),
                    error = %err,
                    "handler reported terminal failure"
                );
                return Some(err);
            }
            Err(err) => {
                debug!(
                    event_id = %envelope.event_id(),
                    handler = handler.name(),
                    error = %err,
                    "handler reported retryable failure"
                );
                failure.get_or_insert(err);
            }
        }
    }
    failure
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use std::thread;

    use leadstack_core::{Module, SagaId, StepId, TenantId};

    fn envelope(event_type: &str) -> EventEnvelope {
        EventEnvelope::new(
            TenantId::new(),
            event_type,
            Module::Leads,
            serde_json::json!({"lead_id": 42}),
        )
    }

    fn fast_retry_config(max_retries: u32) -> DispatcherConfig {
        DispatcherConfig {
            max_retries,
            retry_delay: Duration::ZERO,
            ..Default::default()
        }
    }

    fn counting_handler(
        name: &'static str,
        calls: Arc<AtomicU32>,
        result: fn() -> Result<(), HandlerError>,
    ) -> Arc<dyn EventHandler> {
        Arc::new((name, move |_: &EventEnvelope| {
            calls.fetch_add(1, Ordering::SeqCst);
            result()
        }))
    }

    #[test]
    fn publish_never_runs_handlers_inline() {
        let dispatcher = EventDispatcher::new(DispatcherConfig::default());
        let calls = Arc::new(AtomicU32::new(0));
        dispatcher.register_handler(
            "lead.created",
            counting_handler("spy", calls.clone(), || Ok(())),
        );

        dispatcher.publish(envelope("lead.created"));

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(dispatcher.stats().queue_size, 1);
    }

    #[test]
    fn successful_event_is_discarded() {
        let dispatcher = EventDispatcher::new(DispatcherConfig::default());
        let calls = Arc::new(AtomicU32::new(0));
        dispatcher.register_handler(
            "lead.created",
            counting_handler("spy", calls.clone(), || Ok(())),
        );

        let ev = envelope("lead.created");
        let id = ev.event_id();
        dispatcher.publish(ev);

        let outcome = dispatcher.process_event(id).unwrap();
        assert_eq!(outcome, EventOutcome::Handled);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let stats = dispatcher.stats();
        assert_eq!(stats.queue_size, 0);
        assert_eq!(stats.processing_count, 0);
        assert_eq!(stats.total_processed, 1);
    }

    #[test]
    fn failing_event_attempted_exactly_max_retries_plus_one_then_dead_lettered() {
        let dispatcher = EventDispatcher::new(fast_retry_config(3));
        let calls = Arc::new(AtomicU32::new(0));
        dispatcher.register_handler(
            "lead.converted",
            counting_handler("always-fails", calls.clone(), || {
                Err(HandlerError::retryable("project assignment missing"))
            }),
        );

        dispatcher.publish(envelope("lead.converted"));
        let report = dispatcher.process_queue(DrainOptions::default());

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(report.processed, 0);
        assert_eq!(report.errors, 4);

        let stats = dispatcher.stats();
        assert_eq!(stats.queue_size, 0);
        assert_eq!(stats.dead_letter_count, 1);

        let dead = dispatcher.dead_letters();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].envelope.attempt_count(), 4);
        assert!(dead[0].reason.contains("retries exhausted"));
    }

    #[test]
    fn terminal_failure_dead_letters_without_retry() {
        let dispatcher = EventDispatcher::new(fast_retry_config(3));
        let calls = Arc::new(AtomicU32::new(0));
        dispatcher.register_handler(
            "campaign.sent",
            counting_handler("rejects", calls.clone(), || {
                Err(HandlerError::terminal("campaign deleted"))
            }),
        );

        dispatcher.publish(envelope("campaign.sent"));
        dispatcher.process_queue(DrainOptions::default());

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.stats().dead_letter_count, 1);
        assert_eq!(dispatcher.dead_letters()[0].reason, "campaign deleted");
    }

    #[test]
    fn unhandled_event_type_eventually_dead_letters() {
        let dispatcher = EventDispatcher::new(fast_retry_config(1));
        dispatcher.publish(envelope("nobody.listens"));

        let report = dispatcher.process_queue(DrainOptions::default());

        assert_eq!(report.errors, 2);
        let dead = dispatcher.dead_letters();
        assert_eq!(dead.len(), 1);
        assert!(dead[0].reason.contains("no handler registered"));
    }

    #[test]
    fn retry_delay_keeps_event_unclaimable() {
        let dispatcher = EventDispatcher::new(DispatcherConfig {
            max_retries: 3,
            retry_delay: Duration::from_secs(60),
            ..Default::default()
        });
        dispatcher.register_handler(
            "lead.converted",
            Arc::new(("fails", |_: &EventEnvelope| {
                Err(HandlerError::retryable("not yet"))
            })),
        );

        dispatcher.publish(envelope("lead.converted"));
        let report = dispatcher.process_queue(DrainOptions::default());

        // One attempt, then the event sits out its retry delay.
        assert_eq!(report.errors, 1);
        assert_eq!(dispatcher.stats().queue_size, 1);
        assert_eq!(dispatcher.pending_events()[0].attempt_count(), 1);

        // Still not claimable.
        let id = dispatcher.pending_events()[0].event_id();
        assert!(matches!(
            dispatcher.process_event(id),
            Err(ProcessError::NotClaimable(_))
        ));
    }

    #[test]
    fn concurrent_drains_never_double_claim() {
        let dispatcher = Arc::new(EventDispatcher::new(DispatcherConfig::default()));
        let handled = Arc::new(AtomicUsize::new(0));
        let handled_clone = handled.clone();
        dispatcher.register_handler(
            "project.created",
            Arc::new(("slow", move |_: &EventEnvelope| {
                handled_clone.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(5));
                Ok(())
            })),
        );

        for _ in 0..10 {
            dispatcher.publish(envelope("project.created"));
        }

        let workers: Vec<_> = (0..2)
            .map(|_| {
                let d = dispatcher.clone();
                thread::spawn(move || {
                    d.process_queue(DrainOptions {
                        limit: 10,
                        ..Default::default()
                    })
                })
            })
            .collect();
        let reports: Vec<DrainReport> = workers.into_iter().map(|w| w.join().unwrap()).collect();

        assert_eq!(handled.load(Ordering::SeqCst), 10);
        assert_eq!(reports.iter().map(|r| r.processed).sum::<usize>(), 10);
        assert_eq!(dispatcher.stats().queue_size, 0);
        assert_eq!(dispatcher.stats().processing_count, 0);
    }

    #[test]
    fn stale_events_are_skipped_unless_forced() {
        let dispatcher = EventDispatcher::new(DispatcherConfig::default());
        dispatcher.register_handler("old.news", Arc::new(("ok", |_: &EventEnvelope| Ok(()))));

        let stale = envelope("old.news").created_at_for_test(Utc::now() - chrono::Duration::hours(2));
        dispatcher.publish(stale);

        let report = dispatcher.process_queue(DrainOptions::default());
        assert_eq!(report, DrainReport { processed: 0, errors: 0, skipped: 1 });
        assert_eq!(dispatcher.stats().queue_size, 1);

        let forced = dispatcher.process_queue(DrainOptions {
            force: true,
            ..Default::default()
        });
        assert_eq!(forced.processed, 1);
        assert_eq!(forced.skipped, 0);
        assert_eq!(dispatcher.stats().queue_size, 0);
    }

    #[test]
    fn drain_deadline_is_checked_between_events() {
        let dispatcher = EventDispatcher::new(DispatcherConfig::default());
        dispatcher.register_handler(
            "slow.handler",
            Arc::new(("sleepy", |_: &EventEnvelope| {
                thread::sleep(Duration::from_millis(60));
                Ok(())
            })),
        );

        for _ in 0..5 {
            dispatcher.publish(envelope("slow.handler"));
        }

        let report = dispatcher.process_queue(DrainOptions {
            limit: 5,
            timeout: Duration::from_millis(100),
            force: false,
        });

        assert!(report.processed >= 1);
        assert!(report.processed < 5, "deadline should stop the drain early");
        assert_eq!(
            dispatcher.stats().queue_size,
            5 - report.processed,
            "unclaimed events stay pending"
        );
    }

    #[test]
    fn reconfigure_applies_to_events_claimed_afterwards() {
        let dispatcher = Arc::new(EventDispatcher::new(fast_retry_config(3)));
        let inner = dispatcher.clone();
        dispatcher.register_handler(
            "config.probe",
            Arc::new(("reconfigures", move |_: &EventEnvelope| {
                // Tighten the cap mid-flight; this event was claimed under
                // max_retries = 3 and must still be retried.
                inner.configure(fast_retry_config(0));
                Err(HandlerError::retryable("try again"))
            })),
        );

        let ev = envelope("config.probe");
        let id = ev.event_id();
        dispatcher.publish(ev);

        let outcome = dispatcher.process_event(id).unwrap();
        assert_eq!(outcome, EventOutcome::Retried { attempt: 1 });
        assert_eq!(dispatcher.stats().queue_size, 1);

        // The next claim sees max_retries = 0 and dead-letters.
        let outcome = dispatcher.process_event(id).unwrap();
        assert!(matches!(outcome, EventOutcome::DeadLettered { .. }));
    }

    #[test]
    fn clear_queue_discards_pending_and_processing() {
        let dispatcher = EventDispatcher::new(DispatcherConfig::default());
        dispatcher.publish(envelope("a"));
        dispatcher.publish(envelope("b"));

        assert_eq!(dispatcher.clear_queue(), 2);
        assert_eq!(dispatcher.stats().queue_size, 0);
        assert!(dispatcher.pending_events().is_empty());
    }

    #[test]
    fn saga_hook_observes_success_and_dead_letter() {
        #[derive(Default)]
        struct RecordingHook {
            succeeded: Mutex<Vec<(SagaId, StepId)>>,
            failed: Mutex<Vec<(SagaId, StepId, String)>>,
        }
        impl SagaHook for RecordingHook {
            fn step_succeeded(&self, saga_id: SagaId, step_id: StepId) {
                self.succeeded.lock().unwrap().push((saga_id, step_id));
            }
            fn step_failed(&self, saga_id: SagaId, step_id: StepId, reason: &str) {
                self.failed
                    .lock()
                    .unwrap()
                    .push((saga_id, step_id, reason.to_string()));
            }
        }

        let dispatcher = EventDispatcher::new(fast_retry_config(0));
        let hook = Arc::new(RecordingHook::default());
        dispatcher.set_saga_hook(hook.clone());
        dispatcher.register_handler("step.ok", Arc::new(("ok", |_: &EventEnvelope| Ok(()))));
        dispatcher.register_handler(
            "step.bad",
            Arc::new(("bad", |_: &EventEnvelope| {
                Err(HandlerError::retryable("boom"))
            })),
        );

        let saga_id = SagaId::new();
        dispatcher.publish(envelope("step.ok").for_saga_step(saga_id, StepId(0)));
        dispatcher.publish(envelope("step.bad").for_saga_step(saga_id, StepId(1)));
        dispatcher.process_queue(DrainOptions::default());

        assert_eq!(hook.succeeded.lock().unwrap().as_slice(), &[(saga_id, StepId(0))]);
        let failed = hook.failed.lock().unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].0, saga_id);
        assert_eq!(failed[0].1, StepId(1));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(16))]

            /// Two concurrent drains over any queue claim every event exactly once.
            #[test]
            fn every_event_claimed_exactly_once(n in 1usize..32) {
                let dispatcher = Arc::new(EventDispatcher::new(DispatcherConfig::default()));
                let handled = Arc::new(AtomicUsize::new(0));
                let handled_clone = handled.clone();
                dispatcher.register_handler(
                    "prop.event",
                    Arc::new(("count", move |_: &EventEnvelope| {
                        handled_clone.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })),
                );

                for _ in 0..n {
                    dispatcher.publish(envelope("prop.event"));
                }

                let workers: Vec<_> = (0..2)
                    .map(|_| {
                        let d = dispatcher.clone();
                        thread::spawn(move || {
                            d.process_queue(DrainOptions { limit: n, ..Default::default() })
                        })
                    })
                    .collect();
                let total: usize = workers
                    .into_iter()
                    .map(|w| w.join().unwrap().processed)
                    .sum();

                prop_assert_eq!(total, n);
                prop_assert_eq!(handled.load(Ordering::SeqCst), n);
                prop_assert_eq!(dispatcher.stats().queue_size, 0);
            }
        }
    }
}

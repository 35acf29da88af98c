//! Supervisor event logging for the worker daemon.
//!
//! Every taskvisor event becomes one tracing record under the `strand::supervisor`
//! target. Severity follows how much an operator should care: restarts and
//! failures are loud, bookkeeping is trace.

use async_trait::async_trait;
use taskvisor::{Event, EventKind, Subscribe};
use tracing::Level;

const QUEUE_CAPACITY: usize = 1024;

/// Logs supervisor events of the worker daemon.
#[derive(Debug, Default, Clone, Copy)]
pub struct SupervisorEvents;

#[async_trait]
impl Subscribe for SupervisorEvents {
    async fn on_event(&self, event: &Event) {
        record(event);
    }

    fn name(&self) -> &'static str {
        "strand-supervisor-events"
    }

    fn queue_capacity(&self) -> usize {
        QUEUE_CAPACITY
    }
}

macro_rules! emit {
    ($lvl:expr, $($rest:tt)+) => {{
        let lvl = $lvl;
        if lvl == Level::ERROR {
            tracing::error!(target: "strand::supervisor", $($rest)+)
        } else if lvl == Level::WARN {
            tracing::warn!(target: "strand::supervisor", $($rest)+)
        } else if lvl == Level::INFO {
            tracing::info!(target: "strand::supervisor", $($rest)+)
        } else if lvl == Level::DEBUG {
            tracing::debug!(target: "strand::supervisor", $($rest)+)
        } else {
            tracing::trace!(target: "strand::supervisor", $($rest)+)
        }
    }};
}

fn record(e: &Event) {
    let task = e.task.as_deref().unwrap_or("-");
    let reason = e.reason.as_deref().unwrap_or("");
    let attempt = e.attempt.unwrap_or(0);
    let (level, message) = describe(e);

    match e.kind {
        EventKind::BackoffScheduled => emit!(
            level,
            task,
            attempt,
            delay_ms = e.delay_ms.unwrap_or(0),
            reason,
            "{message}"
        ),
        EventKind::TimeoutHit => emit!(
            level,
            task,
            timeout_ms = e.timeout_ms.unwrap_or(0),
            "{message}"
        ),
        EventKind::ShutdownRequested
        | EventKind::AllStoppedWithinGrace
        | EventKind::GraceExceeded => emit!(level, "{message}"),
        _ => emit!(level, task, attempt, reason, "{message}"),
    }
}

/// Severity and log line for an event.
fn describe(e: &Event) -> (Level, &'static str) {
    match e.kind {
        EventKind::TaskAddRequested => (Level::TRACE, "server task add requested"),
        EventKind::TaskAdded => (Level::DEBUG, "server task registered"),
        EventKind::TaskRemoveRequested => (Level::TRACE, "server task removal requested"),
        EventKind::TaskRemoved => (Level::TRACE, "server task removed"),

        EventKind::TaskStarting if e.attempt.unwrap_or(0) > 1 => {
            (Level::WARN, "restarting worker server")
        }
        EventKind::TaskStarting => (Level::INFO, "starting worker server"),
        EventKind::TaskStopped => (Level::INFO, "worker server stopped"),
        EventKind::TaskFailed => (Level::ERROR, "worker server failed"),
        EventKind::TimeoutHit => (Level::WARN, "worker server attempt timed out"),
        EventKind::BackoffScheduled if e.reason.is_some() => {
            (Level::WARN, "worker server restart scheduled")
        }
        EventKind::BackoffScheduled => (Level::DEBUG, "next worker server run scheduled"),

        EventKind::ActorExhausted => (Level::ERROR, "worker server gave up restarting"),
        EventKind::ActorDead => (Level::ERROR, "worker server terminated permanently"),

        EventKind::ShutdownRequested => (Level::INFO, "shutdown requested"),
        EventKind::AllStoppedWithinGrace => (Level::INFO, "worker stopped cleanly"),
        EventKind::GraceExceeded => (Level::WARN, "grace period exceeded during shutdown"),

        EventKind::SubscriberPanicked => (Level::ERROR, "event subscriber panicked"),
        EventKind::SubscriberOverflow => (Level::WARN, "event subscriber dropped an event"),

        EventKind::ControllerRejected => (Level::WARN, "controller rejected submission"),
        EventKind::ControllerSubmitted => (Level::TRACE, "controller accepted submission"),
        EventKind::ControllerSlotTransition => (Level::DEBUG, "controller slot transition"),
    }
}

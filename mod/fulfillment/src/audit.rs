//! External collaborator interfaces: audit recorder and status notifier.
//!
//! Both are fire-and-forget. The engine calls them after a transition has
//! been durably saved; implementations must not block, and nothing they do
//! can fail or roll back the transition. Production wiring logs through
//! `tracing`; remote implementations would hand the event to a spawned task.

use std::sync::Mutex;

use serde::Serialize;
use tracing::info;

use crate::model::OrderStatus;

// ---------------------------------------------------------------------------
// AuditRecorder
// ---------------------------------------------------------------------------

/// One immutable activity record for a state-changing action.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub actor_id: String,
    pub actor_name: String,
    /// Action key, e.g. `"order.assign"`.
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    /// Human-readable description, tagged `(same person)` on overrides.
    pub details: String,
    /// Structured context (machine id, status, warning, ...).
    pub metadata: serde_json::Value,
}

/// Receives an immutable event for every state-changing action.
///
/// The signature is infallible on purpose: recording is best-effort and an
/// implementation swallows (and logs) its own failures.
pub trait AuditRecorder: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Production default: emits the event as a structured log line.
pub struct TracingRecorder;

impl AuditRecorder for TracingRecorder {
    fn record(&self, event: AuditEvent) {
        info!(
            actor = %event.actor_id,
            action = %event.action,
            entity_type = %event.entity_type,
            entity = %event.entity_id,
            metadata = %event.metadata,
            "{}",
            event.details
        );
    }
}

/// Captures events in memory. Used for testing.
#[derive(Default)]
pub struct MemoryRecorder {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().expect("recorder lock").clone()
    }
}

impl AuditRecorder for MemoryRecorder {
    fn record(&self, event: AuditEvent) {
        self.events.lock().expect("recorder lock").push(event);
    }
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

/// Outbound status-change notification. Fire-and-forget: must not block and
/// must never fail the triggering transition.
pub trait Notifier: Send + Sync {
    /// `exclude_actor` is the person who caused the change (no self-notify).
    fn status_changed(&self, order_id: &str, status: OrderStatus, exclude_actor: &str);
}

/// No-op notifier for deployments without push delivery.
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn status_changed(&self, _order_id: &str, _status: OrderStatus, _exclude_actor: &str) {}
}

/// Captures notifications in memory. Used for testing.
#[derive(Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<(String, OrderStatus)>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(String, OrderStatus)> {
        self.sent.lock().expect("notifier lock").clone()
    }
}

impl Notifier for MemoryNotifier {
    fn status_changed(&self, order_id: &str, status: OrderStatus, _exclude_actor: &str) {
        self.sent
            .lock()
            .expect("notifier lock")
            .push((order_id.to_string(), status));
    }
}

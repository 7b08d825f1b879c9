//! The fulfillment engine — assignment ledger + order state machine.
//!
//! Every operation is a single logical transaction: load, validate, mutate,
//! conditional save. Contention is handled by the store's version CAS; the
//! engine retries a bounded number of times with freshly loaded state, so an
//! operation is idempotent in effect rather than naively re-applied. Audit
//! and notification happen after the save and can never fail the transition.

mod checkout;
mod dryer;
mod folding;

use std::sync::Arc;

use tracing::warn;

use washflow_core::{Clock, ListResult, ServiceError, new_id};

use crate::audit::{AuditEvent, AuditRecorder, Notifier};
use crate::model::{
    Actor, Assignment, Bag, CreateOrderRequest, Machine, MachineStatus, MachineType, Order,
    OrderListQuery, OrderStatus, ReleaseOutcome, StatusChange,
};
use crate::status;
use crate::store::FulfillmentStore;

// ---------------------------------------------------------------------------
// WorkflowConfig
// ---------------------------------------------------------------------------

/// Per-location workflow policy.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Track the wash→dry transfer as its own checked stage.
    pub transfer_tracking: bool,
    /// Max attempts for a conditional save before surfacing
    /// `PersistenceConflict` to the caller.
    pub max_save_attempts: u32,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            transfer_tracking: false,
            max_save_attempts: 3,
        }
    }
}

// ---------------------------------------------------------------------------
// FulfillmentEngine
// ---------------------------------------------------------------------------

/// The workflow engine.
///
/// This is a **state machine over physical work**, not a scheduler. It:
/// - Records machine occupancy in the assignment ledger.
/// - Derives and caches the order status from the ledger + checkpoints.
/// - Enforces the dual-control policy at every verification checkpoint.
/// - Emits one audit event per accepted transition and one outbound
///   notification per status change.
pub struct FulfillmentEngine {
    store: Arc<dyn FulfillmentStore>,
    audit: Arc<dyn AuditRecorder>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    config: WorkflowConfig,
}

impl FulfillmentEngine {
    pub fn new(
        store: Arc<dyn FulfillmentStore>,
        audit: Arc<dyn AuditRecorder>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::with_config(store, audit, notifier, clock, WorkflowConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn FulfillmentStore>,
        audit: Arc<dyn AuditRecorder>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        config: WorkflowConfig,
    ) -> Self {
        Self {
            store,
            audit,
            notifier,
            clock,
            config,
        }
    }

    /// Access the underlying store.
    pub fn store(&self) -> &Arc<dyn FulfillmentStore> {
        &self.store
    }

    pub(crate) fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub(crate) fn now(&self) -> String {
        self.clock.now_rfc3339()
    }

    // =======================================================================
    // Shared plumbing
    // =======================================================================

    /// Load-mutate-save with bounded retry on version conflicts.
    ///
    /// The closure runs against freshly loaded state on every attempt, so a
    /// retried operation revalidates against whatever the concurrent writer
    /// did (e.g. the loser of a double scan observes the open assignment and
    /// fails with `Conflict` instead of double-appending).
    pub(crate) fn update_order<T>(
        &self,
        order_id: &str,
        mut op: impl FnMut(&mut Order) -> Result<T, ServiceError>,
    ) -> Result<(Order, T), ServiceError> {
        self.update_order_raw(order_id, false, &mut op)
    }

    fn update_order_raw<T>(
        &self,
        order_id: &str,
        allow_deleted: bool,
        op: &mut impl FnMut(&mut Order) -> Result<T, ServiceError>,
    ) -> Result<(Order, T), ServiceError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut order = self.store.find_order(order_id)?;
            if order.deleted && !allow_deleted {
                return Err(ServiceError::NotFound(format!("order {order_id}")));
            }
            let out = op(&mut order)?;
            order.updated_at = self.now();
            match self.store.save_order(&order, order.version) {
                Ok(version) => {
                    order.version = version;
                    return Ok((order, out));
                }
                Err(ServiceError::PersistenceConflict(reason))
                    if attempt < self.config.max_save_attempts =>
                {
                    warn!("order {order_id} save conflict (attempt {attempt}): {reason}");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Recompute the cached status. Forward-only: ledger events may not
    /// regress the order (a late dryer scan after `on_cart` stays `on_cart`).
    /// Returns whether the cache moved.
    pub(crate) fn advance_status(
        &self,
        order: &mut Order,
        actor: &Actor,
        note: Option<String>,
    ) -> bool {
        self.apply_status(order, actor, note, false)
    }

    /// Recompute the cached status, allowing regression. Used only by the
    /// explicit uncheck/release actions.
    pub(crate) fn apply_status(
        &self,
        order: &mut Order,
        actor: &Actor,
        note: Option<String>,
        allow_regress: bool,
    ) -> bool {
        let derived = status::derive(order);
        let moved = if allow_regress {
            derived != order.status
        } else {
            derived.rank() > order.status.rank()
        };
        if moved {
            order.status = derived;
            order.status_history.push(StatusChange {
                status: derived,
                changed_by: actor.id.clone(),
                changed_at: self.now(),
                note,
            });
        }
        moved
    }

    /// Append a history entry without a status change (checkpoint notes,
    /// same-person override tags).
    pub(crate) fn push_note(&self, order: &mut Order, actor: &Actor, note: String) {
        order.status_history.push(StatusChange {
            status: order.status,
            changed_by: actor.id.clone(),
            changed_at: self.now(),
            note: Some(note),
        });
    }

    pub(crate) fn record(
        &self,
        actor: &Actor,
        action: &str,
        entity_type: &str,
        entity_id: &str,
        details: String,
        metadata: serde_json::Value,
    ) {
        self.audit.record(AuditEvent {
            actor_id: actor.id.clone(),
            actor_name: actor.name.clone(),
            action: action.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            details,
            metadata,
        });
    }

    pub(crate) fn notify(&self, order: &Order, actor: &Actor, status_changed: bool) {
        if status_changed {
            self.notifier.status_changed(&order.id, order.status, &actor.id);
        }
    }

    // =======================================================================
    // Machine occupancy (single-writer over Machine)
    // =======================================================================

    /// Atomically take a free machine for an order. This CAS is the race
    /// decider: of two concurrent scans on the same free machine exactly one
    /// save succeeds; the loser reloads, observes `in_use`, and fails.
    fn occupy_machine(&self, scan_code: &str, order_id: &str) -> Result<Machine, ServiceError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut machine = self.store.find_machine_by_scan_code(scan_code)?;
            match machine.status {
                MachineStatus::Maintenance => {
                    return Err(ServiceError::MachineUnavailable(format!(
                        "machine {} is under maintenance",
                        machine.name
                    )));
                }
                MachineStatus::InUse => {
                    return if machine.current_order.as_deref() == Some(order_id) {
                        Err(ServiceError::Conflict(format!(
                            "machine {} is already assigned to this order",
                            machine.name
                        )))
                    } else {
                        Err(ServiceError::Conflict(format!(
                            "machine {} is in use by another order",
                            machine.name
                        )))
                    };
                }
                MachineStatus::Available => {}
            }
            let now = self.now();
            machine.status = MachineStatus::InUse;
            machine.current_order = Some(order_id.to_string());
            machine.last_used_at = Some(now.clone());
            machine.updated_at = now;
            match self.store.save_machine(&machine, machine.version) {
                Ok(version) => {
                    machine.version = version;
                    return Ok(machine);
                }
                Err(ServiceError::PersistenceConflict(_))
                    if attempt < self.config.max_save_attempts => {}
                Err(e) => return Err(e),
            }
        }
    }

    /// Return a machine to `available` if it is occupied by this order.
    /// Returns whether the machine actually referenced the order.
    pub(crate) fn free_machine(&self, machine_id: &str, order_id: &str) -> Result<bool, ServiceError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut machine = self.store.find_machine(machine_id)?;
            if machine.current_order.as_deref() != Some(order_id) {
                return Ok(false);
            }
            machine.status = MachineStatus::Available;
            machine.current_order = None;
            machine.updated_at = self.now();
            match self.store.save_machine(&machine, machine.version) {
                Ok(_) => return Ok(true),
                Err(ServiceError::PersistenceConflict(_))
                    if attempt < self.config.max_save_attempts => {}
                Err(e) => return Err(e),
            }
        }
    }

    /// Best-effort variant for cleanup after the order transition has been
    /// saved: failure here must not fail the operation. A stranded machine is
    /// recoverable through the release leniency.
    pub(crate) fn free_machine_best_effort(&self, machine_id: &str, order_id: &str) -> bool {
        match self.free_machine(machine_id, order_id) {
            Ok(freed) => freed,
            Err(e) => {
                warn!("failed to free machine {machine_id} for order {order_id}: {e}");
                false
            }
        }
    }

    /// Take a machine back for an order whose assignment is being reopened.
    /// Returns whether the occupancy record changed. Fails when the machine
    /// was handed to another order (or put in maintenance) in the meantime —
    /// the caller must not reopen the assignment in that case.
    pub(crate) fn reoccupy_machine(
        &self,
        machine_id: &str,
        order_id: &str,
    ) -> Result<bool, ServiceError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut machine = self.store.find_machine(machine_id)?;
            match machine.status {
                MachineStatus::InUse => {
                    return if machine.current_order.as_deref() == Some(order_id) {
                        Ok(false)
                    } else {
                        Err(ServiceError::Conflict(format!(
                            "machine {} is now in use by another order",
                            machine.name
                        )))
                    };
                }
                MachineStatus::Maintenance => {
                    return Err(ServiceError::MachineUnavailable(format!(
                        "machine {} is under maintenance",
                        machine.name
                    )));
                }
                MachineStatus::Available => {}
            }
            machine.status = MachineStatus::InUse;
            machine.current_order = Some(order_id.to_string());
            machine.updated_at = self.now();
            match self.store.save_machine(&machine, machine.version) {
                Ok(_) => return Ok(true),
                Err(ServiceError::PersistenceConflict(_))
                    if attempt < self.config.max_save_attempts => {}
                Err(e) => return Err(e),
            }
        }
    }

    // =======================================================================
    // Intake / query / soft delete
    // =======================================================================

    /// Create an order at intake (status `new_order`).
    pub fn create_order(&self, req: CreateOrderRequest) -> Result<Order, ServiceError> {
        if req.customer_id.trim().is_empty() {
            return Err(ServiceError::Validation("customerId is required".into()));
        }
        let now = self.now();
        let bags = req
            .bags
            .iter()
            .map(|label| Bag {
                id: new_id(),
                label: label.clone(),
            })
            .collect();
        let order = Order {
            id: new_id(),
            seq: self.store.next_order_seq()?,
            customer_id: req.customer_id.clone(),
            order_type: req.order_type,
            status: OrderStatus::NewOrder,
            keep_separated: req.keep_separated,
            bags,
            weight: req.weight,
            final_weight: None,
            assignments: vec![],
            status_history: vec![StatusChange {
                status: OrderStatus::NewOrder,
                changed_by: req.actor.id.clone(),
                changed_at: now.clone(),
                note: Some("order created".into()),
            }],
            received_at: None,
            received_by: None,
            transferred_at: None,
            transferred_by: None,
            transfer_checked_at: None,
            transfer_checked_by: None,
            transfer_checked_initials: None,
            folded_at: None,
            folded_by: None,
            folding_checked_at: None,
            folding_checked_by: None,
            folding_checked_initials: None,
            final_checked_at: None,
            final_checked_by: None,
            final_checked_initials: None,
            scheduled_pickup_at: None,
            picked_up_at: None,
            completed_at: None,
            completed_by: None,
            deleted: false,
            created_at: now.clone(),
            updated_at: now,
            version: 0,
        };
        self.store.insert_order(&order)?;
        self.record(
            &req.actor,
            "order.create",
            "order",
            &order.id,
            format!("order #{} created", order.seq),
            serde_json::json!({ "customerId": order.customer_id }),
        );
        Ok(order)
    }

    /// Fetch an order (tombstoned orders included, for restore screens).
    pub fn get_order(&self, order_id: &str) -> Result<Order, ServiceError> {
        self.store.find_order(order_id)
    }

    pub fn list_orders(&self, query: &OrderListQuery) -> Result<ListResult<Order>, ServiceError> {
        self.store.list_orders(query)
    }

    /// Soft-delete (tombstone). Idempotent.
    pub fn delete_order(&self, order_id: &str, actor: &Actor) -> Result<Order, ServiceError> {
        let (order, was_live) = self.update_order_raw(order_id, true, &mut |order| {
            let was_live = !order.deleted;
            order.deleted = true;
            Ok(was_live)
        })?;
        if was_live {
            self.record(
                actor,
                "order.delete",
                "order",
                order_id,
                format!("order #{} soft-deleted", order.seq),
                serde_json::Value::Null,
            );
        }
        Ok(order)
    }

    /// Restore a tombstoned order. Idempotent.
    pub fn restore_order(&self, order_id: &str, actor: &Actor) -> Result<Order, ServiceError> {
        let (order, was_deleted) = self.update_order_raw(order_id, true, &mut |order| {
            let was_deleted = order.deleted;
            order.deleted = false;
            Ok(was_deleted)
        })?;
        if was_deleted {
            self.record(
                actor,
                "order.restore",
                "order",
                order_id,
                format!("order #{} restored", order.seq),
                serde_json::Value::Null,
            );
        }
        Ok(order)
    }

    /// Bags of the order not currently inside an open machine of the given
    /// type — what a scanner screen offers when loading the next machine.
    pub fn available_bags(
        &self,
        order_id: &str,
        machine_type: MachineType,
    ) -> Result<Vec<Bag>, ServiceError> {
        let order = self.store.find_order(order_id)?;
        if order.deleted {
            return Err(ServiceError::NotFound(format!("order {order_id}")));
        }
        Ok(order.unassigned_bags(machine_type))
    }

    // =======================================================================
    // Assignment ledger — assign / release
    // =======================================================================

    /// Handle a scan event: put an order's load into a machine.
    pub fn assign_machine(
        &self,
        order_id: &str,
        machine_code: &str,
        actor: &Actor,
        bag_id: Option<&str>,
    ) -> Result<Order, ServiceError> {
        // Validate the order side before touching hardware.
        let order = self.store.find_order(order_id)?;
        if order.deleted {
            return Err(ServiceError::NotFound(format!("order {order_id}")));
        }
        if order.status.is_terminal() {
            return Err(ServiceError::Conflict(format!(
                "order #{} is completed",
                order.seq
            )));
        }
        if let Some(bag) = bag_id {
            if !order.bags.iter().any(|b| b.id == bag) {
                return Err(ServiceError::Validation(format!(
                    "order #{} has no bag {bag}",
                    order.seq
                )));
            }
        }

        // The machine CAS decides races; after it succeeds we own the machine.
        let machine = self.occupy_machine(machine_code, order_id)?;

        let result = self.update_order(order_id, |order| {
            if order.open_assignment(&machine.id).is_some() {
                return Err(ServiceError::Conflict(format!(
                    "machine {} is already assigned to this order",
                    machine.name
                )));
            }
            if let Some(bag) = bag_id {
                let occupied = order.assignments.iter().any(|a| {
                    a.machine_type == machine.machine_type
                        && a.is_open()
                        && a.bag_id.as_deref() == Some(bag)
                });
                if occupied {
                    return Err(ServiceError::Conflict(format!(
                        "bag {bag} is already in a {}",
                        machine.machine_type
                    )));
                }
            }
            order.assignments.push(Assignment::open(
                machine.id.clone(),
                machine.name.clone(),
                machine.machine_type,
                bag_id.map(str::to_string),
                actor.id.clone(),
                self.now(),
            ));
            let changed =
                self.advance_status(order, actor, Some(format!("assigned {}", machine.name)));
            Ok(changed)
        });

        match result {
            Ok((order, changed)) => {
                self.record(
                    actor,
                    "order.assign",
                    "order",
                    order_id,
                    format!("{} assigned to order #{}", machine.name, order.seq),
                    serde_json::json!({
                        "machineId": machine.id,
                        "machineType": machine.machine_type.as_str(),
                        "bagId": bag_id,
                    }),
                );
                self.notify(&order, actor, changed);
                Ok(order)
            }
            Err(e) => {
                // Undo the occupancy; the order side never recorded it.
                self.free_machine_best_effort(&machine.id, order_id);
                Err(e)
            }
        }
    }

    /// Release a machine from an order.
    ///
    /// Idempotent against double-submission from unreliable scanners, and
    /// lenient against corrupted records: a machine that still references
    /// this order is force-released even when no matching open assignment
    /// exists — surfaced as a warning, never an error, to avoid stranding
    /// physical hardware.
    pub fn release_machine(
        &self,
        order_id: &str,
        machine_id: &str,
        actor: &Actor,
    ) -> Result<ReleaseOutcome, ServiceError> {
        #[derive(PartialEq)]
        enum Rel {
            Closed,
            AlreadyClosed,
            NoRecord,
        }

        let (order, (rel, changed)) = self.update_order(order_id, |order| {
            let has_record = order.latest_assignment(machine_id).is_some();
            if let Some(a) = order.open_assignment_mut(machine_id) {
                a.released_at = Some(self.clock.now_rfc3339());
                a.released_by = Some(actor.id.clone());
                let name = a.machine_name.clone();
                let changed = self.apply_status(
                    order,
                    actor,
                    Some(format!("{name} released")),
                    true,
                );
                Ok((Rel::Closed, changed))
            } else if has_record {
                Ok((Rel::AlreadyClosed, false))
            } else {
                Ok((Rel::NoRecord, false))
            }
        })?;

        let freed = self.free_machine(machine_id, order_id)?;

        let warning = match rel {
            Rel::Closed | Rel::AlreadyClosed => None,
            Rel::NoRecord if freed => Some(format!(
                "machine {machine_id} had no open assignment for this order; force-released"
            )),
            Rel::NoRecord => Some(format!(
                "machine {machine_id} has no assignment record for this order"
            )),
        };

        self.record(
            actor,
            "order.release",
            "order",
            order_id,
            match &warning {
                Some(w) => format!("machine released from order #{} ({w})", order.seq),
                None => format!("machine released from order #{}", order.seq),
            },
            serde_json::json!({ "machineId": machine_id, "warning": warning }),
        );
        self.notify(&order, actor, changed);

        Ok(ReleaseOutcome { order, warning })
    }
}

//! Order-level checkpoints outside the machine ledger: intake receive,
//! wash→dry transfer tracking, the final dual-control check, and the
//! ready → completed tail of the pipeline.

use washflow_core::ServiceError;

use crate::model::{Actor, Order, OrderStatus, OrderType};
use crate::policy::{self, SAME_PERSON_TAG};

use super::FulfillmentEngine;

impl FulfillmentEngine {
    /// Intake confirmation: the laundry physically arrived. May record (or
    /// correct) the intake weight.
    pub fn mark_received(
        &self,
        order_id: &str,
        actor: &Actor,
        weight: Option<f64>,
    ) -> Result<Order, ServiceError> {
        let (order, changed) = self.update_order(order_id, |order| {
            if order.status != OrderStatus::NewOrder {
                return Err(ServiceError::InvalidStateTransition {
                    required: "new_order".into(),
                    actual: order.status.as_str().into(),
                });
            }
            order.received_at = Some(self.now());
            order.received_by = Some(actor.id.clone());
            if weight.is_some() {
                order.weight = weight;
            }
            let changed = self.advance_status(order, actor, Some("order received".into()));
            Ok(changed)
        })?;
        self.record(
            actor,
            "order.receive",
            "order",
            order_id,
            format!("order #{} received", order.seq),
            serde_json::json!({ "weight": weight }),
        );
        self.notify(&order, actor, changed);
        Ok(order)
    }

    /// Mark the load moved from washer to dryer staging. Only meaningful for
    /// locations that track the transfer stage.
    pub fn transfer_mark(&self, order_id: &str, actor: &Actor) -> Result<Order, ServiceError> {
        if !self.config().transfer_tracking {
            return Err(ServiceError::Validation(
                "transfer tracking is not enabled for this location".into(),
            ));
        }
        let (order, changed) = self.update_order(order_id, |order| {
            if order.transferred_at.is_some() {
                return Err(ServiceError::Conflict("transfer already marked".into()));
            }
            if order.status != OrderStatus::InWasher {
                return Err(ServiceError::InvalidStateTransition {
                    required: "in_washer".into(),
                    actual: order.status.as_str().into(),
                });
            }
            order.transferred_at = Some(self.now());
            order.transferred_by = Some(actor.id.clone());
            let changed = self.advance_status(order, actor, Some("transferred to dryers".into()));
            Ok(changed)
        })?;
        self.record(
            actor,
            "order.transfer",
            "order",
            order_id,
            format!("order #{} transferred", order.seq),
            serde_json::Value::Null,
        );
        self.notify(&order, actor, changed);
        Ok(order)
    }

    /// Dual-control verification of the transfer, against whoever marked it.
    pub fn transfer_check(
        &self,
        order_id: &str,
        actor: &Actor,
        force_same_person: bool,
    ) -> Result<Order, ServiceError> {
        let initials = policy::initials_for(actor);
        let (order, (changed, forced)) = self.update_order(order_id, |order| {
            if order.transfer_checked_at.is_some() {
                return Err(ServiceError::Conflict("transfer already checked".into()));
            }
            if order.transferred_at.is_none() {
                return Err(ServiceError::InvalidStateTransition {
                    required: "transferred".into(),
                    actual: order.status.as_str().into(),
                });
            }
            let forced = policy::check_dual_control(
                "check transfer",
                order.transferred_by.as_deref(),
                actor,
                force_same_person,
            )?;
            order.transfer_checked_at = Some(self.now());
            order.transfer_checked_by = Some(actor.id.clone());
            order.transfer_checked_initials = Some(initials.clone());
            let mut note = format!("transfer checked by {initials}");
            if forced {
                note.push(' ');
                note.push_str(SAME_PERSON_TAG);
            }
            let changed = self.advance_status(order, actor, Some(note.clone()));
            if !changed {
                self.push_note(order, actor, note);
            }
            Ok((changed, forced))
        })?;
        self.record(
            actor,
            "order.transfer_check",
            "order",
            order_id,
            format!("transfer checked by {initials}"),
            serde_json::json!({ "samePerson": forced }),
        );
        self.notify(&order, actor, changed);
        Ok(order)
    }

    /// The final quality check. Dual-control against the folder; records the
    /// checker's initials and the outgoing weight, then branches the order to
    /// `ready_for_pickup` or `ready_for_delivery` by its type.
    pub fn final_check(
        &self,
        order_id: &str,
        actor: &Actor,
        force_same_person: bool,
        final_weight: Option<f64>,
    ) -> Result<Order, ServiceError> {
        let initials = policy::initials_for(actor);
        let (order, (changed, forced)) = self.update_order(order_id, |order| {
            if order.final_checked_at.is_some() {
                return Err(ServiceError::Conflict("final check already recorded".into()));
            }
            if order.status != OrderStatus::Folded {
                return Err(ServiceError::InvalidStateTransition {
                    required: "folded".into(),
                    actual: order.status.as_str().into(),
                });
            }
            if order.folding_checked_at.is_none() {
                return Err(ServiceError::Validation(
                    "folding has not been verified yet".into(),
                ));
            }
            let forced = policy::check_dual_control(
                "final check",
                order.folded_by.as_deref(),
                actor,
                force_same_person,
            )?;
            order.final_checked_at = Some(self.now());
            order.final_checked_by = Some(actor.id.clone());
            order.final_checked_initials = Some(initials.clone());
            if final_weight.is_some() {
                order.final_weight = final_weight;
            }
            let mut note = format!("final check by {initials}");
            if forced {
                note.push(' ');
                note.push_str(SAME_PERSON_TAG);
            }
            let changed = self.advance_status(order, actor, Some(note));
            Ok((changed, forced))
        })?;
        self.record(
            actor,
            "order.final_check",
            "order",
            order_id,
            if forced {
                format!("final check by {initials} {SAME_PERSON_TAG}")
            } else {
                format!("final check by {initials}")
            },
            serde_json::json!({ "samePerson": forced, "finalWeight": final_weight }),
        );
        self.notify(&order, actor, changed);
        Ok(order)
    }

    /// Undo the final check, dropping the order back to `folded`. Idempotent.
    pub fn uncheck_final(&self, order_id: &str, actor: &Actor) -> Result<Order, ServiceError> {
        let (order, (cleared, changed)) = self.update_order(order_id, |order| {
            if order.final_checked_at.is_none() {
                return Ok((false, false));
            }
            if order.completed_at.is_some() || order.picked_up_at.is_some() {
                return Err(ServiceError::Conflict(
                    "order already handed off; final check cannot be undone".into(),
                ));
            }
            order.final_checked_at = None;
            order.final_checked_by = None;
            order.final_checked_initials = None;
            order.final_weight = None;
            order.scheduled_pickup_at = None;
            let changed =
                self.apply_status(order, actor, Some("final check undone".into()), true);
            Ok((true, changed))
        })?;
        if cleared {
            self.record(
                actor,
                "order.final_uncheck",
                "order",
                order_id,
                format!("final check undone on order #{}", order.seq),
                serde_json::Value::Null,
            );
            self.notify(&order, actor, changed);
        }
        Ok(order)
    }

    /// Delivery-side: a pickup time has been scheduled with the driver.
    pub fn schedule_pickup(&self, order_id: &str, actor: &Actor) -> Result<Order, ServiceError> {
        let (order, changed) = self.update_order(order_id, |order| {
            if order.order_type != OrderType::Delivery {
                return Err(ServiceError::Validation(
                    "pickup scheduling applies to delivery orders".into(),
                ));
            }
            if order.status != OrderStatus::ReadyForDelivery {
                return Err(ServiceError::InvalidStateTransition {
                    required: "ready_for_delivery".into(),
                    actual: order.status.as_str().into(),
                });
            }
            order.scheduled_pickup_at = Some(self.now());
            let changed = self.advance_status(order, actor, Some("pickup scheduled".into()));
            Ok(changed)
        })?;
        self.record(
            actor,
            "order.schedule_pickup",
            "order",
            order_id,
            format!("pickup scheduled for order #{}", order.seq),
            serde_json::Value::Null,
        );
        self.notify(&order, actor, changed);
        Ok(order)
    }

    /// Delivery-side: the driver took the order.
    pub fn mark_picked_up(&self, order_id: &str, actor: &Actor) -> Result<Order, ServiceError> {
        let (order, changed) = self.update_order(order_id, |order| {
            if order.order_type != OrderType::Delivery {
                return Err(ServiceError::Validation(
                    "driver pickup applies to delivery orders".into(),
                ));
            }
            if !matches!(
                order.status,
                OrderStatus::ReadyForDelivery | OrderStatus::ScheduledPickup
            ) {
                return Err(ServiceError::InvalidStateTransition {
                    required: "scheduled_pickup".into(),
                    actual: order.status.as_str().into(),
                });
            }
            order.picked_up_at = Some(self.now());
            let changed = self.advance_status(order, actor, Some("picked up by driver".into()));
            Ok(changed)
        })?;
        self.record(
            actor,
            "order.picked_up",
            "order",
            order_id,
            format!("order #{} picked up", order.seq),
            serde_json::Value::Null,
        );
        self.notify(&order, actor, changed);
        Ok(order)
    }

    /// Terminal handoff: the customer collected (or the delivery concluded).
    pub fn complete(&self, order_id: &str, actor: &Actor) -> Result<Order, ServiceError> {
        let (order, changed) = self.update_order(order_id, |order| {
            if order.completed_at.is_some() {
                return Err(ServiceError::Conflict("order is already completed".into()));
            }
            if !(order.status.is_ready() || order.status == OrderStatus::PickedUp) {
                return Err(ServiceError::InvalidStateTransition {
                    required: "ready_for_pickup or ready_for_delivery".into(),
                    actual: order.status.as_str().into(),
                });
            }
            order.completed_at = Some(self.now());
            order.completed_by = Some(actor.id.clone());
            let changed = self.advance_status(order, actor, Some("order completed".into()));
            Ok(changed)
        })?;
        self.record(
            actor,
            "order.complete",
            "order",
            order_id,
            format!("order #{} completed", order.seq),
            serde_json::Value::Null,
        );
        self.notify(&order, actor, changed);
        Ok(order)
    }
}

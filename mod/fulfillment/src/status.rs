//! Pure order-status derivation.
//!
//! The stored `Order::status` is a cache. Every mutating engine operation
//! recomputes it from the assignment and checkpoint records through
//! [`derive`]; ledger events may only advance the cache forward, and the
//! explicit uncheck/release actions re-derive with regression allowed. This
//! keeps status and underlying data from ever disagreeing.

use crate::model::{MachineType, Order, OrderStatus, OrderType};

/// Compute the status implied by the order's records.
///
/// Checks run from the far end of the pipeline backwards; the first record
/// set wins. Dryer occupancy follows the all-dryers-done rule: the order is
/// `on_cart` only when every dryer load has been unloaded **and** the unload
/// verified (dryers released without unloading are ignored — they never held
/// a finished load).
pub fn derive(order: &Order) -> OrderStatus {
    if order.completed_at.is_some() {
        return OrderStatus::Completed;
    }
    if order.picked_up_at.is_some() {
        return OrderStatus::PickedUp;
    }
    if order.scheduled_pickup_at.is_some() {
        return OrderStatus::ScheduledPickup;
    }
    if order.final_checked_at.is_some() {
        return match order.order_type {
            OrderType::Pickup => OrderStatus::ReadyForPickup,
            OrderType::Delivery => OrderStatus::ReadyForDelivery,
        };
    }
    if order.folded_at.is_some() {
        return OrderStatus::Folded;
    }
    if order.assignments.iter().any(|a| a.is_fold_started()) {
        return OrderStatus::Folding;
    }

    let dryers: Vec<_> = order.assignments_of(MachineType::Dryer).collect();
    if !dryers.is_empty() {
        let any_done = dryers.iter().any(|a| a.is_unload_checked());
        let all_settled = dryers
            .iter()
            .all(|a| a.is_unload_checked() || a.is_abandoned_dryer());
        if any_done && all_settled {
            return OrderStatus::OnCart;
        }
        return OrderStatus::InDryer;
    }

    if order.transfer_checked_at.is_some() {
        return OrderStatus::TransferChecked;
    }
    if order.transferred_at.is_some() {
        return OrderStatus::Transferred;
    }
    if order.has_assignment_of(MachineType::Washer) {
        return OrderStatus::InWasher;
    }
    if order.received_at.is_some() {
        return OrderStatus::Received;
    }
    OrderStatus::NewOrder
}

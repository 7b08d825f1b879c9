use serde::{Deserialize, Serialize};

use super::{Actor, Assignment, MachineType};

// ---------------------------------------------------------------------------
// OrderStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of an order.
///
/// ```text
/// new_order → received → in_washer → [transferred → transfer_checked] →
/// in_dryer → on_cart → folding → folded →
/// ready_for_pickup | ready_for_delivery → completed
/// ```
///
/// `transferred`/`transfer_checked` appear only when the location tracks
/// wash→dry transfers. `scheduled_pickup`/`picked_up` are delivery-side
/// bookkeeping after `ready_for_delivery`.
///
/// The stored status is a cache: it is always recomputed by
/// [`crate::status::derive`] from the assignment and checkpoint records,
/// never mutated ad hoc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    NewOrder,
    Received,
    InWasher,
    Transferred,
    TransferChecked,
    InDryer,
    OnCart,
    Folding,
    Folded,
    ReadyForPickup,
    ReadyForDelivery,
    ScheduledPickup,
    PickedUp,
    Completed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewOrder => "new_order",
            Self::Received => "received",
            Self::InWasher => "in_washer",
            Self::Transferred => "transferred",
            Self::TransferChecked => "transfer_checked",
            Self::InDryer => "in_dryer",
            Self::OnCart => "on_cart",
            Self::Folding => "folding",
            Self::Folded => "folded",
            Self::ReadyForPickup => "ready_for_pickup",
            Self::ReadyForDelivery => "ready_for_delivery",
            Self::ScheduledPickup => "scheduled_pickup",
            Self::PickedUp => "picked_up",
            Self::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new_order" => Some(Self::NewOrder),
            "received" => Some(Self::Received),
            "in_washer" => Some(Self::InWasher),
            "transferred" => Some(Self::Transferred),
            "transfer_checked" => Some(Self::TransferChecked),
            "in_dryer" => Some(Self::InDryer),
            "on_cart" => Some(Self::OnCart),
            "folding" => Some(Self::Folding),
            "folded" => Some(Self::Folded),
            "ready_for_pickup" => Some(Self::ReadyForPickup),
            "ready_for_delivery" => Some(Self::ReadyForDelivery),
            "scheduled_pickup" => Some(Self::ScheduledPickup),
            "picked_up" => Some(Self::PickedUp),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    /// Position in the forward pipeline. Ledger events may only move the
    /// cached status to a strictly higher rank; regression requires an
    /// explicit uncheck/release action.
    pub fn rank(&self) -> u8 {
        match self {
            Self::NewOrder => 0,
            Self::Received => 1,
            Self::InWasher => 2,
            Self::Transferred => 3,
            Self::TransferChecked => 4,
            Self::InDryer => 5,
            Self::OnCart => 6,
            Self::Folding => 7,
            Self::Folded => 8,
            Self::ReadyForPickup | Self::ReadyForDelivery => 9,
            Self::ScheduledPickup => 10,
            Self::PickedUp => 11,
            Self::Completed => 12,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Order is ready for handoff to the customer or driver.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::ReadyForPickup | Self::ReadyForDelivery)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// OrderType / Bag / StatusChange
// ---------------------------------------------------------------------------

/// How the finished order leaves the store. Decides the `folded →
/// ready_for_*` branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Pickup,
    Delivery,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pickup => "pickup",
            Self::Delivery => "delivery",
        }
    }
}

/// A physical bag of laundry within an order. Keep-separated orders run each
/// bag through machines as its own unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bag {
    pub id: String,
    pub label: String,
}

/// One entry in the order's status history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub status: OrderStatus,
    pub changed_by: String,
    pub changed_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

// ---------------------------------------------------------------------------
// Order
// ---------------------------------------------------------------------------

/// A customer order moving through the wash → dry → fold → verify → ready
/// pipeline.
///
/// Assignments and checkpoint fields are the source of truth; `status` is
/// the cached derivation over them. Orders are soft-deleted (tombstoned),
/// never removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,

    /// Human-facing numeric sequence number.
    pub seq: i64,

    pub customer_id: String,

    #[serde(rename = "type")]
    pub order_type: OrderType,

    pub status: OrderStatus,

    #[serde(default)]
    pub keep_separated: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bags: Vec<Bag>,

    /// Intake weight (lbs).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,

    /// Weight recorded at the final check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_weight: Option<f64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assignments: Vec<Assignment>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub status_history: Vec<StatusChange>,

    // --- checkpoint fields ---
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_by: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transferred_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transferred_by: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_checked_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_checked_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_checked_initials: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folded_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folded_by: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folding_checked_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folding_checked_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folding_checked_initials: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_checked_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_checked_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_checked_initials: Option<String>,

    // --- delivery-side bookkeeping ---
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_pickup_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picked_up_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_by: Option<String>,

    /// Soft-delete tombstone; restorable.
    #[serde(default)]
    pub deleted: bool,

    pub created_at: String,
    pub updated_at: String,

    /// Optimistic-concurrency token. Bumped on every save.
    #[serde(default)]
    pub version: u64,
}

impl Order {
    /// The open assignment for a machine, if any. At most one exists per
    /// (order, machine) pair.
    pub fn open_assignment(&self, machine_id: &str) -> Option<&Assignment> {
        self.assignments
            .iter()
            .find(|a| a.machine_id == machine_id && a.is_open())
    }

    pub fn open_assignment_mut(&mut self, machine_id: &str) -> Option<&mut Assignment> {
        self.assignments
            .iter_mut()
            .find(|a| a.machine_id == machine_id && a.is_open())
    }

    /// The most recent assignment for a machine regardless of state.
    pub fn latest_assignment(&self, machine_id: &str) -> Option<&Assignment> {
        self.assignments
            .iter()
            .rev()
            .find(|a| a.machine_id == machine_id)
    }

    pub fn latest_assignment_mut(&mut self, machine_id: &str) -> Option<&mut Assignment> {
        self.assignments
            .iter_mut()
            .rev()
            .find(|a| a.machine_id == machine_id)
    }

    /// All assignments of the given machine type.
    pub fn assignments_of(&self, machine_type: MachineType) -> impl Iterator<Item = &Assignment> {
        self.assignments
            .iter()
            .filter(move |a| a.machine_type == machine_type)
    }

    /// Whether any assignment of this type has ever been opened.
    pub fn has_assignment_of(&self, machine_type: MachineType) -> bool {
        self.assignments_of(machine_type).next().is_some()
    }

    /// Bags not currently inside an open machine of the given type.
    pub fn unassigned_bags(&self, machine_type: MachineType) -> Vec<Bag> {
        self.bags
            .iter()
            .filter(|bag| {
                !self.assignments.iter().any(|a| {
                    a.machine_type == machine_type
                        && a.is_open()
                        && a.bag_id.as_deref() == Some(bag.id.as_str())
                })
            })
            .cloned()
            .collect()
    }
}

// ---------------------------------------------------------------------------
// API request / response types
// ---------------------------------------------------------------------------

/// Body for `POST /orders` — intake.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub customer_id: String,

    #[serde(rename = "type")]
    pub order_type: OrderType,

    /// Bag labels; ids are generated.
    #[serde(default)]
    pub bags: Vec<String>,

    #[serde(default)]
    pub keep_separated: bool,

    #[serde(default)]
    pub weight: Option<f64>,

    #[serde(flatten)]
    pub actor: Actor,
}

/// Body for `POST /orders/{id}/@assign` — a scan event.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignRequest {
    /// The machine's scannable code.
    pub machine_code: String,

    #[serde(default)]
    pub bag_id: Option<String>,

    #[serde(flatten)]
    pub actor: Actor,
}

/// Body for machine-scoped actions: `@release`, `@unload`, `@fold-start`,
/// `@unload-uncheck`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineActionRequest {
    pub machine_id: String,

    #[serde(flatten)]
    pub actor: Actor,
}

/// Body for `POST /orders/{id}/@unload-check`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyUnloadRequest {
    pub machine_id: String,

    #[serde(flatten)]
    pub actor: Actor,

    /// Explicit dual-control override confirmation.
    #[serde(default)]
    pub force_same_person: bool,
}

/// Body for `POST /orders/{id}/@fold-start`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoldStartRequest {
    pub machine_id: String,

    #[serde(flatten)]
    pub actor: Actor,
}

/// Body for order-scoped checkpoints: `@fold-done`, `@fold-check`,
/// `@transfer`, `@transfer-check`, `@final-uncheck`, `@complete`,
/// `@schedule-pickup`, `@picked-up`, `@restore`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointRequest {
    #[serde(flatten)]
    pub actor: Actor,

    #[serde(default)]
    pub force_same_person: bool,
}

/// Body for `POST /orders/{id}/@final-check`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalCheckRequest {
    #[serde(flatten)]
    pub actor: Actor,

    #[serde(default)]
    pub force_same_person: bool,

    #[serde(default)]
    pub final_weight: Option<f64>,
}

/// Body for `POST /orders/{id}/@receive`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiveRequest {
    #[serde(flatten)]
    pub actor: Actor,

    #[serde(default)]
    pub weight: Option<f64>,
}

/// Query parameters for `GET /orders`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderListQuery {
    #[serde(default)]
    pub limit: Option<usize>,

    #[serde(default)]
    pub offset: Option<usize>,

    #[serde(default)]
    pub status: Option<OrderStatus>,

    #[serde(default)]
    pub customer_id: Option<String>,

    /// Include soft-deleted orders.
    #[serde(default)]
    pub include_deleted: bool,
}

/// Result of `@release`. Releasing is lenient: a machine stranded without a
/// matching open assignment is force-released and reported as a warning,
/// never an error.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseOutcome {
    pub order: Order,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

use serde::{Deserialize, Serialize};

use super::MachineType;

/// One machine occupancy event for an order, embedded in the order document
/// and logically owned by the assignment ledger.
///
/// An assignment is **open** until the terminal field for its machine type is
/// set: `released_at` for washers, `released_at` or `unload_verified_at` for
/// dryers. Closed assignments are immutable history — they are never deleted,
/// only superseded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub machine_id: String,
    pub machine_name: String,

    #[serde(rename = "machineType")]
    pub machine_type: MachineType,

    /// Bag handled by this machine, for keep-separated orders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bag_id: Option<String>,

    pub assigned_at: String,
    pub assigned_by: String,

    // --- occupancy close (washer, or dryer released without unload) ---
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub released_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub released_by: Option<String>,

    // --- dryer sub-lifecycle ---
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unloaded_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unloaded_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unloaded_initials: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unload_verified_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unload_verified_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unload_verified_initials: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fold_started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fold_started_by: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fold_verified_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fold_verified_by: Option<String>,
}

impl Assignment {
    /// Open a fresh assignment.
    pub fn open(
        machine_id: impl Into<String>,
        machine_name: impl Into<String>,
        machine_type: MachineType,
        bag_id: Option<String>,
        assigned_by: impl Into<String>,
        assigned_at: impl Into<String>,
    ) -> Self {
        Self {
            machine_id: machine_id.into(),
            machine_name: machine_name.into(),
            machine_type,
            bag_id,
            assigned_at: assigned_at.into(),
            assigned_by: assigned_by.into(),
            released_at: None,
            released_by: None,
            unloaded_at: None,
            unloaded_by: None,
            unloaded_initials: None,
            unload_verified_at: None,
            unload_verified_by: None,
            unload_verified_initials: None,
            fold_started_at: None,
            fold_started_by: None,
            fold_verified_at: None,
            fold_verified_by: None,
        }
    }

    /// Whether this assignment still occupies its machine.
    pub fn is_open(&self) -> bool {
        if self.released_at.is_some() {
            return false;
        }
        match self.machine_type {
            MachineType::Washer => true,
            MachineType::Dryer => self.unload_verified_at.is_none(),
        }
    }

    pub fn is_unloaded(&self) -> bool {
        self.unloaded_at.is_some()
    }

    /// Dryer unload has been marked and dual-control verified.
    pub fn is_unload_checked(&self) -> bool {
        self.unloaded_at.is_some() && self.unload_verified_at.is_some()
    }

    pub fn is_fold_started(&self) -> bool {
        self.fold_started_at.is_some()
    }

    /// A dryer that was released without going through unload/verify.
    /// It no longer occupies the machine and does not count toward the
    /// all-dryers-done rule.
    pub fn is_abandoned_dryer(&self) -> bool {
        self.machine_type == MachineType::Dryer
            && self.released_at.is_some()
            && self.unload_verified_at.is_none()
    }
}

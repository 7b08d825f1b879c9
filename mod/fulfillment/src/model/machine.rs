use serde::{Deserialize, Serialize};

use super::Actor;

// ---------------------------------------------------------------------------
// MachineType / MachineStatus
// ---------------------------------------------------------------------------

/// Kind of physical machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineType {
    Washer,
    Dryer,
}

impl MachineType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Washer => "washer",
            Self::Dryer => "dryer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "washer" => Some(Self::Washer),
            "dryer" => Some(Self::Dryer),
            _ => None,
        }
    }
}

impl std::fmt::Display for MachineType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Availability state of a machine.
///
/// `InUse` is never set directly — the assignment ledger is the single
/// writer; it flips a machine to `InUse` when an assignment opens and back
/// to `Available` when the occupancy closes. `Maintenance` is the one
/// admin-settable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineStatus {
    Available,
    InUse,
    Maintenance,
}

impl MachineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::InUse => "in_use",
            Self::Maintenance => "maintenance",
        }
    }
}

impl std::fmt::Display for MachineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Machine
// ---------------------------------------------------------------------------

/// A physical washer or dryer, identified by a unique scannable code.
///
/// Invariant: `status == InUse` ⇔ `current_order` is set ⇔ exactly one open
/// assignment references this machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Machine {
    pub id: String,

    pub name: String,

    #[serde(rename = "type")]
    pub machine_type: MachineType,

    /// Unique scannable code (printed on the machine).
    pub scan_code: String,

    pub status: MachineStatus,

    /// Order currently occupying this machine, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_order: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<String>,

    pub created_at: String,
    pub updated_at: String,

    /// Optimistic-concurrency token. Bumped on every save.
    #[serde(default)]
    pub version: u64,
}

// ---------------------------------------------------------------------------
// API request / query types
// ---------------------------------------------------------------------------

/// Body for `POST /machines`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMachineRequest {
    pub name: String,

    #[serde(rename = "type")]
    pub machine_type: MachineType,

    pub scan_code: String,

    #[serde(flatten)]
    pub actor: Actor,
}

/// Body for `PATCH /machines/{id}`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMachineRequest {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(flatten)]
    pub actor: Actor,
}

/// Body for `POST /machines/{id}/@maintenance`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceRequest {
    /// true = take the machine out of service, false = return it.
    pub on: bool,

    #[serde(flatten)]
    pub actor: Actor,
}

/// Query parameters for `GET /machines`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineListQuery {
    #[serde(rename = "type", default)]
    pub machine_type: Option<MachineType>,

    #[serde(default)]
    pub status: Option<MachineStatus>,
}

//! Persistence behind a repository interface.
//!
//! The workflow runs request-per-operation against this store; two
//! operations touching the same order or machine are serialized by the
//! optimistic-concurrency `version` token rather than an in-memory lock,
//! since the service may run multiple instances. `save_*` is a conditional
//! write: it succeeds only when the stored version still matches
//! `expected_version`, and persists the document with `version + 1`.

mod memory;
mod sqlite;

pub use memory::MemStore;
pub use sqlite::SqliteStore;

use washflow_core::{ListResult, ServiceError};

use crate::model::{Machine, MachineListQuery, Order, OrderListQuery};

/// Repository interface for orders and machines.
///
/// All writes are atomic per document. `save_order`/`save_machine` fail with
/// [`ServiceError::PersistenceConflict`] on a version mismatch — the engine
/// retries those a bounded number of times with freshly loaded state.
pub trait FulfillmentStore: Send + Sync {
    // --- orders ---

    /// Insert a new order. `Conflict` if the id already exists.
    fn insert_order(&self, order: &Order) -> Result<(), ServiceError>;

    /// Fetch an order by id, including soft-deleted ones (the engine decides
    /// whether a tombstoned order is visible).
    fn find_order(&self, id: &str) -> Result<Order, ServiceError>;

    /// Conditional write. Persists the order with `expected_version + 1` and
    /// returns the new version; `PersistenceConflict` if the stored version
    /// moved.
    fn save_order(&self, order: &Order, expected_version: u64) -> Result<u64, ServiceError>;

    fn list_orders(&self, query: &OrderListQuery) -> Result<ListResult<Order>, ServiceError>;

    /// Next value for the human-facing order sequence number.
    fn next_order_seq(&self) -> Result<i64, ServiceError>;

    // --- machines ---

    /// Insert a new machine. `Conflict` on duplicate id or scan code.
    fn insert_machine(&self, machine: &Machine) -> Result<(), ServiceError>;

    fn find_machine(&self, id: &str) -> Result<Machine, ServiceError>;

    fn find_machine_by_scan_code(&self, scan_code: &str) -> Result<Machine, ServiceError>;

    /// Conditional write, same contract as [`FulfillmentStore::save_order`].
    fn save_machine(&self, machine: &Machine, expected_version: u64) -> Result<u64, ServiceError>;

    fn list_machines(&self, query: &MachineListQuery) -> Result<ListResult<Machine>, ServiceError>;

    /// Hard delete — callers must first ensure no open assignment references
    /// the machine.
    fn delete_machine(&self, id: &str) -> Result<(), ServiceError>;
}

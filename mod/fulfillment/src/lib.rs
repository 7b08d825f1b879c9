//! Laundromat order fulfillment: machine registry, assignment ledger, and
//! the order workflow state machine.
//!
//! Layering, bottom up:
//! - [`model`] — documents and wire DTOs.
//! - [`store`] — repository trait with in-memory and SQLite backends.
//! - [`status`] — the pure status derivation over an order's records.
//! - [`policy`] — the dual-control ("four-eyes") verification rule.
//! - [`audit`] — fire-and-forget audit recorder and status notifier.
//! - [`engine`] / [`registry`] — the workflow operations and machine CRUD.
//! - [`api`] — axum routes, one `@action` per workflow operation.

pub mod api;
pub mod audit;
pub mod engine;
pub mod model;
pub mod policy;
pub mod registry;
pub mod status;
pub mod store;

use std::sync::Arc;

use axum::Router;

use washflow_core::{Clock, Module};

use audit::{AuditRecorder, Notifier};
use engine::{FulfillmentEngine, WorkflowConfig};
use registry::MachineRegistry;
use store::FulfillmentStore;

/// The fulfillment module: engine + registry over one shared store,
/// exposed as a [`Module`] for the server binary.
pub struct FulfillmentModule {
    engine: Arc<FulfillmentEngine>,
    registry: Arc<MachineRegistry>,
}

impl FulfillmentModule {
    pub fn new(
        store: Arc<dyn FulfillmentStore>,
        audit: Arc<dyn AuditRecorder>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        config: WorkflowConfig,
    ) -> Self {
        let registry = Arc::new(MachineRegistry::new(
            Arc::clone(&store),
            Arc::clone(&audit),
            Arc::clone(&clock),
        ));
        let engine = Arc::new(FulfillmentEngine::with_config(
            store, audit, notifier, clock, config,
        ));
        Self { engine, registry }
    }

    pub fn engine(&self) -> &Arc<FulfillmentEngine> {
        &self.engine
    }

    pub fn registry(&self) -> &Arc<MachineRegistry> {
        &self.registry
    }
}

impl Module for FulfillmentModule {
    fn name(&self) -> &str {
        "fulfillment"
    }

    fn routes(&self) -> Router {
        Router::new()
            .merge(api::order_routes(Arc::clone(&self.engine)))
            .merge(api::machine_routes(Arc::clone(&self.registry)))
    }
}

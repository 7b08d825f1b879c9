//! HTTP surface of the fulfillment module.
//!
//! Orders and machines are plain REST resources; workflow transitions are
//! `@action` POST routes under the resource, one per ledger operation.

mod machines;
mod orders;

pub use machines::routes as machine_routes;
pub use orders::routes as order_routes;

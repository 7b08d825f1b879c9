use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use washflow_core::{ListResult, ServiceError};

use crate::engine::FulfillmentEngine;
use crate::model::{
    AssignRequest, Bag, CheckpointRequest, CreateOrderRequest, FinalCheckRequest, FoldStartRequest,
    MachineActionRequest, MachineType, Order, OrderListQuery, ReceiveRequest, ReleaseOutcome,
    VerifyUnloadRequest,
};

type S = Arc<FulfillmentEngine>;

pub fn routes(engine: S) -> Router {
    Router::new()
        .route("/orders", post(create).get(list))
        .route("/orders/{id}", get(get_one).delete(delete))
        .route("/orders/{id}/@restore", post(restore))
        .route("/orders/{id}/available-bags", get(available_bags))
        // machine ledger
        .route("/orders/{id}/@assign", post(assign))
        .route("/orders/{id}/@release", post(release))
        .route("/orders/{id}/@unload", post(unload))
        .route("/orders/{id}/@unload-check", post(unload_check))
        .route("/orders/{id}/@unload-uncheck", post(unload_uncheck))
        // folding
        .route("/orders/{id}/@fold-start", post(fold_start))
        .route("/orders/{id}/@fold-done", post(fold_done))
        .route("/orders/{id}/@fold-check", post(fold_check))
        // checkpoints
        .route("/orders/{id}/@receive", post(receive))
        .route("/orders/{id}/@transfer", post(transfer))
        .route("/orders/{id}/@transfer-check", post(transfer_check))
        .route("/orders/{id}/@final-check", post(final_check))
        .route("/orders/{id}/@final-uncheck", post(final_uncheck))
        .route("/orders/{id}/@complete", post(complete))
        .route("/orders/{id}/@schedule-pickup", post(schedule_pickup))
        .route("/orders/{id}/@picked-up", post(picked_up))
        .with_state(engine)
}

async fn create(
    State(engine): State<S>,
    Json(body): Json<CreateOrderRequest>,
) -> Result<Json<Order>, ServiceError> {
    Ok(Json(engine.create_order(body)?))
}

async fn get_one(State(engine): State<S>, Path(id): Path<String>) -> Result<Json<Order>, ServiceError> {
    Ok(Json(engine.get_order(&id)?))
}

async fn list(
    State(engine): State<S>,
    Query(query): Query<OrderListQuery>,
) -> Result<Json<ListResult<Order>>, ServiceError> {
    Ok(Json(engine.list_orders(&query)?))
}

async fn delete(
    State(engine): State<S>,
    Path(id): Path<String>,
    Json(body): Json<CheckpointRequest>,
) -> Result<Json<Order>, ServiceError> {
    Ok(Json(engine.delete_order(&id, &body.actor)?))
}

async fn restore(
    State(engine): State<S>,
    Path(id): Path<String>,
    Json(body): Json<CheckpointRequest>,
) -> Result<Json<Order>, ServiceError> {
    Ok(Json(engine.restore_order(&id, &body.actor)?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AvailableBagsQuery {
    machine_type: MachineType,
}

async fn available_bags(
    State(engine): State<S>,
    Path(id): Path<String>,
    Query(query): Query<AvailableBagsQuery>,
) -> Result<Json<Vec<Bag>>, ServiceError> {
    Ok(Json(engine.available_bags(&id, query.machine_type)?))
}

// --- machine ledger ---

async fn assign(
    State(engine): State<S>,
    Path(id): Path<String>,
    Json(body): Json<AssignRequest>,
) -> Result<Json<Order>, ServiceError> {
    Ok(Json(engine.assign_machine(
        &id,
        &body.machine_code,
        &body.actor,
        body.bag_id.as_deref(),
    )?))
}

async fn release(
    State(engine): State<S>,
    Path(id): Path<String>,
    Json(body): Json<MachineActionRequest>,
) -> Result<Json<ReleaseOutcome>, ServiceError> {
    Ok(Json(engine.release_machine(&id, &body.machine_id, &body.actor)?))
}

async fn unload(
    State(engine): State<S>,
    Path(id): Path<String>,
    Json(body): Json<MachineActionRequest>,
) -> Result<Json<Order>, ServiceError> {
    Ok(Json(engine.mark_unloaded(&id, &body.machine_id, &body.actor)?))
}

async fn unload_check(
    State(engine): State<S>,
    Path(id): Path<String>,
    Json(body): Json<VerifyUnloadRequest>,
) -> Result<Json<Order>, ServiceError> {
    Ok(Json(engine.verify_unload(
        &id,
        &body.machine_id,
        &body.actor,
        body.force_same_person,
    )?))
}

async fn unload_uncheck(
    State(engine): State<S>,
    Path(id): Path<String>,
    Json(body): Json<MachineActionRequest>,
) -> Result<Json<Order>, ServiceError> {
    Ok(Json(engine.uncheck_unload(&id, &body.machine_id, &body.actor)?))
}

// --- folding ---

async fn fold_start(
    State(engine): State<S>,
    Path(id): Path<String>,
    Json(body): Json<FoldStartRequest>,
) -> Result<Json<Order>, ServiceError> {
    Ok(Json(engine.start_folding(&id, &body.machine_id, &body.actor)?))
}

async fn fold_done(
    State(engine): State<S>,
    Path(id): Path<String>,
    Json(body): Json<CheckpointRequest>,
) -> Result<Json<Order>, ServiceError> {
    Ok(Json(engine.mark_folded(&id, &body.actor)?))
}

async fn fold_check(
    State(engine): State<S>,
    Path(id): Path<String>,
    Json(body): Json<CheckpointRequest>,
) -> Result<Json<Order>, ServiceError> {
    Ok(Json(engine.verify_folding(&id, &body.actor, body.force_same_person)?))
}

// --- checkpoints ---

async fn receive(
    State(engine): State<S>,
    Path(id): Path<String>,
    Json(body): Json<ReceiveRequest>,
) -> Result<Json<Order>, ServiceError> {
    Ok(Json(engine.mark_received(&id, &body.actor, body.weight)?))
}

async fn transfer(
    State(engine): State<S>,
    Path(id): Path<String>,
    Json(body): Json<CheckpointRequest>,
) -> Result<Json<Order>, ServiceError> {
    Ok(Json(engine.transfer_mark(&id, &body.actor)?))
}

async fn transfer_check(
    State(engine): State<S>,
    Path(id): Path<String>,
    Json(body): Json<CheckpointRequest>,
) -> Result<Json<Order>, ServiceError> {
    Ok(Json(engine.transfer_check(&id, &body.actor, body.force_same_person)?))
}

async fn final_check(
    State(engine): State<S>,
    Path(id): Path<String>,
    Json(body): Json<FinalCheckRequest>,
) -> Result<Json<Order>, ServiceError> {
    Ok(Json(engine.final_check(
        &id,
        &body.actor,
        body.force_same_person,
        body.final_weight,
    )?))
}

async fn final_uncheck(
    State(engine): State<S>,
    Path(id): Path<String>,
    Json(body): Json<CheckpointRequest>,
) -> Result<Json<Order>, ServiceError> {
    Ok(Json(engine.uncheck_final(&id, &body.actor)?))
}

async fn complete(
    State(engine): State<S>,
    Path(id): Path<String>,
    Json(body): Json<CheckpointRequest>,
) -> Result<Json<Order>, ServiceError> {
    Ok(Json(engine.complete(&id, &body.actor)?))
}

async fn schedule_pickup(
    State(engine): State<S>,
    Path(id): Path<String>,
    Json(body): Json<CheckpointRequest>,
) -> Result<Json<Order>, ServiceError> {
    Ok(Json(engine.schedule_pickup(&id, &body.actor)?))
}

async fn picked_up(
    State(engine): State<S>,
    Path(id): Path<String>,
    Json(body): Json<CheckpointRequest>,
) -> Result<Json<Order>, ServiceError> {
    Ok(Json(engine.mark_picked_up(&id, &body.actor)?))
}

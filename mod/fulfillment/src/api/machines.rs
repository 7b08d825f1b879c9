use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use washflow_core::{ListResult, ServiceError};

use crate::model::{
    Actor, CreateMachineRequest, Machine, MachineListQuery, MaintenanceRequest,
    UpdateMachineRequest,
};
use crate::registry::MachineRegistry;

type S = Arc<MachineRegistry>;

pub fn routes(registry: S) -> Router {
    Router::new()
        .route("/machines", post(create).get(list))
        .route("/machines/{id}", get(get_one).patch(update).delete(delete))
        .route("/machines/{id}/@maintenance", post(maintenance))
        .with_state(registry)
}

async fn create(
    State(registry): State<S>,
    Json(req): Json<CreateMachineRequest>,
) -> Result<Json<Machine>, ServiceError> {
    Ok(Json(registry.create(req)?))
}

async fn get_one(
    State(registry): State<S>,
    Path(id): Path<String>,
) -> Result<Json<Machine>, ServiceError> {
    Ok(Json(registry.get(&id)?))
}

async fn list(
    State(registry): State<S>,
    Query(query): Query<MachineListQuery>,
) -> Result<Json<ListResult<Machine>>, ServiceError> {
    Ok(Json(registry.list(&query)?))
}

async fn update(
    State(registry): State<S>,
    Path(id): Path<String>,
    Json(req): Json<UpdateMachineRequest>,
) -> Result<Json<Machine>, ServiceError> {
    Ok(Json(registry.update(&id, req)?))
}

#[derive(Deserialize)]
struct DeleteBody {
    #[serde(flatten)]
    actor: Actor,
}

async fn delete(
    State(registry): State<S>,
    Path(id): Path<String>,
    Json(req): Json<DeleteBody>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    registry.delete(&id, &req.actor)?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}

async fn maintenance(
    State(registry): State<S>,
    Path(id): Path<String>,
    Json(req): Json<MaintenanceRequest>,
) -> Result<Json<Machine>, ServiceError> {
    Ok(Json(registry.set_maintenance(&id, req.on, &req.actor)?))
}

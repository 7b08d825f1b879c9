//! End-to-end pipeline tests over the HTTP surface, backed by SQLite.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use washflow_core::{Clock, Module, SystemClock};
use washflow_fulfillment::FulfillmentModule;
use washflow_fulfillment::audit::{AuditRecorder, MemoryNotifier, MemoryRecorder, Notifier};
use washflow_fulfillment::engine::WorkflowConfig;
use washflow_fulfillment::store::SqliteStore;

struct App {
    router: Router,
    recorder: Arc<MemoryRecorder>,
    notifier: Arc<MemoryNotifier>,
}

fn app() -> App {
    app_with(WorkflowConfig::default())
}

fn app_with(config: WorkflowConfig) -> App {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let recorder = Arc::new(MemoryRecorder::new());
    let notifier = Arc::new(MemoryNotifier::new());
    let module = FulfillmentModule::new(
        store,
        Arc::clone(&recorder) as Arc<dyn AuditRecorder>,
        Arc::clone(&notifier) as Arc<dyn Notifier>,
        Arc::new(SystemClock) as Arc<dyn Clock>,
        config,
    );
    App {
        router: module.routes(),
        recorder,
        notifier,
    }
}

async fn api_call(
    router: &Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if body.is_some() {
        builder = builder.header("content-type", "application/json");
    }
    let body = match body {
        Some(v) => Body::from(serde_json::to_string(&v).unwrap()),
        None => Body::empty(),
    };
    let req = builder.body(body).unwrap();
    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::json!(null)
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::json!(null))
    };
    (status, json)
}

fn by(actor_id: &str, name: &str) -> serde_json::Value {
    serde_json::json!({ "actorId": actor_id, "actorName": name })
}

fn with_actor(mut body: serde_json::Value, actor_id: &str, name: &str) -> serde_json::Value {
    body["actorId"] = serde_json::json!(actor_id);
    body["actorName"] = serde_json::json!(name);
    body
}

async fn create_machine(app: &App, name: &str, kind: &str, code: &str) -> String {
    let (status, machine) = api_call(
        &app.router,
        "POST",
        "/machines",
        Some(with_actor(
            serde_json::json!({ "name": name, "type": kind, "scanCode": code }),
            "admin",
            "Shift Lead",
        )),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "create machine: {machine}");
    machine["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn full_pickup_pipeline_over_http() {
    let app = app();
    let washer = create_machine(&app, "Washer 1", "washer", "W-01").await;
    let dryer = create_machine(&app, "Dryer 1", "dryer", "D-01").await;

    // Intake.
    let (status, order) = api_call(
        &app.router,
        "POST",
        "/orders",
        Some(with_actor(
            serde_json::json!({ "customerId": "c1", "type": "pickup", "weight": 14.5 }),
            "clerk",
            "Front Clerk",
        )),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "new_order");
    assert_eq!(order["seq"], 1);
    let id = order["id"].as_str().unwrap().to_string();

    let (status, order) = api_call(
        &app.router,
        "POST",
        &format!("/orders/{id}/@receive"),
        Some(by("clerk", "Front Clerk")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "received");

    // Wash.
    let (status, order) = api_call(
        &app.router,
        "POST",
        &format!("/orders/{id}/@assign"),
        Some(with_actor(
            serde_json::json!({ "machineCode": "W-01" }),
            "u1",
            "Dana Fox",
        )),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "in_washer");

    let (status, machine) = api_call(&app.router, "GET", &format!("/machines/{washer}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(machine["status"], "in_use");
    assert_eq!(machine["currentOrder"].as_str(), Some(id.as_str()));

    let (status, outcome) = api_call(
        &app.router,
        "POST",
        &format!("/orders/{id}/@release"),
        Some(with_actor(
            serde_json::json!({ "machineId": washer }),
            "u1",
            "Dana Fox",
        )),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(outcome["warning"].is_null());

    // Dry.
    let (status, _) = api_call(
        &app.router,
        "POST",
        &format!("/orders/{id}/@assign"),
        Some(with_actor(
            serde_json::json!({ "machineCode": "D-01" }),
            "u1",
            "Dana Fox",
        )),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = api_call(
        &app.router,
        "POST",
        &format!("/orders/{id}/@unload"),
        Some(with_actor(serde_json::json!({ "machineId": dryer }), "u1", "Dana Fox")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Dual control: same person without the override is a 409 with the
    // structured confirmation payload.
    let (status, err) = api_call(
        &app.router,
        "POST",
        &format!("/orders/{id}/@unload-check"),
        Some(with_actor(serde_json::json!({ "machineId": dryer }), "u1", "Dana Fox")),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(err["code"], "CONFIRMATION_REQUIRED");
    assert_eq!(err["performer"], "u1");

    let (status, order) = api_call(
        &app.router,
        "POST",
        &format!("/orders/{id}/@unload-check"),
        Some(with_actor(serde_json::json!({ "machineId": dryer }), "u2", "Sam Reyes")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "on_cart");

    // The verified dryer is free again.
    let (_, machine) = api_call(&app.router, "GET", &format!("/machines/{dryer}"), None).await;
    assert_eq!(machine["status"], "available");

    // Fold.
    let (status, order) = api_call(
        &app.router,
        "POST",
        &format!("/orders/{id}/@fold-start"),
        Some(with_actor(serde_json::json!({ "machineId": dryer }), "u3", "Kim Ito")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "folding");

    let (status, order) = api_call(
        &app.router,
        "POST",
        &format!("/orders/{id}/@fold-done"),
        Some(by("u3", "Kim Ito")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "folded");

    let (status, _) = api_call(
        &app.router,
        "POST",
        &format!("/orders/{id}/@fold-check"),
        Some(by("u2", "Sam Reyes")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Final check branches a pickup order to ready_for_pickup.
    let (status, order) = api_call(
        &app.router,
        "POST",
        &format!("/orders/{id}/@final-check"),
        Some(with_actor(serde_json::json!({ "finalWeight": 13.9 }), "u2", "Sam Reyes")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "ready_for_pickup");
    assert_eq!(order["finalWeight"], 13.9);

    let (status, order) = api_call(
        &app.router,
        "POST",
        &format!("/orders/{id}/@complete"),
        Some(by("clerk", "Front Clerk")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "completed");

    // Every accepted transition produced an audit event; status changes
    // produced notifications.
    assert!(app.recorder.events().len() >= 10);
    assert!(!app.notifier.sent().is_empty());
}

#[tokio::test]
async fn final_check_out_of_order_reports_required_status() {
    let app = app();
    create_machine(&app, "Dryer 1", "dryer", "D-01").await;

    let (_, order) = api_call(
        &app.router,
        "POST",
        "/orders",
        Some(with_actor(
            serde_json::json!({ "customerId": "c1", "type": "pickup" }),
            "clerk",
            "Front Clerk",
        )),
    )
    .await;
    let id = order["id"].as_str().unwrap().to_string();

    let (status, err) = api_call(
        &app.router,
        "POST",
        &format!("/orders/{id}/@final-check"),
        Some(by("u2", "Sam Reyes")),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(err["code"], "INVALID_STATE");
    assert_eq!(err["required"], "folded");
    assert_eq!(err["actual"], "new_order");
}

#[tokio::test]
async fn keep_separated_bags_and_available_bags_endpoint() {
    let app = app();
    let dryer_a = create_machine(&app, "Dryer 1", "dryer", "D-01").await;
    create_machine(&app, "Dryer 2", "dryer", "D-02").await;

    let (_, order) = api_call(
        &app.router,
        "POST",
        "/orders",
        Some(with_actor(
            serde_json::json!({
                "customerId": "c1",
                "type": "pickup",
                "keepSeparated": true,
                "bags": ["Whites", "Darks"],
            }),
            "clerk",
            "Front Clerk",
        )),
    )
    .await;
    let id = order["id"].as_str().unwrap().to_string();
    let bag_whites = order["bags"][0]["id"].as_str().unwrap().to_string();

    let (status, _) = api_call(
        &app.router,
        "POST",
        &format!("/orders/{id}/@assign"),
        Some(with_actor(
            serde_json::json!({ "machineCode": "D-01", "bagId": bag_whites }),
            "u1",
            "Dana Fox",
        )),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Only the bag not already in a dryer remains offerable.
    let (status, bags) = api_call(
        &app.router,
        "GET",
        &format!("/orders/{id}/available-bags?machineType=dryer"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bags.as_array().unwrap().len(), 1);
    assert_eq!(bags[0]["label"], "Darks");

    // The same bag cannot enter a second dryer.
    let (status, err) = api_call(
        &app.router,
        "POST",
        &format!("/orders/{id}/@assign"),
        Some(with_actor(
            serde_json::json!({ "machineCode": "D-02", "bagId": bag_whites }),
            "u1",
            "Dana Fox",
        )),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(err["code"], "CONFLICT");

    // An occupied dryer cannot be deleted or sent to maintenance.
    let (status, _) = api_call(
        &app.router,
        "POST",
        &format!("/machines/{dryer_a}/@maintenance"),
        Some(with_actor(serde_json::json!({ "on": true }), "admin", "Shift Lead")),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn transfer_stage_appears_only_when_enabled() {
    let app = app_with(WorkflowConfig {
        transfer_tracking: true,
        ..WorkflowConfig::default()
    });
    create_machine(&app, "Washer 1", "washer", "W-01").await;

    let (_, order) = api_call(
        &app.router,
        "POST",
        "/orders",
        Some(with_actor(
            serde_json::json!({ "customerId": "c1", "type": "pickup" }),
            "clerk",
            "Front Clerk",
        )),
    )
    .await;
    let id = order["id"].as_str().unwrap().to_string();

    api_call(
        &app.router,
        "POST",
        &format!("/orders/{id}/@assign"),
        Some(with_actor(serde_json::json!({ "machineCode": "W-01" }), "u1", "Dana Fox")),
    )
    .await;

    let (status, order) = api_call(
        &app.router,
        "POST",
        &format!("/orders/{id}/@transfer"),
        Some(by("u1", "Dana Fox")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "transferred");

    let (status, order) = api_call(
        &app.router,
        "POST",
        &format!("/orders/{id}/@transfer-check"),
        Some(by("u2", "Sam Reyes")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "transfer_checked");
}

#[tokio::test]
async fn soft_delete_restore_and_listing() {
    let app = app();
    let (_, order) = api_call(
        &app.router,
        "POST",
        "/orders",
        Some(with_actor(
            serde_json::json!({ "customerId": "c9", "type": "delivery" }),
            "clerk",
            "Front Clerk",
        )),
    )
    .await;
    let id = order["id"].as_str().unwrap().to_string();

    let (status, _) = api_call(
        &app.router,
        "DELETE",
        &format!("/orders/{id}"),
        Some(by("admin", "Shift Lead")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, listed) = api_call(&app.router, "GET", "/orders", None).await;
    assert_eq!(listed["total"], 0);
    let (_, listed) = api_call(&app.router, "GET", "/orders?includeDeleted=true", None).await;
    assert_eq!(listed["total"], 1);

    let (status, order) = api_call(
        &app.router,
        "POST",
        &format!("/orders/{id}/@restore"),
        Some(by("admin", "Shift Lead")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["deleted"], serde_json::json!(false));

    let (_, listed) = api_call(&app.router, "GET", "/orders?customerId=c9", None).await;
    assert_eq!(listed["total"], 1);
}

//! Webhook router.
//!
//! Both endpoints acknowledge before processing: the external systems retry
//! aggressively on slow responses, and the reconciliation outcome is not
//! theirs to consume. Each event is handed to the worker on a spawned task
//! and resolved (or dropped) there.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use tasklink_sync::ReconciliationWorker;

use crate::payloads::{CrmEventPayload, TrackerEventPayload};

/// Shared state for webhook handlers.
#[derive(Clone)]
pub struct AppState {
    pub worker: Arc<ReconciliationWorker>,
}

/// Creates the webhook router with all routes.
pub fn router(worker: Arc<ReconciliationWorker>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/webhooks/crm", post(crm_webhook_handler))
        .route("/webhooks/tracker/tasks", post(tracker_webhook_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { worker })
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Batch of CRM change events. Acknowledged immediately; each usable event
/// is dispatched to the worker on its own task.
async fn crm_webhook_handler(
    State(state): State<AppState>,
    Json(payloads): Json<Vec<CrmEventPayload>>,
) -> StatusCode {
    let batch_id = Uuid::new_v4();
    info!(%batch_id, events = payloads.len(), "CRM webhook batch received");

    for payload in payloads {
        let Some(event) = payload.into_event() else {
            continue;
        };
        let worker = Arc::clone(&state.worker);
        tokio::spawn(async move {
            worker.handle_source_event(event).await;
        });
    }
    StatusCode::OK
}

/// Single tracker change batch. Acknowledged immediately.
async fn tracker_webhook_handler(
    State(state): State<AppState>,
    Json(payload): Json<TrackerEventPayload>,
) -> StatusCode {
    info!(
        task_id = %payload.task_id,
        changes = payload.history_items.len(),
        "tracker webhook received"
    );

    let worker = Arc::clone(&state.worker);
    let batch = payload.into_batch();
    tokio::spawn(async move {
        worker.handle_target_event(batch).await;
    });
    StatusCode::OK
}

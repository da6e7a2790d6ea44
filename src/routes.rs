// routes.rs
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Extension, Json, Router,
};
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{handler::payments, AppState};

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "message": "Server is running"
    }))
}

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let payment_routes = Router::new()
        .route("/contracts", post(payments::create_contracts))
        .route("/contracts/:contract_id/advance", post(payments::advance_contract))
        .route("/payments/:payment_id/capture", post(payments::capture_payment))
        .route("/payments/:payment_id/release", post(payments::release_escrow))
        .route("/payments/:payment_id/refund", post(payments::refund_payment))
        .route("/payouts/pending", get(payments::pending_payouts))
        .route("/payouts/:transaction_id/confirm", post(payments::confirm_payout))
        .route("/webhook/gateway", post(payments::gateway_webhook));

    Router::new()
        .route("/api/health", get(health_check))
        .nest("/api", payment_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(Extension(app_state))
}

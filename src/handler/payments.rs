// handler/payments.rs
use std::sync::Arc;
use axum::{
    extract::{Path, Query},
    http::HeaderMap,
    response::IntoResponse,
    Extension, Json,
};
use hmac::{Hmac, Mac};
use sha2::Sha512;
use subtle::ConstantTimeEq;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::paymentdtos::*,
    error::HttpError,
    AppState,
};

pub async fn create_contracts(
    Extension(app_state): Extension<Arc<AppState>>,
    Json(body): Json<CreateContractsDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let contracts = app_state
        .contract_service
        .create_contracts_for_job(body.job_id, &body.worker_ids, body.percentages.as_deref())
        .await?;

    Ok(Json(ApiResponse::success(
        "Contracts created",
        contracts,
    )))
}

pub async fn advance_contract(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(contract_id): Path<Uuid>,
    Json(body): Json<AdvanceContractDto>,
) -> Result<impl IntoResponse, HttpError> {
    let contract = app_state
        .contract_service
        .advance_contract(contract_id, body.event, body.actor_id)
        .await?;

    Ok(Json(ApiResponse::success("Contract updated", contract)))
}

pub async fn capture_payment(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(payment_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let payment = app_state.escrow_service.capture_payment(payment_id).await?;

    Ok(Json(ApiResponse::success(
        "Payment captured and held in escrow",
        payment,
    )))
}

pub async fn release_escrow(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(payment_id): Path<Uuid>,
    Json(body): Json<ReleaseEscrowDto>,
) -> Result<impl IntoResponse, HttpError> {
    // Direct admin action: an already-released payment must surface as
    // "already processed", not silent success.
    let payment = app_state
        .escrow_service
        .release(payment_id, Some(body.acting_admin_id), true)
        .await?;

    Ok(Json(ApiResponse::success("Escrow released", payment)))
}

pub async fn refund_payment(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(payment_id): Path<Uuid>,
    Json(body): Json<RefundPaymentDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let payment = app_state
        .escrow_service
        .refund(payment_id, body.amount, &body.reason, body.acting_admin_id)
        .await?;

    Ok(Json(ApiResponse::success("Refund applied", payment)))
}

pub async fn confirm_payout(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(transaction_id): Path<Uuid>,
    Json(body): Json<ConfirmPayoutDto>,
) -> Result<impl IntoResponse, HttpError> {
    let transaction = app_state
        .balance_service
        .confirm_payout(transaction_id, body.acting_admin_id)
        .await?;

    Ok(Json(ApiResponse::success(
        "Payout confirmed and credited",
        transaction,
    )))
}

pub async fn pending_payouts(
    Extension(app_state): Extension<Arc<AppState>>,
    Query(query): Query<PendingPayoutsQuery>,
) -> Result<impl IntoResponse, HttpError> {
    let payouts = app_state
        .balance_service
        .pending_payouts(
            query.user_id,
            query.limit.unwrap_or(50).min(200),
            query.offset.unwrap_or(0),
        )
        .await?;

    Ok(Json(ApiResponse::success("Pending payouts", payouts)))
}

/// Gateway capture webhook. Signature-checked, then idempotent: the gateway
/// may redeliver the same capture event and must always get a 200 back
/// without a second credit.
pub async fn gateway_webhook(
    Extension(app_state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Result<impl IntoResponse, HttpError> {
    let signature = headers
        .get("x-gateway-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| HttpError::unauthorized("Missing webhook signature"))?;

    if !verify_webhook_signature(&app_state.env.gateway_webhook_secret, &body, signature) {
        return Err(HttpError::unauthorized("Invalid webhook signature"));
    }

    let event: CaptureWebhookDto = serde_json::from_str(&body)
        .map_err(|e| HttpError::bad_request(format!("Invalid webhook payload: {e}")))?;

    if event.status != "approved" {
        tracing::info!(
            "Ignoring webhook for payment {} with status {}",
            event.payment_id,
            event.status
        );
        return Ok(Json(ApiResponse::success("Event ignored", ())));
    }

    let payment = app_state
        .escrow_service
        .hold_on_capture(event.payment_id, &event.capture_id)
        .await?;

    if let Err(e) = app_state
        .notification_service
        .notify_payment_captured(payment.payer_id, payment.id, payment.amount)
        .await
    {
        tracing::error!("Failed to send capture notification: {}", e);
    }

    Ok(Json(ApiResponse::success("Capture recorded", ())))
}

fn verify_webhook_signature(secret: &str, body: &str, signature_hex: &str) -> bool {
    let Ok(mut mac) = Hmac::<Sha512>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body.as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());

    expected.as_bytes().ct_eq(signature_hex.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webhook_signature_round_trip() {
        let secret = "test_secret";
        let body = r#"{"payment_id":"00000000-0000-0000-0000-000000000000"}"#;

        let mut mac = Hmac::<Sha512>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        assert!(verify_webhook_signature(secret, body, &signature));
        assert!(!verify_webhook_signature(secret, body, "deadbeef"));
        assert!(!verify_webhook_signature("other_secret", body, &signature));
    }
}

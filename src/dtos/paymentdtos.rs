// dtos/paymentdtos.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::service::contract_service::ContractEvent;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub status: String,
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self {
            status: "success".to_string(),
            message: message.into(),
            data: Some(data),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateContractsDto {
    pub job_id: Uuid,
    #[validate(length(min = 1, message = "At least one worker is required"))]
    pub worker_ids: Vec<Uuid>,
    pub percentages: Option<Vec<f64>>,
}

#[derive(Debug, Deserialize)]
pub struct AdvanceContractDto {
    pub event: ContractEvent,
    pub actor_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ReleaseEscrowDto {
    pub acting_admin_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RefundPaymentDto {
    #[validate(length(min = 1, message = "A refund reason is required"))]
    pub reason: String,
    /// Centavos; omitted means full refund.
    pub amount: Option<i64>,
    pub acting_admin_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmPayoutDto {
    pub acting_admin_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct PendingPayoutsQuery {
    pub user_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CaptureWebhookDto {
    pub payment_id: Uuid,
    pub capture_id: String,
    pub status: String,
}

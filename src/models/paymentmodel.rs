use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq)]
#[sqlx(type_name = "payment_status", rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Processing,
    HeldEscrow,
    Completed,
    /// Refund claimed, gateway call in flight. Blocks a concurrent release.
    Refunding,
    Refunded,
    PartialRefund,
    Failed,
}

impl PaymentStatus {
    pub fn to_str(&self) -> &str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Processing => "processing",
            PaymentStatus::HeldEscrow => "held_escrow",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Refunding => "refunding",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::PartialRefund => "partial_refund",
            PaymentStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq)]
#[sqlx(type_name = "payment_type", rename_all = "snake_case")]
pub enum PaymentType {
    ContractPayment,
    PublicationFee,
    Refund,
}

/// One money-movement record, normally 1:1 with a contract. Retained
/// indefinitely as a financial record.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub contract_id: Option<Uuid>,
    pub payer_id: Uuid,
    pub recipient_id: Uuid,
    /// Amount in centavos.
    pub amount: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub payment_type: PaymentType,
    pub is_escrow: bool,
    pub platform_fee: i64,
    pub platform_fee_percentage: f64,
    pub gateway_order_id: Option<String>,
    /// Gateway capture id; unique, used to dedupe replayed webhooks.
    pub gateway_capture_id: Option<String>,
    pub escrow_released_at: Option<DateTime<Utc>>,
    pub escrow_released_by: Option<Uuid>,
    pub refund_amount: Option<i64>,
    pub refund_reason: Option<String>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub refunded_by: Option<Uuid>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

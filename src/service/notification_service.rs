// service/notification_service.rs
//
// Notifications are best-effort. Callers fire and forget: a delivery or
// storage failure is logged and never propagates into a financial state
// transition.
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    db::db::DBClient,
    models::contractmodel::Contract,
    service::error::ServiceError,
};

#[derive(Debug, Clone)]
pub struct NotificationService {
    db_client: Arc<DBClient>,
}

impl NotificationService {
    pub fn new(db_client: Arc<DBClient>) -> Self {
        Self { db_client }
    }

    pub async fn notify(
        &self,
        user_id: Uuid,
        kind: &str,
        related_id: Option<Uuid>,
        data: Option<serde_json::Value>,
        message: String,
    ) -> Result<(), ServiceError> {
        tracing::info!("Notification [{}] for user {}: {}", kind, user_id, message);

        sqlx::query(
            r#"
            INSERT INTO notifications (user_id, kind, related_id, data, message)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(user_id)
        .bind(kind)
        .bind(related_id)
        .bind(data)
        .bind(message)
        .execute(&self.db_client.pool)
        .await
        .map_err(|e| ServiceError::Notification(e.to_string()))?;

        Ok(())
    }

    pub async fn notify_confirmation_reminder(
        &self,
        user_id: Uuid,
        contract: &Contract,
    ) -> Result<(), ServiceError> {
        self.notify(
            user_id,
            "confirmation_reminder",
            Some(contract.id),
            Some(serde_json::json!({ "job_id": contract.job_id })),
            "Your job has ended. Please confirm completion so payment can be released."
                .to_string(),
        )
        .await
    }

    pub async fn notify_contract_completed(
        &self,
        user_id: Uuid,
        contract: &Contract,
        auto_confirmed: bool,
    ) -> Result<(), ServiceError> {
        self.notify(
            user_id,
            "contract_completed",
            Some(contract.id),
            Some(serde_json::json!({
                "job_id": contract.job_id,
                "auto_confirmed": auto_confirmed,
            })),
            if auto_confirmed {
                "Contract was automatically completed after the confirmation window elapsed."
                    .to_string()
            } else {
                "Contract completed. Payment is pending admin verification.".to_string()
            },
        )
        .await
    }

    pub async fn notify_payout_pending(
        &self,
        user_id: Uuid,
        contract: &Contract,
        amount: i64,
    ) -> Result<(), ServiceError> {
        self.notify(
            user_id,
            "payout_pending",
            Some(contract.id),
            Some(serde_json::json!({ "amount": amount })),
            "Your payout was recorded and will be credited after verification.".to_string(),
        )
        .await
    }

    pub async fn notify_contract_cancelled(
        &self,
        user_id: Uuid,
        contract: &Contract,
    ) -> Result<(), ServiceError> {
        self.notify(
            user_id,
            "contract_cancelled",
            Some(contract.id),
            None,
            "Contract was cancelled. A refund decision is pending review.".to_string(),
        )
        .await
    }

    pub async fn notify_payment_captured(
        &self,
        user_id: Uuid,
        payment_id: Uuid,
        amount: i64,
    ) -> Result<(), ServiceError> {
        self.notify(
            user_id,
            "payment_captured",
            Some(payment_id),
            Some(serde_json::json!({ "amount": amount })),
            "Payment received and held in escrow.".to_string(),
        )
        .await
    }
}

// service/balance_service.rs
//
// Two-phase payout credit: record_pending happens automatically at contract
// completion, confirm_payout is the admin verification step that actually
// makes funds spendable. The user balance column is never written anywhere
// else.
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    db::{balancedb::BalanceExt, db::DBClient},
    models::balancemodel::BalanceTransaction,
    service::error::ServiceError,
};

#[derive(Clone)]
pub struct BalanceService {
    db_client: Arc<DBClient>,
}

impl BalanceService {
    pub fn new(db_client: Arc<DBClient>) -> Self {
        Self { db_client }
    }

    /// Admin-triggered verification. Confirming a transaction that is no
    /// longer pending is an explicit "already processed" error, never a
    /// second credit.
    pub async fn confirm_payout(
        &self,
        transaction_id: Uuid,
        admin_id: Uuid,
    ) -> Result<BalanceTransaction, ServiceError> {
        match self
            .db_client
            .confirm_and_credit(transaction_id, admin_id)
            .await?
        {
            Some(confirmed) => {
                tracing::info!(
                    "Payout {} confirmed by admin {}: {} credited to user {}",
                    transaction_id,
                    admin_id,
                    confirmed.amount,
                    confirmed.user_id
                );
                Ok(confirmed)
            }
            None => {
                if self
                    .db_client
                    .get_balance_transaction(transaction_id)
                    .await?
                    .is_some()
                {
                    Err(ServiceError::AlreadyProcessed(transaction_id))
                } else {
                    Err(ServiceError::TransactionNotFound(transaction_id))
                }
            }
        }
    }

    /// Read model for the admin payments UI.
    pub async fn pending_payouts(
        &self,
        user_id: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<BalanceTransaction>, ServiceError> {
        Ok(self
            .db_client
            .get_pending_payouts(user_id, limit, offset)
            .await?)
    }
}

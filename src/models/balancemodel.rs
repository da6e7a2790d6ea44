use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq)]
#[sqlx(type_name = "balance_transaction_type", rename_all = "snake_case")]
pub enum BalanceTransactionType {
    ContractPayout,
    Refund,
    Adjustment,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq)]
#[sqlx(type_name = "balance_transaction_status", rename_all = "snake_case")]
pub enum BalanceTransactionStatus {
    Pending,
    Completed,
    Reversed,
}

/// Append-only ledger row for a user's internal balance. While pending, the
/// visible balance is unaffected; `new_balance == previous_balance + amount`
/// holds only once the row is completed.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BalanceTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub transaction_type: BalanceTransactionType,
    /// Signed amount in centavos: positive credit, negative debit.
    pub amount: i64,
    pub previous_balance: i64,
    pub new_balance: i64,
    pub related_model: Option<String>,
    pub related_id: Option<Uuid>,
    pub status: BalanceTransactionStatus,
    pub description: String,
    pub confirmed_by: Option<Uuid>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq)]
#[sqlx(type_name = "contract_status", rename_all = "snake_case")]
pub enum ContractStatus {
    Pending,
    Accepted,
    InProgress,
    AwaitingConfirmation,
    Completed,
    Disputed,
    Cancelled,
}

impl ContractStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ContractStatus::Completed | ContractStatus::Cancelled)
    }

    pub fn to_str(&self) -> &str {
        match self {
            ContractStatus::Pending => "pending",
            ContractStatus::Accepted => "accepted",
            ContractStatus::InProgress => "in_progress",
            ContractStatus::AwaitingConfirmation => "awaiting_confirmation",
            ContractStatus::Completed => "completed",
            ContractStatus::Disputed => "disputed",
            ContractStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq)]
#[sqlx(type_name = "contract_escrow_status", rename_all = "snake_case")]
pub enum ContractEscrowStatus {
    Pending,
    Held,
    Released,
    Refunded,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq)]
#[sqlx(type_name = "payout_status", rename_all = "snake_case")]
pub enum PayoutStatus {
    NotDue,
    PendingPayout,
    Paid,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq)]
#[sqlx(type_name = "contract_party", rename_all = "snake_case")]
pub enum ContractParty {
    Client,
    Doer,
    Admin,
}

/// One work engagement between a client and a doer for a job. Money fields
/// are centavos; price + commission == total_price at creation and is never
/// mutated after funds are captured. Cancellation is a terminal status, not
/// a row removal.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Contract {
    pub id: Uuid,
    pub job_id: Uuid,
    pub client_id: Uuid,
    pub doer_id: Uuid,
    /// Base amount owed to this doer.
    pub price: i64,
    pub commission: i64,
    /// Commission rate (percent) snapshotted at creation.
    pub commission_rate: f64,
    pub total_price: i64,
    pub status: ContractStatus,
    pub escrow_status: ContractEscrowStatus,
    pub payout_status: PayoutStatus,
    pub allocated_amount: i64,
    pub percentage_of_budget: f64,
    pub terms_accepted_by_client: bool,
    pub terms_accepted_by_doer: bool,
    pub client_confirmed: bool,
    pub client_confirmed_at: Option<DateTime<Utc>>,
    pub doer_confirmed: bool,
    pub doer_confirmed_at: Option<DateTime<Utc>>,
    pub awaiting_confirmation_at: Option<DateTime<Utc>>,
    pub confirmation_reminder_sent: bool,
    pub cancelled_by_id: Option<Uuid>,
    pub cancelled_by_role: Option<ContractParty>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Contract {
    pub fn both_confirmed(&self) -> bool {
        self.client_confirmed && self.doer_confirmed
    }
}

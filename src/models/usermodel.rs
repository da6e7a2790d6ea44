use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq)]
#[sqlx(type_name = "membership_tier", rename_all = "snake_case")]
pub enum MembershipTier {
    Free,
    Pro,
    SuperPro,
}

impl MembershipTier {
    /// Default platform commission rate (percent) for each tier.
    pub fn default_commission_rate(&self) -> f64 {
        match self {
            MembershipTier::Free => 8.0,
            MembershipTier::Pro => 2.0,
            MembershipTier::SuperPro => 1.0,
        }
    }

    pub fn to_str(&self) -> &str {
        match self {
            MembershipTier::Free => "free",
            MembershipTier::Pro => "pro",
            MembershipTier::SuperPro => "super_pro",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    /// Internal spendable balance in centavos. Written exclusively through
    /// the balance ledger's confirm step.
    pub balance: i64,
    pub membership_tier: MembershipTier,
    pub referral_code: Option<String>,
    pub referred_by: Option<Uuid>,
    pub completed_referrals: Option<i32>,
    pub has_referral_discount: Option<bool>,
    pub referral_discount_expires_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

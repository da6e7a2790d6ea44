// service/commission.rs
use chrono::{DateTime, Utc};

use crate::{models::usermodel::MembershipTier, service::error::ServiceError};

/// Rate applied while a referral discount is active, regardless of tier.
pub const REFERRAL_DISCOUNT_RATE: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct CommissionQuote {
    /// Percent rate actually applied.
    pub rate: f64,
    /// Platform fee in centavos.
    pub commission: i64,
    /// base_amount + commission, exact.
    pub total_price: i64,
}

/// Resolve the effective commission rate for a payer at `now`. An expired
/// referral discount silently falls back to the tier default.
pub fn effective_rate(
    tier: MembershipTier,
    has_referral_discount: bool,
    referral_discount_expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> f64 {
    if has_referral_discount {
        if let Some(expires_at) = referral_discount_expires_at {
            if expires_at > now {
                return REFERRAL_DISCOUNT_RATE;
            }
        }
    }
    tier.default_commission_rate()
}

/// Pure commission calculation. The caller snapshots the resulting rate into
/// the contract at creation; it is never recomputed from a later user record.
pub fn calculate_commission(
    tier: MembershipTier,
    has_referral_discount: bool,
    referral_discount_expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    base_amount: i64,
) -> Result<CommissionQuote, ServiceError> {
    if base_amount <= 0 {
        return Err(ServiceError::Validation(
            "Base amount must be positive".to_string(),
        ));
    }

    let rate = effective_rate(tier, has_referral_discount, referral_discount_expires_at, now);
    Ok(quote_at_rate(rate, base_amount))
}

/// Re-quote with an already-snapshotted rate (used at completion time so a
/// mutated user record can never change an existing contract's fee).
pub fn quote_at_rate(rate: f64, base_amount: i64) -> CommissionQuote {
    let commission = (base_amount as f64 * rate / 100.0).round() as i64;
    CommissionQuote {
        rate,
        commission,
        total_price: base_amount + commission,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    // 10,000 ARS expressed in centavos.
    const BASE: i64 = 1_000_000;

    #[test]
    fn free_tier_default_rate() {
        let q = calculate_commission(MembershipTier::Free, false, None, Utc::now(), BASE).unwrap();
        assert_eq!(q.rate, 8.0);
        assert_eq!(q.commission, 80_000);
        assert_eq!(q.total_price, 1_080_000);
    }

    #[test]
    fn active_referral_discount_overrides_tier() {
        let now = Utc::now();
        let q = calculate_commission(
            MembershipTier::Free,
            true,
            Some(now + Duration::days(10)),
            now,
            BASE,
        )
        .unwrap();
        assert_eq!(q.rate, REFERRAL_DISCOUNT_RATE);
        assert_eq!(q.commission, 30_000);
        assert_eq!(q.total_price, 1_030_000);
    }

    #[test]
    fn expired_discount_falls_back_to_tier() {
        let now = Utc::now();
        let q = calculate_commission(
            MembershipTier::Pro,
            true,
            Some(now - Duration::hours(1)),
            now,
            BASE,
        )
        .unwrap();
        assert_eq!(q.rate, 2.0);
        assert_eq!(q.commission, 20_000);
    }

    #[test]
    fn discount_flag_without_expiry_is_ignored() {
        let q =
            calculate_commission(MembershipTier::SuperPro, true, None, Utc::now(), BASE).unwrap();
        assert_eq!(q.rate, 1.0);
    }

    #[test]
    fn total_is_exactly_base_plus_commission() {
        for base in [1, 333, 12_345, 9_999_999] {
            let q = calculate_commission(MembershipTier::Free, false, None, Utc::now(), base)
                .unwrap();
            assert_eq!(q.total_price, base + q.commission);
        }
    }

    #[test]
    fn deterministic_for_same_inputs() {
        let now = Utc::now();
        let a = calculate_commission(MembershipTier::Pro, false, None, now, 777_777).unwrap();
        let b = calculate_commission(MembershipTier::Pro, false, None, now, 777_777).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_non_positive_amounts() {
        assert!(calculate_commission(MembershipTier::Free, false, None, Utc::now(), 0).is_err());
        assert!(calculate_commission(MembershipTier::Free, false, None, Utc::now(), -5).is_err());
    }
}

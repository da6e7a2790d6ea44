// db/paymentdb.rs
//
// The escrow guarantees live here as single-row conditional updates:
// release only ever matches a row still in held_escrow, and a refund must
// first claim the row (held_escrow -> refunding) before the gateway is
// called, so two racing disbursements cannot both succeed.
use async_trait::async_trait;
use sqlx::Error;
use uuid::Uuid;

use super::db::DBClient;
use crate::models::paymentmodel::{Payment, PaymentStatus};

#[async_trait]
pub trait PaymentExt {
    async fn get_payment_by_id(&self, payment_id: Uuid) -> Result<Option<Payment>, Error>;

    async fn get_payment_by_contract_id(
        &self,
        contract_id: Uuid,
    ) -> Result<Option<Payment>, Error>;

    /// Dedupe lookup for replayed gateway webhooks.
    async fn get_payment_by_capture_id(
        &self,
        capture_id: &str,
    ) -> Result<Option<Payment>, Error>;

    /// Attach the gateway order id once; an existing id is never
    /// overwritten.
    async fn set_gateway_order(
        &self,
        payment_id: Uuid,
        order_id: &str,
    ) -> Result<Option<Payment>, Error>;

    /// Pending -> Processing, marking the outbound gateway call in flight.
    async fn mark_processing(&self, payment_id: Uuid) -> Result<Option<Payment>, Error>;

    /// Pending/Processing -> HeldEscrow, recording the gateway capture id.
    async fn hold_in_escrow(
        &self,
        payment_id: Uuid,
        capture_id: &str,
    ) -> Result<Option<Payment>, Error>;

    /// HeldEscrow -> Completed. Returns None when the row was not in
    /// held_escrow, which is how the at-most-once release is enforced.
    async fn release_escrow(
        &self,
        payment_id: Uuid,
        released_by: Option<Uuid>,
    ) -> Result<Option<Payment>, Error>;

    /// Pending/Processing -> Failed on capture failure.
    async fn mark_failed(&self, payment_id: Uuid) -> Result<Option<Payment>, Error>;

    /// HeldEscrow -> Refunding. Claims the row ahead of the gateway refund
    /// call; a claimed row can no longer be released.
    async fn begin_refund(&self, payment_id: Uuid) -> Result<Option<Payment>, Error>;

    /// Refunding -> HeldEscrow, releasing the claim after a gateway failure.
    async fn cancel_refund(&self, payment_id: Uuid) -> Result<Option<Payment>, Error>;

    /// Refunding -> Refunded (full) or PartialRefund.
    async fn apply_refund(
        &self,
        payment_id: Uuid,
        status: PaymentStatus,
        refund_amount: i64,
        reason: &str,
        refunded_by: Uuid,
    ) -> Result<Option<Payment>, Error>;
}

#[async_trait]
impl PaymentExt for DBClient {
    async fn get_payment_by_id(&self, payment_id: Uuid) -> Result<Option<Payment>, Error> {
        sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1")
            .bind(payment_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn get_payment_by_contract_id(
        &self,
        contract_id: Uuid,
    ) -> Result<Option<Payment>, Error> {
        sqlx::query_as::<_, Payment>(
            r#"
            SELECT * FROM payments
            WHERE contract_id = $1 AND payment_type = 'contract_payment'
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(contract_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn get_payment_by_capture_id(
        &self,
        capture_id: &str,
    ) -> Result<Option<Payment>, Error> {
        sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments WHERE gateway_capture_id = $1",
        )
        .bind(capture_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn set_gateway_order(
        &self,
        payment_id: Uuid,
        order_id: &str,
    ) -> Result<Option<Payment>, Error> {
        sqlx::query_as::<_, Payment>(
            r#"
            UPDATE payments
            SET gateway_order_id = $2, updated_at = NOW()
            WHERE id = $1 AND gateway_order_id IS NULL
            RETURNING *
            "#,
        )
        .bind(payment_id)
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn mark_processing(&self, payment_id: Uuid) -> Result<Option<Payment>, Error> {
        sqlx::query_as::<_, Payment>(
            r#"
            UPDATE payments
            SET status = 'processing', updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn hold_in_escrow(
        &self,
        payment_id: Uuid,
        capture_id: &str,
    ) -> Result<Option<Payment>, Error> {
        sqlx::query_as::<_, Payment>(
            r#"
            UPDATE payments
            SET status = 'held_escrow', gateway_capture_id = $2, updated_at = NOW()
            WHERE id = $1 AND status IN ('pending', 'processing')
            RETURNING *
            "#,
        )
        .bind(payment_id)
        .bind(capture_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn release_escrow(
        &self,
        payment_id: Uuid,
        released_by: Option<Uuid>,
    ) -> Result<Option<Payment>, Error> {
        sqlx::query_as::<_, Payment>(
            r#"
            UPDATE payments
            SET status = 'completed',
                escrow_released_at = NOW(),
                escrow_released_by = $2,
                updated_at = NOW()
            WHERE id = $1 AND status = 'held_escrow'
            RETURNING *
            "#,
        )
        .bind(payment_id)
        .bind(released_by)
        .fetch_optional(&self.pool)
        .await
    }

    async fn mark_failed(&self, payment_id: Uuid) -> Result<Option<Payment>, Error> {
        sqlx::query_as::<_, Payment>(
            r#"
            UPDATE payments
            SET status = 'failed', updated_at = NOW()
            WHERE id = $1 AND status IN ('pending', 'processing')
            RETURNING *
            "#,
        )
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn begin_refund(&self, payment_id: Uuid) -> Result<Option<Payment>, Error> {
        sqlx::query_as::<_, Payment>(
            r#"
            UPDATE payments
            SET status = 'refunding', updated_at = NOW()
            WHERE id = $1 AND status = 'held_escrow'
            RETURNING *
            "#,
        )
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn cancel_refund(&self, payment_id: Uuid) -> Result<Option<Payment>, Error> {
        sqlx::query_as::<_, Payment>(
            r#"
            UPDATE payments
            SET status = 'held_escrow', updated_at = NOW()
            WHERE id = $1 AND status = 'refunding'
            RETURNING *
            "#,
        )
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn apply_refund(
        &self,
        payment_id: Uuid,
        status: PaymentStatus,
        refund_amount: i64,
        reason: &str,
        refunded_by: Uuid,
    ) -> Result<Option<Payment>, Error> {
        sqlx::query_as::<_, Payment>(
            r#"
            UPDATE payments
            SET status = $2,
                refund_amount = $3,
                refund_reason = $4,
                refunded_at = NOW(),
                refunded_by = $5,
                updated_at = NOW()
            WHERE id = $1 AND status = 'refunding'
            RETURNING *
            "#,
        )
        .bind(payment_id)
        .bind(status)
        .bind(refund_amount)
        .bind(reason)
        .bind(refunded_by)
        .fetch_optional(&self.pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::PgPool;

    async fn seed_user(pool: &PgPool, email: &str) -> Uuid {
        sqlx::query_scalar("INSERT INTO users (name, email) VALUES ($1, $2) RETURNING id")
            .bind("Someone")
            .bind(email)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    async fn seed_held_payment(pool: &PgPool) -> Payment {
        let payer = seed_user(pool, "client@example.com").await;
        let recipient = seed_user(pool, "doer@example.com").await;
        sqlx::query_as::<_, Payment>(
            r#"
            INSERT INTO payments (payer_id, recipient_id, amount, status, gateway_capture_id)
            VALUES ($1, $2, 108000, 'held_escrow', 'cap_1')
            RETURNING *
            "#,
        )
        .bind(payer)
        .bind(recipient)
        .fetch_one(pool)
        .await
        .unwrap()
    }

    #[sqlx::test]
    async fn release_is_at_most_once(pool: PgPool) {
        let db = DBClient::new(pool.clone());
        let payment = seed_held_payment(&pool).await;

        let first = db.release_escrow(payment.id, None).await.unwrap();
        assert_eq!(first.unwrap().status, PaymentStatus::Completed);

        assert!(db.release_escrow(payment.id, None).await.unwrap().is_none());
    }

    #[sqlx::test]
    async fn claimed_refund_blocks_release(pool: PgPool) {
        let db = DBClient::new(pool.clone());
        let payment = seed_held_payment(&pool).await;

        let claimed = db.begin_refund(payment.id).await.unwrap().unwrap();
        assert_eq!(claimed.status, PaymentStatus::Refunding);
        assert!(db.release_escrow(payment.id, None).await.unwrap().is_none());

        // Dropping the claim puts the row back where a release can find it.
        let restored = db.cancel_refund(payment.id).await.unwrap().unwrap();
        assert_eq!(restored.status, PaymentStatus::HeldEscrow);
        assert!(db.release_escrow(payment.id, None).await.unwrap().is_some());
    }

    #[sqlx::test]
    async fn released_payment_cannot_be_claimed_for_refund(pool: PgPool) {
        let db = DBClient::new(pool.clone());
        let payment = seed_held_payment(&pool).await;

        db.release_escrow(payment.id, None).await.unwrap().unwrap();
        assert!(db.begin_refund(payment.id).await.unwrap().is_none());
    }

    #[sqlx::test]
    async fn gateway_order_is_attached_once(pool: PgPool) {
        let db = DBClient::new(pool.clone());
        let payer = seed_user(&pool, "client@example.com").await;
        let recipient = seed_user(&pool, "doer@example.com").await;
        let payment = sqlx::query_as::<_, Payment>(
            "INSERT INTO payments (payer_id, recipient_id, amount) VALUES ($1, $2, 108000) RETURNING *",
        )
        .bind(payer)
        .bind(recipient)
        .fetch_one(&pool)
        .await
        .unwrap();

        let updated = db.set_gateway_order(payment.id, "order_1").await.unwrap().unwrap();
        assert_eq!(updated.gateway_order_id.as_deref(), Some("order_1"));

        assert!(db.set_gateway_order(payment.id, "order_2").await.unwrap().is_none());
        let current = db.get_payment_by_id(payment.id).await.unwrap().unwrap();
        assert_eq!(current.gateway_order_id.as_deref(), Some("order_1"));
    }
}

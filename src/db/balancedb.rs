// db/balancedb.rs
//
// The user balance column is written in exactly one place: the confirm step
// below. Everything else only appends ledger rows.
use async_trait::async_trait;
use sqlx::Error;
use uuid::Uuid;

use super::db::DBClient;
use crate::models::balancemodel::{BalanceTransaction, BalanceTransactionType};

#[async_trait]
pub trait BalanceExt {
    /// Append a pending ledger row. The visible balance is untouched:
    /// previous_balance == new_balance until an admin confirms.
    async fn record_pending(
        &self,
        user_id: Uuid,
        transaction_type: BalanceTransactionType,
        amount: i64,
        related_model: Option<String>,
        related_id: Option<Uuid>,
        description: String,
    ) -> Result<BalanceTransaction, Error>;

    /// Flip a pending row to completed and apply the credit to the user's
    /// live balance, atomically. Returns None if the row was not pending,
    /// which is the at-most-once confirmation guarantee.
    async fn confirm_and_credit(
        &self,
        transaction_id: Uuid,
        admin_id: Uuid,
    ) -> Result<Option<BalanceTransaction>, Error>;

    async fn get_balance_transaction(
        &self,
        transaction_id: Uuid,
    ) -> Result<Option<BalanceTransaction>, Error>;

    async fn get_pending_payouts(
        &self,
        user_id: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<BalanceTransaction>, Error>;
}

#[async_trait]
impl BalanceExt for DBClient {
    async fn record_pending(
        &self,
        user_id: Uuid,
        transaction_type: BalanceTransactionType,
        amount: i64,
        related_model: Option<String>,
        related_id: Option<Uuid>,
        description: String,
    ) -> Result<BalanceTransaction, Error> {
        let balance: i64 = sqlx::query_scalar("SELECT balance FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        sqlx::query_as::<_, BalanceTransaction>(
            r#"
            INSERT INTO balance_transactions (
                user_id, transaction_type, amount, previous_balance, new_balance,
                related_model, related_id, status, description
            )
            VALUES ($1, $2, $3, $4, $4, $5, $6, 'pending', $7)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(transaction_type)
        .bind(amount)
        .bind(balance)
        .bind(related_model)
        .bind(related_id)
        .bind(description)
        .fetch_one(&self.pool)
        .await
    }

    async fn confirm_and_credit(
        &self,
        transaction_id: Uuid,
        admin_id: Uuid,
    ) -> Result<Option<BalanceTransaction>, Error> {
        let mut tx = self.pool.begin().await?;

        // Lock the user row so previous/new balance reflect the balance at
        // confirmation time, not at record time.
        let balance: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT u.balance FROM users u
            JOIN balance_transactions bt ON bt.user_id = u.id
            WHERE bt.id = $1 AND bt.status = 'pending'
            FOR UPDATE OF u
            "#,
        )
        .bind(transaction_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(balance) = balance else {
            return Ok(None);
        };

        let confirmed = sqlx::query_as::<_, BalanceTransaction>(
            r#"
            UPDATE balance_transactions
            SET status = 'completed',
                previous_balance = $2,
                new_balance = $2 + amount,
                confirmed_by = $3,
                confirmed_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(transaction_id)
        .bind(balance)
        .bind(admin_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(confirmed) = confirmed else {
            return Ok(None);
        };

        sqlx::query("UPDATE users SET balance = $2, updated_at = NOW() WHERE id = $1")
            .bind(confirmed.user_id)
            .bind(confirmed.new_balance)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(confirmed))
    }

    async fn get_balance_transaction(
        &self,
        transaction_id: Uuid,
    ) -> Result<Option<BalanceTransaction>, Error> {
        sqlx::query_as::<_, BalanceTransaction>(
            "SELECT * FROM balance_transactions WHERE id = $1",
        )
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn get_pending_payouts(
        &self,
        user_id: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<BalanceTransaction>, Error> {
        sqlx::query_as::<_, BalanceTransaction>(
            r#"
            SELECT * FROM balance_transactions
            WHERE status = 'pending'
            AND transaction_type = 'contract_payout'
            AND ($1::uuid IS NULL OR user_id = $1)
            ORDER BY created_at
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::balancemodel::BalanceTransactionStatus;
    use sqlx::PgPool;

    async fn seed_user(pool: &PgPool, email: &str) -> Uuid {
        sqlx::query_scalar("INSERT INTO users (name, email) VALUES ($1, $2) RETURNING id")
            .bind("Someone")
            .bind(email)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    async fn balance_of(pool: &PgPool, user_id: Uuid) -> i64 {
        sqlx::query_scalar("SELECT balance FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[sqlx::test]
    async fn balance_changes_only_on_confirm(pool: PgPool) {
        let db = DBClient::new(pool.clone());
        let doer = seed_user(&pool, "doer@example.com").await;
        let admin = seed_user(&pool, "admin@example.com").await;

        let pending = db
            .record_pending(
                doer,
                BalanceTransactionType::ContractPayout,
                50_000,
                None,
                None,
                "Payout".to_string(),
            )
            .await
            .unwrap();
        assert_eq!(pending.status, BalanceTransactionStatus::Pending);
        assert_eq!(pending.previous_balance, pending.new_balance);
        assert_eq!(balance_of(&pool, doer).await, 0);

        let confirmed = db.confirm_and_credit(pending.id, admin).await.unwrap().unwrap();
        assert_eq!(confirmed.status, BalanceTransactionStatus::Completed);
        assert_eq!(confirmed.previous_balance, 0);
        assert_eq!(confirmed.new_balance, 50_000);
        assert_eq!(balance_of(&pool, doer).await, 50_000);

        // A second confirmation never credits twice.
        assert!(db.confirm_and_credit(pending.id, admin).await.unwrap().is_none());
        assert_eq!(balance_of(&pool, doer).await, 50_000);
    }
}

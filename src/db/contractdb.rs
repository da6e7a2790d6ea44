// db/contractdb.rs
//
// Every write that moves a contract through its lifecycle carries a status
// precondition in the WHERE clause. A query returning no row means another
// actor (human action, scheduler tick) got there first; callers decide
// whether that is benign or an error.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Error;
use uuid::Uuid;

use super::db::DBClient;
use crate::models::contractmodel::{Contract, ContractParty};

/// Per-worker creation input, snapshotted from the splitter and the
/// commission calculator.
#[derive(Debug, Clone)]
pub struct NewContract {
    pub worker_id: Uuid,
    pub amount: i64,
    pub percentage: f64,
    pub commission: i64,
    pub commission_rate: f64,
}

#[async_trait]
pub trait ContractExt {
    /// Freeze the allocation split and create one contract plus its pending
    /// escrow payment per worker, all in a single transaction. Returns None
    /// if the job already has allocations, so a re-run can never re-split
    /// funds that contracts already snapshot.
    async fn create_contracts_with_payments(
        &self,
        job_id: Uuid,
        client_id: Uuid,
        currency: &str,
        rows: &[NewContract],
        remaining_budget: i64,
    ) -> Result<Option<Vec<Contract>>, Error>;

    async fn get_contract_by_id(&self, contract_id: Uuid) -> Result<Option<Contract>, Error>;

    async fn get_contracts_by_job_id(&self, job_id: Uuid) -> Result<Vec<Contract>, Error>;

    /// Record one party's terms acceptance; moves Pending -> Accepted once
    /// both parties have accepted.
    async fn accept_terms(
        &self,
        contract_id: Uuid,
        party: ContractParty,
    ) -> Result<Option<Contract>, Error>;

    /// Accepted -> InProgress.
    async fn start_contract(&self, contract_id: Uuid) -> Result<Option<Contract>, Error>;

    /// Accepted/InProgress -> AwaitingConfirmation, stamping
    /// awaiting_confirmation_at once.
    async fn mark_awaiting_confirmation(
        &self,
        contract_id: Uuid,
    ) -> Result<Option<Contract>, Error>;

    /// Set one party's confirmation flag while AwaitingConfirmation. An
    /// already-set timestamp is preserved.
    async fn set_confirmation(
        &self,
        contract_id: Uuid,
        party: ContractParty,
    ) -> Result<Option<Contract>, Error>;

    /// AwaitingConfirmation -> Completed, forcing both confirmation flags
    /// (existing timestamps preserved), releasing escrow status and marking
    /// the payout pending. Returns None if the row was not in
    /// AwaitingConfirmation, i.e. someone else completed or cancelled it.
    async fn complete_contract(&self, contract_id: Uuid) -> Result<Option<Contract>, Error>;

    /// Any non-terminal status -> Cancelled.
    async fn cancel_contract(
        &self,
        contract_id: Uuid,
        cancelled_by_id: Uuid,
        cancelled_by_role: ContractParty,
    ) -> Result<Option<Contract>, Error>;

    /// InProgress/AwaitingConfirmation -> Disputed.
    async fn dispute_contract(&self, contract_id: Uuid) -> Result<Option<Contract>, Error>;

    async fn mark_reminder_sent(&self, contract_id: Uuid) -> Result<bool, Error>;

    /// Contracts whose job end date has passed, reminder not yet sent, with
    /// at least one party unconfirmed.
    async fn contracts_due_for_reminder(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Contract>, Error>;

    /// Contracts stuck in AwaitingConfirmation at or beyond the cutoff with
    /// at least one party unconfirmed.
    async fn contracts_due_for_auto_confirm(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Contract>, Error>;
}

#[async_trait]
impl ContractExt for DBClient {
    async fn create_contracts_with_payments(
        &self,
        job_id: Uuid,
        client_id: Uuid,
        currency: &str,
        rows: &[NewContract],
        remaining_budget: i64,
    ) -> Result<Option<Vec<Contract>>, Error> {
        let mut tx = self.pool.begin().await?;

        let existing: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM worker_allocations WHERE job_id = $1",
        )
        .bind(job_id)
        .fetch_one(&mut *tx)
        .await?;

        if existing > 0 {
            return Ok(None);
        }

        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO worker_allocations (job_id, worker_id, allocated_amount, percentage)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(job_id)
            .bind(row.worker_id)
            .bind(row.amount)
            .bind(row.percentage)
            .execute(&mut *tx)
            .await?;
        }

        let allocated_total: i64 = rows.iter().map(|r| r.amount).sum();
        sqlx::query(
            r#"
            UPDATE jobs
            SET allocated_total = $2, remaining_budget = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(allocated_total)
        .bind(remaining_budget)
        .execute(&mut *tx)
        .await?;

        let mut contracts = Vec::with_capacity(rows.len());
        for row in rows {
            let contract = sqlx::query_as::<_, Contract>(
                r#"
                INSERT INTO contracts (
                    job_id, client_id, doer_id, price, commission, commission_rate,
                    total_price, status, escrow_status, payout_status,
                    allocated_amount, percentage_of_budget
                )
                VALUES ($1, $2, $3, $4, $5, $6, $4 + $5, 'pending', 'pending', 'not_due', $4, $7)
                RETURNING *
                "#,
            )
            .bind(job_id)
            .bind(client_id)
            .bind(row.worker_id)
            .bind(row.amount)
            .bind(row.commission)
            .bind(row.commission_rate)
            .bind(row.percentage)
            .fetch_one(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                INSERT INTO payments (
                    contract_id, payer_id, recipient_id, amount, currency,
                    platform_fee, platform_fee_percentage
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(contract.id)
            .bind(client_id)
            .bind(row.worker_id)
            .bind(contract.total_price)
            .bind(currency)
            .bind(row.commission)
            .bind(row.commission_rate)
            .execute(&mut *tx)
            .await?;

            contracts.push(contract);
        }

        tx.commit().await?;
        Ok(Some(contracts))
    }

    async fn get_contract_by_id(&self, contract_id: Uuid) -> Result<Option<Contract>, Error> {
        sqlx::query_as::<_, Contract>("SELECT * FROM contracts WHERE id = $1")
            .bind(contract_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn get_contracts_by_job_id(&self, job_id: Uuid) -> Result<Vec<Contract>, Error> {
        sqlx::query_as::<_, Contract>(
            "SELECT * FROM contracts WHERE job_id = $1 ORDER BY created_at",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn accept_terms(
        &self,
        contract_id: Uuid,
        party: ContractParty,
    ) -> Result<Option<Contract>, Error> {
        let (client_accepts, doer_accepts) = match party {
            ContractParty::Client => (true, false),
            ContractParty::Doer => (false, true),
            ContractParty::Admin => (false, false),
        };

        sqlx::query_as::<_, Contract>(
            r#"
            UPDATE contracts
            SET terms_accepted_by_client = terms_accepted_by_client OR $2,
                terms_accepted_by_doer = terms_accepted_by_doer OR $3,
                status = CASE
                    WHEN (terms_accepted_by_client OR $2) AND (terms_accepted_by_doer OR $3)
                    THEN 'accepted'::contract_status
                    ELSE status
                END,
                updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(contract_id)
        .bind(client_accepts)
        .bind(doer_accepts)
        .fetch_optional(&self.pool)
        .await
    }

    async fn start_contract(&self, contract_id: Uuid) -> Result<Option<Contract>, Error> {
        sqlx::query_as::<_, Contract>(
            r#"
            UPDATE contracts
            SET status = 'in_progress', updated_at = NOW()
            WHERE id = $1 AND status = 'accepted'
            RETURNING *
            "#,
        )
        .bind(contract_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn mark_awaiting_confirmation(
        &self,
        contract_id: Uuid,
    ) -> Result<Option<Contract>, Error> {
        sqlx::query_as::<_, Contract>(
            r#"
            UPDATE contracts
            SET status = 'awaiting_confirmation',
                awaiting_confirmation_at = COALESCE(awaiting_confirmation_at, NOW()),
                updated_at = NOW()
            WHERE id = $1 AND status IN ('accepted', 'in_progress')
            RETURNING *
            "#,
        )
        .bind(contract_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn set_confirmation(
        &self,
        contract_id: Uuid,
        party: ContractParty,
    ) -> Result<Option<Contract>, Error> {
        let (client_confirms, doer_confirms) = match party {
            ContractParty::Client => (true, false),
            ContractParty::Doer => (false, true),
            ContractParty::Admin => (false, false),
        };

        sqlx::query_as::<_, Contract>(
            r#"
            UPDATE contracts
            SET client_confirmed = client_confirmed OR $2,
                doer_confirmed = doer_confirmed OR $3,
                client_confirmed_at = CASE
                    WHEN $2 THEN COALESCE(client_confirmed_at, NOW())
                    ELSE client_confirmed_at
                END,
                doer_confirmed_at = CASE
                    WHEN $3 THEN COALESCE(doer_confirmed_at, NOW())
                    ELSE doer_confirmed_at
                END,
                updated_at = NOW()
            WHERE id = $1 AND status = 'awaiting_confirmation'
            RETURNING *
            "#,
        )
        .bind(contract_id)
        .bind(client_confirms)
        .bind(doer_confirms)
        .fetch_optional(&self.pool)
        .await
    }

    async fn complete_contract(&self, contract_id: Uuid) -> Result<Option<Contract>, Error> {
        sqlx::query_as::<_, Contract>(
            r#"
            UPDATE contracts
            SET status = 'completed',
                client_confirmed = TRUE,
                doer_confirmed = TRUE,
                client_confirmed_at = COALESCE(client_confirmed_at, NOW()),
                doer_confirmed_at = COALESCE(doer_confirmed_at, NOW()),
                escrow_status = 'released',
                payout_status = 'pending_payout',
                updated_at = NOW()
            WHERE id = $1 AND status = 'awaiting_confirmation'
            RETURNING *
            "#,
        )
        .bind(contract_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn cancel_contract(
        &self,
        contract_id: Uuid,
        cancelled_by_id: Uuid,
        cancelled_by_role: ContractParty,
    ) -> Result<Option<Contract>, Error> {
        sqlx::query_as::<_, Contract>(
            r#"
            UPDATE contracts
            SET status = 'cancelled',
                cancelled_by_id = $2,
                cancelled_by_role = $3,
                updated_at = NOW()
            WHERE id = $1 AND status NOT IN ('completed', 'cancelled')
            RETURNING *
            "#,
        )
        .bind(contract_id)
        .bind(cancelled_by_id)
        .bind(cancelled_by_role)
        .fetch_optional(&self.pool)
        .await
    }

    async fn dispute_contract(&self, contract_id: Uuid) -> Result<Option<Contract>, Error> {
        sqlx::query_as::<_, Contract>(
            r#"
            UPDATE contracts
            SET status = 'disputed', updated_at = NOW()
            WHERE id = $1 AND status IN ('in_progress', 'awaiting_confirmation')
            RETURNING *
            "#,
        )
        .bind(contract_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn mark_reminder_sent(&self, contract_id: Uuid) -> Result<bool, Error> {
        let result = sqlx::query(
            r#"
            UPDATE contracts
            SET confirmation_reminder_sent = TRUE, updated_at = NOW()
            WHERE id = $1 AND confirmation_reminder_sent = FALSE
            "#,
        )
        .bind(contract_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn contracts_due_for_reminder(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Contract>, Error> {
        sqlx::query_as::<_, Contract>(
            r#"
            SELECT c.* FROM contracts c
            JOIN jobs j ON j.id = c.job_id
            WHERE j.end_date IS NOT NULL
            AND j.end_date < $1
            AND c.status IN ('accepted', 'in_progress', 'awaiting_confirmation')
            AND c.confirmation_reminder_sent = FALSE
            AND (c.client_confirmed = FALSE OR c.doer_confirmed = FALSE)
            ORDER BY j.end_date
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
    }

    async fn contracts_due_for_auto_confirm(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Contract>, Error> {
        sqlx::query_as::<_, Contract>(
            r#"
            SELECT * FROM contracts
            WHERE status = 'awaiting_confirmation'
            AND awaiting_confirmation_at IS NOT NULL
            AND awaiting_confirmation_at <= $1
            AND (client_confirmed = FALSE OR doer_confirmed = FALSE)
            ORDER BY awaiting_confirmation_at
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::contractmodel::{ContractStatus, PayoutStatus};
    use sqlx::PgPool;

    async fn seed_user(pool: &PgPool, email: &str) -> Uuid {
        sqlx::query_scalar("INSERT INTO users (name, email) VALUES ($1, $2) RETURNING id")
            .bind("Someone")
            .bind(email)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    async fn seed_job(pool: &PgPool, client_id: Uuid, price: i64, max_workers: i32) -> Uuid {
        sqlx::query_scalar(
            r#"
            INSERT INTO jobs (client_id, title, description, price, max_workers)
            VALUES ($1, 'Paint the fence', 'Two coats', $2, $3)
            RETURNING id
            "#,
        )
        .bind(client_id)
        .bind(price)
        .bind(max_workers)
        .fetch_one(pool)
        .await
        .unwrap()
    }

    #[sqlx::test]
    async fn completion_is_at_most_once(pool: PgPool) {
        let db = DBClient::new(pool.clone());
        let client = seed_user(&pool, "client@example.com").await;
        let doer = seed_user(&pool, "doer@example.com").await;
        let job = seed_job(&pool, client, 100_000, 1).await;
        let contract_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO contracts (
                job_id, client_id, doer_id, price, commission, commission_rate,
                total_price, status, awaiting_confirmation_at
            )
            VALUES ($1, $2, $3, 100000, 8000, 8.0, 108000, 'awaiting_confirmation', NOW())
            RETURNING id
            "#,
        )
        .bind(job)
        .bind(client)
        .bind(doer)
        .fetch_one(&pool)
        .await
        .unwrap();

        let completed = db.complete_contract(contract_id).await.unwrap().unwrap();
        assert_eq!(completed.status, ContractStatus::Completed);
        assert!(completed.both_confirmed());
        assert_eq!(completed.payout_status, PayoutStatus::PendingPayout);

        // A concurrent completion finds the row already moved.
        assert!(db.complete_contract(contract_id).await.unwrap().is_none());
    }

    #[sqlx::test]
    async fn contract_creation_is_atomic_and_single_shot(pool: PgPool) {
        let db = DBClient::new(pool.clone());
        let client = seed_user(&pool, "client@example.com").await;
        let a = seed_user(&pool, "a@example.com").await;
        let b = seed_user(&pool, "b@example.com").await;
        let job = seed_job(&pool, client, 100_000, 2).await;

        let rows = vec![
            NewContract {
                worker_id: a,
                amount: 50_000,
                percentage: 50.0,
                commission: 4_000,
                commission_rate: 8.0,
            },
            NewContract {
                worker_id: b,
                amount: 50_000,
                percentage: 50.0,
                commission: 4_000,
                commission_rate: 8.0,
            },
        ];

        let contracts = db
            .create_contracts_with_payments(job, client, "ARS", &rows, 0)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(contracts.len(), 2);
        assert!(contracts.iter().all(|c| c.total_price == 54_000));

        let payments: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM payments p JOIN contracts c ON c.id = p.contract_id WHERE c.job_id = $1",
        )
        .bind(job)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(payments, 2);

        // A re-run never re-splits the frozen budget.
        assert!(db
            .create_contracts_with_payments(job, client, "ARS", &rows, 0)
            .await
            .unwrap()
            .is_none());
        let contract_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM contracts WHERE job_id = $1")
                .bind(job)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(contract_count, 2);
    }
}

// service/contract_service.rs
//
// Lifecycle controller for contracts:
//
//   pending -> accepted -> in_progress -> awaiting_confirmation -> completed
//   any pre-completion -> cancelled
//   in_progress | awaiting_confirmation -> disputed
//
// All writes go through conditional updates in db/contractdb.rs, so a human
// confirmation racing a scheduler tick resolves to exactly one completion.
// The financial transition always commits first; notifications are
// dispatched after commit and are never allowed to roll it back.
use std::collections::HashSet;
use std::sync::Arc;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    db::{
        balancedb::BalanceExt,
        contractdb::{ContractExt, NewContract},
        db::DBClient,
        jobdb::JobExt,
        paymentdb::PaymentExt,
        userdb::UserExt,
    },
    models::{
        balancemodel::BalanceTransactionType,
        contractmodel::{Contract, ContractParty, ContractStatus},
        paymentmodel::PaymentStatus,
    },
    service::{
        allocation::split_allocation,
        commission::calculate_commission,
        error::ServiceError,
        escrow_service::EscrowService,
        notification_service::NotificationService,
        payment_gateway::PaymentGatewayService,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractEvent {
    AcceptTerms,
    Start,
    ClientConfirm,
    DoerConfirm,
    Cancel,
    Dispute,
}

/// Legal contract transitions. The database WHERE clauses enforce these at
/// write time; this mirror exists for guard checks and tests.
pub fn is_valid_transition(from: ContractStatus, to: ContractStatus) -> bool {
    use ContractStatus::*;
    match (from, to) {
        (Pending, Accepted) => true,
        (Accepted, InProgress) => true,
        (Accepted, AwaitingConfirmation) => true,
        (InProgress, AwaitingConfirmation) => true,
        (AwaitingConfirmation, Completed) => true,
        (InProgress, Disputed) | (AwaitingConfirmation, Disputed) => true,
        (from, Cancelled) => !from.is_terminal(),
        _ => false,
    }
}

/// Whether a contract has sat in awaiting_confirmation long enough to be
/// force-completed.
pub fn auto_confirm_due(
    awaiting_confirmation_at: DateTime<Utc>,
    now: DateTime<Utc>,
    grace: Duration,
) -> bool {
    now - awaiting_confirmation_at >= grace
}

#[derive(Clone)]
pub struct ContractService {
    db_client: Arc<DBClient>,
    escrow_service: Arc<EscrowService>,
    gateway: Arc<PaymentGatewayService>,
    notification_service: Arc<NotificationService>,
}

impl ContractService {
    pub fn new(
        db_client: Arc<DBClient>,
        escrow_service: Arc<EscrowService>,
        gateway: Arc<PaymentGatewayService>,
        notification_service: Arc<NotificationService>,
    ) -> Self {
        Self {
            db_client,
            escrow_service,
            gateway,
            notification_service,
        }
    }

    /// Finalize a job's worker selection: split the budget, persist the
    /// frozen allocations with one contract and pending escrow payment per
    /// worker in a single transaction, then attach a gateway order to each
    /// payment. The commission rate is snapshotted from the paying client
    /// here and never recomputed afterwards.
    ///
    /// Re-invoking after a gateway failure resumes: the frozen contracts
    /// are reused and orders are attached only where still missing.
    pub async fn create_contracts_for_job(
        &self,
        job_id: Uuid,
        worker_ids: &[Uuid],
        explicit_percentages: Option<&[f64]>,
    ) -> Result<Vec<Contract>, ServiceError> {
        let job = self
            .db_client
            .get_job_by_id(job_id)
            .await?
            .ok_or(ServiceError::JobNotFound(job_id))?;

        if worker_ids.len() as i32 > job.max_workers {
            return Err(ServiceError::Validation(format!(
                "Job allows at most {} workers",
                job.max_workers
            )));
        }

        let client = self
            .db_client
            .get_user_by_id(job.client_id)
            .await?
            .ok_or(ServiceError::UserNotFound(job.client_id))?;

        let split = split_allocation(job.price, worker_ids, explicit_percentages)?;
        let now = Utc::now();
        let mut rows = Vec::with_capacity(split.allocations.len());
        for share in &split.allocations {
            let quote = calculate_commission(
                client.membership_tier,
                client.has_referral_discount.unwrap_or(false),
                client.referral_discount_expires_at,
                now,
                share.amount,
            )?;
            rows.push(NewContract {
                worker_id: share.worker_id,
                amount: share.amount,
                percentage: share.percentage,
                commission: quote.commission,
                commission_rate: quote.rate,
            });
        }

        let contracts = match self
            .db_client
            .create_contracts_with_payments(job_id, job.client_id, "ARS", &rows, split.remaining_budget)
            .await?
        {
            Some(contracts) => {
                tracing::info!(
                    "Created {} contracts for job {} (client tier {})",
                    contracts.len(),
                    job_id,
                    client.membership_tier.to_str()
                );
                contracts
            }
            None => {
                // The budget was frozen by an earlier run; resume with the
                // stored snapshots instead of re-splitting.
                let existing = self.db_client.get_contracts_by_job_id(job_id).await?;
                if existing.is_empty() {
                    return Err(ServiceError::Validation(
                        "Job budget has already been allocated".to_string(),
                    ));
                }
                let requested: HashSet<Uuid> = worker_ids.iter().copied().collect();
                let frozen: HashSet<Uuid> = existing.iter().map(|c| c.doer_id).collect();
                if requested != frozen {
                    return Err(ServiceError::Validation(
                        "Worker set does not match the contracts already created for this job"
                            .to_string(),
                    ));
                }
                existing
            }
        };

        for contract in &contracts {
            let payment = self
                .db_client
                .get_payment_by_contract_id(contract.id)
                .await?
                .ok_or_else(|| {
                    ServiceError::Validation(format!(
                        "Contract {} has no payment record",
                        contract.id
                    ))
                })?;
            if payment.gateway_order_id.is_none() {
                let order = self
                    .gateway
                    .create_order(
                        payment.amount,
                        &payment.currency,
                        &format!("Contract payment: {}", job.title),
                    )
                    .await?;
                self.db_client
                    .set_gateway_order(payment.id, &order.order_id)
                    .await?;
            }
        }

        Ok(contracts)
    }

    /// Apply one lifecycle event and return the updated contract, or a
    /// rejection describing why the transition is not allowed.
    pub async fn advance_contract(
        &self,
        contract_id: Uuid,
        event: ContractEvent,
        actor_id: Uuid,
    ) -> Result<Contract, ServiceError> {
        let contract = self
            .db_client
            .get_contract_by_id(contract_id)
            .await?
            .ok_or(ServiceError::ContractNotFound(contract_id))?;

        let role = if actor_id == contract.client_id {
            ContractParty::Client
        } else if actor_id == contract.doer_id {
            ContractParty::Doer
        } else {
            ContractParty::Admin
        };

        // Confirmations do not move the status by themselves; every other
        // event targets a concrete status and is rejected up front when the
        // transition is illegal. The conditional updates below re-check
        // under the database's view of the row.
        let target = match event {
            ContractEvent::AcceptTerms => Some(ContractStatus::Accepted),
            ContractEvent::Start => Some(ContractStatus::InProgress),
            ContractEvent::Cancel => Some(ContractStatus::Cancelled),
            ContractEvent::Dispute => Some(ContractStatus::Disputed),
            ContractEvent::ClientConfirm | ContractEvent::DoerConfirm => None,
        };
        if let Some(target) = target {
            if !is_valid_transition(contract.status, target) {
                return Err(ServiceError::InvalidContractTransition(
                    contract_id,
                    contract.status,
                    format!("cannot move to {}", target.to_str()),
                ));
            }
        }

        match event {
            ContractEvent::AcceptTerms => {
                if role == ContractParty::Admin {
                    return Err(ServiceError::Validation(
                        "Only contract parties can accept terms".to_string(),
                    ));
                }
                self.db_client
                    .accept_terms(contract_id, role)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::InvalidContractTransition(
                            contract_id,
                            contract.status,
                            "terms can only be accepted while pending".to_string(),
                        )
                    })
            }
            ContractEvent::Start => self
                .db_client
                .start_contract(contract_id)
                .await?
                .ok_or_else(|| {
                    ServiceError::InvalidContractTransition(
                        contract_id,
                        contract.status,
                        "only accepted contracts can start".to_string(),
                    )
                }),
            ContractEvent::ClientConfirm | ContractEvent::DoerConfirm => {
                let expected = if event == ContractEvent::ClientConfirm {
                    ContractParty::Client
                } else {
                    ContractParty::Doer
                };
                if role != expected {
                    return Err(ServiceError::Validation(
                        "Confirmation must come from the named party".to_string(),
                    ));
                }

                let updated = self
                    .db_client
                    .set_confirmation(contract_id, role)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::InvalidContractTransition(
                            contract_id,
                            contract.status,
                            "contract is not awaiting confirmation".to_string(),
                        )
                    })?;

                if updated.both_confirmed() {
                    self.complete(contract_id, false).await
                } else {
                    Ok(updated)
                }
            }
            ContractEvent::Cancel => {
                let cancelled = self
                    .db_client
                    .cancel_contract(contract_id, actor_id, role)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::InvalidContractTransition(
                            contract_id,
                            contract.status,
                            "completed or cancelled contracts cannot be cancelled".to_string(),
                        )
                    })?;

                // Refund/escrow-release decision is left to dispute
                // resolution; the hook is the cancelled notification plus
                // the payment still sitting in held_escrow.
                tracing::info!(
                    "Contract {} cancelled by {:?} {}; escrow decision pending",
                    contract_id,
                    role,
                    actor_id
                );
                for party in [cancelled.client_id, cancelled.doer_id] {
                    if let Err(e) = self
                        .notification_service
                        .notify_contract_cancelled(party, &cancelled)
                        .await
                    {
                        tracing::error!("Failed to send cancellation notification: {}", e);
                    }
                }
                Ok(cancelled)
            }
            ContractEvent::Dispute => self
                .db_client
                .dispute_contract(contract_id)
                .await?
                .ok_or_else(|| {
                    ServiceError::InvalidContractTransition(
                        contract_id,
                        contract.status,
                        "disputes can only be raised while in progress or awaiting confirmation"
                            .to_string(),
                    )
                }),
        }
    }

    /// Complete a contract: conditional status flip, escrow release, and a
    /// pending payout ledger row, then best-effort notifications. When the
    /// row was already completed by a concurrent actor the existing row is
    /// returned and no side effects re-run.
    ///
    /// Completion requires the contract's funds to actually be in escrow.
    /// A contract whose payment was never captured cannot complete, by
    /// human confirmation or by the scheduler.
    pub async fn complete(
        &self,
        contract_id: Uuid,
        auto_confirmed: bool,
    ) -> Result<Contract, ServiceError> {
        let payment = match self.db_client.get_payment_by_contract_id(contract_id).await? {
            Some(p) if matches!(p.status, PaymentStatus::HeldEscrow | PaymentStatus::Completed) => p,
            Some(p) => {
                tracing::warn!(
                    "Refusing to complete contract {}: payment {} is {}",
                    contract_id,
                    p.id,
                    p.status.to_str()
                );
                return Err(ServiceError::EscrowNotHeld(contract_id));
            }
            None => {
                tracing::warn!("Refusing to complete contract {}: no payment row", contract_id);
                return Err(ServiceError::EscrowNotHeld(contract_id));
            }
        };

        let completed = match self.db_client.complete_contract(contract_id).await? {
            Some(contract) => contract,
            None => {
                let current = self
                    .db_client
                    .get_contract_by_id(contract_id)
                    .await?
                    .ok_or(ServiceError::ContractNotFound(contract_id))?;
                if current.status == ContractStatus::Completed {
                    tracing::debug!("Contract {} already completed, skipping", contract_id);
                    return Ok(current);
                }
                return Err(ServiceError::InvalidContractTransition(
                    contract_id,
                    current.status,
                    "contract is not awaiting confirmation".to_string(),
                ));
            }
        };

        // The doer's payout is the frozen allocation snapshot; the contract
        // price is the fallback for single-worker jobs created before
        // allocation existed.
        let payout = if completed.allocated_amount > 0 {
            completed.allocated_amount
        } else {
            completed.price
        };

        self.escrow_service.release(payment.id, None, false).await?;

        self.db_client
            .record_pending(
                completed.doer_id,
                BalanceTransactionType::ContractPayout,
                payout,
                Some("contract".to_string()),
                Some(contract_id),
                format!("Payout for contract {contract_id}"),
            )
            .await?;

        for party in [completed.client_id, completed.doer_id] {
            if let Err(e) = self
                .notification_service
                .notify_contract_completed(party, &completed, auto_confirmed)
                .await
            {
                tracing::error!("Failed to send completion notification: {}", e);
            }
        }
        if let Err(e) = self
            .notification_service
            .notify_payout_pending(completed.doer_id, &completed, payout)
            .await
        {
            tracing::error!("Failed to send payout notification: {}", e);
        }

        Ok(completed)
    }

    /// Reminder tick body: move ended contracts into awaiting_confirmation,
    /// nudge whoever has not confirmed, and set the one-shot reminder flag.
    pub async fn process_confirmation_reminders(
        &self,
        now: DateTime<Utc>,
    ) -> Result<usize, ServiceError> {
        let due = self.db_client.contracts_due_for_reminder(now).await?;
        let mut processed = 0;

        for contract in due {
            let result = self.remind_one(&contract).await;
            match result {
                Ok(()) => processed += 1,
                Err(e) => {
                    tracing::error!(
                        "Reminder processing failed for contract {}: {}",
                        contract.id,
                        e
                    );
                }
            }
        }

        Ok(processed)
    }

    async fn remind_one(&self, contract: &Contract) -> Result<(), ServiceError> {
        let current = if matches!(
            contract.status,
            ContractStatus::Accepted | ContractStatus::InProgress
        ) {
            // A None here means a human action moved the row first; the
            // reminder still applies to whatever state it is in now.
            self.db_client
                .mark_awaiting_confirmation(contract.id)
                .await?
                .unwrap_or_else(|| contract.clone())
        } else {
            contract.clone()
        };

        if !current.client_confirmed {
            if let Err(e) = self
                .notification_service
                .notify_confirmation_reminder(current.client_id, &current)
                .await
            {
                tracing::error!("Failed to send client reminder: {}", e);
            }
        }
        if !current.doer_confirmed {
            if let Err(e) = self
                .notification_service
                .notify_confirmation_reminder(current.doer_id, &current)
                .await
            {
                tracing::error!("Failed to send doer reminder: {}", e);
            }
        }

        self.db_client.mark_reminder_sent(current.id).await?;
        Ok(())
    }

    /// Auto-confirm tick body: force-complete contracts stuck past the
    /// grace window. One contract's failure never aborts the batch, and the
    /// conditional completion skips rows a human action already moved.
    pub async fn process_auto_confirmations(
        &self,
        now: DateTime<Utc>,
        grace: Duration,
    ) -> Result<usize, ServiceError> {
        let cutoff = now - grace;
        let due = self.db_client.contracts_due_for_auto_confirm(cutoff).await?;
        let mut processed = 0;

        for contract in due {
            let due_since = match contract.awaiting_confirmation_at {
                Some(at) if auto_confirm_due(at, now, grace) => at,
                _ => continue,
            };
            tracing::debug!(
                "Contract {} awaiting confirmation since {}, auto-confirming",
                contract.id,
                due_since
            );
            match self.complete(contract.id, true).await {
                Ok(_) => {
                    tracing::info!("Auto-confirmed contract {}", contract.id);
                    processed += 1;
                }
                Err(e) => {
                    tracing::error!("Auto-confirm failed for contract {}: {}", contract.id, e);
                }
            }
        }

        Ok(processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ContractStatus::*;

    #[test]
    fn happy_path_is_valid() {
        assert!(is_valid_transition(Pending, Accepted));
        assert!(is_valid_transition(Accepted, InProgress));
        assert!(is_valid_transition(InProgress, AwaitingConfirmation));
        assert!(is_valid_transition(AwaitingConfirmation, Completed));
    }

    #[test]
    fn completion_requires_awaiting_confirmation() {
        assert!(!is_valid_transition(InProgress, Completed));
        assert!(!is_valid_transition(Pending, Completed));
        assert!(!is_valid_transition(Accepted, Completed));
    }

    #[test]
    fn terminal_states_are_final() {
        for to in [Pending, Accepted, InProgress, AwaitingConfirmation, Completed, Disputed, Cancelled] {
            assert!(!is_valid_transition(Completed, to));
            assert!(!is_valid_transition(Cancelled, to));
        }
    }

    #[test]
    fn cancel_allowed_from_any_pre_completion_state() {
        assert!(is_valid_transition(Pending, Cancelled));
        assert!(is_valid_transition(Accepted, Cancelled));
        assert!(is_valid_transition(InProgress, Cancelled));
        assert!(is_valid_transition(AwaitingConfirmation, Cancelled));
        assert!(!is_valid_transition(Completed, Cancelled));
        assert!(!is_valid_transition(Cancelled, Cancelled));
    }

    #[test]
    fn dispute_only_from_active_states() {
        assert!(is_valid_transition(InProgress, Disputed));
        assert!(is_valid_transition(AwaitingConfirmation, Disputed));
        assert!(!is_valid_transition(Pending, Disputed));
        assert!(!is_valid_transition(Accepted, Disputed));
    }

    #[test]
    fn auto_confirm_fires_at_exactly_the_grace_window() {
        let grace = Duration::hours(2);
        let t0 = Utc::now();
        assert!(!auto_confirm_due(t0, t0 + Duration::minutes(119), grace));
        assert!(auto_confirm_due(t0, t0 + Duration::hours(2), grace));
        assert!(auto_confirm_due(t0, t0 + Duration::minutes(125), grace));
    }

    use crate::config::Config;
    use sqlx::PgPool;

    fn service(pool: &PgPool) -> ContractService {
        let db_client = Arc::new(DBClient::new(pool.clone()));
        let config = Config {
            database_url: String::new(),
            port: 0,
            mercadopago_access_token: "test".to_string(),
            paypal_client_id: "test".to_string(),
            paypal_secret: "test".to_string(),
            active_payment_provider: "mercadopago".to_string(),
            gateway_webhook_secret: "test".to_string(),
            auto_confirm_grace_hours: 2,
        };
        let gateway = Arc::new(PaymentGatewayService::new(&config));
        let notification_service = Arc::new(NotificationService::new(db_client.clone()));
        let escrow_service = Arc::new(EscrowService::new(db_client.clone(), gateway.clone()));
        ContractService::new(db_client, escrow_service, gateway, notification_service)
    }

    async fn seed_user(pool: &PgPool, email: &str) -> Uuid {
        sqlx::query_scalar("INSERT INTO users (name, email) VALUES ($1, $2) RETURNING id")
            .bind("Someone")
            .bind(email)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    /// Contract in awaiting_confirmation with a payment in the given status.
    async fn seed_awaiting_contract(pool: &PgPool, payment_status: &str) -> (Uuid, Uuid) {
        let client = seed_user(pool, "client@example.com").await;
        let doer = seed_user(pool, "doer@example.com").await;
        let job: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO jobs (client_id, title, description, price)
            VALUES ($1, 'Paint the fence', 'Two coats', 100000)
            RETURNING id
            "#,
        )
        .bind(client)
        .fetch_one(pool)
        .await
        .unwrap();
        let contract_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO contracts (
                job_id, client_id, doer_id, price, commission, commission_rate,
                total_price, allocated_amount, status, awaiting_confirmation_at
            )
            VALUES ($1, $2, $3, 100000, 8000, 8.0, 108000, 100000, 'awaiting_confirmation', NOW())
            RETURNING id
            "#,
        )
        .bind(job)
        .bind(client)
        .bind(doer)
        .fetch_one(pool)
        .await
        .unwrap();
        sqlx::query(
            r#"
            INSERT INTO payments (contract_id, payer_id, recipient_id, amount, status, gateway_capture_id)
            VALUES ($1, $2, $3, 108000, $4::payment_status, $5)
            "#,
        )
        .bind(contract_id)
        .bind(client)
        .bind(doer)
        .bind(payment_status)
        .bind(format!("cap_{contract_id}"))
        .execute(pool)
        .await
        .unwrap();
        (contract_id, doer)
    }

    async fn payout_count(pool: &PgPool, doer: Uuid) -> i64 {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM balance_transactions WHERE user_id = $1 AND transaction_type = 'contract_payout'",
        )
        .bind(doer)
        .fetch_one(pool)
        .await
        .unwrap()
    }

    #[sqlx::test]
    async fn unfunded_contract_cannot_complete(pool: PgPool) {
        let svc = service(&pool);
        let (contract_id, doer) = seed_awaiting_contract(&pool, "pending").await;

        let err = svc.complete(contract_id, true).await.unwrap_err();
        assert!(matches!(err, ServiceError::EscrowNotHeld(id) if id == contract_id));

        let status: ContractStatus =
            sqlx::query_scalar("SELECT status FROM contracts WHERE id = $1")
                .bind(contract_id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(status, AwaitingConfirmation);
        assert_eq!(payout_count(&pool, doer).await, 0);
    }

    #[sqlx::test]
    async fn repeated_completion_does_not_pay_twice(pool: PgPool) {
        let svc = service(&pool);
        let (contract_id, doer) = seed_awaiting_contract(&pool, "held_escrow").await;

        let first = svc.complete(contract_id, false).await.unwrap();
        assert_eq!(first.status, Completed);
        assert_eq!(payout_count(&pool, doer).await, 1);

        let payment_status: PaymentStatus =
            sqlx::query_scalar("SELECT status FROM payments WHERE contract_id = $1")
                .bind(contract_id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(payment_status, PaymentStatus::Completed);

        // The tick landing after a manual confirmation finds the row
        // already completed and re-runs no side effects.
        let second = svc.complete(contract_id, true).await.unwrap();
        assert_eq!(second.status, Completed);
        assert_eq!(payout_count(&pool, doer).await, 1);
    }
}

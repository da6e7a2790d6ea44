// service/escrow_service.rs
//
// Authoritative state machine for one payment row:
//
//   pending -> processing -> held_escrow -> completed
//   held_escrow -> refunding -> refunded | partial_refund
//   refunding -> held_escrow (gateway refund failed)
//   pending/processing -> failed
//
// Release is at-most-once: the check-and-transition is a single conditional
// UPDATE on the row's current status, so concurrent admin actions and
// scheduler runs cannot both release. A refund claims the row (refunding)
// before the gateway is called, so a release landing mid-refund loses.
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    db::{db::DBClient, paymentdb::PaymentExt},
    models::paymentmodel::{Payment, PaymentStatus},
    service::{error::ServiceError, payment_gateway::PaymentGatewayService},
};

/// Legal payment transitions. Anything not listed is rejected.
pub fn is_valid_transition(from: PaymentStatus, to: PaymentStatus) -> bool {
    use PaymentStatus::*;
    matches!(
        (from, to),
        (Pending, Processing)
            | (Pending, HeldEscrow)
            | (Pending, Failed)
            | (Processing, HeldEscrow)
            | (Processing, Failed)
            | (HeldEscrow, Completed)
            | (HeldEscrow, Refunding)
            | (Refunding, Refunded)
            | (Refunding, PartialRefund)
            | (Refunding, HeldEscrow)
    )
}

#[derive(Clone)]
pub struct EscrowService {
    db_client: Arc<DBClient>,
    gateway: Arc<PaymentGatewayService>,
}

impl EscrowService {
    pub fn new(db_client: Arc<DBClient>, gateway: Arc<PaymentGatewayService>) -> Self {
        Self { db_client, gateway }
    }

    /// Capture the gateway order behind a payment and move it into escrow.
    /// The gateway call fully succeeds or fully fails before any local
    /// status mutation: a declined capture marks the row failed, a transport
    /// error leaves the row untouched so a retry is safe.
    pub async fn capture_payment(&self, payment_id: Uuid) -> Result<Payment, ServiceError> {
        let payment = self
            .db_client
            .get_payment_by_id(payment_id)
            .await?
            .ok_or(ServiceError::PaymentNotFound(payment_id))?;

        if !is_valid_transition(payment.status, PaymentStatus::HeldEscrow) {
            return Err(ServiceError::InvalidPaymentTransition(
                payment.status,
                PaymentStatus::HeldEscrow,
            ));
        }

        let order_id = payment
            .gateway_order_id
            .clone()
            .ok_or_else(|| ServiceError::Validation("Payment has no gateway order".to_string()))?;

        if payment.status == PaymentStatus::Pending {
            self.db_client.mark_processing(payment_id).await?;
        }

        let capture = match self.gateway.capture_order(&order_id).await {
            Ok(capture) => capture,
            Err(ServiceError::GatewayDeclined(reason)) => {
                self.db_client.mark_failed(payment_id).await?;
                return Err(ServiceError::GatewayDeclined(reason));
            }
            Err(other) => return Err(other),
        };

        self.hold_on_capture(payment_id, &capture.capture_id).await
    }

    /// Record a successful capture, moving the row into held_escrow.
    /// Idempotent on the gateway capture id: a replayed webhook finds the
    /// already-recorded capture and returns the current row unchanged.
    pub async fn hold_on_capture(
        &self,
        payment_id: Uuid,
        capture_id: &str,
    ) -> Result<Payment, ServiceError> {
        if let Some(existing) = self.db_client.get_payment_by_capture_id(capture_id).await? {
            tracing::info!(
                "Capture {} already recorded on payment {}, skipping replay",
                capture_id,
                existing.id
            );
            return Ok(existing);
        }

        match self.db_client.hold_in_escrow(payment_id, capture_id).await? {
            Some(payment) => Ok(payment),
            None => {
                let payment = self
                    .db_client
                    .get_payment_by_id(payment_id)
                    .await?
                    .ok_or(ServiceError::PaymentNotFound(payment_id))?;
                Err(ServiceError::InvalidPaymentTransition(
                    payment.status,
                    PaymentStatus::HeldEscrow,
                ))
            }
        }
    }

    /// Release held funds to the recipient. With `strict` (direct admin
    /// action) an already-released payment is an explicit error; without it
    /// (controller/scheduler race) a row another actor already released is
    /// returned unchanged. Either way a payment that never reached escrow
    /// cannot be released.
    pub async fn release(
        &self,
        payment_id: Uuid,
        released_by: Option<Uuid>,
        strict: bool,
    ) -> Result<Payment, ServiceError> {
        if let Some(payment) = self.db_client.release_escrow(payment_id, released_by).await? {
            tracing::info!("Escrow released for payment {}", payment_id);
            return Ok(payment);
        }

        let payment = self
            .db_client
            .get_payment_by_id(payment_id)
            .await?
            .ok_or(ServiceError::PaymentNotFound(payment_id))?;

        match payment.status {
            PaymentStatus::Completed if strict => Err(ServiceError::AlreadyReleased(payment_id)),
            PaymentStatus::Completed => {
                tracing::debug!("Payment {} already released, skipping", payment_id);
                Ok(payment)
            }
            status => Err(ServiceError::InvalidPaymentTransition(
                status,
                PaymentStatus::Completed,
            )),
        }
    }

    /// Refund a held payment, fully or partially. The row is claimed
    /// (held_escrow -> refunding) before the gateway refund runs, so a
    /// concurrent release cannot disburse the same funds; on gateway
    /// failure the claim is reverted and a retry is safe.
    pub async fn refund(
        &self,
        payment_id: Uuid,
        amount: Option<i64>,
        reason: &str,
        refunded_by: Uuid,
    ) -> Result<Payment, ServiceError> {
        if reason.trim().is_empty() {
            return Err(ServiceError::Validation(
                "A refund reason is required".to_string(),
            ));
        }

        let payment = self
            .db_client
            .get_payment_by_id(payment_id)
            .await?
            .ok_or(ServiceError::PaymentNotFound(payment_id))?;

        if !is_valid_transition(payment.status, PaymentStatus::Refunding) {
            return Err(ServiceError::InvalidPaymentTransition(
                payment.status,
                PaymentStatus::Refunded,
            ));
        }

        let refund_amount = amount.unwrap_or(payment.amount);
        if refund_amount <= 0 || refund_amount > payment.amount {
            return Err(ServiceError::Validation(format!(
                "Refund amount must be between 1 and {}",
                payment.amount
            )));
        }
        let target_status = if refund_amount < payment.amount {
            PaymentStatus::PartialRefund
        } else {
            PaymentStatus::Refunded
        };

        let capture_id = payment
            .gateway_capture_id
            .clone()
            .ok_or_else(|| ServiceError::Validation("Payment has no capture to refund".to_string()))?;

        if self.db_client.begin_refund(payment_id).await?.is_none() {
            let current = self
                .db_client
                .get_payment_by_id(payment_id)
                .await?
                .ok_or(ServiceError::PaymentNotFound(payment_id))?;
            return Err(ServiceError::InvalidPaymentTransition(
                current.status,
                target_status,
            ));
        }

        let gateway_amount = (refund_amount < payment.amount).then_some(refund_amount);
        if let Err(e) = self.gateway.refund(&capture_id, gateway_amount).await {
            // Drop the claim; the row goes back to held_escrow for a retry.
            match self.db_client.cancel_refund(payment_id).await {
                Ok(Some(_)) => {}
                Ok(None) => tracing::error!(
                    "Payment {} left in refunding after gateway failure",
                    payment_id
                ),
                Err(revert) => tracing::error!(
                    "Failed to revert refund claim on payment {}: {}",
                    payment_id,
                    revert
                ),
            }
            return Err(e);
        }

        match self
            .db_client
            .apply_refund(payment_id, target_status, refund_amount, reason, refunded_by)
            .await?
        {
            Some(payment) => {
                tracing::info!(
                    "Refund of {} applied to payment {} ({:?})",
                    refund_amount,
                    payment_id,
                    target_status
                );
                Ok(payment)
            }
            None => {
                let current = self
                    .db_client
                    .get_payment_by_id(payment_id)
                    .await?
                    .ok_or(ServiceError::PaymentNotFound(payment_id))?;
                Err(ServiceError::InvalidPaymentTransition(
                    current.status,
                    target_status,
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PaymentStatus::*;

    #[test]
    fn happy_path_transitions_are_valid() {
        assert!(is_valid_transition(Pending, Processing));
        assert!(is_valid_transition(Processing, HeldEscrow));
        assert!(is_valid_transition(HeldEscrow, Completed));
    }

    #[test]
    fn refunds_go_through_the_claim_state() {
        assert!(is_valid_transition(HeldEscrow, Refunding));
        assert!(is_valid_transition(Refunding, Refunded));
        assert!(is_valid_transition(Refunding, PartialRefund));
        // Gateway failure releases the claim.
        assert!(is_valid_transition(Refunding, HeldEscrow));
        assert!(!is_valid_transition(HeldEscrow, Refunded));
        assert!(!is_valid_transition(Completed, Refunding));
        assert!(!is_valid_transition(Pending, Refunding));
    }

    #[test]
    fn no_release_without_escrow_hold() {
        assert!(!is_valid_transition(Pending, Completed));
        assert!(!is_valid_transition(Processing, Completed));
        assert!(!is_valid_transition(Refunding, Completed));
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for to in [
            Pending, Processing, HeldEscrow, Completed, Refunding, Refunded, PartialRefund, Failed,
        ] {
            assert!(!is_valid_transition(Completed, to));
            assert!(!is_valid_transition(Refunded, to));
            assert!(!is_valid_transition(PartialRefund, to));
            assert!(!is_valid_transition(Failed, to));
        }
    }
}

use thiserror::Error;
use uuid::Uuid;
use crate::{
    error::HttpError,
    models::contractmodel::ContractStatus,
    models::paymentmodel::PaymentStatus,
};
use axum::http::StatusCode;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Contract {0} not found")]
    ContractNotFound(Uuid),

    #[error("Payment {0} not found")]
    PaymentNotFound(Uuid),

    #[error("Job {0} not found")]
    JobNotFound(Uuid),

    #[error("User {0} not found")]
    UserNotFound(Uuid),

    #[error("Balance transaction {0} not found")]
    TransactionNotFound(Uuid),

    #[error("Contract {0} is in status {}: {2}", .1.to_str())]
    InvalidContractTransition(Uuid, ContractStatus, String),

    #[error("Invalid payment transition from {} to {}", .0.to_str(), .1.to_str())]
    InvalidPaymentTransition(PaymentStatus, PaymentStatus),

    #[error("Escrow for payment {0} already released")]
    AlreadyReleased(Uuid),

    #[error("Funds for contract {0} are not held in escrow")]
    EscrowNotHeld(Uuid),

    #[error("Balance transaction {0} already processed")]
    AlreadyProcessed(Uuid),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Payment gateway declined: {0}")]
    GatewayDeclined(String),

    #[error("Payment gateway error: {0}")]
    Gateway(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Notification error: {0}")]
    Notification(String),
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::ContractNotFound(_)
            | ServiceError::PaymentNotFound(_)
            | ServiceError::JobNotFound(_)
            | ServiceError::UserNotFound(_)
            | ServiceError::TransactionNotFound(_) => StatusCode::NOT_FOUND,

            ServiceError::InvalidContractTransition(_, _, _)
            | ServiceError::InvalidPaymentTransition(_, _)
            | ServiceError::Validation(_) => StatusCode::BAD_REQUEST,

            ServiceError::AlreadyReleased(_)
            | ServiceError::AlreadyProcessed(_)
            | ServiceError::EscrowNotHeld(_) => StatusCode::CONFLICT,

            ServiceError::GatewayDeclined(_) => StatusCode::PAYMENT_REQUIRED,

            ServiceError::Gateway(_)
            | ServiceError::Database(_)
            | ServiceError::Notification(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ServiceError> for HttpError {
    fn from(error: ServiceError) -> Self {
        match error {
            ServiceError::ContractNotFound(_)
            | ServiceError::PaymentNotFound(_)
            | ServiceError::JobNotFound(_)
            | ServiceError::UserNotFound(_)
            | ServiceError::TransactionNotFound(_) => HttpError::not_found(error.to_string()),

            ServiceError::InvalidContractTransition(_, _, _)
            | ServiceError::InvalidPaymentTransition(_, _)
            | ServiceError::Validation(_) => HttpError::bad_request(error.to_string()),

            ServiceError::AlreadyReleased(_)
            | ServiceError::AlreadyProcessed(_)
            | ServiceError::EscrowNotHeld(_) => HttpError::conflict(error.to_string()),

            ServiceError::GatewayDeclined(_) => HttpError::payment_required(error.to_string()),

            ServiceError::Gateway(_) => {
                HttpError::server_error("Payment could not be processed, try again")
            }

            _ => HttpError::server_error(error.to_string()),
        }
    }
}

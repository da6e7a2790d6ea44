pub mod allocation;
pub mod background_jobs;
pub mod balance_service;
pub mod commission;
pub mod contract_service;
pub mod error;
pub mod escrow_service;
pub mod notification_service;
pub mod payment_gateway;

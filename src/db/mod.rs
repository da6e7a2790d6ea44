pub mod balancedb;
pub mod contractdb;
pub mod db;
pub mod jobdb;
pub mod paymentdb;
pub mod userdb;

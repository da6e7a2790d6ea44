pub mod balancemodel;
pub mod contractmodel;
pub mod jobmodel;
pub mod paymentmodel;
pub mod usermodel;

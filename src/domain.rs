pub mod correlation;
pub mod notification;
pub mod payment;
pub mod ports;
pub mod token;

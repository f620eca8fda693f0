pub mod correlation_tracker;
pub mod expiry_sweeper;
pub mod idempotency;
pub mod outcome_listener;

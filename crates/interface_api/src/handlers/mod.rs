//! Route handlers

pub mod claims;
pub mod patient_history;
pub mod health;

//! Perishable-goods custody and escrow ledger.

pub mod batch;
pub mod error;
pub mod escrow;
pub mod policy;
pub mod roles;
pub mod sensor;
pub mod service;
pub mod utils;

//! Core fiscal domain for Facturo.
//!
//! This crate contains pure business logic with ZERO network or database dependencies.
//! Remote protocols live in `facturo-afip`, persistence in `facturo-db`.
//!
//! # Modules
//!
//! - `voucher` - Voucher aggregate, type codes, categories and amount rules
//! - `balance` - Balance ledger for invoices referenced by notes
//! - `sequence` - Next-number resolution across remote, ledger and counter
//! - `credential` - Per-company credential and key encryption at rest
//! - `certificate` - Signing requests, install checks and expiry tracking
//! - `store` - Persistence traits and an in-memory implementation

pub mod balance;
pub mod certificate;
pub mod credential;
pub mod sequence;
pub mod store;
pub mod voucher;

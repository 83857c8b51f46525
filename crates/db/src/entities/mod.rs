//! `SeaORM` entities.

pub mod certificate_requests;
pub mod credentials;
pub mod settlements;
pub mod voucher_balance_locks;
pub mod voucher_counters;
pub mod vouchers;

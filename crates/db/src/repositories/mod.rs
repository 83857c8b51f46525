//! Repository implementations of the fiscal store traits.

mod credential;
mod voucher;

pub use credential::CredentialRepository;
pub use voucher::VoucherRepository;

use facturo_core::store::StoreError;
use sea_orm::{DbErr, SqlErr};

/// Maps a database error onto the store's error kinds.
pub(crate) fn store_error(err: DbErr) -> StoreError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(detail)) => StoreError::Conflict(detail),
        Some(SqlErr::ForeignKeyConstraintViolation(detail)) => StoreError::NotFound(detail),
        _ => match err {
            DbErr::RecordNotFound(detail) => StoreError::NotFound(detail),
            other => StoreError::Database(other.to_string()),
        },
    }
}

/// A stored value the domain cannot read back.
pub(crate) fn corrupt(what: &str, detail: impl std::fmt::Display) -> StoreError {
    StoreError::Database(format!("invalid stored {what}: {detail}"))
}

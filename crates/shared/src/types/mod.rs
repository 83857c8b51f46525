//! Common types used across the application.

pub mod cuit;
pub mod id;
pub mod money;

pub use cuit::{Cuit, CuitError};
pub use id::*;
pub use money::{Currency, Money};

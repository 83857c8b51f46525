//! Shared types, errors, and configuration for Facturo.
//!
//! This crate provides common types used across all other crates:
//! - Money helpers with fixed two-digit precision
//! - Typed IDs for type-safe entity references
//! - The CUIT tax identifier
//! - Application-wide error types
//! - Configuration management

pub mod config;
pub mod error;
pub mod types;

pub use config::{AfipConfig, AfipEnvironment, AppConfig, SessionRetryConfig};
pub use error::{AppError, AppResult};

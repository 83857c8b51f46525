//! Database migration runner for Facturo.
//!
//! Reads `DATABASE_URL`.
//!
//! Usage:
//!   migrator up      - Create the credential, voucher and counter tables
//!   migrator down    - Drop them again
//!   migrator status  - Show migration status
//!   migrator fresh   - Drop all tables and re-run migrations

use facturo_db::migration::Migrator;
use sea_orm_migration::prelude::*;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // The migrator CLI sets up its own tracing
    cli::run_cli(Migrator).await;
}

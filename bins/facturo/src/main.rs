//! Facturo operator command line.
//!
//! Runs the fiscal operations against the configured database and
//! authority environment.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use facturo_afip::FiscalService;
use facturo_core::balance::BalanceView;
use facturo_core::certificate::CompanyIdentity;
use facturo_core::voucher::VoucherType;
use facturo_db::{CredentialRepository, VoucherRepository, connect_with};
use facturo_shared::AppConfig;
use facturo_shared::types::{CompanyId, Cuit, VoucherId};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "facturo")]
#[command(about = "Electronic voucher authorization with AFIP", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// Company data embedded in certificate requests.
#[derive(clap::Args)]
struct Identity {
    /// Tax identifier, with or without dashes
    #[arg(long)]
    cuit: Cuit,

    /// Legal name
    #[arg(long)]
    legal_name: String,

    /// Certificate alias
    #[arg(long)]
    alias: String,
}

impl From<Identity> for CompanyIdentity {
    fn from(identity: Identity) -> Self {
        Self {
            cuit: identity.cuit,
            legal_name: identity.legal_name,
            alias: identity.alias,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Check the voucher service's servers
    Health,

    /// Generate a key pair and print the signing request to upload
    RequestCertificate {
        /// Company ID (UUID)
        #[arg(short, long)]
        company: CompanyId,

        #[command(flatten)]
        identity: Identity,
    },

    /// Install the certificate issued for the last signing request
    InstallCertificate {
        /// Company ID (UUID)
        #[arg(short, long)]
        company: CompanyId,

        #[command(flatten)]
        identity: Identity,

        /// Certificate PEM file
        #[arg(short = 'f', long)]
        certificate: PathBuf,
    },

    /// Show the certificate's expiry status
    CertificateStatus {
        /// Company ID (UUID)
        #[arg(short, long)]
        company: CompanyId,
    },

    /// Acquire (or reuse) an authority session
    Session {
        /// Company ID (UUID)
        #[arg(short, long)]
        company: CompanyId,
    },

    /// Ask the authority for the last authorized number
    LastNumber {
        /// Company ID (UUID)
        #[arg(short, long)]
        company: CompanyId,

        /// Sales point
        #[arg(short, long)]
        sales_point: u16,

        /// Voucher type code (1 = invoice A, 6 = invoice B, 11 = invoice C, ...)
        #[arg(short = 't', long)]
        voucher_type: u16,
    },

    /// Reserve the next voucher number
    NextNumber {
        /// Company ID (UUID)
        #[arg(short, long)]
        company: CompanyId,

        /// Sales point
        #[arg(short, long)]
        sales_point: u32,

        /// Voucher type code
        #[arg(short = 't', long)]
        voucher_type: u16,
    },

    /// Authorize a draft voucher
    Authorize {
        /// Voucher ID (UUID)
        voucher: VoucherId,

        /// Limit credit notes by the balance net of confirmed settlements
        #[arg(long)]
        settlement_aware: bool,
    },

    /// Recompute an invoice's balance from its notes
    RecomputeBalance {
        /// Voucher ID (UUID)
        voucher: VoucherId,
    },
}

fn voucher_type(code: u16) -> anyhow::Result<VoucherType> {
    VoucherType::from_code(code).with_context(|| format!("unknown voucher type code {code}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "facturo=debug,facturo_afip=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load().context("Failed to load configuration")?;
    let db = connect_with(&config.database).await?;
    info!(environment = %config.afip.environment, "Connected to database");

    let service = FiscalService::from_config(
        &config,
        Arc::new(CredentialRepository::new(db.clone())),
        Arc::new(VoucherRepository::new(db)),
    )?;

    match cli.command {
        Command::Health => {
            let status = service.health_check(config.afip.environment).await?;
            println!(
                "app={} db={} auth={} healthy={}",
                status.app_server,
                status.db_server,
                status.auth_server,
                status.is_healthy()
            );
        }
        Command::RequestCertificate { company, identity } => {
            let request = service.generate_request(company, &identity.into()).await?;
            print!("{}", request.csr_pem);
        }
        Command::InstallCertificate {
            company,
            identity,
            certificate,
        } => {
            let pem = std::fs::read_to_string(&certificate)
                .with_context(|| format!("cannot read {}", certificate.display()))?;
            let credential = service
                .install(
                    company,
                    &identity.into(),
                    &pem,
                    None,
                    config.afip.environment,
                )
                .await?;
            println!(
                "installed credential {} for {} valid until {}",
                credential.id, credential.cuit, credential.certificate_not_after
            );
        }
        Command::CertificateStatus { company } => {
            println!("{:?}", service.certificate_status(company).await?);
        }
        Command::Session { company } => {
            let ticket = service.acquire_session(company).await?;
            println!("session valid until {}", ticket.expires_at);
        }
        Command::LastNumber {
            company,
            sales_point,
            voucher_type: code,
        } => {
            let last = service
                .last_authorized_number(company, sales_point, voucher_type(code)?)
                .await?;
            println!("{last}");
        }
        Command::NextNumber {
            company,
            sales_point,
            voucher_type: code,
        } => {
            let reservation = service
                .next_voucher_number(company, sales_point, voucher_type(code)?)
                .await?;
            println!(
                "{} (from {:?})",
                reservation.number,
                reservation.sources.dominant()
            );
        }
        Command::Authorize {
            voucher,
            settlement_aware,
        } => {
            let view = if settlement_aware {
                BalanceView::SettlementAware
            } else {
                BalanceView::Fiscal
            };
            let outcome = service.authorize_voucher(voucher, view).await?;
            println!(
                "number={} cae={} recovered={}",
                outcome.voucher.number.unwrap_or_default(),
                outcome.voucher.authorization_code().unwrap_or_default(),
                outcome.recovered
            );
            for observation in &outcome.observations {
                println!("observation {observation}");
            }
        }
        Command::RecomputeBalance { voucher } => {
            let snapshot = service.recompute_balance(voucher).await?;
            println!("{} {}", snapshot.balance_pending, snapshot.status);
        }
    }

    Ok(())
}

//! Fiscal schema: credentials, vouchers, numbering counters and settlements.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(FISCAL_SQL).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(
            "DROP TABLE IF EXISTS settlements, voucher_balance_locks, voucher_counters, \
             vouchers, certificate_requests, credentials CASCADE;",
        )
        .await?;
        Ok(())
    }
}

const FISCAL_SQL: &str = r"
-- One credential per company. Private keys and passphrases are sealed.
CREATE TABLE credentials (
    id UUID PRIMARY KEY,
    company_id UUID NOT NULL UNIQUE,
    cuit VARCHAR(11) NOT NULL,
    environment VARCHAR(16) NOT NULL,
    certificate_pem TEXT NOT NULL,
    sealed_private_key TEXT NOT NULL,
    sealed_key_password TEXT,
    certificate_not_before TIMESTAMPTZ NOT NULL,
    certificate_not_after TIMESTAMPTZ NOT NULL,
    session_token TEXT,
    session_sign TEXT,
    session_expires_at TIMESTAMPTZ,
    blocked_until TIMESTAMPTZ,
    block_attempts INTEGER NOT NULL DEFAULT 0,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_environment CHECK (environment IN ('sandbox', 'production')),
    CONSTRAINT chk_cuit_digits CHECK (cuit ~ '^[0-9]{11}$'),
    CONSTRAINT chk_certificate_window CHECK (certificate_not_after > certificate_not_before),
    -- A session is stored whole or not at all
    CONSTRAINT chk_session_complete CHECK (
        (session_token IS NULL AND session_sign IS NULL AND session_expires_at IS NULL)
        OR (session_token IS NOT NULL AND session_sign IS NOT NULL AND session_expires_at IS NOT NULL)
    )
);

-- Sealed key of a signing request awaiting its certificate
CREATE TABLE certificate_requests (
    company_id UUID PRIMARY KEY,
    sealed_private_key TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE vouchers (
    id UUID PRIMARY KEY,
    company_id UUID NOT NULL,
    voucher_type SMALLINT NOT NULL,
    sales_point SMALLINT NOT NULL,
    number BIGINT,
    pending_number BIGINT,
    issue_date DATE NOT NULL,
    status VARCHAR(16) NOT NULL,
    total NUMERIC(19, 2) NOT NULL,
    linked_voucher_id UUID REFERENCES vouchers(id),
    authorization_code VARCHAR(14),
    authorization_expires_on DATE,
    authorized_at TIMESTAMPTZ,
    balance_pending NUMERIC(19, 2),
    balance_status VARCHAR(24),
    document JSONB NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_sales_point CHECK (sales_point BETWEEN 1 AND 9999),
    CONSTRAINT chk_number_positive CHECK (number IS NULL OR number > 0),
    CONSTRAINT chk_pending_number_positive CHECK (pending_number IS NULL OR pending_number > 0),
    CONSTRAINT chk_status CHECK (status IN ('draft', 'authorized', 'annulled')),
    CONSTRAINT chk_authorized_complete CHECK (
        authorization_code IS NULL
        OR (number IS NOT NULL AND authorization_expires_on IS NOT NULL AND authorized_at IS NOT NULL)
    )
);

-- Numbers are unique per company, type and sales point
CREATE UNIQUE INDEX uq_vouchers_number
    ON vouchers(company_id, voucher_type, sales_point, number)
    WHERE number IS NOT NULL;

CREATE INDEX idx_vouchers_linked ON vouchers(linked_voucher_id) WHERE linked_voucher_id IS NOT NULL;

-- Last number handed out per sequence, locked with FOR UPDATE while reserving
CREATE TABLE voucher_counters (
    company_id UUID NOT NULL,
    sales_point SMALLINT NOT NULL,
    voucher_type SMALLINT NOT NULL,
    last_number BIGINT NOT NULL DEFAULT 0,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (company_id, sales_point, voucher_type),
    CONSTRAINT chk_last_number CHECK (last_number >= 0)
);

-- One row per original voucher, locked with FOR UPDATE while a note is authorized
CREATE TABLE voucher_balance_locks (
    voucher_id UUID PRIMARY KEY REFERENCES vouchers(id) ON DELETE CASCADE
);

CREATE TABLE settlements (
    id UUID PRIMARY KEY,
    voucher_id UUID NOT NULL REFERENCES vouchers(id) ON DELETE CASCADE,
    amount NUMERIC(19, 2) NOT NULL,
    confirmed BOOLEAN NOT NULL DEFAULT false,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_amount_positive CHECK (amount > 0)
);

CREATE INDEX idx_settlements_voucher ON settlements(voucher_id) WHERE confirmed;
";

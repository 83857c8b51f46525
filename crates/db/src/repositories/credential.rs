//! Credential repository.

use async_trait::async_trait;
use chrono::Utc;
use facturo_core::credential::{Credential, SessionBlock, SessionTicket};
use facturo_core::store::{CredentialStore, StoreError};
use facturo_shared::AfipEnvironment;
use facturo_shared::types::{CompanyId, CredentialId, Cuit};
use sea_orm::sea_query::{Expr, OnConflict, SimpleExpr};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use tracing::debug;

use super::{corrupt, store_error};
use crate::entities::{certificate_requests, credentials};

/// Postgres-backed [`CredentialStore`].
#[derive(Debug, Clone)]
pub struct CredentialRepository {
    db: DatabaseConnection,
}

impl CredentialRepository {
    /// Creates a new credential repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    fn to_credential(model: credentials::Model) -> Result<Credential, StoreError> {
        let cuit = Cuit::parse(&model.cuit).map_err(|e| corrupt("CUIT", e))?;
        let environment = AfipEnvironment::parse(&model.environment)
            .ok_or_else(|| corrupt("environment", &model.environment))?;

        let session = match (model.session_token, model.session_sign, model.session_expires_at) {
            (Some(token), Some(sign), Some(expires_at)) => Some(SessionTicket {
                token,
                sign,
                expires_at: expires_at.with_timezone(&Utc),
            }),
            _ => None,
        };
        let session_block = model.blocked_until.map(|until| SessionBlock {
            until: until.with_timezone(&Utc),
            attempts: u32::try_from(model.block_attempts).unwrap_or_default(),
        });

        Ok(Credential {
            id: CredentialId::from_uuid(model.id),
            company_id: CompanyId::from_uuid(model.company_id),
            cuit,
            environment,
            certificate_pem: model.certificate_pem,
            sealed_private_key: model.sealed_private_key,
            sealed_key_password: model.sealed_key_password,
            certificate_not_before: model.certificate_not_before.with_timezone(&Utc),
            certificate_not_after: model.certificate_not_after.with_timezone(&Utc),
            session,
            session_block,
        })
    }

    async fn update_session_columns(
        &self,
        company_id: CompanyId,
        columns: Vec<(credentials::Column, SimpleExpr)>,
    ) -> Result<(), StoreError> {
        let mut update = credentials::Entity::update_many()
            .col_expr(credentials::Column::UpdatedAt, Expr::value(Utc::now()));
        for (column, value) in columns {
            update = update.col_expr(column, value);
        }
        let result = update
            .filter(credentials::Column::CompanyId.eq(company_id.into_inner()))
            .exec(&self.db)
            .await
            .map_err(store_error)?;

        if result.rows_affected == 0 {
            return Err(StoreError::NotFound(format!(
                "credential for company {company_id}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for CredentialRepository {
    async fn find_by_company(
        &self,
        company_id: CompanyId,
    ) -> Result<Option<Credential>, StoreError> {
        credentials::Entity::find()
            .filter(credentials::Column::CompanyId.eq(company_id.into_inner()))
            .one(&self.db)
            .await
            .map_err(store_error)?
            .map(Self::to_credential)
            .transpose()
    }

    async fn save_credential(&self, credential: &Credential) -> Result<(), StoreError> {
        let now = Utc::now().into();
        let company_id = credential.company_id.into_inner();
        let session = credential.session.as_ref();
        let block = credential.session_block.as_ref();

        let txn = self.db.begin().await.map_err(store_error)?;

        credentials::Entity::delete_many()
            .filter(credentials::Column::CompanyId.eq(company_id))
            .exec(&txn)
            .await
            .map_err(store_error)?;
        certificate_requests::Entity::delete_by_id(company_id)
            .exec(&txn)
            .await
            .map_err(store_error)?;

        credentials::ActiveModel {
            id: Set(credential.id.into_inner()),
            company_id: Set(company_id),
            cuit: Set(credential.cuit.digits().to_string()),
            environment: Set(credential.environment.as_str().to_string()),
            certificate_pem: Set(credential.certificate_pem.clone()),
            sealed_private_key: Set(credential.sealed_private_key.clone()),
            sealed_key_password: Set(credential.sealed_key_password.clone()),
            certificate_not_before: Set(credential.certificate_not_before.into()),
            certificate_not_after: Set(credential.certificate_not_after.into()),
            session_token: Set(session.map(|s| s.token.clone())),
            session_sign: Set(session.map(|s| s.sign.clone())),
            session_expires_at: Set(session.map(|s| s.expires_at.into())),
            blocked_until: Set(block.map(|b| b.until.into())),
            block_attempts: Set(block.map_or(0, |b| i32::try_from(b.attempts).unwrap_or(i32::MAX))),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(store_error)?;

        txn.commit().await.map_err(store_error)?;
        debug!(company_id = %credential.company_id, "Credential saved");
        Ok(())
    }

    async fn save_session(
        &self,
        company_id: CompanyId,
        ticket: &SessionTicket,
    ) -> Result<(), StoreError> {
        self.update_session_columns(
            company_id,
            vec![
                (credentials::Column::SessionToken, Expr::value(ticket.token.clone())),
                (credentials::Column::SessionSign, Expr::value(ticket.sign.clone())),
                (credentials::Column::SessionExpiresAt, Expr::value(ticket.expires_at)),
                (
                    credentials::Column::BlockedUntil,
                    Expr::value(None::<chrono::DateTime<Utc>>),
                ),
                (credentials::Column::BlockAttempts, Expr::value(0)),
            ],
        )
        .await
    }

    async fn save_session_block(
        &self,
        company_id: CompanyId,
        block: &SessionBlock,
    ) -> Result<(), StoreError> {
        self.update_session_columns(
            company_id,
            vec![
                (credentials::Column::BlockedUntil, Expr::value(block.until)),
                (
                    credentials::Column::BlockAttempts,
                    Expr::value(i32::try_from(block.attempts).unwrap_or(i32::MAX)),
                ),
            ],
        )
        .await
    }

    async fn clear_session(&self, company_id: CompanyId) -> Result<(), StoreError> {
        self.update_session_columns(
            company_id,
            vec![
                (credentials::Column::SessionToken, Expr::value(None::<String>)),
                (credentials::Column::SessionSign, Expr::value(None::<String>)),
                (
                    credentials::Column::SessionExpiresAt,
                    Expr::value(None::<chrono::DateTime<Utc>>),
                ),
            ],
        )
        .await
    }

    async fn save_pending_key(
        &self,
        company_id: CompanyId,
        sealed_key: &str,
    ) -> Result<(), StoreError> {
        certificate_requests::Entity::insert(certificate_requests::ActiveModel {
            company_id: Set(company_id.into_inner()),
            sealed_private_key: Set(sealed_key.to_string()),
            created_at: Set(Utc::now().into()),
        })
        .on_conflict(
            OnConflict::column(certificate_requests::Column::CompanyId)
                .update_columns([
                    certificate_requests::Column::SealedPrivateKey,
                    certificate_requests::Column::CreatedAt,
                ])
                .to_owned(),
        )
        .exec(&self.db)
        .await
        .map_err(store_error)?;
        Ok(())
    }

    async fn pending_key(&self, company_id: CompanyId) -> Result<Option<String>, StoreError> {
        Ok(certificate_requests::Entity::find_by_id(company_id.into_inner())
            .one(&self.db)
            .await
            .map_err(store_error)?
            .map(|r| r.sealed_private_key))
    }
}

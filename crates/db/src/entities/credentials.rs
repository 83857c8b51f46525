//! `SeaORM` Entity for credentials table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "credentials")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub company_id: Uuid,
    pub cuit: String,
    pub environment: String,
    #[sea_orm(column_type = "Text")]
    pub certificate_pem: String,
    #[sea_orm(column_type = "Text")]
    pub sealed_private_key: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub sealed_key_password: Option<String>,
    pub certificate_not_before: DateTimeWithTimeZone,
    pub certificate_not_after: DateTimeWithTimeZone,
    #[sea_orm(column_type = "Text", nullable)]
    pub session_token: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub session_sign: Option<String>,
    pub session_expires_at: Option<DateTimeWithTimeZone>,
    pub blocked_until: Option<DateTimeWithTimeZone>,
    pub block_attempts: i32,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

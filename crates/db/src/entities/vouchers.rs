//! `SeaORM` Entity for vouchers table.
//!
//! `document` holds the whole voucher; the other columns mirror the fields
//! the database indexes and constrains.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "vouchers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub company_id: Uuid,
    pub voucher_type: i16,
    pub sales_point: i16,
    pub number: Option<i64>,
    pub pending_number: Option<i64>,
    pub issue_date: Date,
    pub status: String,
    #[sea_orm(column_type = "Decimal(Some((19, 2)))")]
    pub total: Decimal,
    pub linked_voucher_id: Option<Uuid>,
    pub authorization_code: Option<String>,
    pub authorization_expires_on: Option<Date>,
    pub authorized_at: Option<DateTimeWithTimeZone>,
    #[sea_orm(column_type = "Decimal(Some((19, 2)))", nullable)]
    pub balance_pending: Option<Decimal>,
    pub balance_status: Option<String>,
    #[sea_orm(column_type = "JsonBinary")]
    pub document: Json,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "Entity",
        from = "Column::LinkedVoucherId",
        to = "Column::Id"
    )]
    Linked,
    #[sea_orm(has_many = "super::settlements::Entity")]
    Settlements,
}

impl Related<super::settlements::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Settlements.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

//! Voucher repository: vouchers, numbering counters and settlements.

use async_trait::async_trait;
use chrono::Utc;
use facturo_core::balance::{BalanceSnapshot, Settlement};
use facturo_core::sequence::{NumberSources, Reservation, SequenceKey};
use facturo_core::store::{BalanceLock, StoreError, VoucherStore};
use facturo_core::voucher::{Authorization, Voucher};
use facturo_shared::types::{SettlementId, VoucherId};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, QueryFilter, QuerySelect, Set, TransactionTrait,
};
use tracing::debug;
use uuid::Uuid;

use super::{corrupt, store_error};
use crate::entities::{settlements, voucher_balance_locks, voucher_counters, vouchers};

/// Postgres-backed [`VoucherStore`].
///
/// Number reservation locks the sequence's counter row with `FOR UPDATE`,
/// so concurrent processes sharing the database get distinct numbers.
/// Balance locks hold a `FOR UPDATE` on the original's row in
/// `voucher_balance_locks` for as long as the returned guard lives.
#[derive(Debug, Clone)]
pub struct VoucherRepository {
    db: DatabaseConnection,
}

/// Counter primary key for a sequence.
fn counter_key(key: &SequenceKey) -> (Uuid, i16, i16) {
    (
        key.company_id.into_inner(),
        sales_point_column(key.sales_point),
        type_column(key.type_code()),
    )
}

fn sales_point_column(sales_point: u16) -> i16 {
    i16::try_from(sales_point).unwrap_or(i16::MAX)
}

fn type_column(code: u16) -> i16 {
    i16::try_from(code).unwrap_or(i16::MAX)
}

fn number_column(number: u64) -> Result<i64, StoreError> {
    i64::try_from(number).map_err(|_| StoreError::Conflict(format!("number {number} out of range")))
}

fn document(voucher: &Voucher) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(voucher).map_err(|e| StoreError::Database(e.to_string()))
}

fn to_voucher(model: vouchers::Model) -> Result<Voucher, StoreError> {
    serde_json::from_value(model.document).map_err(|e| corrupt("voucher document", e))
}

impl VoucherRepository {
    /// Creates a new voucher repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Records a payment or collection against a voucher.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the voucher does not exist.
    pub async fn add_settlement(&self, settlement: &Settlement) -> Result<(), StoreError> {
        settlements::ActiveModel {
            id: Set(settlement.id.into_inner()),
            voucher_id: Set(settlement.voucher_id.into_inner()),
            amount: Set(settlement.amount),
            confirmed: Set(settlement.confirmed),
            created_at: Set(Utc::now().into()),
        }
        .insert(&self.db)
        .await
        .map_err(store_error)?;
        Ok(())
    }

    /// Loads a voucher row with `FOR UPDATE` inside `conn`.
    async fn lock_voucher<C: ConnectionTrait>(
        conn: &C,
        id: VoucherId,
    ) -> Result<Voucher, StoreError> {
        let model = vouchers::Entity::find_by_id(id.into_inner())
            .lock_exclusive()
            .one(conn)
            .await
            .map_err(store_error)?
            .ok_or_else(|| StoreError::NotFound(format!("voucher {id}")))?;
        to_voucher(model)
    }

    /// Creates the counter row of `key` if missing and locks it inside `txn`.
    async fn lock_counter(
        txn: &DatabaseTransaction,
        key: &SequenceKey,
    ) -> Result<voucher_counters::Model, StoreError> {
        let (company_id, sales_point, voucher_type) = counter_key(key);

        voucher_counters::Entity::insert(voucher_counters::ActiveModel {
            company_id: Set(company_id),
            sales_point: Set(sales_point),
            voucher_type: Set(voucher_type),
            last_number: Set(0),
            updated_at: Set(Utc::now().into()),
        })
        .on_conflict(
            OnConflict::columns([
                voucher_counters::Column::CompanyId,
                voucher_counters::Column::SalesPoint,
                voucher_counters::Column::VoucherType,
            ])
            .do_nothing()
            .to_owned(),
        )
        .exec_without_returning(txn)
        .await
        .map_err(store_error)?;

        voucher_counters::Entity::find_by_id((company_id, sales_point, voucher_type))
            .lock_exclusive()
            .one(txn)
            .await
            .map_err(store_error)?
            .ok_or_else(|| StoreError::NotFound(format!("counter for {key}")))
    }

    /// Reads local sources for `key` while its counter row is locked.
    async fn sources(
        txn: &DatabaseTransaction,
        key: &SequenceKey,
        counter: &voucher_counters::Model,
        remote_last: Option<u64>,
    ) -> Result<NumberSources, StoreError> {
        let (company_id, sales_point, voucher_type) = counter_key(key);
        let local: Option<(Option<i64>, Option<i64>)> = vouchers::Entity::find()
            .select_only()
            .column_as(vouchers::Column::Number.max(), "max_number")
            .column_as(vouchers::Column::PendingNumber.max(), "max_pending")
            .filter(vouchers::Column::CompanyId.eq(company_id))
            .filter(vouchers::Column::SalesPoint.eq(sales_point))
            .filter(vouchers::Column::VoucherType.eq(voucher_type))
            .into_tuple()
            .one(txn)
            .await
            .map_err(store_error)?;
        let (local_last, pending_last) = local.unwrap_or_default();

        Ok(NumberSources {
            remote_last,
            local_last: local_last.and_then(|n| u64::try_from(n).ok()),
            counter_last: u64::try_from(counter.last_number).ok().filter(|n| *n > 0),
            pending_last: pending_last.and_then(|n| u64::try_from(n).ok()),
        })
    }

    /// Sets the counter of `key` to `number`.
    async fn set_counter(
        txn: &DatabaseTransaction,
        key: &SequenceKey,
        number: u64,
    ) -> Result<(), StoreError> {
        let (company_id, sales_point, voucher_type) = counter_key(key);
        voucher_counters::ActiveModel {
            company_id: Set(company_id),
            sales_point: Set(sales_point),
            voucher_type: Set(voucher_type),
            last_number: Set(number_column(number)?),
            updated_at: Set(Utc::now().into()),
        }
        .update(txn)
        .await
        .map_err(store_error)?;
        Ok(())
    }

    /// Writes every mirrored column of `voucher` plus its document.
    async fn write_voucher<C: ConnectionTrait>(conn: &C, voucher: &Voucher) -> Result<(), StoreError> {
        let authorization = voucher.authorization.as_ref();
        vouchers::ActiveModel {
            id: Set(voucher.id.into_inner()),
            number: Set(voucher.number.map(number_column).transpose()?),
            pending_number: Set(voucher.pending_number.map(number_column).transpose()?),
            status: Set(voucher.status.as_str().to_string()),
            authorization_code: Set(authorization.map(|a| a.code.clone())),
            authorization_expires_on: Set(authorization.map(|a| a.expires_on)),
            authorized_at: Set(authorization.map(|a| a.authorized_at.into())),
            balance_pending: Set(voucher.balance_pending),
            balance_status: Set(voucher.balance_status.map(|s| s.as_str().to_string())),
            document: Set(document(voucher)?),
            updated_at: Set(Utc::now().into()),
            ..Default::default()
        }
        .update(conn)
        .await
        .map_err(store_error)?;
        Ok(())
    }
}

#[async_trait]
impl VoucherStore for VoucherRepository {
    async fn find(&self, id: VoucherId) -> Result<Option<Voucher>, StoreError> {
        vouchers::Entity::find_by_id(id.into_inner())
            .one(&self.db)
            .await
            .map_err(store_error)?
            .map(to_voucher)
            .transpose()
    }

    async fn insert(&self, voucher: &Voucher) -> Result<(), StoreError> {
        let now = Utc::now().into();
        let authorization = voucher.authorization.as_ref();
        let type_code = voucher
            .type_code()
            .map_err(|e| StoreError::Conflict(e.to_string()))?;

        vouchers::ActiveModel {
            id: Set(voucher.id.into_inner()),
            company_id: Set(voucher.company_id.into_inner()),
            voucher_type: Set(type_column(type_code)),
            sales_point: Set(sales_point_column(voucher.sales_point)),
            number: Set(voucher.number.map(number_column).transpose()?),
            pending_number: Set(voucher.pending_number.map(number_column).transpose()?),
            issue_date: Set(voucher.issue_date),
            status: Set(voucher.status.as_str().to_string()),
            total: Set(voucher.total()),
            linked_voucher_id: Set(voucher.linked_voucher_id.map(VoucherId::into_inner)),
            authorization_code: Set(authorization.map(|a| a.code.clone())),
            authorization_expires_on: Set(authorization.map(|a| a.expires_on)),
            authorized_at: Set(authorization.map(|a| a.authorized_at.into())),
            balance_pending: Set(voucher.balance_pending),
            balance_status: Set(voucher.balance_status.map(|s| s.as_str().to_string())),
            document: Set(document(voucher)?),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&self.db)
        .await
        .map_err(store_error)?;
        Ok(())
    }

    async fn linked_notes(&self, original: VoucherId) -> Result<Vec<Voucher>, StoreError> {
        vouchers::Entity::find()
            .filter(vouchers::Column::LinkedVoucherId.eq(original.into_inner()))
            .all(&self.db)
            .await
            .map_err(store_error)?
            .into_iter()
            .map(to_voucher)
            .collect()
    }

    async fn confirmed_settlements(
        &self,
        voucher: VoucherId,
    ) -> Result<Vec<Settlement>, StoreError> {
        Ok(settlements::Entity::find()
            .filter(settlements::Column::VoucherId.eq(voucher.into_inner()))
            .filter(settlements::Column::Confirmed.eq(true))
            .all(&self.db)
            .await
            .map_err(store_error)?
            .into_iter()
            .map(|s| Settlement {
                id: SettlementId::from_uuid(s.id),
                voucher_id: VoucherId::from_uuid(s.voucher_id),
                amount: s.amount,
                confirmed: s.confirmed,
            })
            .collect())
    }

    async fn reserve_number(
        &self,
        key: SequenceKey,
        remote_last: Option<u64>,
    ) -> Result<Reservation, StoreError> {
        let txn = self.db.begin().await.map_err(store_error)?;

        let counter = Self::lock_counter(&txn, &key).await?;
        let sources = Self::sources(&txn, &key, &counter, remote_last).await?;
        let reservation = Reservation::from_sources(key, sources);
        Self::set_counter(&txn, &key, reservation.number).await?;

        txn.commit().await.map_err(store_error)?;
        debug!(sequence = %key, number = reservation.number, ?sources, "Counter advanced");
        Ok(reservation)
    }

    async fn claim_number(
        &self,
        voucher: VoucherId,
        key: SequenceKey,
        remote_last: Option<u64>,
    ) -> Result<Reservation, StoreError> {
        let txn = self.db.begin().await.map_err(store_error)?;

        let counter = Self::lock_counter(&txn, &key).await?;
        let mut draft = Self::lock_voucher(&txn, voucher).await?;
        if draft.is_authorized() {
            return Err(StoreError::Conflict(format!("voucher {voucher} is authorized")));
        }
        let sources = Self::sources(&txn, &key, &counter, remote_last).await?;
        let reservation = Reservation::for_submission(key, sources)
            .map_err(|e| StoreError::Conflict(e.to_string()))?;

        Self::set_counter(&txn, &key, reservation.number).await?;
        draft.pending_number = Some(reservation.number);
        Self::write_voucher(&txn, &draft).await?;

        txn.commit().await.map_err(store_error)?;
        debug!(sequence = %key, number = reservation.number, ?sources, "Number claimed");
        Ok(reservation)
    }

    async fn clear_pending(&self, voucher: VoucherId) -> Result<(), StoreError> {
        let txn = self.db.begin().await.map_err(store_error)?;

        let mut draft = Self::lock_voucher(&txn, voucher).await?;
        if draft.pending_number.take().is_some() {
            Self::write_voucher(&txn, &draft).await?;
        }

        txn.commit().await.map_err(store_error)?;
        Ok(())
    }

    async fn lock_balance(&self, voucher: VoucherId) -> Result<BalanceLock, StoreError> {
        voucher_balance_locks::Entity::insert(voucher_balance_locks::ActiveModel {
            voucher_id: Set(voucher.into_inner()),
        })
        .on_conflict(
            OnConflict::column(voucher_balance_locks::Column::VoucherId)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(&self.db)
        .await
        .map_err(store_error)?;

        let txn = self.db.begin().await.map_err(store_error)?;
        voucher_balance_locks::Entity::find_by_id(voucher.into_inner())
            .lock_exclusive()
            .one(&txn)
            .await
            .map_err(store_error)?
            .ok_or_else(|| StoreError::NotFound(format!("voucher {voucher}")))?;

        // Dropping the open transaction rolls it back and frees the row.
        Ok(BalanceLock::new(txn))
    }

    async fn release_number(&self, key: SequenceKey, number: u64) -> Result<bool, StoreError> {
        let (company_id, sales_point, voucher_type) = counter_key(&key);
        let txn = self.db.begin().await.map_err(store_error)?;

        let counter = voucher_counters::Entity::find_by_id((company_id, sales_point, voucher_type))
            .lock_exclusive()
            .one(&txn)
            .await
            .map_err(store_error)?;

        let released = match counter {
            Some(counter) if counter.last_number == number_column(number)? => {
                let mut active: voucher_counters::ActiveModel = counter.into();
                active.last_number = Set(number_column(number - 1)?);
                active.updated_at = Set(Utc::now().into());
                active.update(&txn).await.map_err(store_error)?;
                true
            }
            _ => false,
        };

        txn.commit().await.map_err(store_error)?;
        Ok(released)
    }

    async fn record_authorization(
        &self,
        id: VoucherId,
        number: u64,
        authorization: &Authorization,
    ) -> Result<Voucher, StoreError> {
        let txn = self.db.begin().await.map_err(store_error)?;

        let mut voucher = Self::lock_voucher(&txn, id).await?;
        voucher
            .record_authorization(number, authorization.clone())
            .map_err(|e| StoreError::Conflict(e.to_string()))?;
        Self::write_voucher(&txn, &voucher).await?;

        txn.commit().await.map_err(store_error)?;
        Ok(voucher)
    }

    async fn save_balance(&self, snapshot: &BalanceSnapshot) -> Result<(), StoreError> {
        let txn = self.db.begin().await.map_err(store_error)?;

        let mut voucher = Self::lock_voucher(&txn, snapshot.voucher_id).await?;
        voucher.balance_pending = Some(snapshot.balance_pending);
        voucher.balance_status = Some(snapshot.status);
        Self::write_voucher(&txn, &voucher).await?;

        txn.commit().await.map_err(store_error)?;
        Ok(())
    }
}

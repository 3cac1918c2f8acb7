//! Append-only audit ledger. Entries are written exactly once per
//! reconciliation mutation and never updated or deleted; history queries
//! return newest first and leave pagination to the caller.

use crate::entities::ledger_entry::{self, Entity as LedgerEntry, LedgerReason};
use crate::errors::ServiceError;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use uuid::Uuid;

/// One pending ledger write. `created_at` is stamped at insert time.
#[derive(Debug, Clone)]
pub struct LedgerWrite {
    pub stock_record_id: i64,
    pub customer_id: String,
    pub product_name: String,
    pub previous_quantity: i32,
    pub change_quantity: i32,
    pub previous_location: Option<String>,
    pub new_location: Option<String>,
    pub reason: LedgerReason,
    pub actor: String,
}

pub async fn append<C: ConnectionTrait>(
    db: &C,
    write: LedgerWrite,
) -> Result<ledger_entry::Model, ServiceError> {
    let new_quantity = write.previous_quantity + write.change_quantity;
    // A zero quantity change is only permitted for a pure location move.
    if write.change_quantity == 0 && write.previous_location == write.new_location {
        return Err(ServiceError::Internal(format!(
            "ledger entry for stock record {} records no change",
            write.stock_record_id
        )));
    }

    let active = ledger_entry::ActiveModel {
        id: Set(Uuid::new_v4()),
        stock_record_id: Set(write.stock_record_id),
        customer_id: Set(write.customer_id),
        product_name: Set(write.product_name),
        previous_quantity: Set(write.previous_quantity),
        change_quantity: Set(write.change_quantity),
        new_quantity: Set(new_quantity),
        previous_location: Set(write.previous_location),
        new_location: Set(write.new_location),
        reason: Set(write.reason),
        actor: Set(write.actor),
        ..Default::default()
    };

    Ok(active.insert(db).await?)
}

pub async fn by_stock_record<C: ConnectionTrait>(
    db: &C,
    stock_record_id: i64,
) -> Result<Vec<ledger_entry::Model>, ServiceError> {
    Ok(LedgerEntry::find()
        .filter(ledger_entry::Column::StockRecordId.eq(stock_record_id))
        .order_by_desc(ledger_entry::Column::CreatedAt)
        .all(db)
        .await?)
}

pub async fn by_customer<C: ConnectionTrait>(
    db: &C,
    customer_id: &str,
) -> Result<Vec<ledger_entry::Model>, ServiceError> {
    Ok(LedgerEntry::find()
        .filter(ledger_entry::Column::CustomerId.eq(customer_id))
        .order_by_desc(ledger_entry::Column::CreatedAt)
        .all(db)
        .await?)
}

pub async fn all<C: ConnectionTrait>(db: &C) -> Result<Vec<ledger_entry::Model>, ServiceError> {
    Ok(LedgerEntry::find()
        .order_by_desc(ledger_entry::Column::CreatedAt)
        .all(db)
        .await?)
}

/// Page of history entries plus the total count, for history views.
/// `page` is 1-based.
pub async fn all_paginated<C: ConnectionTrait>(
    db: &C,
    page: u64,
    per_page: u64,
) -> Result<(Vec<ledger_entry::Model>, u64), ServiceError> {
    let paginator = LedgerEntry::find()
        .order_by_desc(ledger_entry::Column::CreatedAt)
        .paginate(db, per_page.max(1));

    let total = paginator.num_items().await?;
    let entries = paginator.fetch_page(page.saturating_sub(1)).await?;

    Ok((entries, total))
}

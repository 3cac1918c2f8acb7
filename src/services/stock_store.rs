//! Stock Record Store: durable mapping from (customer, barcode, expiration)
//! to one lot. Point lookup, lot scan, create, and a compare-and-swap
//! quantity update. Ledger writes are the caller's responsibility so the
//! store stays ledger-agnostic; the Reconciliation Service always pairs the
//! two.

use crate::entities::stock_record::{self, Entity as StockRecord};
use crate::errors::ServiceError;
use chrono::{NaiveDate, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};

/// Input for creating a lot on first inbound receipt or manual registration.
#[derive(Debug, Clone)]
pub struct NewStockRecord {
    pub customer_id: String,
    pub product_name: String,
    pub barcode: String,
    pub location: Option<String>,
    pub expiration_date: Option<NaiveDate>,
    pub quantity: i32,
    pub safe_quantity: i32,
}

pub async fn find_by_id<C: ConnectionTrait>(
    db: &C,
    id: i64,
) -> Result<Option<stock_record::Model>, ServiceError> {
    Ok(StockRecord::find_by_id(id).one(db).await?)
}

/// Point lookup on the identity key. An absent expiration date is a distinct
/// key value, not a wildcard.
pub async fn find_by_key<C: ConnectionTrait>(
    db: &C,
    customer_id: &str,
    barcode: &str,
    expiration_date: Option<NaiveDate>,
) -> Result<Option<stock_record::Model>, ServiceError> {
    let mut query = StockRecord::find()
        .filter(stock_record::Column::CustomerId.eq(customer_id))
        .filter(stock_record::Column::Barcode.eq(barcode));

    query = match expiration_date {
        Some(date) => query.filter(stock_record::Column::ExpirationDate.eq(date)),
        None => query.filter(stock_record::Column::ExpirationDate.is_null()),
    };

    Ok(query.one(db).await?)
}

/// All lots for one (customer, product), zero-quantity rows included.
pub async fn find_lots<C: ConnectionTrait>(
    db: &C,
    customer_id: &str,
    barcode: &str,
) -> Result<Vec<stock_record::Model>, ServiceError> {
    Ok(StockRecord::find()
        .filter(stock_record::Column::CustomerId.eq(customer_id))
        .filter(stock_record::Column::Barcode.eq(barcode))
        .order_by_asc(stock_record::Column::Id)
        .all(db)
        .await?)
}

/// Creates a lot for a new identity key.
pub async fn create<C: ConnectionTrait>(
    db: &C,
    record: NewStockRecord,
) -> Result<stock_record::Model, ServiceError> {
    if record.quantity < 0 {
        return Err(ServiceError::NegativeStock(format!(
            "cannot create lot {}/{} with quantity {}",
            record.customer_id, record.barcode, record.quantity
        )));
    }

    // The unique index does not cover NULL-expiration keys, so key-check here
    // as well. A lost race on insert still surfaces as DuplicateKey below.
    if find_by_key(db, &record.customer_id, &record.barcode, record.expiration_date)
        .await?
        .is_some()
    {
        return Err(ServiceError::DuplicateKey(identity_key(
            &record.customer_id,
            &record.barcode,
            record.expiration_date,
        )));
    }

    let now = Utc::now();
    let active = stock_record::ActiveModel {
        customer_id: Set(record.customer_id.clone()),
        product_name: Set(record.product_name),
        barcode: Set(record.barcode.clone()),
        location: Set(record.location),
        expiration_date: Set(record.expiration_date),
        quantity: Set(record.quantity),
        safe_quantity: Set(record.safe_quantity),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };

    active.insert(db).await.map_err(|e| {
        if is_unique_violation(&e) {
            ServiceError::DuplicateKey(identity_key(
                &record.customer_id,
                &record.barcode,
                record.expiration_date,
            ))
        } else {
            ServiceError::Database(e)
        }
    })
}

/// Applies a signed quantity delta as one conditional update: the row must
/// still hold the quantity the caller read (`current.quantity`), otherwise a
/// concurrent writer won and `ConcurrentModification` is returned for the
/// caller to replan.
///
/// `new_location`: outer `None` keeps the current location; `Some(loc)` sets
/// it (including clearing it with `Some(None)`).
pub async fn apply_delta<C: ConnectionTrait>(
    db: &C,
    current: &stock_record::Model,
    delta: i32,
    new_location: Option<Option<String>>,
) -> Result<stock_record::Model, ServiceError> {
    let target = current.quantity + delta;
    if target < 0 {
        return Err(ServiceError::NegativeStock(format!(
            "stock record {}: {} {} would go to {}",
            current.id, current.quantity, delta, target
        )));
    }

    let mut update = StockRecord::update_many()
        .col_expr(stock_record::Column::Quantity, Expr::value(target))
        .col_expr(stock_record::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(stock_record::Column::Id.eq(current.id))
        .filter(stock_record::Column::Quantity.eq(current.quantity));

    if let Some(location) = new_location {
        update = update.col_expr(stock_record::Column::Location, Expr::value(location));
    }

    let result = update.exec(db).await?;
    if result.rows_affected == 0 {
        return Err(ServiceError::ConcurrentModification(current.id));
    }

    find_by_id(db, current.id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("stock record {}", current.id)))
}

fn identity_key(customer_id: &str, barcode: &str, expiration_date: Option<NaiveDate>) -> String {
    match expiration_date {
        Some(date) => format!("{}/{}/{}", customer_id, barcode, date),
        None => format!("{}/{}/-", customer_id, barcode),
    }
}

fn is_unique_violation(err: &sea_orm::DbErr) -> bool {
    let msg = err.to_string();
    msg.contains("UNIQUE constraint") || msg.contains("duplicate key")
}

#![allow(dead_code)]

use chrono::NaiveDate;
use std::sync::Arc;
use tokio::sync::mpsc;
use warehouse_ledger::db::{self, DbConfig, DbPool};
use warehouse_ledger::events::{Event, EventSender};
use warehouse_ledger::services::allocation::OrderLine;
use warehouse_ledger::services::reconciliation::{InboundReceipt, ReconciliationService};

/// Boots an in-memory sqlite database, runs migrations, and wires a
/// reconciliation service to an event channel. The receiver must stay alive
/// for the duration of the test so event sends do not fail.
pub async fn setup_service() -> (Arc<DbPool>, ReconciliationService, mpsc::Receiver<Event>) {
    let pool = db::establish_connection_with_config(&DbConfig {
        url: "sqlite::memory:".to_string(),
        // A single connection keeps the in-memory database coherent.
        max_connections: 1,
        min_connections: 1,
        ..Default::default()
    })
    .await
    .expect("Failed to create DB pool");
    db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    let pool = Arc::new(pool);
    let (tx, rx) = mpsc::channel(100);
    let service = ReconciliationService::new(pool.clone(), EventSender::new(tx));
    (pool, service, rx)
}

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("bad date literal")
}

pub fn receipt(
    customer_id: &str,
    barcode: &str,
    quantity: i32,
    location: &str,
    expiration: Option<&str>,
) -> InboundReceipt {
    InboundReceipt {
        customer_id: customer_id.to_string(),
        product_name: format!("Product {}", barcode),
        barcode: barcode.to_string(),
        quantity,
        location: Some(location.to_string()),
        expiration_date: expiration.map(date),
        safe_quantity: 0,
    }
}

pub fn order_line(
    order_number: &str,
    customer_id: &str,
    barcode: &str,
    requested_quantity: i32,
) -> OrderLine {
    OrderLine {
        order_number: order_number.to_string(),
        customer_id: customer_id.to_string(),
        barcode: barcode.to_string(),
        requested_quantity,
        target_stock_record_id: None,
    }
}

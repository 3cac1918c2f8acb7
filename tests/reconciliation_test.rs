mod common;

use assert_matches::assert_matches;
use common::{date, order_line, receipt, setup_service};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use warehouse_ledger::entities::ledger_entry::{self, LedgerReason};
use warehouse_ledger::entities::stock_record;
use warehouse_ledger::errors::ServiceError;
use warehouse_ledger::services::reconciliation::StockAdjustment;
use warehouse_ledger::services::{ledger, stock_store};

#[tokio::test]
async fn inbound_creates_then_restocks() {
    let (pool, service, _rx) = setup_service().await;
    let db = pool.as_ref();

    let created = service
        .receive_inbound(receipt("CUST-1", "880001", 10, "A-01", Some("2025-06-30")), "alice")
        .await
        .expect("first receipt");
    assert_eq!(created.quantity, 10);
    assert_eq!(created.location.as_deref(), Some("A-01"));

    let restocked = service
        .receive_inbound(receipt("CUST-1", "880001", 5, "A-02", Some("2025-06-30")), "alice")
        .await
        .expect("second receipt");
    assert_eq!(restocked.id, created.id);
    assert_eq!(restocked.quantity, 15);
    assert_eq!(restocked.location.as_deref(), Some("A-02"));

    // A different expiration is its own identity key.
    let other_lot = service
        .receive_inbound(receipt("CUST-1", "880001", 3, "A-01", Some("2025-12-31")), "alice")
        .await
        .expect("dated receipt");
    assert_ne!(other_lot.id, created.id);

    // So is an undated receipt.
    let undated = service
        .receive_inbound(receipt("CUST-1", "880001", 7, "A-01", None), "alice")
        .await
        .expect("undated receipt");
    assert_ne!(undated.id, created.id);
    assert_ne!(undated.id, other_lot.id);

    let history = ledger::by_stock_record(db, created.id).await.expect("history");
    assert_eq!(history.len(), 2);
    // Newest first.
    assert_eq!(history[0].reason, LedgerReason::ReceiptRestock);
    assert_eq!(history[0].previous_quantity, 10);
    assert_eq!(history[0].new_quantity, 15);
    assert_eq!(history[1].reason, LedgerReason::ReceiptNew);
    assert_eq!(history[1].previous_quantity, 0);
    assert_eq!(history[1].new_quantity, 10);
    assert!(history.iter().all(|e| e.is_balanced()));
}

#[tokio::test]
async fn inbound_rejects_non_positive_quantity() {
    let (_pool, service, _rx) = setup_service().await;

    let err = service
        .receive_inbound(receipt("CUST-1", "880001", 0, "A-01", None), "alice")
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidQuantity(_));

    let err = service
        .receive_inbound(receipt("CUST-1", "880001", -4, "A-01", None), "alice")
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidQuantity(_));
}

#[tokio::test]
async fn shipment_debits_lots_in_fefo_order() {
    let (pool, service, _rx) = setup_service().await;
    let db = pool.as_ref();

    let soonest = service
        .receive_inbound(receipt("CUST-1", "880002", 5, "A-01", Some("2025-01-01")), "alice")
        .await
        .unwrap();
    let later = service
        .receive_inbound(receipt("CUST-1", "880002", 3, "A-02", Some("2025-03-01")), "alice")
        .await
        .unwrap();
    let undated = service
        .receive_inbound(receipt("CUST-1", "880002", 10, "B-01", None), "alice")
        .await
        .unwrap();

    let entries = service
        .ship_order(&[order_line("ORD-1", "CUST-1", "880002", 6)], "bob")
        .await
        .expect("shipment");

    // 5 from the soonest-expiring lot, 1 from the next; undated untouched.
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].stock_record_id, soonest.id);
    assert_eq!(entries[0].change_quantity, -5);
    assert_eq!(entries[1].stock_record_id, later.id);
    assert_eq!(entries[1].change_quantity, -1);
    assert!(entries.iter().all(|e| e.reason == LedgerReason::Shipment));

    let soonest_now = stock_store::find_by_id(db, soonest.id).await.unwrap().unwrap();
    let later_now = stock_store::find_by_id(db, later.id).await.unwrap().unwrap();
    let undated_now = stock_store::find_by_id(db, undated.id).await.unwrap().unwrap();
    assert_eq!(soonest_now.quantity, 0);
    assert_eq!(later_now.quantity, 2);
    assert_eq!(undated_now.quantity, 10);

    // Zero-quantity rows persist rather than being deleted.
    assert_eq!(soonest_now.expiration_date, Some(date("2025-01-01")));
}

#[tokio::test]
async fn shipment_is_all_or_nothing_across_lines() {
    let (pool, service, _rx) = setup_service().await;
    let db = pool.as_ref();

    let ok_lot = service
        .receive_inbound(receipt("CUST-1", "880003", 10, "A-01", None), "alice")
        .await
        .unwrap();
    service
        .receive_inbound(receipt("CUST-1", "880004", 2, "A-02", None), "alice")
        .await
        .unwrap();

    let err = service
        .ship_order(
            &[
                order_line("ORD-2", "CUST-1", "880003", 4),
                order_line("ORD-2", "CUST-1", "880004", 5), // short by 3
            ],
            "bob",
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock(_));

    // Zero mutations and zero ledger entries for either line.
    let ok_lot_now = stock_store::find_by_id(db, ok_lot.id).await.unwrap().unwrap();
    assert_eq!(ok_lot_now.quantity, 10);
    let shipment_entries = ledger_entry::Entity::find()
        .filter(ledger_entry::Column::Reason.eq(LedgerReason::Shipment))
        .all(db)
        .await
        .unwrap();
    assert!(shipment_entries.is_empty());
}

#[tokio::test]
async fn pinned_line_ships_from_target_lot_only() {
    let (pool, service, _rx) = setup_service().await;
    let db = pool.as_ref();

    service
        .receive_inbound(receipt("CUST-1", "880005", 5, "A-01", Some("2025-01-01")), "alice")
        .await
        .unwrap();
    let pinned = service
        .receive_inbound(receipt("CUST-1", "880005", 8, "A-02", Some("2025-03-01")), "alice")
        .await
        .unwrap();

    let mut line = order_line("ORD-3", "CUST-1", "880005", 6);
    line.target_stock_record_id = Some(pinned.id);

    let entries = service.ship_order(&[line], "bob").await.expect("pinned shipment");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].stock_record_id, pinned.id);
    assert_eq!(entries[0].change_quantity, -6);

    let pinned_now = stock_store::find_by_id(db, pinned.id).await.unwrap().unwrap();
    assert_eq!(pinned_now.quantity, 2);
}

#[tokio::test]
async fn adjustment_location_move_and_noop() {
    let (pool, service, _rx) = setup_service().await;
    let db = pool.as_ref();

    let lot = service
        .receive_inbound(receipt("CUST-2", "990001", 10, "C-01", None), "alice")
        .await
        .unwrap();

    // Quantity change with supplied reason.
    let (adjusted, entry) = service
        .adjust_stock(
            StockAdjustment {
                stock_record_id: lot.id,
                new_quantity: 7,
                new_location: Some("C-01".to_string()),
                reason: LedgerReason::ManualAdjustment,
            },
            "carol",
        )
        .await
        .expect("adjustment");
    assert_eq!(adjusted.quantity, 7);
    let entry = entry.expect("ledger entry for quantity change");
    assert_eq!(entry.reason, LedgerReason::ManualAdjustment);
    assert_eq!(entry.previous_quantity, 10);
    assert_eq!(entry.change_quantity, -3);

    // Zero change with a location change is recorded as LocationMove even
    // though the caller said ManualAdjustment.
    let (moved, entry) = service
        .adjust_stock(
            StockAdjustment {
                stock_record_id: lot.id,
                new_quantity: 7,
                new_location: Some("D-05".to_string()),
                reason: LedgerReason::ManualAdjustment,
            },
            "carol",
        )
        .await
        .expect("move");
    assert_eq!(moved.location.as_deref(), Some("D-05"));
    let entry = entry.expect("ledger entry for location move");
    assert_eq!(entry.reason, LedgerReason::LocationMove);
    assert_eq!(entry.change_quantity, 0);
    assert!(entry.is_location_move());

    // No-op adjustment commits nothing and appends nothing.
    let before = ledger::by_stock_record(db, lot.id).await.unwrap().len();
    let (_, entry) = service
        .adjust_stock(
            StockAdjustment {
                stock_record_id: lot.id,
                new_quantity: 7,
                new_location: Some("D-05".to_string()),
                reason: LedgerReason::ManualAdjustment,
            },
            "carol",
        )
        .await
        .expect("noop");
    assert!(entry.is_none());
    let after = ledger::by_stock_record(db, lot.id).await.unwrap().len();
    assert_eq!(before, after);
}

#[tokio::test]
async fn adjustment_rejects_negative_target_and_unknown_record() {
    let (_pool, service, _rx) = setup_service().await;

    let err = service
        .adjust_stock(
            StockAdjustment {
                stock_record_id: 1,
                new_quantity: -1,
                new_location: None,
                reason: LedgerReason::ManualAdjustment,
            },
            "carol",
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NegativeStock(_));

    let err = service
        .adjust_stock(
            StockAdjustment {
                stock_record_id: 424242,
                new_quantity: 5,
                new_location: None,
                reason: LedgerReason::ManualAdjustment,
            },
            "carol",
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn cancellation_credits_exact_lots_from_linkage() {
    let (pool, service, _rx) = setup_service().await;
    let db = pool.as_ref();

    let first = service
        .receive_inbound(receipt("CUST-3", "770001", 3, "A-01", Some("2025-02-01")), "alice")
        .await
        .unwrap();
    let second = service
        .receive_inbound(receipt("CUST-3", "770001", 9, "A-02", Some("2025-05-01")), "alice")
        .await
        .unwrap();

    let line = order_line("ORD-9", "CUST-3", "770001", 5);
    service.ship_order(&[line.clone()], "bob").await.expect("shipment");

    // Shipment split: 3 from the first lot, 2 from the second.
    let first_shipped = stock_store::find_by_id(db, first.id).await.unwrap().unwrap();
    let second_shipped = stock_store::find_by_id(db, second.id).await.unwrap().unwrap();
    assert_eq!(first_shipped.quantity, 0);
    assert_eq!(second_shipped.quantity, 7);

    let entries = service.cancel_shipment(&[line], "bob").await.expect("cancel");
    assert_eq!(entries.len(), 2);
    assert!(entries
        .iter()
        .all(|e| e.reason == LedgerReason::ShipmentCancelled));
    let credited: i32 = entries.iter().map(|e| e.change_quantity).sum();
    assert_eq!(credited, 5);

    // Exact reversal, lot by lot.
    let first_now = stock_store::find_by_id(db, first.id).await.unwrap().unwrap();
    let second_now = stock_store::find_by_id(db, second.id).await.unwrap().unwrap();
    assert_eq!(first_now.quantity, 3);
    assert_eq!(second_now.quantity, 9);
}

#[tokio::test]
async fn cancelling_twice_falls_back_and_unknown_product_fails() {
    let (pool, service, _rx) = setup_service().await;
    let db = pool.as_ref();

    let dated = service
        .receive_inbound(receipt("CUST-3", "770002", 5, "A-01", Some("2025-04-01")), "alice")
        .await
        .unwrap();
    let latest = service
        .receive_inbound(receipt("CUST-3", "770002", 5, "A-02", Some("2025-08-01")), "alice")
        .await
        .unwrap();

    let line = order_line("ORD-10", "CUST-3", "770002", 5);
    service.ship_order(&[line.clone()], "bob").await.unwrap();
    service.cancel_shipment(&[line.clone()], "bob").await.unwrap();

    // The linkage is spent; a second cancellation uses the heuristic and
    // credits the most-recently-dated lot.
    let entries = service.cancel_shipment(&[line], "bob").await.expect("fallback cancel");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].stock_record_id, latest.id);
    assert_eq!(entries[0].change_quantity, 5);

    let dated_now = stock_store::find_by_id(db, dated.id).await.unwrap().unwrap();
    let latest_now = stock_store::find_by_id(db, latest.id).await.unwrap().unwrap();
    assert_eq!(dated_now.quantity, 5);
    assert_eq!(latest_now.quantity, 10);

    // Cancelling against a product with no lots at all is an error.
    let err = service
        .cancel_shipment(&[order_line("ORD-11", "CUST-3", "000000", 1)], "bob")
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn availability_subtracts_pending_order_lines() {
    let (_pool, service, _rx) = setup_service().await;

    service
        .receive_inbound(receipt("CUST-4", "660001", 20, "A-01", None), "alice")
        .await
        .unwrap();

    let line = order_line("ORD-20", "CUST-4", "660001", 6);
    service.register_order_lines(&[line.clone()]).await.expect("register");

    let availability = service.stock_availability("CUST-4", "660001").await.unwrap();
    assert_eq!(availability.physical, 20);
    assert_eq!(availability.allocated, 6);
    assert_eq!(availability.available, 14);

    // Shipping flips the registered line to Shipped, releasing the hold.
    service.ship_order(&[line.clone()], "bob").await.unwrap();
    let availability = service.stock_availability("CUST-4", "660001").await.unwrap();
    assert_eq!(availability.physical, 14);
    assert_eq!(availability.allocated, 0);
    assert_eq!(availability.available, 14);

    // Cancellation makes the order pending again and restores the stock.
    service.cancel_shipment(&[line], "bob").await.unwrap();
    let availability = service.stock_availability("CUST-4", "660001").await.unwrap();
    assert_eq!(availability.physical, 20);
    assert_eq!(availability.allocated, 6);
    assert_eq!(availability.available, 14);
}

#[tokio::test]
async fn batch_lines_sharing_a_lot_ship_together() {
    let (pool, service, _rx) = setup_service().await;
    let db = pool.as_ref();

    let lot = service
        .receive_inbound(receipt("CUST-6", "220001", 10, "A-01", None), "alice")
        .await
        .unwrap();

    // Two orders in one batch drawing from the same lot: 4 + 4 out of 10.
    let entries = service
        .ship_order(
            &[
                order_line("ORD-40", "CUST-6", "220001", 4),
                order_line("ORD-41", "CUST-6", "220001", 4),
            ],
            "bob",
        )
        .await
        .expect("satisfiable batch must ship");

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].previous_quantity, 10);
    assert_eq!(entries[0].new_quantity, 6);
    assert_eq!(entries[1].previous_quantity, 6);
    assert_eq!(entries[1].new_quantity, 2);

    let live = stock_store::find_by_id(db, lot.id).await.unwrap().unwrap();
    assert_eq!(live.quantity, 2);
}

#[tokio::test]
async fn batch_over_request_on_one_lot_is_insufficient_stock() {
    let (pool, service, _rx) = setup_service().await;
    let db = pool.as_ref();

    let lot = service
        .receive_inbound(receipt("CUST-6", "220002", 10, "A-01", None), "alice")
        .await
        .unwrap();

    // Each line fits alone, but together they over-request the lot.
    let err = service
        .ship_order(
            &[
                order_line("ORD-42", "CUST-6", "220002", 6),
                order_line("ORD-43", "CUST-6", "220002", 6),
            ],
            "bob",
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock(_));

    let live = stock_store::find_by_id(db, lot.id).await.unwrap().unwrap();
    assert_eq!(live.quantity, 10);
}

#[tokio::test]
async fn duplicate_create_is_retryable_and_inbound_restocks_instead() {
    use warehouse_ledger::services::stock_store::NewStockRecord;

    let (pool, service, _rx) = setup_service().await;
    let db = pool.as_ref();

    let new_record = NewStockRecord {
        customer_id: "CUST-7".to_string(),
        product_name: "Product 110001".to_string(),
        barcode: "110001".to_string(),
        location: Some("A-01".to_string()),
        expiration_date: None,
        quantity: 5,
        safe_quantity: 0,
    };
    let created = stock_store::create(db, new_record.clone()).await.expect("create");

    // A second create on the same identity key is the losing side of an
    // insert race: rejected as DuplicateKey, which the receipt loop retries.
    let err = stock_store::create(db, new_record).await.unwrap_err();
    assert_matches!(err, ServiceError::DuplicateKey(_));
    assert!(err.is_retryable());

    // A retried receipt finds the key and lands as a restock.
    let restocked = service
        .receive_inbound(receipt("CUST-7", "110001", 3, "A-01", None), "alice")
        .await
        .expect("restock");
    assert_eq!(restocked.id, created.id);
    assert_eq!(restocked.quantity, 8);

    let history = ledger::by_stock_record(db, created.id).await.unwrap();
    assert_eq!(history[0].reason, LedgerReason::ReceiptRestock);
}

#[tokio::test]
async fn service_wires_from_config() {
    use warehouse_ledger::config::AppConfig;
    use warehouse_ledger::db;
    use warehouse_ledger::events;
    use warehouse_ledger::services::reconciliation::ReconciliationService;

    let cfg = AppConfig {
        database_url: "sqlite::memory:".to_string(),
        environment: "test".to_string(),
        log_level: "info".to_string(),
        log_json: false,
        auto_migrate: true,
        // A single connection keeps the in-memory database coherent.
        db_max_connections: 1,
        db_min_connections: 1,
        db_connect_timeout_secs: 30,
        db_acquire_timeout_secs: 8,
        db_idle_timeout_secs: 600,
        cas_retry_limit: 5,
        event_buffer_size: 8,
    };

    let pool = db::establish_connection_from_app_config(&cfg)
        .await
        .expect("Failed to create DB pool");
    db::run_migrations(&pool).await.expect("Failed to run migrations");

    let (sender, _rx) = events::channel(cfg.event_buffer_size);
    let service = ReconciliationService::from_config(std::sync::Arc::new(pool), sender, &cfg);

    let record = service
        .receive_inbound(receipt("CUST-8", "100001", 4, "A-01", None), "alice")
        .await
        .expect("receipt through config-wired service");
    assert_eq!(record.quantity, 4);
}

#[tokio::test]
async fn plan_allocation_reports_shortfall_without_mutating() {
    let (pool, service, _rx) = setup_service().await;
    let db = pool.as_ref();

    let lot = service
        .receive_inbound(receipt("CUST-5", "550001", 8, "A-01", None), "alice")
        .await
        .unwrap();

    let plan = service
        .plan_allocation(&order_line("ORD-30", "CUST-5", "550001", 10))
        .await
        .expect("plan");
    assert_eq!(plan.total_taken(), 8);
    assert_eq!(plan.shortfall, 2);

    // Pure planning: nothing was debited.
    let lot_now = stock_store::find_by_id(db, lot.id).await.unwrap().unwrap();
    assert_eq!(lot_now.quantity, 8);

    let all_records = stock_record::Entity::find().all(db).await.unwrap();
    assert_eq!(all_records.len(), 1);
}

//! Reconciliation Service: the only component permitted to mutate stock
//! quantities. Every mutation is a conditional update paired with exactly one
//! ledger entry (one per split lot for outbound), committed inside a single
//! database transaction so each action is all-or-nothing. Lost conditional
//! updates are retried with fresh planning a bounded number of times before
//! `ConcurrentModification` surfaces.

use crate::{
    config::AppConfig,
    db::DbPool,
    entities::{
        ledger_entry::{self, LedgerReason},
        order_line::{self, Entity as OrderLineEntity, OrderLineStatus},
        shipment_allocation::{self, Entity as ShipmentAllocation},
        stock_record,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        allocation::{self, AllocationPlan, OrderLine},
        ledger::{self, LedgerWrite},
        stock_store::{self, NewStockRecord},
    },
};
use chrono::{NaiveDate, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait, QueryFilter, Set,
    TransactionError, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use validator::Validate;

/// Bounded optimistic-retry budget for lost conditional updates.
const DEFAULT_RETRY_LIMIT: u32 = 3;

/// Inbound receipt event: stock arriving from an approved inbound request.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct InboundReceipt {
    pub customer_id: String,
    pub product_name: String,
    pub barcode: String,
    #[validate(range(min = 1))]
    pub quantity: i32,
    pub location: Option<String>,
    pub expiration_date: Option<NaiveDate>,
    /// Reorder threshold applied when the receipt creates a new lot.
    #[validate(range(min = 0))]
    pub safe_quantity: i32,
}

/// Manual stock correction: sets an absolute quantity and location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockAdjustment {
    pub stock_record_id: i64,
    pub new_quantity: i32,
    pub new_location: Option<String>,
    /// ManualAdjustment or LocationMove; a zero quantity change with a
    /// location change is recorded as LocationMove regardless.
    pub reason: LedgerReason,
}

/// Availability snapshot for one (customer, product).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAvailability {
    /// Sum of lot quantities on hand.
    pub physical: i32,
    /// Sum of requested quantities held by pending (unshipped) order lines.
    pub allocated: i32,
    /// physical - allocated; negative means pending orders already overrun stock.
    pub available: i32,
}

#[derive(Clone)]
pub struct ReconciliationService {
    db_pool: Arc<DbPool>,
    event_sender: EventSender,
    retry_limit: u32,
}

impl ReconciliationService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self {
            db_pool,
            event_sender,
            retry_limit: DEFAULT_RETRY_LIMIT,
        }
    }

    pub fn with_retry_limit(mut self, retry_limit: u32) -> Self {
        self.retry_limit = retry_limit.max(1);
        self
    }

    /// Wires a service from loaded configuration, applying `cas_retry_limit`.
    pub fn from_config(db_pool: Arc<DbPool>, event_sender: EventSender, cfg: &AppConfig) -> Self {
        Self::new(db_pool, event_sender).with_retry_limit(cfg.cas_retry_limit)
    }

    /// Applies an inbound receipt: restocks the matching lot, or creates one
    /// for a new identity key. An insert race against a concurrent receipt is
    /// retried as a restock update instead of surfacing `DuplicateKey`.
    #[instrument(skip(self, receipt), fields(customer_id = %receipt.customer_id, barcode = %receipt.barcode, quantity = receipt.quantity))]
    pub async fn receive_inbound(
        &self,
        receipt: InboundReceipt,
        actor: &str,
    ) -> Result<stock_record::Model, ServiceError> {
        if receipt.quantity <= 0 {
            return Err(ServiceError::InvalidQuantity(format!(
                "inbound quantity must be positive, got {}",
                receipt.quantity
            )));
        }
        receipt.validate()?;

        let mut attempt = 1;
        let (record, restock) = loop {
            match self.try_receive(&receipt, actor).await {
                Ok(outcome) => break outcome,
                Err(e) if e.is_retryable() && attempt < self.retry_limit => {
                    warn!(attempt, error = %e, "inbound receipt lost a race; retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        };

        info!(
            stock_record_id = record.id,
            restock, "inbound receipt committed"
        );
        self.event_sender
            .send(Event::StockReceived {
                stock_record_id: record.id,
                customer_id: record.customer_id.clone(),
                barcode: record.barcode.clone(),
                quantity: receipt.quantity,
                restock,
            })
            .await
            .map_err(ServiceError::EventError)?;

        Ok(record)
    }

    async fn try_receive(
        &self,
        receipt: &InboundReceipt,
        actor: &str,
    ) -> Result<(stock_record::Model, bool), ServiceError> {
        let receipt = receipt.clone();
        let actor = actor.to_string();
        self.db_pool
            .transaction::<_, (stock_record::Model, bool), ServiceError>(move |txn| {
                Box::pin(async move {
                    let existing = stock_store::find_by_key(
                        txn,
                        &receipt.customer_id,
                        &receipt.barcode,
                        receipt.expiration_date,
                    )
                    .await?;

                    match existing {
                        Some(current) => {
                            let updated = stock_store::apply_delta(
                                txn,
                                &current,
                                receipt.quantity,
                                Some(receipt.location.clone()),
                            )
                            .await?;
                            ledger::append(
                                txn,
                                LedgerWrite {
                                    stock_record_id: current.id,
                                    customer_id: current.customer_id.clone(),
                                    product_name: current.product_name.clone(),
                                    previous_quantity: current.quantity,
                                    change_quantity: receipt.quantity,
                                    previous_location: current.location.clone(),
                                    new_location: updated.location.clone(),
                                    reason: LedgerReason::ReceiptRestock,
                                    actor,
                                },
                            )
                            .await?;
                            Ok((updated, true))
                        }
                        None => {
                            let created = stock_store::create(
                                txn,
                                NewStockRecord {
                                    customer_id: receipt.customer_id.clone(),
                                    product_name: receipt.product_name.clone(),
                                    barcode: receipt.barcode.clone(),
                                    location: receipt.location.clone(),
                                    expiration_date: receipt.expiration_date,
                                    quantity: receipt.quantity,
                                    safe_quantity: receipt.safe_quantity,
                                },
                            )
                            .await?;
                            ledger::append(
                                txn,
                                LedgerWrite {
                                    stock_record_id: created.id,
                                    customer_id: created.customer_id.clone(),
                                    product_name: created.product_name.clone(),
                                    previous_quantity: 0,
                                    change_quantity: receipt.quantity,
                                    previous_location: None,
                                    new_location: created.location.clone(),
                                    reason: LedgerReason::ReceiptNew,
                                    actor,
                                },
                            )
                            .await?;
                            Ok((created, false))
                        }
                    }
                })
            })
            .await
            .map_err(unwrap_txn_err)
    }

    /// Ships an order batch. Planning and debiting happen in one transaction:
    /// any shortfall on any line rejects the whole batch with zero mutations.
    #[instrument(skip(self, lines), fields(lines = lines.len()))]
    pub async fn ship_order(
        &self,
        lines: &[OrderLine],
        actor: &str,
    ) -> Result<Vec<ledger_entry::Model>, ServiceError> {
        if lines.is_empty() {
            return Err(ServiceError::Validation("shipment batch is empty".to_string()));
        }
        for line in lines {
            if line.requested_quantity <= 0 {
                return Err(ServiceError::InvalidQuantity(format!(
                    "order {} line {}: requested quantity must be positive",
                    line.order_number, line.barcode
                )));
            }
        }

        let mut attempt = 1;
        let entries = loop {
            match self.try_ship(lines, actor).await {
                Ok(entries) => break entries,
                Err(e) if e.is_retryable() && attempt < self.retry_limit => {
                    warn!(attempt, error = %e, "shipment lost a race; replanning");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        };

        let order_numbers = distinct_order_numbers(lines);
        info!(
            ?order_numbers,
            ledger_entries = entries.len(),
            "shipment committed"
        );
        self.event_sender
            .send(Event::OrderShipped {
                order_numbers,
                ledger_entries: entries.len(),
            })
            .await
            .map_err(ServiceError::EventError)?;

        Ok(entries)
    }

    async fn try_ship(
        &self,
        lines: &[OrderLine],
        actor: &str,
    ) -> Result<Vec<ledger_entry::Model>, ServiceError> {
        let lines = lines.to_vec();
        let actor = actor.to_string();
        self.db_pool
            .transaction::<_, Vec<ledger_entry::Model>, ServiceError>(move |txn| {
                Box::pin(async move {
                    // Plan every line before any mutation; a shortfall
                    // anywhere rejects the whole batch. Lines may share lots,
                    // so planning runs against a working view that carries
                    // each line's takes forward: an over-request across lines
                    // is a shortfall, and each take records the quantity the
                    // lot will actually hold when its debit runs.
                    let mut working: HashMap<i64, stock_record::Model> = HashMap::new();
                    let mut planned: Vec<(OrderLine, Vec<(stock_record::Model, i32)>)> =
                        Vec::with_capacity(lines.len());
                    for line in &lines {
                        let lots: Vec<stock_record::Model> =
                            stock_store::find_lots(txn, &line.customer_id, &line.barcode)
                                .await?
                                .into_iter()
                                .map(|l| working.get(&l.id).cloned().unwrap_or(l))
                                .collect();
                        let plan = allocation::plan(line, &lots);
                        if !plan.is_satisfied() {
                            return Err(ServiceError::InsufficientStock(format!(
                                "order {} product {} short by {}",
                                line.order_number, line.barcode, plan.shortfall
                            )));
                        }
                        let mut takes = Vec::with_capacity(plan.allocations.len());
                        for alloc in &plan.allocations {
                            let lot = lots
                                .iter()
                                .find(|l| l.id == alloc.stock_record_id)
                                .cloned()
                                .ok_or_else(|| {
                                    ServiceError::Internal(format!(
                                        "planned lot {} missing from fetched set",
                                        alloc.stock_record_id
                                    ))
                                })?;
                            let mut after_take = lot.clone();
                            after_take.quantity -= alloc.quantity_taken;
                            working.insert(lot.id, after_take);
                            takes.push((lot, alloc.quantity_taken));
                        }
                        planned.push((line.clone(), takes));
                    }

                    let mut entries = Vec::new();
                    for (line, takes) in planned {
                        for (lot, take) in takes {
                            let updated = stock_store::apply_delta(txn, &lot, -take, None).await?;
                            let entry = ledger::append(
                                txn,
                                LedgerWrite {
                                    stock_record_id: lot.id,
                                    customer_id: lot.customer_id.clone(),
                                    product_name: lot.product_name.clone(),
                                    previous_quantity: lot.quantity,
                                    change_quantity: -take,
                                    previous_location: lot.location.clone(),
                                    new_location: updated.location.clone(),
                                    reason: LedgerReason::Shipment,
                                    actor: actor.clone(),
                                },
                            )
                            .await?;
                            entries.push(entry);

                            // Shipment->lot linkage so a cancellation can
                            // credit back exactly these lots.
                            let linkage = shipment_allocation::ActiveModel {
                                order_number: Set(line.order_number.clone()),
                                customer_id: Set(line.customer_id.clone()),
                                barcode: Set(line.barcode.clone()),
                                stock_record_id: Set(lot.id),
                                quantity: Set(take),
                                cancelled_at: Set(None),
                                created_at: Set(Utc::now()),
                                ..Default::default()
                            };
                            linkage.insert(txn).await?;
                        }
                        mark_order_lines(
                            txn,
                            &line,
                            OrderLineStatus::Pending,
                            OrderLineStatus::Shipped,
                        )
                        .await?;
                    }
                    Ok(entries)
                })
            })
            .await
            .map_err(unwrap_txn_err)
    }

    /// Manual stock correction. A no-op adjustment (same quantity, same
    /// location) commits nothing and appends no ledger entry.
    #[instrument(skip(self, adjustment), fields(stock_record_id = adjustment.stock_record_id))]
    pub async fn adjust_stock(
        &self,
        adjustment: StockAdjustment,
        actor: &str,
    ) -> Result<(stock_record::Model, Option<ledger_entry::Model>), ServiceError> {
        if adjustment.new_quantity < 0 {
            return Err(ServiceError::NegativeStock(format!(
                "stock record {}: target quantity {} is negative",
                adjustment.stock_record_id, adjustment.new_quantity
            )));
        }
        if !matches!(
            adjustment.reason,
            LedgerReason::ManualAdjustment | LedgerReason::LocationMove
        ) {
            return Err(ServiceError::Validation(
                "adjustment reason must be ManualAdjustment or LocationMove".to_string(),
            ));
        }

        let mut attempt = 1;
        let (record, entry) = loop {
            // Each retry recomputes the change against the fresh quantity.
            match self.try_adjust(&adjustment, actor).await {
                Ok(outcome) => break outcome,
                Err(e) if e.is_retryable() && attempt < self.retry_limit => {
                    warn!(attempt, error = %e, "adjustment lost a race; retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        };

        if let Some(entry) = &entry {
            let event = if entry.reason == LedgerReason::LocationMove {
                Event::StockMoved {
                    stock_record_id: record.id,
                    previous_location: entry.previous_location.clone(),
                    new_location: entry.new_location.clone(),
                }
            } else {
                Event::StockAdjusted {
                    stock_record_id: record.id,
                    previous_quantity: entry.previous_quantity,
                    new_quantity: entry.new_quantity,
                }
            };
            self.event_sender
                .send(event)
                .await
                .map_err(ServiceError::EventError)?;
        }

        Ok((record, entry))
    }

    async fn try_adjust(
        &self,
        adjustment: &StockAdjustment,
        actor: &str,
    ) -> Result<(stock_record::Model, Option<ledger_entry::Model>), ServiceError> {
        let adjustment = adjustment.clone();
        let actor = actor.to_string();
        self.db_pool
            .transaction::<_, (stock_record::Model, Option<ledger_entry::Model>), ServiceError>(
                move |txn| {
                    Box::pin(async move {
                        let current =
                            stock_store::find_by_id(txn, adjustment.stock_record_id)
                                .await?
                                .ok_or_else(|| {
                                    ServiceError::NotFound(format!(
                                        "stock record {}",
                                        adjustment.stock_record_id
                                    ))
                                })?;

                        let change = adjustment.new_quantity - current.quantity;
                        let location_changed = current.location != adjustment.new_location;
                        if change == 0 && !location_changed {
                            return Ok((current, None));
                        }

                        // Zero change with a location change is a pure move,
                        // whatever reason the caller supplied.
                        let reason = if change == 0 {
                            LedgerReason::LocationMove
                        } else {
                            LedgerReason::ManualAdjustment
                        };

                        let updated = stock_store::apply_delta(
                            txn,
                            &current,
                            change,
                            Some(adjustment.new_location.clone()),
                        )
                        .await?;
                        let entry = ledger::append(
                            txn,
                            LedgerWrite {
                                stock_record_id: current.id,
                                customer_id: current.customer_id.clone(),
                                product_name: current.product_name.clone(),
                                previous_quantity: current.quantity,
                                change_quantity: change,
                                previous_location: current.location.clone(),
                                new_location: updated.location.clone(),
                                reason,
                                actor,
                            },
                        )
                        .await?;

                        Ok((updated, Some(entry)))
                    })
                },
            )
            .await
            .map_err(unwrap_txn_err)
    }

    /// Reverses a prior shipment. Lots debited by the original shipment are
    /// credited back exactly via the shipment->lot linkage; when no live
    /// linkage exists the credit falls back to the most-recently-dated
    /// matching lot (or any matching lot if none is dated).
    #[instrument(skip(self, lines), fields(lines = lines.len()))]
    pub async fn cancel_shipment(
        &self,
        lines: &[OrderLine],
        actor: &str,
    ) -> Result<Vec<ledger_entry::Model>, ServiceError> {
        if lines.is_empty() {
            return Err(ServiceError::Validation(
                "cancellation batch is empty".to_string(),
            ));
        }

        let mut attempt = 1;
        let entries = loop {
            match self.try_cancel(lines, actor).await {
                Ok(entries) => break entries,
                Err(e) if e.is_retryable() && attempt < self.retry_limit => {
                    warn!(attempt, error = %e, "cancellation lost a race; retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        };

        let quantity_credited = entries.iter().map(|e| e.change_quantity).sum();
        self.event_sender
            .send(Event::ShipmentCancelled {
                order_numbers: distinct_order_numbers(lines),
                quantity_credited,
            })
            .await
            .map_err(ServiceError::EventError)?;

        Ok(entries)
    }

    async fn try_cancel(
        &self,
        lines: &[OrderLine],
        actor: &str,
    ) -> Result<Vec<ledger_entry::Model>, ServiceError> {
        let lines = lines.to_vec();
        let actor = actor.to_string();
        self.db_pool
            .transaction::<_, Vec<ledger_entry::Model>, ServiceError>(move |txn| {
                Box::pin(async move {
                    let mut entries = Vec::new();
                    for line in &lines {
                        let live_allocations = ShipmentAllocation::find()
                            .filter(
                                shipment_allocation::Column::OrderNumber.eq(line.order_number.as_str()),
                            )
                            .filter(shipment_allocation::Column::Barcode.eq(line.barcode.as_str()))
                            .filter(shipment_allocation::Column::CancelledAt.is_null())
                            .all(txn)
                            .await?;

                        if live_allocations.is_empty() {
                            let entry = credit_heuristic_lot(txn, line, &actor).await?;
                            entries.push(entry);
                        } else {
                            for alloc in live_allocations {
                                let lot = stock_store::find_by_id(txn, alloc.stock_record_id)
                                    .await?
                                    .ok_or_else(|| {
                                        ServiceError::NotFound(format!(
                                            "stock record {}",
                                            alloc.stock_record_id
                                        ))
                                    })?;
                                let updated =
                                    stock_store::apply_delta(txn, &lot, alloc.quantity, None)
                                        .await?;
                                let entry = ledger::append(
                                    txn,
                                    LedgerWrite {
                                        stock_record_id: lot.id,
                                        customer_id: lot.customer_id.clone(),
                                        product_name: lot.product_name.clone(),
                                        previous_quantity: lot.quantity,
                                        change_quantity: alloc.quantity,
                                        previous_location: lot.location.clone(),
                                        new_location: updated.location.clone(),
                                        reason: LedgerReason::ShipmentCancelled,
                                        actor: actor.clone(),
                                    },
                                )
                                .await?;
                                entries.push(entry);

                                let mut active: shipment_allocation::ActiveModel = alloc.into();
                                active.cancelled_at = Set(Some(Utc::now()));
                                active.update(txn).await?;
                            }
                        }

                        mark_order_lines(
                            txn,
                            line,
                            OrderLineStatus::Shipped,
                            OrderLineStatus::Pending,
                        )
                        .await?;
                    }
                    Ok(entries)
                })
            })
            .await
            .map_err(unwrap_txn_err)
    }

    /// Read-only planning: always returns a plan, possibly with shortfall.
    pub async fn plan_allocation(&self, line: &OrderLine) -> Result<AllocationPlan, ServiceError> {
        allocation::plan_for_line(self.db_pool.as_ref(), line).await
    }

    /// Availability for order-entry screens: physical stock minus quantities
    /// held by pending (unshipped) order lines.
    pub async fn stock_availability(
        &self,
        customer_id: &str,
        barcode: &str,
    ) -> Result<StockAvailability, ServiceError> {
        let db = self.db_pool.as_ref();

        let lots = stock_store::find_lots(db, customer_id, barcode).await?;
        let physical: i32 = lots.iter().map(|l| l.quantity).sum();

        let pending = OrderLineEntity::find()
            .filter(order_line::Column::CustomerId.eq(customer_id))
            .filter(order_line::Column::Barcode.eq(barcode))
            .filter(order_line::Column::Status.eq(OrderLineStatus::Pending))
            .all(db)
            .await?;
        let allocated: i32 = pending.iter().map(|l| l.requested_quantity).sum();

        Ok(StockAvailability {
            physical,
            allocated,
            available: physical - allocated,
        })
    }

    /// Registers marketplace order lines as Pending so they count against
    /// availability until shipped.
    #[instrument(skip(self, lines), fields(lines = lines.len()))]
    pub async fn register_order_lines(
        &self,
        lines: &[OrderLine],
    ) -> Result<Vec<order_line::Model>, ServiceError> {
        for line in lines {
            if line.requested_quantity <= 0 {
                return Err(ServiceError::InvalidQuantity(format!(
                    "order {} line {}: requested quantity must be positive",
                    line.order_number, line.barcode
                )));
            }
        }

        let db = self.db_pool.as_ref();
        let mut registered = Vec::with_capacity(lines.len());
        for line in lines {
            let now = Utc::now();
            let active = order_line::ActiveModel {
                order_number: Set(line.order_number.clone()),
                customer_id: Set(line.customer_id.clone()),
                barcode: Set(line.barcode.clone()),
                requested_quantity: Set(line.requested_quantity),
                target_stock_record_id: Set(line.target_stock_record_id),
                status: Set(OrderLineStatus::Pending),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            };
            registered.push(active.insert(db).await?);
        }
        Ok(registered)
    }
}

/// Fallback credit when a cancellation has no recorded lot linkage: the
/// most-recently-dated matching lot, or any matching lot if none is dated.
async fn credit_heuristic_lot(
    txn: &DatabaseTransaction,
    line: &OrderLine,
    actor: &str,
) -> Result<ledger_entry::Model, ServiceError> {
    let lots = stock_store::find_lots(txn, &line.customer_id, &line.barcode).await?;
    let lot = lots
        .iter()
        .filter(|l| l.expiration_date.is_some())
        .max_by_key(|l| l.expiration_date)
        .or_else(|| lots.first())
        .cloned()
        .ok_or_else(|| {
            ServiceError::NotFound(format!(
                "no stock record for {}/{}",
                line.customer_id, line.barcode
            ))
        })?;

    let updated = stock_store::apply_delta(txn, &lot, line.requested_quantity, None).await?;
    ledger::append(
        txn,
        LedgerWrite {
            stock_record_id: lot.id,
            customer_id: lot.customer_id.clone(),
            product_name: lot.product_name.clone(),
            previous_quantity: lot.quantity,
            change_quantity: line.requested_quantity,
            previous_location: lot.location.clone(),
            new_location: updated.location.clone(),
            reason: LedgerReason::ShipmentCancelled,
            actor: actor.to_string(),
        },
    )
    .await
}

/// Flips registered order-line rows between statuses; rows for unregistered
/// orders simply do not exist, which is fine.
async fn mark_order_lines(
    txn: &DatabaseTransaction,
    line: &OrderLine,
    from: OrderLineStatus,
    to: OrderLineStatus,
) -> Result<(), ServiceError> {
    OrderLineEntity::update_many()
        .col_expr(order_line::Column::Status, Expr::value(to))
        .col_expr(order_line::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(order_line::Column::OrderNumber.eq(line.order_number.as_str()))
        .filter(order_line::Column::Barcode.eq(line.barcode.as_str()))
        .filter(order_line::Column::Status.eq(from))
        .exec(txn)
        .await?;
    Ok(())
}

fn distinct_order_numbers(lines: &[OrderLine]) -> Vec<String> {
    let mut numbers: Vec<String> = Vec::new();
    for line in lines {
        if !numbers.contains(&line.order_number) {
            numbers.push(line.order_number.clone());
        }
    }
    numbers
}

fn unwrap_txn_err(e: TransactionError<ServiceError>) -> ServiceError {
    match e {
        TransactionError::Connection(db_err) => ServiceError::Database(db_err),
        TransactionError::Transaction(service_err) => service_err,
    }
}

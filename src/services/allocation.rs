//! Allocation Planner: given an order line, decide which lots to draw from.
//!
//! Policy is FEFO (first-expire-first-out): dated lots soonest-first, undated
//! lots only after all dated stock is exhausted. An explicit lot pin on the
//! order line bypasses FEFO entirely. Planning is a pure read-and-compute
//! step; the Reconciliation Service performs the actual debits.

use crate::entities::stock_record;
use crate::errors::ServiceError;
use crate::services::stock_store;
use sea_orm::ConnectionTrait;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// A requested (product, quantity) pairing belonging to a customer order.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct OrderLine {
    pub order_number: String,
    pub customer_id: String,
    pub barcode: String,
    #[validate(range(min = 1))]
    pub requested_quantity: i32,
    /// Pins allocation to one specific lot, overriding FEFO.
    pub target_stock_record_id: Option<i64>,
}

/// One (lot, quantity taken) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationResult {
    pub stock_record_id: i64,
    pub quantity_taken: i32,
}

/// Outcome of planning one order line.
///
/// Invariant: the sum of `quantity_taken` across `allocations` plus
/// `shortfall` equals `requested_quantity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationPlan {
    pub requested_quantity: i32,
    pub allocations: Vec<AllocationResult>,
    pub shortfall: i32,
}

impl AllocationPlan {
    pub fn is_satisfied(&self) -> bool {
        self.shortfall == 0
    }

    pub fn total_taken(&self) -> i32 {
        self.allocations.iter().map(|a| a.quantity_taken).sum()
    }
}

/// Plans one order line against the given lots. Pure: never mutates state.
/// Zero-quantity lots are never selected and never error.
pub fn plan(line: &OrderLine, lots: &[stock_record::Model]) -> AllocationPlan {
    let requested = line.requested_quantity;
    let mut allocations = Vec::new();
    let mut remaining = requested;

    if let Some(target_id) = line.target_stock_record_id {
        // Pinned lot: allocate from that lot only; any remainder is shortfall.
        if let Some(lot) = lots.iter().find(|l| l.id == target_id && l.quantity > 0) {
            let take = lot.quantity.min(remaining);
            allocations.push(AllocationResult {
                stock_record_id: lot.id,
                quantity_taken: take,
            });
            remaining -= take;
        }
        return AllocationPlan {
            requested_quantity: requested,
            allocations,
            shortfall: remaining,
        };
    }

    let mut candidates: Vec<&stock_record::Model> =
        lots.iter().filter(|l| l.quantity > 0).collect();
    // FEFO: soonest expiration first, undated lots last, id as tie-breaker.
    candidates.sort_by_key(|l| (l.expiration_date.is_none(), l.expiration_date, l.id));

    for lot in candidates {
        if remaining == 0 {
            break;
        }
        let take = lot.quantity.min(remaining);
        allocations.push(AllocationResult {
            stock_record_id: lot.id,
            quantity_taken: take,
        });
        remaining -= take;
    }

    AllocationPlan {
        requested_quantity: requested,
        allocations,
        shortfall: remaining,
    }
}

/// Fetches the line's lots and plans against them.
pub async fn plan_for_line<C: ConnectionTrait>(
    db: &C,
    line: &OrderLine,
) -> Result<AllocationPlan, ServiceError> {
    let lots = stock_store::find_lots(db, &line.customer_id, &line.barcode).await?;
    Ok(plan(line, &lots))
}

//! Warehouse Ledger Library
//!
//! Inventory ledger and allocation engine: keeps stock quantities, locations,
//! and an immutable change history consistent across inbound receipts,
//! outbound shipments, manual adjustments, and shipment cancellations.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod migrator;
pub mod services;

pub use errors::ServiceError;
pub use services::allocation::{AllocationPlan, AllocationResult, OrderLine};
pub use services::reconciliation::ReconciliationService;

pub mod allocation;
pub mod ledger;
pub mod reconciliation;
pub mod stock_store;

pub mod ledger_entry;
pub mod order_line;
pub mod shipment_allocation;
pub mod stock_record;

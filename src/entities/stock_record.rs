use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One physical lot: a quantity of one product for one customer, at one
/// location, with one (or no) expiration date. Identity key is
/// (customer_id, barcode, expiration_date); an absent expiration is its own
/// key value. Rows are never deleted — zero-quantity lots persist for reorder
/// visibility.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_records")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub customer_id: String,
    pub product_name: String,
    pub barcode: String,
    pub location: Option<String>,
    pub expiration_date: Option<NaiveDate>,
    pub quantity: i32,
    pub safe_quantity: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::ledger_entry::Entity")]
    LedgerEntries,
    #[sea_orm(has_many = "super::shipment_allocation::Entity")]
    ShipmentAllocations,
}

impl Related<super::ledger_entry::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LedgerEntries.def()
    }
}

impl Related<super::shipment_allocation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ShipmentAllocations.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Quantity at or below the reorder threshold.
    pub fn needs_reorder(&self) -> bool {
        self.quantity <= self.safe_quantity
    }

    pub fn is_undated(&self) -> bool {
        self.expiration_date.is_none()
    }
}

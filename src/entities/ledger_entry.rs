use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why a stock record changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum LedgerReason {
    /// First inbound receipt for a new identity key.
    #[sea_orm(string_value = "ReceiptNew")]
    ReceiptNew,
    /// Inbound receipt onto an existing lot.
    #[sea_orm(string_value = "ReceiptRestock")]
    ReceiptRestock,
    #[sea_orm(string_value = "Shipment")]
    Shipment,
    #[sea_orm(string_value = "ShipmentCancelled")]
    ShipmentCancelled,
    #[sea_orm(string_value = "ManualAdjustment")]
    ManualAdjustment,
    /// Zero quantity change, location differs.
    #[sea_orm(string_value = "LocationMove")]
    LocationMove,
}

/// Immutable record of one quantity or location change to a stock record.
/// Created exactly once per reconciliation action (one per split lot for
/// outbound shipments); never mutated or deleted. The durable audit trail.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_ledger_entries")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub stock_record_id: i64,
    pub customer_id: String,
    pub product_name: String,
    pub previous_quantity: i32,
    pub change_quantity: i32,
    pub new_quantity: i32,
    pub previous_location: Option<String>,
    pub new_location: Option<String>,
    pub reason: LedgerReason,
    pub actor: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::stock_record::Entity",
        from = "Column::StockRecordId",
        to = "super::stock_record::Column::Id"
    )]
    StockRecord,
}

impl Related<super::stock_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockRecord.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, _insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        if let ActiveValue::NotSet = active_model.created_at {
            active_model.created_at = Set(Utc::now());
        }
        Ok(active_model)
    }
}

impl Model {
    /// Per-entry invariant: new = previous + change.
    pub fn is_balanced(&self) -> bool {
        self.new_quantity == self.previous_quantity + self.change_quantity
    }

    pub fn is_location_move(&self) -> bool {
        self.change_quantity == 0 && self.previous_location != self.new_location
    }
}

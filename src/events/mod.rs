use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;

/// Domain events published after each committed reconciliation action.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub enum Event {
    StockReceived {
        stock_record_id: i64,
        customer_id: String,
        barcode: String,
        quantity: i32,
        restock: bool,
    },
    OrderShipped {
        order_numbers: Vec<String>,
        ledger_entries: usize,
    },
    StockAdjusted {
        stock_record_id: i64,
        previous_quantity: i32,
        new_quantity: i32,
    },
    StockMoved {
        stock_record_id: i64,
        previous_location: Option<String>,
        new_location: Option<String>,
    },
    ShipmentCancelled {
        order_numbers: Vec<String>,
        quantity_credited: i32,
    },
}

/// Builds the domain event channel; `buffer_size` comes from
/// `AppConfig::event_buffer_size`.
pub fn channel(buffer_size: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(buffer_size.max(1));
    (EventSender::new(tx), rx)
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Drains the event channel, logging each event. Collaborating systems
/// (notifications, marketplace sync) hook in here.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::StockReceived {
                stock_record_id,
                quantity,
                restock,
                ..
            } => {
                info!(
                    stock_record_id,
                    quantity, restock, "inbound receipt committed"
                );
            }
            Event::OrderShipped {
                order_numbers,
                ledger_entries,
            } => {
                info!(?order_numbers, ledger_entries, "shipment committed");
            }
            Event::StockAdjusted {
                stock_record_id,
                previous_quantity,
                new_quantity,
            } => {
                info!(
                    stock_record_id,
                    previous_quantity, new_quantity, "manual adjustment committed"
                );
            }
            Event::StockMoved {
                stock_record_id, ..
            } => {
                info!(stock_record_id, "location move committed");
            }
            Event::ShipmentCancelled {
                order_numbers,
                quantity_credited,
            } => {
                info!(
                    ?order_numbers,
                    quantity_credited, "shipment cancellation committed"
                );
            }
        }
    }

    info!("Event channel closed; processing loop stopped");
}

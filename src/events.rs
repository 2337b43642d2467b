use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

/// Events emitted by the service layer after their transaction commits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    PaymentCaptured {
        payment_id: Uuid,
        order_id: Uuid,
    },
    PaymentFailed {
        payment_id: Uuid,
        order_id: Uuid,
    },
    StockDeducted {
        product_id: Uuid,
        quantity: i32,
    },
    StockAdjusted {
        product_id: Uuid,
        delta: i32,
    },
    PriceChanged {
        product_id: Uuid,
        old_price: Decimal,
        new_price: Decimal,
    },
    CartLocked(Uuid),
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event. Failures are reported as strings so callers can decide
    /// whether to log or propagate; they never abort a committed operation.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {e}"))
    }
}

/// Creates a connected sender/receiver pair with the given channel capacity.
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender::new(tx), rx)
}

/// Drains the event channel, logging each event. Downstream consumers
/// (webhooks, projections) would hang off this loop.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    info!("Event processor started");
    while let Some(event) = receiver.recv().await {
        debug!(?event, "event received");
    }
    info!("Event processor stopped");
}

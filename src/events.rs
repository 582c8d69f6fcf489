//! Domain events emitted after a ledger transaction commits.
//!
//! Events are best-effort notifications for downstream consumers; they are
//! sent only after the store transaction has committed, and a send failure
//! can never un-commit it. Services log and continue when the channel is
//! unavailable.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

/// Events that can occur in the ledger core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    BookCheckedOut {
        book_id: Uuid,
        loan_id: Uuid,
        borrower_id: Uuid,
    },
    BookReturned {
        book_id: Uuid,
        loan_id: Uuid,
    },
    ItemIssued {
        item_id: Uuid,
        issuance_id: Uuid,
        quantity: i32,
    },
    OrderPlaced {
        order_id: Uuid,
        order_code: String,
    },
    OrderCompleted(Uuid),
    OrderCancelled(Uuid),
    InvoiceGenerated {
        invoice_id: Uuid,
        student_id: Uuid,
    },
    InvoicePaid {
        invoice_id: Uuid,
        payment_id: Uuid,
    },
    ExamSeatRegistered {
        session_id: Uuid,
        registration_id: Uuid,
    },
    ExamRegistrationCancelled {
        session_id: Uuid,
        registration_id: Uuid,
    },
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

/// Creates a bounded event channel.
pub fn event_channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender::new(tx), rx)
}

/// Drains the event channel, logging each event. Runs until all senders drop.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        info!(?event, "ledger event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_flow_through_channel() {
        let (sender, mut rx) = event_channel(8);
        let order_id = Uuid::new_v4();
        sender
            .send(Event::OrderCompleted(order_id))
            .await
            .expect("send event");

        match rx.recv().await {
            Some(Event::OrderCompleted(id)) => assert_eq!(id, order_id),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn send_fails_after_receiver_drops() {
        let (sender, rx) = event_channel(1);
        drop(rx);
        assert!(sender.send(Event::OrderCancelled(Uuid::new_v4())).await.is_err());
    }

    #[test]
    fn events_serialize() {
        let event = Event::InvoicePaid {
            invoice_id: Uuid::new_v4(),
            payment_id: Uuid::new_v4(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("InvoicePaid"));
    }
}

//! Outbound notifications (managers, suppliers, finance).
//!
//! Delivery is a side effect of an already committed change: a failing
//! notifier is logged and reported as a warning, never rolled back.

use serde::Serialize;
use serde_json::Value as JsonValue;

use galley_core::RestaurantId;
use galley_events::EventBus;

pub const PURCHASE_ORDER_SUBMITTED: &str = "purchase_order.submitted";
pub const PURCHASE_ORDER_SENT: &str = "purchase_order.sent";
pub const PURCHASE_ORDER_SUPPLIER_RESPONDED: &str = "purchase_order.supplier_responded";
pub const BILL_GENERATION_FAILED: &str = "bill.generation_failed";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub restaurant_id: RestaurantId,
    pub topic: String,
    pub payload: JsonValue,
}

impl Notification {
    pub fn new(restaurant_id: RestaurantId, topic: &str, payload: JsonValue) -> Self {
        Self {
            restaurant_id,
            topic: topic.to_string(),
            payload,
        }
    }
}

/// Sink for notifications. Failures are opaque to the caller.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification) -> anyhow::Result<()>;
}

/// Publishes notifications on a bus for whichever sender subscribes.
#[derive(Debug)]
pub struct BusNotifier<B> {
    bus: B,
}

impl<B> BusNotifier<B> {
    pub fn new(bus: B) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<B> Notifier for BusNotifier<B>
where
    B: EventBus<Notification>,
{
    fn notify(&self, notification: Notification) -> anyhow::Result<()> {
        let topic = notification.topic.clone();
        self.bus
            .publish(notification)
            .map_err(|err| anyhow::anyhow!("publishing {topic} failed: {err:?}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use galley_events::InMemoryEventBus;
    use serde_json::json;

    #[test]
    fn bus_notifier_fans_out_to_subscribers() {
        let notifier = BusNotifier::new(InMemoryEventBus::<Notification>::new());
        let sub = notifier.bus().subscribe();
        let restaurant_id = RestaurantId::new();

        notifier
            .notify(Notification::new(
                restaurant_id,
                PURCHASE_ORDER_SUBMITTED,
                json!({ "order_id": "po-1" }),
            ))
            .unwrap();

        let received = sub.drain();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].topic, PURCHASE_ORDER_SUBMITTED);
        assert_eq!(received[0].restaurant_id, restaurant_id);
    }
}

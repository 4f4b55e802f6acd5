//! Process-local bus backed by `std::sync::mpsc` channels.

use std::sync::{Mutex, PoisonError, mpsc};

use crate::bus::{EventBus, Subscription};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InMemoryBusError {
    #[error("subscriber registry lock poisoned")]
    Poisoned,
}

/// Broadcast bus for a single process.
///
/// Every live subscription gets its own copy of each message. Subscriptions
/// whose receiver was dropped are pruned on the next publish.
#[derive(Debug)]
pub struct InMemoryEventBus<M> {
    senders: Mutex<Vec<mpsc::Sender<M>>>,
}

impl<M> InMemoryEventBus<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscriptions registered and not yet known to be dropped.
    pub fn subscriber_count(&self) -> usize {
        self.senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl<M> Default for InMemoryEventBus<M> {
    fn default() -> Self {
        Self {
            senders: Mutex::new(Vec::new()),
        }
    }
}

impl<M> EventBus<M> for InMemoryEventBus<M>
where
    M: Clone + Send + 'static,
{
    type Error = InMemoryBusError;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        let mut senders = self.senders.lock().map_err(|_| InMemoryBusError::Poisoned)?;
        let Some((last, rest)) = senders.split_last() else {
            return Ok(());
        };

        let mut dead = Vec::new();
        for (idx, tx) in rest.iter().enumerate() {
            if tx.send(message.clone()).is_err() {
                dead.push(idx);
            }
        }
        if last.send(message).is_err() {
            dead.push(rest.len());
        }

        for idx in dead.into_iter().rev() {
            senders.swap_remove(idx);
        }
        Ok(())
    }

    fn subscribe(&self) -> Subscription<M> {
        let (tx, rx) = mpsc::channel();
        self.senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        Subscription::new(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fans_out_to_every_live_subscriber() {
        let bus = InMemoryEventBus::<u32>::new();
        let a = bus.subscribe();
        let b = bus.subscribe();
        drop(bus.subscribe());
        assert_eq!(bus.subscriber_count(), 3);

        bus.publish(7).unwrap();
        bus.publish(8).unwrap();

        assert_eq!(a.drain(), vec![7, 8]);
        assert_eq!(b.drain(), vec![7, 8]);
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[test]
    fn publishing_without_subscribers_is_a_no_op() {
        let bus = InMemoryEventBus::<String>::new();
        bus.publish("nobody listening".to_string()).unwrap();

        let late = bus.subscribe();
        assert!(late.drain().is_empty());
    }
}

use std::sync::{Arc, Mutex, PoisonError};

use crossbeam_channel::{Receiver, Sender, unbounded};

/// Fan-out bus: every subscriber gets its own unbounded channel.
///
/// Subscribers whose receiver has been dropped are pruned on the next
/// broadcast.
#[derive(Clone)]
pub struct EventBus<E: Clone> {
    subscribers: Arc<Mutex<Vec<Sender<E>>>>,
}

impl<E: Clone> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Clone> EventBus<E> {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn subscribe(&self) -> Receiver<E> {
        let (tx, rx) = unbounded::<E>();
        {
            let mut subscribers = self
                .subscribers
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            subscribers.push(tx);
        }
        rx
    }

    pub fn broadcast(&self, event: E) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_subscriber_receives_in_order() {
        let bus = EventBus::<u32>::new();
        let first = bus.subscribe();
        let second = bus.subscribe();

        bus.broadcast(1);
        bus.broadcast(2);

        assert_eq!(first.try_iter().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(second.try_iter().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_dropped_subscribers_are_pruned() {
        let bus = EventBus::<&'static str>::new();
        let kept = bus.subscribe();
        drop(bus.subscribe());
        assert_eq!(bus.subscriber_count(), 2);

        bus.broadcast("ping");

        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(kept.try_recv().ok(), Some("ping"));
    }
}

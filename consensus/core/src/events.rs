use crate::block::Block;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::Arc;

/// Chain reorganization outcome events emitted after a successful append.
#[derive(Clone, Debug)]
pub enum ChainEvent {
    /// The appended block became the new canonical head.
    Head(Arc<Block>),
    /// The appended block extends a side chain.
    Side(Arc<Block>),
}

/// A multi-subscriber broadcast feed. Senders for dropped receivers are
/// pruned on the next send.
pub struct Feed<T: Clone> {
    subscribers: Mutex<Vec<Sender<T>>>,
}

impl<T: Clone> Default for Feed<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Feed<T> {
    pub fn new() -> Self {
        Self { subscribers: Mutex::new(Vec::new()) }
    }

    pub fn subscribe(&self) -> Receiver<T> {
        let (sender, receiver) = unbounded();
        self.subscribers.lock().push(sender);
        receiver
    }

    pub fn send(&self, event: T) {
        self.subscribers.lock().retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_broadcasts_to_all_subscribers() {
        let feed: Feed<u32> = Feed::new();
        let a = feed.subscribe();
        let b = feed.subscribe();
        feed.send(7);
        assert_eq!(a.try_recv().unwrap(), 7);
        assert_eq!(b.try_recv().unwrap(), 7);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let feed: Feed<u32> = Feed::new();
        let a = feed.subscribe();
        drop(feed.subscribe());
        feed.send(1);
        feed.send(2);
        assert_eq!(a.try_recv().unwrap(), 1);
    }
}

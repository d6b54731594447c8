//! Fan-out of shelf state changes
//!
//! Every shelf the dispatcher marks closed is posted here. Any number of
//! components may subscribe; each subscriber receives every event posted
//! after it subscribed.
//!
//! ```rust,ignore
//! let notifier = Arc::new(ShelfNotifier::new());
//! let mut rx = notifier.subscribe().await;
//! while let Some(event) = rx.recv().await {
//!     println!("shelf {} closed", event.shelf_id);
//! }
//! ```

use crate::types::ShelfEvent;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, trace};

#[derive(Debug, Default)]
pub struct ShelfNotifier {
    subscribers: RwLock<Vec<mpsc::UnboundedSender<ShelfEvent>>>,
    posted: AtomicU64,
}

impl ShelfNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `event` to all live subscribers
    ///
    /// Subscribers whose receiver has been dropped are removed. Returns the
    /// number of subscribers the event reached.
    pub async fn post(&self, event: ShelfEvent) -> usize {
        self.posted.fetch_add(1, Ordering::Relaxed);

        let mut subscribers = self.subscribers.write().await;
        subscribers.retain(|tx| match tx.send(event.clone()) {
            Ok(()) => true,
            Err(_) => {
                trace!("Removing closed shelf event subscriber");
                false
            }
        });
        trace!(
            shelf_id = event.shelf_id,
            "Posted shelf event to {} subscriber(s)",
            subscribers.len()
        );
        subscribers.len()
    }

    pub async fn subscribe(&self) -> mpsc::UnboundedReceiver<ShelfEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subscribers = self.subscribers.write().await;
        subscribers.push(tx);
        debug!("New shelf event subscriber (total: {})", subscribers.len());
        rx
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// Events posted since creation, delivered or not
    pub fn posted(&self) -> u64 {
        self.posted.load(Ordering::Relaxed)
    }
}

//! Turning notification frames into shelf state changes
//!
//! A frame from cabinet C carrying panel P closes every shelf of C whose
//! column index is P, then refreshes C's last-seen time. Failures are
//! logged and reported in the outcome; nothing here returns an error to the
//! event loop.

use crate::notifier::ShelfNotifier;
use crate::store::CabinetStore;
use crate::types::{CabinetId, ShelfEvent, ShelfId};
use cabinetproto::{parse_notification, NotificationFrame};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, error, info, warn};

/// What happened to one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Matching shelves were marked closed
    Applied { panel_id: u8, shelves: Vec<ShelfId> },
    /// The frame did not carry a panel id
    Unparsed,
    /// No shelf of the cabinet uses this panel
    Unmatched { panel_id: u8 },
    /// The shelf lookup failed in the store
    Failed { panel_id: u8, reason: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub applied: u64,
    pub unparsed: u64,
    pub unmatched: u64,
    pub failed: u64,
}

pub struct NotificationDispatcher {
    store: Arc<dyn CabinetStore>,
    notifier: Arc<ShelfNotifier>,
    stats: DispatchStats,
}

impl NotificationDispatcher {
    pub fn new(store: Arc<dyn CabinetStore>, notifier: Arc<ShelfNotifier>) -> Self {
        Self {
            store,
            notifier,
            stats: DispatchStats::default(),
        }
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    pub async fn dispatch(&mut self, cabinet_id: CabinetId, frame: &NotificationFrame) -> DispatchOutcome {
        let outcome = self.apply(cabinet_id, frame).await;
        match &outcome {
            DispatchOutcome::Applied { .. } => self.stats.applied += 1,
            DispatchOutcome::Unparsed => self.stats.unparsed += 1,
            DispatchOutcome::Unmatched { .. } => self.stats.unmatched += 1,
            DispatchOutcome::Failed { .. } => self.stats.failed += 1,
        }
        outcome
    }

    async fn apply(&self, cabinet_id: CabinetId, frame: &NotificationFrame) -> DispatchOutcome {
        let Some(panel_id) = parse_notification(frame.as_bytes()) else {
            warn!(cabinet_id, hex = %frame.hex(), "Dropping unparseable notification");
            return DispatchOutcome::Unparsed;
        };
        debug!(
            cabinet_id,
            panel_id,
            hex = %frame.hex(),
            "Notification received (function {:#04x})",
            frame.function()
        );

        let shelves = match self.store.shelves_for_panel(cabinet_id, panel_id).await {
            Ok(shelves) => shelves,
            Err(e) => {
                error!(cabinet_id, panel_id, "Shelf lookup failed: {}", e);
                return DispatchOutcome::Failed {
                    panel_id,
                    reason: e.to_string(),
                };
            }
        };

        if shelves.is_empty() {
            warn!(
                cabinet_id,
                panel_id,
                hex = %frame.hex(),
                "No shelf matches notification"
            );
            return DispatchOutcome::Unmatched { panel_id };
        }

        let now = SystemTime::now();
        let mut closed = Vec::with_capacity(shelves.len());
        for shelf in shelves {
            if let Err(e) = self.store.set_shelf_open(shelf.id, false).await {
                error!(cabinet_id, shelf_id = shelf.id, "Failed to mark shelf closed: {}", e);
                continue;
            }
            info!(cabinet_id, panel_id, shelf_id = shelf.id, "Shelf {} closed", shelf.name);
            self.notifier
                .post(ShelfEvent::closed(shelf.id, cabinet_id, panel_id, now))
                .await;
            closed.push(shelf.id);
        }

        if let Err(e) = self.store.touch_cabinet(cabinet_id, now).await {
            error!(cabinet_id, "Failed to refresh last-seen time: {}", e);
        }

        DispatchOutcome::Applied {
            panel_id,
            shelves: closed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ListenerError, Result};
    use crate::store::MemoryStore;
    use crate::types::{Cabinet, Shelf};
    use async_trait::async_trait;

    struct BrokenStore;

    #[async_trait]
    impl CabinetStore for BrokenStore {
        async fn active_cabinets(&self, _only: Option<CabinetId>) -> Result<Vec<Cabinet>> {
            Ok(Vec::new())
        }

        async fn shelves_for_panel(&self, _cabinet_id: CabinetId, _panel_id: u8) -> Result<Vec<Shelf>> {
            Err(ListenerError::Store("database unavailable".into()))
        }

        async fn set_shelf_open(&self, _shelf_id: ShelfId, _is_open: bool) -> Result<()> {
            Ok(())
        }

        async fn touch_cabinet(&self, _cabinet_id: CabinetId, _at: SystemTime) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_store_failure_is_reported_not_raised() {
        let mut dispatcher =
            NotificationDispatcher::new(Arc::new(BrokenStore), Arc::new(ShelfNotifier::new()));
        let outcome = dispatcher.dispatch(1, &NotificationFrame::new(0x01, 2)).await;
        assert!(matches!(outcome, DispatchOutcome::Failed { panel_id: 2, .. }));
        assert_eq!(dispatcher.stats().failed, 1);
    }

    #[tokio::test]
    async fn test_events_posted_for_closed_shelves() {
        let mut open = Shelf::new(5, 1, 3);
        open.is_open = true;
        let store = Arc::new(MemoryStore::with_records(vec![Cabinet::new(1, "10.0.0.1", 8080)], vec![open]));
        let notifier = Arc::new(ShelfNotifier::new());
        let mut rx = notifier.subscribe().await;
        let mut dispatcher = NotificationDispatcher::new(store.clone(), notifier);

        let outcome = dispatcher.dispatch(1, &NotificationFrame::new(0x01, 3)).await;
        assert_eq!(
            outcome,
            DispatchOutcome::Applied {
                panel_id: 3,
                shelves: vec![5]
            }
        );

        let event = rx.recv().await.unwrap();
        assert_eq!((event.shelf_id, event.cabinet_id, event.panel_id), (5, 1, 3));
        assert!(!event.is_open);
        assert!(!store.shelf(5).await.unwrap().is_open);
    }
}

//! Device state consumed and updated by the listener
//!
//! The listener only ever reads cabinets and shelves, flips a shelf's open
//! flag and refreshes a cabinet's last-seen timestamp. Everything else about
//! these records belongs to the administrative side, so the seam is kept to
//! the four calls of [`CabinetStore`].

use crate::error::{ListenerError, Result};
use crate::types::{Cabinet, CabinetId, Shelf, ShelfId};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::SystemTime;
use tokio::sync::RwLock;

#[async_trait]
pub trait CabinetStore: Send + Sync {
    /// All cabinets flagged active, optionally restricted to one id
    async fn active_cabinets(&self, only: Option<CabinetId>) -> Result<Vec<Cabinet>>;

    /// Shelves of `cabinet_id` whose column index equals `panel_id`
    async fn shelves_for_panel(&self, cabinet_id: CabinetId, panel_id: u8) -> Result<Vec<Shelf>>;

    async fn set_shelf_open(&self, shelf_id: ShelfId, is_open: bool) -> Result<()>;

    async fn touch_cabinet(&self, cabinet_id: CabinetId, at: SystemTime) -> Result<()>;
}

#[derive(Debug, Default)]
struct Records {
    cabinets: BTreeMap<CabinetId, Cabinet>,
    shelves: BTreeMap<ShelfId, Shelf>,
}

/// In-memory store, seeded from the fleet configuration
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<Records>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(cabinets: Vec<Cabinet>, shelves: Vec<Shelf>) -> Self {
        Self {
            records: RwLock::new(Records {
                cabinets: cabinets.into_iter().map(|c| (c.id, c)).collect(),
                shelves: shelves.into_iter().map(|s| (s.id, s)).collect(),
            }),
        }
    }

    pub async fn cabinet(&self, id: CabinetId) -> Option<Cabinet> {
        self.records.read().await.cabinets.get(&id).cloned()
    }

    pub async fn shelf(&self, id: ShelfId) -> Option<Shelf> {
        self.records.read().await.shelves.get(&id).cloned()
    }

    pub async fn shelves(&self) -> Vec<Shelf> {
        self.records.read().await.shelves.values().cloned().collect()
    }
}

#[async_trait]
impl CabinetStore for MemoryStore {
    async fn active_cabinets(&self, only: Option<CabinetId>) -> Result<Vec<Cabinet>> {
        let records = self.records.read().await;
        Ok(records
            .cabinets
            .values()
            .filter(|c| c.active)
            .filter(|c| only.map_or(true, |id| c.id == id))
            .cloned()
            .collect())
    }

    async fn shelves_for_panel(&self, cabinet_id: CabinetId, panel_id: u8) -> Result<Vec<Shelf>> {
        let records = self.records.read().await;
        Ok(records
            .shelves
            .values()
            .filter(|s| s.cabinet_id == Some(cabinet_id))
            .filter(|s| s.column_index == u32::from(panel_id))
            .cloned()
            .collect())
    }

    async fn set_shelf_open(&self, shelf_id: ShelfId, is_open: bool) -> Result<()> {
        let mut records = self.records.write().await;
        let shelf = records
            .shelves
            .get_mut(&shelf_id)
            .ok_or(ListenerError::UnknownShelf(shelf_id))?;
        shelf.is_open = is_open;
        Ok(())
    }

    async fn touch_cabinet(&self, cabinet_id: CabinetId, at: SystemTime) -> Result<()> {
        let mut records = self.records.write().await;
        let cabinet = records
            .cabinets
            .get_mut(&cabinet_id)
            .ok_or(ListenerError::UnknownCabinet(cabinet_id))?;
        cabinet.last_seen = Some(at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryStore {
        let mut inactive = Cabinet::new(3, "10.0.0.3", 8080);
        inactive.active = false;
        MemoryStore::with_records(
            vec![
                Cabinet::new(1, "10.0.0.1", 8080),
                Cabinet::new(2, "10.0.0.2", 8080),
                inactive,
            ],
            vec![Shelf::new(10, 1, 2), Shelf::new(11, 1, 2), Shelf::new(12, 2, 2)],
        )
    }

    #[tokio::test]
    async fn test_active_cabinets() {
        let store = store();
        let all: Vec<CabinetId> = store
            .active_cabinets(None)
            .await
            .unwrap()
            .iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(all, vec![1, 2]);

        let one = store.active_cabinets(Some(2)).await.unwrap();
        assert_eq!(one.len(), 1);
        assert!(store.active_cabinets(Some(3)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_shelves_for_panel_scoped_to_cabinet() {
        let store = store();
        let shelves = store.shelves_for_panel(1, 2).await.unwrap();
        let ids: Vec<ShelfId> = shelves.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![10, 11]);
        assert!(store.shelves_for_panel(1, 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_updates() {
        let store = store();
        store.set_shelf_open(10, true).await.unwrap();
        assert!(store.shelf(10).await.unwrap().is_open);

        let now = SystemTime::now();
        store.touch_cabinet(1, now).await.unwrap();
        assert_eq!(store.cabinet(1).await.unwrap().last_seen, Some(now));

        assert!(matches!(
            store.set_shelf_open(99, false).await,
            Err(ListenerError::UnknownShelf(99))
        ));
        assert!(matches!(
            store.touch_cabinet(99, now).await,
            Err(ListenerError::UnknownCabinet(99))
        ));
    }
}

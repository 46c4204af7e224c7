use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;

use super::DedupStore;
use crate::feed::Item;
use crate::{Error, Result};

/// In-process store for tests that run on a paused clock, where the SQLite
/// worker thread would race the auto-advancing timers.
#[derive(Default)]
pub struct MemoryStore {
    items: Mutex<HashMap<String, Item>>,
    deliveries: Mutex<BTreeSet<(String, String)>>,
}

impl MemoryStore {
    pub fn count(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    pub fn get(&self, external_id: &str) -> Option<Item> {
        self.items.lock().unwrap().get(external_id).cloned()
    }

    pub fn delivered_channels(&self, external_id: &str) -> Vec<String> {
        self.deliveries
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == external_id)
            .map(|(_, channel)| channel.clone())
            .collect()
    }
}

#[async_trait]
impl DedupStore for MemoryStore {
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn find_existing(&self, ids: &[String]) -> Result<Vec<Item>> {
        let items = self.items.lock().unwrap();
        Ok(ids.iter().filter_map(|id| items.get(id).cloned()).collect())
    }

    async fn insert(&self, item: &Item) -> Result<i64> {
        let mut items = self.items.lock().unwrap();
        if items.contains_key(&item.external_id) {
            return Err(Error::DuplicateKey(item.external_id.clone()));
        }
        items.insert(item.external_id.clone(), item.clone());
        Ok(items.len() as i64)
    }

    async fn mark_delivered(&self, external_id: &str, channel: &str) -> Result<()> {
        self.deliveries
            .lock()
            .unwrap()
            .insert((external_id.to_string(), channel.to_string()));
        Ok(())
    }

    async fn mark_dispatched(&self, external_id: &str) -> Result<()> {
        if let Some(item) = self.items.lock().unwrap().get_mut(external_id) {
            item.dispatched = true;
        }
        Ok(())
    }
}

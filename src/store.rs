//! Shared round-result store
//!
//! Maps a round identifier (`boxId`) to the random value derived for it by the
//! oracle feed. Written by ingestion, read by any number of workers.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

const INSERT_EVENT_CAPACITY: usize = 4_096;

/// Read capability the bridge needs from whatever holds round results.
///
/// `subscribe` is an optional wake-up signal carrying the ids of freshly
/// inserted rounds. Sources that cannot notify return `None` and workers fall
/// back to interval polling.
pub trait RoundResultSource: Send + Sync {
    fn get(&self, round_id: &str) -> Option<String>;

    fn subscribe(&self) -> Option<broadcast::Receiver<String>> {
        None
    }
}

/// In-process, lock-free-to-callers round-result store
#[derive(Clone)]
pub struct RoundResultStore {
    results: Arc<DashMap<String, String>>,
    inserted: broadcast::Sender<String>,
}

impl RoundResultStore {
    pub fn new() -> Self {
        let (inserted, _) = broadcast::channel(INSERT_EVENT_CAPACITY);
        Self {
            results: Arc::new(DashMap::new()),
            inserted,
        }
    }

    /// Record the result for a round. A later insert for the same id replaces
    /// the earlier value.
    pub fn insert(&self, round_id: impl Into<String>, value: impl Into<String>) {
        let round_id = round_id.into();
        self.results.insert(round_id.clone(), value.into());
        // No receivers just means no worker is waiting right now
        let _ = self.inserted.send(round_id);
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

impl Default for RoundResultStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RoundResultSource for RoundResultStore {
    fn get(&self, round_id: &str) -> Option<String> {
        self.results.get(round_id).map(|entry| entry.value().clone())
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<String>> {
        Some(self.inserted.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_missing_round() {
        let store = RoundResultStore::new();
        assert_eq!(store.get("box123"), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_insert_then_get() {
        let store = RoundResultStore::new();
        store.insert("box123", "a1b2c3d4");

        assert_eq!(store.get("box123").as_deref(), Some("a1b2c3d4"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_overwrite_keeps_latest_value() {
        let store = RoundResultStore::new();
        store.insert("box123", "old");
        store.insert("box123", "new");

        assert_eq!(store.get("box123").as_deref(), Some("new"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_subscribers_see_inserted_ids() {
        let store = RoundResultStore::new();
        let mut rx = store.subscribe().expect("store supports notifications");

        store.insert("box-1", "ff00");

        assert_eq!(rx.recv().await.expect("insert event"), "box-1");
    }

    #[tokio::test]
    async fn test_concurrent_writers_and_readers() {
        let store = RoundResultStore::new();
        let mut handles = Vec::new();

        for i in 0..16 {
            let writer = store.clone();
            handles.push(tokio::spawn(async move {
                writer.insert(format!("box-{}", i), format!("{:08x}", i));
            }));
            let reader = store.clone();
            handles.push(tokio::spawn(async move {
                let _ = reader.get(&format!("box-{}", i));
            }));
        }

        for h in handles {
            h.await.expect("task completed");
        }

        assert_eq!(store.len(), 16);
        assert_eq!(store.get("box-7").as_deref(), Some("00000007"));
    }
}

// # Memory State Store
//
// In-memory implementation of StateStore.
//
// ## Purpose
//
// Keeps resource state for the lifetime of the process only. Used by tests
// and by one-shot runs that refresh from AWS anyway (`pcxctl import`,
// `pcxctl show`).
//
// ## Crash Behavior
//
// - All state is lost on exit
// - The next run sees no recorded resources and plans to create them
//
// Do not use it for `apply` against real accounts: a lost record means a
// duplicate peering connection.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::resource::PeeringConnectionState;
use crate::traits::state_store::{StateRecord, StateStore};

/// In-memory state store implementation
///
/// Clones share the same records.
///
/// # Example
///
/// ```rust,no_run
/// use pcx_core::state::MemoryStateStore;
/// use pcx_core::resource::PeeringConnectionState;
/// use pcx_core::traits::StateStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryStateStore::new();
///
///     let state = PeeringConnectionState {
///         id: "pcx-1234".to_string(),
///         ..Default::default()
///     };
///     store.set_state("main", &state).await?;
///
///     let record = store.get_record("main").await?;
///     assert_eq!(record.map(|r| r.state.id), Some("pcx-1234".to_string()));
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    inner: Arc<RwLock<HashMap<String, StateRecord>>>,
}

impl MemoryStateStore {
    /// Create a new empty memory state store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of records in the store
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Clear all records from the store
    pub async fn clear(&self) {
        self.inner.write().await.clear();
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get_record(&self, name: &str) -> Result<Option<StateRecord>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.get(name).cloned())
    }

    async fn set_state(&self, name: &str, state: &PeeringConnectionState) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard.insert(name.to_string(), StateRecord::new(state.clone()));
        Ok(())
    }

    async fn delete_record(&self, name: &str) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard.remove(name);
        Ok(())
    }

    async fn list_records(&self) -> Result<Vec<String>, Error> {
        let guard = self.inner.read().await;
        let mut names: Vec<String> = guard.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn flush(&self) -> Result<(), Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(id: &str) -> PeeringConnectionState {
        PeeringConnectionState {
            id: id.to_string(),
            vpc_id: "vpc-1".to_string(),
            peer_vpc_id: "vpc-2".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_memory_store_basic() {
        let store = MemoryStateStore::new();
        assert!(store.is_empty().await);

        store.set_state("main", &state("pcx-1")).await.unwrap();
        assert_eq!(store.len().await, 1);

        let record = store.get_record("main").await.unwrap().unwrap();
        assert_eq!(record.state.id, "pcx-1");

        store.delete_record("main").await.unwrap();
        assert!(store.is_empty().await);

        // Deleting again is fine
        store.delete_record("main").await.unwrap();
    }

    #[tokio::test]
    async fn test_memory_store_overwrite_and_list() {
        let store = MemoryStateStore::new();

        store.set_state("b", &state("pcx-1")).await.unwrap();
        store.set_state("a", &state("pcx-2")).await.unwrap();
        store.set_state("b", &state("pcx-3")).await.unwrap();

        assert_eq!(store.list_records().await.unwrap(), vec!["a", "b"]);
        let record = store.get_record("b").await.unwrap().unwrap();
        assert_eq!(record.state.id, "pcx-3");
    }

    #[tokio::test]
    async fn test_clones_share_records() {
        let store = MemoryStateStore::new();
        let clone = store.clone();

        clone.set_state("main", &state("pcx-1")).await.unwrap();
        assert!(store.get_record("main").await.unwrap().is_some());

        store.clear().await;
        assert!(clone.is_empty().await);
    }
}

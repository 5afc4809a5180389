// # State Store Trait
//
// Defines the interface for persistent resource state.
//
// ## Purpose
//
// The state store records, per configured resource name:
// - The peering connection ID
// - The attributes last read back from AWS
// - When the record was written
//
// Planning compares configuration against this record, so a lost record
// means the resource is created again.
//
// ## Implementations
//
// - File-based: JSON file with atomic writes
// - Memory: for tests and dry runs

use async_trait::async_trait;

use crate::resource::PeeringConnectionState;

/// State record for one managed resource
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StateRecord {
    /// Attributes as last read from AWS
    pub state: PeeringConnectionState,
    /// Timestamp of the last write
    pub last_updated: chrono::DateTime<chrono::Utc>,
}

impl StateRecord {
    /// Create a new state record stamped with the current time
    pub fn new(state: PeeringConnectionState) -> Self {
        Self {
            state,
            last_updated: chrono::Utc::now(),
        }
    }
}

/// Trait for state store implementations
///
/// # Thread Safety
///
/// All methods must be safe to call concurrently from multiple tasks.
///
/// ## Implementation Guidelines
///
/// - **Async I/O only**: Use async file/database operations, never blocking I/O
/// - **Explicit flush**: `flush()` must persist all pending changes
/// - **No business logic**: planning and applying belong to `Lifecycle`
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Get the state record for a resource
    ///
    /// # Returns
    ///
    /// - `Ok(Some(StateRecord))`: The recorded state
    /// - `Ok(None)`: No record found
    /// - `Err(Error)`: Storage error
    async fn get_record(&self, name: &str) -> Result<Option<StateRecord>, crate::Error>;

    /// Create or replace the state of a resource
    async fn set_state(
        &self,
        name: &str,
        state: &PeeringConnectionState,
    ) -> Result<(), crate::Error>;

    /// Delete a state record
    ///
    /// Deleting a missing record is not an error.
    async fn delete_record(&self, name: &str) -> Result<(), crate::Error>;

    /// List all resource names in the store
    async fn list_records(&self) -> Result<Vec<String>, crate::Error>;

    /// Persist any pending changes
    async fn flush(&self) -> Result<(), crate::Error>;
}

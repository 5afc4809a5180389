// # pcx-core
//
// Core library for managing AWS VPC peering connections.
//
// ## Architecture Overview
//
// - **PeeringApi**: Trait over the EC2 VPC peering calls
// - **StateStore**: Trait for persistent resource state
// - **PeeringConnectionResource**: Create/read/update/delete/import handlers
// - **StateChangeConf**: Poll-until-target waiter behind the status waiters
// - **Lifecycle**: Plans and applies configured resources against recorded state
// - **BackendRegistry**: Plugin-based registry for API backends
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from the AWS SDK
// 2. **Re-read, don't trust**: Every read re-derives attributes from AWS
// 3. **Plugin-Based**: Backends are registered dynamically, no hard-coded if-else
// 4. **Library-First**: All core functionality can be used as a library
// 5. **Idempotency**: Deleting a gone connection succeeds

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod registry;
pub mod resource;
pub mod schema;
pub mod state;
pub mod status;
pub mod tags;
pub mod traits;
pub mod types;
pub mod waiter;

// Re-export core types for convenience
pub use config::{PcxConfig, PeeringConnectionConfig, ProviderConfig};
pub use error::{Error, Result};
pub use lifecycle::{Lifecycle, LifecycleEvent, Plan};
pub use registry::BackendRegistry;
pub use resource::{PeeringConnectionResource, PeeringConnectionState, ProviderMeta, ResourceData};
pub use state::{FileStateStore, MemoryStateStore};
pub use traits::{PeeringApi, StateStore};
pub use types::{PeeringConnection, PeeringOptions, PeeringStatus};

//! Plugin-based backend registry
//!
//! The registry maps backend type names to [`PeeringApiFactory`] objects so
//! the binary can build a [`PeeringApi`] from configuration without
//! hardcoding backends.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pcx_core::registry::BackendRegistry;
//! use pcx_core::config::ProviderConfig;
//!
//! let registry = BackendRegistry::new();
//!
//! // In the pcx-provider-aws crate
//! pcx_provider_aws::register(&registry);
//!
//! let config = ProviderConfig::Aws { region: "us-west-2".into(), .. };
//! let api = registry.create_api(&config).await?;
//! ```

use crate::config::ProviderConfig;
use crate::error::{Error, Result};
use crate::traits::{PeeringApi, PeeringApiFactory};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Registry of peering API backends
///
/// ## Thread Safety
///
/// Interior mutability with RwLock: concurrent lookups, exclusive
/// registration. The lock is never held across an await.
#[derive(Default)]
pub struct BackendRegistry {
    backends: RwLock<HashMap<String, Arc<dyn PeeringApiFactory>>>,
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.list_backends())
            .finish()
    }
}

fn poisoned<T>(_: T) -> Error {
    Error::Other("backend registry lock poisoned".to_string())
}

impl BackendRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend factory
    ///
    /// Registering the same name twice replaces the earlier factory.
    pub fn register_backend(
        &self,
        name: impl Into<String>,
        factory: Box<dyn PeeringApiFactory>,
    ) -> Result<()> {
        let mut backends = self.backends.write().map_err(poisoned)?;
        backends.insert(name.into(), Arc::from(factory));
        Ok(())
    }

    /// Create a peering API from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn PeeringApi>)`: Created backend
    /// - `Err(Error)`: If the backend type is not registered or creation fails
    pub async fn create_api(&self, config: &ProviderConfig) -> Result<Box<dyn PeeringApi>> {
        let backend_type = config.type_name();

        let factory = {
            let backends = self.backends.read().map_err(poisoned)?;
            backends
                .get(backend_type)
                .cloned()
                .ok_or_else(|| Error::config(format!("Unknown backend type: {}", backend_type)))?
        };

        factory.create(config).await
    }

    /// List all registered backend types, sorted
    pub fn list_backends(&self) -> Vec<String> {
        let Ok(backends) = self.backends.read() else {
            return Vec::new();
        };
        let mut names: Vec<String> = backends.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a backend type is registered
    pub fn has_backend(&self, name: &str) -> bool {
        self.backends
            .read()
            .map(|backends| backends.contains_key(name))
            .unwrap_or(false)
    }
}

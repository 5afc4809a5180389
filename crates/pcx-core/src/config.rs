//! Configuration types
//!
//! This module defines all configuration structures used throughout the crate.
//! Configuration is read from a JSON document:
//!
//! ```json
//! {
//!   "provider": { "type": "aws", "region": "us-east-1" },
//!   "default_tags": { "tags": { "team": "network" } },
//!   "state_store": { "type": "file", "path": "/var/lib/pcx/state.json" },
//!   "resources": {
//!     "main_to_shared": {
//!       "vpc_id": "vpc-11111111",
//!       "peer_vpc_id": "vpc-22222222",
//!       "auto_accept": true,
//!       "accepter": { "allow_remote_vpc_dns_resolution": true }
//!     }
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::tags::{DefaultTagsConfig, IgnoreTagsConfig, Tags};
use crate::types::PeeringOptions;

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PcxConfig {
    /// API backend configuration
    pub provider: ProviderConfig,

    /// Tags merged into every resource
    #[serde(default)]
    pub default_tags: DefaultTagsConfig,

    /// Tags never reported by reads
    #[serde(default)]
    pub ignore_tags: IgnoreTagsConfig,

    /// State store configuration
    #[serde(default)]
    pub state_store: StateStoreConfig,

    /// Peering connections to manage, by name
    #[serde(default)]
    pub resources: BTreeMap<String, PeeringConnectionConfig>,

    /// Status polling settings
    #[serde(default)]
    pub wait: WaitConfig,
}

impl PcxConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self {
            provider: ProviderConfig::default(),
            default_tags: DefaultTagsConfig::default(),
            ignore_tags: IgnoreTagsConfig::default(),
            state_store: StateStoreConfig::default(),
            resources: BTreeMap::new(),
            wait: WaitConfig::default(),
        }
    }

    /// Load and validate configuration from a JSON file
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, crate::Error> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            crate::Error::config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let config: Self = serde_json::from_str(&content).map_err(|e| {
            crate::Error::config(format!(
                "Failed to parse config file {}: {}",
                path.display(),
                e
            ))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.provider.validate()?;
        self.state_store.validate()?;
        self.wait.validate()?;

        for (name, resource) in &self.resources {
            validate_resource_name(name)?;
            resource
                .validate()
                .map_err(|e| crate::Error::config(format!("resource \"{}\": {}", name, e)))?;
        }

        Ok(())
    }
}

impl Default for PcxConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_resource_name(name: &str) -> Result<(), crate::Error> {
    if name.is_empty() {
        return Err(crate::Error::config("Resource name cannot be empty"));
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(crate::Error::config(format!(
            "Resource name '{}' contains invalid characters. \
            Valid: alphanumeric, underscore and hyphen only.",
            name
        )));
    }

    Ok(())
}

/// API backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// AWS EC2 API
    Aws {
        /// Region the requester side lives in
        region: String,
        /// Named profile from the shared credentials file
        #[serde(default)]
        profile: Option<String>,
        /// Custom endpoint (e.g. LocalStack)
        #[serde(default)]
        endpoint_url: Option<String>,
        /// Caller account ID; looked up via STS when unset
        #[serde(default)]
        account_id: Option<String>,
    },

    /// Custom backend
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl ProviderConfig {
    /// Validate the provider configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            ProviderConfig::Aws {
                region,
                endpoint_url,
                account_id,
                ..
            } => {
                if region.is_empty() {
                    return Err(crate::Error::config("AWS region cannot be empty"));
                }
                if let Some(url) = endpoint_url
                    && !url.starts_with("https://")
                    && !url.starts_with("http://")
                {
                    return Err(crate::Error::config(format!(
                        "AWS endpoint_url must use HTTP or HTTPS scheme. Got: {}",
                        url
                    )));
                }
                if let Some(account_id) = account_id {
                    validate_account_id(account_id)?;
                }
                Ok(())
            }
            ProviderConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(crate::Error::config("Custom provider factory cannot be empty"));
                }
                if config.is_null() {
                    return Err(crate::Error::config("Custom provider config cannot be null"));
                }
                Ok(())
            }
        }
    }

    /// Get the backend type name
    pub fn type_name(&self) -> &str {
        match self {
            ProviderConfig::Aws { .. } => "aws",
            ProviderConfig::Custom { factory, .. } => factory,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig::Aws {
            region: String::new(),
            profile: None,
            endpoint_url: None,
            account_id: None,
        }
    }
}

fn validate_account_id(account_id: &str) -> Result<(), crate::Error> {
    if account_id.len() != 12 || !account_id.chars().all(|c| c.is_ascii_digit()) {
        return Err(crate::Error::config(format!(
            "AWS account ID must be 12 digits. Got: '{}'",
            account_id
        )));
    }
    Ok(())
}

/// State store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateStoreConfig {
    /// File-based state store
    File {
        /// Path to the state file
        path: String,
    },

    /// In-memory state store (not persistent)
    #[default]
    Memory,
}

impl StateStoreConfig {
    /// Validate the state store configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            StateStoreConfig::File { path } if path.is_empty() => Err(crate::Error::config(
                "State store path cannot be empty for the file store",
            )),
            _ => Ok(()),
        }
    }
}

/// Desired configuration of one VPC peering connection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeeringConnectionConfig {
    /// The requester VPC (force-new)
    pub vpc_id: String,

    /// The accepter VPC (force-new)
    pub peer_vpc_id: String,

    /// Account owning the accepter VPC (force-new, defaults to the caller)
    #[serde(default)]
    pub peer_owner_id: Option<String>,

    /// Region of the accepter VPC (force-new, defaults to the provider region)
    #[serde(default)]
    pub peer_region: Option<String>,

    /// Accept the connection when it is pending acceptance
    #[serde(default)]
    pub auto_accept: bool,

    /// Options for the accepter side
    #[serde(default)]
    pub accepter: Option<PeeringOptions>,

    /// Options for the requester side
    #[serde(default)]
    pub requester: Option<PeeringOptions>,

    /// Resource tags
    #[serde(default)]
    pub tags: Tags,

    /// Operation timeouts
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
}

impl PeeringConnectionConfig {
    /// Create a configuration peering two VPCs
    pub fn new(vpc_id: impl Into<String>, peer_vpc_id: impl Into<String>) -> Self {
        Self {
            vpc_id: vpc_id.into(),
            peer_vpc_id: peer_vpc_id.into(),
            ..Default::default()
        }
    }

    /// Set the accepter account
    pub fn with_peer_owner_id(mut self, peer_owner_id: impl Into<String>) -> Self {
        self.peer_owner_id = Some(peer_owner_id.into());
        self
    }

    /// Set the accepter region
    pub fn with_peer_region(mut self, peer_region: impl Into<String>) -> Self {
        self.peer_region = Some(peer_region.into());
        self
    }

    /// Enable or disable auto-accept
    pub fn with_auto_accept(mut self, auto_accept: bool) -> Self {
        self.auto_accept = auto_accept;
        self
    }

    /// Set accepter options
    pub fn with_accepter(mut self, options: PeeringOptions) -> Self {
        self.accepter = Some(options);
        self
    }

    /// Set requester options
    pub fn with_requester(mut self, options: PeeringOptions) -> Self {
        self.requester = Some(options);
        self
    }

    /// Add a tag
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key, value);
        self
    }

    /// Validate field shapes
    pub fn validate(&self) -> Result<(), crate::Error> {
        validate_vpc_id("vpc_id", &self.vpc_id)?;
        validate_vpc_id("peer_vpc_id", &self.peer_vpc_id)?;

        if let Some(owner) = &self.peer_owner_id {
            validate_account_id(owner)?;
        }

        if let Some(region) = &self.peer_region
            && region.is_empty()
        {
            return Err(crate::Error::config("peer_region cannot be empty when set"));
        }

        self.timeouts.validate()
    }
}

fn validate_vpc_id(field: &str, value: &str) -> Result<(), crate::Error> {
    if value.is_empty() {
        return Err(crate::Error::config(format!("{} is required", field)));
    }
    if !value.starts_with("vpc-") {
        return Err(crate::Error::config(format!(
            "{} must be a VPC ID (vpc-...). Got: '{}'",
            field, value
        )));
    }
    Ok(())
}

/// Timeouts for the create, update and delete operations (in seconds)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    #[serde(default = "default_timeout_secs")]
    pub create_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub update_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub delete_secs: u64,
}

impl TimeoutsConfig {
    pub fn create(&self) -> Duration {
        Duration::from_secs(self.create_secs)
    }

    pub fn update(&self) -> Duration {
        Duration::from_secs(self.update_secs)
    }

    pub fn delete(&self) -> Duration {
        Duration::from_secs(self.delete_secs)
    }

    fn validate(&self) -> Result<(), crate::Error> {
        if self.create_secs == 0 || self.update_secs == 0 || self.delete_secs == 0 {
            return Err(crate::Error::config("timeouts must be > 0 seconds"));
        }
        Ok(())
    }
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            create_secs: default_timeout_secs(),
            update_secs: default_timeout_secs(),
            delete_secs: default_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    60
}

/// Status polling settings shared by all waiters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitConfig {
    /// Wait before the first status check (in milliseconds)
    #[serde(default)]
    pub delay_ms: u64,

    /// Smallest interval between checks when backing off (in milliseconds)
    #[serde(default)]
    pub min_timeout_ms: u64,

    /// Fixed interval between checks; disables backoff when set (in milliseconds)
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,

    /// Consecutive empty results tolerated before giving up
    #[serde(default = "default_not_found_checks")]
    pub not_found_checks: usize,
}

impl WaitConfig {
    fn validate(&self) -> Result<(), crate::Error> {
        if self.poll_interval_ms == Some(0) {
            return Err(crate::Error::config("wait.poll_interval_ms must be > 0"));
        }
        Ok(())
    }
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            delay_ms: 0,
            min_timeout_ms: 0,
            poll_interval_ms: None,
            not_found_checks: default_not_found_checks(),
        }
    }
}

fn default_not_found_checks() -> usize {
    20
}

// # Peering API Trait
//
// Defines the interface to the EC2 VPC peering calls.
//
// ## Implementations
//
// - AWS EC2: `pcx-provider-aws` crate
// - Tests: scripted in-memory doubles
//
// ## Usage
//
// ```rust,ignore
// use pcx_core::PeeringApi;
// use pcx_core::traits::CreatePeeringRequest;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let api = /* PeeringApi implementation */;
//
//     let pc = api.create_peering_connection(CreatePeeringRequest {
//         vpc_id: "vpc-11111111".to_string(),
//         peer_vpc_id: "vpc-22222222".to_string(),
//         ..Default::default()
//     }).await?;
//
//     Ok(())
// }
// ```

use async_trait::async_trait;

use crate::tags::Tags;
use crate::types::{PeeringConnection, PeeringOptionsRequest, PeeringStatus};

/// Input for creating a peering connection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreatePeeringRequest {
    /// The requester VPC
    pub vpc_id: String,
    /// The accepter VPC
    pub peer_vpc_id: String,
    /// Account owning the accepter VPC, if not the caller's
    pub peer_owner_id: Option<String>,
    /// Region of the accepter VPC, if not the caller's
    pub peer_region: Option<String>,
    /// Tags applied at creation time
    pub tags: Tags,
}

/// Input for modifying peering options
///
/// A side left as `None` is not modified.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModifyOptionsRequest {
    pub id: String,
    pub accepter: Option<PeeringOptionsRequest>,
    pub requester: Option<PeeringOptionsRequest>,
}

/// Trait for the EC2 VPC peering API
///
/// Each method maps to exactly one API call. Errors are reported as
/// [`crate::Error::Api`] carrying the AWS error code so handlers can
/// classify them (not-found, invalid transition, ...).
///
/// # Thread Safety
///
/// Implementations must be thread-safe and usable across async tasks.
///
/// # Responsibilities
///
/// Implementations translate requests and responses only:
/// - No retry or backoff (owned by the waiters)
/// - No status interpretation (owned by the status poller)
/// - No local state (owned by the `StateStore`)
#[async_trait]
pub trait PeeringApi: Send + Sync {
    /// Account ID of the caller, used to decide the local side
    async fn caller_account_id(&self) -> Result<String, crate::Error>;

    /// Region the API client talks to
    fn region(&self) -> &str;

    /// CreateVpcPeeringConnection
    async fn create_peering_connection(
        &self,
        request: CreatePeeringRequest,
    ) -> Result<PeeringConnection, crate::Error>;

    /// DescribeVpcPeeringConnections for a single ID
    ///
    /// Returns every connection in the response; the list may be empty when
    /// the API has not caught up with a fresh create.
    async fn describe_peering_connections(
        &self,
        id: &str,
    ) -> Result<Vec<PeeringConnection>, crate::Error>;

    /// AcceptVpcPeeringConnection, returning the reported status code
    async fn accept_peering_connection(
        &self,
        id: &str,
    ) -> Result<Option<PeeringStatus>, crate::Error>;

    /// ModifyVpcPeeringConnectionOptions
    async fn modify_peering_options(
        &self,
        request: ModifyOptionsRequest,
    ) -> Result<(), crate::Error>;

    /// DeleteVpcPeeringConnection
    async fn delete_peering_connection(&self, id: &str) -> Result<(), crate::Error>;

    /// CreateTags on a single resource
    async fn create_tags(&self, id: &str, tags: &Tags) -> Result<(), crate::Error>;

    /// DeleteTags on a single resource
    async fn delete_tags(&self, id: &str, keys: &[String]) -> Result<(), crate::Error>;

    /// Backend name (for logging/debugging)
    fn backend_name(&self) -> &'static str;
}

/// Helper trait for constructing peering APIs from configuration
#[async_trait]
pub trait PeeringApiFactory: Send + Sync {
    /// Create a PeeringApi instance from configuration
    ///
    /// # Parameters
    ///
    /// - `config`: Configuration specific to this backend
    ///
    /// # Returns
    ///
    /// A boxed PeeringApi trait object
    async fn create(
        &self,
        config: &crate::config::ProviderConfig,
    ) -> Result<Box<dyn PeeringApi>, crate::Error>;
}

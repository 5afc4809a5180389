// # AWS EC2 Peering Backend
//
// This crate implements `PeeringApi` on top of the AWS SDK for Rust.
//
// ## Responsibilities
//
// - One SDK call per trait method
// - Translate SDK types to and from the `pcx-core` model
// - Report SDK errors as `Error::Api { code, message }` so handlers can
//   classify them by AWS error code
//
// Waiting, retries beyond the SDK's own, and status interpretation belong
// to `pcx-core`.
//
// ## Credentials
//
// The default AWS credential chain is used (environment, shared profile,
// IMDS, IRSA). A named profile and a custom endpoint (LocalStack) can be
// set in the provider configuration.
//
// ## API Reference
//
// - CreateVpcPeeringConnection / AcceptVpcPeeringConnection
// - DescribeVpcPeeringConnections
// - ModifyVpcPeeringConnectionOptions
// - DeleteVpcPeeringConnection
// - CreateTags / DeleteTags
// - STS GetCallerIdentity

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_ec2::Client as Ec2Client;
use aws_sdk_ec2::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_ec2::types::{
    PeeringConnectionOptionsRequest, ResourceType, Tag, TagSpecification, VpcPeeringConnection,
    VpcPeeringConnectionOptionsDescription, VpcPeeringConnectionVpcInfo,
};
use pcx_core::config::ProviderConfig;
use pcx_core::registry::BackendRegistry;
use pcx_core::tags::Tags;
use pcx_core::traits::{CreatePeeringRequest, ModifyOptionsRequest, PeeringApi, PeeringApiFactory};
use pcx_core::types::{
    PeeringConnection, PeeringOptionsDescription, PeeringOptionsRequest, PeeringStatus,
    StatusReason, VpcInfo,
};
use pcx_core::{Error, Result};
use tracing::{debug, info};

/// Backend type name used in the registry
pub const BACKEND_NAME: &str = "aws";

/// EC2 peering API backed by the AWS SDK
pub struct AwsPeeringApi {
    ec2: Ec2Client,
    sts: aws_sdk_sts::Client,
    region: String,
    /// Caller account from configuration; skips the STS lookup
    account_id: Option<String>,
}

impl std::fmt::Debug for AwsPeeringApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsPeeringApi")
            .field("region", &self.region)
            .field("account_id", &self.account_id)
            .finish()
    }
}

impl AwsPeeringApi {
    /// Create a backend from an already loaded SDK configuration
    pub fn new(sdk_config: &SdkConfig, account_id: Option<String>) -> Result<Self> {
        let region = sdk_config
            .region()
            .map(|r| r.to_string())
            .ok_or_else(|| Error::config("AWS region is not set"))?;

        Ok(Self {
            ec2: Ec2Client::new(sdk_config),
            sts: aws_sdk_sts::Client::new(sdk_config),
            region,
            account_id,
        })
    }

    /// Load SDK configuration from the default chain and create a backend
    pub async fn load(
        region: &str,
        profile: Option<&str>,
        endpoint_url: Option<&str>,
        account_id: Option<String>,
    ) -> Result<Self> {
        let mut builder = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()));

        if let Some(profile) = profile {
            builder = builder.profile_name(profile);
        }
        if let Some(endpoint) = endpoint_url {
            info!("Using custom AWS endpoint: {}", endpoint);
            builder = builder.endpoint_url(endpoint);
        }

        let sdk_config = builder.load().await;
        Self::new(&sdk_config, account_id)
    }
}

/// Convert an SDK error into an API error carrying the AWS error code
fn api_error<E>(err: E) -> Error
where
    E: ProvideErrorMetadata + std::error::Error,
{
    match err.code() {
        Some(code) => Error::api(code, err.message().unwrap_or_default()),
        None => Error::Other(DisplayErrorContext(&err).to_string()),
    }
}

fn to_sdk_tags(tags: &Tags) -> Vec<Tag> {
    tags.iter()
        .map(|(k, v)| Tag::builder().key(k).value(v).build())
        .collect()
}

fn from_sdk_tags(tags: &[Tag]) -> Tags {
    tags.iter()
        .filter_map(|t| Some((t.key()?, t.value().unwrap_or_default())))
        .collect()
}

fn from_sdk_options(options: &VpcPeeringConnectionOptionsDescription) -> PeeringOptionsDescription {
    PeeringOptionsDescription {
        allow_dns_resolution_from_remote_vpc: options.allow_dns_resolution_from_remote_vpc(),
        allow_egress_from_local_classic_link_to_remote_vpc: options
            .allow_egress_from_local_classic_link_to_remote_vpc(),
        allow_egress_from_local_vpc_to_remote_classic_link: options
            .allow_egress_from_local_vpc_to_remote_classic_link(),
    }
}

fn to_sdk_options(options: &PeeringOptionsRequest) -> PeeringConnectionOptionsRequest {
    PeeringConnectionOptionsRequest::builder()
        .set_allow_dns_resolution_from_remote_vpc(options.allow_dns_resolution_from_remote_vpc)
        .set_allow_egress_from_local_classic_link_to_remote_vpc(
            options.allow_egress_from_local_classic_link_to_remote_vpc,
        )
        .set_allow_egress_from_local_vpc_to_remote_classic_link(
            options.allow_egress_from_local_vpc_to_remote_classic_link,
        )
        .build()
}

fn from_sdk_vpc_info(info: Option<&VpcPeeringConnectionVpcInfo>) -> VpcInfo {
    let Some(info) = info else {
        return VpcInfo::default();
    };

    VpcInfo {
        vpc_id: info.vpc_id().map(str::to_string),
        owner_id: info.owner_id().map(str::to_string),
        region: info.region().map(str::to_string),
        peering_options: info.peering_options().map(from_sdk_options),
    }
}

/// Convert an SDK peering connection into the core model
pub fn from_sdk_connection(pc: &VpcPeeringConnection) -> PeeringConnection {
    PeeringConnection {
        id: pc.vpc_peering_connection_id().map(str::to_string),
        requester: from_sdk_vpc_info(pc.requester_vpc_info()),
        accepter: from_sdk_vpc_info(pc.accepter_vpc_info()),
        status: pc.status().map(|s| StatusReason {
            code: s.code().map(|c| PeeringStatus::from(c.as_str())),
            message: s.message().map(str::to_string),
        }),
        tags: from_sdk_tags(pc.tags()),
    }
}

#[async_trait]
impl PeeringApi for AwsPeeringApi {
    async fn caller_account_id(&self) -> Result<String> {
        if let Some(account_id) = &self.account_id {
            return Ok(account_id.clone());
        }

        let output = self
            .sts
            .get_caller_identity()
            .send()
            .await
            .map_err(api_error)?;

        output
            .account()
            .map(str::to_string)
            .ok_or_else(|| Error::Other("GetCallerIdentity returned no account".to_string()))
    }

    fn region(&self) -> &str {
        &self.region
    }

    async fn create_peering_connection(
        &self,
        request: CreatePeeringRequest,
    ) -> Result<PeeringConnection> {
        let tag_specifications = (!request.tags.is_empty()).then(|| {
            vec![
                TagSpecification::builder()
                    .resource_type(ResourceType::VpcPeeringConnection)
                    .set_tags(Some(to_sdk_tags(&request.tags)))
                    .build(),
            ]
        });

        let output = self
            .ec2
            .create_vpc_peering_connection()
            .vpc_id(request.vpc_id)
            .peer_vpc_id(request.peer_vpc_id)
            .set_peer_owner_id(request.peer_owner_id)
            .set_peer_region(request.peer_region)
            .set_tag_specifications(tag_specifications)
            .send()
            .await
            .map_err(api_error)?;

        output
            .vpc_peering_connection()
            .map(from_sdk_connection)
            .ok_or_else(|| {
                Error::Other("CreateVpcPeeringConnection returned no connection".to_string())
            })
    }

    async fn describe_peering_connections(&self, id: &str) -> Result<Vec<PeeringConnection>> {
        debug!("DescribeVpcPeeringConnections: {}", id);
        let output = self
            .ec2
            .describe_vpc_peering_connections()
            .vpc_peering_connection_ids(id)
            .send()
            .await
            .map_err(api_error)?;

        Ok(output
            .vpc_peering_connections()
            .iter()
            .map(from_sdk_connection)
            .collect())
    }

    async fn accept_peering_connection(&self, id: &str) -> Result<Option<PeeringStatus>> {
        let output = self
            .ec2
            .accept_vpc_peering_connection()
            .vpc_peering_connection_id(id)
            .send()
            .await
            .map_err(api_error)?;

        Ok(output
            .vpc_peering_connection()
            .and_then(|pc| pc.status())
            .and_then(|s| s.code())
            .map(|c| PeeringStatus::from(c.as_str())))
    }

    async fn modify_peering_options(&self, request: ModifyOptionsRequest) -> Result<()> {
        self.ec2
            .modify_vpc_peering_connection_options()
            .vpc_peering_connection_id(request.id)
            .set_accepter_peering_connection_options(request.accepter.as_ref().map(to_sdk_options))
            .set_requester_peering_connection_options(
                request.requester.as_ref().map(to_sdk_options),
            )
            .send()
            .await
            .map_err(api_error)?;
        Ok(())
    }

    async fn delete_peering_connection(&self, id: &str) -> Result<()> {
        self.ec2
            .delete_vpc_peering_connection()
            .vpc_peering_connection_id(id)
            .send()
            .await
            .map_err(api_error)?;
        Ok(())
    }

    async fn create_tags(&self, id: &str, tags: &Tags) -> Result<()> {
        self.ec2
            .create_tags()
            .resources(id)
            .set_tags(Some(to_sdk_tags(tags)))
            .send()
            .await
            .map_err(api_error)?;
        Ok(())
    }

    async fn delete_tags(&self, id: &str, keys: &[String]) -> Result<()> {
        let tags = keys.iter().map(|k| Tag::builder().key(k).build()).collect();

        self.ec2
            .delete_tags()
            .resources(id)
            .set_tags(Some(tags))
            .send()
            .await
            .map_err(api_error)?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }
}

/// Factory for creating AWS backends from configuration
pub struct AwsFactory;

#[async_trait]
impl PeeringApiFactory for AwsFactory {
    async fn create(&self, config: &ProviderConfig) -> Result<Box<dyn PeeringApi>> {
        match config {
            ProviderConfig::Aws {
                region,
                profile,
                endpoint_url,
                account_id,
            } => {
                if region.is_empty() {
                    return Err(Error::config("AWS region is required"));
                }

                let api = AwsPeeringApi::load(
                    region,
                    profile.as_deref(),
                    endpoint_url.as_deref(),
                    account_id.clone(),
                )
                .await?;
                Ok(Box::new(api))
            }
            _ => Err(Error::config("Invalid config for AWS backend")),
        }
    }
}

/// Register the AWS backend with the registry
pub fn register(registry: &BackendRegistry) -> Result<()> {
    registry.register_backend(BACKEND_NAME, Box::new(AwsFactory))
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_ec2::error::ErrorMetadata;
    use aws_sdk_ec2::types::{VpcPeeringConnectionStateReason, VpcPeeringConnectionStateReasonCode};

    fn sdk_connection() -> VpcPeeringConnection {
        VpcPeeringConnection::builder()
            .vpc_peering_connection_id("pcx-0123456789abcdef0")
            .requester_vpc_info(
                VpcPeeringConnectionVpcInfo::builder()
                    .vpc_id("vpc-11111111")
                    .owner_id("111111111111")
                    .region("us-west-2")
                    .build(),
            )
            .accepter_vpc_info(
                VpcPeeringConnectionVpcInfo::builder()
                    .vpc_id("vpc-22222222")
                    .owner_id("222222222222")
                    .region("us-east-1")
                    .peering_options(
                        VpcPeeringConnectionOptionsDescription::builder()
                            .allow_dns_resolution_from_remote_vpc(true)
                            .build(),
                    )
                    .build(),
            )
            .status(
                VpcPeeringConnectionStateReason::builder()
                    .code(VpcPeeringConnectionStateReasonCode::PendingAcceptance)
                    .message("Pending Acceptance by 222222222222")
                    .build(),
            )
            .tags(Tag::builder().key("Name").value("main").build())
            .tags(Tag::builder().key("aws:created-by").value("x").build())
            .build()
    }

    #[test]
    fn test_connection_conversion() {
        let pc = from_sdk_connection(&sdk_connection());

        assert_eq!(pc.id.as_deref(), Some("pcx-0123456789abcdef0"));
        assert_eq!(pc.requester.vpc_id.as_deref(), Some("vpc-11111111"));
        assert_eq!(pc.accepter.region.as_deref(), Some("us-east-1"));
        assert!(pc.is_cross_region());
        assert_eq!(pc.status_code(), Some(&PeeringStatus::PendingAcceptance));
        assert_eq!(pc.status_message(), "Pending Acceptance by 222222222222");
        assert!(pc.requester.peering_options.is_none());
        assert_eq!(
            pc.accepter.peering_options,
            Some(PeeringOptionsDescription {
                allow_dns_resolution_from_remote_vpc: Some(true),
                ..Default::default()
            })
        );
        // System tags are filtered on read, not here
        assert_eq!(pc.tags.len(), 2);
    }

    #[test]
    fn test_missing_sides_convert_to_empty() {
        let pc = from_sdk_connection(&VpcPeeringConnection::builder().build());
        assert!(pc.id.is_none());
        assert_eq!(pc.requester, VpcInfo::default());
        assert!(pc.status_code().is_none());
        assert!(pc.tags.is_empty());
    }

    #[test]
    fn test_options_request_keeps_unset_flags_unset() {
        let request = to_sdk_options(&PeeringOptionsRequest {
            allow_dns_resolution_from_remote_vpc: Some(true),
            ..Default::default()
        });

        assert_eq!(request.allow_dns_resolution_from_remote_vpc(), Some(true));
        assert_eq!(request.allow_egress_from_local_classic_link_to_remote_vpc(), None);
        assert_eq!(request.allow_egress_from_local_vpc_to_remote_classic_link(), None);
    }

    #[test]
    fn test_tags_round_trip() {
        let tags: Tags = [("Name", "main"), ("env", "prod")].into_iter().collect();
        assert_eq!(from_sdk_tags(&to_sdk_tags(&tags)), tags);
    }

    #[test]
    fn test_api_error_keeps_code_and_message() {
        let err = api_error(
            ErrorMetadata::builder()
                .code("InvalidVpcPeeringConnectionID.NotFound")
                .message("The vpcPeeringConnection ID 'pcx-1' does not exist")
                .build(),
        );

        assert!(err.is_not_found());
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_api_error_without_code() {
        let err = api_error(ErrorMetadata::builder().message("dispatch failure").build());
        assert!(matches!(err, Error::Other(_)));
        assert!(err.code().is_none());
    }

    #[test]
    fn test_register() {
        let registry = BackendRegistry::new();
        register(&registry).unwrap();
        assert!(registry.has_backend(BACKEND_NAME));
    }

    #[tokio::test]
    async fn test_factory_rejects_foreign_config() {
        let config = ProviderConfig::Custom {
            factory: "other".to_string(),
            config: serde_json::json!({ "region": "us-west-2" }),
        };
        let err = AwsFactory.create(&config).await.err().unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_factory_requires_region() {
        let config = ProviderConfig::Aws {
            region: String::new(),
            profile: None,
            endpoint_url: None,
            account_id: None,
        };
        let err = AwsFactory.create(&config).await.err().unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_configured_account_skips_sts() {
        let api = AwsPeeringApi::load("us-west-2", None, None, Some("111111111111".to_string()))
            .await
            .unwrap();

        assert_eq!(api.caller_account_id().await.unwrap(), "111111111111");
        assert_eq!(api.region(), "us-west-2");
        assert_eq!(api.backend_name(), "aws");
    }
}

//! Domain types for VPC peering connections
//!
//! These mirror the shapes returned by the EC2 API, reduced to the fields
//! the resource reads and writes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::tags::Tags;

/// Status code of a VPC peering connection
///
/// See the VPC peering lifecycle in the AWS documentation. Unknown codes are
/// preserved so a newer API cannot break status parsing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PeeringStatus {
    InitiatingRequest,
    PendingAcceptance,
    Active,
    Deleted,
    Rejected,
    Failed,
    Expired,
    Provisioning,
    Deleting,
    Unknown(String),
}

impl PeeringStatus {
    /// The wire representation used by the EC2 API
    pub fn as_str(&self) -> &str {
        match self {
            Self::InitiatingRequest => "initiating-request",
            Self::PendingAcceptance => "pending-acceptance",
            Self::Active => "active",
            Self::Deleted => "deleted",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
            Self::Expired => "expired",
            Self::Provisioning => "provisioning",
            Self::Deleting => "deleting",
            Self::Unknown(code) => code,
        }
    }

    /// Statuses after which the connection no longer exists for our purposes
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Deleted | Self::Expired | Self::Failed | Self::Rejected
        )
    }
}

impl FromStr for PeeringStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "initiating-request" => Self::InitiatingRequest,
            "pending-acceptance" => Self::PendingAcceptance,
            "active" => Self::Active,
            "deleted" => Self::Deleted,
            "rejected" => Self::Rejected,
            "failed" => Self::Failed,
            "expired" => Self::Expired,
            "provisioning" => Self::Provisioning,
            "deleting" => Self::Deleting,
            other => Self::Unknown(other.to_string()),
        })
    }
}

impl From<&str> for PeeringStatus {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(status) => status,
            Err(never) => match never {},
        }
    }
}

impl fmt::Display for PeeringStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for PeeringStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for PeeringStatus {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(PeeringStatus::from(s.as_str()))
    }
}

/// Peering options for one side of the connection, as configured
///
/// All flags default to `false`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeeringOptions {
    /// Allow the local VPC to resolve public DNS hostnames of the peer to private IPs
    pub allow_remote_vpc_dns_resolution: bool,
    /// Allow a local ClassicLink connection to talk to the peer VPC
    pub allow_classic_link_to_remote_vpc: bool,
    /// Allow the local VPC to talk to a linked EC2-Classic instance in the peer VPC
    pub allow_vpc_to_remote_classic_link: bool,
}

impl PeeringOptions {
    /// Flatten the API description into configured options
    ///
    /// Flags the API leaves unset keep their `false` default.
    pub fn flatten(description: &PeeringOptionsDescription) -> Self {
        Self {
            allow_remote_vpc_dns_resolution: description
                .allow_dns_resolution_from_remote_vpc
                .unwrap_or_default(),
            allow_classic_link_to_remote_vpc: description
                .allow_egress_from_local_classic_link_to_remote_vpc
                .unwrap_or_default(),
            allow_vpc_to_remote_classic_link: description
                .allow_egress_from_local_vpc_to_remote_classic_link
                .unwrap_or_default(),
        }
    }

    /// Expand configured options into a modify request
    ///
    /// ClassicLink flags are not supported across regions, so only the DNS
    /// resolution flag is sent for cross-region peering.
    pub fn expand(&self, cross_region_peering: bool) -> PeeringOptionsRequest {
        let mut request = PeeringOptionsRequest {
            allow_dns_resolution_from_remote_vpc: Some(self.allow_remote_vpc_dns_resolution),
            ..Default::default()
        };

        if !cross_region_peering {
            request.allow_egress_from_local_classic_link_to_remote_vpc =
                Some(self.allow_classic_link_to_remote_vpc);
            request.allow_egress_from_local_vpc_to_remote_classic_link =
                Some(self.allow_vpc_to_remote_classic_link);
        }

        request
    }
}

/// Peering options for one side, as described by the API
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeeringOptionsDescription {
    pub allow_dns_resolution_from_remote_vpc: Option<bool>,
    pub allow_egress_from_local_classic_link_to_remote_vpc: Option<bool>,
    pub allow_egress_from_local_vpc_to_remote_classic_link: Option<bool>,
}

/// Peering options for one side, as sent in a modify request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeeringOptionsRequest {
    pub allow_dns_resolution_from_remote_vpc: Option<bool>,
    pub allow_egress_from_local_classic_link_to_remote_vpc: Option<bool>,
    pub allow_egress_from_local_vpc_to_remote_classic_link: Option<bool>,
}

/// One side (requester or accepter) of a peering connection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VpcInfo {
    pub vpc_id: Option<String>,
    pub owner_id: Option<String>,
    pub region: Option<String>,
    pub peering_options: Option<PeeringOptionsDescription>,
}

/// Status code and message of a peering connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReason {
    pub code: Option<PeeringStatus>,
    pub message: Option<String>,
}

/// A VPC peering connection as described by the API
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeeringConnection {
    /// The `pcx-...` identifier
    pub id: Option<String>,
    pub requester: VpcInfo,
    pub accepter: VpcInfo,
    pub status: Option<StatusReason>,
    pub tags: Tags,
}

impl PeeringConnection {
    /// The status code, if the API reported one
    pub fn status_code(&self) -> Option<&PeeringStatus> {
        self.status.as_ref().and_then(|s| s.code.as_ref())
    }

    /// The status message, or an empty string
    pub fn status_message(&self) -> &str {
        self.status
            .as_ref()
            .and_then(|s| s.message.as_deref())
            .unwrap_or_default()
    }

    /// True when the two sides live in different regions
    pub fn is_cross_region(&self) -> bool {
        self.requester.region != self.accepter.region
    }

    /// Which side the caller's account is on
    ///
    /// The caller is the accepter only when it owns the accepter VPC and not
    /// the requester VPC; same-account peering reads as requester.
    pub fn local_role(&self, account_id: &str) -> Role {
        let accepter_owner = self.accepter.owner_id.as_deref().unwrap_or_default();
        let requester_owner = self.requester.owner_id.as_deref().unwrap_or_default();

        if account_id == accepter_owner && account_id != requester_owner {
            Role::Accepter
        } else {
            Role::Requester
        }
    }
}

/// The local side of a peering connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Requester,
    Accepter,
}

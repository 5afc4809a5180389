//! CRUD handlers for `aws_vpc_peering_connection`
//!
//! ## Handler Flow
//!
//! ```text
//! create ──► wait active ──► update ──► read
//!                              │
//!                              ├─ push tag diff (existing resources only)
//!                              ├─ accept when auto_accept && pending-acceptance
//!                              └─ modify options (active / provisioning only)
//!
//! delete ──► wait deleted
//! import ──► read
//! ```
//!
//! Every read re-derives the local side and options from AWS; the peer
//! account can accept, reject or modify the connection at any time.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{PeeringConnectionConfig, TimeoutsConfig, WaitConfig};
use crate::error::{
    ERR_CODE_INVALID_STATE_TRANSITION, ERR_CODE_PEERING_CONNECTION_NOT_FOUND, Error, Result,
    ResultExt,
};
use crate::schema::ResourceSchema;
use crate::status::{find_by_id, refresh_status, wait_active, wait_available, wait_deleted};
use crate::tags::{DefaultTagsConfig, IgnoreTagsConfig, TagDiff, Tags};
use crate::traits::{CreatePeeringRequest, ModifyOptionsRequest, PeeringApi};
use crate::types::{PeeringOptions, PeeringStatus, Role};

/// Recorded attributes of a peering connection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeeringConnectionState {
    pub id: String,
    pub accept_status: Option<PeeringStatus>,
    pub vpc_id: String,
    pub peer_vpc_id: String,
    pub peer_owner_id: Option<String>,
    pub peer_region: Option<String>,
    #[serde(default)]
    pub auto_accept: bool,
    pub accepter: Option<PeeringOptions>,
    pub requester: Option<PeeringOptions>,
    #[serde(default)]
    pub tags: Tags,
    #[serde(default)]
    pub tags_all: Tags,
}

/// Provider-level settings shared by every handler call
#[derive(Debug, Clone, Default)]
pub struct ProviderMeta {
    /// Caller account, compared against the owner IDs on read
    pub account_id: String,
    /// Region of the API client
    pub region: String,
    pub default_tags: DefaultTagsConfig,
    pub ignore_tags: IgnoreTagsConfig,
    pub wait: WaitConfig,
}

/// Attributes whose change the update handler reconciles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    TagsAll,
    Accepter,
    Requester,
    AutoAccept,
}

/// The working set handlers read from and write to
///
/// Holds the planned configuration, the prior recorded state (if any) and
/// the new state being built. An empty ID means the resource does not exist.
#[derive(Debug, Clone)]
pub struct ResourceData {
    planned: PeeringConnectionConfig,
    planned_tags_all: Tags,
    prior: Option<PeeringConnectionState>,
    state: PeeringConnectionState,
    is_new: bool,
}

impl ResourceData {
    /// Data for a resource about to be created
    pub fn new(planned: PeeringConnectionConfig, default_tags: &DefaultTagsConfig) -> Self {
        let planned_tags_all = default_tags.merge_tags(&planned.tags);

        Self {
            planned,
            planned_tags_all,
            prior: None,
            state: PeeringConnectionState::default(),
            is_new: true,
        }
    }

    /// Data for updating an existing resource towards `planned`
    ///
    /// `auto_accept` keeps its prior value until the update succeeds, so a
    /// failed accept is retried on the next apply.
    pub fn existing(
        prior: PeeringConnectionState,
        planned: PeeringConnectionConfig,
        default_tags: &DefaultTagsConfig,
    ) -> Self {
        let planned_tags_all = default_tags.merge_tags(&planned.tags);

        Self {
            planned,
            planned_tags_all,
            state: prior.clone(),
            prior: Some(prior),
            is_new: false,
        }
    }

    /// Data for refreshing or deleting a recorded resource
    ///
    /// The plan equals the prior state, so nothing reads as changed.
    pub fn from_state(prior: PeeringConnectionState, timeouts: TimeoutsConfig) -> Self {
        let planned = PeeringConnectionConfig {
            vpc_id: prior.vpc_id.clone(),
            peer_vpc_id: prior.peer_vpc_id.clone(),
            peer_owner_id: prior.peer_owner_id.clone(),
            peer_region: prior.peer_region.clone(),
            auto_accept: prior.auto_accept,
            accepter: None,
            requester: None,
            tags: prior.tags.clone(),
            timeouts,
        };

        Self {
            planned,
            planned_tags_all: prior.tags_all.clone(),
            state: prior.clone(),
            prior: Some(prior),
            is_new: false,
        }
    }

    /// Data for importing an existing connection by ID
    pub fn import(id: impl Into<String>) -> Self {
        let state = PeeringConnectionState {
            id: id.into(),
            ..Default::default()
        };
        Self::from_state(state, TimeoutsConfig::default())
    }

    pub fn id(&self) -> &str {
        &self.state.id
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.state.id = id.into();
    }

    /// Mark the resource as gone
    pub fn clear_id(&mut self) {
        self.state.id.clear();
    }

    pub fn is_new_resource(&self) -> bool {
        self.is_new
    }

    pub fn planned(&self) -> &PeeringConnectionConfig {
        &self.planned
    }

    pub fn planned_tags_all(&self) -> &Tags {
        &self.planned_tags_all
    }

    pub fn prior(&self) -> Option<&PeeringConnectionState> {
        self.prior.as_ref()
    }

    pub fn state(&self) -> &PeeringConnectionState {
        &self.state
    }

    fn timeouts(&self) -> TimeoutsConfig {
        self.planned.timeouts
    }

    /// Whether the plan changes `field` relative to the prior state
    ///
    /// The options blocks are optional and computed: leaving them out of the
    /// configuration keeps whatever AWS reports.
    pub fn has_change(&self, field: Field) -> bool {
        let prior = self.prior.as_ref();
        match field {
            Field::TagsAll => {
                let empty = Tags::new();
                &self.planned_tags_all != prior.map_or(&empty, |p| &p.tags_all)
            }
            Field::Accepter => {
                self.planned.accepter.is_some()
                    && self.planned.accepter != prior.and_then(|p| p.accepter)
            }
            Field::Requester => {
                self.planned.requester.is_some()
                    && self.planned.requester != prior.and_then(|p| p.requester)
            }
            Field::AutoAccept => {
                self.planned.auto_accept != prior.is_some_and(|p| p.auto_accept)
            }
        }
    }

    /// Whether any reconcilable field changes
    pub fn has_changes(&self) -> bool {
        [Field::TagsAll, Field::Accepter, Field::Requester, Field::AutoAccept]
            .into_iter()
            .any(|f| self.has_change(f))
    }

    /// Force-new attributes whose planned value differs from the prior state
    ///
    /// Optional computed attributes only count when configured.
    pub fn force_new_changes(&self, schema: &ResourceSchema) -> Vec<&'static str> {
        let Some(prior) = self.prior.as_ref() else {
            return Vec::new();
        };

        schema
            .force_new_attributes()
            .filter(|name| match *name {
                "vpc_id" => self.planned.vpc_id != prior.vpc_id,
                "peer_vpc_id" => self.planned.peer_vpc_id != prior.peer_vpc_id,
                "peer_owner_id" => self
                    .planned
                    .peer_owner_id
                    .as_ref()
                    .is_some_and(|v| Some(v) != prior.peer_owner_id.as_ref()),
                "peer_region" => self
                    .planned
                    .peer_region
                    .as_ref()
                    .is_some_and(|v| Some(v) != prior.peer_region.as_ref()),
                _ => false,
            })
            .collect()
    }

    /// The final state, or `None` if the resource is gone
    pub fn into_state(self) -> Option<PeeringConnectionState> {
        if self.state.id.is_empty() {
            None
        } else {
            Some(self.state)
        }
    }
}

/// Handlers for the VPC peering connection resource
pub struct PeeringConnectionResource {
    api: Box<dyn PeeringApi>,
    meta: ProviderMeta,
}

impl std::fmt::Debug for PeeringConnectionResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeeringConnectionResource")
            .field("backend", &self.api.backend_name())
            .field("meta", &self.meta)
            .finish()
    }
}

impl PeeringConnectionResource {
    pub fn new(api: Box<dyn PeeringApi>, meta: ProviderMeta) -> Self {
        Self { api, meta }
    }

    /// Build the resource, looking up the caller account when not given
    pub async fn connect(api: Box<dyn PeeringApi>, mut meta: ProviderMeta) -> Result<Self> {
        if meta.account_id.is_empty() {
            meta.account_id = api
                .caller_account_id()
                .await
                .with_context(|| "error reading caller account ID")?;
            debug!("Resolved caller account ID: {}", meta.account_id);
        }
        if meta.region.is_empty() {
            meta.region = api.region().to_string();
        }
        Ok(Self::new(api, meta))
    }

    pub fn meta(&self) -> &ProviderMeta {
        &self.meta
    }

    pub fn api(&self) -> &dyn PeeringApi {
        self.api.as_ref()
    }

    /// Create the connection, wait for it to settle, then apply options and tags
    pub async fn create(&self, d: &mut ResourceData) -> Result<()> {
        let planned = d.planned();

        if planned.peer_region.is_some() && planned.auto_accept {
            return Err(Error::config(
                "`peer_region` cannot be set whilst `auto_accept` is `true` when creating an EC2 VPC Peering Connection",
            ));
        }

        let request = CreatePeeringRequest {
            vpc_id: planned.vpc_id.clone(),
            peer_vpc_id: planned.peer_vpc_id.clone(),
            peer_owner_id: planned.peer_owner_id.clone(),
            peer_region: planned.peer_region.clone(),
            tags: d.planned_tags_all().clone(),
        };

        debug!("Creating EC2 VPC Peering Connection: {:?}", request);
        let pc = self
            .api
            .create_peering_connection(request)
            .await
            .with_context(|| "error creating EC2 VPC Peering Connection")?;

        let id = pc
            .id
            .ok_or_else(|| Error::Other("EC2 VPC Peering Connection created without an ID".to_string()))?;
        info!("Created EC2 VPC Peering Connection: {}", id);
        d.set_id(id.clone());

        // Enough to plan against if a later step fails
        let planned = d.planned.clone();
        d.state.vpc_id = planned.vpc_id;
        d.state.peer_vpc_id = planned.peer_vpc_id;
        d.state.peer_owner_id = planned.peer_owner_id;
        d.state.peer_region = planned.peer_region;

        wait_active(self.api(), &id, d.timeouts().create(), &self.meta.wait)
            .await
            .with_context(|| format!("error waiting for EC2 VPC Peering Connection ({}) create", id))?;

        self.update(d).await
    }

    /// Refresh every attribute from AWS
    pub async fn read(&self, d: &mut ResourceData) -> Result<()> {
        let id = d.id().to_string();

        let pc = match find_by_id(self.api(), &id).await {
            Ok(pc) => pc,
            Err(e) if !d.is_new_resource() && e.is_not_found() => {
                warn!("EC2 VPC Peering Connection {} not found, removing from state", id);
                d.clear_id();
                return Ok(());
            }
            Err(e) => {
                return Err(e.context(format!("error reading EC2 VPC Peering Connection ({})", id)));
            }
        };

        let state = &mut d.state;
        state.accept_status = pc.status_code().cloned();
        state.peer_region = pc.accepter.region.clone();

        let (local, peer) = match pc.local_role(&self.meta.account_id) {
            Role::Accepter => (&pc.accepter, &pc.requester),
            Role::Requester => (&pc.requester, &pc.accepter),
        };
        state.vpc_id = local.vpc_id.clone().unwrap_or_default();
        state.peer_vpc_id = peer.vpc_id.clone().unwrap_or_default();
        state.peer_owner_id = peer.owner_id.clone();

        state.accepter = pc.accepter.peering_options.as_ref().map(PeeringOptions::flatten);
        state.requester = pc.requester.peering_options.as_ref().map(PeeringOptions::flatten);

        let tags = pc.tags.ignore_aws().ignore_config(&self.meta.ignore_tags);
        state.tags = tags.remove_default_config(&self.meta.default_tags);
        state.tags_all = tags;

        Ok(())
    }

    /// Reconcile tags, acceptance and peering options, then read
    pub async fn update(&self, d: &mut ResourceData) -> Result<()> {
        let id = d.id().to_string();

        if d.has_change(Field::TagsAll) && !d.is_new_resource() {
            let empty = Tags::new();
            let old = d.prior().map_or(&empty, |p| &p.tags_all);
            let diff = TagDiff::between(old, d.planned_tags_all());

            self.update_tags(&id, &diff)
                .await
                .with_context(|| format!("error updating EC2 VPC Peering Connection ({}) tags", id))?;
        }

        let (pc, mut status) = refresh_status(self.api(), &id)
            .await
            .with_context(|| "Error reading VPC Peering Connection")?;

        let Some(pc) = pc else {
            warn!("VPC Peering Connection ({}) not found, removing from state", id);
            d.clear_id();
            return Ok(());
        };

        if d.planned().auto_accept && status == PeeringStatus::PendingAcceptance.as_str() {
            status = self
                .accept(&id)
                .await
                .with_context(|| "Unable to accept VPC Peering Connection")?;
            debug!("VPC Peering Connection accept status: {}", status);

            wait_available(self.api(), &id, d.timeouts().update(), &self.meta.wait)
                .await
                .with_context(|| "Error waiting for VPC Peering Connection to become available")?;
        }

        let accepter_changed = d.has_change(Field::Accepter);
        let requester_changed = d.has_change(Field::Requester);

        if accepter_changed || requester_changed {
            if status != PeeringStatus::Active.as_str()
                && status != PeeringStatus::Provisioning.as_str()
            {
                return Err(Error::NotActive(id));
            }

            let cross_region_peering = pc.is_cross_region();
            let planned = d.planned();
            let request = ModifyOptionsRequest {
                id: id.clone(),
                accepter: planned
                    .accepter
                    .filter(|_| accepter_changed)
                    .map(|o| o.expand(cross_region_peering)),
                requester: planned
                    .requester
                    .filter(|_| requester_changed)
                    .map(|o| o.expand(cross_region_peering)),
            };

            debug!("Modifying VPC Peering Connection options: {:?}", request);
            self.api
                .modify_peering_options(request)
                .await
                .with_context(|| format!("error modifying VPC Peering Connection ({}) Options", id))?;
        }

        d.state.auto_accept = d.planned.auto_accept;
        self.read(d).await
    }

    /// Delete the connection and wait until it is gone
    ///
    /// A connection that no longer exists, or that failed and cannot
    /// transition to deleting, counts as deleted.
    pub async fn delete(&self, d: &mut ResourceData) -> Result<()> {
        let id = d.id().to_string();

        info!("Deleting EC2 VPC Peering Connection: {}", id);
        match self.api.delete_peering_connection(&id).await {
            Ok(()) => {}
            Err(e) if e.code_equals(ERR_CODE_PEERING_CONNECTION_NOT_FOUND) => {
                d.clear_id();
                return Ok(());
            }
            // "InvalidStateTransition: Invalid state transition for pcx-0000000000000000,
            // attempted to transition from failed to deleting"
            Err(e) if e.message_contains(ERR_CODE_INVALID_STATE_TRANSITION, "to deleting") => {
                d.clear_id();
                return Ok(());
            }
            Err(e) => {
                return Err(e.context(format!("error deleting EC2 VPC Peering Connection ({})", id)));
            }
        }

        wait_deleted(self.api(), &id, d.timeouts().delete(), &self.meta.wait)
            .await
            .with_context(|| format!("error waiting for EC2 VPC Peering Connection ({}) delete", id))?;

        d.clear_id();
        Ok(())
    }

    /// Import an existing connection by ID
    pub async fn import(&self, id: &str) -> Result<ResourceData> {
        let mut d = ResourceData::import(id);
        self.read(&mut d).await?;

        if d.id().is_empty() {
            return Err(Error::not_found(format!(
                "Cannot import non-existent EC2 VPC Peering Connection ({})",
                id
            )));
        }
        Ok(d)
    }

    async fn accept(&self, id: &str) -> Result<String> {
        info!("Accept VPC Peering Connection with ID: {}", id);
        let status = self.api.accept_peering_connection(id).await?;
        Ok(status.map(|s| s.to_string()).unwrap_or_default())
    }

    async fn update_tags(&self, id: &str, diff: &TagDiff) -> Result<()> {
        if !diff.remove.is_empty() {
            debug!("Removing tags {:?} from {}", diff.remove, id);
            self.api.delete_tags(id, &diff.remove).await?;
        }

        if !diff.upsert.is_empty() {
            debug!("Setting {} tag(s) on {}", diff.upsert.len(), id);
            self.api.create_tags(id, &diff.upsert).await?;
        }

        Ok(())
    }
}

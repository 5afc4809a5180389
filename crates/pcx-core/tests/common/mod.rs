//! Test doubles and common utilities for contract tests
//!
//! [`MockPeeringApi`] simulates the EC2 peering calls in memory. Clones
//! share state, so a test can keep a handle while the resource owns a boxed
//! copy.

#![allow(dead_code)]

use async_trait::async_trait;
use pcx_core::config::{PeeringConnectionConfig, WaitConfig};
use pcx_core::error::{ERR_CODE_PEERING_CONNECTION_NOT_FOUND, Error, Result};
use pcx_core::resource::{PeeringConnectionResource, ProviderMeta};
use pcx_core::tags::Tags;
use pcx_core::traits::{CreatePeeringRequest, ModifyOptionsRequest, PeeringApi};
use pcx_core::types::{
    PeeringConnection, PeeringOptionsDescription, PeeringOptionsRequest, PeeringStatus,
    StatusReason, VpcInfo,
};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};

pub const LOCAL_ACCOUNT: &str = "111111111111";
pub const PEER_ACCOUNT: &str = "222222222222";
pub const LOCAL_REGION: &str = "us-west-2";

#[derive(Debug, Default)]
struct MockState {
    connections: BTreeMap<String, PeeringConnection>,
    next_id: usize,
    /// Statuses applied by successive describe calls, per connection
    status_script: HashMap<String, VecDeque<PeeringStatus>>,
    /// Status a new connection starts in
    create_status: Option<PeeringStatus>,
    /// Status accept moves the connection to
    accept_status: Option<PeeringStatus>,
    /// Error returned by the next delete call
    delete_error: Option<(String, String)>,
    /// Error returned by the next accept call
    accept_error: Option<(String, String)>,
    /// Describe calls still to answer with not-found, as AWS does right
    /// after a create
    lagging_describes: usize,
    calls: Vec<String>,
    modify_requests: Vec<ModifyOptionsRequest>,
}

/// In-memory EC2 peering API
#[derive(Debug, Clone)]
pub struct MockPeeringApi {
    state: Arc<Mutex<MockState>>,
    account_id: String,
}

impl MockPeeringApi {
    pub fn new() -> Self {
        Self::for_account(LOCAL_ACCOUNT)
    }

    pub fn for_account(account_id: &str) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            account_id: account_id.to_string(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    /// Status a newly created connection starts in (default: pending-acceptance)
    pub fn set_create_status(&self, status: PeeringStatus) {
        self.lock().create_status = Some(status);
    }

    /// Status returned by accept (default: active)
    pub fn set_accept_status(&self, status: PeeringStatus) {
        self.lock().accept_status = Some(status);
    }

    /// Fail the next delete with the given AWS error
    pub fn fail_next_delete(&self, code: &str, message: &str) {
        self.lock().delete_error = Some((code.to_string(), message.to_string()));
    }

    /// Fail the next accept with the given AWS error
    pub fn fail_next_accept(&self, code: &str, message: &str) {
        self.lock().accept_error = Some((code.to_string(), message.to_string()));
    }

    /// Answer the next `count` describe calls with not-found
    pub fn lag_describes(&self, count: usize) {
        self.lock().lagging_describes = count;
    }

    /// Statuses the connection moves through on successive describe calls
    pub fn script_statuses(&self, id: &str, statuses: &[PeeringStatus]) {
        self.lock()
            .status_script
            .insert(id.to_string(), statuses.iter().cloned().collect());
    }

    /// Add a connection as if created by someone else
    pub fn insert(&self, pc: PeeringConnection) {
        let id = pc.id.clone().unwrap_or_default();
        self.lock().connections.insert(id, pc);
    }

    /// Store a connection under a different lookup ID
    pub fn insert_as(&self, id: &str, pc: PeeringConnection) {
        self.lock().connections.insert(id.to_string(), pc);
    }

    /// Change a connection's status behind our back
    pub fn set_status(&self, id: &str, status: PeeringStatus) {
        if let Some(pc) = self.lock().connections.get_mut(id) {
            pc.status = Some(status_reason(status, ""));
        }
    }

    /// Drop a connection entirely, as if AWS had purged it
    pub fn purge(&self, id: &str) {
        self.lock().connections.remove(id);
    }

    pub fn connection(&self, id: &str) -> Option<PeeringConnection> {
        self.lock().connections.get(id).cloned()
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self, name: &str) -> usize {
        self.lock().calls.iter().filter(|c| *c == name).count()
    }

    pub fn modify_requests(&self) -> Vec<ModifyOptionsRequest> {
        self.lock().modify_requests.clone()
    }

    fn record(&self, call: &str) {
        self.lock().calls.push(call.to_string());
    }
}

pub fn status_reason(code: PeeringStatus, message: &str) -> StatusReason {
    StatusReason {
        code: Some(code),
        message: Some(message.to_string()),
    }
}

fn not_found(id: &str) -> Error {
    Error::api(
        ERR_CODE_PEERING_CONNECTION_NOT_FOUND,
        format!("The vpcPeeringConnection ID '{}' does not exist", id),
    )
}

fn apply_options(desc: &mut Option<PeeringOptionsDescription>, req: &PeeringOptionsRequest) {
    let desc = desc.get_or_insert_with(Default::default);
    if let Some(v) = req.allow_dns_resolution_from_remote_vpc {
        desc.allow_dns_resolution_from_remote_vpc = Some(v);
    }
    if let Some(v) = req.allow_egress_from_local_classic_link_to_remote_vpc {
        desc.allow_egress_from_local_classic_link_to_remote_vpc = Some(v);
    }
    if let Some(v) = req.allow_egress_from_local_vpc_to_remote_classic_link {
        desc.allow_egress_from_local_vpc_to_remote_classic_link = Some(v);
    }
}

fn default_options() -> PeeringOptionsDescription {
    PeeringOptionsDescription {
        allow_dns_resolution_from_remote_vpc: Some(false),
        allow_egress_from_local_classic_link_to_remote_vpc: Some(false),
        allow_egress_from_local_vpc_to_remote_classic_link: Some(false),
    }
}

#[async_trait]
impl PeeringApi for MockPeeringApi {
    async fn caller_account_id(&self) -> Result<String> {
        self.record("caller_account_id");
        Ok(self.account_id.clone())
    }

    fn region(&self) -> &str {
        LOCAL_REGION
    }

    async fn create_peering_connection(
        &self,
        request: CreatePeeringRequest,
    ) -> Result<PeeringConnection> {
        self.record("create");
        let mut state = self.lock();
        state.next_id += 1;
        let id = format!("pcx-{:017x}", state.next_id);
        let status = state
            .create_status
            .clone()
            .unwrap_or(PeeringStatus::PendingAcceptance);

        let pc = PeeringConnection {
            id: Some(id.clone()),
            requester: VpcInfo {
                vpc_id: Some(request.vpc_id),
                owner_id: Some(self.account_id.clone()),
                region: Some(LOCAL_REGION.to_string()),
                peering_options: None,
            },
            accepter: VpcInfo {
                vpc_id: Some(request.peer_vpc_id),
                owner_id: Some(request.peer_owner_id.unwrap_or_else(|| self.account_id.clone())),
                region: Some(request.peer_region.unwrap_or_else(|| LOCAL_REGION.to_string())),
                peering_options: None,
            },
            status: Some(status_reason(status, "")),
            tags: request.tags,
        };
        state.connections.insert(id, pc.clone());
        Ok(pc)
    }

    async fn describe_peering_connections(&self, id: &str) -> Result<Vec<PeeringConnection>> {
        self.record("describe");
        let mut state = self.lock();
        if state.lagging_describes > 0 {
            state.lagging_describes -= 1;
            return Err(not_found(id));
        }

        let next = state.status_script.get_mut(id).and_then(|s| s.pop_front());
        let pc = state.connections.get_mut(id).ok_or_else(|| not_found(id))?;
        if let Some(status) = next {
            if status == PeeringStatus::Active {
                pc.accepter.peering_options.get_or_insert_with(default_options);
                pc.requester.peering_options.get_or_insert_with(default_options);
            }
            pc.status = Some(status_reason(status, ""));
        }
        Ok(vec![pc.clone()])
    }

    async fn accept_peering_connection(&self, id: &str) -> Result<Option<PeeringStatus>> {
        self.record("accept");
        let mut state = self.lock();
        if let Some((code, message)) = state.accept_error.take() {
            return Err(Error::api(code, message));
        }
        let status = state.accept_status.clone().unwrap_or(PeeringStatus::Active);
        let pc = state.connections.get_mut(id).ok_or_else(|| not_found(id))?;

        pc.accepter.peering_options = Some(default_options());
        pc.requester.peering_options = Some(default_options());
        pc.status = Some(status_reason(status.clone(), ""));
        Ok(Some(status))
    }

    async fn modify_peering_options(&self, request: ModifyOptionsRequest) -> Result<()> {
        self.record("modify");
        let mut state = self.lock();
        state.modify_requests.push(request.clone());
        let pc = state
            .connections
            .get_mut(&request.id)
            .ok_or_else(|| not_found(&request.id))?;

        if let Some(req) = &request.accepter {
            apply_options(&mut pc.accepter.peering_options, req);
        }
        if let Some(req) = &request.requester {
            apply_options(&mut pc.requester.peering_options, req);
        }
        Ok(())
    }

    async fn delete_peering_connection(&self, id: &str) -> Result<()> {
        self.record("delete");
        let mut state = self.lock();
        if let Some((code, message)) = state.delete_error.take() {
            return Err(Error::api(code, message));
        }

        let pc = state.connections.get_mut(id).ok_or_else(|| not_found(id))?;
        pc.status = Some(status_reason(PeeringStatus::Deleted, "Deleted by 111111111111"));
        Ok(())
    }

    async fn create_tags(&self, id: &str, tags: &Tags) -> Result<()> {
        self.record("create_tags");
        let mut state = self.lock();
        let pc = state.connections.get_mut(id).ok_or_else(|| not_found(id))?;
        for (k, v) in tags.iter() {
            pc.tags.insert(k, v);
        }
        Ok(())
    }

    async fn delete_tags(&self, id: &str, keys: &[String]) -> Result<()> {
        self.record("delete_tags");
        let mut state = self.lock();
        let pc = state.connections.get_mut(id).ok_or_else(|| not_found(id))?;
        pc.tags = pc
            .tags
            .iter()
            .filter(|(k, _)| !keys.iter().any(|key| key.as_str() == *k))
            .collect();
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "mock"
    }
}

/// Polling settings that keep tests fast
pub fn fast_wait() -> WaitConfig {
    WaitConfig {
        poll_interval_ms: Some(1),
        ..Default::default()
    }
}

pub fn meta() -> ProviderMeta {
    ProviderMeta {
        account_id: LOCAL_ACCOUNT.to_string(),
        region: LOCAL_REGION.to_string(),
        wait: fast_wait(),
        ..Default::default()
    }
}

/// Resource handlers over a shared mock API
pub fn resource(api: &MockPeeringApi) -> PeeringConnectionResource {
    PeeringConnectionResource::new(Box::new(api.clone()), meta())
}

/// Same-account, same-region peering of vpc-11111111 to vpc-22222222
pub fn minimal_config() -> PeeringConnectionConfig {
    let mut config = PeeringConnectionConfig::new("vpc-11111111", "vpc-22222222");
    config.timeouts.create_secs = 5;
    config.timeouts.update_secs = 5;
    config.timeouts.delete_secs = 5;
    config
}

/// A connection requested by the peer account towards our VPC
pub fn incoming_connection(id: &str, status: PeeringStatus) -> PeeringConnection {
    PeeringConnection {
        id: Some(id.to_string()),
        requester: VpcInfo {
            vpc_id: Some("vpc-peer0001".to_string()),
            owner_id: Some(PEER_ACCOUNT.to_string()),
            region: Some(LOCAL_REGION.to_string()),
            peering_options: Some(default_options()),
        },
        accepter: VpcInfo {
            vpc_id: Some("vpc-local001".to_string()),
            owner_id: Some(LOCAL_ACCOUNT.to_string()),
            region: Some(LOCAL_REGION.to_string()),
            peering_options: Some(PeeringOptionsDescription {
                allow_dns_resolution_from_remote_vpc: Some(true),
                ..default_options()
            }),
        },
        status: Some(status_reason(status, "")),
        tags: [("Name", "incoming"), ("aws:cloudformation:stack-name", "net")]
            .into_iter()
            .collect(),
    }
}

/// Create a connection through the handlers and return its data
pub async fn create(
    resource: &PeeringConnectionResource,
    config: PeeringConnectionConfig,
) -> pcx_core::ResourceData {
    let mut d = pcx_core::ResourceData::new(config, &resource.meta().default_tags);
    resource.create(&mut d).await.expect("create succeeds");
    d
}

//! Contract Test: Update Reconciliation
//!
//! Constraints verified:
//! - Auto-accept fires only when the status is exactly pending-acceptance
//! - Option changes are refused unless the connection is active or
//!   provisioning, with an error telling the user how to fix it
//! - Cross-region peering only sends the DNS resolution flag
//! - `peer_region` and `auto_accept` conflict on create
//! - Tag changes on existing connections become create/delete tag calls

mod common;

use common::*;
use pcx_core::Error;
use pcx_core::resource::ResourceData;
use pcx_core::tags::DefaultTagsConfig;
use pcx_core::types::{PeeringOptions, PeeringOptionsRequest, PeeringStatus};

fn dns_only() -> PeeringOptions {
    PeeringOptions {
        allow_remote_vpc_dns_resolution: true,
        ..Default::default()
    }
}

#[tokio::test]
async fn auto_accept_on_create_accepts_and_waits() {
    let api = MockPeeringApi::new();
    let resource = resource(&api);

    let state = create(&resource, minimal_config().with_auto_accept(true))
        .await
        .into_state()
        .unwrap();

    assert_eq!(api.call_count("accept"), 1);
    assert_eq!(state.accept_status, Some(PeeringStatus::Active));
    assert!(state.auto_accept);
    assert_eq!(state.accepter, Some(PeeringOptions::default()));
}

#[tokio::test]
async fn auto_accept_waits_through_provisioning() {
    let api = MockPeeringApi::new();
    api.set_accept_status(PeeringStatus::Provisioning);
    let resource = resource(&api);

    let prior = create(&resource, minimal_config()).await.into_state().unwrap();
    api.script_statuses(
        &prior.id,
        &[
            // update's own status refresh
            PeeringStatus::PendingAcceptance,
            PeeringStatus::Provisioning,
            PeeringStatus::Active,
        ],
    );

    let mut d = ResourceData::existing(
        prior,
        minimal_config().with_auto_accept(true),
        &DefaultTagsConfig::default(),
    );
    resource.update(&mut d).await.unwrap();

    assert_eq!(api.call_count("accept"), 1);
    assert_eq!(d.state().accept_status, Some(PeeringStatus::Active));
}

#[tokio::test]
async fn auto_accept_skips_active_connections() {
    let api = MockPeeringApi::new();
    api.set_create_status(PeeringStatus::Active);
    let resource = resource(&api);

    create(&resource, minimal_config().with_auto_accept(true)).await;

    assert_eq!(api.call_count("accept"), 0);
}

#[tokio::test]
async fn without_auto_accept_connection_stays_pending() {
    let api = MockPeeringApi::new();
    let resource = resource(&api);

    let state = create(&resource, minimal_config()).await.into_state().unwrap();

    assert_eq!(api.call_count("accept"), 0);
    assert_eq!(state.accept_status, Some(PeeringStatus::PendingAcceptance));
}

#[tokio::test]
async fn option_change_on_pending_connection_is_refused() {
    let api = MockPeeringApi::new();
    let resource = resource(&api);
    let prior = create(&resource, minimal_config()).await.into_state().unwrap();
    let id = prior.id.clone();

    let mut d = ResourceData::existing(
        prior,
        minimal_config().with_accepter(dns_only()),
        &DefaultTagsConfig::default(),
    );
    let err = resource.update(&mut d).await.unwrap_err();

    assert!(matches!(err, Error::NotActive(_)));
    assert_eq!(
        err.to_string(),
        format!(
            "Unable to modify peering options. The VPC Peering Connection \"{id}\" is not active. \
             Please set `auto_accept` attribute to `true`, or activate VPC Peering Connection manually."
        )
    );
    assert_eq!(api.call_count("modify"), 0);
}

#[tokio::test]
async fn option_change_on_provisioning_connection_is_sent() {
    let api = MockPeeringApi::new();
    let resource = resource(&api);
    let prior = create(&resource, minimal_config()).await.into_state().unwrap();
    api.set_status(&prior.id, PeeringStatus::Provisioning);

    let mut d = ResourceData::existing(
        prior,
        minimal_config().with_requester(dns_only()),
        &DefaultTagsConfig::default(),
    );
    resource.update(&mut d).await.unwrap();

    let requests = api.modify_requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].accepter.is_none(), "unchanged side is not sent");
    assert_eq!(
        requests[0].requester,
        Some(PeeringOptionsRequest {
            allow_dns_resolution_from_remote_vpc: Some(true),
            allow_egress_from_local_classic_link_to_remote_vpc: Some(false),
            allow_egress_from_local_vpc_to_remote_classic_link: Some(false),
        })
    );
    assert_eq!(d.state().requester, Some(dns_only()));
}

#[tokio::test]
async fn cross_region_sends_only_dns_flag() {
    let api = MockPeeringApi::new();
    let resource = resource(&api);
    let prior = create(&resource, minimal_config().with_peer_region("eu-west-1"))
        .await
        .into_state()
        .unwrap();
    assert_eq!(prior.peer_region.as_deref(), Some("eu-west-1"));
    api.set_status(&prior.id, PeeringStatus::Active);

    let mut d = ResourceData::existing(
        prior,
        minimal_config()
            .with_peer_region("eu-west-1")
            .with_accepter(PeeringOptions {
                allow_remote_vpc_dns_resolution: true,
                allow_classic_link_to_remote_vpc: true,
                allow_vpc_to_remote_classic_link: true,
            }),
        &DefaultTagsConfig::default(),
    );
    resource.update(&mut d).await.unwrap();

    let requests = api.modify_requests();
    assert_eq!(
        requests[0].accepter,
        Some(PeeringOptionsRequest {
            allow_dns_resolution_from_remote_vpc: Some(true),
            ..Default::default()
        })
    );
}

#[tokio::test]
async fn peer_region_with_auto_accept_is_rejected_on_create() {
    let api = MockPeeringApi::new();
    let resource = resource(&api);

    let mut d = ResourceData::new(
        minimal_config()
            .with_peer_region("eu-west-1")
            .with_auto_accept(true),
        &DefaultTagsConfig::default(),
    );
    let err = resource.create(&mut d).await.unwrap_err();

    assert!(matches!(err, Error::Config(_)));
    assert!(err.to_string().contains("`peer_region` cannot be set whilst `auto_accept` is `true`"));
    assert_eq!(api.call_count("create"), 0);
}

#[tokio::test]
async fn tag_changes_are_pushed_as_a_diff() {
    let api = MockPeeringApi::new();
    let resource = resource(&api);
    let prior = create(
        &resource,
        minimal_config().with_tag("Name", "old").with_tag("stale", "x"),
    )
    .await
    .into_state()
    .unwrap();
    let id = prior.id.clone();

    let mut d = ResourceData::existing(
        prior,
        minimal_config().with_tag("Name", "new").with_tag("env", "prod"),
        &DefaultTagsConfig::default(),
    );
    resource.update(&mut d).await.unwrap();

    assert_eq!(api.call_count("delete_tags"), 1);
    assert_eq!(api.call_count("create_tags"), 1);

    let tags = api.connection(&id).unwrap().tags;
    assert_eq!(tags.get("Name"), Some("new"));
    assert_eq!(tags.get("env"), Some("prod"));
    assert_eq!(tags.get("stale"), None);
    assert_eq!(d.state().tags, tags);
}

#[tokio::test]
async fn create_sends_default_tags_but_state_keeps_them_apart() {
    let api = MockPeeringApi::new();
    let mut meta = meta();
    meta.default_tags = DefaultTagsConfig {
        tags: [("team", "net")].into_iter().collect(),
    };
    let resource = pcx_core::PeeringConnectionResource::new(Box::new(api.clone()), meta);

    let d = create(&resource, minimal_config().with_tag("Name", "main")).await;
    let state = d.into_state().unwrap();

    let sent = api.connection(&state.id).unwrap().tags;
    assert_eq!(sent.get("team"), Some("net"));
    assert_eq!(state.tags.get("team"), None);
    assert_eq!(state.tags_all.get("team"), Some("net"));
    assert_eq!(api.call_count("create_tags"), 0, "new resources tag on create");
}

#[tokio::test]
async fn update_of_vanished_connection_clears_id() {
    let api = MockPeeringApi::new();
    let resource = resource(&api);
    let prior = create(&resource, minimal_config()).await.into_state().unwrap();
    api.purge(&prior.id);

    let mut d = ResourceData::existing(
        prior,
        minimal_config().with_auto_accept(true),
        &DefaultTagsConfig::default(),
    );
    resource.update(&mut d).await.unwrap();

    assert!(d.into_state().is_none());
    assert_eq!(api.call_count("accept"), 0);
}

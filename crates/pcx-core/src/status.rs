//! Status polling for peering connections
//!
//! [`refresh_status`] is the single status source behind every waiter:
//!
//! | API outcome | Result |
//! |---|---|
//! | `InvalidVpcPeeringConnectionID.NotFound` | `(None, "deleted")` |
//! | empty list / missing status | `(None, "")`, retry |
//! | status `failed` | error with the AWS status message |
//! | anything else | `(Some(pc), code)` |

use std::time::Duration;
use tracing::debug;

use crate::config::WaitConfig;
use crate::error::{ERR_CODE_PEERING_CONNECTION_NOT_FOUND, Error, Result};
use crate::traits::PeeringApi;
use crate::types::{PeeringConnection, PeeringStatus};
use crate::waiter::StateChangeConf;

/// Query the API and normalize the connection status
pub async fn refresh_status(
    api: &dyn PeeringApi,
    id: &str,
) -> Result<(Option<PeeringConnection>, String)> {
    let connections = match api.describe_peering_connections(id).await {
        Ok(connections) => connections,
        Err(e) if e.code_equals(ERR_CODE_PEERING_CONNECTION_NOT_FOUND) => {
            return Ok((None, PeeringStatus::Deleted.to_string()));
        }
        Err(e) => return Err(e),
    };

    // The API can lag behind a fresh create; report an empty state and let
    // the caller poll again.
    let Some(pc) = connections.into_iter().next() else {
        return Ok((None, String::new()));
    };
    let Some(code) = pc.status_code().cloned() else {
        return Ok((None, String::new()));
    };

    // A connection fails for a wrong VPC ID, account ID or overlapping CIDR
    // blocks; stop here instead of running into the timeout.
    if code == PeeringStatus::Failed {
        return Err(Error::PeeringFailed(pc.status_message().to_string()));
    }

    Ok((Some(pc), code.to_string()))
}

/// Find a live peering connection by ID
///
/// Terminal statuses (deleted, expired, failed, rejected), an empty result
/// and an ID mismatch all count as not found.
pub async fn find_by_id(api: &dyn PeeringApi, id: &str) -> Result<PeeringConnection> {
    let connections = match api.describe_peering_connections(id).await {
        Ok(connections) => connections,
        Err(e) if e.is_not_found() => {
            return Err(Error::not_found(format!("EC2 VPC Peering Connection {}", id)));
        }
        Err(e) => return Err(e),
    };

    let pc = connections
        .into_iter()
        .next()
        .ok_or_else(|| Error::not_found(format!("EC2 VPC Peering Connection {}: empty result", id)))?;

    let code = pc
        .status_code()
        .ok_or_else(|| Error::not_found(format!("EC2 VPC Peering Connection {}: no status", id)))?;

    if code.is_terminal() {
        return Err(Error::not_found(format!(
            "EC2 VPC Peering Connection {}: {}",
            id, code
        )));
    }

    if pc.id.as_deref() != Some(id) {
        return Err(Error::not_found(format!(
            "EC2 VPC Peering Connection {}: ID mismatch",
            id
        )));
    }

    Ok(pc)
}

fn statuses(list: &[PeeringStatus]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Waiter for a new connection to leave its initial states
pub fn active_waiter(timeout: Duration, wait: &WaitConfig) -> StateChangeConf {
    StateChangeConf::new(
        statuses(&[PeeringStatus::InitiatingRequest, PeeringStatus::Provisioning]),
        statuses(&[PeeringStatus::PendingAcceptance, PeeringStatus::Active]),
        timeout,
    )
    .with_wait_config(wait)
}

/// Waiter for a connection to disappear
pub fn deleted_waiter(timeout: Duration, wait: &WaitConfig) -> StateChangeConf {
    StateChangeConf::new(
        statuses(&[
            PeeringStatus::Active,
            PeeringStatus::Deleting,
            PeeringStatus::PendingAcceptance,
            PeeringStatus::Provisioning,
        ]),
        statuses(&[
            PeeringStatus::Deleted,
            PeeringStatus::Rejected,
            PeeringStatus::Expired,
        ]),
        timeout,
    )
    .with_wait_config(wait)
}

/// Wait until a freshly created connection is pending acceptance or active
pub async fn wait_active(
    api: &dyn PeeringApi,
    id: &str,
    timeout: Duration,
    wait: &WaitConfig,
) -> Result<Option<PeeringConnection>> {
    debug!("Waiting for EC2 VPC Peering Connection ({}) to become active", id);
    active_waiter(timeout, wait)
        .wait_for_state(|| refresh_status(api, id))
        .await
}

/// Wait until an accepted connection is available again
///
/// Accepting moves the connection through provisioning; options can only be
/// modified once it settles.
pub async fn wait_available(
    api: &dyn PeeringApi,
    id: &str,
    timeout: Duration,
    wait: &WaitConfig,
) -> Result<Option<PeeringConnection>> {
    debug!("Waiting for VPC Peering Connection ({}) to become available", id);
    active_waiter(timeout, wait)
        .wait_for_state(|| refresh_status(api, id))
        .await
}

/// Wait until a connection reaches a terminal deleted state
pub async fn wait_deleted(
    api: &dyn PeeringApi,
    id: &str,
    timeout: Duration,
    wait: &WaitConfig,
) -> Result<Option<PeeringConnection>> {
    debug!("Waiting for EC2 VPC Peering Connection ({}) to be deleted", id);
    deleted_waiter(timeout, wait)
        .wait_for_state(|| refresh_status(api, id))
        .await
}

//! Lifecycle driver
//!
//! [`Lifecycle`] reconciles configured peering connections with AWS:
//! - Refreshing recorded state from AWS
//! - Planning create / replace / update / no-op
//! - Running the resource handlers
//! - Persisting the resulting state
//!
//! ## Architecture
//!
//! ```text
//!  PcxConfig.resources
//!          │
//!          ▼
//!  ┌──────────────┐   refresh/plan   ┌─────────────┐
//!  │  Lifecycle   │ ◄──────────────► │ StateStore  │
//!  └──────────────┘                  └─────────────┘
//!          │
//!          ├──────────────────────────────┐
//!          ▼                              ▼
//!  ┌───────────────────────────┐  ┌─────────────┐
//!  │ PeeringConnectionResource │  │   Events    │
//!  │ (create/read/update/del)  │  │  (notify)   │
//!  └───────────────────────────┘  └─────────────┘
//! ```
//!
//! ## Apply Flow
//!
//! 1. Refresh the recorded state; a connection gone from AWS is forgotten
//! 2. Plan against the configuration
//! 3. Run the handlers for the plan
//! 4. Record the new state, or delete the record when the ID was cleared
//! 5. Emit an event for monitoring/logging

use std::fmt;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, trace, warn};

use crate::config::{PcxConfig, PeeringConnectionConfig, TimeoutsConfig};
use crate::error::{Error, Result};
use crate::resource::{PeeringConnectionResource, PeeringConnectionState, ResourceData};
use crate::schema::{ResourceSchema, resource_schema};
use crate::traits::StateStore;

/// Default capacity of the lifecycle event channel
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 64;

/// What applying a configuration to a resource will do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    /// No recorded state: create the connection
    Create,
    /// A force-new attribute changed: delete, then create
    Replace {
        /// Attributes forcing the replacement
        attributes: Vec<&'static str>,
    },
    /// Tags, options or auto_accept changed: update in place
    Update,
    /// Nothing to do
    NoOp,
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Plan::Create => write!(f, "create"),
            Plan::Replace { attributes } => write!(f, "replace ({})", attributes.join(", ")),
            Plan::Update => write!(f, "update in-place"),
            Plan::NoOp => write!(f, "no changes"),
        }
    }
}

/// Events emitted by the Lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// A plan was computed
    Planned { name: String, plan: Plan },

    /// A connection was created
    Created { name: String, id: String },

    /// A connection was updated in place
    Updated { name: String, id: String },

    /// A connection was replaced
    Replaced {
        name: String,
        old_id: String,
        new_id: String,
    },

    /// Recorded and configured state already match
    Unchanged { name: String, id: String },

    /// A connection was deleted
    Deleted { name: String, id: String },

    /// A recorded connection no longer exists in AWS
    Vanished { name: String, id: String },

    /// An existing connection was imported
    Imported { name: String, id: String },

    /// An operation failed
    Failed { name: String, error: String },
}

/// Outcome of [`Lifecycle::apply_all`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplySummary {
    /// Resources created, updated or replaced
    pub changed: Vec<String>,
    /// Resources already up to date
    pub unchanged: Vec<String>,
    /// Recorded resources no longer configured, now destroyed
    pub destroyed: Vec<String>,
    /// Resources whose operation failed, with the error message
    pub failed: Vec<(String, String)>,
}

impl ApplySummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Lifecycle driver
///
/// Owns the resource handlers and the state store. Operations on different
/// resource names are independent; operations on one name must not run
/// concurrently.
pub struct Lifecycle {
    resource: PeeringConnectionResource,
    state_store: Box<dyn StateStore>,
    schema: ResourceSchema,
    event_tx: mpsc::Sender<LifecycleEvent>,
}

impl Lifecycle {
    /// Create a lifecycle driver
    ///
    /// # Returns
    ///
    /// A tuple of (lifecycle, event_receiver) where event_receiver yields
    /// lifecycle events
    pub fn new(
        resource: PeeringConnectionResource,
        state_store: Box<dyn StateStore>,
        event_channel_capacity: usize,
    ) -> Result<(Self, mpsc::Receiver<LifecycleEvent>)> {
        if event_channel_capacity == 0 {
            return Err(Error::config("event channel capacity must be > 0"));
        }

        let (tx, rx) = mpsc::channel(event_channel_capacity);
        let lifecycle = Self {
            resource,
            state_store,
            schema: resource_schema(),
            event_tx: tx,
        };

        Ok((lifecycle, rx))
    }

    pub fn resource(&self) -> &PeeringConnectionResource {
        &self.resource
    }

    pub fn state_store(&self) -> &dyn StateStore {
        self.state_store.as_ref()
    }

    /// Recorded state of a resource, without contacting AWS
    pub async fn recorded(&self, name: &str) -> Result<Option<PeeringConnectionState>> {
        Ok(self.state_store.get_record(name).await?.map(|r| r.state))
    }

    /// Re-read a recorded resource from AWS and record the result
    ///
    /// Returns `None` when nothing is recorded or the connection is gone.
    pub async fn refresh(&self, name: &str) -> Result<Option<PeeringConnectionState>> {
        let Some(prior) = self.recorded(name).await? else {
            return Ok(None);
        };
        let id = prior.id.clone();

        debug!("Refreshing {} ({})", name, id);
        let mut d = ResourceData::from_state(prior, TimeoutsConfig::default());
        self.resource.read(&mut d).await?;

        match d.into_state() {
            Some(state) => {
                self.state_store.set_state(name, &state).await?;
                Ok(Some(state))
            }
            None => {
                self.state_store.delete_record(name).await?;
                self.emit_event(LifecycleEvent::Vanished {
                    name: name.to_string(),
                    id,
                });
                Ok(None)
            }
        }
    }

    /// Plan `config` against the recorded state, without contacting AWS
    pub async fn plan(&self, name: &str, config: &PeeringConnectionConfig) -> Result<Plan> {
        let prior = self.recorded(name).await?;
        Ok(self.plan_against(prior, config))
    }

    fn plan_against(
        &self,
        prior: Option<PeeringConnectionState>,
        config: &PeeringConnectionConfig,
    ) -> Plan {
        let Some(prior) = prior else {
            return Plan::Create;
        };

        let d = ResourceData::existing(
            prior,
            config.clone(),
            &self.resource.meta().default_tags,
        );

        let attributes = d.force_new_changes(&self.schema);
        if !attributes.is_empty() {
            Plan::Replace { attributes }
        } else if d.has_changes() {
            Plan::Update
        } else {
            Plan::NoOp
        }
    }

    /// Bring one resource in line with its configuration
    ///
    /// Returns the recorded state afterwards, `None` if the connection
    /// vanished during the update.
    pub async fn apply(
        &self,
        name: &str,
        config: &PeeringConnectionConfig,
    ) -> Result<Option<PeeringConnectionState>> {
        self.apply_planned(name, config).await.map(|(_, state)| state)
    }

    async fn apply_planned(
        &self,
        name: &str,
        config: &PeeringConnectionConfig,
    ) -> Result<(Plan, Option<PeeringConnectionState>)> {
        let result = self.execute(name, config).await;
        if let Err(e) = &result {
            self.emit_event(LifecycleEvent::Failed {
                name: name.to_string(),
                error: e.to_string(),
            });
        }
        result
    }

    async fn execute(
        &self,
        name: &str,
        config: &PeeringConnectionConfig,
    ) -> Result<(Plan, Option<PeeringConnectionState>)> {
        config.validate()?;

        let prior = self.refresh(name).await?;
        let plan = self.plan_against(prior.clone(), config);
        info!("{}: {}", name, plan);
        self.emit_event(LifecycleEvent::Planned {
            name: name.to_string(),
            plan: plan.clone(),
        });

        let state = match (plan.clone(), prior) {
            (Plan::NoOp, Some(prior)) => {
                self.emit_event(LifecycleEvent::Unchanged {
                    name: name.to_string(),
                    id: prior.id.clone(),
                });
                Some(prior)
            }
            (Plan::Update, Some(prior)) => {
                let mut d = ResourceData::existing(
                    prior,
                    config.clone(),
                    &self.resource.meta().default_tags,
                );
                let outcome = self.resource.update(&mut d).await;
                let state = self.record(name, d).await?;
                outcome?;
                if let Some(state) = &state {
                    self.emit_event(LifecycleEvent::Updated {
                        name: name.to_string(),
                        id: state.id.clone(),
                    });
                }
                state
            }
            (Plan::Replace { .. }, Some(prior)) => {
                let old_id = prior.id.clone();
                self.delete_recorded(name, prior, config.timeouts).await?;
                let state = self.create(name, config).await?;
                self.emit_event(LifecycleEvent::Replaced {
                    name: name.to_string(),
                    old_id,
                    new_id: state.as_ref().map(|s| s.id.clone()).unwrap_or_default(),
                });
                state
            }
            _ => {
                let state = self.create(name, config).await?;
                if let Some(state) = &state {
                    self.emit_event(LifecycleEvent::Created {
                        name: name.to_string(),
                        id: state.id.clone(),
                    });
                }
                state
            }
        };

        Ok((plan, state))
    }

    /// Apply every configured resource, then destroy recorded resources that
    /// are no longer configured
    ///
    /// A failure on one resource does not stop the others.
    pub async fn apply_all(&self, config: &PcxConfig) -> Result<ApplySummary> {
        let mut summary = ApplySummary::default();

        for (name, resource_config) in &config.resources {
            match self.apply_planned(name, resource_config).await {
                Ok((Plan::NoOp, _)) => summary.unchanged.push(name.clone()),
                Ok(_) => summary.changed.push(name.clone()),
                Err(e) => {
                    error!("Failed to apply {}: {}", name, e);
                    summary.failed.push((name.clone(), e.to_string()));
                }
            }
        }

        for name in self.state_store.list_records().await? {
            if config.resources.contains_key(&name) {
                continue;
            }

            info!("{} is no longer configured, destroying", name);
            match self.destroy(&name, TimeoutsConfig::default()).await {
                Ok(()) => summary.destroyed.push(name),
                Err(e) => {
                    error!("Failed to destroy {}: {}", name, e);
                    summary.failed.push((name, e.to_string()));
                }
            }
        }

        self.state_store.flush().await?;
        Ok(summary)
    }

    /// Delete a recorded connection and forget it
    ///
    /// `timeouts` come from the resource's configuration; records that are
    /// no longer configured use the defaults.
    pub async fn destroy(&self, name: &str, timeouts: TimeoutsConfig) -> Result<()> {
        let Some(prior) = self.recorded(name).await? else {
            debug!("{} has no recorded state, nothing to destroy", name);
            return Ok(());
        };

        let result = self.delete_recorded(name, prior, timeouts).await;
        if let Err(e) = &result {
            self.emit_event(LifecycleEvent::Failed {
                name: name.to_string(),
                error: e.to_string(),
            });
        }
        result
    }

    /// Adopt an existing connection under `name`
    pub async fn import(&self, name: &str, id: &str) -> Result<PeeringConnectionState> {
        if let Some(existing) = self.recorded(name).await? {
            return Err(Error::invalid_input(format!(
                "{} is already managed as {}",
                name, existing.id
            )));
        }

        let d = self.resource.import(id).await?;
        let state = d
            .into_state()
            .ok_or_else(|| Error::not_found(format!("EC2 VPC Peering Connection {}", id)))?;

        self.state_store.set_state(name, &state).await?;
        info!("Imported {} as {}", id, name);
        self.emit_event(LifecycleEvent::Imported {
            name: name.to_string(),
            id: id.to_string(),
        });
        Ok(state)
    }

    async fn create(
        &self,
        name: &str,
        config: &PeeringConnectionConfig,
    ) -> Result<Option<PeeringConnectionState>> {
        let mut d = ResourceData::new(config.clone(), &self.resource.meta().default_tags);
        let outcome = self.resource.create(&mut d).await;

        // Record the ID even when waiting failed, so the connection is not
        // orphaned
        let state = self.record(name, d).await?;
        outcome.map(|()| state)
    }

    async fn delete_recorded(
        &self,
        name: &str,
        prior: PeeringConnectionState,
        timeouts: TimeoutsConfig,
    ) -> Result<()> {
        let id = prior.id.clone();
        let mut d = ResourceData::from_state(prior, timeouts);

        self.resource.delete(&mut d).await?;
        self.state_store.delete_record(name).await?;

        self.emit_event(LifecycleEvent::Deleted {
            name: name.to_string(),
            id,
        });
        Ok(())
    }

    /// Persist handler output; a cleared ID removes the record
    async fn record(
        &self,
        name: &str,
        d: ResourceData,
    ) -> Result<Option<PeeringConnectionState>> {
        match d.into_state() {
            Some(state) => {
                self.state_store.set_state(name, &state).await?;
                Ok(Some(state))
            }
            None => {
                self.state_store.delete_record(name).await?;
                Ok(None)
            }
        }
    }

    fn emit_event(&self, event: LifecycleEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!("Event channel full, dropping event: {:?}", event);
            }
            Err(TrySendError::Closed(_)) => {
                trace!("Event receiver dropped");
            }
        }
    }
}

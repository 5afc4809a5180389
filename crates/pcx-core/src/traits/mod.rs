//! Core traits
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`PeeringApi`]: The EC2 VPC peering API calls
//! - [`StateStore`]: Persistent resource state

pub mod peering_api;
pub mod state_store;

pub use peering_api::{CreatePeeringRequest, ModifyOptionsRequest, PeeringApi, PeeringApiFactory};
pub use state_store::{StateRecord, StateStore};

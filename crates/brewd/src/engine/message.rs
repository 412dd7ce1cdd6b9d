//! Type-safe message system for brewd
//!
//! Messages are split by direction to enforce correct usage at compile time:
//! - `FromIntegrationMessage`: Events from integrations to the engine
//! - `ToIntegrationMessage`: Commands from the engine to integrations

use tokio::sync::oneshot;

use super::device::Device;
use super::service::ServiceCall;
use super::service::ServiceError;
use super::state::EntityState;
use super::state::Issue;

/// Messages FROM integrations TO the engine (events/state updates)
#[derive(Debug)]
pub enum FromIntegrationMessage {
    /// A device was registered (or its metadata changed)
    DeviceRegistered { device: Device },

    /// An entity was discovered and registered
    EntityDiscovered {
        entity_id: String,
        device_id: Option<String>,
        integration_name: String,
    },

    /// An entity's rendered state changed
    EntityStateChanged {
        entity_id: String,
        state: EntityState,
    },

    /// A non-fatal advisory should be shown to the user
    IssueRaised { issue: Issue },
}

/// Messages FROM the engine TO integrations (commands)
#[derive(Debug)]
pub enum ToIntegrationMessage {
    /// Execute a service call and report the outcome on `reply`
    ServiceCall {
        call: ServiceCall,
        reply: oneshot::Sender<Result<(), ServiceError>>,
    },
}

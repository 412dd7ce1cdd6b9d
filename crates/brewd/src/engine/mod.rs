pub mod device;
#[allow(clippy::module_inception)]
mod engine;
mod integration;
mod message;
pub mod service;
pub mod state;

pub use device::Device;
pub use engine::Engine;
pub use integration::FromIntegrationSender;
pub use integration::Integration;
pub use integration::IntegrationContext;
pub use integration::IntegrationFactoryResult;
pub use integration::REGISTRY as INTEGRATION_REGISTRY;
pub use message::FromIntegrationMessage;
pub use message::ToIntegrationMessage;
pub use service::ServiceCall;
pub use service::ServiceError;
pub use state::EntityState;
pub use state::Issue;
pub use state::IssueSeverity;
pub use state::State;

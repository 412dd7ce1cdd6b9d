use serde::Deserialize;
use serde::Serialize;

/// A service call targeted at a single entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceCall {
    /// Service domain, e.g. "switch" or an integration domain.
    pub domain: String,

    /// Service name within the domain, e.g. "turn_on".
    pub service: String,

    pub entity_id: String,

    /// Service arguments; validated by the entity that handles the call.
    #[serde(default)]
    pub data: serde_json::Value,
}

impl ServiceCall {
    pub fn new(domain: &str, service: &str, entity_id: &str, data: serde_json::Value) -> Self {
        Self {
            domain: domain.to_string(),
            service: service.to_string(),
            entity_id: entity_id.to_string(),
            data,
        }
    }

    /// Fully qualified "domain.service" name.
    pub fn name(&self) -> String {
        format!("{}.{}", self.domain, self.service)
    }
}

/// Errors surfaced to the caller of a service.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ServiceError {
    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    #[error("Integration not available: {0}")]
    IntegrationUnavailable(String),

    #[error("Service {service} is not supported by {entity_id}")]
    NotSupported { service: String, entity_id: String },

    #[error("Invalid service data: {0}")]
    InvalidData(String),

    /// The call reached the device but failed there.
    #[error("{0}")]
    Failed(String),
}

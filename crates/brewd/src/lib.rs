pub mod api;
pub mod config;
mod engine;
mod integrations;
pub mod store;

pub use config::Config;
pub use config::ConfigError;
pub use config::LogLevel;
pub use engine::Engine;
pub use engine::EntityState;
pub use engine::ServiceCall;
pub use engine::ServiceError;
pub use engine::State;
pub use store::ConfigEntry;
pub use store::EntryStore;

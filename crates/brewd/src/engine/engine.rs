use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::integration::FromIntegrationReceiver;
use super::integration::FromIntegrationSender;
use super::integration::Integration;
use super::integration::IntegrationContext;
use super::integration::ToIntegrationSender;
use super::message::FromIntegrationMessage;
use super::message::ToIntegrationMessage;
use super::service::ServiceCall;
use super::service::ServiceError;
use super::state::State;
use crate::config::Config;
use crate::store::EntryStore;

/// brewd engine
///
/// This structure handles the flow of events, routes service calls to the
/// integration that owns the target entity, and maintains a view of the
/// world with State.
pub struct Engine {
    /// Centralized state snapshot (readers load the Arc, writers store a new one)
    state: ArcSwap<State>,

    /// Map of entity_id -> integration name for routing service calls
    entity_integration_map: std::sync::Mutex<HashMap<String, String>>,

    /// Communication channels to integrations (for commands)
    integration_channels: std::sync::Mutex<HashMap<String, ToIntegrationSender>>,

    /// Receive messages from integrations (events)
    message_rx: Mutex<FromIntegrationReceiver>,

    /// Sender for integrations to report events back to the engine
    message_tx: FromIntegrationSender,

    /// Handles for integration tasks, keyed by integration name
    integration_handles: std::sync::Mutex<HashMap<String, JoinHandle<()>>>,
}

/// Capacity for the integration→engine message channel
/// Provides backpressure when integrations send faster than the engine can process
const FROM_INTEGRATION_CHANNEL_SIZE: usize = 1024;

impl Engine {
    /// Create a new Engine instance
    pub fn new() -> Self {
        let (message_tx, message_rx) = mpsc::channel(FROM_INTEGRATION_CHANNEL_SIZE);
        Self {
            state: ArcSwap::new(Arc::default()),
            entity_integration_map: std::sync::Mutex::new(HashMap::new()),
            integration_channels: std::sync::Mutex::new(HashMap::new()),
            message_rx: Mutex::new(message_rx),
            message_tx,
            integration_handles: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Register integrations from configuration
    ///
    /// Runs every registered factory; each may produce any number of
    /// integration instances (one per configured entry).
    pub fn register_integrations_from_config(&self, cfg: &Config, store: &EntryStore) {
        let ctx = IntegrationContext { config: cfg, store };
        for constr in super::integration::REGISTRY {
            let integrations = match constr(&ctx) {
                Ok(i) => i,
                Err(e) => {
                    error!("failed to set up integration: {:#}", e);
                    continue;
                }
            };
            for integration in integrations {
                let name = integration.name().to_string();
                self.register_integration(name, integration);
            }
        }
    }

    /// Register an integration with the engine
    ///
    /// This spawns the integration in a background task, wires up channels,
    /// and starts its setup process.
    pub fn register_integration(&self, name: String, mut integration: Box<dyn Integration>) {
        let (to_integration_tx, mut to_integration_rx) = mpsc::unbounded_channel();
        let from_integration_tx = self.message_tx.clone();

        if let Ok(mut channels) = self.integration_channels.lock() {
            channels.insert(name.clone(), to_integration_tx);
        }

        let task_name = name.clone();
        let handle = tokio::spawn(async move {
            let name = task_name;
            // Setup integration (gives it the sender for events)
            if let Err(e) = integration.setup(from_integration_tx).await {
                warn!("Integration '{}' setup failed: {}", name, e);
                return;
            }

            // Process commands from engine
            while let Some(msg) = to_integration_rx.recv().await {
                if let Err(e) = integration.handle_message(msg).await {
                    warn!("Integration '{}' failed to handle message: {}", name, e);
                }
            }

            if let Err(e) = integration.shutdown().await {
                warn!("Integration '{}' shutdown failed: {}", name, e);
            }
        });

        if let Ok(mut handles) = self.integration_handles.lock() {
            handles.insert(name, handle);
        }
    }

    /// Unload a single integration
    ///
    /// Closes its command channel so the integration task runs its shutdown
    /// hook, waits for the task, then forgets every entity it owned.
    /// Returns false if no integration with that name was registered.
    pub async fn unload_integration(&self, name: &str) -> bool {
        let channel = self
            .integration_channels
            .lock()
            .ok()
            .and_then(|mut channels| channels.remove(name));
        let handle = self
            .integration_handles
            .lock()
            .ok()
            .and_then(|mut handles| handles.remove(name));

        if channel.is_none() && handle.is_none() {
            return false;
        }
        drop(channel);

        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Integration '{}' task ended abnormally: {}", name, e);
            }
        }

        let owned: Vec<String> = match self.entity_integration_map.lock() {
            Ok(mut map) => {
                let owned: Vec<String> = map
                    .iter()
                    .filter(|(_, owner)| owner.as_str() == name)
                    .map(|(entity_id, _)| entity_id.clone())
                    .collect();
                for entity_id in &owned {
                    map.remove(entity_id);
                }
                owned
            }
            Err(_) => Vec::new(),
        };

        self.update_state(|state| {
            for entity_id in &owned {
                state.entities.remove(entity_id);
            }
            for device in state.devices.values_mut() {
                device.entity_ids.retain(|id| !owned.contains(id));
            }
        });

        info!("Integration '{}' unloaded", name);
        true
    }

    /// Unload every registered integration
    pub async fn shutdown(&self) {
        let names: Vec<String> = self
            .integration_handles
            .lock()
            .map(|handles| handles.keys().cloned().collect())
            .unwrap_or_default();

        for name in names {
            self.unload_integration(&name).await;
        }
    }

    /// Execute a service call against the entity it targets
    ///
    /// Routes the call to the integration that owns the entity and waits for
    /// the integration to report the outcome.
    pub async fn call_service(&self, call: ServiceCall) -> Result<(), ServiceError> {
        let integration_name = self
            .entity_integration_map
            .lock()
            .ok()
            .and_then(|map| map.get(&call.entity_id).cloned())
            .ok_or_else(|| ServiceError::EntityNotFound(call.entity_id.clone()))?;

        let tx = self
            .integration_channels
            .lock()
            .ok()
            .and_then(|channels| channels.get(&integration_name).cloned())
            .ok_or_else(|| ServiceError::IntegrationUnavailable(integration_name.clone()))?;

        debug!("Routing {} to {}", call.name(), integration_name);

        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(ToIntegrationMessage::ServiceCall {
            call,
            reply: reply_tx,
        })
        .map_err(|_| ServiceError::IntegrationUnavailable(integration_name.clone()))?;

        reply_rx
            .await
            .map_err(|_| ServiceError::IntegrationUnavailable(integration_name))?
    }

    /// Run the engine's main event loop
    ///
    /// Processes incoming events from integrations and updates state.
    pub async fn run(&self) -> Result<(), Box<dyn Error + Send>> {
        info!("Engine starting");

        let mut rx = self.message_rx.lock().await;
        while let Some(msg) = rx.recv().await {
            self.handle_event(msg);
        }

        info!("Engine shutting down");
        Ok(())
    }

    /// Get a snapshot of the current engine state.
    ///
    /// Clones the `Arc` (atomic refcount bump), essentially free.
    pub fn state_snapshot(&self) -> Arc<State> {
        self.state.load_full()
    }

    fn update_state(&self, f: impl Fn(&mut State)) {
        self.state.rcu(|current| {
            let mut state = State::clone(current);
            f(&mut state);
            state
        });
    }

    fn owns(&self, entity_id: &str) -> bool {
        self.entity_integration_map
            .lock()
            .map(|map| map.contains_key(entity_id))
            .unwrap_or(false)
    }

    /// Handle an event from an integration
    fn handle_event(&self, msg: FromIntegrationMessage) {
        match msg {
            FromIntegrationMessage::DeviceRegistered { device } => {
                info!("Device registered: {} ({})", device.name, device.id);
                self.update_state(|state| {
                    let mut device = device.clone();
                    if let Some(existing) = state.devices.get(&device.id) {
                        for entity_id in &existing.entity_ids {
                            device.add_entity(entity_id.clone());
                        }
                    }
                    state.devices.insert(device.id.clone(), device);
                });
            }
            FromIntegrationMessage::EntityDiscovered {
                entity_id,
                device_id,
                integration_name,
            } => {
                info!(
                    "Entity discovered: {} (from {})",
                    entity_id, integration_name
                );

                // State is not populated until the first state-change message arrives.
                if let Ok(mut map) = self.entity_integration_map.lock() {
                    map.insert(entity_id.clone(), integration_name);
                }

                if let Some(device_id) = device_id {
                    self.update_state(|state| {
                        if let Some(device) = state.devices.get_mut(&device_id) {
                            device.add_entity(entity_id.clone());
                        }
                    });
                }
            }
            FromIntegrationMessage::EntityStateChanged { entity_id, state } => {
                if !self.owns(&entity_id) {
                    debug!("Dropping state for unregistered entity {}", entity_id);
                    return;
                }
                debug!(
                    "State changed: {} -> {} (available={})",
                    entity_id, state.state, state.available
                );
                self.update_state(|s| {
                    s.entities.insert(entity_id.clone(), state.clone());
                });
            }
            FromIntegrationMessage::IssueRaised { issue } => {
                warn!(
                    "Issue raised by {}: {} ({})",
                    issue.domain, issue.issue_id, issue.message
                );
                self.update_state(|state| {
                    state
                        .issues
                        .retain(|i| !(i.domain == issue.domain && i.issue_id == issue.issue_id));
                    state.issues.push(issue.clone());
                });
            }
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

use std::error::Error;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::DOMAIN;
use super::client::CloudApi;
use super::client::CloudCredentials;
use super::client::Transports;
use super::coordinator::Coordinators;
use super::coordinator::UpdateError;
use super::device::Device;
use super::discovery;
use super::entity::Entity;
use super::entity::Snapshots;
use super::entity::Source;
use super::entity::entities_for;
use super::entry::CONF_MAC;
use super::entry::CURRENT_VERSION;
use super::entry::EntryData;
use super::entry::OPT_USE_BLUETOOTH;
use super::entry::reconcile;
use super::firmware::gateway_advisory;
use super::migration::MigrationError;
use super::migration::migrate;
use super::model::FirmwareType;
use crate::config::LaMarzoccoConfig;
use crate::engine;
use crate::engine::FromIntegrationMessage;
use crate::engine::FromIntegrationSender;
use crate::engine::Integration;
use crate::engine::ServiceCall;
use crate::engine::ServiceError;
use crate::engine::ToIntegrationMessage;
use crate::store::ConfigEntry;
use crate::store::EntryStore;
use crate::store::StoreError;

const MANUFACTURER: &str = "La Marzocco";

#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("Config entry store failed: {0}")]
    Store(#[from] StoreError),

    #[error("Config entry migration failed: {0}")]
    Migration(#[from] MigrationError),

    #[error("Config entry data is invalid: {0}")]
    InvalidEntry(#[source] serde_json::Error),

    #[error("Machine did not respond: {0}")]
    FirstRefresh(#[from] UpdateError),

    #[error("Engine is no longer listening")]
    ChannelClosed,
}

/// State that exists once setup has succeeded
struct Runtime {
    entry_id: String,
    device: Arc<Device>,
    coordinators: Coordinators,
    entities: Vec<Entity>,
    tx: FromIntegrationSender,
}

impl Runtime {
    fn snapshots(&self) -> Snapshots {
        Snapshots {
            config: self.coordinators.config.data(),
            firmware: self.coordinators.firmware.data(),
            statistics: self.coordinators.statistics.data(),
        }
    }

    fn available(&self, source: Source) -> bool {
        match source {
            Source::Config => self.coordinators.config.available(),
            Source::Firmware => self.coordinators.firmware.available(),
            Source::Statistics => self.coordinators.statistics.available(),
        }
    }

    fn subscribe(&self, source: Source) -> watch::Receiver<u64> {
        match source {
            Source::Config => self.coordinators.config.subscribe(),
            Source::Firmware => self.coordinators.firmware.subscribe(),
            Source::Statistics => self.coordinators.statistics.subscribe(),
        }
    }

    /// Send the current state of every entity fed by `source`, or of every
    /// entity when `source` is None
    async fn publish(&self, source: Option<Source>) -> Result<(), SetupError> {
        let snapshots = self.snapshots();
        for entity in &self.entities {
            if source.is_some_and(|s| s != entity.source()) {
                continue;
            }
            let available = self.available(entity.source());
            self.tx
                .send(FromIntegrationMessage::EntityStateChanged {
                    entity_id: entity.entity_id().to_string(),
                    state: entity.render(&self.device, &snapshots, available),
                })
                .await
                .map_err(|_| SetupError::ChannelClosed)?;
        }
        Ok(())
    }

    async fn call(&self, call: &ServiceCall) -> Result<(), ServiceError> {
        let entity = self
            .entities
            .iter()
            .find(|e| e.entity_id() == call.entity_id)
            .ok_or_else(|| ServiceError::EntityNotFound(call.entity_id.clone()))?;

        entity
            .call(
                &self.device,
                &self.snapshots(),
                &call.domain,
                &call.service,
                &call.data,
            )
            .await?;

        // The action went through; a failed refresh only delays the new
        // state until the next poll.
        if let Err(e) = self.coordinators.config.refresh().await {
            warn!("{}: refresh after {} failed: {}", self.entry_id, call.name(), e);
        }
        Ok(())
    }
}

fn spawn_publisher(runtime: Arc<Runtime>, source: Source) -> JoinHandle<()> {
    let mut rx = runtime.subscribe(source);
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            if let Err(e) = runtime.publish(Some(source)).await {
                debug!("{}: stopping {:?} publisher: {}", runtime.entry_id, source, e);
                break;
            }
        }
    })
}

/// One configured espresso machine
pub struct LaMarzoccoIntegration {
    entry_id: String,
    config: LaMarzoccoConfig,
    store: EntryStore,
    transports: Arc<dyn Transports>,
    runtime: Option<Arc<Runtime>>,
    tasks: Vec<JoinHandle<()>>,
}

impl LaMarzoccoIntegration {
    pub fn new(
        entry_id: &str,
        config: LaMarzoccoConfig,
        store: EntryStore,
        transports: Arc<dyn Transports>,
    ) -> Self {
        Self {
            entry_id: entry_id.to_string(),
            config,
            store,
            transports,
            runtime: None,
            tasks: Vec::new(),
        }
    }

    /// Load the stored entry, fold in the config file and bring it up to
    /// the current version
    async fn prepare_entry(
        &self,
        credentials: CloudCredentials,
    ) -> Result<(ConfigEntry, Arc<dyn CloudApi>), SetupError> {
        let stored = self.store.load(&self.entry_id)?;
        let (mut entry, changed) = reconcile(&self.entry_id, stored, &self.config);
        if changed {
            self.store.save(&entry)?;
        }

        let cloud = self.transports.cloud(credentials);
        if entry.version != CURRENT_VERSION {
            entry = migrate(&entry, cloud.as_ref()).await?;
            self.store.save(&entry)?;
        }

        let use_bluetooth = entry.option_bool(OPT_USE_BLUETOOTH).unwrap_or(false);
        if use_bluetooth && entry.data_str(CONF_MAC).is_none() {
            if let Some(scanner) = self.transports.scanner() {
                match discovery::discover(&mut entry, scanner.as_ref()).await {
                    Ok(true) => self.store.save(&entry)?,
                    Ok(false) => {}
                    Err(e) => warn!("{}: Bluetooth scan failed: {}", self.entry_id, e),
                }
            }
        }

        Ok((entry, cloud))
    }

    async fn try_setup(&mut self, tx: FromIntegrationSender) -> Result<(), SetupError> {
        let credentials = CloudCredentials {
            username: self.config.username.clone(),
            password: self.config.password.clone(),
            client_id: self.config.client_id.clone(),
            client_secret: self.config.client_secret.clone(),
        };
        let (entry, cloud) = self.prepare_entry(credentials).await?;
        let data = EntryData::from_entry(&entry).map_err(SetupError::InvalidEntry)?;
        let serial = entry.unique_id.clone();

        let mut device = Device::new(&serial, &data.name, data.model, cloud);
        if let (Some(host), Some(token)) = (&data.host, &data.token) {
            device = device.with_local(self.transports.local(host, token));
        }
        let use_bluetooth = entry.option_bool(OPT_USE_BLUETOOTH).unwrap_or(false);
        if let (true, Some(mac), Some(token)) = (use_bluetooth, &data.mac, &data.token) {
            let name = data.bluetooth_name.as_deref().unwrap_or(&data.name);
            match self.transports.bluetooth(mac, name, token) {
                Some(bluetooth) => device = device.with_bluetooth(bluetooth),
                None => info!("{}: Bluetooth is not available on this host", serial),
            }
        }
        let device = Arc::new(device);

        let coordinators = Coordinators::new(device.clone());
        coordinators.first_refresh().await?;

        let send = |msg| {
            let tx = tx.clone();
            async move { tx.send(msg).await.map_err(|_| SetupError::ChannelClosed) }
        };

        let firmware = coordinators.firmware.data();
        if let Some(issue) = firmware
            .as_deref()
            .and_then(|firmware| gateway_advisory(&serial, firmware))
        {
            warn!("{}", issue.message);
            send(FromIntegrationMessage::IssueRaised { issue }).await?;
        }

        let mut host_device = engine::Device::new(serial.clone(), data.name.clone())
            .with_identifier(DOMAIN, &serial);
        host_device.manufacturer = Some(MANUFACTURER.to_string());
        host_device.model = Some(data.model.to_string());
        host_device.sw_version = firmware
            .as_deref()
            .and_then(|f| f.get(FirmwareType::Machine))
            .map(|v| v.current_version.clone());
        send(FromIntegrationMessage::DeviceRegistered {
            device: host_device,
        })
        .await?;

        let entities = entities_for(&device);
        for entity in &entities {
            debug!("{}: adding {} ({})", self.entry_id, entity.entity_id(), entity.unique_id());
            send(FromIntegrationMessage::EntityDiscovered {
                entity_id: entity.entity_id().to_string(),
                device_id: Some(serial.clone()),
                integration_name: self.entry_id.clone(),
            })
            .await?;
        }

        let runtime = Arc::new(Runtime {
            entry_id: self.entry_id.clone(),
            device,
            coordinators,
            entities,
            tx,
        });
        runtime.publish(None).await?;

        self.tasks = runtime.coordinators.spawn();
        for source in [Source::Config, Source::Firmware, Source::Statistics] {
            self.tasks.push(spawn_publisher(runtime.clone(), source));
        }

        info!(
            "{}: {} {} ready with {} entities",
            self.entry_id,
            data.model,
            serial,
            runtime.entities.len()
        );
        self.runtime = Some(runtime);
        Ok(())
    }
}

#[async_trait]
impl Integration for LaMarzoccoIntegration {
    fn name(&self) -> &str {
        &self.entry_id
    }

    async fn setup(&mut self, tx: FromIntegrationSender) -> Result<(), Box<dyn Error + Send>> {
        info!("Setting up {} ({})", self.entry_id, self.config.serial);
        self.try_setup(tx).await.map_err(|e| {
            error!("{}: setup failed: {}", self.entry_id, e);
            Box::new(e) as Box<dyn Error + Send>
        })
    }

    async fn handle_message(
        &mut self,
        msg: ToIntegrationMessage,
    ) -> Result<(), Box<dyn Error + Send>> {
        match msg {
            ToIntegrationMessage::ServiceCall { call, reply } => {
                info!("{}: {} on {}", self.entry_id, call.name(), call.entity_id);
                let result = match &self.runtime {
                    Some(runtime) => runtime.call(&call).await,
                    None => Err(ServiceError::IntegrationUnavailable(self.entry_id.clone())),
                };
                if let Err(e) = &result {
                    warn!("{}: {} failed: {}", self.entry_id, call.name(), e);
                }
                if reply.send(result).is_err() {
                    debug!("{}: caller went away before the reply", self.entry_id);
                }
            }
        }
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), Box<dyn Error + Send>> {
        info!("{}: shutting down", self.entry_id);
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.runtime = None;
        Ok(())
    }
}

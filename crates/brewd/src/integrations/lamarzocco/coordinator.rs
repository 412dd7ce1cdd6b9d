//! Polling coordinators.
//!
//! A coordinator owns one kind of machine data (configuration, firmware,
//! statistics). It refreshes that data on a fixed interval or on demand,
//! keeps the last good snapshot when a refresh fails, and tells subscribers
//! whenever its published state changes.
//!
//! Readers always see a complete snapshot: refreshes build a new
//! [`Published`] value and swap it in atomically. Refreshes themselves are
//! serialized so an on-demand refresh never races the periodic one.

use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::device::Device;
use super::error::DeviceError;
use super::error::FailureKind;
use super::model::Firmware;
use super::model::MachineConfig;
use super::model::Statistics;

/// What a coordinator fetches and how often
#[async_trait]
pub trait Fetch: Send + Sync + 'static {
    type Data: Debug + Send + Sync + 'static;

    const NAME: &'static str;
    const INTERVAL: Duration;

    async fn fetch(device: &Device) -> Result<Self::Data, DeviceError>;
}

pub struct ConfigFetch;
pub struct FirmwareFetch;
pub struct StatisticsFetch;

#[async_trait]
impl Fetch for ConfigFetch {
    type Data = MachineConfig;
    const NAME: &'static str = "config";
    const INTERVAL: Duration = Duration::from_secs(30);

    async fn fetch(device: &Device) -> Result<MachineConfig, DeviceError> {
        device.get_config().await
    }
}

#[async_trait]
impl Fetch for FirmwareFetch {
    type Data = Firmware;
    const NAME: &'static str = "firmware";
    const INTERVAL: Duration = Duration::from_secs(60 * 60);

    async fn fetch(device: &Device) -> Result<Firmware, DeviceError> {
        device.get_firmware().await
    }
}

#[async_trait]
impl Fetch for StatisticsFetch {
    type Data = Statistics;
    const NAME: &'static str = "statistics";
    const INTERVAL: Duration = Duration::from_secs(15 * 60);

    async fn fetch(device: &Device) -> Result<Statistics, DeviceError> {
        device.get_statistics().await
    }
}

pub type ConfigCoordinator = Coordinator<ConfigFetch>;
pub type FirmwareCoordinator = Coordinator<FirmwareFetch>;
pub type StatisticsCoordinator = Coordinator<StatisticsFetch>;

/// A coordinator's externally visible state
#[derive(Debug)]
pub struct Published<T> {
    /// Last successfully fetched data; survives failed refreshes
    pub data: Option<Arc<T>>,
    /// Whether the most recent refresh succeeded
    pub available: bool,
    pub last_error: Option<DeviceError>,
}

impl<T> Default for Published<T> {
    fn default() -> Self {
        Self {
            data: None,
            available: false,
            last_error: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error("{coordinator} update failed, authentication required: {source}")]
    AuthFailed {
        coordinator: &'static str,
        #[source]
        source: DeviceError,
    },

    #[error("{coordinator} update failed, will retry: {source}")]
    Transient {
        coordinator: &'static str,
        #[source]
        source: DeviceError,
    },

    #[error("{coordinator} update failed: {source}")]
    Failed {
        coordinator: &'static str,
        #[source]
        source: DeviceError,
    },
}

impl UpdateError {
    fn new(coordinator: &'static str, source: DeviceError) -> Self {
        match source.kind() {
            FailureKind::Auth => Self::AuthFailed {
                coordinator,
                source,
            },
            FailureKind::Transient => Self::Transient {
                coordinator,
                source,
            },
            FailureKind::Unknown => Self::Failed {
                coordinator,
                source,
            },
        }
    }

    pub fn source_error(&self) -> &DeviceError {
        match self {
            Self::AuthFailed { source, .. }
            | Self::Transient { source, .. }
            | Self::Failed { source, .. } => source,
        }
    }
}

pub struct Coordinator<F: Fetch> {
    device: Arc<Device>,
    interval: Duration,
    state: ArcSwap<Published<F::Data>>,
    /// Bumped on every publish; subscribers only care that it changed
    generation: watch::Sender<u64>,
    refresh_lock: Mutex<()>,
    needs_reauth: AtomicBool,
    _fetch: PhantomData<fn() -> F>,
}

impl<F: Fetch> Coordinator<F> {
    pub fn new(device: Arc<Device>) -> Arc<Self> {
        Self::with_interval(device, F::INTERVAL)
    }

    pub fn with_interval(device: Arc<Device>, interval: Duration) -> Arc<Self> {
        let (generation, _) = watch::channel(0);
        Arc::new(Self {
            device,
            interval,
            state: ArcSwap::new(Arc::default()),
            generation,
            refresh_lock: Mutex::new(()),
            needs_reauth: AtomicBool::new(false),
            _fetch: PhantomData,
        })
    }

    pub fn name(&self) -> &'static str {
        F::NAME
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn current(&self) -> Arc<Published<F::Data>> {
        self.state.load_full()
    }

    pub fn data(&self) -> Option<Arc<F::Data>> {
        self.state.load().data.clone()
    }

    pub fn available(&self) -> bool {
        self.state.load().available
    }

    /// Receiver that wakes whenever the published state changes
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.generation.subscribe()
    }

    fn publish(&self, published: Published<F::Data>) {
        self.state.store(Arc::new(published));
        self.generation.send_modify(|g| *g = g.wrapping_add(1));
    }

    /// Fetch fresh data now
    ///
    /// Waits for any refresh already in flight. On failure the previous
    /// data is kept and marked unavailable.
    pub async fn refresh(&self) -> Result<Arc<F::Data>, UpdateError> {
        let _guard = self.refresh_lock.lock().await;

        if self.needs_reauth.load(Ordering::Acquire) {
            info!(
                "{}: re-authenticating before {} refresh",
                self.device.serial(),
                F::NAME
            );
            if let Err(e) = self.device.reauthenticate().await {
                return Err(self.fail(e));
            }
            self.needs_reauth.store(false, Ordering::Release);
        }

        match F::fetch(&self.device).await {
            Ok(data) => {
                let data = Arc::new(data);
                debug!("{}: {} refreshed", self.device.serial(), F::NAME);
                self.publish(Published {
                    data: Some(data.clone()),
                    available: true,
                    last_error: None,
                });
                Ok(data)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    fn fail(&self, e: DeviceError) -> UpdateError {
        if e.kind() == FailureKind::Auth {
            self.needs_reauth.store(true, Ordering::Release);
        }

        let previous = self.state.load();
        self.publish(Published {
            data: previous.data.clone(),
            available: false,
            last_error: Some(e.clone()),
        });

        UpdateError::new(F::NAME, e)
    }

    /// Start refreshing every interval
    ///
    /// The first refresh happens one interval from now; setup performs the
    /// initial one itself. Failures are logged and never end the loop.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(coordinator.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let serial = coordinator.device.serial();
                match coordinator.refresh().await {
                    Ok(_) => {}
                    Err(e @ UpdateError::Transient { .. }) => warn!("{}: {}", serial, e),
                    Err(e @ UpdateError::AuthFailed { .. }) => warn!("{}: {}", serial, e),
                    Err(e @ UpdateError::Failed { .. }) => error!("{}: {}", serial, e),
                }
            }
        })
    }
}

/// The three coordinators of one machine
#[derive(Clone)]
pub struct Coordinators {
    pub config: Arc<ConfigCoordinator>,
    pub firmware: Arc<FirmwareCoordinator>,
    pub statistics: Arc<StatisticsCoordinator>,
}

impl Coordinators {
    pub fn new(device: Arc<Device>) -> Self {
        Self {
            config: Coordinator::new(device.clone()),
            firmware: Coordinator::new(device.clone()),
            statistics: Coordinator::new(device),
        }
    }

    /// Initial refresh of every coordinator, config first
    ///
    /// Stops at the first failure.
    pub async fn first_refresh(&self) -> Result<(), UpdateError> {
        self.config.refresh().await?;
        self.firmware.refresh().await?;
        self.statistics.refresh().await?;
        Ok(())
    }

    pub fn spawn(&self) -> Vec<JoinHandle<()>> {
        vec![
            self.config.spawn(),
            self.firmware.spawn(),
            self.statistics.spawn(),
        ]
    }
}

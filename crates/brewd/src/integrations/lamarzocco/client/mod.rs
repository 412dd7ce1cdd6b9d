//! Transport clients for talking to a machine.
//!
//! Every transport sits behind a trait so the device facade, coordinators
//! and entities can be exercised against in-memory mocks.

#[cfg(feature = "bluetooth")]
mod bluetooth;
mod cloud;
mod local;
#[cfg(test)]
pub mod mock;
pub mod wire;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
pub use cloud::CloudClient;
pub use cloud::CloudCredentials;
pub use cloud::CloudEndpoints;
pub use local::LocalClient;

use super::error::DeviceError;
use super::model::BoilerType;
use super::model::Firmware;
use super::model::FleetDevice;
use super::model::MachineConfig;
use super::model::Schedule;
use super::model::ScheduleDay;
use super::model::SmartStandby;
use super::model::Statistics;
use super::model::WeekDay;

/// A state-changing request for a machine
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetPower(bool),
    SetSteam(bool),
    SetTemperature { boiler: BoilerType, temperature: f64 },
    SetSmartStandby(SmartStandby),
    SetScheduleDay { day: WeekDay, schedule: ScheduleDay },
    SetSchedule(Schedule),
    EnableSchedule(bool),
    StartBackflush,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetPower(_) => "set_power",
            Self::SetSteam(_) => "set_steam",
            Self::SetTemperature { .. } => "set_temp",
            Self::SetSmartStandby(_) => "set_smart_standby",
            Self::SetScheduleDay { .. } => "set_schedule_day",
            Self::SetSchedule(_) => "set_schedule",
            Self::EnableSchedule(_) => "enable_schedule_globally",
            Self::StartBackflush => "start_backflush",
        }
    }
}

/// The vendor cloud, scoped to one account
#[async_trait]
pub trait CloudApi: Send + Sync {
    /// Machines registered to the account, keyed by serial number
    async fn get_fleet(&self) -> Result<HashMap<String, FleetDevice>, DeviceError>;

    async fn get_config(&self, serial: &str) -> Result<MachineConfig, DeviceError>;

    async fn get_firmware(&self, serial: &str) -> Result<Firmware, DeviceError>;

    async fn get_statistics(&self, serial: &str) -> Result<Statistics, DeviceError>;

    async fn send(&self, serial: &str, command: &Command) -> Result<(), DeviceError>;

    /// Drop any cached token and log in again
    async fn reauthenticate(&self) -> Result<(), DeviceError>;
}

/// The machine's own HTTP API on the local network
#[async_trait]
pub trait LocalApi: Send + Sync {
    async fn get_config(&self) -> Result<MachineConfig, DeviceError>;

    async fn send(&self, command: &Command) -> Result<(), DeviceError>;
}

/// A direct Bluetooth LE link to one machine
#[async_trait]
pub trait BluetoothApi: Send + Sync {
    fn address(&self) -> &str;

    async fn send(&self, command: &Command) -> Result<(), DeviceError>;
}

/// A Bluetooth advertisement seen by the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub name: Option<String>,
    pub address: String,
}

/// Access to whatever Bluetooth devices are currently in range
#[async_trait]
pub trait BluetoothScanner: Send + Sync {
    async fn discovered(&self) -> Result<Vec<Advertisement>, DeviceError>;
}

/// Builds transport clients
///
/// One factory is shared by every configured machine so that they share a
/// connection pool.
pub trait Transports: Send + Sync {
    fn cloud(&self, credentials: CloudCredentials) -> Arc<dyn CloudApi>;

    fn local(&self, host: &str, token: &str) -> Arc<dyn LocalApi>;

    /// None when Bluetooth support is not available on this host
    fn bluetooth(&self, address: &str, name: &str, token: &str) -> Option<Arc<dyn BluetoothApi>>;

    fn scanner(&self) -> Option<Arc<dyn BluetoothScanner>>;
}

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Production transports backed by reqwest (and btleplug when enabled)
pub struct HttpTransports {
    http: reqwest::Client,
    endpoints: CloudEndpoints,
}

impl HttpTransports {
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_endpoints(CloudEndpoints::default())
    }

    pub fn with_endpoints(endpoints: CloudEndpoints) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("brewd/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self { http, endpoints })
    }
}

impl Transports for HttpTransports {
    fn cloud(&self, credentials: CloudCredentials) -> Arc<dyn CloudApi> {
        Arc::new(CloudClient::new(
            self.http.clone(),
            self.endpoints.clone(),
            credentials,
        ))
    }

    fn local(&self, host: &str, token: &str) -> Arc<dyn LocalApi> {
        Arc::new(LocalClient::new(self.http.clone(), host, token))
    }

    #[cfg(feature = "bluetooth")]
    fn bluetooth(&self, address: &str, name: &str, token: &str) -> Option<Arc<dyn BluetoothApi>> {
        Some(Arc::new(bluetooth::BleClient::new(address, name, token)))
    }

    #[cfg(not(feature = "bluetooth"))]
    fn bluetooth(&self, _address: &str, _name: &str, _token: &str) -> Option<Arc<dyn BluetoothApi>> {
        None
    }

    #[cfg(feature = "bluetooth")]
    fn scanner(&self) -> Option<Arc<dyn BluetoothScanner>> {
        Some(Arc::new(bluetooth::BleScanner::default()))
    }

    #[cfg(not(feature = "bluetooth"))]
    fn scanner(&self) -> Option<Arc<dyn BluetoothScanner>> {
        None
    }
}
